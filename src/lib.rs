//! # poct1-rs - A Rust Crate for POCT1-A Coagulometer Synchronization
//!
//! The poct1-rs crate provides a Rust-based implementation of the POCT1-A
//! device-messaging dialect spoken by point-of-care PT/INR coagulometers.
//! It pulls anticoagulation test results off the meter, reconciles them into
//! a durable local store, and derives the clinical metrics a self-testing
//! patient tracks between clinic visits.
//!
//! ## Features
//!
//! - Serve the meter's TCP connection and drive the hello/status/request
//!   handshake with correct acknowledgment consent semantics
//! - Reconstruct discrete protocol messages from an unbounded,
//!   arbitrarily-chunked byte stream
//! - Extract structured PT/INR observations, tolerant of malformed groups
//! - Merge observations into a durable JSON-backed reading set with
//!   exactly-once semantics per observation
//! - Estimate time in therapeutic range (Rosendaal linear interpolation),
//!   mean INR, and sample standard deviation
//! - Archive raw observation payloads for audit
//! - Support for logging and error handling
//!
//! ## Usage
//!
//! To use the poct1-rs crate in your Rust project, add the following to your
//! Cargo.toml file:
//!
//! ```toml
//! [dependencies]
//! poct1-rs = "0.4.0"
//! ```
//!
//! Then, in your Rust code, you can import the necessary modules and functions:
//!
//! ```rust
//! use poct1_rs::{
//!     serve, load_readings, SyncConfig, SyncManager, DeviceServer,
//!     InrReading, ReadingSet, Poct1Error, init_logger, log_info,
//!     TherapeuticRange, RangeSummary,
//! };
//! ```

use std::sync::Arc;

pub mod analysis;
pub mod constants;
pub mod error;
pub mod logging;
pub mod payload;
pub mod poct1;
pub mod store;
pub mod sync_manager;

pub use crate::error::Poct1Error;
pub use crate::logging::{init_logger, log_info};

// Core protocol types
pub use poct1::{
    AckPolicy, AckType, DeviceIdentity, DeviceServer, DeviceSession, MessageFramer, MessageKind,
    RawMessage, SessionOutcome, SessionStep, SyncEvent, SyncObserver,
};

// Observation and store types
pub use payload::{extract_observations, ExtractionReport, InrReading, ReadingStatus};
pub use store::{reset_data, MergeReport, ReadingSet, ResetReport};

// Clinical metrics
pub use analysis::{summarize, RangeSummary, TherapeuticRange};

// Synchronization pipeline
pub use sync_manager::{SyncConfig, SyncManager};

/// Serve device connections until the task is cancelled.
///
/// # Arguments
/// * `config` - Synchronization configuration (ack policy, data file, captures)
/// * `addr` - Listen address, e.g. "0.0.0.0:5050"
///
/// # Returns
/// * `Ok(())` - Never returned in practice; the accept loop runs until cancelled
/// * `Err(Poct1Error)` - Snapshot load, bind, or accept failed
pub async fn serve(config: SyncConfig, addr: &str) -> Result<(), Poct1Error> {
    let manager = Arc::new(SyncManager::new(config)?);
    DeviceServer::bind(manager, addr).await?.run().await
}

/// Load the reconciled reading set from a results snapshot.
///
/// # Arguments
/// * `path` - Snapshot path, typically "inr_results.json"
///
/// # Returns
/// * `Ok(ReadingSet)` - Loaded set; empty when no snapshot exists yet
/// * `Err(Poct1Error)` - Snapshot exists but could not be read or parsed
pub fn load_readings<P: AsRef<std::path::Path>>(path: P) -> Result<ReadingSet, Poct1Error> {
    ReadingSet::load(path)
}
