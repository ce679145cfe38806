//! # Synchronization Error Handling
//!
//! This module defines the Poct1Error enum, which represents the different
//! error types that can occur in the poct1-rs crate.

use thiserror::Error;

/// Represents the different error types that can occur while talking to a
/// POCT1-A meter or maintaining the results snapshot.
#[derive(Debug, Error)]
pub enum Poct1Error {
    /// Indicates an error on the underlying device connection.
    #[error("Transport error: {0}")]
    TransportError(String),

    /// Indicates the results snapshot could not be written.
    ///
    /// This is fatal from the caller's point of view: until the write
    /// succeeds the merged readings are not durable.
    #[error("Failed to write results snapshot: {0}")]
    SnapshotWriteError(String),

    /// Indicates an existing results snapshot could not be read or parsed.
    #[error("Failed to load results snapshot: {0}")]
    SnapshotLoadError(String),

    /// Indicates the results snapshot or the capture files could not be
    /// deleted during a data reset.
    #[error("Failed to reset stored data: {0}")]
    ResetError(String),

    /// Indicates a therapeutic range where low exceeds high or a bound is
    /// not a finite number.
    #[error("Invalid therapeutic range: [{low}, {high}]")]
    InvalidRange { low: f64, high: f64 },
}
