//! Payload decoding: clinical observation extraction from message bodies.

pub mod observation;

pub use observation::{extract_observations, ExtractionReport, InrReading, ReadingStatus};
