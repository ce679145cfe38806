//! Durable reconciliation store for clinical readings.

pub mod reading_set;

pub use reading_set::{reset_data, MergeReport, ReadingSet, ResetReport};
