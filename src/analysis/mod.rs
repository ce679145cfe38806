//! Derived clinical metrics over the reconciled reading set.

pub mod range;

pub use range::{summarize, RangeSummary, TherapeuticRange};
