//! # Time-in-Range Estimation
//!
//! Read-only metrics over the chronologically sorted reading set: the
//! arithmetic mean and sample standard deviation of the INR values, and
//! the time-in-therapeutic-range percentage by the Rosendaal method.
//!
//! Rosendaal assumes the INR moved linearly between consecutive tests,
//! partitions each between-test interval by where that line sits relative
//! to the target range, and reports the in-range share of total elapsed
//! time. With sparse self-testing this is an estimate, not a measurement,
//! and it is undefined for fewer than two readings; undefined is
//! reported as absent, never as zero.

use crate::error::Poct1Error;
use crate::payload::observation::InrReading;

/// Inclusive INR target range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TherapeuticRange {
    low: f64,
    high: f64,
}

impl TherapeuticRange {
    /// Builds a range, rejecting inverted or non-finite bounds.
    pub fn new(low: f64, high: f64) -> Result<Self, Poct1Error> {
        if !low.is_finite() || !high.is_finite() || low > high {
            return Err(Poct1Error::InvalidRange { low, high });
        }
        Ok(TherapeuticRange { low, high })
    }

    pub fn low(&self) -> f64 {
        self.low
    }

    pub fn high(&self) -> f64 {
        self.high
    }

    /// Boundary values count as in range.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.low && value <= self.high
    }
}

impl Default for TherapeuticRange {
    /// The standard warfarin target, INR 2.0 to 3.0.
    fn default() -> Self {
        TherapeuticRange {
            low: 2.0,
            high: 3.0,
        }
    }
}

impl std::fmt::Display for TherapeuticRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.1}-{:.1}", self.low, self.high)
    }
}

/// Metrics for one reading set against one target range.
///
/// Each metric is absent when its preconditions are not met: the mean
/// needs at least one reading, the standard deviation two, and the TTR
/// two readings spanning nonzero time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeSummary {
    pub range: TherapeuticRange,
    pub count: usize,
    pub in_range_count: usize,
    pub mean_inr: Option<f64>,
    pub std_dev: Option<f64>,
    pub ttr_percent: Option<f64>,
}

/// Computes the summary over readings sorted ascending by timestamp,
/// which is the order the store maintains.
pub fn summarize(readings: &[InrReading], range: TherapeuticRange) -> RangeSummary {
    let count = readings.len();
    let in_range_count = readings.iter().filter(|r| range.contains(r.inr)).count();

    let mean_inr = if count > 0 {
        Some(readings.iter().map(|r| r.inr).sum::<f64>() / count as f64)
    } else {
        None
    };

    let std_dev = match (mean_inr, count) {
        (Some(mean), n) if n >= 2 => {
            let variance = readings
                .iter()
                .map(|r| {
                    let d = r.inr - mean;
                    d * d
                })
                .sum::<f64>()
                / (n - 1) as f64;
            Some(variance.sqrt())
        }
        _ => None,
    };

    RangeSummary {
        range,
        count,
        in_range_count,
        mean_inr,
        std_dev,
        ttr_percent: rosendaal_ttr(readings, range),
    }
}

/// Time in therapeutic range by Rosendaal linear interpolation.
fn rosendaal_ttr(readings: &[InrReading], range: TherapeuticRange) -> Option<f64> {
    if readings.len() < 2 {
        return None;
    }

    let mut total_seconds = 0.0;
    let mut in_range_seconds = 0.0;
    for pair in readings.windows(2) {
        let elapsed = (pair[1].observed_at - pair[0].observed_at).num_seconds() as f64;
        if elapsed <= 0.0 {
            continue;
        }
        total_seconds += elapsed;
        in_range_seconds += elapsed * in_range_fraction(pair[0].inr, pair[1].inr, range);
    }

    if total_seconds <= 0.0 {
        return None;
    }
    Some(in_range_seconds / total_seconds * 100.0)
}

/// Fraction of an interval spent in range, assuming the value moved
/// linearly from `start` to `end`. Because the movement is linear, time
/// in range equals the in-range share of the value span.
fn in_range_fraction(start: f64, end: f64, range: TherapeuticRange) -> f64 {
    let lower = start.min(end);
    let upper = start.max(end);

    if lower == upper {
        return if range.contains(lower) { 1.0 } else { 0.0 };
    }

    let overlap = (upper.min(range.high()) - lower.max(range.low())).max(0.0);
    overlap / (upper - lower)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inverted_range_is_rejected() {
        assert!(TherapeuticRange::new(3.0, 2.0).is_err());
        assert!(TherapeuticRange::new(f64::NAN, 3.0).is_err());
        assert!(TherapeuticRange::new(2.0, f64::INFINITY).is_err());
        assert!(TherapeuticRange::new(2.5, 2.5).is_ok());
    }

    #[test]
    fn boundaries_are_in_range() {
        let range = TherapeuticRange::default();
        assert!(range.contains(2.0));
        assert!(range.contains(3.0));
        assert!(!range.contains(1.999));
        assert!(!range.contains(3.001));
    }

    #[test]
    fn interval_fractions() {
        let range = TherapeuticRange::default();
        // Entirely inside.
        assert_eq!(in_range_fraction(2.2, 2.8, range), 1.0);
        // Entirely below, entirely above.
        assert_eq!(in_range_fraction(1.2, 1.8, range), 0.0);
        assert_eq!(in_range_fraction(3.5, 4.0, range), 0.0);
        // Constant value.
        assert_eq!(in_range_fraction(2.5, 2.5, range), 1.0);
        assert_eq!(in_range_fraction(3.5, 3.5, range), 0.0);
        // Crossing the whole range: 1.0 of span 2.0 is in range.
        let crossing = in_range_fraction(1.5, 3.5, range);
        assert!((crossing - 0.5).abs() < 1e-12);
    }
}
