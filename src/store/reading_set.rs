//! # Reconciliation Store
//!
//! The durable collection of every reading ever pulled from the device.
//! Exactly one exists per installation. Reconciliation is built around
//! one rule: the observation timestamp is the identity of a reading, so
//! merging is idempotent. Replaying a whole session (device-side
//! redelivery after a rejected batch, or an operator re-running a sync)
//! adds nothing the second time.
//!
//! Merging never discards stored data. Candidates with an unknown
//! timestamp are appended, known timestamps are skipped, and the display
//! sequence is reassigned as the 1-based rank in timestamp order.
//!
//! Persistence is a wholesale JSON snapshot: written after every
//! successful merge, read once at startup. A missing file is an empty
//! set; a corrupt file is an error, never silently overwritten.

use crate::error::Poct1Error;
use crate::logging::{log_debug, log_info};
use crate::payload::observation::InrReading;
use crate::poct1::message::DeviceIdentity;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// What one merge did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeReport {
    pub new_readings: usize,
    pub duplicates: usize,
    pub total_stored: usize,
}

/// Timestamp-ascending set of all merged readings plus the identity of
/// the device they came from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadingSet {
    device: DeviceIdentity,
    last_sync: Option<DateTime<FixedOffset>>,
    readings: Vec<InrReading>,
}

/// On-disk snapshot shape, kept compatible with files written by earlier
/// tooling: `total_readings` is redundant on load and recomputed on save.
#[derive(Debug, Serialize, Deserialize)]
struct SnapshotRecord {
    device: DeviceIdentity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    export_date: Option<String>,
    total_readings: usize,
    readings: Vec<InrReading>,
}

impl ReadingSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn device(&self) -> &DeviceIdentity {
        &self.device
    }

    pub fn last_sync(&self) -> Option<DateTime<FixedOffset>> {
        self.last_sync
    }

    /// All readings, ascending by observation timestamp.
    pub fn readings(&self) -> &[InrReading] {
        &self.readings
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Merges one session's candidates into the set.
    ///
    /// Every stored reading survives. A candidate whose timestamp is
    /// already present, in the store or earlier in the same batch, is
    /// skipped; the rest are appended, the set re-sorted, and sequences
    /// reassigned. The device identity is replaced only when the session
    /// actually identified one.
    pub fn merge(
        &mut self,
        device: Option<DeviceIdentity>,
        candidates: Vec<InrReading>,
        synced_at: DateTime<FixedOffset>,
    ) -> MergeReport {
        let mut known: HashSet<DateTime<FixedOffset>> =
            self.readings.iter().map(|r| r.observed_at).collect();

        let mut new_readings = 0;
        let mut duplicates = 0;
        for candidate in candidates {
            if known.insert(candidate.observed_at) {
                self.readings.push(candidate);
                new_readings += 1;
            } else {
                log_debug(&format!(
                    "Skipping duplicate reading at {}",
                    candidate.observed_at.to_rfc3339()
                ));
                duplicates += 1;
            }
        }

        self.readings.sort_by_key(|r| r.observed_at);
        self.resequence();

        if let Some(device) = device {
            self.device = device;
        }
        self.last_sync = Some(synced_at);

        MergeReport {
            new_readings,
            duplicates,
            total_stored: self.readings.len(),
        }
    }

    /// Writes the whole set as a pretty-printed JSON snapshot.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), Poct1Error> {
        let record = SnapshotRecord {
            device: self.device.clone(),
            export_date: self.last_sync.map(|t| t.to_rfc3339()),
            total_readings: self.readings.len(),
            readings: self.readings.clone(),
        };
        let json = serde_json::to_string_pretty(&record)
            .map_err(|e| Poct1Error::SnapshotWriteError(e.to_string()))?;
        fs::write(path.as_ref(), json)
            .map_err(|e| Poct1Error::SnapshotWriteError(e.to_string()))?;
        log_info(&format!(
            "Saved {} reading(s) to {}",
            self.readings.len(),
            path.as_ref().display()
        ));
        Ok(())
    }

    /// Loads a snapshot. A missing file is an empty set; an unreadable or
    /// unparseable file is an error so the caller never overwrites data
    /// it could not read.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Poct1Error> {
        let path = path.as_ref();
        if !path.exists() {
            log_debug(&format!("No snapshot at {}; starting empty", path.display()));
            return Ok(ReadingSet::default());
        }

        let json = fs::read_to_string(path)
            .map_err(|e| Poct1Error::SnapshotLoadError(e.to_string()))?;
        let record: SnapshotRecord = serde_json::from_str(&json)
            .map_err(|e| Poct1Error::SnapshotLoadError(e.to_string()))?;

        let mut set = ReadingSet {
            device: record.device,
            last_sync: record
                .export_date
                .as_deref()
                .and_then(|t| DateTime::parse_from_rfc3339(t).ok()),
            readings: record.readings,
        };
        set.restore_invariants();
        log_info(&format!(
            "Loaded {} reading(s) from {}",
            set.readings.len(),
            path.display()
        ));
        Ok(set)
    }

    /// Re-establishes ordering, identity and sequence after a load.
    /// Snapshots from earlier tooling may lack ids and could have been
    /// hand-edited out of order.
    fn restore_invariants(&mut self) {
        self.readings.sort_by_key(|r| r.observed_at);
        let mut seen: HashSet<DateTime<FixedOffset>> = HashSet::new();
        self.readings.retain(|r| seen.insert(r.observed_at));
        for reading in &mut self.readings {
            if reading.id.is_empty() {
                reading.id = reading.observed_at.to_rfc3339();
            }
        }
        self.resequence();
    }

    fn resequence(&mut self) {
        for (rank, reading) in self.readings.iter_mut().enumerate() {
            reading.sequence = (rank + 1) as u32;
        }
    }
}

/// What one data reset removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResetReport {
    pub snapshot_removed: bool,
    pub captures_removed: usize,
}

/// Deletes the results snapshot and any archived `.xml` capture files.
///
/// The only deletion path in the crate. Missing files are fine and the
/// report says what was actually removed. Other files in the capture
/// directory are left alone, and the directory itself stays.
pub fn reset_data(data_file: &Path, capture_dir: Option<&Path>) -> Result<ResetReport, Poct1Error> {
    let mut report = ResetReport::default();

    if data_file.exists() {
        fs::remove_file(data_file)
            .map_err(|e| Poct1Error::ResetError(format!("{}: {e}", data_file.display())))?;
        log_info(&format!("Deleted {}", data_file.display()));
        report.snapshot_removed = true;
    }

    let Some(dir) = capture_dir.filter(|d| d.is_dir()) else {
        return Ok(report);
    };
    let entries =
        fs::read_dir(dir).map_err(|e| Poct1Error::ResetError(format!("{}: {e}", dir.display())))?;
    for entry in entries {
        let path = entry
            .map_err(|e| Poct1Error::ResetError(format!("{}: {e}", dir.display())))?
            .path();
        if path.extension().and_then(|e| e.to_str()) == Some("xml") {
            fs::remove_file(&path)
                .map_err(|e| Poct1Error::ResetError(format!("{}: {e}", path.display())))?;
            report.captures_removed += 1;
        }
    }
    if report.captures_removed > 0 {
        log_info(&format!(
            "Deleted {} capture file(s) from {}",
            report.captures_removed,
            dir.display()
        ));
    }
    Ok(report)
}
