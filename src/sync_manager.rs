//! # Sync Manager
//!
//! This module provides the SyncManager struct, the main entry point for
//! running device synchronization against the single durable reading set.
//!
//! The manager owns the set behind a mutex and is the only component that
//! merges into it: transports hand each closed session's outcome to
//! [`SyncManager::finalize_session`], which merges, persists the snapshot
//! and reports the result to the observer. Sessions themselves share no
//! state, so any number of sequential or overlapping device connections
//! reconcile safely.

use crate::analysis::range::{summarize, RangeSummary, TherapeuticRange};
use crate::constants::{DEFAULT_CAPTURES_DIR, DEFAULT_DATA_FILE};
use crate::error::Poct1Error;
use crate::logging::log_info;
use crate::payload::observation::InrReading;
use crate::poct1::session::{
    AckPolicy, DeviceSession, LogObserver, SessionOutcome, SyncEvent, SyncObserver,
};
use crate::store::reading_set::{MergeReport, ReadingSet};
use chrono::Local;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Configuration for the synchronization pipeline.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// How observation batches are acknowledged. Accepting marks data
    /// delivered on the device permanently; choose deliberately.
    pub ack_policy: AckPolicy,
    /// Path of the JSON results snapshot.
    pub data_file: PathBuf,
    /// Directory for raw observation captures; `None` disables archival.
    pub capture_dir: Option<PathBuf>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            ack_policy: AckPolicy::default(),
            data_file: PathBuf::from(DEFAULT_DATA_FILE),
            capture_dir: Some(PathBuf::from(DEFAULT_CAPTURES_DIR)),
        }
    }
}

/// Owns the reading set and runs the finalize/merge/persist pipeline.
pub struct SyncManager {
    config: SyncConfig,
    store: Mutex<ReadingSet>,
    observer: Arc<dyn SyncObserver>,
}

impl SyncManager {
    /// Creates a manager, loading the existing snapshot if one is present.
    ///
    /// Fails rather than start over when a snapshot exists but cannot be
    /// read; silently replacing unreadable clinical data would lose it.
    pub fn new(config: SyncConfig) -> Result<Self, Poct1Error> {
        let store = ReadingSet::load(&config.data_file)?;
        Ok(SyncManager {
            config,
            store: Mutex::new(store),
            observer: Arc::new(LogObserver),
        })
    }

    /// Replaces the default log-only observer.
    pub fn with_observer(mut self, observer: Arc<dyn SyncObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Delivers one event to the observer.
    pub fn notify(&self, event: &SyncEvent) {
        self.observer.on_event(event);
    }

    /// Starts a session for a freshly accepted connection.
    pub fn open_session(&self) -> DeviceSession {
        DeviceSession::new(self.config.ack_policy)
    }

    /// Merges a closed session's collected data and persists the snapshot.
    ///
    /// This is the sole merge path. The merge itself cannot fail; a failed
    /// snapshot write is surfaced as an error and reported to the observer,
    /// and the merged data stays in memory for the next successful write.
    pub fn finalize_session(&self, outcome: SessionOutcome) -> Result<MergeReport, Poct1Error> {
        let SessionOutcome {
            device,
            candidates,
            groups_received,
            total_available,
        } = outcome;
        log_info(&format!(
            "Finalizing session: {} candidate reading(s) from {}/{} group(s)",
            candidates.len(),
            groups_received,
            total_available
        ));

        let (report, saved) = {
            let mut store = self.store.lock().unwrap();
            let report = store.merge(device, candidates, Local::now().fixed_offset());
            let saved = store.save(&self.config.data_file);
            (report, saved)
        };

        if let Err(error) = saved {
            self.notify(&SyncEvent::Error {
                detail: format!("results snapshot not written: {error}"),
            });
            return Err(error);
        }

        self.notify(&SyncEvent::TransferFinalized {
            new_readings: report.new_readings,
            duplicates: report.duplicates,
            total_stored: report.total_stored,
        });
        Ok(report)
    }

    /// Copy of the current readings, ascending by timestamp.
    pub fn readings(&self) -> Vec<InrReading> {
        self.store.lock().unwrap().readings().to_vec()
    }

    /// Copy of the whole reconciled set.
    pub fn snapshot(&self) -> ReadingSet {
        self.store.lock().unwrap().clone()
    }

    /// Metrics over the current readings for a target range.
    pub fn range_summary(&self, range: TherapeuticRange) -> RangeSummary {
        summarize(self.store.lock().unwrap().readings(), range)
    }
}
