//! # Observation Extractor
//!
//! Turns the body of one observations message into structured clinical
//! readings. A body carries zero or more `<SVC>` service groups; each
//! group is one test event with its timestamp, status code and a pair of
//! measured values identified by LOINC code:
//!
//! ```text
//! <SVC>
//!    <SVC.observation_dttm V="2024-01-15T10:30:00-05:00"/>
//!    <SVC.status_cd V="N"/>
//!    <OBS>
//!        <OBS.observation_id V="34714-6"/>
//!        <OBS.value V="2.4"/>
//!    </OBS>
//!    <OBS>
//!        <OBS.observation_id V="5902-2"/>
//!        <OBS.value V="28.1"/>
//!    </OBS>
//! </SVC>
//! ```
//!
//! Extraction is tolerant per group and strict per field: unknown
//! elements are skipped, but a group missing its timestamp or either
//! value is dropped whole. Dropped groups still count toward transfer
//! progress, because the meter counts them on its side too.

use crate::constants::{LOINC_INR, LOINC_PT_SECONDS};
use crate::logging::log_debug;
use crate::poct1::message::v_attribute;
use chrono::{DateTime, FixedOffset};
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::{Deserialize, Serialize};

/// Clinical status flag attached to a reading by the device.
///
/// Serialized through the device code vocabulary, so snapshots written by
/// earlier tooling (`"N"`, `"H"`, ...) load unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ReadingStatus {
    #[default]
    Normal,
    High,
    Low,
    Error,
}

impl ReadingStatus {
    /// Maps a device status code to a status. Short codes and long forms
    /// are accepted case-insensitively; anything unrecognized reads as
    /// normal, matching the meter's own default flag.
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_ascii_uppercase().as_str() {
            "H" | "HIGH" => ReadingStatus::High,
            "L" | "LOW" => ReadingStatus::Low,
            "E" | "ERR" | "ERROR" => ReadingStatus::Error,
            _ => ReadingStatus::Normal,
        }
    }

    /// The single-letter device code for this status.
    pub fn code(&self) -> &'static str {
        match self {
            ReadingStatus::Normal => "N",
            ReadingStatus::High => "H",
            ReadingStatus::Low => "L",
            ReadingStatus::Error => "E",
        }
    }
}

impl From<String> for ReadingStatus {
    fn from(code: String) -> Self {
        ReadingStatus::from_code(&code)
    }
}

impl From<ReadingStatus> for String {
    fn from(status: ReadingStatus) -> Self {
        status.code().to_string()
    }
}

impl std::fmt::Display for ReadingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ReadingStatus::Normal => "Normal",
            ReadingStatus::High => "High",
            ReadingStatus::Low => "Low",
            ReadingStatus::Error => "Error",
        };
        f.write_str(name)
    }
}

/// One PT/INR test result.
///
/// The observation timestamp is the identity: two readings with the same
/// `observed_at` are the same clinical event no matter what sequence
/// number any session reported. `sequence` is a display rank reassigned
/// by the store on every merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InrReading {
    /// Stable identifier: the normalized RFC 3339 render of `observed_at`.
    /// Absent from snapshots written by earlier tooling; regenerated on load.
    #[serde(default)]
    pub id: String,
    #[serde(rename = "timestamp")]
    pub observed_at: DateTime<FixedOffset>,
    pub inr: f64,
    pub pt_seconds: f64,
    #[serde(default)]
    pub status: ReadingStatus,
    /// 1-based rank in timestamp order; assigned by the store. Earlier
    /// tooling omitted it for readings without a device sequence number,
    /// so loads tolerate its absence and the store reassigns it anyway.
    #[serde(default)]
    pub sequence: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reagent_lot: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    /// Earlier tooling wrote this key in the plural.
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "notes")]
    pub note: Option<String>,
}

/// What one observations message body yielded.
///
/// `groups_seen` counts every `<SVC>` group encountered, malformed ones
/// included; `readings` holds only the groups that decoded cleanly. The
/// difference is the malformed count.
#[derive(Debug, Default)]
pub struct ExtractionReport {
    pub readings: Vec<InrReading>,
    pub groups_seen: u32,
}

/// Fields accumulated while walking one `<SVC>` group.
#[derive(Default)]
struct GroupFields {
    observed_at: Option<String>,
    status: Option<String>,
    current_code: Option<String>,
    inr: Option<f64>,
    pt_seconds: Option<f64>,
    reagent_lot: Option<String>,
    patient_id: Option<String>,
    note: Option<String>,
}

impl GroupFields {
    fn absorb(&mut self, name: &str, value: Option<String>) {
        let Some(value) = value else { return };
        match name {
            "SVC.observation_dttm" => self.observed_at = Some(value),
            "SVC.status_cd" => self.status = Some(value),
            "OBS.observation_id" => self.current_code = Some(value),
            // A value binds to the most recent observation id; a value
            // with no preceding id has no meaning and is skipped.
            "OBS.value" => match self.current_code.as_deref() {
                Some(LOINC_INR) => self.inr = parse_positive(&value),
                Some(LOINC_PT_SECONDS) => self.pt_seconds = parse_positive(&value),
                _ => {}
            },
            "RGT.lot_number" => self.reagent_lot = Some(value),
            "PT.patient_id" => self.patient_id = Some(value),
            "NTE.text" => self.note = Some(value),
            _ => {}
        }
    }

    fn into_reading(self) -> Option<InrReading> {
        let raw = self.observed_at?;
        let observed_at = parse_observation_dttm(&raw)?;
        let inr = self.inr?;
        let pt_seconds = self.pt_seconds?;
        Some(InrReading {
            id: observed_at.to_rfc3339(),
            observed_at,
            inr,
            pt_seconds,
            status: ReadingStatus::from_code(self.status.as_deref().unwrap_or("N")),
            sequence: 0,
            reagent_lot: self.reagent_lot,
            patient_id: self.patient_id,
            note: self.note,
        })
    }
}

/// Extracts every service group from an observations message body.
///
/// Never fails: a body that will not parse at all simply yields whatever
/// groups completed before the walk stopped.
pub fn extract_observations(text: &str) -> ExtractionReport {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut report = ExtractionReport::default();
    let mut group: Option<GroupFields> = None;
    let mut svc_depth = 0usize;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(element)) => {
                let name = String::from_utf8_lossy(element.name().as_ref()).into_owned();
                if name == "SVC" {
                    if svc_depth == 0 {
                        report.groups_seen += 1;
                        group = Some(GroupFields::default());
                    }
                    svc_depth += 1;
                } else if let Some(fields) = group.as_mut() {
                    fields.absorb(&name, v_attribute(&element));
                }
            }
            Ok(Event::Empty(element)) => {
                let name = String::from_utf8_lossy(element.name().as_ref()).into_owned();
                if name == "SVC" {
                    // Self-closed group: counted, nothing to extract.
                    report.groups_seen += 1;
                } else if let Some(fields) = group.as_mut() {
                    fields.absorb(&name, v_attribute(&element));
                }
            }
            Ok(Event::End(element)) => {
                if element.name().as_ref() == b"SVC" && svc_depth > 0 {
                    svc_depth -= 1;
                    if svc_depth == 0 {
                        if let Some(reading) = group.take().and_then(GroupFields::into_reading) {
                            report.readings.push(reading);
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                log_debug(&format!("observation walk stopped early: {e}"));
                break;
            }
        }
        buf.clear();
    }

    report
}

/// Parses the device's observation timestamp, offset required.
fn parse_observation_dttm(raw: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .or_else(|_| DateTime::parse_from_str(raw.trim(), "%Y-%m-%dT%H:%M:%S%z"))
        .ok()
}

fn parse_positive(value: &str) -> Option<f64> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v > 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_normalize() {
        assert_eq!(ReadingStatus::from_code("N"), ReadingStatus::Normal);
        assert_eq!(ReadingStatus::from_code("high"), ReadingStatus::High);
        assert_eq!(ReadingStatus::from_code("L"), ReadingStatus::Low);
        assert_eq!(ReadingStatus::from_code("ERR"), ReadingStatus::Error);
        assert_eq!(ReadingStatus::from_code("??"), ReadingStatus::Normal);
    }

    #[test]
    fn status_round_trips_through_device_code() {
        for status in [
            ReadingStatus::Normal,
            ReadingStatus::High,
            ReadingStatus::Low,
            ReadingStatus::Error,
        ] {
            assert_eq!(ReadingStatus::from_code(status.code()), status);
        }
    }

    #[test]
    fn timestamp_accepts_rfc3339_and_compact_offsets() {
        assert!(parse_observation_dttm("2024-01-15T10:30:00-05:00").is_some());
        assert!(parse_observation_dttm("2024-01-15T10:30:00-0500").is_some());
        assert!(parse_observation_dttm("2024-01-15T10:30:00").is_none());
        assert!(parse_observation_dttm("not a date").is_none());
    }

    #[test]
    fn positive_values_only() {
        assert_eq!(parse_positive("2.4"), Some(2.4));
        assert_eq!(parse_positive(" 28.1 "), Some(28.1));
        assert_eq!(parse_positive("0"), None);
        assert_eq!(parse_positive("-1.2"), None);
        assert_eq!(parse_positive("NaN"), None);
        assert_eq!(parse_positive("x"), None);
    }
}
