//! POCT1-A Protocol Constants
//!
//! This module defines constants used in the POCT1-A device conversation,
//! following the CLSI POCT1-A message naming as emitted by Coag-Sense
//! PT/INR meters.

/// Device hello topic tag (`HEL.R01`)
pub const TAG_HELLO: &str = "HEL.R01";

/// Device status topic tag (`DST.R01`)
pub const TAG_DEVICE_STATUS: &str = "DST.R01";

/// Observations topic tag (`OBS.R01`)
pub const TAG_OBSERVATIONS: &str = "OBS.R01";

/// Acknowledgment topic tag (`ACK.R01`)
pub const TAG_ACKNOWLEDGE: &str = "ACK.R01";

/// Request topic tag (`REQ.R01`)
pub const TAG_REQUEST: &str = "REQ.R01";

/// End of topic tag (`EOT.R01`)
pub const TAG_END_OF_TOPIC: &str = "EOT.R01";

/// Escape/error topic tag (`ESC.R01`)
pub const TAG_ESCAPE: &str = "ESC.R01";

/// Protocol version token carried in every outbound header
pub const PROTOCOL_VERSION: &str = "POCT1";

/// Acknowledgment type code: application accept.
///
/// Accepting observation data tells the device to mark it as permanently
/// delivered; the device will never resend it.
pub const ACK_TYPE_ACCEPT: &str = "AA";

/// Acknowledgment type code: application reject.
///
/// Rejected observation data stays pending on the device and is offered
/// again on a future session.
pub const ACK_TYPE_REJECT: &str = "AR";

/// Request code asking the device to transmit its stored observations
pub const REQUEST_READ_OBSERVATIONS: &str = "ROBS";

/// Seed for the per-session outbound control-id counter.
///
/// The counter is incremented before each send, so the first outbound
/// message carries 20001.
pub const CONTROL_ID_SEED: u32 = 20_000;

/// Outbound header timestamp format (offset form the meter expects)
pub const WIRE_DTTM_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%:z";

/// LOINC code identifying the INR value inside an observation group
pub const LOINC_INR: &str = "34714-6";

/// LOINC code identifying the prothrombin time (seconds) value
pub const LOINC_PT_SECONDS: &str = "5902-2";

/// Model name reported when the hello message omits `DEV.model_id`
pub const DEFAULT_DEVICE_MODEL: &str = "Coag-Sense PT/INR";

/// Serial reported when the hello message omits `DEV.serial_id`
pub const DEFAULT_DEVICE_SERIAL: &str = "Unknown";

/// Default TCP port the meter connects to
pub const DEFAULT_DEVICE_PORT: u16 = 5050;

/// Default results snapshot path
pub const DEFAULT_DATA_FILE: &str = "inr_results.json";

/// Default directory for raw observation captures
pub const DEFAULT_CAPTURES_DIR: &str = "captures";

/// Read chunk size used by the TCP transport adapter
pub const READ_CHUNK_SIZE: usize = 8192;

/// Idle timeout applied by the TCP transport adapter, in seconds.
///
/// The engine itself never times out; a stalled connection is closed by
/// the adapter and finalized with whatever was collected.
pub const CONNECTION_IDLE_TIMEOUT_SECS: u64 = 120;
