//! # POCT1-A Message Codec
//!
//! This module provides the message vocabulary of the device conversation:
//! the tagged message kinds recognized on the wire, typed decoding of
//! inbound payloads, and the builders for the two outbound message shapes
//! (acknowledgment and observation request).
//!
//! Inbound payloads are walked once with `quick-xml` and dispatched as a
//! tagged variant; fields are never re-scanned per access. The dialect is
//! XML-like with every value carried in a `V` attribute:
//!
//! ```text
//! <HEL.R01>
//!    <HDR>
//!        <HDR.control_id V="1"/>
//!    </HDR>
//!    <DEV>
//!        <DEV.serial_id V="PT2-00412"/>
//!    </DEV>
//! </HEL.R01>
//! ```
//!
//! Decoding is deliberately tolerant: unknown elements are skipped,
//! malformed attributes are ignored, and missing fields fall back to
//! defaults. A meter in the field is the sender; rejecting its quirks
//! would lose clinical data.

use crate::constants::{
    ACK_TYPE_ACCEPT, ACK_TYPE_REJECT, CONTROL_ID_SEED, DEFAULT_DEVICE_MODEL,
    DEFAULT_DEVICE_SERIAL, PROTOCOL_VERSION, REQUEST_READ_OBSERVATIONS, TAG_ACKNOWLEDGE,
    TAG_DEVICE_STATUS, TAG_END_OF_TOPIC, TAG_ESCAPE, TAG_HELLO, TAG_OBSERVATIONS, TAG_REQUEST,
    WIRE_DTTM_FORMAT,
};
use chrono::Local;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::{Deserialize, Serialize};

/// Discriminant tag of a framed protocol message.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum MessageKind {
    /// Device hello (`HEL.R01`), opens the conversation
    Hello,
    /// Device status report (`DST.R01`), carries the pending-data count
    DeviceStatus,
    /// Observation batch (`OBS.R01`)
    Observations,
    /// Acknowledgment (`ACK.R01`)
    Acknowledge,
    /// Request (`REQ.R01`)
    Request,
    /// End of topic (`EOT.R01`), closes the transfer
    EndOfTopic,
    /// Escape/error (`ESC.R01`), advisory
    Escape,
}

impl MessageKind {
    /// Every kind the framer watches for, in dispatch order.
    pub const ALL: [MessageKind; 7] = [
        MessageKind::Hello,
        MessageKind::DeviceStatus,
        MessageKind::Observations,
        MessageKind::Acknowledge,
        MessageKind::Request,
        MessageKind::EndOfTopic,
        MessageKind::Escape,
    ];

    /// The wire topic tag, without angle brackets.
    pub fn wire_tag(&self) -> &'static str {
        match self {
            MessageKind::Hello => TAG_HELLO,
            MessageKind::DeviceStatus => TAG_DEVICE_STATUS,
            MessageKind::Observations => TAG_OBSERVATIONS,
            MessageKind::Acknowledge => TAG_ACKNOWLEDGE,
            MessageKind::Request => TAG_REQUEST,
            MessageKind::EndOfTopic => TAG_END_OF_TOPIC,
            MessageKind::Escape => TAG_ESCAPE,
        }
    }

    /// Opening marker as it appears on the wire.
    pub fn start_marker(&self) -> String {
        format!("<{}>", self.wire_tag())
    }

    /// Closing marker as it appears on the wire.
    pub fn end_marker(&self) -> String {
        format!("</{}>", self.wire_tag())
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire_tag())
    }
}

/// One complete framed message: discriminant tag plus the full text block.
///
/// Created by the framer when an end marker is matched, consumed
/// immediately by the session state machine, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub kind: MessageKind,
    pub text: String,
}

/// Device identity captured from the hello message.
///
/// Snapshots written by earlier tooling before any hello carry an empty
/// device object; missing fields fall back to the same placeholders used
/// when a hello omits them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceIdentity {
    pub serial: String,
    pub model: String,
}

impl Default for DeviceIdentity {
    fn default() -> Self {
        DeviceIdentity {
            serial: DEFAULT_DEVICE_SERIAL.to_string(),
            model: DEFAULT_DEVICE_MODEL.to_string(),
        }
    }
}

/// Header fields shared by every message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageHeader {
    pub control_id: Option<u32>,
    pub creation_dttm: Option<String>,
}

/// Acknowledgment type: accept marks transmitted data as permanently
/// delivered on the device; reject leaves it pending for a future session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckType {
    Accept,
    Reject,
}

impl AckType {
    pub fn type_cd(&self) -> &'static str {
        match self {
            AckType::Accept => ACK_TYPE_ACCEPT,
            AckType::Reject => ACK_TYPE_REJECT,
        }
    }
}

/// Builds outbound messages for one session.
///
/// Carries the per-session control-id counter: seeded at 20000 and
/// incremented before each send, so correlating acknowledgments is a
/// matter of comparing strictly increasing ids.
#[derive(Debug)]
pub struct MessageBuilder {
    control_id: u32,
}

impl MessageBuilder {
    pub fn new() -> Self {
        MessageBuilder {
            control_id: CONTROL_ID_SEED,
        }
    }

    /// The id the next outbound message will carry.
    pub fn peek_control_id(&self) -> u32 {
        self.control_id + 1
    }

    fn next_control_id(&mut self) -> u32 {
        self.control_id += 1;
        self.control_id
    }

    fn header(&mut self) -> String {
        format!(
            "   <HDR>\n       <HDR.control_id V=\"{}\"/>\n       <HDR.version_id V=\"{}\"/>\n       <HDR.creation_dttm V=\"{}\"/>\n   </HDR>",
            self.next_control_id(),
            PROTOCOL_VERSION,
            wire_timestamp(),
        )
    }

    /// Builds an `ACK.R01` with the given consent type.
    pub fn ack(&mut self, ack_type: AckType) -> String {
        format!(
            "<{tag}>\n{header}\n   <ACK>\n       <ACK.type_cd V=\"{cd}\"/>\n   </ACK>\n</{tag}>\n",
            tag = TAG_ACKNOWLEDGE,
            header = self.header(),
            cd = ack_type.type_cd(),
        )
    }

    /// Builds a `REQ.R01` asking the device to send its stored observations.
    pub fn request_observations(&mut self) -> String {
        format!(
            "<{tag}>\n{header}\n   <REQ>\n       <REQ.request_cd V=\"{cd}\"/>\n   </REQ>\n</{tag}>\n",
            tag = TAG_REQUEST,
            header = self.header(),
            cd = REQUEST_READ_OBSERVATIONS,
        )
    }
}

impl Default for MessageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Header creation timestamp in the offset format the meter expects,
/// e.g. `2026-08-22T09:15:00-05:00`.
pub fn wire_timestamp() -> String {
    Local::now().format(WIRE_DTTM_FORMAT).to_string()
}

/// Extracts the device identity from a hello payload.
///
/// Missing fields fall back to the defaults rather than failing the
/// handshake.
pub fn parse_hello(text: &str) -> DeviceIdentity {
    let values = element_values(text);
    DeviceIdentity {
        serial: find_value(&values, "DEV.serial_id")
            .unwrap_or_else(|| DEFAULT_DEVICE_SERIAL.to_string()),
        model: find_value(&values, "DEV.model_id")
            .unwrap_or_else(|| DEFAULT_DEVICE_MODEL.to_string()),
    }
}

/// Extracts the total-available observation count from a device status
/// payload. A missing or unparseable count reads as zero.
pub fn parse_device_status(text: &str) -> u32 {
    let values = element_values(text);
    find_value(&values, "new_observations_qty")
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(0)
}

/// Extracts the header block fields common to every message kind.
pub fn parse_header(text: &str) -> MessageHeader {
    let values = element_values(text);
    MessageHeader {
        control_id: find_value(&values, "HDR.control_id").and_then(|v| v.parse::<u32>().ok()),
        creation_dttm: find_value(&values, "HDR.creation_dttm"),
    }
}

/// Walks a message payload once and collects every `(element name, V
/// attribute)` pair in document order.
///
/// Malformed markup past a valid prefix yields the prefix; an advisory
/// message that cannot be fully parsed is still worth the fields it
/// carried.
pub(crate) fn element_values(text: &str) -> Vec<(String, String)> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut values = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(element)) | Ok(Event::Empty(element)) => {
                let name = String::from_utf8_lossy(element.name().as_ref()).into_owned();
                if let Some(value) = v_attribute(&element) {
                    values.push((name, value));
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                crate::logging::log_debug(&format!("message walk stopped early: {e}"));
                break;
            }
        }
        buf.clear();
    }

    values
}

/// Reads the `V` attribute of an element, unescaping entity references.
pub(crate) fn v_attribute(element: &BytesStart<'_>) -> Option<String> {
    for attr in element.attributes().with_checks(false).flatten() {
        if attr.key.as_ref() == b"V" {
            return match attr.unescape_value() {
                Ok(value) => Some(value.into_owned()),
                Err(_) => Some(String::from_utf8_lossy(attr.value.as_ref()).into_owned()),
            };
        }
    }
    None
}

/// First value whose element name matches `key` exactly or ends with it.
///
/// The meter's nesting prefix varies between firmware revisions; matching
/// on the trailing name component keeps the decode stable.
pub(crate) fn find_value(values: &[(String, String)], key: &str) -> Option<String> {
    values
        .iter()
        .find(|(name, _)| name == key || name.ends_with(key))
        .map(|(_, value)| value.clone())
}
