//! # Session State Machine
//!
//! Per-connection driver for the POCT1-A handshake. The device is the
//! sequencer: it opens the conversation, announces its status, streams
//! observation batches, and signals the end of the topic. This side
//! mirrors the exchange, acknowledging each message and asking exactly
//! once for the pending observations.
//!
//! The machine is deliberately free of I/O. `on_data` takes raw transport
//! bytes and returns the wire text to send back plus anything worth
//! archiving; the caller owns sockets, files and clocks. Closing the
//! connection, not any protocol message, is what completes a session:
//! `finish` yields everything collected, partial or not.
//!
//! ## Acknowledgment consent
//!
//! The acknowledgment type is a one-way door on the device side: data
//! acknowledged with `AA` is marked delivered in meter memory and never
//! resent, while `AR` leaves it queued for a later session. The policy is
//! therefore an explicit configuration choice, not a buried constant, and
//! it is applied to every batch as configured. The ack tells the meter
//! what to do with its copy; the readings themselves are always extracted
//! and handed to reconciliation.

use crate::payload::observation::{extract_observations, InrReading};
use crate::logging::{log_debug, log_info, log_warn};
use crate::poct1::framer::MessageFramer;
use crate::poct1::message::{
    parse_device_status, parse_hello, AckType, DeviceIdentity, MessageBuilder, MessageKind,
    RawMessage,
};

/// Where the session stands in the fixed handshake.
///
/// Phase tracking exists for observability; arrival out of phase is
/// warned about and then handled anyway, because the meter, not this
/// crate, decides the order of the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    AwaitingHello,
    AwaitingStatus,
    AwaitingData,
    Finalizing,
}

/// How observation messages are acknowledged.
///
/// Pure configuration: the type code never depends on batch content.
/// Collection is unaffected either way, the policy only decides whether
/// the meter marks its copy delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckPolicy {
    /// Answer every batch with `AA`; the device marks it permanently
    /// delivered and never resends it.
    #[default]
    Accept,
    /// Answer every batch with `AR`; the device keeps it queued and
    /// offers it again on a later connection. Suits a trial sync that
    /// must leave meter memory untouched.
    Reject,
}

impl AckPolicy {
    fn ack_type(self) -> AckType {
        match self {
            AckPolicy::Accept => AckType::Accept,
            AckPolicy::Reject => AckType::Reject,
        }
    }
}

/// Something the synchronization pipeline wants the outside world to see.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// A transport connection was accepted.
    Connected { peer: String },
    /// The hello message identified the device.
    DeviceIdentified { device: DeviceIdentity },
    /// The device reported how many observations it holds for us.
    StatusReported { total_available: u32 },
    /// The read-observations request went out.
    ObservationsRequested,
    /// More observation groups arrived.
    ProgressChanged { received: u32, total_available: u32 },
    /// The session closed and its data was merged and persisted.
    TransferFinalized {
        new_readings: usize,
        duplicates: usize,
        total_stored: usize,
    },
    /// Something went wrong; the session continues where possible.
    Error { detail: String },
}

/// Synchronous receiver for [`SyncEvent`]s.
///
/// Called inline from the synchronization path; implementations must
/// return promptly and must not re-enter the sync manager.
pub trait SyncObserver: Send + Sync {
    fn on_event(&self, event: &SyncEvent);
}

/// Default observer: writes each event to the log and nothing else.
pub struct LogObserver;

impl SyncObserver for LogObserver {
    fn on_event(&self, event: &SyncEvent) {
        match event {
            SyncEvent::Connected { peer } => log_info(&format!("Device connected from {}", peer)),
            SyncEvent::DeviceIdentified { device } => {
                log_info(&format!("Device identified: {} ({})", device.model, device.serial))
            }
            SyncEvent::StatusReported { total_available } => {
                log_info(&format!("Device reports {} new observation(s)", total_available))
            }
            SyncEvent::ObservationsRequested => log_info("Requested observation download"),
            SyncEvent::ProgressChanged {
                received,
                total_available,
            } => log_info(&format!("Transfer progress: {}/{}", received, total_available)),
            SyncEvent::TransferFinalized {
                new_readings,
                duplicates,
                total_stored,
            } => log_info(&format!(
                "Sync complete: {} new, {} duplicate(s) skipped, {} stored",
                new_readings, duplicates, total_stored
            )),
            SyncEvent::Error { detail } => log_warn(detail),
        }
    }
}

/// Result of feeding one transport chunk into the session.
#[derive(Debug, Default)]
pub struct SessionStep {
    /// Wire text to send back to the device, in order.
    pub outbound: Vec<String>,
    /// Raw observation message bodies worth archiving.
    pub captures: Vec<String>,
    /// Events for the observer, in order of occurrence.
    pub events: Vec<SyncEvent>,
}

/// Everything a closed session hands to reconciliation.
///
/// `device` is `None` when the connection closed before any hello
/// message; the stored identity is then left alone.
#[derive(Debug)]
pub struct SessionOutcome {
    pub device: Option<DeviceIdentity>,
    pub candidates: Vec<InrReading>,
    pub groups_received: u32,
    pub total_available: u32,
}

/// One device connection's worth of protocol state.
#[derive(Debug)]
pub struct DeviceSession {
    phase: SessionPhase,
    framer: MessageFramer,
    builder: MessageBuilder,
    policy: AckPolicy,
    device: Option<DeviceIdentity>,
    total_available: u32,
    groups_received: u32,
    candidates: Vec<InrReading>,
    request_sent: bool,
}

impl DeviceSession {
    pub fn new(policy: AckPolicy) -> Self {
        DeviceSession {
            phase: SessionPhase::AwaitingHello,
            framer: MessageFramer::new(),
            builder: MessageBuilder::new(),
            policy,
            device: None,
            total_available: 0,
            groups_received: 0,
            candidates: Vec::new(),
            request_sent: false,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Feeds one transport chunk through the framer and handles every
    /// message it completes. A single chunk may complete several
    /// messages; their responses come back in arrival order.
    pub fn on_data(&mut self, bytes: &[u8]) -> SessionStep {
        self.framer.push(bytes);
        let mut step = SessionStep::default();
        while let Some(message) = self.framer.next_message() {
            self.handle_message(&message, &mut step);
        }
        step
    }

    /// Consumes the session on connection close. Whatever was collected,
    /// including nothing or a partial transfer cut off mid-stream, goes
    /// to reconciliation; data is never discarded here.
    pub fn finish(self) -> SessionOutcome {
        SessionOutcome {
            device: self.device,
            candidates: self.candidates,
            groups_received: self.groups_received,
            total_available: self.total_available,
        }
    }

    fn handle_message(&mut self, message: &RawMessage, step: &mut SessionStep) {
        log_debug(&format!(
            "Handling {} message ({} bytes) in {:?}",
            message.kind,
            message.text.len(),
            self.phase
        ));
        match message.kind {
            MessageKind::Hello => self.on_hello(message, step),
            MessageKind::DeviceStatus => self.on_device_status(message, step),
            MessageKind::Observations => self.on_observations(message, step),
            MessageKind::EndOfTopic => self.on_end_of_topic(step),
            MessageKind::Escape => {
                // Advisory from the device. No acknowledgment is owed.
                log_warn("Device sent an escape message");
                step.events.push(SyncEvent::Error {
                    detail: "device escape message received".to_string(),
                });
            }
            MessageKind::Acknowledge | MessageKind::Request => {
                log_debug(&format!("Absorbed inbound {} message", message.kind));
            }
        }
    }

    fn on_hello(&mut self, message: &RawMessage, step: &mut SessionStep) {
        self.warn_if_not(SessionPhase::AwaitingHello, message.kind);
        let device = parse_hello(&message.text);
        step.events.push(SyncEvent::DeviceIdentified {
            device: device.clone(),
        });
        self.device = Some(device);
        step.outbound.push(self.builder.ack(AckType::Accept));
        self.phase = SessionPhase::AwaitingStatus;
    }

    fn on_device_status(&mut self, message: &RawMessage, step: &mut SessionStep) {
        self.warn_if_not(SessionPhase::AwaitingStatus, message.kind);
        self.total_available = parse_device_status(&message.text);
        self.phase = SessionPhase::AwaitingData;
        step.events.push(SyncEvent::StatusReported {
            total_available: self.total_available,
        });
        // Request before acknowledge: the meter starts streaming as soon
        // as it sees the request, and the ACK for the status message must
        // not race ahead of it.
        if !self.request_sent {
            step.outbound.push(self.builder.request_observations());
            self.request_sent = true;
            step.events.push(SyncEvent::ObservationsRequested);
        }
        step.outbound.push(self.builder.ack(AckType::Accept));
    }

    fn on_observations(&mut self, message: &RawMessage, step: &mut SessionStep) {
        self.warn_if_not(SessionPhase::AwaitingData, message.kind);
        // Archive the raw body before any parsing can reject it.
        step.captures.push(message.text.clone());

        let report = extract_observations(&message.text);
        let dropped = report.groups_seen as usize - report.readings.len();
        if dropped > 0 {
            log_warn(&format!("Dropped {dropped} malformed observation group(s)"));
        }
        self.groups_received += report.groups_seen;
        self.candidates.extend(report.readings);
        step.events.push(SyncEvent::ProgressChanged {
            received: self.groups_received,
            total_available: self.total_available,
        });
        step.outbound.push(self.builder.ack(self.policy.ack_type()));
    }

    fn on_end_of_topic(&mut self, step: &mut SessionStep) {
        step.outbound.push(self.builder.ack(AckType::Accept));
        self.phase = SessionPhase::Finalizing;
        log_info("Device signalled end of topic");
    }

    fn warn_if_not(&self, expected: SessionPhase, kind: MessageKind) {
        if self.phase != expected {
            log_warn(&format!(
                "{} message arrived in {:?} (expected {:?}); handling anyway",
                kind, self.phase, expected
            ));
        }
    }
}
