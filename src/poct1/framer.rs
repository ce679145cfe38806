//! # Message Framer
//!
//! Slices an unbounded, arbitrarily-chunked device byte stream into
//! complete POCT1-A messages. The meter writes whole `<TAG>...</TAG>`
//! blocks, but the transport hands them to us in whatever chunks the
//! stack produces: a message may arrive byte by byte, or several messages
//! may arrive in one read.
//!
//! ## Contract
//!
//! - Bytes are appended after lossy UTF-8 decode; the buffer only ever
//!   grows until a complete message is cut out of it.
//! - Every message kind is checked independently on each drain; no kind
//!   is matched by prefix ambiguity.
//! - A single append may complete several messages; `drain_messages`
//!   yields all of them, in buffer order.
//! - Consuming a message removes exactly its `<TAG>...</TAG>` span. Text
//!   before and after the span is preserved untouched for later matches.
//! - A message whose end marker never arrives accumulates indefinitely.
//!   That is a documented property of the protocol position we are in
//!   (the device is the sender; the session has no timeout of its own),
//!   not a crash. Callers wanting a ceiling enforce it at the transport.
//!
//! ## Usage
//!
//! ```rust
//! use poct1_rs::poct1::framer::MessageFramer;
//!
//! let mut framer = MessageFramer::new();
//! framer.push(b"<EOT.R01>");
//! assert!(framer.drain_messages().is_empty());
//! framer.push(b"</EOT.R01>");
//! assert_eq!(framer.drain_messages().len(), 1);
//! ```

use crate::poct1::message::{MessageKind, RawMessage};

/// Start/end marker pair watched for one message kind.
#[derive(Debug, Clone)]
struct FramingRule {
    kind: MessageKind,
    start: String,
    end: String,
}

/// Incremental framer over the device's text stream.
#[derive(Debug)]
pub struct MessageFramer {
    buffer: String,
    rules: Vec<FramingRule>,
}

impl MessageFramer {
    /// Creates a framer watching every POCT1-A message kind.
    pub fn new() -> Self {
        let rules = MessageKind::ALL
            .iter()
            .map(|kind| FramingRule {
                kind: *kind,
                start: kind.start_marker(),
                end: kind.end_marker(),
            })
            .collect();
        MessageFramer {
            buffer: String::new(),
            rules,
        }
    }

    /// Appends raw bytes from the transport.
    ///
    /// Invalid UTF-8 sequences are replaced, matching the tolerant decode
    /// the meter's half-duplex link has always been given.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));
    }

    /// Appends already-decoded text.
    pub fn push_str(&mut self, text: &str) {
        self.buffer.push_str(text);
    }

    /// Cuts out and returns every complete message currently in the
    /// buffer, in buffer order. Partial trailing data stays buffered.
    pub fn drain_messages(&mut self) -> Vec<RawMessage> {
        let mut messages = Vec::new();
        while let Some(message) = self.next_message() {
            messages.push(message);
        }
        messages
    }

    /// Cuts out the earliest complete message, if any.
    pub fn next_message(&mut self) -> Option<RawMessage> {
        let mut earliest: Option<(usize, usize, MessageKind)> = None;

        for rule in &self.rules {
            let Some(start) = self.buffer.find(&rule.start) else {
                continue;
            };
            let Some(end_rel) = self.buffer[start..].find(&rule.end) else {
                continue;
            };
            let end = start + end_rel + rule.end.len();
            match earliest {
                Some((best_start, _, _)) if best_start <= start => {}
                _ => earliest = Some((start, end, rule.kind)),
            }
        }

        let (start, end, kind) = earliest?;
        let text = self.buffer[start..end].to_string();
        self.buffer.replace_range(start..end, "");
        Some(RawMessage { kind, text })
    }

    /// Number of buffered characters not yet part of a complete message.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// True when nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl Default for MessageFramer {
    fn default() -> Self {
        Self::new()
    }
}
