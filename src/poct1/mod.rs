//! The poct1 module contains the components responsible for the core POCT1-A
//! protocol implementation, including message framing, the session state
//! machine, and the TCP transport adapter.

pub mod framer;
pub mod message;
pub mod session;
pub mod tcp;

pub use framer::MessageFramer;
pub use message::{AckType, DeviceIdentity, MessageBuilder, MessageKind, RawMessage};
pub use session::{
    AckPolicy, DeviceSession, SessionOutcome, SessionPhase, SessionStep, SyncEvent, SyncObserver,
};
pub use tcp::DeviceServer;
