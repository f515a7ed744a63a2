//! Broker-facing side of the node: topic naming, payload encoding, the
//! transport seam and the connectivity gate.

pub mod broker;
pub mod gate;
pub mod topics;

pub use broker::Broker;
pub use gate::{GateStatus, PublishGate, ReconnectPolicy, publish_reading};
pub use topics::{Payload, TopicError, TopicSet, format_payload};
