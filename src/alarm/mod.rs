//! Alarm subsystem: event value type, 140-byte wire codec, process-wide
//! relay.

pub mod event;
pub mod relay;
pub mod wire;

pub use event::{AlarmEvent, EventOrigin};
pub use relay::{AlarmRelay, EmitStatus, RelayConfig, RelayStats};
