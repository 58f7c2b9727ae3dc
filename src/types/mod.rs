//! Data types shared across the library:
//! - SIM and network registration status
//! - Channel security and lifecycle state

pub mod channel;
pub mod network;

pub use channel::{ChannelState, Security};
pub use network::{RegStatus, SignalQuality, SimStatus};
