//! # ublox-at
//!
//! An async AT command engine for u-blox cellular modems that multiplexes
//! up to five TCP (or TLS) connections over one serial link.
//!
//! ## Features
//!
//! - Async/await based API using Tokio
//! - Response matching that separates command replies from unsolicited
//!   socket notifications arriving on the same byte stream
//! - Per-connection receive buffers fed on demand from the modem
//! - Modem-wide status queries and packet data setup
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use ublox_at::Modem;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ublox_at::Error> {
//!     let modem = Modem::serial("/dev/ttyACM0").await?;
//!     modem.init(Some("1234")).await?;
//!     modem.wait_for_network(Duration::from_secs(60)).await?;
//!     modem.gprs_connect("internet", "", "").await?;
//!
//!     let mut channel = modem.channel();
//!     channel.connect("example.com", 80).await?;
//!     channel.write(b"GET / HTTP/1.0\r\n\r\n").await?;
//!
//!     let mut buf = [0u8; 256];
//!     let n = channel.read(&mut buf).await?;
//!     println!("{}", String::from_utf8_lossy(&buf[..n]));
//!
//!     channel.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`protocol`] - Command construction, response matching, field parsing
//! - [`transport`] - Byte stream abstraction and the serial implementation
//! - [`buffer`] - Fixed-capacity receive ring buffer
//! - [`commands`] - Modem and socket command handlers
//! - [`modem`] - High-level [`Modem`] handle
//! - [`channel`] - Logical connections ([`Channel`])
//! - [`types`] - Status and state types

pub mod buffer;
pub mod channel;
pub mod commands;
pub mod config;
pub(crate) mod engine;
pub mod error;
pub mod modem;
pub mod protocol;
pub(crate) mod socket;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenience
pub use channel::Channel;
pub use commands::socket::MAX_SEND_CHUNK;
pub use config::ModemConfig;
pub use error::{Error, Result};
pub use modem::Modem;
pub use protocol::{Command, PatternSet};
pub use socket::MAX_CHANNELS;
pub use transport::{SerialConfig, SerialTransport, StreamTransport, Transport, serial::list_ports};
pub use types::{ChannelState, RegStatus, Security, SignalQuality, SimStatus};
