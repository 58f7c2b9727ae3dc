//! Protocol definitions for u-blox AT communication.
//!
//! This module contains the low-level protocol pieces:
//! - Command construction (`AT` prefix, fragments, CRLF)
//! - The response matcher that separates replies from unsolicited events
//! - Text field parsing helpers

pub mod command;
pub mod matcher;
pub mod parser;

pub use command::{AT_PREFIX, CRLF, Command, ERROR, OK};
pub use matcher::{
    CHANNEL_CLOSED_MARKER, DATA_READY_MARKER, MAX_PATTERNS, Notification, NotificationKind,
    PatternSet, ResponseMatcher, Step,
};
pub use parser::{parse_count, parse_handle, parse_int};
