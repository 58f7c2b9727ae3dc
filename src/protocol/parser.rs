//! Text field parsing for modem replies.
//!
//! Replies are comma separated decimal ASCII with optional quoted strings.
//! Number parsing is lenient: leading whitespace is skipped and parsing stops
//! at the first non-digit, so `" 3\r"` and `"12,\"abc\""` both yield a value.

use crate::error::{Error, Result};
use crate::types::{RegStatus, SimStatus};

/// Parses the leading decimal integer of a field.
///
/// Returns `None` if no digit follows the optional whitespace and sign.
#[must_use]
pub fn parse_int(field: &str) -> Option<i64> {
    let s = field.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let end = digits
        .bytes()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    let value: i64 = digits[..end].parse().ok()?;
    Some(if negative { -value } else { value })
}

/// Parses a non-negative count field (byte counts, lengths).
pub fn parse_count(field: &str) -> Result<usize> {
    parse_int(field)
        .and_then(|v| usize::try_from(v).ok())
        .ok_or_else(|| Error::protocol(format!("invalid count field: {:?}", field.trim())))
}

/// Parses a socket id field.
pub fn parse_handle(field: &str) -> Result<u8> {
    parse_int(field)
        .and_then(|v| u8::try_from(v).ok())
        .ok_or_else(|| Error::protocol(format!("invalid socket id: {:?}", field.trim())))
}

/// Maps the 1-based match index of the `+CPIN:` follow-up wait to a SIM status.
///
/// The wait is issued with `READY`, `SIM PIN`, `SIM PUK`, `NOT INSERTED`.
#[must_use]
pub const fn sim_status_from_match(index: Option<usize>) -> SimStatus {
    match index {
        Some(1) => SimStatus::Ready,
        Some(2 | 3) => SimStatus::Locked,
        _ => SimStatus::Error,
    }
}

/// Parses the `<stat>` field of a `+CGREG:` reply.
#[must_use]
pub fn parse_reg_status(field: &str) -> RegStatus {
    parse_int(field)
        .and_then(|v| u8::try_from(v).ok())
        .map_or(RegStatus::Unknown, RegStatus::from_code)
}
