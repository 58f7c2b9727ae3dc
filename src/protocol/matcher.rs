//! Response matching over the inbound byte stream.
//!
//! The modem interleaves two kinds of traffic on one line: replies to the
//! single outstanding command, and unsolicited result codes (URCs) announcing
//! socket events. [`ResponseMatcher`] consumes the stream one byte at a time
//! and resolves each byte into one of three outcomes:
//!
//! - [`Step::Matched`]: the accumulated text now ends with one of the caller's
//!   terminators; the wait is over.
//! - [`Step::Notification`]: a complete socket URC was consumed; the caller
//!   applies it and keeps waiting.
//! - [`Step::Pending`]: nothing decided yet.
//!
//! Matching is strictly suffix based and evaluated after every byte, so a
//! terminator embedded in the middle of other text never matches.

use bytes::BytesMut;

use crate::protocol::command::{ERROR, OK};
use crate::protocol::parser::parse_int;

/// Maximum number of terminators in one wait.
pub const MAX_PATTERNS: usize = 5;

/// URC prefix announcing readable data on a socket: `+UUSORD: <id>,<len>`.
pub const DATA_READY_MARKER: &str = "+UUSORD:";

/// URC prefix announcing a socket closed by the peer: `+UUSOCL: <id>`.
pub const CHANNEL_CLOSED_MARKER: &str = "+UUSOCL:";

/// Longest socket id field accepted after a URC marker.
const MAX_HANDLE_FIELD: usize = 8;

/// Accumulated text is trimmed past this length; only the tail can still match.
const MAX_TEXT: usize = 1024;

/// Tail kept after trimming.
const KEEP_TEXT: usize = 64;

/// Ordered set of up to five terminators for one command.
///
/// Position defines both the reported index (1-based) and the test order when
/// several patterns complete on the same byte. Unset positions are skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternSet<'a> {
    patterns: [Option<&'a str>; MAX_PATTERNS],
}

impl PatternSet<'static> {
    /// `OK` then `ERROR`, the terminators of nearly every command.
    pub const DEFAULT: Self = Self {
        patterns: [Some(OK), Some(ERROR), None, None, None],
    };
}

impl<'a> PatternSet<'a> {
    /// Waits for `pattern` at index 1, with `ERROR` kept at index 2.
    #[must_use]
    pub const fn expect(pattern: &'a str) -> Self {
        Self {
            patterns: [Some(pattern), Some(ERROR), None, None, None],
        }
    }

    /// Builds a set from explicit patterns, in priority order.
    ///
    /// # Panics
    ///
    /// Panics if more than [`MAX_PATTERNS`] patterns are given.
    #[must_use]
    pub fn of(patterns: &[&'a str]) -> Self {
        assert!(
            patterns.len() <= MAX_PATTERNS,
            "at most {MAX_PATTERNS} response patterns"
        );
        let mut set = [None; MAX_PATTERNS];
        for (slot, pattern) in set.iter_mut().zip(patterns) {
            *slot = Some(*pattern);
        }
        Self { patterns: set }
    }

    /// Returns the pattern at a 1-based index, if set.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&'a str> {
        index
            .checked_sub(1)
            .and_then(|i| self.patterns.get(i).copied().flatten())
    }

    /// Returns the 1-based index of the first set pattern that `text` ends with.
    #[must_use]
    pub fn match_suffix(&self, text: &[u8]) -> Option<usize> {
        self.patterns
            .iter()
            .enumerate()
            .find_map(|(i, pattern)| match pattern {
                Some(p) if !p.is_empty() && text.ends_with(p.as_bytes()) => Some(i + 1),
                _ => None,
            })
    }
}

impl Default for PatternSet<'static> {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Kind of socket URC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    /// `+UUSORD`: the socket has data waiting in the modem.
    DataReady,
    /// `+UUSOCL`: the socket was closed by the remote side or the network.
    ChannelClosed,
}

impl NotificationKind {
    /// Byte that terminates the socket id field after the marker.
    #[must_use]
    pub const fn delimiter(self) -> u8 {
        match self {
            Self::DataReady => b',',
            Self::ChannelClosed => b'\n',
        }
    }

    const fn marker(self) -> &'static str {
        match self {
            Self::DataReady => DATA_READY_MARKER,
            Self::ChannelClosed => CHANNEL_CLOSED_MARKER,
        }
    }
}

/// A decoded socket URC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Notification {
    /// What happened.
    pub kind: NotificationKind,
    /// Socket id the event refers to.
    pub handle: u8,
}

/// Outcome of feeding one byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Keep feeding.
    Pending,
    /// The pattern at this 1-based index completed.
    Matched(usize),
    /// A socket URC was consumed; the wait continues.
    Notification(Notification),
}

#[derive(Debug)]
enum State {
    /// Accumulating text and testing suffixes.
    Scanning,
    /// A URC marker was seen; collecting its socket id field.
    Handle {
        kind: NotificationKind,
        field: BytesMut,
    },
}

/// Byte-at-a-time matcher for one wait.
#[derive(Debug)]
pub struct ResponseMatcher<'a> {
    patterns: PatternSet<'a>,
    text: BytesMut,
    state: State,
}

impl<'a> ResponseMatcher<'a> {
    /// Creates a matcher with an empty accumulation buffer.
    #[must_use]
    pub fn new(patterns: PatternSet<'a>) -> Self {
        Self {
            patterns,
            text: BytesMut::with_capacity(KEEP_TEXT),
            state: State::Scanning,
        }
    }

    /// Feeds one inbound byte.
    pub fn feed(&mut self, byte: u8) -> Step {
        match &mut self.state {
            State::Scanning => self.scan(byte),
            State::Handle { kind, field } => {
                let kind = *kind;
                if byte != kind.delimiter() {
                    field.extend_from_slice(&[byte]);
                    if field.len() > MAX_HANDLE_FIELD {
                        tracing::warn!(
                            "malformed {} notification: socket id field too long",
                            kind.marker()
                        );
                        self.state = State::Scanning;
                    }
                    return Step::Pending;
                }

                let handle = std::str::from_utf8(field)
                    .ok()
                    .and_then(parse_int)
                    .and_then(|v| u8::try_from(v).ok());
                self.state = State::Scanning;
                match handle {
                    Some(handle) => Step::Notification(Notification { kind, handle }),
                    None => {
                        tracing::warn!("malformed {} notification ignored", kind.marker());
                        Step::Pending
                    }
                }
            }
        }
    }

    fn scan(&mut self, byte: u8) -> Step {
        self.text.extend_from_slice(&[byte]);

        if let Some(index) = self.patterns.match_suffix(&self.text) {
            self.text.clear();
            return Step::Matched(index);
        }

        for kind in [NotificationKind::DataReady, NotificationKind::ChannelClosed] {
            if self.text.ends_with(kind.marker().as_bytes()) {
                self.text.clear();
                self.state = State::Handle {
                    kind,
                    field: BytesMut::with_capacity(MAX_HANDLE_FIELD),
                };
                return Step::Pending;
            }
        }

        if self.text.len() > MAX_TEXT {
            let _ = self.text.split_to(self.text.len() - KEEP_TEXT);
        }
        Step::Pending
    }

    /// Returns the unmatched text left in the buffer, trimmed, if any.
    #[must_use]
    pub fn unhandled(&self) -> Option<String> {
        let text = String::from_utf8_lossy(&self.text);
        let text = text.trim();
        (!text.is_empty()).then(|| text.to_owned())
    }
}
