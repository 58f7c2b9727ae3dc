//! Channel lifecycle types.

/// Transport security of a channel, consulted only when connecting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Security {
    /// Plain TCP.
    #[default]
    Plain,
    /// TLS negotiated by the modem (`+USOSEC`).
    Tls,
}

/// Observable state of a [`Channel`](crate::Channel).
///
/// `Connecting` is not listed: `connect` blocks until it reaches a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelState {
    /// Never connected.
    Idle,
    /// Socket open and connected to the remote host.
    Connected,
    /// Closed locally, by the peer, or the slot was taken over.
    Closed,
}
