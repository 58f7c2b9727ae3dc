//! Modem engine configuration.

use std::time::Duration;

use crate::buffer::DEFAULT_RX_CAPACITY;

/// Default timeout for ordinary commands.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(1);

/// Default timeout for `+USOCO` (TCP/TLS connection establishment).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(75);

/// Default timeout for detaching from the packet network.
pub const DEFAULT_DISCONNECT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default deadline for reading one reply field after a match.
pub const DEFAULT_FIELD_TIMEOUT: Duration = Duration::from_secs(1);

/// Minimum settle time between the `@` prompt and the payload.
pub const DEFAULT_SEND_DELAY: Duration = Duration::from_millis(50);

/// Wait used while draining unsolicited notifications.
pub const DEFAULT_MAINTAIN_TIMEOUT: Duration = Duration::from_millis(100);

/// Default deadline for receiving a promised socket payload.
pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeouts and buffer sizing for a [`Modem`](crate::Modem).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModemConfig {
    /// Timeout for ordinary commands.
    pub command_timeout: Duration,
    /// Timeout for opening a connection to a remote host.
    pub connect_timeout: Duration,
    /// Timeout for packet data detach and context deactivation.
    pub disconnect_timeout: Duration,
    /// Deadline for reading a single reply field.
    pub field_timeout: Duration,
    /// Settle time between the send prompt and the payload.
    pub send_delay: Duration,
    /// Wait used while draining notifications.
    pub maintain_timeout: Duration,
    /// Deadline for a promised socket payload. `None` waits forever.
    pub receive_timeout: Option<Duration>,
    /// Per-channel receive buffer capacity in bytes.
    pub rx_buffer_capacity: usize,
}

impl ModemConfig {
    /// Creates a configuration with default settings.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            disconnect_timeout: DEFAULT_DISCONNECT_TIMEOUT,
            field_timeout: DEFAULT_FIELD_TIMEOUT,
            send_delay: DEFAULT_SEND_DELAY,
            maintain_timeout: DEFAULT_MAINTAIN_TIMEOUT,
            receive_timeout: Some(DEFAULT_RECEIVE_TIMEOUT),
            rx_buffer_capacity: DEFAULT_RX_CAPACITY,
        }
    }

    /// Sets the ordinary command timeout.
    #[must_use]
    pub const fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Sets the connection establishment timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the network detach timeout.
    #[must_use]
    pub const fn disconnect_timeout(mut self, timeout: Duration) -> Self {
        self.disconnect_timeout = timeout;
        self
    }

    /// Sets the per-field read deadline.
    #[must_use]
    pub const fn field_timeout(mut self, timeout: Duration) -> Self {
        self.field_timeout = timeout;
        self
    }

    /// Sets the delay between send prompt and payload.
    #[must_use]
    pub const fn send_delay(mut self, delay: Duration) -> Self {
        self.send_delay = delay;
        self
    }

    /// Sets the notification draining wait.
    #[must_use]
    pub const fn maintain_timeout(mut self, timeout: Duration) -> Self {
        self.maintain_timeout = timeout;
        self
    }

    /// Sets the payload receive deadline.
    ///
    /// `None` restores the unbounded contract: a receive blocks until the
    /// modem delivers every byte it announced.
    #[must_use]
    pub const fn receive_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.receive_timeout = timeout;
        self
    }

    /// Sets the per-channel receive buffer capacity.
    #[must_use]
    pub const fn rx_buffer_capacity(mut self, capacity: usize) -> Self {
        self.rx_buffer_capacity = capacity;
        self
    }
}

impl Default for ModemConfig {
    fn default() -> Self {
        Self::new()
    }
}
