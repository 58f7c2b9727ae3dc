//! Logical TCP connections multiplexed over the modem.
//!
//! A [`Channel`] starts idle and claims a slot in the channel table only
//! when [`connect`](Channel::connect) succeeds. Plain and TLS channels are
//! the same type; the security mode only changes the open sequence.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::socket::{Binding, DropQueue};
use crate::transport::Transport;
use crate::types::{ChannelState, Security};

/// One logical connection through the modem.
///
/// Created with [`Modem::channel`](crate::Modem::channel) or
/// [`Modem::secure_channel`](crate::Modem::secure_channel).
pub struct Channel<T: Transport> {
    engine: Arc<Mutex<Engine<T>>>,
    dropped: DropQueue,
    security: Security,
    binding: Option<Binding>,
}

impl<T: Transport> Channel<T> {
    pub(crate) const fn new(
        engine: Arc<Mutex<Engine<T>>>,
        dropped: DropQueue,
        security: Security,
    ) -> Self {
        Self {
            engine,
            dropped,
            security,
            binding: None,
        }
    }

    /// Security mode used when connecting.
    #[must_use]
    pub const fn security(&self) -> Security {
        self.security
    }

    /// Opens a connection to `host:port`.
    ///
    /// A previous connection held by this channel is closed first. Fails
    /// with [`Error::SlotExhausted`] before sending anything when all slots
    /// hold live connections.
    pub async fn connect(&mut self, host: &str, port: u16) -> Result<()> {
        let mut engine = self.engine.lock().await;
        if let Some(old) = self.binding.take() {
            engine.close_channel(old).await?;
        }
        engine.maintain().await?;

        tracing::debug!("connecting {:?} channel to {}:{}", self.security, host, port);
        let binding = engine.open_socket(self.security, host, port).await?;
        self.binding = Some(binding);
        engine.settle().await
    }

    /// Writes `data`, returning how many bytes the modem accepted.
    pub async fn write(&mut self, data: &[u8]) -> Result<usize> {
        let binding = self.binding.ok_or(Error::NotConnected)?;
        self.engine.lock().await.channel_write(binding, data).await
    }

    /// Reads into `buf`, returning the number of bytes delivered.
    ///
    /// Returns 0 when nothing is buffered and the modem reports nothing
    /// pending. Does not wait for data to arrive.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let Some(binding) = self.binding else {
            return Ok(0);
        };
        self.engine.lock().await.channel_read(binding, buf).await
    }

    /// Bytes readable now: buffered plus announced by the modem.
    ///
    /// With bytes already buffered no command is sent.
    pub async fn available(&mut self) -> Result<usize> {
        let Some(binding) = self.binding else {
            return Ok(0);
        };
        self.engine.lock().await.channel_available(binding).await
    }

    /// Closes the connection. Always leaves the channel closed.
    ///
    /// The binding is kept so the channel reports [`ChannelState::Closed`]
    /// rather than idle; it no longer owns a slot.
    pub async fn close(&mut self) -> Result<()> {
        if let Some(binding) = self.binding {
            self.engine.lock().await.close_channel(binding).await?;
        }
        Ok(())
    }

    /// Current lifecycle state, as last observed.
    pub async fn state(&self) -> ChannelState {
        let Some(binding) = self.binding else {
            return ChannelState::Idle;
        };
        let engine = self.engine.lock().await;
        match engine.sockets.get(binding) {
            Some(slot) if slot.connected => ChannelState::Connected,
            _ => ChannelState::Closed,
        }
    }

    /// Returns true while the connection is up, as last observed.
    pub async fn is_connected(&self) -> bool {
        self.state().await == ChannelState::Connected
    }

    /// Modem socket id of the current or last connection.
    #[must_use]
    pub fn handle(&self) -> Option<u8> {
        self.binding.map(|b| b.handle)
    }
}

impl<T: Transport> Drop for Channel<T> {
    fn drop(&mut self) {
        let Some(binding) = self.binding.take() else {
            return;
        };
        // No async close from drop: the socket is closed by the next
        // engine maintenance pass, even if the engine is busy right now.
        tracing::debug!("channel on socket {} dropped", binding.handle);
        self.dropped.push(binding);
    }
}

impl<T: Transport> std::fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("security", &self.security)
            .field("handle", &self.handle())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModemConfig;
    use crate::testing::{ECHO_HOST, MockModem, REFUSED_HOST};

    /// Reads until `want` bytes arrived or a read comes back empty.
    async fn read_all<T: Transport>(channel: &mut Channel<T>, want: usize) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = [0u8; 64];
        while out.len() < want {
            let n = channel.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_then_read_back() {
        let (modem, mock) = MockModem::start();
        let mut channel = modem.channel();
        assert_eq!(channel.state().await, ChannelState::Idle);

        channel.connect(ECHO_HOST, 7).await.unwrap();
        assert_eq!(channel.state().await, ChannelState::Connected);
        assert_eq!(channel.handle(), Some(0));

        assert_eq!(channel.write(b"hello world").await.unwrap(), 11);
        assert_eq!(read_all(&mut channel, 11).await, b"hello world");
        assert_eq!(channel.read(&mut [0u8; 8]).await.unwrap(), 0);

        let log = mock.log();
        assert!(log.contains(&"+USOCO=0,\"echo.test\",7".to_owned()));
        assert!(log.contains(&"+USOWR=0,11".to_owned()));
        assert!(log.contains(&"+USORD=0,11".to_owned()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_channels_do_not_cross_deliver() {
        let (modem, _mock) = MockModem::start();
        let mut a = modem.channel();
        let mut b = modem.channel();
        a.connect(ECHO_HOST, 1).await.unwrap();
        b.connect(ECHO_HOST, 2).await.unwrap();
        assert_eq!(a.handle(), Some(0));
        assert_eq!(b.handle(), Some(1));

        a.write(b"alpha").await.unwrap();
        b.write(b"bravo-bravo").await.unwrap();
        a.write(b"-again").await.unwrap();

        assert_eq!(read_all(&mut b, 11).await, b"bravo-bravo");
        assert_eq!(read_all(&mut a, 11).await, b"alpha-again");
    }

    #[tokio::test(start_paused = true)]
    async fn test_available_with_buffered_data_sends_nothing() {
        let config = ModemConfig::new().rx_buffer_capacity(4);
        let (modem, mock) = MockModem::start_with(config);
        let mut channel = modem.channel();
        channel.connect(ECHO_HOST, 7).await.unwrap();
        channel.write(b"0123456789").await.unwrap();

        let mut buf = [0u8; 2];
        assert_eq!(channel.read(&mut buf).await.unwrap(), 2);
        assert_eq!(&buf, b"01");

        mock.clear_log();
        assert_eq!(channel.available().await.unwrap(), 8);
        assert!(mock.log().is_empty());

        assert_eq!(read_all(&mut channel, 8).await, b"23456789");
    }

    #[tokio::test(start_paused = true)]
    async fn test_available_polls_when_buffer_empty() {
        let (modem, mock) = MockModem::start();
        let mut channel = modem.channel();
        channel.connect(ECHO_HOST, 7).await.unwrap();
        channel.write(b"abc").await.unwrap();

        mock.clear_log();
        assert_eq!(channel.available().await.unwrap(), 3);
        assert!(mock.log().contains(&"+USORD=0,0".to_owned()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_close_during_unrelated_command() {
        let (modem, mock) = MockModem::start();
        let mut channel = modem.channel();
        channel.connect(ECHO_HOST, 7).await.unwrap();

        mock.queue_urc("\r\n+UUSOCL: 0\r\n");
        let quality = modem.signal_quality().await.unwrap();
        assert_eq!(quality.rssi, 17);

        assert_eq!(channel.state().await, ChannelState::Closed);
        assert_eq!(channel.available().await.unwrap(), 0);
        assert!(matches!(
            channel.write(b"x").await,
            Err(Error::NotConnected)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_query_detects_silent_teardown() {
        let (modem, mock) = MockModem::start();
        let mut channel = modem.channel();
        channel.connect(ECHO_HOST, 7).await.unwrap();

        mock.drop_peer(0);
        assert_eq!(channel.available().await.unwrap(), 0);
        assert!(mock.log().contains(&"+USOCTL=0,10".to_owned()));
        assert!(!channel.is_connected().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refused_connect_releases_socket() {
        let (modem, mock) = MockModem::start();
        let mut channel = modem.channel();

        let err = channel.connect(REFUSED_HOST, 80).await.unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
        assert_eq!(channel.state().await, ChannelState::Idle);
        assert!(mock.log().contains(&"+USOCL=0".to_owned()));
        assert!(!mock.socket_open(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_secure_channel_enables_tls() {
        let (modem, mock) = MockModem::start();
        let mut channel = modem.secure_channel();
        assert_eq!(channel.security(), Security::Tls);

        channel.connect(ECHO_HOST, 443).await.unwrap();
        assert!(mock.log().contains(&"+USOSEC=0,1".to_owned()));
        assert!(mock.socket_secure(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slot_exhaustion_sends_nothing() {
        let (modem, mock) = MockModem::start();
        let mut channels = Vec::new();
        for port in 0..5 {
            let mut channel = modem.channel();
            channel.connect(ECHO_HOST, port).await.unwrap();
            channels.push(channel);
        }

        mock.clear_log();
        let mut extra = modem.channel();
        let err = extra.connect(ECHO_HOST, 9).await.unwrap_err();
        assert!(matches!(err, Error::SlotExhausted));
        assert!(!mock.log().iter().any(|c| c.starts_with("+USOCR")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reused_slot_makes_old_channel_stale() {
        let (modem, mock) = MockModem::start();
        let mut old = modem.channel();
        old.connect(ECHO_HOST, 1).await.unwrap();

        mock.remote_close(0).await;
        let mut new = modem.channel();
        new.connect(ECHO_HOST, 2).await.unwrap();
        assert_eq!(new.handle(), Some(0));

        assert_eq!(old.state().await, ChannelState::Closed);
        assert!(matches!(old.write(b"x").await, Err(Error::NotConnected)));

        new.write(b"mine").await.unwrap();
        assert_eq!(old.read(&mut [0u8; 8]).await.unwrap(), 0);
        assert_eq!(read_all(&mut new, 4).await, b"mine");

        // Closing the stale channel must not touch the new owner.
        mock.clear_log();
        old.close().await.unwrap();
        assert!(mock.log().is_empty());
        assert!(new.is_connected().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close() {
        let (modem, mock) = MockModem::start();
        let mut channel = modem.channel();
        channel.connect(ECHO_HOST, 7).await.unwrap();

        channel.close().await.unwrap();
        assert_eq!(channel.state().await, ChannelState::Closed);
        assert!(mock.log().contains(&"+USOCL=0".to_owned()));
        assert!(!mock.socket_open(0));
        assert!(matches!(channel.write(b"x").await, Err(Error::NotConnected)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_channel_is_closed_on_next_connect() {
        let (modem, mock) = MockModem::start();
        {
            let mut channel = modem.channel();
            channel.connect(ECHO_HOST, 7).await.unwrap();
        }

        mock.clear_log();
        let mut channel = modem.channel();
        channel.connect(ECHO_HOST, 8).await.unwrap();
        assert_eq!(channel.handle(), Some(0));

        let log = mock.log();
        assert_eq!(log.first().map(String::as_str), Some("+USOCL=0"));
        assert!(log.contains(&"+USOCR=6".to_owned()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_acceptance_stops_write() {
        let (modem, mock) = MockModem::start();
        mock.limit_accept(3);
        let mut channel = modem.channel();
        channel.connect(ECHO_HOST, 7).await.unwrap();

        assert_eq!(channel.write(b"abcdef").await.unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_large_write_is_chunked() {
        let (modem, mock) = MockModem::start();
        let mut channel = modem.channel();
        channel.connect(ECHO_HOST, 7).await.unwrap();

        let data: Vec<u8> = (0..2500u32).map(|i| b'a' + (i % 26) as u8).collect();
        assert_eq!(channel.write(&data).await.unwrap(), 2500);

        let writes: Vec<_> = mock
            .log()
            .into_iter()
            .filter(|c| c.starts_with("+USOWR"))
            .collect();
        assert_eq!(writes, ["+USOWR=0,1024", "+USOWR=0,1024", "+USOWR=0,452"]);
        assert_eq!(read_all(&mut channel, 2500).await, data);
    }

    #[tokio::test]
    async fn test_idle_channel() {
        let (modem, _mock) = MockModem::start();
        let mut channel = modem.channel();
        assert!(matches!(channel.write(b"x").await, Err(Error::NotConnected)));
        assert_eq!(channel.read(&mut [0u8; 4]).await.unwrap(), 0);
        assert_eq!(channel.available().await.unwrap(), 0);
        channel.close().await.unwrap();
        assert_eq!(channel.handle(), None);
    }
}
