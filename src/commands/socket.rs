//! Socket commands and channel data pumping.
//!
//! Wire exchanges, as issued by the methods below:
//! ```text
//! open     AT+USOCR=6            -> +USOCR: <id>          OK
//!          AT+USOSEC=<id>,1      -> OK                    (TLS only)
//!          AT+USOCO=<id>,"h",p   -> OK | ERROR            (long timeout)
//! send     AT+USOWR=<id>,<n>     -> @  <payload>  +USOWR: <id>,<n>  OK
//! receive  AT+USORD=<id>,<n>     -> +USORD: <id>,<n>,"<payload>"    OK
//! pending  AT+USORD=<id>,0       -> +USORD: <id>,<n>                OK
//! status   AT+USOCTL=<id>,10     -> +USOCTL: <id>,10,<state>        OK
//! close    AT+USOCL=<id>         -> OK
//! ```

use bytes::Bytes;
use tokio::time::Instant;

use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::protocol::command::{
    close_socket, connect_socket, create_tcp_socket, enable_secure, read_socket, socket_status,
    write_socket,
};
use crate::protocol::{PatternSet, parse_count, parse_handle, parse_int};
use crate::socket::Binding;
use crate::transport::Transport;
use crate::types::Security;

/// Largest payload accepted by one binary `+USOWR`.
pub const MAX_SEND_CHUNK: usize = 1024;

/// Send prompt in binary write mode.
const SEND_PROMPT: &str = "@";

const USOCR_REPLY: &str = "\r\n+USOCR:";
const USOWR_REPLY: &str = "\r\n+USOWR:";
const USORD_REPLY: &str = "\r\n+USORD:";
const USOCTL_REPLY: &str = "\r\n+USOCTL:";

impl<T: Transport> Engine<T> {
    /// Creates a socket, optionally enables TLS, and connects it.
    ///
    /// The returned binding owns the slot of the modem-assigned socket id.
    pub async fn open_socket(
        &mut self,
        security: Security,
        host: &str,
        port: u16,
    ) -> Result<Binding> {
        if !self.sockets.has_free_slot() {
            return Err(Error::SlotExhausted);
        }

        let timeout = self.config.command_timeout;
        self.command_reply(&create_tcp_socket(), USOCR_REPLY, timeout)
            .await?;
        let handle = parse_handle(&self.read_until(b'\n').await?)?;
        self.finish().await?;
        tracing::debug!("modem assigned socket {}", handle);

        let binding = match self.sockets.claim(handle) {
            Ok(binding) => binding,
            Err(e) => {
                self.discard_socket(handle).await?;
                return Err(e);
            }
        };

        if let Err(e) = self.establish(binding, security, host, port).await {
            self.sockets.release(binding);
            self.discard_socket(handle).await?;
            return Err(e);
        }

        if let Some(slot) = self.sockets.get_mut(binding) {
            slot.connected = true;
        }
        tracing::info!("socket {} connected to {}:{}", handle, host, port);
        Ok(binding)
    }

    async fn establish(
        &mut self,
        binding: Binding,
        security: Security,
        host: &str,
        port: u16,
    ) -> Result<()> {
        let handle = binding.handle;
        if security == Security::Tls {
            let timeout = self.config.command_timeout;
            self.command_ok(&enable_secure(handle), timeout).await?;
        }

        let timeout = self.config.connect_timeout;
        self.command_ok(&connect_socket(handle, host, port), timeout)
            .await
    }

    /// Best-effort close of a modem socket we will not track.
    async fn discard_socket(&mut self, handle: u8) -> Result<()> {
        let timeout = self.config.command_timeout;
        if let Err(e) = self.command_ok(&close_socket(handle), timeout).await {
            if matches!(e, Error::Io(_)) {
                return Err(e);
            }
            tracing::warn!("failed to discard socket {}: {}", handle, e);
        }
        Ok(())
    }

    /// Sends one payload of at most [`MAX_SEND_CHUNK`] bytes.
    ///
    /// Returns the byte count the modem accepted.
    pub async fn send_data(&mut self, binding: Binding, data: &[u8]) -> Result<usize> {
        debug_assert!(data.len() <= MAX_SEND_CHUNK);
        let handle = binding.handle;
        let timeout = self.config.command_timeout;

        self.command_reply(&write_socket(handle, data.len()), SEND_PROMPT, timeout)
            .await?;

        // The modem needs a quiet period after the prompt before payload bytes.
        tokio::time::sleep(self.config.send_delay).await;
        tracing::trace!("socket {} payload: {}", handle, hex::encode(data));
        self.transport.send(Bytes::copy_from_slice(data)).await?;
        self.transport.flush().await?;

        let outcome = self.wait(timeout, PatternSet::expect(USOWR_REPLY)).await?;
        Self::check(outcome, timeout, "socket write")?;
        self.skip_until(b',').await?;
        let accepted = parse_count(&self.read_until(b'\n').await?)?;
        self.finish().await?;

        tracing::debug!("socket {} accepted {}/{} bytes", handle, accepted, data.len());
        Ok(accepted)
    }

    /// Pulls up to `len` bytes from the modem into the slot's buffer.
    ///
    /// Returns the number of bytes the modem delivered.
    pub async fn receive(&mut self, binding: Binding, len: usize) -> Result<usize> {
        let handle = binding.handle;
        let timeout = self.config.command_timeout;

        self.command_reply(&read_socket(handle, len), USORD_REPLY, timeout)
            .await?;
        self.skip_until(b',').await?;
        let count = parse_count(&self.read_until(b',').await?)?;
        self.skip_until(b'"').await?;

        let receive_timeout = self.config.receive_timeout;
        let deadline = receive_timeout.map(|t| Instant::now() + t);
        let mut payload = Vec::with_capacity(count);
        for _ in 0..count {
            let byte = self.read_byte_by(deadline).await.map_err(|e| match e {
                Error::Timeout { .. } => Error::timeout(receive_timeout.unwrap_or_default()),
                other => other,
            })?;
            payload.push(byte);
        }

        self.skip_until(b'"').await?;
        self.finish().await?;
        tracing::trace!("socket {} received: {}", handle, hex::encode(&payload));

        if let Some(slot) = self.sockets.get_mut(binding) {
            let mut dropped = 0usize;
            for byte in &payload {
                if !slot.rx.put(*byte) {
                    dropped += 1;
                }
            }
            if dropped > 0 {
                tracing::warn!("socket {} buffer overflow, {} bytes dropped", handle, dropped);
            }
            slot.pending = slot.pending.saturating_sub(count);
        }
        Ok(count)
    }

    /// Asks the modem how many bytes are waiting on a socket.
    ///
    /// A zero count (or an ERROR reply) triggers a status query, the only way
    /// to notice a socket that went down without a close notification. On
    /// timeout the cached count is kept and returned. Updates whichever slot
    /// occupies `handle`.
    pub async fn query_pending(&mut self, handle: u8) -> Result<usize> {
        let timeout = self.config.command_timeout;

        let outcome = self
            .execute(&read_socket(handle, 0), timeout, PatternSet::expect(USORD_REPLY))
            .await?;
        let pending = match outcome {
            Some(1) => {
                self.skip_until(b',').await?;
                let pending = parse_count(&self.read_until(b'\n').await?)?;
                self.finish().await?;
                pending
            }
            Some(_) => 0,
            None => {
                let cached = self.sockets.by_handle(handle).map_or(0, |s| s.pending);
                tracing::debug!("pending query on socket {} timed out, keeping {}", handle, cached);
                return Ok(cached);
            }
        };

        let connected = if pending == 0 {
            Some(self.socket_connected(handle).await?)
        } else {
            None
        };

        if let Some(slot) = self.sockets.by_handle_mut(handle) {
            slot.pending = pending;
            if let Some(connected) = connected {
                if slot.connected && !connected {
                    tracing::debug!("socket {} found closed by status query", handle);
                }
                slot.connected = connected;
            }
        }
        tracing::trace!("socket {} pending {}", handle, pending);
        Ok(pending)
    }

    /// Queries the TCP state of a socket; any non-closed state counts as connected.
    pub async fn socket_connected(&mut self, handle: u8) -> Result<bool> {
        let timeout = self.config.command_timeout;
        let outcome = self
            .execute(&socket_status(handle), timeout, PatternSet::expect(USOCTL_REPLY))
            .await?;
        if outcome != Some(1) {
            return Ok(false);
        }
        self.skip_until(b',').await?;
        self.skip_until(b',').await?;
        let state = parse_int(&self.read_until(b'\n').await?).unwrap_or(0);
        self.finish().await?;
        Ok(state != 0)
    }

    /// Closes a socket and vacates its slot.
    ///
    /// The close command's outcome is not checked; the slot is marked
    /// disconnected either way. A stale binding sends nothing, since the
    /// socket id now belongs to another channel.
    pub async fn close_channel(&mut self, binding: Binding) -> Result<()> {
        let Some(slot) = self.sockets.get_mut(binding) else {
            return Ok(());
        };
        slot.connected = false;
        slot.pending = 0;

        let handle = binding.handle;
        self.send_command(&close_socket(handle)).await?;
        let timeout = self.config.command_timeout;
        if self.wait(timeout, PatternSet::DEFAULT).await? != Some(1) {
            tracing::debug!("close of socket {} not acknowledged", handle);
        }
        self.sockets.release(binding);
        tracing::info!("socket {} closed", handle);
        Ok(())
    }

    // ==================== Channel Operations ====================

    /// Writes `data` in chunks, stopping early if the modem accepts less
    /// than a full chunk. Returns the total accepted.
    pub async fn channel_write(&mut self, binding: Binding, data: &[u8]) -> Result<usize> {
        self.maintain().await?;
        if !self.sockets.get(binding).is_some_and(|s| s.connected) {
            return Err(Error::NotConnected);
        }

        let mut total = 0;
        for chunk in data.chunks(MAX_SEND_CHUNK) {
            let accepted = self.send_data(binding, chunk).await?;
            total += accepted;
            if accepted < chunk.len() {
                break;
            }
        }
        self.settle().await?;
        Ok(total)
    }

    /// Fills `dst` from the slot's buffer, pulling more from the modem while
    /// it reports pending bytes.
    pub async fn channel_read(&mut self, binding: Binding, dst: &mut [u8]) -> Result<usize> {
        self.maintain().await?;

        let mut count = 0;
        while count < dst.len() {
            let Some(slot) = self.sockets.get_mut(binding) else {
                break;
            };
            let n = slot.rx.get(&mut dst[count..]);
            if n > 0 {
                count += n;
                continue;
            }

            self.maintain().await?;
            let Some(slot) = self.sockets.get(binding) else {
                break;
            };
            let request = slot.pending.min(slot.rx.free());
            if request == 0 {
                break;
            }
            if self.receive(binding, request).await? == 0 {
                // The modem had nothing after all; trust it over our count.
                if let Some(slot) = self.sockets.get_mut(binding) {
                    slot.pending = 0;
                }
                break;
            }
        }
        Ok(count)
    }

    /// Buffered plus pending byte count.
    ///
    /// With data already buffered this touches nothing on the wire.
    pub async fn channel_available(&mut self, binding: Binding) -> Result<usize> {
        if let Some(slot) = self.sockets.get(binding) {
            if !slot.rx.is_empty() {
                return Ok(slot.rx.len() + slot.pending);
            }
        } else {
            return Ok(0);
        }

        self.maintain().await?;
        if self.sockets.get(binding).is_some_and(|s| s.connected) {
            self.query_pending(binding.handle).await?;
        }
        Ok(self
            .sockets
            .get(binding)
            .map_or(0, |s| s.rx.len() + s.pending))
    }
}
