//! Command transceiver and response matching driver.
//!
//! [`Engine`] owns the transport and the channel table. Every exchange with
//! the modem goes through it, and it is only ever reachable behind one
//! mutex, so exactly one command is in flight at a time.
//!
//! The wait loop feeds transport bytes into a [`ResponseMatcher`]. Socket
//! notifications that arrive while waiting are applied to the channel table
//! on the spot and the wait carries on; only the caller's terminators end it.
//! Data-ready notifications just flag the slot: the follow-up byte count
//! query is issued by [`Engine::settle`] once the current exchange is over,
//! never between a prompt and its payload.

use std::time::Duration;

use tokio::time::Instant;

use crate::config::ModemConfig;
use crate::error::{Error, Result};
use crate::protocol::{Command, PatternSet, ResponseMatcher, Step};
use crate::socket::{DropQueue, SocketTable};
use crate::transport::Transport;

pub(crate) struct Engine<T> {
    pub(crate) transport: T,
    pub(crate) sockets: SocketTable,
    pub(crate) config: ModemConfig,
    pub(crate) dropped: DropQueue,
}

impl<T: Transport> Engine<T> {
    pub fn new(transport: T, config: ModemConfig) -> Self {
        Self {
            transport,
            sockets: SocketTable::new(config.rx_buffer_capacity),
            config,
            dropped: DropQueue::default(),
        }
    }

    /// Writes a command with prefix and terminator, then flushes.
    pub async fn send_command(&mut self, command: &Command) -> Result<()> {
        let frame = command.encode();
        tracing::trace!("AT{}", String::from_utf8_lossy(command.body()));
        self.transport.send(frame).await?;
        self.transport.flush().await
    }

    /// Sends `command` and waits for one of `patterns`.
    ///
    /// Returns the 1-based index of the matched pattern, or `None` on timeout.
    pub async fn execute(
        &mut self,
        command: &Command,
        timeout: Duration,
        patterns: PatternSet<'_>,
    ) -> Result<Option<usize>> {
        self.send_command(command).await?;
        self.wait(timeout, patterns).await
    }

    /// Consumes inbound bytes until a pattern completes or `timeout` elapses.
    ///
    /// Socket notifications seen on the way are applied to the channel table
    /// and never end the wait. Only transport failures are errors.
    pub async fn wait(
        &mut self,
        timeout: Duration,
        patterns: PatternSet<'_>,
    ) -> Result<Option<usize>> {
        let deadline = Instant::now() + timeout;
        let mut matcher = ResponseMatcher::new(patterns);

        while let Ok(byte) = tokio::time::timeout_at(deadline, self.transport.read_byte()).await
        {
            match matcher.feed(byte?) {
                Step::Pending => {}
                Step::Matched(index) => {
                    tracing::trace!("matched response pattern {}", index);
                    return Ok(Some(index));
                }
                Step::Notification(notification) => self.sockets.apply(notification),
            }
        }

        if let Some(text) = matcher.unhandled() {
            tracing::debug!("unhandled: {}", text);
        }
        Ok(None)
    }

    /// Maps a wait outcome on `OK`/`ERROR` (or `expect`/`ERROR`) to a result.
    pub fn check(outcome: Option<usize>, timeout: Duration, what: &str) -> Result<()> {
        match outcome {
            Some(1) => Ok(()),
            Some(_) => Err(Error::protocol(format!("{what}: modem returned ERROR"))),
            None => Err(Error::timeout(timeout)),
        }
    }

    /// Sends a command that must answer `OK`.
    pub async fn command_ok(&mut self, command: &Command, timeout: Duration) -> Result<()> {
        let outcome = self.execute(command, timeout, PatternSet::DEFAULT).await?;
        Self::check(outcome, timeout, &describe(command))
    }

    /// Sends a command whose reply must contain `prefix`; the reply fields
    /// that follow are left in the stream for the caller.
    pub async fn command_reply(
        &mut self,
        command: &Command,
        prefix: &str,
        timeout: Duration,
    ) -> Result<()> {
        let outcome = self
            .execute(command, timeout, PatternSet::expect(prefix))
            .await?;
        Self::check(outcome, timeout, &describe(command))
    }

    /// Consumes the final result code of a reply whose fields were already read.
    ///
    /// The outcome is only logged; the useful part of the reply is in hand.
    pub async fn finish(&mut self) -> Result<()> {
        let timeout = self.config.command_timeout;
        if self.wait(timeout, PatternSet::DEFAULT).await? != Some(1) {
            tracing::debug!("reply did not end with OK");
        }
        Ok(())
    }

    /// Reads one byte, failing once `deadline` passes. `None` waits forever.
    pub async fn read_byte_by(&mut self, deadline: Option<Instant>) -> Result<u8> {
        match deadline {
            Some(deadline) => {
                match tokio::time::timeout_at(deadline, self.transport.read_byte()).await {
                    Ok(byte) => byte,
                    Err(_) => Err(Error::timeout(
                        deadline.saturating_duration_since(Instant::now()),
                    )),
                }
            }
            None => self.transport.read_byte().await,
        }
    }

    /// Reads text up to (not including) `delimiter`.
    pub async fn read_until(&mut self, delimiter: u8) -> Result<String> {
        let timeout = self.config.field_timeout;
        let deadline = Instant::now() + timeout;
        let mut field = Vec::new();
        loop {
            let byte = self
                .read_byte_by(Some(deadline))
                .await
                .map_err(|e| field_timeout(e, timeout))?;
            if byte == delimiter {
                break;
            }
            field.push(byte);
        }
        Ok(String::from_utf8_lossy(&field).into_owned())
    }

    /// Discards bytes up to and including `delimiter`.
    pub async fn skip_until(&mut self, delimiter: u8) -> Result<()> {
        let timeout = self.config.field_timeout;
        let deadline = Instant::now() + timeout;
        loop {
            let byte = self
                .read_byte_by(Some(deadline))
                .await
                .map_err(|e| field_timeout(e, timeout))?;
            if byte == delimiter {
                return Ok(());
            }
        }
    }

    /// Processes notifications already sitting in the transport, closes
    /// sockets whose channels were dropped, then refreshes the byte counts
    /// of sockets that reported new data.
    pub async fn maintain(&mut self) -> Result<()> {
        while self.transport.available()? > 0 {
            let timeout = self.config.maintain_timeout;
            self.wait(timeout, PatternSet::DEFAULT).await?;
        }
        for binding in self.dropped.take() {
            self.sockets.abandon(binding);
        }
        while let Some(binding) = self.sockets.take_abandoned() {
            tracing::debug!("closing abandoned socket {}", binding.handle);
            self.close_channel(binding).await?;
        }
        self.settle().await
    }

    /// Issues the deferred pending-count queries for flagged sockets.
    pub async fn settle(&mut self) -> Result<()> {
        while let Some(handle) = self.sockets.take_data_ready() {
            self.query_pending(handle).await?;
        }
        Ok(())
    }
}

/// Short command text for error messages.
fn describe(command: &Command) -> String {
    format!("AT{}", String::from_utf8_lossy(command.body()))
}

/// Reports a field read timeout with the configured field deadline.
fn field_timeout(err: Error, timeout: Duration) -> Error {
    match err {
        Error::Timeout { .. } => Error::timeout(timeout),
        other => other,
    }
}
