//! Main [`Modem`] handle.
//!
//! A [`Modem`] owns the command engine behind a mutex and hands out
//! [`Channel`]s that share it. Cloning a `Modem` is cheap; every clone and
//! every channel talks through the same engine, one command at a time.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::channel::Channel;
use crate::commands::PING_TIMEOUT;
use crate::config::ModemConfig;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::protocol::{Command, PatternSet};
use crate::socket::DropQueue;
use crate::transport::{SerialConfig, SerialTransport, Transport};
use crate::types::{RegStatus, Security, SignalQuality, SimStatus};

/// Pause between bare `AT` pings.
const PING_INTERVAL: Duration = Duration::from_millis(100);

/// Interval between SIM and registration polls.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Time the modem needs after a software reset before it answers.
const RESTART_PAUSE: Duration = Duration::from_secs(3);

/// Default deadline for the modem to answer during [`Modem::init`].
pub const DEFAULT_INIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle to a u-blox modem.
pub struct Modem<T> {
    engine: Arc<Mutex<Engine<T>>>,
    dropped: DropQueue,
}

impl<T> Clone for Modem<T> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            dropped: self.dropped.clone(),
        }
    }
}

impl Modem<SerialTransport> {
    /// Opens a serial port with default settings.
    ///
    /// # Arguments
    ///
    /// * `port` - Serial port path (e.g., "/dev/ttyACM0")
    pub async fn serial(port: impl Into<String>) -> Result<Self> {
        Self::open(&SerialConfig::new(port), ModemConfig::default()).await
    }

    /// Opens a serial port with custom serial and modem settings.
    pub async fn open(serial: &SerialConfig, config: ModemConfig) -> Result<Self> {
        let transport = SerialTransport::open(serial).await?;
        Ok(Self::with_config(transport, config))
    }
}

impl<T: Transport> Modem<T> {
    /// Wraps a transport with default settings.
    #[must_use]
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, ModemConfig::default())
    }

    /// Wraps a transport with custom settings.
    #[must_use]
    pub fn with_config(transport: T, config: ModemConfig) -> Self {
        let engine = Engine::new(transport, config);
        Self {
            dropped: engine.dropped.clone(),
            engine: Arc::new(Mutex::new(engine)),
        }
    }

    /// Creates an idle plain TCP channel.
    #[must_use]
    pub fn channel(&self) -> Channel<T> {
        Channel::new(Arc::clone(&self.engine), self.dropped.clone(), Security::Plain)
    }

    /// Creates an idle TLS channel.
    #[must_use]
    pub fn secure_channel(&self) -> Channel<T> {
        Channel::new(Arc::clone(&self.engine), self.dropped.clone(), Security::Tls)
    }

    /// Sends a raw command and waits for one of `patterns`.
    ///
    /// Returns the 1-based index of the matched pattern, or `None` on timeout.
    /// Socket notifications arriving meanwhile are applied to the channels.
    pub async fn execute(
        &self,
        command: &Command,
        timeout: Duration,
        patterns: PatternSet<'_>,
    ) -> Result<Option<usize>> {
        let mut engine = self.engine.lock().await;
        let outcome = engine.execute(command, timeout, patterns).await?;
        engine.settle().await?;
        Ok(outcome)
    }

    /// Waits for one of `patterns` without sending anything.
    pub async fn wait(&self, timeout: Duration, patterns: PatternSet<'_>) -> Result<Option<usize>> {
        let mut engine = self.engine.lock().await;
        let outcome = engine.wait(timeout, patterns).await?;
        engine.settle().await?;
        Ok(outcome)
    }

    /// Processes queued notifications and refreshes flagged channels.
    pub async fn maintain(&self) -> Result<()> {
        self.engine.lock().await.maintain().await
    }

    // ==================== Device ====================

    /// Pings with bare `AT` until the modem answers or `timeout` elapses.
    ///
    /// Returns false on timeout.
    pub async fn test_at(&self, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.engine.lock().await.ping(PING_TIMEOUT).await? {
                return Ok(true);
            }
            if Instant::now() + PING_INTERVAL >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(PING_INTERVAL).await;
        }
    }

    /// Brings the modem to a usable state.
    ///
    /// Waits for it to answer, disables echo, and unlocks the SIM with
    /// `pin` if it asks for one. Succeeds only if the SIM ends up ready.
    pub async fn init(&self, pin: Option<&str>) -> Result<()> {
        if !self.test_at(DEFAULT_INIT_TIMEOUT).await? {
            return Err(Error::timeout(DEFAULT_INIT_TIMEOUT));
        }
        self.engine.lock().await.echo_off().await?;

        let mut status = self.sim_status(DEFAULT_INIT_TIMEOUT).await?;
        if status == SimStatus::Locked {
            let Some(pin) = pin else {
                return Err(Error::protocol("SIM is locked and no PIN was given"));
            };
            self.sim_unlock(pin).await?;
            status = self.sim_status(DEFAULT_INIT_TIMEOUT).await?;
        }

        match status {
            SimStatus::Ready => {
                tracing::info!("modem ready");
                Ok(())
            }
            other => Err(Error::protocol(format!("SIM not ready: {other:?}"))),
        }
    }

    /// Software reset followed by [`init`](Self::init) without a PIN.
    pub async fn restart(&self) -> Result<()> {
        tracing::info!("restarting modem");
        self.engine.lock().await.reset().await?;
        tokio::time::sleep(RESTART_PAUSE).await;
        self.init(None).await
    }

    /// Restores the factory profile and resets.
    pub async fn factory_default(&self) -> Result<()> {
        self.engine.lock().await.factory_default().await
    }

    // ==================== SIM ====================

    /// Unlocks the SIM with `pin`.
    pub async fn sim_unlock(&self, pin: &str) -> Result<()> {
        self.engine.lock().await.sim_unlock(pin).await
    }

    /// Polls the SIM state once a second until the modem reports one.
    ///
    /// Returns [`SimStatus::Error`] if nothing was reported within `timeout`.
    pub async fn sim_status(&self, timeout: Duration) -> Result<SimStatus> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = self.engine.lock().await.query_sim_status().await? {
                tracing::debug!("SIM status: {:?}", status);
                return Ok(status);
            }
            if Instant::now() + POLL_INTERVAL >= deadline {
                return Ok(SimStatus::Error);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Reads the SIM ICCID.
    pub async fn sim_ccid(&self) -> Result<String> {
        self.engine.lock().await.sim_ccid().await
    }

    /// Reads the modem IMEI.
    pub async fn imei(&self) -> Result<String> {
        self.engine.lock().await.imei().await
    }

    // ==================== Network ====================

    /// Reads the signal strength.
    pub async fn signal_quality(&self) -> Result<SignalQuality> {
        self.engine.lock().await.signal_quality().await
    }

    /// Reads the packet-switched registration state.
    pub async fn registration_status(&self) -> Result<RegStatus> {
        self.engine.lock().await.registration_status().await
    }

    /// Reads the name of the current operator.
    pub async fn operator(&self) -> Result<String> {
        self.engine.lock().await.operator().await
    }

    /// Reads the battery charge level (0 to 5).
    pub async fn battery_level(&self) -> Result<u8> {
        self.engine.lock().await.battery_level().await
    }

    /// Polls registration once a second until registered or `timeout`.
    ///
    /// Returns the last status seen.
    pub async fn wait_for_network(&self, timeout: Duration) -> Result<RegStatus> {
        let deadline = Instant::now() + timeout;
        loop {
            let status = self.registration_status().await?;
            if status.is_registered() {
                tracing::info!("registered on network: {:?}", status);
                return Ok(status);
            }
            if Instant::now() + POLL_INTERVAL >= deadline {
                tracing::warn!("network registration timed out: {:?}", status);
                return Ok(status);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    // ==================== Packet Data ====================

    /// Attaches to the packet network and activates a data context.
    ///
    /// Empty `user` or `password` are not sent.
    pub async fn gprs_connect(&self, apn: &str, user: &str, password: &str) -> Result<()> {
        self.engine
            .lock()
            .await
            .gprs_connect(apn, user, password)
            .await
    }

    /// Deactivates the data context and detaches from the packet network.
    pub async fn gprs_disconnect(&self) -> Result<()> {
        self.engine.lock().await.gprs_disconnect().await
    }
}

impl<T> std::fmt::Debug for Modem<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Modem").finish_non_exhaustive()
    }
}
