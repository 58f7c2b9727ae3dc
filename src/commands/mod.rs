//! Command handlers for modem operations.
//!
//! Each handler is one request/response exchange (or a short fixed
//! sequence) on the [`Engine`]. Polling loops that sleep between attempts
//! live in [`Modem`](crate::Modem) so the engine lock is not held while idle.

pub mod socket;

use std::time::Duration;

use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::protocol::parser::{parse_reg_status, sim_status_from_match};
use crate::protocol::{Command, PatternSet, parse_int};
use crate::transport::Transport;
use crate::types::{RegStatus, SignalQuality, SimStatus};

/// Wait applied to each bare `AT` ping.
pub const PING_TIMEOUT: Duration = Duration::from_millis(200);

/// Timeout for `+CGATT=1`.
const ATTACH_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout for activating the PSD profile.
const ACTIVATE_TIMEOUT: Duration = Duration::from_secs(6);

/// Timeout for the software reset.
const RESET_TIMEOUT: Duration = Duration::from_secs(10);

/// SIM states matched after `+CPIN:`, in index order.
const SIM_STATES: [&str; 4] = ["READY", "SIM PIN", "SIM PUK", "NOT INSERTED"];

impl<T: Transport> Engine<T> {
    // ==================== Device Commands ====================

    /// Sends a bare `AT`; true if the modem answers `OK` within `timeout`.
    pub async fn ping(&mut self, timeout: Duration) -> Result<bool> {
        let outcome = self
            .execute(&Command::new(""), timeout, PatternSet::DEFAULT)
            .await?;
        Ok(outcome == Some(1))
    }

    /// Turns command echo off.
    pub async fn echo_off(&mut self) -> Result<()> {
        let timeout = self.config.command_timeout;
        self.command_ok(&Command::new("E0"), timeout).await
    }

    /// Software reset (`+CFUN=16`).
    pub async fn reset(&mut self) -> Result<()> {
        self.command_ok(&Command::new("+CFUN=16"), RESET_TIMEOUT)
            .await
    }

    /// Restores factory settings, then resets.
    pub async fn factory_default(&mut self) -> Result<()> {
        let timeout = self.config.command_timeout;
        let outcome = self
            .execute(&Command::new("+UFACTORY=0,1"), timeout, PatternSet::DEFAULT)
            .await?;
        if outcome != Some(1) {
            tracing::debug!("factory profile restore not acknowledged");
        }
        self.command_ok(&Command::new("+CFUN=16"), timeout).await
    }

    // ==================== SIM Commands ====================

    /// Unlocks the SIM with a PIN.
    pub async fn sim_unlock(&mut self, pin: &str) -> Result<()> {
        let timeout = self.config.command_timeout;
        self.command_ok(&Command::new("+CPIN=").quoted(pin), timeout)
            .await
    }

    /// One `+CPIN?` query. `None` if the modem gave no `+CPIN:` line.
    pub async fn query_sim_status(&mut self) -> Result<Option<SimStatus>> {
        let timeout = self.config.command_timeout;
        let outcome = self
            .execute(
                &Command::new("+CPIN?"),
                timeout,
                PatternSet::expect("\r\n+CPIN:"),
            )
            .await?;
        if outcome != Some(1) {
            return Ok(None);
        }
        let state = self.wait(timeout, PatternSet::of(&SIM_STATES)).await?;
        self.finish().await?;
        Ok(Some(sim_status_from_match(state)))
    }

    /// Reads the SIM ICCID.
    pub async fn sim_ccid(&mut self) -> Result<String> {
        let timeout = self.config.command_timeout;
        self.command_reply(&Command::new("+CCID"), "\r\n+CCID:", timeout)
            .await?;
        let ccid = self.read_until(b'\n').await?.trim().to_owned();
        self.finish().await?;
        Ok(ccid)
    }

    /// Reads the IMEI.
    pub async fn imei(&mut self) -> Result<String> {
        let timeout = self.config.command_timeout;
        self.command_reply(&Command::new("+CGSN"), "\r\n", timeout)
            .await?;
        let imei = self.read_until(b'\n').await?.trim().to_owned();
        self.finish().await?;
        Ok(imei)
    }

    // ==================== Network Commands ====================

    /// Reads the RSSI code.
    pub async fn signal_quality(&mut self) -> Result<SignalQuality> {
        let timeout = self.config.command_timeout;
        self.command_reply(&Command::new("+CSQ"), "\r\n+CSQ:", timeout)
            .await?;
        let field = self.read_until(b',').await?;
        self.finish().await?;
        let rssi = parse_int(&field)
            .and_then(|v| u8::try_from(v).ok())
            .unwrap_or(SignalQuality::UNKNOWN);
        Ok(SignalQuality { rssi })
    }

    /// Reads the packet-switched registration status.
    pub async fn registration_status(&mut self) -> Result<RegStatus> {
        let timeout = self.config.command_timeout;
        let outcome = self
            .execute(
                &Command::new("+CGREG?"),
                timeout,
                PatternSet::expect("\r\n+CGREG:"),
            )
            .await?;
        if outcome != Some(1) {
            return Ok(RegStatus::Unknown);
        }
        self.skip_until(b',').await?;
        let field = self.read_until(b'\n').await?;
        self.finish().await?;
        Ok(parse_reg_status(&field))
    }

    /// Reads the current operator name.
    pub async fn operator(&mut self) -> Result<String> {
        let timeout = self.config.command_timeout;
        self.command_reply(&Command::new("+COPS?"), "\r\n+COPS:", timeout)
            .await?;
        self.skip_until(b'"').await?;
        let name = self.read_until(b'"').await?;
        self.finish().await?;
        Ok(name)
    }

    /// Reads the battery charge indicator (first `+CIND` field, 0..=5).
    pub async fn battery_level(&mut self) -> Result<u8> {
        let timeout = self.config.command_timeout;
        self.command_reply(&Command::new("+CIND?"), "\r\n+CIND:", timeout)
            .await?;
        let field = self.read_until(b',').await?;
        self.finish().await?;
        parse_int(&field)
            .and_then(|v| u8::try_from(v).ok())
            .ok_or_else(|| Error::protocol(format!("invalid battery indicator: {field:?}")))
    }

    // ==================== Packet Data Commands ====================

    /// Attaches to the packet network and activates PSD profile 0.
    pub async fn gprs_connect(&mut self, apn: &str, user: &str, password: &str) -> Result<()> {
        // Start from a clean state; a failed detach does not block the attach.
        if let Err(e) = self.gprs_disconnect().await {
            if matches!(e, Error::Io(_)) {
                return Err(e);
            }
            tracing::debug!("preliminary packet detach failed: {}", e);
        }

        let timeout = self.config.command_timeout;
        self.lenient(&Command::new("+CGATT=1"), ATTACH_TIMEOUT).await?;
        self.lenient(&Command::new("+UPSD=0,1,").quoted(apn), timeout)
            .await?;
        if !user.is_empty() {
            self.lenient(&Command::new("+UPSD=0,2,").quoted(user), timeout)
                .await?;
        }
        if !password.is_empty() {
            self.lenient(&Command::new("+UPSD=0,3,").quoted(password), timeout)
                .await?;
        }
        // Dynamic IP
        self.lenient(&Command::new("+UPSD=0,7,").quoted("0.0.0.0"), timeout)
            .await?;
        self.lenient(&Command::new("+UPSDA=0,3"), ACTIVATE_TIMEOUT)
            .await?;

        // Profile 0 status: parameter 8, value 1 means active.
        self.command_reply(&Command::new("+UPSND=0,8"), ",8,1", timeout)
            .await
            .map_err(|e| match e {
                Error::Protocol { .. } | Error::Timeout { .. } => {
                    Error::protocol("packet data context did not activate")
                }
                other => other,
            })?;
        self.finish().await?;
        tracing::info!("packet data context active on {}", apn);
        Ok(())
    }

    /// Deactivates PSD profile 0 and detaches from the packet network.
    pub async fn gprs_disconnect(&mut self) -> Result<()> {
        let timeout = self.config.disconnect_timeout;
        self.lenient(&Command::new("+UPSDA=0,4"), timeout).await?;
        self.command_ok(&Command::new("+CGATT=0"), timeout).await
    }

    /// Sends a setup command whose failure is tolerated.
    async fn lenient(&mut self, command: &Command, timeout: Duration) -> Result<()> {
        if self.execute(command, timeout, PatternSet::DEFAULT).await? != Some(1) {
            tracing::debug!("AT{} not acknowledged", String::from_utf8_lossy(command.body()));
        }
        Ok(())
    }
}
