//! SIM and network status types.

/// SIM card status reported by `+CPIN?`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimStatus {
    /// No usable answer, or the SIM is missing.
    Error,
    /// SIM unlocked and ready.
    Ready,
    /// SIM waiting for a PIN or PUK.
    Locked,
}

/// Packet-switched network registration status reported by `+CGREG?`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegStatus {
    /// Not registered and not searching.
    Unregistered,
    /// Registered on the home network.
    Home,
    /// Not registered, searching for an operator.
    Searching,
    /// Registration denied.
    Denied,
    /// Unknown or unparsable status.
    Unknown,
    /// Registered while roaming.
    Roaming,
}

impl RegStatus {
    /// Maps the numeric `<stat>` code from the modem.
    #[must_use]
    pub const fn from_code(code: u8) -> Self {
        match code {
            0 => Self::Unregistered,
            1 => Self::Home,
            2 => Self::Searching,
            3 => Self::Denied,
            5 => Self::Roaming,
            _ => Self::Unknown,
        }
    }

    /// Returns true when registered, at home or roaming.
    #[must_use]
    pub const fn is_registered(self) -> bool {
        matches!(self, Self::Home | Self::Roaming)
    }
}

/// Received signal strength indicator from `+CSQ`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalQuality {
    /// Raw RSSI code, 0..=31, or 99 when unknown.
    pub rssi: u8,
}

impl SignalQuality {
    /// RSSI code the modem uses for "not known or not detectable".
    pub const UNKNOWN: u8 = 99;

    /// Returns the approximate signal strength in dBm, if known.
    ///
    /// Code 0 is -113 dBm or less, each step adds 2 dB, 31 is -51 dBm or more.
    #[must_use]
    pub fn dbm(self) -> Option<i16> {
        (self.rssi <= 31).then(|| -113 + 2 * i16::from(self.rssi))
    }

    /// Returns true if the modem reported a usable value.
    #[must_use]
    pub const fn is_known(self) -> bool {
        self.rssi <= 31
    }
}
