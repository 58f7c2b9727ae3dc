//! AT command construction for u-blox modems.
//!
//! Every outbound command is the `AT` prefix, a body assembled from text and
//! number fragments, and a CRLF terminator:
//! ```text
//! ┌──────┬──────────────────────┬────────┐
//! │  AT  │  body fragments ...  │  \r\n  │
//! └──────┴──────────────────────┴────────┘
//! ```

use std::fmt::{Display, Write as _};

use bytes::{BufMut, Bytes, BytesMut};

/// Fixed command prefix.
pub const AT_PREFIX: &[u8] = b"AT";

/// Line terminator used in both directions.
pub const CRLF: &str = "\r\n";

/// Success terminator.
pub const OK: &str = "OK\r\n";

/// Error terminator.
pub const ERROR: &str = "ERROR\r\n";

/// Socket protocol number for TCP in `+USOCR`.
pub const TCP_PROTOCOL: u8 = 6;

/// `+USOCTL` parameter id for the TCP socket status.
pub const SOCKET_STATUS_PARAM: u8 = 10;

/// An outbound AT command.
///
/// Built once, sent once. Fragments are appended in order:
///
/// ```
/// use ublox_at::protocol::Command;
///
/// let cmd = Command::new("+USOCO=").arg(0).text(",").quoted("example.com").text(",").arg(80);
/// assert_eq!(&cmd.encode()[..], b"AT+USOCO=0,\"example.com\",80\r\n");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Command {
    body: BytesMut,
}

impl Command {
    /// Starts a command with the given body text (without the `AT` prefix).
    #[must_use]
    pub fn new(body: &str) -> Self {
        let mut buf = BytesMut::with_capacity(32);
        buf.put_slice(body.as_bytes());
        Self { body: buf }
    }

    /// Appends literal text.
    #[must_use]
    pub fn text(mut self, text: &str) -> Self {
        self.body.put_slice(text.as_bytes());
        self
    }

    /// Appends a value in its display form (numbers as decimal ASCII).
    #[must_use]
    pub fn arg(mut self, value: impl Display) -> Self {
        // Writing into BytesMut cannot fail.
        let _ = write!(self.body, "{value}");
        self
    }

    /// Appends a double-quoted string field.
    #[must_use]
    pub fn quoted(mut self, value: &str) -> Self {
        self.body.put_u8(b'"');
        self.body.put_slice(value.as_bytes());
        self.body.put_u8(b'"');
        self
    }

    /// Returns the command body without prefix or terminator.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Encodes the full wire form: prefix, body, CRLF.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(AT_PREFIX.len() + self.body.len() + CRLF.len());
        buf.put_slice(AT_PREFIX);
        buf.put_slice(&self.body);
        buf.put_slice(CRLF.as_bytes());
        buf.freeze()
    }
}

// ==================== Socket Commands ====================

/// `AT+USOCR=6`: create a TCP socket. Reply carries the assigned socket id.
#[must_use]
pub fn create_tcp_socket() -> Command {
    Command::new("+USOCR=").arg(TCP_PROTOCOL)
}

/// `AT+USOSEC=<id>,1`: enable TLS on a socket before connecting.
#[must_use]
pub fn enable_secure(handle: u8) -> Command {
    Command::new("+USOSEC=").arg(handle).text(",1")
}

/// `AT+USOCO=<id>,"<host>",<port>`: connect a socket to a remote host.
#[must_use]
pub fn connect_socket(handle: u8, host: &str, port: u16) -> Command {
    Command::new("+USOCO=")
        .arg(handle)
        .text(",")
        .quoted(host)
        .text(",")
        .arg(port)
}

/// `AT+USOWR=<id>,<len>`: announce a binary payload of `len` bytes.
#[must_use]
pub fn write_socket(handle: u8, len: usize) -> Command {
    Command::new("+USOWR=").arg(handle).text(",").arg(len)
}

/// `AT+USORD=<id>,<len>`: read up to `len` bytes; `len == 0` queries the
/// pending byte count.
#[must_use]
pub fn read_socket(handle: u8, len: usize) -> Command {
    Command::new("+USORD=").arg(handle).text(",").arg(len)
}

/// `AT+USOCTL=<id>,10`: query the TCP status of a socket.
#[must_use]
pub fn socket_status(handle: u8) -> Command {
    Command::new("+USOCTL=")
        .arg(handle)
        .text(",")
        .arg(SOCKET_STATUS_PARAM)
}

/// `AT+USOCL=<id>`: close a socket.
#[must_use]
pub fn close_socket(handle: u8) -> Command {
    Command::new("+USOCL=").arg(handle)
}
