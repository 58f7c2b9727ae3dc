//! Scripted modem for tests.
//!
//! [`MockModem`] answers AT commands over an in-memory duplex stream the way
//! a u-blox modem does. Every connected socket loops written bytes back and
//! announces them with a data-ready notification; connecting to
//! [`REFUSED_HOST`] fails. Tests connect to [`ECHO_HOST`].

use std::collections::VecDeque;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::io::{
    AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf,
};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::config::ModemConfig;
use crate::modem::Modem;
use crate::socket::MAX_CHANNELS;
use crate::transport::StreamTransport;

/// Host whose sockets echo everything written to them.
pub const ECHO_HOST: &str = "echo.test";

/// Host whose connection attempts fail.
pub const REFUSED_HOST: &str = "refused.test";

/// Modem type used across tests.
pub type TestModem = Modem<StreamTransport<DuplexStream>>;

/// Installs a test subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Default)]
struct MockSocket {
    connected: bool,
    secure: bool,
    inbox: VecDeque<u8>,
}

#[derive(Debug)]
struct MockState {
    sockets: [Option<MockSocket>; MAX_CHANNELS],
    log: Vec<String>,
    /// Raw text emitted ahead of the next reply.
    urcs: VecDeque<String>,
    silent: bool,
    sim_locked: bool,
    pin: String,
    accept_limit: Option<usize>,
    /// Command bodies answered with ERROR.
    failing: Vec<String>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            sockets: Default::default(),
            log: Vec::new(),
            urcs: VecDeque::new(),
            silent: false,
            sim_locked: false,
            pin: "1234".into(),
            accept_limit: None,
            failing: Vec::new(),
        }
    }
}

/// Control side of the scripted modem.
pub struct MockModem {
    state: Arc<StdMutex<MockState>>,
    writer: Arc<Mutex<WriteHalf<DuplexStream>>>,
    task: JoinHandle<()>,
}

impl MockModem {
    /// Starts a mock and returns a modem wired to it.
    pub fn start() -> (TestModem, Self) {
        Self::start_with(ModemConfig::default())
    }

    /// Starts a mock with custom engine settings.
    pub fn start_with(config: ModemConfig) -> (TestModem, Self) {
        init_tracing();
        let (near, far) = tokio::io::duplex(8192);
        let (reader, writer) = tokio::io::split(far);
        let state = Arc::new(StdMutex::new(MockState::default()));
        let writer = Arc::new(Mutex::new(writer));

        let task = tokio::spawn(serve(
            BufReader::new(reader),
            Arc::clone(&writer),
            Arc::clone(&state),
        ));

        let modem = Modem::with_config(StreamTransport::new(near), config);
        (modem, Self { state, writer, task })
    }

    /// Command bodies received so far, without `AT` and CRLF.
    pub fn log(&self) -> Vec<String> {
        self.state.lock().unwrap().log.clone()
    }

    /// Forgets the command log.
    pub fn clear_log(&self) {
        self.state.lock().unwrap().log.clear();
    }

    /// Queues raw text to be sent just before the next reply.
    pub fn queue_urc(&self, text: &str) {
        self.state.lock().unwrap().urcs.push_back(text.to_owned());
    }

    /// Sends raw text right now.
    pub async fn emit(&self, text: &str) {
        let mut writer = self.writer.lock().await;
        writer.write_all(text.as_bytes()).await.unwrap();
        writer.flush().await.unwrap();
    }

    /// Stops answering commands.
    pub fn set_silent(&self, silent: bool) {
        self.state.lock().unwrap().silent = silent;
    }

    /// Answers every `body` command with ERROR.
    pub fn fail_command(&self, body: &str) {
        self.state.lock().unwrap().failing.push(body.to_owned());
    }

    /// Makes the SIM ask for its PIN.
    pub fn lock_sim(&self) {
        self.state.lock().unwrap().sim_locked = true;
    }

    /// Caps how many bytes each socket write accepts.
    pub fn limit_accept(&self, limit: usize) {
        self.state.lock().unwrap().accept_limit = Some(limit);
    }

    /// Drops the peer side of a socket without telling the host.
    pub fn drop_peer(&self, handle: u8) {
        if let Some(socket) = self.state.lock().unwrap().sockets[usize::from(handle)].as_mut() {
            socket.connected = false;
        }
    }

    /// Peer closes socket `handle`: the id is freed and the host notified.
    pub async fn remote_close(&self, handle: u8) {
        self.state.lock().unwrap().sockets[usize::from(handle)] = None;
        self.emit(&format!("\r\n+UUSOCL: {handle}\r\n")).await;
    }

    /// Returns true if the modem considers socket `handle` open.
    pub fn socket_open(&self, handle: u8) -> bool {
        self.state.lock().unwrap().sockets[usize::from(handle)].is_some()
    }

    /// Returns true if TLS was enabled on socket `handle`.
    pub fn socket_secure(&self, handle: u8) -> bool {
        self.state.lock().unwrap().sockets[usize::from(handle)]
            .as_ref()
            .is_some_and(|s| s.secure)
    }
}

impl Drop for MockModem {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(
    mut reader: BufReader<ReadHalf<DuplexStream>>,
    writer: Arc<Mutex<WriteHalf<DuplexStream>>>,
    state: Arc<StdMutex<MockState>>,
) {
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
        let text = String::from_utf8_lossy(&line);
        let Some(body) = text.trim_end().strip_prefix("AT") else {
            continue;
        };
        let body = body.to_owned();

        let reply = {
            let mut state = state.lock().unwrap();
            state.log.push(body.clone());
            if state.silent {
                continue;
            }
            let mut out: String = state.urcs.drain(..).collect();
            out.push_str(&state.respond(&body));
            out
        };
        if write(&writer, &reply).await.is_err() {
            return;
        }

        if let Some(args) = body.strip_prefix("+USOWR=") {
            let (handle, len) = two_numbers(args);
            let mut payload = vec![0u8; len];
            if reader.read_exact(&mut payload).await.is_err() {
                return;
            }
            let reply = state.lock().unwrap().accept(handle, &payload);
            if write(&writer, &reply).await.is_err() {
                return;
            }
        }
    }
}

async fn write(writer: &Mutex<WriteHalf<DuplexStream>>, text: &str) -> std::io::Result<()> {
    let mut writer = writer.lock().await;
    writer.write_all(text.as_bytes()).await?;
    writer.flush().await
}

fn two_numbers(args: &str) -> (usize, usize) {
    let mut parts = args.split(',').map(|p| p.trim().parse::<usize>().unwrap_or(0));
    (parts.next().unwrap_or(0), parts.next().unwrap_or(0))
}

const OK: &str = "\r\nOK\r\n";
const ERROR: &str = "\r\nERROR\r\n";

impl MockState {
    fn respond(&mut self, body: &str) -> String {
        if self.failing.iter().any(|f| f == body) {
            return ERROR.into();
        }
        match body {
            "" | "E0" | "+CFUN=16" | "+UFACTORY=0,1" | "+CGATT=1" | "+CGATT=0" => OK.into(),
            "+CPIN?" if self.sim_locked => format!("\r\n+CPIN: SIM PIN\r\n{OK}"),
            "+CPIN?" => format!("\r\n+CPIN: READY\r\n{OK}"),
            "+CCID" => format!("\r\n+CCID: 8944500102198304826\r\n{OK}"),
            "+CGSN" => format!("\r\n356938035643809\r\n{OK}"),
            "+CSQ" => format!("\r\n+CSQ: 17,99\r\n{OK}"),
            "+CGREG?" => format!("\r\n+CGREG: 0,1\r\n{OK}"),
            "+COPS?" => format!("\r\n+COPS: 0,0,\"Test Net\"\r\n{OK}"),
            "+CIND?" => format!("\r\n+CIND: 4,0,1,1,0,0,0,0,0,0,0,0\r\n{OK}"),
            "+UPSND=0,8" => format!("\r\n+UPSND: 0,8,1\r\n{OK}"),
            "+USOCR=6" => self.create(),
            _ => self.respond_args(body),
        }
    }

    fn respond_args(&mut self, body: &str) -> String {
        if let Some(pin) = body.strip_prefix("+CPIN=") {
            if pin.trim_matches('"') == self.pin {
                self.sim_locked = false;
                return OK.into();
            }
            return ERROR.into();
        }
        if body.starts_with("+UPSD=") || body.starts_with("+UPSDA=") {
            return OK.into();
        }
        if let Some(args) = body.strip_prefix("+USOSEC=") {
            let (handle, _) = two_numbers(args);
            return match self.socket(handle) {
                Some(socket) => {
                    socket.secure = true;
                    OK.into()
                }
                None => ERROR.into(),
            };
        }
        if let Some(args) = body.strip_prefix("+USOCO=") {
            let (handle, _) = two_numbers(args);
            let refused = args.contains(REFUSED_HOST);
            return match self.socket(handle) {
                Some(socket) if !refused => {
                    socket.connected = true;
                    OK.into()
                }
                _ => ERROR.into(),
            };
        }
        if let Some(args) = body.strip_prefix("+USOWR=") {
            let (handle, _) = two_numbers(args);
            return match self.socket(handle) {
                Some(socket) if socket.connected => "\r\n@".into(),
                _ => ERROR.into(),
            };
        }
        if let Some(args) = body.strip_prefix("+USORD=") {
            let (handle, len) = two_numbers(args);
            let Some(socket) = self.socket(handle) else {
                return ERROR.into();
            };
            if len == 0 {
                return format!("\r\n+USORD: {handle},{}\r\n{OK}", socket.inbox.len());
            }
            let n = len.min(socket.inbox.len());
            let data: String = socket.inbox.drain(..n).map(char::from).collect();
            return format!("\r\n+USORD: {handle},{n},\"{data}\"\r\n{OK}");
        }
        if let Some(args) = body.strip_prefix("+USOCTL=") {
            let (handle, _) = two_numbers(args);
            let Some(socket) = self.socket(handle) else {
                return ERROR.into();
            };
            let state = if socket.connected { 4 } else { 0 };
            return format!("\r\n+USOCTL: {handle},10,{state}\r\n{OK}");
        }
        if let Some(args) = body.strip_prefix("+USOCL=") {
            let (handle, _) = two_numbers(args);
            let closed = self.sockets.get_mut(handle).and_then(Option::take);
            let reply = if closed.is_some() { OK } else { ERROR };
            return reply.into();
        }
        ERROR.into()
    }

    fn create(&mut self) -> String {
        match self.sockets.iter().position(Option::is_none) {
            Some(handle) => {
                self.sockets[handle] = Some(MockSocket::default());
                format!("\r\n+USOCR: {handle}\r\n{OK}")
            }
            None => ERROR.into(),
        }
    }

    fn socket(&mut self, handle: usize) -> Option<&mut MockSocket> {
        self.sockets.get_mut(handle)?.as_mut()
    }

    /// Takes a written payload and echoes it back into the socket.
    fn accept(&mut self, handle: usize, payload: &[u8]) -> String {
        let limit = self.accept_limit.unwrap_or(usize::MAX);
        let Some(socket) = self.socket(handle) else {
            return ERROR.into();
        };
        let accepted = payload.len().min(limit);
        socket.inbox.extend(&payload[..accepted]);
        let pending = socket.inbox.len();
        format!("\r\n+USOWR: {handle},{accepted}\r\n{OK}\r\n+UUSORD: {handle},{pending}\r\n")
    }
}
