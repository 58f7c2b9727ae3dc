//! Transport layer for modem communication.
//!
//! The protocol engine needs four things from the byte stream under it:
//! a non-blocking count of readable bytes, a waiting single-byte read,
//! buffered writes, and an explicit flush. [`Transport`] captures exactly
//! that; [`StreamTransport`] provides it for any tokio byte stream.

pub mod serial;

use std::future::Future;
use std::io;
use std::pin::Pin;

use bytes::{Buf, Bytes, BytesMut};
use futures::FutureExt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};

/// Size of one opportunistic read when polling for available bytes.
const POLL_CHUNK: usize = 256;

/// Trait for transport implementations.
pub trait Transport: Send {
    /// Returns the number of bytes that can be read without waiting.
    fn available(&mut self) -> Result<usize>;

    /// Reads one byte, waiting until one arrives.
    ///
    /// Must be cancel safe: dropping the future before completion loses no data.
    fn read_byte(&mut self) -> Pin<Box<dyn Future<Output = Result<u8>> + Send + '_>>;

    /// Queues data for transmission.
    fn send(&mut self, data: Bytes) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Flushes queued data to the device.
    fn flush(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// [`Transport`] over any async byte stream.
///
/// Inbound bytes are staged in an internal buffer so that `available` can
/// report them without consuming anything.
#[derive(Debug)]
pub struct StreamTransport<S> {
    stream: S,
    rx: BytesMut,
}

impl<S> StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wraps a stream.
    #[must_use]
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            rx: BytesMut::with_capacity(POLL_CHUNK),
        }
    }

    /// Pulls whatever the stream has ready right now, without waiting.
    fn poll_now(&mut self) -> Result<usize> {
        let mut chunk = [0u8; POLL_CHUNK];
        match self.stream.read(&mut chunk).now_or_never() {
            None => Ok(0),
            Some(Ok(0)) => Err(closed()),
            Some(Ok(n)) => {
                self.rx.extend_from_slice(&chunk[..n]);
                Ok(n)
            }
            Some(Err(e)) => Err(Error::Io(e)),
        }
    }
}

impl<S> Transport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    fn available(&mut self) -> Result<usize> {
        if self.rx.is_empty() {
            self.poll_now()?;
        }
        Ok(self.rx.len())
    }

    fn read_byte(&mut self) -> Pin<Box<dyn Future<Output = Result<u8>> + Send + '_>> {
        Box::pin(async move {
            loop {
                if !self.rx.is_empty() {
                    return Ok(self.rx.get_u8());
                }
                // read_buf is cancel safe; nothing is lost if the wait is abandoned.
                let n = self.stream.read_buf(&mut self.rx).await?;
                if n == 0 {
                    tracing::debug!("transport closed");
                    return Err(closed());
                }
                tracing::trace!("received {} bytes", n);
            }
        })
    }

    fn send(&mut self, data: Bytes) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            self.stream.write_all(&data).await?;
            Ok(())
        })
    }

    fn flush(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            self.stream.flush().await?;
            Ok(())
        })
    }
}

fn closed() -> Error {
    Error::Io(io::Error::new(
        io::ErrorKind::ConnectionReset,
        "transport closed",
    ))
}

pub use serial::{SerialConfig, SerialTransport};
