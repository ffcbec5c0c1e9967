//! Stream wrapper that watches the ClientHello flight.
//!
//! Sits between the TLS client and the TCP socket. It records the first TLS
//! record the client writes (the ClientHello), notes when that flight is done,
//! and holds back the first read (the ServerHello) for the configured delay.

use std::fmt;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::Sleep;

/// TLS record header length.
const RECORD_HEADER_LEN: usize = 5;

/// Record header (5) + handshake header (4) + legacy_version (2).
const RANDOM_OFFSET: usize = 11;

/// TLS record content type for handshake messages.
const CONTENT_TYPE_HANDSHAKE: u8 = 0x16;

/// Handshake message type for ClientHello.
const HANDSHAKE_CLIENT_HELLO: u8 = 0x01;

enum Phase {
    /// ClientHello not fully sent yet.
    Hello,
    /// Flight sent; waiting out the delay before reading.
    Paused(Pin<Box<Sleep>>),
    /// Plain pass-through.
    Open,
}

/// See module docs.
pub struct HelloStream<S> {
    inner: S,
    delay: Duration,
    phase: Phase,
    first_record: Vec<u8>,
    hello_sent_at: Option<Instant>,
}

impl<S> HelloStream<S> {
    pub fn new(inner: S, delay: Duration) -> Self {
        Self {
            inner,
            delay,
            phase: Phase::Hello,
            first_record: Vec::new(),
            hello_sent_at: None,
        }
    }

    /// Client random as it went out on the wire.
    pub fn client_random(&self) -> Option<[u8; 32]> {
        client_hello_random(&self.first_record)
    }

    /// When the ClientHello flight was considered sent.
    pub fn hello_sent_at(&self) -> Option<Instant> {
        self.hello_sent_at
    }

    /// Bytes of the first record we still need: header first, then body.
    fn first_record_len(&self) -> usize {
        match self.first_record.get(..RECORD_HEADER_LEN) {
            Some(header) => {
                RECORD_HEADER_LEN + u16::from_be_bytes([header[3], header[4]]) as usize
            }
            None => RECORD_HEADER_LEN,
        }
    }

    fn capture(&mut self, mut written: &[u8]) {
        loop {
            let missing = self.first_record_len().saturating_sub(self.first_record.len());
            let take = missing.min(written.len());
            if take == 0 {
                return;
            }
            self.first_record.extend_from_slice(&written[..take]);
            written = &written[take..];
        }
    }
}

impl<S: fmt::Debug> fmt::Debug for HelloStream<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match self.phase {
            Phase::Hello => "hello",
            Phase::Paused(_) => "paused",
            Phase::Open => "open",
        };
        f.debug_struct("HelloStream")
            .field("inner", &self.inner)
            .field("delay", &self.delay)
            .field("phase", &phase)
            .field("first_record_len", &self.first_record.len())
            .field("hello_sent_at", &self.hello_sent_at)
            .finish()
    }
}

/// Extract the 32-byte random from a raw ClientHello record.
pub fn client_hello_random(record: &[u8]) -> Option<[u8; 32]> {
    if record.len() < RANDOM_OFFSET + 32
        || record[0] != CONTENT_TYPE_HANDSHAKE
        || record[RECORD_HEADER_LEN] != HANDSHAKE_CLIENT_HELLO
    {
        return None;
    }
    record[RANDOM_OFFSET..RANDOM_OFFSET + 32].try_into().ok()
}

impl<S: AsyncRead + Unpin> AsyncRead for HelloStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        loop {
            match &mut this.phase {
                Phase::Hello => {
                    if this.first_record.is_empty() {
                        break;
                    }
                    this.hello_sent_at = Some(Instant::now());
                    if let Some(random) = client_hello_random(&this.first_record) {
                        tracing::debug!(
                            client_random = %hex::encode(random),
                            hello_len = this.first_record.len(),
                            "ClientHello sent"
                        );
                    }
                    if this.delay.is_zero() {
                        this.phase = Phase::Open;
                    } else {
                        tracing::info!(delay = ?this.delay, "pausing after ClientHello");
                        this.phase = Phase::Paused(Box::pin(tokio::time::sleep(this.delay)));
                    }
                }
                Phase::Paused(sleep) => {
                    ready!(sleep.as_mut().poll(cx));
                    this.phase = Phase::Open;
                }
                Phase::Open => break,
            }
        }
        Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for HelloStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let written = ready!(Pin::new(&mut this.inner).poll_write(cx, buf))?;
        if matches!(this.phase, Phase::Hello) {
            this.capture(&buf[..written]);
        }
        Poll::Ready(Ok(written))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}
