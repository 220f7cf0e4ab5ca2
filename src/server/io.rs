//! Socket adapter that enforces read, write and idle deadlines.
//!
//! hyper only knows a header-read timeout, so the per-connection bounds live
//! here, underneath it. The connection moves through three phases:
//!
//! - `Request`: from accept (or the first byte of a follow-up request) the
//!   client has `read_timeout` to deliver the whole request. An interim
//!   `100 Continue` sent mid-request does not end this phase.
//! - `Response`: from the first byte written the server has `write_timeout`
//!   to get the whole response out. A slow reader stalls our writes and runs
//!   into this deadline.
//! - `Idle`: after a response is flushed, a keep-alive connection may sit for
//!   `idle_timeout` before the next request starts.
//!
//! A deadline is only checked when the socket is blocked. Once it has passed
//! the IO fails with [`io::ErrorKind::TimedOut`] and hyper drops the
//! connection.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use pin_project_lite::pin_project;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::{Instant, Sleep};

use crate::metrics::CONNECTION_TIMEOUTS_TOTAL;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub read: Duration,
    pub write: Duration,
    pub idle: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Request,
    Response,
    Idle,
}

impl Phase {
    fn timeout_kind(self) -> &'static str {
        match self {
            Phase::Request => "read",
            Phase::Response => "write",
            Phase::Idle => "idle",
        }
    }
}

struct Deadline {
    timeouts: Timeouts,
    phase: Phase,
    /// Start of the response currently being written, kept across flushes
    /// so a response streamed in several bursts shares one deadline.
    write_started: Option<Instant>,
    sleep: Pin<Box<Sleep>>,
}

/// True if a write of `len` bytes starting with `head` is exactly one
/// interim (1xx) response head, such as the `100 Continue` hyper sends when
/// a client asked for it.
fn is_interim_head(head: &[u8], len: usize) -> bool {
    if !head.starts_with(b"HTTP/1.1 1") && !head.starts_with(b"HTTP/1.0 1") {
        return false;
    }
    head.windows(4)
        .position(|w| w == b"\r\n\r\n")
        .is_some_and(|end| end + 4 == len)
}

impl Deadline {
    fn new(timeouts: Timeouts) -> Self {
        Self {
            timeouts,
            phase: Phase::Request,
            write_started: None,
            sleep: Box::pin(tokio::time::sleep(timeouts.read)),
        }
    }

    fn arm(&mut self, at: Instant) {
        self.sleep.as_mut().reset(at);
    }

    fn on_read_data(&mut self) {
        if self.phase == Phase::Idle {
            self.phase = Phase::Request;
            self.arm(Instant::now() + self.timeouts.read);
        }
    }

    /// `head` is the first non-empty buffer of a write of `len` bytes.
    fn on_write(&mut self, head: &[u8], len: usize) {
        if self.phase == Phase::Response {
            return;
        }
        // An interim response does not end the request; the body is still
        // owed within the original read deadline.
        if self.phase == Phase::Request && is_interim_head(head, len) {
            return;
        }
        // A status line starts a new response, even when its request was
        // already buffered and never touched the socket.
        let started = match self.write_started {
            Some(at) if !head.starts_with(b"HTTP/") => at,
            _ => {
                let now = Instant::now();
                self.write_started = Some(now);
                now
            }
        };
        self.phase = Phase::Response;
        self.arm(started + self.timeouts.write);
    }

    fn on_flushed(&mut self) {
        if self.phase == Phase::Response {
            self.phase = Phase::Idle;
            self.arm(Instant::now() + self.timeouts.idle);
        }
    }

    /// Called whenever the inner IO is pending.
    fn poll_expired(&mut self, cx: &mut Context<'_>) -> io::Result<()> {
        if self.sleep.as_mut().poll(cx).is_pending() {
            return Ok(());
        }
        let kind = self.phase.timeout_kind();
        CONNECTION_TIMEOUTS_TOTAL.with_label_values(&[kind]).inc();
        tracing::debug!(kind, "connection deadline exceeded");
        Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("{kind} timeout exceeded"),
        ))
    }
}

pin_project! {
    /// Wraps an accepted socket and fails its IO once the deadline for the
    /// current phase has passed while the peer is not keeping up.
    pub struct DeadlineIo<S> {
        #[pin]
        inner: S,
        deadline: Deadline,
    }
}

impl<S> DeadlineIo<S> {
    pub fn new(inner: S, timeouts: Timeouts) -> Self {
        Self {
            inner,
            deadline: Deadline::new(timeouts),
        }
    }

    pub fn phase(&self) -> Phase {
        self.deadline.phase
    }
}

impl<S: AsyncRead> AsyncRead for DeadlineIo<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.project();
        let before = buf.filled().len();
        match this.inner.poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                if buf.filled().len() > before {
                    this.deadline.on_read_data();
                }
                Poll::Ready(Ok(()))
            }
            Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
            Poll::Pending => {
                this.deadline.poll_expired(cx)?;
                Poll::Pending
            }
        }
    }
}

impl<S: AsyncWrite> AsyncWrite for DeadlineIo<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.project();
        if !buf.is_empty() {
            this.deadline.on_write(buf, buf.len());
        }
        match this.inner.poll_write(cx, buf) {
            Poll::Pending => {
                this.deadline.poll_expired(cx)?;
                Poll::Pending
            }
            ready => ready,
        }
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        let this = self.project();
        if let Some(first) = bufs.iter().find(|b| !b.is_empty()) {
            let len = bufs.iter().map(|b| b.len()).sum();
            this.deadline.on_write(first, len);
        }
        match this.inner.poll_write_vectored(cx, bufs) {
            Poll::Pending => {
                this.deadline.poll_expired(cx)?;
                Poll::Pending
            }
            ready => ready,
        }
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.project();
        match this.inner.poll_flush(cx) {
            Poll::Ready(Ok(())) => {
                this.deadline.on_flushed();
                Poll::Ready(Ok(()))
            }
            Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
            Poll::Pending => {
                this.deadline.poll_expired(cx)?;
                Poll::Pending
            }
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.project();
        match this.inner.poll_shutdown(cx) {
            Poll::Pending => {
                this.deadline.poll_expired(cx)?;
                Poll::Pending
            }
            ready => ready,
        }
    }
}
