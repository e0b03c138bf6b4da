//! Bounded literal streams.
//!
//! Literal bodies stream directly between the socket and the caller; these
//! adapters enforce the declared byte count on both directions so the wire
//! stays aligned no matter what the caller does.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, ReadBuf};

/// Reader yielding exactly the declared number of bytes, then end-of-stream.
#[derive(Debug)]
pub struct LiteralReader<R> {
    inner: R,
    remaining: u32,
}

impl<R> LiteralReader<R> {
    /// Wraps `inner`, limiting reads to `size` bytes.
    pub const fn new(inner: R, size: u32) -> Self {
        Self {
            inner,
            remaining: size,
        }
    }

    /// Bytes left before end-of-stream.
    #[must_use]
    pub const fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Returns the inner reader, discarding the bound.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: AsyncRead + Unpin> LiteralReader<R> {
    /// Consumes and discards the unread balance of the literal.
    ///
    /// APPEND handlers call this on both success and error paths so the
    /// connection stream stays aligned with the wire.
    pub async fn drain(&mut self) -> io::Result<u64> {
        let mut discarded = 0u64;
        let mut scratch = [0u8; 4096];
        while self.remaining > 0 {
            let n = self.read(&mut scratch).await?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "literal body truncated by peer",
                ));
            }
            discarded += n as u64;
        }
        Ok(discarded)
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for LiteralReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let me = self.get_mut();
        if me.remaining == 0 {
            return Poll::Ready(Ok(()));
        }
        let max = buf.remaining().min(me.remaining as usize);
        if max == 0 {
            return Poll::Ready(Ok(()));
        }
        let dst = buf.initialize_unfilled_to(max);
        let mut limited = ReadBuf::new(dst);
        match Pin::new(&mut me.inner).poll_read(cx, &mut limited) {
            Poll::Ready(Ok(())) => {
                let n = limited.filled().len();
                buf.advance(n);
                me.remaining -= n as u32;
                Poll::Ready(Ok(()))
            }
            other => other,
        }
    }
}

/// Writer accepting at most the declared number of bytes.
///
/// Writes past the boundary are swallowed silently; the wire never sees
/// more than `size` bytes.
#[derive(Debug)]
pub struct LiteralWriter<W> {
    inner: W,
    remaining: u32,
}

impl<W> LiteralWriter<W> {
    /// Wraps `inner`, limiting writes to `size` bytes.
    pub const fn new(inner: W, size: u32) -> Self {
        Self {
            inner,
            remaining: size,
        }
    }

    /// Bytes the writer will still forward.
    #[must_use]
    pub const fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Returns `true` once the full declared size has been written.
    #[must_use]
    pub const fn done(&self) -> bool {
        self.remaining == 0
    }

    /// Returns the inner writer.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: AsyncWrite + Unpin> AsyncWrite for LiteralWriter<W> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let me = self.get_mut();
        if me.remaining == 0 {
            // Over-writes truncate silently at the boundary.
            return Poll::Ready(Ok(buf.len()));
        }
        let n = buf.len().min(me.remaining as usize);
        match Pin::new(&mut me.inner).poll_write(cx, &buf[..n]) {
            Poll::Ready(Ok(written)) => {
                me.remaining -= written as u32;
                Poll::Ready(Ok(written))
            }
            other => other,
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}
