//! Protocol upgrade handoff.
//!
//! After the last HTTP byte is flushed, the connection and every byte read
//! but not yet decoded move to an [`UpgradeHandler`].

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Buf, Bytes};
use futures_util::future::LocalBoxFuture;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Byte stream a connection runs over.
pub trait Io: AsyncRead + AsyncWrite + Unpin {}

impl<T: AsyncRead + AsyncWrite + Unpin> Io for T {}

/// Takes over a connection after a protocol switch.
///
/// Closures `FnOnce(Upgraded) -> impl Future<Output = io::Result<()>>` qualify.
pub trait UpgradeHandler: Send + 'static {
    fn upgrade(self: Box<Self>, io: Upgraded) -> LocalBoxFuture<'static, io::Result<()>>;
}

impl<F, Fut> UpgradeHandler for F
where
    F: FnOnce(Upgraded) -> Fut + Send + 'static,
    Fut: Future<Output = io::Result<()>> + 'static,
{
    fn upgrade(self: Box<Self>, io: Upgraded) -> LocalBoxFuture<'static, io::Result<()>> {
        Box::pin((*self)(io))
    }
}

/// An upgraded connection.
///
/// Reads return the bytes buffered before the switch first, then continue
/// from the socket. Writes go straight to the socket.
pub struct Upgraded {
    io: Box<dyn Io>,
    buffered: Bytes,
}

impl Upgraded {
    pub fn new(io: Box<dyn Io>, buffered: Bytes) -> Self {
        Self { io, buffered }
    }

    /// Bytes received before the switch that have not been read yet.
    pub fn buffered(&self) -> &Bytes {
        &self.buffered
    }
}

impl std::fmt::Debug for Upgraded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Upgraded")
            .field("buffered", &self.buffered.len())
            .finish_non_exhaustive()
    }
}

impl AsyncRead for Upgraded {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.buffered.has_remaining() {
            let n = self.buffered.len().min(buf.remaining());
            buf.put_slice(&self.buffered[..n]);
            self.buffered.advance(n);
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut self.io).poll_read(cx, buf)
    }
}

impl AsyncWrite for Upgraded {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.io).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.io).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.io).poll_shutdown(cx)
    }
}
