//! Drives one connection through decode → respond → encode.
//!
//! The runner pulls exactly one request, waits for its response, writes it,
//! and only then pulls the next. Socket reads happen only when the decoder
//! needs more bytes, so a stalled responder stalls the peer through TCP flow
//! control instead of growing buffers. Pipelined requests already in the
//! buffer are answered in arrival order.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::codec::{Decoder, Encoder};
use tokio_util::sync::CancellationToken;

use crate::pipeline::stage::{Reject, RequestContext, Responder, ResponderError, ResponseEncoder};
use crate::pipeline::upgrade::{Io, Upgraded};

/// Minimum free space guaranteed before each socket read.
const READ_CHUNK: usize = 8 * 1024;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Why a connection's pipeline stopped abnormally.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("decode failed: {0}")]
    Decode(#[source] BoxError),

    #[error(transparent)]
    Respond(#[from] ResponderError),

    #[error("encode failed: {0}")]
    Encode(#[source] BoxError),

    #[error("read failed: {0}")]
    Read(#[source] io::Error),

    #[error("write failed: {0}")]
    Write(#[source] io::Error),

    #[error("no bytes received for {0:?}")]
    IdleTimeout(Duration),

    #[error("upgrade handler failed: {0}")]
    Upgrade(#[source] io::Error),
}

impl PipelineError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Decode(_) => "decode",
            PipelineError::Respond(_) => "respond",
            PipelineError::Encode(_) => "encode",
            PipelineError::Read(_) => "read",
            PipelineError::Write(_) => "write",
            PipelineError::IdleTimeout(_) => "idle_timeout",
            PipelineError::Upgrade(_) => "upgrade",
        }
    }
}

/// How a connection ended when nothing went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Peer closed, or a response asked for the connection to close.
    Closed,
    /// The connection was handed to an upgrade handler, which has finished.
    Upgraded,
    /// Shutdown was signalled while the connection sat between requests.
    Shutdown,
}

enum Fill {
    Data,
    Eof,
    Shutdown,
}

enum Pulled<T, E> {
    Item(T),
    Finished(Outcome),
    Failed(E),
}

/// The per-connection pipeline.
pub struct Pipeline<D, R, E> {
    decoder: D,
    responder: Arc<R>,
    encoder: E,
    idle_timeout: Option<Duration>,
    shutdown: CancellationToken,
}

impl<D, R, E> Pipeline<D, R, E> {
    pub fn new(decoder: D, responder: Arc<R>, encoder: E) -> Self {
        Self {
            decoder,
            responder,
            encoder,
            idle_timeout: None,
            shutdown: CancellationToken::new(),
        }
    }

    /// Bound every wait for peer bytes. `None` waits forever.
    pub fn idle_timeout(mut self, limit: Option<Duration>) -> Self {
        self.idle_timeout = limit;
        self
    }

    /// Stop between requests once `token` is cancelled.
    pub fn shutdown_on(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Run the connection until it closes, upgrades or fails.
    pub async fn drive<C, S>(
        mut self,
        mut io: S,
        cx: &RequestContext<C>,
    ) -> Result<Outcome, PipelineError>
    where
        S: Io + 'static,
        R: Responder<C, Request = <D as Decoder>::Item>,
        D: Reject<<R as Responder<C>>::Response>,
        <D as Decoder>::Error: std::error::Error + Send + Sync + 'static,
        E: ResponseEncoder<<R as Responder<C>>::Response>,
        <E as Encoder<<R as Responder<C>>::Response>>::Error:
            std::error::Error + Send + Sync + 'static,
    {
        let mut read_buf = BytesMut::with_capacity(READ_CHUNK);
        let mut write_buf = BytesMut::new();

        loop {
            let request = match self.pull(&mut io, &mut read_buf).await? {
                Pulled::Item(request) => request,
                Pulled::Finished(outcome) => return Ok(outcome),
                Pulled::Failed(error) => {
                    if let Some(reply) = self.decoder.reject(&error) {
                        write_buf.clear();
                        if self.encoder.encode(reply, &mut write_buf).is_ok() {
                            // Best effort: the peer may already be gone.
                            let _ = io.write_all(&write_buf).await;
                            let _ = io.flush().await;
                        }
                        let _ = io.shutdown().await;
                    }
                    return Err(PipelineError::Decode(Box::new(error)));
                }
            };

            let Some(response) = self.responder.respond(request, cx).await? else {
                continue;
            };

            self.encoder
                .encode(response, &mut write_buf)
                .map_err(|e| PipelineError::Encode(Box::new(e)))?;
            io.write_all(&write_buf).await.map_err(PipelineError::Write)?;
            io.flush().await.map_err(PipelineError::Write)?;
            write_buf.clear();

            if let Some(handler) = self.encoder.take_upgrade() {
                let buffered = read_buf.split().freeze();
                tracing::debug!(buffered = buffered.len(), "Handing connection to upgrade handler");
                handler
                    .upgrade(Upgraded::new(Box::new(io), buffered))
                    .await
                    .map_err(PipelineError::Upgrade)?;
                return Ok(Outcome::Upgraded);
            }

            if self.encoder.close_after_flush() {
                let _ = io.shutdown().await;
                return Ok(Outcome::Closed);
            }
        }
    }

    /// Decode the next request, reading from the socket only when needed.
    async fn pull<S: Io>(
        &mut self,
        io: &mut S,
        buf: &mut BytesMut,
    ) -> Result<Pulled<D::Item, D::Error>, PipelineError>
    where
        D: Decoder,
    {
        loop {
            match self.decoder.decode(buf) {
                Ok(Some(item)) => return Ok(Pulled::Item(item)),
                Ok(None) => {}
                Err(error) => return Ok(Pulled::Failed(error)),
            }

            match self.fill(io, buf).await? {
                Fill::Data => {}
                Fill::Shutdown => return Ok(Pulled::Finished(Outcome::Shutdown)),
                Fill::Eof => {
                    return Ok(match self.decoder.decode_eof(buf) {
                        Ok(Some(item)) => Pulled::Item(item),
                        Ok(None) => Pulled::Finished(Outcome::Closed),
                        Err(error) => Pulled::Failed(error),
                    });
                }
            }
        }
    }

    async fn fill<S: Io>(&self, io: &mut S, buf: &mut BytesMut) -> Result<Fill, PipelineError> {
        let between_requests = buf.is_empty();
        buf.reserve(READ_CHUNK);

        let idle_timeout = self.idle_timeout;
        let read = async move {
            let result = match idle_timeout {
                Some(limit) => tokio::time::timeout(limit, io.read_buf(buf))
                    .await
                    .map_err(|_| PipelineError::IdleTimeout(limit))?,
                None => io.read_buf(buf).await,
            };
            result.map_err(PipelineError::Read)
        };

        let n = if between_requests {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return Ok(Fill::Shutdown),
                n = read => n?,
            }
        } else {
            read.await?
        };

        Ok(if n == 0 { Fill::Eof } else { Fill::Data })
    }
}
