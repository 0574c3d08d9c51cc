//! The three pipeline stages.
//!
//! Decoder and encoder are `tokio_util` codecs extended with the two hooks
//! the pipeline needs; the responder is the application seam.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

use crate::net::connection::ConnectionId;
use crate::pipeline::upgrade::UpgradeHandler;
use crate::worker::WorkerContext;

/// Decoder stage: bytes in, requests out.
///
/// `reject` turns a terminal decode error into the reply sent before the
/// connection closes, or `None` to close silently.
pub trait Reject<Response>: Decoder {
    fn reject(&self, error: &Self::Error) -> Option<Response>;
}

/// Encoder stage: responses in, bytes out.
pub trait ResponseEncoder<Item>: Encoder<Item> {
    /// Takes the upgrade negotiated by the last encoded item, if any.
    fn take_upgrade(&mut self) -> Option<Box<dyn UpgradeHandler>>;

    /// Whether the connection must close once the last item is flushed.
    fn close_after_flush(&self) -> bool {
        false
    }
}

/// Error raised by a responder. Always terminal for its connection.
#[derive(Debug, Error)]
#[error("responder failed: {0}")]
pub struct ResponderError(#[source] Box<dyn std::error::Error + Send + Sync>);

impl ResponderError {
    pub fn new(error: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self(error.into())
    }
}

/// Responder stage: the application.
///
/// Produces zero or one response per request. The returned future runs on
/// the connection's worker loop and need not be `Send`.
pub trait Responder<C>: Send + Sync + 'static {
    type Request;
    type Response;

    fn respond(
        &self,
        request: Self::Request,
        cx: &RequestContext<C>,
    ) -> impl Future<Output = Result<Option<Self::Response>, ResponderError>>;
}

/// What a responder knows about the connection a request arrived on.
#[derive(Debug)]
pub struct RequestContext<C> {
    connection: ConnectionId,
    peer: SocketAddr,
    worker: WorkerContext<C>,
}

impl<C> RequestContext<C> {
    pub fn new(connection: ConnectionId, peer: SocketAddr, worker: WorkerContext<C>) -> Self {
        Self {
            connection,
            peer,
            worker,
        }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn worker_id(&self) -> usize {
        self.worker.id()
    }

    /// The container injected into this worker loop.
    pub fn container(&self) -> &Arc<C> {
        self.worker.container()
    }
}
