//! Accept loop.
//!
//! # Responsibilities
//! - Accept sockets from the listener
//! - Apply the per-address ceiling before any protocol work
//! - Hand admitted connections to the worker pool round-robin
//! - Stop accepting on shutdown, then drain the pool

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use crate::net::admission::AdmissionGuard;
use crate::net::connection::Connection;
use crate::net::listener::Listener;
use crate::observability::metrics;
use crate::worker::WorkerPool;

/// Pause after a failed accept (e.g. descriptor exhaustion) before retrying.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Owns the listening socket and feeds the worker pool.
#[derive(Debug)]
pub struct Dispatcher {
    listener: Listener,
    guard: Arc<AdmissionGuard>,
    pool: WorkerPool,
}

impl Dispatcher {
    pub fn new(listener: Listener, guard: Arc<AdmissionGuard>, pool: WorkerPool) -> Self {
        Self {
            listener,
            guard,
            pool,
        }
    }

    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.listener.local_addr()
    }

    pub fn guard(&self) -> &Arc<AdmissionGuard> {
        &self.guard
    }

    /// Accept until `shutdown` is cancelled, then close the listener and
    /// wait for the worker loops to drain.
    pub async fn run(self, shutdown: CancellationToken) {
        let Dispatcher {
            listener,
            guard,
            pool,
        } = self;

        loop {
            let accepted = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => dispatch(&guard, &pool, stream, peer).await,
                Err(e) => {
                    tracing::warn!(error = %e, "Accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }

        tracing::info!(address = %listener.local_addr(), "Listener closed");
        drop(listener);
        pool.shutdown().await;
    }
}

async fn dispatch(
    guard: &Arc<AdmissionGuard>,
    pool: &WorkerPool,
    stream: TcpStream,
    peer: std::net::SocketAddr,
) {
    let Some(permit) = guard.admit(peer.ip()) else {
        metrics::record_connection_rejected();
        tracing::debug!(
            peer_addr = %peer,
            ceiling = guard.ceiling(),
            "Connection refused: per-address limit reached"
        );
        return;
    };

    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!(peer_addr = %peer, error = %e, "Failed to set TCP_NODELAY");
    }

    let connection = match Connection::new(stream, peer, permit) {
        Ok(connection) => connection,
        Err(e) => {
            tracing::warn!(peer_addr = %peer, error = %e, "Failed to detach accepted socket");
            return;
        }
    };
    let id = connection.id();
    metrics::record_connection_accepted();

    match pool.assign(connection).await {
        Ok(worker) => {
            tracing::trace!(
                connection_id = %id,
                peer_addr = %peer,
                worker,
                "Connection dispatched"
            );
        }
        Err(e) => {
            tracing::warn!(connection_id = %id, error = %e, "Connection dropped");
        }
    }
}
