//! Server facade.
//!
//! # Responsibilities
//! - Validate configuration before anything starts
//! - Start the worker pool with the container injected into every loop
//! - Bind the listener and announce the listening address
//! - Serve HTTP/1.1 over each admitted connection until shutdown
//!
//! # Design Decisions
//! - `bind` and `serve` are separate so callers can read the bound address
//! - Runs until the shutdown token fires, then drains within the grace period

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::future::LocalBoxFuture;
use http::{Request, Response};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::{validate_config, EngineConfig, LimitsConfig};
use crate::http::request::connection_codec;
use crate::lifecycle::startup::{announce, StartupError};
use crate::net::admission::AdmissionGuard;
use crate::net::connection::Connection;
use crate::net::dispatcher::Dispatcher;
use crate::net::listener::Listener;
use crate::observability::metrics;
use crate::pipeline::{Outcome, Pipeline, RequestContext, Responder};
use crate::worker::{ConnectionHandler, WorkerContext, WorkerPool};

/// HTTP server over a pool of worker loops sharing container `C`.
#[derive(Debug)]
pub struct EngineServer<C> {
    config: EngineConfig,
    container: Arc<C>,
}

impl<C> EngineServer<C>
where
    C: Send + Sync + 'static,
{
    /// Create a server after validating `config`.
    pub fn new(config: EngineConfig, container: Arc<C>) -> Result<Self, StartupError> {
        validate_config(&config).map_err(StartupError::Config)?;
        Ok(Self { config, container })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Start the worker loops and bind the listener.
    ///
    /// Nothing is accepted until [`RunningServer::serve`] is awaited.
    pub async fn bind<R>(
        self,
        responder: R,
        shutdown: CancellationToken,
    ) -> Result<RunningServer, StartupError>
    where
        R: Responder<C, Request = Request<Bytes>, Response = Response<Bytes>>,
    {
        let EngineServer { config, container } = self;

        let handler = Arc::new(HttpConnections {
            responder: Arc::new(responder),
            limits: config.limits.clone(),
            idle_timeout: config.timeouts.idle(),
            shutdown: shutdown.clone(),
        });
        let pool = WorkerPool::start(
            &config.server,
            &config.timeouts,
            container,
            handler,
            shutdown.clone(),
        )
        .await
        .map_err(StartupError::Worker)?;

        let guard = Arc::new(AdmissionGuard::new(config.server.max_connections_per_ip));

        let server = &config.server;
        let listener = match Listener::bind(&server.hostname, server.port, server.backlog).await {
            Ok(listener) => listener,
            Err(e) => {
                pool.shutdown().await;
                return Err(e.into());
            }
        };

        announce(server, listener.local_addr());
        Ok(RunningServer {
            dispatcher: Dispatcher::new(listener, guard, pool),
            shutdown,
        })
    }

    /// Bind, then serve until `shutdown` is cancelled.
    pub async fn run<R>(self, responder: R, shutdown: CancellationToken) -> Result<(), StartupError>
    where
        R: Responder<C, Request = Request<Bytes>, Response = Response<Bytes>>,
    {
        self.bind(responder, shutdown).await?.serve().await;
        Ok(())
    }
}

/// A bound server that has not started accepting yet.
#[derive(Debug)]
pub struct RunningServer {
    dispatcher: Dispatcher,
    shutdown: CancellationToken,
}

impl RunningServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.dispatcher.local_addr()
    }

    /// The per-address admission table.
    pub fn admission(&self) -> Arc<AdmissionGuard> {
        Arc::clone(self.dispatcher.guard())
    }

    /// Accept connections until shutdown, then drain the worker loops.
    pub async fn serve(self) {
        self.dispatcher.run(self.shutdown).await;
        tracing::info!("Server stopped");
    }
}

/// Runs the HTTP pipeline over every connection a worker loop receives.
struct HttpConnections<R> {
    responder: Arc<R>,
    limits: LimitsConfig,
    idle_timeout: Option<Duration>,
    shutdown: CancellationToken,
}

impl<C, R> ConnectionHandler<C> for HttpConnections<R>
where
    C: Send + Sync + 'static,
    R: Responder<C, Request = Request<Bytes>, Response = Response<Bytes>>,
{
    fn handle(
        &self,
        connection: Connection,
        worker: WorkerContext<C>,
    ) -> LocalBoxFuture<'static, ()> {
        let id = connection.id();
        let peer = connection.peer();
        let span = tracing::debug_span!(
            "connection",
            connection_id = %id,
            peer_addr = %peer,
            worker = worker.id()
        );

        let (decoder, encoder) = connection_codec(self.limits.clone());
        let pipeline = Pipeline::new(decoder, Arc::clone(&self.responder), encoder)
            .idle_timeout(self.idle_timeout)
            .shutdown_on(self.shutdown.clone());

        Box::pin(
            async move {
                // The permit lives until the pipeline and any upgrade end.
                let (stream, _permit) = match connection.into_tokio() {
                    Ok(parts) => parts,
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to register connection");
                        return;
                    }
                };
                tracing::debug!("Connection opened");

                let cx = RequestContext::new(id, peer, worker);
                match pipeline.drive(stream, &cx).await {
                    Ok(Outcome::Upgraded) => {
                        metrics::record_upgrade();
                        tracing::debug!("Upgraded connection finished");
                    }
                    Ok(outcome) => tracing::debug!(?outcome, "Connection closed"),
                    Err(e) => {
                        metrics::record_connection_error(e.kind());
                        tracing::debug!(error = %e, "Connection terminated");
                    }
                }
            }
            .instrument(span),
        )
    }
}
