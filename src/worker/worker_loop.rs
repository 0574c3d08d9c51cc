//! A single worker event loop.
//!
//! Each loop is a dedicated OS thread driving a current-thread tokio runtime
//! inside a `LocalSet`. Connections arrive over a bounded queue and run as
//! local tasks, so a stalled connection only ever yields to its siblings on
//! the same loop.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use futures_util::future::LocalBoxFuture;
use tokio::runtime::Builder;
use tokio::sync::{mpsc, oneshot};
use tokio::task::LocalSet;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::net::connection::Connection;
use crate::observability::metrics;

/// Serves one connection to completion on the worker loop that owns it.
pub trait ConnectionHandler<C>: Send + Sync + 'static {
    fn handle(
        &self,
        connection: Connection,
        worker: WorkerContext<C>,
    ) -> LocalBoxFuture<'static, ()>;
}

/// Per-loop context handed to every connection the loop serves.
#[derive(Debug)]
pub struct WorkerContext<C> {
    id: usize,
    container: Arc<C>,
}

impl<C> WorkerContext<C> {
    pub fn new(id: usize, container: Arc<C>) -> Self {
        Self { id, container }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Shared application container, read-only for the loop's lifetime.
    pub fn container(&self) -> &Arc<C> {
        &self.container
    }
}

impl<C> Clone for WorkerContext<C> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            container: Arc::clone(&self.container),
        }
    }
}

/// Handle to a running worker loop.
#[derive(Debug)]
pub struct WorkerLoop {
    id: usize,
    sender: mpsc::Sender<Connection>,
    live: Arc<AtomicUsize>,
    thread: Option<thread::JoinHandle<()>>,
}

/// Settings shared by every loop in a pool.
#[derive(Debug, Clone)]
pub(crate) struct LoopSettings {
    pub queue_depth: usize,
    pub shutdown_grace: Duration,
    pub shutdown: CancellationToken,
}

impl WorkerLoop {
    /// Spawn the loop thread.
    ///
    /// The returned receiver resolves once the loop's runtime is built and
    /// the container is in place, before any connection can reach it.
    pub(crate) fn spawn<C, H>(
        id: usize,
        container: Arc<C>,
        handler: Arc<H>,
        settings: LoopSettings,
    ) -> io::Result<(Self, oneshot::Receiver<io::Result<()>>)>
    where
        C: Send + Sync + 'static,
        H: ConnectionHandler<C>,
    {
        let (sender, receiver) = mpsc::channel(settings.queue_depth);
        let (ready_tx, ready_rx) = oneshot::channel();
        let live = Arc::new(AtomicUsize::new(0));
        let loop_live = Arc::clone(&live);

        let thread = thread::Builder::new()
            .name(format!("engine-worker-{}", id))
            .spawn(move || {
                run_loop(
                    WorkerContext::new(id, container),
                    handler,
                    receiver,
                    loop_live,
                    settings,
                    ready_tx,
                )
            })?;

        Ok((
            Self {
                id,
                sender,
                live,
                thread: Some(thread),
            },
            ready_rx,
        ))
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Connections currently being served by this loop.
    pub fn active(&self) -> usize {
        self.live.load(Ordering::Relaxed)
    }

    /// Queue a connection on this loop, waiting while the queue is full.
    ///
    /// Gives the connection back if the loop has stopped.
    pub async fn submit(&self, connection: Connection) -> Result<(), Connection> {
        self.sender.send(connection).await.map_err(|e| e.0)
    }

    /// Close the queue and return the thread handle for joining.
    pub(crate) fn into_thread(self) -> Option<thread::JoinHandle<()>> {
        let WorkerLoop { sender, thread, .. } = self;
        drop(sender);
        thread
    }
}

fn run_loop<C, H>(
    context: WorkerContext<C>,
    handler: Arc<H>,
    mut receiver: mpsc::Receiver<Connection>,
    live: Arc<AtomicUsize>,
    settings: LoopSettings,
    ready: oneshot::Sender<io::Result<()>>,
) where
    C: Send + Sync + 'static,
    H: ConnectionHandler<C>,
{
    let runtime = match Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    let id = context.id();
    let local = LocalSet::new();
    local.block_on(&runtime, async move {
        let tracker = TaskTracker::new();
        let _ = ready.send(Ok(()));
        tracing::debug!(worker = id, "Worker loop ready");

        loop {
            tokio::select! {
                biased;
                _ = settings.shutdown.cancelled() => break,
                next = receiver.recv() => match next {
                    Some(connection) => {
                        tracing::trace!(
                            worker = id,
                            connection_id = %connection.id(),
                            "Connection assigned"
                        );
                        let active = ActiveConnection::open(id, Arc::clone(&live));
                        let served = handler.handle(connection, context.clone());
                        tracker.spawn_local(async move {
                            let _active = active;
                            served.await;
                        });
                    }
                    None => break,
                },
            }
        }

        // Connections still queued are dropped here, releasing their permits.
        receiver.close();
        tracker.close();

        if !tracker.is_empty() {
            tracing::debug!(worker = id, in_flight = tracker.len(), "Draining connections");
        }
        if tokio::time::timeout(settings.shutdown_grace, tracker.wait())
            .await
            .is_err()
        {
            tracing::warn!(
                worker = id,
                remaining = tracker.len(),
                "Shutdown grace expired, dropping connections"
            );
        }
        tracing::debug!(worker = id, "Worker loop stopped");
    });
}

/// Counts a connection as live until dropped, including when its task panics.
struct ActiveConnection {
    worker: usize,
    live: Arc<AtomicUsize>,
}

impl ActiveConnection {
    fn open(worker: usize, live: Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::Relaxed);
        metrics::record_connection_opened(worker);
        Self { worker, live }
    }
}

impl Drop for ActiveConnection {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::Relaxed);
        metrics::record_connection_closed(self.worker);
    }
}
