//! Fixed-size pool of worker loops with round-robin assignment.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::{ServerConfig, TimeoutConfig};
use crate::net::connection::Connection;
use crate::worker::worker_loop::{ConnectionHandler, LoopSettings, WorkerLoop};

/// The chosen loop stopped before it could take the connection.
#[derive(Debug, Error)]
#[error("worker loop {worker} is no longer accepting connections")]
pub struct AssignError {
    pub worker: usize,
    pub connection: Connection,
}

/// Worker loops sharing one container, selected round-robin.
#[derive(Debug)]
pub struct WorkerPool {
    workers: Vec<WorkerLoop>,
    counter: AtomicUsize,
}

impl WorkerPool {
    /// Start `server.worker_count` loops and wait until all of them are ready.
    pub async fn start<C, H>(
        server: &ServerConfig,
        timeouts: &TimeoutConfig,
        container: Arc<C>,
        handler: Arc<H>,
        shutdown: CancellationToken,
    ) -> io::Result<Self>
    where
        C: Send + Sync + 'static,
        H: ConnectionHandler<C>,
    {
        let settings = LoopSettings {
            queue_depth: server.worker_queue_depth.max(1),
            shutdown_grace: timeouts.shutdown_grace(),
            shutdown,
        };

        let mut workers = Vec::with_capacity(server.worker_count);
        let mut pending = Vec::with_capacity(server.worker_count);
        for id in 0..server.worker_count {
            let (worker, ready) = WorkerLoop::spawn(
                id,
                Arc::clone(&container),
                Arc::clone(&handler),
                settings.clone(),
            )?;
            workers.push(worker);
            pending.push(ready);
        }

        for ready in pending {
            ready
                .await
                .map_err(|_| io::Error::other("worker loop exited during startup"))??;
        }

        tracing::info!(workers = workers.len(), "Worker pool started");
        Ok(Self {
            workers,
            counter: AtomicUsize::new(0),
        })
    }

    /// Index of the loop that takes the next connection.
    fn next_index(&self) -> usize {
        self.counter.fetch_add(1, Ordering::Relaxed) % self.workers.len()
    }

    /// Hand a connection to the next loop in rotation.
    ///
    /// Waits only when that loop's queue is full; loops never wait on each other.
    pub async fn assign(&self, connection: Connection) -> Result<usize, AssignError> {
        let index = self.next_index();
        self.workers[index]
            .submit(connection)
            .await
            .map_err(|connection| AssignError {
                worker: index,
                connection,
            })?;
        Ok(index)
    }

    /// `(worker id, live connections)` for every loop.
    pub fn active_connections(&self) -> Vec<(usize, usize)> {
        self.workers
            .iter()
            .map(|worker| (worker.id(), worker.active()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Close every queue and wait for the loops to drain and exit.
    pub async fn shutdown(self) {
        let threads: Vec<_> = self
            .workers
            .into_iter()
            .filter_map(WorkerLoop::into_thread)
            .collect();

        let joined = tokio::task::spawn_blocking(move || {
            for thread in threads {
                if thread.join().is_err() {
                    tracing::warn!("Worker loop panicked");
                }
            }
        })
        .await;

        if joined.is_err() {
            tracing::warn!("Failed to join worker loops");
        }
        tracing::info!("Worker pool stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::admission::AdmissionGuard;
    use crate::worker::worker_loop::WorkerContext;
    use futures_util::future::LocalBoxFuture;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::net::{TcpListener, TcpStream};

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(usize, &'static str, String)>>,
    }

    impl ConnectionHandler<&'static str> for Recorder {
        fn handle(
            &self,
            connection: Connection,
            worker: WorkerContext<&'static str>,
        ) -> LocalBoxFuture<'static, ()> {
            let thread = std::thread::current().name().unwrap_or_default().to_string();
            self.seen
                .lock()
                .unwrap()
                .push((worker.id(), **worker.container(), thread));
            drop(connection);
            Box::pin(async {})
        }
    }

    async fn accepted(
        listener: &TcpListener,
        guard: &Arc<AdmissionGuard>,
    ) -> (Connection, TcpStream) {
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (stream, peer) = listener.accept().await.unwrap();
        let permit = guard.admit(peer.ip()).unwrap();
        (Connection::new(stream, peer, permit).unwrap(), client)
    }

    fn server_config(workers: usize) -> ServerConfig {
        ServerConfig {
            worker_count: workers,
            worker_queue_depth: 4,
            ..ServerConfig::default()
        }
    }

    #[tokio::test]
    async fn assigns_round_robin_with_container() {
        let recorder = Arc::new(Recorder::default());
        let pool = WorkerPool::start(
            &server_config(2),
            &TimeoutConfig::default(),
            Arc::new("app"),
            Arc::clone(&recorder),
            CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(pool.len(), 2);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let guard = Arc::new(AdmissionGuard::new(16));
        let mut clients = Vec::new();
        let mut assigned = Vec::new();
        for _ in 0..4 {
            let (connection, client) = accepted(&listener, &guard).await;
            clients.push(client);
            assigned.push(pool.assign(connection).await.unwrap());
        }
        assert_eq!(assigned, vec![0, 1, 0, 1]);

        pool.shutdown().await;

        let seen = recorder.seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 4);
        for (worker, container, thread) in seen {
            assert_eq!(container, "app");
            assert_eq!(thread, format!("engine-worker-{}", worker));
        }
        // Every handler dropped its connection, so every permit came back.
        assert_eq!(guard.tracked_peers(), 0);
    }

    /// Panics while serving the first connection it gets, records the rest.
    #[derive(Default)]
    struct PanicsOnce {
        calls: AtomicUsize,
        served: Arc<AtomicUsize>,
    }

    impl ConnectionHandler<&'static str> for PanicsOnce {
        fn handle(
            &self,
            connection: Connection,
            _worker: WorkerContext<&'static str>,
        ) -> LocalBoxFuture<'static, ()> {
            let served = Arc::clone(&self.served);
            let first = self.calls.fetch_add(1, Ordering::SeqCst) == 0;
            Box::pin(async move {
                let _connection = connection;
                tokio::task::yield_now().await;
                if first {
                    panic!("connection task failed");
                }
                served.fetch_add(1, Ordering::SeqCst);
            })
        }
    }

    #[tokio::test]
    async fn panicking_connection_is_released_and_loop_survives() {
        let handler = PanicsOnce::default();
        let served = Arc::clone(&handler.served);
        let pool = WorkerPool::start(
            &server_config(1),
            &TimeoutConfig::default(),
            Arc::new("app"),
            Arc::new(handler),
            CancellationToken::new(),
        )
        .await
        .unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let guard = Arc::new(AdmissionGuard::new(4));
        let mut clients = Vec::new();
        for _ in 0..2 {
            let (connection, client) = accepted(&listener, &guard).await;
            clients.push(client);
            pool.assign(connection).await.unwrap();
        }

        for _ in 0..100 {
            if served.load(Ordering::SeqCst) == 1 && pool.active_connections()[0].1 == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(served.load(Ordering::SeqCst), 1);
        assert_eq!(pool.active_connections(), vec![(0, 0)]);
        assert_eq!(guard.tracked_peers(), 0);

        pool.shutdown().await;
    }

    #[tokio::test]
    async fn cancelled_pool_refuses_assignment() {
        let shutdown = CancellationToken::new();
        let pool = WorkerPool::start(
            &server_config(1),
            &TimeoutConfig::default(),
            Arc::new("app"),
            Arc::new(Recorder::default()),
            shutdown.clone(),
        )
        .await
        .unwrap();

        shutdown.cancel();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let guard = Arc::new(AdmissionGuard::new(1));
        let (connection, _client) = accepted(&listener, &guard).await;

        let err = pool.assign(connection).await.unwrap_err();
        assert_eq!(err.worker, 0);
        drop(err);
        assert_eq!(guard.tracked_peers(), 0);

        pool.shutdown().await;
    }
}
