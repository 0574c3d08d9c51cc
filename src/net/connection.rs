//! Accepted connections and their identity.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Carry an admitted socket from the dispatcher to its worker loop
//! - Hold the admission permit for the connection's lifetime

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::net::admission::PeerPermit;

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// An admitted connection on its way to a worker loop.
///
/// The socket travels as a `std` stream because a tokio stream is bound to
/// the reactor that accepted it; the worker re-registers it with its own.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    peer: SocketAddr,
    stream: std::net::TcpStream,
    permit: PeerPermit,
}

impl Connection {
    /// Detach an accepted tokio stream from the accepting runtime.
    pub fn new(
        stream: tokio::net::TcpStream,
        peer: SocketAddr,
        permit: PeerPermit,
    ) -> std::io::Result<Self> {
        let stream = stream.into_std()?;
        Ok(Self {
            id: ConnectionId::new(),
            peer,
            stream,
            permit,
        })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Register the socket with the current runtime.
    ///
    /// Must be called from inside the worker loop that will drive it. The
    /// permit is returned separately so it outlives the pipeline.
    pub fn into_tokio(self) -> std::io::Result<(tokio::net::TcpStream, PeerPermit)> {
        self.stream.set_nonblocking(true)?;
        let stream = tokio::net::TcpStream::from_std(self.stream)?;
        Ok((stream, self.permit))
    }
}
