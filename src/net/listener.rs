//! TCP listener implementation.
//!
//! # Responsibilities
//! - Resolve the configured hostname
//! - Bind and listen with the configured backlog
//! - Accept incoming TCP connections

use std::net::SocketAddr;

use tokio::net::{lookup_host, TcpListener, TcpSocket, TcpStream};

/// Error type for listener operations.
#[derive(Debug)]
pub enum ListenerError {
    /// Hostname did not resolve to any address.
    Resolve(String, std::io::Error),
    /// Failed to bind to address.
    Bind(std::io::Error),
    /// Failed to start listening.
    Listen(std::io::Error),
    /// Failed to accept connection.
    Accept(std::io::Error),
}

impl std::fmt::Display for ListenerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerError::Resolve(host, e) => write!(f, "Failed to resolve {}: {}", host, e),
            ListenerError::Bind(e) => write!(f, "Failed to bind: {}", e),
            ListenerError::Listen(e) => write!(f, "Failed to listen: {}", e),
            ListenerError::Accept(e) => write!(f, "Failed to accept: {}", e),
        }
    }
}

impl std::error::Error for ListenerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ListenerError::Resolve(_, e)
            | ListenerError::Bind(e)
            | ListenerError::Listen(e)
            | ListenerError::Accept(e) => Some(e),
        }
    }
}

/// A bound and listening TCP socket.
#[derive(Debug)]
pub struct Listener {
    inner: TcpListener,
    local_addr: SocketAddr,
}

impl Listener {
    /// Resolve `hostname`, then bind and listen on the first address that works.
    pub async fn bind(hostname: &str, port: u16, backlog: u32) -> Result<Self, ListenerError> {
        let addrs: Vec<SocketAddr> = lookup_host((hostname, port))
            .await
            .map_err(|e| ListenerError::Resolve(hostname.to_string(), e))?
            .collect();

        let mut last_err = None;
        for addr in addrs {
            match Self::bind_addr(addr, backlog) {
                Ok(listener) => {
                    tracing::info!(
                        address = %listener.local_addr,
                        backlog,
                        "Listener bound"
                    );
                    return Ok(listener);
                }
                Err(e) => {
                    tracing::debug!(address = %addr, error = %e, "Bind attempt failed");
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            ListenerError::Resolve(
                hostname.to_string(),
                std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses resolved"),
            )
        }))
    }

    fn bind_addr(addr: SocketAddr, backlog: u32) -> Result<Self, ListenerError> {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(ListenerError::Bind)?;

        socket.set_reuseaddr(true).map_err(ListenerError::Bind)?;
        socket.bind(addr).map_err(ListenerError::Bind)?;

        let inner = socket.listen(backlog).map_err(ListenerError::Listen)?;
        let local_addr = inner.local_addr().map_err(ListenerError::Listen)?;

        Ok(Self { inner, local_addr })
    }

    /// Accept a new connection.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr), ListenerError> {
        self.inner.accept().await.map_err(ListenerError::Accept)
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn binds_ephemeral_port() {
        let listener = Listener::bind("127.0.0.1", 0, 16).await.unwrap();
        assert!(listener.local_addr().ip().is_loopback());
        assert_ne!(listener.local_addr().port(), 0);
    }

    #[tokio::test]
    async fn accepts_connection() {
        let listener = Listener::bind("127.0.0.1", 0, 16).await.unwrap();
        let addr = listener.local_addr();

        let client = tokio::spawn(async move { TcpStream::connect(addr).await.unwrap() });
        let (_stream, peer) = listener.accept().await.unwrap();
        let client = client.await.unwrap();

        assert_eq!(peer, client.local_addr().unwrap());
    }

    #[tokio::test]
    async fn occupied_port_is_bind_error() {
        let first = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = first.local_addr().unwrap().port();

        let err = Listener::bind("127.0.0.1", port, 16).await.unwrap_err();
        assert!(matches!(err, ListenerError::Bind(_) | ListenerError::Listen(_)));
    }
}
