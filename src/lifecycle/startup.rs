//! Startup errors and the startup banner.
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Worker loops start before the listener binds (traffic only when ready)

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::{ServerConfig, ValidationError};
use crate::net::listener::ListenerError;

/// Errors that stop the server before it accepts traffic.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid configuration: {}", join(.0))]
    Config(Vec<ValidationError>),

    #[error("failed to start worker loops: {0}")]
    Worker(#[source] std::io::Error),

    #[error(transparent)]
    Listener(#[from] ListenerError),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Log the one-line startup banner.
pub fn announce(server: &ServerConfig, local_addr: SocketAddr) {
    tracing::info!(
        address = %local_addr,
        workers = server.worker_count,
        max_connections_per_ip = server.max_connections_per_ip,
        "Server starting on http://{}",
        server.authority()
    );
}
