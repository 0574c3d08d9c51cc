//! Connection acceptance and request processing for a concurrent HTTP server.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──▶ net::Listener ──▶ net::Dispatcher ──▶ net::AdmissionGuard
//!                                        │                (per-IP ceiling)
//!                                        ▼
//!                              worker::WorkerPool (round-robin)
//!                                        │
//!                ┌───────────────────────┼───────────────────────┐
//!                ▼                       ▼                       ▼
//!          worker loop 0           worker loop 1     ...   worker loop N-1
//!                │
//!                ▼
//!     pipeline::Pipeline: http::RequestDecoder → Responder → http::ResponseEncoder
//!                │
//!                └──▶ UpgradeHandler (101, with unread bytes)
//! ```

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod pipeline;
pub mod worker;

pub use crate::config::EngineConfig;
pub use crate::http::{EngineServer, RunningServer};
pub use crate::lifecycle::{Shutdown, StartupError};
pub use crate::pipeline::{RequestContext, Responder, ResponderError, Upgraded};
