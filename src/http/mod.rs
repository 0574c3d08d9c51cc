//! HTTP/1.1 over the connection pipeline.
//!
//! # Data Flow
//! ```text
//! admitted connection (worker loop)
//!     → request.rs (httparse head + Content-Length body, limits)
//!     → Responder (application)
//!     → response.rs (status line, headers, body)
//!     → upgrade.rs (101 responses carry the handler that takes the socket)
//! ```
//!
//! # Design Decisions
//! - Chunked request bodies are refused with 501
//! - Classified decode errors are answered before the connection closes

pub mod request;
pub mod response;
pub mod server;
pub mod upgrade;

pub use request::{connection_codec, DecodeError, RequestDecoder};
pub use response::{error_response, ResponseEncoder};
pub use server::{EngineServer, RunningServer};
pub use upgrade::{requested_protocol, switching_protocols, OnUpgrade};
