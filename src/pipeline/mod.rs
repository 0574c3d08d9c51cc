//! Connection pipeline subsystem.
//!
//! # Data Flow
//! ```text
//! socket bytes
//!     → Decoder (stage.rs: tokio_util Decoder + Reject)
//!     → Responder (stage.rs: application, may suspend)
//!     → Encoder (stage.rs: tokio_util Encoder + ResponseEncoder)
//!     → socket bytes
//!
//! On upgrade:
//!     last response flushed → upgrade.rs (socket + unread bytes) → handler
//! ```
//!
//! # Design Decisions
//! - One request in flight per connection: each stage pulls only after its
//!   previous output was accepted downstream
//! - Responses leave in request order
//! - Failures end the connection, never the worker loop

pub mod runner;
pub mod stage;
pub mod upgrade;

pub use runner::{Outcome, Pipeline, PipelineError};
pub use stage::{Reject, RequestContext, Responder, ResponderError, ResponseEncoder};
pub use upgrade::{Io, UpgradeHandler, Upgraded};
