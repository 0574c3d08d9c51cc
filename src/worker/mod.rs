//! Worker pool subsystem.
//!
//! # Data Flow
//! ```text
//! Admitted connection (dispatcher)
//!     → pool.rs (round-robin pick, bounded hand-off queue)
//!     → worker_loop.rs (own thread, current-thread runtime + LocalSet)
//!     → ConnectionHandler::handle (pipeline runs as a local task)
//! ```
//!
//! # Design Decisions
//! - Fixed pool size chosen at startup
//! - The container is injected when a loop is spawned, before it is ready
//! - A full queue stalls the dispatcher only, never another loop
//! - Each loop drains its own connections on shutdown

pub mod pool;
pub mod worker_loop;

pub use pool::{AssignError, WorkerPool};
pub use worker_loop::{ConnectionHandler, WorkerContext, WorkerLoop};
