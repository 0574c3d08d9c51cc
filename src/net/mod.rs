//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (resolve, bind, listen with backlog)
//!     → dispatcher.rs (accept loop)
//!     → admission.rs (per-address ceiling, silent rejection)
//!     → connection.rs (id + permit, detached from the accepting runtime)
//!     → worker pool (round-robin)
//! ```
//!
//! # Design Decisions
//! - Rejected sockets are closed before any byte is read or written
//! - Admission slots are released by dropping the permit

pub mod admission;
pub mod connection;
pub mod dispatcher;
pub mod listener;

pub use admission::{AdmissionGuard, PeerPermit};
pub use connection::{Connection, ConnectionId};
pub use dispatcher::Dispatcher;
pub use listener::{Listener, ListenerError};
