//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validate config → Start worker loops → Bind listener → Banner
//!
//! Shutdown (shutdown.rs):
//!     Token cancelled → Stop accepting → Drain worker loops → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then workers, then listener
//! - Ordered shutdown: stop accept, drain, close
//! - Shutdown has timeout: connections dropped after the grace period

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::StartupError;
