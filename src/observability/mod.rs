//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! dispatcher / worker loops / pipelines produce:
//!     → logging.rs (structured log events, one span per connection)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → stdout
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Connection ID flows through every event of a connection
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
