//! Process-level observability: logs and metrics.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events, `audit` fallback target)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout, JSON lines)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! The request audit trail and performance records live in `audit` and
//! `performance`; this module only carries the ambient signals.

pub mod logging;
pub mod metrics;
