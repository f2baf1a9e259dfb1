//! Per-request performance records and their aggregation.
//!
//! # Data Flow
//! ```text
//! observe middleware
//!     → collector.rs (categorise, success flag, non-blocking submit)
//!     → store::BackgroundWriter → PerformanceStore
//!
//! reporting handlers
//!     → collector.rs (filtered reads)
//!     → aggregation.rs (summaries, percentiles, rankings)
//! ```

pub mod aggregation;
pub mod collector;
pub mod record;

pub use aggregation::{Aggregate, AggregationEngine};
pub use collector::{PerformanceCollector, RequestSample};
pub use record::{PerformanceCategory, PerformanceRecord};
