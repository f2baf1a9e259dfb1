//! Request audit trail.
//!
//! # Data Flow
//! ```text
//! observe middleware / auth middleware / handlers
//!     → recorder.rs (caller descriptor, payload masking + truncation)
//!     → store::BackgroundWriter (bounded queue)
//!     → AuditStore
//!
//! reporting handlers / retention task
//!     → trail.rs (filtered reads, counts, cleanup)
//!
//! Every event is also logged on the `audit` tracing target.
//! ```

pub mod masking;
pub mod record;
pub mod recorder;
pub mod trail;

pub use record::{AuditRecord, LogType};
pub use recorder::{AuditRecorder, ErrorInfo, Payload};
pub use trail::AuditTrail;
