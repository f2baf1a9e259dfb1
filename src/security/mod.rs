//! Caller authentication.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → api_key.rs (X-API-Key lookup)
//!     → identity.rs (CallerIdentity, descriptor for records)
//!     → identity placed in request and response extensions
//! ```
//!
//! # Design Decisions
//! - Enforcement is optional; without `auth.required` an unknown caller passes
//!   through as `unauthenticated`
//! - Every presented key produces an AUTH_SUCCESS or AUTH_FAILURE audit event

pub mod api_key;
pub mod identity;

pub use api_key::{ApiKeyRegistry, KeyCheck, X_API_KEY};
pub use identity::{describe, CallerIdentity};
