//! HTTP pipeline.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, layers)
//!     → middleware/observe.rs (correlation.rs, context.rs, capture.rs)
//!     → middleware/authenticate.rs (caller identity)
//!     → directory API / reporting handlers (error.rs)
//!     → response tap fires audit + performance records
//!     → Send to client
//! ```

pub mod capture;
pub mod context;
pub mod correlation;
pub mod error;
pub mod middleware;
pub mod server;

pub use context::RequestContext;
pub use correlation::{CorrelationId, X_CORRELATION_ID};
pub use error::{ApiError, ErrorDetail};
pub use server::{AppState, HttpServer};
