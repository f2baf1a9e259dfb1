//! Request middleware.
//!
//! Layer order, outermost first:
//! ```text
//! TraceLayer → CatchPanicLayer → observe → TimeoutLayer → authenticate → handler
//! ```

pub mod authenticate;
pub mod observe;

pub use authenticate::authenticate;
pub use observe::{is_skipped, observe, CLIENT_CLOSED_REQUEST};
