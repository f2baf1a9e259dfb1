//! Request observability and audit pipeline for a directory-service HTTP API.

pub mod audit;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod performance;
pub mod reporting;
pub mod security;
pub mod store;

pub use config::schema::AppConfig;
pub use http::{AppState, HttpServer};
pub use lifecycle::{Pipeline, Shutdown};
