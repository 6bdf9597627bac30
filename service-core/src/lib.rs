//! service-core: Shared infrastructure for the identity workspace.
pub mod config;
pub mod error;
pub mod observability;

pub use axum;
