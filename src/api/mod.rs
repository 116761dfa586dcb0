//! HTTP API surface.

pub mod mappings;
pub mod routes;
pub mod usage;

pub use routes::{serve, AppState};
