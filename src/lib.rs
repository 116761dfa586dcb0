//! # Usage Dashboard
//!
//! Backend for a dashboard that displays an organization's API usage against
//! an upstream metering API, plus a small store mapping opaque API-key
//! identifiers to human-readable names.
//!
//! The interesting parts live in two leaf modules:
//!
//! ```text
//!        ┌──────────────────────────────────┐
//!        │      Pagination Aggregator       │
//!        │  (merges cursor-paginated pages) │
//!        └────────────────┬─────────────────┘
//!                         │ one request per page
//!                         ▼
//!                ┌─────────────────┐
//!                │ Resilient       │
//!                │ Fetcher         │
//!                │ (retry/backoff/ │
//!                │  timeout)       │
//!                └─────────────────┘
//! ```
//!
//! ## Modules
//! - `fetch`: shared retry/backoff/timeout wrapper for outbound HTTP
//! - `usage`: typed usage pages, the aggregator, and the upstream client
//! - `mappings`: file-backed API-key → name dictionary
//! - `api`: axum route handlers and server lifecycle
//! - `config`: environment-backed configuration behind a capability trait

pub mod api;
pub mod config;
pub mod fetch;
pub mod mappings;
pub mod usage;

pub use config::{Config, EnvProvider, ProcessEnv};
