//! Package feed server library.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http::server (axum, request id, timeout, limits)
//!                         │
//!                         ▼
//!                     dispatch::Pipeline ──── first matching handler ───┐
//!                         │                                            │
//!                         │   routing::matcher (verbs, paths, ext.)    │
//!                         │   resources::ResourceRegistry (/v3/...)    │
//!                         ▼                                            ▼
//!                     services::* ─────▶ storage (enumerate, content, publish, status)
//!                         │
//!                         ▼
//!     Client Response ◀── http::response (envelope, gzip, chunked body)
//! ```
//!
//! Cross-cutting: `config` (TOML), `observability` (tracing, Prometheus),
//! `lifecycle` (signals, graceful shutdown).

pub mod config;
pub mod dispatch;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resources;
pub mod routing;
pub mod services;
pub mod storage;

pub use config::schema::FeedConfig;
pub use dispatch::{DispatchError, Pipeline, RequestContext, ResourceHandler};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use resources::{ApiVersion, FeedOptions, RegistryError, ResourceRegistry, ResourceType};
