//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, fallback into the dispatch pipeline)
//!     → request.rs (request ID, per-request cancellation)
//!     → [dispatch pipeline picks a resource handler]
//!     → response.rs (envelope: status, headers, chunked body)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{RequestId, X_REQUEST_ID};
pub use response::{ContentEncoding, ResponseEnvelope, ResponseWriter};
pub use server::HttpServer;
