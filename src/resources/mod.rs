//! Resource model subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     FeedConfig
//!     → options.rs (feature modules register ResourceType → path)
//!     → FeedOptions (immutable)
//!     → registry.rs (validate, freeze as ResourceRegistry)
//!     → shared via Arc to matcher, redirector and handlers
//!
//! Per request:
//!     handler asks registry for versioned paths ("/v3" + "/query")
//! ```
//!
//! # Design Decisions
//! - Resource paths are never hard-coded outside feature registration
//! - A missing API version or resource is a configuration error, raised at startup
//! - Registry is read-only after construction (no locks on the request path)

pub mod options;
pub mod registry;
pub mod types;

pub use options::{ApiVersion, FeedOptions, ResourceMap};
pub use registry::{RegistryError, ResourceRegistry};
pub use types::ResourceType;
