//! Request routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, path, query)
//!     → matcher.rs (verb, exact path, legacy path, extension checks)
//!     → handler decides match / no match
//!
//! Request addressing an old or implicit API version:
//!     → redirect.rs (rewrite first segment to "/v{current}")
//!     → 301/302 with Location
//! ```
//!
//! # Design Decisions
//! - Matchers are built from the registry at startup, immutable at runtime
//! - No regex in hot path (segment comparisons only)
//! - Deterministic: same input always yields same decision

pub mod matcher;
pub mod redirect;

pub use matcher::{Matcher, RequestMatcher};
pub use redirect::VersionRedirector;
