//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     Signal received → shutdown token cancelled → stop accepting
//!     → in-flight requests drain → (drain deadline) abort token cancelled
//!     → remaining body writes stop → exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Every request gets a child of the abort token, never of the shutdown token
//! - Ordered shutdown: stop accept, drain, then cancel whatever is still writing

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
