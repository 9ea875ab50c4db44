//! # exec-bridge-session
//!
//! Session lifecycle management for the exec-bridge server.
//!
//! This crate provides:
//! - Output delivery to a single stream subscriber with bounded buffering
//! - Session state tracking and exactly-once terminal events
//! - Session termination
//! - Session registry management and pruning
//!
//! ## Architecture
//!
//! This is Layer 2 in the architecture - it depends on exec-bridge-core
//! and exec-bridge-process to manage process session lifecycles.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod broadcaster;
pub mod registry;
pub mod session;

// Re-export commonly used types
pub use broadcaster::{OutputBroadcaster, Phase, Subscription};
pub use registry::{RegistryConfig, SessionRegistry};
pub use session::{Session, SessionOptions};
