//! # exec-bridge-core
//!
//! Core types for the exec-bridge session server.
//!
//! This crate contains all fundamental types with **no internal dependencies**
//! on other exec-bridge crates. It provides:
//!
//! - Session types (SessionId, SessionState, SessionInfo)
//! - Command specification for spawned processes
//! - Output events streamed to clients
//! - Error types
//! - Server configuration
//!
//! ## Architecture
//!
//! This is Layer 0 in the architecture - all other crates depend on this one,
//! but this crate has no dependencies on other exec-bridge crates.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod command;
pub mod config;
pub mod error;
pub mod event;
pub mod session;

// Re-export commonly used types
pub use command::CommandSpec;
pub use config::{BrowseSettings, CommandSettings, ServerConfig, ServerSettings, SessionSettings};
pub use error::{Error, Result};
pub use event::{OutputChunk, OutputEvent, StreamKind};
pub use session::{SessionId, SessionInfo, SessionState};
