//! # exec-bridge
//!
//! HTTP front end of the interactive session bridge.
//!
//! This crate provides:
//! - Directory browsing below configured roots
//! - Command-line construction from a selected path and an argument string
//! - The session endpoints (start, stream, input, kill) over HTTP and SSE
//!
//! ## Architecture
//!
//! This is Layer 3 - the server binary that ties together:
//! - exec-bridge-core: Core types and configuration
//! - exec-bridge-session: Session lifecycle and registry
//!
//! The actual server binary is in main.rs.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod browse;
pub mod command;
pub mod http;

// Re-export commonly used types
pub use api::ApiResponse;
pub use browse::{DirEntry, DirectoryLister, EntryKind};
pub use command::build_command;
pub use http::{router, AppState};
