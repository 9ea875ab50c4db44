//! # exec-bridge-process
//!
//! Process lifecycle management for the exec-bridge server.
//!
//! This crate provides:
//! - Spawning a child with piped stdin/stdout/stderr
//! - A lazy sequence of tagged output chunks
//! - Ordered input forwarding
//! - Exit observation and graceful-then-forceful termination
//!
//! ## Architecture
//!
//! This is Layer 1 in the architecture - it depends on exec-bridge-core
//! and owns exactly one OS process per runner.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod output;
pub mod runner;
#[cfg(unix)]
mod signal;

// Re-export commonly used types
pub use output::ProcessOutput;
pub use runner::{ExitOutcome, ProcessRunner};
