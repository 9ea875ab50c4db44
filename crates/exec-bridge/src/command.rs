//! Turns a start request into the command a session runs.

use std::path::Path;

use exec_bridge_core::{CommandSettings, CommandSpec, Error, Result};

/// Build the invocation for `target` plus the user's argument string.
///
/// The result is the configured program and arguments, then the target
/// path, then `arg_string` split with POSIX shell quoting rules.
pub fn build_command(settings: &CommandSettings, target: &Path, arg_string: &str) -> Result<CommandSpec> {
    let extra = shlex::split(arg_string).ok_or_else(|| {
        Error::InvalidArguments(format!("unbalanced quotes or trailing escape in: {arg_string}"))
    })?;

    Ok(settings
        .base_spec()
        .arg(target.to_string_lossy())
        .args(extra))
}
