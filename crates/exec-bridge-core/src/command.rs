//! Command specification for spawned processes.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A fully resolved process invocation. Immutable once a session owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Program to execute
    pub program: String,
    /// Arguments, already split
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory for the child
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// Extra environment variables layered over the server's own
    #[serde(default)]
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    /// Create a command with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            env: Vec::new(),
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the working directory.
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Add an environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Render the invocation as a shell-quoted command line.
    pub fn command_line(&self) -> String {
        let words = std::iter::once(self.program.as_str()).chain(self.args.iter().map(String::as_str));
        // try_join only fails on NUL bytes, which no OS accepts in argv anyway
        shlex::try_join(words.clone()).unwrap_or_else(|_| words.collect::<Vec<_>>().join(" "))
    }
}

impl std::fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.command_line())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let spec = CommandSpec::new("python3")
            .args(["-u", "upload.py"])
            .arg("/data/show")
            .working_dir("/opt/app")
            .env("PYTHONUNBUFFERED", "1");

        assert_eq!(spec.program, "python3");
        assert_eq!(spec.args, vec!["-u", "upload.py", "/data/show"]);
        assert_eq!(spec.working_dir, Some(PathBuf::from("/opt/app")));
        assert_eq!(spec.env.len(), 1);
    }

    #[test]
    fn test_command_line_quotes_spaces() {
        let spec = CommandSpec::new("python3")
            .arg("upload.py")
            .arg("/data/My Movie (2020).mkv");
        let line = spec.command_line();
        assert!(line.starts_with("python3 upload.py "));
        assert_eq!(
            shlex::split(&line).unwrap(),
            vec!["python3", "upload.py", "/data/My Movie (2020).mkv"]
        );
    }

    #[test]
    fn test_display_matches_command_line() {
        let spec = CommandSpec::new("echo").arg("hi");
        assert_eq!(spec.to_string(), "echo hi");
    }
}
