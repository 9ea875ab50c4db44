//! Output events flowing from a process to its stream subscriber.

use serde::{Deserialize, Serialize};

/// Which output descriptor a chunk was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    /// Standard output
    Stdout,
    /// Standard error
    Stderr,
}

impl StreamKind {
    /// Wire name of the stream.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

/// Raw bytes read from one of the child's output descriptors.
///
/// Bytes are passed through untouched, control sequences included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputChunk {
    /// Source descriptor
    pub stream: StreamKind,
    /// Raw bytes
    pub data: Vec<u8>,
}

impl OutputChunk {
    /// Create a new chunk.
    pub fn new(stream: StreamKind, data: impl Into<Vec<u8>>) -> Self {
        Self {
            stream,
            data: data.into(),
        }
    }

    /// Chunk read from stdout.
    pub fn stdout(data: impl Into<Vec<u8>>) -> Self {
        Self::new(StreamKind::Stdout, data)
    }

    /// Chunk read from stderr.
    pub fn stderr(data: impl Into<Vec<u8>>) -> Self {
        Self::new(StreamKind::Stderr, data)
    }

    /// Number of bytes carried.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the chunk carries no bytes.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// One event in a session's output sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    /// Output bytes from stdout or stderr
    Output(OutputChunk),
    /// Buffered output was discarded while the subscriber fell behind
    Truncated {
        /// Number of bytes dropped
        dropped_bytes: usize,
    },
    /// The process exited on its own (terminal)
    Exit {
        /// Exit code; signal deaths are reported as 128 + signal
        code: i32,
    },
    /// The process was terminated on request (terminal)
    Killed,
}

impl OutputEvent {
    /// Whether this event ends the sequence.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Exit { .. } | Self::Killed)
    }
}

impl From<OutputChunk> for OutputEvent {
    fn from(chunk: OutputChunk) -> Self {
        Self::Output(chunk)
    }
}
