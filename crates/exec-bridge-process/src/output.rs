//! Output side of a runner: reader tasks and the chunk sequence they feed.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use exec_bridge_core::{OutputChunk, StreamKind};

/// Size of a single read from a child pipe.
pub const READ_CHUNK_SIZE: usize = 4096;

/// Chunks in flight between the reader tasks and the consumer.
pub(crate) const CHANNEL_DEPTH: usize = 64;

/// Lazy sequence of output chunks from one child process.
///
/// Ends exactly when the child has closed both stdout and stderr.
#[derive(Debug)]
pub struct ProcessOutput {
    rx: mpsc::Receiver<OutputChunk>,
}

impl ProcessOutput {
    pub(crate) fn new(rx: mpsc::Receiver<OutputChunk>) -> Self {
        Self { rx }
    }

    /// Wait for the next chunk. `None` once both descriptors are closed.
    pub async fn next_chunk(&mut self) -> Option<OutputChunk> {
        self.rx.recv().await
    }
}

impl Stream for ProcessOutput {
    type Item = OutputChunk;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Copy one pipe into the chunk channel until EOF.
///
/// The task holds its own sender, so the channel closes once every reader
/// has returned.
pub(crate) fn spawn_reader<R>(
    stream: StreamKind,
    mut reader: R,
    tx: mpsc::Sender<OutputChunk>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buffer = vec![0u8; READ_CHUNK_SIZE];
        loop {
            match reader.read(&mut buffer).await {
                Ok(0) => {
                    debug!("{} closed", stream.as_str());
                    break;
                }
                Ok(n) => {
                    if tx.send(OutputChunk::new(stream, &buffer[..n])).await.is_err() {
                        debug!("{} consumer dropped, stopping reader", stream.as_str());
                        break;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("Error reading {}: {}", stream.as_str(), e);
                    break;
                }
            }
        }
    })
}
