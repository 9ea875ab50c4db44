//! Per-session output delivery.
//!
//! The broadcaster sits between a session's output pump and at most one
//! stream subscriber. Output is queued in a byte-bounded buffer; when the
//! buffer is full the oldest output is dropped and the subscriber is told
//! how much it missed. The producer never waits for the subscriber.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::Stream;
use tokio::sync::{watch, Notify};
use tracing::{debug, info};

use exec_bridge_core::{Error, OutputChunk, OutputEvent, Result};

/// Delivery phase of a broadcaster. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    /// Output may still arrive
    Open,
    /// Terminal event recorded, not yet handed to a subscriber
    Finished,
    /// Terminal event handed to a subscriber; permanently closed
    Delivered,
}

#[derive(Debug, Default)]
struct BroadcastState {
    /// Output not yet handed to a subscriber
    queue: VecDeque<OutputChunk>,
    /// Sum of chunk lengths in `queue`
    buffered_bytes: usize,
    /// Bytes dropped since the last truncation marker
    dropped_bytes: usize,
    /// Terminal event, once recorded
    terminal: Option<OutputEvent>,
    /// Whether the terminal event went out
    delivered: bool,
    /// Token of the attached subscriber
    subscriber: Option<u64>,
    next_token: u64,
}

impl BroadcastState {
    fn push(&mut self, mut chunk: OutputChunk, capacity: usize) {
        if chunk.len() > capacity {
            let excess = chunk.len() - capacity;
            chunk.data.drain(..excess);
            self.dropped_bytes += excess;
        }

        while self.buffered_bytes + chunk.len() > capacity {
            match self.queue.pop_front() {
                Some(old) => {
                    self.buffered_bytes -= old.len();
                    self.dropped_bytes += old.len();
                }
                None => break,
            }
        }

        self.buffered_bytes += chunk.len();
        self.queue.push_back(chunk);
    }

    fn pop(&mut self) -> Option<OutputEvent> {
        if self.dropped_bytes > 0 {
            let dropped_bytes = std::mem::take(&mut self.dropped_bytes);
            return Some(OutputEvent::Truncated { dropped_bytes });
        }

        if let Some(chunk) = self.queue.pop_front() {
            self.buffered_bytes -= chunk.len();
            return Some(OutputEvent::Output(chunk));
        }

        if self.delivered {
            return None;
        }

        let terminal = self.terminal.clone()?;
        self.delivered = true;
        Some(terminal)
    }
}

/// Fan-out point between one session's output and its single subscriber.
#[derive(Debug)]
pub struct OutputBroadcaster {
    state: Mutex<BroadcastState>,
    /// Wakes the subscriber when something was queued
    notify: Notify,
    phase: watch::Sender<Phase>,
    capacity: usize,
}

impl OutputBroadcaster {
    /// Create a broadcaster buffering at most `capacity` bytes of output.
    pub fn new(capacity: usize) -> Self {
        let (phase, _) = watch::channel(Phase::Open);
        Self {
            state: Mutex::new(BroadcastState::default()),
            notify: Notify::new(),
            phase,
            capacity: capacity.max(1),
        }
    }

    /// Buffer capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Queue an output chunk. Never blocks.
    ///
    /// Output arriving after the terminal event is discarded.
    pub fn publish(&self, chunk: OutputChunk) {
        if chunk.is_empty() {
            return;
        }

        let mut state = self.lock();
        if state.terminal.is_some() {
            debug!("Discarding {} bytes published after terminal event", chunk.len());
            return;
        }
        state.push(chunk, self.capacity);
        drop(state);

        self.notify.notify_one();
    }

    /// Record the terminal event. Only the first call has any effect.
    ///
    /// Returns whether this call recorded the event.
    pub fn finish(&self, event: OutputEvent) -> bool {
        debug_assert!(event.is_terminal(), "finish() needs a terminal event");

        let mut state = self.lock();
        if state.terminal.is_some() {
            return false;
        }
        debug!("Terminal event recorded: {:?}", event);
        state.terminal = Some(event);
        drop(state);

        self.phase.send_replace(Phase::Finished);
        self.notify.notify_one();
        true
    }

    /// Bind the single subscriber.
    ///
    /// The subscriber first receives whatever is still buffered, then live
    /// events. A second concurrent attach is rejected with
    /// [`Error::SubscriberAttached`]; attaching after the terminal event was
    /// delivered fails with [`Error::StreamClosed`].
    pub fn attach(self: &Arc<Self>) -> Result<Subscription> {
        let mut state = self.lock();
        if state.delivered {
            return Err(Error::StreamClosed);
        }
        if state.subscriber.is_some() {
            return Err(Error::SubscriberAttached);
        }

        state.next_token += 1;
        let token = state.next_token;
        state.subscriber = Some(token);
        info!(
            "Subscriber attached: token={}, buffered={} bytes",
            token, state.buffered_bytes
        );

        Ok(Subscription {
            broadcaster: Arc::clone(self),
            token,
            done: false,
        })
    }

    /// Whether a subscriber is attached.
    pub fn is_attached(&self) -> bool {
        self.lock().subscriber.is_some()
    }

    /// Whether the terminal event has been recorded.
    pub fn is_finished(&self) -> bool {
        self.phase() >= Phase::Finished
    }

    /// Current delivery phase.
    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    /// Bytes of output waiting for a subscriber.
    pub fn buffered_bytes(&self) -> usize {
        self.lock().buffered_bytes
    }

    /// Resolve once the terminal event has been recorded.
    pub async fn wait_finished(&self) {
        self.wait_phase(Phase::Finished).await;
    }

    /// Resolve once the terminal event has been handed to a subscriber.
    ///
    /// "Handed over" means returned from [`Subscription::next`], not written
    /// to the client. A client that disconnects in between never sees the
    /// event, and the session is still pruned: the registry treats delivery
    /// as collection.
    pub async fn wait_delivered(&self) {
        self.wait_phase(Phase::Delivered).await;
    }

    async fn wait_phase(&self, target: Phase) {
        let mut rx = self.phase.subscribe();
        // The sender lives as long as self, so this cannot fail while we wait
        let _ = rx.wait_for(|phase| *phase >= target).await;
    }

    fn next_event(&self) -> Option<OutputEvent> {
        let mut state = self.lock();
        let event = state.pop()?;
        drop(state);

        if event.is_terminal() {
            self.phase.send_replace(Phase::Delivered);
        }
        Some(event)
    }

    fn detach(&self, token: u64) {
        let mut state = self.lock();
        if state.subscriber == Some(token) {
            state.subscriber = None;
            info!(
                "Subscriber detached: token={}, buffered={} bytes",
                token, state.buffered_bytes
            );
        }
    }

    fn lock(&self) -> MutexGuard<'_, BroadcastState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The attached end of a broadcaster. Dropping it detaches.
#[derive(Debug)]
pub struct Subscription {
    broadcaster: Arc<OutputBroadcaster>,
    token: u64,
    done: bool,
}

impl Subscription {
    /// Wait for the next event. `None` after the terminal event.
    pub async fn next(&mut self) -> Option<OutputEvent> {
        if self.done {
            return None;
        }

        loop {
            if let Some(event) = self.broadcaster.next_event() {
                if event.is_terminal() {
                    self.done = true;
                }
                return Some(event);
            }
            self.broadcaster.notify.notified().await;
        }
    }

    /// Turn the subscription into a stream; dropping the stream detaches.
    pub fn into_stream(self) -> impl Stream<Item = OutputEvent> + Send + 'static {
        futures::stream::unfold(self, |mut subscription| async move {
            let event = subscription.next().await?;
            Some((event, subscription))
        })
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.broadcaster.detach(self.token);
    }
}
