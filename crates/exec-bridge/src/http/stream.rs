//! Server-sent event stream of a session's output.

use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use exec_bridge_core::{OutputEvent, StreamKind};
use exec_bridge_session::Subscription;

use super::error::ApiError;
use super::{parse_session_id, AppState};

/// JSON payload of one SSE event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireEvent {
    /// Informational banner, sent first
    System {
        /// Banner text
        data: String,
    },
    /// Text from stdout
    Stdout {
        /// Decoded text, control sequences intact
        data: String,
    },
    /// Text from stderr
    Stderr {
        /// Decoded text, control sequences intact
        data: String,
    },
    /// Output was dropped because the client fell behind
    Truncated {
        /// Number of bytes dropped
        dropped_bytes: usize,
    },
    /// The process exited on its own
    Exit {
        /// Exit code
        code: i32,
    },
    /// The process was killed on request
    Killed,
}

impl WireEvent {
    /// Render as an SSE event with a JSON data line.
    pub fn to_sse(&self) -> Event {
        Event::default().json_data(self).unwrap_or_else(|e| {
            warn!("Failed to encode stream event {:?}: {}", self, e);
            Event::default().comment("encoding error")
        })
    }

    fn output(stream: StreamKind, data: String) -> Self {
        match stream {
            StreamKind::Stdout => Self::Stdout { data },
            StreamKind::Stderr => Self::Stderr { data },
        }
    }
}

/// Incremental UTF-8 decoder for one byte stream.
///
/// Holds back an incomplete trailing sequence until the next chunk arrives.
/// Invalid bytes become U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    /// Decode the next chunk.
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        let mut buffer = std::mem::take(&mut self.pending);
        buffer.extend_from_slice(bytes);

        let mut out = String::with_capacity(buffer.len());
        let mut input: &[u8] = &buffer;
        loop {
            match std::str::from_utf8(input) {
                Ok(text) => {
                    out.push_str(text);
                    input = &[];
                    break;
                }
                Err(e) => {
                    let (valid, rest) = input.split_at(e.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            input = &rest[len..];
                        }
                        // Incomplete sequence at the end: wait for more bytes
                        None => {
                            input = rest;
                            break;
                        }
                    }
                }
            }
        }

        self.pending = input.to_vec();
        out
    }

    /// Flush whatever is held back once the stream has ended.
    pub fn finish(&mut self) -> String {
        let pending = std::mem::take(&mut self.pending);
        String::from_utf8_lossy(&pending).into_owned()
    }
}

/// Translates broadcaster events into wire events.
#[derive(Debug, Default)]
struct EventTranslator {
    stdout: Utf8Decoder,
    stderr: Utf8Decoder,
}

impl EventTranslator {
    fn decoder(&mut self, stream: StreamKind) -> &mut Utf8Decoder {
        match stream {
            StreamKind::Stdout => &mut self.stdout,
            StreamKind::Stderr => &mut self.stderr,
        }
    }

    /// Emit whatever either decoder is holding back.
    fn flush(&mut self) -> Vec<WireEvent> {
        let mut events = Vec::with_capacity(3);
        for stream in [StreamKind::Stdout, StreamKind::Stderr] {
            let rest = self.decoder(stream).finish();
            if !rest.is_empty() {
                events.push(WireEvent::output(stream, rest));
            }
        }
        events
    }

    fn translate(&mut self, event: OutputEvent) -> Vec<WireEvent> {
        match event {
            OutputEvent::Output(chunk) => {
                let text = self.decoder(chunk.stream).decode(&chunk.data);
                if text.is_empty() {
                    Vec::new()
                } else {
                    vec![WireEvent::output(chunk.stream, text)]
                }
            }
            // Bytes after a gap never continue a sequence from before it
            OutputEvent::Truncated { dropped_bytes } => {
                let mut events = self.flush();
                events.push(WireEvent::Truncated { dropped_bytes });
                events
            }
            terminal => {
                let mut events = self.flush();
                events.push(match terminal {
                    OutputEvent::Exit { code } => WireEvent::Exit { code },
                    _ => WireEvent::Killed,
                });
                events
            }
        }
    }
}

/// Banner first, then the subscription's events until the terminal one.
pub fn event_stream(
    banner: WireEvent,
    subscription: Subscription,
) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static {
    let mut translator = EventTranslator::default();
    let events = subscription
        .into_stream()
        .flat_map(move |event| futures::stream::iter(translator.translate(event)));

    futures::stream::iter([banner])
        .chain(events)
        .map(|event| Ok(event.to_sse()))
}

/// `GET /api/sessions/:id/stream`
pub async fn stream_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let session_id = parse_session_id(&id)?;
    let session = state.registry.get(&session_id)?;
    let subscription = session.attach()?;

    info!("Streaming session {}", session_id);
    let banner = WireEvent::System {
        data: format!("Executing: {}", session.command().command_line()),
    };

    Ok(Sse::new(event_stream(banner, subscription)).keep_alive(KeepAlive::default()))
}
