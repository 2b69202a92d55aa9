use crate::config::ThreadIdConvention;
use crate::error::WidgetError;
use async_stream::stream;
use futures::{Stream, StreamExt, pin_mut};
use std::fmt::Display;

/// In-body delimiter between message text and trailing thread identity
pub const THREAD_ID_SEPARATOR: char = '\u{1f}';

/// Events produced while reconciling a streamed reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Full visible content accumulated so far, not just the delta
    Snapshot(String),
    /// End of data
    Finished(StreamReply),
}

/// Final outcome of a streamed reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamReply {
    pub content: String,
    /// Only ever set under the separator convention
    pub thread_id: Option<String>,
}

/// Accumulator for a streamed reply
#[derive(Debug, Clone)]
pub struct StreamState {
    /// Visible message text
    text_buffer: String,
    /// Trailing bytes of an incomplete UTF-8 sequence
    pending: Vec<u8>,
    /// Text after the separator, once one has been seen
    thread_tail: Option<String>,
    split_on_separator: bool,
}

impl StreamState {
    pub fn new(convention: ThreadIdConvention) -> Self {
        Self {
            text_buffer: String::new(),
            pending: Vec::new(),
            thread_tail: None,
            split_on_separator: convention == ThreadIdConvention::Separator,
        }
    }

    /// Decode a chunk and fold it into the accumulator. Returns the full
    /// visible content.
    pub fn push_chunk(&mut self, bytes: &[u8]) -> &str {
        let text = self.decode(bytes);
        self.push_text(&text);
        &self.text_buffer
    }

    fn push_text(&mut self, text: &str) {
        if let Some(tail) = self.thread_tail.as_mut() {
            tail.push_str(text);
            return;
        }

        match text.find(THREAD_ID_SEPARATOR) {
            Some(pos) if self.split_on_separator => {
                self.text_buffer.push_str(&text[..pos]);
                let rest = &text[pos + THREAD_ID_SEPARATOR.len_utf8()..];
                self.thread_tail = Some(rest.to_string());
            }
            _ => self.text_buffer.push_str(text),
        }
    }

    /// Incremental UTF-8 decode. Incomplete trailing sequences wait for the
    /// next chunk; invalid bytes become U+FFFD.
    fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    break;
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match err.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + len);
                        }
                        None => {
                            self.pending.drain(..valid);
                            break;
                        }
                    }
                }
            }
        }

        out
    }

    pub fn content(&self) -> &str {
        &self.text_buffer
    }

    /// Flush any dangling bytes and produce the final reply
    pub fn finalize(mut self) -> StreamReply {
        if !self.pending.is_empty() {
            self.pending.clear();
            self.push_text(&char::REPLACEMENT_CHARACTER.to_string());
        }

        let thread_id = self
            .thread_tail
            .map(|tail| tail.trim().to_string())
            .filter(|tail| !tail.is_empty());

        StreamReply {
            content: self.text_buffer,
            thread_id,
        }
    }
}

/// Reconcile a byte source into content snapshots.
///
/// One `Snapshot` per chunk, then a single `Finished`. A read failure is
/// yielded as `StreamRead` and ends the stream; snapshots already yielded
/// stand.
pub fn resolve_stream<S, B, E>(
    source: S,
    convention: ThreadIdConvention,
) -> impl Stream<Item = Result<StreamEvent, WidgetError>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
{
    stream! {
        pin_mut!(source);
        let mut state = StreamState::new(convention);
        let mut chunks = 0usize;
        let mut failed = false;

        while let Some(chunk) = source.next().await {
            match chunk {
                Ok(bytes) => {
                    chunks += 1;
                    let content = state.push_chunk(bytes.as_ref()).to_string();
                    yield Ok(StreamEvent::Snapshot(content));
                }
                Err(err) => {
                    tracing::debug!(chunks, "Stream read failed");
                    failed = true;
                    yield Err(WidgetError::StreamRead(err.to_string()));
                    break;
                }
            }
        }

        if !failed {
            tracing::debug!(chunks, "Stream complete");
            yield Ok(StreamEvent::Finished(state.finalize()));
        }
    }
}
