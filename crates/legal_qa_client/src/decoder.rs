//! Server-sent-events decoder: raw response bytes → ordered `StreamEvent`s.
//!
//! Chunk boundaries from the transport carry no meaning. `LineDecoder` keeps
//! the incomplete trailing line of each chunk as a residual and prepends it to
//! the next one, so the same bytes decode to the same events however they were
//! split. Buffering is byte-level, which also keeps multi-byte UTF-8 sequences
//! intact across chunks. The residual is unbounded: a service that never
//! sends a newline grows it until the stream ends.

use std::collections::VecDeque;

use futures_util::{stream, Stream, StreamExt};

use crate::client::ClientError;
use crate::messages::{StreamEvent, StreamPayload};

const DATA_PREFIX: &str = "data: ";
const EVENT_PREFIX: &str = "event: ";

/// Incremental line splitter and record classifier.
#[derive(Debug, Default)]
pub struct LineDecoder {
    residual: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk; returns events for every line it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.residual.extend_from_slice(chunk);

        let mut events = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.residual[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            if let Some(event) = classify_line(&self.residual[start..end]) {
                events.push(event);
            }
            start = end + 1;
        }
        self.residual.drain(..start);
        events
    }

    /// End of data: an unterminated last line still counts as a record.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let rest = std::mem::take(&mut self.residual);
        classify_line(&rest).into_iter().collect()
    }

    /// Bytes held back waiting for a newline.
    pub fn residual_len(&self) -> usize {
        self.residual.len()
    }
}

/// Decode a complete byte sequence in one go.
pub fn decode_all(bytes: &[u8]) -> Vec<StreamEvent> {
    let mut decoder = LineDecoder::new();
    let mut events = decoder.feed(bytes);
    events.extend(decoder.finish());
    events
}

fn classify_line(raw: &[u8]) -> Option<StreamEvent> {
    let text = String::from_utf8_lossy(raw);
    let line = text.strip_suffix('\r').unwrap_or(&text);

    if let Some(data) = line.strip_prefix(DATA_PREFIX) {
        match serde_json::from_str::<StreamPayload>(data) {
            Ok(payload) => Some(StreamEvent::data(payload)),
            Err(e) => {
                tracing::warn!(error = %e, record = data, "skipping malformed data record");
                None
            }
        }
    } else if let Some(name) = line.strip_prefix(EVENT_PREFIX) {
        Some(StreamEvent::named(name))
    } else {
        if !line.is_empty() {
            tracing::trace!(line, "ignoring unrecognised line");
        }
        None
    }
}

struct DecodeState<S> {
    source: Option<S>,
    decoder: LineDecoder,
    pending: VecDeque<StreamEvent>,
}

/// Lazily decode a byte source into events.
///
/// The returned stream owns `source` and drops it as soon as it is exhausted
/// or fails; dropping the returned stream early releases it as well. A source
/// error is yielded once and ends the stream.
pub fn decode_stream<S>(source: S) -> impl Stream<Item = Result<StreamEvent, ClientError>> + Send
where
    S: Stream<Item = Result<Vec<u8>, ClientError>> + Send + Unpin + 'static,
{
    let state = DecodeState {
        source: Some(source),
        decoder: LineDecoder::new(),
        pending: VecDeque::new(),
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                return Some((Ok(event), state));
            }
            let source = state.source.as_mut()?;
            let next = source.next().await;
            match next {
                Some(Ok(chunk)) => {
                    let events = state.decoder.feed(&chunk);
                    state.pending.extend(events);
                }
                Some(Err(e)) => {
                    state.source = None;
                    tracing::debug!(error = %e, "byte source failed; released");
                    return Some((Err(e), state));
                }
                None => {
                    state.source = None;
                    tracing::debug!("byte source exhausted; released");
                    let events = state.decoder.finish();
                    state.pending.extend(events);
                }
            }
        }
    })
}
