//! Reassembly of incrementally streamed assistant content.
//!
//! Fragments arrive as `token` frames carrying an in-flight message id.
//! Buffers are keyed by that id rather than by position in the message
//! list, so a late or interleaved stream can never corrupt an unrelated
//! message.

use std::collections::HashMap;

/// Accumulates content fragments per in-flight message id.
#[derive(Debug, Default)]
pub struct StreamReassembler {
    buffers: HashMap<String, String>,
    in_flight: Option<String>,
}

impl StreamReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a fragment to the buffer for `message_id` and returns the
    /// accumulated content so far. The id becomes the in-flight stream.
    pub fn append(&mut self, message_id: &str, fragment: &str) -> &str {
        if self.in_flight.as_deref() != Some(message_id) {
            self.in_flight = Some(message_id.to_string());
        }
        let buffer = self.buffers.entry(message_id.to_string()).or_default();
        buffer.push_str(fragment);
        buffer
    }

    /// Finalizes the in-flight stream.
    ///
    /// Returns the message id and its final content: the authoritative
    /// `final_content` when the server provided one, otherwise the
    /// accumulated buffer. Returns `None` when no stream is in flight
    /// (a bare `complete` frame is a no-op).
    pub fn finalize(&mut self, final_content: Option<String>) -> Option<(String, String)> {
        let id = self.in_flight.take()?;
        let accumulated = self.buffers.remove(&id).unwrap_or_default();
        Some((id, final_content.unwrap_or(accumulated)))
    }

    /// Id of the stream currently being reassembled, if any.
    pub fn in_flight(&self) -> Option<&str> {
        self.in_flight.as_deref()
    }

    /// Discards all buffers and the in-flight marker. Used on error
    /// frames and session replacement.
    pub fn reset(&mut self) {
        self.buffers.clear();
        self.in_flight = None;
    }
}
