//! Server-push stream decoding
//!
//! Both backend channels speak the same framing: UTF-8 text, one logical
//! event per frame, `field: value` lines inside a frame, frames separated
//! by a blank line. [`FrameDecoder`] turns an arbitrarily-chunked byte
//! stream into complete frames, holding the trailing incomplete fragment
//! across reads so chunk boundaries never corrupt an event.
//!
//! Per-frame problems (invalid UTF-8, missing `data:`, malformed JSON) are
//! diagnostics, not stream failures: the frame is dropped and decoding
//! continues. Only the transport can end a stream.

use tracing::warn;

use crate::core::events::{SiblingEvent, StreamEvent};

const FRAME_DELIMITER: &[u8] = b"\n\n";

/// Incremental splitter from raw bytes to complete frames.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Absorb one transport chunk and return every frame it completed.
    ///
    /// The bytes after the last delimiter stay buffered until a later
    /// chunk (or [`finish`](Self::finish)) completes them.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = memchr::memmem::find(&self.buffer, FRAME_DELIMITER) {
            let raw: Vec<u8> = self.buffer.drain(..pos + FRAME_DELIMITER.len()).collect();
            match std::str::from_utf8(&raw[..pos]) {
                Ok(frame) => {
                    let trimmed = frame.trim();
                    if !trimmed.is_empty() {
                        frames.push(trimmed.to_string());
                    }
                }
                Err(err) => {
                    warn!("dropping frame with invalid UTF-8: {err}");
                }
            }
        }
        frames
    }

    /// Flush the trailing fragment at end-of-stream, if any.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        match std::str::from_utf8(&rest) {
            Ok(frame) => {
                let trimmed = frame.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            Err(err) => {
                warn!("dropping trailing fragment with invalid UTF-8: {err}");
                None
            }
        }
    }
}

/// Fields of one frame. Later occurrences of a field win, matching the
/// backend's framing.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: Option<String>,
}

impl SseFrame {
    pub fn parse(raw: &str) -> Self {
        let mut frame = SseFrame::default();
        for line in raw.lines() {
            if let Some(value) = line.strip_prefix("event:") {
                frame.event = Some(value.trim_start().to_string());
            } else if let Some(value) = line.strip_prefix("data:") {
                frame.data = Some(value.trim_start().to_string());
            }
        }
        frame
    }

    /// Keep-alive frames carry no payload worth decoding.
    pub fn is_heartbeat(&self) -> bool {
        self.event.as_deref() == Some("heartbeat")
    }
}

/// Decode one raw frame as a chat [`StreamEvent`]. Returns `None` for
/// frames without a payload or with a malformed one.
pub fn decode_stream_event(raw: &str) -> Option<StreamEvent> {
    let frame = SseFrame::parse(raw);
    let data = frame.data?;
    match serde_json::from_str(&data) {
        Ok(event) => Some(event),
        Err(err) => {
            warn!("skipping malformed chat event: {err}: {data}");
            None
        }
    }
}

/// Decode one raw frame as a [`SiblingEvent`]. Heartbeats and payload-less
/// frames yield `None` silently; malformed JSON yields `None` with a
/// diagnostic.
pub fn decode_sibling_event(raw: &str) -> Option<SiblingEvent> {
    let frame = SseFrame::parse(raw);
    if frame.is_heartbeat() {
        return None;
    }
    let data = frame.data?;
    match serde_json::from_str(&data) {
        Ok(event) => Some(event),
        Err(err) => {
            warn!("skipping malformed sibling event: {err}: {data}");
            None
        }
    }
}
