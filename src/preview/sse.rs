//! Incremental `text/event-stream` decoding.
//!
//! Network chunks do not line up with event boundaries, so bytes are buffered
//! until a blank line closes an event. Only events carrying `data:` are
//! emitted; comments and `retry:` are skipped. An event cut off by the end of
//! the stream is discarded.

use crate::errors::{PreviewError, Result};

/// A single decoded server-sent event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseFrame {
    pub id: Option<String>,
    pub event: Option<String>,
    /// `data:` lines joined with `\n`.
    pub data: String,
}

/// Largest event the decoder will buffer while waiting for its blank line.
pub const MAX_EVENT_BYTES: usize = 1024 * 1024;

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    /// Bytes of `buffer` already known not to start a boundary.
    scanned: usize,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every event it completed.
    ///
    /// An event that grows past [`MAX_EVENT_BYTES`] without being closed is
    /// a transport failure.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<SseFrame>> {
        self.buffer
            .extend(chunk.iter().copied().filter(|b| *b != b'\r'));

        let mut frames = Vec::new();
        while let Some(end) = find_boundary(&self.buffer, self.scanned) {
            let raw: Vec<u8> = self.buffer.drain(..end + 2).collect();
            self.scanned = 0;
            let text = String::from_utf8_lossy(&raw[..end]);
            if let Some(frame) = parse_frame(&text) {
                frames.push(frame);
            }
        }
        self.scanned = self.buffer.len().saturating_sub(1);

        if self.buffer.len() > MAX_EVENT_BYTES {
            self.buffer.clear();
            self.scanned = 0;
            return Err(PreviewError::TransportDrop {
                reason: format!("event exceeded {} bytes without terminating", MAX_EVENT_BYTES),
            });
        }
        Ok(frames)
    }

    /// Bytes of an unfinished event still waiting for its blank line.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

fn find_boundary(buf: &[u8], from: usize) -> Option<usize> {
    buf.get(from..)?
        .windows(2)
        .position(|w| w == b"\n\n")
        .map(|pos| pos + from)
}

fn parse_frame(raw: &str) -> Option<SseFrame> {
    let mut frame = SseFrame::default();
    let mut has_data = false;

    for line in raw.lines() {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }

        let (field, value) = match line.find(':') {
            Some(pos) => {
                let value = &line[pos + 1..];
                (&line[..pos], value.strip_prefix(' ').unwrap_or(value))
            }
            None => (line, ""),
        };

        match field {
            "id" => frame.id = Some(value.to_string()),
            "event" => frame.event = Some(value.to_string()),
            "data" => {
                if has_data {
                    frame.data.push('\n');
                }
                frame.data.push_str(value);
                has_data = true;
            }
            _ => {}
        }
    }

    has_data.then_some(frame)
}
