//! Upstream SSE parsing
//!
//! The upstream streams `data: {json}\n\n` events in byte chunks that need not
//! align with line boundaries. [`SseLineBuffer`] reassembles lines and
//! [`parse_event_line`] turns each line into an [`UpstreamEvent`].

use serde::Deserialize;

use crate::error::UpstreamError;

/// Buffer for accumulating incomplete SSE lines across chunk boundaries.
///
/// # Example
/// ```
/// use chat_relay::streaming::SseLineBuffer;
///
/// let mut buffer = SseLineBuffer::new();
///
/// let lines = buffer.feed(b"data: {\"choices\":[{\"delta\":{\"content\":\"he");
/// assert!(lines.is_empty());
///
/// let lines = buffer.feed(b"llo\"}}]}\n\n");
/// assert_eq!(lines, vec!["data: {\"choices\":[{\"delta\":{\"content\":\"hello\"}}]}"]);
/// ```
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    /// Raw bytes after the last newline
    incomplete: Vec<u8>,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes into the buffer and return any complete, non-empty lines.
    ///
    /// Lines are split on `\n` with a trailing `\r` removed. Bytes are kept
    /// raw until a line is complete, so a multi-byte character split across
    /// two chunks is decoded intact.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.incomplete.extend_from_slice(bytes);

        let mut complete_lines = Vec::new();
        while let Some(newline_pos) = self.incomplete.iter().position(|b| *b == b'\n') {
            let rest = self.incomplete.split_off(newline_pos + 1);
            let line = std::mem::replace(&mut self.incomplete, rest);
            let line = decode_line(&line[..newline_pos]);

            // SSE separates events with blank lines
            if !line.is_empty() {
                complete_lines.push(line);
            }
        }

        complete_lines
    }

    /// Take whatever trailing data never got a newline.
    ///
    /// Call at end of stream; some upstreams omit the final separator.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.incomplete);
        let line = decode_line(&rest);
        (!line.is_empty()).then_some(line)
    }

    pub fn has_incomplete(&self) -> bool {
        !self.incomplete.is_empty()
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let line = String::from_utf8_lossy(bytes);
    line.strip_suffix('\r').unwrap_or(&line).to_string()
}

/// One parsed upstream SSE line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamEvent {
    /// Content text of the first choice, if any was non-empty
    Delta(Option<String>),
    /// The `[DONE]` sentinel
    Done,
    /// Comments, `event:`/`id:` fields and other non-data lines
    Ignored,
}

#[derive(Debug, Deserialize)]
struct UpstreamChunk {
    #[serde(default)]
    choices: Vec<UpstreamStreamChoice>,
}

#[derive(Debug, Default, Deserialize)]
struct UpstreamStreamChoice {
    #[serde(default)]
    delta: UpstreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct UpstreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpstreamErrorEvent {
    error: UpstreamErrorBody,
}

/// `{"error": {...}}` as reported by the upstream
#[derive(Debug, Deserialize)]
pub(crate) struct UpstreamErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub code: Option<serde_json::Value>,
}

impl UpstreamErrorBody {
    pub(crate) fn describe(&self) -> String {
        match (&self.message, &self.code) {
            (Some(message), _) => message.clone(),
            (None, Some(code)) => format!("upstream error code {}", code),
            (None, None) => "upstream reported an error without a message".to_string(),
        }
    }
}

/// Parse a complete SSE line from the upstream
pub fn parse_event_line(line: &str) -> Result<UpstreamEvent, UpstreamError> {
    let Some(payload) = line.strip_prefix("data:") else {
        return Ok(UpstreamEvent::Ignored);
    };
    let payload = payload.trim();

    if payload == "[DONE]" {
        return Ok(UpstreamEvent::Done);
    }

    if let Ok(event) = serde_json::from_str::<UpstreamErrorEvent>(payload) {
        return Err(UpstreamError::Api {
            message: event.error.describe(),
        });
    }

    let chunk: UpstreamChunk = serde_json::from_str(payload).map_err(|e| UpstreamError::Unknown {
        message: format!("Failed to parse upstream chunk: {}", e),
    })?;

    let content = chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|content| !content.is_empty());

    Ok(UpstreamEvent::Delta(content))
}
