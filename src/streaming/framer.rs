//! Event stream framing for the streaming path
//!
//! Turns upstream deltas into `data: {json}\n\n` frames and guarantees the
//! stream ends with exactly one `data: [DONE]\n\n`, however it ends.

use std::convert::Infallible;
use std::panic::AssertUnwindSafe;

use bytes::Bytes;
use futures::{stream, Stream, StreamExt};
use tracing::{debug, error};

use super::chunker::sub_chunks;
use crate::{
    envelope::StreamChunk,
    error::{panic_message, AuthFailure, ErrorEnvelope, UpstreamError},
    proxy::DeltaStream,
    routes::metrics::record_stream_frames,
};

/// A failure the framer must report in-band
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFailure {
    /// Known before any upstream call
    Preflight(AuthFailure),
    /// Reported by the upstream adapter, before or after the first delta
    Upstream(UpstreamError),
}

impl StreamFailure {
    /// Text carried as the delta content of the error frame
    pub fn message(&self) -> String {
        match self {
            StreamFailure::Preflight(failure) => failure.to_string(),
            StreamFailure::Upstream(err) => err.user_message(),
        }
    }
}

/// Format a stream chunk as an SSE data event: `data: {json}\n\n`
pub fn format_sse_chunk(chunk: &StreamChunk) -> Bytes {
    let json = serde_json::to_string(chunk).expect("StreamChunk should always serialize");
    Bytes::from(format!("data: {}\n\n", json))
}

/// Format the SSE done marker: `data: [DONE]\n\n`
pub fn format_sse_done() -> Bytes {
    Bytes::from_static(b"data: [DONE]\n\n")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramerState {
    Streaming,
    Terminated,
}

/// Framing state machine
///
/// Once terminated, every method returns no frames.
#[derive(Debug)]
pub struct Framer {
    state: FramerState,
    sub_chunk_size: usize,
    frames: u64,
}

impl Framer {
    /// # Panics
    ///
    /// Panics if `sub_chunk_size` is zero.
    pub fn new(sub_chunk_size: usize) -> Self {
        assert!(sub_chunk_size > 0, "sub-chunk size must be at least 1");
        Self {
            state: FramerState::Streaming,
            sub_chunk_size,
            frames: 0,
        }
    }

    pub fn state(&self) -> FramerState {
        self.state
    }

    /// Frames emitted so far, the sentinel included
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// One frame per sub-chunk of `text`; nothing for an empty delta
    pub fn delta(&mut self, text: &str) -> Vec<Bytes> {
        if self.state == FramerState::Terminated {
            return Vec::new();
        }

        let frames: Vec<Bytes> = sub_chunks(text, self.sub_chunk_size)
            .map(|piece| format_sse_chunk(&StreamChunk::content(piece)))
            .collect();
        self.frames += frames.len() as u64;
        frames
    }

    /// One error frame followed by the sentinel
    pub fn fail(&mut self, failure: &StreamFailure) -> Vec<Bytes> {
        if self.state == FramerState::Terminated {
            return Vec::new();
        }

        let error_frame = format_sse_chunk(&StreamChunk::content(failure.message()));
        self.frames += 1;
        let mut frames = vec![error_frame];
        frames.extend(self.finish());
        frames
    }

    /// The sentinel, exactly once
    pub fn finish(&mut self) -> Option<Bytes> {
        if self.state == FramerState::Terminated {
            return None;
        }

        self.state = FramerState::Terminated;
        self.frames += 1;
        record_stream_frames(self.frames);
        Some(format_sse_done())
    }
}

impl Drop for Framer {
    fn drop(&mut self) {
        if self.state == FramerState::Streaming {
            debug!(frames = self.frames, "Event stream dropped before completion");
        }
    }
}

/// Drive the upstream deltas (or an already-known failure) through the framer
///
/// The returned stream owns the upstream stream; dropping it (for instance
/// when the client disconnects) releases the upstream connection.
pub fn event_stream(
    source: Result<DeltaStream, StreamFailure>,
    sub_chunk_size: usize,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    async_stream::stream! {
        let mut framer = Framer::new(sub_chunk_size);

        match source {
            Err(failure) => {
                for frame in framer.fail(&failure) {
                    yield Ok(frame);
                }
            }
            Ok(mut deltas) => {
                while let Some(item) = deltas.next().await {
                    match item {
                        Ok(text) => {
                            for frame in framer.delta(&text) {
                                yield Ok(frame);
                            }
                        }
                        Err(err) => {
                            err.report("stream");
                            for frame in framer.fail(&StreamFailure::Upstream(err)) {
                                yield Ok(frame);
                            }
                            break;
                        }
                    }
                }

                if let Some(done) = framer.finish() {
                    yield Ok(done);
                }
            }
        }

        debug!(frames = framer.frames(), "Event stream terminated");
    }
}

/// Turn a panic while producing frames into an error frame and the sentinel
///
/// The handler's catch-all only covers building the response; the body is
/// polled after the handler has returned.
pub fn catch_panics<S>(frames: S) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static
where
    S: Stream<Item = Result<Bytes, Infallible>> + Send + 'static,
{
    AssertUnwindSafe(frames).catch_unwind().flat_map(|item| {
        let frames = match item {
            Ok(frame) => vec![frame],
            Err(panic) => {
                let detail = panic_message(&*panic);
                error!(panic = %detail, "Event stream panicked");
                let message = ErrorEnvelope::new("500", format!("Internal error: {}", detail)).render();
                vec![
                    Ok(format_sse_chunk(&StreamChunk::content(message))),
                    Ok(format_sse_done()),
                ]
            }
        };
        stream::iter(frames)
    })
}
