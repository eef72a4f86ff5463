//! SSE (Server-Sent Events) streaming
//!
//! Upstream side: reassembling and parsing the provider's event stream.
//! Client side: re-cutting deltas and framing them with a guaranteed
//! `[DONE]` terminator.

pub mod chunker;
pub mod framer;
pub mod sse;

pub use chunker::{sub_chunks, SubChunks};
pub use framer::{catch_panics, event_stream, format_sse_chunk, format_sse_done, Framer, FramerState, StreamFailure};
pub use sse::{parse_event_line, SseLineBuffer, UpstreamEvent};
