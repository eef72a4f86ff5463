//! Re-segmentation of upstream deltas into fixed-size sub-chunks
//!
//! Upstream deltas arrive at whatever granularity the provider chooses. The
//! relay re-cuts each one into pieces of `size` characters so frames stay small
//! and the client sees steady incremental output.

use std::iter::FusedIterator;

/// Lazy iterator over the sub-chunks of one delta
///
/// Pieces are counted in `char`s, never splitting a code point. All pieces but
/// the last are exactly `size` characters long. Cloning restarts from the
/// clone's position.
#[derive(Debug, Clone)]
pub struct SubChunks<'a> {
    rest: &'a str,
    size: usize,
}

/// Split `text` into pieces of at most `size` characters, left to right
///
/// # Panics
///
/// Panics if `size` is zero.
pub fn sub_chunks(text: &str, size: usize) -> SubChunks<'_> {
    assert!(size > 0, "sub-chunk size must be at least 1");
    SubChunks { rest: text, size }
}

impl<'a> Iterator for SubChunks<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        if self.rest.is_empty() {
            return None;
        }

        let end = self
            .rest
            .char_indices()
            .nth(self.size)
            .map(|(idx, _)| idx)
            .unwrap_or(self.rest.len());

        let (piece, rest) = self.rest.split_at(end);
        self.rest = rest;
        Some(piece)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.rest.is_empty() {
            return (0, Some(0));
        }
        // Each piece spans between `size` and `4 * size` bytes
        let lower = self.rest.len().div_ceil(self.size * 4);
        let upper = self.rest.len().div_ceil(self.size);
        (lower.max(1), Some(upper))
    }
}

impl FusedIterator for SubChunks<'_> {}
