//! Response segmenter: cut replies into radio-sized frames.
//!
//! Cuts are positional, counted in Unicode scalar values: a frame may end in
//! the middle of a word, or between a base character and its combining mark.
//! The radio has no reassembly protocol, so receivers simply see consecutive
//! messages.

use std::num::NonZeroUsize;

/// One slice of a reply, sent as a single radio message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame(String);

impl Frame {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Length in characters, the unit the frame limit is expressed in.
    pub fn char_len(&self) -> usize {
        self.0.chars().count()
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Split `text` into consecutive frames of at most `max_len` characters.
///
/// Empty text yields no frames.
pub fn segment(text: &str, max_len: NonZeroUsize) -> Vec<Frame> {
    let max_len = max_len.get();
    let mut frames = Vec::new();
    let mut start = 0;
    let mut count = 0;

    for (idx, _) in text.char_indices() {
        if count == max_len {
            frames.push(Frame(text[start..idx].to_string()));
            start = idx;
            count = 0;
        }
        count += 1;
    }

    if start < text.len() {
        frames.push(Frame(text[start..].to_string()));
    }

    frames
}
