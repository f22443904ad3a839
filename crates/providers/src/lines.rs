//! Line splitting for streamed response bodies.
//!
//! HTTP chunk boundaries fall anywhere, including inside a multi-byte
//! character, so bytes are buffered and only complete lines are decoded.

use meshbridge_core::error::GenerationError;

#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub(crate) fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// The next complete line without its `\n` or `\r\n` terminator.
    /// A trailing partial line stays buffered.
    pub(crate) fn next_line(&mut self) -> Option<Result<String, GenerationError>> {
        let end = self.pending.iter().position(|&b| b == b'\n')?;
        let mut line: Vec<u8> = self.pending.drain(..=end).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(decode(line))
    }

    /// Whatever is left once the body has ended.
    pub(crate) fn finish(&mut self) -> Option<Result<String, GenerationError>> {
        if self.pending.is_empty() {
            return None;
        }
        Some(decode(std::mem::take(&mut self.pending)))
    }
}

fn decode(line: Vec<u8>) -> Result<String, GenerationError> {
    String::from_utf8(line).map_err(|e| {
        GenerationError::StreamInterrupted(format!("stream line is not valid UTF-8: {e}"))
    })
}
