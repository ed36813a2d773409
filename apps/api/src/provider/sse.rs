//! Incremental decoder for `text/event-stream` bodies.
//!
//! Network chunks split lines (and UTF-8 sequences) at arbitrary byte offsets,
//! so bytes are buffered until a full line is available. Only `data:` lines
//! matter to us; `event:`, `id:`, `retry:`, comments and blank separators are skipped.

/// Payload of a single `data:` line.
#[derive(Debug, Clone, PartialEq)]
pub enum SseFrame {
    Data(String),
    /// The literal `[DONE]` sentinel.
    Done,
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
}

impl SseDecoder {
    /// Feeds one network chunk and returns every frame completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.pending.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            if let Some(frame) = parse_line(&line) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flushes a trailing line that arrived without a newline.
    pub fn finish(&mut self) -> Option<SseFrame> {
        let rest = std::mem::take(&mut self.pending);
        parse_line(&rest)
    }
}

fn parse_line(raw: &[u8]) -> Option<SseFrame> {
    let line = String::from_utf8_lossy(raw);
    let line = line.trim_end_matches(['\n', '\r']);
    let data = line.strip_prefix("data:")?;
    let data = data.strip_prefix(' ').unwrap_or(data);
    if data.trim() == "[DONE]" {
        return Some(SseFrame::Done);
    }
    if data.trim().is_empty() {
        return None;
    }
    Some(SseFrame::Data(data.to_string()))
}
