//! Turns raw response bytes into `data: ` frames.
//!
//! Reads may split a UTF-8 sequence or a line anywhere; both are carried over
//! to the next call, so every byte is decoded exactly once.

use std::collections::VecDeque;

const DATA_PREFIX: &str = "data: ";
const DONE_SENTINEL: &str = "[DONE]";

/// One significant line of the event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Payload following `data: `.
    Data(String),
    /// `data: [DONE]`; nothing after it is meaningful.
    Done,
}

/// Incremental byte → line → frame splitter.
#[derive(Debug, Default)]
pub struct LineFramer {
    /// Trailing bytes of an incomplete UTF-8 sequence.
    pending_bytes: Vec<u8>,
    /// Decoded text of the current unterminated line.
    line_buf: String,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one network read; returns the frames completed by it, in order.
    pub fn feed(&mut self, chunk: &[u8]) -> VecDeque<Frame> {
        self.decode_utf8(chunk);

        let mut frames = VecDeque::new();
        let mut consumed = 0;
        while let Some(pos) = self.line_buf[consumed..].find('\n') {
            let end = consumed + pos;
            if let Some(frame) = frame_line(&self.line_buf[consumed..end]) {
                frames.push_back(frame);
            }
            consumed = end + 1;
        }
        self.line_buf.drain(..consumed);
        frames
    }

    /// Flush at end of stream: the unterminated last line, if any, is examined too.
    pub fn finish(&mut self) -> Option<Frame> {
        if !self.pending_bytes.is_empty() {
            self.line_buf
                .push_str(&String::from_utf8_lossy(&self.pending_bytes));
            self.pending_bytes.clear();
        }
        let line = std::mem::take(&mut self.line_buf);
        frame_line(&line)
    }

    fn decode_utf8(&mut self, chunk: &[u8]) {
        self.pending_bytes.extend_from_slice(chunk);
        let mut rest: &[u8] = &self.pending_bytes;
        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    self.line_buf.push_str(text);
                    rest = &[];
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    // valid_up_to guarantees this prefix is UTF-8.
                    if let Ok(text) = std::str::from_utf8(valid) {
                        self.line_buf.push_str(text);
                    }
                    match e.error_len() {
                        Some(bad) => {
                            self.line_buf.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[bad..];
                        }
                        // Incomplete sequence at the end: wait for the next read.
                        None => {
                            rest = after;
                            break;
                        }
                    }
                }
            }
        }
        let keep = rest.len();
        let start = self.pending_bytes.len() - keep;
        self.pending_bytes.drain(..start);
    }
}

/// Classify one line. `None` for anything that is not a `data: ` line.
pub fn frame_line(line: &str) -> Option<Frame> {
    let payload = line.trim().strip_prefix(DATA_PREFIX)?;
    if payload == DONE_SENTINEL {
        Some(Frame::Done)
    } else {
        Some(Frame::Data(payload.to_owned()))
    }
}
