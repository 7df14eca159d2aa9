// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Line-buffered tolerant decoder for the agent's JSONL stdout.
//!
//! Bytes go in, typed events come out in source order. A partial trailing
//! line is buffered until the next read or stream end; a line that fails
//! to decode is skipped and counted, never aborting the stream.

use cdx_core::{AgentEvent, ParsedEvent};
use tracing::debug;

#[derive(Default)]
pub struct JsonlDecoder {
    buffer: Vec<u8>,
    invalid_lines: u64,
}

impl JsonlDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes, returning every event completed by it.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<ParsedEvent> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            if let Some(event) = self.decode_line(&line[..line.len() - 1]) {
                events.push(event);
            }
        }
        events
    }

    /// Attempt the trailing unterminated line once at stream end.
    /// Invalid leftovers are discarded.
    pub fn finish(&mut self) -> Option<ParsedEvent> {
        let rest = std::mem::take(&mut self.buffer);
        if rest.is_empty() {
            return None;
        }
        self.decode_line(&rest)
    }

    /// Count of lines skipped because they were not valid JSON.
    pub fn invalid_lines(&self) -> u64 {
        self.invalid_lines
    }

    fn decode_line(&mut self, line: &[u8]) -> Option<ParsedEvent> {
        let text = String::from_utf8_lossy(line);
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }
        match serde_json::from_str::<serde_json::Value>(trimmed) {
            Ok(raw) => Some(ParsedEvent {
                event: AgentEvent::from_value(&raw),
                raw,
            }),
            Err(error) => {
                self.invalid_lines += 1;
                debug!(%error, line = trimmed, "skipping undecodable stream line");
                None
            }
        }
    }
}

#[cfg(test)]
#[path = "jsonl_tests.rs"]
mod tests;
