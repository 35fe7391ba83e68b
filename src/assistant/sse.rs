//! Server-sent-event wire format for assistant streams.
//!
//! The gateway's response body is a sequence of lines
//! `data: {"choices":[{"delta":{"content":"<fragment>"}}]}` terminated
//! by `data: [DONE]`. Lines may be split across network chunks, so
//! parsing buffers bytes until a newline arrives; a complete line whose
//! JSON still fails to parse is skipped, never fatal.

use serde::Deserialize;

/// One parsed stream event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// A content fragment to append.
    Delta(String),
    /// The `[DONE]` sentinel.
    Done,
}

/// Byte-level line buffer. Incomplete trailing data stays buffered until
/// more bytes arrive - a UTF-8 character or JSON line split across
/// chunks is reassembled, not corrupted.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    buf: Vec<u8>,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; returns the complete lines it finished.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop(); // the \n
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            match String::from_utf8(line) {
                Ok(text) => lines.push(text),
                Err(_) => tracing::debug!("Skipping non-UTF-8 stream line"),
            }
        }
        lines
    }

    /// Drain whatever is left after end-of-stream (a final line without
    /// a trailing newline).
    pub fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buf);
        String::from_utf8(rest).ok()
    }
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

/// Parse one complete line into an event. Empty lines, comments, and
/// undecodable payloads yield `None`.
pub fn parse_line(line: &str) -> Option<SseEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let payload = line.strip_prefix("data:")?.trim_start();

    if payload == "[DONE]" {
        return Some(SseEvent::Done);
    }

    match serde_json::from_str::<StreamChunk>(payload) {
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
            .map(SseEvent::Delta),
        Err(_) => {
            tracing::debug!("Skipping undecodable stream line");
            None
        }
    }
}

/// Reassembles the full assistant text from a delta stream. The durable
/// row written at end-of-stream must be byte-identical to what the
/// client rendered, so this is the single reassembly implementation
/// both sides of the tee use.
#[derive(Debug, Default)]
pub struct DeltaAccumulator {
    lines: SseLineBuffer,
    text: String,
    done: bool,
}

impl DeltaAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw stream bytes.
    pub fn push(&mut self, chunk: &[u8]) {
        for line in self.lines.push(chunk) {
            self.apply(&line);
        }
    }

    /// Signal end-of-stream; parses any unterminated final line.
    pub fn finish(&mut self) {
        if let Some(rest) = self.lines.finish() {
            self.apply(&rest);
        }
    }

    fn apply(&mut self, line: &str) {
        match parse_line(line) {
            Some(SseEvent::Delta(fragment)) => self.text.push_str(&fragment),
            Some(SseEvent::Done) => self.done = true,
            None => {}
        }
    }

    /// The text assembled so far.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Whether the `[DONE]` sentinel was seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

/// Encode a content fragment as one wire line.
pub fn encode_delta(fragment: &str) -> String {
    format!(
        "data: {}\n\n",
        serde_json::json!({"choices": [{"delta": {"content": fragment}}]})
    )
}

/// Encode the terminating sentinel line.
pub fn encode_done() -> String {
    "data: [DONE]\n\n".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_delta_line() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hello"}}]}"#;
        assert_eq!(parse_line(line), Some(SseEvent::Delta("Hello".into())));
    }

    #[test]
    fn parse_done_sentinel() {
        assert_eq!(parse_line("data: [DONE]"), Some(SseEvent::Done));
    }

    #[test]
    fn empty_and_malformed_lines_tolerated() {
        assert_eq!(parse_line(""), None);
        assert_eq!(parse_line("data: {not json"), None);
        assert_eq!(parse_line(": keep-alive comment"), None);
        // Role-only delta with no content fragment
        assert_eq!(
            parse_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#),
            None
        );
    }

    #[test]
    fn line_split_across_chunks_is_rebuffered() {
        let mut buffer = SseLineBuffer::new();
        let full = encode_delta("Hola");
        let bytes = full.as_bytes();

        // Split mid-JSON: nothing is emitted until the newline arrives.
        let first = buffer.push(&bytes[..10]);
        assert!(first.is_empty());
        let rest = buffer.push(&bytes[10..]);
        assert_eq!(rest.len(), 2); // data line + blank separator
        assert_eq!(parse_line(&rest[0]), Some(SseEvent::Delta("Hola".into())));
    }

    #[test]
    fn multibyte_character_split_across_chunks() {
        let mut acc = DeltaAccumulator::new();
        let wire = encode_delta("señal médica");
        let bytes = wire.as_bytes();
        // Feed one byte at a time - worst-case chunking.
        for byte in bytes {
            acc.push(std::slice::from_ref(byte));
        }
        acc.finish();
        assert_eq!(acc.text(), "señal médica");
    }

    #[test]
    fn reassembly_equals_concatenation() {
        let fragments = ["Your ", "latest ", "lab ", "results ", "look ", "stable."];
        let mut wire = String::new();
        for fragment in &fragments {
            wire.push_str(&encode_delta(fragment));
        }
        wire.push_str(&encode_done());

        let mut acc = DeltaAccumulator::new();
        // Arbitrary re-chunking of the byte stream.
        for chunk in wire.as_bytes().chunks(7) {
            acc.push(chunk);
        }
        acc.finish();

        assert_eq!(acc.text(), fragments.concat());
        assert!(acc.is_done());
    }

    #[test]
    fn malformed_line_does_not_poison_later_lines() {
        let mut acc = DeltaAccumulator::new();
        acc.push(b"data: {broken\n\n");
        acc.push(encode_delta("still works").as_bytes());
        acc.finish();
        assert_eq!(acc.text(), "still works");
    }

    #[test]
    fn unterminated_final_line_parsed_on_finish() {
        let mut acc = DeltaAccumulator::new();
        let line = r#"data: {"choices":[{"delta":{"content":"tail"}}]}"#;
        acc.push(line.as_bytes()); // no trailing newline
        assert_eq!(acc.text(), "");
        acc.finish();
        assert_eq!(acc.text(), "tail");
    }
}
