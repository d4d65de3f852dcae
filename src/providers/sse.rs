//! Line reassembly for server-sent-event response bodies.
//!
//! Chunks arrive at arbitrary byte boundaries; a partial trailing line is
//! held back and prefixed onto the next chunk so callers only ever see
//! complete lines.

/// The payload both streaming APIs use to terminate an event stream.
pub const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Default)]
pub struct SseBuffer {
    buf: Vec<u8>,
}

impl SseBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and drain every complete line it closed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            lines.push(line.trim_end_matches(['\n', '\r']).to_string());
        }
        lines
    }

    /// Whatever is left after the final chunk (normally empty).
    pub fn remainder(&self) -> String {
        String::from_utf8_lossy(&self.buf).to_string()
    }
}

/// Extract the payload of a `data:` line; other SSE lines (event names,
/// comments, keep-alive blanks) return None.
pub fn data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(|rest| rest.trim_start())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_split_across_chunks() {
        let mut buffer = SseBuffer::new();
        assert!(buffer.push(b"data: {\"a\"").is_empty());
        let lines = buffer.push(b": 1}\ndata: {\"b\": 2}\n\n");
        assert_eq!(
            lines,
            vec![
                "data: {\"a\": 1}".to_string(),
                "data: {\"b\": 2}".to_string(),
                String::new(),
            ]
        );
        assert!(buffer.remainder().is_empty());
    }

    #[test]
    fn test_crlf_terminators() {
        let mut buffer = SseBuffer::new();
        let lines = buffer.push(b"data: hello\r\n");
        assert_eq!(lines, vec!["data: hello".to_string()]);
    }

    #[test]
    fn test_trailing_partial_line_is_held() {
        let mut buffer = SseBuffer::new();
        let lines = buffer.push(b"data: one\ndata: tw");
        assert_eq!(lines, vec!["data: one".to_string()]);
        assert_eq!(buffer.remainder(), "data: tw");
    }

    #[test]
    fn test_data_payload() {
        assert_eq!(data_payload("data: {\"x\":1}"), Some("{\"x\":1}"));
        assert_eq!(data_payload("data: [DONE]"), Some(DONE_SENTINEL));
        assert_eq!(data_payload("event: message_start"), None);
        assert_eq!(data_payload(""), None);
    }
}
