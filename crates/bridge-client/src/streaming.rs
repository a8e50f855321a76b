//! `streamGenerateContent` chunk decoding (spec §4.G, §9 Open Question).
//!
//! The source is ambiguous on whether the upstream protocol is SSE or
//! newline-delimited JSON in all regions. Per §9's instruction to "probe
//! content-type before dispatching a parser", [`ChunkDecoder`] inspects the
//! response's `Content-Type` header once and then decodes every chunk with
//! whichever parser matches, rather than guessing or hardcoding one.

use bytes::Bytes;
use serde_json::Value;

/// Which framing the upstream used for this response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFraming {
    /// `text/event-stream`: `data: {...}` lines, blank line terminates a frame.
    ServerSentEvents,
    /// `application/x-ndjson` (or anything else): one JSON value per line.
    NdJson,
}

impl StreamFraming {
    /// Probe a response's `Content-Type` header (spec §9).
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        match content_type {
            Some(ct) if ct.contains("text/event-stream") => StreamFraming::ServerSentEvents,
            _ => StreamFraming::NdJson,
        }
    }
}

/// Incremental decoder: feed it raw response bytes as they arrive, drain
/// complete JSON values as they become available. Holds a byte buffer for
/// a frame split across two reads.
pub struct ChunkDecoder {
    framing: StreamFraming,
    buffer: String,
}

impl ChunkDecoder {
    pub fn new(framing: StreamFraming) -> Self {
        Self {
            framing,
            buffer: String::new(),
        }
    }

    /// Append newly-received bytes and return any complete JSON values now
    /// available. Malformed individual frames are skipped rather than
    /// failing the whole stream — a best-effort decode matching the
    /// "callers may stop early" tolerance in spec §4.G.
    pub fn push(&mut self, bytes: &Bytes) -> Vec<Value> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));
        match self.framing {
            StreamFraming::ServerSentEvents => self.drain_sse(),
            StreamFraming::NdJson => self.drain_ndjson(),
        }
    }

    fn drain_ndjson(&mut self) -> Vec<Value> {
        let mut values = Vec::new();
        while let Some(idx) = self.buffer.find('\n') {
            let line = self.buffer[..idx].trim().to_string();
            self.buffer.drain(..=idx);
            if line.is_empty() {
                continue;
            }
            if let Ok(value) = serde_json::from_str::<Value>(&line) {
                values.push(value);
            }
        }
        values
    }

    fn drain_sse(&mut self) -> Vec<Value> {
        let mut values = Vec::new();
        while let Some(idx) = self.buffer.find("\n\n") {
            let frame = self.buffer[..idx].to_string();
            self.buffer.drain(..idx + 2);
            for line in frame.lines() {
                if let Some(data) = line.strip_prefix("data:") {
                    let data = data.trim();
                    if data == "[DONE]" || data.is_empty() {
                        continue;
                    }
                    if let Ok(value) = serde_json::from_str::<Value>(data) {
                        values.push(value);
                    }
                }
            }
        }
        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn probes_sse_from_content_type() {
        assert_eq!(
            StreamFraming::from_content_type(Some("text/event-stream; charset=utf-8")),
            StreamFraming::ServerSentEvents
        );
    }

    #[test]
    fn defaults_to_ndjson_for_anything_else() {
        assert_eq!(
            StreamFraming::from_content_type(Some("application/x-ndjson")),
            StreamFraming::NdJson
        );
        assert_eq!(StreamFraming::from_content_type(None), StreamFraming::NdJson);
    }

    #[test]
    fn decodes_ndjson_split_across_two_pushes() {
        let mut decoder = ChunkDecoder::new(StreamFraming::NdJson);
        let first = decoder.push(&Bytes::from_static(b"{\"a\":1}\n{\"b\""));
        assert_eq!(first, vec![json!({"a": 1})]);
        let second = decoder.push(&Bytes::from_static(b":2}\n"));
        assert_eq!(second, vec![json!({"b": 2})]);
    }

    #[test]
    fn decodes_sse_data_frames() {
        let mut decoder = ChunkDecoder::new(StreamFraming::ServerSentEvents);
        let values = decoder.push(&Bytes::from_static(b"data: {\"a\":1}\n\ndata: {\"b\":2}\n\n"));
        assert_eq!(values, vec![json!({"a": 1}), json!({"b": 2})]);
    }

    #[test]
    fn skips_malformed_lines_without_failing_the_stream() {
        let mut decoder = ChunkDecoder::new(StreamFraming::NdJson);
        let values = decoder.push(&Bytes::from_static(b"not json\n{\"ok\":true}\n"));
        assert_eq!(values, vec![json!({"ok": true})]);
    }
}
