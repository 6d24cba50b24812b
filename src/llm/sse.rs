//! Incremental decoder for OpenAI-style `text/event-stream` completions.
//!
//! Network chunks do not respect line boundaries, so bytes are buffered
//! until a full line is available. Only `data:` fields are interpreted.

use serde_json::Value;

use crate::core::errors::UpstreamError;

#[derive(Debug, Clone, PartialEq)]
pub enum SseEvent {
    /// A non-empty piece of generated text.
    Delta(String),
    /// The `[DONE]` sentinel; nothing follows.
    Done,
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    done: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feeds raw bytes and returns every event completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<SseEvent>, UpstreamError> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while !self.done {
            let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') else {
                break;
            };
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(event) = self.decode_line(&line)? {
                events.push(event);
            }
        }
        Ok(events)
    }

    /// Flushes a trailing line that was not newline-terminated.
    pub fn finish(&mut self) -> Result<Vec<SseEvent>, UpstreamError> {
        if self.done || self.buffer.is_empty() {
            return Ok(Vec::new());
        }
        let line = std::mem::take(&mut self.buffer);
        Ok(self.decode_line(&line)?.into_iter().collect())
    }

    fn decode_line(&mut self, raw: &[u8]) -> Result<Option<SseEvent>, UpstreamError> {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim_end_matches(['\r', '\n']);

        if line.is_empty() || line.starts_with(':') {
            return Ok(None);
        }
        let Some(data) = line.strip_prefix("data:") else {
            return Ok(None);
        };
        let data = data.strip_prefix(' ').unwrap_or(data);

        if data == "[DONE]" {
            self.done = true;
            return Ok(Some(SseEvent::Done));
        }

        let json: Value = serde_json::from_str(data)
            .map_err(|e| UpstreamError::Decode(format!("invalid stream frame: {}", e)))?;

        if let Some(error) = json.get("error") {
            return Err(UpstreamError::Status {
                status: 200,
                body: error.clone(),
            });
        }

        let content = json["choices"][0]["delta"]["content"]
            .as_str()
            .unwrap_or_default();
        if content.is_empty() {
            return Ok(None);
        }
        Ok(Some(SseEvent::Delta(content.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(content: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({ "choices": [{ "delta": { "content": content } }] })
        )
    }

    #[test]
    fn decodes_deltas_and_done() {
        let mut decoder = SseDecoder::new();
        let payload = format!("{}{}data: [DONE]\n\n", frame("Hello"), frame(" world"));

        let events = decoder.push(payload.as_bytes()).unwrap();

        assert_eq!(
            events,
            vec![
                SseEvent::Delta("Hello".to_string()),
                SseEvent::Delta(" world".to_string()),
                SseEvent::Done,
            ]
        );
        assert!(decoder.is_done());
    }

    #[test]
    fn frames_split_across_chunks_are_reassembled() {
        let mut decoder = SseDecoder::new();
        let payload = frame("Supabase → Postgres");
        let bytes = payload.as_bytes();
        // split inside the multi-byte arrow
        let split = payload.find('→').unwrap() + 1;

        assert!(decoder.push(&bytes[..split]).unwrap().is_empty());
        let events = decoder.push(&bytes[split..]).unwrap();

        assert_eq!(events, vec![SseEvent::Delta("Supabase → Postgres".to_string())]);
    }

    #[test]
    fn skips_role_only_frames_and_comments() {
        let mut decoder = SseDecoder::new();
        let payload = concat!(
            ": keep-alive\n",
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "event: ping\n",
        );

        assert!(decoder.push(payload.as_bytes()).unwrap().is_empty());
    }

    #[test]
    fn ignores_everything_after_done() {
        let mut decoder = SseDecoder::new();
        let payload = format!("data: [DONE]\n{}", frame("late"));

        let events = decoder.push(payload.as_bytes()).unwrap();
        assert_eq!(events, vec![SseEvent::Done]);
        assert!(decoder.finish().unwrap().is_empty());
    }

    #[test]
    fn finish_flushes_unterminated_line() {
        let mut decoder = SseDecoder::new();
        let payload = frame("tail");
        let unterminated = payload.trim_end();

        assert!(decoder.push(unterminated.as_bytes()).unwrap().is_empty());
        assert_eq!(
            decoder.finish().unwrap(),
            vec![SseEvent::Delta("tail".to_string())]
        );
    }

    #[test]
    fn error_frames_become_upstream_errors() {
        let mut decoder = SseDecoder::new();
        let err = decoder
            .push(b"data: {\"error\":{\"message\":\"overloaded\"}}\n")
            .unwrap_err();
        assert!(matches!(err, UpstreamError::Status { .. }));

        let err = SseDecoder::new().push(b"data: {not json\n").unwrap_err();
        assert!(matches!(err, UpstreamError::Decode(_)));
    }
}
