//! Recovers top-level JSON objects from a TCP byte stream.
//!
//! The control channel has no length prefix.  Messages are concatenated JSON
//! objects, optionally separated by whitespace or newlines, and a single
//! `read()` may return half a message or several at once.  [`JsonFramer`]
//! buffers bytes per connection and hands back every complete object.
//!
//! # How the framer finds message boundaries
//!
//! ```text
//! noise   { "a" : { "b" : 2 } }   \n   { "c" : 1
//! ─────   ▲       ▲         ▲ ▲        ▲
//!         1       2         1 0        1   (depth after each brace)
//! ```
//!
//! - Bytes before the first `{` are discarded.
//! - Depth goes up on every `{` byte and down on every `}` byte; the object
//!   ends where it returns to zero.  Quotes are not interpreted, so a brace
//!   inside a string literal counts like any other.  A span cut short that
//!   way fails to parse and is reported as malformed, and the stream stays
//!   in step.
//! - An object still open when the input runs out stays buffered, and the
//!   scan resumes where it stopped on the next [`JsonFramer::feed`].
//! - A closed span that is not valid JSON is reported once as
//!   [`FrameError::Malformed`] and skipped.

use serde_json::Value;
use thiserror::Error;
use tracing::trace;

/// A bounded span that could not be parsed.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("malformed JSON message ({len} bytes): {source}")]
    Malformed {
        len: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Per-connection framing state.
#[derive(Debug, Default)]
pub struct JsonFramer {
    /// Undecoded bytes.  Starts with `{` whenever `depth > 0`.
    buf: Vec<u8>,
    /// Index of the next byte to examine when an object is open.
    scan: usize,
    depth: usize,
}

impl JsonFramer {
    /// Creates a framer with an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `bytes` and returns every object completed by them, in order.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Result<Value, FrameError>> {
        self.buf.extend_from_slice(bytes);
        let mut frames = Vec::new();

        loop {
            if self.depth == 0 && !self.open_next() {
                return frames;
            }

            let Some(end) = self.scan_to_close() else {
                return frames;
            };

            let span: Vec<u8> = self.buf.drain(..end).collect();
            self.scan = 0;
            frames.push(
                serde_json::from_slice(&span).map_err(|source| FrameError::Malformed {
                    len: span.len(),
                    source,
                }),
            );
        }
    }

    /// Returns `true` when an unfinished object is buffered.
    pub fn has_partial(&self) -> bool {
        self.depth > 0
    }

    /// Number of bytes held for the next [`feed`](Self::feed).
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    /// Drops leading noise and opens the next object.  Returns `false` (with
    /// an empty buffer) when no `{` remains.
    fn open_next(&mut self) -> bool {
        match self.buf.iter().position(|&b| b == b'{') {
            Some(start) => {
                if start > 0 {
                    trace!("skipping {start} bytes before object start");
                }
                self.buf.drain(..start);
                self.depth = 1;
                self.scan = 1;
                true
            }
            None => {
                if !self.buf.is_empty() {
                    trace!("discarding {} bytes with no object start", self.buf.len());
                }
                self.buf.clear();
                false
            }
        }
    }

    /// Advances the scan.  Returns the exclusive end of the open object once
    /// its closing brace is seen.
    fn scan_to_close(&mut self) -> Option<usize> {
        while self.scan < self.buf.len() {
            let byte = self.buf[self.scan];
            self.scan += 1;

            match byte {
                b'{' => self.depth += 1,
                b'}' => {
                    self.depth -= 1;
                    if self.depth == 0 {
                        return Some(self.scan);
                    }
                }
                _ => {}
            }
        }
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn values(frames: Vec<Result<Value, FrameError>>) -> Vec<Value> {
        frames
            .into_iter()
            .map(|f| f.expect("frame must parse"))
            .collect()
    }

    #[test]
    fn test_feed_single_complete_message() {
        let mut framer = JsonFramer::new();
        let out = values(framer.feed(br#"{"bac":1,"command":"get_slots","args":[]}"#));
        assert_eq!(out, vec![json!({"bac":1,"command":"get_slots","args":[]})]);
        assert!(!framer.has_partial());
        assert_eq!(framer.buffered_len(), 0);
    }

    #[test]
    fn test_feed_split_message_yields_one_value() {
        // Arrange
        let mut framer = JsonFramer::new();

        // Act
        let first = framer.feed(br#"{"command":"x""#);
        let second = values(framer.feed(br#","args":[]}"#));

        // Assert
        assert!(first.is_empty());
        assert_eq!(second, vec![json!({"command":"x","args":[]})]);
    }

    #[test]
    fn test_feed_concatenated_messages_in_order() {
        let mut framer = JsonFramer::new();
        let out = values(framer.feed(b"{\"n\":1}{\"n\":2}\n{\"n\":3}  "));
        assert_eq!(out, vec![json!({"n":1}), json!({"n":2}), json!({"n":3})]);
    }

    #[test]
    fn test_feed_discards_leading_noise() {
        let mut framer = JsonFramer::new();
        let out = values(framer.feed(b"\n\n garbage }} {\"ok\":true}"));
        assert_eq!(out, vec![json!({"ok": true})]);
    }

    #[test]
    fn test_feed_brace_free_input_clears_buffer() {
        let mut framer = JsonFramer::new();
        assert!(framer.feed(b"no objects here\n").is_empty());
        assert_eq!(framer.buffered_len(), 0);
        assert!(framer.feed(b"").is_empty());
    }

    #[test]
    fn test_feed_nested_objects_are_one_message() {
        let mut framer = JsonFramer::new();
        let out = values(framer.feed(br#"{"args":[{"touch_points":{"a":{"b":1}}}]}"#));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["args"][0]["touch_points"]["a"]["b"], 1);
    }

    #[test]
    fn test_feed_unterminated_quote_does_not_stall_the_stream() {
        // Arrange
        let mut framer = JsonFramer::new();

        // Act
        let out = framer.feed(b"{\"a}\n{\"bac\":1,\"command\":\"get_slots\",\"args\":[]}\n");

        // Assert
        assert_eq!(out.len(), 2);
        assert!(matches!(out[0], Err(FrameError::Malformed { len: 4, .. })));
        assert_eq!(
            out[1].as_ref().unwrap(),
            &json!({"bac":1,"command":"get_slots","args":[]})
        );
        assert!(!framer.has_partial());
        assert_eq!(framer.buffered_len(), 0);
    }

    #[test]
    fn test_feed_brace_inside_string_counts() {
        let mut framer = JsonFramer::new();

        let out = framer.feed(br#"{"name":"P}1"}{"n":2}"#);

        // `{"name":"P}` closes early; the leftover `1"}` is noise.
        assert_eq!(out.len(), 2);
        assert!(matches!(out[0], Err(FrameError::Malformed { .. })));
        assert_eq!(out[1].as_ref().unwrap(), &json!({"n":2}));
    }

    #[test]
    fn test_feed_malformed_span_is_skipped_and_framing_resumes() {
        // Arrange
        let mut framer = JsonFramer::new();

        // Act
        let out = framer.feed(b"{not json}{\"n\":1}");

        // Assert
        assert_eq!(out.len(), 2);
        assert!(matches!(out[0], Err(FrameError::Malformed { len: 10, .. })));
        assert_eq!(out[1].as_ref().unwrap(), &json!({"n":1}));
    }

    #[test]
    fn test_feed_keeps_partial_tail_after_complete_message() {
        let mut framer = JsonFramer::new();
        let out = values(framer.feed(b"{\"n\":1}\n{\"n\":"));
        assert_eq!(out, vec![json!({"n":1})]);
        assert!(framer.has_partial());
        assert_eq!(framer.buffered_len(), 5);

        let rest = values(framer.feed(b"2}"));
        assert_eq!(rest, vec![json!({"n":2})]);
        assert!(!framer.has_partial());
    }

    #[test]
    fn test_feed_byte_at_a_time_yields_all_messages() {
        // Arrange
        let messages = [
            json!({"bac":1,"command":"get_slots","args":[]}),
            json!({"bac":1,"command":"request_slot","args":[0]}),
            json!({"bac":1,"command":"update_peripherals","args":[{"touch_points":[[1,2],[3,4]]}]}),
        ];
        let mut stream = Vec::new();
        for m in &messages {
            stream.extend_from_slice(m.to_string().as_bytes());
            stream.push(b'\n');
        }
        let mut framer = JsonFramer::new();

        // Act
        let mut out = Vec::new();
        for byte in &stream {
            out.extend(values(framer.feed(std::slice::from_ref(byte))));
        }

        // Assert
        assert_eq!(out, messages.to_vec());
        assert_eq!(framer.buffered_len(), 0);
    }

    #[test]
    fn test_feed_arbitrary_split_points_yield_same_messages() {
        let stream = b"{\"a\":1} {\"b\":{\"c\":[1,2]}}{\"d\":\"x\"}";
        for split in 0..=stream.len() {
            let mut framer = JsonFramer::new();
            let mut out = values(framer.feed(&stream[..split]));
            out.extend(values(framer.feed(&stream[split..])));
            assert_eq!(
                out,
                vec![json!({"a":1}), json!({"b":{"c":[1,2]}}), json!({"d":"x"})],
                "split at {split}"
            );
        }
    }
}
