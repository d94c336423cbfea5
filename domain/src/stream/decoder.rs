//! Framed stream decoder for the peer's upstream response format.
//!
//! The upstream chat UI streams lines such as:
//!
//! ```text
//! a0:"Hello"
//! a0:" world\n"
//! ad:{"finishReason":"stop"}
//! ```
//!
//! Text arrives as JSON string literals after an `a0:`/`b0:` marker, the end
//! of a response carries a `finishReason` object after `ad:`/`bd:`, and
//! upstream failures show up as a bare `{"error": ...}` object.
//!
//! [`decode`] is a pure scanner: it returns every complete event in the
//! buffer plus the bytes that still need more input. Chunks from the peer can
//! split a frame anywhere (inside a token, inside an escape sequence, inside
//! the finish object), so an incomplete frame is simply left in the returned
//! buffer for the next scan.

use regex::Regex;
use std::sync::LazyLock;

static TOKEN_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[ab]0:""#).expect("valid token start regex"));

static ERROR_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)\{\s*"error".*?\}"#).expect("valid error object regex"));

static FINISH_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)[ab]d:(\{.*?"finishReason".*?\})"#).expect("valid finish marker regex")
});

/// Peer sentinel that ends one response.
pub const DONE_SENTINEL: &str = "[DONE]";

/// An event decoded from the peer's framed stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedEvent {
    /// A text fragment of the model's answer.
    TextToken(String),
    /// An upstream error object.
    ErrorSignal(String),
    /// The upstream finish marker, carrying its `finishReason`.
    FinishSignal(String),
    /// The peer finished relaying this response.
    DoneSignal,
}

impl DecodedEvent {
    /// Returns true if no further events follow this one for the response.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DecodedEvent::ErrorSignal(_) | DecodedEvent::DoneSignal)
    }
}

/// Scan `buffer` for complete frames.
///
/// Returns the decoded events in stream order and the remaining buffer.
/// Complete text tokens are always drained before the error and finish
/// patterns are evaluated over what is left, so a partial token never hides
/// a finish marker that precedes it. When nothing complete is found the
/// buffer comes back unchanged.
pub fn decode(buffer: &str) -> (Vec<DecodedEvent>, String) {
    let mut events = Vec::new();
    let mut rest = buffer;

    let partial_at = loop {
        let Some(marker) = TOKEN_START.find(rest) else {
            break None;
        };
        let start = marker.end();
        let Some(end) = find_token_end(rest, start) else {
            break Some(marker.start());
        };

        // Signals sitting between two tokens are consumed with the prefix.
        scan_signals(&rest[..marker.start()], &mut events);

        if let Some(text) = unescape_token(&rest[start..end])
            && !text.is_empty()
        {
            events.push(DecodedEvent::TextToken(text));
        }
        rest = &rest[end + 1..];
    };

    match partial_at {
        Some(partial) => {
            let (prefix, pending) = rest.split_at(partial);
            match scan_signals(prefix, &mut events) {
                Some(consumed) => {
                    let mut remaining = prefix[consumed..].to_string();
                    remaining.push_str(pending);
                    (events, remaining)
                }
                None => (events, rest.to_string()),
            }
        }
        None => match scan_signals(rest, &mut events) {
            Some(consumed) => (events, rest[consumed..].to_string()),
            None => (events, rest.to_string()),
        },
    }
}

/// Find the closing quote of a token whose body starts at `start`.
///
/// A quote closes the token only when it is preceded by an even number of
/// backslashes; an odd run means the quote itself is escaped.
fn find_token_end(buf: &str, start: usize) -> Option<usize> {
    let bytes = buf.as_bytes();
    let mut from = start;
    loop {
        let quote = from + buf[from..].find('"')?;
        let mut backslashes = 0;
        let mut k = quote;
        while k > start && bytes[k - 1] == b'\\' {
            backslashes += 1;
            k -= 1;
        }
        if backslashes % 2 == 0 {
            return Some(quote);
        }
        from = quote + 1;
    }
}

/// JSON-unescape a token body. Undecodable spans are dropped.
fn unescape_token(span: &str) -> Option<String> {
    serde_json::from_str::<String>(&format!("\"{span}\"")).ok()
}

/// Push every complete error/finish signal found in `region`, in order.
///
/// Returns the byte offset just past the last consumed signal, or `None`
/// when the region holds no complete signal.
fn scan_signals(region: &str, events: &mut Vec<DecodedEvent>) -> Option<usize> {
    let mut pos = 0;
    let mut consumed = None;

    loop {
        let error = ERROR_OBJECT.find_at(region, pos);
        let finish = FINISH_MARKER.captures_at(region, pos);

        let finish_span = finish.as_ref().and_then(|c| {
            let whole = c.get(0)?;
            let object = c.get(1)?;
            Some((whole.start(), whole.end(), object.as_str()))
        });

        match (error, finish_span) {
            (Some(err), Some((f_start, _, _))) if err.start() < f_start => {
                events.push(DecodedEvent::ErrorSignal(error_message(err.as_str())));
                pos = err.end();
            }
            (Some(err), None) => {
                events.push(DecodedEvent::ErrorSignal(error_message(err.as_str())));
                pos = err.end();
            }
            (_, Some((_, f_end, object))) => {
                events.push(DecodedEvent::FinishSignal(finish_reason(object)));
                pos = f_end;
            }
            (None, None) => break,
        }
        consumed = Some(pos);
    }

    consumed
}

fn error_message(raw: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value) => match value.get("error") {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => raw.to_string(),
        },
        Err(_) => raw.to_string(),
    }
}

fn finish_reason(object: &str) -> String {
    serde_json::from_str::<serde_json::Value>(object)
        .ok()
        .and_then(|v| {
            v.get("finishReason")
                .and_then(|r| r.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| "stop".to_string())
}

/// Stateful wrapper around [`decode`] that owns the pending buffer.
///
/// One decoder lives for the duration of one correlation slot.
#[derive(Debug, Default, Clone)]
pub struct FrameDecoder {
    buffer: String,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw peer data without decoding it yet.
    pub fn append(&mut self, raw: &str) {
        self.buffer.push_str(raw);
    }

    /// Decode everything complete in the buffer.
    pub fn drain(&mut self) -> Vec<DecodedEvent> {
        let (events, rest) = decode(&self.buffer);
        self.buffer = rest;
        events
    }

    /// Append and decode in one step.
    pub fn push(&mut self, raw: &str) -> Vec<DecodedEvent> {
        self.append(raw);
        self.drain()
    }

    /// Close the stream: drain what is complete and emit [`DecodedEvent::DoneSignal`].
    ///
    /// Any incomplete trailing frame is discarded at this point since no more
    /// data will arrive for it.
    pub fn finish(&mut self) -> Vec<DecodedEvent> {
        let mut events = self.drain();
        self.buffer.clear();
        events.push(DecodedEvent::DoneSignal);
        events
    }

    /// The undecoded bytes currently held.
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Drop all pending data (used when a response is replayed).
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(events: &[DecodedEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                DecodedEvent::TextToken(t) => Some(t.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn decodes_complete_tokens_in_order() {
        let (events, rest) = decode(r#"a0:"Hello"a0:", "b0:"world""#);
        assert_eq!(texts(&events), vec!["Hello", ", ", "world"]);
        assert_eq!(rest, "");
    }

    #[test]
    fn unescapes_json_sequences() {
        let (events, _) = decode(r#"a0:"line\nnext \"quoted\" é""#);
        assert_eq!(texts(&events), vec!["line\nnext \"quoted\" é"]);
    }

    #[test]
    fn even_backslash_run_ends_token() {
        // Body is `a\\` (an escaped backslash) so the following quote closes it.
        let (events, rest) = decode(r#"a0:"a\\"tail"#);
        assert_eq!(texts(&events), vec!["a\\"]);
        assert_eq!(rest, "tail");
    }

    #[test]
    fn odd_backslash_run_does_not_end_token() {
        // `\"` is an escaped quote: the token is still open.
        let input = r#"a0:"say \"hi"#;
        let (events, rest) = decode(input);
        assert!(events.is_empty());
        assert_eq!(rest, input);

        let (events, rest) = decode(&format!(r#"{input}\"""#));
        assert_eq!(texts(&events), vec!["say \"hi\""]);
        assert_eq!(rest, "");
    }

    #[test]
    fn incomplete_frame_returns_buffer_unchanged() {
        let input = r#"a0:"partial tok"#;
        let (events, rest) = decode(input);
        assert!(events.is_empty());
        assert_eq!(rest, input);
    }

    #[test]
    fn empty_tokens_are_skipped() {
        let (events, _) = decode(r#"a0:""a0:"x""#);
        assert_eq!(texts(&events), vec!["x"]);
    }

    #[test]
    fn split_position_does_not_change_tokens() {
        let full = concat!(
            r#"a0:"The \"quick\" "a0:"brown\\"b0:"fox\n""#,
            r#"a0:"jumps""#,
            r#"a0:"trailing partial \"tok"#
        );
        let expected = vec!["The \"quick\" ", "brown\\", "fox\n", "jumps"];

        for split in 0..=full.len() {
            if !full.is_char_boundary(split) {
                continue;
            }
            let mut decoder = FrameDecoder::new();
            let mut got = texts(&decoder.push(&full[..split]));
            got.extend(texts(&decoder.push(&full[split..])));
            assert_eq!(got, expected, "split at {split}");
            assert_eq!(decoder.buffer(), r#"a0:"trailing partial \"tok"#);
        }
    }

    #[test]
    fn finish_marker_is_recognized_and_trimmed() {
        let (events, rest) = decode(r#"a0:"done"ad:{"finishReason":"stop"}"#);
        assert_eq!(
            events,
            vec![
                DecodedEvent::TextToken("done".to_string()),
                DecodedEvent::FinishSignal("stop".to_string()),
            ]
        );
        assert_eq!(rest, "");
    }

    #[test]
    fn partial_finish_marker_waits_for_more_data() {
        let input = r#"ad:{"finishReason":"len"#;
        let (events, rest) = decode(input);
        assert!(events.is_empty());
        assert_eq!(rest, input);

        let (events, rest) = decode(&format!(r#"{input}gth"}}"#));
        assert_eq!(events, vec![DecodedEvent::FinishSignal("length".to_string())]);
        assert_eq!(rest, "");
    }

    #[test]
    fn finish_before_partial_token_is_not_lost() {
        let input = r#"ad:{"finishReason":"stop"}a0:"still open"#;
        let (events, rest) = decode(input);
        assert_eq!(events, vec![DecodedEvent::FinishSignal("stop".to_string())]);
        assert_eq!(rest, r#"a0:"still open"#);
    }

    #[test]
    fn finish_between_tokens_is_kept() {
        let (events, _) = decode(r#"a0:"x"ad:{"finishReason":"stop"}b0:"y""#);
        assert_eq!(
            events,
            vec![
                DecodedEvent::TextToken("x".to_string()),
                DecodedEvent::FinishSignal("stop".to_string()),
                DecodedEvent::TextToken("y".to_string()),
            ]
        );
    }

    #[test]
    fn error_object_becomes_error_signal() {
        let (events, _) = decode(r#"{"error":"Too many requests"}"#);
        assert_eq!(
            events,
            vec![DecodedEvent::ErrorSignal("Too many requests".to_string())]
        );
        assert!(events[0].is_terminal());
    }

    #[test]
    fn escaped_error_text_inside_token_is_not_a_signal() {
        let (events, _) = decode(r#"a0:"{\"error\": \"nope\"}""#);
        assert_eq!(texts(&events), vec![r#"{"error": "nope"}"#]);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn frame_decoder_finish_emits_done() {
        let mut decoder = FrameDecoder::new();
        decoder.append(r#"a0:"tail""#);
        let events = decoder.finish();
        assert_eq!(
            events,
            vec![
                DecodedEvent::TextToken("tail".to_string()),
                DecodedEvent::DoneSignal
            ]
        );
        assert!(decoder.buffer().is_empty());
    }
}
