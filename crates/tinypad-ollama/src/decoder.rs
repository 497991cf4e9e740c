//! Newline-delimited JSON decoding for streamed generation responses.
//!
//! The daemon writes one JSON object per line, but the transport hands us
//! arbitrary byte slices: a read can end in the middle of a line, or in the
//! middle of a multi-byte character. [`ChunkDecoder`] keeps the unterminated
//! tail and only decodes complete lines. A line that does not decode is
//! dropped; one bad record must not sink an otherwise good stream.

use std::collections::VecDeque;
use std::pin::Pin;

use futures_util::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use tracing::trace;

/// One decoded record from the generation stream.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GenerationChunk {
    /// Text delta carried by this record.
    #[serde(default)]
    pub response: Option<String>,
    /// Set on the final record of a generation.
    #[serde(default)]
    pub done: bool,
    /// Error reported by the daemon in place of a delta.
    #[serde(default)]
    pub error: Option<String>,
}

impl GenerationChunk {
    /// The text delta, if it is non-empty.
    pub fn text(&self) -> Option<&str> {
        self.response.as_deref().filter(|s| !s.is_empty())
    }
}

/// Incremental line splitter and decoder.
#[derive(Debug, Default)]
pub struct ChunkDecoder {
    buffer: Vec<u8>,
}

impl ChunkDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one read's worth of bytes; returns every record completed by it.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<GenerationChunk> {
        let scan_from = self.buffer.len();
        self.buffer.extend_from_slice(bytes);

        let mut chunks = Vec::new();
        let mut start = 0;
        for i in scan_from..self.buffer.len() {
            if self.buffer[i] == b'\n' {
                if let Some(chunk) = decode_line(&self.buffer[start..i]) {
                    chunks.push(chunk);
                }
                start = i + 1;
            }
        }
        self.buffer.drain(..start);
        chunks
    }

    /// Decode whatever is left once the input has ended.
    pub fn finish(&mut self) -> Option<GenerationChunk> {
        let rest = std::mem::take(&mut self.buffer);
        decode_line(&rest)
    }

    /// Bytes held back waiting for a newline.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

fn decode_line(line: &[u8]) -> Option<GenerationChunk> {
    let line = line.trim_ascii();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_slice::<GenerationChunk>(line) {
        Ok(chunk) => Some(chunk),
        Err(e) => {
            trace!("Skipping undecodable chunk ({} bytes): {}", line.len(), e);
            None
        }
    }
}

struct DecodeState<S> {
    inner: Pin<Box<S>>,
    decoder: ChunkDecoder,
    ready: VecDeque<GenerationChunk>,
    finished: bool,
}

/// Lazily decode a byte stream into [`GenerationChunk`]s.
///
/// Transport errors are passed through and end the sequence. End of input
/// ends it too, whether or not a `done` record was seen.
pub fn decode_stream<S, B, E>(inner: S) -> impl Stream<Item = Result<GenerationChunk, E>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
{
    let state = DecodeState {
        inner: Box::pin(inner),
        decoder: ChunkDecoder::new(),
        ready: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(chunk) = state.ready.pop_front() {
                return Some((Ok(chunk), state));
            }
            if state.finished {
                return None;
            }
            match state.inner.next().await {
                Some(Ok(bytes)) => {
                    let decoded = state.decoder.push(bytes.as_ref());
                    state.ready.extend(decoded);
                }
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((Err(e), state));
                }
                None => {
                    state.finished = true;
                    let tail = state.decoder.finish();
                    state.ready.extend(tail);
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    const SAMPLE: &str = concat!(
        "{\"response\":\"Hi\",\"done\":false}\n",
        "{\"response\":\" th\u{e9}re \u{1f980}\",\"done\":false}\r\n",
        "\n",
        "{\"response\":\"\",\"done\":true,\"eval_count\":3}\n",
    );

    fn decode_whole(input: &[u8]) -> Vec<GenerationChunk> {
        let mut decoder = ChunkDecoder::new();
        let mut chunks = decoder.push(input);
        chunks.extend(decoder.finish());
        chunks
    }

    fn chunk(text: &str, done: bool) -> GenerationChunk {
        GenerationChunk {
            response: Some(text.to_string()),
            done,
            error: None,
        }
    }

    #[test]
    fn test_decodes_whole_lines() {
        let chunks = decode_whole(SAMPLE.as_bytes());
        assert_eq!(
            chunks,
            vec![
                chunk("Hi", false),
                chunk(" th\u{e9}re \u{1f980}", false),
                chunk("", true),
            ]
        );
    }

    #[test]
    fn test_split_invariance_two_pieces() {
        let bytes = SAMPLE.as_bytes();
        let expected = decode_whole(bytes);
        for split in 0..=bytes.len() {
            let mut decoder = ChunkDecoder::new();
            let mut chunks = decoder.push(&bytes[..split]);
            chunks.extend(decoder.push(&bytes[split..]));
            chunks.extend(decoder.finish());
            assert_eq!(chunks, expected, "split at byte {}", split);
        }
    }

    #[test]
    fn test_split_invariance_byte_at_a_time() {
        let bytes = SAMPLE.as_bytes();
        let mut decoder = ChunkDecoder::new();
        let mut chunks = Vec::new();
        for b in bytes {
            chunks.extend(decoder.push(std::slice::from_ref(b)));
        }
        chunks.extend(decoder.finish());
        assert_eq!(chunks, decode_whole(bytes));
    }

    #[test]
    fn test_malformed_line_is_skipped() {
        let input = concat!(
            "{\"response\":\"a\",\"done\":false}\n",
            "{\"response\":\"b\",\n",
            "{\"response\":\"c\",\"done\":false}\n",
            "[1,2,3]\n",
            "{\"response\":\"d\",\"done\":true}\n",
        );
        let texts: Vec<_> = decode_whole(input.as_bytes())
            .into_iter()
            .map(|c| c.response.unwrap())
            .collect();
        assert_eq!(texts, vec!["a", "c", "d"]);
    }

    #[test]
    fn test_invalid_utf8_line_is_skipped() {
        let mut input = b"{\"response\":\"ok\"}\n".to_vec();
        input.extend_from_slice(b"{\"response\":\"\xff\xfe\"}\n");
        let chunks = decode_whole(&input);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text(), Some("ok"));
    }

    #[test]
    fn test_partial_line_waits_for_newline() {
        let mut decoder = ChunkDecoder::new();
        assert!(decoder.push(b"{\"response\":\"x\"").is_empty());
        assert!(decoder.pending() > 0);
        let chunks = decoder.push(b",\"done\":false}\n");
        assert_eq!(chunks, vec![chunk("x", false)]);
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_unterminated_final_line_is_decoded() {
        let mut decoder = ChunkDecoder::new();
        assert!(decoder.push(b"{\"response\":\"tail\",\"done\":true}").is_empty());
        assert_eq!(decoder.finish(), Some(chunk("tail", true)));
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn test_error_record() {
        let chunks = decode_whole(b"{\"error\":\"model 'nope' not found\"}\n");
        assert_eq!(chunks[0].error.as_deref(), Some("model 'nope' not found"));
        assert_eq!(chunks[0].text(), None);
        assert!(!chunks[0].done);
    }

    #[tokio::test]
    async fn test_decode_stream_across_reads() {
        let reads: Vec<Result<&[u8], ()>> = vec![
            Ok(&b"{\"respon"[..]),
            Ok(&b"se\":\"Hi\",\"done\":false}\n{\"response\":\" there\""[..]),
            Ok(&b",\"done\":false}\n"[..]),
            Ok(&b"garbage\n{\"response\":\"\",\"done\":true}"[..]),
        ];
        let decoded: Vec<_> = decode_stream(stream::iter(reads)).collect().await;
        let chunks: Vec<_> = decoded.into_iter().map(Result::unwrap).collect();
        assert_eq!(
            chunks,
            vec![chunk("Hi", false), chunk(" there", false), chunk("", true)]
        );
    }

    #[tokio::test]
    async fn test_decode_stream_passes_error_through_and_stops() {
        let reads: Vec<Result<&[u8], &str>> = vec![
            Ok(&b"{\"response\":\"a\"}\n{\"response\":\"b\""[..]),
            Err("connection reset"),
            Ok(&b"{\"response\":\"never\"}\n"[..]),
        ];
        let decoded: Vec<_> = decode_stream(stream::iter(reads)).collect().await;
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].as_ref().unwrap().text(), Some("a"));
        assert_eq!(decoded[1], Err("connection reset"));
    }

    #[tokio::test]
    async fn test_decode_stream_empty_input() {
        let reads: Vec<Result<&[u8], ()>> = vec![];
        let decoded: Vec<_> = decode_stream(stream::iter(reads)).collect().await;
        assert!(decoded.is_empty());
    }
}
