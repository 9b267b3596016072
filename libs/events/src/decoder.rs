//! Newline-delimited JSON framing for the runtime event stream.

use bytes::{Buf, Bytes, BytesMut};

use crate::{EventError, RuntimeEvent};

/// Reassembles newline-delimited event records from arbitrary byte chunks.
///
/// The transport gives no guarantee that a chunk ends on a record boundary,
/// so bytes are buffered until a `\n` is seen. Blank lines are skipped.
///
/// A record longer than the configured limit is reported once as
/// [`EventError::Malformed`] and dropped up to its terminating `\n`, so the
/// buffer never holds more than one oversized chunk.
#[derive(Debug)]
pub struct LineDecoder {
    buf: BytesMut,
    max_record_len: usize,
    /// Set while skipping the tail of an oversized record.
    discarding: bool,
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::with_max_record_len(Self::DEFAULT_MAX_RECORD_LEN)
    }
}

impl LineDecoder {
    /// Longest record accepted by [`LineDecoder::new`], in bytes.
    pub const DEFAULT_MAX_RECORD_LEN: usize = 1024 * 1024;

    /// Creates an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty decoder that rejects records over `max_record_len` bytes.
    pub fn with_max_record_len(max_record_len: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            max_record_len,
            discarding: false,
        }
    }

    /// Appends a chunk received from the transport.
    pub fn push(&mut self, chunk: &[u8]) {
        if !self.discarding {
            self.buf.extend_from_slice(chunk);
            return;
        }
        if let Some(pos) = chunk.iter().position(|b| *b == b'\n') {
            self.discarding = false;
            self.buf.extend_from_slice(&chunk[pos + 1..]);
        }
    }

    /// Returns the next complete, non-blank line without its terminator.
    ///
    /// Yields an error in place of a record that exceeds the length limit.
    pub fn next_line(&mut self) -> Option<Result<Bytes, EventError>> {
        loop {
            let Some(pos) = self.buf.iter().position(|b| *b == b'\n') else {
                if self.buf.len() > self.max_record_len {
                    let len = self.buf.len();
                    self.buf.clear();
                    self.discarding = true;
                    return Some(Err(self.too_long(len)));
                }
                return None;
            };

            if pos > self.max_record_len {
                self.buf.advance(pos + 1);
                return Some(Err(self.too_long(pos)));
            }

            let mut line = self.buf.split_to(pos + 1);
            line.truncate(pos);
            if line.last() == Some(&b'\r') {
                line.truncate(pos - 1);
            }
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            return Some(Ok(line.freeze()));
        }
    }

    /// Takes whatever is left once the stream has ended.
    ///
    /// Returns `None` when the remainder is empty or blank.
    pub fn finish(&mut self) -> Option<Bytes> {
        self.discarding = false;
        let rest = self.buf.split();
        if rest.iter().all(u8::is_ascii_whitespace) {
            return None;
        }
        Some(rest.freeze())
    }

    /// Pushes a chunk and decodes every event it completes.
    pub fn decode(&mut self, chunk: &[u8]) -> Vec<Result<RuntimeEvent, EventError>> {
        self.push(chunk);
        let mut events = Vec::new();
        while let Some(line) = self.next_line() {
            events.push(line.and_then(|line| RuntimeEvent::from_json(line.chunk())));
        }
        events
    }

    fn too_long(&self, len: usize) -> EventError {
        EventError::Malformed(format!(
            "record of at least {} bytes exceeds the {} byte limit",
            len, self.max_record_len
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(decoder: &mut LineDecoder) -> Bytes {
        decoder.next_line().expect("a complete line").unwrap()
    }

    #[test]
    fn test_single_chunk_multiple_lines() {
        let mut decoder = LineDecoder::new();
        decoder.push(b"{\"a\":1}\n{\"b\":2}\n");
        assert_eq!(line(&mut decoder), b"{\"a\":1}".as_slice());
        assert_eq!(line(&mut decoder), b"{\"b\":2}".as_slice());
        assert!(decoder.next_line().is_none());
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn test_line_split_across_chunks() {
        let mut decoder = LineDecoder::new();
        decoder.push(b"{\"Type\":\"contai");
        assert!(decoder.next_line().is_none());
        decoder.push(b"ner\"}\r\n");
        assert_eq!(line(&mut decoder), b"{\"Type\":\"container\"}".as_slice());
    }

    #[test]
    fn test_blank_lines_skipped() {
        let mut decoder = LineDecoder::new();
        decoder.push(b"\n  \n{}\n");
        assert_eq!(line(&mut decoder), b"{}".as_slice());
    }

    #[test]
    fn test_finish_returns_trailing_record() {
        let mut decoder = LineDecoder::new();
        decoder.push(b"{\"x\":1}");
        assert!(decoder.next_line().is_none());
        assert_eq!(decoder.finish().unwrap().as_ref(), b"{\"x\":1}");
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn test_decode_events() {
        let mut decoder = LineDecoder::new();
        let first = decoder.decode(
            br#"{"Type":"container","Action":"create","Actor":{"ID":"c1","Attributes":{"image":"a:1"}}}
{"Type":"container","Action":"cre"#,
        );
        assert_eq!(first.len(), 1);
        assert!(first[0].as_ref().unwrap().is_container_create());

        let second = decoder.decode(br#"ate","Actor":{"ID":"c2","Attributes":{"image":"b:2"}}}
"#);
        assert_eq!(second.len(), 1);
        let creation = second[0].as_ref().unwrap().creation().unwrap().unwrap();
        assert_eq!(creation.image.as_str(), "b:2");
    }

    #[test]
    fn test_oversized_unterminated_record_is_dropped() {
        let mut decoder = LineDecoder::with_max_record_len(16);

        decoder.push(&[b'x'; 40]);
        assert!(matches!(
            decoder.next_line(),
            Some(Err(EventError::Malformed(_)))
        ));
        assert!(decoder.next_line().is_none());

        // The rest of the oversized record is skipped up to its newline.
        decoder.push(b"yyyyyyyyyyyyyyyyyyyyyyyy");
        assert!(decoder.next_line().is_none());
        decoder.push(b"yyy\n{\"ok\":1}\n");
        assert_eq!(line(&mut decoder), b"{\"ok\":1}".as_slice());
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn test_oversized_terminated_record_is_dropped() {
        let mut decoder = LineDecoder::with_max_record_len(16);

        let mut input = vec![b'x'; 40];
        input.extend_from_slice(b"\n{}\n");
        let decoded = decoder.decode(&input);

        assert_eq!(decoded.len(), 2);
        assert!(matches!(decoded[0], Err(EventError::Malformed(_))));
        assert!(decoded[1].is_ok());
    }

    #[test]
    fn test_record_at_limit_is_kept() {
        let mut decoder = LineDecoder::with_max_record_len(4);
        decoder.push(b"abcd\n");
        assert_eq!(line(&mut decoder), b"abcd".as_slice());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn chunking_does_not_change_lines(
            lines in prop::collection::vec("[a-z0-9{}\":,]{1,24}", 1..8),
            cuts in prop::collection::vec(any::<prop::sample::Index>(), 0..6),
        ) {
            let input = lines.iter().map(|l| format!("{l}\n")).collect::<String>();
            let bytes = input.as_bytes();

            let mut offsets: Vec<usize> = cuts.iter().map(|c| c.index(bytes.len())).collect();
            offsets.push(bytes.len());
            offsets.sort_unstable();

            let mut decoder = LineDecoder::new();
            let mut seen = Vec::new();
            let mut start = 0;
            for end in offsets {
                decoder.push(&bytes[start..end]);
                while let Some(line) = decoder.next_line() {
                    seen.push(String::from_utf8(line.unwrap().to_vec()).unwrap());
                }
                start = end;
            }

            prop_assert_eq!(seen, lines);
            prop_assert!(decoder.finish().is_none());
        }
    }
}
