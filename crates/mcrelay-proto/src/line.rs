//! Newline-delimited framing for the IRC connection.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{ProtocolError, Result};

/// Default maximum line length in bytes (RFC 1459 message size).
pub const MAX_LINE_LEN: usize = 512;

/// Splits the inbound byte stream on `\n` and yields whole lines.
///
/// Bytes that are not valid UTF-8 are replaced rather than rejected; relay
/// traffic passes through networks with no encoding guarantees and a single
/// mis-encoded message must not drop the connection.
pub struct LineCodec {
    /// Index of the next byte to check for a newline, so a long partial
    /// line is not rescanned from the start on every read.
    next_index: usize,
    /// Maximum line length.
    max_len: usize,
}

impl LineCodec {
    pub fn new() -> Self {
        Self {
            next_index: 0,
            max_len: MAX_LINE_LEN,
        }
    }

    /// Create a codec with a custom maximum line length.
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            next_index: 0,
            max_len,
        }
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>> {
        if let Some(offset) = src[self.next_index..].iter().position(|b| *b == b'\n') {
            let line = src.split_to(self.next_index + offset + 1);
            self.next_index = 0;

            if line.len() > self.max_len {
                return Err(ProtocolError::LineTooLong {
                    actual: line.len(),
                    limit: self.max_len,
                });
            }

            let text = String::from_utf8_lossy(&line);
            Ok(Some(text.trim_end_matches(['\r', '\n']).to_owned()))
        } else {
            // No complete line yet; remember how far we scanned.
            self.next_index = src.len();

            if src.len() > self.max_len {
                return Err(ProtocolError::LineTooLong {
                    actual: src.len(),
                    limit: self.max_len,
                });
            }

            Ok(None)
        }
    }
}

impl Encoder<String> for LineCodec {
    type Error = ProtocolError;

    fn encode(&mut self, line: String, dst: &mut BytesMut) -> Result<()> {
        dst.reserve(line.len() + 2);
        dst.extend_from_slice(line.as_bytes());
        dst.extend_from_slice(b"\r\n");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_complete_line() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"PING :irc.example.net\r\n"[..]);

        let line = codec.decode(&mut buf).unwrap();
        assert_eq!(line.as_deref(), Some("PING :irc.example.net"));
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_resumes_across_feeds() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"PRIVMSG #chan "[..]);

        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(b":hello\r\nNOTICE");
        assert_eq!(
            codec.decode(&mut buf).unwrap().as_deref(),
            Some("PRIVMSG #chan :hello")
        );
        // Second message still incomplete.
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn decode_bare_lf() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"PING :x\n"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("PING :x"));
    }

    #[test]
    fn rejects_oversize_line() {
        let mut codec = LineCodec::with_max_len(16);
        let mut buf = BytesMut::from(&b"this line is much too long for the limit\n"[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(ProtocolError::LineTooLong { .. })
        ));
    }

    #[test]
    fn encode_appends_crlf() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::new();
        codec.encode("QUIT :bye".to_owned(), &mut buf).unwrap();
        assert_eq!(&buf[..], b"QUIT :bye\r\n");
    }
}
