//! IRC message codec for tokio.
//!
//! Wraps [`LineCodec`] and parses each line into a [`Message`].

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{ProtocolError, Result};
use crate::line::LineCodec;
use crate::message::Message;

/// Tokio codec for encoding/decoding IRC messages.
pub struct IrcCodec {
    inner: LineCodec,
}

impl IrcCodec {
    pub fn new() -> Self {
        Self {
            inner: LineCodec::new(),
        }
    }
}

impl Default for IrcCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for IrcCodec {
    type Item = Message;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>> {
        loop {
            match self.inner.decode(src)? {
                // Servers may send bare CRLF between messages; skip them.
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => return line.parse().map(Some),
                None => return Ok(None),
            }
        }
    }
}

impl Encoder<Message> for IrcCodec {
    type Error = ProtocolError;

    fn encode(&mut self, msg: Message, dst: &mut BytesMut) -> Result<()> {
        self.inner.encode(msg.to_string(), dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_message() {
        let mut codec = IrcCodec::new();
        let mut buf = BytesMut::from(&b":srv PING :tok\r\n"[..]);
        let msg = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(msg.command, "PING");
        assert_eq!(msg.args, vec!["tok"]);
    }

    #[test]
    fn decode_skips_blank_lines() {
        let mut codec = IrcCodec::new();
        let mut buf = BytesMut::from(&b"\r\nPING :a\r\n"[..]);
        let msg = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(msg.command, "PING");
    }

    #[test]
    fn encode_message() {
        let mut codec = IrcCodec::new();
        let mut buf = BytesMut::new();
        codec
            .encode(Message::privmsg("#mc", "hi there"), &mut buf)
            .unwrap();
        assert_eq!(&buf[..], b"PRIVMSG #mc :hi there\r\n");
    }
}
