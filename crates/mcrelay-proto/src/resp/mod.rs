//! Redis wire protocol (RESP).
//!
//! Covers exactly what a pub/sub client needs: encoding command requests as
//! multi-bulk arrays and incrementally decoding the five RESP2 reply kinds.
//! RESP3 is out of scope.
//!
//! # Reference
//! - <https://redis.io/docs/reference/protocol-spec/>

mod codec;

pub use codec::Codec;

use thiserror::Error;

/// A decoded RESP reply value.
///
/// Values are transient: one is materialized per top-level reply, handed to
/// the consumer, and never referenced again by the codec.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    /// Null bulk string (`$-1`).
    Null,
    /// Integer reply (`:n`).
    Integer(i64),
    /// Simple status reply (`+OK`).
    Status(String),
    /// Error reply (`-ERR ...`).
    Error(String),
    /// Bulk string payload. Payloads are bytes; pub/sub data has no
    /// encoding guarantee.
    Bulk(Vec<u8>),
    /// Multi-bulk reply.
    Array(Vec<Value>),
}

impl Value {
    /// Borrow a bulk or status value as UTF-8 text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Bulk(bytes) => std::str::from_utf8(bytes).ok(),
            Value::Status(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow a bulk value's raw bytes.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bulk(bytes) => Some(bytes),
            _ => None,
        }
    }
}

/// A request: an ordered list of arguments, encoded as a multi-bulk array
/// of bulk strings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Request {
    args: Vec<Vec<u8>>,
}

impl Request {
    pub fn new<A, S>(args: A) -> Self
    where
        A: IntoIterator<Item = S>,
        S: Into<Vec<u8>>,
    {
        Request {
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// `SUBSCRIBE <channels...>`
    pub fn subscribe<'a, I>(channels: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut args: Vec<Vec<u8>> = vec![b"SUBSCRIBE".to_vec()];
        args.extend(channels.into_iter().map(|c| c.as_bytes().to_vec()));
        Request { args }
    }

    /// `PUBLISH <channel> <payload>`
    pub fn publish(channel: &str, payload: &[u8]) -> Self {
        Request {
            args: vec![
                b"PUBLISH".to_vec(),
                channel.as_bytes().to_vec(),
                payload.to_vec(),
            ],
        }
    }

    pub fn args(&self) -> &[Vec<u8>] {
        &self.args
    }
}

/// RESP stream errors.
///
/// Every variant besides `Io` means the inbound stream is corrupted; the
/// connection must be dropped and re-established rather than resynchronized
/// mid-stream.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RespError {
    /// I/O error during reading or writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A reply began with a byte that is not one of `+ - : $ *`.
    #[error("invalid type tag: {0:#04x}")]
    InvalidTypeTag(u8),

    /// A length or integer field did not parse.
    #[error("invalid length field: {0:?}")]
    InvalidLength(String),

    /// A bulk payload was not terminated by CRLF.
    #[error("bulk payload missing CRLF terminator")]
    MissingTerminator,
}
