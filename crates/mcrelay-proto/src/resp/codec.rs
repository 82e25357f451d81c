//! Incremental RESP codec for tokio.
//!
//! The decoder is a push machine over an append-only buffer: any split
//! point in the inbound stream is valid, including mid-header and
//! mid-payload. It alternates between two sub-states — reading one
//! CRLF-terminated header line, or reading a declared number of bulk
//! payload bytes — and keeps an explicit stack of open arrays whose top is
//! the current append target. Nothing in flight is ever discarded between
//! calls.

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::{Request, RespError, Value};

/// An open multi-bulk container awaiting children.
struct Partial {
    /// Declared arity.
    remaining: usize,
    /// Children collected so far.
    items: Vec<Value>,
}

/// Tokio codec for RESP replies and requests.
#[derive(Default)]
pub struct Codec {
    /// Open containers; the top is the current append target.
    stack: Vec<Partial>,
    /// Length of a bulk payload whose header has been read but whose body
    /// has not fully arrived yet.
    pending_bulk: Option<usize>,
}

impl Codec {
    pub fn new() -> Self {
        Codec {
            stack: Vec::new(),
            pending_bulk: None,
        }
    }

    /// Append a completed value, collapsing any containers it fills.
    ///
    /// Returns the finished top-level value once the implicit root
    /// completes.
    fn complete(&mut self, value: Value) -> Option<Value> {
        let mut value = value;
        loop {
            let mut top = match self.stack.pop() {
                None => return Some(value),
                Some(top) => top,
            };
            top.items.push(value);
            if top.items.len() < top.remaining {
                self.stack.push(top);
                return None;
            }
            value = Value::Array(top.items);
        }
    }

    /// Interpret one header line (without its CRLF).
    fn header(&mut self, line: &[u8]) -> Result<Option<Value>, RespError> {
        let (tag, rest) = match line.split_first() {
            Some(split) => split,
            // An empty header line has no type tag at all.
            None => return Err(RespError::InvalidTypeTag(0)),
        };
        let text = || String::from_utf8_lossy(rest).into_owned();

        match tag {
            b'+' => Ok(self.complete(Value::Status(text()))),
            b'-' => Ok(self.complete(Value::Error(text()))),
            b':' => {
                let n = parse_int(rest)?;
                Ok(self.complete(Value::Integer(n)))
            }
            b'$' => {
                let len = parse_int(rest)?;
                if len == -1 {
                    return Ok(self.complete(Value::Null));
                }
                let len = usize::try_from(len)
                    .map_err(|_| RespError::InvalidLength(text()))?;
                self.pending_bulk = Some(len);
                Ok(None)
            }
            b'*' => {
                let count = parse_int(rest)?;
                let count = usize::try_from(count)
                    .map_err(|_| RespError::InvalidLength(text()))?;
                if count == 0 {
                    return Ok(self.complete(Value::Array(Vec::new())));
                }
                self.stack.push(Partial {
                    remaining: count,
                    items: Vec::with_capacity(count),
                });
                Ok(None)
            }
            other => Err(RespError::InvalidTypeTag(*other)),
        }
    }
}

fn parse_int(bytes: &[u8]) -> Result<i64, RespError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| RespError::InvalidLength(String::from_utf8_lossy(bytes).into_owned()))?;
    text.parse()
        .map_err(|_| RespError::InvalidLength(text.to_owned()))
}

impl Decoder for Codec {
    type Item = Value;
    type Error = RespError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Value>, RespError> {
        loop {
            if let Some(len) = self.pending_bulk {
                // Fixed-length body plus its trailing CRLF.
                if src.len() < len + 2 {
                    return Ok(None);
                }
                let body = src.split_to(len).to_vec();
                if &src[..2] != b"\r\n" {
                    return Err(RespError::MissingTerminator);
                }
                src.advance(2);
                self.pending_bulk = None;
                if let Some(value) = self.complete(Value::Bulk(body)) {
                    return Ok(Some(value));
                }
                continue;
            }

            // Header sub-state: need one full CRLF-terminated line.
            let end = match src.windows(2).position(|w| w == b"\r\n") {
                Some(pos) => pos,
                None => return Ok(None),
            };
            let line = src.split_to(end);
            src.advance(2);
            if let Some(value) = self.header(&line)? {
                return Ok(Some(value));
            }
        }
    }
}

impl Encoder<Request> for Codec {
    type Error = RespError;

    fn encode(&mut self, req: Request, dst: &mut BytesMut) -> Result<(), RespError> {
        let args = req.args();
        dst.extend_from_slice(format!("*{}\r\n", args.len()).as_bytes());
        for arg in args {
            dst.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
            dst.extend_from_slice(arg);
            dst.extend_from_slice(b"\r\n");
        }
        Ok(())
    }
}
