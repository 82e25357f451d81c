//! SASL authentication over IRC `AUTHENTICATE`.
//!
//! Mechanisms implement [`Mechanism`] and are tried strictly in the order
//! they were declared; the [`Authenticator`] owns one conversation — the
//! candidate list, the current mechanism, the buffer that reassembles
//! chunked challenges, and the login outcome. It exists only while the
//! `sasl` capability is being negotiated and is dropped once resolved.
//!
//! # Payload framing
//!
//! Challenge and response payloads travel base64-encoded in `AUTHENTICATE`
//! lines, chunked at 400 raw bytes. An inbound line that decodes to exactly
//! 400 bytes announces a continuation and is buffered; a shorter line (or a
//! literal `+`, meaning empty) completes the payload. Outbound responses are
//! chunked the same way, with a bare `+` standing in for an empty final
//! chunk.
//!
//! # Reference
//! - IRCv3 SASL: <https://ircv3.net/specs/extensions/sasl-3.1>

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

mod external;
mod plain;

pub use external::External;
pub use plain::Plain;

/// Maximum number of raw payload bytes carried by one `AUTHENTICATE` line.
pub const CHUNK_SIZE: usize = 400;

/// What a mechanism wants to do with a completed challenge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Step {
    /// Send these bytes (possibly empty) as the response.
    Respond(Vec<u8>),
    /// The challenge is unacceptable; abort the conversation.
    Abort,
}

/// A single SASL mechanism.
pub trait Mechanism {
    /// Canonical mechanism name as sent in `AUTHENTICATE <name>`.
    fn name(&self) -> &'static str;

    /// Whether this mechanism can run with the credentials it was given.
    /// Invalid mechanisms are skipped during selection.
    fn is_valid(&self) -> bool;

    /// React to a fully reassembled challenge payload.
    fn respond(&self, challenge: &[u8]) -> Step;
}

/// Final state of a SASL conversation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Conversation still in flight.
    Pending,
    /// Server confirmed the login (903).
    Succeeded,
    /// Every candidate mechanism failed or the server aborted.
    Failed,
}

/// Reaction to one inbound `AUTHENTICATE` line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reaction {
    /// Chunk buffered; the challenge continues on the next line.
    Buffered,
    /// Send each string as the argument of its own `AUTHENTICATE` line.
    Respond(Vec<String>),
    /// Send `AUTHENTICATE *` and treat the conversation as failed.
    Abort,
}

/// One SASL conversation.
pub struct Authenticator {
    candidates: Vec<Box<dyn Mechanism + Send>>,
    current: Option<Box<dyn Mechanism + Send>>,
    buffer: Vec<u8>,
    outcome: Outcome,
    account: Option<String>,
}

impl Authenticator {
    /// Conversation over the default mechanism order [EXTERNAL, PLAIN].
    pub fn new(username: &str, password: &str) -> Self {
        Self::with_mechanisms(vec![
            Box::new(External),
            Box::new(Plain::new(username, password)),
        ])
    }

    /// Conversation over an explicit, priority-ordered mechanism list.
    pub fn with_mechanisms(mechanisms: Vec<Box<dyn Mechanism + Send>>) -> Self {
        let mut candidates = mechanisms;
        // Selection pops from the back.
        candidates.reverse();
        Authenticator {
            candidates,
            current: None,
            buffer: Vec::new(),
            outcome: Outcome::Pending,
            account: None,
        }
    }

    /// Move on to the next valid mechanism and return its name, or `None`
    /// when the candidate list is exhausted.
    pub fn select_next(&mut self) -> Option<&'static str> {
        while let Some(mech) = self.candidates.pop() {
            if mech.is_valid() {
                let name = mech.name();
                self.current = Some(mech);
                self.buffer.clear();
                return Some(name);
            }
        }
        None
    }

    /// Whether any mechanism has been started yet.
    pub fn started(&self) -> bool {
        self.current.is_some()
    }

    /// Name of the mechanism currently in conversation.
    pub fn current_name(&self) -> Option<&'static str> {
        self.current.as_ref().map(|m| m.name())
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    /// Whether the conversation has reached a final state.
    pub fn is_resolved(&self) -> bool {
        self.outcome != Outcome::Pending
    }

    pub fn resolve_succeeded(&mut self) {
        self.outcome = Outcome::Succeeded;
    }

    pub fn resolve_failed(&mut self) {
        self.outcome = Outcome::Failed;
    }

    /// Record the identity reported by numeric 900.
    pub fn set_account(&mut self, account: &str) {
        self.account = Some(account.to_owned());
    }

    pub fn account(&self) -> Option<&str> {
        self.account.as_deref()
    }

    /// Process the payload argument of an inbound `AUTHENTICATE` line.
    pub fn feed(&mut self, payload: &str) -> Reaction {
        let decoded = match decode_payload(payload) {
            Ok(bytes) => bytes,
            Err(_) => return Reaction::Abort,
        };

        if decoded.len() == CHUNK_SIZE {
            self.buffer.extend_from_slice(&decoded);
            return Reaction::Buffered;
        }

        let mut challenge = std::mem::take(&mut self.buffer);
        challenge.extend_from_slice(&decoded);

        let step = match &self.current {
            Some(mech) => mech.respond(&challenge),
            // Challenge with no mechanism in flight: refuse.
            None => Step::Abort,
        };

        match step {
            Step::Respond(bytes) => Reaction::Respond(encode_chunks(&bytes)),
            Step::Abort => Reaction::Abort,
        }
    }
}

/// Decode an inbound payload argument; `+` denotes the empty payload.
pub fn decode_payload(payload: &str) -> Result<Vec<u8>, base64::DecodeError> {
    if payload == "+" {
        return Ok(Vec::new());
    }
    BASE64.decode(payload)
}

/// Split a raw response into `AUTHENTICATE` arguments: base64 chunks of at
/// most [`CHUNK_SIZE`] raw bytes, terminated by `+` whenever the final
/// chunk would otherwise be empty.
pub fn encode_chunks(data: &[u8]) -> Vec<String> {
    let mut lines = Vec::new();
    let mut rest = data;
    while rest.len() >= CHUNK_SIZE {
        lines.push(BASE64.encode(&rest[..CHUNK_SIZE]));
        rest = &rest[CHUNK_SIZE..];
    }
    if rest.is_empty() {
        lines.push("+".to_owned());
    } else {
        lines.push(BASE64.encode(rest));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn external_selected_when_credentials_empty() {
        let mut auth = Authenticator::new("", "");
        assert_eq!(auth.select_next(), Some("EXTERNAL"));
    }

    #[test]
    fn plain_skipped_without_credentials() {
        let mut auth =
            Authenticator::with_mechanisms(vec![Box::new(Plain::new("", ""))]);
        assert_eq!(auth.select_next(), None);
    }

    #[test]
    fn fallback_order_is_declaration_order() {
        let mut auth = Authenticator::new("bot", "secret");
        assert_eq!(auth.select_next(), Some("EXTERNAL"));
        assert_eq!(auth.select_next(), Some("PLAIN"));
        assert_eq!(auth.select_next(), None);
    }

    #[test]
    fn plain_response_bytes() {
        let mut auth =
            Authenticator::with_mechanisms(vec![Box::new(Plain::new("bot", "secret"))]);
        assert_eq!(auth.select_next(), Some("PLAIN"));
        match auth.feed("+") {
            Reaction::Respond(lines) => {
                assert_eq!(lines.len(), 1);
                assert_eq!(
                    decode_payload(&lines[0]).unwrap(),
                    b"bot\0bot\0secret".to_vec()
                );
            }
            other => panic!("unexpected reaction: {:?}", other),
        }
    }

    #[test]
    fn full_chunk_is_buffered_until_terminator() {
        let mut auth = Authenticator::with_mechanisms(vec![Box::new(External)]);
        auth.select_next();

        let chunk = BASE64.encode(vec![0u8; CHUNK_SIZE]);
        assert_eq!(auth.feed(&chunk), Reaction::Buffered);
        // Empty terminator completes the 400-byte challenge.
        assert_eq!(auth.feed("+"), Reaction::Respond(vec!["+".to_owned()]));
    }

    #[test]
    fn oversize_response_chunks_and_terminates() {
        let lines = encode_chunks(&vec![b'x'; CHUNK_SIZE + 10]);
        assert_eq!(lines.len(), 2);
        assert_eq!(decode_payload(&lines[0]).unwrap().len(), CHUNK_SIZE);
        assert_eq!(decode_payload(&lines[1]).unwrap().len(), 10);
    }

    #[test]
    fn exact_chunk_response_appends_plus() {
        let lines = encode_chunks(&vec![b'x'; CHUNK_SIZE]);
        assert_eq!(lines.len(), 2);
        assert_eq!(decode_payload(&lines[0]).unwrap().len(), CHUNK_SIZE);
        assert_eq!(lines[1], "+");
    }

    #[test]
    fn empty_response_is_plus() {
        assert_eq!(encode_chunks(b""), vec!["+".to_owned()]);
    }

    #[test]
    fn garbage_payload_aborts() {
        let mut auth = Authenticator::with_mechanisms(vec![Box::new(External)]);
        auth.select_next();
        assert_eq!(auth.feed("%%%not-base64%%%"), Reaction::Abort);
    }

    #[test]
    fn outcome_transitions() {
        let mut auth = Authenticator::new("bot", "secret");
        assert_eq!(auth.outcome(), Outcome::Pending);
        assert!(!auth.is_resolved());
        auth.resolve_succeeded();
        assert_eq!(auth.outcome(), Outcome::Succeeded);
        assert!(auth.is_resolved());
    }
}
