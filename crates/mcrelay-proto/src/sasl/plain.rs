//! PLAIN mechanism (RFC 4616).

use super::{Mechanism, Step};

/// Username/password authentication: `authcid NUL authcid NUL password`.
///
/// The authorization identity is the authentication identity, matching what
/// NickServ-backed networks expect.
pub struct Plain {
    response: Vec<u8>,
    valid: bool,
}

impl Plain {
    pub fn new(username: &str, password: &str) -> Self {
        let valid = !username.is_empty() && !password.is_empty();
        let mut response = Vec::with_capacity(username.len() * 2 + password.len() + 2);
        response.extend_from_slice(username.as_bytes());
        response.push(0);
        response.extend_from_slice(username.as_bytes());
        response.push(0);
        response.extend_from_slice(password.as_bytes());
        Plain { response, valid }
    }
}

impl Mechanism for Plain {
    fn name(&self) -> &'static str {
        "PLAIN"
    }

    fn is_valid(&self) -> bool {
        self.valid
    }

    fn respond(&self, challenge: &[u8]) -> Step {
        // PLAIN is single-shot: the server's challenge must be empty.
        if !challenge.is_empty() {
            return Step::Abort;
        }
        Step::Respond(self.response.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_credentials() {
        let plain = Plain::new("bot", "secret");
        assert!(plain.is_valid());
        assert_eq!(
            plain.respond(b""),
            Step::Respond(b"bot\0bot\0secret".to_vec())
        );
    }

    #[test]
    fn invalid_without_both_credentials() {
        assert!(!Plain::new("", "").is_valid());
        assert!(!Plain::new("bot", "").is_valid());
        assert!(!Plain::new("", "secret").is_valid());
    }

    #[test]
    fn aborts_on_unexpected_challenge() {
        let plain = Plain::new("bot", "secret");
        assert_eq!(plain.respond(b"surprise"), Step::Abort);
    }
}
