//! EXTERNAL mechanism: authentication by TLS client certificate.

use super::{Mechanism, Step};

/// The identity is proven by the transport, so the response is empty and
/// the mechanism is always worth attempting.
pub struct External;

impl Mechanism for External {
    fn name(&self) -> &'static str {
        "EXTERNAL"
    }

    fn is_valid(&self) -> bool {
        true
    }

    fn respond(&self, _challenge: &[u8]) -> Step {
        Step::Respond(Vec::new())
    }
}
