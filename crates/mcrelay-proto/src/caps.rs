//! Client-side CAP token parsing.
//!
//! Servers answer `CAP LS`/`CAP REQ` with whitespace-separated capability
//! tokens. A token may carry modifier characters (`-` deactivate, `~` ack
//! required, `=` sticky) and a `vendor/` prefix; `CAP LS 302` servers also
//! append `=value` suffixes.

/// One capability token, decomposed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CapToken<'a> {
    /// Bare capability name, without modifiers, vendor or value.
    pub name: &'a str,
    /// Vendor prefix, when the token was `vendor/name`.
    pub vendor: Option<&'a str>,
    /// The token carried a `-` modifier: the capability is being disabled.
    pub deactivate: bool,
}

/// Decompose one capability token.
pub fn parse_token(raw: &str) -> CapToken<'_> {
    let mut rest = raw;
    let mut deactivate = false;
    while let Some(c) = rest.chars().next() {
        match c {
            '-' => deactivate = true,
            '~' | '=' => {}
            _ => break,
        }
        rest = &rest[c.len_utf8()..];
    }

    // Strip a CAP LS 302 value suffix.
    let rest = rest.split('=').next().unwrap_or(rest);

    let (vendor, name) = match rest.split_once('/') {
        Some((v, n)) => (Some(v), n),
        None => (None, rest),
    };

    CapToken {
        name,
        vendor,
        deactivate,
    }
}

/// Split a CAP argument list into non-empty tokens.
pub fn split_caps(list: &str) -> impl Iterator<Item = &str> {
    list.split_whitespace().filter(|s| !s.is_empty())
}
