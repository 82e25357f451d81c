//! Outbound text sanitization.
//!
//! Every payload headed for an IRC channel passes through two rewrites:
//! the highlight guard, which defuses tokens matching nicks in that
//! channel's roster, and color-escape translation.

use mcrelay_proto::colors;

/// Insert an asterisk before the final character of every word token that
/// `is_member` recognizes as a channel nick. Tokens shorter than two
/// characters pass through, as does all punctuation and spacing.
pub fn cancel_highlights<F>(text: &str, is_member: F) -> String
where
    F: Fn(&str) -> bool,
{
    let mut out = String::with_capacity(text.len() + 8);
    let mut word = String::new();

    let mut flush = |out: &mut String, word: &mut String| {
        if word.chars().count() >= 2 && is_member(word) {
            let mut chars: Vec<char> = word.chars().collect();
            let last = chars.pop().unwrap_or_default();
            out.extend(chars);
            out.push('*');
            out.push(last);
        } else {
            out.push_str(word);
        }
        word.clear();
    };

    for c in text.chars() {
        if c.is_alphanumeric() || c == '_' {
            word.push(c);
        } else {
            flush(&mut out, &mut word);
            out.push(c);
        }
    }
    flush(&mut out, &mut word);
    out
}

/// Full outbound rewrite: highlight guard, then color translation.
pub fn outbound<F>(text: &str, is_member: F) -> String
where
    F: Fn(&str) -> bool,
{
    colors::translate(&cancel_highlights(text, is_member))
}
