//! Chat color-escape translation.
//!
//! Game chat colors arrive as section-sign escapes (`§` followed by one hex
//! digit). Outbound IRC text rewrites each escape to the equivalent mIRC
//! color control sequence; `§f` is the style reset, and an escape with any
//! other trailing character is dropped outright so stray formatting never
//! leaks onto IRC.

/// The section sign introducing a color escape.
pub const ESCAPE: char = '\u{a7}';

/// mIRC control sequence for one escape digit.
///
/// The sixteen game colors do not map one-to-one onto the fourteen distinct
/// mIRC colors, so a few share a target (e.g. dark red and red).
fn color_code(digit: char) -> Option<&'static str> {
    Some(match digit {
        '0' => "\x0301",
        '1' => "\x0302",
        '2' => "\x0303",
        '3' => "\x0310",
        '4' => "\x0304",
        '5' => "\x0306",
        '6' => "\x0308",
        '7' => "\x0315",
        '8' => "\x0314",
        '9' => "\x0312",
        'a' => "\x0309",
        'b' => "\x0311",
        'c' => "\x0304",
        'd' => "\x0313",
        'e' => "\x0308",
        'f' => "\x0F",
        _ => return None,
    })
}

/// Rewrite every `§x` escape in `text` for IRC.
///
/// Unknown escapes are removed; a trailing lone `§` is removed as well.
pub fn translate(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != ESCAPE {
            out.push(c);
            continue;
        }
        if let Some(code) = chars.next().and_then(color_code) {
            out.push_str(code);
        }
    }
    out
}
