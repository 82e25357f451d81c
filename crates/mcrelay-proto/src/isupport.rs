//! ISUPPORT (numeric 005) token handling.
//!
//! The session cares about two tokens: `PREFIX`, from which the
//! [`PrefixTable`] of channel privilege levels is derived, and `CHANMODES`,
//! which is needed to pair mode letters with their arguments when parsing
//! MODE changes.

/// Find the value of a `KEY=VALUE` token in 005 parameters.
///
/// The first parameter (the client's nick) and the trailing "are supported
/// by this server" text are passed in too; neither can match a `KEY=` shape,
/// so callers hand over the argument list as-is.
pub fn token_value<'a>(params: &'a [String], key: &str) -> Option<&'a str> {
    params.iter().find_map(|p| {
        let (k, v) = p.split_once('=')?;
        k.eq_ignore_ascii_case(key).then_some(v)
    })
}

/// One advertised privilege level.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrefixEntry {
    /// Channel mode letter (`o`, `v`, ...).
    pub mode: char,
    /// Display prefix character (`@`, `+`, ...).
    pub symbol: char,
    /// Human-readable role name (`"op"`, `"voice"`, ...).
    pub role: String,
    /// Seniority; 0 is the most senior level.
    pub priority: usize,
}

/// Privilege levels derived from the server's `PREFIX` advertisement.
///
/// Priorities are the positions in the advertised list, so `(qaohv)~&@%+`
/// puts `q` at 0 and `v` at 4. Lookup by mode letter, display symbol or
/// role name all resolve to the same entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrefixTable {
    entries: Vec<PrefixEntry>,
}

impl Default for PrefixTable {
    /// The conventional fallback for servers that never send `PREFIX`.
    fn default() -> Self {
        PrefixTable::from_token("(ov)@+").unwrap_or(PrefixTable {
            entries: Vec::new(),
        })
    }
}

impl PrefixTable {
    /// Parse a `PREFIX` value like `(qaohv)~&@%+`.
    ///
    /// Returns `None` when the token is malformed or the mode and symbol
    /// lists disagree in length.
    pub fn from_token(token: &str) -> Option<Self> {
        let rest = token.strip_prefix('(')?;
        let (modes, symbols) = rest.split_once(')')?;
        if modes.is_empty() || modes.chars().count() != symbols.chars().count() {
            return None;
        }

        let op_priority = modes.chars().position(|m| m == 'o');

        let entries = modes
            .chars()
            .zip(symbols.chars())
            .enumerate()
            .map(|(priority, (mode, symbol))| PrefixEntry {
                mode,
                symbol,
                role: role_name(mode, priority, op_priority),
                priority,
            })
            .collect();

        Some(PrefixTable { entries })
    }

    pub fn entries(&self) -> &[PrefixEntry] {
        &self.entries
    }

    /// Whether this mode letter grants a channel privilege.
    pub fn is_prefix_mode(&self, mode: char) -> bool {
        self.entries.iter().any(|e| e.mode == mode)
    }

    /// Display symbol for a mode letter.
    pub fn symbol_for_mode(&self, mode: char) -> Option<char> {
        self.entries
            .iter()
            .find(|e| e.mode == mode)
            .map(|e| e.symbol)
    }

    /// Priority of a display symbol.
    pub fn symbol_priority(&self, symbol: char) -> Option<usize> {
        self.entries
            .iter()
            .find(|e| e.symbol == symbol)
            .map(|e| e.priority)
    }

    /// Priority of a role, addressed by name, mode letter or symbol.
    pub fn priority_of(&self, role: &str) -> Option<usize> {
        self.entries
            .iter()
            .find(|e| {
                e.role == role
                    || role.chars().count() == 1
                        && role.chars().next().is_some_and(|c| c == e.mode || c == e.symbol)
            })
            .map(|e| e.priority)
    }

    /// Collect the privilege symbols present in a WHO flags field into a
    /// status string sorted ascending by priority.
    pub fn status_from_flags(&self, flags: &str) -> String {
        let mut found: Vec<&PrefixEntry> = self
            .entries
            .iter()
            .filter(|e| flags.contains(e.symbol))
            .collect();
        found.sort_by_key(|e| e.priority);
        found.iter().map(|e| e.symbol).collect()
    }

    /// Re-sort a status string ascending by priority; unknown symbols sink
    /// to the end and are kept.
    pub fn sort_status(&self, status: &str) -> String {
        let mut symbols: Vec<char> = status.chars().collect();
        symbols.sort_by_key(|c| self.symbol_priority(*c).unwrap_or(usize::MAX));
        symbols.into_iter().collect()
    }
}

fn role_name(mode: char, priority: usize, op_priority: Option<usize>) -> String {
    match mode {
        'o' => "op".to_owned(),
        'h' => "halfop".to_owned(),
        'v' => "voice".to_owned(),
        _ if priority == 0 => {
            if op_priority == Some(2) {
                "owner".to_owned()
            } else {
                "admin".to_owned()
            }
        }
        _ => format!("+{}", mode),
    }
}

/// The four `CHANMODES` categories.
///
/// - **A**: list modes, argument in both directions
/// - **B**: argument in both directions
/// - **C**: argument only when set
/// - **D**: never an argument
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChanModes {
    pub a: String,
    pub b: String,
    pub c: String,
    pub d: String,
}

impl Default for ChanModes {
    /// RFC 2812 defaults, used until the server advertises its own.
    fn default() -> Self {
        ChanModes {
            a: "beI".to_owned(),
            b: "k".to_owned(),
            c: "l".to_owned(),
            d: "imnpst".to_owned(),
        }
    }
}

impl ChanModes {
    /// Parse a `CHANMODES` value like `b,k,l,imnpst`.
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.splitn(4, ',');
        Some(ChanModes {
            a: parts.next()?.to_owned(),
            b: parts.next()?.to_owned(),
            c: parts.next()?.to_owned(),
            d: parts.next()?.to_owned(),
        })
    }

    /// Whether this mode letter consumes an argument.
    pub fn takes_argument(&self, mode: char, adding: bool) -> bool {
        self.a.contains(mode)
            || self.b.contains(mode)
            || (adding && self.c.contains(mode))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn finds_token_values() {
        let p = params(&["relay", "PREFIX=(ov)@+", "CHANTYPES=#", "are supported"]);
        assert_eq!(token_value(&p, "PREFIX"), Some("(ov)@+"));
        assert_eq!(token_value(&p, "chantypes"), Some("#"));
        assert_eq!(token_value(&p, "NETWORK"), None);
    }

    #[test]
    fn standard_prefix_table() {
        let table = PrefixTable::from_token("(ov)@+").unwrap();
        assert_eq!(table.symbol_for_mode('o'), Some('@'));
        assert_eq!(table.symbol_priority('+'), Some(1));
        assert_eq!(table.priority_of("op"), Some(0));
        assert_eq!(table.priority_of("voice"), Some(1));
        assert_eq!(table.priority_of("@"), Some(0));
        assert_eq!(table.priority_of("v"), Some(1));
        assert_eq!(table.priority_of("halfop"), None);
    }

    #[test]
    fn role_names_for_extended_prefix() {
        // (qaohv): q at 0 with o at 2 makes q "owner" and a "+a".
        let table = PrefixTable::from_token("(qaohv)~&@%+").unwrap();
        let roles: Vec<&str> = table.entries().iter().map(|e| e.role.as_str()).collect();
        assert_eq!(roles, vec!["owner", "+a", "op", "halfop", "voice"]);
    }

    #[test]
    fn role_names_admin_without_deep_op() {
        // (ao): o sits at 1, so the top level is "admin".
        let table = PrefixTable::from_token("(ao)&@").unwrap();
        let roles: Vec<&str> = table.entries().iter().map(|e| e.role.as_str()).collect();
        assert_eq!(roles, vec!["admin", "op"]);
    }

    #[test]
    fn malformed_prefix_rejected() {
        assert_eq!(PrefixTable::from_token("ov@+"), None);
        assert_eq!(PrefixTable::from_token("(ov)@"), None);
        assert_eq!(PrefixTable::from_token("()"), None);
    }

    #[test]
    fn status_built_and_sorted_by_priority() {
        let table = PrefixTable::from_token("(qaohv)~&@%+").unwrap();
        assert_eq!(table.status_from_flags("G+~"), "~+");
        assert_eq!(table.sort_status("+@~"), "~@+");
    }

    #[test]
    fn chanmodes_argument_classes() {
        let cm = ChanModes::parse("beI,k,l,imnpst").unwrap();
        assert!(cm.takes_argument('b', true));
        assert!(cm.takes_argument('b', false));
        assert!(cm.takes_argument('k', false));
        assert!(cm.takes_argument('l', true));
        assert!(!cm.takes_argument('l', false));
        assert!(!cm.takes_argument('i', true));
    }
}
