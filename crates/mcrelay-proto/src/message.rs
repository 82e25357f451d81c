//! Owned IRC message representation.
//!
//! The relay speaks a small fixed set of commands and numerics, so the
//! command is kept as its raw (uppercased) token with positional arguments
//! rather than a fully typed command enum. Numerics stay three-digit strings
//! (`"904"`), which is also how the session dispatches on them.

use std::fmt;
use std::str::FromStr;

use crate::error::{MessageParseError, ProtocolError};

/// The source of a message: `nick!user@host` or a bare server name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Prefix {
    /// Nickname or server name.
    pub name: String,
    /// The `user` part, when present.
    pub user: Option<String>,
    /// The `host` part, when present.
    pub host: Option<String>,
}

impl Prefix {
    /// Parse a prefix token (without the leading `:`).
    pub fn parse(raw: &str) -> Self {
        let (name_user, host) = match raw.split_once('@') {
            Some((nu, h)) => (nu, Some(h.to_owned())),
            None => (raw, None),
        };
        let (name, user) = match name_user.split_once('!') {
            Some((n, u)) => (n.to_owned(), Some(u.to_owned())),
            None => (name_user.to_owned(), None),
        };
        Prefix { name, user, host }
    }

    /// The nick part, when this prefix identifies a user.
    pub fn nick(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if let Some(user) = &self.user {
            write!(f, "!{}", user)?;
        }
        if let Some(host) = &self.host {
            write!(f, "@{}", host)?;
        }
        Ok(())
    }
}

/// An owned IRC message: optional prefix, command token, arguments.
///
/// The final argument is rendered with a `:` on the wire whenever it is
/// empty, contains a space, or itself begins with `:`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// Message source, present on most server-to-client lines.
    pub prefix: Option<Prefix>,
    /// Command or three-digit numeric, uppercased.
    pub command: String,
    /// Positional arguments, trailing argument last.
    pub args: Vec<String>,
}

impl Message {
    /// Build a client-to-server message (no prefix).
    pub fn cmd<C, A, S>(command: C, args: A) -> Self
    where
        C: Into<String>,
        A: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Message {
            prefix: None,
            command: command.into().to_ascii_uppercase(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// `PRIVMSG <target> :<text>`
    pub fn privmsg(target: &str, text: &str) -> Self {
        Message::cmd("PRIVMSG", [target, text])
    }

    /// The last argument, if any — where server replies carry their text.
    pub fn trailing(&self) -> Option<&str> {
        self.args.last().map(String::as_str)
    }

    /// Nickname of the message source, if a prefix is present.
    pub fn source_nick(&self) -> Option<&str> {
        self.prefix.as_ref().map(Prefix::nick)
    }
}

impl FromStr for Message {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Message, ProtocolError> {
        parse(s).map_err(|cause| ProtocolError::InvalidMessage {
            string: s.to_owned(),
            cause,
        })
    }
}

fn parse(line: &str) -> Result<Message, MessageParseError> {
    let mut rest = line.trim_end_matches(['\r', '\n']);

    let prefix = if let Some(tail) = rest.strip_prefix(':') {
        let (prefix, after) = tail
            .split_once(' ')
            .ok_or(MessageParseError::UnterminatedPrefix)?;
        rest = after;
        Some(Prefix::parse(prefix))
    } else {
        None
    };

    let mut args = Vec::new();
    let mut command = None;
    let mut cursor = rest.trim_start_matches(' ');
    while !cursor.is_empty() {
        if command.is_some() {
            if let Some(trailing) = cursor.strip_prefix(':') {
                args.push(trailing.to_owned());
                break;
            }
        }
        let (word, tail) = match cursor.split_once(' ') {
            Some((w, t)) => (w, t.trim_start_matches(' ')),
            None => (cursor, ""),
        };
        if command.is_none() {
            command = Some(word.to_ascii_uppercase());
        } else {
            args.push(word.to_owned());
        }
        cursor = tail;
    }

    let command = command.ok_or(MessageParseError::EmptyMessage)?;
    if !command
        .bytes()
        .all(|b| b.is_ascii_alphanumeric())
    {
        return Err(MessageParseError::InvalidCommand);
    }

    Ok(Message {
        prefix,
        command,
        args,
    })
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(prefix) = &self.prefix {
            write!(f, ":{} ", prefix)?;
        }
        f.write_str(&self.command)?;
        let last = self.args.len().saturating_sub(1);
        for (i, arg) in self.args.iter().enumerate() {
            if i == last && (arg.is_empty() || arg.contains(' ') || arg.starts_with(':')) {
                write!(f, " :{}", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_with_prefix_and_trailing() {
        let msg: Message = ":alice!ident@host PRIVMSG #mc :hello there"
            .parse()
            .unwrap();
        let prefix = msg.prefix.as_ref().unwrap();
        assert_eq!(prefix.nick(), "alice");
        assert_eq!(prefix.user.as_deref(), Some("ident"));
        assert_eq!(prefix.host.as_deref(), Some("host"));
        assert_eq!(msg.command, "PRIVMSG");
        assert_eq!(msg.args, vec!["#mc", "hello there"]);
    }

    #[test]
    fn parse_server_prefix() {
        let msg: Message = ":irc.example.net 005 relay PREFIX=(ov)@+ :are supported"
            .parse()
            .unwrap();
        assert_eq!(msg.prefix.as_ref().unwrap().nick(), "irc.example.net");
        assert_eq!(msg.command, "005");
        assert_eq!(msg.args[1], "PREFIX=(ov)@+");
        assert_eq!(msg.trailing(), Some("are supported"));
    }

    #[test]
    fn parse_no_prefix() {
        let msg: Message = "PING :token".parse().unwrap();
        assert_eq!(msg.prefix, None);
        assert_eq!(msg.command, "PING");
        assert_eq!(msg.args, vec!["token"]);
    }

    #[test]
    fn parse_collapses_extra_spaces() {
        let msg: Message = "CAP  *  LS  :sasl multi-prefix".parse().unwrap();
        assert_eq!(msg.args, vec!["*", "LS", "sasl multi-prefix"]);
    }

    #[test]
    fn parse_lowercase_command_uppercased() {
        let msg: Message = "join #chan".parse().unwrap();
        assert_eq!(msg.command, "JOIN");
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("".parse::<Message>().is_err());
        assert!("   ".parse::<Message>().is_err());
        assert!(":prefix-only".parse::<Message>().is_err());
        assert!("BAD/CMD arg".parse::<Message>().is_err());
    }

    #[test]
    fn display_round_trip() {
        for line in [
            "PRIVMSG #mc :hello world",
            ":nick!u@h JOIN #mc",
            "CAP REQ sasl",
            "AUTHENTICATE +",
            "USER relay 0 * :MC-Relay",
        ] {
            let msg: Message = line.parse().unwrap();
            assert_eq!(msg.to_string(), line);
        }
    }

    #[test]
    fn display_escapes_awkward_trailing() {
        let msg = Message::cmd("PRIVMSG", ["#mc", ""]);
        assert_eq!(msg.to_string(), "PRIVMSG #mc :");
        let msg = Message::cmd("PRIVMSG", ["#mc", ":starts-with-colon"]);
        assert_eq!(msg.to_string(), "PRIVMSG #mc ::starts-with-colon");
    }
}
