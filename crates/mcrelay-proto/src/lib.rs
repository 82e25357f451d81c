//! Wire-protocol support for the mcrelay daemon.
//!
//! This crate contains everything that talks bytes and nothing that talks
//! policy: the IRC line/message codec, RFC 1459 casemapping, client-side CAP
//! parsing, the SASL mechanism set and conversation state machine, ISUPPORT
//! `PREFIX` handling, chat color-escape translation, and a Redis RESP codec
//! that survives arbitrary chunking of the inbound stream.
//!
//! The daemon in the workspace root owns connections, rosters and routing;
//! it drives these types from its event loops.

pub mod caps;
pub mod casemap;
pub mod colors;
pub mod error;
pub mod irc;
pub mod isupport;
pub mod line;
pub mod message;
pub mod resp;
pub mod sasl;

pub use error::{MessageParseError, ProtocolError};
pub use irc::IrcCodec;
pub use message::{Message, Prefix};
