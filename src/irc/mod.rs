//! The IRC side of the relay.

pub mod roster;
pub mod sanitize;
pub mod session;
pub mod tls;

pub use session::{Session, SessionCommand};
