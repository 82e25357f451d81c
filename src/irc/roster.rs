//! Live tracking of users and channel memberships for one IRC session.
//!
//! The roster is owned exclusively by its session and mutated only through
//! the operations below, which are driven by WHO replies, mode changes,
//! joins, departures and nick changes. Keys are folded through RFC 1459
//! casemapping; display casing lives on the [`User`].

use std::collections::HashMap;

use mcrelay_proto::casemap::irc_to_lower;
use mcrelay_proto::isupport::PrefixTable;

/// One tracked user.
#[derive(Clone, Debug, Default)]
pub struct User {
    /// Nick as the server spells it.
    pub nick: String,
    pub username: String,
    pub hostname: String,
    /// Network operator (`*` in WHO flags).
    pub oper: bool,
    /// Marked away (WHO flags begin with `G`).
    pub away: bool,
}

/// Users and channel memberships, keyed case-insensitively.
///
/// A membership is the status string of privilege symbols for one
/// (channel, nick) pair, kept sorted ascending by priority.
#[derive(Default)]
pub struct Roster {
    users: HashMap<String, User>,
    channels: HashMap<String, HashMap<String, String>>,
}

impl Roster {
    pub fn new() -> Self {
        Roster::default()
    }

    pub fn user(&self, nick: &str) -> Option<&User> {
        self.users.get(&irc_to_lower(nick))
    }

    /// Membership status string for a (channel, nick) pair.
    pub fn status(&self, channel: &str, nick: &str) -> Option<&str> {
        self.channels
            .get(&irc_to_lower(channel))?
            .get(&irc_to_lower(nick))
            .map(String::as_str)
    }

    /// Whether `token` is a nick present in `channel`.
    pub fn channel_has_nick(&self, channel: &str, token: &str) -> bool {
        self.channels
            .get(&irc_to_lower(channel))
            .is_some_and(|members| members.contains_key(&irc_to_lower(token)))
    }

    /// Record a user joining a channel.
    pub fn join(&mut self, channel: &str, nick: &str) {
        let key = irc_to_lower(nick);
        self.users.entry(key.clone()).or_insert_with(|| User {
            nick: nick.to_owned(),
            ..User::default()
        });
        self.channels
            .entry(irc_to_lower(channel))
            .or_default()
            .insert(key, String::new());
    }

    /// Apply a WHO reply: refresh the user's identity and rebuild the
    /// membership status from the flags field.
    pub fn who_update(
        &mut self,
        channel: &str,
        nick: &str,
        username: &str,
        hostname: &str,
        flags: &str,
        prefixes: &PrefixTable,
    ) {
        let key = irc_to_lower(nick);
        let user = self.users.entry(key.clone()).or_default();
        user.nick = nick.to_owned();
        user.username = username.to_owned();
        user.hostname = hostname.to_owned();
        user.oper = flags.contains('*');
        user.away = flags.starts_with('G');

        // The first flag char is the here/gone marker; the rest may carry
        // privilege symbols (all of them under multi-prefix). The oper
        // marker is not a privilege symbol.
        let symbols: String = flags.chars().skip(1).filter(|c| *c != '*').collect();
        let status = prefixes.status_from_flags(&symbols);
        self.channels
            .entry(irc_to_lower(channel))
            .or_default()
            .insert(key, status);
    }

    /// Apply a prefix-mode grant or revocation to a membership.
    ///
    /// The symbol is removed from the status, then re-inserted in priority
    /// order when the change is a grant. Unknown memberships are ignored.
    pub fn apply_mode(
        &mut self,
        channel: &str,
        nick: &str,
        symbol: char,
        grant: bool,
        prefixes: &PrefixTable,
    ) {
        let Some(status) = self
            .channels
            .get_mut(&irc_to_lower(channel))
            .and_then(|members| members.get_mut(&irc_to_lower(nick)))
        else {
            return;
        };
        let mut updated: String = status.chars().filter(|c| *c != symbol).collect();
        if grant {
            updated.push(symbol);
            updated = prefixes.sort_status(&updated);
        }
        *status = updated;
    }

    /// Drop a user from the global roster and from every channel.
    ///
    /// Departure from any single tracked channel removes the whole
    /// identity, even when the user is still visible elsewhere; the next
    /// WHO cycle re-learns them. This mirrors the relay's historical
    /// behavior and keeps departure handling uniform across PART, KICK
    /// and QUIT.
    pub fn remove_user(&mut self, nick: &str) {
        let key = irc_to_lower(nick);
        if self.users.remove(&key).is_none() {
            return;
        }
        for members in self.channels.values_mut() {
            members.remove(&key);
        }
    }

    /// Re-key a user in the global roster and every membership map in one
    /// step. No-op when the old nick is untracked.
    pub fn rename_user(&mut self, old: &str, new: &str) {
        let old_key = irc_to_lower(old);
        let Some(mut user) = self.users.remove(&old_key) else {
            return;
        };
        user.nick = new.to_owned();
        let new_key = irc_to_lower(new);
        self.users.insert(new_key.clone(), user);
        for members in self.channels.values_mut() {
            if let Some(status) = members.remove(&old_key) {
                members.insert(new_key.clone(), status);
            }
        }
    }

    /// Best (numerically smallest) membership priority the user holds in
    /// any tracked channel.
    pub fn best_priority(&self, nick: &str, prefixes: &PrefixTable) -> Option<usize> {
        let key = irc_to_lower(nick);
        self.channels
            .values()
            .filter_map(|members| members.get(&key))
            .flat_map(|status| status.chars())
            .filter_map(|symbol| prefixes.symbol_priority(symbol))
            .min()
    }

    /// Whether the user holds at least the given role.
    ///
    /// The empty role is the "no requirement" sentinel and always passes;
    /// an unknown role never does. Otherwise the user needs a status whose
    /// priority is numerically ≤ the role's (lower = more senior).
    pub fn has_status(&self, nick: &str, role: &str, prefixes: &PrefixTable) -> bool {
        if role.is_empty() {
            return true;
        }
        let Some(required) = prefixes.priority_of(role) else {
            return false;
        };
        self.best_priority(nick, prefixes)
            .is_some_and(|held| held <= required)
    }
}
