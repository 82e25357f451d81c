//! One IRC server connection: registration, CAP/SASL negotiation, roster
//! tracking, and relay traffic in both directions.
//!
//! A session owns all of its state and is driven by a single event loop:
//! inbound server messages, relay commands from the router, and a periodic
//! WHO refresh. It reconnects after transport failures unless its reconnect
//! flag has been cleared, which happens exactly once — on a certificate
//! fingerprint mismatch — and is never undone.

use std::collections::{HashMap, HashSet};

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep, Duration, MissedTickBehavior};
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_util::codec::Framed;
use tracing::{debug, error, info, warn};

use mcrelay_proto::caps;
use mcrelay_proto::casemap::{irc_eq, irc_to_lower};
use mcrelay_proto::isupport::{self, ChanModes, PrefixTable};
use mcrelay_proto::sasl::{Authenticator, Reaction};
use mcrelay_proto::{IrcCodec, Message, ProtocolError};

use crate::config::{ServerConfig, BUS_PREFIX};
use crate::error::LinkError;
use crate::irc::{roster::Roster, sanitize, tls};
use crate::router::RouterHandle;

const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const WHO_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Commands a session accepts from the router.
#[derive(Debug)]
pub enum SessionCommand {
    /// Sanitize and say `text` into an IRC channel.
    Relay { channel: String, text: String },
    /// Send QUIT and end the session cleanly.
    Quit,
}

/// A relay session for one configured IRC server.
pub struct Session {
    name: String,
    cfg: ServerConfig,
    /// Folded IRC channel → bus channel.
    bus_map: HashMap<String, String>,
    commands: mpsc::Receiver<SessionCommand>,
    router: RouterHandle,
    /// Cleared permanently on a fatal trust failure.
    reconnect: bool,
}

impl Session {
    pub fn new(
        name: String,
        cfg: ServerConfig,
        router: RouterHandle,
        commands: mpsc::Receiver<SessionCommand>,
    ) -> Self {
        let bus_map = cfg
            .channel_map
            .iter()
            .map(|(channel, suffix)| {
                (irc_to_lower(channel), format!("{}{}", BUS_PREFIX, suffix))
            })
            .collect();
        Session {
            name,
            cfg,
            bus_map,
            commands,
            router,
            reconnect: true,
        }
    }

    pub async fn run(mut self) {
        while self.reconnect {
            let result = serve_connection(
                &self.name,
                &self.cfg,
                &self.bus_map,
                &self.router,
                &mut self.commands,
            )
            .await;
            match result {
                Ok(()) => return,
                Err(LinkError::FingerprintMismatch) => {
                    error!(server = %self.name, "irc: server certificate verification failed");
                    self.reconnect = false;
                }
                Err(e) => warn!(server = %self.name, error = %e, "irc: lost connection"),
            }
            if self.reconnect {
                info!(
                    server = %self.name,
                    delay_secs = RECONNECT_DELAY.as_secs(),
                    "irc: reconnecting"
                );
                sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

async fn serve_connection(
    name: &str,
    cfg: &ServerConfig,
    bus_map: &HashMap<String, String>,
    router: &RouterHandle,
    commands: &mut mpsc::Receiver<SessionCommand>,
) -> Result<(), LinkError> {
    let stream = TcpStream::connect((cfg.host.as_str(), cfg.port)).await?;

    let link = if cfg.tls {
        let pinned = !cfg.server_fingerprint.is_empty();
        let client_cert = (!cfg.certificate.is_empty()).then_some(cfg.certificate.as_str());
        let connector = tls::connector(pinned, client_cert)?;
        let server_name = ServerName::try_from(cfg.host.clone())?;
        let tls_stream = connector.connect(server_name, stream).await?;

        let fingerprint = tls::peer_fingerprint(&tls_stream);
        if pinned {
            let expected = tls::strip_fingerprint(&cfg.server_fingerprint);
            match fingerprint.as_deref() {
                Some(actual) if actual == expected => {
                    info!(server = %name, fingerprint = %actual, "irc: connected securely (fingerprint verified)");
                }
                _ => return Err(LinkError::FingerprintMismatch),
            }
        } else if let Some(actual) = fingerprint.as_deref() {
            info!(server = %name, fingerprint = %actual, "irc: connected securely (unverified)");
        }
        Link::Tls(Box::new(Framed::new(tls_stream, IrcCodec::new())))
    } else {
        info!(server = %name, "irc: connected");
        Link::Tcp(Framed::new(stream, IrcCodec::new()))
    };

    let mut conn = Connection::new(name, cfg, bus_map, router, link);
    conn.register().await?;

    let mut who_timer = interval(WHO_POLL_INTERVAL);
    who_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            message = conn.next_message() => match message {
                Some(Ok(msg)) => conn.handle(msg).await?,
                Some(Err(e)) => return Err(e.into()),
                None => return Err(LinkError::ConnectionClosed),
            },
            command = commands.recv() => match command {
                Some(SessionCommand::Relay { channel, text }) => {
                    conn.relay(&channel, &text).await?;
                }
                Some(SessionCommand::Quit) | None => {
                    conn.quit().await;
                    return Ok(());
                }
            },
            _ = who_timer.tick() => conn.poll_who().await?,
        }
    }
}

/// The framed transport under a session.
enum Link {
    Tcp(Framed<TcpStream, IrcCodec>),
    Tls(Box<Framed<TlsStream<TcpStream>, IrcCodec>>),
    /// Collects outbound messages instead of writing them anywhere.
    #[cfg(test)]
    Capture(Vec<Message>),
}

/// Protocol state for one live connection.
struct Connection<'a> {
    name: &'a str,
    cfg: &'a ServerConfig,
    bus_map: &'a HashMap<String, String>,
    router: &'a RouterHandle,
    link: Link,

    nick: String,
    /// Capabilities awaiting ACK/NAK; negotiation is open while non-empty.
    cap_requests: HashSet<String>,
    /// Capabilities the server has activated.
    capabilities: HashSet<String>,
    /// Live SASL conversation, present only while `sasl` is negotiated.
    sasl: Option<Authenticator>,
    /// Identity confirmed by numeric 900.
    sasl_login: Option<String>,
    /// CAP END is due as soon as the SASL conversation resolves.
    cap_end_pending: bool,
    cap_ended: bool,
    registered: bool,

    prefixes: PrefixTable,
    chanmodes: ChanModes,
    roster: Roster,
    /// Channels we are present in, as the server spells them.
    joined: HashSet<String>,
}

impl<'a> Connection<'a> {
    fn new(
        name: &'a str,
        cfg: &'a ServerConfig,
        bus_map: &'a HashMap<String, String>,
        router: &'a RouterHandle,
        link: Link,
    ) -> Self {
        Connection {
            name,
            cfg,
            bus_map,
            router,
            link,
            nick: cfg.nickname.clone(),
            cap_requests: HashSet::new(),
            capabilities: HashSet::new(),
            sasl: None,
            sasl_login: None,
            cap_end_pending: false,
            cap_ended: false,
            registered: false,
            prefixes: PrefixTable::default(),
            chanmodes: ChanModes::default(),
            roster: Roster::new(),
            joined: HashSet::new(),
        }
    }

    async fn send(&mut self, msg: Message) -> Result<(), LinkError> {
        match &mut self.link {
            Link::Tcp(framed) => framed.send(msg).await?,
            Link::Tls(framed) => framed.send(msg).await?,
            #[cfg(test)]
            Link::Capture(sent) => sent.push(msg),
        }
        Ok(())
    }

    async fn next_message(&mut self) -> Option<Result<Message, ProtocolError>> {
        match &mut self.link {
            Link::Tcp(framed) => framed.next().await,
            Link::Tls(framed) => framed.next().await,
            #[cfg(test)]
            Link::Capture(_) => None,
        }
    }

    /// Open capability negotiation, then introduce ourselves. The server
    /// holds registration until CAP END.
    async fn register(&mut self) -> Result<(), LinkError> {
        self.send(Message::cmd("CAP", ["LS"])).await?;
        if !self.cfg.server_password.is_empty() {
            let password = self.cfg.server_password.clone();
            self.send(Message::cmd("PASS", [password])).await?;
        }
        let nick = self.nick.clone();
        self.send(Message::cmd("NICK", [nick])).await?;
        let user = Message::cmd(
            "USER",
            [
                self.cfg.ident.as_str(),
                "0",
                "*",
                self.cfg.realname.as_str(),
            ],
        );
        self.send(user).await
    }

    async fn handle(&mut self, msg: Message) -> Result<(), LinkError> {
        match msg.command.as_str() {
            "PING" => {
                let reply = Message::cmd("PONG", msg.args.clone());
                self.send(reply).await?;
            }
            "CAP" => self.on_cap(&msg).await?,
            "AUTHENTICATE" => {
                let payload = msg.args.first().cloned().unwrap_or_default();
                self.on_authenticate(&payload).await?;
            }
            "001" => self.on_welcome().await?,
            "005" => self.on_isupport(&msg.args),
            "433" => {
                // Nick collision: retry with a trailing underscore.
                self.nick.push('_');
                let nick = self.nick.clone();
                self.send(Message::cmd("NICK", [nick])).await?;
            }
            "352" => self.on_who_reply(&msg),
            "JOIN" => self.on_join(&msg).await?,
            "PART" | "QUIT" => {
                if let Some(nick) = msg.source_nick() {
                    self.roster.remove_user(nick);
                }
            }
            "KICK" => {
                if let Some(kickee) = msg.args.get(1) {
                    self.roster.remove_user(kickee);
                }
            }
            "NICK" => {
                let new = msg.args.first().cloned().unwrap_or_default();
                if let Some(old) = msg.source_nick() {
                    if irc_eq(old, &self.nick) {
                        self.nick = new;
                    } else {
                        self.roster.rename_user(old, &new);
                    }
                }
            }
            "MODE" => self.on_mode(&msg),
            "PRIVMSG" => self.on_privmsg(&msg).await,
            "900" => self.on_logged_in(&msg),
            "903" => {
                if let Some(sasl) = self.sasl.as_mut() {
                    sasl.resolve_succeeded();
                }
                self.finish_cap_end().await?;
            }
            "904" | "905" => self.sasl_failed(true).await?,
            "906" | "907" => self.sasl_failed(false).await?,
            _ => debug!(server = %self.name, command = %msg.command, "irc: unhandled message"),
        }
        Ok(())
    }

    async fn on_cap(&mut self, msg: &Message) -> Result<(), LinkError> {
        let subcommand = msg.args.get(1).map(String::as_str).unwrap_or("");
        let list = if msg.args.len() > 2 {
            msg.args.last().map(String::as_str).unwrap_or("")
        } else {
            ""
        };

        match subcommand {
            "LS" => {
                let has_sasl = caps::split_caps(list)
                    .map(caps::parse_token)
                    .any(|t| t.name == "sasl");
                if has_sasl {
                    self.sasl = Some(Authenticator::new(
                        &self.cfg.username,
                        &self.cfg.password,
                    ));
                    self.cap_requests.insert("sasl".to_owned());
                    self.send(Message::cmd("CAP", ["REQ", "sasl"])).await?;
                }
                if self.cap_requests.is_empty() {
                    self.end_cap().await?;
                }
            }
            "ACK" => {
                let tokens: Vec<(String, bool)> = caps::split_caps(list)
                    .map(caps::parse_token)
                    .map(|t| (t.name.to_owned(), t.deactivate))
                    .collect();
                for (name, deactivate) in tokens {
                    if deactivate {
                        self.capabilities.remove(&name);
                        continue;
                    }
                    // Unrequested names fall through harmlessly.
                    self.cap_requests.remove(&name);
                    self.capabilities.insert(name.clone());
                    if name == "sasl" {
                        self.start_sasl().await?;
                    }
                }
                if self.cap_requests.is_empty() {
                    self.end_cap().await?;
                }
            }
            "NAK" => {
                for token in caps::split_caps(list).map(caps::parse_token) {
                    self.cap_requests.remove(token.name);
                    // A refused sasl capability means the conversation
                    // will never start; resolve it so CAP END is not
                    // gated on it forever.
                    if token.name == "sasl" {
                        if let Some(sasl) = self.sasl.as_mut() {
                            sasl.resolve_failed();
                        }
                    }
                }
                if self.cap_requests.is_empty() {
                    self.end_cap().await?;
                }
            }
            _ => debug!(server = %self.name, subcommand = %subcommand, "irc: ignoring CAP subcommand"),
        }
        Ok(())
    }

    /// Close negotiation, or arm the pending continuation when a SASL
    /// conversation still has to resolve. CAP END goes out exactly once.
    async fn end_cap(&mut self) -> Result<(), LinkError> {
        if self.cap_ended || self.cap_end_pending {
            return Ok(());
        }
        if self.sasl.as_ref().is_some_and(|s| !s.is_resolved()) {
            self.cap_end_pending = true;
            return Ok(());
        }
        self.cap_ended = true;
        debug!(server = %self.name, capabilities = ?self.capabilities, "irc: negotiation complete");
        self.send(Message::cmd("CAP", ["END"])).await
    }

    /// Resolve the pending CAP END continuation, if armed.
    async fn finish_cap_end(&mut self) -> Result<(), LinkError> {
        if self.cap_end_pending && !self.cap_ended {
            self.cap_end_pending = false;
            self.cap_ended = true;
            self.send(Message::cmd("CAP", ["END"])).await?;
        }
        Ok(())
    }

    async fn start_sasl(&mut self) -> Result<(), LinkError> {
        let next = match self.sasl.as_mut() {
            Some(sasl) => sasl.select_next(),
            None => return Ok(()),
        };
        match next {
            Some(mechanism) => self.send(Message::cmd("AUTHENTICATE", [mechanism])).await,
            // Nothing valid to try: fail without opening a conversation.
            None => self.sasl_failed(true).await,
        }
    }

    async fn on_authenticate(&mut self, payload: &str) -> Result<(), LinkError> {
        let reaction = match self.sasl.as_mut() {
            Some(sasl) => sasl.feed(payload),
            None => return Ok(()),
        };
        match reaction {
            Reaction::Buffered => Ok(()),
            Reaction::Respond(lines) => {
                for line in lines {
                    self.send(Message::cmd("AUTHENTICATE", [line])).await?;
                }
                Ok(())
            }
            Reaction::Abort => self.send(Message::cmd("AUTHENTICATE", ["*"])).await,
        }
    }

    /// Mechanism failure (904/905) or server abort (906/907): fall back to
    /// the next candidate, or resolve the conversation as failed. Running
    /// unauthenticated is not fatal.
    async fn sasl_failed(&mut self, whine: bool) -> Result<(), LinkError> {
        let Some(sasl) = self.sasl.as_mut() else {
            return Ok(());
        };
        if sasl.is_resolved() {
            return Ok(());
        }
        if let Some(mechanism) = sasl.select_next() {
            return self.send(Message::cmd("AUTHENTICATE", [mechanism])).await;
        }
        let started = sasl.started();
        sasl.resolve_failed();
        if started {
            self.send(Message::cmd("AUTHENTICATE", ["*"])).await?;
        }
        if whine {
            warn!(server = %self.name, "irc: failed to log in");
        }
        self.finish_cap_end().await
    }

    fn on_logged_in(&mut self, msg: &Message) {
        if let Some(account) = msg.args.get(2) {
            let mechanism = self
                .sasl
                .as_ref()
                .and_then(|s| s.current_name())
                .unwrap_or("?");
            info!(
                server = %self.name,
                account = %account,
                mechanism = %mechanism,
                "irc: logged in"
            );
            self.sasl_login = Some(account.clone());
        }
    }

    async fn on_welcome(&mut self) -> Result<(), LinkError> {
        self.registered = true;
        info!(server = %self.name, nick = %self.nick, "irc: signed on");

        if !self.cfg.username.is_empty()
            && !self.cfg.password.is_empty()
            && self.sasl_login.is_none()
        {
            let identify = format!("IDENTIFY {} {}", self.cfg.username, self.cfg.password);
            self.send(Message::privmsg("NickServ", &identify)).await?;
        }

        let mut channels: Vec<String> = self.cfg.channel_map.keys().cloned().collect();
        channels.sort();
        for channel in channels {
            self.send(Message::cmd("JOIN", [channel])).await?;
        }
        Ok(())
    }

    fn on_isupport(&mut self, args: &[String]) {
        if let Some(token) = isupport::token_value(args, "PREFIX") {
            if let Some(table) = PrefixTable::from_token(token) {
                self.prefixes = table;
            }
        }
        if let Some(token) = isupport::token_value(args, "CHANMODES") {
            if let Some(chanmodes) = ChanModes::parse(token) {
                self.chanmodes = chanmodes;
            }
        }
    }

    fn on_who_reply(&mut self, msg: &Message) {
        if msg.args.len() < 7 {
            return;
        }
        let (channel, username, hostname, nick, flags) = (
            &msg.args[1],
            &msg.args[2],
            &msg.args[3],
            &msg.args[5],
            &msg.args[6],
        );
        if irc_eq(nick, &self.nick) {
            return;
        }
        self.roster
            .who_update(channel, nick, username, hostname, flags, &self.prefixes);
    }

    async fn on_join(&mut self, msg: &Message) -> Result<(), LinkError> {
        let Some(nick) = msg.source_nick().map(str::to_owned) else {
            return Ok(());
        };
        let Some(channel) = msg.args.first().cloned() else {
            return Ok(());
        };
        if irc_eq(&nick, &self.nick) {
            info!(server = %self.name, channel = %channel, "irc: joined channel");
            self.joined.insert(channel.clone());
            // Seed the roster now; the WHO cycle keeps it fresh.
            self.send(Message::cmd("WHO", [channel])).await?;
        } else {
            self.roster.join(&channel, &nick);
        }
        Ok(())
    }

    fn on_mode(&mut self, msg: &Message) {
        let Some(target) = msg.args.first() else {
            return;
        };
        // Mode noise in channels we do not relay is none of our business.
        if !self.bus_map.contains_key(&irc_to_lower(target)) {
            return;
        }
        let Some(modes) = msg.args.get(1) else {
            return;
        };

        let mut params = msg.args.iter().skip(2);
        let mut adding = true;
        for c in modes.chars() {
            match c {
                '+' => adding = true,
                '-' => adding = false,
                _ => {
                    if let Some(symbol) = self.prefixes.symbol_for_mode(c) {
                        let Some(nick) = params.next() else {
                            continue;
                        };
                        // Our own privileges are not roster state.
                        if !irc_eq(nick, &self.nick) {
                            self.roster
                                .apply_mode(target, nick, symbol, adding, &self.prefixes);
                        }
                    } else if self.chanmodes.takes_argument(c, adding) {
                        params.next();
                    }
                }
            }
        }
    }

    async fn on_privmsg(&mut self, msg: &Message) {
        let Some(target) = msg.args.first() else {
            return;
        };
        let Some(text) = msg.args.get(1) else {
            return;
        };
        if let Some(bus_channel) = self.bus_map.get(&irc_to_lower(target)) {
            self.router
                .publish(bus_channel, text.as_bytes().to_vec())
                .await;
        }
    }

    /// Say a bus payload into an IRC channel, sanitized against the
    /// channel's roster.
    async fn relay(&mut self, channel: &str, text: &str) -> Result<(), LinkError> {
        let sanitized =
            sanitize::outbound(text, |token| self.roster.channel_has_nick(channel, token));
        self.send(Message::privmsg(channel, &sanitized)).await
    }

    async fn poll_who(&mut self) -> Result<(), LinkError> {
        if !self.registered {
            return Ok(());
        }
        let mut channels: Vec<String> = self.joined.iter().cloned().collect();
        channels.sort();
        for channel in channels {
            self.send(Message::cmd("WHO", [channel])).await?;
        }
        Ok(())
    }

    async fn quit(&mut self) {
        let _ = self.send(Message::cmd("QUIT", ["Relay stopping."])).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::RouterEvent;

    fn test_cfg(username: &str, password: &str) -> ServerConfig {
        ServerConfig {
            host: "irc.test".into(),
            port: 6667,
            tls: false,
            server_fingerprint: String::new(),
            certificate: String::new(),
            server_password: String::new(),
            nickname: "MC-Relay".into(),
            realname: "MC-Relay".into(),
            ident: "relay".into(),
            username: username.into(),
            password: password.into(),
            channel_map: [("#mc".to_owned(), "srv".to_owned())].into(),
        }
    }

    struct Harness {
        cfg: ServerConfig,
        bus_map: HashMap<String, String>,
        router: RouterHandle,
    }

    impl Harness {
        fn new(username: &str, password: &str) -> (Self, mpsc::Receiver<RouterEvent>) {
            let cfg = test_cfg(username, password);
            let bus_map = cfg
                .channel_map
                .iter()
                .map(|(k, v)| (irc_to_lower(k), format!("{}{}", BUS_PREFIX, v)))
                .collect();
            let (tx, router_rx) = mpsc::channel(16);
            let harness = Harness {
                cfg,
                bus_map,
                router: RouterHandle::new(tx),
            };
            (harness, router_rx)
        }

        fn connection(&self) -> Connection<'_> {
            Connection::new(
                "test",
                &self.cfg,
                &self.bus_map,
                &self.router,
                Link::Capture(Vec::new()),
            )
        }
    }

    async fn feed(conn: &mut Connection<'_>, line: &str) {
        let msg: Message = line.parse().unwrap();
        conn.handle(msg).await.unwrap();
    }

    fn sent(conn: &Connection<'_>) -> Vec<String> {
        match &conn.link {
            Link::Capture(messages) => messages.iter().map(|m| m.to_string()).collect(),
            _ => unreachable!(),
        }
    }

    fn count_cap_end(conn: &Connection<'_>) -> usize {
        sent(conn)
            .iter()
            .filter(|line| line.as_str() == "CAP END")
            .count()
    }

    #[tokio::test]
    async fn cap_ls_without_sasl_ends_immediately() {
        let (harness, _router_rx) = Harness::new("", "");
        let mut conn = harness.connection();
        feed(&mut conn, "CAP * LS :multi-prefix server-time").await;
        assert_eq!(sent(&conn), vec!["CAP END"]);
    }

    #[tokio::test]
    async fn sasl_gates_cap_end_until_success() {
        let (harness, _router_rx) = Harness::new("bot", "secret");
        let mut conn = harness.connection();

        feed(&mut conn, "CAP * LS :sasl").await;
        assert_eq!(sent(&conn), vec!["CAP REQ sasl"]);

        feed(&mut conn, "CAP * ACK :sasl").await;
        assert_eq!(sent(&conn)[1], "AUTHENTICATE EXTERNAL");
        assert_eq!(count_cap_end(&conn), 0);

        // Server accepts EXTERNAL and asks for the (empty) response.
        feed(&mut conn, "AUTHENTICATE +").await;
        assert_eq!(sent(&conn)[2], "AUTHENTICATE +");

        feed(&mut conn, ":srv 900 relay relay!r@h bot :logged in").await;
        feed(&mut conn, ":srv 903 relay :authentication successful").await;
        assert_eq!(count_cap_end(&conn), 1);
        assert_eq!(conn.sasl_login.as_deref(), Some("bot"));
    }

    #[tokio::test]
    async fn sasl_falls_back_then_fails_open() {
        let (harness, _router_rx) = Harness::new("bot", "secret");
        let mut conn = harness.connection();

        feed(&mut conn, "CAP * LS :sasl").await;
        feed(&mut conn, "CAP * ACK :sasl").await;
        feed(&mut conn, ":srv 904 relay :failed").await;
        // EXTERNAL failed; PLAIN is next in priority order.
        assert_eq!(*sent(&conn).last().unwrap(), "AUTHENTICATE PLAIN");

        feed(&mut conn, ":srv 904 relay :failed").await;
        // Exhausted: abort the conversation, then close negotiation.
        let lines = sent(&conn);
        assert_eq!(lines[lines.len() - 2], "AUTHENTICATE *");
        assert_eq!(count_cap_end(&conn), 1);

        // Late failure replies must not re-open anything.
        feed(&mut conn, ":srv 905 relay :failed").await;
        assert_eq!(count_cap_end(&conn), 1);
    }

    #[tokio::test]
    async fn plain_skipped_without_credentials() {
        let (harness, _router_rx) = Harness::new("", "");
        let mut conn = harness.connection();

        feed(&mut conn, "CAP * LS :sasl").await;
        feed(&mut conn, "CAP * ACK :sasl").await;
        assert_eq!(*sent(&conn).last().unwrap(), "AUTHENTICATE EXTERNAL");

        feed(&mut conn, ":srv 904 relay :failed").await;
        // PLAIN is invalid with empty credentials, so the conversation
        // resolves failed and CAP END still goes out exactly once.
        assert_eq!(count_cap_end(&conn), 1);
    }

    #[tokio::test]
    async fn nak_ends_negotiation_without_sasl() {
        let (harness, _router_rx) = Harness::new("bot", "secret");
        let mut conn = harness.connection();

        feed(&mut conn, "CAP * LS :sasl").await;
        feed(&mut conn, "CAP * NAK :sasl").await;
        let lines = sent(&conn);
        assert_eq!(count_cap_end(&conn), 1);
        assert!(!lines.iter().any(|l| l.starts_with("AUTHENTICATE")));
    }

    #[tokio::test]
    async fn roster_drives_highlight_guard() {
        let (harness, _router_rx) = Harness::new("", "");
        let mut conn = harness.connection();

        feed(
            &mut conn,
            ":srv 005 MC-Relay PREFIX=(ov)@+ :are supported",
        )
        .await;
        feed(
            &mut conn,
            ":srv 352 MC-Relay #mc ident host srv alice H@ :0 Alice",
        )
        .await;

        conn.relay("#mc", "alice: ping §a!").await.unwrap();
        assert_eq!(
            *sent(&conn).last().unwrap(),
            "PRIVMSG #mc :alic*e: ping \x0309!"
        );
        assert!(conn.roster.has_status("alice", "op", &conn.prefixes));
    }

    #[tokio::test]
    async fn mode_changes_update_membership() {
        let (harness, _router_rx) = Harness::new("", "");
        let mut conn = harness.connection();

        feed(&mut conn, ":srv 005 MC-Relay PREFIX=(ov)@+ :ok").await;
        feed(&mut conn, ":alice!i@h JOIN #mc").await;
        feed(&mut conn, ":srv MODE #mc +o-v alice alice").await;
        assert_eq!(conn.roster.status("#mc", "alice"), Some("@"));

        // Channels outside the relay map are ignored entirely.
        feed(&mut conn, ":bob!i@h JOIN #mc").await;
        feed(&mut conn, ":srv MODE #other +o bob").await;
        assert_eq!(conn.roster.status("#mc", "bob"), Some(""));
    }

    #[tokio::test]
    async fn channel_text_publishes_to_bus() {
        let (harness, mut router_rx) = Harness::new("", "");
        let mut conn = harness.connection();

        feed(&mut conn, ":alice!i@h PRIVMSG #mc :hello bus").await;
        match router_rx.try_recv().unwrap() {
            RouterEvent::Publish { channel, payload } => {
                assert_eq!(channel, "mcrelay:srv");
                assert_eq!(payload, b"hello bus");
            }
            other => panic!("unexpected event: {:?}", other),
        }

        // Unmapped channels publish nothing.
        feed(&mut conn, ":alice!i@h PRIVMSG #elsewhere :quiet").await;
        assert!(router_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn nick_collision_appends_underscore() {
        let (harness, _router_rx) = Harness::new("", "");
        let mut conn = harness.connection();
        feed(&mut conn, ":srv 433 * MC-Relay :Nickname is already in use").await;
        assert_eq!(*sent(&conn).last().unwrap(), "NICK MC-Relay_");
        assert_eq!(conn.nick, "MC-Relay_");
    }
}
