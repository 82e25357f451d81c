//! Configuration loading and management.

use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use thiserror::Error;

use crate::history::HistoryMode;

/// Prefix applied to every configured bus channel suffix on the IRC side,
/// keeping relay traffic in its own pub/sub namespace.
pub const BUS_PREFIX: &str = "mcrelay:";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Daemon configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Redis host.
    pub redis_host: String,
    /// Redis port.
    #[serde(default = "defaults::redis_port")]
    pub redis_port: u16,
    /// IRC servers to relay, keyed by a free-form name used in logs.
    #[serde(default)]
    pub servers: HashMap<String, ServerConfig>,
    /// Optional WebSocket gateway.
    pub web: Option<WebConfig>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

/// One IRC server connection.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Server hostname.
    pub host: String,
    #[serde(default = "defaults::irc_port")]
    pub port: u16,
    /// Connect over TLS.
    #[serde(default)]
    pub tls: bool,
    /// Pinned server certificate fingerprint (SHA-1 hex, colons allowed).
    /// When set, it replaces chain verification; a mismatch permanently
    /// disables the session.
    #[serde(default)]
    pub server_fingerprint: String,
    /// PEM file carrying a client certificate and key, presented for
    /// SASL EXTERNAL.
    #[serde(default)]
    pub certificate: String,
    /// Connection password (`PASS`).
    #[serde(default)]
    pub server_password: String,
    #[serde(default = "defaults::nickname")]
    pub nickname: String,
    #[serde(default = "defaults::realname")]
    pub realname: String,
    #[serde(default = "defaults::ident")]
    pub ident: String,
    /// Services account name (SASL PLAIN / NickServ).
    #[serde(default)]
    pub username: String,
    /// Services account password.
    #[serde(default)]
    pub password: String,
    /// IRC channel → bus channel suffix. Suffixes are namespaced with
    /// [`BUS_PREFIX`] before touching Redis.
    #[serde(default)]
    pub channel_map: HashMap<String, String>,
}

/// WebSocket gateway configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WebConfig {
    /// Listen address, e.g. `127.0.0.1:8765`.
    pub listen: SocketAddr,
    /// History backlog size: an event count or a window in seconds,
    /// depending on `history_mode`.
    #[serde(default = "defaults::history_size")]
    pub history_size: usize,
    #[serde(default)]
    pub history_mode: HistoryMode,
    /// URL channel name → full bus channel name.
    #[serde(default)]
    pub channel_map: HashMap<String, String>,
}

mod defaults {
    pub fn redis_port() -> u16 {
        6379
    }
    pub fn irc_port() -> u16 {
        6667
    }
    pub fn nickname() -> String {
        "MC-Relay".to_owned()
    }
    pub fn realname() -> String {
        "MC-Relay".to_owned()
    }
    pub fn ident() -> String {
        "relay".to_owned()
    }
    pub fn history_size() -> usize {
        100
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r##"
        redis_host = "127.0.0.1"

        [servers.esper]
        host = "irc.esper.net"
        port = 6697
        tls = true
        server_fingerprint = "AB:CD:EF:01:23:45:67:89:AB:CD:EF:01:23:45:67:89:AB:CD:EF:01"
        username = "relay"
        password = "hunter2"

        [servers.esper.channel_map]
        "#minecraft" = "survival"

        [web]
        listen = "127.0.0.1:8765"
        history_size = 50
        history_mode = "time"

        [web.channel_map]
        survival = "mcrelay:survival"
    "##;

    #[test]
    fn parses_sample() {
        let cfg: Config = toml::from_str(SAMPLE).unwrap();
        assert_eq!(cfg.redis_host, "127.0.0.1");
        assert_eq!(cfg.redis_port, 6379);

        let server = &cfg.servers["esper"];
        assert_eq!(server.port, 6697);
        assert!(server.tls);
        assert_eq!(server.nickname, "MC-Relay");
        assert_eq!(server.channel_map["#minecraft"], "survival");

        let web = cfg.web.as_ref().unwrap();
        assert_eq!(web.listen.port(), 8765);
        assert_eq!(web.history_size, 50);
        assert_eq!(web.history_mode, HistoryMode::Time);
        assert_eq!(web.channel_map["survival"], "mcrelay:survival");
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.servers.len(), 1);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = Config::load("/nonexistent/config.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
