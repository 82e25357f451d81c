//! mcrelayd - chat relay daemon.
//!
//! Bridges IRC networks and a Redis pub/sub bus, with an optional
//! WebSocket gateway for browser listeners. Everything runs on one
//! cooperative event loop: each IRC session, the Redis link, the router
//! and the gateway are tasks that own their state outright and talk over
//! channels, so no state is ever shared or locked.

mod config;
mod error;
mod history;
mod irc;
mod redis;
mod router;
mod web;

use std::collections::{BTreeSet, HashMap};

use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::{Config, BUS_PREFIX};
use crate::irc::{Session, SessionCommand};
use crate::redis::RedisLink;
use crate::router::{Destination, Router, RouterHandle};
use crate::web::Gateway;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;

    info!(
        servers = config.servers.len(),
        redis = %config.redis_host,
        "Starting mcrelayd"
    );

    let (router_tx, router_rx) = mpsc::channel(256);
    let router_handle = RouterHandle::new(router_tx);
    let (redis_tx, redis_rx) = mpsc::channel(256);

    let mut routes: HashMap<String, Vec<Destination>> = HashMap::new();
    let mut subscriptions: BTreeSet<String> = BTreeSet::new();
    let mut sessions: Vec<mpsc::Sender<SessionCommand>> = Vec::new();

    // IRC sessions, one task each.
    for (name, server) in &config.servers {
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        for (irc_channel, suffix) in &server.channel_map {
            let bus_channel = format!("{}{}", BUS_PREFIX, suffix);
            routes
                .entry(bus_channel.clone())
                .or_default()
                .push(Destination::Irc {
                    session: cmd_tx.clone(),
                    channel: irc_channel.clone(),
                });
            subscriptions.insert(bus_channel);
        }
        let session = Session::new(
            name.clone(),
            server.clone(),
            router_handle.clone(),
            cmd_rx,
        );
        tokio::spawn(session.run());
        sessions.push(cmd_tx);
    }

    // Optional WebSocket gateway.
    if let Some(web_config) = config.web.clone() {
        let (gateway_tx, gateway_rx) = mpsc::channel(256);
        for bus_channel in web_config.channel_map.values() {
            routes
                .entry(bus_channel.clone())
                .or_default()
                .push(Destination::Web {
                    gateway: gateway_tx.clone(),
                });
            subscriptions.insert(bus_channel.clone());
        }
        let gateway = Gateway::new(web_config, gateway_rx);
        tokio::spawn(async move {
            if let Err(e) = gateway.run().await {
                error!(error = %e, "web: gateway terminated");
            }
        });
    }

    tokio::spawn(Router::new(router_rx, routes, redis_tx).run());

    let link = RedisLink::new(
        config.redis_host.clone(),
        config.redis_port,
        subscriptions.into_iter().collect(),
        redis_rx,
        router_handle,
    );
    tokio::spawn(link.run());

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    for session in &sessions {
        let _ = session.send(SessionCommand::Quit).await;
    }
    // Let the QUIT lines reach the wire before the process exits.
    tokio::time::sleep(std::time::Duration::from_millis(500)).await;
    Ok(())
}
