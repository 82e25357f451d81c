//! The relay router: a static mapping from bus channels to destinations.
//!
//! The router is the only component that knows the topology. Bus messages
//! fan out to every destination mapped from their channel; IRC channel text
//! flows the other way and is handed to the Redis link for publishing.
//! Destinations receive raw payload bytes; IRC sessions sanitize on their
//! side because sanitization needs the channel roster.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::irc::SessionCommand;
use crate::redis::RedisCommand;
use crate::web::GatewayEvent;

/// Work items for the router task.
#[derive(Debug)]
pub enum RouterEvent {
    /// A bus message to deliver to mapped destinations.
    Relay { channel: String, payload: Vec<u8> },
    /// A payload to publish onto the bus.
    Publish { channel: String, payload: Vec<u8> },
}

/// One receiver of bus traffic for a given channel.
pub enum Destination {
    /// Say the payload into an IRC channel on one session.
    Irc {
        session: mpsc::Sender<SessionCommand>,
        channel: String,
    },
    /// Hand the payload to the WebSocket gateway.
    Web { gateway: mpsc::Sender<GatewayEvent> },
}

/// Cloneable handle exposing the router's call surface.
#[derive(Clone)]
pub struct RouterHandle {
    tx: mpsc::Sender<RouterEvent>,
}

impl RouterHandle {
    pub fn new(tx: mpsc::Sender<RouterEvent>) -> Self {
        RouterHandle { tx }
    }

    /// Deliver a bus payload into every destination mapped from `channel`.
    pub async fn relay(&self, channel: &str, payload: Vec<u8>) {
        let _ = self
            .tx
            .send(RouterEvent::Relay {
                channel: channel.to_owned(),
                payload,
            })
            .await;
    }

    /// Publish a payload to the bus.
    pub async fn publish(&self, channel: &str, payload: Vec<u8>) {
        let _ = self
            .tx
            .send(RouterEvent::Publish {
                channel: channel.to_owned(),
                payload,
            })
            .await;
    }
}

/// The router task.
pub struct Router {
    events: mpsc::Receiver<RouterEvent>,
    routes: HashMap<String, Vec<Destination>>,
    redis: mpsc::Sender<RedisCommand>,
}

impl Router {
    pub fn new(
        events: mpsc::Receiver<RouterEvent>,
        routes: HashMap<String, Vec<Destination>>,
        redis: mpsc::Sender<RedisCommand>,
    ) -> Self {
        Router {
            events,
            routes,
            redis,
        }
    }

    pub async fn run(mut self) {
        while let Some(event) = self.events.recv().await {
            match event {
                RouterEvent::Relay { channel, payload } => {
                    let Some(destinations) = self.routes.get(&channel) else {
                        debug!(channel = %channel, "router: no destinations");
                        continue;
                    };
                    for destination in destinations {
                        match destination {
                            Destination::Irc {
                                session,
                                channel: irc_channel,
                            } => {
                                let text = String::from_utf8_lossy(&payload).into_owned();
                                if session
                                    .send(SessionCommand::Relay {
                                        channel: irc_channel.clone(),
                                        text,
                                    })
                                    .await
                                    .is_err()
                                {
                                    warn!(channel = %irc_channel, "router: session gone");
                                }
                            }
                            Destination::Web { gateway } => {
                                let _ = gateway
                                    .send(GatewayEvent::Deliver {
                                        channel: channel.clone(),
                                        payload: payload.clone(),
                                    })
                                    .await;
                            }
                        }
                    }
                }
                RouterEvent::Publish { channel, payload } => {
                    let _ = self
                        .redis
                        .send(RedisCommand::Publish { channel, payload })
                        .await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spawn_router(
        routes: HashMap<String, Vec<Destination>>,
    ) -> (RouterHandle, mpsc::Receiver<RedisCommand>) {
        let (router_tx, router_rx) = mpsc::channel(8);
        let (redis_tx, redis_rx) = mpsc::channel(8);
        tokio::spawn(Router::new(router_rx, routes, redis_tx).run());
        (RouterHandle::new(router_tx), redis_rx)
    }

    #[tokio::test]
    async fn relays_to_mapped_irc_destination() {
        let (session_tx, mut session_rx) = mpsc::channel(8);
        let mut routes = HashMap::new();
        routes.insert(
            "mcrelay:srv".to_owned(),
            vec![Destination::Irc {
                session: session_tx,
                channel: "#mc".to_owned(),
            }],
        );
        let (handle, _redis_rx) = spawn_router(routes);

        handle.relay("mcrelay:srv", b"hello".to_vec()).await;
        match session_rx.recv().await.unwrap() {
            SessionCommand::Relay { channel, text } => {
                assert_eq!(channel, "#mc");
                assert_eq!(text, "hello");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[tokio::test]
    async fn unmapped_channel_is_dropped() {
        let (session_tx, mut session_rx) = mpsc::channel(8);
        let mut routes = HashMap::new();
        routes.insert(
            "mcrelay:srv".to_owned(),
            vec![Destination::Irc {
                session: session_tx,
                channel: "#mc".to_owned(),
            }],
        );
        let (handle, _redis_rx) = spawn_router(routes);

        handle.relay("mcrelay:other", b"hello".to_vec()).await;
        handle.relay("mcrelay:srv", b"after".to_vec()).await;
        // Only the mapped payload arrives, proving the first was dropped.
        match session_rx.recv().await.unwrap() {
            SessionCommand::Relay { text, .. } => assert_eq!(text, "after"),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[tokio::test]
    async fn publish_reaches_redis() {
        let (handle, mut redis_rx) = spawn_router(HashMap::new());

        handle.publish("mcrelay:srv", b"<alice> hi".to_vec()).await;
        let RedisCommand::Publish { channel, payload } = redis_rx.recv().await.unwrap();
        assert_eq!(channel, "mcrelay:srv");
        assert_eq!(payload, b"<alice> hi");
    }
}
