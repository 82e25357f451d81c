//! The Redis link: one connection to the bus, kept alive forever.
//!
//! The link reconnects with increasing backoff and re-issues every
//! subscription after each successful connect — the server forgets
//! subscriptions with the connection. Decoded replies are interpreted as
//! bus envelopes and dispatched to the router; anything unintelligible is
//! logged and dropped, never fatal. A RESP decode violation means the
//! stream is corrupted: the connection is closed and the backoff policy
//! brings up a clean one.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use mcrelay_proto::resp::{Codec, Request, Value};

use crate::error::LinkError;
use crate::router::RouterHandle;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Commands accepted by the link.
#[derive(Debug)]
pub enum RedisCommand {
    /// `PUBLISH <channel> <payload>`
    Publish { channel: String, payload: Vec<u8> },
}

/// A parsed bus envelope: an array whose first element names a command.
#[derive(Debug, PartialEq, Eq)]
enum BusEvent {
    /// `["message", channel, payload]`
    Message { channel: String, payload: Vec<u8> },
    /// `["subscribe", channel, count]` — subscription acknowledged.
    Subscribe,
    /// A well-formed envelope with a command nothing handles.
    Unhandled(String),
    /// Not an envelope at all.
    Malformed,
}

fn parse_event(value: &Value) -> BusEvent {
    let Value::Array(items) = value else {
        return BusEvent::Malformed;
    };
    let Some(command) = items.first().and_then(Value::as_str) else {
        return BusEvent::Malformed;
    };
    match command {
        "message" => {
            let channel = items.get(1).and_then(Value::as_str);
            let payload = items.get(2).and_then(Value::as_bytes);
            match (channel, payload) {
                (Some(channel), Some(payload)) => BusEvent::Message {
                    channel: channel.to_owned(),
                    payload: payload.to_vec(),
                },
                _ => BusEvent::Malformed,
            }
        }
        "subscribe" => BusEvent::Subscribe,
        other => BusEvent::Unhandled(other.to_owned()),
    }
}

/// The Redis link task.
pub struct RedisLink {
    host: String,
    port: u16,
    /// Channels re-subscribed on every connect.
    channels: Vec<String>,
    commands: mpsc::Receiver<RedisCommand>,
    router: RouterHandle,
}

impl RedisLink {
    pub fn new(
        host: String,
        port: u16,
        channels: Vec<String>,
        commands: mpsc::Receiver<RedisCommand>,
        router: RouterHandle,
    ) -> Self {
        RedisLink {
            host,
            port,
            channels,
            commands,
            router,
        }
    }

    pub async fn run(mut self) {
        let mut backoff = INITIAL_BACKOFF;
        loop {
            match TcpStream::connect((self.host.as_str(), self.port)).await {
                Ok(stream) => {
                    info!(host = %self.host, port = self.port, "redis: connected");
                    backoff = INITIAL_BACKOFF;
                    match self.serve(Framed::new(stream, Codec::new())).await {
                        Ok(()) => return, // command channel closed: shutting down
                        Err(e) => warn!(error = %e, "redis: connection lost"),
                    }
                }
                Err(e) => {
                    warn!(host = %self.host, error = %e, "redis: connection attempt failed");
                }
            }
            info!(delay_secs = backoff.as_secs(), "redis: reconnecting");
            sleep(backoff).await;
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }

    async fn serve(&mut self, mut framed: Framed<TcpStream, Codec>) -> Result<(), LinkError> {
        if !self.channels.is_empty() {
            framed
                .send(Request::subscribe(self.channels.iter().map(String::as_str)))
                .await?;
        }

        loop {
            tokio::select! {
                reply = framed.next() => match reply {
                    Some(Ok(value)) => self.dispatch(&value).await,
                    Some(Err(e)) => return Err(e.into()),
                    None => return Err(LinkError::ConnectionClosed),
                },
                command = self.commands.recv() => match command {
                    Some(RedisCommand::Publish { channel, payload }) => {
                        framed.send(Request::publish(&channel, &payload)).await?;
                    }
                    None => return Ok(()),
                },
            }
        }
    }

    async fn dispatch(&self, value: &Value) {
        match parse_event(value) {
            BusEvent::Message { channel, payload } => {
                self.router.relay(&channel, payload).await;
            }
            BusEvent::Subscribe => debug!("redis: subscription confirmed"),
            BusEvent::Unhandled(command) => {
                warn!(command = %command, "redis: nothing handles this bus command");
            }
            BusEvent::Malformed => {
                warn!(value = ?value, "redis: unintelligible bus payload");
            }
        }
    }
}
