//! WebSocket gateway: fans bus traffic to browser listeners.
//!
//! Clients connect to `/chat/<name>/socket`; `<name>` is resolved through
//! the web channel map to a bus channel. Each bus channel has a subscriber
//! group and a history backlog that is replayed to new arrivals. Clients
//! are strictly listeners. A dropped client is pruned from its group and
//! never disturbs other clients or the Redis link.

use std::collections::HashMap;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

use crate::config::WebConfig;
use crate::history::RelayHistory;

/// Work items for the gateway task.
#[derive(Debug)]
pub enum GatewayEvent {
    /// A bus payload for one mapped channel.
    Deliver { channel: String, payload: Vec<u8> },
}

/// A freshly accepted client, tagged with its bus channel.
type Registration = (String, mpsc::Sender<String>);

/// The gateway task.
pub struct Gateway {
    cfg: WebConfig,
    events: mpsc::Receiver<GatewayEvent>,
}

impl Gateway {
    pub fn new(cfg: WebConfig, events: mpsc::Receiver<GatewayEvent>) -> Self {
        Gateway { cfg, events }
    }

    pub async fn run(mut self) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.cfg.listen).await?;
        info!(addr = %self.cfg.listen, "web: listening");

        let (reg_tx, mut reg_rx) = mpsc::channel::<Registration>(16);
        tokio::spawn(accept_loop(listener, self.cfg.channel_map.clone(), reg_tx));

        let mut groups: HashMap<String, Vec<mpsc::Sender<String>>> = HashMap::new();
        let mut histories: HashMap<String, RelayHistory> = self
            .cfg
            .channel_map
            .values()
            .map(|bus| {
                (
                    bus.clone(),
                    RelayHistory::new(self.cfg.history_size, self.cfg.history_mode),
                )
            })
            .collect();

        loop {
            tokio::select! {
                registration = reg_rx.recv() => {
                    let Some((channel, client)) = registration else { break };
                    if let Some(history) = histories.get(&channel) {
                        for event in history.iter() {
                            if client.send(event.to_owned()).await.is_err() {
                                break;
                            }
                        }
                    }
                    groups.entry(channel).or_default().push(client);
                }
                event = self.events.recv() => {
                    let Some(GatewayEvent::Deliver { channel, payload }) = event else { break };
                    let text = String::from_utf8_lossy(&payload).into_owned();
                    if let Some(history) = histories.get_mut(&channel) {
                        history.push(text.clone());
                    }
                    if let Some(clients) = groups.get_mut(&channel) {
                        clients.retain(|client| match client.try_send(text.clone()) {
                            Ok(()) => true,
                            // A slow listener loses this message, not its
                            // connection.
                            Err(mpsc::error::TrySendError::Full(_)) => true,
                            Err(mpsc::error::TrySendError::Closed(_)) => false,
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

async fn accept_loop(
    listener: TcpListener,
    channel_map: HashMap<String, String>,
    reg_tx: mpsc::Sender<Registration>,
) {
    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(error = %e, "web: accept failed");
                continue;
            }
        };
        debug!(client = %addr, "web: incoming connection");
        tokio::spawn(serve_client(stream, channel_map.clone(), reg_tx.clone()));
    }
}

/// Extract the channel name from a `/chat/<name>/socket` request path.
fn channel_from_path(path: &str) -> Option<&str> {
    let mut parts = path.split('/');
    match (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) {
        (Some(""), Some("chat"), Some(name), Some("socket"), None) if !name.is_empty() => {
            Some(name)
        }
        _ => None,
    }
}

async fn serve_client(
    stream: TcpStream,
    channel_map: HashMap<String, String>,
    reg_tx: mpsc::Sender<Registration>,
) {
    let mut path = String::new();
    let accepted = tokio_tungstenite::accept_hdr_async(stream, |req: &Request, resp: Response| {
        path = req.uri().path().to_owned();
        Ok(resp)
    })
    .await;
    let mut ws = match accepted {
        Ok(ws) => ws,
        Err(e) => {
            debug!(error = %e, "web: handshake failed");
            return;
        }
    };

    let name = channel_from_path(&path);
    let Some(bus_channel) = name.and_then(|n| channel_map.get(n)).cloned() else {
        let requested = name.unwrap_or(path.as_str());
        let notice = format!("\u{a7}e{} is not a valid channel!", requested);
        let _ = ws.send(WsMessage::Text(notice)).await;
        let _ = ws.close(None).await;
        return;
    };

    let (tx, mut rx) = mpsc::channel::<String>(64);
    if reg_tx.send((bus_channel, tx)).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            outbound = rx.recv() => match outbound {
                Some(text) => {
                    if ws.send(WsMessage::Text(text)).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            inbound = ws.next() => match inbound {
                Some(Ok(WsMessage::Close(_))) | None => break,
                // Listeners have nothing to say; drop any chatter.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(error = %e, "web: client error");
                    break;
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_socket_paths() {
        assert_eq!(channel_from_path("/chat/survival/socket"), Some("survival"));
        assert_eq!(channel_from_path("/chat//socket"), None);
        assert_eq!(channel_from_path("/chat/survival"), None);
        assert_eq!(channel_from_path("/other/survival/socket"), None);
        assert_eq!(channel_from_path("/chat/survival/socket/extra"), None);
    }
}
