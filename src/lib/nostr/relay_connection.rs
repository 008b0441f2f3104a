use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use log::*;
use nostr::RelayMessage;
use tokio::net::TcpStream;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::nostr::client::ClientError;
use crate::nostr::endpoint::RelayEndpoint;
use crate::nostr::message::parse_relay_message;

type WriteStream = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// A frame received from one relay.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundFrame {
    pub relay: Url,
    pub message: RelayMessage,
}

/// One websocket to one relay.
///
/// Outbound text frames arrive on `rx`; decoded inbound frames go to the
/// shared `tx`. The link ends when the relay hangs up or every sender for
/// `rx` is dropped. Failed connects are not retried.
pub struct NostrRelayConnection {
    endpoint: RelayEndpoint,
}

impl NostrRelayConnection {
    pub fn new(endpoint: RelayEndpoint) -> Self {
        Self { endpoint }
    }

    pub async fn connect(&mut self, tx: UnboundedSender<InboundFrame>, mut rx: UnboundedReceiver<String>) -> Result<(), ClientError> {
        let relay_url = self.endpoint.url.clone();

        let (stream, _) = tokio_tungstenite::connect_async(relay_url.as_str())
            .await
            .map_err(|e| ClientError::Connection(format!("{relay_url}: {e}")))?;

        debug!("Connected to {relay_url}");

        let (mut write_stream, mut read_stream) = stream.split();

        loop {
            tokio::select! {
                outbound = rx.recv() => {
                    match outbound {
                        Some(m) => {
                            if let Err(e) = self.send_client_message(&mut write_stream, m).await {
                                warn!("Send to {relay_url} failed: {e}");
                                break;
                            }
                        }
                        None => {
                            write_stream.send(Message::Close(None)).await.ok();
                            break;
                        }
                    }
                }
                inbound = read_stream.next() => {
                    match inbound {
                        Some(Ok(m)) => {
                            if let Err(e) = self.forward_relay_message(&tx, m) {
                                debug!("Dropping frame from {relay_url}: {e}");
                            }
                        }
                        Some(Err(e)) => {
                            warn!("Relay {relay_url} read error: {e}");
                            break;
                        }
                        None => break,
                    }
                }
            }
        }

        debug!("Disconnected from {relay_url}");

        Ok(())
    }

    async fn send_client_message(&mut self, write_stream: &mut WriteStream, message: String) -> Result<(), ClientError> {
        write_stream
            .send(Message::Text(message))
            .await
            .map_err(|e| ClientError::WebSocket(e.to_string()))
    }

    fn forward_relay_message(&self, tx: &UnboundedSender<InboundFrame>, message: Message) -> Result<(), ClientError> {
        match message {
            Message::Text(text) => {
                let message = parse_relay_message(&text)?;

                // Write-only links still answer AUTH challenges.
                if !self.endpoint.can_read && !matches!(message, RelayMessage::Auth { .. }) {
                    return Ok(());
                }

                let frame = InboundFrame {
                    relay: self.endpoint.url.clone(),
                    message,
                };

                tx.send(frame).map_err(|_| ClientError::Connection("inbound queue closed".to_string()))
            }
            _ => Ok(()),
        }
    }
}
