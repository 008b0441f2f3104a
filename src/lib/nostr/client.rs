use log::*;
use nostr::{ClientMessage, Event, Filter, JsonUtil, RelayMessage, SubscriptionId};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::task::JoinSet;
use url::Url;

use crate::nostr::endpoint::{self, RelayEndpoint};
use crate::nostr::keys::{self, Signer};
use crate::nostr::message::MessageError;
use crate::nostr::relay_connection::{InboundFrame, NostrRelayConnection};
use crate::nostr::subscription::{NostrSubscription, SubscriptionPurpose, SubscriptionState};

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Message error: {0}")]
    Message(#[from] MessageError),
}

/// Fixed delays used in place of waiting on relay acknowledgements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Pause after opening connections so handshakes can finish.
    pub connect_settle: Duration,
    /// Pause after sending a request so relays can answer.
    pub publish_settle: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            connect_settle: Duration::from_millis(1250),
            publish_settle: Duration::from_millis(2500),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventMessage {
    pub relay: Url,
    pub subscription_id: String,
    pub event: Event,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NoticeMessage {
    pub relay: Url,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EoseMessage {
    pub relay: Url,
    pub subscription_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuthChallenge {
    pub relay: Url,
    pub challenge: String,
}

/// Inbound frames sorted by type, waiting to be consumed.
#[derive(Debug, Default)]
pub struct MessagePool {
    pub events: VecDeque<EventMessage>,
    pub notices: VecDeque<NoticeMessage>,
    pub eose_notices: VecDeque<EoseMessage>,
    pub auths: VecDeque<AuthChallenge>,
}

impl MessagePool {
    fn add_frame(&mut self, frame: InboundFrame) {
        let relay = frame.relay;

        match frame.message {
            RelayMessage::Event { subscription_id, event } => self.events.push_back(EventMessage {
                relay,
                subscription_id: subscription_id.to_string(),
                event: *event,
            }),
            RelayMessage::Notice { message } => self.notices.push_back(NoticeMessage { relay, content: message }),
            RelayMessage::EndOfStoredEvents(subscription_id) => self.eose_notices.push_back(EoseMessage {
                relay,
                subscription_id: subscription_id.to_string(),
            }),
            RelayMessage::Auth { challenge } => self.auths.push_back(AuthChallenge { relay, challenge }),
            RelayMessage::Ok { event_id, status, message } => {
                if status {
                    debug!("{relay} accepted {event_id}");
                } else {
                    info!("{relay} rejected {event_id}: {message}");
                }
            }
            RelayMessage::Closed { subscription_id, message } => {
                info!("{relay} closed {subscription_id}: {message}");
            }
            other => debug!("Ignoring {} from {relay}", other.as_json()),
        }
    }
}

struct RelayLink {
    endpoint: RelayEndpoint,
    tx: UnboundedSender<String>,
}

/// Fans requests out to every connected relay and merges what they send back
/// into one [`MessagePool`].
pub struct NostrClient {
    links: Vec<RelayLink>,
    subscriptions: HashMap<String, NostrSubscription>,
    subscription_counter: u64,
    tasks: JoinSet<()>,
    inbound_tx: UnboundedSender<InboundFrame>,
    inbound_rx: UnboundedReceiver<InboundFrame>,
    timing: Timing,
    pub message_pool: MessagePool,
}

impl NostrClient {
    pub fn new(timing: Timing) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        Self {
            links: vec![],
            subscriptions: HashMap::new(),
            subscription_counter: 0,
            tasks: JoinSet::new(),
            inbound_tx,
            inbound_rx,
            timing,
            message_pool: MessagePool::default(),
        }
    }

    pub fn timing(&self) -> Timing {
        self.timing
    }

    /// Sender feeding the inbound queue that [`poll`](Self::poll) drains.
    pub fn inbound_sender(&self) -> UnboundedSender<InboundFrame> {
        self.inbound_tx.clone()
    }

    /// Open links to at most `max_count` of `relays`, in random order.
    ///
    /// Relays that fail to connect drop out of the fan-out on their own.
    pub async fn connect(&mut self, relays: &[RelayEndpoint], max_count: usize) {
        debug!("Connecting to relays");

        for endpoint in endpoint::pick_relays(relays, max_count) {
            let (client_messages_tx, client_messages_rx) = mpsc::unbounded_channel();
            let inbound_tx = self.inbound_tx.clone();
            let url = endpoint.url.clone();

            let mut relay_connection = NostrRelayConnection::new(endpoint.clone());
            self.tasks.spawn(async move {
                if let Err(e) = relay_connection.connect(inbound_tx, client_messages_rx).await {
                    warn!("Relay {url} unavailable: {e}");
                }
            });

            self.links.push(RelayLink { endpoint, tx: client_messages_tx });
        }

        tokio::time::sleep(self.timing.connect_settle).await;
    }

    pub async fn disconnect(&mut self) {
        if self.links.is_empty() && self.tasks.is_empty() {
            return;
        }

        debug!("Disconnecting from relays");

        // Dropping the senders asks every link to close its socket.
        self.links.clear();

        let tasks = &mut self.tasks;
        let drained = tokio::time::timeout(self.timing.publish_settle, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            self.tasks.abort_all();
            while self.tasks.join_next().await.is_some() {}
        }
    }

    /// Number of links whose connection task is still running.
    pub fn connected_count(&self) -> usize {
        self.links.iter().filter(|l| !l.tx.is_closed()).count()
    }

    /// Register a subscription under a fresh id and send its REQ to every
    /// writable relay. Returns the id.
    pub fn subscribe(&mut self, purpose: SubscriptionPurpose, filters: Vec<Filter>) -> String {
        self.subscription_counter += 1;
        let id = format!("{}_{}", purpose.prefix(), self.subscription_counter);

        self.subscriptions.insert(id.clone(), NostrSubscription::new(id.clone(), filters));
        self.resend_subscription(&id);

        id
    }

    /// Send the REQ for an open subscription again, e.g. after authenticating.
    pub fn resend_subscription(&self, subscription_id: &str) {
        if let Some(sub) = self.subscriptions.get(subscription_id) {
            if sub.state == SubscriptionState::Open {
                let req = ClientMessage::req(SubscriptionId::new(sub.id.clone()), sub.filters.clone());
                self.send_to_writable(&req);
            }
        }
    }

    pub fn subscription_state(&self, subscription_id: &str) -> Option<SubscriptionState> {
        self.subscriptions.get(subscription_id).map(|s| s.state)
    }

    pub async fn close_subscription(&mut self, subscription_id: &str) {
        if let Some(sub) = self.subscriptions.get_mut(subscription_id) {
            sub.state = SubscriptionState::AwaitingClose;
        }

        let json = ClientMessage::close(SubscriptionId::new(subscription_id)).as_json();
        for link in self.links.iter() {
            link.tx.send(json.clone()).ok();
        }

        tokio::time::sleep(self.timing.publish_settle).await;

        if let Some(sub) = self.subscriptions.get_mut(subscription_id) {
            sub.state = SubscriptionState::Closed;
        }
    }

    pub fn publish(&self, event: Event) -> usize {
        self.send_to_writable(&ClientMessage::event(event))
    }

    fn send_to_writable(&self, message: &ClientMessage) -> usize {
        let json = message.as_json();

        self.links
            .iter()
            .filter(|l| l.endpoint.can_write)
            .filter(|l| l.tx.send(json.clone()).is_ok())
            .count()
    }

    /// Move every frame already received into the message pool without waiting.
    pub fn poll(&mut self) -> usize {
        let mut count = 0;

        while let Ok(frame) = self.inbound_rx.try_recv() {
            self.message_pool.add_frame(frame);
            count += 1;
        }

        count
    }

    /// Answer every pending AUTH challenge with a signed response sent to the
    /// relay that issued it. Returns whether any challenge was answered.
    pub fn authenticate(&mut self, signer: &dyn Signer) -> bool {
        self.poll();

        if self.message_pool.auths.is_empty() {
            return false;
        }

        while let Some(auth) = self.message_pool.auths.pop_front() {
            info!("AUTH request received from {} with challenge: {}", auth.relay, auth.challenge);

            let event = match signer.sign(keys::auth_builder(&auth.challenge, &auth.relay)) {
                Ok(event) => event,
                Err(e) => {
                    warn!("Could not sign AUTH for {}: {e}", auth.relay);
                    continue;
                }
            };

            debug!("Sending signed AUTH message to {}", auth.relay);

            let json = ClientMessage::auth(event).as_json();
            if let Some(link) = self.links.iter().find(|l| l.endpoint.url == auth.relay) {
                link.tx.send(json).ok();
            }
        }

        true
    }
}
