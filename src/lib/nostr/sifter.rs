use log::*;
use nostr::Event;

use crate::calendar::matcher::CandidatePool;
use crate::nostr::client::NostrClient;
use crate::nostr::keys::Signer;
use crate::nostr::subscription::SubscriptionPurpose;

/// Events collected per subscription purpose. Monitored events feed the
/// calendar candidate pool.
#[derive(Debug, Default)]
pub struct Buckets {
    pub direct_messages: Vec<Event>,
    pub monitored_events: CandidatePool,
    pub pubkeys: Vec<Event>,
    pub profiles: Vec<Event>,
    pub event_by_id: Vec<Event>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SiftReport {
    pub events: usize,
    pub unroutable: usize,
    pub notices: usize,
    pub eose: usize,
}

/// Drain everything the relays have sent so far into `buckets`.
///
/// Pending AUTH challenges are answered first. Never waits for new frames.
pub fn sift_message_pool(client: &mut NostrClient, signer: &dyn Signer, buckets: &mut Buckets) -> SiftReport {
    client.authenticate(signer);
    client.poll();

    let mut report = SiftReport::default();
    let pool = &mut client.message_pool;

    while let Some(msg) = pool.events.pop_front() {
        match SubscriptionPurpose::from_subscription_id(&msg.subscription_id) {
            Some(SubscriptionPurpose::DirectMessages) => buckets.direct_messages.push(msg.event),
            Some(SubscriptionPurpose::MonitoredEvents) => {
                buckets.monitored_events.ingest(msg.event);
            }
            Some(SubscriptionPurpose::Pubkeys) => buckets.pubkeys.push(msg.event),
            Some(SubscriptionPurpose::Profiles) => buckets.profiles.push(msg.event),
            Some(SubscriptionPurpose::EventById) => buckets.event_by_id.push(msg.event),
            None => {
                debug!(
                    "Unexpected event from relay {} with subscription {}: {}",
                    msg.relay, msg.subscription_id, msg.event.content
                );
                report.unroutable += 1;
                continue;
            }
        }
        report.events += 1;
    }

    while let Some(notice) = pool.notices.pop_front() {
        info!("RELAY NOTICE FROM {}: {}", notice.relay, notice.content);
        report.notices += 1;
    }

    report.eose = pool.eose_notices.len();
    pool.eose_notices.clear();

    report
}
