use log::*;
use nostr::{Event, Filter, Kind, PublicKey};

use crate::calendar::aggregate::CalendarAggregate;
use crate::calendar::matcher::{self, CrossReferences, SearchCriterion};
use crate::config::CalendarDefinition;
use crate::nostr::client::NostrClient;
use crate::nostr::event::unix_now;
use crate::nostr::keys::{KeyError, Signer};
use crate::nostr::sifter::{self, Buckets};
use crate::nostr::subscription::SubscriptionPurpose;

/// Runs search passes over an already connected client, one at a time.
///
/// The candidate pool lives as long as the scheduler, so events that no
/// criterion claimed are offered again on the next pass.
pub struct CalendarScheduler<S: Signer> {
    client: NostrClient,
    signer: S,
    calendar: CalendarDefinition,
    buckets: Buckets,
}

impl<S: Signer> CalendarScheduler<S> {
    pub fn new(client: NostrClient, signer: S, calendar: CalendarDefinition) -> Self {
        Self {
            client,
            signer,
            calendar,
            buckets: Buckets::default(),
        }
    }

    pub fn buckets(&self) -> &Buckets {
        &self.buckets
    }

    pub fn client(&self) -> &NostrClient {
        &self.client
    }

    /// Run passes until the calendar's frequency says stop, then disconnect.
    /// Returns the number of passes made.
    pub async fn run(&mut self) -> usize {
        let mut passes = 0;

        loop {
            match self.run_pass().await {
                Ok(event) => info!("Published calendar {} with {} tags", event.id, event.tags.len()),
                Err(e) => error!("Could not sign calendar event: {e}"),
            }
            passes += 1;

            match self.calendar.interval() {
                Some(interval) => {
                    debug!("sleeping for {}", interval.as_secs());
                    tokio::time::sleep(interval).await;
                }
                None => break,
            }
        }

        self.client.disconnect().await;

        passes
    }

    /// Query every search criterion, then sign and publish the aggregate.
    pub async fn run_pass(&mut self) -> Result<Event, KeyError> {
        let mut references = CrossReferences::default();

        let searchlist = self.calendar.searchlist.clone();

        for criterion in searchlist.iter() {
            let consumed = self.search(criterion, &mut references).await;
            debug!(
                "Criterion {}:{} matched {} events, {} still pooled",
                criterion.kind,
                criterion.author,
                consumed,
                self.buckets.monitored_events.len()
            );
        }

        let maintainer = self.signer.public_key().to_hex();
        let aggregate = CalendarAggregate::new(&self.calendar, &maintainer, references);
        let event = self.signer.sign(aggregate.to_builder())?;

        let sent = self.client.publish(event.clone());
        debug!("Calendar event sent to {sent} relays");

        Ok(event)
    }

    async fn search(&mut self, criterion: &SearchCriterion, references: &mut CrossReferences) -> usize {
        // Events retained from earlier criteria are still matched when the
        // author cannot be queried.
        let subscription_id = match PublicKey::parse(&criterion.author) {
            Ok(author) => Some(self.request(criterion.kind, author).await),
            Err(e) => {
                warn!("Not fetching kind {} for author {}: {e}", criterion.kind, criterion.author);
                None
            }
        };

        sifter::sift_message_pool(&mut self.client, &self.signer, &mut self.buckets);

        let consumed = matcher::match_criterion(criterion, &mut self.buckets.monitored_events, references, unix_now());

        if let Some(subscription_id) = subscription_id {
            self.client.close_subscription(&subscription_id).await;
        }

        consumed
    }

    /// Subscribe to `kind` events by `author` and give relays time to answer.
    async fn request(&mut self, kind: u16, author: PublicKey) -> String {
        let settle = self.client.timing().publish_settle;
        let filters = vec![Filter::new().kind(Kind::from(kind)).author(author)];

        let subscription_id = self.client.subscribe(SubscriptionPurpose::MonitoredEvents, filters);
        tokio::time::sleep(settle).await;

        // Relays that demanded AUTH likely dropped the first request.
        if self.client.authenticate(&self.signer) {
            self.client.resend_subscription(&subscription_id);
            tokio::time::sleep(settle).await;
        }

        subscription_id
    }
}
