use futures_util::{SinkExt, StreamExt};
use lib::calendar::scheduler::CalendarScheduler;
use lib::config::CalendarDefinition;
use lib::nostr::client::{NostrClient, Timing};
use lib::nostr::endpoint::{relays_from_entries, RelayEntry};
use lib::nostr::keys::custom_tag;
use nostr::{Event, EventBuilder, Keys, Kind};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message};

fn stored_event(author: &Keys, kind: u16, content: &str, tags: &[&[&str]]) -> Event {
    let tags = tags.iter().map(|t| custom_tag(t[0], t[1..].iter().copied()));
    EventBuilder::new(Kind::from(kind), content)
        .tags(tags)
        .sign_with_keys(author)
        .unwrap()
}

/// Serve one client: answer REQs from `events` by kind and author, record
/// every EVENT and AUTH the client sends, then `["HANGUP"]` once it leaves.
async fn spawn_relay(events: Vec<Event>, challenge: Option<&'static str>) -> (String, mpsc::UnboundedReceiver<Value>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (seen_tx, seen_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        let mut authed = challenge.is_none();

        if let Some(challenge) = challenge {
            ws.send(Message::Text(json!(["AUTH", challenge]).to_string())).await.unwrap();
        }

        while let Some(Ok(msg)) = ws.next().await {
            let Message::Text(txt) = msg else { continue };
            let frame: Value = serde_json::from_str(&txt).unwrap();

            match frame[0].as_str() {
                Some("REQ") => {
                    let sub = frame[1].as_str().unwrap().to_string();
                    if !authed {
                        ws.send(Message::Text(json!(["CLOSED", sub, "auth-required: sign in"]).to_string()))
                            .await
                            .unwrap();
                        continue;
                    }
                    let filter = &frame[2];
                    for ev in events.iter().filter(|e| {
                        filter["kinds"][0].as_u64() == Some(e.kind.as_u16() as u64)
                            && filter["authors"][0] == e.pubkey.to_hex().as_str()
                    }) {
                        ws.send(Message::Text(json!(["EVENT", sub, ev]).to_string())).await.unwrap();
                    }
                    ws.send(Message::Text(json!(["EOSE", sub]).to_string())).await.unwrap();
                }
                Some("AUTH") => {
                    let tags = frame[1]["tags"].as_array().cloned().unwrap_or_default();
                    authed = tags.contains(&json!(["challenge", challenge.unwrap_or_default()]));
                    seen_tx.send(frame).ok();
                }
                Some("EVENT") => {
                    let id = frame[1]["id"].clone();
                    seen_tx.send(frame).ok();
                    ws.send(Message::Text(json!(["OK", id, true, ""]).to_string())).await.ok();
                }
                _ => {}
            }
        }

        seen_tx.send(json!(["HANGUP"])).ok();
    });

    (format!("ws://{addr}"), seen_rx)
}

fn calendar(frequency: i64, searchlist: Value) -> CalendarDefinition {
    serde_json::from_value(json!({
        "uuid": "cal-1",
        "frequency": frequency,
        "searchlist": searchlist,
        "name": "Test calendar",
        "description": "For tests",
        "image": "",
        "content": "aggregate"
    }))
    .unwrap()
}

async fn connected_client(url: &str) -> NostrClient {
    let timing = Timing {
        connect_settle: Duration::from_millis(300),
        publish_settle: Duration::from_millis(300),
    };
    let mut client = NostrClient::new(timing);
    let relays = relays_from_entries(&[RelayEntry::Host(url.to_string())]);
    client.connect(&relays, 50).await;
    client
}

fn a_tags(event: &Value) -> Vec<String> {
    event["tags"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|t| t[0] == "a")
        .map(|t| t[1].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn single_pass_publishes_aggregate_and_carries_events_across_criteria() {
    let author_a = Keys::generate();
    let author_b = Keys::generate();
    let a_hex = author_a.public_key().to_hex();
    let meetup_ref = format!("31923:{a_hex}:abc");

    let future = "9999999999";
    let meetup = stored_event(&author_a, 31923, "Monthly Meetup", &[&["d", "abc"], &["start", future]]);
    let gathering = stored_event(&author_a, 31923, "Rust gathering", &[&["d", "rg"], &["start", future]]);
    let old = stored_event(&author_a, 31923, "Old meetup", &[&["d", "old"], &["start", "1000"]]);
    let container = stored_event(
        &author_b,
        31924,
        "",
        &[&["d", "friends"], &["a", "31922:cccc:party"], &["a", meetup_ref.as_str()]],
    );
    let old_id = old.id;
    let (url, mut seen) = spawn_relay(vec![meetup, gathering, old, container], None).await;

    let keys = Keys::generate();
    let maintainer = keys.public_key().to_hex();
    let client = connected_client(&url).await;
    assert_eq!(client.connected_count(), 1);

    let mut scheduler = CalendarScheduler::new(
        client,
        keys,
        calendar(
            0,
            json!([
                {"kind": 31923, "author": a_hex, "phrase": "meetup"},
                {"kind": 31924, "author": author_b.public_key().to_hex(), "d": "friends", "phrase": "rust"}
            ]),
        ),
    );

    assert_eq!(scheduler.run().await, 1);

    let published = seen.recv().await.unwrap();
    assert_eq!(published[0], "EVENT");
    let event = &published[1];
    assert_eq!(event["kind"], 31924);
    assert_eq!(event["pubkey"], maintainer.as_str());
    assert_eq!(event["content"], "aggregate");
    assert_eq!(event["tags"][0], json!(["d", "cal-1"]));
    assert_eq!(event["tags"][4], json!(["p", maintainer, "", "Maintainer"]));

    // The gathering was fetched for the first criterion but claimed by the
    // second one's phrase; the container's duplicate reference collapses.
    assert_eq!(
        a_tags(event),
        vec![meetup_ref, format!("31923:{a_hex}:rg"), "31922:cccc:party".to_string()]
    );

    // The past meetup never matched and stays pooled.
    let pooled: Vec<_> = scheduler.buckets().monitored_events.events().iter().map(|e| e.id).collect();
    assert_eq!(pooled, vec![old_id]);

    // A run-once calendar leaves no relay connected.
    assert_eq!(scheduler.client().connected_count(), 0);
    assert_eq!(seen.recv().await.unwrap(), json!(["HANGUP"]));
}

#[tokio::test]
async fn authenticates_and_resends_request() {
    let author = Keys::generate();
    let author_hex = author.public_key().to_hex();
    let meetup = stored_event(&author, 31923, "Monthly Meetup", &[&["d", "abc"], &["end", "9999999999"]]);
    let (url, mut seen) = spawn_relay(vec![meetup], Some("challenge-42")).await;

    let keys = Keys::generate();
    let client = connected_client(&url).await;

    let mut scheduler = CalendarScheduler::new(
        client,
        keys,
        calendar(0, json!([{"kind": 31923, "author": author_hex, "phrase": "MEETUP"}])),
    );
    scheduler.run().await;

    let auth = seen.recv().await.unwrap();
    assert_eq!(auth[0], "AUTH");
    assert_eq!(auth[1]["kind"], 22242);
    let relay_tag = json!(["relay", url]);
    assert!(auth[1]["tags"].as_array().unwrap().contains(&relay_tag));

    let published = seen.recv().await.unwrap();
    assert_eq!(published[0], "EVENT");
    assert_eq!(a_tags(&published[1]), vec![format!("31923:{author_hex}:abc")]);
}
