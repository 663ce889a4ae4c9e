//! End-to-end delivery tests for the bridge session.
//!
//! These drive a [`Session`] event by event against a [`MockTransport`], so
//! every upload and completion happens at a known point.

use std::sync::Arc;

use lifelog_bridge::mock::MockTransport;
use lifelog_bridge::transport::TransportError;
use lifelog_bridge::{Event, Session};
use lifelog_store::Store;
use lifelog_types::{DeviceMessage, keys};
use tokio::sync::broadcast;

const CONFIG_UI: &str = "https://example.org/config.html";

fn record(key: &str, line: &str) -> Event {
    Event::DeviceMessage(
        DeviceMessage::new()
            .with(keys::RECORD_KEY, key)
            .with(keys::RECORD_LINE, line),
    )
}

fn config(response: &str) -> Event {
    Event::ConfigSubmitted {
        response: response.to_string(),
        reply: None,
    }
}

fn open_session(store: Store, transport: &Arc<MockTransport>) -> Session {
    let (device_tx, _) = broadcast::channel(8);
    Session::load(store, transport.clone(), device_tx, CONFIG_UI).unwrap()
}

/// Wait for the in-flight upload to finish and handle its completion.
async fn settle(session: &mut Session) {
    let event = session.next_event().await.unwrap();
    assert!(matches!(event, Event::UploadCompleted { .. }));
    session.handle_event(event);
}

/// Keep uploading until the queue is empty, flushing after each failure.
async fn drain(session: &mut Session) {
    while !session.queue().is_empty() {
        if !session.dispatcher().is_sending() {
            session.handle_event(Event::Flush);
        }
        settle(session).await;
    }
}

#[tokio::test]
async fn test_basic_round_trip() {
    let transport = Arc::new(MockTransport::new());
    let mut session = open_session(Store::open_in_memory().unwrap(), &transport);

    session.handle_event(config(r#"{"url": "https://e", "data-field": "d"}"#));
    session.handle_event(record("k1", "hello"));
    settle(&mut session).await;

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url, "https://e");
    assert_eq!(
        requests[0].fields,
        vec![("d".to_string(), "hello".to_string())]
    );

    let status = session.status();
    assert_eq!(status.pending, 0);
    assert_eq!(status.last_sent_key.as_deref(), Some("k1"));
}

#[tokio::test]
async fn test_signed_upload() {
    let transport = Arc::new(MockTransport::new());
    let mut session = open_session(Store::open_in_memory().unwrap(), &transport);

    session.handle_event(config(
        r#"{"url": "https://e", "data-field": "d",
            "signAlgorithm": "SHA-256", "signFieldName": "sig",
            "signFieldFormat": "HEX", "signKey": "secret", "signKeyFormat": "TEXT"}"#,
    ));
    session.handle_event(record("k1", "hello"));
    settle(&mut session).await;

    let request = &transport.requests()[0];
    assert_eq!(request.field("d"), Some("hello"));
    assert_eq!(
        request.field("sig"),
        Some("88aab3ede8d3adf94d26ab90d3bafd4a2083070c3bcce9c014ee04a443847c0b")
    );
}

#[tokio::test]
async fn test_extra_fields_follow_data_and_signature() {
    let transport = Arc::new(MockTransport::new());
    let mut session = open_session(Store::open_in_memory().unwrap(), &transport);

    session.handle_event(config(
        r#"{"url": "https://e", "data-field": "d", "extra-fields": "source%3Dwatch,tz%3DUTC",
            "signAlgorithm": "SHA-1", "signFieldName": "mac",
            "signFieldFormat": "B64", "signKey": "c2VjcmV0", "signKeyFormat": "B64"}"#,
    ));
    session.handle_event(record("k1", "hello"));
    settle(&mut session).await;

    let request = &transport.requests()[0];
    let names: Vec<&str> = request.fields.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["d", "mac", "source", "tz"]);
    assert_eq!(request.field("tz"), Some("UTC"));
}

#[tokio::test]
async fn test_records_wait_until_configured() {
    let transport = Arc::new(MockTransport::new());
    let mut session = open_session(Store::open_in_memory().unwrap(), &transport);

    session.handle_event(record("k1", "a"));
    session.handle_event(record("k2", "b"));
    assert_eq!(session.queue().len(), 2);
    assert!(!session.dispatcher().is_sending());

    session.handle_event(config(r#"{"url": "https://e", "data-field": "d"}"#));
    session.handle_event(Event::Flush);

    // Exactly one request, for the head, until it completes
    let completion = session.next_event().await.unwrap();
    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].key, "k1");

    session.handle_event(completion);
    settle(&mut session).await;

    let keys: Vec<String> = transport.requests().into_iter().map(|r| r.key).collect();
    assert_eq!(keys, vec!["k1", "k2"]);
    assert!(session.queue().is_empty());
}

#[tokio::test]
async fn test_retry_after_failure_resends_head_verbatim() {
    let transport = Arc::new(MockTransport::new());
    transport.push_outcome(Err(TransportError::Status {
        status: 500,
        body: "oops".to_string(),
    }));
    let mut session = open_session(Store::open_in_memory().unwrap(), &transport);

    session.handle_event(config(r#"{"url": "https://e", "data-field": "d"}"#));
    session.handle_event(record("k1", "hello"));
    settle(&mut session).await;

    assert_eq!(session.queue().len(), 1);
    assert!(!session.dispatcher().is_sending());
    assert_eq!(session.status().uploads.failure_count, 1);

    session.handle_event(Event::Flush);
    settle(&mut session).await;

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].key, requests[1].key);
    assert_eq!(requests[0].url, requests[1].url);
    assert_eq!(requests[0].fields, requests[1].fields);
    assert_ne!(requests[0].seq, requests[1].seq);
    assert!(session.queue().is_empty());
}

#[tokio::test]
async fn test_new_record_retries_failed_head() {
    let transport = Arc::new(MockTransport::new());
    transport.set_transient_failures(1);
    let mut session = open_session(Store::open_in_memory().unwrap(), &transport);

    session.handle_event(config(r#"{"url": "https://e", "data-field": "d"}"#));
    session.handle_event(record("k1", "a"));
    settle(&mut session).await;

    // The next append triggers a new attempt, which starts with the old head
    session.handle_event(record("k2", "b"));
    settle(&mut session).await;
    settle(&mut session).await;

    let keys: Vec<String> = transport.requests().into_iter().map(|r| r.key).collect();
    assert_eq!(keys, vec!["k1", "k1", "k2"]);
}

#[tokio::test]
async fn test_stale_completion_is_ignored() {
    let transport = Arc::new(MockTransport::new());
    transport.hold();
    let mut session = open_session(Store::open_in_memory().unwrap(), &transport);

    session.handle_event(config(r#"{"url": "https://e", "data-field": "d"}"#));
    session.handle_event(record("k1", "a"));
    let in_flight = session.dispatcher().in_flight_seq().unwrap();

    session.handle_event(Event::UploadCompleted {
        seq: in_flight + 100,
        outcome: Ok(()),
    });
    assert_eq!(session.queue().len(), 1);
    assert_eq!(session.dispatcher().in_flight_seq(), Some(in_flight));
    assert_eq!(session.status().last_sent_key, None);

    transport.release();
    settle(&mut session).await;
    assert!(session.queue().is_empty());
}

#[tokio::test]
async fn test_single_upload_in_flight() {
    let transport = Arc::new(MockTransport::new());
    transport.hold();
    let mut session = open_session(Store::open_in_memory().unwrap(), &transport);

    session.handle_event(config(r#"{"url": "https://e", "data-field": "d"}"#));
    for i in 0..5 {
        session.handle_event(record(&format!("k{i}"), "line"));
        session.handle_event(Event::Flush);
    }

    while transport.request_count() == 0 {
        tokio::task::yield_now().await;
    }
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert_eq!(transport.request_count(), 1);

    transport.release();
    drain(&mut session).await;
    assert_eq!(transport.request_count(), 5);
}

#[tokio::test]
async fn test_fifo_order_with_intermittent_failures() {
    let transport = Arc::new(MockTransport::new());
    for i in 0..20 {
        if i % 3 == 0 {
            transport.push_outcome(Err(TransportError::Request("reset".to_string())));
        } else {
            transport.push_outcome(Ok(()));
        }
    }
    let mut session = open_session(Store::open_in_memory().unwrap(), &transport);

    for i in 0..10 {
        session.handle_event(record(&format!("{i:02}"), &format!("line {i}")));
    }
    session.handle_event(config(r#"{"url": "https://e", "data-field": "d"}"#));
    drain(&mut session).await;

    // Keys are sent in non-decreasing order: retries repeat, never skip ahead
    let keys: Vec<String> = transport.requests().into_iter().map(|r| r.key).collect();
    assert!(keys.windows(2).all(|w| w[0] <= w[1]), "{keys:?}");

    let mut unique = keys.clone();
    unique.dedup();
    let expected: Vec<String> = (0..10).map(|i| format!("{i:02}")).collect();
    assert_eq!(unique, expected);
}

#[tokio::test]
async fn test_queue_survives_restart() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("bridge.db");
    let transport = Arc::new(MockTransport::new());

    {
        let mut session = open_session(Store::open(&path).unwrap(), &transport);
        session.handle_event(record("k1", "a;b|c"));
        session.handle_event(record("k2", "second"));
        session.handle_event(config(r#"{"url": "https://e", "data-field": "d"}"#));
    }

    let mut session = open_session(Store::open(&path).unwrap(), &transport);
    let status = session.status();
    assert_eq!(status.pending, 2);
    assert_eq!(status.head_key.as_deref(), Some("k1"));
    assert!(status.configured);

    drain(&mut session).await;
    let lines: Vec<String> = transport
        .requests()
        .iter()
        .filter_map(|r| r.field("d").map(str::to_string))
        .collect();
    assert_eq!(lines, vec!["a;b|c", "second"]);
    assert_eq!(session.status().last_sent_key.as_deref(), Some("k2"));
}

#[tokio::test]
async fn test_unacknowledged_upload_is_resent_after_restart() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("bridge.db");
    let transport = Arc::new(MockTransport::new());
    transport.hold();

    {
        let mut session = open_session(Store::open(&path).unwrap(), &transport);
        session.handle_event(config(r#"{"url": "https://e", "data-field": "d"}"#));
        session.handle_event(record("k1", "hello"));
        assert!(session.dispatcher().is_sending());
        // Dropped before the completion arrives
    }

    transport.release();
    let mut session = open_session(Store::open(&path).unwrap(), &transport);
    assert_eq!(session.queue().len(), 1);

    drain(&mut session).await;
    assert!(session.queue().is_empty());
    assert_eq!(session.status().last_sent_key.as_deref(), Some("k1"));
}
