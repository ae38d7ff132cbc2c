//! Pubsub event streams: membership, publish, SSE framing and
//! subscription teardown on cancellation.

mod common;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use fetch::Request;

#[tokio::test]
async fn test_membership_document() {
    let (fetch, _) = common::setup();
    let response = fetch.fetch(Request::get("bus://chat/").unwrap()).await;
    assert_eq!(response.status, 200);
    let value: serde_json::Value = response.json().await.unwrap();
    assert_eq!(value["topic"], "chat");
    assert_eq!(value["subscribed"], false);
    assert!(value["id"].as_str().unwrap().starts_with('k'));
}

#[tokio::test]
async fn test_publish_and_receive_sse() {
    let (fetch, _) = common::setup();

    let request = Request::get("bus://chat/")
        .unwrap()
        .with_header("accept", "text/event-stream");
    let response = fetch.fetch(request).await;
    assert_eq!(response.status, 200);
    assert_eq!(response.header("content-type"), Some("text/event-stream"));
    let mut stream = response.body.into_stream();

    // now that the listener is up, membership flips
    let membership = fetch.fetch(Request::get("bus://chat/").unwrap()).await;
    let value: serde_json::Value = membership.json().await.unwrap();
    assert_eq!(value["subscribed"], true);

    let publish = Request::post("bus://chat/")
        .unwrap()
        .with_body("hey".to_string());
    assert_eq!(fetch.fetch(publish).await.status, 200);

    let frame = String::from_utf8(stream.next().await.unwrap().unwrap().to_vec()).unwrap();
    assert!(frame.starts_with("id: 1\n"), "frame: {}", frame);
    assert!(frame.ends_with("\n\n"));
    let data = frame
        .lines()
        .find_map(|line| line.strip_prefix("data: "))
        .unwrap();
    let value: serde_json::Value = serde_json::from_str(data).unwrap();
    // default payload encoding is base64
    assert_eq!(value["data"], "aGV5");
    assert!(value["from"].as_str().unwrap().starts_with('k'));
}

#[tokio::test]
async fn test_utf8_payload_format() {
    let (fetch, _) = common::setup();

    let request = Request::get("bus://chat/?format=utf8")
        .unwrap()
        .with_header("accept", "text/event-stream");
    let response = fetch.fetch(request).await;
    let mut stream = response.body.into_stream();

    fetch
        .fetch(Request::post("bus://chat/").unwrap().with_body("hey".to_string()))
        .await;

    let frame = String::from_utf8(stream.next().await.unwrap().unwrap().to_vec()).unwrap();
    assert!(frame.contains("\"data\":\"hey\""), "frame: {}", frame);
}

#[tokio::test]
async fn test_malformed_payload_is_an_error_event() {
    let (fetch, _) = common::setup();

    let request = Request::get("bus://chat/?format=json")
        .unwrap()
        .with_header("accept", "text/event-stream");
    let response = fetch.fetch(request).await;
    let mut stream = response.body.into_stream();

    fetch
        .fetch(
            Request::post("bus://chat/")
                .unwrap()
                .with_body("not json".to_string()),
        )
        .await;

    let frame = String::from_utf8(stream.next().await.unwrap().unwrap().to_vec()).unwrap();
    assert!(frame.starts_with("event: error\n"), "frame: {}", frame);
}

#[tokio::test]
async fn test_cancellation_releases_subscription() {
    let (fetch, client) = common::setup();
    let cancel = CancellationToken::new();

    let request = Request::get("bus://chat/")
        .unwrap()
        .with_header("accept", "text/event-stream")
        .with_cancel(cancel.clone());
    let response = fetch.fetch(request).await;
    let mut stream = response.body.into_stream();

    let membership = fetch.fetch(Request::get("bus://chat/").unwrap()).await;
    let value: serde_json::Value = membership.json().await.unwrap();
    assert_eq!(value["subscribed"], true);

    cancel.cancel();
    assert!(stream.next().await.is_none());

    let membership = fetch.fetch(Request::get("bus://chat/").unwrap()).await;
    let value: serde_json::Value = membership.json().await.unwrap();
    assert_eq!(value["subscribed"], false);
    drop(client);
}

#[tokio::test]
async fn test_unknown_payload_format_is_rejected() {
    let (fetch, _) = common::setup();
    let request = Request::get("bus://chat/?format=hex")
        .unwrap()
        .with_header("accept", "text/event-stream");
    let response = fetch.fetch(request).await;
    assert_eq!(response.status, 400);
}
