//! Content negotiation, archives, uploads on the reserved host and
//! router fallbacks.

mod common;

use fetch::{Config, Fetch, Request};

#[tokio::test]
async fn test_raw_block_negotiation() {
    let (fetch, _) = common::setup();
    let location = common::put_file(
        &fetch,
        "content://bafyaabakaieac/example.txt",
        "Hello World!",
    )
    .await;

    let response = fetch
        .fetch(Request::get(&format!("{}?format=raw", location)).unwrap())
        .await;
    assert_eq!(response.status, 200);
    assert_eq!(
        response.header("content-type"),
        Some("application/vnd.ipld.raw")
    );
    // files are raw-leaf blocks, so the block is the content
    assert_eq!(response.bytes().await.unwrap().as_ref(), b"Hello World!");
}

#[tokio::test]
async fn test_car_export_import_round_trip() {
    let (fetch, _) = common::setup();
    let location = common::put_form(
        &fetch,
        "content://bafyaabakaieac/",
        &[("example.txt", "Hello World!"), ("sub/nested.txt", "nested")],
    )
    .await;

    let response = fetch
        .fetch(
            Request::get(&location)
                .unwrap()
                .with_header("accept", "application/vnd.ipld.car"),
        )
        .await;
    assert_eq!(response.status, 200);
    assert_eq!(
        response.header("content-type"),
        Some("application/vnd.ipld.car")
    );
    let archive = response.bytes().await.unwrap();

    // import into a fresh adapter and read the same bytes back
    let (other, _) = common::setup();
    let response = other
        .fetch(
            Request::post("content://local/")
                .unwrap()
                .with_header("content-type", "application/vnd.ipld.car")
                .with_body(archive.to_vec()),
        )
        .await;
    assert_eq!(response.status, 201);
    let imported = common::location(&response);
    assert_eq!(imported, location);

    let response = other
        .fetch(Request::get(&format!("{}example.txt", imported)).unwrap())
        .await;
    assert_eq!(response.text().await.unwrap(), "Hello World!");
}

#[tokio::test]
async fn test_post_local_uploads() {
    let (fetch, _) = common::setup();

    // multipart form to a fresh root
    let (content_type, body) = common::multipart_body(&[("a.txt", "a")]);
    let response = fetch
        .fetch(
            Request::post("content://local/")
                .unwrap()
                .with_header("content-type", &content_type)
                .with_body(body),
        )
        .await;
    assert_eq!(response.status, 201);

    // single payload at the URL path
    let response = fetch
        .fetch(
            Request::post("content://local/notes.txt")
                .unwrap()
                .with_body("note".to_string()),
        )
        .await;
    assert_eq!(response.status, 201);
    let location = common::location(&response);
    let read = fetch.fetch(Request::get(&location).unwrap()).await;
    assert_eq!(read.text().await.unwrap(), "note");

    // a bare payload with no path has nowhere to go
    let response = fetch
        .fetch(
            Request::post("content://local/")
                .unwrap()
                .with_body("note".to_string()),
        )
        .await;
    assert_eq!(response.status, 400);
}

#[tokio::test]
async fn test_put_is_unsupported_on_reserved_host() {
    let (fetch, _) = common::setup();
    let response = fetch
        .fetch(
            Request::put("content://local/example.txt")
                .unwrap()
                .with_body("x".to_string()),
        )
        .await;
    assert_eq!(response.status, 405);
    assert_eq!(response.text().await.unwrap(), "Method Not Supported");
}

#[tokio::test]
async fn test_read_only_adapter_gates_writes() {
    let client = std::sync::Arc::new(::common::prelude::MemoryClient::new());
    let fetch = Fetch::with_config(client, Config::default().read_only());

    let response = fetch
        .fetch(
            Request::put("content://bafyaabakaieac/example.txt")
                .unwrap()
                .with_body("x".to_string()),
        )
        .await;
    assert_eq!(response.status, 405);

    // reads still work
    let response = fetch
        .fetch(Request::get("content://bafyaabakaieac/").unwrap())
        .await;
    assert_eq!(response.status, 200);
}

#[tokio::test]
async fn test_not_found_and_bad_inputs() {
    let (fetch, _) = common::setup();

    let response = fetch
        .fetch(Request::get("content://bafyaabakaieac/missing.txt").unwrap())
        .await;
    assert_eq!(response.status, 404);

    let response = fetch
        .fetch(Request::get("content://not-a-cid/").unwrap())
        .await;
    assert_eq!(response.status, 400);

    let response = fetch
        .fetch(Request::get("content://bafyaabakaieac/?format=tarball").unwrap())
        .await;
    assert_eq!(response.status, 400);

    // PATCH has no content route
    let response = fetch
        .fetch(Request::patch("content://bafyaabakaieac/").unwrap())
        .await;
    assert_eq!(response.status, 405);
    assert_eq!(response.header("allow"), Some("GET, HEAD, POST, PUT, DELETE"));
}

#[tokio::test]
async fn test_unknown_scheme_hits_not_found_handler() {
    let (fetch, _) = common::setup();
    let response = fetch
        .fetch(Request::get("https://example.com/").unwrap())
        .await;
    assert_eq!(response.status, 405);

    // and the handler is replaceable
    let client = std::sync::Arc::new(::common::prelude::MemoryClient::new());
    let fetch = Fetch::with_config(
        client,
        Config::default().with_on_not_found(|_| {
            fetch::Response {
                status: http::StatusCode::NOT_FOUND,
                headers: Default::default(),
                body: fetch::Body::from("no such route"),
            }
        }),
    );
    let response = fetch
        .fetch(Request::get("https://example.com/").unwrap())
        .await;
    assert_eq!(response.status, 404);
    assert_eq!(response.text().await.unwrap(), "no such route");
}

#[tokio::test]
async fn test_default_headers_are_applied() {
    let client = std::sync::Arc::new(::common::prelude::MemoryClient::new());
    let fetch = Fetch::with_config(
        client,
        Config::default().with_default_header("x-can-adapter", "1"),
    );
    let response = fetch
        .fetch(Request::get("content://bafyaabakaieac/").unwrap())
        .await;
    assert_eq!(response.header("x-can-adapter"), Some("1"));
}
