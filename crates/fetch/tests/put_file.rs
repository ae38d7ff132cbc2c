//! Writing a single file against the empty-directory base and
//! reading it back, including ranges and HEAD.

mod common;

use fetch::Request;

const BASE: &str = "content://bafyaabakaieac/example.txt";

#[tokio::test]
async fn test_put_then_get() {
    let (fetch, _) = common::setup();

    let request = Request::put(BASE).unwrap().with_body("Hello World!");
    let response = fetch.fetch(request).await;
    assert_eq!(response.status, 201);

    let location = common::location(&response);
    assert!(location.starts_with("content://"));
    assert!(location.ends_with("/example.txt"));
    // content://<root>/example.txt, nothing else
    assert_eq!(location.matches('/').count(), 3);

    let response = fetch.fetch(Request::get(&location).unwrap()).await;
    assert_eq!(response.status, 200);
    assert_eq!(
        response.header("content-type"),
        Some("text/plain; charset=utf-8")
    );
    assert_eq!(response.header("content-length"), Some("12"));
    assert_eq!(response.header("accept-ranges"), Some("bytes"));
    assert_eq!(response.text().await.unwrap(), "Hello World!");
}

#[tokio::test]
async fn test_range_request() {
    let (fetch, _) = common::setup();
    let location = common::put_file(&fetch, BASE, "Hello World!").await;

    let request = Request::get(&location)
        .unwrap()
        .with_header("range", "bytes=0-4");
    let response = fetch.fetch(request).await;
    assert_eq!(response.status, 206);
    assert_eq!(response.header("content-range"), Some("bytes 0-4/12"));
    assert_eq!(response.header("content-length"), Some("5"));
    assert_eq!(response.text().await.unwrap(), "Hello");
}

#[tokio::test]
async fn test_unsatisfiable_range_falls_back_to_full() {
    let (fetch, _) = common::setup();
    let location = common::put_file(&fetch, BASE, "Hello World!").await;

    let request = Request::get(&location)
        .unwrap()
        .with_header("range", "bytes=100-200");
    let response = fetch.fetch(request).await;
    assert_eq!(response.status, 200);
    assert_eq!(response.text().await.unwrap(), "Hello World!");
}

#[tokio::test]
async fn test_head_reports_headers_without_body() {
    let (fetch, _) = common::setup();
    let location = common::put_file(&fetch, BASE, "Hello World!").await;

    let response = fetch.fetch(Request::head(&location).unwrap()).await;
    assert_eq!(response.status, 200);
    assert_eq!(
        response.header("content-type"),
        Some("text/plain; charset=utf-8")
    );
    assert_eq!(response.header("content-length"), Some("12"));
    assert_eq!(response.header("accept-ranges"), Some("bytes"));
    assert!(response.bytes().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_writes_chain_through_returned_roots() {
    let (fetch, _) = common::setup();
    let first = common::put_file(&fetch, BASE, "Hello World!").await;

    // write a sibling into the root the first write returned
    let root = first.trim_end_matches("example.txt").to_string();
    let second = common::put_file(&fetch, &format!("{}other.txt", root), "other").await;

    let listing_url = second.trim_end_matches("other.txt").to_string();
    let response = fetch.fetch(Request::get(&listing_url).unwrap()).await;
    let names: Vec<String> = response.json().await.unwrap();
    assert_eq!(names, vec!["example.txt", "other.txt"]);
}

#[tokio::test]
async fn test_filename_query_overrides_sniffing() {
    let (fetch, _) = common::setup();
    let location = common::put_file(&fetch, "content://bafyaabakaieac/blob", "{}").await;

    let request = Request::get(&format!("{}?filename=data.json", location)).unwrap();
    let response = fetch.fetch(request).await;
    assert_eq!(response.header("content-type"), Some("application/json"));
}
