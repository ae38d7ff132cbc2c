//! Shared harness for adapter integration tests: an adapter over a
//! fresh in-memory client, plus request helpers.
#![allow(dead_code)]

use std::sync::Arc;

use ::common::prelude::MemoryClient;
use fetch::{Fetch, Request, Response};

// the harness shadows the `common` crate's name inside test files,
// so surface what they need from here
pub use ::common::testkit;

pub const BOUNDARY: &str = "------------------------can-fetch-test";

pub fn setup() -> (Fetch, Arc<MemoryClient>) {
    let client = Arc::new(MemoryClient::new());
    let fetch = Fetch::new(client.clone());
    (fetch, client)
}

/// PUT a single text file and return the Location of the new root.
pub async fn put_file(fetch: &Fetch, url: &str, data: &str) -> String {
    let request = Request::put(url).unwrap().with_body(data.to_string());
    let response = fetch.fetch(request).await;
    assert_eq!(response.status, 201, "put {} failed", url);
    location(&response)
}

pub fn location(response: &Response) -> String {
    response
        .header("location")
        .expect("response carries a Location header")
        .to_string()
}

/// A multipart/form-data body with one `file` part per entry.
pub fn multipart_body(files: &[(&str, &str)]) -> (String, Vec<u8>) {
    let mut body = Vec::new();
    for (filename, data) in files {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
                filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(data.as_bytes());
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    (
        format!("multipart/form-data; boundary={}", BOUNDARY),
        body,
    )
}

/// PUT a multipart form and return the Location of the new root.
pub async fn put_form(fetch: &Fetch, url: &str, files: &[(&str, &str)]) -> String {
    let (content_type, body) = multipart_body(files);
    let request = Request::put(url)
        .unwrap()
        .with_header("content-type", &content_type)
        .with_body(body);
    let response = fetch.fetch(request).await;
    assert_eq!(response.status, 201, "form put {} failed", url);
    location(&response)
}
