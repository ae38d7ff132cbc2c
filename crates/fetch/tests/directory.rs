//! Directory semantics: form uploads, listings, `index.html`
//! resolution and sub-path removal.

mod common;

use fetch::Request;

#[tokio::test]
async fn test_form_upload_and_listings() {
    let (fetch, _) = common::setup();

    let location = common::put_form(
        &fetch,
        "content://bafyaabakaieac/",
        &[("example.txt", "Hello World!"), ("example2.txt", "Hello World!")],
    )
    .await;
    assert!(location.ends_with('/'));

    // no Accept: a JSON array of child names
    let response = fetch.fetch(Request::get(&location).unwrap()).await;
    assert_eq!(response.status, 200);
    assert_eq!(response.header("content-type"), Some("application/json"));
    let names: Vec<String> = response.json().await.unwrap();
    assert_eq!(names, vec!["example.txt", "example2.txt"]);

    // text/html: a rendered listing naming both children
    let request = Request::get(&location)
        .unwrap()
        .with_header("accept", "text/html");
    let response = fetch.fetch(request).await;
    assert_eq!(response.status, 200);
    assert_eq!(
        response.header("content-type"),
        Some("text/html; charset=utf-8")
    );
    let page = response.text().await.unwrap();
    assert!(page.contains("example.txt"));
    assert!(page.contains("example2.txt"));
}

#[tokio::test]
async fn test_duplicate_form_filenames_later_wins() {
    let (fetch, _) = common::setup();
    let location = common::put_form(
        &fetch,
        "content://bafyaabakaieac/",
        &[("example.txt", "first"), ("example.txt", "second")],
    )
    .await;

    let response = fetch
        .fetch(Request::get(&format!("{}example.txt", location)).unwrap())
        .await;
    assert_eq!(response.text().await.unwrap(), "second");
}

#[tokio::test]
async fn test_index_resolution() {
    let (fetch, client) = common::setup();
    let root = common::testkit::seed_dir(
        &client,
        &[
            ("index.html", b"Hello World!".as_slice()),
            ("example/index.html", b"Hello World!".as_slice()),
        ],
    )
    .await;
    let url = common::testkit::content_url(&root, "");

    // the index child answers for the directory
    let response = fetch.fetch(Request::get(&url).unwrap()).await;
    assert_eq!(response.status, 200);
    assert_eq!(
        response.header("content-type"),
        Some("text/html; charset=utf-8")
    );
    assert_eq!(response.text().await.unwrap(), "Hello World!");

    // noResolve suppresses it and lists instead
    let response = fetch
        .fetch(Request::get(&format!("{}?noResolve", url)).unwrap())
        .await;
    let names: Vec<String> = response.json().await.unwrap();
    assert_eq!(names, vec!["example/", "index.html"]);

    // resolution applies down the tree too
    let response = fetch
        .fetch(Request::get(&common::testkit::content_url(&root, "example")).unwrap())
        .await;
    assert_eq!(response.text().await.unwrap(), "Hello World!");
}

#[tokio::test]
async fn test_head_honors_no_resolve() {
    let (fetch, client) = common::setup();
    let root = common::testkit::seed_dir(&client, &[("index.html", b"Hello World!".as_slice())]).await;
    let url = common::testkit::content_url(&root, "");

    // HEAD mirrors GET: index headers without it, empty 200 with it
    let response = fetch.fetch(Request::head(&url).unwrap()).await;
    assert_eq!(response.status, 200);
    assert_eq!(
        response.header("content-type"),
        Some("text/html; charset=utf-8")
    );
    assert_eq!(response.header("content-length"), Some("12"));

    let response = fetch
        .fetch(Request::head(&format!("{}?noResolve", url)).unwrap())
        .await;
    assert_eq!(response.status, 200);
    assert_eq!(response.header("content-type"), None);
    assert!(response.bytes().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_sub_path() {
    let (fetch, _) = common::setup();
    let location = common::put_form(
        &fetch,
        "content://bafyaabakaieac/",
        &[("example.txt", "Hello World!"), ("example2.txt", "Hello World!")],
    )
    .await;

    let response = fetch
        .fetch(Request::delete(&format!("{}example.txt", location)).unwrap())
        .await;
    assert_eq!(response.status, 200);
    let new_root = common::location(&response);

    let response = fetch.fetch(Request::get(&new_root).unwrap()).await;
    let names: Vec<String> = response.json().await.unwrap();
    assert_eq!(names, vec!["example2.txt"]);

    // removing something that is not there is a 404
    let response = fetch
        .fetch(Request::delete(&format!("{}example.txt", new_root)).unwrap())
        .await;
    assert_eq!(response.status, 404);
}

#[tokio::test]
async fn test_nested_write_creates_parents() {
    let (fetch, _) = common::setup();
    let location = common::put_file(
        &fetch,
        "content://bafyaabakaieac/docs/guides/intro.txt",
        "nested",
    )
    .await;
    assert!(location.ends_with("/docs/guides/intro.txt"));

    let root = location.trim_end_matches("docs/guides/intro.txt").to_string();
    let response = fetch.fetch(Request::get(&root).unwrap()).await;
    let names: Vec<String> = response.json().await.unwrap();
    assert_eq!(names, vec!["docs/"]);
}
