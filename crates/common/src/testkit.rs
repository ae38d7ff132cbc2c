//! Lightweight helpers for seeding a [`MemoryClient`] in tests
//! without going through a write request first.
//!
//! # Example
//!
//! ```rust,ignore
//! use common::prelude::MemoryClient;
//! use common::testkit;
//!
//! #[tokio::test]
//! async fn test_read_seeded_tree() {
//!     let client = MemoryClient::new();
//!     let root = testkit::seed_dir(&client, &[("index.html", b"<h1>hi</h1>")]).await;
//!     // issue requests against content://<root>/ …
//! }
//! ```

use bytes::Bytes;
use uuid::Uuid;

use crate::client::CanClient;
use crate::linked_data::{cid_base32, Cid};
use crate::memory::MemoryClient;

/// Seed a directory tree and return its root CID. Paths are relative,
/// `/`-separated, and may create intermediate directories.
pub async fn seed_dir(client: &MemoryClient, files: &[(&str, &[u8])]) -> Cid {
    let workspace = format!("/adapter-tmp/{}", Uuid::new_v4().simple());
    for (path, data) in files {
        client
            .tree_write(
                &format!("{}/{}", workspace, path.trim_start_matches('/')),
                Bytes::copy_from_slice(data),
            )
            .await
            .expect("seed write");
    }
    let entry = client.tree_stat(&workspace).await.expect("seed stat");
    client.tree_remove(&workspace).await.expect("seed release");
    entry.cid
}

/// Seed a single file and return the root CID of the directory
/// holding it.
pub async fn seed_file(client: &MemoryClient, name: &str, data: &[u8]) -> Cid {
    seed_dir(client, &[(name, data)]).await
}

/// The `content://` URL for a root, with an optional sub path.
pub fn content_url(root: &Cid, path: &str) -> String {
    format!("content://{}/{}", cid_base32(root), path.trim_start_matches('/'))
}
