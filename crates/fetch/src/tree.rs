use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use common::linked_data::{cid_base32, Cid};

use crate::can_url::{encode_segment, join_encoded};
use crate::error::FetchError;
use crate::state::{bounded, Fetch};

/// One copy-on-write mutation against a content tree.
#[derive(Debug)]
pub(crate) enum TreeOp {
    /// Write a single payload at the path, creating parents.
    WriteOne { path: Vec<String>, data: Bytes },
    /// Write each uploaded file under the path; a later duplicate
    /// filename overwrites an earlier one.
    WriteForm {
        path: Vec<String>,
        files: Vec<(String, Bytes)>,
    },
    /// Recursively remove the path.
    Delete { path: Vec<String> },
}

#[derive(Debug)]
pub(crate) struct TreeUpdate {
    pub root: Cid,
    pub location: String,
}

/// Materialize `old_root` into a scratch workspace, apply the
/// operation, and stat the workspace for the new root. The workspace
/// name carries a random suffix so concurrent writes cannot collide;
/// it is released once the new root is known.
pub(crate) async fn apply(
    fetch: &Fetch,
    cancel: &CancellationToken,
    old_root: Option<&Cid>,
    op: TreeOp,
) -> Result<TreeUpdate, FetchError> {
    let client = fetch.client();
    let timeout = fetch.config().timeout;
    let scratch = format!("/adapter-tmp/{}", Uuid::new_v4().simple());

    if let Some(root) = old_root {
        let from = format!("/content/{}", cid_base32(root));
        bounded(timeout, cancel, "copy", client.tree_copy(&from, &scratch)).await?;
    }

    let location_path = match &op {
        TreeOp::WriteOne { path, .. } => {
            if path.is_empty() {
                return Err(FetchError::InvalidInput(
                    "write requires a file path".to_string(),
                ));
            }
            join_encoded(path)
        }
        TreeOp::WriteForm { path, .. } => {
            // the original (usually directory) path keeps its shape
            let mut encoded = join_encoded(path);
            if !encoded.is_empty() {
                encoded.push('/');
            }
            encoded
        }
        TreeOp::Delete { path } => {
            if path.is_empty() {
                return Err(FetchError::InvalidInput(
                    "cannot remove the root".to_string(),
                ));
            }
            String::new()
        }
    };

    match op {
        TreeOp::WriteOne { path, data } => {
            let target = format!("{}/{}", scratch, join_encoded(&path));
            bounded(timeout, cancel, "write", client.tree_write(&target, data)).await?;
        }
        TreeOp::WriteForm { path, files } => {
            let base = join_encoded(&path);
            for (filename, data) in files {
                let target = if base.is_empty() {
                    format!("{}/{}", scratch, encode_segment(&filename))
                } else {
                    format!("{}/{}/{}", scratch, base, encode_segment(&filename))
                };
                bounded(timeout, cancel, "write", client.tree_write(&target, data)).await?;
            }
        }
        TreeOp::Delete { path } => {
            let target = format!("{}/{}", scratch, join_encoded(&path));
            bounded(timeout, cancel, "remove", client.tree_remove(&target)).await?;
        }
    }

    let entry = bounded(timeout, cancel, "stat", client.tree_stat(&scratch)).await?;
    // release the workspace; the blocks it produced are content
    // addressed and outlive it
    if let Err(err) = client.tree_remove(&scratch).await {
        tracing::warn!(%scratch, error = %err, "failed to release workspace");
    }

    let location = format!("content://{}/{}", cid_base32(&entry.cid), location_path);
    tracing::debug!(root = %entry.cid, %location, "tree updated");
    Ok(TreeUpdate {
        root: entry.cid,
        location,
    })
}
