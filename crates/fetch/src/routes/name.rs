use http::header::{CONTENT_TYPE, LOCATION};
use http::StatusCode;
use percent_encoding::percent_decode_str;
use tokio_util::sync::CancellationToken;

use common::linked_data::{cid_base32, cid_base36, Cid, EMPTY_DIR_CID};
use common::prelude::KeyInfo;

use crate::can_url::{CanUrl, Scheme};
use crate::error::FetchError;
use crate::request::{Request, Response};
use crate::routes::{content, form_boundary, read_form_files};
use crate::state::{bounded, created, read_body, Fetch};
use crate::tree::{self, TreeOp};

/// Look an alias up in the local key set. Matches either the alias
/// itself or any CID spelling of the key's public id.
async fn find_key(
    fetch: &Fetch,
    cancel: &CancellationToken,
    alias: &str,
) -> Result<Option<KeyInfo>, FetchError> {
    let keys = bounded(
        fetch.config().name_timeout,
        cancel,
        "key list",
        fetch.client().key_list(),
    )
    .await?;
    let cid_form = Cid::try_from(alias).ok().map(|cid| cid_base36(&cid));
    Ok(keys
        .into_iter()
        .find(|key| key.name == alias || Some(key.id.as_str()) == cid_form.as_deref()))
}

enum PathTag {
    Content,
    Name,
}

fn split_can_path(path: &str) -> Result<(PathTag, String, Vec<String>), FetchError> {
    let mut parts = path.trim_start_matches('/').split('/');
    let tag = match parts.next() {
        Some("content") => PathTag::Content,
        Some("name") => PathTag::Name,
        _ => {
            return Err(FetchError::Internal(anyhow::anyhow!(
                "unresolvable record path {}",
                path
            )))
        }
    };
    let root = parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| FetchError::Internal(anyhow::anyhow!("record path has no root: {}", path)))?
        .to_string();
    let mut segments = Vec::new();
    for part in parts.filter(|s| !s.is_empty()) {
        let decoded = percent_decode_str(part)
            .decode_utf8()
            .map_err(|e| FetchError::Internal(anyhow::anyhow!("bad record path: {}", e)))?;
        segments.push(decoded.into_owned());
    }
    Ok((tag, root, segments))
}

/// Resolve a name host down to a content root. Dotted hosts go
/// straight to the naming capability; anything else is tried as a
/// local alias first. Records may point at other names, so chase
/// them to a bounded depth.
async fn resolve_root(
    fetch: &Fetch,
    cancel: &CancellationToken,
    host: &str,
) -> Result<(Cid, Vec<String>), FetchError> {
    let client = fetch.client();
    let name_timeout = fetch.config().name_timeout;
    let mut name = if host.contains('.') {
        host.to_string()
    } else {
        match find_key(fetch, cancel, host).await? {
            Some(info) => info.id,
            None => host.to_string(),
        }
    };
    let mut carried: Vec<String> = Vec::new();
    for _ in 0..8 {
        let resolved = bounded(
            name_timeout,
            cancel,
            "name resolve",
            client.name_resolve(&name),
        )
        .await?;
        let (tag, root, mut segments) = split_can_path(&resolved)?;
        segments.append(&mut carried);
        match tag {
            PathTag::Content => {
                let cid = Cid::try_from(root.as_str()).map_err(|e| {
                    FetchError::Internal(anyhow::anyhow!("record root is not a cid: {}", e))
                })?;
                return Ok((cid, segments));
            }
            PathTag::Name => {
                name = root;
                carried = segments;
            }
        }
    }
    Err(FetchError::Internal(anyhow::anyhow!(
        "name resolution depth exceeded for {}",
        host
    )))
}

async fn publish_new_root(
    fetch: &Fetch,
    cancel: &CancellationToken,
    info: &KeyInfo,
    root: &Cid,
) -> Result<(), FetchError> {
    let path = format!("/content/{}/", cid_base32(root));
    bounded(
        fetch.config().name_timeout,
        cancel,
        "publish",
        fetch.client().name_publish(&info.name, &path),
    )
    .await
    .map_err(|err| match err {
        FetchError::Timeout(_) | FetchError::Aborted => err,
        // the new root exists but nothing references it
        other => FetchError::Internal(anyhow::anyhow!("publish failed after write: {}", other)),
    })
}

pub(crate) async fn get(
    fetch: &Fetch,
    request: &Request,
    url: &CanUrl,
    head: bool,
) -> Result<Response, FetchError> {
    if url.is_local() {
        return local_get(fetch, request, url, head).await;
    }
    let (root, mut segments) = resolve_root(fetch, &request.cancel, &url.root).await?;
    segments.extend(url.segments.iter().cloned());
    content::serve(fetch, request, &root, &segments, url, head).await
}

async fn local_get(
    fetch: &Fetch,
    request: &Request,
    url: &CanUrl,
    head: bool,
) -> Result<Response, FetchError> {
    match &url.key {
        Some(alias) => match find_key(fetch, &request.cancel, alias).await? {
            Some(info) => Ok(Response::new(StatusCode::FOUND)
                .with_header(LOCATION, &format!("name://{}/", info.id))),
            None => Err(FetchError::NotFound(format!("no key named {}", alias))),
        },
        None => {
            let keys = bounded(
                fetch.config().name_timeout,
                &request.cancel,
                "key list",
                fetch.client().key_list(),
            )
            .await?;
            let body = serde_json::to_string(&keys).map_err(|e| FetchError::Internal(e.into()))?;
            let response =
                Response::new(StatusCode::OK).with_header(CONTENT_TYPE, "application/json");
            Ok(if head { response } else { response.with_body(body) })
        }
    }
}

/// Normalize a publish body into a CAN path.
fn publish_target(text: &str) -> Result<String, FetchError> {
    let url = url::Url::parse(text)
        .map_err(|e| FetchError::InvalidInput(format!("publish body must be a URL: {}", e)))?;
    let Some(can) = CanUrl::parse(&url)? else {
        return Err(FetchError::InvalidInput(format!(
            "unsupported publish target scheme {}",
            url.scheme()
        )));
    };
    match can.scheme {
        Scheme::Content => {
            let encoded = can.encoded_path();
            if encoded.is_empty() {
                Ok(format!("/content/{}/", can.root))
            } else {
                Ok(format!("/content/{}/{}", can.root, encoded))
            }
        }
        Scheme::Name => Ok(format!("/name/{}/", can.root)),
        _ => Err(FetchError::InvalidInput(
            "unsupported publish target scheme".to_string(),
        )),
    }
}

pub(crate) async fn post(
    fetch: &Fetch,
    mut request: Request,
    url: &CanUrl,
) -> Result<Response, FetchError> {
    let client = fetch.client();
    let name_timeout = fetch.config().name_timeout;

    if url.is_local() {
        // key creation, idempotent
        let alias = url
            .key
            .clone()
            .ok_or_else(|| FetchError::InvalidInput("key parameter is required".to_string()))?;
        let info = match find_key(fetch, &request.cancel, &alias).await? {
            Some(info) => info,
            None => {
                let info =
                    bounded(name_timeout, &request.cancel, "key gen", client.key_gen(&alias))
                        .await?;
                // a fresh key gets a navigable empty-directory root
                let initial = format!("/content/{}/", *EMPTY_DIR_CID);
                bounded(
                    name_timeout,
                    &request.cancel,
                    "publish",
                    client.name_publish(&info.name, &initial),
                )
                .await?;
                info
            }
        };
        return Ok(created(&format!("name://{}/", info.id)));
    }

    // publish-by-URL under an owned key
    let info = find_key(fetch, &request.cancel, &url.root)
        .await?
        .ok_or_else(|| FetchError::NotFound(format!("no key for {}", url.root)))?;
    let body = read_body(&request.cancel, std::mem::take(&mut request.body)).await?;
    let text = String::from_utf8(body.to_vec())
        .map_err(|_| FetchError::InvalidInput("publish body must be a URL".to_string()))?;
    let target = publish_target(text.trim())?;
    bounded(
        name_timeout,
        &request.cancel,
        "publish",
        client.name_publish(&info.name, &target),
    )
    .await?;
    Ok(created(&format!("name://{}/", info.id)))
}

/// Write into the tree behind a name, then publish the new root.
/// The Location carries the name URL, not the content URL.
pub(crate) async fn put(
    fetch: &Fetch,
    mut request: Request,
    url: &CanUrl,
) -> Result<Response, FetchError> {
    if url.is_local() {
        return Err(FetchError::MethodNotSupported {
            allow: Some("GET, HEAD, POST, DELETE"),
        });
    }
    let info = find_key(fetch, &request.cancel, &url.root)
        .await?
        .ok_or_else(|| FetchError::NotFound(format!("no key for {}", url.root)))?;

    // an unpublished key starts from the empty directory
    let (root, mut path) = match resolve_root(fetch, &request.cancel, &info.id).await {
        Ok(resolved) => resolved,
        Err(FetchError::NotFound(_)) => (*EMPTY_DIR_CID, Vec::new()),
        Err(err) => return Err(err),
    };
    path.extend(url.segments.iter().cloned());

    let body = std::mem::take(&mut request.body);
    let op = match form_boundary(&request) {
        Some(boundary) => TreeOp::WriteForm {
            path,
            files: read_form_files(boundary, body, &request.cancel).await?,
        },
        None => TreeOp::WriteOne {
            path,
            data: read_body(&request.cancel, body).await?,
        },
    };
    let update = tree::apply(fetch, &request.cancel, Some(&root), op).await?;
    publish_new_root(fetch, &request.cancel, &info, &update.root).await?;

    let location = format!("name://{}/{}", info.id, url.encoded_path());
    Ok(created(&location))
}

pub(crate) async fn delete(
    fetch: &Fetch,
    request: &Request,
    url: &CanUrl,
) -> Result<Response, FetchError> {
    let client = fetch.client();
    let name_timeout = fetch.config().name_timeout;

    if url.is_local() {
        let alias = url
            .key
            .clone()
            .ok_or_else(|| FetchError::InvalidInput("key parameter is required".to_string()))?;
        let info = bounded(
            name_timeout,
            &request.cancel,
            "key remove",
            client.key_remove(&alias),
        )
        .await?;
        let body = serde_json::to_string(&info).map_err(|e| FetchError::Internal(e.into()))?;
        return Ok(Response::new(StatusCode::OK)
            .with_header(CONTENT_TYPE, "application/json")
            .with_body(body));
    }

    let info = find_key(fetch, &request.cancel, &url.root)
        .await?
        .ok_or_else(|| FetchError::NotFound(format!("no key for {}", url.root)))?;
    let (root, mut path) = resolve_root(fetch, &request.cancel, &info.id).await?;
    path.extend(url.segments.iter().cloned());

    let update = tree::apply(
        fetch,
        &request.cancel,
        Some(&root),
        TreeOp::Delete { path },
    )
    .await?;
    publish_new_root(fetch, &request.cancel, &info, &update.root).await?;

    let location = format!("name://{}/", info.id);
    Ok(Response::new(StatusCode::OK)
        .with_header(LOCATION, &location)
        .with_header(CONTENT_TYPE, "text/plain; charset=utf-8")
        .with_body(location.clone()))
}
