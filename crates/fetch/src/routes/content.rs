use http::header::{
    ACCEPT, ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, LOCATION,
};
use http::StatusCode;

use common::linked_data::{cid_base32, Cid};
use common::prelude::{DirEntry, Entry, EntryKind};

use crate::body::Body;
use crate::can_url::{can_path, CanUrl};
use crate::error::FetchError;
use crate::html;
use crate::negotiate::{negotiate, ResponseFormat};
use crate::range;
use crate::request::{Request, Response};
use crate::routes::{form_boundary, read_form_files};
use crate::state::{bounded, created, read_body, Fetch};
use crate::tree::{self, TreeOp};

const INDEX_FILE: &str = "index.html";

fn parse_root(url: &CanUrl) -> Result<Cid, FetchError> {
    Cid::try_from(url.root.as_str()).map_err(|e| {
        FetchError::InvalidInput(format!("invalid root cid {}: {}", url.root, e))
    })
}

pub(crate) async fn get(
    fetch: &Fetch,
    request: &Request,
    url: &CanUrl,
    head: bool,
) -> Result<Response, FetchError> {
    if url.is_local() {
        return Err(FetchError::InvalidInput(
            "local is not a content root".to_string(),
        ));
    }
    let root = parse_root(url)?;
    serve(fetch, request, &root, &url.segments, url, head).await
}

/// Serve a resolved content root. Shared with the name route, which
/// substitutes the root it resolved a mutable name to.
pub(crate) async fn serve(
    fetch: &Fetch,
    request: &Request,
    root: &Cid,
    segments: &[String],
    url: &CanUrl,
    head: bool,
) -> Result<Response, FetchError> {
    let format = negotiate(url.format.as_deref(), request.header(ACCEPT.as_str()))?;
    let client = fetch.client();
    let timeout = fetch.config().timeout;
    let path = can_path(&cid_base32(root), segments);

    match format {
        ResponseFormat::Raw => {
            let entry = bounded(timeout, &request.cancel, "stat", client.stat(&path)).await?;
            let block = bounded(
                timeout,
                &request.cancel,
                "block get",
                client.block_get(&entry.cid),
            )
            .await?;
            let response = Response::new(StatusCode::OK)
                .with_header(CONTENT_TYPE, "application/vnd.ipld.raw")
                .with_header(CONTENT_LENGTH, &block.len().to_string());
            Ok(if head { response } else { response.with_body(block) })
        }
        ResponseFormat::Car => {
            let entry = bounded(timeout, &request.cancel, "stat", client.stat(&path)).await?;
            let stream = bounded(
                timeout,
                &request.cancel,
                "export",
                client.export_car(&entry.cid),
            )
            .await?;
            let response =
                Response::new(StatusCode::OK).with_header(CONTENT_TYPE, "application/vnd.ipld.car");
            Ok(if head {
                response
            } else {
                response.with_body(Body::stream(stream))
            })
        }
        _ => {
            let entry = bounded(timeout, &request.cancel, "stat", client.stat(&path)).await?;
            match entry.kind {
                EntryKind::File | EntryKind::Raw => {
                    serve_file(fetch, request, &path, segments, url, &entry, head).await
                }
                EntryKind::Directory => {
                    serve_dir(fetch, request, root, segments, url, format, head).await
                }
            }
        }
    }
}

async fn serve_file(
    fetch: &Fetch,
    request: &Request,
    path: &str,
    segments: &[String],
    url: &CanUrl,
    entry: &Entry,
    head: bool,
) -> Result<Response, FetchError> {
    let client = fetch.client();
    let timeout = fetch.config().timeout;
    let name = url.filename.clone().or_else(|| segments.last().cloned());
    let content_type = content_type_for(name.as_deref(), entry.mime.as_deref());

    if head {
        return Ok(Response::new(StatusCode::OK)
            .with_header(CONTENT_TYPE, &content_type)
            .with_header(CONTENT_LENGTH, &entry.size.to_string())
            .with_header(ACCEPT_RANGES, "bytes"));
    }

    if let Some(range) = range::parse(request.header("range"), entry.size) {
        let stream = bounded(
            timeout,
            &request.cancel,
            "read",
            client.cat(path, Some(range.start), Some(range.length())),
        )
        .await?;
        return Ok(Response::new(StatusCode::PARTIAL_CONTENT)
            .with_header(CONTENT_TYPE, &content_type)
            .with_header(ACCEPT_RANGES, "bytes")
            .with_header(CONTENT_RANGE, &range.content_range(entry.size))
            .with_header(CONTENT_LENGTH, &range.length().to_string())
            .with_body(Body::stream(stream)));
    }

    let stream = bounded(timeout, &request.cancel, "read", client.cat(path, None, None)).await?;
    Ok(Response::new(StatusCode::OK)
        .with_header(CONTENT_TYPE, &content_type)
        .with_header(CONTENT_LENGTH, &entry.size.to_string())
        .with_header(ACCEPT_RANGES, "bytes")
        .with_body(Body::stream(stream)))
}

async fn serve_dir(
    fetch: &Fetch,
    request: &Request,
    root: &Cid,
    segments: &[String],
    url: &CanUrl,
    format: ResponseFormat,
    head: bool,
) -> Result<Response, FetchError> {
    let client = fetch.client();
    let timeout = fetch.config().timeout;
    let path = can_path(&cid_base32(root), segments);
    let listing = bounded(timeout, &request.cancel, "list", client.ls(&path)).await;

    // index.html resolution, honored by GET and HEAD alike
    if !url.no_resolve {
        if let Ok(entries) = &listing {
            if entries.iter().any(|e| e.name == INDEX_FILE) {
                let mut index_segments = segments.to_vec();
                index_segments.push(INDEX_FILE.to_string());
                let index_path = can_path(&cid_base32(root), &index_segments);
                let entry =
                    bounded(timeout, &request.cancel, "stat", client.stat(&index_path)).await?;
                return serve_file(fetch, request, &index_path, &index_segments, url, &entry, head)
                    .await;
            }
        }
    }

    if head {
        return Ok(Response::new(StatusCode::OK));
    }

    match format {
        ResponseFormat::Html => match listing {
            Ok(entries) => {
                let names = listing_names(&entries);
                let page = match &fetch.config().render_index {
                    Some(renderer) => renderer(request.url.as_str(), &names),
                    None => html::render_listing(request.url.as_str(), &names),
                };
                Ok(Response::new(StatusCode::OK)
                    .with_header(CONTENT_TYPE, "text/html; charset=utf-8")
                    .with_body(page))
            }
            Err(err) => {
                // a path the caller mis-classified: fall back to file bytes
                tracing::debug!(error = %err, "listing failed, serving file bytes");
                let stream =
                    bounded(timeout, &request.cancel, "read", client.cat(&path, None, None))
                        .await?;
                Ok(Response::new(StatusCode::OK)
                    .with_header(CONTENT_TYPE, "application/octet-stream")
                    .with_body(Body::stream(stream)))
            }
        },
        _ => {
            let names = listing_names(&listing?);
            let body =
                serde_json::to_string(&names).map_err(|e| FetchError::Internal(e.into()))?;
            Ok(Response::new(StatusCode::OK)
                .with_header(CONTENT_TYPE, "application/json")
                .with_body(body))
        }
    }
}

fn listing_names(entries: &[DirEntry]) -> Vec<String> {
    entries
        .iter()
        .map(|entry| match entry.kind {
            EntryKind::Directory => format!("{}/", entry.name),
            _ => entry.name.clone(),
        })
        .collect()
}

fn content_type_for(name: Option<&str>, stored: Option<&str>) -> String {
    let mime = name
        .and_then(|n| mime_guess::from_path(n).first())
        .map(|m| m.to_string())
        .or_else(|| stored.map(str::to_string))
        .unwrap_or_else(|| "application/octet-stream".to_string());
    if mime.starts_with("text/") && !mime.contains("charset") {
        format!("{}; charset=utf-8", mime)
    } else {
        mime
    }
}

/// Upload to a fresh root on the reserved host: a CAR archive, a
/// multipart form, or a single payload at the URL path.
pub(crate) async fn post(
    fetch: &Fetch,
    mut request: Request,
    url: &CanUrl,
) -> Result<Response, FetchError> {
    if !url.is_local() {
        return Err(FetchError::MethodNotSupported {
            allow: Some("GET, HEAD, PUT, DELETE"),
        });
    }
    let client = fetch.client();
    let timeout = fetch.config().timeout;
    let body = std::mem::take(&mut request.body);

    let content_type = request.header(CONTENT_TYPE.as_str()).unwrap_or("");
    if content_type.starts_with("application/vnd.ipld.car") {
        let data = read_body(&request.cancel, body).await?;
        let roots = bounded(timeout, &request.cancel, "import", client.import_car(data)).await?;
        let root = roots.first().ok_or_else(|| {
            FetchError::InvalidInput("archive has no roots".to_string())
        })?;
        let location = format!("content://{}/", cid_base32(root));
        return Ok(created(&location));
    }

    let op = match form_boundary(&request) {
        Some(boundary) => TreeOp::WriteForm {
            path: url.segments.clone(),
            files: read_form_files(boundary, body, &request.cancel).await?,
        },
        None => {
            if url.segments.is_empty() {
                return Err(FetchError::InvalidInput(
                    "upload requires a file path".to_string(),
                ));
            }
            TreeOp::WriteOne {
                path: url.segments.clone(),
                data: read_body(&request.cancel, body).await?,
            }
        }
    };
    let update = tree::apply(fetch, &request.cancel, None, op).await?;
    Ok(created(&update.location))
}

/// Copy-on-write write against an existing root.
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
    let root = parse_root(url)?;
    let body = std::mem::take(&mut request.body);

    let op = match form_boundary(&request) {
        Some(boundary) => TreeOp::WriteForm {
            path: url.segments.clone(),
            files: read_form_files(boundary, body, &request.cancel).await?,
        },
        None => TreeOp::WriteOne {
            path: url.segments.clone(),
            data: read_body(&request.cancel, body).await?,
        },
    };
    let update = tree::apply(fetch, &request.cancel, Some(&root), op).await?;
    Ok(created(&update.location))
}

/// Remove a sub path, yielding a new root.
pub(crate) async fn delete(
    fetch: &Fetch,
    request: &Request,
    url: &CanUrl,
) -> Result<Response, FetchError> {
    if url.is_local() {
        return Err(FetchError::InvalidInput(
            "local is not a content root".to_string(),
        ));
    }
    let root = parse_root(url)?;
    let update = tree::apply(
        fetch,
        &request.cancel,
        Some(&root),
        TreeOp::Delete {
            path: url.segments.clone(),
        },
    )
    .await?;
    Ok(Response::new(StatusCode::OK)
        .with_header(LOCATION, &update.location)
        .with_header(CONTENT_TYPE, "text/plain; charset=utf-8")
        .with_body(update.location.clone()))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_content_type_sniffing() {
        assert_eq!(
            content_type_for(Some("example.txt"), None),
            "text/plain; charset=utf-8"
        );
        assert_eq!(content_type_for(Some("photo.png"), None), "image/png");
        assert_eq!(
            content_type_for(Some("README"), Some("text/markdown")),
            "text/markdown; charset=utf-8"
        );
        assert_eq!(content_type_for(None, None), "application/octet-stream");
    }

    #[test]
    fn test_listing_names_suffix_dirs() {
        let entries = vec![
            DirEntry {
                name: "example.txt".to_string(),
                kind: EntryKind::File,
                size: 12,
            },
            DirEntry {
                name: "sub".to_string(),
                kind: EntryKind::Directory,
                size: 0,
            },
        ];
        assert_eq!(listing_names(&entries), vec!["example.txt", "sub/"]);
    }
}
