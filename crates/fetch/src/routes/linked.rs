use http::header::{ACCEPT, CONTENT_TYPE};
use http::StatusCode;

use common::linked_data::{
    self, cid_base32, Cid, Ipld, DAG_CBOR_CODEC, DAG_JSON_CODEC,
};

use crate::body::Body;
use crate::can_url::CanUrl;
use crate::error::FetchError;
use crate::negotiate::{negotiate, ResponseFormat};
use crate::request::{Request, Response};
use crate::state::{bounded, created, read_body, Fetch};

fn parse_root(url: &CanUrl) -> Result<Cid, FetchError> {
    if url.is_local() {
        return Err(FetchError::InvalidInput(
            "local is not a linked root".to_string(),
        ));
    }
    Cid::try_from(url.root.as_str()).map_err(|e| {
        FetchError::InvalidInput(format!("invalid root cid {}: {}", url.root, e))
    })
}

/// Graph path segments may carry `;`-separated parameters; only the
/// leading part names the step.
fn graph_segments(url: &CanUrl) -> Vec<String> {
    url.segments
        .iter()
        .filter_map(|segment| {
            let base = segment.split(';').next().unwrap_or("");
            if base.is_empty() {
                None
            } else {
                Some(base.to_string())
            }
        })
        .collect()
}

pub(crate) async fn get(
    fetch: &Fetch,
    request: &Request,
    url: &CanUrl,
) -> Result<Response, FetchError> {
    let root = parse_root(url)?;
    let segments = graph_segments(url);
    let client = fetch.client();
    let timeout = fetch.config().timeout;
    let format = negotiate(url.format.as_deref(), request.header(ACCEPT.as_str()))?;

    match format {
        ResponseFormat::Raw => {
            let block =
                bounded(timeout, &request.cancel, "block get", client.block_get(&root)).await?;
            Ok(Response::new(StatusCode::OK)
                .with_header(CONTENT_TYPE, "application/vnd.ipld.raw")
                .with_body(block))
        }
        ResponseFormat::Car => {
            let stream =
                bounded(timeout, &request.cancel, "export", client.export_car(&root)).await?;
            Ok(Response::new(StatusCode::OK)
                .with_header(CONTENT_TYPE, "application/vnd.ipld.car")
                .with_body(Body::stream(stream)))
        }
        ResponseFormat::DagCbor => {
            let value =
                bounded(timeout, &request.cancel, "resolve", client.dag_get(&root, &segments))
                    .await?;
            let bytes = linked_data::encode_ipld(&value, DAG_CBOR_CODEC)
                .map_err(|e| FetchError::Internal(e.into()))?;
            Ok(Response::new(StatusCode::OK)
                .with_header(CONTENT_TYPE, "application/vnd.ipld.dag-cbor")
                .with_body(bytes))
        }
        _ => {
            let value =
                bounded(timeout, &request.cancel, "resolve", client.dag_get(&root, &segments))
                    .await?;
            let bytes = linked_data::encode_ipld(&value, DAG_JSON_CODEC)
                .map_err(|e| FetchError::Internal(e.into()))?;
            Ok(Response::new(StatusCode::OK)
                .with_header(CONTENT_TYPE, "application/json")
                .with_body(bytes))
        }
    }
}

fn decode_codec_for(content_type: &str) -> Result<u64, FetchError> {
    let essence = content_type.split(';').next().unwrap_or("").trim();
    match essence {
        "application/json" | "application/vnd.ipld.dag-json" => Ok(DAG_JSON_CODEC),
        "application/cbor" | "application/vnd.ipld.dag-cbor" => Ok(DAG_CBOR_CODEC),
        other => Err(FetchError::InvalidInput(format!(
            "unsupported content type {}",
            other
        ))),
    }
}

/// Create a new node on the reserved host. `Content-Type` selects
/// the decode codec; `?format` overrides the store codec.
pub(crate) async fn post(
    fetch: &Fetch,
    mut request: Request,
    url: &CanUrl,
) -> Result<Response, FetchError> {
    if !url.is_local() {
        return Err(FetchError::MethodNotSupported {
            allow: Some("GET, PATCH"),
        });
    }
    let decode_codec = decode_codec_for(request.header(CONTENT_TYPE.as_str()).unwrap_or(""))?;
    let data = read_body(&request.cancel, std::mem::take(&mut request.body)).await?;
    let value = linked_data::decode_ipld(&data, decode_codec)
        .map_err(|e| FetchError::InvalidInput(e.to_string()))?;

    let store_codec = match url.format.as_deref() {
        None | Some("dag-cbor") | Some("cbor") => DAG_CBOR_CODEC,
        Some("dag-json") | Some("json") => DAG_JSON_CODEC,
        Some(other) => {
            return Err(FetchError::InvalidInput(format!(
                "unknown store codec {}",
                other
            )))
        }
    };
    let cid = bounded(
        fetch.config().timeout,
        &request.cancel,
        "store node",
        fetch.client().dag_put(&value, store_codec),
    )
    .await?;
    Ok(created(&format!("linked://{}/", cid_base32(&cid))))
}

/// Apply a JSON-Patch document to the resolved subtree, producing a
/// new root.
pub(crate) async fn patch(
    fetch: &Fetch,
    mut request: Request,
    url: &CanUrl,
) -> Result<Response, FetchError> {
    let root = parse_root(url)?;
    let segments = graph_segments(url);
    let client = fetch.client();
    let timeout = fetch.config().timeout;

    let data = read_body(&request.cancel, std::mem::take(&mut request.body)).await?;
    let patch: json_patch::Patch = serde_json::from_slice(&data)
        .map_err(|e| FetchError::InvalidInput(format!("invalid patch document: {}", e)))?;

    let root_value =
        bounded(timeout, &request.cancel, "resolve", client.dag_get(&root, &[])).await?;
    let target = get_in(&root_value, &segments)?;

    let mut json = linked_data::to_json_value(&target)
        .map_err(|e| FetchError::Internal(e.into()))?;
    json_patch::patch(&mut json, &patch)
        .map_err(|e| FetchError::InvalidInput(format!("patch failed: {}", e)))?;
    let patched =
        linked_data::from_json_value(&json).map_err(|e| FetchError::Internal(e.into()))?;

    let updated = set_in(root_value, &segments, patched)?;
    let store_codec = match root.codec() {
        DAG_JSON_CODEC => DAG_JSON_CODEC,
        _ => DAG_CBOR_CODEC,
    };
    let cid = bounded(
        timeout,
        &request.cancel,
        "store node",
        client.dag_put(&updated, store_codec),
    )
    .await?;
    Ok(created(&format!("linked://{}/", cid_base32(&cid))))
}

/// Navigate within the root block. Patching across links would
/// silently detach the patched subtree, so links are a hard stop.
fn get_in(value: &Ipld, segments: &[String]) -> Result<Ipld, FetchError> {
    let mut current = value;
    for segment in segments {
        current = match current {
            Ipld::Map(map) => map
                .get(segment)
                .ok_or_else(|| FetchError::NotFound(format!("no key {}", segment)))?,
            Ipld::List(items) => {
                let index: usize = segment
                    .parse()
                    .map_err(|_| FetchError::NotFound(format!("no index {}", segment)))?;
                items
                    .get(index)
                    .ok_or_else(|| FetchError::NotFound(format!("no index {}", segment)))?
            }
            Ipld::Link(_) => {
                return Err(FetchError::InvalidInput(
                    "cannot patch across links".to_string(),
                ))
            }
            _ => {
                return Err(FetchError::NotFound(format!(
                    "cannot descend into scalar at {}",
                    segment
                )))
            }
        };
    }
    Ok(current.clone())
}

fn set_in(value: Ipld, segments: &[String], replacement: Ipld) -> Result<Ipld, FetchError> {
    if segments.is_empty() {
        return Ok(replacement);
    }
    match value {
        Ipld::Map(mut map) => {
            let child = map
                .remove(&segments[0])
                .ok_or_else(|| FetchError::NotFound(format!("no key {}", segments[0])))?;
            let updated = set_in(child, &segments[1..], replacement)?;
            map.insert(segments[0].clone(), updated);
            Ok(Ipld::Map(map))
        }
        Ipld::List(mut items) => {
            let index: usize = segments[0]
                .parse()
                .map_err(|_| FetchError::NotFound(format!("no index {}", segments[0])))?;
            if index >= items.len() {
                return Err(FetchError::NotFound(format!("no index {}", index)));
            }
            let child = std::mem::replace(&mut items[index], Ipld::Null);
            items[index] = set_in(child, &segments[1..], replacement)?;
            Ok(Ipld::List(items))
        }
        _ => Err(FetchError::InvalidInput(
            "cannot descend into scalar".to_string(),
        )),
    }
}
