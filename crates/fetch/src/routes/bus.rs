use base64::Engine;
use bytes::Bytes;
use futures::stream;
use futures::StreamExt;
use http::header::{ACCEPT, CACHE_CONTROL, CONTENT_TYPE};
use http::StatusCode;
use tokio_util::sync::CancellationToken;

use common::prelude::{ByteStream, PubsubMessage, Subscription};

use crate::body::Body;
use crate::can_url::CanUrl;
use crate::error::FetchError;
use crate::request::{Request, Response};
use crate::sse::Event;
use crate::state::{bounded, read_body, Fetch};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PayloadEncoding {
    Base64,
    Utf8,
    Json,
}

fn payload_encoding(format: Option<&str>) -> Result<PayloadEncoding, FetchError> {
    match format {
        None | Some("base64") => Ok(PayloadEncoding::Base64),
        Some("utf8") => Ok(PayloadEncoding::Utf8),
        Some("json") => Ok(PayloadEncoding::Json),
        Some(other) => Err(FetchError::InvalidInput(format!(
            "unknown payload format {}",
            other
        ))),
    }
}

/// Frame one delivered message as an SSE event. Decode failures
/// surface in-band as `error` events, never as stream termination.
fn frame_message(message: &PubsubMessage, encoding: PayloadEncoding) -> String {
    let payload: Result<serde_json::Value, String> = match encoding {
        PayloadEncoding::Base64 => Ok(serde_json::Value::String(
            base64::engine::general_purpose::STANDARD.encode(&message.data),
        )),
        PayloadEncoding::Utf8 => String::from_utf8(message.data.to_vec())
            .map(serde_json::Value::String)
            .map_err(|e| e.to_string()),
        PayloadEncoding::Json => {
            serde_json::from_slice(&message.data).map_err(|e| e.to_string())
        }
    };
    match payload {
        Ok(data) => {
            let body = serde_json::json!({ "from": message.from, "data": data });
            Event::message(format!("{:x}", message.seq), body.to_string()).to_frame()
        }
        Err(diagnostic) => Event::error(diagnostic).to_frame(),
    }
}

/// Turn a subscription into an SSE chunk stream. Dropping the
/// subscription on cancellation (or upstream close) releases the
/// topic registration before the body ends.
fn sse_stream(
    subscription: Subscription,
    cancel: CancellationToken,
    encoding: PayloadEncoding,
) -> ByteStream {
    Box::pin(stream::unfold(
        (subscription, cancel, encoding),
        |(mut subscription, cancel, encoding)| async move {
            tokio::select! {
                _ = cancel.cancelled() => None,
                message = subscription.messages.next() => match message {
                    Some(message) => {
                        let frame = frame_message(&message, encoding);
                        Some((Ok(Bytes::from(frame)), (subscription, cancel, encoding)))
                    }
                    None => None,
                },
            }
        },
    ))
}

pub(crate) async fn get(
    fetch: &Fetch,
    request: &Request,
    url: &CanUrl,
) -> Result<Response, FetchError> {
    let topic = url.root.clone();
    let client = fetch.client();
    let timeout = fetch.config().timeout;
    let accept = request.header(ACCEPT.as_str()).unwrap_or("");

    if accept.contains("text/event-stream") {
        let encoding = payload_encoding(url.format.as_deref())?;
        let subscription = bounded(
            timeout,
            &request.cancel,
            "subscribe",
            client.pubsub_subscribe(&topic),
        )
        .await?;
        tracing::debug!(%topic, "event stream opened");
        let stream = sse_stream(subscription, request.cancel.clone(), encoding);
        return Ok(Response::new(StatusCode::OK)
            .with_header(CONTENT_TYPE, "text/event-stream")
            .with_header(CACHE_CONTROL, "no-cache")
            .with_body(Body::stream(stream)));
    }

    // local membership document
    let id = bounded(timeout, &request.cancel, "peer id", client.peer_id()).await?;
    let subscribed = bounded(
        timeout,
        &request.cancel,
        "subscription check",
        client.pubsub_subscribed(&topic),
    )
    .await?;
    let body = serde_json::json!({ "id": id, "topic": topic, "subscribed": subscribed });
    Ok(Response::new(StatusCode::OK)
        .with_header(CONTENT_TYPE, "application/json")
        .with_body(body.to_string()))
}

pub(crate) async fn post(
    fetch: &Fetch,
    mut request: Request,
    url: &CanUrl,
) -> Result<Response, FetchError> {
    let topic = url.root.clone();
    let data = read_body(&request.cancel, std::mem::take(&mut request.body)).await?;
    bounded(
        fetch.config().timeout,
        &request.cancel,
        "publish",
        fetch.client().pubsub_publish(&topic, data),
    )
    .await?;
    Ok(Response::new(StatusCode::OK))
}
