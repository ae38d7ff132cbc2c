use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::Method;

use crate::body::Body;
use crate::can_url::{CanUrl, Scheme};
use crate::error::FetchError;
use crate::request::{Request, Response};
use crate::state::Fetch;

mod bus;
mod content;
mod linked;
mod name;

const CONTENT_ALLOW: &str = "GET, HEAD, POST, PUT, DELETE";
const NAME_ALLOW: &str = "GET, HEAD, POST, PUT, DELETE";
const LINKED_ALLOW: &str = "GET, POST, PATCH";
const BUS_ALLOW: &str = "GET, POST";

fn is_mutation(method: &Method) -> bool {
    method == Method::POST
        || method == Method::PUT
        || method == Method::DELETE
        || method == Method::PATCH
}

/// Pattern-match (scheme, method, host-is-reserved, path shape) to a
/// handler. Unknown schemes and gated writes fall through to the
/// not-found handler.
pub(crate) async fn route(fetch: &Fetch, request: Request) -> Result<Response, FetchError> {
    let Some(url) = CanUrl::parse(&request.url)? else {
        return Ok(fetch.not_found(&request));
    };
    if is_mutation(&request.method) && !fetch.config().writable {
        return Ok(fetch.not_found(&request));
    }

    let method = request.method.clone();
    match url.scheme {
        Scheme::Content => match method.as_str() {
            "GET" => content::get(fetch, &request, &url, false).await,
            "HEAD" => content::get(fetch, &request, &url, true).await,
            "POST" => content::post(fetch, request, &url).await,
            "PUT" => content::put(fetch, request, &url).await,
            "DELETE" => content::delete(fetch, &request, &url).await,
            _ => Err(FetchError::MethodNotSupported {
                allow: Some(CONTENT_ALLOW),
            }),
        },
        Scheme::Name => match method.as_str() {
            "GET" => name::get(fetch, &request, &url, false).await,
            "HEAD" => name::get(fetch, &request, &url, true).await,
            "POST" => name::post(fetch, request, &url).await,
            "PUT" => name::put(fetch, request, &url).await,
            "DELETE" => name::delete(fetch, &request, &url).await,
            _ => Err(FetchError::MethodNotSupported {
                allow: Some(NAME_ALLOW),
            }),
        },
        Scheme::Linked => match method.as_str() {
            "GET" => linked::get(fetch, &request, &url).await,
            "POST" => linked::post(fetch, request, &url).await,
            "PATCH" => linked::patch(fetch, request, &url).await,
            _ => Err(FetchError::MethodNotSupported {
                allow: Some(LINKED_ALLOW),
            }),
        },
        Scheme::Bus => match method.as_str() {
            "GET" => bus::get(fetch, &request, &url).await,
            "POST" => bus::post(fetch, request, &url).await,
            _ => Err(FetchError::MethodNotSupported {
                allow: Some(BUS_ALLOW),
            }),
        },
    }
}

/// The multipart boundary, when the request carries a form body.
pub(crate) fn form_boundary(request: &Request) -> Option<String> {
    multer::parse_boundary(request.header(CONTENT_TYPE.as_str())?).ok()
}

/// Pull the uploaded files out of a multipart body. Only parts under
/// the `file` field that carry a filename are included; a later
/// duplicate filename wins by overwriting during the sequential
/// writes. Cancellation stops the read mid-body.
pub(crate) async fn read_form_files(
    boundary: String,
    body: Body,
    cancel: &tokio_util::sync::CancellationToken,
) -> Result<Vec<(String, Bytes)>, FetchError> {
    let parse = async move {
        let mut multipart = multer::Multipart::new(body.into_stream(), boundary);
        let mut files = Vec::new();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| FetchError::InvalidInput(format!("multipart error: {}", e)))?
        {
            if field.name() != Some("file") {
                continue;
            }
            let Some(filename) = field.file_name().map(str::to_string) else {
                continue;
            };
            let data = field
                .bytes()
                .await
                .map_err(|e| FetchError::InvalidInput(format!("multipart error: {}", e)))?;
            files.push((filename, data));
        }
        Ok(files)
    };
    tokio::select! {
        _ = cancel.cancelled() => Err(FetchError::Aborted),
        result = parse => result,
    }
}
