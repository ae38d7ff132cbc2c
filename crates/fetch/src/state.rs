use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use http::StatusCode;
use tokio_util::sync::CancellationToken;

use common::prelude::{CanClient, ClientError};

use crate::config::Config;
use crate::error::FetchError;
use crate::request::{Request, Response};
use crate::routes;

/// The adapter itself: routing and semantic translation over an
/// embedded CAN client it does not own.
#[derive(Clone)]
pub struct Fetch {
    client: Arc<dyn CanClient>,
    config: Arc<Config>,
}

impl Fetch {
    pub fn new(client: Arc<dyn CanClient>) -> Self {
        Self::with_config(client, Config::default())
    }

    pub fn with_config(client: Arc<dyn CanClient>, config: Config) -> Self {
        Fetch {
            client,
            config: Arc::new(config),
        }
    }

    pub fn client(&self) -> &Arc<dyn CanClient> {
        &self.client
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Handle one request. Failures are mapped to status codes and
    /// diagnostic bodies; this never errors at the call site.
    pub async fn fetch(&self, request: Request) -> Response {
        let method = request.method.clone();
        let url = request.url.to_string();
        let mut response = match routes::route(self, request).await {
            Ok(response) => response,
            Err(err) => err.into_response(),
        };
        for (name, value) in self.config.default_headers.iter() {
            if !response.headers.contains_key(name) {
                response.headers.insert(name.clone(), value.clone());
            }
        }
        tracing::debug!(%method, %url, status = %response.status, "handled");
        response
    }

    /// The fallback for unmatched routes, 405 unless overridden.
    pub(crate) fn not_found(&self, request: &Request) -> Response {
        match &self.config.on_not_found {
            Some(handler) => handler(request),
            None => FetchError::MethodNotSupported { allow: None }.into_response(),
        }
    }
}

/// Run a capability call under a timeout while honoring the request's
/// cancellation signal. `what` names the operation in 408 bodies.
pub(crate) async fn bounded<T>(
    duration: Duration,
    cancel: &CancellationToken,
    what: &str,
    fut: impl Future<Output = Result<T, ClientError>>,
) -> Result<T, FetchError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(FetchError::Aborted),
        result = tokio::time::timeout(duration, fut) => match result {
            Ok(inner) => inner.map_err(FetchError::from),
            Err(_) => Err(FetchError::Timeout(what.to_string())),
        },
    }
}

/// Drain a request body while honoring the cancellation signal.
pub(crate) async fn read_body(
    cancel: &CancellationToken,
    body: crate::body::Body,
) -> Result<bytes::Bytes, FetchError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(FetchError::Aborted),
        result = body.collect() => result.map_err(|e| FetchError::Internal(e.into())),
    }
}

/// 201 pointing at a freshly written root; the body repeats the URL
/// so callers without header access can still follow it.
pub(crate) fn created(location: &str) -> Response {
    Response::new(StatusCode::CREATED)
        .with_header(http::header::LOCATION, location)
        .with_header(http::header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .with_body(location.to_string())
}
