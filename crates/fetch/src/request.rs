use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::{Method, StatusCode};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::body::Body;
use crate::error::FetchError;

/// One call into the adapter: a method, a URL over one of the four
/// CAN schemes, headers, a body and a cancellation signal. Consumed
/// exactly once; the body may be read once.
#[derive(Debug)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Body,
    pub cancel: CancellationToken,
}

impl Request {
    pub fn new(method: Method, url: &str) -> Result<Self, FetchError> {
        let url = Url::parse(url)
            .map_err(|e| FetchError::InvalidInput(format!("invalid url {}: {}", url, e)))?;
        Ok(Request {
            method,
            url,
            headers: HeaderMap::new(),
            body: Body::Empty,
            cancel: CancellationToken::new(),
        })
    }

    pub fn get(url: &str) -> Result<Self, FetchError> {
        Self::new(Method::GET, url)
    }

    pub fn head(url: &str) -> Result<Self, FetchError> {
        Self::new(Method::HEAD, url)
    }

    pub fn post(url: &str) -> Result<Self, FetchError> {
        Self::new(Method::POST, url)
    }

    pub fn put(url: &str) -> Result<Self, FetchError> {
        Self::new(Method::PUT, url)
    }

    pub fn delete(url: &str) -> Result<Self, FetchError> {
        Self::new(Method::DELETE, url)
    }

    pub fn patch(url: &str) -> Result<Self, FetchError> {
        Self::new(Method::PATCH, url)
    }

    /// Add a header. Invalid names or values are dropped with a log
    /// line rather than failing the whole request.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            _ => tracing::warn!(name, value, "dropping invalid header"),
        }
        self
    }

    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// The adapter's answer: status, headers and a possibly-streaming
/// body that must be drainable independently of the adapter.
#[derive(Debug)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Body,
}

impl Response {
    pub(crate) fn new(status: StatusCode) -> Self {
        Response {
            status,
            headers: HeaderMap::new(),
            body: Body::Empty,
        }
    }

    pub(crate) fn with_header(mut self, name: HeaderName, value: &str) -> Self {
        match HeaderValue::from_str(value) {
            Ok(value) => {
                self.headers.insert(name, value);
            }
            Err(_) => tracing::warn!(%name, value, "dropping invalid response header"),
        }
        self
    }

    pub(crate) fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Drain the body into memory.
    pub async fn bytes(self) -> std::io::Result<bytes::Bytes> {
        self.body.collect().await
    }

    /// Drain the body as UTF-8 text.
    pub async fn text(self) -> std::io::Result<String> {
        let bytes = self.body.collect().await?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Drain the body and decode it as JSON.
    pub async fn json<T: DeserializeOwned>(self) -> std::io::Result<T> {
        let bytes = self.body.collect().await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_request_builders() {
        let req = Request::put("content://bafyaabakaieac/example.txt")
            .unwrap()
            .with_header("content-type", "text/plain")
            .with_body("Hello World!");
        assert_eq!(req.method, Method::PUT);
        assert_eq!(req.url.scheme(), "content");
        assert_eq!(req.header("content-type"), Some("text/plain"));
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        assert!(matches!(
            Request::get("not a url"),
            Err(FetchError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_response_json() {
        let response = Response::new(StatusCode::OK).with_body(r#"["a","b/"]"#.to_string());
        let names: Vec<String> = response.json().await.unwrap();
        assert_eq!(names, vec!["a", "b/"]);
    }
}
