use std::sync::Arc;
use std::time::Duration;

use http::header::{HeaderMap, HeaderName, HeaderValue};

use crate::request::{Request, Response};

/// Renders a directory listing page from the request URL and the
/// listed names (subdirectories carry a trailing `/`).
pub type IndexRenderer = dyn Fn(&str, &[String]) -> String + Send + Sync;

/// Answers requests no route matched; the default responds 405.
pub type NotFoundHandler = dyn Fn(&Request) -> Response + Send + Sync;

/// Construction parameters for the adapter.
#[derive(Clone)]
pub struct Config {
    /// budget for block, DAG and export operations
    pub timeout: Duration,
    /// budget for naming operations, which may cross the network
    pub name_timeout: Duration,
    /// when false, every mutating route falls through to the
    /// not-found handler
    pub writable: bool,
    /// headers applied to all responses that do not already set them
    pub default_headers: HeaderMap,
    pub(crate) render_index: Option<Arc<IndexRenderer>>,
    pub(crate) on_not_found: Option<Arc<NotFoundHandler>>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("timeout", &self.timeout)
            .field("name_timeout", &self.name_timeout)
            .field("writable", &self.writable)
            .field("default_headers", &self.default_headers)
            .field("render_index", &self.render_index.is_some())
            .field("on_not_found", &self.on_not_found.is_some())
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            name_timeout: Duration::from_secs(120),
            writable: true,
            default_headers: HeaderMap::new(),
            render_index: None,
            on_not_found: None,
        }
    }
}

impl Config {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_name_timeout(mut self, timeout: Duration) -> Self {
        self.name_timeout = timeout;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.writable = false;
        self
    }

    /// Add a header applied to every response. Invalid names or
    /// values are dropped with a log line.
    pub fn with_default_header(mut self, name: &str, value: &str) -> Self {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.default_headers.insert(name, value);
            }
            _ => tracing::warn!(name, value, "dropping invalid default header"),
        }
        self
    }

    pub fn with_render_index<F>(mut self, renderer: F) -> Self
    where
        F: Fn(&str, &[String]) -> String + Send + Sync + 'static,
    {
        self.render_index = Some(Arc::new(renderer));
        self
    }

    pub fn with_on_not_found<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Request) -> Response + Send + Sync + 'static,
    {
        self.on_not_found = Some(Arc::new(handler));
        self
    }
}
