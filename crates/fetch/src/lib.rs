//! Request/response adapter over the content-addressed network.
//!
//! Callers hand in a method, a URL on one of four schemes
//! (`content://`, `name://`, `linked://`, `bus://`), headers, a body
//! and a cancellation signal; they get back a status, headers and a
//! possibly-streaming body. Everything in between is translation
//! onto an embedded CAN client the adapter does not own.

mod body;
mod can_url;
mod config;
mod error;
mod html;
mod negotiate;
mod range;
mod request;
mod routes;
mod sse;
mod state;
mod tree;

pub use body::Body;
pub use can_url::{CanUrl, Scheme};
pub use config::{Config, IndexRenderer, NotFoundHandler};
pub use error::FetchError;
pub use request::{Request, Response};
pub use state::Fetch;

pub mod prelude {
    pub use crate::body::Body;
    pub use crate::config::Config;
    pub use crate::error::FetchError;
    pub use crate::request::{Request, Response};
    pub use crate::state::Fetch;
}
