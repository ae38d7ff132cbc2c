use bytes::Bytes;
use futures::stream;
use futures::StreamExt;

use common::prelude::ByteStream;

/// A request or response payload. Streaming bodies are drained at
/// most once; eager bodies are cheap to clone around.
pub enum Body {
    Empty,
    Full(Bytes),
    Stream(ByteStream),
}

impl std::fmt::Debug for Body {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Body::Empty => f.write_str("Body::Empty"),
            Body::Full(bytes) => write!(f, "Body::Full({} bytes)", bytes.len()),
            Body::Stream(_) => f.write_str("Body::Stream(..)"),
        }
    }
}

impl Default for Body {
    fn default() -> Self {
        Body::Empty
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Body::Full(bytes)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Body::Full(Bytes::from(bytes))
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Body::Full(Bytes::from(text))
    }
}

impl From<&'static str> for Body {
    fn from(text: &'static str) -> Self {
        Body::Full(Bytes::from_static(text.as_bytes()))
    }
}

impl Body {
    pub fn empty() -> Self {
        Body::Empty
    }

    pub fn stream(stream: ByteStream) -> Self {
        Body::Stream(stream)
    }

    /// Drain the whole body into memory.
    pub async fn collect(self) -> std::io::Result<Bytes> {
        match self {
            Body::Empty => Ok(Bytes::new()),
            Body::Full(bytes) => Ok(bytes),
            Body::Stream(mut stream) => {
                let mut out = Vec::new();
                while let Some(chunk) = stream.next().await {
                    out.extend_from_slice(&chunk?);
                }
                Ok(Bytes::from(out))
            }
        }
    }

    /// View the body as a chunk stream without copying eager bodies.
    pub fn into_stream(self) -> ByteStream {
        match self {
            Body::Empty => Box::pin(stream::empty()),
            Body::Full(bytes) => Box::pin(stream::iter([Ok(bytes)])),
            Body::Stream(stream) => stream,
        }
    }
}
