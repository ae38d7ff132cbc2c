use crate::error::FetchError;

/// The response encoding a request negotiated. `?format=` wins over
/// the `Accept` header; everything else falls back to the default
/// shape for whatever the path resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    /// Single raw block bytes.
    Raw,
    /// DAG-archive stream from the resolved root.
    Car,
    /// Deterministic CBOR of the resolved value.
    DagCbor,
    /// Deterministic JSON of the resolved value.
    DagJson,
    /// Rendered HTML listing for directories.
    Html,
    /// File bytes or a JSON name listing.
    Default,
}

pub fn negotiate(
    format: Option<&str>,
    accept: Option<&str>,
) -> Result<ResponseFormat, FetchError> {
    if let Some(format) = format {
        return match format {
            "raw" => Ok(ResponseFormat::Raw),
            "car" => Ok(ResponseFormat::Car),
            "dag-cbor" | "cbor" => Ok(ResponseFormat::DagCbor),
            "dag-json" | "json" => Ok(ResponseFormat::DagJson),
            "html" => Ok(ResponseFormat::Html),
            other => Err(FetchError::InvalidInput(format!("unknown format {}", other))),
        };
    }
    let accept = accept.unwrap_or("");
    if accept.contains("application/vnd.ipld.raw") {
        Ok(ResponseFormat::Raw)
    } else if accept.contains("application/vnd.ipld.car") {
        Ok(ResponseFormat::Car)
    } else if accept.contains("application/vnd.ipld.dag-cbor") {
        Ok(ResponseFormat::DagCbor)
    } else if accept.contains("application/vnd.ipld.dag-json")
        || accept.contains("application/json")
    {
        Ok(ResponseFormat::DagJson)
    } else if accept.contains("text/html") {
        Ok(ResponseFormat::Html)
    } else {
        Ok(ResponseFormat::Default)
    }
}
