use std::borrow::Cow;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use url::Url;

use crate::error::FetchError;

/// Characters that must stay escaped inside a single path segment so
/// names survive the round trip through a canonical CAN path.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'/')
    .add(b'%')
    .add(b'?')
    .add(b'#')
    .add(b'"')
    .add(b'<')
    .add(b'>')
    .add(b'`');

/// The four protocol schemes the adapter answers for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Content,
    Name,
    Linked,
    Bus,
}

impl Scheme {
    pub fn parse(scheme: &str) -> Option<Self> {
        match scheme {
            "content" => Some(Scheme::Content),
            "name" => Some(Scheme::Name),
            "linked" => Some(Scheme::Linked),
            "bus" => Some(Scheme::Bus),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Content => "content",
            Scheme::Name => "name",
            Scheme::Linked => "linked",
            Scheme::Bus => "bus",
        }
    }
}

/// A request URL decomposed into its CAN parts: the scheme, the root
/// token from the host position, percent-decoded path segments, and
/// the recognized query options.
///
/// The host is ALWAYS the root token. `content://<CID>/example.txt`
/// keeps the CID as root and `example.txt` as a path segment; a bare
/// filename never lands in the host position.
#[derive(Debug, Clone)]
pub struct CanUrl {
    pub scheme: Scheme,
    pub root: String,
    pub segments: Vec<String>,
    pub format: Option<String>,
    pub filename: Option<String>,
    pub key: Option<String>,
    pub no_resolve: bool,
}

impl CanUrl {
    pub fn parse(url: &Url) -> Result<Option<Self>, FetchError> {
        let Some(scheme) = Scheme::parse(url.scheme()) else {
            return Ok(None);
        };
        let root = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| FetchError::InvalidInput(format!("missing root token in {}", url)))?
            .to_string();

        let mut segments = Vec::new();
        if let Some(parts) = url.path_segments() {
            for part in parts {
                if part.is_empty() {
                    continue;
                }
                let decoded = percent_decode_str(part)
                    .decode_utf8()
                    .map_err(|e| FetchError::InvalidInput(format!("bad path segment: {}", e)))?;
                segments.push(decoded.into_owned());
            }
        }

        let mut format = None;
        let mut filename = None;
        let mut key = None;
        let mut no_resolve = false;
        for (name, value) in url.query_pairs() {
            match name.as_ref() {
                "format" => format = Some(value.into_owned()),
                "filename" => filename = Some(value.into_owned()),
                "key" => key = Some(value.into_owned()),
                "noResolve" => no_resolve = true,
                _ => {}
            }
        }

        Ok(Some(CanUrl {
            scheme,
            root,
            segments,
            format,
            filename,
            key,
            no_resolve,
        }))
    }

    /// The reserved host designating administrative operations.
    pub fn is_local(&self) -> bool {
        self.root == "local"
    }

    /// Re-encoded path, no leading slash. Empty for the root.
    pub fn encoded_path(&self) -> String {
        join_encoded(&self.segments)
    }
}

pub fn encode_segment(segment: &str) -> Cow<'_, str> {
    utf8_percent_encode(segment, SEGMENT).into()
}

/// Join decoded segments back into a path, re-encoding each one.
pub fn join_encoded(segments: &[String]) -> String {
    segments
        .iter()
        .map(|s| encode_segment(s))
        .collect::<Vec<_>>()
        .join("/")
}

/// Canonical CAN path for a content root and decoded segments.
pub fn can_path(root: &str, segments: &[String]) -> String {
    if segments.is_empty() {
        format!("/content/{}", root)
    } else {
        format!("/content/{}/{}", root, join_encoded(segments))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn parse(url: &str) -> CanUrl {
        CanUrl::parse(&Url::parse(url).unwrap()).unwrap().unwrap()
    }

    #[test]
    fn test_host_is_always_the_root_token() {
        let url = parse("content://bafyaabakaieac/example.txt");
        assert_eq!(url.scheme, Scheme::Content);
        assert_eq!(url.root, "bafyaabakaieac");
        assert_eq!(url.segments, vec!["example.txt"]);
    }

    #[test]
    fn test_segments_are_percent_decoded() {
        let url = parse("content://bafyaabakaieac/with%20space/file%25.txt");
        assert_eq!(url.segments, vec!["with space", "file%.txt"]);
        assert_eq!(url.encoded_path(), "with%20space/file%25.txt");
    }

    #[test]
    fn test_query_options() {
        let url = parse("name://local/?key=alias&format=car&noResolve");
        assert!(url.is_local());
        assert_eq!(url.key.as_deref(), Some("alias"));
        assert_eq!(url.format.as_deref(), Some("car"));
        assert!(url.no_resolve);

        let url = parse("content://bafyaabakaieac/?filename=photo.png");
        assert_eq!(url.filename.as_deref(), Some("photo.png"));
        assert!(!url.no_resolve);
    }

    #[test]
    fn test_empty_segments_collapse() {
        let url = parse("content://bafyaabakaieac//a///b/");
        assert_eq!(url.segments, vec!["a", "b"]);
    }

    #[test]
    fn test_unknown_scheme_is_not_parsed() {
        let url = Url::parse("https://example.com/x").unwrap();
        assert!(CanUrl::parse(&url).unwrap().is_none());
    }

    #[test]
    fn test_can_path_round_trip() {
        let segments = vec!["with space".to_string(), "b.txt".to_string()];
        assert_eq!(
            can_path("bafyaabakaieac", &segments),
            "/content/bafyaabakaieac/with%20space/b.txt"
        );
        assert_eq!(can_path("bafyaabakaieac", &[]), "/content/bafyaabakaieac");
    }
}
