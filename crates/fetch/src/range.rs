/// Byte-range handling for file GETs. Anything that does not parse
/// to exactly one satisfiable `bytes` range falls back to a full 200
/// response; range problems are never surfaced as errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn length(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn content_range(&self, size: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, size)
    }
}

pub fn parse(header: Option<&str>, size: u64) -> Option<ByteRange> {
    let header = header?;
    let parsed = http_range_header::parse_range_header(header).ok()?;
    let validated = parsed.validate(size).ok()?;
    match validated.as_slice() {
        [range] => Some(ByteRange {
            start: *range.start(),
            end: *range.end(),
        }),
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_single_range() {
        let range = parse(Some("bytes=0-4"), 12).unwrap();
        assert_eq!(range, ByteRange { start: 0, end: 4 });
        assert_eq!(range.length(), 5);
        assert_eq!(range.content_range(12), "bytes 0-4/12");
    }

    #[test]
    fn test_open_ended_range() {
        let range = parse(Some("bytes=4-"), 12).unwrap();
        assert_eq!(range, ByteRange { start: 4, end: 11 });
    }

    #[test]
    fn test_suffix_range() {
        let range = parse(Some("bytes=-3"), 12).unwrap();
        assert_eq!(range, ByteRange { start: 9, end: 11 });
    }

    #[test]
    fn test_fallbacks_to_full_response() {
        // absent header
        assert_eq!(parse(None, 12), None);
        // unsatisfiable
        assert_eq!(parse(Some("bytes=50-60"), 12), None);
        // multipart ranges are not served
        assert_eq!(parse(Some("bytes=0-1,4-5"), 12), None);
        // garbage
        assert_eq!(parse(Some("lines=0-4"), 12), None);
    }
}
