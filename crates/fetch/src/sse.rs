use std::fmt::Write;

/// One server-sent event. Framing is newline-based text: optional
/// `event:` and `id:` lines, one `data:` line per payload line, and
/// a blank terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub id: Option<String>,
    pub event: Option<String>,
    pub data: String,
}

impl Event {
    pub fn message(id: String, data: String) -> Self {
        Event {
            id: Some(id),
            event: None,
            data,
        }
    }

    pub fn error(data: String) -> Self {
        Event {
            id: None,
            event: Some("error".to_string()),
            data,
        }
    }

    pub fn to_frame(&self) -> String {
        let mut out = String::new();
        if let Some(event) = &self.event {
            let _ = writeln!(out, "event: {}", event);
        }
        if let Some(id) = &self.id {
            let _ = writeln!(out, "id: {}", id);
        }
        if self.data.is_empty() {
            out.push_str("data: \n");
        } else {
            for line in self.data.lines() {
                let _ = writeln!(out, "data: {}", line);
            }
        }
        out.push('\n');
        out
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_message_frame() {
        let frame = Event::message("2a".to_string(), r#"{"from":"k1","data":"aGV5"}"#.to_string())
            .to_frame();
        assert_eq!(frame, "id: 2a\ndata: {\"from\":\"k1\",\"data\":\"aGV5\"}\n\n");
    }

    #[test]
    fn test_error_frame() {
        let frame = Event::error("invalid utf-8".to_string()).to_frame();
        assert_eq!(frame, "event: error\ndata: invalid utf-8\n\n");
    }

    #[test]
    fn test_multiline_data() {
        let frame = Event::message("1".to_string(), "a\nb".to_string()).to_frame();
        assert_eq!(frame, "id: 1\ndata: a\ndata: b\n\n");
    }
}
