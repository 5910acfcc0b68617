use std::time::Duration;

/// Longest line kept while waiting for its terminator. Longer lines are
/// dropped as a whole.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Value of the last `event:` field, `None` for plain messages.
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
    pub retry: Option<Duration>,
}

impl Event {
    /// Whether an `EventSource` would hand this event to `onmessage`.
    pub fn is_message(&self) -> bool {
        matches!(self.event.as_deref(), None | Some("message"))
    }
}

/// Incremental `text/event-stream` decoder. Chunks may split lines and even
/// `\r\n` pairs anywhere.
#[derive(Debug, Default)]
pub struct EventParser {
    line: Vec<u8>,
    /// Set while skipping the rest of an oversized line.
    overflowed: bool,
    skip_lf: bool,
    data: String,
    event: Option<String>,
    last_event_id: Option<String>,
    retry: Option<Duration>,
}

impl EventParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes `chunk` and returns the events completed by it.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Event> {
        let mut events = vec![];
        for &byte in chunk {
            if std::mem::take(&mut self.skip_lf) && byte == b'\n' {
                continue;
            }
            match byte {
                b'\r' => {
                    self.skip_lf = true;
                    self.end_line(&mut events);
                }
                b'\n' => self.end_line(&mut events),
                _ if self.overflowed => {}
                _ if self.line.len() >= MAX_LINE_BYTES => {
                    log::warn!("dropping event stream line longer than {} bytes", MAX_LINE_BYTES);
                    self.line = Vec::new();
                    self.overflowed = true;
                }
                _ => self.line.push(byte),
            }
        }
        events
    }

    fn end_line(&mut self, events: &mut Vec<Event>) {
        if std::mem::take(&mut self.overflowed) {
            return;
        }
        let bytes = std::mem::take(&mut self.line);
        let line = String::from_utf8_lossy(&bytes);

        if line.is_empty() {
            events.extend(self.dispatch());
            return;
        }
        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (&*line, ""),
        };
        match field {
            "data" => {
                self.data.push_str(value);
                self.data.push('\n');
            }
            "event" => self.event = Some(value.to_owned()),
            "id" if !value.contains('\0') => self.last_event_id = Some(value.to_owned()),
            "retry" if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) => {
                if let Ok(millis) = value.parse() {
                    self.retry = Some(Duration::from_millis(millis));
                }
            }
            _ => {}
        }
    }

    fn dispatch(&mut self) -> Option<Event> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let mut data = std::mem::take(&mut self.data);
        data.pop();
        Some(Event {
            event,
            data,
            id: self.last_event_id.clone(),
            retry: self.retry,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(data: &str) -> Event {
        Event {
            event: None,
            data: data.to_owned(),
            id: None,
            retry: None,
        }
    }

    #[test]
    fn dispatches_on_blank_line() {
        let mut parser = EventParser::new();
        assert_eq!(parser.feed(b"data: {'latitude': '1'}\n"), vec![]);
        assert_eq!(
            parser.feed(b"\n"),
            vec![message("{'latitude': '1'}")]
        );
    }

    #[test]
    fn reassembles_events_split_across_chunks() {
        let mut parser = EventParser::new();
        let stream = b"data: first\r\n\r\ndata: sec";
        let mut events = vec![];
        for chunk in stream.chunks(3) {
            events.extend(parser.feed(chunk));
        }
        events.extend(parser.feed(b"ond\r"));
        events.extend(parser.feed(b"\n\r\n"));
        assert_eq!(events, vec![message("first"), message("second")]);
    }

    #[test]
    fn joins_multi_line_data() {
        let mut parser = EventParser::new();
        let events = parser.feed(b"data:one\ndata: two\rdata\n\n");
        assert_eq!(events, vec![message("one\ntwo\n")]);
    }

    #[test]
    fn ignores_comments_and_empty_events() {
        let mut parser = EventParser::new();
        let events = parser.feed(b": keep-alive\n\nevent: ping\n\nunknown: field\n\n");
        assert!(events.is_empty());
    }

    #[test]
    fn tracks_event_type_id_and_retry() {
        let mut parser = EventParser::new();
        let events = parser.feed(
            b"event: status\nid: 7\nretry: 1500\ndata: up\n\ndata: next\nretry: soon\n\n",
        );
        assert_eq!(
            events,
            vec![
                Event {
                    event: Some("status".to_owned()),
                    data: "up".to_owned(),
                    id: Some("7".to_owned()),
                    retry: Some(Duration::from_millis(1500)),
                },
                Event {
                    event: None,
                    data: "next".to_owned(),
                    id: Some("7".to_owned()),
                    retry: Some(Duration::from_millis(1500)),
                },
            ]
        );
        assert!(!events[0].is_message());
        assert!(events[1].is_message());
    }

    #[test]
    fn drops_oversized_lines() {
        let mut parser = EventParser::new();
        let mut events = parser.feed(b"data: ");
        for _ in 0..4 {
            events.extend(parser.feed(&vec![b'x'; MAX_LINE_BYTES / 2]));
        }
        assert!(parser.line.is_empty());
        events.extend(parser.feed(b"\ndata: small\n\n"));
        assert_eq!(events, vec![message("small")]);
    }

    #[test]
    fn decodes_invalid_utf8_lossily() {
        let mut parser = EventParser::new();
        let events = parser.feed(b"data: caf\xc3\xa9 \xff\n\n");
        assert_eq!(events, vec![message("caf\u{e9} \u{fffd}")]);
    }
}
