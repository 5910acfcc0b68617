use std::{collections::VecDeque, error::Error};

use async_trait::async_trait;
use bytes::Bytes;
use futures::{stream, Stream, StreamExt};
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use tracking::transport::{EventStream, Transport, TransportError};

use crate::parser::{Event, EventParser};

/// Subscribes to `text/event-stream` endpoints over HTTP.
#[derive(Debug, Clone, Default)]
pub struct SseTransport {
    client: reqwest::Client,
}

impl SseTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for SseTransport {
    async fn open(&self, url: &str) -> Result<EventStream, TransportError> {
        let response = self
            .client
            .get(url)
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(TransportError::other)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }
        log::debug!("opened event stream {} ({})", url, status);

        Ok(messages(response.bytes_stream()))
    }
}

/// Splits a response body into the data of its `message` events. Other event
/// types are skipped; the stream ends with the body.
pub fn messages<S, E>(body: S) -> EventStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Error + Send + Sync + 'static,
{
    let state = (body.boxed(), EventParser::new(), VecDeque::<Event>::new());
    stream::unfold(state, |(mut body, mut parser, mut pending)| async move {
        loop {
            if let Some(event) = pending.pop_front() {
                return Some((Ok(event.data), (body, parser, pending)));
            }
            match body.next().await {
                Some(Ok(chunk)) => {
                    pending.extend(parser.feed(&chunk).into_iter().filter(Event::is_message));
                }
                Some(Err(why)) => {
                    return Some((Err(TransportError::other(why)), (body, parser, pending)));
                }
                None => return None,
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    fn chunks(parts: &[&'static str]) -> Vec<Result<Bytes, io::Error>> {
        parts
            .iter()
            .map(|part| Ok(Bytes::from_static(part.as_bytes())))
            .collect()
    }

    #[tokio::test]
    async fn forwards_message_events_only() {
        let body = stream::iter(chunks(&[
            ": hello\n\ndata: {'latitude': '27 39",
            " 54'}\n\nevent: ping\ndata: -\n\n",
            "event: message\ndata: second\n\n",
        ]));
        let messages = messages(body)
            .map(|item| item.unwrap())
            .collect::<Vec<_>>()
            .await;
        assert_eq!(messages, ["{'latitude': '27 39 54'}", "second"]);
    }

    #[tokio::test]
    async fn body_errors_are_transport_errors() {
        let mut parts = chunks(&["data: one\n\n"]);
        parts.push(Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")));
        let mut messages = messages(stream::iter(parts));

        assert_eq!(messages.next().await.unwrap().unwrap(), "one");
        assert!(matches!(
            messages.next().await,
            Some(Err(TransportError::Other(_)))
        ));
    }

    #[tokio::test]
    async fn unfinished_event_is_dropped_at_end_of_body() {
        let mut messages = messages(stream::iter(chunks(&["data: partial\n"])));
        assert!(messages.next().await.is_none());
    }
}
