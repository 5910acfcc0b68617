use std::{error::Error, fmt, time::Duration};

use async_trait::async_trait;
use futures::stream::BoxStream;
use model::DeviceId;
use reqwest::Url;

#[derive(Debug)]
pub enum TransportError {
    /// The server answered with a non-success status code.
    Status(u16),
    /// No connection could be opened within the configured time.
    Timeout(Duration),
    /// The server ended the stream.
    Closed,
    Other(Box<dyn Error + Send + Sync>),
}

impl TransportError {
    pub fn other<T: Error + Send + Sync + 'static>(why: T) -> Self {
        Self::Other(Box::new(why))
    }
}

impl Error for TransportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Other(why) => Some(why.as_ref()),
            _ => None,
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Status(code) => write!(f, "stream answered with status {}", code),
            Self::Timeout(after) => {
                write!(f, "stream did not open within {:?}", after)
            }
            Self::Closed => write!(f, "stream closed by server"),
            Self::Other(why) => write!(f, "{}", why),
        }
    }
}

/// Message payloads of one open connection, in delivery order.
pub type EventStream = BoxStream<'static, Result<String, TransportError>>;

/// Opens event stream connections. Dropping the returned stream closes the
/// connection.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn open(&self, url: &str) -> Result<EventStream, TransportError>;
}

/// Where the stream of a device is subscribed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// `<base_url>/sse/<device>/`
    PerDevice { base_url: String },
    /// One stream regardless of the device.
    Fixed { url: String },
}

impl Endpoint {
    /// The device is pushed as a single percent-encoded path segment.
    pub fn url_for(&self, device: &DeviceId) -> String {
        match self {
            Self::PerDevice { base_url } => {
                let mut url = match Url::parse(base_url) {
                    Ok(url) if !url.cannot_be_a_base() => url,
                    _ => {
                        log::warn!("stream base url `{}` is not a base url", base_url);
                        return format!("{}/sse/{}/", base_url.trim_end_matches('/'), device);
                    }
                };
                if let Ok(mut segments) = url.path_segments_mut() {
                    segments
                        .pop_if_empty()
                        .push("sse")
                        .push(device.as_str())
                        .push("");
                }
                url.to_string()
            }
            Self::Fixed { url } => url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_device_urls() {
        let device = DeviceId::new("356938035643809").unwrap();
        let endpoint = Endpoint::PerDevice {
            base_url: "https://gps.example.com/".to_owned(),
        };
        assert_eq!(
            endpoint.url_for(&device),
            "https://gps.example.com/sse/356938035643809/"
        );

        let endpoint = Endpoint::PerDevice {
            base_url: "http://10.0.0.1:8000/gps".to_owned(),
        };
        assert_eq!(endpoint.url_for(&device), "http://10.0.0.1:8000/gps/sse/356938035643809/");

        let endpoint = Endpoint::Fixed {
            url: "http://10.0.0.1:8000/sse/".to_owned(),
        };
        assert_eq!(endpoint.url_for(&device), "http://10.0.0.1:8000/sse/");
    }

    #[test]
    fn escapes_device_in_path() {
        let endpoint = Endpoint::PerDevice {
            base_url: "https://gps.example.com".to_owned(),
        };
        let url_for = |raw: &str| endpoint.url_for(&DeviceId::new(raw).unwrap());

        assert_eq!(url_for("a?b"), "https://gps.example.com/sse/a%3Fb/");
        assert_eq!(url_for("../admin"), "https://gps.example.com/sse/..%2Fadmin/");
        assert_eq!(url_for("a#b c"), "https://gps.example.com/sse/a%23b%20c/");
    }
}
