use std::{error::Error, fmt};

pub mod backoff;
pub mod cache;
pub mod config;
pub mod decoder;
pub mod locator;
pub mod reducer;
pub mod session;
pub mod transport;

pub use backoff::Backoff;
pub use cache::{Cache, CacheError, FileCache, MemoryCache};
pub use config::{ConfigError, SessionConfig, TrackerConfig};
pub use decoder::{decode, DecodeError, MalformedEncoding};
pub use locator::{FixedLocator, Locator, QueryLocator};
pub use reducer::{Applied, DedupeWindow, Reducer, ReducerConfig};
pub use session::{SessionManager, TrackerHandle};
pub use transport::{Endpoint, EventStream, Transport, TransportError};

#[derive(Debug)]
pub enum TrackingError {
    /// The consumption loop is no longer running.
    SessionGone,
}

impl Error for TrackingError {}

impl fmt::Display for TrackingError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::SessionGone => write!(f, "tracking session is no longer running"),
        }
    }
}

pub type TrackingResult<O> = Result<O, TrackingError>;
