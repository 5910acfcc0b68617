use std::{env, error, fmt, path::PathBuf, str::FromStr, time::Duration};

use model::{DeviceId, LocationSample};

use crate::{
    backoff::Backoff,
    cache::ROUTE_HISTORY_KEY,
    locator::device_from_query,
    reducer::{self, DedupeWindow, ReducerConfig},
    transport::Endpoint,
};

pub const DEFAULT_STREAM_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_CACHE_PATH: &str = "route_history.json";

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    Invalid { key: &'static str, value: String },
}

impl error::Error for ConfigError {}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::Invalid { key, value } => {
                write!(f, "invalid value for {}: `{}`", key, value)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub endpoint: Endpoint,
    pub backoff: Backoff,
    /// Gives up on a connection attempt that did not open in time.
    pub connect_timeout: Option<Duration>,
    pub queue_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::PerDevice {
                base_url: DEFAULT_STREAM_BASE_URL.to_owned(),
            },
            backoff: Backoff::default(),
            connect_timeout: Some(Duration::from_secs(15)),
            queue_capacity: 32,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackerConfig {
    pub session: SessionConfig,
    pub reducer: ReducerConfig,
    /// Page URL or query string carrying the `imei` parameter.
    pub page_url: Option<String>,
    /// Takes precedence over `page_url`.
    pub device: Option<DeviceId>,
    pub cache_path: PathBuf,
    pub cache_key: String,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            reducer: ReducerConfig::default(),
            page_url: None,
            device: None,
            cache_path: PathBuf::from(DEFAULT_CACHE_PATH),
            cache_key: ROUTE_HISTORY_KEY.to_owned(),
        }
    }
}

impl TrackerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from `TRACKER_*` variables provided by
    /// `lookup`. Unset variables keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut config = Self::default();

        if let Some(url) = lookup("TRACKER_STREAM_URL") {
            config.session.endpoint = Endpoint::Fixed { url };
        } else if let Some(base_url) = lookup("TRACKER_STREAM_BASE_URL") {
            config.session.endpoint = Endpoint::PerDevice { base_url };
        }
        if let Some(initial) = parse::<u64>(&lookup, "TRACKER_BACKOFF_INITIAL_MS")? {
            config.session.backoff.initial = Duration::from_millis(initial);
        }
        if let Some(max) = parse::<u64>(&lookup, "TRACKER_BACKOFF_MAX_MS")? {
            config.session.backoff.max = Duration::from_millis(max);
        }
        if let Some(secs) = parse::<u64>(&lookup, "TRACKER_CONNECT_TIMEOUT_SECS")? {
            config.session.connect_timeout =
                Some(Duration::from_secs(secs)).filter(|timeout| !timeout.is_zero());
        }
        if let Some(capacity) = parse::<usize>(&lookup, "TRACKER_QUEUE_CAPACITY")? {
            if capacity == 0 {
                return Err(invalid("TRACKER_QUEUE_CAPACITY", "0"));
            }
            config.session.queue_capacity = capacity;
        }

        config.page_url = lookup("TRACKER_PAGE_URL");
        config.device = lookup("TRACKER_IMEI").and_then(DeviceId::new);
        if let Some(path) = lookup("TRACKER_CACHE_PATH") {
            config.cache_path = PathBuf::from(path);
        }
        if let Some(key) = lookup("TRACKER_CACHE_KEY") {
            config.cache_key = key;
        }

        if let Some(resume) = parse::<bool>(&lookup, "TRACKER_RESUME_FROM_CACHE")? {
            config.reducer.resume_from_cache = resume;
        }
        config.reducer.max_history_length = parse(&lookup, "TRACKER_MAX_HISTORY")?;
        if config.reducer.max_history_length == Some(0) {
            return Err(invalid("TRACKER_MAX_HISTORY", "0"));
        }
        if let Some(secs) = parse::<f64>(&lookup, "TRACKER_DEDUPE_WINDOW_SECS")? {
            let max_age = Duration::try_from_secs_f64(secs)
                .map_err(|_| invalid("TRACKER_DEDUPE_WINDOW_SECS", secs))?;
            config.reducer.dedupe = Some(DedupeWindow {
                max_age,
                max_distance_m: parse(&lookup, "TRACKER_DEDUPE_DISTANCE_M")?
                    .unwrap_or(1.0),
            });
        }
        config.reducer.default_position = default_position(&lookup)?;

        Ok(config)
    }

    /// The explicitly configured device, else the one found in the page URL.
    pub fn initial_device(&self) -> Option<DeviceId> {
        self.device
            .clone()
            .or_else(|| self.page_url.as_deref().and_then(device_from_query))
    }
}

fn default_position<F>(lookup: &F) -> Result<LocationSample, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let fallback = reducer::default_position();
    let latitude =
        parse(lookup, "TRACKER_DEFAULT_LATITUDE")?.unwrap_or(fallback.latitude());
    let longitude =
        parse(lookup, "TRACKER_DEFAULT_LONGITUDE")?.unwrap_or(fallback.longitude());
    LocationSample::new(latitude, longitude)
        .map_err(|why| invalid("TRACKER_DEFAULT_LATITUDE/LONGITUDE", why.value))
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    lookup(key)
        .map(|value| match value.trim().parse::<T>() {
            Ok(parsed) => Ok(parsed),
            Err(_) => Err(invalid(key, value)),
        })
        .transpose()
}

fn invalid(key: &'static str, value: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<TrackerConfig, ConfigError> {
        let vars = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect::<HashMap<_, _>>();
        TrackerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_without_variables() {
        assert_eq!(config(&[]).unwrap(), TrackerConfig::default());
        assert_eq!(config(&[]).unwrap().initial_device(), None);
    }

    #[test]
    fn reads_stream_and_history_settings() {
        let config = config(&[
            ("TRACKER_STREAM_BASE_URL", "https://gps.example.com"),
            ("TRACKER_PAGE_URL", "https://gps.example.com/?imei=123"),
            ("TRACKER_MAX_HISTORY", "500"),
            ("TRACKER_DEDUPE_WINDOW_SECS", "2.5"),
            ("TRACKER_RESUME_FROM_CACHE", "false"),
            ("TRACKER_CONNECT_TIMEOUT_SECS", "0"),
            ("TRACKER_BACKOFF_MAX_MS", "10000"),
        ])
        .unwrap();

        assert_eq!(
            config.session.endpoint,
            Endpoint::PerDevice {
                base_url: "https://gps.example.com".to_owned()
            }
        );
        assert_eq!(config.initial_device(), DeviceId::new("123"));
        assert_eq!(config.reducer.max_history_length, Some(500));
        assert_eq!(
            config.reducer.dedupe,
            Some(DedupeWindow {
                max_age: Duration::from_millis(2500),
                max_distance_m: 1.0,
            })
        );
        assert!(!config.reducer.resume_from_cache);
        assert_eq!(config.session.connect_timeout, None);
        assert_eq!(config.session.backoff.max, Duration::from_secs(10));
    }

    #[test]
    fn fixed_url_and_explicit_device_take_precedence() {
        let config = config(&[
            ("TRACKER_STREAM_URL", "http://10.0.0.1:8000/sse/"),
            ("TRACKER_STREAM_BASE_URL", "https://gps.example.com"),
            ("TRACKER_PAGE_URL", "?imei=123"),
            ("TRACKER_IMEI", "456"),
        ])
        .unwrap();
        assert_eq!(
            config.session.endpoint,
            Endpoint::Fixed {
                url: "http://10.0.0.1:8000/sse/".to_owned()
            }
        );
        assert_eq!(config.initial_device(), DeviceId::new("456"));
    }

    #[test]
    fn rejects_invalid_values() {
        assert_eq!(
            config(&[("TRACKER_MAX_HISTORY", "lots")]),
            Err(ConfigError::Invalid {
                key: "TRACKER_MAX_HISTORY",
                value: "lots".to_owned()
            })
        );
        assert!(config(&[("TRACKER_QUEUE_CAPACITY", "0")]).is_err());
        assert_eq!(
            config(&[("TRACKER_MAX_HISTORY", "0")]),
            Err(ConfigError::Invalid {
                key: "TRACKER_MAX_HISTORY",
                value: "0".to_owned()
            })
        );
        assert!(config(&[("TRACKER_DEDUPE_WINDOW_SECS", "-1")]).is_err());
        assert!(config(&[("TRACKER_DEFAULT_LATITUDE", "123")]).is_err());
    }
}
