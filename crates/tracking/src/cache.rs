use std::{
    error, fmt, io,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use model::LocationSample;
use serde_json::{Map, Value};

pub const ROUTE_HISTORY_KEY: &str = "routeHistory";

#[derive(Debug, Clone)]
pub enum CacheError {
    Io(Arc<io::Error>),
    Json(Arc<serde_json::Error>),
}

impl error::Error for CacheError {}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CacheError::Io(e) => write!(f, "cache I/O error: {}", e),
            CacheError::Json(e) => write!(f, "cache JSON error: {}", e),
        }
    }
}

impl From<io::Error> for CacheError {
    fn from(e: io::Error) -> Self {
        CacheError::Io(Arc::new(e))
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::Json(Arc::new(e))
    }
}

/// Persistent storage for the route history, read once at startup and
/// rewritten after every accepted sample.
#[async_trait]
pub trait Cache: Send + Sync + 'static {
    async fn load(&self) -> Result<Vec<LocationSample>, CacheError>;

    async fn save(&self, history: &[LocationSample]) -> Result<(), CacheError>;
}

/// Key/value JSON file, one key holding the route history. Other keys in
/// the file are left untouched.
pub struct FileCache {
    path: PathBuf,
    key: String,
}

impl FileCache {
    pub fn new<P: Into<PathBuf>, S: Into<String>>(path: P, key: S) -> Self {
        Self {
            path: path.into(),
            key: key.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_entries(&self) -> Result<Map<String, Value>, CacheError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Map::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(why) if why.kind() == io::ErrorKind::NotFound => Ok(Map::new()),
            Err(why) => Err(why.into()),
        }
    }
}

#[async_trait]
impl Cache for FileCache {
    async fn load(&self) -> Result<Vec<LocationSample>, CacheError> {
        let mut entries = self.read_entries().await?;
        let records = match entries.remove(&self.key) {
            Some(Value::Array(records)) => records,
            // browsers store the history as a serialized string
            Some(Value::String(text)) => serde_json::from_str(&text)?,
            Some(Value::Null) | None => return Ok(vec![]),
            Some(other) => {
                log::warn!("ignoring unexpected `{}` cache entry: {}", self.key, other);
                return Ok(vec![]);
            }
        };

        let total = records.len();
        let history = records
            .into_iter()
            .filter_map(|record| match serde_json::from_value(record) {
                Ok(sample) => Some(sample),
                Err(why) => {
                    log::warn!("skipping cached sample: {}", why);
                    None
                }
            })
            .collect::<Vec<LocationSample>>();
        log::info!(
            "loaded {} of {} cached samples from {}",
            history.len(),
            total,
            self.path.display()
        );
        Ok(history)
    }

    async fn save(&self, history: &[LocationSample]) -> Result<(), CacheError> {
        // an unreadable file is replaced rather than blocking every save
        let mut entries = self.read_entries().await.unwrap_or_else(|why| {
            log::warn!("rewriting unreadable cache {}: {}", self.path.display(), why);
            Map::new()
        });
        entries.insert(self.key.clone(), serde_json::to_value(history)?);
        let bytes = serde_json::to_vec(&entries)?;

        let mut temporary = self.path.clone().into_os_string();
        temporary.push(".tmp");
        let temporary = PathBuf::from(temporary);
        tokio::fs::write(&temporary, bytes).await?;
        tokio::fs::rename(&temporary, &self.path).await?;
        Ok(())
    }
}

/// Keeps the history in memory only.
#[derive(Clone, Default)]
pub struct MemoryCache {
    history: Arc<Mutex<Vec<LocationSample>>>,
}

impl MemoryCache {
    pub fn new(history: Vec<LocationSample>) -> Self {
        Self {
            history: Arc::new(Mutex::new(history)),
        }
    }

    pub fn stored(&self) -> Vec<LocationSample> {
        self.history
            .lock()
            .map(|history| history.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn load(&self) -> Result<Vec<LocationSample>, CacheError> {
        Ok(self.stored())
    }

    async fn save(&self, history: &[LocationSample]) -> Result<(), CacheError> {
        if let Ok(mut stored) = self.history.lock() {
            *stored = history.to_vec();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use model::Timestamp;

    use super::*;

    fn sample(latitude: f64) -> LocationSample {
        LocationSample::new(latitude, 85.0)
            .unwrap()
            .with_timestamp(Timestamp::parse("10:00"))
            .with_speed_knots(Some(3.0))
    }

    #[tokio::test]
    async fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path().join("cache.json"), ROUTE_HISTORY_KEY);
        assert!(cache.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn saves_and_loads_history() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path().join("cache.json"), ROUTE_HISTORY_KEY);
        let history = vec![sample(1.0), sample(2.0)];

        cache.save(&history).await.unwrap();
        assert_eq!(cache.load().await.unwrap(), history);

        cache.save(&history[..1]).await.unwrap();
        assert_eq!(cache.load().await.unwrap(), history[..1].to_vec());
    }

    #[tokio::test]
    async fn keeps_foreign_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, r#"{"theme": "dark"}"#).unwrap();

        let cache = FileCache::new(&path, ROUTE_HISTORY_KEY);
        cache.save(&[sample(1.0)]).await.unwrap();

        let stored: Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(stored["theme"], "dark");
        assert_eq!(stored[ROUTE_HISTORY_KEY][0]["latitude"], 1.0);
    }

    #[tokio::test]
    async fn reads_legacy_records_and_skips_invalid_ones() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let history = r#"[
            {"latitude": "27 39 54", "longitude": "85 16 0", "time": "10:00", "speed": "4", "course": "90"},
            {"latitude": "north", "longitude": "85"},
            {"latitude": 95.0, "longitude": 85.0},
            {"latitude": 27.7, "longitude": 85.3}
        ]"#;
        let stored = serde_json::json!({ "routeHistory": history });
        std::fs::write(&path, stored.to_string()).unwrap();

        let loaded = FileCache::new(&path, ROUTE_HISTORY_KEY).load().await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert!((loaded[0].latitude() - 27.665).abs() < 1e-9);
        assert_eq!(loaded[0].speed_knots(), Some(4.0));
        assert_eq!(loaded[0].course_degrees(), Some(90.0));
        assert_eq!(loaded[1].latitude(), 27.7);
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, "{not json").unwrap();
        let cache = FileCache::new(&path, ROUTE_HISTORY_KEY);

        assert!(matches!(cache.load().await, Err(CacheError::Json(_))));
        cache.save(&[sample(1.0)]).await.unwrap();
        assert_eq!(cache.load().await.unwrap(), vec![sample(1.0)]);
    }
}
