use std::{error, fmt};

use chrono::{DateTime, FixedOffset, NaiveTime};
use schemars::JsonSchema;
use serde::{de::Error as DeError, Deserialize, Deserializer, Serialize};
use utility::serde::{coordinate, lenient_number};

use crate::ExampleData;

/// A coordinate or reading outside of the range it is defined for.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeError {
    pub field: &'static str,
    pub value: f64,
}

impl error::Error for RangeError {}

impl fmt::Display for RangeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} out of range: {}", self.field, self.value)
    }
}

/// Time of a fix as reported by the device.
///
/// Devices either send a full RFC 3339 date time or only their own clock
/// text (e.g. `10:00`). The latter is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum Timestamp {
    Structured(DateTime<FixedOffset>),
    Text(String),
}

impl Timestamp {
    /// Returns `None` for blank text.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        Some(match DateTime::parse_from_rfc3339(text) {
            Ok(date_time) => Self::Structured(date_time),
            Err(_) => Self::Text(text.to_owned()),
        })
    }

    pub fn time_of_day(&self) -> Option<NaiveTime> {
        match self {
            Self::Structured(date_time) => Some(date_time.time()),
            Self::Text(text) => NaiveTime::parse_from_str(text, "%H:%M:%S")
                .or_else(|_| NaiveTime::parse_from_str(text, "%H:%M"))
                .ok(),
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Structured(date_time) => write!(f, "{}", date_time.to_rfc3339()),
            Self::Text(text) => write!(f, "{}", text),
        }
    }
}

/// One validated position fix.
///
/// Serialized with the field names the device stream uses (`time`, `speed`,
/// `course`), which is also the record shape of the route history cache.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct LocationSample {
    latitude: f64,
    longitude: f64,
    #[serde(rename = "time")]
    timestamp: Option<Timestamp>,
    #[serde(rename = "speed")]
    speed_knots: Option<f64>,
    #[serde(rename = "course")]
    course_degrees: Option<f64>,
}

impl LocationSample {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, RangeError> {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(RangeError {
                field: "latitude",
                value: latitude,
            });
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(RangeError {
                field: "longitude",
                value: longitude,
            });
        }
        Ok(Self {
            latitude,
            longitude,
            timestamp: None,
            speed_knots: None,
            course_degrees: None,
        })
    }

    pub fn with_timestamp(mut self, timestamp: Option<Timestamp>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Negative or non-finite speeds are dropped.
    pub fn with_speed_knots(mut self, speed_knots: Option<f64>) -> Self {
        self.speed_knots =
            speed_knots.filter(|speed| speed.is_finite() && *speed >= 0.0);
        self
    }

    /// Courses are wrapped into `[0, 360)`.
    pub fn with_course_degrees(mut self, course_degrees: Option<f64>) -> Self {
        self.course_degrees = course_degrees
            .filter(|course| course.is_finite())
            .map(|course| match course.rem_euclid(360.0) {
                wrapped if wrapped >= 360.0 => 0.0,
                wrapped => wrapped,
            });
        self
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn timestamp(&self) -> Option<&Timestamp> {
        self.timestamp.as_ref()
    }

    pub fn speed_knots(&self) -> Option<f64> {
        self.speed_knots
    }

    pub fn course_degrees(&self) -> Option<f64> {
        self.course_degrees
    }
}

impl ExampleData for LocationSample {
    fn example_data() -> Self {
        Self {
            latitude: 27.66525,
            longitude: 85.26676,
            timestamp: Some(Timestamp::Text("10:00:00".to_owned())),
            speed_knots: Some(12.5),
            course_degrees: Some(270.0),
        }
    }
}

/// Lenient wire shape of a stored sample.
///
/// Older caches stored the coordinates exactly as received, i.e. as decimal
/// or `D M S` strings, and speed and course as strings.
#[derive(Debug, Clone, Deserialize)]
pub struct LocationRecord {
    #[serde(deserialize_with = "coordinate::deserialize")]
    pub latitude: f64,
    #[serde(deserialize_with = "coordinate::deserialize")]
    pub longitude: f64,
    #[serde(default)]
    pub time: Option<Timestamp>,
    #[serde(default, deserialize_with = "lenient_number::deserialize_option")]
    pub speed: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number::deserialize_option")]
    pub course: Option<f64>,
}

impl TryFrom<LocationRecord> for LocationSample {
    type Error = RangeError;

    fn try_from(record: LocationRecord) -> Result<Self, Self::Error> {
        let timestamp = record.time.and_then(|time| match time {
            Timestamp::Text(text) => Timestamp::parse(&text),
            structured => Some(structured),
        });
        Ok(LocationSample::new(record.latitude, record.longitude)?
            .with_timestamp(timestamp)
            .with_speed_knots(record.speed)
            .with_course_degrees(record.course))
    }
}

impl<'de> Deserialize<'de> for LocationSample {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let record = LocationRecord::deserialize(deserializer)?;
        LocationSample::try_from(record).map_err(DeError::custom)
    }
}
