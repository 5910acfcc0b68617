//! Turns one raw stream message into a validated [`LocationSample`].
//!
//! Devices send a JSON-like object delimited with single quotes, e.g.
//! `{'latitude': '27 39 54', 'longitude': '85 16 0', 'time': '10:00'}`.
//! All single quotes are replaced by double quotes before parsing, so a value
//! that legitimately contains an apostrophe can not be decoded. Coordinates
//! may be sent in decimal or in the older `D M S` notation.

use std::{error, fmt, sync::Arc};

use model::{LocationSample, RangeError, Timestamp};
use serde_json::{Map, Value};
use utility::{
    geo::{self, FormatError},
    serde::lenient_number,
};

#[derive(Debug, Clone)]
pub enum MalformedEncoding {
    Syntax(Arc<serde_json::Error>),
    NotAnObject,
    Coordinate {
        field: &'static str,
        source: FormatError,
    },
    UnsupportedValue {
        field: &'static str,
    },
}

impl fmt::Display for MalformedEncoding {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Syntax(why) => write!(f, "syntax error: {}", why),
            Self::NotAnObject => write!(f, "payload is not an object"),
            Self::Coordinate { field, source } => write!(f, "{}: {}", field, source),
            Self::UnsupportedValue { field } => {
                write!(f, "{}: expected a string or a number", field)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub enum DecodeError {
    MalformedEncoding(MalformedEncoding),
    MissingField(&'static str),
    OutOfRange { field: &'static str, value: f64 },
}

impl error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::MalformedEncoding(MalformedEncoding::Syntax(why)) => Some(why.as_ref()),
            Self::MalformedEncoding(MalformedEncoding::Coordinate { source, .. }) => {
                Some(source)
            }
            _ => None,
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::MalformedEncoding(why) => write!(f, "malformed message: {}", why),
            Self::MissingField(field) => write!(f, "missing field `{}`", field),
            Self::OutOfRange { field, value } => {
                write!(f, "{} out of range: {}", field, value)
            }
        }
    }
}

impl From<MalformedEncoding> for DecodeError {
    fn from(why: MalformedEncoding) -> Self {
        Self::MalformedEncoding(why)
    }
}

impl From<RangeError> for DecodeError {
    fn from(why: RangeError) -> Self {
        Self::OutOfRange {
            field: why.field,
            value: why.value,
        }
    }
}

pub fn decode(raw: &str) -> Result<LocationSample, DecodeError> {
    let normalized = raw.replace('\'', "\"");
    let value: Value = serde_json::from_str(&normalized)
        .map_err(|why| MalformedEncoding::Syntax(Arc::new(why)))?;
    let Value::Object(fields) = value else {
        return Err(MalformedEncoding::NotAnObject.into());
    };

    let latitude = coordinate(&fields, "latitude")?;
    let longitude = coordinate(&fields, "longitude")?;

    let sample = LocationSample::new(latitude, longitude)?
        .with_timestamp(timestamp(&fields))
        .with_speed_knots(number(&fields, "speed"))
        .with_course_degrees(number(&fields, "course"));
    Ok(sample)
}

fn coordinate(
    fields: &Map<String, Value>,
    field: &'static str,
) -> Result<f64, DecodeError> {
    match fields.get(field) {
        None | Some(Value::Null) => Err(DecodeError::MissingField(field)),
        Some(Value::String(text)) if text.trim().is_empty() => {
            Err(DecodeError::MissingField(field))
        }
        Some(Value::String(text)) => geo::normalize_coordinate(text)
            .map_err(|source| MalformedEncoding::Coordinate { field, source }.into()),
        Some(Value::Number(number)) => number
            .as_f64()
            .ok_or(MalformedEncoding::UnsupportedValue { field }.into()),
        Some(_) => Err(MalformedEncoding::UnsupportedValue { field }.into()),
    }
}

fn number(fields: &Map<String, Value>, field: &str) -> Option<f64> {
    let value = match fields.get(field)? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => lenient_number::parse(text),
        _ => None,
    };
    if value.is_none() {
        log::debug!("ignoring unreadable `{}`: {:?}", field, fields.get(field));
    }
    value
}

fn timestamp(fields: &Map<String, Value>) -> Option<Timestamp> {
    match fields.get("time")? {
        Value::String(text) => Timestamp::parse(text),
        Value::Number(number) => Timestamp::parse(&number.to_string()),
        _ => None,
    }
}
