use std::error;
use std::fmt;

pub const EARTH_RADIUS_KM: f64 = 6371.0;

fn to_radians(degrees: f64) -> f64 {
    degrees * std::f64::consts::PI / 180.0
}

/// Reasons a coordinate text could not be turned into a decimal degree value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    Empty,
    /// Neither one decimal token nor three `D M S` tokens.
    TokenCount(usize),
    InvalidNumber(String),
    NotFinite,
}

impl error::Error for FormatError {}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FormatError::Empty => write!(f, "empty coordinate"),
            FormatError::TokenCount(count) => write!(
                f,
                "expected a decimal value or `D M S`, found {} tokens",
                count
            ),
            FormatError::InvalidNumber(token) => {
                write!(f, "`{}` is not a number", token)
            }
            FormatError::NotFinite => write!(f, "coordinate is not a finite number"),
        }
    }
}

pub fn dms_to_decimal(degrees: f64, minutes: f64, seconds: f64) -> f64 {
    degrees + minutes / 60.0 + seconds / 3600.0
}

fn parse_token(token: &str) -> Result<f64, FormatError> {
    let value: f64 = token
        .parse()
        .map_err(|_| FormatError::InvalidNumber(token.to_owned()))?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(FormatError::NotFinite)
    }
}

/// Converts a coordinate given either as a plain decimal (`"27.665"`) or as
/// whitespace separated degrees, minutes and seconds (`"27 39 54"`) into
/// decimal degrees.
///
/// No hemisphere handling takes place: the sign of the degree token is not
/// propagated to the minutes and seconds.
pub fn normalize_coordinate(raw: &str) -> Result<f64, FormatError> {
    let tokens = raw.split_whitespace().collect::<Vec<_>>();
    match tokens.as_slice() {
        [] => Err(FormatError::Empty),
        [decimal] => parse_token(decimal),
        [degrees, minutes, seconds] => {
            let value = dms_to_decimal(
                parse_token(degrees)?,
                parse_token(minutes)?,
                parse_token(seconds)?,
            );
            if value.is_finite() {
                Ok(value)
            } else {
                Err(FormatError::NotFinite)
            }
        }
        other => Err(FormatError::TokenCount(other.len())),
    }
}

pub fn haversine_distance(
    latitude_1: f64,
    longitude_1: f64,
    latitude2: f64,
    longitude_2: f64,
) -> f64 {
    let lat1_rad = to_radians(latitude_1);
    let lon1_rad = to_radians(longitude_1);
    let lat2_rad = to_radians(latitude2);
    let lon2_rad = to_radians(longitude_2);

    let dlat = lat2_rad - lat1_rad;
    let dlon = lon2_rad - lon1_rad;

    let a = (dlat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}
