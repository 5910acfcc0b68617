/// Deserializes a coordinate that is either a JSON number or a string in
/// decimal or `D M S` notation.
pub mod coordinate {
    use core::fmt;

    use serde::{
        de::{self, Visitor},
        Deserializer,
    };

    use crate::geo;

    struct CoordinateVisitor;

    impl<'de> Visitor<'de> for CoordinateVisitor {
        type Value = f64;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a number or a coordinate string")
        }

        fn visit_f64<E>(self, value: f64) -> Result<f64, E>
        where
            E: de::Error,
        {
            Ok(value)
        }

        fn visit_i64<E>(self, value: i64) -> Result<f64, E>
        where
            E: de::Error,
        {
            Ok(value as f64)
        }

        fn visit_u64<E>(self, value: u64) -> Result<f64, E>
        where
            E: de::Error,
        {
            Ok(value as f64)
        }

        fn visit_str<E>(self, value: &str) -> Result<f64, E>
        where
            E: de::Error,
        {
            geo::normalize_coordinate(value).map_err(E::custom)
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<f64, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(CoordinateVisitor)
    }
}

/// Best-effort numbers: accepts JSON numbers, numeric strings, empty strings
/// and null. Anything that does not look like a number becomes `None`.
pub mod lenient_number {
    use core::fmt;

    use serde::{
        de::{self, IgnoredAny, MapAccess, SeqAccess, Visitor},
        Deserializer,
    };

    pub fn parse(text: &str) -> Option<f64> {
        text.trim().parse::<f64>().ok().filter(|value| value.is_finite())
    }

    struct LenientVisitor;

    impl<'de> Visitor<'de> for LenientVisitor {
        type Value = Option<f64>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a number, a numeric string or null")
        }

        fn visit_f64<E>(self, value: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(value).filter(|value| value.is_finite()))
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(value as f64))
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(value as f64))
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(parse(value))
        }

        fn visit_bool<E>(self, _: bool) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_some<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
        where
            D: Deserializer<'de>,
        {
            deserializer.deserialize_any(LenientVisitor)
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: SeqAccess<'de>,
        {
            while seq.next_element::<IgnoredAny>()?.is_some() {}
            Ok(None)
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            while map.next_entry::<IgnoredAny, IgnoredAny>()?.is_some() {}
            Ok(None)
        }
    }

    pub fn deserialize_option<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(LenientVisitor)
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Record {
        #[serde(deserialize_with = "super::coordinate::deserialize")]
        latitude: f64,
        #[serde(deserialize_with = "super::lenient_number::deserialize_option", default)]
        speed: Option<f64>,
    }

    #[test]
    fn coordinate_accepts_numbers_and_strings() {
        let record: Record = serde_json::from_str(r#"{"latitude": 27.5}"#).unwrap();
        assert_eq!(record.latitude, 27.5);
        let record: Record = serde_json::from_str(r#"{"latitude": "27.5"}"#).unwrap();
        assert_eq!(record.latitude, 27.5);
        let record: Record = serde_json::from_str(r#"{"latitude": "27 30 0"}"#).unwrap();
        assert_eq!(record.latitude, 27.5);
        assert!(serde_json::from_str::<Record>(r#"{"latitude": "north"}"#).is_err());
    }

    #[test]
    fn lenient_number_never_fails() {
        let cases = [
            (r#"{"latitude": 1, "speed": 12.5}"#, Some(12.5)),
            (r#"{"latitude": 1, "speed": "3"}"#, Some(3.0)),
            (r#"{"latitude": 1, "speed": ""}"#, None),
            (r#"{"latitude": 1, "speed": null}"#, None),
            (r#"{"latitude": 1, "speed": "fast"}"#, None),
            (r#"{"latitude": 1, "speed": [1, 2]}"#, None),
            (r#"{"latitude": 1}"#, None),
        ];
        for (json, expected) in cases {
            let record: Record = serde_json::from_str(json).unwrap();
            assert_eq!(record.speed, expected, "{json}");
        }
    }
}
