use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Identifies the remote device whose stream is tracked (its IMEI).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Blank identifiers are treated as absent.
    pub fn new<S: AsRef<str>>(raw: S) -> Option<Self> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_owned()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_identifiers_are_absent() {
        assert_eq!(DeviceId::new(""), None);
        assert_eq!(DeviceId::new("  \t"), None);
        assert_eq!(
            DeviceId::new(" 356938035643809 ").unwrap().as_str(),
            "356938035643809"
        );
    }
}
