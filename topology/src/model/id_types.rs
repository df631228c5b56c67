//! Identity types for devices and groups

use serde::{Deserialize, Serialize};
use std::fmt;

/// Macro to generate common ID type implementations
macro_rules! impl_id_type {
    ($name:ident) => {
        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                $name::new(s)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                $name::new(s)
            }
        }
    };
}

/// Provider-assigned identifier of a player, e.g. "RINCON_000E58A0123401400"
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl_id_type!(DeviceId);

/// Zone identifier reported by the provider, stable while the zone persists
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(String);

impl_id_type!(GroupId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", DeviceId::new("RINCON_123")), "RINCON_123");
        assert_eq!(format!("{}", GroupId::new("RINCON_123:0")), "RINCON_123:0");
    }

    #[test]
    fn test_conversions() {
        let from_str: DeviceId = "RINCON_1".into();
        let from_string: DeviceId = String::from("RINCON_1").into();
        assert_eq!(from_str, from_string);
        assert_eq!(from_str.as_str(), "RINCON_1");
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let json = serde_json::to_string(&GroupId::new("RINCON_1:7")).unwrap();
        assert_eq!(json, "\"RINCON_1:7\"");
    }
}
