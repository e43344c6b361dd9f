use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

use crate::error::{ModelError, Result};

/// Cloud region name.
///
/// Only emptiness is checked here. Whether the name is a region the
/// partition actually serves is decided when a client endpoint is built.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "String", into = "String")
)]
pub struct Region(String);

impl Region {
    pub fn try_new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ModelError::EmptyRegion);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Region {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Region {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Region {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self> {
        Self::try_new(value)
    }
}

impl FromStr for Region {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        Self::try_new(s)
    }
}

impl From<Region> for String {
    fn from(value: Region) -> Self {
        value.0
    }
}
