//! Region identifiers accepted by the stream service.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Default region when none is configured by a host template.
pub const DEFAULT_REGION: &str = "ap-northeast-2";

/// Region identifiers the stream service is known to serve.
pub const KNOWN_REGIONS: &[&str] = &[
    "af-south-1",
    "ap-east-1",
    "ap-northeast-1",
    "ap-northeast-2",
    "ap-northeast-3",
    "ap-south-1",
    "ap-south-2",
    "ap-southeast-1",
    "ap-southeast-2",
    "ap-southeast-3",
    "ap-southeast-4",
    "ca-central-1",
    "cn-north-1",
    "cn-northwest-1",
    "eu-central-1",
    "eu-central-2",
    "eu-north-1",
    "eu-south-1",
    "eu-south-2",
    "eu-west-1",
    "eu-west-2",
    "eu-west-3",
    "il-central-1",
    "me-central-1",
    "me-south-1",
    "sa-east-1",
    "us-east-1",
    "us-east-2",
    "us-gov-east-1",
    "us-gov-west-1",
    "us-west-1",
    "us-west-2",
];

/// A resolved, known region identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Region(String);

impl Region {
    /// Resolve a region name (trimmed, case-insensitive) against [`KNOWN_REGIONS`]
    pub fn resolve(name: &str) -> Option<Self> {
        let normalized = name.trim().to_ascii_lowercase();
        KNOWN_REGIONS
            .iter()
            .find(|known| **known == normalized)
            .map(|known| Self((*known).to_string()))
    }

    /// Region identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Region {
    fn default() -> Self {
        Self(DEFAULT_REGION.to_string())
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Region {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::resolve(&value).ok_or_else(|| format!("'{value}' is not a known region"))
    }
}

impl From<Region> for String {
    fn from(region: Region) -> Self {
        region.0
    }
}
