//! Store metadata for tracked apps.
//!
//! [`MetadataSource`] is the seam the checker fetches through; [`MetaClient`]
//! is the HTTP implementation against the Meta Quest store graph.

pub mod client;

pub use client::{FetchError, MetaClient};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::future::Future;

/// Placeholder for fields the store did not return.
pub const UNKNOWN: &str = "Unknown";

/// Build number reported alongside the version string. The store returns
/// it as an integer, older state files may hold it as text. Any other
/// scalar is kept as text; arrays, objects and null read as [`UNKNOWN`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum VersionCode {
    Number(i64),
    Text(String),
}

impl Default for VersionCode {
    fn default() -> Self {
        VersionCode::Text(UNKNOWN.to_string())
    }
}

impl<'de> Deserialize<'de> for VersionCode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::Number(n) => match n.as_i64() {
                Some(code) => VersionCode::Number(code),
                None => VersionCode::Text(n.to_string()),
            },
            Value::String(s) => VersionCode::Text(s),
            Value::Bool(b) => VersionCode::Text(b.to_string()),
            _ => VersionCode::default(),
        })
    }
}

/// Reads an optional field as text, stringifying numbers and booleans.
/// Arrays and objects are treated as absent.
pub(crate) fn deserialize_lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }))
}

impl std::fmt::Display for VersionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VersionCode::Number(n) => write!(f, "{}", n),
            VersionCode::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Normalized metadata for one app, as returned by a successful fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppMetadata {
    pub name: String,
    pub version: String,
    pub version_code: VersionCode,
}

impl AppMetadata {
    pub fn new(name: &str, version: &str, version_code: VersionCode) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            version_code,
        }
    }
}

/// Anything that can look up current metadata for an app id.
///
/// Failures are reported as `None`; implementations log the cause.
pub trait MetadataSource {
    fn fetch(&self, app_id: &str) -> impl Future<Output = Option<AppMetadata>>;
}
