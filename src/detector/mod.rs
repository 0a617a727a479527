//! Version diffing.
//!
//! Versions are compared by exact string equality. No ordering is implied:
//! a store rollback from "1.1" to "1.0" is reported like any other change,
//! and "1.0" vs "1.0.0" counts as a change.

use crate::meta::{AppMetadata, VersionCode};
use crate::store::AppVersionRecord;

/// Old-version label for apps seen for the first time.
pub const NOT_AVAILABLE: &str = "N/A";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// No stored record existed for the app.
    FirstSight,
    /// The stored version string differs from the fetched one.
    Update,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeKind::FirstSight => write!(f, "first_sight"),
            ChangeKind::Update => write!(f, "update"),
        }
    }
}

/// A detected change, carrying everything the notifier needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionChange {
    pub kind: ChangeKind,
    pub app_id: String,
    pub name: String,
    pub old_version: String,
    pub new_version: String,
    pub version_code: VersionCode,
}

pub fn detect(
    app_id: &str,
    previous: Option<&AppVersionRecord>,
    current: &AppMetadata,
) -> Option<VersionChange> {
    let (kind, old_version) = match previous {
        None => (ChangeKind::FirstSight, NOT_AVAILABLE.to_string()),
        Some(prev) if prev.version != current.version => (ChangeKind::Update, prev.version.clone()),
        Some(_) => return None,
    };

    Some(VersionChange {
        kind,
        app_id: app_id.to_string(),
        name: current.name.clone(),
        old_version,
        new_version: current.version.clone(),
        version_code: current.version_code.clone(),
    })
}
