//! On-disk store of the last-seen version per tracked app.
//!
//! File layout: one pretty-printed JSON object keyed by app id.
//!   {
//!     "4979055762136823": {
//!       "id": "4979055762136823",
//!       "name": "Gorilla Tag",
//!       "version": "1.1.98",
//!       "version_code": 1098,
//!       "last_checked": "2025-10-08T12:00:00Z"
//!     }
//!   }
//!
//! The whole map is rewritten at the end of every cycle through a temp file
//! and rename, so readers only ever see a complete snapshot.

use crate::meta::{AppMetadata, VersionCode, UNKNOWN};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("corrupt version store {path}: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to encode version store: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Last-known snapshot of one app.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppVersionRecord {
    /// Older state files omit this; it is filled from the map key on load.
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub version_code: VersionCode,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub last_checked: DateTime<Utc>,
}

impl AppVersionRecord {
    pub fn from_metadata(app_id: &str, metadata: &AppMetadata, checked_at: DateTime<Utc>) -> Self {
        Self {
            id: app_id.to_string(),
            name: metadata.name.clone(),
            version: metadata.version.clone(),
            version_code: metadata.version_code.clone(),
            last_checked: checked_at,
        }
    }
}

/// Accepts RFC 3339 and naive ISO-8601 timestamps (read as UTC).
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if let Ok(dt) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(serde::de::Error::custom)
}

/// One value in the state file: a full record, or a bare version string as
/// written by older checkers (`{"<app_id>": "<version>"}`).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StoredEntry {
    Record(AppVersionRecord),
    Version(String),
}

impl StoredEntry {
    fn into_record(self, app_id: &str, loaded_at: DateTime<Utc>) -> AppVersionRecord {
        match self {
            StoredEntry::Record(mut record) => {
                if record.id.is_empty() {
                    record.id = app_id.to_string();
                }
                record
            }
            StoredEntry::Version(version) => AppVersionRecord {
                id: app_id.to_string(),
                name: UNKNOWN.to_string(),
                version,
                version_code: VersionCode::default(),
                last_checked: loaded_at,
            },
        }
    }
}

/// App id → last-known record.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct VersionStore {
    records: BTreeMap<String, AppVersionRecord>,
}

impl VersionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the store from `path`. A missing file is an empty store; a file
    /// that does not parse is an error. Bare version strings are upgraded to
    /// records stamped with the load time.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no previous versions found, starting fresh");
                return Ok(Self::new());
            }
            Err(source) => {
                return Err(StoreError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let entries: BTreeMap<String, StoredEntry> =
            serde_json::from_str(&contents).map_err(|source| StoreError::Corrupt {
                path: path.to_path_buf(),
                source,
            })?;

        let loaded_at = Utc::now();
        let records = entries
            .into_iter()
            .map(|(id, entry)| {
                let record = entry.into_record(&id, loaded_at);
                (id, record)
            })
            .collect();
        let store = VersionStore { records };

        info!(path = %path.display(), apps = store.len(), "loaded version store");
        Ok(store)
    }

    /// Replace the file at `path` with this store.
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(self)?;
        let io_err = |source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, &json).map_err(io_err)?;
        std::fs::rename(&tmp, path).map_err(io_err)?;

        debug!(path = %path.display(), apps = self.len(), "saved version store");
        Ok(())
    }

    pub fn get(&self, app_id: &str) -> Option<&AppVersionRecord> {
        self.records.get(app_id)
    }

    /// Insert or overwrite the record for `record.id`.
    pub fn upsert(&mut self, record: AppVersionRecord) {
        self.records.insert(record.id.clone(), record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn record(id: &str, version: &str) -> AppVersionRecord {
        AppVersionRecord {
            id: id.to_string(),
            name: format!("App {}", id),
            version: version.to_string(),
            version_code: VersionCode::Number(7),
            last_checked: Utc.with_ymd_and_hms(2025, 10, 8, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = VersionStore::load(&dir.path().join("versions.json")).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_corrupt_file_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("versions.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            VersionStore::load(&path),
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state").join("versions.json");

        let mut store = VersionStore::new();
        store.upsert(record("A", "1.0"));
        store.upsert(record("B", "2.0"));
        store.save(&path).unwrap();

        assert!(!path.with_extension("tmp").exists());
        let loaded = VersionStore::load(&path).unwrap();
        assert_eq!(loaded, store);
        assert_eq!(loaded.ids().collect::<Vec<_>>(), vec!["A", "B"]);
    }

    #[test]
    fn test_save_is_pretty_json_object() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("versions.json");

        let mut store = VersionStore::new();
        store.upsert(record("A", "1.0"));
        store.save(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains('\n'));
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["A"]["version"], "1.0");
        assert_eq!(value["A"]["version_code"], 7);
        assert_eq!(value["A"]["last_checked"], "2025-10-08T12:00:00Z");
    }

    #[test]
    fn test_save_overwrites_whole_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("versions.json");

        let mut first = VersionStore::new();
        first.upsert(record("A", "1.0"));
        first.upsert(record("B", "1.0"));
        first.save(&path).unwrap();

        let mut second = VersionStore::new();
        second.upsert(record("A", "1.1"));
        second.save(&path).unwrap();

        let loaded = VersionStore::load(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.get("A").unwrap().version, "1.1");
    }

    #[test]
    fn test_loads_legacy_records() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("versions.json");
        std::fs::write(
            &path,
            r#"{
  "8485526434899813": {
    "name": "ug",
    "version": "0.9.1",
    "version_code": "Unknown",
    "last_checked": "2025-10-08T12:34:56.789012"
  }
}"#,
        )
        .unwrap();

        let store = VersionStore::load(&path).unwrap();
        let rec = store.get("8485526434899813").unwrap();
        assert_eq!(rec.id, "8485526434899813");
        assert_eq!(rec.version, "0.9.1");
        assert_eq!(rec.version_code, VersionCode::Text("Unknown".into()));
        assert_eq!(
            rec.last_checked.format("%Y-%m-%d %H:%M:%S").to_string(),
            "2025-10-08 12:34:56"
        );
    }

    #[test]
    fn test_loads_flat_legacy_versions() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("versions.json");
        std::fs::write(
            &path,
            r#"{
  "8485526434899813": "0.9.1",
  "4979055762136823": {
    "name": "Gorilla Tag",
    "version": "1.1.98",
    "version_code": 1098,
    "last_checked": "2025-10-08T12:00:00Z"
  }
}"#,
        )
        .unwrap();

        let store = VersionStore::load(&path).unwrap();
        assert_eq!(store.len(), 2);

        let flat = store.get("8485526434899813").unwrap();
        assert_eq!(flat.id, "8485526434899813");
        assert_eq!(flat.name, UNKNOWN);
        assert_eq!(flat.version, "0.9.1");
        assert_eq!(flat.version_code, VersionCode::default());

        let full = store.get("4979055762136823").unwrap();
        assert_eq!(full.version, "1.1.98");
        assert_eq!(full.version_code, VersionCode::Number(1098));

        // next save writes full records
        store.save(&path).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["8485526434899813"]["version"], "0.9.1");
        assert_eq!(value["8485526434899813"]["id"], "8485526434899813");
    }

    #[test]
    fn test_non_string_non_record_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("versions.json");
        std::fs::write(&path, r#"{ "1": 42 }"#).unwrap();
        assert!(matches!(
            VersionStore::load(&path),
            Err(StoreError::Corrupt { .. })
        ));
    }
}
