//! Persisted action log of one migration run.
//!
//! Artifact: `<migration_dir>/migration_<collection>_<tag>.json`, holding
//! `{ tag, collection, createdAt, actions }`. The whole file is rewritten
//! atomically after every recorded action, so the artifact on disk always
//! reflects every completed action and is never torn.

use super::action::ActionRecord;
use super::tag::RunTag;
use crate::core::fsutil::write_atomic;
use crate::core::{MigrateError, Result};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const FILE_PREFIX: &str = "migration_";
const FILE_SUFFIX: &str = ".json";

/// Receives each action as soon as it has been applied.
pub trait ActionSink: Send {
    fn record(&mut self, action: ActionRecord) -> Result<()>;
}

impl ActionSink for Vec<ActionRecord> {
    fn record(&mut self, action: ActionRecord) -> Result<()> {
        self.push(action);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationLog {
    pub tag: RunTag,
    pub collection: String,
    pub created_at: String,
    #[serde(default)]
    pub actions: Vec<ActionRecord>,
}

impl MigrationLog {
    pub fn new(collection: &str, tag: RunTag) -> Self {
        Self {
            tag,
            collection: collection.to_string(),
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            actions: Vec::new(),
        }
    }

    pub fn file_name(collection: &str, tag: &RunTag) -> String {
        format!("{}{}_{}{}", FILE_PREFIX, path_safe(collection), tag, FILE_SUFFIX)
    }

    pub fn path(dir: &Path, collection: &str, tag: &RunTag) -> PathBuf {
        dir.join(Self::file_name(collection, tag))
    }

    pub fn load(dir: &Path, collection: &str, tag: &RunTag) -> Result<Self> {
        let path = Self::path(dir, collection, tag);
        if !path.is_file() {
            return Err(MigrateError::MigrationLogNotFound(path.display().to_string()));
        }
        let text = fs::read_to_string(&path)?;
        serde_json::from_str(&text).map_err(|e| {
            MigrateError::Serialization(format!("Corrupt migration log {}: {}", path.display(), e))
        })
    }

    /// Tags of every run recorded for a collection, oldest first.
    pub fn list_tags(dir: &Path, collection: &str) -> Result<Vec<RunTag>> {
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let prefix = format!("{}{}_", FILE_PREFIX, path_safe(collection));
        let mut tags = Vec::new();
        for entry in fs::read_dir(dir)? {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(tag) = name
                .strip_prefix(&prefix)
                .and_then(|rest| rest.strip_suffix(FILE_SUFFIX))
            else {
                continue;
            };
            // Tags start with the year; this skips collections that merely
            // share a prefix, e.g. `users_archive` when listing `users`.
            if tag.starts_with(|c: char| c.is_ascii_digit()) {
                tags.push(RunTag::new(tag));
            }
        }
        tags.sort();
        Ok(tags)
    }
}

fn path_safe(component: &str) -> String {
    component.replace(['/', '\\'], "_")
}

/// Owns the log of the run in progress and persists it on every entry.
pub struct MigrationLogWriter {
    path: PathBuf,
    log: MigrationLog,
}

impl MigrationLogWriter {
    /// Creates the migration directory and writes the empty log.
    pub fn create(dir: &Path, collection: &str, tag: RunTag) -> Result<Self> {
        fs::create_dir_all(dir).map_err(|e| {
            MigrateError::Io(format!("Failed to create migration directory {}: {}", dir.display(), e))
        })?;
        let path = MigrationLog::path(dir, collection, &tag);
        let writer = Self { path, log: MigrationLog::new(collection, tag) };
        writer.persist()?;
        Ok(writer)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn log(&self) -> &MigrationLog {
        &self.log
    }

    pub fn into_log(self) -> MigrationLog {
        self.log
    }

    fn persist(&self) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(&self.log)?;
        write_atomic(&self.path, &bytes)
    }
}

impl ActionSink for MigrationLogWriter {
    fn record(&mut self, action: ActionRecord) -> Result<()> {
        self.log.actions.push(action);
        self.persist()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Document, DocumentId};
    use tempfile::TempDir;

    #[test]
    fn test_file_name() {
        let tag = RunTag::new("2024-01-01T00:00:00.000Z");
        assert_eq!(
            MigrationLog::file_name("users", &tag),
            "migration_users_2024-01-01T00_00_00_000Z.json"
        );
        assert_eq!(
            MigrationLog::file_name("../etc", &tag),
            "migration_.._etc_2024-01-01T00_00_00_000Z.json"
        );
    }

    #[test]
    fn test_every_record_is_on_disk() {
        let temp_dir = TempDir::new().unwrap();
        let tag = RunTag::new("2024-01-01T00_00_00_000Z");
        let mut writer = MigrationLogWriter::create(temp_dir.path(), "users", tag.clone()).unwrap();

        let empty = MigrationLog::load(temp_dir.path(), "users", &tag).unwrap();
        assert!(empty.actions.is_empty());
        assert_eq!(empty.collection, "users");

        writer
            .record(ActionRecord::insert("users", DocumentId::new("1"), Document::new()))
            .unwrap();
        writer
            .record(ActionRecord::insert("users", DocumentId::new("2"), Document::new()))
            .unwrap();

        let loaded = MigrationLog::load(temp_dir.path(), "users", &tag).unwrap();
        assert_eq!(&loaded, writer.log());
        assert_eq!(loaded.actions[1].id_text().as_deref(), Some("2"));
    }

    #[test]
    fn test_artifact_uses_camel_case_keys() {
        let temp_dir = TempDir::new().unwrap();
        let writer =
            MigrationLogWriter::create(temp_dir.path(), "users", RunTag::new("2024")).unwrap();
        let text = fs::read_to_string(writer.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert!(value.get("createdAt").is_some());
        assert_eq!(value["tag"], "2024");
        assert!(text.contains("\n  \"tag\""));
    }

    #[test]
    fn test_missing_log() {
        let temp_dir = TempDir::new().unwrap();
        let err = MigrationLog::load(temp_dir.path(), "users", &RunTag::new("nope")).unwrap_err();
        assert!(matches!(err, MigrateError::MigrationLogNotFound(_)));
    }

    #[test]
    fn test_list_tags() {
        let temp_dir = TempDir::new().unwrap();
        for (collection, tag) in [
            ("users", "2024-02-01T00_00_00_000Z"),
            ("users", "2024-01-01T00_00_00_000Z"),
            ("users_archive", "2024-03-01T00_00_00_000Z"),
            ("orders", "2024-04-01T00_00_00_000Z"),
        ] {
            MigrationLogWriter::create(temp_dir.path(), collection, RunTag::new(tag)).unwrap();
        }

        let tags = MigrationLog::list_tags(temp_dir.path(), "users").unwrap();
        assert_eq!(
            tags,
            vec![
                RunTag::new("2024-01-01T00_00_00_000Z"),
                RunTag::new("2024-02-01T00_00_00_000Z"),
            ]
        );
        assert!(MigrationLog::list_tags(&temp_dir.path().join("none"), "users").unwrap().is_empty());
    }
}
