use super::filter::Filter;
use super::memory::{MemoryStore, push_document};
use super::{DocumentStore, StoreConnector};
use crate::core::fsutil::write_atomic;
use crate::core::{Document, DocumentId, MigrateError, Result, into_document};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Database kept as `<root>/<database>/<collection>.json`, each file a JSON
/// array of documents.
///
/// The directory is loaded once on connect. Every write rewrites the
/// affected collection file atomically before returning.
pub struct FileStore {
    dir: PathBuf,
    inner: MemoryStore,
}

impl FileStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| {
            MigrateError::Store(format!("Failed to create store directory {}: {}", dir.display(), e))
        })?;

        let mut collections = HashMap::new();
        let entries = fs::read_dir(&dir).map_err(|e| {
            MigrateError::Store(format!("Failed to read store directory {}: {}", dir.display(), e))
        })?;
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            collections.insert(name.to_string(), load_collection(&path, name)?);
        }

        let store = Self { dir, inner: MemoryStore::from_collections(collections) };
        debug!(dir = %store.dir.display(), "opened file store");
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn collection_path(&self, collection: &str) -> PathBuf {
        self.dir.join(format!("{}.json", collection))
    }

    async fn flush(&self, collection: &str) -> Result<()> {
        let docs = self.inner.collection(collection).await;
        let bytes = serde_json::to_vec_pretty(&docs)?;
        write_atomic(&self.collection_path(collection), &bytes)
            .map_err(|e| MigrateError::Store(format!("Failed to persist '{}': {}", collection, e)))
    }
}

/// Reads a collection file. Documents written without an `_id` are given
/// one and the file is rewritten, so every later open sees the same ids.
fn load_collection(path: &Path, collection: &str) -> Result<Vec<Document>> {
    let text = fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&text).map_err(|e| {
        MigrateError::Store(format!("Corrupt collection file {}: {}", path.display(), e))
    })?;
    let Value::Array(items) = value else {
        return Err(MigrateError::Store(format!(
            "Collection file {} must hold a JSON array",
            path.display()
        )));
    };

    let mut docs = Vec::with_capacity(items.len());
    let mut assigned = 0;
    for item in items {
        let document = into_document(item)?;
        if DocumentId::of(&document).is_none() {
            assigned += 1;
        }
        push_document(&mut docs, collection, document)?;
    }

    if assigned > 0 {
        let bytes = serde_json::to_vec_pretty(&docs)?;
        write_atomic(path, &bytes)
            .map_err(|e| MigrateError::Store(format!("Failed to persist '{}': {}", collection, e)))?;
        debug!(collection, assigned, "assigned ids to documents without _id");
    }
    Ok(docs)
}

#[async_trait]
impl DocumentStore for FileStore {
    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Document>> {
        self.inner.find_one(collection, filter).await
    }

    async fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>> {
        self.inner.find(collection, filter).await
    }

    async fn insert_one(&self, collection: &str, document: Document) -> Result<DocumentId> {
        let id = self.inner.insert_one(collection, document).await?;
        self.flush(collection).await?;
        Ok(id)
    }

    async fn update_set(&self, collection: &str, id: &DocumentId, fields: &Document) -> Result<bool> {
        let matched = self.inner.update_set(collection, id, fields).await?;
        if matched {
            self.flush(collection).await?;
        }
        Ok(matched)
    }

    async fn replace(&self, collection: &str, id: &DocumentId, document: Document) -> Result<bool> {
        let matched = self.inner.replace(collection, id, document).await?;
        if matched {
            self.flush(collection).await?;
        }
        Ok(matched)
    }

    async fn delete(&self, collection: &str, id: &DocumentId) -> Result<bool> {
        let matched = self.inner.delete(collection, id).await?;
        if matched {
            self.flush(collection).await?;
        }
        Ok(matched)
    }

    async fn close(&self) -> Result<()> {
        debug!(dir = %self.dir.display(), "closed file store");
        Ok(())
    }
}

/// Opens file stores under a root directory, one subdirectory per database.
#[derive(Debug, Clone)]
pub struct FileConnector {
    root: PathBuf,
}

impl FileConnector {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl StoreConnector for FileConnector {
    async fn connect(&self, database: &str) -> Result<Box<dyn DocumentStore>> {
        if database.is_empty() || database.contains(['/', '\\']) || database == ".." {
            return Err(MigrateError::Configuration(format!(
                "invalid database name '{}'",
                database
            )));
        }
        Ok(Box::new(FileStore::open(self.root.join(database))?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_writes_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let connector = FileConnector::new(temp_dir.path());

        let id = {
            let store = connector.connect("app").await.unwrap();
            let id = store.insert_one("users", doc(json!({"name": "Ann"}))).await.unwrap();
            store
                .update_set("users", &id, &doc(json!({"role": "admin"})))
                .await
                .unwrap();
            store.close().await.unwrap();
            id
        };

        assert!(temp_dir.path().join("app").join("users.json").exists());

        let store = connector.connect("app").await.unwrap();
        let found = store
            .find_one("users", &doc(json!({"role": "admin"})))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(DocumentId::of(&found), Some(id.clone()));

        store.delete("users", &id).await.unwrap();
        let store = connector.connect("app").await.unwrap();
        assert!(store.find("users", &Filter::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_collection_file_is_a_store_error() {
        let temp_dir = TempDir::new().unwrap();
        let db_dir = temp_dir.path().join("app");
        fs::create_dir_all(&db_dir).unwrap();
        fs::write(db_dir.join("users.json"), "{not json").unwrap();

        let err = FileConnector::new(temp_dir.path()).connect("app").await.err().unwrap();
        assert!(matches!(err, MigrateError::Store(_)));
    }

    #[tokio::test]
    async fn test_documents_without_id_get_a_stable_id() {
        let temp_dir = TempDir::new().unwrap();
        let db_dir = temp_dir.path().join("app");
        fs::create_dir_all(&db_dir).unwrap();
        fs::write(db_dir.join("users.json"), r#"[{"email": "a@x.com"}, {"_id": 7, "email": "b@x.com"}]"#)
            .unwrap();

        let first = FileStore::open(&db_dir).unwrap();
        let users = first.find("users", &Filter::new()).await.unwrap();
        let assigned = DocumentId::of(&users[0]).unwrap();
        assert_eq!(assigned.as_str().map(str::len), Some(24));
        assert_eq!(users[1]["_id"], json!(7));

        let reopened = FileStore::open(&db_dir).unwrap();
        let users = reopened.find("users", &Filter::new()).await.unwrap();
        assert_eq!(DocumentId::of(&users[0]), Some(assigned));
    }

    #[tokio::test]
    async fn test_duplicate_ids_in_file_are_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let db_dir = temp_dir.path().join("app");
        fs::create_dir_all(&db_dir).unwrap();
        fs::write(db_dir.join("users.json"), r#"[{"_id": "1"}, {"_id": "1"}]"#).unwrap();

        assert!(matches!(FileStore::open(&db_dir), Err(MigrateError::Store(_))));
    }

    #[tokio::test]
    async fn test_rejects_path_like_database_names() {
        let temp_dir = TempDir::new().unwrap();
        let connector = FileConnector::new(temp_dir.path());
        assert!(connector.connect("../escape").await.is_err());
        assert!(connector.connect("").await.is_err());
    }
}
