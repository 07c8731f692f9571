use super::filter::{self, Filter};
use super::{DocumentStore, StoreConnector};
use crate::core::{Document, DocumentId, ID_FIELD, MigrateError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;

/// In-memory database. Clones share the same collections, so a test can
/// keep a handle and inspect what a migration wrote through its own.
#[derive(Clone, Default)]
pub struct MemoryStore {
    collections: Arc<RwLock<HashMap<String, Vec<Document>>>>,
    mutations: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_collections(collections: HashMap<String, Vec<Document>>) -> Self {
        Self {
            collections: Arc::new(RwLock::new(collections)),
            ..Self::default()
        }
    }

    /// Snapshot of a collection in insertion order.
    pub async fn collection(&self, name: &str) -> Vec<Document> {
        let collections = self.collections.read().await;
        collections.get(name).cloned().unwrap_or_default()
    }

    pub async fn collection_names(&self) -> Vec<String> {
        let collections = self.collections.read().await;
        let mut names: Vec<String> = collections.keys().cloned().collect();
        names.sort();
        names
    }

    /// Loads documents without counting them as mutations.
    pub async fn seed(&self, collection: &str, documents: Vec<Document>) -> Result<Vec<DocumentId>> {
        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection.to_string()).or_default();
        let mut ids = Vec::with_capacity(documents.len());
        for document in documents {
            ids.push(push_document(docs, collection, document)?);
        }
        Ok(ids)
    }

    /// Number of successful writes (insert, update, replace, delete).
    pub fn mutation_count(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    fn record_mutation(&self) {
        self.mutations.fetch_add(1, Ordering::SeqCst);
    }
}

/// Appends a document, assigning an `_id` when it has none. Fails on a
/// duplicate `_id`.
pub(super) fn push_document(docs: &mut Vec<Document>, collection: &str, mut document: Document) -> Result<DocumentId> {
    let id = match DocumentId::of(&document) {
        Some(id) => id,
        None => {
            let id = DocumentId::generate();
            document.insert(ID_FIELD.to_string(), id.clone().into());
            id
        }
    };

    if docs.iter().any(|d| DocumentId::of(d).as_ref() == Some(&id)) {
        return Err(MigrateError::Store(format!(
            "duplicate _id {} in collection '{}'",
            id, collection
        )));
    }

    docs.push(document);
    Ok(id)
}

fn position(docs: &[Document], id: &DocumentId) -> Option<usize> {
    docs.iter().position(|d| DocumentId::of(d).as_ref() == Some(id))
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Document>> {
        filter::validate(filter)?;
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.iter().find(|d| filter::matches(d, filter)))
            .cloned())
    }

    async fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>> {
        filter::validate(filter)?;
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|docs| docs.iter().filter(|d| filter::matches(d, filter)).cloned().collect())
            .unwrap_or_default())
    }

    async fn insert_one(&self, collection: &str, document: Document) -> Result<DocumentId> {
        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection.to_string()).or_default();
        let id = push_document(docs, collection, document)?;
        self.record_mutation();
        Ok(id)
    }

    async fn update_set(&self, collection: &str, id: &DocumentId, fields: &Document) -> Result<bool> {
        let mut collections = self.collections.write().await;
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(false);
        };
        let Some(index) = position(docs, id) else {
            return Ok(false);
        };

        let target = &mut docs[index];
        for (key, value) in fields {
            if key != ID_FIELD {
                target.insert(key.clone(), value.clone());
            }
        }
        self.record_mutation();
        Ok(true)
    }

    async fn replace(&self, collection: &str, id: &DocumentId, mut document: Document) -> Result<bool> {
        let mut collections = self.collections.write().await;
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(false);
        };
        let Some(index) = position(docs, id) else {
            return Ok(false);
        };

        document.insert(ID_FIELD.to_string(), id.clone().into());
        docs[index] = document;
        self.record_mutation();
        Ok(true)
    }

    async fn delete(&self, collection: &str, id: &DocumentId) -> Result<bool> {
        let mut collections = self.collections.write().await;
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(false);
        };
        let Some(index) = position(docs, id) else {
            return Ok(false);
        };

        docs.remove(index);
        self.record_mutation();
        Ok(true)
    }

    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out connections to named in-memory databases.
#[derive(Clone, Default)]
pub struct MemoryConnector {
    databases: Arc<Mutex<HashMap<String, MemoryStore>>>,
    opened: Arc<AtomicUsize>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle to a database, created empty on first use.
    pub fn database(&self, name: &str) -> MemoryStore {
        let mut databases = self.databases.lock().unwrap_or_else(|e| e.into_inner());
        databases.entry(name.to_string()).or_default().clone()
    }

    pub fn connections_opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StoreConnector for MemoryConnector {
    async fn connect(&self, database: &str) -> Result<Box<dyn DocumentStore>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(self.database(database)))
    }
}
