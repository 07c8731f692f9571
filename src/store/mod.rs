//! Document Store Module
//!
//! The migration core talks to the database only through [`DocumentStore`],
//! an opaque client offering single-document reads and writes, and opens
//! connections through a [`StoreConnector`].
//!
//! - `memory.rs` - shared in-memory store, used by tests and `memory://`
//! - `file.rs` - one JSON file per collection, used by `file://<dir>`
//! - `filter.rs` - equality filters understood by both

pub mod filter;
mod file;
mod memory;

pub use file::{FileConnector, FileStore};
pub use filter::Filter;
pub use memory::{MemoryConnector, MemoryStore};

use crate::core::{Document, DocumentId, MigrateError, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

/// A live connection to one database.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// First document in insertion order matching every filter field.
    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Document>>;

    /// All documents matching the filter, in insertion order.
    async fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>>;

    /// Inserts a document, assigning an `_id` when it has none.
    async fn insert_one(&self, collection: &str, document: Document) -> Result<DocumentId>;

    /// Copies `fields` onto the document with the given id. Attributes not
    /// named in `fields` are left as they are; `_id` is never overwritten.
    /// Returns whether a document matched.
    async fn update_set(&self, collection: &str, id: &DocumentId, fields: &Document) -> Result<bool>;

    /// Replaces the whole document with the given id, keeping the id.
    async fn replace(&self, collection: &str, id: &DocumentId, document: Document) -> Result<bool>;

    async fn delete(&self, collection: &str, id: &DocumentId) -> Result<bool>;

    /// Releases the connection. Further calls are not expected.
    async fn close(&self) -> Result<()>;
}

/// Opens connections to named databases.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    async fn connect(&self, database: &str) -> Result<Box<dyn DocumentStore>>;
}

/// Parsed store endpoint.
///
/// Formats: `memory://` or `file://<directory>`; a bare path is treated
/// as a file store directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreUrl {
    Memory,
    File(PathBuf),
}

impl StoreUrl {
    pub fn parse(url: &str) -> Result<Self> {
        let url = url.trim();
        if url.is_empty() {
            return Err(MigrateError::Configuration("store url is empty".to_string()));
        }

        if let Some(rest) = url.strip_prefix("memory://") {
            if !rest.is_empty() {
                return Err(MigrateError::Configuration(format!(
                    "memory store url takes no path: {}",
                    url
                )));
            }
            return Ok(Self::Memory);
        }

        if let Some(path) = url.strip_prefix("file://") {
            if path.is_empty() {
                return Err(MigrateError::Configuration(
                    "file store url requires a directory".to_string(),
                ));
            }
            return Ok(Self::File(PathBuf::from(path)));
        }

        if let Some((scheme, _)) = url.split_once("://") {
            return Err(MigrateError::Configuration(format!(
                "unsupported store scheme '{}'",
                scheme
            )));
        }

        Ok(Self::File(PathBuf::from(url)))
    }

    /// Whether data outlives the process. A `memory://` store starts empty
    /// for every connector, so an undo in a later process finds nothing.
    pub fn is_persistent(&self) -> bool {
        matches!(self, Self::File(_))
    }

    pub fn connector(&self) -> Arc<dyn StoreConnector> {
        match self {
            Self::Memory => Arc::new(MemoryConnector::new()),
            Self::File(root) => Arc::new(FileConnector::new(root.clone())),
        }
    }
}
