//! Undo Module
//!
//! Reverses the actions of a recorded migration run: inserted documents are
//! deleted and updated documents are replaced by their pre-update snapshot.
//! Dry-run records are skipped. Undo is best effort: a record that cannot
//! be reverted is reported and the rest are still attempted.

mod replay;

pub use replay::{repeated_updates, replay, select_actions};

use crate::core::{DocumentId, MigrateError, Result};
use crate::migration::{ActionKind, MigrationLog, RunTag};
use crate::store::StoreConnector;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{Instrument, info, info_span, warn};

/// Order in which selected records are reversed.
///
/// `Reverse` undoes the newest action first, which restores the original
/// state even when several items of one run matched the same document.
/// `Recorded` replays in log order and is only correct when the match
/// fields identify each item uniquely within the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UndoOrder {
    #[default]
    Reverse,
    Recorded,
}

impl FromStr for UndoOrder {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "reverse" => Ok(Self::Reverse),
            "recorded" | "forward" => Ok(Self::Recorded),
            other => Err(format!("unknown undo order '{}' (expected reverse or recorded)", other)),
        }
    }
}

impl fmt::Display for UndoOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reverse => f.write_str("reverse"),
            Self::Recorded => f.write_str("recorded"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoRequest {
    pub tag: RunTag,
    pub collection: String,
    pub database: Option<String>,
    /// Only reverse records whose `_id` equals this
    pub filter_id: Option<String>,
    /// Overrides the engine's order
    pub order: Option<UndoOrder>,
}

impl UndoRequest {
    pub fn new(tag: impl Into<RunTag>, collection: &str) -> Self {
        Self {
            tag: tag.into(),
            collection: collection.to_string(),
            database: None,
            filter_id: None,
            order: None,
        }
    }

    pub fn database(mut self, database: &str) -> Self {
        self.database = Some(database.to_string());
        self
    }

    pub fn only_id(mut self, id: &str) -> Self {
        self.filter_id = Some(id.to_string());
        self
    }

    pub fn order(mut self, order: UndoOrder) -> Self {
        self.order = Some(order);
        self
    }

    fn validate(&self) -> Result<()> {
        if self.tag.as_str().is_empty() {
            return Err(MigrateError::Configuration("tag is required".to_string()));
        }
        if self.collection.trim().is_empty() {
            return Err(MigrateError::Configuration("collection is required".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoFailure {
    pub id: Option<DocumentId>,
    pub action: ActionKind,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoReport {
    pub collection: String,
    pub tag: RunTag,
    /// Records chosen by the id filter
    pub selected: usize,
    pub reverted: usize,
    /// Dry-run records
    pub skipped: usize,
    /// Records whose document was already gone
    pub missing: usize,
    pub failures: Vec<UndoFailure>,
}

impl UndoReport {
    pub fn new(collection: &str, tag: RunTag) -> Self {
        Self {
            collection: collection.to_string(),
            tag,
            selected: 0,
            reverted: 0,
            skipped: 0,
            missing: 0,
            failures: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Loads action logs from the migration directory and replays them.
pub struct UndoEngine {
    migration_dir: PathBuf,
    connector: Arc<dyn StoreConnector>,
    order: UndoOrder,
    default_database: String,
}

impl UndoEngine {
    pub fn new(migration_dir: PathBuf, connector: Arc<dyn StoreConnector>) -> Self {
        Self {
            migration_dir,
            connector,
            order: UndoOrder::default(),
            default_database: "test_db".to_string(),
        }
    }

    pub fn with_order(mut self, order: UndoOrder) -> Self {
        self.order = order;
        self
    }

    pub fn with_default_database(mut self, database: &str) -> Self {
        self.default_database = database.to_string();
        self
    }

    /// Reverses the selected records of one run.
    ///
    /// A missing log fails before any connection is opened. Per-record
    /// failures end up in the report rather than in the error.
    pub async fn undo(&self, request: &UndoRequest) -> Result<UndoReport> {
        request.validate()?;
        let log = MigrationLog::load(&self.migration_dir, &request.collection, &request.tag)?;
        let order = request.order.unwrap_or(self.order);
        let database = request.database.as_deref().unwrap_or(&self.default_database);

        let span = info_span!("undo", collection = %request.collection, tag = %request.tag, %order);
        async {
            let selected = select_actions(&log, request.filter_id.as_deref(), order);
            if order == UndoOrder::Recorded {
                let repeated = repeated_updates(&selected);
                if !repeated.is_empty() {
                    warn!(
                        ids = ?repeated,
                        "several updates of the same document; recorded-order undo will not restore the original"
                    );
                }
            }

            let mut report = UndoReport::new(&request.collection, request.tag.clone());
            report.selected = selected.len();

            let store = self.connector.connect(database).await?;
            replay(store.as_ref(), &selected, &mut report).await;
            store.close().await?;

            info!(
                reverted = report.reverted,
                skipped = report.skipped,
                missing = report.missing,
                failed = report.failures.len(),
                "Undo complete."
            );
            Ok::<_, MigrateError>(report)
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryConnector;
    use tempfile::TempDir;

    #[test]
    fn test_order_from_str() {
        assert_eq!("Reverse".parse::<UndoOrder>().unwrap(), UndoOrder::Reverse);
        assert_eq!("recorded".parse::<UndoOrder>().unwrap(), UndoOrder::Recorded);
        assert!("sideways".parse::<UndoOrder>().is_err());
        assert_eq!(UndoOrder::default().to_string(), "reverse");
    }

    #[tokio::test]
    async fn test_missing_log_fails_before_connecting() {
        let temp_dir = TempDir::new().unwrap();
        let connector = MemoryConnector::new();
        let engine = UndoEngine::new(temp_dir.path().to_path_buf(), Arc::new(connector.clone()));

        let err = engine.undo(&UndoRequest::new("fake_tag", "users")).await.unwrap_err();
        assert!(matches!(err, MigrateError::MigrationLogNotFound(_)));
        assert_eq!(connector.connections_opened(), 0);
    }

    #[tokio::test]
    async fn test_empty_tag_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let engine = UndoEngine::new(temp_dir.path().to_path_buf(), Arc::new(MemoryConnector::new()));

        let err = engine.undo(&UndoRequest::new(" ", "users")).await.unwrap_err();
        assert!(matches!(err, MigrateError::Configuration(_)));
    }
}
