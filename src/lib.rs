//! Template-driven bulk upserts into document stores, with a persisted
//! per-run action log that can be replayed to undo a run.
//!
//! Migrate inline data into an in-memory store and undo it again:
//!
//! ```no_run
//! use docmigrate::{
//!     MemoryConnector, MigrationConfig, MigrationRequest, Migrator, StaticDataSource,
//!     Template, UndoRequest,
//! };
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> docmigrate::Result<()> {
//! let connector = MemoryConnector::new();
//! let migrator = Migrator::new(MigrationConfig::new("memory://"), Arc::new(connector.clone()));
//!
//! let template = Template::from_value(json!({
//!     "_meta": { "matchFields": ["email"] },
//!     "email": "{{email}}",
//!     "migratedAt": "{{createdAt}}"
//! }))?;
//! let source = StaticDataSource::from_value(json!([{ "email": "ann@example.com" }]))?;
//!
//! let request = MigrationRequest::new("users", "users", "people");
//! let summary = migrator.run_with(&request, &template, &source).await?;
//! println!("inserted {} (tag {})", summary.inserted, summary.tag);
//!
//! let report = migrator.undo(&UndoRequest::new(summary.tag.clone(), "users")).await?;
//! println!("reverted {}", report.reverted);
//! # Ok(())
//! # }
//! ```

// ============================================================================
// docmigrate Library
// ============================================================================

pub mod config;
pub mod core;
pub mod migration;
pub mod store;
pub mod template;
pub mod undo;

// Re-export main types for convenience
pub use config::MigrationConfig;
pub use core::{DataItem, Document, DocumentId, MigrateError, Result, ID_FIELD};
pub use template::{RenderMode, Template, TemplateRenderer};

// Re-export migration API
pub use migration::{
    ActionKind, ActionRecord, ActionSink, ActionStatus,
    DataSource, DynamicDataSource, QueryDataSource, StaticDataSource,
    MigrationLog, MigrationLogWriter, MigrationRequest, MigrationSummary, Migrator,
    RunTag, UpsertExecutor,
};

// Re-export undo API
pub use undo::{UndoEngine, UndoFailure, UndoOrder, UndoReport, UndoRequest};

// Re-export store API
pub use store::{
    DocumentStore, StoreConnector, StoreUrl,
    FileConnector, FileStore, MemoryConnector, MemoryStore,
};
