//! Migration Module
//!
//! A run renders every data item through the template and upserts the
//! result by match fields, one item at a time and in input order. Each
//! write is recorded in the run's action log before the next item starts.
//!
//! - `action.rs` - logged action records
//! - `log.rs` - the persisted per-run action log
//! - `source.rs` - static, query and closure data sources
//! - `tag.rs` - run tags
//! - `upsert.rs` - the match-field upsert executor
//! - `runner.rs` - the orchestrator tying these together

pub mod action;
pub mod log;
pub mod source;
pub mod tag;
pub mod upsert;
mod runner;

pub use action::{ActionKind, ActionRecord, ActionStatus};
pub use log::{ActionSink, MigrationLog, MigrationLogWriter};
pub use runner::{MigrationRequest, MigrationSummary, Migrator, resolve_template};
pub use source::{DataSource, DynamicDataSource, QueryDataSource, StaticDataSource, resolve_data_source};
pub use tag::RunTag;
pub use upsert::{UpsertExecutor, match_filter};
