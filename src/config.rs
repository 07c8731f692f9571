use crate::core::{MigrateError, Result};
use crate::store::{StoreConnector, StoreUrl};
use crate::template::RenderMode;
use crate::undo::UndoOrder;
use std::path::PathBuf;
use std::sync::Arc;

pub const ENV_STORE_URL: &str = "DOCMIGRATE_STORE_URL";
pub const ENV_DB_NAME: &str = "DOCMIGRATE_DB_NAME";
pub const ENV_DRY_RUN: &str = "DRY_RUN";
pub const ENV_TEMPLATE_DIR: &str = "DOCMIGRATE_TEMPLATE_DIR";
pub const ENV_DATA_DIR: &str = "DOCMIGRATE_DATA_DIR";
pub const ENV_MIGRATION_DIR: &str = "DOCMIGRATE_MIGRATION_DIR";
pub const ENV_LOG_FILE: &str = "DOCMIGRATE_LOG_FILE";
pub const ENV_RENDER_MODE: &str = "DOCMIGRATE_RENDER_MODE";
pub const ENV_UNDO_ORDER: &str = "DOCMIGRATE_UNDO_ORDER";

/// Settings for migration and undo runs.
///
/// Loaded once (usually via [`MigrationConfig::from_env`]) and handed to the
/// [`Migrator`](crate::Migrator); nothing in the core reads the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationConfig {
    /// Store endpoint, `memory://` or `file://<dir>`
    pub store_url: String,

    /// Database used when a request names none
    pub database: String,

    /// Log planned actions without writing to the store
    pub dry_run: bool,

    pub template_dir: PathBuf,
    pub data_dir: PathBuf,
    pub migration_dir: PathBuf,

    /// Extra destination for log output, besides stderr
    pub log_file: Option<PathBuf>,

    pub render_mode: RenderMode,
    pub undo_order: UndoOrder,
}

impl MigrationConfig {
    pub fn new(store_url: &str) -> Self {
        Self {
            store_url: store_url.to_string(),
            database: "test_db".to_string(),
            dry_run: false,
            template_dir: PathBuf::from("templates"),
            data_dir: PathBuf::from("data"),
            migration_dir: PathBuf::from("migrations"),
            log_file: None,
            render_mode: RenderMode::default(),
            undo_order: UndoOrder::default(),
        }
    }

    /// Set the default database name
    pub fn database(mut self, database: &str) -> Self {
        self.database = database.to_string();
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn template_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.template_dir = dir.into();
        self
    }

    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn migration_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.migration_dir = dir.into();
        self
    }

    /// Point templates, data and logs at `<root>/templates`, `<root>/data`
    /// and `<root>/migrations`
    pub fn root_dir(self, root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        self.template_dir(root.join("templates"))
            .data_dir(root.join("data"))
            .migration_dir(root.join("migrations"))
    }

    pub fn log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }

    pub fn render_mode(mut self, mode: RenderMode) -> Self {
        self.render_mode = mode;
        self
    }

    pub fn undo_order(mut self, order: UndoOrder) -> Self {
        self.undo_order = order;
        self
    }

    /// Load from the process environment, reading `.env` first if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let store_url = get(ENV_STORE_URL)
            .ok_or_else(|| MigrateError::Configuration(format!("{} must be set", ENV_STORE_URL)))?;
        StoreUrl::parse(&store_url)?;

        let mut config = Self::new(&store_url);
        if let Some(db) = get(ENV_DB_NAME) {
            config.database = db;
        }
        if let Some(flag) = get(ENV_DRY_RUN) {
            config.dry_run = parse_flag(&flag);
        }
        if let Some(dir) = get(ENV_TEMPLATE_DIR) {
            config.template_dir = PathBuf::from(dir);
        }
        if let Some(dir) = get(ENV_DATA_DIR) {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(dir) = get(ENV_MIGRATION_DIR) {
            config.migration_dir = PathBuf::from(dir);
        }
        config.log_file = get(ENV_LOG_FILE).map(PathBuf::from);
        if let Some(mode) = get(ENV_RENDER_MODE) {
            config.render_mode = mode.parse().map_err(MigrateError::Configuration)?;
        }
        if let Some(order) = get(ENV_UNDO_ORDER) {
            config.undo_order = order.parse().map_err(MigrateError::Configuration)?;
        }
        Ok(config)
    }

    pub fn connector(&self) -> Result<Arc<dyn StoreConnector>> {
        Ok(StoreUrl::parse(&self.store_url)?.connector())
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}
