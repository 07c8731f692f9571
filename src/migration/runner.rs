use super::action::ActionKind;
use super::log::MigrationLogWriter;
use super::source::{DataSource, resolve_data_source};
use super::tag::RunTag;
use super::upsert::UpsertExecutor;
use crate::config::MigrationConfig;
use crate::core::{MigrateError, Result};
use crate::store::{DocumentStore, StoreConnector};
use crate::template::{Template, TemplateRenderer};
use crate::undo::{UndoEngine, UndoReport, UndoRequest};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, info_span, Instrument};

/// What to migrate: a collection, a template name and a data source name,
/// both resolved against the configured directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRequest {
    pub collection: String,
    pub template: String,
    pub data: String,
    /// Falls back to the configured database
    pub database: Option<String>,
    /// Dry run when either this or the configuration asks for it
    pub dry_run: bool,
}

impl MigrationRequest {
    pub fn new(collection: &str, template: &str, data: &str) -> Self {
        Self {
            collection: collection.to_string(),
            template: template.to_string(),
            data: data.to_string(),
            database: None,
            dry_run: false,
        }
    }

    pub fn database(mut self, database: &str) -> Self {
        self.database = Some(database.to_string());
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("collection", &self.collection),
            ("template", &self.template),
            ("data", &self.data),
        ] {
            if value.trim().is_empty() {
                return Err(MigrateError::Configuration(format!("{} is required", name)));
            }
        }
        Ok(())
    }
}

/// Outcome of one migration run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationSummary {
    pub tag: RunTag,
    pub collection: String,
    pub database: String,
    pub log_path: PathBuf,
    pub dry_run: bool,
    pub items: usize,
    pub inserted: usize,
    pub updated: usize,
}

/// Runs migrations and undos against one store endpoint.
pub struct Migrator {
    config: MigrationConfig,
    connector: Arc<dyn StoreConnector>,
}

impl Migrator {
    pub fn new(config: MigrationConfig, connector: Arc<dyn StoreConnector>) -> Self {
        Self { config, connector }
    }

    /// Builds the connector from the configured store url.
    pub fn from_config(config: MigrationConfig) -> Result<Self> {
        let connector = config.connector()?;
        Ok(Self::new(config, connector))
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Resolves the template and data source, then runs the migration.
    ///
    /// Both sources are resolved before a connection is opened, so a missing
    /// file fails without touching the store.
    pub async fn run(&self, request: &MigrationRequest) -> Result<MigrationSummary> {
        request.validate()?;
        let template = resolve_template(&self.config.template_dir, &request.template)?;
        let source = resolve_data_source(&self.config.data_dir, &request.data)?;
        self.run_with(request, &template, source.as_ref()).await
    }

    /// Runs a migration with an already loaded template and data source.
    ///
    /// The template must declare match fields; without them every item
    /// would match whichever document the collection returns first.
    pub async fn run_with(
        &self,
        request: &MigrationRequest,
        template: &Template,
        source: &dyn DataSource,
    ) -> Result<MigrationSummary> {
        request.validate()?;
        if template.match_fields().is_empty() {
            return Err(MigrateError::Render(format!(
                "template for '{}' declares no _meta.matchFields",
                request.collection
            )));
        }
        let database = request.database.as_deref().unwrap_or(&self.config.database);
        let dry_run = request.dry_run || self.config.dry_run;
        let tag = RunTag::generate();

        let span = info_span!("migration", collection = %request.collection, tag = %tag, dry_run);
        self.execute(request, template, source, database, tag, dry_run)
            .instrument(span)
            .await
    }

    async fn execute(
        &self,
        request: &MigrationRequest,
        template: &Template,
        source: &dyn DataSource,
        database: &str,
        tag: RunTag,
        dry_run: bool,
    ) -> Result<MigrationSummary> {
        let mut log = MigrationLogWriter::create(&self.config.migration_dir, &request.collection, tag.clone())?;
        let mut summary = MigrationSummary {
            tag,
            collection: request.collection.clone(),
            database: database.to_string(),
            log_path: log.path().to_path_buf(),
            dry_run,
            items: 0,
            inserted: 0,
            updated: 0,
        };

        let store = self.connector.connect(database).await?;
        let outcome = self
            .apply(store.as_ref(), request, template, source, &mut log, &mut summary)
            .await;
        // Close on every path; the run's own error wins over a close error.
        let closed = store.close().await;
        outcome?;
        closed?;

        info!(
            items = summary.items,
            inserted = summary.inserted,
            updated = summary.updated,
            log = %summary.log_path.display(),
            "Migration complete."
        );
        Ok(summary)
    }

    async fn apply(
        &self,
        store: &dyn DocumentStore,
        request: &MigrationRequest,
        template: &Template,
        source: &dyn DataSource,
        log: &mut MigrationLogWriter,
        summary: &mut MigrationSummary,
    ) -> Result<()> {
        let renderer = TemplateRenderer::new(self.config.render_mode);
        let executor = UpsertExecutor::new(summary.dry_run);
        let items = source.load(store).await?;
        let tag = summary.tag.clone();

        for item in &items {
            let document = renderer.render(template, item, tag.as_str())?;
            let kind = executor
                .upsert(store, &request.collection, document, template.match_fields(), tag.as_str(), &mut *log)
                .await?;

            summary.items += 1;
            if !summary.dry_run {
                match kind {
                    ActionKind::Insert => summary.inserted += 1,
                    ActionKind::Update => summary.updated += 1,
                    ActionKind::DryRun => {}
                }
            }
        }
        Ok(())
    }

    pub fn undo_engine(&self) -> UndoEngine {
        UndoEngine::new(self.config.migration_dir.clone(), self.connector.clone())
            .with_order(self.config.undo_order)
            .with_default_database(&self.config.database)
    }

    pub async fn undo(&self, request: &UndoRequest) -> Result<UndoReport> {
        self.undo_engine().undo(request).await
    }
}

/// Loads `<template_dir>/<name>.json`.
pub fn resolve_template(template_dir: &Path, name: &str) -> Result<Template> {
    let path = template_dir.join(format!("{}.json", name));
    if !path.is_file() {
        return Err(MigrateError::SourceNotFound {
            name: name.to_string(),
            tried: path.display().to_string(),
        });
    }
    Template::load(&path)
}
