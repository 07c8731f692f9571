use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use docmigrate::config::ENV_STORE_URL;
use docmigrate::{
    MigrationConfig, MigrationLog, MigrationRequest, Migrator, RenderMode, StoreUrl, UndoOrder,
    UndoRequest,
};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "docmigrate")]
#[command(about = "Template-driven document migrations with undo")]
#[command(version)]
struct Cli {
    /// Store url, overriding DOCMIGRATE_STORE_URL. Only `file://<dir>` (or a
    /// bare directory) is accepted here; `memory://` is for library use
    #[arg(long, global = true)]
    store: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render every data item through a template and upsert it
    Migration {
        #[arg(long)]
        collection: String,
        #[arg(long)]
        template: String,
        #[arg(long)]
        data: String,
        #[arg(long)]
        db: Option<String>,
        #[arg(long)]
        dry: bool,
        #[arg(long)]
        render_mode: Option<RenderMode>,
    },
    /// Reverse the actions recorded for one run
    Undo {
        #[arg(long)]
        tag: String,
        #[arg(long)]
        collection: String,
        #[arg(long)]
        db: Option<String>,
        /// Only reverse the record for this document id
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        order: Option<UndoOrder>,
    },
    /// List recorded run tags for a collection
    Logs {
        #[arg(long)]
        collection: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _ = dotenvy::dotenv();

    let config = MigrationConfig::from_lookup(|key| {
        if key == ENV_STORE_URL {
            if let Some(url) = &cli.store {
                return Some(url.clone());
            }
        }
        std::env::var(key).ok()
    })
    .context("Failed to load configuration")?;

    init_tracing(config.log_file.as_deref())?;

    // Each process would get its own empty memory store, so an undo could
    // never see what a migration wrote.
    if !StoreUrl::parse(&config.store_url)?.is_persistent() {
        bail!(
            "{} is an in-process store; use file://<dir> from the command line",
            config.store_url
        );
    }

    match cli.command {
        Command::Migration {
            collection,
            template,
            data,
            db,
            dry,
            render_mode,
        } => {
            let mut config = config;
            if let Some(mode) = render_mode {
                config.render_mode = mode;
            }
            let mut request = MigrationRequest::new(&collection, &template, &data).dry_run(dry);
            if let Some(db) = db {
                request = request.database(&db);
            }
            run_migration(config, request).await
        }
        Command::Undo {
            tag,
            collection,
            db,
            id,
            order,
        } => {
            let mut request = UndoRequest::new(tag.as_str(), &collection);
            if let Some(db) = db {
                request = request.database(&db);
            }
            if let Some(id) = id {
                request = request.only_id(&id);
            }
            if let Some(order) = order {
                request = request.order(order);
            }
            run_undo(config, request).await
        }
        Command::Logs { collection } => list_logs(&config, &collection),
    }
}

fn init_tracing(log_file: Option<&Path>) -> Result<()> {
    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file '{}'", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    Ok(())
}

async fn run_migration(config: MigrationConfig, request: MigrationRequest) -> Result<()> {
    let migrator = Migrator::from_config(config).context("Failed to open store")?;
    let summary = migrator
        .run(&request)
        .await
        .with_context(|| format!("Migration of '{}' failed", request.collection))?;

    println!("Tag: {}", summary.tag);
    println!("Log: {}", summary.log_path.display());
    if summary.dry_run {
        println!("[DRY RUN] {} item(s) planned, nothing written", summary.items);
    } else {
        println!(
            "{} item(s): {} inserted, {} updated",
            summary.items, summary.inserted, summary.updated
        );
    }
    Ok(())
}

async fn run_undo(config: MigrationConfig, request: UndoRequest) -> Result<()> {
    let migrator = Migrator::from_config(config).context("Failed to open store")?;
    let report = migrator
        .undo(&request)
        .await
        .with_context(|| format!("Undo of run '{}' failed", request.tag))?;

    println!(
        "{} selected: {} reverted, {} skipped, {} missing, {} failed",
        report.selected,
        report.reverted,
        report.skipped,
        report.missing,
        report.failures.len()
    );
    for failure in &report.failures {
        let id = failure
            .id
            .as_ref()
            .map(|id| id.to_string())
            .unwrap_or_else(|| "(no _id)".to_string());
        eprintln!("  {} {}: {}", failure.action, id, failure.error);
    }

    if !report.is_clean() {
        bail!("{} action(s) could not be reverted", report.failures.len());
    }
    Ok(())
}

fn list_logs(config: &MigrationConfig, collection: &str) -> Result<()> {
    let tags = MigrationLog::list_tags(&config.migration_dir, collection)
        .with_context(|| format!("Failed to read '{}'", config.migration_dir.display()))?;
    if tags.is_empty() {
        println!("No migrations recorded for '{}'", collection);
    }
    for tag in tags {
        println!("{}", tag);
    }
    Ok(())
}
