//! juris-import: import a spreadsheet (CSV, xlsx, xls, ods) into a back-office table.
//!
//! Usage:
//!   juris-import clientes.csv --table contatos --tenant <UUID> --tag <UUID>
//!   juris-import clientes.csv --table contatos --tenant <UUID> --dry-run
//!   juris-import casos.csv --table processos --tenant <UUID> --map "Nº CNJ=numero_processo"
//!
//! Environment:
//!   DATABASE_URL       PostgreSQL connection string (also read from .env)
//!   JURIS_DB_MAX_CONNECTIONS, JURIS_DB_ACQUIRE_TIMEOUT_SECS  pool sizing
//!   JURIS_LOG_FORMAT   "json" for JSON log lines, anything else for text
//!   RUST_LOG           standard env filter (default: "juris_import=info,juris_db=info")

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::Ordering;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use juris_core::{set_target, ImportConfig, Owner, SynonymTable};
use juris_db::{log_pool_usage, Database, PoolConfig};
use juris_import::{analyze_file, ImportReconciler, TargetSchema};

#[derive(Parser, Debug)]
#[command(name = "juris-import")]
#[command(author, version, about = "Bulk import spreadsheet rows with deduplication and tagging")]
struct Cli {
    /// Spreadsheet to import (CSV, xlsx, xls or ods)
    file: PathBuf,

    /// Target table (contatos, processos, transacoes)
    #[arg(short, long, default_value = "contatos")]
    table: String,

    /// Tenant the records belong to
    #[arg(long, env = "JURIS_TENANT_ID")]
    tenant: Uuid,

    /// User recorded as creator of the tag links
    #[arg(long)]
    user: Option<Uuid>,

    /// Tag to attach to every imported record (repeatable)
    #[arg(long = "tag")]
    tags: Vec<Uuid>,

    /// Override the suggested mapping: SOURCE=TARGET, TARGET "none" skips
    /// the column (repeatable)
    #[arg(long = "map", value_name = "SOURCE=TARGET")]
    overrides: Vec<String>,

    /// JSON synonym table replacing the built-in one
    #[arg(long)]
    synonyms: Option<PathBuf>,

    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Print the analysis as JSON and exit without writing
    #[arg(long)]
    dry_run: bool,
}

fn init_tracing() {
    let log_format = std::env::var("JURIS_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "juris_import=info,juris_db=info".into());
    let registry = tracing_subscriber::registry().with(env_filter);

    // Logs go to stderr; stdout carries the JSON report.
    if log_format == "json" {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn parse_override(raw: &str) -> anyhow::Result<(&str, &str)> {
    match raw.split_once('=') {
        Some((source, target)) if !source.trim().is_empty() => {
            Ok((source.trim(), target.trim()))
        }
        _ => bail!("invalid --map '{}', expected SOURCE=TARGET", raw),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let _ = dotenvy::dotenv();
    init_tracing();
    let cli = Cli::parse();

    let schema = TargetSchema::for_table(&cli.table)?;
    let synonyms = match &cli.synonyms {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading synonyms from {}", path.display()))?;
            SynonymTable::from_json(&json)?
        }
        None => SynonymTable::backoffice(),
    };

    let bytes = std::fs::read(&cli.file)
        .with_context(|| format!("reading {}", cli.file.display()))?;
    let file_name = cli
        .file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("input.csv")
        .to_string();

    if cli.dry_run {
        let (_, mut analysis) = analyze_file(&bytes, &file_name, &schema, &synonyms)?;
        for raw in &cli.overrides {
            let (source, target) = parse_override(raw)?;
            set_target(&mut analysis.suggested_mapping, source, target);
        }
        println!("{}", serde_json::to_string_pretty(&analysis)?);
        return Ok(ExitCode::SUCCESS);
    }

    let database_url = cli
        .database_url
        .as_deref()
        .context("DATABASE_URL is required unless --dry-run is given")?;
    let db = Database::connect_with_config(database_url, PoolConfig::from_env()).await?;

    let mut owner = Owner::new(cli.tenant);
    if let Some(user) = cli.user {
        owner = owner.with_user(user);
    }

    let mut reconciler =
        ImportReconciler::new(db.records.clone(), schema, owner, ImportConfig::from_env())?
            .with_synonyms(synonyms);

    let cancel = reconciler.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current batch");
            cancel.store(true, Ordering::SeqCst);
        }
    });

    let analysis = reconciler.analyze(&bytes, &file_name).await?;
    let mut mapping = analysis.suggested_mapping;
    for raw in &cli.overrides {
        let (source, target) = parse_override(raw)?;
        set_target(&mut mapping, source, target);
    }

    let result = reconciler
        .run(&mapping, &cli.tags, |progress| {
            info!(
                percent = progress.percent,
                success = progress.result.success,
                errors = progress.result.errors,
                "Import progress"
            );
        })
        .await?;
    log_pool_usage(&db.pool);

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(if result.errors > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
