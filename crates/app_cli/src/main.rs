mod cli;
mod commands;

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::{fs, time::Duration};

use anyhow::{Context, Result};
use chrono::TimeDelta;
use clap::Parser;
use config::{AppConfig, ConfigStore, default_data_dir};
use credentials::CredentialStore;
use notebook::{Notebook, NotebookSettings};
use storage_sqlite::SqliteStorage;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use cli::Cli;

const DEFAULT_LOG_FILTER: &str =
    "info,minnotes=debug,notebook=debug,credentials=debug,storage_sqlite=debug,config=debug";

fn main() -> ExitCode {
    let cli = Cli::parse();

    let data_dir = cli.data_dir.clone().unwrap_or_else(default_data_dir);
    if let Err(err) = fs::create_dir_all(&data_dir) {
        eprintln!("failed to prepare data dir `{}`: {err}", data_dir.display());
        return ExitCode::FAILURE;
    }

    let config_store = ConfigStore::from_dir(data_dir.join("config"));
    let loaded = config_store.load_or_init();
    let log_filter = loaded
        .as_ref()
        .ok()
        .and_then(|config| config.logging.filter.clone());
    let _log_guard = init_local_logger(&data_dir.join("logs"), log_filter.as_deref());
    let config = match loaded {
        Ok(config) => config,
        Err(err) => {
            error!("failed to load config: {err:#}");
            AppConfig::default()
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("failed to create tokio runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(&data_dir, &config, cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("command failed: {err:#}");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(data_dir: &Path, config: &AppConfig, cli: Cli) -> Result<()> {
    let db_path = config.database_path(data_dir);
    let storage = Arc::new(
        SqliteStorage::connect(&db_path)
            .await
            .with_context(|| format!("failed to open {}", db_path.display()))?,
    );
    info!(path = %db_path.display(), "storage ready");

    let ttl = TimeDelta::try_hours(config.session.ttl_hours)
        .with_context(|| format!("session ttl of {} hours is out of range", config.session.ttl_hours))?;
    let credentials = CredentialStore::new(storage.clone(), storage.clone()).with_session_ttl(ttl);
    let settings = NotebookSettings {
        debounce: Duration::from_millis(config.autosave.debounce_ms),
        folders: config.folders.clone(),
        default_folder: config.default_folder.clone(),
    };
    let notebook = Notebook::open(credentials, storage.clone(), storage.clone(), settings);
    notebook.restore().await?;

    let outcome = commands::execute(&notebook, cli.command).await;
    let closed = notebook.close().await;
    storage.close().await;
    outcome?;
    closed?;
    Ok(())
}

fn init_local_logger(
    log_dir: &Path,
    configured: Option<&str>,
) -> tracing_appender::non_blocking::WorkerGuard {
    if let Err(err) = fs::create_dir_all(log_dir) {
        eprintln!("failed to create log dir `{}`: {err}", log_dir.display());
    }
    let file_appender = tracing_appender::rolling::daily(log_dir, "minnotes.log");
    let (writer, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::try_new(configured.unwrap_or(DEFAULT_LOG_FILTER))
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    });

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .json()
        .with_writer(writer)
        .init();

    guard
}
