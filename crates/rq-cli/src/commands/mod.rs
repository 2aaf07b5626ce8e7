pub mod ask;
pub mod capture;
pub mod chaos;
pub mod history;
pub mod patterns;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use rq_core::config::Config;
use rq_core::sqlite::SqliteStore;
use rq_intelligence::ChaosService;

/// Loaded config plus the opened store, shared by every subcommand.
pub struct Env {
    pub config: Config,
    pub store: Arc<SqliteStore>,
}

impl Env {
    pub async fn open(config_path: Option<&Path>, json_logs: bool) -> anyhow::Result<Self> {
        let config = match config_path {
            Some(path) => Config::load_from(path)
                .with_context(|| format!("loading config from {}", path.display()))?,
            None => Config::load().context("loading config")?,
        };
        rq_telemetry::logging::init_from_config("rq", &config.general, json_logs);

        let db_path = config.database_path();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let store = SqliteStore::new(&db_path)
            .await
            .with_context(|| format!("opening database {}", db_path.display()))?;

        Ok(Self {
            config,
            store: Arc::new(store),
        })
    }

    pub fn chaos_service(&self) -> ChaosService {
        ChaosService::new(self.store.clone(), self.store.clone(), &self.config.chaos)
    }
}

/// Pretty-print any serializable value as JSON on stdout.
pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
