use std::env;
use std::path::PathBuf;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

const LOG_FILTER_VAR: &str = "RUST_LOG";

/// Loads `.env` and installs the log subscriber. Runs before anything else
/// reads the environment, so `.env` can set `RUST_LOG` too.
pub fn init_environment() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(LOG_FILTER_VAR))
        .init();
}

fn log_filter(var: &str) -> EnvFilter {
    EnvFilter::try_from_env(var).unwrap_or_else(|_| EnvFilter::new("info"))
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    pub tesseract_cmd: PathBuf,
    pub tesseract_lang: String,
}

impl Config {
    /// Reads settings from the environment; `.env` has already been loaded by
    /// [`init_environment`].
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")
            .context("DATABASE_URL must be set to a production Postgres instance")?;
        let max_connections = match env::var("DATABASE_MAX_CONNECTIONS") {
            Ok(value) => value
                .parse::<u32>()
                .with_context(|| format!("DATABASE_MAX_CONNECTIONS is not a number: {value}"))?,
            Err(_) => 5,
        };

        Ok(Config {
            database_url,
            max_connections,
            tesseract_cmd: env::var("TESSERACT_CMD")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("tesseract")),
            tesseract_lang: env::var("TESSERACT_LANG").unwrap_or_else(|_| "eng".to_string()),
        })
    }
}
