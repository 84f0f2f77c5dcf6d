//! Logging and configuration bootstrap. Grounded in the teacher's
//! `cli/runtime.rs::init_logging`/`load_config` (same two-path search:
//! `config/config.yaml` then `dirs::config_dir()`), reshaped around the
//! `config` crate's layered builder in place of a hand-rolled
//! read-then-parse, with an `BROWSERAGENT__`-prefixed environment layer
//! on top (SPEC_FULL.md §13).

use std::path::PathBuf;

use config::{Config, Environment, File, FileFormat};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::AppConfig;
use crate::errors::{CliError, CliResult};

pub fn init_logging(level: &str, debug: bool) -> CliResult<()> {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        level
            .parse()
            .map_err(|_| CliError::InvalidLogLevel(level.to_string()))?
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string())),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .ok();

    Ok(())
}

pub struct LoadedConfig {
    pub config: AppConfig,
    pub path: PathBuf,
}

pub fn load_config(config_path: Option<&PathBuf>) -> CliResult<LoadedConfig> {
    let path = match config_path {
        Some(p) => p.clone(),
        None => {
            let local = PathBuf::from("config/config.yaml");
            if local.exists() {
                local
            } else {
                let mut dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
                dir.push("browseragent");
                dir.push("config.yaml");
                dir
            }
        }
    };

    let exists = path.exists();
    let raw = Config::builder()
        .add_source(File::new(&path.display().to_string(), FileFormat::Yaml).required(false))
        .add_source(Environment::with_prefix("BROWSERAGENT").separator("__"))
        .build()
        .map_err(|source| CliError::ConfigParse {
            path: path.display().to_string(),
            source,
        })?;

    let config: AppConfig = raw.try_deserialize().map_err(|source| CliError::ConfigParse {
        path: path.display().to_string(),
        source,
    })?;

    if exists {
        tracing::info!(path = %path.display(), "loaded configuration");
    } else {
        tracing::warn!(path = %path.display(), "config file not found, using defaults");
    }
    Ok(LoadedConfig { config, path })
}
