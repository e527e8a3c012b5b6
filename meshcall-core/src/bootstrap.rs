//! Configuration loading

use anyhow::Result;
use std::path::Path;
use tracing::info;

use crate::Config;

/// Load configuration from config file or environment variables
///
/// Config file search order:
/// 1. `MESHCALL_CONFIG_PATH` environment variable (explicit path)
/// 2. ./meshcall.yaml (current working directory)
/// 3. Fall back to environment variables only
pub fn load_config() -> Result<Config> {
    let config = load_config_from(None)?;
    validate(&config)?;
    Ok(config)
}

/// Like [`load_config`], but an explicit `path` wins over the search order
///
/// The result is not validated, so callers can overlay their own settings
/// first and then call [`validate`].
pub fn load_config_from(path: Option<&str>) -> Result<Config> {
    if let Some(path) = path {
        if !Path::new(path).exists() {
            return Err(anyhow::anyhow!("Config file {path} does not exist"));
        }
    }
    let config_path = path
        .map(str::to_string)
        .or_else(|| std::env::var("MESHCALL_CONFIG_PATH").ok())
        .filter(|p| Path::new(p).exists())
        .or_else(|| {
            let cwd = "meshcall.yaml";
            Path::new(cwd).exists().then(|| cwd.to_string())
        });

    let config = match config_path {
        Some(path) => {
            eprintln!("Loading config from {path}");
            Config::from_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load {path}: {e}"))?
        }
        None => Config::from_env().unwrap_or_else(|e| {
            eprintln!("Failed to load config: {e}");
            eprintln!("Using default configuration");
            Config::default()
        }),
    };

    Ok(config)
}

/// Check the final configuration once every overlay has been applied
pub fn validate(config: &Config) -> Result<()> {
    if let Err(errors) = config.validate() {
        return Err(anyhow::anyhow!(
            "Configuration validation failed with {} error(s): {}",
            errors.len(),
            errors.join("; ")
        ));
    }

    info!(
        participants = config.conference.participants,
        presenting = config.conference.presenting,
        "Configuration loaded and validated"
    );
    Ok(())
}
