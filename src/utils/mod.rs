pub mod retry;

use anyhow::{Context, Result};
use config::{Environment, File, FileFormat};
use std::path::Path;
use tracing::info;

use crate::models::common::Config;

const ENV_PREFIX: &str = "BACKFILL";

/// Loads the YAML config at `path`, then overlays `BACKFILL__SECTION__KEY` environment variables.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    info!("Config path: {}", path.to_string_lossy());

    let settings = config::Config::builder()
        .add_source(File::from(path).format(FileFormat::Yaml))
        .add_source(env_overlay())
        .build()
        .with_context(|| format!("failed to read config file {}", path.display()))?;

    finish(settings)
}

pub fn load_config_from_str(contents: &str) -> Result<Config> {
    let settings = config::Config::builder()
        .add_source(File::from_str(contents, FileFormat::Yaml))
        .build()
        .context("failed to parse config YAML")?;

    finish(settings)
}

fn env_overlay() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}

fn finish(settings: config::Config) -> Result<Config> {
    let mut config: Config = settings
        .try_deserialize()
        .context("failed to deserialize config")?;

    // Metric label values are friendlier without hyphens
    config.chain_name = config.chain_name.replace('-', "_");

    config.validate()?;
    Ok(config)
}

/// Gateways in front of RPC nodes like to answer errors with a full HTML page.
pub(crate) fn strip_html(error: &str) -> String {
    if error.contains("<!doctype html>") || error.contains("<html>") {
        error
            .lines()
            .map(|line| line.trim())
            .find(|line| {
                !line.is_empty()
                    && !line.starts_with('<')
                    && !line.ends_with('>')
                    && *line != "html"
                    && *line != "body"
            })
            .unwrap_or(error)
            .to_string()
    } else {
        error.to_string()
    }
}
