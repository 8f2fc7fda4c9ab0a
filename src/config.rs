//! Configuration loading.
//!
//! The TOML schema lives in [`schema`]; this module only gets a [`Config`]
//! off disk. Semantic checks (duplicate names, missing executables) are a
//! separate step via [`Config::validate`], so embedders can load a config
//! and patch it programmatically before validating.

pub mod schema;

pub use schema::*;

use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

/// Reads and parses a TOML configuration file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config = load_config_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
    debug!(
        "loaded {} suite(s) from {}",
        config.suites.len(),
        path.display()
    );
    Ok(config)
}

/// Parses a configuration from TOML text.
pub fn load_config_str(content: &str) -> Result<Config> {
    toml::from_str(content).context("Failed to parse config")
}
