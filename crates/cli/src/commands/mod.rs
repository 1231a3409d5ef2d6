pub mod chunk;
pub mod config_cmd;
pub mod routes;
pub mod search;

use anyhow::Context;
use std::path::Path;
use wayfinder_config::AppConfig;

/// Load `path`, or the default config with environment overrides.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    match path {
        Some(path) => AppConfig::load_from(path).with_context(|| format!("Failed to load {}", path.display())),
        None => AppConfig::load().context("Failed to load config"),
    }
}

/// File stem used as the source tag and fallback section name.
pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string())
}
