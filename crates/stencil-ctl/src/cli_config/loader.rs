//! Layered loading of `.stencil.toml`.
//!
//! The user-global `~/.config/stencil.toml` is read first, then the
//! project-local `./.stencil.toml` is merged over it key by key. A file that
//! exists but cannot be read or parsed is an error naming its path.

use std::path::{Path, PathBuf};

use anyhow::Context;
use toml::{Table, Value};

use super::CliConfig;

const CONFIG_FILENAME: &str = ".stencil.toml";
const GLOBAL_CONFIG_DIR: &str = ".config";
const GLOBAL_CONFIG_FILENAME: &str = "stencil.toml";

/// Load the global then the local config layer. Missing files are skipped.
pub(crate) fn load_cli_config() -> anyhow::Result<CliConfig> {
    let global = home_dir().map(|home| home.join(GLOBAL_CONFIG_DIR).join(GLOBAL_CONFIG_FILENAME));
    let layers: Vec<PathBuf> = global
        .into_iter()
        .chain(std::iter::once(PathBuf::from(CONFIG_FILENAME)))
        .collect();
    load_layers(&layers)
}

/// Merge the config files in `paths`, later files overriding earlier keys.
fn load_layers(paths: &[PathBuf]) -> anyhow::Result<CliConfig> {
    let mut merged = Table::new();
    for path in paths.iter().filter(|path| path.is_file()) {
        for (key, value) in read_layer(path)? {
            merged.insert(key, value);
        }
    }
    Value::Table(merged)
        .try_into()
        .context("cannot combine config layers")
}

fn read_layer(path: &Path) -> anyhow::Result<Table> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read config file '{}'", path.display()))?;
    let invalid = || format!("invalid config file '{}'", path.display());
    let layer: Table = toml::from_str(&contents).with_context(invalid)?;
    // Type errors are reported against the file that carries them.
    let _: CliConfig = Value::Table(layer.clone()).try_into().with_context(invalid)?;
    tracing::debug!(path = %path.display(), keys = layer.len(), "loaded config layer");
    Ok(layer)
}

/// Expand a configured path, resolving `~` to the home directory.
pub(crate) fn expand_path(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}
