use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{env_subst::substitute_env, schema::HeraldConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["herald.toml", "herald.yaml", "herald.yml", "herald.json"];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<HeraldConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Load and parse the config file into a generic value, after env
/// substitution. Used by validation to see keys the schema would ignore.
pub fn load_config_value(path: &Path) -> anyhow::Result<serde_json::Value> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config_value(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./herald.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/herald/herald.{toml,yaml,yml,json}` (user-global)
///
/// Returns `HeraldConfig::default()` if no config file is found.
pub fn discover_and_load() -> HeraldConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    HeraldConfig::default()
}

/// Load an explicitly requested file, or fall back to discovery.
///
/// Unlike discovery, an explicit path that cannot be loaded is an error.
pub fn load_or_discover(path: Option<&Path>) -> anyhow::Result<HeraldConfig> {
    match path {
        Some(path) => {
            debug!(path = %path.display(), "loading config from explicit path");
            load_config(path)
        },
        None => Ok(discover_and_load()),
    }
}

/// Find the first config file in standard locations.
pub fn find_config_file() -> Option<PathBuf> {
    find_config_file_in(Path::new("."), config_dir().as_deref())
}

fn find_config_file_in(local: &Path, user: Option<&Path>) -> Option<PathBuf> {
    std::iter::once(local)
        .chain(user)
        .flat_map(|dir| CONFIG_FILENAMES.iter().map(move |name| dir.join(name)))
        .find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/herald/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "herald").map(|d| d.config_dir().to_path_buf())
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<HeraldConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}

pub(crate) fn parse_config_value(raw: &str, path: &Path) -> anyhow::Result<serde_json::Value> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => {
            let v: toml::Value = toml::from_str(raw)?;
            Ok(serde_json::to_value(v)?)
        },
        "yaml" | "yml" => {
            let v: serde_yaml::Value = serde_yaml::from_str(raw)?;
            Ok(serde_json::to_value(v)?)
        },
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}
