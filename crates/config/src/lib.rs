//! Configuration loading, validation, and env substitution.
//!
//! Config files: `herald.toml`, `herald.yaml`, `herald.yml` or `herald.json`,
//! searched in `./` then `~/.config/herald/`.
//!
//! Supports `${ENV_VAR}` substitution anywhere in the file.

pub mod env_subst;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    loader::{config_dir, discover_and_load, find_config_file, load_config, load_or_discover},
    schema::{BroadcastConfig, DiscordConfig, HeraldConfig, MetricsConfig, SessionConfig},
    validate::{Diagnostic, Severity, ValidationResult, validate, validate_toml_str},
};
