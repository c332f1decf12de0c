//! Configuration validation.
//!
//! Detects unknown or misspelled fields, type errors, and settings that
//! parse but make the service misbehave.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use crate::{loader, schema::HeraldConfig};

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Category: "syntax", "unknown-field", "type-error", "semantic", "file-ref"
    pub category: &'static str,
    /// Dotted path, e.g. "broadcast.cooldown_ms"
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.path.is_empty() {
            write!(f, "{} [{}]: {}", self.severity, self.category, self.message)
        } else {
            write!(
                f,
                "{} [{}] {}: {}",
                self.severity, self.category, self.path, self.message
            )
        }
    }
}

/// Result of validating a configuration file.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<PathBuf>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

// ── Schema tree for unknown-field detection ─────────────────────────────────

enum KnownKeys {
    Struct(HashMap<&'static str, KnownKeys>),
    /// Dynamic keys, e.g. `metrics.labels`.
    Map,
    Leaf,
}

/// Mirrors every field in `schema.rs`.
fn build_schema_map() -> KnownKeys {
    use KnownKeys::{Leaf, Map, Struct};

    Struct(HashMap::from([
        (
            "session",
            Struct(HashMap::from([("ready_timeout_secs", Leaf)])),
        ),
        (
            "broadcast",
            Struct(HashMap::from([
                ("cooldown_ms", Leaf),
                ("pacing_ms", Leaf),
                ("sweep_after_windows", Leaf),
                ("sweep_every", Leaf),
            ])),
        ),
        (
            "discord",
            Struct(HashMap::from([
                ("guild_members", Leaf),
                ("message_content", Leaf),
            ])),
        ),
        (
            "metrics",
            Struct(HashMap::from([("enabled", Leaf), ("labels", Map)])),
        ),
    ]))
}

// ── Levenshtein distance ────────────────────────────────────────────────────

fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b_chars.len();
    }

    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b_chars.len()]
}

/// Closest candidate within `max_distance` edits.
fn suggest<'a>(needle: &str, candidates: &[&'a str], max_distance: usize) -> Option<&'a str> {
    candidates
        .iter()
        .map(|&c| (c, levenshtein(needle, c)))
        .filter(|&(_, d)| d > 0 && d <= max_distance)
        .min_by_key(|&(c, d)| (d, c))
        .map(|(c, _)| c)
}

// ── Core validation ─────────────────────────────────────────────────────────

/// Validate a config file at the given path, or discover the default config
/// file location if `path` is `None`.
#[must_use]
pub fn validate(path: Option<&Path>) -> ValidationResult {
    let config_path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => loader::find_config_file(),
    };

    let Some(actual_path) = config_path else {
        return ValidationResult {
            diagnostics: vec![Diagnostic {
                severity: Severity::Info,
                category: "file-ref",
                path: String::new(),
                message: "no config file found; using defaults".into(),
            }],
            config_path: None,
        };
    };

    let mut result = match loader::load_config_value(&actual_path) {
        Ok(value) => validate_value(&value),
        Err(e) => ValidationResult {
            diagnostics: vec![Diagnostic {
                severity: Severity::Error,
                category: "syntax",
                path: String::new(),
                message: e.to_string(),
            }],
            config_path: None,
        },
    };
    result.config_path = Some(actual_path);
    result
}

/// Validate TOML text without touching the file system.
#[must_use]
pub fn validate_toml_str(toml_str: &str) -> ValidationResult {
    match loader::parse_config_value(toml_str, Path::new("herald.toml")) {
        Ok(value) => validate_value(&value),
        Err(e) => ValidationResult {
            diagnostics: vec![Diagnostic {
                severity: Severity::Error,
                category: "syntax",
                path: String::new(),
                message: format!("TOML syntax error: {e}"),
            }],
            config_path: None,
        },
    }
}

fn validate_value(value: &serde_json::Value) -> ValidationResult {
    let mut diagnostics = Vec::new();

    check_unknown_fields(value, &build_schema_map(), "", &mut diagnostics);

    match serde_json::from_value::<HeraldConfig>(value.clone()) {
        Ok(config) => check_semantic_warnings(&config, &mut diagnostics),
        Err(e) => diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category: "type-error",
            path: String::new(),
            message: format!("type error: {e}"),
        }),
    }

    ValidationResult {
        diagnostics,
        config_path: None,
    }
}

/// Walk the value tree against the schema tree and flag unknown keys.
fn check_unknown_fields(
    value: &serde_json::Value,
    schema: &KnownKeys,
    prefix: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let (serde_json::Value::Object(table), KnownKeys::Struct(fields)) = (value, schema) else {
        // Leaf, dynamic map or type mismatch: type errors are caught later
        return;
    };

    let known_keys: Vec<&str> = fields.keys().copied().collect();
    for (key, child_value) in table {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        if let Some(child_schema) = fields.get(key.as_str()) {
            check_unknown_fields(child_value, child_schema, &path, diagnostics);
            continue;
        }
        let level = if prefix.is_empty() {
            "at top level "
        } else {
            ""
        };
        let message = match suggest(key, &known_keys, 3) {
            Some(s) => format!("unknown field {level}(did you mean \"{s}\"?)"),
            None => format!("unknown field {level}"),
        };
        diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category: "unknown-field",
            path,
            message: message.trim().to_string(),
        });
    }
}

fn check_semantic_warnings(config: &HeraldConfig, diagnostics: &mut Vec<Diagnostic>) {
    let mut push = |severity, path: &str, message: &str| {
        diagnostics.push(Diagnostic {
            severity,
            category: "semantic",
            path: path.into(),
            message: message.into(),
        });
    };

    if config.session.ready_timeout_secs == 0 {
        push(
            Severity::Error,
            "session.ready_timeout_secs",
            "must be greater than zero; every session would time out immediately",
        );
    }
    if config.broadcast.cooldown_ms == 0 {
        push(
            Severity::Warning,
            "broadcast.cooldown_ms",
            "zero disables the per-recipient cooldown",
        );
    }
    if config.broadcast.pacing_ms == 0 {
        push(
            Severity::Warning,
            "broadcast.pacing_ms",
            "zero sends back to back and relies on the gateway's own rate limiting",
        );
    }
    if config.broadcast.sweep_after_windows == 0 {
        push(
            Severity::Warning,
            "broadcast.sweep_after_windows",
            "values below 1 are treated as 1",
        );
    }
    if config.broadcast.sweep_every == 0 {
        push(
            Severity::Warning,
            "broadcast.sweep_every",
            "values below 1 are treated as 1 (sweep on every check)",
        );
    }
    if !config.discord.guild_members {
        push(
            Severity::Warning,
            "discord.guild_members",
            "guild members cannot be listed; broadcasts only reach direct-message contacts",
        );
    }
}
