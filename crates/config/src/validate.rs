//! Configuration validation.
//!
//! Detects unknown/misspelled fields (with suggestions), type errors, and
//! settings that would make the dispatch engine misbehave at runtime.

use std::{collections::HashMap, fmt, path::Path};

use crate::{
    loader::{find_config_file, parse_config, parse_config_value},
    schema::HeraldConfig,
};

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
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
    /// Category: "syntax", "unknown-field", "type-error", "value", "env"
    pub category: &'static str,
    /// Dotted path, e.g. "push.max_attempts"
    pub path: String,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{} [{}] {}", self.severity, self.category, self.message)
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
    pub config_path: Option<std::path::PathBuf>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

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
    Leaf,
}

/// Mirrors every field in `schema.rs`.
fn build_schema_map() -> KnownKeys {
    use KnownKeys::{Leaf, Struct};

    Struct(HashMap::from([
        ("origin", Leaf),
        (
            "bus",
            Struct(HashMap::from([("capacity", Leaf), ("overflow", Leaf)])),
        ),
        (
            "bots",
            Struct(HashMap::from([
                ("enabled", Leaf),
                ("delivery_timeout_secs", Leaf),
                ("user_agent", Leaf),
            ])),
        ),
        (
            "push",
            Struct(HashMap::from([
                ("enabled", Leaf),
                ("endpoint", Leaf),
                ("api_key", Leaf),
                ("max_attempts", Leaf),
                ("attempt_timeout_secs", Leaf),
                ("base_backoff_ms", Leaf),
                ("max_backoff_ms", Leaf),
                ("max_concurrent_sends", Leaf),
            ])),
        ),
        (
            "engine",
            Struct(HashMap::from([("drain_timeout_secs", Leaf)])),
        ),
        ("metrics", Struct(HashMap::from([("enabled", Leaf)]))),
    ]))
}

// ── Levenshtein distance ────────────────────────────────────────────────────

fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
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

/// Closest candidate within `max_distance` edits, if any.
fn suggest<'a>(needle: &str, candidates: &[&'a str], max_distance: usize) -> Option<&'a str> {
    let mut best: Option<(&'a str, usize)> = None;
    for &candidate in candidates {
        let d = levenshtein(needle, candidate);
        if d > 0 && d <= max_distance && best.as_ref().is_none_or(|(_, bd)| d < *bd) {
            best = Some((candidate, d));
        }
    }
    best.map(|(s, _)| s)
}

// ── Core validation ─────────────────────────────────────────────────────────

/// Validate a config file at the given path, or the discovered one if `path`
/// is `None`.
#[must_use]
pub fn validate(path: Option<&Path>) -> ValidationResult {
    let config_path = path.map(Path::to_path_buf).or_else(find_config_file);

    let Some(actual_path) = config_path else {
        return ValidationResult {
            diagnostics: vec![Diagnostic {
                severity: Severity::Info,
                category: "syntax",
                path: String::new(),
                message: "no config file found; using defaults".into(),
            }],
            config_path: None,
        };
    };

    let mut result = match std::fs::read_to_string(&actual_path) {
        Ok(content) => validate_str(&crate::env_subst::substitute_env(&content), &actual_path),
        Err(e) => ValidationResult {
            diagnostics: vec![Diagnostic {
                severity: Severity::Error,
                category: "syntax",
                path: String::new(),
                message: format!("failed to read config file: {e}"),
            }],
            config_path: None,
        },
    };
    result.config_path = Some(actual_path);
    result
}

/// Validate raw config text. The format is taken from `path`'s extension;
/// nothing is read from disk.
#[must_use]
pub fn validate_str(raw: &str, path: &Path) -> ValidationResult {
    let mut diagnostics = Vec::new();

    let value = match parse_config_value(raw, path) {
        Ok(v) => v,
        Err(e) => {
            diagnostics.push(Diagnostic {
                severity: Severity::Error,
                category: "syntax",
                path: String::new(),
                message: format!("syntax error: {e}"),
            });
            return ValidationResult {
                diagnostics,
                config_path: None,
            };
        },
    };

    check_unknown_fields(&value, &build_schema_map(), "", &mut diagnostics);
    check_unresolved_env(&value, "", &mut diagnostics);

    match parse_config(raw, path) {
        Ok(config) => check_semantics(&config, &mut diagnostics),
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

/// Validate a TOML string.
#[must_use]
pub fn validate_toml_str(toml_str: &str) -> ValidationResult {
    validate_str(toml_str, Path::new("herald.toml"))
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

fn check_unknown_fields(
    value: &serde_json::Value,
    schema: &KnownKeys,
    prefix: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let (serde_json::Value::Object(map), KnownKeys::Struct(fields)) = (value, schema) else {
        // Leaf or type mismatch, caught by the typed parse.
        return;
    };
    let known: Vec<&str> = fields.keys().copied().collect();
    for (key, child) in map {
        let path = join(prefix, key);
        if let Some(child_schema) = fields.get(key.as_str()) {
            check_unknown_fields(child, child_schema, &path, diagnostics);
            continue;
        }
        let level = if prefix.is_empty() {
            " at top level"
        } else {
            ""
        };
        let message = match suggest(key, &known, 3) {
            Some(s) => format!("unknown field{level} (did you mean \"{s}\"?)"),
            None => format!("unknown field{level}"),
        };
        diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category: "unknown-field",
            path,
            message,
        });
    }
}

fn check_unresolved_env(value: &serde_json::Value, prefix: &str, diagnostics: &mut Vec<Diagnostic>) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, child) in map {
                check_unresolved_env(child, &join(prefix, key), diagnostics);
            }
        },
        serde_json::Value::String(s) if s.contains("${") => {
            diagnostics.push(Diagnostic {
                severity: Severity::Warning,
                category: "env",
                path: prefix.to_string(),
                message: "contains an unresolved ${...} placeholder".into(),
            });
        },
        _ => {},
    }
}

fn check_semantics(config: &HeraldConfig, diagnostics: &mut Vec<Diagnostic>) {
    let mut error = |path: &str, message: String| {
        diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category: "value",
            path: path.into(),
            message,
        });
    };

    match url::Url::parse(&config.origin) {
        Ok(u) if matches!(u.scheme(), "http" | "https") => {},
        Ok(u) => error(
            "origin",
            format!("unsupported scheme \"{}\"; expected http or https", u.scheme()),
        ),
        Err(e) => error("origin", format!("not a valid URL: {e}")),
    }
    if config.bus.capacity == 0 {
        error("bus.capacity", "must be at least 1".into());
    }
    if config.bots.delivery_timeout_secs == 0 {
        error("bots.delivery_timeout_secs", "must be at least 1".into());
    }
    if config.push.max_attempts == 0 {
        error("push.max_attempts", "must be at least 1".into());
    }
    if config.push.attempt_timeout_secs == 0 {
        error("push.attempt_timeout_secs", "must be at least 1".into());
    }
    if config.push.max_concurrent_sends == 0 {
        error("push.max_concurrent_sends", "must be at least 1".into());
    }
    if let Some(endpoint) = config.push.endpoint.as_deref()
        && let Err(e) = url::Url::parse(endpoint)
    {
        error("push.endpoint", format!("not a valid URL: {e}"));
    }

    if config.push.base_backoff_ms > config.push.max_backoff_ms {
        diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            category: "value",
            path: "push.base_backoff_ms".into(),
            message: format!(
                "base backoff ({}ms) exceeds max backoff ({}ms); every retry waits the max",
                config.push.base_backoff_ms, config.push.max_backoff_ms
            ),
        });
    }
    if config.push.enabled && config.push.endpoint.is_none() {
        diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            category: "value",
            path: "push.endpoint".into(),
            message: "push is enabled but no endpoint is set; only dry-run delivery is possible"
                .into(),
        });
    }
    if config.push.endpoint.is_some() && config.push.api_key().is_none() {
        diagnostics.push(Diagnostic {
            severity: Severity::Info,
            category: "value",
            path: "push.api_key".into(),
            message: "no api key; requests to the push endpoint are unauthenticated".into(),
        });
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
