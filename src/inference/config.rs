//! Configuration loading and validation.
//!
//! Reads `gollama.yaml` and resolves environment variables. Config is the
//! single source of truth for the model host, the default model, and the
//! orchestrator's loop bounds.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::errors::InferenceError;
use super::types::SamplingOptions;

// ─── Public Types ────────────────────────────────────────────────────────────

/// Top-level configuration (mirrors `gollama.yaml`).
#[derive(Debug, Clone, Deserialize)]
pub struct GollamaConfig {
    /// Base URL of the model server, e.g. `http://localhost:11434`.
    #[serde(default = "default_host")]
    pub host: String,
    /// Model used when the caller doesn't pick one.
    #[serde(default = "default_model")]
    pub default_model: String,
    /// How long the server keeps the model loaded between calls.
    #[serde(default)]
    pub keep_alive: Option<String>,
    /// Maximum decide→generate→evaluate cycles per prompt.
    #[serde(default = "default_query_attempts")]
    pub query_attempts: u32,
    /// Wall-clock budget for one prompt, checked between attempts.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Sampling defaults applied under per-call options.
    #[serde(default)]
    pub sampling: SamplingOptions,
}

fn default_host() -> String {
    "http://localhost:11434".to_string()
}
fn default_model() -> String {
    "llama3:latest".to_string()
}
fn default_query_attempts() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    30
}

impl Default for GollamaConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            default_model: default_model(),
            keep_alive: None,
            query_attempts: default_query_attempts(),
            timeout_secs: default_timeout_secs(),
            sampling: SamplingOptions::default(),
        }
    }
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// Resolve a config path relative to the working directory.
///
/// Searches upward from `start` for `gollama.yaml`. Falls back to the
/// `GOLLAMA_CONFIG` env var if set.
pub fn find_config_path(start: &Path) -> Result<PathBuf, InferenceError> {
    // 1. Check env var
    if let Ok(explicit) = std::env::var("GOLLAMA_CONFIG") {
        let candidate = PathBuf::from(&explicit);
        if candidate.exists() {
            return Ok(candidate);
        }
    }

    // 2. Walk upward from `start`
    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join("gollama.yaml");
        if candidate.exists() {
            return Ok(candidate);
        }
        if !dir.pop() {
            break;
        }
    }

    Err(InferenceError::ConfigError {
        reason: "could not find gollama.yaml".into(),
    })
}

/// Load and parse the configuration file.
///
/// Performs environment-variable interpolation on string values matching
/// `${VAR_NAME}` or `${VAR_NAME:-default}`.
pub fn load_config(path: &Path) -> Result<GollamaConfig, InferenceError> {
    let raw = std::fs::read_to_string(path).map_err(|e| InferenceError::ConfigError {
        reason: format!("failed to read {}: {e}", path.display()),
    })?;

    let interpolated = interpolate_env_vars(&raw);

    let config: GollamaConfig =
        serde_yaml::from_str(&interpolated).map_err(|e| InferenceError::ConfigError {
            reason: format!("failed to parse config: {e}"),
        })?;

    Ok(config)
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

/// Replace `${VAR}` and `${VAR:-default}` in a string.
fn interpolate_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_expr = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_expr.push(c);
            }
            let resolved = resolve_var_expr(&var_expr);
            result.push_str(&resolved);
        } else {
            result.push(ch);
        }
    }

    result
}

/// Resolve a variable expression like `VAR` or `VAR:-default`.
fn resolve_var_expr(expr: &str) -> String {
    if let Some(idx) = expr.find(":-") {
        let var_name = &expr[..idx];
        let default = &expr[idx + 2..];
        std::env::var(var_name).unwrap_or_else(|_| expand_tilde(default))
    } else {
        std::env::var(expr).unwrap_or_default()
    }
}

/// Expand a leading `~` to the user's home directory.
///
/// Uses `dirs::home_dir()` for cross-platform support (works on macOS,
/// Linux, and Windows where `$HOME` may not be set).
fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{rest}", home.display());
        }
    }
    path.to_string()
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpolate_env_vars_with_default() {
        // When env var is NOT set, use default
        std::env::remove_var("__TEST_NONEXISTENT_VAR__");
        let input = "${__TEST_NONEXISTENT_VAR__:-http://fallback:11434}";
        let result = interpolate_env_vars(input);
        assert_eq!(result, "http://fallback:11434");
    }

    #[test]
    fn test_interpolate_env_vars_with_value() {
        std::env::set_var("__TEST_GOLLAMA_VAR__", "http://custom:11434");
        let input = "${__TEST_GOLLAMA_VAR__:-http://fallback:11434}";
        let result = interpolate_env_vars(input);
        assert_eq!(result, "http://custom:11434");
        std::env::remove_var("__TEST_GOLLAMA_VAR__");
    }

    #[test]
    fn test_interpolate_no_vars() {
        let input = "plain text with no variables";
        assert_eq!(interpolate_env_vars(input), input);
    }

    #[test]
    fn test_expand_tilde() {
        let result = expand_tilde("~/Documents");
        assert!(!result.starts_with('~'), "tilde should be expanded");
        assert!(result.ends_with("/Documents"));
    }

    #[test]
    fn test_defaults_when_fields_absent() {
        let yaml = "host: http://localhost:11434\n";
        let config: GollamaConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.query_attempts, 3);
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.default_model, "llama3:latest");
        assert!(config.sampling.temperature.is_none());
    }

    #[test]
    fn test_full_config_parses() {
        let yaml = r#"
            host: http://localhost:11434
            default_model: "mistral:7b"
            keep_alive: "5m"
            query_attempts: 5
            timeout_secs: 60
            sampling:
              temperature: 0.7
              num_ctx: 8192
        "#;
        let config: GollamaConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.default_model, "mistral:7b");
        assert_eq!(config.query_attempts, 5);
        assert_eq!(config.timeout_secs, 60);
        assert_eq!(config.sampling.temperature, Some(0.7));
        assert_eq!(config.sampling.num_ctx, Some(8192));
    }

    #[test]
    fn test_find_config_path_missing() {
        let dir = tempfile::tempdir().unwrap();
        std::env::remove_var("GOLLAMA_CONFIG");
        let result = find_config_path(dir.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_find_config_path_walks_upward() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("gollama.yaml"), "host: http://x:1\n").unwrap();
        let nested = dir.path().join("a/b/c");
        std::fs::create_dir_all(&nested).unwrap();

        let found = find_config_path(&nested).unwrap();
        assert_eq!(found, dir.path().join("gollama.yaml"));
    }
}
