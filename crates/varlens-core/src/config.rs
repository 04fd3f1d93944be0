//! Configuration and credential resolution.
//!
//! `varlens.yaml` is optional; every field has a serde default so a missing
//! or partial file behaves like the built-in configuration. The API key is
//! deliberately not a plain config field read ad hoc around the codebase:
//! [`resolve_api_key`] is the single place the precedence lives.

use crate::dataset::Schema;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "varlens.yaml";

/// Environment variable holding the deployment-managed credential.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Column-role names for the required schema.
    #[serde(default)]
    pub schema: Schema,

    /// Dataset used when no file is supplied on the command line.
    #[serde(default = "default_dataset")]
    pub default_dataset: PathBuf,

    /// Planner model name.
    #[serde(default = "default_model")]
    pub model: String,

    /// Maximum plan-act-observe iterations per question.
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,

    /// Per-call planner timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub planner_timeout_secs: u64,

    /// Cap on rows in a table query outcome.
    #[serde(default = "default_table_cap")]
    pub table_cap: usize,

    /// API key in the config file. Lower precedence than the environment;
    /// prefer the env var outside local experiments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

fn default_dataset() -> PathBuf {
    PathBuf::from("sample_data.csv")
}

fn default_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_max_steps() -> u32 {
    10
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_table_cap() -> usize {
    crate::query::DEFAULT_TABLE_CAP
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schema: Schema::default(),
            default_dataset: default_dataset(),
            model: default_model(),
            max_steps: default_max_steps(),
            planner_timeout_secs: default_timeout_secs(),
            table_cap: default_table_cap(),
            api_key: None,
        }
    }
}

impl Config {
    /// Load `varlens.yaml` from `dir`, falling back to the user-level file
    /// (`~/.config/varlens/varlens.yaml`), then to defaults.
    pub fn load(dir: &Path) -> Result<Config> {
        let local = dir.join(CONFIG_FILE);
        let path = if local.exists() {
            local
        } else {
            match user_config_path() {
                Some(p) if p.exists() => p,
                _ => return Ok(Config::default()),
            }
        };
        let text = std::fs::read_to_string(&path)?;
        Ok(serde_yaml::from_str(&text)?)
    }
}

/// `~/.config/varlens/varlens.yaml`, if a home directory exists.
pub fn user_config_path() -> Option<PathBuf> {
    home::home_dir().map(|h| h.join(".config").join("varlens").join(CONFIG_FILE))
}

// ---------------------------------------------------------------------------
// Credential resolution
// ---------------------------------------------------------------------------

/// Where a resolved key came from, shown to the user so a surprising key
/// can be traced to its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Environment,
    ConfigFile,
}

impl std::fmt::Display for KeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeySource::Environment => write!(f, "{API_KEY_ENV} environment variable"),
            KeySource::ConfigFile => write!(f, "config file"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedKey {
    pub key: String,
    pub source: KeySource,
}

/// Resolve the API credential with documented precedence:
///
/// 1. `GEMINI_API_KEY` environment variable (deployment-managed secret)
/// 2. `api_key` in `varlens.yaml`
///
/// `None` means the caller may fall back to an interactive prompt; absence
/// of a key disables question answering but not data viewing.
pub fn resolve_api_key(config: &Config) -> Option<ResolvedKey> {
    if let Ok(key) = std::env::var(API_KEY_ENV) {
        if !key.trim().is_empty() {
            return Some(ResolvedKey {
                key: key.trim().to_string(),
                source: KeySource::Environment,
            });
        }
    }
    config
        .api_key
        .as_ref()
        .filter(|k| !k.trim().is_empty())
        .map(|k| ResolvedKey {
            key: k.trim().to_string(),
            source: KeySource::ConfigFile,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load(dir.path()).unwrap();
        assert_eq!(cfg.model, "gemini-2.0-flash");
        assert_eq!(cfg.max_steps, 10);
        assert_eq!(cfg.schema.account, "Account");
    }

    #[test]
    fn partial_file_keeps_defaults_for_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "model: gemini-2.5-pro\nschema:\n  plan: Budget\n",
        )
        .unwrap();
        let cfg = Config::load(dir.path()).unwrap();
        assert_eq!(cfg.model, "gemini-2.5-pro");
        assert_eq!(cfg.schema.plan, "Budget");
        assert_eq!(cfg.schema.actual, "Actuals");
        assert_eq!(cfg.planner_timeout_secs, 60);
    }

    // Tests run in one process, so anything touching the key variable takes
    // this lock and restores the previous value afterwards.
    static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    fn with_key_env(value: Option<&str>, f: impl FnOnce()) {
        let _guard = ENV_LOCK.lock().unwrap();
        let previous = std::env::var(API_KEY_ENV).ok();
        match value {
            Some(v) => std::env::set_var(API_KEY_ENV, v),
            None => std::env::remove_var(API_KEY_ENV),
        }
        f();
        match previous {
            Some(v) => std::env::set_var(API_KEY_ENV, v),
            None => std::env::remove_var(API_KEY_ENV),
        }
    }

    #[test]
    fn environment_beats_config_file_key() {
        with_key_env(Some("k-env"), || {
            let cfg = Config {
                api_key: Some("k-file".to_string()),
                ..Config::default()
            };
            let resolved = resolve_api_key(&cfg).unwrap();
            assert_eq!(resolved.key, "k-env");
            assert_eq!(resolved.source, KeySource::Environment);
        });
    }

    #[test]
    fn blank_environment_falls_through_to_config_file() {
        with_key_env(Some("   "), || {
            let cfg = Config {
                api_key: Some("k-file".to_string()),
                ..Config::default()
            };
            let resolved = resolve_api_key(&cfg).unwrap();
            assert_eq!(resolved.key, "k-file");
            assert_eq!(resolved.source, KeySource::ConfigFile);
        });
    }

    #[test]
    fn config_file_key_is_used_when_env_is_unset() {
        with_key_env(None, || {
            let cfg = Config {
                api_key: Some("  k-123  ".to_string()),
                ..Config::default()
            };
            let resolved = resolve_api_key(&cfg).unwrap();
            assert_eq!(resolved.key, "k-123");
            assert_eq!(resolved.source, KeySource::ConfigFile);
        });
    }

    #[test]
    fn blank_key_resolves_to_none() {
        with_key_env(None, || {
            let cfg = Config {
                api_key: Some("   ".to_string()),
                ..Config::default()
            };
            assert!(resolve_api_key(&cfg).is_none());
            assert!(resolve_api_key(&Config::default()).is_none());
        });
    }
}
