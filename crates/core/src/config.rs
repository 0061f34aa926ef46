use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use once_cell::sync::Lazy;
use serde::Deserialize;

static CONFIG_FILE_NAME: &str = "config.toml";
static ENV_API_URL: &str = "LOCDASH_API_URL";
static ENV_ACTOR: &str = "LOCDASH_ACTOR";
static ENV_TIMEOUT_SECS: &str = "LOCDASH_TIMEOUT_SECS";
static ENV_CONFIG: &str = "LOCDASH_CONFIG";

pub static DEFAULT_API_URL: &str = "http://localhost:8000";
pub static DEFAULT_ACTOR: &str = "current.user";
const DEFAULT_TIMEOUT_SECS: u64 = 10;

static PROJECT_DIRS: Lazy<Option<ProjectDirs>> =
    Lazy::new(|| ProjectDirs::from("dev", "locdash", "locdash"));

/// Values given explicitly, typically from command line flags. They win over everything else.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub api_url: Option<String>,
    pub actor: Option<String>,
    pub timeout_secs: Option<u64>,
    pub config_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    api_url: Option<String>,
    actor: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    api_url: String,
    actor: String,
    request_timeout: Duration,
    config_path: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            actor: DEFAULT_ACTOR.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            config_path: None,
        }
    }
}

impl AppConfig {
    /// Construct [`AppConfig`] from the overrides, `LOCDASH_*` environment variables, the
    /// optional `config.toml` and built-in defaults, in that order of precedence.
    pub fn discover(overrides: ConfigOverrides) -> Result<Self> {
        Self::resolve_with(overrides, |name| env::var(name).ok())
    }

    /// Same as [`AppConfig::discover`] with a custom environment lookup.
    pub fn resolve_with<F>(overrides: ConfigOverrides, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let explicit_path = overrides
            .config_path
            .clone()
            .or_else(|| env(ENV_CONFIG).map(PathBuf::from));
        let (file, config_path) = match explicit_path {
            Some(path) => {
                if !path.exists() {
                    bail!("Config file not found at {}", path.display());
                }
                (load_file(&path)?, Some(path))
            }
            None => match default_config_path().filter(|path| path.exists()) {
                Some(path) => (load_file(&path)?, Some(path)),
                None => (FileConfig::default(), None),
            },
        };

        let api_url = overrides
            .api_url
            .or_else(|| env(ENV_API_URL))
            .or(file.api_url)
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let api_url = api_url.trim().trim_end_matches('/').to_string();
        if api_url.is_empty() {
            bail!("API URL must not be empty");
        }

        let actor = overrides
            .actor
            .or_else(|| env(ENV_ACTOR))
            .or(file.actor)
            .map(|actor| actor.trim().to_string())
            .filter(|actor| !actor.is_empty())
            .unwrap_or_else(|| DEFAULT_ACTOR.to_string());

        let timeout_secs = match overrides.timeout_secs {
            Some(secs) => secs,
            None => match env(ENV_TIMEOUT_SECS) {
                Some(raw) => raw.trim().parse::<u64>().with_context(|| {
                    format!("Invalid {ENV_TIMEOUT_SECS} value '{raw}', expected whole seconds")
                })?,
                None => file.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
            },
        };
        if timeout_secs == 0 {
            bail!("Request timeout must be at least one second");
        }

        Ok(Self {
            api_url,
            actor,
            request_timeout: Duration::from_secs(timeout_secs),
            config_path,
        })
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub fn actor(&self) -> &str {
        &self.actor
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// The config file that was read, if any.
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }
}

fn default_config_path() -> Option<PathBuf> {
    PROJECT_DIRS
        .as_ref()
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

fn load_file(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("Invalid config file at {}", path.display()))
}
