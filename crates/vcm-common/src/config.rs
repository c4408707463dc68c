//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Shared primitives and utilities for the core runtime."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use tracing::debug;

use crate::auth::{is_password_hash, Role, HASH_SCHEME};
use crate::logging::LogFormat;

fn default_api_enabled() -> bool {
    true
}

fn default_api_listen() -> SocketAddr {
    "0.0.0.0:8000".parse().expect("valid default api address")
}

fn default_status_path() -> PathBuf {
    PathBuf::from("target/vcm/battery_status.json")
}

fn default_max_age() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_realm() -> String {
    "vcm".to_owned()
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_file() -> bool {
    true
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_listen() -> SocketAddr {
    "0.0.0.0:9898"
        .parse()
        .expect("valid default metrics address")
}

/// Primary configuration object for the VCM relay daemon.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: PathBuf,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "VCM_CONFIG";

    /// Load configuration from disk, respecting the `VCM_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            let path = candidate.as_ref();
            if path.exists() {
                let config = Self::from_path(path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path.to_path_buf(),
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    /// Load an explicitly named file, or search `defaults` when none is given.
    ///
    /// An explicit path is never substituted: if it does not exist the load
    /// fails instead of falling back to a default candidate.
    pub fn load_explicit_or<P: AsRef<Path>>(
        explicit: Option<&Path>,
        defaults: &[P],
    ) -> Result<LoadedAppConfig> {
        let Some(path) = explicit else {
            return Self::load_with_source(defaults);
        };
        if !path.exists() {
            return Err(anyhow!(
                "configuration file {} does not exist",
                path.display()
            ));
        }
        Ok(LoadedAppConfig {
            config: Self::from_path(path)?,
            source: path.to_path_buf(),
        })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        contents
            .parse::<AppConfig>()
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.storage.validate()?;
        self.auth.validate()?;
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_enabled")]
    pub enabled: bool,
    #[serde(default = "default_api_listen")]
    pub listen: SocketAddr,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: default_api_enabled(),
            listen: default_api_listen(),
        }
    }
}

/// Where the latest status lives and how long it stays valid.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_status_path")]
    pub path: PathBuf,
    #[serde(default = "default_max_age")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub max_age: Duration,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_status_path(),
            max_age: default_max_age(),
        }
    }
}

impl StorageConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_age.is_zero() {
            return Err(anyhow!("storage.max_age must be greater than zero"));
        }
        if self.path.as_os_str().is_empty() {
            return Err(anyhow!("storage.path must not be empty"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_realm")]
    pub realm: String,
    #[serde(default)]
    pub users: IndexMap<String, UserConfig>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            realm: default_realm(),
            users: IndexMap::new(),
        }
    }
}

impl AuthConfig {
    pub fn validate(&self) -> Result<()> {
        if self.users.is_empty() {
            return Err(anyhow!("auth must declare at least one user"));
        }
        for (username, user) in &self.users {
            user.validate(username)?;
        }
        Ok(())
    }

    pub fn user(&self, username: &str) -> Option<&UserConfig> {
        self.users.get(username)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserConfig {
    /// `pbkdf2-sha256$<iterations>$<salt>$<hash>`, see `vcmctl hash-password`.
    pub password_hash: String,
    #[serde(default)]
    pub roles: Vec<Role>,
}

impl UserConfig {
    pub fn validate(&self, username: &str) -> Result<()> {
        if username.is_empty() || username.contains(':') {
            return Err(anyhow!("invalid username '{}'", username));
        }
        if !is_password_hash(&self.password_hash) {
            return Err(anyhow!(
                "user '{}' password_hash must have the form {}$<iterations>$<salt hex>$<hash hex>",
                username,
                HASH_SCHEME
            ));
        }
        if self.roles.is_empty() {
            return Err(anyhow!("user '{}' must hold at least one role", username));
        }
        Ok(())
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    /// Also write JSON logs to a daily rolling file in `directory`.
    #[serde(default = "default_log_file")]
    pub file: bool,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file: default_log_file(),
            file_prefix: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    #[serde(default = "default_metrics_listen")]
    pub listen: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            listen: default_metrics_listen(),
        }
    }
}
