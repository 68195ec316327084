//! TOML configuration with environment overrides.
//!
//! Load order: explicit path, the `E2E_DASHBOARD_CONFIG` environment variable,
//! `./e2e-dashboard.toml`, then compiled-in defaults. Probe-facing environment
//! variables (`PUSHGATEWAY_URL`, `E2E_ENV`, ...) are applied last.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::history::DEFAULT_HISTORY_LIMIT;
use crate::parser::ServiceKind;
use crate::storage::StatusEncoding;

pub const CONFIG_ENV: &str = "E2E_DASHBOARD_CONFIG";
const LOCAL_CONFIG: &str = "e2e-dashboard.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub history: HistoryConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
    pub services: Vec<ServiceConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            paths: PathsConfig::default(),
            history: HistoryConfig::default(),
            metrics: MetricsConfig::default(),
            logging: LoggingConfig::default(),
            services: default_services(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Resolve the config file and apply environment overrides.
    ///
    /// An explicitly requested file must load; the fallbacks only warn.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load(path)?,
            None => Self::load_or_default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn load_or_default() -> Self {
        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "E2E_DASHBOARD_CONFIG set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let local = Path::new(LOCAL_CONFIG);
        if local.exists() {
            match Self::load(local) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %local.display(),
                        error = %e,
                        "config file could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Self::default()
    }

    /// Apply the environment variables probes and CI jobs already export.
    /// Empty values are treated as unset.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("PUSHGATEWAY_URL") {
            self.metrics.gateway_url = Some(url);
        }
        if let Some(user) = get("PUSHGATEWAY_USERNAME") {
            self.metrics.username = Some(user);
        }
        if let Some(password) = get("PUSHGATEWAY_PASSWORD") {
            self.metrics.password = Some(password);
        }
        if let Some(env) = get("E2E_ENV") {
            self.metrics.env = env;
        }
        if let Some(dir) = get("E2E_LOG_DIR") {
            self.paths.log_dir = PathBuf::from(dir);
        }
        if let Some(output) = get("E2E_STATUS_OUTPUT") {
            self.paths.output = PathBuf::from(output);
        }
    }

    pub fn service(&self, name: &str) -> Option<&ServiceConfig> {
        self.services.iter().find(|s| s.name == name)
    }

    /// Full path of a service's log file.
    pub fn log_path(&self, service: &ServiceConfig) -> PathBuf {
        self.paths.log_dir.join(&service.log_file)
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory the probes append their logs to.
    pub log_dir: PathBuf,
    /// Snapshot document read by the dashboard.
    pub output: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("results/logs"),
            output: PathBuf::from("results/status_data.json"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Entries retained per service.
    pub limit: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Pushgateway base URL. Pushing is disabled when unset.
    pub gateway_url: Option<String>,
    /// Environment tag used in the grouping key.
    pub env: String,
    /// Job for per-run outcome gauges.
    pub job: String,
    /// Job for windowed log summaries; kept apart from `job` so a summary
    /// push never replaces the outcome gauges.
    pub summary_job: String,
    pub metric_prefix: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            gateway_url: None,
            env: "dev".to_string(),
            job: "e2e_direct".to_string(),
            summary_job: "eodc_e2e".to_string(),
            metric_prefix: "eodc_e2e".to_string(),
            username: None,
            password: None,
            timeout_secs: 15,
        }
    }
}

impl MetricsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Credentials, only when both halves are configured.
    pub fn basic_auth(&self) -> Option<(String, String)> {
        match (&self.username, &self.password) {
            (Some(user), Some(password)) => Some((user.clone(), password.clone())),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum tracing level (`trace`, `debug`, `info`, `warn`, `error`).
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// One tracked service and the log its probe writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub kind: ServiceKind,
    /// Relative to `paths.log_dir` unless absolute.
    pub log_file: PathBuf,
    #[serde(default)]
    pub encoding: StatusEncoding,
}

impl ServiceConfig {
    pub fn new(name: &str, kind: ServiceKind, log_file: &str, encoding: StatusEncoding) -> Self {
        Self {
            name: name.to_string(),
            kind,
            log_file: PathBuf::from(log_file),
            encoding,
        }
    }
}

/// Services tracked when none are configured.
pub fn default_services() -> Vec<ServiceConfig> {
    vec![
        ServiceConfig::new(
            "Dask Gateway",
            ServiceKind::Dask,
            "test_DaskGateway.log",
            StatusEncoding::Numeric,
        ),
        ServiceConfig::new(
            "openEO API",
            ServiceKind::OpenEo,
            "test_openEO.log",
            StatusEncoding::Token,
        ),
        ServiceConfig::new("STAC API", ServiceKind::Stac, "latest_test.log", StatusEncoding::Token),
        ServiceConfig::new(
            "Notebooks",
            ServiceKind::Notebook,
            "test_notebooks.log",
            StatusEncoding::Token,
        ),
        ServiceConfig::new(
            "OpenStack",
            ServiceKind::OpenStack,
            "test_openstack.log",
            StatusEncoding::Numeric,
        ),
    ]
}
