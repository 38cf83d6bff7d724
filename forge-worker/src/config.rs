//! Worker configuration
//!
//! Defines every configurable parameter of the worker: identity and
//! credentials, control-plane timing, the default frame count and the
//! settings of the compute routine.
//!
//! Values come from an optional TOML file, overridden key by key by
//! `FORGE_*` environment variables. The result is validated once at startup
//! and is read-only afterwards.

use anyhow::{Context, Result};
use forge_core::params::{DEFAULT_FRAME_COUNT, validate_frame_count};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::service::ComputeSettings;

/// Worker configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Unique identifier for this worker instance
    pub worker_id: String,

    /// Control-plane base URL (e.g., "https://app.example.com/api")
    pub endpoint: String,

    /// Bearer credential for the control plane
    pub worker_token: SecretString,

    /// Lease length requested with every poll
    pub lease_duration: Duration,

    /// Idle sleep between polls that returned no task
    pub poll_interval: Duration,

    /// Upper bound of the backoff after failed polls
    pub max_backoff: Duration,

    /// Poll attempts allowed before the first successful contact
    pub startup_retries: u32,

    /// Timeout of each control-plane request
    pub api_timeout: Duration,

    /// Timeout of each artifact transfer
    pub transfer_timeout: Duration,

    /// Lease extension, disabled unless configured
    pub heartbeat: Option<HeartbeatSettings>,

    /// Frame count used when a task does not carry one
    pub frame_num: Option<i64>,

    /// Settings of the external compute routine
    pub compute: ComputeSettings,

    /// Base directory for per-task working sets
    pub temp_dir: PathBuf,

    /// Directory for log files; console only when unset
    pub log_dir: Option<PathBuf>,
}

/// Lease heartbeat timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatSettings {
    /// How often to extend the lease while a task is held
    pub interval: Duration,
    /// Requested extension per heartbeat
    pub extend_by: Duration,
}

impl Config {
    /// Creates a configuration with defaults
    pub fn new(endpoint: String, worker_token: SecretString, compute: ComputeSettings) -> Self {
        Self {
            worker_id: uuid::Uuid::new_v4().to_string(),
            endpoint,
            worker_token,
            lease_duration: Duration::from_secs(600),
            poll_interval: Duration::from_secs(10),
            max_backoff: Duration::from_secs(120),
            startup_retries: 10,
            api_timeout: Duration::from_secs(30),
            transfer_timeout: Duration::from_secs(600),
            heartbeat: None,
            frame_num: None,
            compute,
            temp_dir: std::env::temp_dir().join("forge"),
            log_dir: None,
        }
    }

    /// Loads and validates the configuration
    ///
    /// # Arguments
    /// * `path` - Optional TOML file; environment variables override its values
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_sources(ConfigFile::read(path)?, |key| std::env::var(key).ok())?,
            None => Self::from_env()?,
        };
        config.validate()?;
        config.resolve_paths()?;
        Ok(config)
    }

    /// Makes every configured path absolute against the current directory
    ///
    /// The compute routine runs with its repository as working directory.
    pub fn resolve_paths(&mut self) -> Result<()> {
        self.compute
            .make_absolute()
            .context("Failed to resolve compute paths")?;
        self.temp_dir = std::path::absolute(&self.temp_dir)
            .with_context(|| format!("Failed to resolve temp_dir {}", self.temp_dir.display()))?;
        if let Some(log_dir) = &self.log_dir {
            self.log_dir = Some(
                std::path::absolute(log_dir)
                    .with_context(|| format!("Failed to resolve log_dir {}", log_dir.display()))?,
            );
        }
        Ok(())
    }

    /// Creates configuration from environment variables only
    ///
    /// Required: FORGE_ENDPOINT, FORGE_WORKER_TOKEN, FORGE_MODEL_PATH,
    /// FORGE_COMPUTE_REPO_PATH. Every other key is optional.
    pub fn from_env() -> Result<Self> {
        Self::from_sources(ConfigFile::default(), |key| std::env::var(key).ok())
    }

    /// Merges file values with overrides from `lookup`
    fn from_sources(mut file: ConfigFile, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        file.apply_overrides(&lookup)?;

        let endpoint = file
            .endpoint
            .context("endpoint is not set (FORGE_ENDPOINT)")?;
        let worker_token = file
            .worker_token
            .context("worker_token is not set (FORGE_WORKER_TOKEN)")?;
        let model_path = file
            .model_path
            .context("model_path is not set (FORGE_MODEL_PATH)")?;
        let repo_path = file
            .compute_repo_path
            .context("compute_repo_path is not set (FORGE_COMPUTE_REPO_PATH)")?;

        let mut compute = ComputeSettings::new(repo_path, model_path);
        if let Some(program) = file.compute_program {
            compute.program = program;
        }
        if let Some(script) = file.compute_script {
            compute.script = script;
        }
        if let Some(task_type) = file.task_type {
            compute.task_type = task_type;
        }
        if let Some(solver) = file.sample_solver {
            compute.sample_solver = solver;
        }
        if let Some(steps) = file.sample_steps {
            compute.sample_steps = steps;
        }
        if let Some(scale) = file.cfg_scale {
            compute.cfg_scale = scale;
        }
        if let Some(offload) = file.offload_model {
            compute.offload_model = offload;
        }

        let mut config = Self::new(endpoint, SecretString::from(worker_token), compute);

        if let Some(worker_id) = file.worker_id {
            config.worker_id = worker_id;
        }
        if let Some(secs) = file.lease_duration_seconds {
            config.lease_duration = Duration::from_secs(secs);
        }
        if let Some(secs) = file.poll_interval_seconds {
            config.poll_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = file.max_backoff_seconds {
            config.max_backoff = Duration::from_secs(secs);
        }
        if let Some(retries) = file.startup_retries {
            config.startup_retries = retries;
        }
        if let Some(secs) = file.api_timeout_seconds {
            config.api_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = file.transfer_timeout_seconds {
            config.transfer_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = file.heartbeat_interval_seconds {
            config.heartbeat = Some(HeartbeatSettings {
                interval: Duration::from_secs(secs),
                extend_by: Duration::from_secs(file.heartbeat_extend_seconds.unwrap_or(300)),
            });
        }
        if let Some(temp_dir) = file.temp_dir {
            config.temp_dir = temp_dir;
        }
        config.frame_num = file.frame_num;
        config.log_dir = file.log_dir;

        Ok(config)
    }

    /// Validates the configuration
    ///
    /// Also validates the built-in and configured default frame counts, so
    /// a bad default stops the worker before it claims any task.
    pub fn validate(&self) -> Result<()> {
        if self.worker_id.trim().is_empty() {
            anyhow::bail!("worker_id cannot be empty");
        }

        if self.endpoint.is_empty() {
            anyhow::bail!("endpoint cannot be empty");
        }

        if !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://") {
            anyhow::bail!("endpoint must start with http:// or https://");
        }

        if self.worker_token.expose_secret().trim().is_empty() {
            anyhow::bail!("worker_token cannot be empty");
        }

        if self.lease_duration.is_zero() {
            anyhow::bail!("lease_duration_seconds must be greater than 0");
        }

        if self.poll_interval.is_zero() {
            anyhow::bail!("poll_interval_seconds must be greater than 0");
        }

        if self.max_backoff < self.poll_interval {
            anyhow::bail!("max_backoff_seconds must not be smaller than poll_interval_seconds");
        }

        if self.startup_retries == 0 {
            anyhow::bail!("startup_retries must be greater than 0");
        }

        if self.api_timeout.is_zero() || self.transfer_timeout.is_zero() {
            anyhow::bail!("timeouts must be greater than 0");
        }

        if let Some(heartbeat) = &self.heartbeat {
            if heartbeat.interval.is_zero() || heartbeat.extend_by.is_zero() {
                anyhow::bail!("heartbeat interval and extension must be greater than 0");
            }
            if heartbeat.interval >= self.lease_duration {
                anyhow::bail!("heartbeat_interval_seconds must be shorter than the lease duration");
            }
        }

        validate_frame_count(DEFAULT_FRAME_COUNT)
            .context("built-in default frame count is invalid")?;
        if let Some(frame_num) = self.frame_num {
            validate_frame_count(frame_num).context("invalid default frame_num")?;
        }

        if self.compute.program.trim().is_empty() {
            anyhow::bail!("compute_program cannot be empty");
        }

        if self.compute.sample_steps == 0 {
            anyhow::bail!("sample_steps must be greater than 0");
        }

        if !self.compute.cfg_scale.is_finite() || self.compute.cfg_scale <= 0.0 {
            anyhow::bail!("cfg_scale must be a positive number");
        }

        Ok(())
    }
}

/// On-disk shape of the configuration; every key is optional here
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    endpoint: Option<String>,
    worker_id: Option<String>,
    worker_token: Option<String>,
    lease_duration_seconds: Option<u64>,
    poll_interval_seconds: Option<u64>,
    max_backoff_seconds: Option<u64>,
    startup_retries: Option<u32>,
    api_timeout_seconds: Option<u64>,
    transfer_timeout_seconds: Option<u64>,
    heartbeat_interval_seconds: Option<u64>,
    heartbeat_extend_seconds: Option<u64>,
    frame_num: Option<i64>,
    sample_steps: Option<u32>,
    cfg_scale: Option<f64>,
    sample_solver: Option<String>,
    task_type: Option<String>,
    model_path: Option<PathBuf>,
    compute_repo_path: Option<PathBuf>,
    compute_program: Option<String>,
    compute_script: Option<String>,
    offload_model: Option<bool>,
    temp_dir: Option<PathBuf>,
    log_dir: Option<PathBuf>,
}

impl ConfigFile {
    fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Replaces values with the matching `FORGE_<KEY>` variables
    fn apply_overrides(&mut self, lookup: &dyn Fn(&str) -> Option<String>) -> Result<()> {
        macro_rules! env_override {
            ($($field:ident => $var:literal),* $(,)?) => {
                $(
                    if let Some(value) = parse_var(lookup, $var)? {
                        self.$field = Some(value);
                    }
                )*
            };
        }

        env_override! {
            endpoint => "FORGE_ENDPOINT",
            worker_id => "FORGE_WORKER_ID",
            worker_token => "FORGE_WORKER_TOKEN",
            lease_duration_seconds => "FORGE_LEASE_DURATION_SECONDS",
            poll_interval_seconds => "FORGE_POLL_INTERVAL_SECONDS",
            max_backoff_seconds => "FORGE_MAX_BACKOFF_SECONDS",
            startup_retries => "FORGE_STARTUP_RETRIES",
            api_timeout_seconds => "FORGE_API_TIMEOUT_SECONDS",
            transfer_timeout_seconds => "FORGE_TRANSFER_TIMEOUT_SECONDS",
            heartbeat_interval_seconds => "FORGE_HEARTBEAT_INTERVAL_SECONDS",
            heartbeat_extend_seconds => "FORGE_HEARTBEAT_EXTEND_SECONDS",
            frame_num => "FORGE_FRAME_NUM",
            sample_steps => "FORGE_SAMPLE_STEPS",
            cfg_scale => "FORGE_CFG_SCALE",
            sample_solver => "FORGE_SAMPLE_SOLVER",
            task_type => "FORGE_TASK_TYPE",
            model_path => "FORGE_MODEL_PATH",
            compute_repo_path => "FORGE_COMPUTE_REPO_PATH",
            compute_program => "FORGE_COMPUTE_PROGRAM",
            compute_script => "FORGE_COMPUTE_SCRIPT",
            offload_model => "FORGE_OFFLOAD_MODEL",
            temp_dir => "FORGE_TEMP_DIR",
            log_dir => "FORGE_LOG_DIR",
        }

        Ok(())
    }
}

/// Parses one variable; unparsable values are errors, not silent defaults
fn parse_var<T: FromStr>(lookup: &dyn Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| anyhow::anyhow!("{} has an invalid value", key)),
    }
}
