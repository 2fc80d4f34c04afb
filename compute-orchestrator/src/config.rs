use crate::error::{OrchestratorError, Result};
use crate::labels::LabelSet;
use crate::retry::RetryPolicy;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct ComputeConfig {
    #[serde(default = "default_control_plane_url")]
    pub control_plane_url: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default = "default_bulk_concurrency")]
    pub bulk_concurrency: usize,

    #[serde(default)]
    pub runtime_defaults: RuntimeDefaults,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

/// Values stamped onto every runtime creation request.
#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeDefaults {
    #[serde(default = "default_tool_docker_image")]
    pub tool_docker_image: String,

    /// Base URL of the static assets (startup scripts, notebook extensions).
    #[serde(default = "default_assets_base_url")]
    pub assets_base_url: String,

    #[serde(default = "default_client_id")]
    pub default_client_id: Option<String>,
}

fn default_control_plane_url() -> String {
    std::env::var("COMPUTE_CONTROL_PLANE_URL")
        .unwrap_or_else(|_| "http://localhost:8080".to_string())
}

fn default_request_timeout() -> u64 {
    std::env::var("COMPUTE_REQUEST_TIMEOUT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(60)
}

fn default_bulk_concurrency() -> usize {
    std::env::var("COMPUTE_BULK_CONCURRENCY")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(8)
}

fn default_max_attempts() -> u32 {
    std::env::var("COMPUTE_RETRY_MAX_ATTEMPTS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(3)
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    10_000
}

fn default_tool_docker_image() -> String {
    std::env::var("COMPUTE_TOOL_DOCKER_IMAGE")
        .unwrap_or_else(|_| "us.gcr.io/broad-dsp-gcr-public/terra-jupyter-aou:latest".to_string())
}

fn default_assets_base_url() -> String {
    std::env::var("COMPUTE_ASSETS_BASE_URL")
        .unwrap_or_else(|_| "http://localhost:8081/static".to_string())
}

fn default_client_id() -> Option<String> {
    std::env::var("COMPUTE_OAUTH_CLIENT_ID").ok()
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }
}

impl Default for RuntimeDefaults {
    fn default() -> Self {
        Self {
            tool_docker_image: default_tool_docker_image(),
            assets_base_url: default_assets_base_url(),
            default_client_id: default_client_id(),
        }
    }
}

impl RuntimeDefaults {
    fn asset(&self, file: &str) -> String {
        format!("{}/{}", self.assets_base_url.trim_end_matches('/'), file)
    }

    pub fn user_script_uri(&self) -> String {
        self.asset("initialize_notebook_runtime.sh")
    }

    pub fn start_user_script_uri(&self) -> String {
        self.asset("start_notebook_runtime.sh")
    }

    pub fn jupyter_extensions(&self) -> LabelSet {
        [
            ("aou-snippets-menu", "aou-snippets-menu.js"),
            ("aou-download-extension", "aou-download-policy-extension.js"),
            ("aou-activity-checker-extension", "activity-checker-extension.js"),
            (
                "aou-file-tree-policy-extension",
                "aou-file-tree-policy-extension.js",
            ),
        ]
        .into_iter()
        .map(|(name, file)| (name.to_string(), self.asset(file)))
        .collect()
    }

    pub fn scopes(&self) -> Vec<String> {
        [
            "https://www.googleapis.com/auth/cloud-platform",
            "https://www.googleapis.com/auth/userinfo.email",
            "https://www.googleapis.com/auth/userinfo.profile",
        ]
        .into_iter()
        .map(String::from)
        .collect()
    }
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            control_plane_url: default_control_plane_url(),
            request_timeout_secs: default_request_timeout(),
            retry: RetryConfig::default(),
            bulk_concurrency: default_bulk_concurrency(),
            runtime_defaults: RuntimeDefaults::default(),
        }
    }
}

impl ComputeConfig {
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Load from a YAML file. Missing keys fall back to the environment
    /// defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml_ng::from_str(&content).map_err(|e| {
            OrchestratorError::Config(format!("failed to parse {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.control_plane_url.trim().is_empty() {
            return Err(OrchestratorError::Config(
                "control_plane_url must not be empty".into(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(OrchestratorError::Config(
                "request_timeout_secs must be positive".into(),
            ));
        }
        if self.bulk_concurrency == 0 {
            return Err(OrchestratorError::Config(
                "bulk_concurrency must be at least 1".into(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(OrchestratorError::Config(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(OrchestratorError::Config(
                "retry.initial_backoff_ms exceeds retry.max_backoff_ms".into(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
