// src/config/app.rs

use crate::storage::pool::{RotationPolicy, DEFAULT_BLOCK_DURATION_SECS, DEFAULT_FAILURE_THRESHOLD};
use serde::{Deserialize, Serialize};

/// One external service and where its credentials come from.
#[derive(Debug, Deserialize, Clone, PartialEq, Serialize)]
pub struct ServiceConfig {
    pub name: String,
    /// Environment prefixes in precedence order, e.g. `GEMINI_API_KEY`.
    #[serde(default)]
    pub env: Vec<String>,
    /// Keys written directly in the config file, appended after the environment ones.
    #[serde(default, skip_serializing)]
    pub api_keys: Vec<String>,
}

impl ServiceConfig {
    pub fn new(name: impl Into<String>, env: &[&str]) -> Self {
        Self {
            name: name.into(),
            env: env.iter().map(|s| s.to_string()).collect(),
            api_keys: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default, skip_serializing)]
    pub admin_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            admin_token: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Serialize)]
pub struct RotationConfig {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_block_duration")]
    pub block_duration_secs: u64,
    #[serde(default = "default_health_log_interval")]
    pub health_log_interval_secs: u64,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            block_duration_secs: default_block_duration(),
            health_log_interval_secs: default_health_log_interval(),
        }
    }
}

impl RotationConfig {
    pub fn policy(&self) -> RotationPolicy {
        let secs = i64::try_from(self.block_duration_secs).unwrap_or(DEFAULT_BLOCK_DURATION_SECS);
        RotationPolicy {
            failure_threshold: self.failure_threshold,
            block_duration: chrono::Duration::seconds(secs),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub rotation: RotationConfig,
    #[serde(default = "default_services")]
    pub services: Vec<ServiceConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            rotation: RotationConfig::default(),
            services: default_services(),
        }
    }
}

impl AppConfig {
    pub fn service(&self, name: &str) -> Option<&ServiceConfig> {
        self.services.iter().find(|s| s.name == name)
    }

    pub fn service_names(&self) -> Vec<String> {
        self.services.iter().map(|s| s.name.clone()).collect()
    }
}

/// The OCR service and the two classifier backends.
pub fn default_services() -> Vec<ServiceConfig> {
    vec![
        ServiceConfig::new("nvidia", &["NVIDIA_API_KEY"]),
        ServiceConfig::new("gemini", &["GEMINI_API_KEY", "GOOGLE_API_KEY"]),
        ServiceConfig::new("openrouter", &["OPENROUTER_API_KEY"]),
    ]
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    30
}

fn default_failure_threshold() -> u32 {
    DEFAULT_FAILURE_THRESHOLD
}

fn default_block_duration() -> u64 {
    DEFAULT_BLOCK_DURATION_SECS as u64
}

fn default_health_log_interval() -> u64 {
    60
}
