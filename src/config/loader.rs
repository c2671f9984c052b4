// src/config/loader.rs

use crate::config::{AppConfig, ConfigValidator};
use crate::error::{AppError, Result};
use std::path::Path;
use tracing::{debug, info, warn};

/// Loads the YAML file if present, applies environment overrides, then validates.
pub fn load_config(config_path: &Path) -> Result<AppConfig> {
    let mut config = if config_path.exists() {
        info!("Loading configuration from file: {}", config_path.display());
        load_from_file(config_path)?
    } else {
        info!("Configuration file not found, using defaults");
        AppConfig::default()
    };

    override_with_env(&mut config);

    ConfigValidator::validate(&config)?;

    debug!("Configuration loaded and validated successfully");
    Ok(config)
}

fn load_from_file(config_path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(config_path).map_err(|_| AppError::ConfigNotFound {
        path: config_path.display().to_string(),
    })?;

    serde_yaml::from_str(&content).map_err(|e| AppError::ConfigParse {
        message: format!("Failed to parse config file: {e}"),
        line: e.location().map(|loc| loc.line()),
    })
}

fn override_with_env(config: &mut AppConfig) {
    if let Ok(port_str) = std::env::var("PORT") {
        if let Ok(port) = port_str.parse::<u16>() {
            info!("Overriding server port from environment variable: {}", port);
            config.server.port = port;
        } else {
            warn!("Invalid PORT environment variable: {}", port_str);
        }
    }

    if let Ok(token) = std::env::var("ADMIN_TOKEN") {
        if !token.trim().is_empty() {
            info!("Overriding admin token from environment variable");
            config.server.admin_token = Some(token.trim().to_string());
        }
    }

    if let Ok(threshold_str) = std::env::var("KEY_ROTATION_FAILURE_THRESHOLD") {
        if let Ok(threshold) = threshold_str.parse::<u32>() {
            info!("Overriding failure threshold from environment: {}", threshold);
            config.rotation.failure_threshold = threshold;
        } else {
            warn!("Invalid KEY_ROTATION_FAILURE_THRESHOLD environment variable: {}", threshold_str);
        }
    }

    if let Ok(secs_str) = std::env::var("KEY_ROTATION_BLOCK_SECS") {
        if let Ok(secs) = secs_str.parse::<u64>() {
            info!("Overriding block duration from environment: {}s", secs);
            config.rotation.block_duration_secs = secs;
        } else {
            warn!("Invalid KEY_ROTATION_BLOCK_SECS environment variable: {}", secs_str);
        }
    }
}
