// src/config/validation.rs

use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::storage::pool;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Longest quarantine the config may ask for.
pub const MAX_BLOCK_DURATION_SECS: u64 = pool::MAX_BLOCK_DURATION_SECS as u64;

pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate(config: &AppConfig) -> Result<()> {
        debug!("Starting configuration validation");

        if let Err(e) = Self::validate_services(config) {
            warn!("Service validation failed: {}", e);
            return Err(e);
        }
        if let Err(e) = Self::validate_rotation(config) {
            warn!("Rotation config validation failed: {}", e);
            return Err(e);
        }
        if let Err(e) = Self::validate_server_config(config) {
            warn!("Server config validation failed: {}", e);
            return Err(e);
        }

        debug!("Configuration validation completed successfully");
        Ok(())
    }

    fn validate_services(config: &AppConfig) -> Result<()> {
        let mut names = HashSet::new();

        for service in &config.services {
            if service.name.trim().is_empty() {
                return Err(AppError::config_validation(
                    "Service name cannot be empty",
                    Some("services.name"),
                ));
            }
            if !names.insert(service.name.as_str()) {
                return Err(AppError::config_validation(
                    format!("Duplicate service name: {}", service.name),
                    Some("services.name"),
                ));
            }

            for prefix in &service.env {
                if prefix.is_empty() || prefix.contains('=') || prefix.contains('\0') {
                    return Err(AppError::config_validation(
                        format!(
                            "Invalid environment prefix '{}' for service '{}'",
                            prefix, service.name
                        ),
                        Some("services.env"),
                    ));
                }
            }

            if service.env.is_empty() && service.api_keys.is_empty() {
                warn!(
                    "Service '{}' has neither environment prefixes nor inline keys",
                    service.name
                );
            }
        }

        debug!("Validated {} services", config.services.len());
        Ok(())
    }

    fn validate_rotation(config: &AppConfig) -> Result<()> {
        let rotation = &config.rotation;

        if rotation.failure_threshold == 0 {
            return Err(AppError::config_validation(
                "Failure threshold must be at least 1",
                Some("rotation.failure_threshold"),
            ));
        }
        if rotation.block_duration_secs == 0 {
            return Err(AppError::config_validation(
                "Block duration cannot be 0",
                Some("rotation.block_duration_secs"),
            ));
        }
        if rotation.block_duration_secs > MAX_BLOCK_DURATION_SECS {
            return Err(AppError::config_validation(
                format!(
                    "Block duration {}s exceeds the maximum of {}s",
                    rotation.block_duration_secs, MAX_BLOCK_DURATION_SECS
                ),
                Some("rotation.block_duration_secs"),
            ));
        }
        if rotation.health_log_interval_secs == 0 {
            return Err(AppError::config_validation(
                "Health log interval cannot be 0",
                Some("rotation.health_log_interval_secs"),
            ));
        }
        Ok(())
    }

    fn validate_server_config(config: &AppConfig) -> Result<()> {
        if config.server.port == 0 {
            return Err(AppError::config_validation(
                "Server port cannot be 0",
                Some("server.port"),
            ));
        }
        if config.server.request_timeout_secs == 0 {
            return Err(AppError::config_validation(
                "Request timeout cannot be 0",
                Some("server.request_timeout_secs"),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ConfigValidator::validate(&AppConfig::default()).is_ok());
    }

    #[test]
    fn test_rejects_duplicate_service_names() {
        let mut config = AppConfig::default();
        config
            .services
            .push(ServiceConfig::new("gemini", &["OTHER_GEMINI_KEY"]));

        let err = ConfigValidator::validate(&config).unwrap_err();
        assert!(err.to_string().contains("Duplicate service name: gemini"));
    }

    #[test]
    fn test_rejects_zero_threshold_and_duration() {
        let mut config = AppConfig::default();
        config.rotation.failure_threshold = 0;
        assert!(ConfigValidator::validate(&config).is_err());

        let mut config = AppConfig::default();
        config.rotation.block_duration_secs = 0;
        assert!(ConfigValidator::validate(&config).is_err());

        let mut config = AppConfig::default();
        config.rotation.block_duration_secs = MAX_BLOCK_DURATION_SECS + 1;
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_rejects_malformed_env_prefix() {
        let mut config = AppConfig::default();
        config.services[0].env.push("BAD=NAME".to_string());
        assert!(ConfigValidator::validate(&config).is_err());
    }
}
