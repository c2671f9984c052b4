// src/config/mod.rs

pub mod app;
pub mod credentials;
pub mod loader;
pub mod validation;

pub use app::{default_services, AppConfig, RotationConfig, ServerConfig, ServiceConfig};
pub use credentials::{CredentialSource, EnvCredentialSource, StaticCredentialSource};
pub use loader::load_config;
pub use validation::ConfigValidator;
