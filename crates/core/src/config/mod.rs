//! 调度器配置
//!
//! 配置分为若干段（`scheduler`、`retry`、`workflow`、`conflict`、`store`、
//! `steps`、`observability`），每段实现 [`ConfigValidator`]。
//! [`AppConfig::load`] 依次合并默认值、TOML 配置文件与环境变量。

pub mod app_config;
pub mod models;
pub mod validation;

pub use app_config::AppConfig;
pub use models::*;
pub use validation::{ConfigValidator, ValidationUtils};

/// Configuration error type
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration error enumeration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("File error: {0}")]
    File(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::File(err.to_string())
    }
}

impl From<ConfigError> for crate::SchedulerError {
    fn from(err: ConfigError) -> Self {
        crate::SchedulerError::Configuration(err.to_string())
    }
}
