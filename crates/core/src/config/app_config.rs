use std::path::Path;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use super::{
    models::{
        ConflictConfig, ObservabilityConfig, RetryConfig, SchedulerConfig, StepsConfig,
        StoreConfig, WorkflowConfig,
    },
    ConfigError, ConfigResult, ConfigValidator,
};

/// 默认查找的配置文件路径
const DEFAULT_CONFIG_PATHS: [&str; 3] = [
    "config/media-scheduler.toml",
    "media-scheduler.toml",
    "/etc/media-scheduler/config.toml",
];

/// 环境变量前缀，例如 `MEDIA_SCHEDULER__SCHEDULER__MAX_CONCURRENT_RUNS=8`
const ENV_PREFIX: &str = "MEDIA_SCHEDULER";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub scheduler: SchedulerConfig,
    pub retry: RetryConfig,
    pub workflow: WorkflowConfig,
    pub conflict: ConflictConfig,
    pub store: StoreConfig,
    pub steps: StepsConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// 按 默认值 → 配置文件 → 环境变量 的顺序加载配置
    pub fn load(config_path: Option<&str>) -> ConfigResult<Self> {
        let defaults = ConfigBuilder::try_from(&AppConfig::default())
            .map_err(|e| ConfigError::Configuration(e.to_string()))?;
        let mut builder = ConfigBuilder::builder().add_source(defaults);

        match config_path {
            Some(path) => {
                if !Path::new(path).exists() {
                    return Err(ConfigError::File(format!("配置文件不存在: {path}")));
                }
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            }
            None => {
                if let Some(path) = DEFAULT_CONFIG_PATHS
                    .iter()
                    .find(|path| Path::new(path).exists())
                {
                    builder = builder.add_source(File::new(path, FileFormat::Toml));
                }
            }
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .map_err(|e| ConfigError::Configuration(format!("构建配置失败: {e}")))?
            .try_deserialize()
            .map_err(|e| ConfigError::Parse(format!("反序列化配置失败: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(toml_str: &str) -> ConfigResult<Self> {
        let config: AppConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

impl ConfigValidator for AppConfig {
    fn validate(&self) -> ConfigResult<()> {
        self.scheduler.validate()?;
        self.retry.validate()?;
        self.workflow.validate()?;
        self.conflict.validate()?;
        self.store.validate()?;
        self.steps.validate()?;
        self.observability.validate()?;
        Ok(())
    }
}
