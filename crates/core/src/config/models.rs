use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{ConfigError, ConfigResult, ConfigValidator, ValidationUtils};

/// 调度器定时参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// 最小触发延迟，避免定时器抖动
    pub min_delay_seconds: u64,
    /// 自愈检查间隔下限
    pub validation_min_seconds: u64,
    /// 自愈检查间隔上限
    pub validation_max_seconds: u64,
    /// nextRun 落后超过该阈值视为定时器卡住
    pub stuck_threshold_seconds: u64,
    /// 排队策略中每个位置的延迟
    pub queue_slot_seconds: u64,
    pub lock_ttl_seconds: u64,
    pub max_concurrent_runs: usize,
    pub association_check_interval_seconds: u64,
    pub missed_task_check_interval_seconds: u64,
    pub cleanup_interval_seconds: u64,
    pub fleet_validation_interval_seconds: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            min_delay_seconds: 10,
            validation_min_seconds: 300,
            validation_max_seconds: 1800,
            stuck_threshold_seconds: 300,
            queue_slot_seconds: 60,
            lock_ttl_seconds: 600,
            max_concurrent_runs: 4,
            association_check_interval_seconds: 3600,
            missed_task_check_interval_seconds: 600,
            cleanup_interval_seconds: 3600,
            fleet_validation_interval_seconds: 1800,
        }
    }
}

impl SchedulerConfig {
    pub fn min_delay(&self) -> Duration {
        Duration::from_secs(self.min_delay_seconds)
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_seconds)
    }
}

impl ConfigValidator for SchedulerConfig {
    fn validate(&self) -> ConfigResult<()> {
        ValidationUtils::validate_timeout(self.min_delay_seconds, "scheduler.min_delay_seconds")?;
        ValidationUtils::validate_timeout(
            self.validation_min_seconds,
            "scheduler.validation_min_seconds",
        )?;
        ValidationUtils::validate_timeout(
            self.validation_max_seconds,
            "scheduler.validation_max_seconds",
        )?;
        if self.validation_min_seconds > self.validation_max_seconds {
            return Err(ConfigError::Validation(
                "scheduler.validation_min_seconds must not exceed validation_max_seconds"
                    .to_string(),
            ));
        }
        ValidationUtils::validate_timeout(
            self.stuck_threshold_seconds,
            "scheduler.stuck_threshold_seconds",
        )?;
        ValidationUtils::validate_timeout(self.queue_slot_seconds, "scheduler.queue_slot_seconds")?;
        ValidationUtils::validate_timeout(self.lock_ttl_seconds, "scheduler.lock_ttl_seconds")?;
        ValidationUtils::validate_count(
            self.max_concurrent_runs,
            "scheduler.max_concurrent_runs",
            64,
        )?;
        for (value, name) in [
            (
                self.association_check_interval_seconds,
                "scheduler.association_check_interval_seconds",
            ),
            (
                self.missed_task_check_interval_seconds,
                "scheduler.missed_task_check_interval_seconds",
            ),
            (self.cleanup_interval_seconds, "scheduler.cleanup_interval_seconds"),
            (
                self.fleet_validation_interval_seconds,
                "scheduler.fleet_validation_interval_seconds",
            ),
        ] {
            ValidationUtils::validate_range(value, name, 1, 86_400)?;
        }
        Ok(())
    }
}

/// 重试策略配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// 首次运行失败后最多重试的次数（不含首次）
    pub max_attempts: u32,
    /// 基础重试间隔（秒）
    pub base_interval_seconds: u64,
    /// 最大重试间隔（秒）
    pub max_interval_seconds: u64,
    /// 指数退避倍数
    pub backoff_multiplier: f64,
    /// 重试间隔的随机抖动范围（0.0-1.0）
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_interval_seconds: 60,  // 1分钟
            max_interval_seconds: 3600, // 1小时
            backoff_multiplier: 2.0,
            jitter_factor: 0.0,
        }
    }
}

impl ConfigValidator for RetryConfig {
    fn validate(&self) -> ConfigResult<()> {
        ValidationUtils::validate_count(self.max_attempts as usize, "retry.max_attempts", 10)?;
        ValidationUtils::validate_timeout(self.base_interval_seconds, "retry.base_interval_seconds")?;
        ValidationUtils::validate_range(
            self.max_interval_seconds,
            "retry.max_interval_seconds",
            self.base_interval_seconds,
            86_400,
        )?;
        if self.backoff_multiplier < 1.0 {
            return Err(ConfigError::Validation(
                "retry.backoff_multiplier must be at least 1.0".to_string(),
            ));
        }
        ValidationUtils::validate_ratio(self.jitter_factor, "retry.jitter_factor")?;
        Ok(())
    }
}

/// 工作流步骤超时与条目恢复参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub extract_timeout_seconds: u64,
    pub prune_timeout_seconds: u64,
    pub residue_timeout_seconds: u64,
    pub import_timeout_seconds: u64,
    pub analyze_timeout_seconds: u64,
    /// 编辑距离相似度阈值
    pub fuzzy_similarity_threshold: f64,
    /// 子串包含匹配允许的最大长度差（字符数）
    pub containment_length_delta: usize,
    /// 所有策略都失败时是否回退到最近创建的条目
    pub allow_most_recent_fallback: bool,
    /// 按任务名匹配时剥离的通用后缀
    pub generic_name_suffixes: Vec<String>,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            extract_timeout_seconds: 300,
            prune_timeout_seconds: 120,
            residue_timeout_seconds: 60,
            import_timeout_seconds: 900,
            analyze_timeout_seconds: 120,
            fuzzy_similarity_threshold: 0.8,
            containment_length_delta: 3,
            allow_most_recent_fallback: true,
            generic_name_suffixes: ["自动导入", "定时任务", "任务", "auto import", "task"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl ConfigValidator for WorkflowConfig {
    fn validate(&self) -> ConfigResult<()> {
        for (value, name) in [
            (self.extract_timeout_seconds, "workflow.extract_timeout_seconds"),
            (self.prune_timeout_seconds, "workflow.prune_timeout_seconds"),
            (self.residue_timeout_seconds, "workflow.residue_timeout_seconds"),
            (self.import_timeout_seconds, "workflow.import_timeout_seconds"),
            (self.analyze_timeout_seconds, "workflow.analyze_timeout_seconds"),
        ] {
            ValidationUtils::validate_timeout(value, name)?;
        }
        ValidationUtils::validate_ratio(
            self.fuzzy_similarity_threshold,
            "workflow.fuzzy_similarity_threshold",
        )?;
        Ok(())
    }
}

/// 默认冲突检测器参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConflictConfig {
    /// 两个任务的执行时间相距小于该窗口即视为冲突
    pub window_seconds: u64,
    /// 平移次数超过该值后改为排队
    pub max_shift_attempts: u32,
}

impl Default for ConflictConfig {
    fn default() -> Self {
        Self {
            window_seconds: 300,
            max_shift_attempts: 3,
        }
    }
}

impl ConfigValidator for ConflictConfig {
    fn validate(&self) -> ConfigResult<()> {
        ValidationUtils::validate_timeout(self.window_seconds, "conflict.window_seconds")?;
        ValidationUtils::validate_count(
            self.max_shift_attempts as usize,
            "conflict.max_shift_attempts",
            100,
        )?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    Memory,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub kind: StoreKind,
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::Json,
            path: "data/catalog.json".to_string(),
        }
    }
}

impl ConfigValidator for StoreConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.kind == StoreKind::Json {
            ValidationUtils::validate_not_empty(&self.path, "store.path")?;
        }
        Ok(())
    }
}

/// 外部步骤命令
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepsConfig {
    pub extract_command: String,
    pub prune_command: String,
    pub residue_command: String,
    pub import_command: String,
    pub analyze_command: String,
    pub working_dir: Option<String>,
}

impl Default for StepsConfig {
    fn default() -> Self {
        Self {
            extract_command: "catalog-extract".to_string(),
            prune_command: "catalog-prune".to_string(),
            residue_command: "catalog-residue".to_string(),
            import_command: "catalog-import".to_string(),
            analyze_command: "catalog-analyze".to_string(),
            working_dir: None,
        }
    }
}

impl ConfigValidator for StepsConfig {
    fn validate(&self) -> ConfigResult<()> {
        ValidationUtils::validate_not_empty(&self.extract_command, "steps.extract_command")?;
        ValidationUtils::validate_not_empty(&self.prune_command, "steps.prune_command")?;
        ValidationUtils::validate_not_empty(&self.residue_command, "steps.residue_command")?;
        ValidationUtils::validate_not_empty(&self.import_command, "steps.import_command")?;
        ValidationUtils::validate_not_empty(&self.analyze_command, "steps.analyze_command")?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

impl ConfigValidator for ObservabilityConfig {
    fn validate(&self) -> ConfigResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(ConfigError::Validation(format!(
                "Invalid log level: {}. Valid options: {:?}",
                self.log_level, valid_levels
            )));
        }
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.log_format.as_str()) {
            return Err(ConfigError::Validation(format!(
                "Invalid log format: {}. Valid options: {:?}",
                self.log_format, valid_formats
            )));
        }
        Ok(())
    }
}
