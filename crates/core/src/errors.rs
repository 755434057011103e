use std::time::Duration;

use thiserror::Error;

use crate::models::{RunStatus, WorkflowStep};

/// 调度器错误类型定义
#[derive(Debug, Error, Clone)]
pub enum SchedulerError {
    #[error("任务未找到: {id}")]
    TaskNotFound { id: String },

    #[error("无效的调度配置: {0}")]
    InvalidSchedule(String),

    #[error("未知的任务类型: {0}")]
    UnknownTaskType(String),

    #[error("定时器丢失: {task_id}")]
    TimerLoss { task_id: String },

    #[error("锁 {key} 当前不可用: {reason}")]
    LockUnavailable { key: String, reason: String },

    #[error("{step}超时（{}）", format_timeout(.duration))]
    StepTimeout { step: WorkflowStep, duration: Duration },

    #[error("{step}失败: {message}")]
    StepFailure { step: WorkflowStep, message: String },

    #[error("无法解析任务关联的媒体条目: {0}")]
    ItemUnresolvable(String),

    #[error("操作被用户中断: {0}")]
    UserInterrupted(String),

    #[error("存储操作错误: {0}")]
    Store(String),

    #[error("锁服务错误: {0}")]
    Lock(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 整分钟按分钟显示，其余按秒显示
fn format_timeout(duration: &Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 60 && secs % 60 == 0 {
        format!("{}分钟", secs / 60)
    } else {
        format!("{secs}秒")
    }
}

impl SchedulerError {
    pub fn task_not_found<S: Into<String>>(id: S) -> Self {
        Self::TaskNotFound { id: id.into() }
    }

    pub fn store_error<S: Into<String>>(msg: S) -> Self {
        Self::Store(msg.into())
    }

    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn step_failure<S: Into<String>>(step: WorkflowStep, msg: S) -> Self {
        Self::StepFailure {
            step,
            message: msg.into(),
        }
    }

    /// 逃逸出工作流自身处理的基础设施错误才会消耗重试次数
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SchedulerError::Store(_)
                | SchedulerError::Lock(_)
                | SchedulerError::Serialization(_)
                | SchedulerError::Internal(_)
        )
    }

    pub fn is_user_interrupted(&self) -> bool {
        matches!(self, SchedulerError::UserInterrupted(_))
    }

    /// 将错误映射为持久化到任务上的运行状态
    pub fn run_status(&self) -> RunStatus {
        if self.is_user_interrupted() {
            RunStatus::UserInterrupted
        } else {
            RunStatus::Failed
        }
    }

    /// 错误类别，用于日志和指标标签
    pub fn kind(&self) -> &'static str {
        match self {
            SchedulerError::TaskNotFound { .. } => "task_not_found",
            SchedulerError::InvalidSchedule(_) => "invalid_schedule",
            SchedulerError::UnknownTaskType(_) => "unknown_task_type",
            SchedulerError::TimerLoss { .. } => "timer_loss",
            SchedulerError::LockUnavailable { .. } => "lock_unavailable",
            SchedulerError::StepTimeout { .. } => "step_timeout",
            SchedulerError::StepFailure { .. } => "step_failure",
            SchedulerError::ItemUnresolvable(_) => "item_unresolvable",
            SchedulerError::UserInterrupted(_) => "user_interrupted",
            SchedulerError::Store(_) => "store",
            SchedulerError::Lock(_) => "lock",
            SchedulerError::Configuration(_) => "configuration",
            SchedulerError::Serialization(_) => "serialization",
            SchedulerError::Internal(_) => "internal",
        }
    }

    pub fn user_message(&self) -> &str {
        match self {
            SchedulerError::TaskNotFound { .. } => "请求的任务不存在",
            SchedulerError::InvalidSchedule(_) => "任务的调度配置有误",
            SchedulerError::StepTimeout { .. } => "导入步骤执行超时，将在下次计划时间重试",
            SchedulerError::StepFailure { .. } => "导入步骤执行失败，将在下次计划时间重试",
            SchedulerError::ItemUnresolvable(_) => "找不到任务关联的媒体条目",
            SchedulerError::UserInterrupted(_) => "任务已被手动中断",
            _ => "系统繁忙，请稍后重试",
        }
    }
}

impl From<serde_json::Error> for SchedulerError {
    fn from(err: serde_json::Error) -> Self {
        SchedulerError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for SchedulerError {
    fn from(err: std::io::Error) -> Self {
        SchedulerError::Store(err.to_string())
    }
}

impl From<anyhow::Error> for SchedulerError {
    fn from(err: anyhow::Error) -> Self {
        SchedulerError::Internal(err.to_string())
    }
}

/// 统一的Result类型
pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_timeout_message_carries_minutes() {
        let err = SchedulerError::StepTimeout {
            step: WorkflowStep::Extract,
            duration: Duration::from_secs(300),
        };
        let message = err.to_string();
        assert!(message.contains("5分钟"), "{message}");
        assert!(message.contains("平台数据提取"), "{message}");
    }

    #[test]
    fn test_short_step_timeout_is_shown_in_seconds() {
        let err = SchedulerError::StepTimeout {
            step: WorkflowStep::ResidueCheck,
            duration: Duration::from_secs(30),
        };
        let message = err.to_string();
        assert!(message.contains("30秒"), "{message}");
        assert!(!message.contains("0分钟"), "{message}");

        let err = SchedulerError::StepTimeout {
            step: WorkflowStep::Import,
            duration: Duration::from_secs(90),
        };
        assert!(err.to_string().contains("90秒"));
    }

    #[test]
    fn test_classification() {
        let interrupted = SchedulerError::UserInterrupted("取消".into());
        assert_eq!(interrupted.run_status(), RunStatus::UserInterrupted);
        assert!(!interrupted.is_retryable());

        let failure = SchedulerError::step_failure(WorkflowStep::Import, "boom");
        assert_eq!(failure.run_status(), RunStatus::Failed);
        assert!(!failure.is_retryable());

        assert!(SchedulerError::store_error("disk full").is_retryable());
        assert!(!SchedulerError::ItemUnresolvable("none".into()).is_retryable());
    }
}
