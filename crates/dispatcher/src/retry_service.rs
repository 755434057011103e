use std::time::Duration;

use tracing::debug;

use media_scheduler_core::{config::RetryConfig, SchedulerError};

/// 任务运行的重试策略
///
/// 只有存储、锁后端等基础设施错误才会消耗重试次数；工作流本身的失败
/// （步骤失败、超时、条目无法解析、用户中断）直接记录并按计划重新调度。
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    /// 第 `attempt` 次尝试（从 0 开始）失败后是否还要重试；首次之后最多重试 `max_attempts` 次
    pub fn should_retry(&self, attempt: u32, error: &SchedulerError) -> bool {
        if !error.is_retryable() {
            debug!("错误不可重试: {}", error.kind());
            return false;
        }
        attempt < self.config.max_attempts
    }

    /// 第 `attempt` 次尝试失败后的等待时间：`base × multiplier^attempt`，不超过上限
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base_interval = self.config.base_interval_seconds as f64;
        let max_interval = self.config.max_interval_seconds as f64;
        let exponential_interval =
            base_interval * self.config.backoff_multiplier.powi(attempt as i32);
        let capped_interval = exponential_interval.min(max_interval);

        let jitter = if self.config.jitter_factor > 0.0 {
            capped_interval * self.config.jitter_factor * (rand::random::<f64>() - 0.5) * 2.0
        } else {
            0.0
        };
        let final_interval = (capped_interval + jitter).clamp(base_interval, max_interval);

        Duration::from_secs(final_interval as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_from_one_minute() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_secs(60));
        assert_eq!(policy.backoff(1), Duration::from_secs(120));
        assert_eq!(policy.backoff(2), Duration::from_secs(240));
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy::new(RetryConfig {
            max_interval_seconds: 300,
            ..RetryConfig::default()
        });
        assert_eq!(policy.backoff(10), Duration::from_secs(300));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = RetryPolicy::new(RetryConfig {
            jitter_factor: 0.5,
            ..RetryConfig::default()
        });
        for _ in 0..50 {
            let backoff = policy.backoff(1).as_secs();
            assert!((60..=180).contains(&backoff), "backoff {backoff}");
        }
    }

    #[test]
    fn test_should_retry_only_infrastructure_errors() {
        let policy = RetryPolicy::default();
        let store = SchedulerError::store_error("连接断开");
        assert!(policy.should_retry(0, &store));
        assert!(policy.should_retry(1, &store));
        assert!(policy.should_retry(2, &store));
        assert!(!policy.should_retry(3, &store));

        let step = SchedulerError::step_failure(
            media_scheduler_core::WorkflowStep::Import,
            "导入失败",
        );
        assert!(!policy.should_retry(0, &step));
        assert!(!policy.should_retry(0, &SchedulerError::UserInterrupted("x".into())));
    }
}
