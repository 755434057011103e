//! 工作流步骤的超时控制
//!
//! 每个步骤都拿到一个取消令牌；超时后令牌被取消，调用方得到
//! `StepTimeout`，与步骤自身返回的失败（`StepFailure`）区分开。

use std::future::Future;
use std::time::Duration;

use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, warn};

use media_scheduler_core::{
    models::{StepError, StepResult, WorkflowStep},
    SchedulerError, SchedulerResult,
};

/// 带超时执行一个工作流步骤
#[instrument(skip_all, fields(step = step.as_str(), timeout_secs = limit.as_secs()))]
pub async fn run_step<T, F, Fut>(
    step: WorkflowStep,
    limit: Duration,
    operation: F,
) -> SchedulerResult<T>
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = StepResult<T>>,
{
    let token = CancellationToken::new();
    let started = std::time::Instant::now();

    match timeout(limit, operation(token.clone())).await {
        Ok(Ok(value)) => {
            debug!("{}完成，耗时 {:?}", step, started.elapsed());
            Ok(value)
        }
        Ok(Err(StepError::Failed(message))) => {
            warn!("{}失败: {}", step, message);
            Err(SchedulerError::StepFailure { step, message })
        }
        Ok(Err(StepError::Interrupted(message))) => {
            warn!("{}被用户中断: {}", step, message);
            Err(SchedulerError::UserInterrupted(format!("{step}: {message}")))
        }
        Err(_) => {
            token.cancel();
            error!("{}超时 (超时时间: {:?})", step, limit);
            Err(SchedulerError::StepTimeout {
                step,
                duration: limit,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_run_step_success() {
        let result = run_step(WorkflowStep::Import, Duration::from_secs(1), |_| async {
            Ok::<_, StepError>(42)
        })
        .await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_run_step_failure_maps_to_step_failure() {
        let result: SchedulerResult<()> =
            run_step(WorkflowStep::PruneMarked, Duration::from_secs(1), |_| async {
                Err(StepError::failed("csv broken"))
            })
            .await;
        match result {
            Err(SchedulerError::StepFailure { step, message }) => {
                assert_eq!(step, WorkflowStep::PruneMarked);
                assert_eq!(message, "csv broken");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_run_step_interrupted_maps_to_user_interrupted() {
        let result: SchedulerResult<()> =
            run_step(WorkflowStep::Import, Duration::from_secs(1), |_| async {
                Err(StepError::Interrupted("operator".into()))
            })
            .await;
        assert!(matches!(result, Err(SchedulerError::UserInterrupted(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_step_timeout_cancels_token() {
        let cancelled = Arc::new(AtomicBool::new(false));
        let observed = cancelled.clone();
        let token_slot = Arc::new(std::sync::Mutex::new(None));
        let slot = token_slot.clone();

        let result: SchedulerResult<()> =
            run_step(WorkflowStep::Extract, Duration::from_secs(300), move |token| {
                *slot.lock().unwrap() = Some(token.clone());
                async move {
                    token.cancelled().await;
                    observed.store(true, Ordering::SeqCst);
                    Err(StepError::failed("aborted"))
                }
            })
            .await;

        match result {
            Err(err @ SchedulerError::StepTimeout { .. }) => {
                assert!(err.to_string().contains("5分钟"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        let token = token_slot.lock().unwrap().clone().unwrap();
        assert!(token.is_cancelled());
        // 超时后 future 被丢弃，取消回调不会再执行
        assert!(!cancelled.load(Ordering::SeqCst));
    }
}
