//! 后台维护循环
//!
//! 每个维护任务有自己的取消令牌，可以单独启停；调度器停止时全部取消。

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use media_scheduler_core::SchedulerResult;
use media_scheduler_infrastructure::StructuredLogger;

use super::{Lifecycle, TaskScheduler};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaintenanceJob {
    /// 条目关联校验
    AssociationCheck,
    /// 漏执行补偿
    MissedTaskCheck,
    /// 已完结条目的任务清理
    CompletedCleanup,
    /// 全量定时器校验
    FleetValidation,
}

impl MaintenanceJob {
    pub const ALL: [MaintenanceJob; 4] = [
        MaintenanceJob::AssociationCheck,
        MaintenanceJob::MissedTaskCheck,
        MaintenanceJob::CompletedCleanup,
        MaintenanceJob::FleetValidation,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            MaintenanceJob::AssociationCheck => "association_check",
            MaintenanceJob::MissedTaskCheck => "missed_task_check",
            MaintenanceJob::CompletedCleanup => "completed_cleanup",
            MaintenanceJob::FleetValidation => "fleet_validation",
        }
    }
}

impl TaskScheduler {
    fn maintenance_interval(&self, job: MaintenanceJob) -> Duration {
        let seconds = match job {
            MaintenanceJob::AssociationCheck => self.config.association_check_interval_seconds,
            MaintenanceJob::MissedTaskCheck => self.config.missed_task_check_interval_seconds,
            MaintenanceJob::CompletedCleanup => self.config.cleanup_interval_seconds,
            MaintenanceJob::FleetValidation => self.config.fleet_validation_interval_seconds,
        };
        Duration::from_secs(seconds)
    }

    /// 执行一轮维护任务，返回处理的任务数
    pub async fn run_maintenance(self: &Arc<Self>, job: MaintenanceJob) -> SchedulerResult<usize> {
        match job {
            MaintenanceJob::AssociationCheck => self.revalidate_associations().await,
            MaintenanceJob::MissedTaskCheck => self.check_missed_tasks().await,
            MaintenanceJob::CompletedCleanup => self.cleanup_completed_tasks().await,
            MaintenanceJob::FleetValidation => self.validate_all_timers().await,
        }
    }

    pub(super) fn spawn_maintenance(
        self: &Arc<Self>,
        lifecycle: &mut Lifecycle,
        shutdown: &CancellationToken,
        job: MaintenanceJob,
    ) {
        if lifecycle.maintenance.contains_key(&job) {
            debug!("维护任务 {} 已在运行", job.name());
            return;
        }

        let token = shutdown.child_token();
        let this = self.clone();
        let interval = self.maintenance_interval(job);
        let loop_token = token.clone();
        let handle = tokio::spawn(async move {
            info!("维护任务 {} 已启动，间隔 {:?}", job.name(), interval);
            loop {
                tokio::select! {
                    _ = loop_token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
                match this.run_maintenance(job).await {
                    Ok(0) => debug!("维护任务 {} 完成，无需处理", job.name()),
                    Ok(count) => info!("维护任务 {} 处理了 {} 个任务", job.name(), count),
                    Err(e) => StructuredLogger::log_system_error("maintenance", job.name(), &e),
                }
            }
            info!("维护任务 {} 已停止", job.name());
        });
        lifecycle.maintenance.insert(job, (token, handle));
    }

    /// 启动单个维护任务（调度器运行中才生效，已运行时忽略）
    pub async fn start_maintenance(self: &Arc<Self>, job: MaintenanceJob) -> bool {
        let mut lifecycle = self.lifecycle.lock().await;
        let Some(shutdown) = lifecycle.shutdown.clone() else {
            warn!("调度器未运行，无法启动维护任务 {}", job.name());
            return false;
        };
        self.spawn_maintenance(&mut lifecycle, &shutdown, job);
        true
    }

    /// 停止单个维护任务，未运行时忽略
    pub async fn stop_maintenance(&self, job: MaintenanceJob) -> bool {
        let entry = self.lifecycle.lock().await.maintenance.remove(&job);
        let Some((token, handle)) = entry else {
            return false;
        };
        token.cancel();
        if let Err(e) = handle.await {
            warn!("维护任务 {} 退出异常: {}", job.name(), e);
        }
        true
    }

    pub async fn maintenance_running(&self, job: MaintenanceJob) -> bool {
        self.lifecycle.lock().await.maintenance.contains_key(&job)
    }
}
