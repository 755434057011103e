//! 定时任务调度器
//!
//! 每个启用的任务在 `TimerQueue` 中最多有一个执行定时器和一个校验定时器。
//! 单个分发循环睡眠到最早的到期时间（或被唤醒），弹出到期的定时器交给
//! 有界的工作池执行。生命周期由 `start` / `stop` 显式控制。

mod execution;
mod healing;
mod maintenance;
mod timers;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use media_scheduler_core::{
    config::{AppConfig, SchedulerConfig},
    models::WorkflowReport,
    Clock, ConflictDetector, ConflictResolver, SchedulerError, SchedulerResult, TaskStore,
    TimeoutLock, WorkflowSteps,
};
use media_scheduler_infrastructure::{MetricsCollector, StructuredLogger};

use crate::item_resolver::ItemResolver;
use crate::retry_service::RetryPolicy;
use crate::schedule_calc::ScheduleCalculator;
use crate::timer_queue::{TimerEntry, TimerQueue, TimerSlot};
use crate::workflow::ImportWorkflow;

pub use maintenance::MaintenanceJob;

/// 分发循环两次检查之间的最长睡眠时间
const MAX_DISPATCH_SLEEP: Duration = Duration::from_secs(60);

/// 调度器依赖的外部协作方
#[derive(Clone)]
pub struct SchedulerDeps {
    pub store: Arc<dyn TaskStore>,
    pub lock: Arc<dyn TimeoutLock>,
    pub detector: Arc<dyn ConflictDetector>,
    pub resolver: Arc<dyn ConflictResolver>,
    pub steps: Arc<dyn WorkflowSteps>,
    pub clock: Arc<dyn Clock>,
}

/// `schedule_task` 的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// 已按计划布置执行定时器与校验定时器
    Armed { next_run: DateTime<Utc> },
    /// 冲突解决为排队，只布置了一次性执行定时器
    Queued { run_at: DateTime<Utc>, position: u32 },
    /// 任务未启用，没有定时器
    Disabled,
}

/// 一次执行尝试的结果
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Succeeded(WorkflowReport),
    Failed(SchedulerError),
    Interrupted(SchedulerError),
    /// 锁被占用，按计划重新调度
    LockUnavailable,
    /// 同一任务正在执行
    AlreadyRunning,
    /// 任务类型不支持，按计划重新调度
    Unsupported,
    /// 任务已禁用或已删除，不再调度
    Skipped,
    /// 条目已完结，任务被自动删除
    Retired,
}

impl RunOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            RunOutcome::Succeeded(_) => "success",
            RunOutcome::Failed(_) => "failed",
            RunOutcome::Interrupted(_) => "user_interrupted",
            RunOutcome::LockUnavailable => "lock_unavailable",
            RunOutcome::AlreadyRunning => "already_running",
            RunOutcome::Unsupported => "unsupported",
            RunOutcome::Skipped => "skipped",
            RunOutcome::Retired => "retired",
        }
    }
}

#[derive(Default)]
struct Lifecycle {
    running: bool,
    shutdown: Option<CancellationToken>,
    dispatcher: Option<JoinHandle<()>>,
    maintenance: HashMap<MaintenanceJob, (CancellationToken, JoinHandle<()>)>,
}

pub struct TaskScheduler {
    store: Arc<dyn TaskStore>,
    lock: Arc<dyn TimeoutLock>,
    detector: Arc<dyn ConflictDetector>,
    resolver: Arc<dyn ConflictResolver>,
    item_resolver: Arc<ItemResolver>,
    workflow: ImportWorkflow,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
    retry: RetryPolicy,
    timers: Mutex<TimerQueue>,
    executing: Arc<Mutex<HashSet<String>>>,
    wake: Notify,
    workers: Arc<Semaphore>,
    tracker: TaskTracker,
    metrics: MetricsCollector,
    lifecycle: tokio::sync::Mutex<Lifecycle>,
}

impl TaskScheduler {
    pub fn new(deps: SchedulerDeps, config: &AppConfig) -> Arc<Self> {
        let item_resolver = Arc::new(ItemResolver::from_config(&config.workflow));
        let workflow = ImportWorkflow::new(
            deps.steps,
            deps.store.clone(),
            item_resolver.clone(),
            config.workflow.clone(),
            deps.clock.clone(),
        );

        Arc::new(Self {
            store: deps.store,
            lock: deps.lock,
            detector: deps.detector,
            resolver: deps.resolver,
            item_resolver,
            workflow,
            clock: deps.clock,
            config: config.scheduler.clone(),
            retry: RetryPolicy::new(config.retry.clone()),
            timers: Mutex::new(TimerQueue::new()),
            executing: Arc::new(Mutex::new(HashSet::new())),
            wake: Notify::new(),
            workers: Arc::new(Semaphore::new(config.scheduler.max_concurrent_runs)),
            tracker: TaskTracker::new(),
            metrics: MetricsCollector::new(),
            lifecycle: tokio::sync::Mutex::new(Lifecycle::default()),
        })
    }

    fn timers(&self) -> MutexGuard<'_, TimerQueue> {
        self.timers.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn executing_set(&self) -> MutexGuard<'_, HashSet<String>> {
        self.executing.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 加载全部任务、布置定时器并启动分发循环与后台维护循环
    pub async fn start(self: &Arc<Self>) -> SchedulerResult<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.running {
            warn!("调度器已在运行");
            return Ok(());
        }

        info!("启动任务调度器");
        self.executing_set().clear();
        self.timers().clear();

        // 停机期间错过的任务先补偿执行，执行结束后再按计划布置
        let tasks = self.store.get_tasks().await?;
        let now = self.clock.now();
        let (mut armed, mut missed) = (0, 0);
        for task in tasks.iter().filter(|t| t.enabled) {
            if let Some(next_run) = task.next_run {
                if ScheduleCalculator::is_overdue(next_run, now, self.stuck_threshold()) {
                    warn!("任务 {} 在停机期间错过了 {}，立即补偿执行", task.id, next_run);
                    self.spawn_run(&task.id);
                    missed += 1;
                    continue;
                }
            }
            match self.schedule_task(task).await {
                Ok(_) => armed += 1,
                Err(e) => StructuredLogger::log_system_error("scheduler", "schedule_task", &e),
            }
        }
        info!(
            "已加载 {} 个任务，其中 {} 个已安排执行，{} 个补偿执行",
            tasks.len(),
            armed,
            missed
        );

        let shutdown = CancellationToken::new();
        let this = self.clone();
        let token = shutdown.clone();
        lifecycle.dispatcher = Some(tokio::spawn(async move {
            this.dispatch_loop(token).await;
        }));

        for job in MaintenanceJob::ALL {
            self.spawn_maintenance(&mut lifecycle, &shutdown, job);
        }

        lifecycle.shutdown = Some(shutdown);
        lifecycle.running = true;
        Ok(())
    }

    /// 停止分发与维护循环，等待正在执行的任务结束。可重复调用。
    pub async fn stop(&self) -> SchedulerResult<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        if !lifecycle.running {
            debug!("调度器未运行");
            return Ok(());
        }

        info!("停止任务调度器");
        if let Some(shutdown) = lifecycle.shutdown.take() {
            shutdown.cancel();
        }
        if let Some(handle) = lifecycle.dispatcher.take() {
            if let Err(e) = handle.await {
                error!("分发循环退出异常: {}", e);
            }
        }
        for (job, (_, handle)) in lifecycle.maintenance.drain() {
            if let Err(e) = handle.await {
                error!("维护任务 {} 退出异常: {}", job.name(), e);
            }
        }

        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();

        self.timers().clear();
        lifecycle.running = false;
        info!("任务调度器已停止");
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.lifecycle.lock().await.running
    }

    async fn dispatch_loop(self: Arc<Self>, shutdown: CancellationToken) {
        info!("分发循环已启动");
        loop {
            self.dispatch_due();

            let sleep_for = {
                let mut timers = self.timers();
                self.metrics.set_live_timers(timers.len());
                timers
                    .next_deadline()
                    .map(|deadline| {
                        (deadline - self.clock.now())
                            .to_std()
                            .unwrap_or(Duration::ZERO)
                            .min(MAX_DISPATCH_SLEEP)
                    })
                    .unwrap_or(MAX_DISPATCH_SLEEP)
            };

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = self.wake.notified() => {}
                _ = tokio::time::sleep(sleep_for) => {}
            }
        }
        info!("分发循环已退出");
    }

    /// 弹出所有到期的定时器并交给工作池，返回弹出的数量
    pub fn dispatch_due(self: &Arc<Self>) -> usize {
        let due = self.timers().pop_due(self.clock.now());
        let count = due.len();
        for entry in due {
            self.spawn_fire(entry);
        }
        count
    }

    fn spawn_fire(self: &Arc<Self>, entry: TimerEntry) {
        let this = self.clone();
        self.tracker.spawn(async move {
            match entry.slot {
                TimerSlot::Execution => {
                    let Ok(_permit) = this.workers.clone().acquire_owned().await else {
                        return;
                    };
                    let attempt = entry.attempt();
                    if let Err(e) = this.run_now(&entry.task_id, attempt).await {
                        StructuredLogger::log_system_error("scheduler", "execute_task", &e);
                    }
                }
                TimerSlot::Validation => {
                    if let Err(e) = this.validate_timer(&entry.task_id).await {
                        StructuredLogger::log_system_error("scheduler", "validate_timer", &e);
                    }
                }
            }
        });
    }

    /// 立即在工作池中执行任务（自愈与漏执行补偿使用）
    fn spawn_run(self: &Arc<Self>, task_id: &str) {
        let this = self.clone();
        let task_id = task_id.to_string();
        self.tracker.spawn(async move {
            let Ok(_permit) = this.workers.clone().acquire_owned().await else {
                return;
            };
            if let Err(e) = this.run_now(&task_id, 0).await {
                StructuredLogger::log_system_error("scheduler", "execute_task", &e);
            }
        });
    }

    fn notify_dispatcher(&self) {
        self.wake.notify_one();
    }

    pub fn has_timer(&self, task_id: &str) -> bool {
        self.timers().contains(task_id, TimerSlot::Execution)
    }

    pub fn has_validation_timer(&self, task_id: &str) -> bool {
        self.timers().contains(task_id, TimerSlot::Validation)
    }

    pub fn timer_due(&self, task_id: &str) -> Option<DateTime<Utc>> {
        self.timers().due_at(task_id, TimerSlot::Execution)
    }

    pub fn validation_due(&self, task_id: &str) -> Option<DateTime<Utc>> {
        self.timers().due_at(task_id, TimerSlot::Validation)
    }

    pub fn live_timer_count(&self) -> usize {
        self.timers().len()
    }

    pub fn scheduled_task_ids(&self) -> Vec<String> {
        self.timers().task_ids(TimerSlot::Execution)
    }

    pub fn is_executing(&self, task_id: &str) -> bool {
        self.executing_set().contains(task_id)
    }

    pub fn executing_count(&self) -> usize {
        self.executing_set().len()
    }

    /// 等待工作池中的任务全部结束
    pub async fn wait_idle(&self) {
        while !self.tracker.is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}
