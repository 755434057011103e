use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tracing::info;

use media_scheduler_core::{AppConfig, ConflictDetector, SystemClock};
use media_scheduler_dispatcher::{SchedulerDeps, TaskScheduler};
use media_scheduler_infrastructure::{
    create_store, CommandWorkflowSteps, InMemoryTimeoutLock, ShiftConflictResolver,
    WindowConflictDetector,
};

/// 主应用程序：根据配置组装调度器及其协作方
pub struct Application {
    config: AppConfig,
    scheduler: Arc<TaskScheduler>,
}

impl Application {
    pub async fn new(config: AppConfig) -> Result<Self> {
        info!("初始化应用程序，存储类型: {:?}", config.store.kind);

        let store = create_store(&config.store)
            .await
            .context("创建任务存储失败")?;

        let detector: Arc<dyn ConflictDetector> =
            Arc::new(WindowConflictDetector::new(&config.conflict));
        let resolver = Arc::new(ShiftConflictResolver::new(
            detector.clone(),
            &config.conflict,
        ));

        let deps = SchedulerDeps {
            store,
            lock: Arc::new(InMemoryTimeoutLock::new()),
            detector,
            resolver,
            steps: Arc::new(CommandWorkflowSteps::new(config.steps.clone())),
            clock: Arc::new(SystemClock),
        };
        let scheduler = TaskScheduler::new(deps, &config);

        Ok(Self { config, scheduler })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn scheduler(&self) -> Arc<TaskScheduler> {
        self.scheduler.clone()
    }

    /// 启动调度器并阻塞到收到关闭信号，然后停止调度器
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        self.scheduler
            .start()
            .await
            .context("启动任务调度器失败")?;
        info!("任务调度器已启动，共 {} 个定时器", self.scheduler.live_timer_count());

        let _ = shutdown_rx.recv().await;
        info!("调度器收到关闭信号");

        self.scheduler
            .stop()
            .await
            .context("停止任务调度器失败")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use media_scheduler_core::config::StoreKind;

    fn memory_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.store.kind = StoreKind::Memory;
        config
    }

    #[tokio::test]
    async fn test_application_runs_until_shutdown() {
        let app = Arc::new(Application::new(memory_config()).await.unwrap());
        let (tx, rx) = broadcast::channel(1);

        let runner = {
            let app = app.clone();
            tokio::spawn(async move { app.run(rx).await })
        };

        let scheduler = app.scheduler();
        while !scheduler.is_running().await {
            tokio::task::yield_now().await;
        }
        tx.send(()).unwrap();

        runner.await.unwrap().unwrap();
        assert!(!scheduler.is_running().await);
    }

    #[tokio::test]
    async fn test_application_loads_json_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.store.path = dir
            .path()
            .join("catalog.json")
            .to_string_lossy()
            .into_owned();

        let app = Application::new(config).await.unwrap();
        assert_eq!(app.scheduler().live_timer_count(), 0);
    }
}
