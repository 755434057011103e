//! 默认的调度冲突检测与解决
//!
//! 检测器记录每个任务登记的执行时间，两个任务相距小于窗口即视为冲突。
//! 解决器把执行时间平移到最晚的冲突任务之后，多次平移仍冲突时改为排队。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use media_scheduler_core::{
    config::ConflictConfig,
    models::{Conflict, ConflictResolution},
    ConflictDetector, ConflictResolver, SchedulerResult, Task,
};

pub struct WindowConflictDetector {
    window: Duration,
    occupancy: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl WindowConflictDetector {
    pub fn new(config: &ConflictConfig) -> Self {
        Self {
            window: Duration::seconds(config.window_seconds as i64),
            occupancy: RwLock::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub async fn registered_at(&self, task_id: &str) -> Option<DateTime<Utc>> {
        self.occupancy.read().await.get(task_id).copied()
    }
}

#[async_trait]
impl ConflictDetector for WindowConflictDetector {
    async fn detect(&self, task: &Task, candidate: DateTime<Utc>) -> SchedulerResult<Vec<Conflict>> {
        let occupancy = self.occupancy.read().await;
        let mut conflicts: Vec<Conflict> = occupancy
            .iter()
            .filter(|(id, _)| id.as_str() != task.id)
            .filter(|(_, at)| (**at - candidate).abs() < self.window)
            .map(|(id, at)| Conflict {
                task_id: id.clone(),
                scheduled_at: *at,
            })
            .collect();
        conflicts.sort_by_key(|c| c.scheduled_at);
        Ok(conflicts)
    }

    async fn register(&self, task: &Task, resolved: DateTime<Utc>) -> SchedulerResult<()> {
        self.occupancy
            .write()
            .await
            .insert(task.id.clone(), resolved);
        Ok(())
    }

    async fn unregister(&self, task_id: &str) -> SchedulerResult<()> {
        self.occupancy.write().await.remove(task_id);
        Ok(())
    }
}

pub struct ShiftConflictResolver {
    detector: Arc<dyn ConflictDetector>,
    window: Duration,
    max_shift_attempts: u32,
}

impl ShiftConflictResolver {
    pub fn new(detector: Arc<dyn ConflictDetector>, config: &ConflictConfig) -> Self {
        Self {
            detector,
            window: Duration::seconds(config.window_seconds as i64),
            max_shift_attempts: config.max_shift_attempts,
        }
    }
}

#[async_trait]
impl ConflictResolver for ShiftConflictResolver {
    async fn resolve(
        &self,
        task: &Task,
        candidate: DateTime<Utc>,
        conflicts: &[Conflict],
    ) -> SchedulerResult<Option<ConflictResolution>> {
        if conflicts.is_empty() {
            return Ok(None);
        }

        let mut current = conflicts.to_vec();
        for attempt in 0..self.max_shift_attempts {
            let latest = current
                .iter()
                .map(|c| c.scheduled_at)
                .max()
                .unwrap_or(candidate);
            let shifted = latest + self.window;
            current = self.detector.detect(task, shifted).await?;
            debug!(
                "任务 {} 第 {} 次平移到 {}，剩余冲突 {}",
                task.id,
                attempt + 1,
                shifted,
                current.len()
            );
            if current.is_empty() {
                return Ok(Some(ConflictResolution::Shift { new_time: shifted }));
            }
        }

        Ok(Some(ConflictResolution::Queue {
            position: conflicts.len() as u32,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use media_scheduler_core::TaskSchedule;

    fn task(id: &str) -> Task {
        Task::new(id, id, "item", TaskSchedule::daily(9, 0))
    }

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, hour, minute, 0).unwrap()
    }

    #[tokio::test]
    async fn test_detect_within_window_excludes_self() {
        let detector = WindowConflictDetector::new(&ConflictConfig::default());
        detector.register(&task("a"), at(9, 0)).await.unwrap();
        detector.register(&task("b"), at(12, 0)).await.unwrap();

        let conflicts = detector.detect(&task("c"), at(9, 3)).await.unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].task_id, "a");

        assert!(detector.detect(&task("a"), at(9, 0)).await.unwrap().is_empty());
        assert!(detector.detect(&task("c"), at(9, 5)).await.unwrap().is_empty());

        detector.unregister("a").await.unwrap();
        assert!(detector.detect(&task("c"), at(9, 3)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_resolver_shifts_past_latest_conflict() {
        let config = ConflictConfig::default();
        let detector = Arc::new(WindowConflictDetector::new(&config));
        detector.register(&task("a"), at(9, 0)).await.unwrap();
        let resolver = ShiftConflictResolver::new(detector.clone(), &config);

        let conflicts = detector.detect(&task("c"), at(9, 0)).await.unwrap();
        let resolution = resolver.resolve(&task("c"), at(9, 0), &conflicts).await.unwrap();
        assert_eq!(
            resolution,
            Some(ConflictResolution::Shift { new_time: at(9, 5) })
        );
    }

    #[tokio::test]
    async fn test_resolver_queues_when_shifts_exhausted() {
        let config = ConflictConfig {
            window_seconds: 300,
            max_shift_attempts: 2,
        };
        let detector = Arc::new(WindowConflictDetector::new(&config));
        // 每 4 分钟一个任务，平移总会撞上下一个
        for (i, minute) in [0, 4, 8, 12, 16, 20].into_iter().enumerate() {
            detector
                .register(&task(&format!("t{i}")), at(9, minute))
                .await
                .unwrap();
        }
        let resolver = ShiftConflictResolver::new(detector.clone(), &config);

        let conflicts = detector.detect(&task("new"), at(9, 1)).await.unwrap();
        let resolution = resolver.resolve(&task("new"), at(9, 1), &conflicts).await.unwrap();
        assert_eq!(
            resolution,
            Some(ConflictResolution::Queue {
                position: conflicts.len() as u32
            })
        );
    }

    #[tokio::test]
    async fn test_resolver_without_conflicts_keeps_time() {
        let config = ConflictConfig::default();
        let detector = Arc::new(WindowConflictDetector::new(&config));
        let resolver = ShiftConflictResolver::new(detector, &config);
        assert_eq!(resolver.resolve(&task("a"), at(9, 0), &[]).await.unwrap(), None);
    }
}
