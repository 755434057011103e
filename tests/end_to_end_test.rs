//! 使用真实的 JSON 存储、冲突检测与锁，只模拟外部步骤命令和时钟

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use media_scheduler_core::{
    config::ConflictConfig, models::RunStatus, Clock, ConflictDetector, TaskStore, WorkflowStep,
};
use media_scheduler_dispatcher::{
    RunOutcome, ScheduleCalculator, ScheduleOutcome, SchedulerDeps, TaskScheduler,
};
use media_scheduler_infrastructure::{
    InMemoryTimeoutLock, JsonFileTaskStore, ShiftConflictResolver, WindowConflictDetector,
};
use media_scheduler_testing_utils::{
    utc, ManualClock, MediaItemBuilder, MockWorkflowSteps, StepBehavior, TaskBuilder, TestEnv,
};

struct Fixture {
    _dir: tempfile::TempDir,
    store: Arc<JsonFileTaskStore>,
    detector: Arc<WindowConflictDetector>,
    steps: MockWorkflowSteps,
    clock: ManualClock,
    scheduler: Arc<TaskScheduler>,
}

impl Fixture {
    fn clock_now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

async fn fixture(steps: MockWorkflowSteps) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(
        JsonFileTaskStore::open(dir.path().join("catalog.json"))
            .await
            .unwrap(),
    );
    store
        .insert_item(
            MediaItemBuilder::new("item-1", "漫长的季节")
                .with_tmdb_id("tmdb-1")
                .with_episodes(&[(1, true), (2, false), (3, false)])
                .build(),
        )
        .await
        .unwrap();

    let config = ConflictConfig::default();
    let detector = Arc::new(WindowConflictDetector::new(&config));
    let detector_dyn: Arc<dyn ConflictDetector> = detector.clone();
    let resolver = Arc::new(ShiftConflictResolver::new(detector_dyn.clone(), &config));
    let clock = ManualClock::new(utc(2024, 1, 1, 10, 0));

    let scheduler = TaskScheduler::new(
        SchedulerDeps {
            store: store.clone(),
            lock: Arc::new(InMemoryTimeoutLock::new()),
            detector: detector_dyn,
            resolver,
            steps: Arc::new(steps.clone()),
            clock: Arc::new(clock.clone()),
        },
        &TestEnv::config(),
    );

    Fixture {
        _dir: dir,
        store,
        detector,
        steps,
        clock,
        scheduler,
    }
}

#[tokio::test]
async fn test_same_time_tasks_are_spread_by_conflict_window() {
    let f = fixture(MockWorkflowSteps::new()).await;
    let first = TaskBuilder::new("t1").daily(9, 0).build();
    let second = TaskBuilder::new("t2").daily(9, 0).build();
    f.store.insert_task(first.clone()).await.unwrap();
    f.store.insert_task(second.clone()).await.unwrap();

    let planned = ScheduleCalculator::next_run_utc(&first.schedule, f.clock_now()).unwrap();

    let outcome = f.scheduler.schedule_task(&first).await.unwrap();
    assert_eq!(outcome, ScheduleOutcome::Armed { next_run: planned });

    let outcome = f.scheduler.schedule_task(&second).await.unwrap();
    let shifted = planned + Duration::seconds(300);
    assert_eq!(outcome, ScheduleOutcome::Armed { next_run: shifted });
    assert_eq!(f.detector.registered_at("t2").await, Some(shifted));

    // 重新布置同一个任务不会与自己冲突
    let outcome = f.scheduler.schedule_task(&first).await.unwrap();
    assert_eq!(outcome, ScheduleOutcome::Armed { next_run: planned });
}

#[tokio::test]
async fn test_run_results_survive_store_reopen() {
    let steps = MockWorkflowSteps::new().with_analyses(&[2, 3], &[3]);
    let f = fixture(steps).await;
    f.store
        .insert_task(TaskBuilder::new("t1").build())
        .await
        .unwrap();

    let outcome = f.scheduler.run_now("t1", 0).await.unwrap();
    assert!(matches!(outcome, RunOutcome::Succeeded(_)));

    let reopened = JsonFileTaskStore::open(f.store.path()).await.unwrap();
    let task = reopened.get_task("t1").await.unwrap().unwrap();
    assert_eq!(task.last_run_status, Some(RunStatus::Success));
    assert_eq!(task.last_run, Some(f.clock_now()));
    assert!(task.next_run.unwrap() > f.clock_now());

    let items = reopened.get_items().await.unwrap();
    let item = items.iter().find(|i| i.id == "item-1").unwrap();
    assert_eq!(item.completed_episode_numbers(1), BTreeSet::from([1, 2]));
}

#[tokio::test]
async fn test_stale_association_is_healed_on_disk() {
    let f = fixture(MockWorkflowSteps::new()).await;
    f.store
        .insert_task(
            TaskBuilder::new("t1")
                .with_target_item("removed-item")
                .with_tmdb_id("tmdb-1")
                .build(),
        )
        .await
        .unwrap();

    let outcome = f.scheduler.run_now("t1", 0).await.unwrap();
    assert!(matches!(outcome, RunOutcome::Succeeded(_)));
    assert_eq!(f.steps.extracted_items(), vec!["item-1".to_string()]);

    let reopened = JsonFileTaskStore::open(f.store.path()).await.unwrap();
    let task = reopened.get_task("t1").await.unwrap().unwrap();
    assert_eq!(task.target_item_id, "item-1");
    assert_eq!(task.target_item_title.as_deref(), Some("漫长的季节"));
}

#[tokio::test]
async fn test_failed_step_is_recorded_and_task_kept() {
    let steps = MockWorkflowSteps::new().with_behavior(
        WorkflowStep::Extract,
        StepBehavior::Fail("平台登录失效".into()),
    );
    let f = fixture(steps).await;
    f.store
        .insert_task(TaskBuilder::new("t1").auto_delete_when_completed().build())
        .await
        .unwrap();

    let outcome = f.scheduler.run_now("t1", 0).await.unwrap();
    assert!(matches!(outcome, RunOutcome::Failed(_)));

    let task = f.store.get_task("t1").await.unwrap().unwrap();
    assert_eq!(task.last_run_status, Some(RunStatus::Failed));
    assert!(task.last_run_error.unwrap().contains("平台登录失效"));
    assert!(f.scheduler.has_timer("t1"));
}

