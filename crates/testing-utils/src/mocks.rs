//! Mock implementations for the scheduler's collaborator traits
//!
//! All mocks are cheap to clone and share their state, so a test can keep a
//! handle for assertions after handing a clone to the scheduler.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use media_scheduler_core::{
    models::{
        Conflict, ConflictResolution, ExtractOutput, ImportOutput, ImportRequest, PruneOutput,
        StepError, StepOptions, StepResult,
    },
    traits::LockAcquisition,
    Clock, ConflictDetector, ConflictResolver, MediaItem, SchedulerError, SchedulerResult, Task,
    TaskStore, TimeoutLock, WorkflowStep, WorkflowSteps,
};

/// Mock implementation of TaskStore for testing
#[derive(Debug, Clone, Default)]
pub struct MockTaskStore {
    tasks: Arc<Mutex<Vec<Task>>>,
    items: Arc<Mutex<Vec<MediaItem>>>,
    failing_item_reads: Arc<Mutex<usize>>,
    task_updates: Arc<Mutex<usize>>,
}

impl MockTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data(tasks: Vec<Task>, items: Vec<MediaItem>) -> Self {
        let store = Self::new();
        *store.tasks.lock().unwrap() = tasks;
        *store.items.lock().unwrap() = items;
        store
    }

    pub fn insert_task(&self, task: Task) {
        let mut tasks = self.tasks.lock().unwrap();
        tasks.retain(|t| t.id != task.id);
        tasks.push(task);
    }

    pub fn insert_item(&self, item: MediaItem) {
        let mut items = self.items.lock().unwrap();
        items.retain(|i| i.id != item.id);
        items.push(item);
    }

    pub fn task(&self, id: &str) -> Option<Task> {
        self.tasks.lock().unwrap().iter().find(|t| t.id == id).cloned()
    }

    pub fn item(&self, id: &str) -> Option<MediaItem> {
        self.items.lock().unwrap().iter().find(|i| i.id == id).cloned()
    }

    pub fn task_count(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }

    pub fn task_update_count(&self) -> usize {
        *self.task_updates.lock().unwrap()
    }

    /// 接下来的 `times` 次 `get_items` 调用返回存储错误
    pub fn fail_item_reads(&self, times: usize) {
        *self.failing_item_reads.lock().unwrap() = times;
    }
}

#[async_trait]
impl TaskStore for MockTaskStore {
    async fn get_tasks(&self) -> SchedulerResult<Vec<Task>> {
        Ok(self.tasks.lock().unwrap().clone())
    }

    async fn update_task(&self, task: &Task) -> SchedulerResult<bool> {
        *self.task_updates.lock().unwrap() += 1;
        let mut tasks = self.tasks.lock().unwrap();
        match tasks.iter_mut().find(|t| t.id == task.id) {
            Some(existing) => {
                *existing = task.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_task(&self, id: &str) -> SchedulerResult<bool> {
        let mut tasks = self.tasks.lock().unwrap();
        let before = tasks.len();
        tasks.retain(|t| t.id != id);
        Ok(tasks.len() != before)
    }

    async fn get_items(&self) -> SchedulerResult<Vec<MediaItem>> {
        {
            let mut failing = self.failing_item_reads.lock().unwrap();
            if *failing > 0 {
                *failing -= 1;
                return Err(SchedulerError::store_error("模拟的存储读取失败"));
            }
        }
        Ok(self.items.lock().unwrap().clone())
    }

    async fn update_item(&self, item: &MediaItem) -> SchedulerResult<bool> {
        let mut items = self.items.lock().unwrap();
        match items.iter_mut().find(|i| i.id == item.id) {
            Some(existing) => {
                *existing = item.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum LockMode {
    #[default]
    Normal,
    Contended,
    Failing,
}

/// Mock implementation of TimeoutLock for testing
#[derive(Debug, Clone, Default)]
pub struct MockTimeoutLock {
    mode: Arc<Mutex<LockMode>>,
    held: Arc<Mutex<HashSet<String>>>,
    acquire_calls: Arc<Mutex<usize>>,
    release_calls: Arc<Mutex<usize>>,
    last_ttl: Arc<Mutex<Option<Duration>>>,
}

impl MockTimeoutLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// 每次加锁都被拒绝
    pub fn contended() -> Self {
        let lock = Self::new();
        *lock.mode.lock().unwrap() = LockMode::Contended;
        lock
    }

    /// 每次加锁都返回锁服务错误
    pub fn failing() -> Self {
        let lock = Self::new();
        *lock.mode.lock().unwrap() = LockMode::Failing;
        lock
    }

    pub fn set_contended(&self, contended: bool) {
        *self.mode.lock().unwrap() = if contended {
            LockMode::Contended
        } else {
            LockMode::Normal
        };
    }

    pub fn is_held(&self, key: &str) -> bool {
        self.held.lock().unwrap().contains(key)
    }

    pub fn acquire_count(&self) -> usize {
        *self.acquire_calls.lock().unwrap()
    }

    pub fn release_count(&self) -> usize {
        *self.release_calls.lock().unwrap()
    }

    /// 最近一次加锁请求的 TTL
    pub fn last_ttl(&self) -> Option<Duration> {
        *self.last_ttl.lock().unwrap()
    }
}

#[async_trait]
impl TimeoutLock for MockTimeoutLock {
    async fn acquire(
        &self,
        key: &str,
        purpose: &str,
        ttl: Duration,
    ) -> SchedulerResult<LockAcquisition> {
        *self.acquire_calls.lock().unwrap() += 1;
        *self.last_ttl.lock().unwrap() = Some(ttl);
        match *self.mode.lock().unwrap() {
            LockMode::Contended => {
                return Ok(LockAcquisition::rejected(format!("{purpose} 正在进行")))
            }
            LockMode::Failing => return Err(SchedulerError::Lock("模拟的锁服务故障".into())),
            LockMode::Normal => {}
        }
        let mut held = self.held.lock().unwrap();
        if !held.insert(key.to_string()) {
            return Ok(LockAcquisition::rejected("锁已被占用"));
        }
        Ok(LockAcquisition::acquired())
    }

    async fn release(&self, key: &str) -> SchedulerResult<()> {
        *self.release_calls.lock().unwrap() += 1;
        self.held.lock().unwrap().remove(key);
        Ok(())
    }
}

/// Mock implementation of ConflictDetector for testing
///
/// 默认不报告冲突；`with_conflicts` 让每次检测都返回给定的冲突。
#[derive(Debug, Clone, Default)]
pub struct MockConflictDetector {
    scripted: Arc<Mutex<Vec<Conflict>>>,
    registered: Arc<Mutex<HashMap<String, DateTime<Utc>>>>,
    detect_calls: Arc<Mutex<usize>>,
}

impl MockConflictDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_conflicts(conflicts: Vec<Conflict>) -> Self {
        let detector = Self::new();
        *detector.scripted.lock().unwrap() = conflicts;
        detector
    }

    pub fn registered_at(&self, task_id: &str) -> Option<DateTime<Utc>> {
        self.registered.lock().unwrap().get(task_id).copied()
    }

    pub fn registered_count(&self) -> usize {
        self.registered.lock().unwrap().len()
    }

    pub fn detect_count(&self) -> usize {
        *self.detect_calls.lock().unwrap()
    }
}

#[async_trait]
impl ConflictDetector for MockConflictDetector {
    async fn detect(&self, _task: &Task, _candidate: DateTime<Utc>) -> SchedulerResult<Vec<Conflict>> {
        *self.detect_calls.lock().unwrap() += 1;
        Ok(self.scripted.lock().unwrap().clone())
    }

    async fn register(&self, task: &Task, resolved: DateTime<Utc>) -> SchedulerResult<()> {
        self.registered
            .lock()
            .unwrap()
            .insert(task.id.clone(), resolved);
        Ok(())
    }

    async fn unregister(&self, task_id: &str) -> SchedulerResult<()> {
        self.registered.lock().unwrap().remove(task_id);
        Ok(())
    }
}

/// Mock implementation of ConflictResolver for testing
#[derive(Debug, Clone, Default)]
pub struct MockConflictResolver {
    resolution: Arc<Mutex<Option<ConflictResolution>>>,
    resolve_calls: Arc<Mutex<usize>>,
}

impl MockConflictResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolving_to(resolution: ConflictResolution) -> Self {
        let resolver = Self::new();
        *resolver.resolution.lock().unwrap() = Some(resolution);
        resolver
    }

    pub fn resolve_count(&self) -> usize {
        *self.resolve_calls.lock().unwrap()
    }
}

#[async_trait]
impl ConflictResolver for MockConflictResolver {
    async fn resolve(
        &self,
        _task: &Task,
        _candidate: DateTime<Utc>,
        _conflicts: &[Conflict],
    ) -> SchedulerResult<Option<ConflictResolution>> {
        *self.resolve_calls.lock().unwrap() += 1;
        Ok(self.resolution.lock().unwrap().clone())
    }
}

/// 脚本化步骤的行为
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StepBehavior {
    #[default]
    Succeed,
    Fail(String),
    Interrupt(String),
    /// 一直挂起直到取消令牌被触发
    HangUntilCancelled,
}

#[derive(Debug, Default)]
struct StepsState {
    behaviors: HashMap<WorkflowStep, StepBehavior>,
    calls: HashMap<WorkflowStep, usize>,
    residue: bool,
    pruned_rows: usize,
    imported_rows: usize,
    analyses: VecDeque<BTreeSet<u32>>,
    import_requests: Vec<ImportRequest>,
    extracted_items: Vec<String>,
}

/// Mock implementation of WorkflowSteps with scripted behavior per step
///
/// `analyze_remaining` 依次返回 `with_analyses` 中的结果，用完后返回空集合。
#[derive(Debug, Clone, Default)]
pub struct MockWorkflowSteps {
    state: Arc<Mutex<StepsState>>,
}

impl MockWorkflowSteps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_behavior(&self, step: WorkflowStep, behavior: StepBehavior) {
        self.state.lock().unwrap().behaviors.insert(step, behavior);
    }

    pub fn with_behavior(self, step: WorkflowStep, behavior: StepBehavior) -> Self {
        self.set_behavior(step, behavior);
        self
    }

    pub fn with_residue(self, residue: bool) -> Self {
        self.state.lock().unwrap().residue = residue;
        self
    }

    pub fn with_imported_rows(self, rows: usize) -> Self {
        self.state.lock().unwrap().imported_rows = rows;
        self
    }

    pub fn with_pruned_rows(self, rows: usize) -> Self {
        self.state.lock().unwrap().pruned_rows = rows;
        self
    }

    /// 导入前、导入后两次分析的结果
    pub fn with_analyses(self, before: &[u32], after: &[u32]) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.analyses.push_back(before.iter().copied().collect());
            state.analyses.push_back(after.iter().copied().collect());
        }
        self
    }

    pub fn call_count(&self, step: WorkflowStep) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .get(&step)
            .copied()
            .unwrap_or(0)
    }

    pub fn import_requests(&self) -> Vec<ImportRequest> {
        self.state.lock().unwrap().import_requests.clone()
    }

    pub fn extracted_items(&self) -> Vec<String> {
        self.state.lock().unwrap().extracted_items.clone()
    }

    async fn enter(&self, step: WorkflowStep, cancel: &CancellationToken) -> StepResult<()> {
        let behavior = {
            let mut state = self.state.lock().unwrap();
            *state.calls.entry(step).or_insert(0) += 1;
            state.behaviors.get(&step).cloned().unwrap_or_default()
        };
        match behavior {
            StepBehavior::Succeed => Ok(()),
            StepBehavior::Fail(message) => Err(StepError::Failed(message)),
            StepBehavior::Interrupt(message) => Err(StepError::Interrupted(message)),
            StepBehavior::HangUntilCancelled => {
                cancel.cancelled().await;
                Err(StepError::failed("cancelled"))
            }
        }
    }
}

#[async_trait]
impl WorkflowSteps for MockWorkflowSteps {
    async fn extract(
        &self,
        item: &MediaItem,
        season: u32,
        cancel: CancellationToken,
    ) -> StepResult<ExtractOutput> {
        self.enter(WorkflowStep::Extract, &cancel).await?;
        self.state
            .lock()
            .unwrap()
            .extracted_items
            .push(item.id.clone());
        Ok(ExtractOutput {
            path: PathBuf::from(format!("/tmp/{}_s{season}.csv", item.id)),
        })
    }

    async fn prune_marked(
        &self,
        path: &Path,
        _item: &MediaItem,
        _season: u32,
        _options: StepOptions,
        cancel: CancellationToken,
    ) -> StepResult<PruneOutput> {
        self.enter(WorkflowStep::PruneMarked, &cancel).await?;
        Ok(PruneOutput {
            path: path.to_path_buf(),
            removed: self.state.lock().unwrap().pruned_rows,
        })
    }

    async fn check_residue(
        &self,
        _path: &Path,
        _title: &str,
        cancel: CancellationToken,
    ) -> StepResult<bool> {
        self.enter(WorkflowStep::ResidueCheck, &cancel).await?;
        Ok(self.state.lock().unwrap().residue)
    }

    async fn import(
        &self,
        _item: &MediaItem,
        request: &ImportRequest,
        cancel: CancellationToken,
    ) -> StepResult<ImportOutput> {
        self.enter(WorkflowStep::Import, &cancel).await?;
        let mut state = self.state.lock().unwrap();
        state.import_requests.push(request.clone());
        Ok(ImportOutput {
            imported: state.imported_rows,
        })
    }

    async fn analyze_remaining(
        &self,
        _path: &Path,
        cancel: CancellationToken,
    ) -> StepResult<BTreeSet<u32>> {
        self.enter(WorkflowStep::AnalyzeRemaining, &cancel).await?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .analyses
            .pop_front()
            .unwrap_or_default())
    }
}

/// 只在测试推动时才前进的时钟
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}
