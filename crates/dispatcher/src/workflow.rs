//! 单次任务运行的导入工作流
//!
//! 提取 → 清理已标记剧集 → 标题残留检查 → 导入 → 标记新导入的剧集。
//! 任一必需步骤失败即中止，已产生的副作用不回滚。

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use media_scheduler_core::{
    config::WorkflowConfig,
    models::{ImportRequest, StepOptions, WorkflowReport},
    Clock, MediaItem, SchedulerError, SchedulerResult, Task, TaskStore, WorkflowStep,
    WorkflowSteps,
};
use media_scheduler_infrastructure::{run_step, StructuredLogger};

use crate::item_resolver::{ItemMatch, ItemResolver};

pub struct ImportWorkflow {
    steps: Arc<dyn WorkflowSteps>,
    store: Arc<dyn TaskStore>,
    resolver: Arc<ItemResolver>,
    config: WorkflowConfig,
    clock: Arc<dyn Clock>,
}

impl ImportWorkflow {
    pub fn new(
        steps: Arc<dyn WorkflowSteps>,
        store: Arc<dyn TaskStore>,
        resolver: Arc<ItemResolver>,
        config: WorkflowConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            steps,
            store,
            resolver,
            config,
            clock,
        }
    }

    fn timeout_for(&self, step: WorkflowStep) -> Duration {
        let seconds = match step {
            WorkflowStep::Extract => self.config.extract_timeout_seconds,
            WorkflowStep::PruneMarked => self.config.prune_timeout_seconds,
            WorkflowStep::ResidueCheck => self.config.residue_timeout_seconds,
            WorkflowStep::Import => self.config.import_timeout_seconds,
            WorkflowStep::AnalyzeRemaining => self.config.analyze_timeout_seconds,
        };
        Duration::from_secs(seconds)
    }

    /// 解析任务关联的条目，必要时把新的关联写回存储
    pub async fn resolve_target(&self, task: &mut Task) -> SchedulerResult<ItemMatch> {
        let items = self.store.get_items().await?;
        if items.is_empty() {
            return Err(SchedulerError::ItemUnresolvable(format!(
                "条目库为空，无法解析任务 {} 的条目 {}",
                task.id, task.target_item_id
            )));
        }

        let matched = self.resolver.resolve(task, &items).ok_or_else(|| {
            SchedulerError::ItemUnresolvable(format!(
                "任务 {} 的条目 {} 不存在且无法恢复",
                task.id, task.target_item_id
            ))
        })?;

        if matched.strategy.requires_heal() {
            self.heal_association(task, &matched).await?;
        }
        Ok(matched)
    }

    /// 把匹配到的条目写回任务
    ///
    /// 只修改存储中最新记录的关联字段，`nextRun`、`lastRun*` 等保持不变；
    /// 传入的 `task` 同步更新关联字段。
    pub async fn heal_association(&self, task: &mut Task, matched: &ItemMatch) -> SchedulerResult<()> {
        let Some(mut latest) = self.store.get_task(&task.id).await? else {
            return Err(SchedulerError::task_not_found(&task.id));
        };
        let old_item_id = std::mem::replace(&mut latest.target_item_id, matched.item.id.clone());
        latest.target_item_title = Some(matched.item.title.clone());
        if matched.item.tmdb_id.is_some() {
            latest.target_tmdb_id = matched.item.tmdb_id.clone();
        }
        latest.touch(self.clock.now());

        if !self.store.update_task(&latest).await? {
            return Err(SchedulerError::task_not_found(&task.id));
        }
        task.target_item_id = latest.target_item_id.clone();
        task.target_item_title = latest.target_item_title.clone();
        task.target_tmdb_id = latest.target_tmdb_id.clone();
        task.updated_at = latest.updated_at;
        StructuredLogger::log_item_reassociated(
            &task.id,
            &old_item_id,
            &matched.item.id,
            matched.strategy.as_str(),
        );
        Ok(())
    }

    /// 执行完整工作流。任务的关联字段被恢复时会原地更新 `task`。
    #[instrument(skip_all, fields(task.id = %task.id))]
    pub async fn run(&self, task: &mut Task) -> SchedulerResult<WorkflowReport> {
        let matched = self.resolve_target(task).await?;
        let item = matched.item;
        let season = task.action.season_number;
        let options = StepOptions {
            special_episode_handling: task.action.enable_special_episode_handling,
        };
        let mut report = WorkflowReport {
            item_id: item.id.clone(),
            ..WorkflowReport::default()
        };

        info!("开始导入条目 {}（{}）第 {} 季", item.id, item.title, season);

        let extracted = run_step(
            WorkflowStep::Extract,
            self.timeout_for(WorkflowStep::Extract),
            |cancel| self.steps.extract(&item, season, cancel),
        )
        .await?;

        let pruned = run_step(
            WorkflowStep::PruneMarked,
            self.timeout_for(WorkflowStep::PruneMarked),
            |cancel| {
                self.steps
                    .prune_marked(&extracted.path, &item, season, options, cancel)
            },
        )
        .await?;
        report.rows_pruned = pruned.removed;

        if task.action.enable_title_residue_check {
            report.residue_detected = match run_step(
                WorkflowStep::ResidueCheck,
                self.timeout_for(WorkflowStep::ResidueCheck),
                |cancel| self.steps.check_residue(&pruned.path, &item.title, cancel),
            )
            .await
            {
                Ok(residue) => residue,
                Err(e) => {
                    warn!("标题残留检查失败，按无残留处理: {}", e);
                    false
                }
            };
            if report.residue_detected {
                warn!("文件中残留条目标题 {}，本次不标记剧集", item.title);
            }
        }

        let candidates = self.analyze(&pruned.path).await;

        let request = ImportRequest {
            path: pruned.path.clone(),
            season,
            conflict_policy: task.action.conflict_policy,
            options,
        };
        let imported = run_step(
            WorkflowStep::Import,
            self.timeout_for(WorkflowStep::Import),
            |cancel| self.steps.import(&item, &request, cancel),
        )
        .await?;
        report.imported = imported.imported;

        if report.residue_detected {
            report.item_completed = item.is_completed();
            return Ok(report);
        }

        let Some(candidates) = candidates else {
            warn!("导入前剧集分析失败，跳过剧集标记");
            report.item_completed = item.is_completed();
            return Ok(report);
        };
        let Some(remaining) = self.analyze(&pruned.path).await else {
            warn!("导入后剧集分析失败，跳过剧集标记");
            report.item_completed = item.is_completed();
            return Ok(report);
        };

        let newly_imported: BTreeSet<u32> = candidates.difference(&remaining).copied().collect();
        debug!(
            "导入前 {:?}，导入后剩余 {:?}，新导入 {:?}",
            candidates, remaining, newly_imported
        );

        let (marked, completed) = self.mark_imported(&item, season, &newly_imported).await?;
        report.marked_episodes = marked;
        report.item_completed = completed;

        info!(
            "条目 {} 导入完成: 导入 {} 行，标记 {} 集",
            item.id,
            report.imported,
            report.marked_episodes.len()
        );
        Ok(report)
    }

    async fn analyze(&self, path: &std::path::Path) -> Option<BTreeSet<u32>> {
        match run_step(
            WorkflowStep::AnalyzeRemaining,
            self.timeout_for(WorkflowStep::AnalyzeRemaining),
            |cancel| self.steps.analyze_remaining(path, cancel),
        )
        .await
        {
            Ok(episodes) => Some(episodes),
            Err(e) => {
                warn!("剧集分析失败: {}", e);
                None
            }
        }
    }

    /// 在最新的条目数据上标记剧集
    async fn mark_imported(
        &self,
        item: &MediaItem,
        season: u32,
        episodes: &BTreeSet<u32>,
    ) -> SchedulerResult<(BTreeSet<u32>, bool)> {
        if episodes.is_empty() {
            return Ok((BTreeSet::new(), item.is_completed()));
        }

        let mut latest = self
            .store
            .get_items()
            .await?
            .into_iter()
            .find(|candidate| candidate.id == item.id)
            .unwrap_or_else(|| item.clone());

        let marked = latest.mark_episodes_completed(season, episodes, self.clock.now());
        if !marked.is_empty() && !self.store.update_item(&latest).await? {
            warn!("条目 {} 已不存在，剧集标记未保存", latest.id);
        }
        Ok((marked.into_iter().collect(), latest.is_completed()))
    }
}
