//! Test data builders for creating test entities
//!
//! Builders start from sensible defaults so a test only spells out the
//! fields it cares about.

use chrono::{DateTime, Utc};

use media_scheduler_core::models::{
    ConflictPolicy, Episode, ItemStatus, MediaItem, SeasonProgress, Task, TaskSchedule, TaskType,
};

/// Builder for creating test Task entities
pub struct TaskBuilder {
    task: Task,
}

impl TaskBuilder {
    /// 默认：每日 09:00，关联 `item-1`，第 1 季，已启用
    pub fn new(id: &str) -> Self {
        Self {
            task: Task::new(id, "测试任务 自动导入", "item-1", TaskSchedule::daily(9, 0)),
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.task.name = name.to_string();
        self
    }

    pub fn with_target_item(mut self, item_id: &str) -> Self {
        self.task.target_item_id = item_id.to_string();
        self
    }

    pub fn with_target_title(mut self, title: &str) -> Self {
        self.task.target_item_title = Some(title.to_string());
        self
    }

    pub fn with_tmdb_id(mut self, tmdb_id: &str) -> Self {
        self.task.target_tmdb_id = Some(tmdb_id.to_string());
        self
    }

    pub fn with_schedule(mut self, schedule: TaskSchedule) -> Self {
        self.task.schedule = schedule;
        self
    }

    pub fn daily(self, hour: u32, minute: u32) -> Self {
        self.with_schedule(TaskSchedule::daily(hour, minute))
    }

    pub fn weekly(self, day_of_week: u32, hour: u32, minute: u32) -> Self {
        self.with_schedule(TaskSchedule::weekly(day_of_week, hour, minute))
    }

    pub fn with_task_type(mut self, task_type: TaskType) -> Self {
        self.task.task_type = task_type;
        self
    }

    pub fn with_season(mut self, season: u32) -> Self {
        self.task.action.season_number = season;
        self
    }

    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.task.action.conflict_policy = policy;
        self
    }

    pub fn with_residue_check(mut self, enabled: bool) -> Self {
        self.task.action.enable_title_residue_check = enabled;
        self
    }

    pub fn with_special_episode_handling(mut self) -> Self {
        self.task.action.enable_special_episode_handling = true;
        self
    }

    pub fn auto_delete_when_completed(mut self) -> Self {
        self.task.action.auto_delete_when_completed = true;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.task.enabled = false;
        self
    }

    pub fn with_next_run(mut self, next_run: DateTime<Utc>) -> Self {
        self.task.next_run = Some(next_run);
        self
    }

    pub fn build(self) -> Task {
        self.task
    }
}

/// Builder for creating test MediaItem entities
pub struct MediaItemBuilder {
    item: MediaItem,
}

impl MediaItemBuilder {
    pub fn new(id: &str, title: &str) -> Self {
        Self {
            item: MediaItem::new(id, title),
        }
    }

    pub fn with_tmdb_id(mut self, tmdb_id: &str) -> Self {
        self.item.tmdb_id = Some(tmdb_id.to_string());
        self
    }

    pub fn with_source_url(mut self, url: &str) -> Self {
        self.item.source_url = Some(url.to_string());
        self
    }

    /// 扁平剧集列表，`(集数, 是否完成)`
    pub fn with_episodes(mut self, episodes: &[(u32, bool)]) -> Self {
        self.item.episodes = episodes
            .iter()
            .map(|&(number, completed)| Episode { number, completed })
            .collect();
        self
    }

    pub fn with_season(mut self, season_number: u32, episodes: &[(u32, bool)]) -> Self {
        self.item.seasons.push(SeasonProgress {
            season_number,
            episodes: episodes
                .iter()
                .map(|&(number, completed)| Episode { number, completed })
                .collect(),
        });
        self
    }

    pub fn with_status(mut self, status: ItemStatus) -> Self {
        self.item.status = status;
        self
    }

    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.item.created_at = at;
        self.item.updated_at = at;
        self
    }

    pub fn build(self) -> MediaItem {
        self.item
    }
}
