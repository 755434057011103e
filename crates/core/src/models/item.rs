use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 媒体条目（剧集）
///
/// 剧集进度可以按季记录在 `seasons` 中，也可以是不分季的扁平 `episodes` 列表；
/// 查询某一季时优先使用对应季的列表。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub tmdb_id: Option<String>,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub status: ItemStatus,
    #[serde(default)]
    pub seasons: Vec<SeasonProgress>,
    #[serde(default)]
    pub episodes: Vec<Episode>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Wishlist,
    #[default]
    Watching,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeasonProgress {
    pub season_number: u32,
    #[serde(default)]
    pub episodes: Vec<Episode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode {
    pub number: u32,
    #[serde(default)]
    pub completed: bool,
}

impl MediaItem {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            tmdb_id: None,
            source_url: None,
            status: ItemStatus::Watching,
            seasons: Vec::new(),
            episodes: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == ItemStatus::Completed
    }

    fn season_episodes(&self, season: u32) -> &[Episode] {
        self.seasons
            .iter()
            .find(|s| s.season_number == season)
            .map(|s| s.episodes.as_slice())
            .unwrap_or(self.episodes.as_slice())
    }

    fn season_episodes_mut(&mut self, season: u32) -> &mut Vec<Episode> {
        match self.seasons.iter().position(|s| s.season_number == season) {
            Some(idx) => &mut self.seasons[idx].episodes,
            None => &mut self.episodes,
        }
    }

    /// 指定季中已标记完成的集数
    pub fn completed_episode_numbers(&self, season: u32) -> BTreeSet<u32> {
        self.season_episodes(season)
            .iter()
            .filter(|e| e.completed)
            .map(|e| e.number)
            .collect()
    }

    /// 指定季中全部集数（无论是否完成）
    pub fn episode_numbers(&self, season: u32) -> BTreeSet<u32> {
        self.season_episodes(season).iter().map(|e| e.number).collect()
    }

    /// 所有登记的集数都已完成（没有任何集数时不算完成）
    pub fn all_episodes_completed(&self) -> bool {
        let mut all = self
            .seasons
            .iter()
            .flat_map(|s| s.episodes.iter())
            .chain(self.episodes.iter())
            .peekable();
        all.peek().is_some() && all.all(|e| e.completed)
    }

    /// 将给定集数标记为完成，返回新标记的集数。
    ///
    /// 只标记列表中已登记的集数，未登记的集数被忽略；
    /// 标记后全部完成时条目状态转为 `Completed`。
    pub fn mark_episodes_completed(
        &mut self,
        season: u32,
        numbers: &BTreeSet<u32>,
        now: DateTime<Utc>,
    ) -> Vec<u32> {
        let mut newly_marked = Vec::new();
        for episode in self.season_episodes_mut(season).iter_mut() {
            if !episode.completed && numbers.contains(&episode.number) {
                episode.completed = true;
                newly_marked.push(episode.number);
            }
        }
        newly_marked.sort_unstable();

        if !newly_marked.is_empty() {
            self.updated_at = now;
        }
        if self.all_episodes_completed() {
            self.status = ItemStatus::Completed;
        }
        newly_marked
    }
}
