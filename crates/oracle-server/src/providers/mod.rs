//! Source adapters. Every adapter answers `get_all(ignored)` with fresh
//! `Content`; none of them may return an id from `ignored`.

pub mod history;
pub mod live_streams;
pub mod suggestions;
pub mod unsubscribed;
pub mod watchlist;

use async_trait::async_trait;
use oracle_core::{Category, ChannelVideo, Content, Result};
use std::collections::HashSet;

/// Regular-content queries only look this far back.
pub const RECENCY_WINDOW_DAYS: i64 = 7;

#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    async fn get_all(&self, ignored: &HashSet<String>) -> Result<Vec<Content>>;
}

/// History output plus every video id the history mentioned, surfaced or not.
#[derive(Debug, Default)]
pub struct HistoryBatch {
    pub content: Vec<Content>,
    pub seen_ids: HashSet<String>,
}

impl HistoryBatch {
    /// Exclusion set handed to the other adapters.
    pub fn ignored_ids(&self) -> HashSet<String> {
        let mut ids = self.seen_ids.clone();
        ids.extend(self.content.iter().map(|c| c.id.clone()));
        ids
    }
}

#[async_trait]
pub trait HistoryFeed: Send + Sync {
    async fn history(&self) -> Result<HistoryBatch>;
}

pub(crate) fn to_content(videos: Vec<ChannelVideo>, category: Category) -> Vec<Content> {
    videos
        .iter()
        .map(|cv| Content::from_video(&cv.video, &cv.channel_title, category))
        .collect()
}
