use super::{HistoryBatch, HistoryFeed, Provider, RECENCY_WINDOW_DAYS};
use crate::clients::zima::YOUTUBE_APPLICATION;
use crate::clients::{HistoryEntry, HistorySource};
use crate::db::Db;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use oracle_core::clock::Clock;
use oracle_core::playback::{parse_playback, Playback};
use oracle_core::{AppError, Artist, Category, Content, Result};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Entries with this much or less left to watch are considered finished.
pub const MIN_REMAINING_SECS: i64 = 300;

pub struct HistoryProvider {
    source: Arc<dyn HistorySource>,
    db: Arc<Db>,
    clock: Arc<dyn Clock>,
}

impl HistoryProvider {
    pub fn new(source: Arc<dyn HistorySource>, db: Arc<Db>, clock: Arc<dyn Clock>) -> Self {
        Self { source, db, clock }
    }
}

fn parse_ts(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Latest playback update, or the entry's creation time when it has none.
fn last_played_at(entry: &HistoryEntry) -> Option<DateTime<Utc>> {
    if entry.playback().is_empty() {
        return parse_ts(&entry.created_at);
    }
    entry
        .playback()
        .iter()
        .filter_map(|p| parse_ts(&p.updated_at))
        .max()
}

/// Applies the watch-progress rules to raw history.
pub fn filter_history(
    entries: &[HistoryEntry],
    blocked: &HashSet<String>,
    now: DateTime<Utc>,
) -> HistoryBatch {
    let window = Duration::days(RECENCY_WINDOW_DAYS);
    let mut batch = HistoryBatch::default();

    for entry in entries {
        let video_id = entry.video_id();
        batch.seen_ids.insert(video_id.to_string());

        let Some(metadata) = &entry.metadata else {
            continue;
        };
        if blocked.contains(video_id) || blocked.contains(&entry.id) {
            continue;
        }

        let Some(last_played) = last_played_at(entry) else {
            warn!(entry_id = %entry.id, "History entry has no parseable timestamp");
            continue;
        };
        if now - last_played > window {
            continue;
        }

        let (position, remaining) = match entry.playback().first() {
            None => (0.0, 0),
            Some(record) => match parse_playback(&record.position) {
                Playback::Malformed(raw) => {
                    warn!(entry_id = %entry.id, position = %raw, "Unreadable playback position");
                    (0.0, 0)
                }
                parsed => {
                    let info = parsed.info().unwrap_or_default();
                    let remaining = info.remaining();
                    if remaining <= MIN_REMAINING_SECS {
                        debug!(entry_id = %entry.id, remaining, "History entry mostly watched");
                        continue;
                    }
                    (info.percentage, remaining)
                }
            },
        };

        batch.content.push(Content {
            id: video_id.to_string(),
            artist: Artist {
                id: String::new(),
                name: entry.artist.clone(),
            },
            title: entry.title.clone(),
            thumbnail: metadata.poster_link.clone(),
            url: metadata.content_url.clone(),
            is_live: false,
            position,
            remaining,
            category: Category::History,
            published_at: Some(last_played),
        });
    }

    batch
        .content
        .sort_by(|a, b| b.published_at.cmp(&a.published_at));
    batch
}

#[async_trait]
impl HistoryFeed for HistoryProvider {
    async fn history(&self) -> Result<HistoryBatch> {
        let entries = self
            .source
            .get_history(true, YOUTUBE_APPLICATION)
            .await?;
        let blocked = self.db.blocked_video_ids().map_err(AppError::DbError)?;
        Ok(filter_history(&entries, &blocked, self.clock.now()))
    }
}

#[async_trait]
impl Provider for HistoryProvider {
    fn name(&self) -> &str {
        "youtube-history"
    }

    async fn get_all(&self, ignored: &HashSet<String>) -> Result<Vec<Content>> {
        let mut content = self.history().await?.content;
        content.retain(|c| !ignored.contains(&c.id));
        Ok(content)
    }
}
