use crate::clients::VideoPlatform;
use crate::db::{Db, WatchlistItem};
use chrono::Utc;
use oracle_core::duration::{is_shorts, parse_iso8601};
use oracle_core::models::{youtube_channel_url, youtube_watch_url, BlockedChannel, BlockedVideo};
use oracle_core::{AppError, Channel, Ranking, Result, Video};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionView {
    pub channel_id: String,
    pub name: String,
    pub rank: i64,
    pub url: String,
    pub preview_url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SettingsView {
    #[serde(default)]
    pub subscriptions: Vec<SubscriptionView>,
    #[serde(default)]
    pub ranking: Vec<Ranking>,
}

/// Pull the video id out of a `watch?v=` or `youtu.be/` link.
pub fn extract_video_id(raw: &str) -> Result<String> {
    let parsed = url::Url::parse(raw.trim())
        .map_err(|e| AppError::ParseError(format!("invalid url {raw:?}: {e}")))?;

    if let Some((_, v)) = parsed.query_pairs().find(|(k, _)| k == "v") {
        if !v.is_empty() {
            return Ok(v.into_owned());
        }
    }
    if parsed.host_str() == Some("youtu.be") {
        if let Some(id) = parsed.path_segments().and_then(|mut s| s.next()) {
            if !id.is_empty() {
                return Ok(id.to_string());
            }
        }
    }
    Err(AppError::ParseError(format!("video id not found in {raw:?}")))
}

/// User-driven catalog edits: pins, blocks, subscription import, ranking.
pub struct Library {
    db: Arc<Db>,
    platform: Arc<dyn VideoPlatform>,
}

impl Library {
    pub fn new(db: Arc<Db>, platform: Arc<dyn VideoPlatform>) -> Self {
        Self { db, platform }
    }

    pub fn block_video(&self, video_id: &str, status: &str) -> Result<BlockedVideo> {
        self.db
            .block_video(video_id.trim(), status)
            .map_err(AppError::DbError)
    }

    pub fn block_channel(&self, channel_id: &str, status: &str) -> Result<BlockedChannel> {
        self.db
            .block_channel(channel_id.trim(), status)
            .map_err(AppError::DbError)
    }

    /// Pins a video and makes sure its row and channel row exist.
    pub async fn add_to_watchlist(&self, youtube_url: &str) -> Result<WatchlistItem> {
        let video_id = extract_video_id(youtube_url)?;
        self.platform.authorize().await?;

        let details = self
            .platform
            .get_video_details(&video_id)
            .await?
            .ok_or_else(|| AppError::Upstream(format!("video {video_id} not found")))?;

        if self
            .db
            .get_channel_by_id(&details.channel_id)
            .map_err(AppError::DbError)?
            .is_none()
        {
            self.db
                .insert_channel(&Channel {
                    id: details.channel_id.clone(),
                    title: details.channel_title.clone(),
                    preview_url: String::new(),
                    is_subscribed: false,
                })
                .map_err(AppError::DbError)?;
        }

        let shorts = match details.duration.as_deref().map(parse_iso8601) {
            Some(Ok(d)) => is_shorts(d),
            Some(Err(e)) => {
                warn!(error = %e, video_id = %video_id, "Malformed duration on pinned video");
                false
            }
            None => false,
        };
        self.db
            .insert_video(&Video {
                url: youtube_watch_url(&details.id),
                id: details.id,
                title: details.title,
                channel_id: details.channel_id,
                thumbnail: details.thumbnail,
                published_at: details.published_at,
                is_shorts: shorts,
                sync_at: Utc::now(),
            })
            .map_err(AppError::DbError)?;

        let item = self
            .db
            .add_to_watchlist(&video_id)
            .map_err(AppError::DbError)?;
        info!(video_id = %video_id, "Added to watchlist");
        Ok(item)
    }

    /// Imports the user's subscriptions as subscribed channels. Known ids are left alone.
    pub async fn init_channels(&self) -> Result<usize> {
        self.platform.authorize().await?;
        let subscriptions = self.platform.list_subscriptions().await?;

        let mut created = 0;
        for sub in subscriptions {
            let known = match self.db.get_channel_by_id(&sub.channel_id) {
                Ok(known) => known,
                Err(e) => {
                    warn!(error = %e, channel_id = %sub.channel_id, "Channel lookup failed");
                    continue;
                }
            };
            if known.is_some() {
                continue;
            }
            let channel = Channel {
                id: sub.channel_id,
                title: sub.title,
                preview_url: sub.preview_url,
                is_subscribed: true,
            };
            match self.db.insert_channel(&channel) {
                Ok(true) => created += 1,
                Ok(false) => {}
                Err(e) => warn!(error = %e, channel_id = %channel.id, "Failed to store channel"),
            }
        }
        info!(created, "Imported subscriptions");
        Ok(created)
    }

    /// Subscribed channels with their rank, highest first.
    pub fn settings(&self) -> Result<SettingsView> {
        let ranking = self.db.get_ranking().map_err(AppError::DbError)?;
        let channels = self.db.subscribed_channels().map_err(AppError::DbError)?;

        let mut subscriptions: Vec<SubscriptionView> = channels
            .into_iter()
            .map(|c| SubscriptionView {
                rank: ranking
                    .iter()
                    .find(|r| r.id == c.id)
                    .map(|r| r.rank)
                    .unwrap_or(0),
                url: youtube_channel_url(&c.id),
                channel_id: c.id,
                name: c.title,
                preview_url: c.preview_url,
            })
            .collect();
        subscriptions.sort_by(|a, b| b.rank.cmp(&a.rank).then_with(|| a.name.cmp(&b.name)));

        Ok(SettingsView {
            subscriptions,
            ranking,
        })
    }

    pub fn save_ranking(&self, ranking: &[Ranking]) -> Result<usize> {
        self.db
            .batch_upsert_ranking(ranking)
            .map_err(AppError::DbError)
    }
}
