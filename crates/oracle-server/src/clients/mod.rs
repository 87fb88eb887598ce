//! Upstream collaborators. Each one sits behind a trait so adapters, the
//! aggregator and the sync job can run against in-process fakes.

pub mod esport;
pub mod twitch;
pub mod youtube;
pub mod zima;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use oracle_core::esport::Match;
use oracle_core::{Channel, Result};
use serde::Deserialize;

/// A channel the authenticated user subscribes to.
#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    pub channel_id: String,
    pub title: String,
    pub preview_url: String,
}

/// One entry of a channel's activity feed.
#[derive(Debug, Clone, PartialEq)]
pub struct Activity {
    pub kind: String,
    pub video_id: Option<String>,
    pub channel_id: String,
    pub title: String,
    pub description: String,
    pub thumbnail: String,
    pub published_at: DateTime<Utc>,
}

impl Activity {
    /// Uploads with an empty description are community posts and similar noise.
    pub fn is_upload(&self) -> bool {
        self.kind == "upload" && !self.description.is_empty() && self.video_id.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoDetails {
    pub id: String,
    pub title: String,
    pub channel_id: String,
    pub channel_title: String,
    pub thumbnail: String,
    pub published_at: DateTime<Utc>,
    pub duration: Option<String>,
}

#[async_trait]
pub trait VideoPlatform: Send + Sync {
    /// Obtains a usable credential for the calls that follow. An `Auth` error
    /// here is fatal to the caller's whole run.
    async fn authorize(&self) -> Result<()>;

    async fn list_subscriptions(&self) -> Result<Vec<Subscription>>;

    /// Activities published strictly after `after`, every page.
    async fn list_channel_activities(
        &self,
        channel_id: &str,
        after: DateTime<Utc>,
    ) -> Result<Vec<Activity>>;

    /// Raw ISO-8601 duration, `None` when the video is unknown upstream.
    async fn get_video_duration(&self, video_id: &str) -> Result<Option<String>>;

    /// Owning channel of a video. `is_subscribed` is always false here.
    async fn get_channel_by_video(&self, video_id: &str) -> Result<Option<Channel>>;

    async fn get_video_details(&self, video_id: &str) -> Result<Option<VideoDetails>>;

    async fn is_subscribed(&self, channel_id: &str) -> Result<bool> {
        Ok(self
            .list_subscriptions()
            .await?
            .iter()
            .any(|s| s.channel_id == channel_id))
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackRecord {
    #[serde(default)]
    pub position: String,
    #[serde(default)]
    pub updated_at: String,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryMetadata {
    #[serde(default)]
    pub content_url: String,
    #[serde(default)]
    pub poster_link: String,
    #[serde(default)]
    pub video_id: String,
}

/// One watch-history row from the home-media server.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub playback: Option<Vec<PlaybackRecord>>,
    #[serde(default)]
    pub metadata: Option<HistoryMetadata>,
}

impl HistoryEntry {
    pub fn playback(&self) -> &[PlaybackRecord] {
        self.playback.as_deref().unwrap_or_default()
    }

    /// Platform video id when resolved, else the history row id.
    pub fn video_id(&self) -> &str {
        match &self.metadata {
            Some(m) if !m.video_id.is_empty() => &m.video_id,
            _ => &self.id,
        }
    }
}

#[async_trait]
pub trait HistorySource: Send + Sync {
    async fn get_history(
        &self,
        include_playback: bool,
        application: &str,
    ) -> Result<Vec<HistoryEntry>>;
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct LiveStream {
    pub id: String,
    #[serde(default)]
    pub user_login: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub title: String,
    /// Template with `{width}` and `{height}` placeholders.
    #[serde(default)]
    pub thumbnail_url: String,
    pub started_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait LiveStreamSource: Send + Sync {
    async fn followed_streams(&self) -> Result<Vec<LiveStream>>;
}

#[async_trait]
pub trait MatchSource: Send + Sync {
    fn name(&self) -> &str;

    async fn get_matches(&self) -> Result<Vec<Match>>;
}

/// Turns a non-success response into an error, keeping a slice of the body.
/// Only 401 is a credential failure; 403 carries quota and per-resource
/// refusals, which stay upstream errors.
pub(crate) async fn check_status(
    resp: reqwest::Response,
    what: &str,
) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let snippet: String = body.chars().take(200).collect();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(oracle_core::AppError::Auth(format!("{what}: {status} {snippet}")));
    }
    Err(oracle_core::AppError::Upstream(format!("{what}: {status} {snippet}")))
}
