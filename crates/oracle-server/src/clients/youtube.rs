use super::{check_status, Activity, Subscription, VideoDetails, VideoPlatform};
use crate::db::Db;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use oracle_core::cache::{ExternalApiCache, DEFAULT_TTL_SECS};
use oracle_core::clock::Clock;
use oracle_core::config::YouTubeConfig;
use oracle_core::{AppError, Channel, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

const API_BASE: &str = "https://www.googleapis.com/youtube/v3";
const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const SCOPE: &str = "https://www.googleapis.com/auth/youtube.readonly";
const PAGE_SIZE: &str = "50";

pub const ACCESS_TOKEN_KEY: &str = "youtube_access_token";
pub const REFRESH_TOKEN_KEY: &str = "youtube_refresh_token";

// --- YouTube Data API response shapes ---

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Page<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    next_page_token: Option<String>,
}

#[derive(Deserialize, Default)]
struct Thumbnails {
    default: Option<Thumbnail>,
    medium: Option<Thumbnail>,
    high: Option<Thumbnail>,
}

#[derive(Deserialize)]
struct Thumbnail {
    url: String,
}

impl Thumbnails {
    fn medium_or_any(&self) -> String {
        self.medium
            .as_ref()
            .or(self.high.as_ref())
            .or(self.default.as_ref())
            .map(|t| t.url.clone())
            .unwrap_or_default()
    }
}

#[derive(Deserialize)]
struct SubscriptionItem {
    snippet: SubscriptionSnippet,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubscriptionSnippet {
    #[serde(default)]
    title: String,
    resource_id: ResourceId,
    #[serde(default)]
    thumbnails: Thumbnails,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceId {
    channel_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActivityItem {
    snippet: ActivitySnippet,
    #[serde(default)]
    content_details: ActivityContentDetails,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActivitySnippet {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    channel_id: String,
    published_at: DateTime<Utc>,
    #[serde(default)]
    thumbnails: Thumbnails,
}

#[derive(Deserialize, Default)]
struct ActivityContentDetails {
    upload: Option<UploadDetails>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadDetails {
    video_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoItem {
    id: String,
    snippet: Option<VideoSnippet>,
    content_details: Option<VideoContentDetails>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoSnippet {
    #[serde(default)]
    title: String,
    channel_id: String,
    #[serde(default)]
    channel_title: String,
    published_at: DateTime<Utc>,
    #[serde(default)]
    thumbnails: Thumbnails,
}

#[derive(Deserialize)]
struct VideoContentDetails {
    #[serde(default)]
    duration: String,
}

#[derive(Deserialize)]
struct ChannelItem {
    id: String,
    snippet: ChannelSnippet,
}

#[derive(Deserialize)]
struct ChannelSnippet {
    #[serde(default)]
    title: String,
    #[serde(default)]
    thumbnails: Thumbnails,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
}

impl From<ActivityItem> for Activity {
    fn from(item: ActivityItem) -> Self {
        Self {
            kind: item.snippet.kind,
            video_id: item.content_details.upload.map(|u| u.video_id),
            channel_id: item.snippet.channel_id,
            title: item.snippet.title,
            description: item.snippet.description,
            thumbnail: item.snippet.thumbnails.medium_or_any(),
            published_at: item.snippet.published_at,
        }
    }
}

/// YouTube Data API v3 client. OAuth tokens live in the settings table;
/// quota-heavy lookups are memoized for an hour.
pub struct YouTubeClient {
    http: reqwest::Client,
    config: YouTubeConfig,
    db: Arc<Db>,
    access_token: RwLock<Option<String>>,
    subscriptions: ExternalApiCache<Vec<Subscription>>,
    activities: ExternalApiCache<Vec<Activity>>,
    channels_by_video: ExternalApiCache<Channel>,
    video_details: ExternalApiCache<VideoDetails>,
    durations: ExternalApiCache<String>,
}

impl YouTubeClient {
    pub fn new(
        http: reqwest::Client,
        config: YouTubeConfig,
        db: Arc<Db>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let ttl = Duration::seconds(DEFAULT_TTL_SECS);
        let access_token = db.get_setting(ACCESS_TOKEN_KEY).ok().flatten();
        if access_token.is_none() {
            info!("No YouTube access token stored; visit /api/settings/auth/youtube");
        }
        Self {
            http,
            config,
            db,
            access_token: RwLock::new(access_token),
            subscriptions: ExternalApiCache::new(ttl, Arc::clone(&clock)),
            activities: ExternalApiCache::new(ttl, Arc::clone(&clock)),
            channels_by_video: ExternalApiCache::new(ttl, Arc::clone(&clock)),
            video_details: ExternalApiCache::new(ttl, Arc::clone(&clock)),
            durations: ExternalApiCache::new(ttl, clock),
        }
    }

    /// Consent URL for the offline-access authorization-code flow.
    pub fn auth_url(&self) -> Result<String> {
        let url = url::Url::parse_with_params(
            AUTH_URL,
            &[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", SCOPE),
                ("access_type", "offline"),
                ("prompt", "consent"),
                ("state", "state-token"),
            ],
        )
        .map_err(|e| AppError::ConfigError(format!("YouTube auth url: {e}")))?;
        Ok(url.to_string())
    }

    /// Exchanges an authorization code for tokens and stores them.
    pub async fn exchange_code(&self, code: &str) -> Result<()> {
        let resp = self
            .http
            .post(TOKEN_URL)
            .form(&[
                ("code", code),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await?;
        let token: TokenResponse = check_status(resp, "YouTube code exchange")
            .await
            .map_err(into_auth)?
            .json()
            .await?;
        self.store_tokens(&token)?;
        info!("YouTube authorization stored");
        Ok(())
    }

    pub fn clear_tokens(&self) -> Result<()> {
        self.db
            .delete_setting(ACCESS_TOKEN_KEY)
            .and_then(|_| self.db.delete_setting(REFRESH_TOKEN_KEY))
            .map_err(AppError::DbError)?;
        *self.access_token.write().unwrap_or_else(|e| e.into_inner()) = None;
        self.subscriptions.invalidate(SUBSCRIPTIONS_KEY);
        Ok(())
    }

    fn store_tokens(&self, token: &TokenResponse) -> Result<()> {
        self.db
            .set_setting(ACCESS_TOKEN_KEY, &token.access_token)
            .map_err(AppError::DbError)?;
        if let Some(refresh) = &token.refresh_token {
            self.db
                .set_setting(REFRESH_TOKEN_KEY, refresh)
                .map_err(AppError::DbError)?;
        }
        *self.access_token.write().unwrap_or_else(|e| e.into_inner()) =
            Some(token.access_token.clone());
        Ok(())
    }

    fn bearer(&self) -> Result<String> {
        self.access_token
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or_else(|| AppError::Auth("YouTube is not authorized".into()))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        resource: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let resp = self
            .http
            .get(format!("{API_BASE}/{resource}"))
            .bearer_auth(self.bearer()?)
            .query(query)
            .send()
            .await?;
        Ok(check_status(resp, resource).await?.json::<T>().await?)
    }

    async fn get_all_pages<T: DeserializeOwned>(
        &self,
        resource: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut params: Vec<(&str, &str)> = query.to_vec();
            params.push(("maxResults", PAGE_SIZE));
            if let Some(token) = page_token.as_deref() {
                params.push(("pageToken", token));
            }
            let page: Page<T> = self.get_json(resource, &params).await?;
            items.extend(page.items);
            match page.next_page_token {
                Some(next) if !next.is_empty() => page_token = Some(next),
                _ => break,
            }
        }
        Ok(items)
    }

    async fn get_video_item(&self, video_id: &str, part: &str) -> Result<Option<VideoItem>> {
        let page: Page<VideoItem> = self
            .get_json("videos", &[("part", part), ("id", video_id), ("maxResults", "1")])
            .await?;
        Ok(page.items.into_iter().next())
    }
}

const SUBSCRIPTIONS_KEY: &str = "subscriptions";

fn into_auth(e: AppError) -> AppError {
    match e {
        AppError::Upstream(msg) => AppError::Auth(msg),
        other => other,
    }
}

#[async_trait]
impl VideoPlatform for YouTubeClient {
    async fn authorize(&self) -> Result<()> {
        let refresh = self
            .db
            .get_setting(REFRESH_TOKEN_KEY)
            .map_err(AppError::DbError)?
            .ok_or_else(|| AppError::Auth("no YouTube refresh token stored".into()))?;

        let resp = self
            .http
            .post(TOKEN_URL)
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("refresh_token", refresh.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;
        let token: TokenResponse = check_status(resp, "YouTube token refresh")
            .await
            .map_err(into_auth)?
            .json()
            .await?;
        self.store_tokens(&token)
    }

    async fn list_subscriptions(&self) -> Result<Vec<Subscription>> {
        if let Some(cached) = self.subscriptions.get(SUBSCRIPTIONS_KEY) {
            return Ok(cached);
        }
        let items: Vec<SubscriptionItem> = self
            .get_all_pages("subscriptions", &[("part", "snippet"), ("mine", "true")])
            .await?;
        let subscriptions: Vec<Subscription> = items
            .into_iter()
            .filter_map(|item| {
                let channel_id = item.snippet.resource_id.channel_id?;
                Some(Subscription {
                    channel_id,
                    title: item.snippet.title.trim().to_string(),
                    preview_url: item.snippet.thumbnails.medium_or_any(),
                })
            })
            .collect();
        self.subscriptions
            .insert(SUBSCRIPTIONS_KEY, subscriptions.clone());
        Ok(subscriptions)
    }

    async fn list_channel_activities(
        &self,
        channel_id: &str,
        after: DateTime<Utc>,
    ) -> Result<Vec<Activity>> {
        let after = after.to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        let key = format!("{channel_id}|{after}");
        if let Some(cached) = self.activities.get(&key) {
            return Ok(cached);
        }
        let items: Vec<ActivityItem> = self
            .get_all_pages(
                "activities",
                &[
                    ("part", "snippet,contentDetails"),
                    ("channelId", channel_id),
                    ("publishedAfter", after.as_str()),
                ],
            )
            .await?;
        let activities: Vec<Activity> = items.into_iter().map(Activity::from).collect();
        // Empty pages are not memoized so a fresh upload shows up on the next run.
        if !activities.is_empty() {
            self.activities.insert(key, activities.clone());
        }
        Ok(activities)
    }

    async fn get_video_duration(&self, video_id: &str) -> Result<Option<String>> {
        if let Some(cached) = self.durations.get(video_id) {
            return Ok(Some(cached));
        }
        let duration = self
            .get_video_item(video_id, "contentDetails")
            .await?
            .and_then(|v| v.content_details)
            .map(|d| d.duration);
        if let Some(d) = &duration {
            self.durations.insert(video_id, d.clone());
        }
        Ok(duration)
    }

    async fn get_channel_by_video(&self, video_id: &str) -> Result<Option<Channel>> {
        if let Some(cached) = self.channels_by_video.get(video_id) {
            return Ok(Some(cached));
        }
        let Some(snippet) = self
            .get_video_item(video_id, "snippet")
            .await?
            .and_then(|v| v.snippet)
        else {
            return Ok(None);
        };
        let page: Page<ChannelItem> = self
            .get_json(
                "channels",
                &[("part", "snippet"), ("id", snippet.channel_id.as_str()), ("maxResults", "1")],
            )
            .await?;
        let Some(item) = page.items.into_iter().next() else {
            warn!(video_id, channel_id = %snippet.channel_id, "Channel lookup returned nothing");
            return Ok(None);
        };
        let channel = Channel {
            id: item.id,
            title: item.snippet.title.trim().to_string(),
            preview_url: item.snippet.thumbnails.medium_or_any(),
            is_subscribed: false,
        };
        self.channels_by_video.insert(video_id, channel.clone());
        Ok(Some(channel))
    }

    async fn get_video_details(&self, video_id: &str) -> Result<Option<VideoDetails>> {
        if let Some(cached) = self.video_details.get(video_id) {
            return Ok(Some(cached));
        }
        let Some(item) = self.get_video_item(video_id, "snippet,contentDetails").await? else {
            return Ok(None);
        };
        let Some(snippet) = item.snippet else {
            return Ok(None);
        };
        let details = VideoDetails {
            id: item.id,
            title: snippet.title,
            channel_id: snippet.channel_id,
            channel_title: snippet.channel_title.trim().to_string(),
            thumbnail: snippet.thumbnails.medium_or_any(),
            published_at: snippet.published_at,
            duration: item.content_details.map(|d| d.duration),
        };
        self.video_details.insert(video_id, details.clone());
        Ok(Some(details))
    }
}
