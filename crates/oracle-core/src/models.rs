use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Content categories as shown to the frontend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Category {
    #[serde(rename = "Live Streams")]
    LiveStreams,
    #[serde(rename = "YouTube History")]
    History,
    #[serde(rename = "YouTube Suggestions")]
    Suggestions,
    #[serde(rename = "Unsubscribed Channels")]
    UnsubscribedChannels,
    #[serde(rename = "YouTube Watchlist")]
    Watchlist,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LiveStreams => "Live Streams",
            Self::History => "YouTube History",
            Self::Suggestions => "YouTube Suggestions",
            Self::UnsubscribedChannels => "Unsubscribed Channels",
            Self::Watchlist => "YouTube Watchlist",
        }
    }

    pub fn all() -> &'static [Category] {
        &[
            Self::LiveStreams,
            Self::History,
            Self::Suggestions,
            Self::UnsubscribedChannels,
            Self::Watchlist,
        ]
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Artist {
    #[serde(default)]
    pub id: String,
    pub name: String,
}

/// A displayable unit returned by the aggregator. Built per request, never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    pub id: String,
    pub artist: Artist,
    pub title: String,
    pub thumbnail: String,
    pub url: String,
    pub is_live: bool,
    /// Playback progress in percent (0-100).
    pub position: f64,
    /// Seconds left to watch.
    #[serde(skip)]
    pub remaining: i64,
    pub category: Category,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

impl Content {
    /// Regular catalog video rendered into a feed entry.
    pub fn from_video(video: &Video, channel_title: &str, category: Category) -> Self {
        Self {
            id: video.id.clone(),
            artist: Artist {
                id: video.channel_id.clone(),
                name: channel_title.to_string(),
            },
            title: video.title.clone(),
            thumbnail: video.thumbnail.clone(),
            url: video.url.clone(),
            is_live: false,
            position: 0.0,
            remaining: 0,
            category,
            published_at: Some(video.published_at),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub id: String,
    pub title: String,
    pub preview_url: String,
    /// Captured once at discovery time.
    pub is_subscribed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    pub id: String,
    pub title: String,
    pub channel_id: String,
    pub thumbnail: String,
    pub url: String,
    pub published_at: DateTime<Utc>,
    pub is_shorts: bool,
    pub sync_at: DateTime<Utc>,
}

/// Catalog video joined with its channel, as read back by feed queries.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelVideo {
    pub video: Video,
    pub channel_title: String,
    pub rank: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ranking {
    /// Channel id.
    pub id: String,
    pub rank: i64,
}

impl Ranking {
    pub fn is_ranked(&self) -> bool {
        self.rank > 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BlockedVideo {
    pub id: i64,
    pub video_id: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BlockedChannel {
    pub id: i64,
    pub channel_id: String,
    pub status: String,
}

pub fn youtube_watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={video_id}")
}

pub fn youtube_channel_url(channel_id: &str) -> String {
    format!("https://www.youtube.com/channel/{channel_id}")
}
