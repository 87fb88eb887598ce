use crate::error::{AppError, Result};
use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct YouTubeConfig {
    pub client_id: String,
    #[serde(skip_serializing)]
    pub client_secret: String,
    pub redirect_uri: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TwitchConfig {
    pub client_id: String,
    #[serde(skip_serializing)]
    pub client_secret: String,
    pub redirect_uri: String,
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EsportConfig {
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    pub team_ids: Vec<String>,
}

/// Process configuration, read from the environment at start-up.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AppConfig {
    pub database_path: String,
    pub port: u16,
    pub static_dir: String,
    pub base_url: String,
    pub zima_url: String,
    pub sync_interval_secs: u64,
    pub youtube: YouTubeConfig,
    pub twitch: TwitchConfig,
    pub esport: EsportConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| -> String {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let port = get("PORT", "8080")
            .parse::<u16>()
            .map_err(|e| AppError::ConfigError(format!("PORT: {e}")))?;
        let sync_interval_secs = get("SYNC_INTERVAL_SECS", "1800")
            .parse::<u64>()
            .map_err(|e| AppError::ConfigError(format!("SYNC_INTERVAL_SECS: {e}")))?;
        if sync_interval_secs == 0 {
            return Err(AppError::ConfigError(
                "SYNC_INTERVAL_SECS must be positive".into(),
            ));
        }

        let team_ids = get("ESPORT_TEAMS", "")
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();

        Ok(Self {
            database_path: get("DATABASE_PATH", "content-oracle.db"),
            port,
            static_dir: get("STATIC_DIR", "./public"),
            base_url: get("BASE_URL", "http://localhost:8080"),
            zima_url: get("ZIMA_URL", "http://localhost:3000"),
            sync_interval_secs,
            youtube: YouTubeConfig {
                client_id: get("YOUTUBE_CLIENT_ID", ""),
                client_secret: get("YOUTUBE_CLIENT_SECRET", ""),
                redirect_uri: get("YOUTUBE_REDIRECT_URI", ""),
            },
            twitch: TwitchConfig {
                client_id: get("TWITCH_CLIENT_ID", ""),
                client_secret: get("TWITCH_CLIENT_SECRET", ""),
                redirect_uri: get("TWITCH_REDIRECT_URI", ""),
                user_id: get("TWITCH_USER_ID", ""),
            },
            esport: EsportConfig {
                base_url: get("ESPORT_BASE_URL", ""),
                api_key: get("ESPORT_API_KEY", ""),
                team_ids,
            },
        })
    }
}
