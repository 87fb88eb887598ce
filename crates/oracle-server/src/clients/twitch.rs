use super::{check_status, LiveStream, LiveStreamSource};
use crate::db::Db;
use async_trait::async_trait;
use oracle_core::config::TwitchConfig;
use oracle_core::{AppError, Result};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

const HELIX_BASE: &str = "https://api.twitch.tv/helix";
const TOKEN_URL: &str = "https://id.twitch.tv/oauth2/token";

pub const ACCESS_TOKEN_KEY: &str = "twitch_access_token";
pub const REFRESH_TOKEN_KEY: &str = "twitch_refresh_token";

#[derive(Deserialize)]
struct StreamsResponse {
    #[serde(default)]
    data: Vec<LiveStream>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
}

/// Twitch Helix client for the configured user's followed live streams.
pub struct TwitchClient {
    http: reqwest::Client,
    config: TwitchConfig,
    db: Arc<Db>,
}

impl TwitchClient {
    pub fn new(http: reqwest::Client, config: TwitchConfig, db: Arc<Db>) -> Self {
        if matches!(db.get_setting(ACCESS_TOKEN_KEY), Ok(None)) {
            info!("No Twitch access token stored; complete /auth/twitch/callback");
        }
        Self { http, config, db }
    }

    pub async fn exchange_code(&self, code: &str) -> Result<()> {
        let resp = self
            .http
            .post(TOKEN_URL)
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("code", code),
                ("grant_type", "authorization_code"),
                ("redirect_uri", self.config.redirect_uri.as_str()),
            ])
            .send()
            .await?;
        let token: TokenResponse = check_status(resp, "Twitch code exchange").await?.json().await?;
        self.store_tokens(&token)?;
        info!("Twitch authorization stored");
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
        Ok(())
    }

    async fn refresh(&self) -> Result<String> {
        let refresh = self
            .db
            .get_setting(REFRESH_TOKEN_KEY)
            .map_err(AppError::DbError)?
            .ok_or_else(|| AppError::Auth("no Twitch refresh token stored".into()))?;
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
        let token: TokenResponse = check_status(resp, "Twitch token refresh").await?.json().await?;
        self.store_tokens(&token)?;
        Ok(token.access_token)
    }

    async fn fetch_followed(&self, token: &str) -> Result<Vec<LiveStream>> {
        let resp = self
            .http
            .get(format!("{HELIX_BASE}/streams/followed"))
            .header("Client-Id", &self.config.client_id)
            .bearer_auth(token)
            .query(&[("user_id", self.config.user_id.as_str()), ("first", "100")])
            .send()
            .await?;
        let body: StreamsResponse = check_status(resp, "Twitch followed streams")
            .await?
            .json()
            .await?;
        Ok(body.data)
    }
}

#[async_trait]
impl LiveStreamSource for TwitchClient {
    async fn followed_streams(&self) -> Result<Vec<LiveStream>> {
        let token = self
            .db
            .get_setting(ACCESS_TOKEN_KEY)
            .map_err(AppError::DbError)?
            .ok_or_else(|| AppError::Auth("Twitch is not authorized".into()))?;

        match self.fetch_followed(&token).await {
            Err(e) if e.is_auth() => {
                warn!(error = %e, "Twitch token rejected, refreshing");
                let token = self.refresh().await?;
                self.fetch_followed(&token).await
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_token_is_auth_error() {
        let db = Arc::new(Db::open_in_memory().unwrap());
        let client = TwitchClient::new(
            reqwest::Client::new(),
            TwitchConfig {
                client_id: "cid".into(),
                client_secret: "secret".into(),
                redirect_uri: String::new(),
                user_id: "42".into(),
            },
            db,
        );
        assert!(client.followed_streams().await.unwrap_err().is_auth());
    }

    #[test]
    fn decodes_helix_stream_page() {
        let json = r#"{"data": [{
            "id": "s1", "user_login": "shroud", "user_name": "shroud",
            "title": "ranked", "thumbnail_url": "https://x/{width}x{height}.jpg",
            "started_at": "2024-05-10T08:00:00Z", "viewer_count": 100
        }], "pagination": {}}"#;
        let page: StreamsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(page.data[0].user_login, "shroud");
        assert!(page.data[0].started_at.is_some());
    }
}
