use super::{check_status, MatchSource};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use oracle_core::config::EsportConfig;
use oracle_core::esport::Match;
use oracle_core::Result;
use serde::{Deserialize, Serialize};

const LOOK_BACK_DAYS: i64 = 15;

#[derive(Serialize)]
struct EventsRequest<'a> {
    ids: &'a [String],
    after: DateTime<Utc>,
}

#[derive(Deserialize)]
struct EventsResponse {
    #[serde(default)]
    data: Vec<Match>,
}

/// Fixture feed for the configured teams.
pub struct EsportClient {
    http: reqwest::Client,
    config: EsportConfig,
}

impl EsportClient {
    pub fn new(http: reqwest::Client, config: EsportConfig) -> Self {
        Self { http, config }
    }
}

#[async_trait]
impl MatchSource for EsportClient {
    fn name(&self) -> &str {
        "esport-events"
    }

    async fn get_matches(&self) -> Result<Vec<Match>> {
        let after = Utc::now() - Duration::days(LOOK_BACK_DAYS);
        let mut req = self
            .http
            .post(format!("{}/events", self.config.base_url.trim_end_matches('/')))
            .json(&EventsRequest {
                ids: &self.config.team_ids,
                after,
            });
        if !self.config.api_key.is_empty() {
            req = req.header("x-api-key", &self.config.api_key);
        }
        let body: EventsResponse = check_status(req.send().await?, "esport events")
            .await?
            .json()
            .await?;
        Ok(body.data)
    }
}
