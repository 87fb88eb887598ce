use super::{check_status, HistoryEntry, HistorySource};
use async_trait::async_trait;
use oracle_core::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub const YOUTUBE_APPLICATION: &str = "YouTube (com.google.ios.youtube)";

#[derive(Serialize)]
struct Invocation<A> {
    name: &'static str,
    args: A,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HistoryArgs<'a> {
    application_name: &'a str,
    include_playback: bool,
}

#[derive(Serialize)]
struct OpenUrlArgs<'a> {
    url: &'a str,
}

#[derive(Deserialize)]
struct InvokeResponse<T> {
    response: Option<T>,
}

/// Home-media server: watch history and "play this on the TV".
pub struct ZimaClient {
    http: reqwest::Client,
    base_url: String,
}

impl ZimaClient {
    pub fn new(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn invoke<A: Serialize, T: DeserializeOwned>(
        &self,
        name: &'static str,
        args: A,
    ) -> Result<Option<T>> {
        let resp = self
            .http
            .post(format!("{}/discovery/invoke", self.base_url))
            .json(&Invocation { name, args })
            .send()
            .await?;
        let body: InvokeResponse<T> = check_status(resp, name).await?.json().await?;
        Ok(body.response)
    }

    pub async fn open_url(&self, url: &str) -> Result<()> {
        self.invoke::<_, serde_json::Value>("streams-start", OpenUrlArgs { url })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl HistorySource for ZimaClient {
    async fn get_history(
        &self,
        include_playback: bool,
        application: &str,
    ) -> Result<Vec<HistoryEntry>> {
        let entries: Option<Vec<HistoryEntry>> = self
            .invoke(
                "content-collector-history",
                HistoryArgs {
                    application_name: application,
                    include_playback,
                },
            )
            .await?;
        Ok(entries.unwrap_or_default())
    }
}
