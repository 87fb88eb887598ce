use super::{to_content, Provider, RECENCY_WINDOW_DAYS};
use crate::db::Db;
use async_trait::async_trait;
use chrono::Duration;
use oracle_core::clock::Clock;
use oracle_core::selector::{PER_CHANNEL_CAP, TOTAL_CAP};
use oracle_core::{AppError, Category, Content, Result};
use std::collections::HashSet;
use std::sync::Arc;

/// Channels found through watch history that the user never subscribed to.
pub struct UnsubscribedChannelsProvider {
    db: Arc<Db>,
    clock: Arc<dyn Clock>,
}

impl UnsubscribedChannelsProvider {
    pub fn new(db: Arc<Db>, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }
}

#[async_trait]
impl Provider for UnsubscribedChannelsProvider {
    fn name(&self) -> &str {
        "youtube-unsubscribed-channels"
    }

    async fn get_all(&self, ignored: &HashSet<String>) -> Result<Vec<Content>> {
        let since = self.clock.now() - Duration::days(RECENCY_WINDOW_DAYS);
        let videos = self
            .db
            .get_unsubscribed_channel_videos(&since, ignored, PER_CHANNEL_CAP, TOTAL_CAP)
            .map_err(AppError::DbError)?;
        Ok(to_content(videos, Category::UnsubscribedChannels))
    }
}
