use super::{to_content, Provider, RECENCY_WINDOW_DAYS};
use crate::db::Db;
use async_trait::async_trait;
use chrono::Duration;
use oracle_core::clock::Clock;
use oracle_core::selector::{PER_CHANNEL_CAP, TOTAL_CAP};
use oracle_core::{AppError, Category, Content, Result};
use std::collections::HashSet;
use std::sync::Arc;

/// Recent uploads from ranked channels, highest rank first.
pub struct SuggestionsProvider {
    db: Arc<Db>,
    clock: Arc<dyn Clock>,
}

impl SuggestionsProvider {
    pub fn new(db: Arc<Db>, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }
}

#[async_trait]
impl Provider for SuggestionsProvider {
    fn name(&self) -> &str {
        "youtube-suggestions"
    }

    async fn get_all(&self, ignored: &HashSet<String>) -> Result<Vec<Content>> {
        let since = self.clock.now() - Duration::days(RECENCY_WINDOW_DAYS);
        let videos = self
            .db
            .get_top_ranked_videos(&since, ignored, PER_CHANNEL_CAP, TOTAL_CAP)
            .map_err(AppError::DbError)?;
        Ok(to_content(videos, Category::Suggestions))
    }
}
