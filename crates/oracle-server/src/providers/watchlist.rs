use super::{to_content, Provider};
use crate::db::Db;
use async_trait::async_trait;
use oracle_core::{AppError, Category, Content, Result};
use std::collections::HashSet;
use std::sync::Arc;

/// Videos the user pinned. No recency floor, no cap.
pub struct WatchlistProvider {
    db: Arc<Db>,
}

impl WatchlistProvider {
    pub fn new(db: Arc<Db>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Provider for WatchlistProvider {
    fn name(&self) -> &str {
        "youtube-watchlist"
    }

    async fn get_all(&self, ignored: &HashSet<String>) -> Result<Vec<Content>> {
        let videos = self
            .db
            .get_watchlist_videos(ignored)
            .map_err(AppError::DbError)?;
        Ok(to_content(videos, Category::Watchlist))
    }
}
