use chrono::{DateTime, SecondsFormat, Utc};
use oracle_core::models::{
    BlockedChannel, BlockedVideo, Channel, ChannelVideo, Ranking, Video,
};
use oracle_core::selector::{RankedVideoSelector, SelectionOrder};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Mutex;
use tracing::info;

/// Every statement runs under this lock, so readers never see a half-written row.
/// The sync watermark (`max(published_at)`) relies on that.
pub struct Db {
    conn: Mutex<Connection>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WatchlistItem {
    pub id: i64,
    pub video_id: String,
}

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS channels (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        preview_url TEXT NOT NULL DEFAULT '',
        is_subscribed INTEGER NOT NULL DEFAULT 0
    );
    CREATE INDEX IF NOT EXISTS idx_channels_title ON channels(title);

    CREATE TABLE IF NOT EXISTS videos (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        channel_id TEXT NOT NULL,
        thumbnail TEXT NOT NULL DEFAULT '',
        url TEXT NOT NULL,
        published_at TEXT NOT NULL,
        is_shorts INTEGER NOT NULL DEFAULT 0,
        sync_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_videos_channel_pub
        ON videos(channel_id, published_at DESC);
    CREATE INDEX IF NOT EXISTS idx_videos_pub
        ON videos(published_at DESC);

    CREATE TABLE IF NOT EXISTS ranking (
        channel_id TEXT PRIMARY KEY,
        rank INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS blocked_videos (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        video_id TEXT UNIQUE NOT NULL,
        status TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS blocked_channels (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        channel_id TEXT UNIQUE NOT NULL,
        status TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS watchlist (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        video_id TEXT UNIQUE NOT NULL,
        added_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS settings (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );";

const VIDEO_COLUMNS: &str = "v.id, v.title, v.channel_id, v.thumbnail, v.url,
        v.published_at, v.is_shorts, v.sync_at,
        COALESCE(c.title, ''), COALESCE(r.rank, 0)";

/// RFC-3339, second precision, `Z` suffix: text order equals time order.
pub fn fmt_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl Db {
    pub fn open(path: &str) -> Result<Self, String> {
        let conn = Connection::open(path).map_err(|e| format!("SQLite open: {e}"))?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA busy_timeout=5000;
             PRAGMA synchronous=NORMAL;",
        )
        .map_err(|e| format!("SQLite pragma: {e}"))?;
        let db = Self::init(conn)?;
        info!(path, "SQLite database opened");
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self, String> {
        let conn = Connection::open_in_memory().map_err(|e| format!("SQLite open: {e}"))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, String> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| format!("SQLite schema: {e}"))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // --- Channels ---

    /// Returns false when the channel id already exists.
    pub fn insert_channel(&self, channel: &Channel) -> Result<bool, String> {
        let conn = self.conn.lock().map_err(|e| e.to_string())?;
        let n = conn
            .execute(
                "INSERT OR IGNORE INTO channels (id, title, preview_url, is_subscribed)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    channel.id,
                    channel.title.trim(),
                    channel.preview_url,
                    channel.is_subscribed
                ],
            )
            .map_err(|e| format!("Insert channel: {e}"))?;
        Ok(n > 0)
    }

    pub fn get_channel_by_id(&self, id: &str) -> Result<Option<Channel>, String> {
        let conn = self.conn.lock().map_err(|e| e.to_string())?;
        conn.query_row(
            "SELECT id, title, preview_url, is_subscribed FROM channels WHERE id = ?1",
            params![id],
            row_to_channel,
        )
        .optional()
        .map_err(|e| format!("Get channel: {e}"))
    }

    pub fn get_channel_by_title(&self, title: &str) -> Result<Option<Channel>, String> {
        let conn = self.conn.lock().map_err(|e| e.to_string())?;
        conn.query_row(
            "SELECT id, title, preview_url, is_subscribed FROM channels
             WHERE title = ?1 ORDER BY id LIMIT 1",
            params![title.trim()],
            row_to_channel,
        )
        .optional()
        .map_err(|e| format!("Get channel by title: {e}"))
    }

    pub fn subscribed_channels(&self) -> Result<Vec<Channel>, String> {
        let conn = self.conn.lock().map_err(|e| e.to_string())?;
        let mut stmt = conn
            .prepare(
                "SELECT id, title, preview_url, is_subscribed FROM channels
                 WHERE is_subscribed = 1 ORDER BY title",
            )
            .map_err(|e| e.to_string())?;
        let channels = stmt
            .query_map([], row_to_channel)
            .map_err(|e| e.to_string())?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| e.to_string())?;
        Ok(channels)
    }

    // --- Videos ---

    /// Primary-key insert; returns false when the id is already stored.
    pub fn insert_video(&self, video: &Video) -> Result<bool, String> {
        let conn = self.conn.lock().map_err(|e| e.to_string())?;
        let n = conn
            .execute(
                "INSERT OR IGNORE INTO videos
                    (id, title, channel_id, thumbnail, url, published_at, is_shorts, sync_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    video.id,
                    video.title,
                    video.channel_id,
                    video.thumbnail,
                    video.url,
                    fmt_ts(&video.published_at),
                    video.is_shorts,
                    fmt_ts(&video.sync_at),
                ],
            )
            .map_err(|e| format!("Insert video: {e}"))?;
        Ok(n > 0)
    }

    pub fn get_video_by_id(&self, id: &str) -> Result<Option<Video>, String> {
        let conn = self.conn.lock().map_err(|e| e.to_string())?;
        conn.query_row(
            "SELECT id, title, channel_id, thumbnail, url, published_at, is_shorts, sync_at
             FROM videos WHERE id = ?1",
            params![id],
            row_to_video,
        )
        .optional()
        .map_err(|e| format!("Get video: {e}"))
    }

    /// Newest stored `published_at` for a channel. This is the sync watermark;
    /// it is derived from durable rows and never stored separately.
    pub fn channel_watermark(&self, channel_id: &str) -> Result<Option<DateTime<Utc>>, String> {
        let conn = self.conn.lock().map_err(|e| e.to_string())?;
        let max: Option<String> = conn
            .query_row(
                "SELECT MAX(published_at) FROM videos WHERE channel_id = ?1",
                params![channel_id],
                |row| row.get(0),
            )
            .map_err(|e| format!("Channel watermark: {e}"))?;
        max.map(|s| parse_ts(0, &s))
            .transpose()
            .map_err(|e| format!("Channel watermark: {e}"))
    }

    pub fn video_count(&self) -> Result<i64, String> {
        let conn = self.conn.lock().map_err(|e| e.to_string())?;
        conn.query_row("SELECT COUNT(*) FROM videos", [], |row| row.get(0))
            .map_err(|e| e.to_string())
    }

    // --- Feed queries ---

    pub fn get_videos_for_channel_since(
        &self,
        channel_id: &str,
        since: &DateTime<Utc>,
        exclude: &HashSet<String>,
        cap: usize,
    ) -> Result<Vec<ChannelVideo>, String> {
        let conn = self.conn.lock().map_err(|e| e.to_string())?;
        query_feed_videos(
            &conn,
            "v.channel_id = ? AND v.published_at > ?",
            vec![Value::Text(channel_id.to_string()), Value::Text(fmt_ts(since))],
            exclude,
            Some(cap),
        )
    }

    /// Suggestions: channels with rank > 0, at most `per_channel` each, `total` overall,
    /// ordered by rank then recency.
    pub fn get_top_ranked_videos(
        &self,
        since: &DateTime<Utc>,
        exclude: &HashSet<String>,
        per_channel: usize,
        total: usize,
    ) -> Result<Vec<ChannelVideo>, String> {
        let candidates = {
            let conn = self.conn.lock().map_err(|e| e.to_string())?;
            query_feed_videos(
                &conn,
                "r.rank > 0 AND v.published_at > ?",
                vec![Value::Text(fmt_ts(since))],
                exclude,
                None,
            )?
        };
        Ok(
            RankedVideoSelector::with_caps(SelectionOrder::RankThenRecency, per_channel, total)
                .select(candidates),
        )
    }

    /// Channels discovered through history that the user does not subscribe to.
    pub fn get_unsubscribed_channel_videos(
        &self,
        since: &DateTime<Utc>,
        exclude: &HashSet<String>,
        per_channel: usize,
        total: usize,
    ) -> Result<Vec<ChannelVideo>, String> {
        let candidates = {
            let conn = self.conn.lock().map_err(|e| e.to_string())?;
            query_feed_videos(
                &conn,
                "c.is_subscribed = 0 AND v.published_at > ?",
                vec![Value::Text(fmt_ts(since))],
                exclude,
                None,
            )?
        };
        Ok(
            RankedVideoSelector::with_caps(SelectionOrder::Recency, per_channel, total)
                .select(candidates),
        )
    }

    pub fn get_watchlist_videos(&self, exclude: &HashSet<String>) -> Result<Vec<ChannelVideo>, String> {
        let conn = self.conn.lock().map_err(|e| e.to_string())?;
        query_feed_videos(
            &conn,
            "v.id IN (SELECT video_id FROM watchlist)",
            Vec::new(),
            exclude,
            None,
        )
    }

    // --- Ranking ---

    pub fn get_ranking(&self) -> Result<Vec<Ranking>, String> {
        let conn = self.conn.lock().map_err(|e| e.to_string())?;
        let mut stmt = conn
            .prepare("SELECT channel_id, rank FROM ranking ORDER BY rank DESC, channel_id")
            .map_err(|e| e.to_string())?;
        let rankings = stmt
            .query_map([], |row| {
                Ok(Ranking {
                    id: row.get(0)?,
                    rank: row.get(1)?,
                })
            })
            .map_err(|e| e.to_string())?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| e.to_string())?;
        Ok(rankings)
    }

    pub fn ranked_channel_ids(&self) -> Result<Vec<String>, String> {
        Ok(self
            .get_ranking()?
            .into_iter()
            .filter(Ranking::is_ranked)
            .map(|r| r.id)
            .collect())
    }

    /// All-or-nothing upsert of a ranking batch.
    pub fn batch_upsert_ranking(&self, rankings: &[Ranking]) -> Result<usize, String> {
        let mut conn = self.conn.lock().map_err(|e| e.to_string())?;
        let tx = conn.transaction().map_err(|e| format!("Begin: {e}"))?;
        for ranking in rankings {
            tx.execute(
                "INSERT INTO ranking (channel_id, rank) VALUES (?1, ?2)
                 ON CONFLICT(channel_id) DO UPDATE SET rank = excluded.rank",
                params![ranking.id, ranking.rank],
            )
            .map_err(|e| format!("Upsert ranking: {e}"))?;
        }
        tx.commit().map_err(|e| format!("Commit ranking: {e}"))?;
        Ok(rankings.len())
    }

    // --- Blocks ---

    pub fn block_video(&self, video_id: &str, status: &str) -> Result<BlockedVideo, String> {
        let conn = self.conn.lock().map_err(|e| e.to_string())?;
        conn.execute(
            "INSERT INTO blocked_videos (video_id, status) VALUES (?1, ?2)
             ON CONFLICT(video_id) DO UPDATE SET status = excluded.status",
            params![video_id, status],
        )
        .map_err(|e| format!("Block video: {e}"))?;
        conn.query_row(
            "SELECT id, video_id, status FROM blocked_videos WHERE video_id = ?1",
            params![video_id],
            |row| {
                Ok(BlockedVideo {
                    id: row.get(0)?,
                    video_id: row.get(1)?,
                    status: row.get(2)?,
                })
            },
        )
        .map_err(|e| format!("Read blocked video: {e}"))
    }

    pub fn block_channel(&self, channel_id: &str, status: &str) -> Result<BlockedChannel, String> {
        let conn = self.conn.lock().map_err(|e| e.to_string())?;
        conn.execute(
            "INSERT INTO blocked_channels (channel_id, status) VALUES (?1, ?2)
             ON CONFLICT(channel_id) DO UPDATE SET status = excluded.status",
            params![channel_id, status],
        )
        .map_err(|e| format!("Block channel: {e}"))?;
        conn.query_row(
            "SELECT id, channel_id, status FROM blocked_channels WHERE channel_id = ?1",
            params![channel_id],
            |row| {
                Ok(BlockedChannel {
                    id: row.get(0)?,
                    channel_id: row.get(1)?,
                    status: row.get(2)?,
                })
            },
        )
        .map_err(|e| format!("Read blocked channel: {e}"))
    }

    pub fn blocked_video_ids(&self) -> Result<HashSet<String>, String> {
        let conn = self.conn.lock().map_err(|e| e.to_string())?;
        let mut stmt = conn
            .prepare("SELECT video_id FROM blocked_videos")
            .map_err(|e| e.to_string())?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| e.to_string())?
            .collect::<rusqlite::Result<HashSet<_>>>()
            .map_err(|e| e.to_string())?;
        Ok(ids)
    }

    // --- Watchlist ---

    pub fn add_to_watchlist(&self, video_id: &str) -> Result<WatchlistItem, String> {
        let conn = self.conn.lock().map_err(|e| e.to_string())?;
        conn.execute(
            "INSERT OR IGNORE INTO watchlist (video_id, added_at) VALUES (?1, ?2)",
            params![video_id, fmt_ts(&Utc::now())],
        )
        .map_err(|e| format!("Add to watchlist: {e}"))?;
        conn.query_row(
            "SELECT id, video_id FROM watchlist WHERE video_id = ?1",
            params![video_id],
            |row| {
                Ok(WatchlistItem {
                    id: row.get(0)?,
                    video_id: row.get(1)?,
                })
            },
        )
        .map_err(|e| format!("Read watchlist: {e}"))
    }

    // --- Settings ---

    pub fn get_setting(&self, key: &str) -> Result<Option<String>, String> {
        let conn = self.conn.lock().map_err(|e| e.to_string())?;
        conn.query_row(
            "SELECT value FROM settings WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| format!("Get setting: {e}"))
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<(), String> {
        let conn = self.conn.lock().map_err(|e| e.to_string())?;
        conn.execute(
            "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, fmt_ts(&Utc::now())],
        )
        .map_err(|e| format!("Set setting: {e}"))?;
        Ok(())
    }

    pub fn delete_setting(&self, key: &str) -> Result<(), String> {
        let conn = self.conn.lock().map_err(|e| e.to_string())?;
        conn.execute("DELETE FROM settings WHERE key = ?1", params![key])
            .map_err(|e| format!("Delete setting: {e}"))?;
        Ok(())
    }
}

/// Regular-content read: never shorts, never blocked videos or channels,
/// never an id from `exclude`.
fn query_feed_videos(
    conn: &Connection,
    filter: &str,
    mut args: Vec<Value>,
    exclude: &HashSet<String>,
    limit: Option<usize>,
) -> Result<Vec<ChannelVideo>, String> {
    let mut sql = format!(
        "SELECT {VIDEO_COLUMNS}
         FROM videos v
            LEFT JOIN channels c ON c.id = v.channel_id
            LEFT JOIN ranking r ON r.channel_id = v.channel_id
         WHERE v.is_shorts = 0
           AND v.id NOT IN (SELECT video_id FROM blocked_videos)
           AND v.channel_id NOT IN (SELECT channel_id FROM blocked_channels)
           AND {filter}"
    );

    if !exclude.is_empty() {
        let placeholders = vec!["?"; exclude.len()].join(",");
        sql.push_str(&format!(" AND v.id NOT IN ({placeholders})"));
        args.extend(exclude.iter().cloned().map(Value::Text));
    }

    sql.push_str(" ORDER BY v.published_at DESC, v.id");
    if let Some(limit) = limit {
        sql.push_str(" LIMIT ?");
        args.push(Value::Integer(limit as i64));
    }

    let mut stmt = conn.prepare(&sql).map_err(|e| e.to_string())?;
    let rows = stmt
        .query_map(params_from_iter(args.iter()), row_to_channel_video)
        .map_err(|e| e.to_string())?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| e.to_string())?;
    Ok(rows)
}

fn row_to_channel(row: &rusqlite::Row) -> rusqlite::Result<Channel> {
    Ok(Channel {
        id: row.get(0)?,
        title: row.get(1)?,
        preview_url: row.get(2)?,
        is_subscribed: row.get(3)?,
    })
}

fn row_to_video(row: &rusqlite::Row) -> rusqlite::Result<Video> {
    let pub_str: String = row.get(5)?;
    let sync_str: String = row.get(7)?;
    Ok(Video {
        id: row.get(0)?,
        title: row.get(1)?,
        channel_id: row.get(2)?,
        thumbnail: row.get(3)?,
        url: row.get(4)?,
        published_at: parse_ts(5, &pub_str)?,
        is_shorts: row.get(6)?,
        sync_at: parse_ts(7, &sync_str)?,
    })
}

fn parse_ts(column: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(e)))
}

fn row_to_channel_video(row: &rusqlite::Row) -> rusqlite::Result<ChannelVideo> {
    Ok(ChannelVideo {
        video: row_to_video(row)?,
        channel_title: row.get(8)?,
        rank: row.get(9)?,
    })
}
