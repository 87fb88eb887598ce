use crate::aggregator::{EsportAggregator, ProviderAggregator};
use crate::clients::twitch::TwitchClient;
use crate::clients::youtube::YouTubeClient;
use crate::clients::zima::ZimaClient;
use crate::db::Db;
use crate::library::{Library, SettingsView};
use crate::sync::IncrementalYouTubeSync;
use crate::providers::RECENCY_WINDOW_DAYS;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use chrono::{Duration, Utc};
use oracle_core::esport::Match;
use oracle_core::selector::PER_CHANNEL_CAP;
use oracle_core::{AppError, Content, Video};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, warn};

pub struct AppState {
    pub db: Arc<Db>,
    pub aggregator: ProviderAggregator,
    pub esports: EsportAggregator,
    pub sync: Arc<IncrementalYouTubeSync>,
    pub library: Library,
    pub youtube: Arc<YouTubeClient>,
    pub twitch: Arc<TwitchClient>,
    pub zima: Arc<ZimaClient>,
}

fn status_for(e: &AppError) -> StatusCode {
    match e {
        AppError::Auth(_) => StatusCode::UNAUTHORIZED,
        AppError::SyncInProgress => StatusCode::CONFLICT,
        AppError::ParseError(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(e: AppError) -> Response {
    let status = status_for(&e);
    if status.is_server_error() {
        error!(error = %e, "Request failed");
    }
    (status, Json(serde_json::json!({"error": e.to_string()}))).into_response()
}

fn ok_status() -> Response {
    (StatusCode::OK, Json(serde_json::json!({"status": "ok"}))).into_response()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentResponse {
    pub content_list: Vec<Content>,
    pub esports_matches: Vec<Match>,
}

pub async fn get_content(State(state): State<Arc<AppState>>) -> Response {
    let (content, matches) = tokio::join!(state.aggregator.get_all(), state.esports.get_all());

    let esports_matches = matches.unwrap_or_else(|e| {
        warn!(error = %e, "Failed to get esports matches");
        Vec::new()
    });

    match content {
        Ok(content_list) => (
            StatusCode::OK,
            Json(ContentResponse {
                content_list,
                esports_matches,
            }),
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to aggregate content");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ContentResponse {
                    content_list: Vec::new(),
                    esports_matches,
                }),
            )
                .into_response()
        }
    }
}

#[derive(Deserialize)]
pub struct OpenContentRequest {
    pub url: String,
}

pub async fn open_content(
    State(state): State<Arc<AppState>>,
    Json(req): Json<OpenContentRequest>,
) -> Response {
    match state.zima.open_url(&req.url).await {
        Ok(()) => ok_status(),
        Err(e) => error_response(e),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRequest {
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub video_id: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityResponse {
    pub id: i64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub channel_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub video_id: String,
    pub status: String,
}

/// Blocks exactly one of a video or a channel.
pub async fn create_activity(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ActivityRequest>,
) -> Response {
    let result = match (req.channel_id.is_empty(), req.video_id.is_empty()) {
        (true, false) => state
            .library
            .block_video(&req.video_id, &req.status)
            .map(|b| ActivityResponse {
                id: b.id,
                channel_id: String::new(),
                video_id: b.video_id,
                status: b.status,
            }),
        (false, true) => state
            .library
            .block_channel(&req.channel_id, &req.status)
            .map(|b| ActivityResponse {
                id: b.id,
                channel_id: b.channel_id,
                video_id: String::new(),
                status: b.status,
            }),
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": "set exactly one of channelId or videoId"})),
            )
                .into_response()
        }
    };
    match result {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn get_settings(State(state): State<Arc<AppState>>) -> Response {
    match state.library.settings() {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn save_settings(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SettingsView>,
) -> Response {
    match state.library.save_ranking(&req.ranking) {
        Ok(saved) => {
            info!(saved, "Ranking saved");
            ok_status()
        }
        Err(e) => error_response(e),
    }
}

/// Drops stored YouTube credentials.
pub async fn clean_settings(State(state): State<Arc<AppState>>) -> Response {
    match state.youtube.clear_tokens() {
        Ok(()) => ok_status(),
        Err(e) => error_response(e),
    }
}

pub async fn init_channels(State(state): State<Arc<AppState>>) -> Response {
    match state.library.init_channels().await {
        Ok(created) => (StatusCode::OK, Json(serde_json::json!({"created": created}))).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn auth_youtube(State(state): State<Arc<AppState>>) -> Response {
    match state.youtube.auth_url() {
        Ok(url) => Redirect::temporary(&url).into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Deserialize)]
pub struct AuthCallback {
    #[serde(default)]
    pub code: String,
}

fn missing_code() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({"error": "code not found"})),
    )
        .into_response()
}

pub async fn youtube_callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AuthCallback>,
) -> Response {
    if params.code.is_empty() {
        return missing_code();
    }
    match state.youtube.exchange_code(&params.code).await {
        Ok(()) => ok_status(),
        Err(e) => error_response(e),
    }
}

pub async fn twitch_callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AuthCallback>,
) -> Response {
    if params.code.is_empty() {
        return missing_code();
    }
    match state.twitch.exchange_code(&params.code).await {
        Ok(()) => ok_status(),
        Err(e) => error_response(e),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchlistRequest {
    pub youtube_url: String,
}

pub async fn add_watchlist_item(
    State(state): State<Arc<AppState>>,
    Json(req): Json<WatchlistRequest>,
) -> Response {
    match state.library.add_to_watchlist(&req.youtube_url).await {
        Ok(item) => (StatusCode::OK, Json(item)).into_response(),
        Err(e) => error_response(e),
    }
}

/// Latest regular uploads of one channel, for the settings preview.
pub async fn channel_videos(
    State(state): State<Arc<AppState>>,
    Path(channel_id): Path<String>,
) -> Response {
    let since = Utc::now() - Duration::days(RECENCY_WINDOW_DAYS);
    match state
        .db
        .get_videos_for_channel_since(&channel_id, &since, &HashSet::new(), PER_CHANNEL_CAP)
    {
        Ok(videos) => {
            let videos: Vec<Video> = videos.into_iter().map(|cv| cv.video).collect();
            (StatusCode::OK, Json(videos)).into_response()
        }
        Err(e) => error_response(AppError::DbError(e)),
    }
}

/// Runs a sync pass now and returns its report.
pub async fn trigger_sync(State(state): State<Arc<AppState>>) -> Response {
    match state.sync.run().await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn health(State(state): State<Arc<AppState>>) -> Response {
    match state.db.video_count() {
        Ok(count) => (
            StatusCode::OK,
            Json(serde_json::json!({"status": "ok", "videos": count})),
        )
            .into_response(),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({"status": "degraded", "error": "database unavailable"})),
        )
            .into_response(),
    }
}
