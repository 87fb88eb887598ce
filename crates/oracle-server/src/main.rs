mod aggregator;
mod clients;
mod db;
mod library;
mod providers;
mod routes;
mod sync;

use aggregator::{EsportAggregator, ProviderAggregator};
use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use clients::esport::EsportClient;
use clients::twitch::TwitchClient;
use clients::youtube::YouTubeClient;
use clients::zima::ZimaClient;
use clients::MatchSource;
use db::Db;
use library::Library;
use oracle_core::clock::{Clock, SystemClock};
use oracle_core::config::AppConfig;
use providers::history::HistoryProvider;
use providers::live_streams::LiveStreamsProvider;
use providers::suggestions::SuggestionsProvider;
use providers::unsubscribed::UnsubscribedChannelsProvider;
use providers::watchlist::WatchlistProvider;
use providers::Provider;
use routes::AppState;
use std::sync::Arc;
use sync::IncrementalYouTubeSync;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;
use tracing::info;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env().expect("Invalid configuration");
    let db = Arc::new(Db::open(&config.database_path).expect("Failed to open SQLite database"));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let http_client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .user_agent("ContentOracle/1.0")
        .build()
        .expect("Failed to build HTTP client");

    let youtube = Arc::new(YouTubeClient::new(
        http_client.clone(),
        config.youtube.clone(),
        Arc::clone(&db),
        Arc::clone(&clock),
    ));
    let twitch = Arc::new(TwitchClient::new(
        http_client.clone(),
        config.twitch.clone(),
        Arc::clone(&db),
    ));
    let zima = Arc::new(ZimaClient::new(http_client.clone(), &config.zima_url));

    let history = Arc::new(HistoryProvider::new(
        zima.clone(),
        Arc::clone(&db),
        Arc::clone(&clock),
    ));
    let providers: Vec<Arc<dyn Provider>> = vec![
        Arc::new(LiveStreamsProvider::new(twitch.clone())),
        Arc::new(SuggestionsProvider::new(Arc::clone(&db), Arc::clone(&clock))),
        Arc::new(UnsubscribedChannelsProvider::new(Arc::clone(&db), Arc::clone(&clock))),
        Arc::new(WatchlistProvider::new(Arc::clone(&db))),
    ];
    let aggregator = ProviderAggregator::new(history, providers);

    let mut match_sources: Vec<Arc<dyn MatchSource>> = Vec::new();
    if !config.esport.base_url.is_empty() {
        match_sources.push(Arc::new(EsportClient::new(
            http_client.clone(),
            config.esport.clone(),
        )));
    }
    let esports = EsportAggregator::new(match_sources, Arc::clone(&clock));

    let sync = Arc::new(IncrementalYouTubeSync::new(
        Arc::clone(&db),
        youtube.clone(),
        zima.clone(),
        Arc::clone(&clock),
    ));
    tokio::spawn(sync::run_periodic(Arc::clone(&sync), config.sync_interval_secs));

    let state = Arc::new(AppState {
        library: Library::new(Arc::clone(&db), youtube.clone()),
        db,
        aggregator,
        esports,
        sync,
        youtube,
        twitch,
        zima,
    });

    let api_routes = Router::new()
        .route("/api/health", get(routes::health))
        .route("/api/content", get(routes::get_content))
        .route("/api/content/open", post(routes::open_content))
        .route("/api/activity", post(routes::create_activity))
        .route(
            "/api/settings",
            get(routes::get_settings)
                .post(routes::save_settings)
                .delete(routes::clean_settings),
        )
        .route("/api/settings/subscriptions", post(routes::init_channels))
        .route("/api/channels/:id/videos", get(routes::channel_videos))
        .route("/api/settings/auth/youtube", get(routes::auth_youtube))
        .route("/api/watchlist/youtube", post(routes::add_watchlist_item))
        .route("/api/sync", post(routes::trigger_sync))
        .route("/auth/youtube/callback", get(routes::youtube_callback))
        .route("/auth/twitch/callback", get(routes::twitch_callback))
        .with_state(state);

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list([HeaderValue::from_str(&config.base_url)
            .unwrap_or_else(|_| HeaderValue::from_static("http://localhost:8080"))]))
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::DELETE,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    let app = api_routes
        .fallback_service(ServeDir::new(&config.static_dir).append_index_html_on_directories(true))
        .layer(ConcurrencyLimitLayer::new(64))
        .layer(CompressionLayer::new())
        .layer(cors);

    let port = config.port;
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("Failed to bind");

    info!(port, "Server starting");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C handler");
    info!("Shutdown signal received");
}
