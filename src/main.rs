mod config;
mod db;
mod dtos;
mod error;
mod handler;
mod middleware;
mod models;
mod realtime;
mod routes;
mod service;
mod utils;

use std::{str::FromStr, sync::Arc, time::Duration};

use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    HeaderValue, Method,
};
use config::Config;
use db::{biddb::BidExt, chatdb::ChatExt, db::DBClient};
use dotenv::dotenv;
use realtime::hub::{EventBroadcaster, RealtimeHub};
use routes::create_router;
use service::{bid_service::BidService, chat_service::ChatService};
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::filter::LevelFilter;

#[derive(Clone)]
pub struct AppState {
    pub env: Config,
    pub db_client: Arc<DBClient>,
    pub hub: Arc<RealtimeHub>,
    pub bid_service: Arc<BidService>,
    pub chat_service: Arc<ChatService>,
}

impl AppState {
    pub fn new(db_client: DBClient, config: Config) -> Self {
        let db_client = Arc::new(db_client);
        let hub = Arc::new(RealtimeHub::new());

        let events: Arc<dyn EventBroadcaster> = hub.clone();
        let bid_store: Arc<dyn BidExt> = db_client.clone();
        let chat_store: Arc<dyn ChatExt> = db_client.clone();

        Self {
            env: config,
            db_client,
            hub,
            bid_service: Arc::new(BidService::new(bid_store, events.clone())),
            chat_service: Arc::new(ChatService::new(chat_store, events)),
        }
    }
}

fn spawn_pool_monitor(db_client: Arc<DBClient>, max_connections: u32) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(30));
        loop {
            interval.tick().await;
            let size = db_client.pool.size();
            let idle = db_client.pool.num_idle();
            tracing::debug!(
                "Pool status - active: {}, idle: {}, total: {}",
                db_client.active_connections(),
                idle,
                size
            );

            if size >= max_connections * 8 / 10 {
                tracing::warn!("Connection pool at 80% capacity, consider raising DB_MAX_CONNECTIONS");
            }
        }
    });
}

#[tokio::main]
async fn main() {
    dotenv().ok();

    let config = Config::init();

    tracing_subscriber::fmt()
        .with_max_level(LevelFilter::from_str(&config.log_level).unwrap_or(LevelFilter::INFO))
        .init();

    let pool = match PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .min_connections(config.db_min_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&config.database_url)
        .await
    {
        Ok(pool) => {
            tracing::info!(
                "Connected to the database (max {} / min {} connections)",
                config.db_max_connections,
                config.db_min_connections
            );
            pool
        }
        Err(err) => {
            tracing::error!("Failed to connect to the database: {:?}", err);
            std::process::exit(1);
        }
    };

    let allowed_origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin {}", origin);
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins))
        .allow_headers([AUTHORIZATION, ACCEPT, CONTENT_TYPE])
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE]);

    let app_state = Arc::new(AppState::new(DBClient::new(pool), config.clone()));
    spawn_pool_monitor(app_state.db_client.clone(), config.db_max_connections);

    let app = create_router(app_state).layer(cors);

    let listener = match tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!("Failed to bind port {}: {}", config.port, err);
            std::process::exit(1);
        }
    };

    tracing::info!("Server is running on http://localhost:{}", config.port);

    if let Err(err) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", err);
    }
}
