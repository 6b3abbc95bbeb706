//! ArtisansHub Backend - library for app logic and testing

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod integrations;
pub mod logging;
pub mod routes;
pub mod services;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    middleware,
    routing::{delete, get, post},
    Router,
};
use std::net::SocketAddr;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, limit::RequestBodyLimitLayer,
    services::ServeDir, trace::TraceLayer,
};

use crate::config::AppConfig;
use crate::services::portfolio::PUBLIC_PREFIX;
use crate::state::AppState;

/// Global request body cap for JSON endpoints.
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Configure CORS from environment variables.
/// Uses ALLOWED_ORIGINS (comma-separated) or FRONTEND_ORIGIN.
/// Falls back to the local frontend in development.
pub fn configure_cors() -> CorsLayer {
    let allowed_origins = std::env::var("ALLOWED_ORIGINS")
        .ok()
        .and_then(|s| {
            let origins: Vec<HeaderValue> = s
                .split(',')
                .filter_map(|origin| origin.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                None
            } else {
                Some(origins)
            }
        })
        .or_else(|| {
            std::env::var("FRONTEND_ORIGIN")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(|origin| vec![origin])
        })
        .unwrap_or_else(|| {
            vec![
                HeaderValue::from_static("http://localhost:3000"),
                HeaderValue::from_static("http://127.0.0.1:3000"),
            ]
        });

    CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
        ])
        .allow_credentials(true)
}

/// Create and configure the application router.
pub fn create_app(state: AppState) -> Router {
    let cors = configure_cors();
    let upload_dir = state.config.upload_dir.clone();

    let api = Router::new()
        .route("/api/auth/signup/explorer", post(routes::auth::signup_explorer))
        .route("/api/auth/signup/artist", post(routes::auth::signup_artist))
        .route("/api/auth/otp/request", post(routes::auth::request_otp))
        .route("/api/auth/otp/verify", post(routes::auth::verify_otp))
        .route("/api/auth/login", post(routes::auth::login))
        .route(
            "/api/subscriptions/success",
            get(routes::subscriptions::checkout_success),
        )
        .route(
            "/api/subscriptions/checkout",
            post(routes::subscriptions::change_plan),
        )
        .route(
            "/api/subscriptions/portal",
            get(routes::subscriptions::billing_portal),
        )
        .route("/api/artists", get(routes::artists::list_artists))
        .route("/api/artists/featured", get(routes::artists::list_featured))
        .route(
            "/api/artists/me",
            get(routes::artists::get_dashboard).patch(routes::artists::update_dashboard),
        )
        .route("/api/artists/{slug}", get(routes::artists::get_artist))
        .route(
            "/api/artists/{slug}/rating",
            get(routes::ratings::get_rating)
                .post(routes::ratings::submit_rating)
                .delete(routes::ratings::delete_rating),
        )
        .route("/api/portfolio/{id}", delete(routes::portfolio::delete_image))
        .route("/api/bookmarks", get(routes::bookmarks::list_bookmarks))
        .route(
            "/api/bookmarks/{slug}",
            get(routes::bookmarks::check_bookmark).post(routes::bookmarks::toggle_bookmark),
        )
        .route(
            "/api/explorers/me",
            get(routes::explorers::get_profile).patch(routes::explorers::update_profile),
        )
        .route("/health", get(routes::health::health_ping))
        .route("/health/detailed", get(routes::health::health_detailed))
        .route("/health/database", get(routes::health::health_database))
        .route("/health/redis", get(routes::health::health_redis))
        .route("/health/ready", get(routes::health::health_ready))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES));

    // Image batches get their own, larger cap.
    let uploads = Router::new().route(
        "/api/portfolio",
        get(routes::portfolio::list_images)
            .post(routes::portfolio::upload_images)
            .layer(DefaultBodyLimit::max(routes::portfolio::MAX_BATCH_BYTES)),
    );

    api.merge(uploads)
        .nest_service(PUBLIC_PREFIX, ServeDir::new(upload_dir))
        .with_state(state)
        .layer(logging::middleware::propagate_request_id_layer())
        .layer(middleware::from_fn(logging::middleware::log_request))
        .layer(logging::middleware::request_id_layer())
        .layer(TraceLayer::new_for_http())
        // Compress responses with gzip/br automatically
        .layer(CompressionLayer::new())
        .layer(cors)
}

/// Run the server (used by main).
pub async fn run() {
    dotenvy::dotenv().ok();

    let config = AppConfig::default();

    // Guards must live as long as the process or buffered log lines are lost.
    let _log_guards = logging::init(&config.environment);

    routes::health::init_start_time();

    if let Err(e) = config.validate() {
        tracing::error!("Invalid configuration: {}", e);
        return;
    }

    let state = match AppState::from_config(config).await {
        Ok(state) => state,
        Err(e) => {
            tracing::error!("Failed to initialize application state: {}", e);
            return;
        }
    };

    let app = create_app(state);

    // Bind address is configurable via HOST / PORT env vars.
    let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(3001);
    let addr: SocketAddr = match format!("{}:{}", host, port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!("Invalid HOST/PORT configuration: {}", e);
            return;
        }
    };
    tracing::info!("Starting server on {}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind to {}: {}", addr, e);
            return;
        }
    };

    if let Err(e) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    {
        tracing::error!("Server error: {}", e);
    }
}
