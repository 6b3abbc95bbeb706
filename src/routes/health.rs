/**
 * Health Routes
 * Liveness, readiness and per-dependency checks
 */
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::time::{Duration, Instant};

use crate::state::AppState;

lazy_static::lazy_static! {
    static ref SERVER_START: Instant = Instant::now();
}

/// Pin the uptime origin to server start rather than the first health check.
pub fn init_start_time() {
    lazy_static::initialize(&SERVER_START);
}

/// Single service check result
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceCheck {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServiceCheck {
    fn from_ping<E: Display>(result: Result<Duration, E>) -> Self {
        match result {
            Ok(elapsed) => ServiceCheck {
                status: "healthy".to_string(),
                response_time: Some(elapsed.as_millis() as u64),
                error: None,
            },
            Err(e) => ServiceCheck {
                status: "unhealthy".to_string(),
                response_time: None,
                error: Some(e.to_string()),
            },
        }
    }

    fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthChecks {
    pub database: ServiceCheck,
    pub redis: ServiceCheck,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedHealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub uptime: u64,
    pub checks: HealthChecks,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub uptime: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SimpleHealthResponse {
    pub status: String,
}

async fn checks(state: &AppState) -> HealthChecks {
    let (database, redis) = tokio::join!(state.store.ping(), state.cache.ping());
    HealthChecks {
        database: ServiceCheck::from_ping(database),
        redis: ServiceCheck::from_ping(redis),
    }
}

/// GET /health - Simple liveness ping
pub async fn health_ping() -> impl IntoResponse {
    Json(SimpleHealthResponse {
        status: "ok".to_string(),
    })
}

/// GET /health/detailed - Every dependency check
/// "degraded" when the cache is down: it only ever costs extra storage reads.
pub async fn health_detailed(State(state): State<AppState>) -> impl IntoResponse {
    let checks = checks(&state).await;
    let status = match (checks.database.is_healthy(), checks.redis.is_healthy()) {
        (true, true) => "ok",
        (true, false) => "degraded",
        _ => "unhealthy",
    };

    Json(DetailedHealthResponse {
        status: status.to_string(),
        timestamp: Utc::now(),
        uptime: SERVER_START.elapsed().as_secs(),
        checks,
    })
}

/// GET /health/database - Storage round trip
pub async fn health_database(State(state): State<AppState>) -> impl IntoResponse {
    Json(ServiceCheck::from_ping(state.store.ping().await))
}

/// GET /health/redis - Cache round trip
pub async fn health_redis(State(state): State<AppState>) -> impl IntoResponse {
    Json(ServiceCheck::from_ping(state.cache.ping().await))
}

/// GET /health/ready - Readiness: storage must answer
pub async fn health_ready(State(state): State<AppState>) -> impl IntoResponse {
    let database = ServiceCheck::from_ping(state.store.ping().await);
    let ready = database.is_healthy();
    let response = ReadyResponse {
        status: if ready { "ready" } else { "not ready" }.to_string(),
        timestamp: Utc::now(),
        uptime: SERVER_START.elapsed().as_secs(),
        reason: database.error,
    };
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestContext;
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    fn test_router() -> Router {
        Router::new()
            .route("/health", get(health_ping))
            .route("/health/detailed", get(health_detailed))
            .route("/health/database", get(health_database))
            .route("/health/redis", get(health_redis))
            .route("/health/ready", get(health_ready))
            .with_state(TestContext::new().state)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(app: Router, uri: &str) -> (StatusCode, T) {
        let req = Request::get(uri).body(Body::empty()).unwrap();
        let res = app.oneshot(req).await.unwrap();
        let status = res.status();
        let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let value: T = serde_json::from_slice(&body).unwrap();
        (status, value)
    }

    #[test]
    fn test_failed_ping_is_unhealthy() {
        let check = ServiceCheck::from_ping::<String>(Err("refused".into()));
        assert!(!check.is_healthy());
        assert_eq!(check.error.as_deref(), Some("refused"));
    }

    #[tokio::test]
    async fn test_health_ping_returns_ok() {
        init_start_time();
        let (status, body) = get_json::<SimpleHealthResponse>(test_router(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.status, "ok");
    }

    #[tokio::test]
    async fn test_in_process_backends_report_healthy() {
        let (_, db) = get_json::<ServiceCheck>(test_router(), "/health/database").await;
        assert_eq!(db.status, "healthy");
        let (_, cache) = get_json::<ServiceCheck>(test_router(), "/health/redis").await;
        assert_eq!(cache.status, "healthy");
    }

    #[tokio::test]
    async fn test_health_detailed_returns_ok() {
        let (status, body) =
            get_json::<DetailedHealthResponse>(test_router(), "/health/detailed").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.status, "ok");
    }

    #[tokio::test]
    async fn test_health_ready_returns_ready() {
        let (status, body) = get_json::<ReadyResponse>(test_router(), "/health/ready").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.status, "ready");
    }
}
