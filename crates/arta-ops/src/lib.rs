//! HTTP observability and admin surface.
//!
//! Health, readiness, metrics, redacted config, and two admin operations:
//! flushing cache tiers and resetting a user's rate-limit record. All
//! handlers work against the same injected service handles the dispatcher
//! uses; nothing here owns state of its own.

use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use arta_admission::AdmissionController;
use arta_cache::{CacheTier, ResponseCache};
use arta_core::current_unix_timestamp_ms;
use arta_instagram::LinkStatus;
use arta_store::InteractionStore;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::watch;

/// Shared handles behind the ops endpoints.
pub struct OpsState {
    pub admission: Arc<AdmissionController>,
    pub cache: Arc<ResponseCache>,
    pub store: Arc<InteractionStore>,
    pub link_status: watch::Receiver<LinkStatus>,
    pub safe_config: Value,
    pub started_unix_ms: u64,
}

/// Builds the ops router over the shared state.
pub fn build_ops_router(state: Arc<OpsState>) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/ready", get(handle_ready))
        .route("/metrics", get(handle_metrics))
        .route("/config", get(handle_config))
        .route("/admin/cache/flush", post(handle_cache_flush))
        .route("/admin/rate-limit/reset", post(handle_rate_limit_reset))
        .with_state(state)
}

/// Serves the ops surface until the shutdown signal fires.
pub async fn serve_ops(
    addr: SocketAddr,
    state: Arc<OpsState>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind ops listener on {addr}"))?;
    let local_addr = listener.local_addr().context("failed to read ops address")?;
    tracing::info!(%local_addr, "ops surface listening");

    let app = build_ops_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.wait_for(|requested| *requested).await;
        })
        .await
        .context("ops server exited unexpectedly")?;
    Ok(())
}

fn cache_stats_json(state: &OpsState) -> Value {
    let mut tiers = serde_json::Map::new();
    for tier in CacheTier::ALL {
        let stats = match state.cache.stats(tier) {
            Ok(stats) => json!({
                "key_count": stats.key_count,
                "hits": stats.hits,
                "misses": stats.misses,
                "hit_rate": stats.hit_rate,
            }),
            Err(error) => json!({ "error": error.to_string() }),
        };
        let _ = tiers.insert(tier.as_str().to_string(), stats);
    }
    Value::Object(tiers)
}

async fn handle_health(State(state): State<Arc<OpsState>>) -> impl IntoResponse {
    let link_status = *state.link_status.borrow();
    let (overall, http_status) = match link_status {
        LinkStatus::Connected => ("healthy", StatusCode::OK),
        LinkStatus::Failed => ("unhealthy", StatusCode::SERVICE_UNAVAILABLE),
        _ => ("degraded", StatusCode::OK),
    };

    let rate_limiter = state
        .admission
        .global_stats()
        .map(|stats| serde_json::to_value(stats).unwrap_or(Value::Null))
        .unwrap_or(Value::Null);
    let store_stats = state
        .store
        .stats()
        .map(|stats| serde_json::to_value(stats).unwrap_or(Value::Null))
        .unwrap_or(Value::Null);

    let body = json!({
        "status": overall,
        "connection": link_status.as_str(),
        "uptime_seconds": current_unix_timestamp_ms()
            .saturating_sub(state.started_unix_ms) / 1_000,
        "cache": cache_stats_json(&state),
        "rate_limiter": rate_limiter,
        "database": store_stats,
    });
    (http_status, Json(body))
}

async fn handle_ready(State(state): State<Arc<OpsState>>) -> impl IntoResponse {
    let link_status = *state.link_status.borrow();
    let ready = link_status == LinkStatus::Connected;
    let body = json!({
        "status": if ready { "ready" } else { "not ready" },
        "checks": {
            "connection": ready,
            "cache": true,
            "rate_limiter": true,
        },
    });
    if ready {
        (StatusCode::OK, Json(body))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(body))
    }
}

async fn handle_metrics(State(state): State<Arc<OpsState>>) -> impl IntoResponse {
    let rate_limiter = state
        .admission
        .global_stats()
        .map(|stats| serde_json::to_value(stats).unwrap_or(Value::Null))
        .unwrap_or(Value::Null);
    let store_stats = state
        .store
        .stats()
        .map(|stats| serde_json::to_value(stats).unwrap_or(Value::Null))
        .unwrap_or(Value::Null);

    Json(json!({
        "uptime_seconds": current_unix_timestamp_ms()
            .saturating_sub(state.started_unix_ms) / 1_000,
        "connection": state.link_status.borrow().as_str(),
        "cache": cache_stats_json(&state),
        "rate_limiter": rate_limiter,
        "database": store_stats,
    }))
}

async fn handle_config(State(state): State<Arc<OpsState>>) -> impl IntoResponse {
    Json(state.safe_config.clone())
}

#[derive(Debug, Deserialize)]
struct CacheFlushRequest {
    #[serde(default)]
    tier: Option<String>,
}

async fn handle_cache_flush(
    State(state): State<Arc<OpsState>>,
    Json(request): Json<CacheFlushRequest>,
) -> impl IntoResponse {
    let tier = request.tier.as_deref().unwrap_or("all");
    let result = match tier {
        "all" => state.cache.clear_all(),
        "response" => state.cache.clear(CacheTier::Response),
        "user_profile" => state.cache.clear(CacheTier::UserProfile),
        "tax_result" => state.cache.clear(CacheTier::TaxResult),
        other => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": format!("unknown cache tier '{other}'"),
                })),
            );
        }
    };
    match result {
        Ok(()) => {
            tracing::info!(tier, "cache flushed via admin endpoint");
            (StatusCode::OK, Json(json!({ "flushed": tier })))
        }
        Err(error) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": error.to_string() })),
        ),
    }
}

#[derive(Debug, Deserialize)]
struct RateLimitResetRequest {
    user_id: String,
}

async fn handle_rate_limit_reset(
    State(state): State<Arc<OpsState>>,
    Json(request): Json<RateLimitResetRequest>,
) -> impl IntoResponse {
    if request.user_id.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "user_id must be non-empty" })),
        );
    }
    match state.admission.reset_user_limit(request.user_id.trim()) {
        Ok(existed) => {
            tracing::info!(user_id = %request.user_id, existed, "rate limit reset via admin endpoint");
            (
                StatusCode::OK,
                Json(json!({ "reset": request.user_id.trim(), "existed": existed })),
            )
        }
        Err(error) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": error.to_string() })),
        ),
    }
}

#[cfg(test)]
mod tests {
    use std::{net::SocketAddr, sync::Arc};

    use arta_admission::{AdmissionConfig, AdmissionController};
    use arta_cache::{CacheConfig, CacheTier, ResponseCache};
    use arta_instagram::LinkStatus;
    use arta_store::InteractionStore;
    use serde_json::{json, Value};
    use tokio::sync::watch;

    use super::OpsState;

    async fn spawn_surface(
        link_status: LinkStatus,
    ) -> (String, Arc<OpsState>, watch::Sender<bool>) {
        let (_status_tx, status_rx) = watch::channel(link_status);
        let state = Arc::new(OpsState {
            admission: Arc::new(AdmissionController::new(AdmissionConfig::default())),
            cache: Arc::new(ResponseCache::new(CacheConfig::default())),
            store: Arc::new(InteractionStore::open_in_memory().expect("store")),
            link_status: status_rx,
            safe_config: json!({"environment": "test", "username": "tax_bot"}),
            started_unix_ms: 0,
        });
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let addr: SocketAddr = "127.0.0.1:0".parse().expect("addr");
        let listener = tokio::net::TcpListener::bind(addr).await.expect("bind");
        let local = listener.local_addr().expect("local");
        let app = super::build_ops_router(state.clone());
        let mut server_shutdown = shutdown_rx.clone();
        let _ = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = server_shutdown.wait_for(|requested| *requested).await;
                })
                .await
        });
        (format!("http://{local}"), state, shutdown_tx)
    }

    #[tokio::test]
    async fn functional_health_reports_connection_and_tier_stats() {
        let (base, _state, shutdown) = spawn_surface(LinkStatus::Connected).await;
        let body: Value = reqwest::get(format!("{base}/health"))
            .await
            .expect("request")
            .json()
            .await
            .expect("json");
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["connection"], "connected");
        assert!(body["cache"]["response"].is_object());
        assert!(body["cache"]["tax_result"].is_object());
        shutdown.send(true).expect("shutdown");
    }

    #[tokio::test]
    async fn unit_ready_is_service_unavailable_while_reconnecting() {
        let (base, _state, shutdown) = spawn_surface(LinkStatus::Reconnecting).await;
        let response = reqwest::get(format!("{base}/ready")).await.expect("request");
        assert_eq!(response.status().as_u16(), 503);
        shutdown.send(true).expect("shutdown");
    }

    #[tokio::test]
    async fn functional_admin_cache_flush_clears_the_named_tier() {
        let (base, state, shutdown) = spawn_surface(LinkStatus::Connected).await;
        state
            .cache
            .set(CacheTier::Response, "k", json!("v"), None)
            .expect("set");

        let client = reqwest::Client::new();
        let response = client
            .post(format!("{base}/admin/cache/flush"))
            .json(&json!({"tier": "response"}))
            .send()
            .await
            .expect("request");
        assert_eq!(response.status().as_u16(), 200);
        assert_eq!(
            state
                .cache
                .stats(CacheTier::Response)
                .expect("stats")
                .key_count,
            0
        );
        shutdown.send(true).expect("shutdown");
    }

    #[tokio::test]
    async fn functional_admin_rate_limit_reset_reports_existence() {
        let (base, state, shutdown) = spawn_surface(LinkStatus::Connected).await;
        let _ = state.admission.check_admission("u1").expect("check");

        let client = reqwest::Client::new();
        let body: Value = client
            .post(format!("{base}/admin/rate-limit/reset"))
            .json(&json!({"user_id": "u1"}))
            .send()
            .await
            .expect("request")
            .json()
            .await
            .expect("json");
        assert_eq!(body["existed"], true);

        let body: Value = client
            .post(format!("{base}/admin/rate-limit/reset"))
            .json(&json!({"user_id": "u1"}))
            .send()
            .await
            .expect("request")
            .json()
            .await
            .expect("json");
        assert_eq!(body["existed"], false);
        shutdown.send(true).expect("shutdown");
    }

    #[tokio::test]
    async fn regression_unknown_cache_tier_is_a_client_error() {
        let (base, _state, shutdown) = spawn_surface(LinkStatus::Connected).await;
        let client = reqwest::Client::new();
        let response = client
            .post(format!("{base}/admin/cache/flush"))
            .json(&json!({"tier": "mystery"}))
            .send()
            .await
            .expect("request");
        assert_eq!(response.status().as_u16(), 400);
        shutdown.send(true).expect("shutdown");
    }

    #[tokio::test]
    async fn unit_config_endpoint_returns_safe_snapshot() {
        let (base, _state, shutdown) = spawn_surface(LinkStatus::Connected).await;
        let body: Value = reqwest::get(format!("{base}/config"))
            .await
            .expect("request")
            .json()
            .await
            .expect("json");
        assert_eq!(body["environment"], "test");
        assert!(body.get("password").is_none());
        shutdown.send(true).expect("shutdown");
    }
}
