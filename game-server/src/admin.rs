//! HTTP routes through which the hosting authority drives the session lifecycle.

use crate::host::SessionHost;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use std::sync::Arc;
use tokio::net::TcpListener;

pub fn router(host: Arc<SessionHost>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/start", post(start_handler))
        .route("/update", post(update_handler))
        .route("/terminate", post(terminate_handler))
        .route("/status", get(status_handler))
        .with_state(host)
}

pub async fn serve(listener: TcpListener, host: Arc<SessionHost>) {
    if let Err(error) = axum::serve(listener, router(host)).await {
        tracing::error!(?error, "Admin server failed.");
    }
}

/// Healthy once the session was started.
async fn health_handler(State(host): State<Arc<SessionHost>>) -> (StatusCode, &'static str) {
    if host.on_health_check() {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    }
}

async fn start_handler(State(host): State<Arc<SessionHost>>) -> (StatusCode, &'static str) {
    if host.on_session_start().await {
        (StatusCode::OK, "started")
    } else {
        (StatusCode::CONFLICT, "already started")
    }
}

async fn update_handler(State(host): State<Arc<SessionHost>>) -> &'static str {
    host.on_session_update();
    "updated"
}

async fn terminate_handler(State(host): State<Arc<SessionHost>>) -> &'static str {
    host.on_terminate();
    "terminating"
}

async fn status_handler(State(host): State<Arc<SessionHost>>) -> String {
    host.game().summary().to_string()
}
