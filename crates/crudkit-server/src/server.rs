use std::any::Any;
use std::time::Duration;

use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use crudkit_core::errors::INTERNAL_ERROR;
use crudkit_telemetry::{report, LogSeverity};
use secrecy::SecretString;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::auth::{require_token, TokenAuth};

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout_secs: u64,
    /// When set, every resource route requires this token.
    pub auth_token: Option<SecretString>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            request_timeout_secs: 30,
            auth_token: None,
        }
    }
}

/// Wrap resource routes with auth and the shared HTTP layers. `/health` stays
/// open.
pub fn build_router(config: &ServerConfig, resources: Router) -> Router {
    let resources = match &config.auth_token {
        Some(token) => resources.layer(middleware::from_fn_with_state(
            TokenAuth::new(token.clone()),
            require_token,
        )),
        None => resources,
    };

    Router::new()
        .route("/health", get(health_handler))
        .merge(resources)
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind and serve in the background.
pub async fn start(config: ServerConfig, resources: Router) -> Result<ServerHandle, std::io::Error> {
    let router = build_router(&config, resources);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(host = %config.host, port = local_addr.port(), "crudkit server started");

    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!(error = %e, "server stopped");
        }
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        server,
    })
}

/// Handle returned by `start()`. Dropping it leaves the server running.
pub struct ServerHandle {
    pub port: u16,
    server: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    pub fn shutdown(self) {
        self.server.abort();
    }
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "healthy" }))
}

fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "unknown panic payload".to_string()
    };
    report(LogSeverity::Fatal, "Unhandled exception encountered", Some(&detail));
    (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR).into_response()
}
