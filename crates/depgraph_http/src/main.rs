//! Thin `axum` front-end exposing `depgraph_core::analyze` as `POST /analyze`
//! (spec §6's "HTTP surface" collaborator). No analysis logic lives here.

mod tracing_logger;

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Json, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use depgraph_core::config::{Config, ConfigJson};
use depgraph_core::output::{self, WireOutput};
use depgraph_core::AnalyzerError;

use tracing_logger::TracingLogger;

struct AppContext {
    config: Config,
    start_time: Instant,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeRequest {
    repo_path: String,
}

async fn api_health(State(ctx): State<Arc<AppContext>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptimeSeconds": ctx.start_time.elapsed().as_secs(),
    }))
}

async fn api_analyze(
    State(ctx): State<Arc<AppContext>>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<Json<WireOutput>, (StatusCode, Json<serde_json::Value>)> {
    let config = ctx.config.clone();
    let repo_path = req.repo_path;

    let analyzed = tokio::task::spawn_blocking(move || {
        depgraph_core::analyze(&repo_path, &config, &TracingLogger)
    })
    .await
    .map_err(|e| {
        error!(error = %e, "analysis task panicked");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": "analysis task panicked" })),
        )
    })?;

    let outcome = analyzed.map_err(|e| {
        let status = match &e {
            AnalyzerError::Fatal(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({ "error": e.to_string() })))
    })?;

    let wire = output::to_wire(&outcome.graph, &outcome.metadata, &ctx.config);
    Ok(Json(wire))
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("received SIGINT, shutting down"),
            _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.expect("failed to listen for Ctrl+C");
        info!("received Ctrl+C, shutting down");
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("depgraph_http=info".parse().unwrap()),
        )
        .with_target(false)
        .init();

    let config = match Config::try_from(ConfigJson::from_env(std::env::vars())) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            std::process::exit(1);
        }
    };

    let ctx = Arc::new(AppContext {
        config,
        start_time: Instant::now(),
    });

    let app = Router::new()
        .route("/health", get(api_health))
        .route("/analyze", post(api_analyze))
        .layer(TraceLayer::new_for_http())
        .with_state(ctx);

    let port: u16 = std::env::var("PORT").ok().and_then(|p| p.parse().ok()).unwrap_or(4242);
    let listener = match tokio::net::TcpListener::bind(format!("127.0.0.1:{port}")).await {
        Ok(l) => l,
        Err(e) => {
            error!(port = port, error = %e, "could not bind to port");
            std::process::exit(1);
        }
    };

    info!(port = port, "listening on http://127.0.0.1:{port}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();
}
