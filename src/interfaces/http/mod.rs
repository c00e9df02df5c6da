//! Reference HTTP gateway onto the `Orchestrator`. Exposes the same
//! operations as the CLI over REST so that a UI or an upstream ticketing
//! system can submit intents and drive approvals without shelling out.

pub mod dto;
pub mod routes;

use std::sync::Arc;

use anyhow::{Context, Result};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::application::{AgentRegistry, Orchestrator, ToolRegistry};
use crate::domain::models::HttpConfig;
use crate::domain::ports::{ExecutionRepository, PlanRepository, TaskRepository};

/// Shared state behind every handler: the composition root for mutations
/// plus the read-only repositories list/show endpoints query directly,
/// mirroring `cli::CliContext`.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub tasks: Arc<dyn TaskRepository>,
    pub plans: Arc<dyn PlanRepository>,
    pub executions: Arc<dyn ExecutionRepository>,
    pub agents: Arc<AgentRegistry>,
    pub tools: Arc<ToolRegistry>,
}

pub async fn serve(state: AppState, bind_addr: &str, http_config: &HttpConfig) -> Result<()> {
    let cors = if http_config.cors_allowed_origins.is_empty() {
        CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
    } else {
        let origins = http_config
            .cors_allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect::<Vec<_>>();
        CorsLayer::new().allow_origin(origins).allow_methods(Any).allow_headers(Any)
    };

    let app = routes::router(state).layer(TraceLayer::new_for_http()).layer(cors);

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!(%bind_addr, "fleetctl HTTP gateway listening");
    axum::serve(listener, app).await.context("HTTP server error")
}
