//! Survey Sensei - AI-powered survey generation and review creation backend
//!
//! A Rust backend implementing the survey session state machine: adaptive
//! question flow, skip enforcement, edit-and-branch, and LLM-generated
//! review artifacts.

mod api;
mod config;
mod db;
mod orchestrator;
mod suppliers;
mod survey;

use api::{create_router, AppState};
use config::Settings;
use db::Database;
use orchestrator::SessionOrchestrator;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use suppliers::OpenAiSupplier;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "survey_sensei=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let settings = Settings::from_env();

    // Ensure database directory exists
    if let Some(parent) = PathBuf::from(&settings.db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!(path = %settings.db_path, "Opening database");
    let db = Database::open(&settings.db_path)?;

    if settings.openai_api_key.is_empty() {
        tracing::warn!("OPENAI_API_KEY not configured; supplier calls will fail");
    }
    let supplier = Arc::new(OpenAiSupplier::new(
        settings.openai_api_key.clone(),
        settings.openai_model.clone(),
        settings.openai_base_url.as_deref(),
    ));

    let orchestrator = SessionOrchestrator::new(
        db,
        supplier.clone(),
        supplier.clone(),
        supplier,
        settings.limits.clone(),
    );
    let state = AppState::new(orchestrator, settings.environment.clone());

    // CORS restricted to the configured frontend plus local development
    let origins: Vec<_> = [settings.frontend_url.as_str(), "http://localhost:3000"]
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    tracing::info!("Survey Sensei backend listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
