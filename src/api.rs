//! HTTP API for the survey backend

mod handlers;
mod types;

pub use handlers::create_router;

use crate::orchestrator::SessionOrchestrator;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<SessionOrchestrator>,
    pub environment: String,
}

impl AppState {
    pub fn new(orchestrator: SessionOrchestrator, environment: String) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            environment,
        }
    }
}
