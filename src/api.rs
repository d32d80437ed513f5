//! HTTP API
//!
//! JSON endpoints for creating, listing, replaying and driving sessions.

mod handlers;
mod types;

pub use handlers::create_router;

use crate::db::Database;
use crate::llm::ModelRegistry;
use crate::runtime::ProductionRuntime;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<ProductionRuntime>,
    /// Read side for listings and replay
    pub db: Database,
    pub llm_registry: Arc<ModelRegistry>,
}

impl AppState {
    pub fn new(
        runtime: Arc<ProductionRuntime>,
        db: Database,
        llm_registry: Arc<ModelRegistry>,
    ) -> Self {
        Self {
            runtime,
            db,
            llm_registry,
        }
    }
}
