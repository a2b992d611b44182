//! leadgen-tp library - Lead Tier Progression service
//!
//! Receives engagement webhooks from the messaging platform, moves leads
//! monotonically through cold → warm → hot, records every change in an
//! append-only progression log and kicks off tier campaigns.

use std::sync::Arc;
use std::time::Instant;

use axum::routing::get;
use axum::Router;
use leadgen_common::events::EventBus;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod campaign;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod locks;
pub mod store;

use campaign::CampaignTrigger;
use engine::ProgressionEngine;
use store::{ProgressionLog, SqliteStore};

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 5790;

/// Capacity of the in-process event bus
pub const EVENT_BUS_CAPACITY: usize = 256;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ProgressionEngine>,
    /// Read side of the progression log
    pub progressions: Arc<dyn ProgressionLog>,
    pub event_bus: EventBus,
    pub startup_time: Instant,
}

impl AppState {
    /// Wire the engine over a SQLite store
    pub fn new(store: SqliteStore, trigger: Arc<dyn CampaignTrigger>, event_bus: EventBus) -> Self {
        let store = Arc::new(store);
        let engine = ProgressionEngine::new(store.clone(), store.clone(), trigger, event_bus.clone());

        Self {
            engine: Arc::new(engine),
            progressions: store,
            event_bus,
            startup_time: Instant::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/moengage/webhook",
            get(api::list_progressions).post(api::receive_webhook),
        )
        .route("/api/progressions/events", get(api::event_stream))
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
