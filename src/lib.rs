//! CMS Sync Server
//!
//! Compares CMS blocks and pages between Magento instances and pushes the
//! selected differences from a source to a destination.
//!
//! # Modules
//!
//! - `compare`: pure comparison and field diff of two snapshots
//! - `content`: record types and the on-disk snapshot store
//! - `platform`: Magento REST client behind the `PlatformApi` trait
//! - `sync`: planning, background execution and run history
//! - `routes`: HTTP API

pub mod compare;
pub mod config;
pub mod content;
pub mod db;
pub mod error;
pub mod platform;
pub mod routes;
pub mod state;
pub mod sync;

use axum::{http::HeaderValue, routing::get, Router};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use state::AppState;

/// Build the application router
pub fn app(state: AppState) -> Router {
    let cors = cors_layer(&state.config().server.cors_origins);

    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/api/health", get(routes::health::health_check))
        .nest("/api/instances", routes::instances::router())
        .nest("/api/compare", routes::compare::router())
        .nest("/api/sync", routes::sync::router())
        .nest("/api/history", routes::history::router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    if origins.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(AllowOrigin::list(origins))
    }
}
