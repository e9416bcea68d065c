//! Defines routes for the content-addressed store.
//!
//! ## Structure
//! - `GET /`        — capability and pricing document
//! - `GET /healthz` — liveness
//! - `GET /readyz`  — readiness (metadata store + disk)
//! - `GET /{hash}`  — fetch object by SHA-256 hex
//! - `PUT /{hash}`  — store object under its SHA-256 hex
//!
//! Static routes take priority over the `{hash}` capture.

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        info_handlers::home,
        object_handlers::{get_object, put_object},
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::get,
};

/// Build the router. `max_object_bytes` caps PUT bodies; larger uploads get 413.
pub fn routes(max_object_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/", get(home))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/{hash}", get(get_object).put(put_object))
        .layer(DefaultBodyLimit::max(max_object_bytes))
}
