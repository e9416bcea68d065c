//! `GET /` — capability and pricing advertisement.

use crate::models::pricing::ServiceInfo;
use axum::{Json, extract::State, response::IntoResponse};
use std::sync::Arc;

pub async fn home(State(info): State<Arc<ServiceInfo>>) -> impl IntoResponse {
    Json(vec![info.as_ref().clone()])
}
