//! Shared router state.

use crate::{models::pricing::ServiceInfo, services::storage_service::StorageService};
use axum::extract::FromRef;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub storage: StorageService,
    pub info: Arc<ServiceInfo>,
}

impl AppState {
    pub fn new(storage: StorageService, info: ServiceInfo) -> Self {
        Self {
            storage,
            info: Arc::new(info),
        }
    }
}

impl FromRef<AppState> for StorageService {
    fn from_ref(state: &AppState) -> Self {
        state.storage.clone()
    }
}

impl FromRef<AppState> for Arc<ServiceInfo> {
    fn from_ref(state: &AppState) -> Self {
        state.info.clone()
    }
}
