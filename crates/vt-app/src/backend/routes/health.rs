use std::sync::Arc;
use axum::extract::State;
use axum::Json;
use vt_core::lifecycle::LoadState;
use crate::backend::schemas::HealthResponse;
use crate::backend::state::{ReconstructState, SwapState};

pub async fn swap_health(State(state): State<Arc<SwapState>>) -> Json<HealthResponse> {
    Json(health(state.executor.models().state()))
}

pub async fn reconstruct_health(State(state): State<Arc<ReconstructState>>) -> Json<HealthResponse> {
    Json(health(state.router.model().state()))
}

fn health(models: LoadState) -> HealthResponse {
    let models = match models {
        LoadState::Unloaded => "unloaded",
        LoadState::Loading => "loading",
        LoadState::Ready => "ready",
    };

    HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        models: models.to_string(),
    }
}
