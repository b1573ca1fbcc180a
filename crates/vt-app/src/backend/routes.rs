use std::sync::Arc;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use crate::backend::routes::health::{reconstruct_health, swap_health};
use crate::backend::routes::reconstruct::process_image;
use crate::backend::routes::swap::swap_garment;
use crate::backend::state::{ReconstructState, SwapState};

mod health;
mod reconstruct;
mod swap;

/// Person and garment photos arrive straight from a camera
const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

pub fn swap_routes() -> Router<Arc<SwapState>> {
    Router::new()
        .route("/swap", post(swap_garment))
        .route("/health", get(swap_health))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}

pub fn reconstruct_routes() -> Router<Arc<ReconstructState>> {
    Router::new()
        .route("/process-image", post(process_image))
        .route("/process-image/", post(process_image))
        .route("/health", get(reconstruct_health))
}
