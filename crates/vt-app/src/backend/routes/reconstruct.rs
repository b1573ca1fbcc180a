use std::sync::Arc;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use tracing::info;
use vt_core::pipeline::ReconstructionRequest;
use crate::backend::schemas::{ProcessImageRequest, ProcessImageResponse};
use crate::backend::state::ReconstructState;
use crate::error::ApiError;

pub async fn process_image(
    State(state): State<Arc<ReconstructState>>,
    payload: Result<Json<ProcessImageRequest>, JsonRejection>,
) -> Result<Json<ProcessImageResponse>, ApiError> {
    let Json(body) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    info!(image_path = %body.image_path, return_type = %body.return_type, "Reconstruction requested");

    let request = ReconstructionRequest {
        image_path: body.image_path,
        modality: body.return_type,
    };
    let artifact = tokio::task::spawn_blocking(move || state.router.reconstruct(&request))
        .await
        .map_err(|e| ApiError::Internal(format!("Reconstruction task failed: {e}")))??;

    Ok(Json(ProcessImageResponse {
        output_path: artifact.reference.to_string(),
        kind: artifact.kind,
    }))
}
