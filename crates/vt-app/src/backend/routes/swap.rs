use std::sync::Arc;
use axum::extract::multipart::{Multipart, MultipartError, MultipartRejection};
use axum::extract::State;
use axum::Json;
use tracing::{debug, info};
use vt_core::pipeline::GenerationRequest;
use vt_core::GarmentCategory;
use crate::backend::schemas::SwapResponse;
use crate::backend::state::SwapState;
use crate::error::ApiError;

pub async fn swap_garment(
    State(state): State<Arc<SwapState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<SwapResponse>, ApiError> {
    let mut multipart = multipart.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let request = read_swap_form(&mut multipart).await?;

    info!(category = %request.category, user_mask = request.mask.is_some(), "Garment swap requested");

    let artifact = tokio::task::spawn_blocking(move || state.executor.execute(&request))
        .await
        .map_err(|e| ApiError::Internal(format!("Garment swap task failed: {e}")))??;

    Ok(Json(SwapResponse {
        output_path: artifact.reference.to_string(),
    }))
}

async fn read_swap_form(multipart: &mut Multipart) -> Result<GenerationRequest, ApiError> {
    let mut person = None;
    let mut garment = None;
    let mut category = None;
    let mut mask = None;

    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "person_image" => person = Some(field.bytes().await.map_err(malformed)?.to_vec()),
            "cloth_image" => garment = Some(field.bytes().await.map_err(malformed)?.to_vec()),
            "cloth_type" => category = Some(field.text().await.map_err(malformed)?),
            "mask" => {
                // Form clients send an empty part when no mask was drawn
                let bytes = field.bytes().await.map_err(malformed)?;
                if !bytes.is_empty() {
                    mask = Some(bytes.to_vec());
                }
            }
            other => debug!(field = other, "Ignoring unknown form field"),
        }
    }

    let category: GarmentCategory = required(category, "cloth_type")?.parse()?;

    Ok(GenerationRequest {
        person: required(person, "person_image")?,
        garment: required(garment, "cloth_image")?,
        category,
        mask,
    })
}

fn required<T>(value: Option<T>, field: &str) -> Result<T, ApiError> {
    value.ok_or_else(|| ApiError::BadRequest(format!("missing form field '{field}'")))
}

fn malformed(e: MultipartError) -> ApiError {
    ApiError::BadRequest(e.body_text())
}
