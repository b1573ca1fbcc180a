use serde::{Deserialize, Serialize};
use vt_core::ArtifactKind;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SwapResponse {
    pub output_path: String,
}

/// Body of `POST /process-image`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessImageRequest {
    pub image_path: String,
    pub return_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessImageResponse {
    pub output_path: String,
    pub kind: ArtifactKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub models: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub error: String,
    pub detail: String,
}
