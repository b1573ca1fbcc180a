use std::path::PathBuf;
use thiserror::Error;
use crate::models::ModelError;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Mask resolution failed")]
    MaskResolution(#[from] MaskResolutionError),

    #[error("Model '{model}' unavailable on {device}")]
    ModelUnavailable {
        model: String,
        device: String,
        #[source]
        source: ModelError,
    },

    #[error("Garment swap generation failed")]
    GenerationFailed(#[source] ModelError),

    #[error("Invalid modality '{0}', expected one of gaussian, radiance_field, mesh, glb")]
    InvalidModality(String),

    #[error("Invalid garment category '{0}', expected one of upper, lower, overall")]
    InvalidCategory(String),

    #[error("Could not decode {role} image")]
    InvalidImage {
        role: &'static str,
        #[source]
        source: image::ImageError,
    },

    #[error("Source image not found: {0}")]
    SourceNotFound(PathBuf),

    #[error("3D reconstruction failed")]
    ReconstructionFailed(#[source] ModelError),

    #[error("Failed to persist artifact")]
    Storage(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum MaskResolutionError {
    #[error("user mask could not be decoded")]
    Decode(#[from] image::ImageError),

    #[error("user mask is blank")]
    Empty,

    #[error("segmentation failed")]
    Segmentation(#[source] ModelError),
}

/// Who is at fault for a failed request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Malformed client input, never retried
    Client,
    NotFound,
    /// A model could not be brought up; the caller may retry later
    Unavailable,
    Server,
}

impl PipelineError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidModality(_)
            | Self::InvalidCategory(_)
            | Self::InvalidImage { .. }
            | Self::MaskResolution(MaskResolutionError::Decode(_) | MaskResolutionError::Empty) => {
                ErrorClass::Client
            }
            Self::SourceNotFound(_) => ErrorClass::NotFound,
            Self::ModelUnavailable { .. } => ErrorClass::Unavailable,
            Self::MaskResolution(MaskResolutionError::Segmentation(_))
            | Self::GenerationFailed(_)
            | Self::ReconstructionFailed(_)
            | Self::Storage(_) => ErrorClass::Server,
        }
    }

    /// Stable machine-readable code for error responses
    pub fn code(&self) -> &'static str {
        match self {
            Self::MaskResolution(_) => "mask_resolution_error",
            Self::ModelUnavailable { .. } => "model_unavailable_error",
            Self::GenerationFailed(_) => "generation_failed_error",
            Self::InvalidModality(_) => "invalid_modality_error",
            Self::InvalidCategory(_) => "invalid_category_error",
            Self::InvalidImage { .. } => "invalid_image_error",
            Self::SourceNotFound(_) => "source_not_found_error",
            Self::ReconstructionFailed(_) => "reconstruction_failed_error",
            Self::Storage(_) => "storage_error",
        }
    }
}
