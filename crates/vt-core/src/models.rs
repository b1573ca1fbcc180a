//! Call contracts of the heavy inference collaborators.
//!
//! The coordinator never looks inside a model. Each collaborator is reached
//! through one of these traits; `vt-models` provides the worker-backed
//! implementations and `testing` provides in-process fakes.

use std::path::Path;
use image::{GrayImage, RgbImage};
use thiserror::Error;
use crate::model_types::{GarmentCategory, RenderChannel, SceneRepresentation};

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Frame rate of every turntable video
pub const TURNTABLE_FPS: u32 = 30;

/// Seed passed to the reconstruction model
pub const RECONSTRUCTION_SEED: u64 = 1;

/// Failure reported by a collaborator, with the underlying cause when known
#[derive(Error, Debug)]
#[error("{message}")]
pub struct ModelError {
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl ModelError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Fixed inference budget of the garment swap
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InferenceParams {
    pub num_inference_steps: u32,
    pub guidance_scale: f32,
}

impl Default for InferenceParams {
    fn default() -> Self {
        Self {
            num_inference_steps: 50,
            guidance_scale: 2.5,
        }
    }
}

/// Mesh simplification and texture baking settings for scene export
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlbOptions {
    pub simplify: f32,
    pub texture_size: u32,
}

impl Default for GlbOptions {
    fn default() -> Self {
        Self {
            simplify: 0.95,
            texture_size: 1024,
        }
    }
}

pub trait InpaintModel: Send {
    /// Regenerate the masked region of `person` with the appearance of `garment`.
    /// All three buffers share the same dimensions.
    fn inpaint(
        &self,
        person: &RgbImage,
        garment: &RgbImage,
        mask: &GrayImage,
        params: &InferenceParams,
    ) -> Result<RgbImage, ModelError>;
}

pub trait SegmentationModel: Send {
    fn segment(&self, person: &RgbImage, category: GarmentCategory) -> Result<GrayImage, ModelError>;
}

pub trait ReconstructionModel: Send {
    fn reconstruct(&self, image: &RgbImage, seed: u64) -> Result<Box<dyn Scene + '_>, ModelError>;
}

/// Multi-representation scene produced by one reconstruction call
pub trait Scene {
    fn render_turntable(
        &self,
        representation: SceneRepresentation,
        channel: RenderChannel,
    ) -> Result<Vec<RgbImage>, ModelError>;

    /// Simplify, bake textures and serialize as a binary glTF scene
    fn export_glb(&self, options: &GlbOptions) -> Result<Vec<u8>, ModelError>;
}

pub trait VideoEncoder: Send + Sync {
    fn encode(&self, frames: &[RgbImage], fps: u32, dest: &Path) -> Result<(), ModelError>;
}

/// Models used by the garment swap stage, loaded and released together
pub struct SwapModels {
    pub inpainter: Box<dyn InpaintModel>,
    pub segmenter: Box<dyn SegmentationModel>,
}
