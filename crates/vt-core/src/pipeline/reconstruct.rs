use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use crate::artifact::{ArtifactStore, ResultArtifact, StorageLayout};
use crate::asset::ImageAsset;
use crate::error::{PipelineError, Result};
use crate::lifecycle::{DynProvider, ResourceLifecycleManager};
use crate::model_types::{ArtifactKind, ReconstructionModality, RenderChannel, SceneRepresentation};
use crate::models::{
    GlbOptions, ModelError, ReconstructionModel, Scene, VideoEncoder, RECONSTRUCTION_SEED, TURNTABLE_FPS,
};

pub type ReconstructionLifecycle = ResourceLifecycleManager<DynProvider<Box<dyn ReconstructionModel>>>;

/// One 3D generation job. Both fields arrive as raw strings and are
/// validated by the router.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconstructionRequest {
    pub image_path: String,
    #[serde(rename = "return_type")]
    pub modality: String,
}

/// Output of the model-bound part of a reconstruction, held until the device is released
enum Rendered {
    Turntable(Vec<RgbImage>),
    Glb(Vec<u8>),
}

/// Stage two: reconstruct once, then render or export by modality
pub struct ReconstructionRouter {
    model: Arc<ReconstructionLifecycle>,
    encoder: Arc<dyn VideoEncoder>,
    layout: StorageLayout,
    store: ArtifactStore,
    glb: GlbOptions,
    fps: u32,
}

impl ReconstructionRouter {
    pub fn new(model: Arc<ReconstructionLifecycle>, encoder: Arc<dyn VideoEncoder>, layout: StorageLayout) -> Self {
        let store = layout.reconstruction_store();
        Self {
            model,
            encoder,
            layout,
            store,
            glb: GlbOptions::default(),
            fps: TURNTABLE_FPS,
        }
    }

    pub fn model(&self) -> &ReconstructionLifecycle {
        &self.model
    }

    #[instrument(skip_all, fields(source = %request.image_path, modality = %request.modality))]
    pub fn reconstruct(&self, request: &ReconstructionRequest) -> Result<ResultArtifact> {
        let started = Instant::now();

        // Validated first so a bad modality never reaches the model
        let modality: ReconstructionModality = request.modality.parse()?;

        let source = self
            .layout
            .resolve_source(&request.image_path)
            .ok_or_else(|| PipelineError::SourceNotFound(PathBuf::from(&request.image_path)))?;
        let image = ImageAsset::open(&source, "source")?;

        let model = self.model.acquire()?;
        let rendered = {
            let scene = model
                .reconstruct(image.pixels(), RECONSTRUCTION_SEED)
                .map_err(PipelineError::ReconstructionFailed)?;
            self.render(scene.as_ref(), modality)?
        };
        model.release();

        let artifact = match rendered {
            Rendered::Turntable(frames) => self.store.persist_with(ArtifactKind::Video, modality.id(), |path| {
                self.encoder
                    .encode(&frames, self.fps, path)
                    .map_err(PipelineError::ReconstructionFailed)
            })?,
            Rendered::Glb(bytes) => self.store.persist_bytes(ArtifactKind::Scene, "output", &bytes)?,
        };

        info!(
            reference = %artifact.reference,
            kind = ?artifact.kind,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Reconstruction complete"
        );

        Ok(artifact)
    }

    fn render(&self, scene: &dyn Scene, modality: ReconstructionModality) -> Result<Rendered> {
        let (representation, channel) = match modality {
            ReconstructionModality::Gaussian => (SceneRepresentation::Gaussian, RenderChannel::Color),
            ReconstructionModality::RadianceField => (SceneRepresentation::RadianceField, RenderChannel::Color),
            ReconstructionModality::Mesh => (SceneRepresentation::Mesh, RenderChannel::Normal),
            ReconstructionModality::Glb => {
                let bytes = scene.export_glb(&self.glb).map_err(PipelineError::ReconstructionFailed)?;
                return Ok(Rendered::Glb(bytes));
            }
        };

        let frames = scene
            .render_turntable(representation, channel)
            .map_err(PipelineError::ReconstructionFailed)?;
        if frames.is_empty() {
            return Err(PipelineError::ReconstructionFailed(ModelError::new(format!(
                "{representation:?} turntable rendered no frames"
            ))));
        }

        Ok(Rendered::Turntable(frames))
    }
}
