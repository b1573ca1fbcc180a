use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument};
use crate::artifact::{ArtifactStore, ResultArtifact};
use crate::asset::ImageAsset;
use crate::error::{PipelineError, Result};
use crate::lifecycle::{DynProvider, ResourceLifecycleManager};
use crate::mask::MaskResolver;
use crate::model_types::GarmentCategory;
use crate::models::{InferenceParams, ModelError, SwapModels};
use crate::preprocess::ImagePreprocessor;

pub type SwapLifecycle = ResourceLifecycleManager<DynProvider<SwapModels>>;

/// One garment swap job, as uploaded
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub person: Vec<u8>,
    pub garment: Vec<u8>,
    pub category: GarmentCategory,
    pub mask: Option<Vec<u8>>,
}

/// Stage one: preprocess, resolve the mask, inpaint, persist
pub struct GarmentSwapExecutor {
    models: Arc<SwapLifecycle>,
    preprocessor: ImagePreprocessor,
    resolver: MaskResolver,
    params: InferenceParams,
    store: ArtifactStore,
}

impl GarmentSwapExecutor {
    pub fn new(models: Arc<SwapLifecycle>, store: ArtifactStore) -> Self {
        Self {
            models,
            preprocessor: ImagePreprocessor::default(),
            resolver: MaskResolver::default(),
            params: InferenceParams::default(),
            store,
        }
    }

    pub fn models(&self) -> &SwapLifecycle {
        &self.models
    }

    #[instrument(skip_all, fields(category = %request.category, user_mask = request.mask.is_some()))]
    pub fn execute(&self, request: &GenerationRequest) -> Result<ResultArtifact> {
        let started = Instant::now();

        let person = ImageAsset::decode(&request.person, "person")?;
        let garment = ImageAsset::decode(&request.garment, "garment")?;
        let person = self.preprocessor.prepare_person(&person);
        let garment = self.preprocessor.prepare_garment(&garment);

        // A bad upload is rejected before any model is loaded
        let user_mask = request
            .mask
            .as_deref()
            .map(|bytes| self.resolver.from_user(&person, bytes))
            .transpose()?;

        let models = self.models.acquire()?;

        let mask = match user_mask {
            Some(mask) => mask,
            None => self
                .resolver
                .from_segmentation(&person, request.category, models.segmenter.as_ref())?,
        };

        let result = models
            .inpainter
            .inpaint(person.pixels(), garment.pixels(), mask.pixels(), &self.params)
            .map_err(PipelineError::GenerationFailed)?;
        models.release();

        if result.dimensions() != person.dimensions() {
            let (w, h) = result.dimensions();
            return Err(PipelineError::GenerationFailed(ModelError::new(format!(
                "inpainting returned {w}x{h}, expected {}x{}",
                person.width(),
                person.height()
            ))));
        }

        let artifact = self.store.persist_image("result", &result)?;

        info!(
            reference = %artifact.reference,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Garment swap complete"
        );

        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::Arc;
    use image::{GrayImage, Luma};
    use crate::artifact::StorageLayout;
    use crate::lifecycle::{DeviceId, LoadState, ResidencyMode};
    use crate::model_types::ArtifactKind;
    use crate::testing::{encode_png, solid_png, FakeDevice, FakeSwapProvider};
    use super::*;

    fn executor(provider: FakeSwapProvider, mode: ResidencyMode, layout: &StorageLayout) -> GarmentSwapExecutor {
        let provider: DynProvider<SwapModels> = Box::new(provider);
        let models = ResourceLifecycleManager::start(provider, mode, DeviceId::default()).unwrap();
        GarmentSwapExecutor::new(Arc::new(models), layout.swap_store())
    }

    fn request(mask: Option<Vec<u8>>) -> GenerationRequest {
        GenerationRequest {
            person: solid_png(600, 900),
            garment: solid_png(400, 1000),
            category: GarmentCategory::Upper,
            mask,
        }
    }

    #[test]
    fn test_swap_produces_working_size_image() {
        let root = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(root.path());
        let provider = FakeSwapProvider::new(FakeDevice::default());
        let calls = provider.calls();
        let executor = executor(provider, ResidencyMode::Resident, &layout);

        let artifact = executor.execute(&request(None)).unwrap();

        assert_eq!(artifact.kind, ArtifactKind::Image);
        assert!(artifact.reference.as_str().starts_with("3d_targets/result_"));
        let saved = image::open(&artifact.path).unwrap();
        assert_eq!((saved.width(), saved.height()), (768, 1024));
        assert_eq!(calls.segmentations(), 1);

        let params = calls.last_params().unwrap();
        assert_eq!(params.num_inference_steps, 50);
        assert_eq!(params.guidance_scale, 2.5);
    }

    #[test]
    fn test_inpainter_sees_matching_dimensions() {
        let root = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(root.path());
        let provider = FakeSwapProvider::new(FakeDevice::default());
        let calls = provider.calls();
        let executor = executor(provider, ResidencyMode::Resident, &layout);

        let mut mask = GrayImage::new(300, 300);
        mask.put_pixel(150, 150, Luma([255]));
        executor.execute(&request(Some(encode_png(&mask)))).unwrap();

        assert_eq!(calls.last_mask_size(), Some((768, 1024)));
        assert_eq!(calls.segmentations(), 0);
    }

    #[test]
    fn test_bad_mask_rejected_before_models_load() {
        let root = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(root.path());
        let device = FakeDevice::default();
        let provider = FakeSwapProvider::new(device.clone());
        let calls = provider.calls();
        let executor = executor(provider, ResidencyMode::OnDemand, &layout);

        let err = executor.execute(&request(Some(b"not a png".to_vec()))).unwrap_err();

        assert!(matches!(err, PipelineError::MaskResolution(_)));
        assert_eq!(calls.loads(), 0);
    }

    #[test]
    fn test_generation_failure_persists_nothing() {
        let root = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(root.path());
        let provider = FakeSwapProvider::failing_inpaint(FakeDevice::default(), "nan latents");
        let executor = executor(provider, ResidencyMode::Resident, &layout);

        let err = executor.execute(&request(None)).unwrap_err();

        assert!(matches!(err, PipelineError::GenerationFailed(ref e) if e.message() == "nan latents"));
        let out_dir = root.path().join("3d_targets");
        assert!(!out_dir.exists() || fs::read_dir(out_dir).unwrap().count() == 0);
    }

    #[test]
    fn test_on_demand_swap_returns_device_to_baseline() {
        let root = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(root.path());
        let device = FakeDevice::default();
        let baseline = device.allocated();
        let executor = executor(FakeSwapProvider::new(device.clone()), ResidencyMode::OnDemand, &layout);

        executor.execute(&request(None)).unwrap();
        assert_eq!(device.allocated(), baseline);

        // Rejected before any model is touched
        executor.execute(&GenerationRequest { garment: b"broken".to_vec(), ..request(None) }).unwrap_err();
        assert_eq!(device.allocated(), baseline);
    }

    #[test]
    fn test_on_demand_releases_after_failed_inference() {
        let root = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(root.path());
        let device = FakeDevice::default();
        let baseline = device.allocated();
        let provider = FakeSwapProvider::failing_inpaint(device.clone(), "cuda error");
        let calls = provider.calls();
        let executor = executor(provider, ResidencyMode::OnDemand, &layout);

        let err = executor.execute(&request(None)).unwrap_err();

        assert!(matches!(err, PipelineError::GenerationFailed(_)));
        assert_eq!(calls.loads(), 1);
        assert_eq!(device.allocated(), baseline);
        assert_eq!(executor.models().state(), LoadState::Unloaded);
    }

    #[test]
    fn test_undecodable_person_is_client_error() {
        let root = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(root.path());
        let executor = executor(FakeSwapProvider::new(FakeDevice::default()), ResidencyMode::Resident, &layout);

        let err = executor
            .execute(&GenerationRequest { person: vec![0, 1, 2], ..request(None) })
            .unwrap_err();

        assert!(matches!(err, PipelineError::InvalidImage { role: "person", .. }));
    }
}
