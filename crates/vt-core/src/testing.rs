//! In-process fakes for the inference collaborators.
//!
//! They keep call counts and simulate device memory so lifecycle and
//! pipeline behavior can be checked without a GPU or a worker process.

use std::fs;
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use image::{GrayImage, ImageFormat, Luma, Rgb, RgbImage};
use crate::lifecycle::{DeviceId, ModelProvider};
use crate::model_types::{GarmentCategory, RenderChannel, SceneRepresentation};
use crate::models::{
    GlbOptions, InferenceParams, InpaintModel, ModelError, ReconstructionModel, Scene, SegmentationModel, SwapModels,
    VideoEncoder,
};

/// PNG-encoded solid gray RGB image
pub fn solid_png(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, Rgb([128, 128, 128]));
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .expect("encode test png");
    bytes
}

pub fn encode_png(mask: &GrayImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    mask.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .expect("encode test mask");
    bytes
}

/// Simulated accelerator memory, shared between clones
#[derive(Debug, Clone, Default)]
pub struct FakeDevice {
    allocated: Arc<AtomicU64>,
}

impl FakeDevice {
    pub fn allocated(&self) -> u64 {
        self.allocated.load(Ordering::SeqCst)
    }

    fn allocate(&self, bytes: u64) -> Allocation {
        self.allocated.fetch_add(bytes, Ordering::SeqCst);
        Allocation {
            device: self.clone(),
            bytes,
        }
    }
}

/// Device memory held by a loaded fake model, freed on drop
#[derive(Debug)]
pub struct Allocation {
    device: FakeDevice,
    bytes: u64,
}

impl Drop for Allocation {
    fn drop(&mut self) {
        self.device.allocated.fetch_sub(self.bytes, Ordering::SeqCst);
    }
}

#[derive(Debug)]
pub struct FakeModels {
    allocation: Allocation,
}

impl FakeModels {
    pub fn footprint(&self) -> u64 {
        self.allocation.bytes
    }
}

/// Provider of an opaque model with a fixed footprint
pub struct FakeProvider {
    device: FakeDevice,
    footprint: u64,
    failure: Option<String>,
    loads: AtomicUsize,
    reclaims: AtomicUsize,
}

impl FakeProvider {
    pub fn new(device: FakeDevice, footprint: u64) -> Self {
        Self {
            device,
            footprint,
            failure: None,
            loads: AtomicUsize::new(0),
            reclaims: AtomicUsize::new(0),
        }
    }

    pub fn failing(device: FakeDevice, message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::new(device, 0)
        }
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn reclaims(&self) -> usize {
        self.reclaims.load(Ordering::SeqCst)
    }
}

impl ModelProvider for FakeProvider {
    type Models = FakeModels;

    fn name(&self) -> &str {
        "fake"
    }

    fn load(&self, _device: &DeviceId) -> Result<FakeModels, ModelError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.failure {
            return Err(ModelError::new(message.clone()));
        }
        Ok(FakeModels {
            allocation: self.device.allocate(self.footprint),
        })
    }

    fn reclaim(&self, _device: &DeviceId) -> Result<(), ModelError> {
        self.reclaims.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Segmenter that marks the central third of the frame
pub struct FakeSegmenter {
    output_size: Option<(u32, u32)>,
    failure: Option<String>,
    calls: Arc<AtomicUsize>,
    last_category: Arc<Mutex<Option<GarmentCategory>>>,
}

impl Default for FakeSegmenter {
    fn default() -> Self {
        Self {
            output_size: None,
            failure: None,
            calls: Arc::new(AtomicUsize::new(0)),
            last_category: Arc::new(Mutex::new(None)),
        }
    }
}

impl FakeSegmenter {
    pub fn with_output_size(width: u32, height: u32) -> Self {
        Self {
            output_size: Some((width, height)),
            ..Self::default()
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_category(&self) -> Option<GarmentCategory> {
        *self.last_category.lock().unwrap()
    }
}

impl SegmentationModel for FakeSegmenter {
    fn segment(&self, person: &RgbImage, category: GarmentCategory) -> Result<GrayImage, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_category.lock().unwrap() = Some(category);
        if let Some(message) = &self.failure {
            return Err(ModelError::new(message.clone()));
        }

        let (width, height) = self.output_size.unwrap_or(person.dimensions());
        Ok(GrayImage::from_fn(width, height, |x, y| {
            let inside = (width / 3..2 * width / 3).contains(&x) && (height / 3..2 * height / 3).contains(&y);
            Luma([if inside { 255 } else { 0 }])
        }))
    }
}

/// Observations shared between a `FakeSwapProvider` and the models it loads
#[derive(Debug, Clone, Default)]
pub struct SwapCalls {
    loads: Arc<AtomicUsize>,
    segmentations: Arc<AtomicUsize>,
    last_params: Arc<Mutex<Option<InferenceParams>>>,
    last_mask_size: Arc<Mutex<Option<(u32, u32)>>>,
}

impl SwapCalls {
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn segmentations(&self) -> usize {
        self.segmentations.load(Ordering::SeqCst)
    }

    pub fn last_params(&self) -> Option<InferenceParams> {
        *self.last_params.lock().unwrap()
    }

    pub fn last_mask_size(&self) -> Option<(u32, u32)> {
        *self.last_mask_size.lock().unwrap()
    }
}

struct FakeInpainter {
    calls: SwapCalls,
    failure: Option<String>,
    _allocation: Allocation,
}

impl InpaintModel for FakeInpainter {
    fn inpaint(
        &self,
        person: &RgbImage,
        _garment: &RgbImage,
        mask: &GrayImage,
        params: &InferenceParams,
    ) -> Result<RgbImage, ModelError> {
        *self.calls.last_params.lock().unwrap() = Some(*params);
        *self.calls.last_mask_size.lock().unwrap() = Some(mask.dimensions());
        if let Some(message) = &self.failure {
            return Err(ModelError::new(message.clone()));
        }
        Ok(RgbImage::from_pixel(person.width(), person.height(), Rgb([30, 60, 90])))
    }
}

struct CountingSegmenter {
    inner: FakeSegmenter,
    calls: SwapCalls,
}

impl SegmentationModel for CountingSegmenter {
    fn segment(&self, person: &RgbImage, category: GarmentCategory) -> Result<GrayImage, ModelError> {
        self.calls.segmentations.fetch_add(1, Ordering::SeqCst);
        self.inner.segment(person, category)
    }
}

/// Provider of a fake inpainter plus segmenter pair
pub struct FakeSwapProvider {
    device: FakeDevice,
    load_failure: Option<String>,
    inpaint_failure: Option<String>,
    calls: SwapCalls,
}

impl FakeSwapProvider {
    pub const FOOTPRINT: u64 = 6 << 30;

    pub fn new(device: FakeDevice) -> Self {
        Self {
            device,
            load_failure: None,
            inpaint_failure: None,
            calls: SwapCalls::default(),
        }
    }

    pub fn failing_load(device: FakeDevice, message: &str) -> Self {
        Self {
            load_failure: Some(message.to_string()),
            ..Self::new(device)
        }
    }

    pub fn failing_inpaint(device: FakeDevice, message: &str) -> Self {
        Self {
            inpaint_failure: Some(message.to_string()),
            ..Self::new(device)
        }
    }

    pub fn calls(&self) -> SwapCalls {
        self.calls.clone()
    }
}

impl ModelProvider for FakeSwapProvider {
    type Models = SwapModels;

    fn name(&self) -> &str {
        "fake-swap"
    }

    fn load(&self, _device: &DeviceId) -> Result<SwapModels, ModelError> {
        self.calls.loads.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.load_failure {
            return Err(ModelError::new(message.clone()));
        }
        Ok(SwapModels {
            inpainter: Box::new(FakeInpainter {
                calls: self.calls.clone(),
                failure: self.inpaint_failure.clone(),
                _allocation: self.device.allocate(Self::FOOTPRINT),
            }),
            segmenter: Box::new(CountingSegmenter {
                inner: FakeSegmenter::default(),
                calls: self.calls.clone(),
            }),
        })
    }
}

/// Observations shared between a `FakeReconstructionProvider` and its scenes
#[derive(Debug, Clone, Default)]
pub struct ReconstructionCalls {
    loads: Arc<AtomicUsize>,
    reconstructions: Arc<AtomicUsize>,
    last_seed: Arc<Mutex<Option<u64>>>,
    last_render: Arc<Mutex<Option<(SceneRepresentation, RenderChannel)>>>,
    glb_options: Arc<Mutex<Option<GlbOptions>>>,
}

impl ReconstructionCalls {
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn reconstructions(&self) -> usize {
        self.reconstructions.load(Ordering::SeqCst)
    }

    pub fn last_seed(&self) -> Option<u64> {
        *self.last_seed.lock().unwrap()
    }

    pub fn last_render(&self) -> Option<(SceneRepresentation, RenderChannel)> {
        *self.last_render.lock().unwrap()
    }

    pub fn glb_options(&self) -> Option<GlbOptions> {
        *self.glb_options.lock().unwrap()
    }
}

struct FakeReconstructor {
    calls: ReconstructionCalls,
    failure: Option<String>,
    _allocation: Allocation,
}

impl ReconstructionModel for FakeReconstructor {
    fn reconstruct(&self, _image: &RgbImage, seed: u64) -> Result<Box<dyn Scene + '_>, ModelError> {
        self.calls.reconstructions.fetch_add(1, Ordering::SeqCst);
        *self.calls.last_seed.lock().unwrap() = Some(seed);
        if let Some(message) = &self.failure {
            return Err(ModelError::new(message.clone()));
        }
        Ok(Box::new(FakeScene { calls: &self.calls }))
    }
}

pub struct FakeScene<'a> {
    calls: &'a ReconstructionCalls,
}

impl Scene for FakeScene<'_> {
    fn render_turntable(
        &self,
        representation: SceneRepresentation,
        channel: RenderChannel,
    ) -> Result<Vec<RgbImage>, ModelError> {
        *self.calls.last_render.lock().unwrap() = Some((representation, channel));
        Ok((0..4u8).map(|i| RgbImage::from_pixel(16, 16, Rgb([i * 60, 0, 0]))).collect())
    }

    fn export_glb(&self, options: &GlbOptions) -> Result<Vec<u8>, ModelError> {
        *self.calls.glb_options.lock().unwrap() = Some(*options);
        Ok(b"glTF\x02\x00\x00\x00".to_vec())
    }
}

pub struct FakeReconstructionProvider {
    device: FakeDevice,
    failure: Option<String>,
    calls: ReconstructionCalls,
}

impl FakeReconstructionProvider {
    pub const FOOTPRINT: u64 = 12 << 30;

    pub fn new(device: FakeDevice) -> Self {
        Self {
            device,
            failure: None,
            calls: ReconstructionCalls::default(),
        }
    }

    /// Loads fine, fails every reconstruction
    pub fn failing(device: FakeDevice, message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::new(device)
        }
    }

    pub fn calls(&self) -> ReconstructionCalls {
        self.calls.clone()
    }
}

impl ModelProvider for FakeReconstructionProvider {
    type Models = Box<dyn ReconstructionModel>;

    fn name(&self) -> &str {
        "fake-reconstruction"
    }

    fn load(&self, _device: &DeviceId) -> Result<Box<dyn ReconstructionModel>, ModelError> {
        self.calls.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeReconstructor {
            calls: self.calls.clone(),
            failure: self.failure.clone(),
            _allocation: self.device.allocate(Self::FOOTPRINT),
        }))
    }
}

/// Writes the frame count as the "video" so output files are non-empty
#[derive(Debug, Default)]
pub struct FakeEncoder {
    encoded: AtomicUsize,
    last_fps: Mutex<Option<u32>>,
    failure: Mutex<Option<String>>,
}

impl FakeEncoder {
    pub fn encoded(&self) -> usize {
        self.encoded.load(Ordering::SeqCst)
    }

    pub fn last_fps(&self) -> Option<u32> {
        *self.last_fps.lock().unwrap()
    }

    pub fn fail_with(&self, message: &str) {
        *self.failure.lock().unwrap() = Some(message.to_string());
    }
}

impl VideoEncoder for FakeEncoder {
    fn encode(&self, frames: &[RgbImage], fps: u32, dest: &Path) -> Result<(), ModelError> {
        *self.last_fps.lock().unwrap() = Some(fps);
        if let Some(message) = self.failure.lock().unwrap().clone() {
            fs::write(dest, b"truncated").map_err(|e| ModelError::with_source("write failed", e))?;
            return Err(ModelError::new(message));
        }

        fs::write(dest, format!("{} frames @ {fps}fps", frames.len()))
            .map_err(|e| ModelError::with_source("write failed", e))?;
        self.encoded.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
