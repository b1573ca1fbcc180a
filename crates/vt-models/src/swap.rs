use image::{GrayImage, RgbImage};
use serde::{Deserialize, Serialize};
use tracing::warn;
use vt_core::lifecycle::{DeviceId, ModelProvider};
use vt_core::models::{InferenceParams, InpaintModel, ModelError, SegmentationModel, SwapModels};
use vt_core::GarmentCategory;
use crate::codec::{gray_from_b64, gray_to_b64, rgb_from_b64, rgb_to_b64};
use crate::worker::WorkerClient;

#[derive(Debug, Serialize)]
pub struct InpaintPayload {
    pub person: String,
    pub garment: String,
    pub mask: String,
    pub num_inference_steps: u32,
    pub guidance_scale: f32,
}

#[derive(Debug, Deserialize)]
pub struct InpaintReply {
    pub image: String,
}

#[derive(Debug, Serialize)]
pub struct SegmentPayload {
    pub person: String,
    pub category: GarmentCategory,
}

#[derive(Debug, Deserialize)]
pub struct SegmentReply {
    pub mask: String,
}

const INPAINT_MODEL: &str = "inpaint";
const SEGMENT_MODEL: &str = "segment";

/// A model loaded inside a worker process. Dropping it unloads it there.
struct Loaded {
    client: WorkerClient,
    model: &'static str,
    device: DeviceId,
}

impl Loaded {
    fn load(base_url: &str, model: &'static str, device: &DeviceId) -> Result<Self, ModelError> {
        let client = WorkerClient::connect(base_url)?;
        client.load(model, device)?;
        Ok(Self {
            client,
            model,
            device: device.clone(),
        })
    }
}

impl Drop for Loaded {
    fn drop(&mut self) {
        if let Err(e) = self.client.unload(self.model, &self.device) {
            warn!(worker = self.client.base_url(), model = self.model, error = %e, "Worker unload failed");
        }
    }
}

pub struct RemoteInpainter {
    worker: Loaded,
}

impl InpaintModel for RemoteInpainter {
    fn inpaint(
        &self,
        person: &RgbImage,
        garment: &RgbImage,
        mask: &GrayImage,
        params: &InferenceParams,
    ) -> Result<RgbImage, ModelError> {
        let payload = InpaintPayload {
            person: rgb_to_b64(person)?,
            garment: rgb_to_b64(garment)?,
            mask: gray_to_b64(mask)?,
            num_inference_steps: params.num_inference_steps,
            guidance_scale: params.guidance_scale,
        };

        let reply: InpaintReply = self.worker.client.post_json("inpaint", &payload)?;
        rgb_from_b64(&reply.image)
    }
}

pub struct RemoteSegmenter {
    worker: Loaded,
}

impl SegmentationModel for RemoteSegmenter {
    fn segment(&self, person: &RgbImage, category: GarmentCategory) -> Result<GrayImage, ModelError> {
        let payload = SegmentPayload {
            person: rgb_to_b64(person)?,
            category,
        };

        let reply: SegmentReply = self.worker.client.post_json("segment", &payload)?;
        gray_from_b64(&reply.mask)
    }
}

/// Inpainting and segmentation workers, loaded and released as one unit
#[derive(Debug, Clone)]
pub struct RemoteSwapProvider {
    inpaint_url: String,
    segment_url: String,
}

impl RemoteSwapProvider {
    pub fn new(inpaint_url: impl Into<String>, segment_url: impl Into<String>) -> Self {
        Self {
            inpaint_url: inpaint_url.into(),
            segment_url: segment_url.into(),
        }
    }
}

impl ModelProvider for RemoteSwapProvider {
    type Models = SwapModels;

    fn name(&self) -> &str {
        "garment-swap"
    }

    fn load(&self, device: &DeviceId) -> Result<SwapModels, ModelError> {
        let inpainter = RemoteInpainter {
            worker: Loaded::load(&self.inpaint_url, INPAINT_MODEL, device)?,
        };
        // The inpainter unloads again on drop if the segmenter cannot be loaded
        let segmenter = RemoteSegmenter {
            worker: Loaded::load(&self.segment_url, SEGMENT_MODEL, device)?,
        };

        Ok(SwapModels {
            inpainter: Box::new(inpainter),
            segmenter: Box::new(segmenter),
        })
    }

    fn reclaim(&self, device: &DeviceId) -> Result<(), ModelError> {
        WorkerClient::connect(&self.inpaint_url)?.empty_cache(device)?;
        if self.segment_url != self.inpaint_url {
            WorkerClient::connect(&self.segment_url)?.empty_cache(device)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_payload_uses_category_id() {
        let payload = SegmentPayload {
            person: "aGk=".to_string(),
            category: GarmentCategory::Overall,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["category"], "overall");
    }

    #[test]
    fn test_inpaint_payload_carries_budget() {
        let params = InferenceParams::default();
        let payload = InpaintPayload {
            person: String::new(),
            garment: String::new(),
            mask: String::new(),
            num_inference_steps: params.num_inference_steps,
            guidance_scale: params.guidance_scale,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["num_inference_steps"], 50);
        assert_eq!(json["guidance_scale"], 2.5);
    }

    #[test]
    fn test_unreachable_worker_fails_load() {
        let provider = RemoteSwapProvider::new("http://127.0.0.1:9", "http://127.0.0.1:9");
        assert!(provider.load(&DeviceId::default()).is_err());
    }
}
