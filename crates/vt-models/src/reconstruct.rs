use image::RgbImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use vt_core::lifecycle::{DeviceId, ModelProvider};
use vt_core::models::{GlbOptions, ModelError, ReconstructionModel, Scene};
use vt_core::{RenderChannel, SceneRepresentation};
use crate::codec::{bytes_from_b64, rgb_from_b64, rgb_to_b64};
use crate::worker::{Ack, WorkerClient};

const RECONSTRUCT_MODEL: &str = "reconstruct";

#[derive(Debug, Serialize)]
pub struct ReconstructPayload {
    pub image: String,
    pub seed: u64,
}

#[derive(Debug, Deserialize)]
pub struct ReconstructReply {
    pub scene_id: String,
}

#[derive(Debug, Serialize)]
pub struct RenderPayload<'a> {
    pub scene_id: &'a str,
    pub representation: SceneRepresentation,
    pub channel: RenderChannel,
}

#[derive(Debug, Deserialize)]
pub struct RenderReply {
    pub frames: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ExportPayload<'a> {
    pub scene_id: &'a str,
    pub simplify: f32,
    pub texture_size: u32,
}

#[derive(Debug, Deserialize)]
pub struct ExportReply {
    pub glb: String,
}

#[derive(Serialize)]
struct SceneHandle<'a> {
    scene_id: &'a str,
}

pub struct RemoteReconstructor {
    client: WorkerClient,
    device: DeviceId,
}

impl ReconstructionModel for RemoteReconstructor {
    fn reconstruct(&self, image: &RgbImage, seed: u64) -> Result<Box<dyn Scene + '_>, ModelError> {
        let payload = ReconstructPayload {
            image: rgb_to_b64(image)?,
            seed,
        };
        let reply: ReconstructReply = self.client.post_json("reconstruct", &payload)?;
        debug!(scene_id = %reply.scene_id, "Scene reconstructed");

        Ok(Box::new(RemoteScene {
            client: &self.client,
            id: reply.scene_id,
        }))
    }
}

impl Drop for RemoteReconstructor {
    fn drop(&mut self) {
        if let Err(e) = self.client.unload(RECONSTRUCT_MODEL, &self.device) {
            warn!(worker = self.client.base_url(), error = %e, "Worker unload failed");
        }
    }
}

/// A scene held in the worker's memory until dropped
pub struct RemoteScene<'a> {
    client: &'a WorkerClient,
    id: String,
}

impl Scene for RemoteScene<'_> {
    fn render_turntable(
        &self,
        representation: SceneRepresentation,
        channel: RenderChannel,
    ) -> Result<Vec<RgbImage>, ModelError> {
        let payload = RenderPayload {
            scene_id: &self.id,
            representation,
            channel,
        };
        let reply: RenderReply = self.client.post_json("render", &payload)?;

        reply.frames.iter().map(|f| rgb_from_b64(f)).collect()
    }

    fn export_glb(&self, options: &GlbOptions) -> Result<Vec<u8>, ModelError> {
        let payload = ExportPayload {
            scene_id: &self.id,
            simplify: options.simplify,
            texture_size: options.texture_size,
        };
        let reply: ExportReply = self.client.post_json("export_glb", &payload)?;

        bytes_from_b64(&reply.glb)
    }
}

impl Drop for RemoteScene<'_> {
    fn drop(&mut self) {
        let handle = SceneHandle { scene_id: &self.id };
        if let Err(e) = self.client.post_json::<_, Ack>("release_scene", &handle) {
            warn!(scene_id = %self.id, error = %e, "Scene release failed");
        }
    }
}

#[derive(Debug, Clone)]
pub struct RemoteReconstructionProvider {
    url: String,
}

impl RemoteReconstructionProvider {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl ModelProvider for RemoteReconstructionProvider {
    type Models = Box<dyn ReconstructionModel>;

    fn name(&self) -> &str {
        "reconstruction"
    }

    fn load(&self, device: &DeviceId) -> Result<Box<dyn ReconstructionModel>, ModelError> {
        let client = WorkerClient::connect(&self.url)?;
        client.load(RECONSTRUCT_MODEL, device)?;

        Ok(Box::new(RemoteReconstructor {
            client,
            device: device.clone(),
        }))
    }

    fn reclaim(&self, device: &DeviceId) -> Result<(), ModelError> {
        WorkerClient::connect(&self.url)?.empty_cache(device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_payload_names_representation_and_channel() {
        let payload = RenderPayload {
            scene_id: "s-1",
            representation: SceneRepresentation::RadianceField,
            channel: RenderChannel::Color,
        };
        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["representation"], "radiance_field");
        assert_eq!(json["channel"], "color");
    }

    #[test]
    fn test_export_payload_carries_glb_settings() {
        let options = GlbOptions::default();
        let payload = ExportPayload {
            scene_id: "s-1",
            simplify: options.simplify,
            texture_size: options.texture_size,
        };
        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["texture_size"], 1024);
        assert!((json["simplify"].as_f64().unwrap() - 0.95).abs() < 1e-6);
    }

    #[test]
    fn test_render_reply_parses() {
        let reply: RenderReply = serde_json::from_str(r#"{"frames": ["a", "b"]}"#).unwrap();
        assert_eq!(reply.frames.len(), 2);
    }
}
