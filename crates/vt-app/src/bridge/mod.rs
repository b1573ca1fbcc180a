//! Client side of the two-stage pipeline.
//!
//! The bridge calls the swap service, remembers its result in a `Session`
//! and hands that result to the reconstruction service. References are
//! always re-derived into `parent-dir/filename` form before crossing to the
//! other service, because the two processes may have different roots.

mod session;

use std::path::PathBuf;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::info;
use vt_core::artifact::ArtifactRef;
use vt_core::{GarmentCategory, ReconstructionModality};
use crate::backend::schemas::{ErrorBody, ProcessImageRequest, ProcessImageResponse, SwapResponse};
use crate::config::BridgeConfig;

pub use session::Session;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("No garment swap result in this session yet")]
    NoSwapResult,

    #[error("'{0}' does not name a file")]
    InvalidReference(String),

    #[error("{requested} is not this session's garment swap result ({current})")]
    ForeignArtifact { requested: ArtifactRef, current: ArtifactRef },

    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status} ({code}): {detail}")]
    Service {
        url: String,
        status: u16,
        code: String,
        detail: String,
    },
}

pub struct PipelineBridge {
    http: Client,
    config: BridgeConfig,
    session: Session,
}

impl PipelineBridge {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            http: Client::new(),
            config,
            session: Session::default(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn reset(&mut self) {
        self.session.reset();
    }

    /// Where a reference lives under this side's image root
    pub fn local_path(&self, reference: &ArtifactRef) -> PathBuf {
        self.config.image_root.join(reference.as_str())
    }

    /// Take an existing garment swap result as this session's stage-one output
    pub fn adopt(&mut self, artifact: &str) -> Result<ArtifactRef, BridgeError> {
        let reference = to_reference(artifact)?;
        self.session.record_swap(reference.clone());
        Ok(reference)
    }

    /// Swap a garment onto a person. On failure the session is cleared, so
    /// an older result cannot be reconstructed by mistake.
    pub async fn run_garment_swap(
        &mut self,
        person: Vec<u8>,
        garment: Vec<u8>,
        category: GarmentCategory,
        mask: Option<Vec<u8>>,
    ) -> Result<ArtifactRef, BridgeError> {
        let swapped = self.swap(person, garment, category, mask).await;
        match &swapped {
            Ok(reference) => self.session.record_swap(reference.clone()),
            Err(_) => self.session.reset(),
        }
        swapped
    }

    async fn swap(
        &self,
        person: Vec<u8>,
        garment: Vec<u8>,
        category: GarmentCategory,
        mask: Option<Vec<u8>>,
    ) -> Result<ArtifactRef, BridgeError> {
        let url = format!("{}/swap", self.config.swap_url.trim_end_matches('/'));

        let mut form = Form::new()
            .part("person_image", Part::bytes(person).file_name("person.png"))
            .part("cloth_image", Part::bytes(garment).file_name("cloth.png"))
            .text("cloth_type", category.id());
        if let Some(mask) = mask {
            form = form.part("mask", Part::bytes(mask).file_name("mask.png"));
        }

        let response = self
            .http
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|source| BridgeError::Transport { url: url.clone(), source })?;
        let reply: SwapResponse = read_reply(&url, response).await?;

        let reference = to_reference(&reply.output_path)?;
        info!(%reference, %category, "Garment swap finished");
        Ok(reference)
    }

    /// Reconstruct the session's latest swap result
    pub async fn run_reconstruction(&mut self, modality: ReconstructionModality) -> Result<ArtifactRef, BridgeError> {
        let source = self.session.last_swap().ok_or(BridgeError::NoSwapResult)?.clone();
        self.reconstruct(source, modality).await
    }

    /// Reconstruct the session's swap result, named in absolute, relative or
    /// reference form as the front end last saw it
    pub async fn run_reconstruction_from(
        &mut self,
        artifact: &str,
        modality: ReconstructionModality,
    ) -> Result<ArtifactRef, BridgeError> {
        let current = self.session.last_swap().ok_or(BridgeError::NoSwapResult)?.clone();
        let requested = to_reference(artifact)?;
        if requested != current {
            return Err(BridgeError::ForeignArtifact { requested, current });
        }
        self.reconstruct(requested, modality).await
    }

    async fn reconstruct(
        &mut self,
        source: ArtifactRef,
        modality: ReconstructionModality,
    ) -> Result<ArtifactRef, BridgeError> {
        let url = format!("{}/process-image", self.config.recon_url.trim_end_matches('/'));
        let body = ProcessImageRequest {
            image_path: source.to_string(),
            return_type: modality.id().to_string(),
        };

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|source| BridgeError::Transport { url: url.clone(), source })?;
        let reply: ProcessImageResponse = read_reply(&url, response).await?;

        let reference = to_reference(&reply.output_path)?;
        info!(%source, %reference, %modality, "Reconstruction finished");

        self.session.record_reconstruction(reference.clone());
        Ok(reference)
    }
}

fn to_reference(path: &str) -> Result<ArtifactRef, BridgeError> {
    ArtifactRef::from_path_like(path).ok_or_else(|| BridgeError::InvalidReference(path.to_string()))
}

async fn read_reply<T: DeserializeOwned>(url: &str, response: Response) -> Result<T, BridgeError> {
    let status = response.status();

    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        let (code, detail) = match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => (body.error, body.detail),
            Err(_) => ("unknown_error".to_string(), text),
        };
        return Err(BridgeError::Service {
            url: url.to_string(),
            status: status.as_u16(),
            code,
            detail,
        });
    }

    response
        .json()
        .await
        .map_err(|source| BridgeError::Transport { url: url.to_string(), source })
}
