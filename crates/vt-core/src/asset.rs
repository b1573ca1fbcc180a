use std::path::Path;
use image::RgbImage;
use crate::error::{PipelineError, Result};

/// Decoded raster in canonical RGB, owned by a single request
#[derive(Debug, Clone, PartialEq)]
pub struct ImageAsset {
    pixels: RgbImage,
}

impl ImageAsset {
    /// Decode an uploaded image. `role` names the input in the error ("person", "garment").
    pub fn decode(bytes: &[u8], role: &'static str) -> Result<Self> {
        let decoded = image::load_from_memory(bytes)
            .map_err(|source| PipelineError::InvalidImage { role, source })?;

        Ok(Self { pixels: decoded.to_rgb8() })
    }

    pub fn open(path: &Path, role: &'static str) -> Result<Self> {
        let decoded = image::open(path)
            .map_err(|source| PipelineError::InvalidImage { role, source })?;

        Ok(Self { pixels: decoded.to_rgb8() })
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }
}

impl From<RgbImage> for ImageAsset {
    fn from(pixels: RgbImage) -> Self {
        Self { pixels }
    }
}
