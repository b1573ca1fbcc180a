use image::imageops::{self, FilterType};
use image::GrayImage;
use tracing::debug;
use crate::asset::ImageAsset;
use crate::error::MaskResolutionError;
use crate::model_types::GarmentCategory;
use crate::models::SegmentationModel;

/// Edge softening applied to every resolved mask, in pixels of the working grid
pub const MASK_BLUR_RADIUS: f32 = 9.0;

/// Single-channel map of the person pixels eligible for regeneration
#[derive(Debug, Clone, PartialEq)]
pub struct RegionMask {
    pixels: GrayImage,
    blur_radius: f32,
}

impl RegionMask {
    pub fn pixels(&self) -> &GrayImage {
        &self.pixels
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn blur_radius(&self) -> f32 {
        self.blur_radius
    }
}

/// Where a resolved mask came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskSource {
    User,
    Segmentation,
}

#[derive(Debug, Clone, Copy)]
pub struct MaskResolver {
    blur_radius: f32,
}

impl Default for MaskResolver {
    fn default() -> Self {
        Self { blur_radius: MASK_BLUR_RADIUS }
    }
}

impl MaskResolver {
    /// Produce a mask matching `person` exactly, from the user's upload when
    /// present, otherwise from the segmentation model.
    pub fn resolve(
        &self,
        person: &ImageAsset,
        category: GarmentCategory,
        user_mask: Option<&[u8]>,
        segmenter: &dyn SegmentationModel,
    ) -> Result<RegionMask, MaskResolutionError> {
        match user_mask {
            Some(bytes) => self.from_user(person, bytes),
            None => self.from_segmentation(person, category, segmenter),
        }
    }

    /// Mask drawn or uploaded by the user. Needs no model, so callers can
    /// reject a bad upload before paying for a model load.
    pub fn from_user(&self, person: &ImageAsset, bytes: &[u8]) -> Result<RegionMask, MaskResolutionError> {
        let raw = decode_user_mask(bytes)?;
        Ok(self.finish(raw, person, MaskSource::User))
    }

    pub fn from_segmentation(
        &self,
        person: &ImageAsset,
        category: GarmentCategory,
        segmenter: &dyn SegmentationModel,
    ) -> Result<RegionMask, MaskResolutionError> {
        let raw = segmenter
            .segment(person.pixels(), category)
            .map_err(MaskResolutionError::Segmentation)?;
        debug!(%category, "Segmentation mask received");

        Ok(self.finish(raw, person, MaskSource::Segmentation))
    }

    fn finish(&self, raw: GrayImage, person: &ImageAsset, source: MaskSource) -> RegionMask {
        debug!(?source, width = raw.width(), height = raw.height(), "Fitting mask to person");

        let fitted = fit_to(raw, person.dimensions());
        RegionMask {
            pixels: imageproc::filter::gaussian_blur_f32(&fitted, self.blur_radius),
            blur_radius: self.blur_radius,
        }
    }
}

fn decode_user_mask(bytes: &[u8]) -> Result<GrayImage, MaskResolutionError> {
    let mask = image::load_from_memory(bytes)?.to_luma8();

    if mask.pixels().all(|p| p.0[0] == 0) {
        return Err(MaskResolutionError::Empty);
    }

    Ok(mask)
}

/// Resample to `(width, height)` unless already that size
fn fit_to(mask: GrayImage, (width, height): (u32, u32)) -> GrayImage {
    if mask.dimensions() == (width, height) {
        mask
    } else {
        imageops::resize(&mask, width, height, FilterType::Lanczos3)
    }
}
