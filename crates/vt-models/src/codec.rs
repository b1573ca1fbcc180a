//! Images cross the worker boundary as base64-encoded PNG.

use std::io::Cursor;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::{GrayImage, ImageFormat, RgbImage};
use vt_core::models::ModelError;

pub fn rgb_to_b64(image: &RgbImage) -> Result<String, ModelError> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|e| ModelError::with_source("Failed to encode image", e))?;
    Ok(STANDARD.encode(bytes))
}

pub fn gray_to_b64(image: &GrayImage) -> Result<String, ModelError> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|e| ModelError::with_source("Failed to encode mask", e))?;
    Ok(STANDARD.encode(bytes))
}

pub fn bytes_from_b64(data: &str) -> Result<Vec<u8>, ModelError> {
    STANDARD
        .decode(data)
        .map_err(|e| ModelError::with_source("Worker sent invalid base64", e))
}

pub fn rgb_from_b64(data: &str) -> Result<RgbImage, ModelError> {
    let bytes = bytes_from_b64(data)?;
    image::load_from_memory(&bytes)
        .map(|i| i.to_rgb8())
        .map_err(|e| ModelError::with_source("Worker sent an undecodable image", e))
}

pub fn gray_from_b64(data: &str) -> Result<GrayImage, ModelError> {
    let bytes = bytes_from_b64(data)?;
    image::load_from_memory(&bytes)
        .map(|i| i.to_luma8())
        .map_err(|e| ModelError::with_source("Worker sent an undecodable mask", e))
}
