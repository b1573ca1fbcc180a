use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use crate::asset::ImageAsset;

/// Fill used around a padded garment
pub const PAD_FILL: Rgb<u8> = Rgb([255, 255, 255]);

/// Working resolution of the inpainting model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            width: 768,
            height: 1024,
        }
    }
}

impl Geometry {
    /// True when `w:h` is narrower than the target aspect ratio
    fn is_narrower(&self, w: u32, h: u32) -> bool {
        (w as u64) * (self.height as u64) < (self.width as u64) * (h as u64)
    }

    /// Largest centered window of the target aspect ratio inside `w x h`
    pub fn crop_window(&self, w: u32, h: u32) -> (u32, u32, u32, u32) {
        let (crop_w, crop_h) = if self.is_narrower(w, h) {
            (w, scale(w, self.height, self.width).min(h))
        } else {
            (scale(h, self.width, self.height).min(w), h)
        };
        let (crop_w, crop_h) = (crop_w.max(1), crop_h.max(1));

        ((w - crop_w) / 2, (h - crop_h) / 2, crop_w, crop_h)
    }

    /// Size of `w x h` scaled to fit inside the target box, aspect ratio kept
    pub fn fit_within(&self, w: u32, h: u32) -> (u32, u32) {
        let (fit_w, fit_h) = if self.is_narrower(w, h) {
            (scale(w, self.height, h).min(self.width), self.height)
        } else {
            (self.width, scale(h, self.width, w).min(self.height))
        };

        (fit_w.max(1), fit_h.max(1))
    }
}

fn scale(value: u32, num: u32, den: u32) -> u32 {
    ((value as u64) * (num as u64) / (den.max(1) as u64)) as u32
}

/// Normalizes person and garment inputs to the model's geometry.
///
/// The two inputs are treated differently on purpose: the person is cropped to
/// fill the frame, the garment is padded so none of it is lost.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImagePreprocessor {
    geometry: Geometry,
}

impl ImagePreprocessor {
    pub fn prepare_person(&self, person: &ImageAsset) -> ImageAsset {
        resize_and_crop(person.pixels(), self.geometry).into()
    }

    pub fn prepare_garment(&self, garment: &ImageAsset) -> ImageAsset {
        resize_and_pad(garment.pixels(), self.geometry).into()
    }
}

/// Center-crop to the target aspect ratio, then resize to exactly the target size
pub fn resize_and_crop(image: &RgbImage, target: Geometry) -> RgbImage {
    let (x, y, w, h) = target.crop_window(image.width(), image.height());
    let cropped = imageops::crop_imm(image, x, y, w, h).to_image();

    imageops::resize(&cropped, target.width, target.height, FilterType::Lanczos3)
}

/// Resize to fit inside the target box, then center on a `PAD_FILL` canvas
pub fn resize_and_pad(image: &RgbImage, target: Geometry) -> RgbImage {
    let (w, h) = target.fit_within(image.width(), image.height());
    let resized = imageops::resize(image, w, h, FilterType::Lanczos3);

    let mut canvas = RgbImage::from_pixel(target.width, target.height, PAD_FILL);
    let x = (target.width - w) / 2;
    let y = (target.height - h) / 2;
    imageops::overlay(&mut canvas, &resized, x as i64, y as i64);

    canvas
}
