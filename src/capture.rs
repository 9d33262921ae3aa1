//! Pixel capture from decoded images
//!
//! Images are decoded once on upload and kept as 8-bit RGB. Cursor positions
//! reported by a viewer are mapped back to source pixels assuming the viewer
//! fits the whole image, preserving aspect ratio, centered.

use image::RgbImage;

use crate::color::Rgb;
use crate::error::AppError;

/// Anything that can hand out the color at a position
pub trait PixelSource {
    /// `None` outside the source
    fn pixel_at(&self, x: u32, y: u32) -> Option<Rgb>;
}

#[derive(Debug, Clone)]
pub struct LoadedImage {
    pixels: RgbImage,
}

impl LoadedImage {
    /// Decode PNG, JPEG, BMP or TIFF bytes
    pub fn decode(bytes: &[u8]) -> Result<Self, AppError> {
        let img = image::load_from_memory(bytes)
            .map_err(|e| AppError::ImageProcessing(format!("Failed to decode image: {}", e)))?;
        let loaded = Self::from_rgb_image(img.to_rgb8());

        let (w, h) = loaded.dimensions();
        tracing::info!("Loaded {}x{} image", w, h);
        Ok(loaded)
    }

    pub fn from_rgb_image(pixels: RgbImage) -> Self {
        Self { pixels }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    /// Pixel under `(x, y)` in a `view_width` x `view_height` viewer
    pub fn pixel_at_view(&self, x: f64, y: f64, view_width: u32, view_height: u32) -> Option<Rgb> {
        let (sx, sy) = self.view_to_source(x, y, view_width, view_height)?;
        self.pixel_at(sx, sy)
    }

    /// Map viewer coordinates to source pixel coordinates
    pub fn view_to_source(
        &self,
        x: f64,
        y: f64,
        view_width: u32,
        view_height: u32,
    ) -> Option<(u32, u32)> {
        let (src_width, src_height) = self.dimensions();
        if view_width == 0 || view_height == 0 || src_width == 0 || src_height == 0 {
            return None;
        }
        if !x.is_finite() || !y.is_finite() {
            return None;
        }

        // Contain: the smaller of the two scales fits the whole image
        let scale_x = view_width as f64 / src_width as f64;
        let scale_y = view_height as f64 / src_height as f64;
        let scale = scale_x.min(scale_y);

        let offset_x = (view_width as f64 - src_width as f64 * scale) / 2.0;
        let offset_y = (view_height as f64 - src_height as f64 * scale) / 2.0;

        let sx = ((x - offset_x) / scale).floor();
        let sy = ((y - offset_y) / scale).floor();
        if sx < 0.0 || sy < 0.0 || sx >= src_width as f64 || sy >= src_height as f64 {
            return None;
        }
        Some((sx as u32, sy as u32))
    }
}

impl PixelSource for LoadedImage {
    fn pixel_at(&self, x: u32, y: u32) -> Option<Rgb> {
        self.pixels
            .get_pixel_checked(x, y)
            .map(|p| Rgb::new(p[0], p[1], p[2]))
    }
}
