//! Solid color swatches as indexed PNG

use png::{BitDepth, ColorType, Encoder};
use std::io::Cursor;

use crate::color::Rgb;
use crate::error::AppError;

/// Edge length used when a request does not give one
pub const DEFAULT_SWATCH_SIZE: u32 = 64;
pub const MAX_SWATCH_SIZE: u32 = 1024;

/// Encode a `size` x `size` single-color PNG with a one-entry palette
pub fn render_swatch(color: Rgb, size: u32) -> Result<Vec<u8>, AppError> {
    if size == 0 || size > MAX_SWATCH_SIZE {
        return Err(AppError::InvalidInput(format!(
            "swatch size {} outside 1..={}",
            size, MAX_SWATCH_SIZE
        )));
    }

    let indexed = vec![0u8; (size * size) as usize];
    let mut output = Vec::new();

    {
        let mut encoder = Encoder::new(Cursor::new(&mut output), size, size);
        encoder.set_color(ColorType::Indexed);
        encoder.set_depth(BitDepth::Eight);
        encoder.set_palette(vec![color.r, color.g, color.b]);

        let mut writer = encoder
            .write_header()
            .map_err(|e| AppError::ImageProcessing(format!("PNG header error: {}", e)))?;

        writer
            .write_image_data(&indexed)
            .map_err(|e| AppError::ImageProcessing(format!("PNG write error: {}", e)))?;
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{LoadedImage, PixelSource};

    #[test]
    fn test_swatch_decodes_to_solid_color() {
        let color = Rgb::new(200, 50, 50);
        let bytes = render_swatch(color, 8).unwrap();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");

        let img = LoadedImage::decode(&bytes).unwrap();
        assert_eq!(img.dimensions(), (8, 8));
        assert_eq!(img.pixel_at(0, 0), Some(color));
        assert_eq!(img.pixel_at(7, 7), Some(color));
    }

    #[test]
    fn test_rejects_bad_size() {
        assert!(matches!(render_swatch(Rgb::new(0, 0, 0), 0), Err(AppError::InvalidInput(_))));
        assert!(render_swatch(Rgb::new(0, 0, 0), MAX_SWATCH_SIZE + 1).is_err());
    }
}
