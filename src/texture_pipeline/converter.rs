use std::io::Cursor;
use std::path::Path;

use anyhow::Context;
use image::{ImageFormat, RgbaImage};

use super::resizer;

/// Options applied when a baked texture is written out.
#[derive(Debug, Clone)]
pub struct TextureOutputOptions {
    /// Halve alpha to counter the GS doubling it on blend.
    pub correct_for_alpha_bloom: bool,
    /// Maximum texture dimension (width or height).
    pub max_dimension: u32,
}

impl Default for TextureOutputOptions {
    fn default() -> Self {
        Self {
            correct_for_alpha_bloom: false,
            max_dimension: 1024,
        }
    }
}

/// Result of preparing a texture for output.
#[derive(Debug)]
pub struct PreparedTexture {
    pub image: RgbaImage,
    pub original_width: u32,
    pub original_height: u32,
    pub was_resized: bool,
    pub alpha_corrected: bool,
}

/// Clamp to the max dimension (power of two) and apply alpha correction.
pub fn prepare_texture(img: &RgbaImage, options: &TextureOutputOptions) -> PreparedTexture {
    let (original_width, original_height) = img.dimensions();
    let mut out = img.clone();
    let mut was_resized = false;

    let longest = original_width.max(original_height);
    if longest > options.max_dimension {
        let max = resizer::prev_power_of_two(options.max_dimension).max(1);
        let scale = max as f32 / longest as f32;
        let w = resizer::prev_power_of_two(((original_width as f32 * scale) as u32).max(1));
        let h = resizer::prev_power_of_two(((original_height as f32 * scale) as u32).max(1));
        out = image::imageops::resize(&out, w, h, image::imageops::FilterType::Triangle);
        was_resized = true;
    }

    if options.correct_for_alpha_bloom {
        for px in out.pixels_mut() {
            px[3] /= 2;
        }
    }

    PreparedTexture {
        image: out,
        original_width,
        original_height,
        was_resized,
        alpha_corrected: options.correct_for_alpha_bloom,
    }
}

/// Encode as PNG into memory.
pub fn encode_png(img: &RgbaImage) -> anyhow::Result<Vec<u8>> {
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .context("Failed to encode PNG")?;
    Ok(bytes)
}

/// Prepare and save a texture as PNG, creating parent directories.
pub fn save_png(
    img: &RgbaImage,
    output_path: &Path,
    options: &TextureOutputOptions,
) -> anyhow::Result<PreparedTexture> {
    let prepared = prepare_texture(img, options);
    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    prepared
        .image
        .save_with_format(output_path, ImageFormat::Png)
        .with_context(|| format!("Failed to write texture {}", output_path.display()))?;
    Ok(prepared)
}

/// Load any supported image file as RGBA8.
pub fn load_rgba(path: &Path) -> anyhow::Result<RgbaImage> {
    let img = image::open(path).with_context(|| format!("Failed to open image {}", path.display()))?;
    Ok(img.to_rgba8())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use tempfile::TempDir;

    #[test]
    fn alpha_bloom_halves_alpha() {
        let img = RgbaImage::from_pixel(4, 4, Rgba([10, 20, 30, 200]));
        let options = TextureOutputOptions {
            correct_for_alpha_bloom: true,
            ..Default::default()
        };
        let out = prepare_texture(&img, &options);
        assert!(out.alpha_corrected);
        assert!(!out.was_resized);
        assert_eq!(out.image.get_pixel(1, 1), &Rgba([10, 20, 30, 100]));
    }

    #[test]
    fn oversized_texture_is_clamped() {
        let img = RgbaImage::new(256, 128);
        let options = TextureOutputOptions {
            max_dimension: 100,
            ..Default::default()
        };
        let out = prepare_texture(&img, &options);
        assert!(out.was_resized);
        assert_eq!(out.image.dimensions(), (64, 32));
        assert_eq!((out.original_width, out.original_height), (256, 128));
    }

    #[test]
    fn png_bytes_have_signature() {
        let img = RgbaImage::from_pixel(2, 2, Rgba([1, 2, 3, 4]));
        let bytes = encode_png(&img).unwrap();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn save_and_reload() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("tex.png");
        let img = RgbaImage::from_pixel(8, 8, Rgba([255, 0, 0, 255]));
        save_png(&img, &path, &TextureOutputOptions::default()).unwrap();

        let loaded = load_rgba(&path).unwrap();
        assert_eq!(loaded.dimensions(), (8, 8));
        assert_eq!(loaded.get_pixel(0, 0), &Rgba([255, 0, 0, 255]));
    }
}
