use image::imageops::FilterType;
use image::RgbaImage;
use serde::{Deserialize, Serialize};

/// Power-of-two edge length of a baked texture, `2^(5 + variant)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TextureSize {
    #[serde(rename = "32")]
    _32,
    #[serde(rename = "64")]
    _64,
    #[serde(rename = "128")]
    _128,
    #[serde(rename = "256")]
    _256,
    #[serde(rename = "512")]
    _512,
    #[serde(rename = "1024")]
    _1024,
}

impl TextureSize {
    pub fn pixels(self) -> u32 {
        1 << (5 + self as u32)
    }

    /// Largest size not above `pixels`, floored at 32.
    pub fn from_pixels(pixels: u32) -> Self {
        match prev_power_of_two(pixels) {
            0..=32 => TextureSize::_32,
            64 => TextureSize::_64,
            128 => TextureSize::_128,
            256 => TextureSize::_256,
            512 => TextureSize::_512,
            _ => TextureSize::_1024,
        }
    }
}

impl Default for TextureSize {
    fn default() -> Self {
        TextureSize::_64
    }
}

/// Compute the previous power of two <= n.
pub fn prev_power_of_two(n: u32) -> u32 {
    if n == 0 {
        return 0;
    }
    let next = n.next_power_of_two();
    if next == n {
        n
    } else {
        next / 2
    }
}

/// Check if a dimension is a power of two.
pub fn is_power_of_two(n: u32) -> bool {
    n > 0 && (n & (n - 1)) == 0
}

/// Resize to a square of `size` pixels. Images already that size are cloned as-is.
pub fn fit_square(img: &RgbaImage, size: u32) -> RgbaImage {
    if img.width() == size && img.height() == size {
        return img.clone();
    }
    image::imageops::resize(img, size, size, FilterType::Triangle)
}
