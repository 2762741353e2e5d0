pub mod converter;
pub mod noise;
pub mod resizer;

pub use resizer::TextureSize;
