//! Materials and decoded image data.

use image::RgbaImage;

use super::ImageId;

#[derive(Debug, Clone)]
pub struct Material {
    pub name: String,
    pub base_color_factor: [f32; 4],
    pub emissive_factor: [f32; 3],
    pub metallic_factor: f32,
    pub roughness_factor: f32,
    pub base_color_texture: Option<ImageId>,
    pub emissive_texture: Option<ImageId>,
}

impl Material {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_color_factor: [1.0, 1.0, 1.0, 1.0],
            emissive_factor: [0.0, 0.0, 0.0],
            metallic_factor: 0.0,
            roughness_factor: 1.0,
            base_color_texture: None,
            emissive_texture: None,
        }
    }
}

impl Default for Material {
    fn default() -> Self {
        Self::new("default")
    }
}

/// A decoded texture image (always RGBA8 in memory).
#[derive(Debug, Clone)]
pub struct ImageData {
    pub name: String,
    pub pixels: RgbaImage,
}

impl ImageData {
    pub fn new(name: impl Into<String>, pixels: RgbaImage) -> Self {
        Self {
            name: name.into(),
            pixels,
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }
}
