use glam::{Vec2, Vec3, Vec4};
use std::path::Path;
use std::sync::Arc;

pub fn srgb_to_linear(value: f32) -> f32 {
    if value <= 0.04045 {
        value / 12.92
    } else {
        ((value + 0.055) / 1.055).powf(2.4)
    }
}

pub fn linear_to_srgb(value: f32) -> f32 {
    let value = value.max(0.0);
    if value <= 0.003_130_8 {
        value * 12.92
    } else {
        1.055 * value.powf(1.0 / 2.4) - 0.055
    }
}

/// Decoded texture, stored as linear RGBA floats.
#[derive(Debug, Clone)]
pub struct Texture {
    pub image: Arc<image::Rgba32FImage>,
    pub has_alpha: bool,
}

impl Texture {
    /// Loads an image file; colour textures are converted from sRGB.
    pub fn load(path: &Path, srgb: bool) -> Result<Self, image::ImageError> {
        Ok(Self::from_image(image::open(path)?, srgb))
    }

    pub fn from_memory(bytes: &[u8], srgb: bool) -> Result<Self, image::ImageError> {
        Ok(Self::from_image(image::load_from_memory(bytes)?, srgb))
    }

    pub fn from_image(decoded: image::DynamicImage, srgb: bool) -> Self {
        let has_alpha = decoded.color().has_alpha();
        let mut pixels = decoded.to_rgba32f();
        if srgb {
            for pixel in pixels.pixels_mut() {
                for channel in &mut pixel.0[..3] {
                    *channel = srgb_to_linear(*channel);
                }
            }
        }
        Self {
            image: Arc::new(pixels),
            has_alpha,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Bilinear sample with repeat wrapping, `v` pointing up.
    pub fn sample(&self, uv: Vec2) -> Vec4 {
        let (width, height) = self.image.dimensions();
        if width == 0 || height == 0 {
            return Vec4::ONE;
        }
        let x = uv.x.rem_euclid(1.0) * width as f32 - 0.5;
        let y = (1.0 - uv.y.rem_euclid(1.0)) * height as f32 - 0.5;
        let x0 = x.floor();
        let y0 = y.floor();
        let fx = x - x0;
        let fy = y - y0;
        let fetch = |xi: f32, yi: f32| {
            let xi = (xi as i64).rem_euclid(width as i64) as u32;
            let yi = (yi as i64).rem_euclid(height as i64) as u32;
            Vec4::from_array(self.image.get_pixel(xi, yi).0)
        };
        let top = fetch(x0, y0).lerp(fetch(x0 + 1.0, y0), fx);
        let bottom = fetch(x0, y0 + 1.0).lerp(fetch(x0 + 1.0, y0 + 1.0), fx);
        top.lerp(bottom, fy)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadingModel {
    Phong,
    Pbr,
}

/// Surface appearance of an actor. For PBR materials `color` is the linear
/// base colour, for Phong materials it is the sRGB diffuse colour.
#[derive(Debug, Clone)]
pub struct Material {
    pub model: ShadingModel,
    pub color: Vec3,
    pub opacity: f32,
    pub roughness: f32,
    pub metallic: f32,
    pub ambient: f32,
    pub diffuse: f32,
    pub specular: f32,
    pub emissive_factor: Vec3,
    pub normal_scale: f32,
    pub diffuse_texture: Option<Texture>,
    pub base_color_texture: Option<Texture>,
    pub normal_texture: Option<Texture>,
    pub emissive_texture: Option<Texture>,
    /// Occlusion in red, roughness in green, metallic in blue.
    pub orm_texture: Option<Texture>,
    pub matcap_texture: Option<Texture>,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            model: ShadingModel::Pbr,
            color: Vec3::ONE,
            opacity: 1.0,
            roughness: 0.3,
            metallic: 0.0,
            ambient: 0.0,
            diffuse: 1.0,
            specular: 0.0,
            emissive_factor: Vec3::ONE,
            normal_scale: 1.0,
            diffuse_texture: None,
            base_color_texture: None,
            normal_texture: None,
            emissive_texture: None,
            orm_texture: None,
            matcap_texture: None,
        }
    }
}

impl Material {
    pub fn phong(diffuse_color: Vec3) -> Self {
        Self {
            model: ShadingModel::Phong,
            color: diffuse_color,
            ambient: 0.1,
            diffuse: 0.9,
            specular: 0.2,
            ..Self::default()
        }
    }

    /// Converts a Phong material to its physically based counterpart.
    /// Returns false when the material already was PBR.
    pub fn upgrade_to_pbr(&mut self) -> bool {
        if self.model == ShadingModel::Pbr {
            return false;
        }
        self.model = ShadingModel::Pbr;
        self.color = Vec3::new(
            srgb_to_linear(self.color.x),
            srgb_to_linear(self.color.y),
            srgb_to_linear(self.color.z),
        );
        if let Some(texture) = self.diffuse_texture.take() {
            self.base_color_texture = Some(texture);
        }
        self.ambient = 0.0;
        self.diffuse = 1.0;
        self.specular = 0.0;
        true
    }

    pub fn is_translucent(&self) -> bool {
        self.opacity < 1.0
            || self
                .base_color_texture
                .as_ref()
                .map(|texture| texture.has_alpha)
                .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::{linear_to_srgb, srgb_to_linear, Material, ShadingModel, Texture};
    use glam::{Vec2, Vec3};
    use std::sync::Arc;

    fn checker() -> Texture {
        let mut image = image::Rgba32FImage::new(2, 1);
        image.put_pixel(0, 0, image::Rgba([0.0, 0.0, 0.0, 1.0]));
        image.put_pixel(1, 0, image::Rgba([1.0, 1.0, 1.0, 1.0]));
        Texture {
            image: Arc::new(image),
            has_alpha: false,
        }
    }

    #[test]
    fn srgb_conversions_are_inverse() {
        for value in [0.0f32, 0.02, 0.5, 1.0] {
            assert!((linear_to_srgb(srgb_to_linear(value)) - value).abs() < 1e-5);
        }
    }

    #[test]
    fn phong_upgrade_linearizes_and_moves_texture() {
        let mut material = Material::phong(Vec3::splat(0.5));
        material.diffuse_texture = Some(checker());

        assert!(material.upgrade_to_pbr());
        assert_eq!(material.model, ShadingModel::Pbr);
        assert!((material.color.x - 0.214).abs() < 1e-3);
        assert!(material.diffuse_texture.is_none());
        assert!(material.base_color_texture.is_some());
        assert_eq!((material.ambient, material.diffuse, material.specular), (0.0, 1.0, 0.0));
        assert!(!material.upgrade_to_pbr());
    }

    #[test]
    fn texture_sampling_interpolates_between_texels() {
        let texture = checker();
        let left = texture.sample(Vec2::new(0.25, 0.5));
        let middle = texture.sample(Vec2::new(0.5, 0.5));
        assert!(left.x < 1e-5);
        assert!((middle.x - 0.5).abs() < 1e-5);
    }
}
