//! Physically based surface shading, light kit and point sprite shapes.

use super::camera::Camera;
use super::hdri::ImageBasedLighting;
use crate::importer::{Light, LightKind};
use glam::{Vec2, Vec3};
use std::f32::consts::PI;

/// Surface parameters at one fragment. Colours are linear.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceSample {
    pub base_color: Vec3,
    pub opacity: f32,
    pub roughness: f32,
    pub metallic: f32,
    pub occlusion: f32,
    pub emissive: Vec3,
    pub normal: Vec3,
}

impl Default for SurfaceSample {
    fn default() -> Self {
        Self {
            base_color: Vec3::ONE,
            opacity: 1.0,
            roughness: 0.3,
            metallic: 0.0,
            occlusion: 1.0,
            emissive: Vec3::ZERO,
            normal: Vec3::Z,
        }
    }
}

/// Lights resolved to world space plus optional image based lighting.
#[derive(Debug, Clone)]
pub struct LightingEnvironment<'a> {
    pub lights: Vec<Light>,
    pub ibl: Option<ImageBasedLighting<'a>>,
    pub eye: Vec3,
    /// Ambient term used without image based lighting.
    pub ambient: f32,
}

impl<'a> LightingEnvironment<'a> {
    pub fn new(lights: Vec<Light>, eye: Vec3) -> Self {
        Self {
            lights,
            ibl: None,
            eye,
            ambient: 0.05,
        }
    }
}

fn direction_around(camera: &Camera, elevation: f32, azimuth: f32) -> Vec3 {
    let forward = camera.direction_of_projection();
    let right = camera.right();
    let up = right.cross(forward).normalize_or_zero();
    let (elevation, azimuth) = (elevation.to_radians(), azimuth.to_radians());
    let toward_camera = -forward;
    (elevation.cos() * (azimuth.sin() * right + azimuth.cos() * toward_camera)
        + elevation.sin() * up)
        .normalize_or_zero()
}

/// Key, fill, two back lights and a headlight, attached to the camera.
pub fn light_kit(camera: &Camera) -> Vec<Light> {
    let key_intensity = 0.75;
    let placed = [
        (50.0, 10.0, key_intensity),
        (-75.0, -10.0, key_intensity / 3.0),
        (0.0, 110.0, key_intensity / 3.5),
        (0.0, -110.0, key_intensity / 3.5),
        (0.0, 0.0, key_intensity / 3.0),
    ];
    placed
        .iter()
        .map(|&(elevation, azimuth, intensity)| Light {
            kind: LightKind::Directional,
            position: camera.position,
            direction: -direction_around(camera, elevation, azimuth),
            color: Vec3::ONE,
            intensity,
        })
        .collect()
}

fn distribution_ggx(n_dot_h: f32, roughness: f32) -> f32 {
    let a = roughness * roughness;
    let a2 = a * a;
    let denominator = n_dot_h * n_dot_h * (a2 - 1.0) + 1.0;
    a2 / (PI * denominator * denominator).max(1e-6)
}

fn geometry_schlick(n_dot_x: f32, roughness: f32) -> f32 {
    let r = roughness + 1.0;
    let k = r * r / 8.0;
    n_dot_x / (n_dot_x * (1.0 - k) + k)
}

fn fresnel_schlick(cos_theta: f32, f0: Vec3) -> Vec3 {
    f0 + (Vec3::ONE - f0) * (1.0 - cos_theta).clamp(0.0, 1.0).powi(5)
}

/// Incoming direction and radiance of a light at `position`.
fn incoming(light: &Light, position: Vec3) -> Option<(Vec3, Vec3)> {
    let radiance = light.color * light.intensity;
    match light.kind {
        LightKind::Directional => Some((-light.direction.normalize_or_zero(), radiance)),
        LightKind::Point => Some(((light.position - position).normalize_or_zero(), radiance)),
        LightKind::Spot { cone_angle } => {
            let to_light = (light.position - position).normalize_or_zero();
            let cos = (-to_light).dot(light.direction.normalize_or_zero());
            (cos >= cone_angle.to_radians().cos()).then_some((to_light, radiance))
        }
    }
}

/// Outgoing linear radiance toward the eye.
pub fn shade(sample: &SurfaceSample, position: Vec3, environment: &LightingEnvironment<'_>) -> Vec3 {
    let n = sample.normal.normalize_or_zero();
    let v = (environment.eye - position).normalize_or_zero();
    let n_dot_v = n.dot(v).max(1e-4);
    let roughness = sample.roughness.clamp(0.03, 1.0);
    let f0 = Vec3::splat(0.04).lerp(sample.base_color, sample.metallic);
    let diffuse_color = sample.base_color * (1.0 - sample.metallic);

    let mut radiance = Vec3::ZERO;
    for light in &environment.lights {
        let Some((l, light_radiance)) = incoming(light, position) else {
            continue;
        };
        let n_dot_l = n.dot(l);
        if n_dot_l <= 0.0 {
            continue;
        }
        let h = (l + v).normalize_or_zero();
        let f = fresnel_schlick(h.dot(v).max(0.0), f0);
        let d = distribution_ggx(n.dot(h).max(0.0), roughness);
        let g = geometry_schlick(n_dot_v, roughness) * geometry_schlick(n_dot_l, roughness);
        let specular = f * (d * g / (4.0 * n_dot_v * n_dot_l).max(1e-4));
        let kd = (Vec3::ONE - f) * diffuse_color;
        radiance += (kd + specular * PI) * light_radiance * n_dot_l;
    }

    let ambient = match &environment.ibl {
        Some(ibl) => {
            let f = fresnel_schlick(n_dot_v, f0);
            let diffuse = ibl.sh.irradiance(n) * diffuse_color * (Vec3::ONE - f);
            let reflected = -v + 2.0 * n.dot(v) * n;
            let brdf = ibl.lut.lookup(n_dot_v, roughness);
            let specular = ibl.specular.sample(reflected, roughness) * (f0 * brdf.x + Vec3::splat(brdf.y));
            (diffuse + specular) * sample.occlusion
        }
        None => sample.base_color * environment.ambient * sample.occlusion,
    };
    radiance + ambient + sample.emissive
}

/// Matcap lookup coordinates of a world space normal.
pub fn matcap_uv(camera: &Camera, normal: Vec3) -> Vec2 {
    let view = camera.view_matrix().transform_vector3(normal).normalize_or_zero();
    Vec2::new(view.x * 0.5 + 0.5, view.y * 0.5 + 0.5)
}

/// Shape of point sprites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpriteShape {
    Sphere,
    Gaussian,
    Circle,
}

impl SpriteShape {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "sphere" => Some(Self::Sphere),
            "gaussian" => Some(Self::Gaussian),
            "circle" => Some(Self::Circle),
            _ => None,
        }
    }

    /// Coverage at sprite coordinates `p` in `[-1, 1]`, with the bulge of the
    /// sphere in camera space. `None` discards the fragment.
    pub fn coverage(self, p: Vec2) -> Option<(f32, Vec3)> {
        let r2 = p.length_squared();
        match self {
            Self::Circle if r2 <= 1.0 => Some((1.0, Vec3::Z)),
            Self::Sphere if r2 <= 1.0 => Some((1.0, Vec3::new(p.x, p.y, (1.0 - r2).sqrt()))),
            Self::Gaussian => {
                let alpha = (-4.0 * r2).exp();
                (alpha > 1.0 / 255.0).then_some((alpha, Vec3::Z))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{light_kit, shade, LightingEnvironment, SpriteShape, SurfaceSample};
    use crate::importer::Light;
    use crate::render::camera::Camera;
    use glam::{Vec2, Vec3};

    #[test]
    fn lit_side_is_brighter_than_unlit_side() {
        let environment = LightingEnvironment::new(vec![Light::headlight()], Vec3::new(0.0, 0.0, 5.0));
        let facing = SurfaceSample {
            normal: Vec3::Z,
            ..SurfaceSample::default()
        };
        let away = SurfaceSample {
            normal: Vec3::NEG_Z,
            ..SurfaceSample::default()
        };
        let lit = shade(&facing, Vec3::ZERO, &environment);
        let unlit = shade(&away, Vec3::ZERO, &environment);
        assert!(lit.x > unlit.x);
        assert!(unlit.x <= 0.05 + 1e-6);
    }

    #[test]
    fn light_kit_key_light_comes_from_above() {
        let mut camera = Camera::new();
        camera.position = Vec3::new(0.0, 0.0, 10.0);
        let lights = light_kit(&camera);
        assert_eq!(lights.len(), 5);
        assert!(lights[0].direction.y < 0.0);
        let head = lights[4].direction;
        assert!(head.z < -0.99);
    }

    #[test]
    fn sprite_shapes() {
        assert_eq!(SpriteShape::parse("gaussian"), Some(SpriteShape::Gaussian));
        assert_eq!(SpriteShape::parse("square"), None);
        assert!(SpriteShape::Circle.coverage(Vec2::new(0.9, 0.9)).is_none());
        let (_, bulge) = SpriteShape::Sphere.coverage(Vec2::ZERO).unwrap_or_default();
        assert_eq!(bulge, Vec3::Z);
        let (center, _) = SpriteShape::Gaussian.coverage(Vec2::ZERO).unwrap_or_default();
        let (edge, _) = SpriteShape::Gaussian.coverage(Vec2::new(0.7, 0.0)).unwrap_or_default();
        assert!(center > edge);
    }
}
