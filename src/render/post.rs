//! Image space effects applied to framebuffer layers.

use super::raster::{premultiplied_convert, Layer};
use crate::importer::{linear_to_srgb, srgb_to_linear};
use glam::{Mat4, Vec2, Vec3, Vec4, Vec4Swizzles};

/// Averages `samples` taps along `direction`, starting at the pixel itself.
fn directional_blur(layer: &Layer, direction: Vec2, radius: f32) -> Layer {
    let (width, height) = (layer.width(), layer.height());
    let mut out = layer.clone();
    if width == 0 || height == 0 || radius < 1.0 {
        return out;
    }
    let samples = radius.ceil() as u32;
    let step = direction.normalize_or_zero() * (radius / samples as f32);
    let size = Vec2::new(width as f32, height as f32);
    for y in 0..height {
        for x in 0..width {
            let origin = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
            let mut sum = Vec4::ZERO;
            for i in 0..samples {
                sum += layer.sample((origin + step * (i as f32 + 0.5)) / size);
            }
            out.color[(y * width + x) as usize] = sum / samples as f32;
        }
    }
    out
}

/// Hexagonal bokeh built from three rhombus shaped blurs.
pub fn hexagonal_bokeh_blur(layer: &mut Layer, circle_of_confusion: f32) {
    if circle_of_confusion < 1.0 {
        return;
    }
    let up = Vec2::new(0.0, -1.0);
    let down_left = Vec2::new(-(30f32.to_radians().cos()), 0.5);
    let down_right = Vec2::new(30f32.to_radians().cos(), 0.5);

    let vertical = directional_blur(layer, up, circle_of_confusion);
    let diagonal = directional_blur(layer, down_left, circle_of_confusion);
    let mut combined = vertical.clone();
    for (target, extra) in combined.color.iter_mut().zip(&diagonal.color) {
        *target += *extra;
    }
    let rhombus_a = directional_blur(&vertical, down_left, circle_of_confusion);
    let rhombus_b = directional_blur(&combined, down_right, circle_of_confusion);
    for ((target, a), b) in layer
        .color
        .iter_mut()
        .zip(&rhombus_a.color)
        .zip(&rhombus_b.color)
    {
        *target = (*a + *b) / 3.0;
    }
}

fn kernel_sample(index: u32) -> Vec3 {
    // Deterministic points in the unit ball, denser near the center.
    let golden = 0.618_034_f32;
    let u = (index as f32 * golden).fract();
    let v = (index as f32 * golden * golden + 0.5).fract();
    let theta = 2.0 * std::f32::consts::PI * u;
    let z = 2.0 * v - 1.0;
    let r = (1.0 - z * z).max(0.0).sqrt();
    let scale = (index as f32 + 1.0) / 64.0;
    Vec3::new(r * theta.cos(), r * theta.sin(), z) * (0.1 + 0.9 * scale * scale).min(1.0)
}

/// Darkens opaque pixels by the fraction of nearby kernel samples hidden by
/// the depth buffer. `radius` and `bias` are in view space units.
pub fn ambient_occlusion(layer: &mut Layer, projection: Mat4, radius: f32, bias: f32, kernel_size: u32) {
    let (width, height) = (layer.width(), layer.height());
    if width == 0 || height == 0 || radius <= 0.0 || kernel_size == 0 {
        return;
    }
    let inverse = projection.inverse();
    let view_position = |x: f32, y: f32, depth: f32| {
        let ndc = Vec4::new(
            x / width as f32 * 2.0 - 1.0,
            1.0 - y / height as f32 * 2.0,
            depth,
            1.0,
        );
        let view = inverse * ndc;
        view.xyz() / view.w
    };
    let kernel: Vec<Vec3> = (0..kernel_size).map(kernel_sample).collect();
    let depth = layer.depth.clone();
    for y in 0..height {
        for x in 0..width {
            let index = (y * width + x) as usize;
            if depth[index] >= 1.0 {
                continue;
            }
            let center = view_position(x as f32 + 0.5, y as f32 + 0.5, depth[index]);
            let mut occluded = 0u32;
            let mut tested = 0u32;
            for offset in &kernel {
                let sample = center + *offset * radius;
                let clip = projection * sample.extend(1.0);
                if clip.w <= 1e-6 {
                    continue;
                }
                let ndc = clip.xyz() / clip.w;
                let sx = ((ndc.x * 0.5 + 0.5) * width as f32) as i64;
                let sy = ((0.5 - ndc.y * 0.5) * height as f32) as i64;
                if sx < 0 || sy < 0 || sx >= width as i64 || sy >= height as i64 {
                    continue;
                }
                tested += 1;
                let scene_depth = depth[(sy as u32 * width + sx as u32) as usize];
                if scene_depth >= 1.0 {
                    continue;
                }
                let scene = view_position(sx as f32 + 0.5, sy as f32 + 0.5, scene_depth);
                // View space looks down -Z: larger z is closer to the eye.
                let range = (radius / (center.z - scene.z).abs().max(1e-6)).min(1.0);
                if scene.z >= sample.z + bias {
                    occluded += u32::from(range > 0.5);
                }
            }
            if tested > 0 {
                let visibility = 1.0 - occluded as f32 / tested as f32;
                let color = layer.color[index];
                layer.color[index] = Vec4::new(
                    color.x * visibility,
                    color.y * visibility,
                    color.z * visibility,
                    color.w,
                );
            }
        }
    }
}

/// Generic filmic curve with its default preset.
#[derive(Debug, Clone, Copy)]
pub struct FilmicCurve {
    contrast: f32,
    shoulder: f32,
    b: f32,
    c: f32,
}

impl Default for FilmicCurve {
    fn default() -> Self {
        Self::new(1.6773, 0.9714, 0.18, 0.18, 11.0785)
    }
}

impl FilmicCurve {
    pub fn new(contrast: f32, shoulder: f32, mid_in: f32, mid_out: f32, hdr_max: f32) -> Self {
        let ad = contrast * shoulder;
        let denominator = (hdr_max.powf(ad) - mid_in.powf(ad)) * mid_out;
        let b = (-mid_in.powf(contrast) + hdr_max.powf(contrast) * mid_out) / denominator;
        let c = (hdr_max.powf(ad) * mid_in.powf(contrast)
            - hdr_max.powf(contrast) * mid_in.powf(ad) * mid_out)
            / denominator;
        Self { contrast, shoulder, b, c }
    }

    pub fn apply(&self, x: f32) -> f32 {
        let x = x.max(0.0);
        let numerator = x.powf(self.contrast);
        let denominator = x.powf(self.contrast * self.shoulder) * self.b + self.c;
        if denominator <= 0.0 {
            0.0
        } else {
            (numerator / denominator).clamp(0.0, 1.0)
        }
    }
}

/// Tone maps an sRGB encoded layer in linear space.
pub fn tone_map(layer: &mut Layer, curve: &FilmicCurve) {
    for color in &mut layer.color {
        let linear = premultiplied_convert(*color, srgb_to_linear);
        let alpha = linear.w.max(1e-6);
        let mapped = Vec4::new(
            curve.apply(linear.x / alpha) * alpha,
            curve.apply(linear.y / alpha) * alpha,
            curve.apply(linear.z / alpha) * alpha,
            linear.w,
        );
        *color = premultiplied_convert(mapped, linear_to_srgb);
    }
}

/// Composites the layer over an opaque colour given in sRGB.
pub fn solid_background(layer: &mut Layer, background: Vec3) {
    let background = background.extend(1.0);
    for color in &mut layer.color {
        *color = *color + background * (1.0 - color.w);
    }
}

fn luma(color: Vec4) -> f32 {
    color.xyz().dot(Vec3::new(0.299, 0.587, 0.114))
}

/// Fast approximate anti-aliasing: blends across detected luma edges.
pub fn fxaa(layer: &mut Layer) {
    let (width, height) = (layer.width() as i64, layer.height() as i64);
    if width < 3 || height < 3 {
        return;
    }
    let source = layer.color.clone();
    let at = |x: i64, y: i64| source[(y.clamp(0, height - 1) * width + x.clamp(0, width - 1)) as usize];
    for y in 0..height {
        for x in 0..width {
            let center = at(x, y);
            let (n, s, w, e) = (at(x, y - 1), at(x, y + 1), at(x - 1, y), at(x + 1, y));
            let lc = luma(center);
            let (ln, ls, lw, le) = (luma(n), luma(s), luma(w), luma(e));
            let max = lc.max(ln).max(ls).max(lw).max(le);
            let min = lc.min(ln).min(ls).min(lw).min(le);
            let contrast = max - min;
            if contrast < (0.125 * max).max(0.0312) {
                continue;
            }
            let horizontal = (ln + ls - 2.0 * lc).abs() >= (lw + le - 2.0 * lc).abs();
            let (a, b) = if horizontal { (n, s) } else { (w, e) };
            let blend = (((ln + ls + lw + le) * 0.25 - lc).abs() / contrast).clamp(0.0, 1.0) * 0.5;
            layer.color[(y * width + x) as usize] = center.lerp((a + b) * 0.5, blend);
        }
    }
}
