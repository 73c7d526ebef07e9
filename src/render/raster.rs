//! Software rasterization into floating point layers.

use glam::{Vec2, Vec3, Vec4, Vec4Swizzles};

/// RGBA colour plus depth, the output of one framebuffer pass.
///
/// Colours are premultiplied by alpha. Depth is in `[0, 1]`, 1 being the far plane.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    width: u32,
    height: u32,
    pub color: Vec<Vec4>,
    pub depth: Vec<f32>,
}

impl Layer {
    pub fn new(width: u32, height: u32) -> Self {
        let len = (width as usize) * (height as usize);
        Self {
            width,
            height,
            color: vec![Vec4::ZERO; len],
            depth: vec![1.0; len],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> [u32; 2] {
        [self.width, self.height]
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if self.width != width || self.height != height {
            *self = Self::new(width, height);
        }
    }

    pub fn clear(&mut self, color: Vec4) {
        self.color.fill(color);
        self.depth.fill(1.0);
    }

    fn index(&self, x: u32, y: u32) -> usize {
        (y as usize) * (self.width as usize) + x as usize
    }

    pub fn pixel(&self, x: u32, y: u32) -> Vec4 {
        self.color[self.index(x, y)]
    }

    pub fn depth_at(&self, x: u32, y: u32) -> f32 {
        self.depth[self.index(x, y)]
    }

    /// Bilinear sample at normalized coordinates, clamped to the edges.
    pub fn sample(&self, uv: Vec2) -> Vec4 {
        if self.width == 0 || self.height == 0 {
            return Vec4::ZERO;
        }
        let x = (uv.x * self.width as f32 - 0.5).clamp(0.0, (self.width - 1) as f32);
        let y = (uv.y * self.height as f32 - 0.5).clamp(0.0, (self.height - 1) as f32);
        let x0 = x.floor() as u32;
        let y0 = y.floor() as u32;
        let x1 = (x0 + 1).min(self.width - 1);
        let y1 = (y0 + 1).min(self.height - 1);
        let fx = x - x0 as f32;
        let fy = y - y0 as f32;
        let top = self.pixel(x0, y0).lerp(self.pixel(x1, y0), fx);
        let bottom = self.pixel(x0, y1).lerp(self.pixel(x1, y1), fx);
        top.lerp(bottom, fy)
    }

    /// Averages blocks of `factor` x `factor` pixels.
    pub fn downsample(&self, factor: u32) -> Layer {
        let factor = factor.max(1);
        let mut out = Layer::new(self.width / factor, self.height / factor);
        let weight = 1.0 / (factor * factor) as f32;
        for y in 0..out.height {
            for x in 0..out.width {
                let mut color = Vec4::ZERO;
                let mut depth = 1.0f32;
                for sy in 0..factor {
                    for sx in 0..factor {
                        let source = self.index(x * factor + sx, y * factor + sy);
                        color += self.color[source];
                        depth = depth.min(self.depth[source]);
                    }
                }
                let target = out.index(x, y);
                out.color[target] = color * weight;
                out.depth[target] = depth;
            }
        }
        out
    }

    /// Converts linear premultiplied colours to sRGB premultiplied colours.
    pub fn encode_srgb(&mut self) {
        for color in &mut self.color {
            *color = premultiplied_convert(*color, crate::importer::linear_to_srgb);
        }
    }

    pub fn to_rgba8(&self) -> image::RgbaImage {
        let mut out = image::RgbaImage::new(self.width, self.height);
        for (pixel, color) in out.pixels_mut().zip(&self.color) {
            let alpha = color.w.clamp(0.0, 1.0);
            let rgb = if alpha > 0.0 { color.xyz() / alpha } else { Vec3::ZERO };
            pixel.0 = [
                to_u8(rgb.x),
                to_u8(rgb.y),
                to_u8(rgb.z),
                to_u8(alpha),
            ];
        }
        out
    }
}

pub(crate) fn to_u8(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Applies a per channel conversion to the un-premultiplied colour.
pub fn premultiplied_convert(color: Vec4, convert: fn(f32) -> f32) -> Vec4 {
    if color.w <= 0.0 {
        return Vec4::ZERO;
    }
    let rgb = color.xyz() / color.w;
    Vec4::new(
        convert(rgb.x) * color.w,
        convert(rgb.y) * color.w,
        convert(rgb.z) * color.w,
        color.w,
    )
}

/// Porter-Duff "over" of premultiplied colours.
pub fn over(top: Vec4, bottom: Vec4) -> Vec4 {
    top + bottom * (1.0 - top.w)
}

/// A vertex after the vertex stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterVertex {
    pub clip: Vec4,
    pub world: Vec3,
    pub normal: Vec3,
    pub color: Vec4,
    pub uv: Vec2,
    /// Scalar used for per-fragment colour mapping.
    pub scalar: f32,
}

/// Interpolated attributes handed to the fragment stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fragment {
    pub world: Vec3,
    pub normal: Vec3,
    pub color: Vec4,
    pub uv: Vec2,
    pub scalar: f32,
    pub front_facing: bool,
    /// Position inside a point sprite, in `[-1, 1]`.
    pub sprite: Vec2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Culling {
    None,
    Back,
    Front,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthMode {
    /// Depth tested and written, colour replaced.
    Opaque,
    /// Depth tested, not written, colour composited over.
    Translucent,
    /// Drawn over everything.
    Overlay,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterState {
    pub culling: Culling,
    pub depth: DepthMode,
}

impl Default for RasterState {
    fn default() -> Self {
        Self {
            culling: Culling::None,
            depth: DepthMode::Opaque,
        }
    }
}

struct ScreenVertex {
    x: f32,
    y: f32,
    z: f32,
    inv_w: f32,
}

fn to_screen(layer: &Layer, clip: Vec4) -> Option<ScreenVertex> {
    if clip.w <= 1e-6 || !clip.is_finite() {
        return None;
    }
    let inv_w = 1.0 / clip.w;
    let ndc = clip.xyz() * inv_w;
    Some(ScreenVertex {
        x: (ndc.x * 0.5 + 0.5) * layer.width as f32,
        y: (0.5 - ndc.y * 0.5) * layer.height as f32,
        z: ndc.z,
        inv_w,
    })
}

fn write_fragment(
    layer: &mut Layer,
    index: usize,
    depth: f32,
    color: Vec4,
    mode: DepthMode,
) {
    match mode {
        DepthMode::Opaque => {
            if depth < layer.depth[index] {
                layer.depth[index] = depth;
                layer.color[index] = color;
            }
        }
        DepthMode::Translucent => {
            if depth < layer.depth[index] {
                layer.color[index] = over(color, layer.color[index]);
            }
        }
        DepthMode::Overlay => {
            layer.color[index] = over(color, layer.color[index]);
        }
    }
}

/// Rasterizes one triangle. `shade` returns a premultiplied colour, or `None` to discard.
pub fn draw_triangle(
    layer: &mut Layer,
    vertices: [RasterVertex; 3],
    state: RasterState,
    shade: &mut dyn FnMut(&Fragment) -> Option<Vec4>,
) {
    let Some(a) = to_screen(layer, vertices[0].clip) else { return };
    let Some(b) = to_screen(layer, vertices[1].clip) else { return };
    let Some(c) = to_screen(layer, vertices[2].clip) else { return };

    let area = (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x);
    if area.abs() <= f32::EPSILON {
        return;
    }
    // Screen y points down, so counter-clockwise triangles have a negative area.
    let front_facing = area < 0.0;
    match state.culling {
        Culling::Back if !front_facing => return,
        Culling::Front if front_facing => return,
        _ => {}
    }

    let min_x = a.x.min(b.x).min(c.x).floor().max(0.0) as i64;
    let max_x = a.x.max(b.x).max(c.x).ceil().min(layer.width as f32) as i64;
    let min_y = a.y.min(b.y).min(c.y).floor().max(0.0) as i64;
    let max_y = a.y.max(b.y).max(c.y).ceil().min(layer.height as f32) as i64;

    for py in min_y..max_y {
        for px in min_x..max_x {
            let x = px as f32 + 0.5;
            let y = py as f32 + 0.5;
            let w0 = ((b.x - x) * (c.y - y) - (b.y - y) * (c.x - x)) / area;
            let w1 = ((c.x - x) * (a.y - y) - (c.y - y) * (a.x - x)) / area;
            let w2 = 1.0 - w0 - w1;
            if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                continue;
            }
            let depth = w0 * a.z + w1 * b.z + w2 * c.z;
            if !(0.0..=1.0).contains(&depth) {
                continue;
            }
            let index = layer.index(px as u32, py as u32);
            if state.depth != DepthMode::Overlay && depth >= layer.depth[index] {
                continue;
            }

            // Perspective correct weights.
            let p0 = w0 * a.inv_w;
            let p1 = w1 * b.inv_w;
            let p2 = w2 * c.inv_w;
            let sum = p0 + p1 + p2;
            if sum <= 0.0 {
                continue;
            }
            let (p0, p1, p2) = (p0 / sum, p1 / sum, p2 / sum);
            let [v0, v1, v2] = &vertices;
            let fragment = Fragment {
                world: v0.world * p0 + v1.world * p1 + v2.world * p2,
                normal: (v0.normal * p0 + v1.normal * p1 + v2.normal * p2).normalize_or_zero(),
                color: v0.color * p0 + v1.color * p1 + v2.color * p2,
                uv: v0.uv * p0 + v1.uv * p1 + v2.uv * p2,
                scalar: v0.scalar * p0 + v1.scalar * p1 + v2.scalar * p2,
                front_facing,
                sprite: Vec2::ZERO,
            };
            if let Some(color) = shade(&fragment) {
                write_fragment(layer, index, depth, color, state.depth);
            }
        }
    }
}

/// Draws a segment `width` pixels wide with interpolated attributes.
pub fn draw_line(
    layer: &mut Layer,
    from: RasterVertex,
    to: RasterVertex,
    width: f32,
    state: RasterState,
    shade: &mut dyn FnMut(&Fragment) -> Option<Vec4>,
) {
    let Some(a) = to_screen(layer, from.clip) else { return };
    let Some(b) = to_screen(layer, to.clip) else { return };
    let length = ((b.x - a.x).powi(2) + (b.y - a.y).powi(2)).sqrt();
    let steps = length.ceil().max(1.0) as usize;
    let half = (width.max(1.0) * 0.5).floor() as i64;

    for step in 0..=steps {
        let t = step as f32 / steps as f32;
        let x = a.x + (b.x - a.x) * t;
        let y = a.y + (b.y - a.y) * t;
        // Small bias so lines win against the surfaces they lie on.
        let depth = a.z + (b.z - a.z) * t - 1e-5;
        let p = (1.0 - t) * a.inv_w;
        let q = t * b.inv_w;
        let sum = (p + q).max(f32::EPSILON);
        let (p, q) = (p / sum, q / sum);
        let fragment = Fragment {
            world: from.world * p + to.world * q,
            normal: (from.normal * p + to.normal * q).normalize_or_zero(),
            color: from.color * p + to.color * q,
            uv: from.uv * p + to.uv * q,
            scalar: from.scalar * p + to.scalar * q,
            front_facing: true,
            sprite: Vec2::ZERO,
        };
        for oy in -half..=half {
            for ox in -half..=half {
                let px = x.floor() as i64 + ox;
                let py = y.floor() as i64 + oy;
                if px < 0 || py < 0 || px >= layer.width as i64 || py >= layer.height as i64 {
                    continue;
                }
                if !(0.0..=1.0).contains(&depth) {
                    continue;
                }
                let index = layer.index(px as u32, py as u32);
                if state.depth != DepthMode::Overlay && depth >= layer.depth[index] {
                    continue;
                }
                if let Some(color) = shade(&fragment) {
                    write_fragment(layer, index, depth, color, state.depth);
                }
            }
        }
    }
}

/// Draws a screen aligned square of `size` pixels; fragments carry their sprite coordinates.
pub fn draw_point(
    layer: &mut Layer,
    vertex: RasterVertex,
    size: f32,
    state: RasterState,
    shade: &mut dyn FnMut(&Fragment) -> Option<Vec4>,
) {
    let Some(center) = to_screen(layer, vertex.clip) else { return };
    if !(0.0..=1.0).contains(&center.z) {
        return;
    }
    let radius = (size.max(1.0) * 0.5).max(0.5);
    let min_x = (center.x - radius).floor().max(0.0) as i64;
    let max_x = (center.x + radius).ceil().min(layer.width as f32) as i64;
    let min_y = (center.y - radius).floor().max(0.0) as i64;
    let max_y = (center.y + radius).ceil().min(layer.height as f32) as i64;

    for py in min_y..max_y {
        for px in min_x..max_x {
            let sprite = Vec2::new(
                (px as f32 + 0.5 - center.x) / radius,
                (center.y - py as f32 - 0.5) / radius,
            );
            let index = layer.index(px as u32, py as u32);
            if state.depth != DepthMode::Overlay && center.z >= layer.depth[index] {
                continue;
            }
            let fragment = Fragment {
                world: vertex.world,
                normal: vertex.normal,
                color: vertex.color,
                uv: vertex.uv,
                scalar: vertex.scalar,
                front_facing: true,
                sprite,
            };
            if let Some(color) = shade(&fragment) {
                write_fragment(layer, index, center.z, color, state.depth);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        draw_line, draw_point, draw_triangle, over, Culling, DepthMode, Layer, RasterState,
        RasterVertex,
    };
    use glam::{Vec2, Vec3, Vec4};

    fn vertex(x: f32, y: f32, z: f32) -> RasterVertex {
        RasterVertex {
            clip: Vec4::new(x, y, z, 1.0),
            world: Vec3::new(x, y, z),
            normal: Vec3::Z,
            color: Vec4::ONE,
            uv: Vec2::ZERO,
            scalar: x,
        }
    }

    fn full_screen(z: f32) -> [RasterVertex; 3] {
        [vertex(-1.0, -1.0, z), vertex(3.0, -1.0, z), vertex(-1.0, 3.0, z)]
    }

    #[test]
    fn depth_test_keeps_the_nearest_fragment() {
        let mut layer = Layer::new(4, 4);
        let state = RasterState::default();
        draw_triangle(&mut layer, full_screen(0.5), state, &mut |_| Some(Vec4::new(1.0, 0.0, 0.0, 1.0)));
        draw_triangle(&mut layer, full_screen(0.7), state, &mut |_| Some(Vec4::new(0.0, 1.0, 0.0, 1.0)));
        assert_eq!(layer.pixel(1, 1), Vec4::new(1.0, 0.0, 0.0, 1.0));
        assert_eq!(layer.depth_at(1, 1), 0.5);

        draw_triangle(&mut layer, full_screen(0.2), state, &mut |_| None);
        assert_eq!(layer.depth_at(1, 1), 0.5);
    }

    #[test]
    fn back_faces_are_culled() {
        let mut layer = Layer::new(4, 4);
        let state = RasterState { culling: Culling::Back, depth: DepthMode::Opaque };
        let [a, b, c] = full_screen(0.5);
        draw_triangle(&mut layer, [a, c, b], state, &mut |_| Some(Vec4::ONE));
        assert!(layer.color.iter().all(|c| *c == Vec4::ZERO));
        let mut fronts = 0;
        draw_triangle(&mut layer, [a, b, c], state, &mut |f| {
            fronts += usize::from(f.front_facing);
            Some(Vec4::ONE)
        });
        assert_eq!(fronts, 16);
    }

    #[test]
    fn translucent_fragments_blend_without_writing_depth() {
        let mut layer = Layer::new(2, 2);
        layer.clear(Vec4::new(0.0, 0.0, 1.0, 1.0));
        let state = RasterState { culling: Culling::None, depth: DepthMode::Translucent };
        draw_triangle(&mut layer, full_screen(0.5), state, &mut |_| Some(Vec4::new(0.5, 0.0, 0.0, 0.5)));
        assert_eq!(layer.pixel(0, 0), Vec4::new(0.5, 0.0, 0.5, 1.0));
        assert_eq!(layer.depth_at(0, 0), 1.0);
        assert_eq!(over(Vec4::ZERO, Vec4::ONE), Vec4::ONE);
    }

    #[test]
    fn points_and_lines_cover_pixels() {
        let mut layer = Layer::new(8, 8);
        let state = RasterState::default();
        let mut corners = Vec::new();
        draw_point(&mut layer, vertex(0.0, 0.0, 0.5), 4.0, state, &mut |f| {
            corners.push(f.sprite);
            Some(Vec4::ONE)
        });
        assert_eq!(corners.len(), 16);
        assert!(corners.iter().all(|s| s.x.abs() <= 1.0 && s.y.abs() <= 1.0));

        let mut layer = Layer::new(8, 8);
        draw_line(&mut layer, vertex(-1.0, 0.0, 0.5), vertex(1.0, 0.0, 0.5), 1.0, state, &mut |_| Some(Vec4::ONE));
        let lit = layer.color.iter().filter(|c| c.w > 0.0).count();
        assert!(lit >= 8);
    }

    #[test]
    fn downsample_and_export() {
        let mut layer = Layer::new(2, 2);
        layer.color = vec![Vec4::ONE, Vec4::ZERO, Vec4::ZERO, Vec4::ONE];
        let small = layer.downsample(2);
        assert_eq!(small.size(), [1, 1]);
        assert_eq!(small.pixel(0, 0), Vec4::splat(0.5));
        let rgba = small.to_rgba8();
        assert_eq!(rgba.get_pixel(0, 0).0, [255, 255, 255, 128]);
    }
}
