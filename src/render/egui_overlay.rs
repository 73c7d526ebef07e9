//! Software painter for egui output: tessellated meshes are rasterized
//! straight into an RGBA frame.

use std::collections::HashMap;

use image::RgbaImage;

/// RGBA8 premultiplied texture owned by the painter.
#[derive(Debug, Clone)]
struct UiTexture {
    size: [usize; 2],
    pixels: Vec<[u8; 4]>,
}

impl UiTexture {
    fn sample(&self, u: f32, v: f32) -> [f32; 4] {
        let [w, h] = self.size;
        if w == 0 || h == 0 {
            return [1.0; 4];
        }
        let x = ((u * w as f32) as isize).clamp(0, w as isize - 1) as usize;
        let y = ((v * h as f32) as isize).clamp(0, h as isize - 1) as usize;
        let p = self.pixels[y * w + x];
        [
            p[0] as f32 / 255.0,
            p[1] as f32 / 255.0,
            p[2] as f32 / 255.0,
            p[3] as f32 / 255.0,
        ]
    }
}

#[derive(Clone, Copy)]
struct UiVertex {
    pos: [f32; 2],
    uv: [f32; 2],
    color: [f32; 4],
}

impl UiVertex {
    fn from_egui(vertex: &egui::epaint::Vertex, pixels_per_point: f32) -> Self {
        let c = vertex.color.to_array();
        Self {
            pos: [vertex.pos.x * pixels_per_point, vertex.pos.y * pixels_per_point],
            uv: [vertex.uv.x, vertex.uv.y],
            color: [
                c[0] as f32 / 255.0,
                c[1] as f32 / 255.0,
                c[2] as f32 / 255.0,
                c[3] as f32 / 255.0,
            ],
        }
    }
}

/// Keeps egui textures alive between frames and paints clipped primitives.
#[derive(Debug, Default)]
pub struct EguiPainter {
    textures: HashMap<egui::TextureId, UiTexture>,
    warned_callback: bool,
}

impl EguiPainter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    /// Applies texture creations, partial updates and frees.
    pub fn apply_textures(&mut self, delta: &egui::TexturesDelta) {
        for (id, image_delta) in &delta.set {
            let (size, pixels) = image_pixels(&image_delta.image);
            match image_delta.pos {
                Some([x, y]) => {
                    let Some(texture) = self.textures.get_mut(id) else {
                        log::warn!("egui partial update of unknown texture {:?}", id);
                        continue;
                    };
                    let [tw, th] = texture.size;
                    for row in 0..size[1] {
                        if y + row >= th {
                            break;
                        }
                        for column in 0..size[0] {
                            if x + column >= tw {
                                break;
                            }
                            texture.pixels[(y + row) * tw + x + column] = pixels[row * size[0] + column];
                        }
                    }
                }
                None => {
                    self.textures.insert(*id, UiTexture { size, pixels });
                }
            }
        }
        for id in &delta.free {
            self.textures.remove(id);
        }
    }

    /// Blends `primitives` over `target`, whose pixels are straight-alpha sRGB.
    pub fn paint(
        &mut self,
        target: &mut RgbaImage,
        primitives: &[egui::ClippedPrimitive],
        pixels_per_point: f32,
    ) {
        let ppp = pixels_per_point.max(0.01);
        for clipped in primitives {
            let mesh = match &clipped.primitive {
                egui::epaint::Primitive::Mesh(mesh) => mesh,
                egui::epaint::Primitive::Callback(_) => {
                    if !self.warned_callback {
                        log::warn!("egui paint callbacks are not supported by the software painter");
                        self.warned_callback = true;
                    }
                    continue;
                }
            };
            let texture = self.textures.get(&mesh.texture_id);
            let clip = [
                (clipped.clip_rect.min.x * ppp).max(0.0),
                (clipped.clip_rect.min.y * ppp).max(0.0),
                (clipped.clip_rect.max.x * ppp).min(target.width() as f32),
                (clipped.clip_rect.max.y * ppp).min(target.height() as f32),
            ];
            if clip[0] >= clip[2] || clip[1] >= clip[3] {
                continue;
            }
            for triangle in mesh.indices.chunks_exact(3) {
                let fetch = |index: u32| mesh.vertices.get(index as usize).map(|v| UiVertex::from_egui(v, ppp));
                let (Some(a), Some(b), Some(c)) = (fetch(triangle[0]), fetch(triangle[1]), fetch(triangle[2])) else {
                    continue;
                };
                fill_triangle(target, [a, b, c], clip, texture);
            }
        }
    }
}

fn image_pixels(image: &egui::ImageData) -> ([usize; 2], Vec<[u8; 4]>) {
    match image {
        egui::ImageData::Color(image) => (
            image.size,
            image.pixels.iter().map(|pixel| pixel.to_array()).collect(),
        ),
        egui::ImageData::Font(image) => (
            image.size,
            image.srgba_pixels(None).map(|pixel| pixel.to_array()).collect(),
        ),
    }
}

fn edge(a: [f32; 2], b: [f32; 2], p: [f32; 2]) -> f32 {
    (b[0] - a[0]) * (p[1] - a[1]) - (b[1] - a[1]) * (p[0] - a[0])
}

fn fill_triangle(target: &mut RgbaImage, [a, b, c]: [UiVertex; 3], clip: [f32; 4], texture: Option<&UiTexture>) {
    let area = edge(a.pos, b.pos, c.pos);
    if area.abs() <= f32::EPSILON {
        return;
    }
    let min_x = a.pos[0].min(b.pos[0]).min(c.pos[0]).max(clip[0]).floor() as u32;
    let min_y = a.pos[1].min(b.pos[1]).min(c.pos[1]).max(clip[1]).floor() as u32;
    let max_x = a.pos[0].max(b.pos[0]).max(c.pos[0]).min(clip[2]).ceil() as u32;
    let max_y = a.pos[1].max(b.pos[1]).max(c.pos[1]).min(clip[3]).ceil() as u32;

    for y in min_y..max_y.min(target.height()) {
        for x in min_x..max_x.min(target.width()) {
            let p = [x as f32 + 0.5, y as f32 + 0.5];
            let w0 = edge(b.pos, c.pos, p) / area;
            let w1 = edge(c.pos, a.pos, p) / area;
            let w2 = edge(a.pos, b.pos, p) / area;
            if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                continue;
            }
            let mut source = [0.0f32; 4];
            for (channel, value) in source.iter_mut().enumerate() {
                *value = a.color[channel] * w0 + b.color[channel] * w1 + c.color[channel] * w2;
            }
            if let Some(texture) = texture {
                let u = a.uv[0] * w0 + b.uv[0] * w1 + c.uv[0] * w2;
                let v = a.uv[1] * w0 + b.uv[1] * w1 + c.uv[1] * w2;
                let texel = texture.sample(u, v);
                for (value, t) in source.iter_mut().zip(texel) {
                    *value *= t;
                }
            }
            if source[3] <= 0.0 {
                continue;
            }
            blend_premultiplied(target.get_pixel_mut(x, y), source);
        }
    }
}

/// `source` is premultiplied, the destination pixel straight alpha.
fn blend_premultiplied(pixel: &mut image::Rgba<u8>, source: [f32; 4]) {
    let destination = pixel.0.map(|v| v as f32 / 255.0);
    let inverse = 1.0 - source[3].clamp(0.0, 1.0);
    let alpha = source[3] + destination[3] * inverse;
    let mut out = [0u8; 4];
    for channel in 0..3 {
        let premultiplied = source[channel] + destination[channel] * destination[3] * inverse;
        let straight = if alpha > 0.0 { premultiplied / alpha } else { 0.0 };
        out[channel] = (straight.clamp(0.0, 1.0) * 255.0).round() as u8;
    }
    out[3] = (alpha.clamp(0.0, 1.0) * 255.0).round() as u8;
    pixel.0 = out;
}

#[cfg(test)]
mod tests {
    use super::EguiPainter;
    use image::{Rgba, RgbaImage};

    fn run(ctx: &egui::Context, size: f32, ui: impl FnMut(&egui::Context)) -> egui::FullOutput {
        let input = egui::RawInput {
            screen_rect: Some(egui::Rect::from_min_size(egui::Pos2::ZERO, egui::vec2(size, size))),
            ..Default::default()
        };
        ctx.run(input, ui)
    }

    #[test]
    fn filled_rect_is_painted_inside_its_bounds_only() {
        let ctx = egui::Context::default();
        let output = run(&ctx, 32.0, |ctx| {
            ctx.layer_painter(egui::LayerId::background()).rect_filled(
                egui::Rect::from_min_max(egui::pos2(8.0, 8.0), egui::pos2(24.0, 24.0)),
                0.0,
                egui::Color32::from_rgb(255, 0, 0),
            );
        });
        let primitives = ctx.tessellate(output.shapes, 1.0);
        let mut painter = EguiPainter::new();
        painter.apply_textures(&output.textures_delta);
        assert!(painter.texture_count() >= 1);

        let mut frame = RgbaImage::from_pixel(32, 32, Rgba([0, 0, 255, 255]));
        painter.paint(&mut frame, &primitives, 1.0);
        assert_eq!(frame.get_pixel(16, 16).0, [255, 0, 0, 255]);
        assert_eq!(frame.get_pixel(2, 2).0, [0, 0, 255, 255]);
    }

    #[test]
    fn text_leaves_partially_covered_pixels() {
        let ctx = egui::Context::default();
        let output = run(&ctx, 64.0, |ctx| {
            ctx.layer_painter(egui::LayerId::background()).text(
                egui::pos2(4.0, 4.0),
                egui::Align2::LEFT_TOP,
                "Lumaview",
                egui::FontId::proportional(14.0),
                egui::Color32::WHITE,
            );
        });
        let primitives = ctx.tessellate(output.shapes, 1.0);
        let mut painter = EguiPainter::new();
        painter.apply_textures(&output.textures_delta);
        let mut frame = RgbaImage::from_pixel(64, 64, Rgba([0, 0, 0, 255]));
        painter.paint(&mut frame, &primitives, 1.0);
        assert!(frame.pixels().any(|p| p.0[0] > 128));
    }
}
