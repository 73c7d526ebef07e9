//! Ray marched volume rendering of image data.

use super::raster::{over, Layer};
use crate::dataset::{DataArray, ImageData};
use crate::importer::srgb_to_linear;
use crate::scene::variants::{VectorMode, VolumeMapper};
use glam::{Mat4, Vec3, Vec4, Vec4Swizzles};

const MAX_STEPS: usize = 1024;

/// Array value lookup at continuous voxel coordinates.
struct Sampler<'a> {
    image: &'a ImageData,
    array: &'a DataArray,
    use_cell_data: bool,
}

impl Sampler<'_> {
    fn tuple_at(&self, index: usize) -> Option<&[f64]> {
        (index < self.array.number_of_tuples()).then(|| self.array.tuple(index))
    }

    fn cell_index(&self, voxel: Vec3) -> usize {
        let [nx, ny, nz] = self.image.dimensions.map(|d| d.saturating_sub(1).max(1));
        let clamp = |value: f32, count: usize| (value.floor().max(0.0) as usize).min(count - 1);
        let (i, j, k) = (clamp(voxel.x, nx), clamp(voxel.y, ny), clamp(voxel.z, nz));
        i + nx * (j + ny * k)
    }

    /// Trilinear interpolation of a whole tuple on point data.
    fn interpolate(&self, voxel: Vec3, out: &mut Vec<f64>) -> bool {
        let dims = self.image.dimensions;
        let components = self.array.number_of_components();
        out.clear();
        out.resize(components, 0.0);
        let base = [voxel.x, voxel.y, voxel.z];
        let mut lower = [0usize; 3];
        let mut weight = [0f32; 3];
        for axis in 0..3 {
            let max = dims[axis].saturating_sub(1);
            let value = base[axis].clamp(0.0, max as f32);
            lower[axis] = (value.floor() as usize).min(max.saturating_sub(1));
            weight[axis] = if max == 0 { 0.0 } else { value - lower[axis] as f32 };
        }
        for corner in 0..8 {
            let offset = [corner & 1, (corner >> 1) & 1, (corner >> 2) & 1];
            let mut w = 1.0;
            let mut ijk = [0usize; 3];
            for axis in 0..3 {
                ijk[axis] = (lower[axis] + offset[axis]).min(dims[axis].saturating_sub(1));
                w *= if offset[axis] == 1 { weight[axis] } else { 1.0 - weight[axis] };
            }
            if w == 0.0 {
                continue;
            }
            let Some(tuple) = self.tuple_at(self.image.point_index(ijk[0], ijk[1], ijk[2])) else {
                return false;
            };
            for (value, component) in out.iter_mut().zip(tuple) {
                *value += component * w as f64;
            }
        }
        true
    }

    fn tuple(&self, voxel: Vec3, out: &mut Vec<f64>) -> bool {
        if self.use_cell_data {
            match self.tuple_at(self.cell_index(voxel)) {
                Some(tuple) => {
                    out.clear();
                    out.extend_from_slice(tuple);
                    true
                }
                None => false,
            }
        } else {
            self.interpolate(voxel, out)
        }
    }
}

fn linearize(color: Vec3) -> Vec3 {
    Vec3::new(srgb_to_linear(color.x), srgb_to_linear(color.y), srgb_to_linear(color.z))
}

/// Colour (linear) and opacity of one tuple through the mapper.
fn classify(mapper: &VolumeMapper, tuple: &[f64]) -> (Vec3, f32) {
    let magnitude = tuple.iter().map(|v| v * v).sum::<f64>().sqrt();
    match mapper.vector_mode {
        Some(mode) => {
            let value = match mode {
                VectorMode::Magnitude => magnitude,
                VectorMode::Component(c) => tuple.get(c).copied().unwrap_or(0.0),
            };
            let color = mapper.color.map(value);
            (linearize(color), mapper.opacity.opacity(value))
        }
        None => {
            let channel = |i: usize| tuple.get(i).or(tuple.first()).copied().unwrap_or(0.0) as f32;
            let color = Vec3::new(channel(0), channel(1), channel(2)).clamp(Vec3::ZERO, Vec3::ONE);
            (linearize(color), mapper.opacity.opacity(magnitude))
        }
    }
}

fn intersect_box(origin: Vec3, direction: Vec3, min: Vec3, max: Vec3) -> Option<(f32, f32)> {
    let inverse = direction.recip();
    let t0 = (min - origin) * inverse;
    let t1 = (max - origin) * inverse;
    let near = t0.min(t1).max_element();
    let far = t0.max(t1).min_element();
    (far >= near.max(0.0) && near.is_finite() && far.is_finite()).then_some((near.max(0.0), far))
}

/// Marches every pixel of `layer` through `image`, compositing front to back
/// and stopping at the depth already in the layer.
pub fn render_volume(
    layer: &mut Layer,
    image: &ImageData,
    transform: Mat4,
    mapper: &VolumeMapper,
    view_projection: Mat4,
) {
    let attributes = if mapper.use_cell_data {
        &image.cell_data
    } else {
        &image.point_data
    };
    let Some(array) = attributes.array(&mapper.array_name) else {
        return;
    };
    let sampler = Sampler {
        image,
        array,
        use_cell_data: mapper.use_cell_data,
    };

    // Marching happens in continuous voxel space.
    let spacing = image.spacing.abs().max(Vec3::splat(1e-6));
    let to_voxel = Mat4::from_scale(spacing.recip())
        * Mat4::from_translation(-image.origin)
        * transform.inverse();
    let from_voxel = to_voxel.inverse();
    let clip_to_voxel = to_voxel * view_projection.inverse();
    let max = Vec3::new(
        image.dimensions[0].saturating_sub(1) as f32,
        image.dimensions[1].saturating_sub(1) as f32,
        image.dimensions[2].saturating_sub(1) as f32,
    );
    let step = 0.5;

    let (width, height) = (layer.width(), layer.height());
    let mut tuple = Vec::new();
    for y in 0..height {
        for x in 0..width {
            let ndc_x = (x as f32 + 0.5) / width as f32 * 2.0 - 1.0;
            let ndc_y = 1.0 - (y as f32 + 0.5) / height as f32 * 2.0;
            let near = clip_to_voxel * Vec4::new(ndc_x, ndc_y, 0.0, 1.0);
            let far = clip_to_voxel * Vec4::new(ndc_x, ndc_y, 1.0, 1.0);
            if near.w.abs() < 1e-12 || far.w.abs() < 1e-12 {
                continue;
            }
            let origin = near.xyz() / near.w;
            let direction = (far.xyz() / far.w - origin).normalize_or_zero();
            if direction == Vec3::ZERO {
                continue;
            }
            let Some((t_near, t_far)) = intersect_box(origin, direction, Vec3::ZERO, max) else {
                continue;
            };

            let index = (y * width + x) as usize;
            let scene_depth = layer.depth[index];
            let mut accumulated = Vec4::ZERO;
            let mut t = t_near;
            let mut steps = 0;
            while t <= t_far && steps < MAX_STEPS && accumulated.w < 0.99 {
                let voxel = origin + direction * t;
                let clip = view_projection * (from_voxel * voxel.extend(1.0));
                if clip.w > 0.0 && clip.z / clip.w >= scene_depth {
                    break;
                }
                if sampler.tuple(voxel, &mut tuple) {
                    let (color, opacity) = classify(mapper, &tuple);
                    let alpha = 1.0 - (1.0 - opacity.clamp(0.0, 1.0)).powf(step);
                    accumulated = over(accumulated, (color * alpha).extend(alpha));
                }
                t += step;
                steps += 1;
            }
            if accumulated.w > 0.0 {
                layer.color[index] = over(accumulated, layer.color[index]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::render_volume;
    use crate::dataset::{DataArray, ImageData};
    use crate::render::colormap::{ColorTransferFunction, OpacityFunction};
    use crate::render::raster::Layer;
    use crate::scene::variants::{VectorMode, VolumeMapper};
    use glam::{Mat4, Vec3};
    use std::sync::Arc;

    fn cube() -> ImageData {
        let mut image = ImageData::new([3, 3, 3], Vec3::ONE, Vec3::splat(-1.0));
        let values = vec![1.0; 27];
        image
            .point_data
            .add_array(DataArray::new("density", 1, values).unwrap_or_else(|err| panic!("{err}")));
        image
    }

    fn mapper(inverse: bool) -> VolumeMapper {
        VolumeMapper {
            array_name: "density".into(),
            use_cell_data: false,
            vector_mode: Some(VectorMode::Component(0)),
            color: Arc::new(ColorTransferFunction::default()),
            opacity: OpacityFunction {
                range: [0.0, 1.0],
                inverse,
            },
        }
    }

    fn view_projection() -> Mat4 {
        Mat4::perspective_rh(0.8, 1.0, 0.1, 20.0)
            * Mat4::look_at_rh(Vec3::new(0.0, 0.0, 6.0), Vec3::ZERO, Vec3::Y)
    }

    #[test]
    fn rays_through_the_volume_accumulate_opacity() {
        let mut layer = Layer::new(16, 16);
        render_volume(&mut layer, &cube(), Mat4::IDENTITY, &mapper(false), view_projection());
        assert!(layer.pixel(8, 8).w > 0.5);
        assert_eq!(layer.pixel(0, 0).w, 0.0);
    }

    #[test]
    fn inverse_opacity_hides_high_values() {
        let mut layer = Layer::new(16, 16);
        render_volume(&mut layer, &cube(), Mat4::IDENTITY, &mapper(true), view_projection());
        assert_eq!(layer.pixel(8, 8).w, 0.0);
    }

    #[test]
    fn opaque_depth_stops_the_ray() {
        let mut layer = Layer::new(16, 16);
        layer.depth.fill(0.0);
        render_volume(&mut layer, &cube(), Mat4::IDENTITY, &mapper(false), view_projection());
        assert_eq!(layer.pixel(8, 8).w, 0.0);
    }
}
