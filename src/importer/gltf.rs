use super::{
    describe_poly_data, Actor, AnimationSupport, ImportedCamera, Importer, ImporterError, Light,
    LightKind, Material, Result, TemporalInfo, Texture, UpdateStatus,
};
use crate::dataset::{DataArray, PolyData};
use gltf::animation::util::ReadOutputs;
use gltf::animation::{Interpolation, Property};
use gltf::mesh::Mode;
use glam::{Mat4, Quat, Vec2, Vec3, Vec4};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Trs {
    translation: Vec3,
    rotation: Quat,
    scale: Vec3,
}

impl Trs {
    fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Translation,
    Rotation,
    Scale,
}

#[derive(Debug, Clone)]
struct Channel {
    node: usize,
    target: Target,
    step: bool,
    times: Vec<f32>,
    values: Vec<Vec4>,
}

impl Channel {
    fn apply(&self, time: f32, trs: &mut Trs) {
        let (Some(&first), Some(&last)) = (self.times.first(), self.times.last()) else {
            return;
        };
        let time = time.clamp(first, last);
        let next = self
            .times
            .iter()
            .position(|&t| t > time)
            .unwrap_or(self.times.len() - 1);
        let previous = next.saturating_sub(1);
        let span = self.times[next] - self.times[previous];
        let factor = if self.step || span <= f32::EPSILON || next == previous {
            0.0
        } else {
            (time - self.times[previous]) / span
        };
        let (a, b) = (self.values[previous], self.values[next]);
        match self.target {
            Target::Translation => trs.translation = a.lerp(b, factor).truncate(),
            Target::Scale => trs.scale = a.lerp(b, factor).truncate(),
            Target::Rotation => {
                trs.rotation = Quat::from_vec4(a)
                    .normalize()
                    .slerp(Quat::from_vec4(b).normalize(), factor)
            }
        }
    }
}

#[derive(Debug, Clone)]
struct Track {
    name: Option<String>,
    channels: Vec<Channel>,
    range: [f64; 2],
}

#[derive(Debug, Clone)]
struct CameraNode {
    node: usize,
    name: String,
    view_angle: f32,
    parallel_scale: Option<f32>,
}

#[derive(Debug, Clone)]
struct Armature {
    actor: usize,
    joints: Vec<usize>,
    /// For each joint, the position of its parent joint in `joints`.
    parents: Vec<Option<usize>>,
}

/// Importer for glTF 2.0 files: meshes, PBR materials, cameras, punctual
/// lights, skeletons drawn as armatures, and node TRS animations.
pub struct GltfImporter {
    path: PathBuf,
    status: UpdateStatus,
    parents: Vec<Option<usize>>,
    rest: Vec<Trs>,
    current: Vec<Trs>,
    actors: Vec<Actor>,
    actor_nodes: Vec<usize>,
    armatures: Vec<Armature>,
    light_nodes: Vec<usize>,
    lights: Vec<Light>,
    camera_nodes: Vec<CameraNode>,
    cameras: Vec<ImportedCamera>,
    selected_camera: Option<usize>,
    tracks: Vec<Track>,
    enabled: Vec<bool>,
    description: String,
}

impl GltfImporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            status: UpdateStatus::NotUpdated,
            parents: Vec::new(),
            rest: Vec::new(),
            current: Vec::new(),
            actors: Vec::new(),
            actor_nodes: Vec::new(),
            armatures: Vec::new(),
            light_nodes: Vec::new(),
            lights: Vec::new(),
            camera_nodes: Vec::new(),
            cameras: Vec::new(),
            selected_camera: None,
            tracks: Vec::new(),
            enabled: Vec::new(),
            description: String::new(),
        }
    }

    fn invalid(&self, reason: impl Into<String>) -> ImporterError {
        ImporterError::Invalid {
            path: self.path.display().to_string(),
            reason: reason.into(),
        }
    }

    fn import(&mut self, progress: &mut dyn FnMut(f64)) -> Result<()> {
        let (document, buffers, images) =
            gltf::import(&self.path).map_err(|err| self.invalid(err.to_string()))?;
        progress(0.3);

        let node_count = document.nodes().count();
        self.parents = vec![None; node_count];
        self.rest = Vec::with_capacity(node_count);
        for node in document.nodes() {
            for child in node.children() {
                self.parents[child.index()] = Some(node.index());
            }
            let (translation, rotation, scale) = node.transform().decomposed();
            self.rest.push(Trs {
                translation: Vec3::from_array(translation),
                rotation: Quat::from_array(rotation),
                scale: Vec3::from_array(scale),
            });
        }
        self.current = self.rest.clone();

        let mut texture_cache: Vec<Option<Texture>> = vec![None; images.len()];
        let buffer_data = |buffer: gltf::Buffer| buffers.get(buffer.index()).map(|data| data.0.as_slice());

        let roots: Vec<usize> = match document.default_scene().or_else(|| document.scenes().next()) {
            Some(scene) => scene.nodes().map(|node| node.index()).collect(),
            None => (0..node_count).filter(|&n| self.parents[n].is_none()).collect(),
        };
        let mut stack = roots;
        let mut visited = Vec::new();
        while let Some(index) = stack.pop() {
            visited.push(index);
            if let Some(node) = document.nodes().nth(index) {
                stack.extend(node.children().map(|child| child.index()));
            }
        }
        visited.sort_unstable();

        for node in document.nodes().filter(|node| visited.binary_search(&node.index()).is_ok()) {
            if let Some(mesh) = node.mesh() {
                let base_name = mesh
                    .name()
                    .or_else(|| node.name())
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("mesh_{}", mesh.index()));
                for (p, primitive) in mesh.primitives().enumerate() {
                    let reader = primitive.reader(buffer_data);
                    let Some(positions) = reader.read_positions() else {
                        log::warn!("{}: primitive without positions skipped", base_name);
                        continue;
                    };
                    let mut poly = PolyData::new(positions.map(Vec3::from_array).collect());
                    let count = poly.points.len() as u32;
                    let indices: Vec<u32> = match reader.read_indices() {
                        Some(indices) => indices.into_u32().collect(),
                        None => (0..count).collect(),
                    };
                    build_cells(&mut poly, primitive.mode(), &indices);
                    if let Some(normals) = reader.read_normals() {
                        poly.normals = Some(normals.map(Vec3::from_array).collect());
                    }
                    if let Some(tcoords) = reader.read_tex_coords(0) {
                        poly.tcoords = Some(tcoords.into_f32().map(Vec2::from_array).collect());
                    }
                    if let Some(colors) = reader.read_colors(0) {
                        let values: Vec<f64> = colors
                            .into_rgba_f32()
                            .flat_map(|rgba| rgba.map(f64::from))
                            .collect();
                        if let Ok(array) = DataArray::new("COLOR_0", 4, values) {
                            poly.point_data.add_array(array);
                        }
                    }
                    if let Err(err) = poly.validate() {
                        log::warn!("{}: invalid primitive skipped: {}", base_name, err);
                        continue;
                    }

                    let material = convert_material(&primitive.material(), &images, &mut texture_cache);
                    let name = if mesh.primitives().len() > 1 {
                        format!("{}_{}", base_name, p)
                    } else {
                        base_name.clone()
                    };
                    let mut actor = Actor::new(name, Arc::new(poly));
                    actor.material = material;
                    self.actors.push(actor);
                    self.actor_nodes.push(node.index());
                }
            }

            if let Some(camera) = node.camera() {
                let (view_angle, parallel_scale) = match camera.projection() {
                    gltf::camera::Projection::Perspective(perspective) => {
                        (perspective.yfov().to_degrees(), None)
                    }
                    gltf::camera::Projection::Orthographic(orthographic) => {
                        (30.0, Some(orthographic.ymag()))
                    }
                };
                self.camera_nodes.push(CameraNode {
                    node: node.index(),
                    name: camera.name().or_else(|| node.name()).unwrap_or_default().to_string(),
                    view_angle,
                    parallel_scale,
                });
            }

            if let Some(light) = node.light() {
                let kind = match light.kind() {
                    gltf::khr_lights_punctual::Kind::Directional => LightKind::Directional,
                    gltf::khr_lights_punctual::Kind::Point => LightKind::Point,
                    gltf::khr_lights_punctual::Kind::Spot {
                        outer_cone_angle, ..
                    } => LightKind::Spot {
                        cone_angle: outer_cone_angle.to_degrees(),
                    },
                };
                self.lights.push(Light {
                    kind,
                    position: Vec3::ZERO,
                    direction: Vec3::NEG_Z,
                    color: Vec3::from_array(light.color()),
                    intensity: light.intensity(),
                });
                self.light_nodes.push(node.index());
            }
        }
        progress(0.7);

        for skin in document.skins() {
            let joints: Vec<usize> = skin.joints().map(|joint| joint.index()).collect();
            let parents = joints
                .iter()
                .map(|&joint| {
                    self.parents[joint].and_then(|parent| joints.iter().position(|&j| j == parent))
                })
                .collect();
            let mut actor = Actor::new(
                skin.name().map(str::to_string).unwrap_or_else(|| format!("armature_{}", skin.index())),
                Arc::new(PolyData::default()),
            );
            actor.armature = true;
            self.armatures.push(Armature {
                actor: self.actors.len(),
                joints,
                parents,
            });
            self.actors.push(actor);
        }

        for animation in document.animations() {
            let mut channels = Vec::new();
            let mut range = [f64::INFINITY, f64::NEG_INFINITY];
            for channel in animation.channels() {
                let target = match channel.target().property() {
                    Property::Translation => Target::Translation,
                    Property::Rotation => Target::Rotation,
                    Property::Scale => Target::Scale,
                    Property::MorphTargetWeights => {
                        log::debug!("Morph target animation channels are ignored");
                        continue;
                    }
                };
                let interpolation = channel.sampler().interpolation();
                let reader = channel.reader(buffer_data);
                let (Some(inputs), Some(outputs)) = (reader.read_inputs(), reader.read_outputs())
                else {
                    continue;
                };
                let times: Vec<f32> = inputs.collect();
                let mut values: Vec<Vec4> = match outputs {
                    ReadOutputs::Translations(iter) | ReadOutputs::Scales(iter) => {
                        iter.map(|v| Vec3::from_array(v).extend(0.0)).collect()
                    }
                    ReadOutputs::Rotations(rotations) => {
                        rotations.into_f32().map(Vec4::from_array).collect()
                    }
                    ReadOutputs::MorphTargetWeights(_) => continue,
                };
                if interpolation == Interpolation::CubicSpline {
                    // Keep the values, drop the tangents.
                    values = values.chunks(3).filter_map(|c| c.get(1).copied()).collect();
                }
                if times.is_empty() || values.len() != times.len() {
                    log::warn!("Malformed animation channel ignored");
                    continue;
                }
                range[0] = range[0].min(f64::from(times[0]));
                range[1] = range[1].max(f64::from(times[times.len() - 1]));
                channels.push(Channel {
                    node: channel.target().node().index(),
                    target,
                    step: interpolation == Interpolation::Step,
                    times,
                    values,
                });
            }
            if channels.is_empty() {
                range = [0.0, 0.0];
            }
            self.tracks.push(Track {
                name: animation.name().map(str::to_string),
                channels,
                range,
            });
        }
        self.enabled = vec![false; self.tracks.len()];

        self.refresh_world();
        self.description = self.describe(&document);
        Ok(())
    }

    fn describe(&self, document: &gltf::Document) -> String {
        let mut description = format!(
            "{}\nNumber of meshes: {}\nNumber of nodes: {}\nNumber of cameras: {}\nNumber of lights: {}\nNumber of animations: {}\n",
            self.path.display(),
            document.meshes().count(),
            self.parents.len(),
            self.camera_nodes.len(),
            self.lights.len(),
            self.tracks.len()
        );
        for actor in self.actors.iter().filter(|actor| !actor.armature) {
            description.push_str(&format!("{}:\n{}", actor.name, describe_poly_data(&actor.geometry)));
        }
        description
    }

    fn world_matrices(&self) -> Vec<Mat4> {
        let mut world: Vec<Option<Mat4>> = vec![None; self.current.len()];
        for index in 0..self.current.len() {
            let mut chain = vec![index];
            let mut cursor = index;
            while world[cursor].is_none() {
                match self.parents[cursor] {
                    Some(parent) if world[parent].is_none() => {
                        chain.push(parent);
                        cursor = parent;
                    }
                    _ => break,
                }
            }
            for &node in chain.iter().rev() {
                if world[node].is_some() {
                    continue;
                }
                let parent = self.parents[node]
                    .and_then(|parent| world[parent])
                    .unwrap_or(Mat4::IDENTITY);
                world[node] = Some(parent * self.current[node].matrix());
            }
        }
        world.into_iter().map(|m| m.unwrap_or(Mat4::IDENTITY)).collect()
    }

    fn refresh_world(&mut self) {
        let world = self.world_matrices();
        for (actor, &node) in self.actors.iter_mut().zip(&self.actor_nodes) {
            actor.transform = world[node];
        }
        for (light, &node) in self.lights.iter_mut().zip(&self.light_nodes) {
            light.position = world[node].transform_point3(Vec3::ZERO);
            light.direction = world[node].transform_vector3(Vec3::NEG_Z).normalize_or_zero();
        }
        self.cameras = self
            .camera_nodes
            .iter()
            .map(|camera| {
                let matrix = world[camera.node];
                let position = matrix.transform_point3(Vec3::ZERO);
                let forward = matrix.transform_vector3(Vec3::NEG_Z).normalize_or_zero();
                ImportedCamera {
                    name: camera.name.clone(),
                    position,
                    focal_point: position + forward,
                    view_up: matrix.transform_vector3(Vec3::Y).normalize_or_zero(),
                    view_angle: camera.view_angle,
                    parallel_scale: camera.parallel_scale,
                }
            })
            .collect();
        for armature in &self.armatures {
            let points: Vec<Vec3> = armature
                .joints
                .iter()
                .map(|&joint| world[joint].transform_point3(Vec3::ZERO))
                .collect();
            let mut skeleton = PolyData::new(points);
            skeleton.lines = armature
                .parents
                .iter()
                .enumerate()
                .filter_map(|(joint, parent)| parent.map(|p| vec![p as u32, joint as u32]))
                .collect();
            self.actors[armature.actor].geometry = Arc::new(skeleton);
        }
    }
}

fn build_cells(poly: &mut PolyData, mode: Mode, indices: &[u32]) {
    match mode {
        Mode::Triangles => {
            poly.polys = indices.chunks_exact(3).map(|t| t.to_vec()).collect();
        }
        Mode::TriangleStrip => {
            poly.polys = (2..indices.len())
                .map(|i| {
                    if i % 2 == 0 {
                        vec![indices[i - 2], indices[i - 1], indices[i]]
                    } else {
                        vec![indices[i - 1], indices[i - 2], indices[i]]
                    }
                })
                .collect();
        }
        Mode::TriangleFan => {
            poly.polys = (2..indices.len())
                .map(|i| vec![indices[0], indices[i - 1], indices[i]])
                .collect();
        }
        Mode::Lines => {
            poly.lines = indices.chunks_exact(2).map(|l| l.to_vec()).collect();
        }
        Mode::LineStrip => {
            if indices.len() >= 2 {
                poly.lines = vec![indices.to_vec()];
            }
        }
        Mode::LineLoop => {
            if indices.len() >= 2 {
                let mut line = indices.to_vec();
                line.push(indices[0]);
                poly.lines = vec![line];
            }
        }
        Mode::Points => {}
    }
}

fn texture_from_image(data: &gltf::image::Data, srgb: bool) -> Option<Texture> {
    use gltf::image::Format;
    let (width, height) = (data.width, data.height);
    let pixels = data.pixels.clone();
    let decoded = match data.format {
        Format::R8 => image::GrayImage::from_raw(width, height, pixels).map(image::DynamicImage::ImageLuma8),
        Format::R8G8 => {
            image::GrayAlphaImage::from_raw(width, height, pixels).map(image::DynamicImage::ImageLumaA8)
        }
        Format::R8G8B8 => image::RgbImage::from_raw(width, height, pixels).map(image::DynamicImage::ImageRgb8),
        Format::R8G8B8A8 => {
            image::RgbaImage::from_raw(width, height, pixels).map(image::DynamicImage::ImageRgba8)
        }
        other => {
            log::warn!("Unsupported glTF image format {:?}, texture ignored", other);
            None
        }
    };
    decoded.map(|image| Texture::from_image(image, srgb))
}

fn cached_texture(
    info_image: usize,
    srgb: bool,
    images: &[gltf::image::Data],
    cache: &mut [Option<Texture>],
) -> Option<Texture> {
    if let Some(Some(texture)) = cache.get(info_image) {
        return Some(texture.clone());
    }
    let texture = texture_from_image(images.get(info_image)?, srgb)?;
    if let Some(slot) = cache.get_mut(info_image) {
        *slot = Some(texture.clone());
    }
    Some(texture)
}

fn convert_material(
    material: &gltf::Material,
    images: &[gltf::image::Data],
    cache: &mut [Option<Texture>],
) -> Material {
    let pbr = material.pbr_metallic_roughness();
    let [r, g, b, a] = pbr.base_color_factor();
    let mut converted = Material {
        color: Vec3::new(r, g, b),
        opacity: if material.alpha_mode() == gltf::material::AlphaMode::Opaque {
            1.0
        } else {
            a
        },
        roughness: pbr.roughness_factor(),
        metallic: pbr.metallic_factor(),
        emissive_factor: Vec3::from_array(material.emissive_factor()),
        ..Material::default()
    };
    converted.base_color_texture = pbr
        .base_color_texture()
        .and_then(|info| cached_texture(info.texture().source().index(), true, images, cache));
    converted.orm_texture = pbr
        .metallic_roughness_texture()
        .and_then(|info| cached_texture(info.texture().source().index(), false, images, cache));
    if let Some(normal) = material.normal_texture() {
        converted.normal_scale = normal.scale();
        converted.normal_texture =
            cached_texture(normal.texture().source().index(), false, images, cache);
    }
    converted.emissive_texture = material
        .emissive_texture()
        .and_then(|info| cached_texture(info.texture().source().index(), true, images, cache));
    converted
}

impl Importer for GltfImporter {
    fn update(&mut self, progress: &mut dyn FnMut(f64)) -> Result<()> {
        progress(0.0);
        match self.import(progress) {
            Ok(()) => {
                self.status = UpdateStatus::Success;
                progress(1.0);
                Ok(())
            }
            Err(err) => {
                self.status = UpdateStatus::Failure;
                Err(err)
            }
        }
    }

    fn update_status(&self) -> UpdateStatus {
        self.status
    }

    fn actors(&self) -> &[Actor] {
        &self.actors
    }

    fn actors_mut(&mut self) -> &mut [Actor] {
        &mut self.actors
    }

    fn lights(&self) -> &[Light] {
        &self.lights
    }

    fn outputs_description(&self) -> String {
        self.description.clone()
    }

    fn number_of_animations(&self) -> i32 {
        self.tracks.len() as i32
    }

    fn animation_name(&self, index: usize) -> Option<String> {
        self.tracks.get(index).map(|track| track.name.clone().unwrap_or_default())
    }

    fn enable_animation(&mut self, index: usize) {
        if let Some(enabled) = self.enabled.get_mut(index) {
            *enabled = true;
        }
    }

    fn disable_animation(&mut self, index: usize) {
        if let Some(enabled) = self.enabled.get_mut(index) {
            *enabled = false;
        }
    }

    fn is_animation_enabled(&self, index: usize) -> bool {
        self.enabled.get(index).copied().unwrap_or(false)
    }

    fn animation_support(&self) -> AnimationSupport {
        if self.tracks.is_empty() {
            AnimationSupport::None
        } else {
            AnimationSupport::Multi
        }
    }

    fn temporal_information(&self, index: usize, frame_rate: f64) -> Option<TemporalInfo> {
        let track = self.tracks.get(index)?;
        let [lo, hi] = track.range;
        let mut time_steps = Vec::new();
        if frame_rate > 0.0 {
            let count = ((hi - lo) * frame_rate).floor() as usize;
            time_steps.extend((0..=count).map(|k| lo + k as f64 / frame_rate));
        }
        if time_steps.last().map(|&t| hi - t > 1e-9).unwrap_or(true) {
            time_steps.push(hi);
        }
        Some(TemporalInfo {
            number_of_time_steps: time_steps.len(),
            time_range: track.range,
            time_steps,
        })
    }

    fn update_at_time_value(&mut self, time: f64) -> Result<()> {
        if self.status != UpdateStatus::Success {
            return Err(ImporterError::NotUpdated);
        }
        self.current = self.rest.clone();
        for (track, &enabled) in self.tracks.iter().zip(&self.enabled) {
            if !enabled {
                continue;
            }
            for channel in &track.channels {
                if let Some(trs) = self.current.get_mut(channel.node) {
                    channel.apply(time as f32, trs);
                }
            }
        }
        self.refresh_world();
        Ok(())
    }

    fn number_of_cameras(&self) -> i32 {
        self.camera_nodes.len() as i32
    }

    fn camera_name(&self, index: usize) -> Option<String> {
        self.camera_nodes.get(index).map(|camera| camera.name.clone())
    }

    fn set_camera(&mut self, index: Option<usize>) {
        self.selected_camera = index.filter(|&i| i < self.camera_nodes.len());
    }

    fn selected_camera(&self) -> Option<&ImportedCamera> {
        self.cameras.get(self.selected_camera?)
    }
}

#[cfg(test)]
mod tests {
    use super::GltfImporter;
    use crate::importer::{AnimationSupport, Importer};
    use glam::Vec3;
    use std::path::PathBuf;

    fn write_scene() -> PathBuf {
        let mut dir = std::env::temp_dir();
        let nonce = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        dir.push(format!("lumaview_gltf_{}_{}", std::process::id(), nonce));
        std::fs::create_dir_all(&dir).unwrap();

        let mut bin = Vec::new();
        for v in [0.0f32, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0] {
            bin.extend_from_slice(&v.to_le_bytes());
        }
        for v in [0.0f32, 1.0] {
            bin.extend_from_slice(&v.to_le_bytes());
        }
        for v in [0.0f32, 0.0, 0.0, 2.0, 0.0, 0.0] {
            bin.extend_from_slice(&v.to_le_bytes());
        }
        std::fs::write(dir.join("scene.bin"), &bin).unwrap();

        let json = r#"{
  "asset": {"version": "2.0"},
  "scene": 0,
  "scenes": [{"nodes": [0, 1]}],
  "nodes": [
    {"name": "tri", "mesh": 0, "translation": [0, 0, 1]},
    {"name": "cam", "camera": 0, "translation": [0, 0, 5]}
  ],
  "meshes": [{"name": "triangle", "primitives": [{"attributes": {"POSITION": 0}}]}],
  "cameras": [{"name": "front", "type": "perspective", "perspective": {"yfov": 0.8, "znear": 0.1}}],
  "animations": [{
    "name": "slide",
    "channels": [{"sampler": 0, "target": {"node": 0, "path": "translation"}}],
    "samplers": [{"input": 1, "output": 2, "interpolation": "LINEAR"}]
  }],
  "buffers": [{"uri": "scene.bin", "byteLength": 68}],
  "bufferViews": [
    {"buffer": 0, "byteOffset": 0, "byteLength": 36},
    {"buffer": 0, "byteOffset": 36, "byteLength": 8},
    {"buffer": 0, "byteOffset": 44, "byteLength": 24}
  ],
  "accessors": [
    {"bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3", "min": [0, 0, 0], "max": [1, 1, 0]},
    {"bufferView": 1, "componentType": 5126, "count": 2, "type": "SCALAR", "min": [0], "max": [1]},
    {"bufferView": 2, "componentType": 5126, "count": 2, "type": "VEC3"}
  ]
}"#;
        let path = dir.join("scene.gltf");
        std::fs::write(&path, json).unwrap();
        path
    }

    #[test]
    fn imports_meshes_cameras_and_animations() {
        let path = write_scene();
        let mut importer = GltfImporter::new(&path);
        importer.update(&mut |_| {}).unwrap();

        assert_eq!(importer.actors().len(), 1);
        assert_eq!(importer.actors()[0].name, "triangle");
        assert_eq!(importer.actors()[0].geometry.polys, vec![vec![0, 1, 2]]);
        assert_eq!(
            importer.actors()[0].transform.transform_point3(Vec3::ZERO),
            Vec3::new(0.0, 0.0, 1.0)
        );

        assert_eq!(importer.number_of_cameras(), 1);
        assert_eq!(importer.camera_name(0).as_deref(), Some("front"));
        assert!(importer.selected_camera().is_none());
        importer.set_camera(Some(0));
        let camera = importer.selected_camera().unwrap();
        assert_eq!(camera.position, Vec3::new(0.0, 0.0, 5.0));
        assert_eq!(camera.focal_point, Vec3::new(0.0, 0.0, 4.0));

        assert_eq!(importer.number_of_animations(), 1);
        assert_eq!(importer.animation_support(), AnimationSupport::Multi);
        let info = importer.temporal_information(0, 10.0).unwrap();
        assert_eq!(info.time_range, [0.0, 1.0]);
        assert_eq!(info.number_of_time_steps, 11);

        importer.enable_animation(0);
        importer.update_at_time_value(0.5).unwrap();
        let origin = importer.actors()[0].transform.transform_point3(Vec3::ZERO);
        assert!((origin - Vec3::new(1.0, 0.0, 0.0)).length() < 1e-5);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn missing_file_fails() {
        let mut importer = GltfImporter::new("/nonexistent/scene.gltf");
        assert!(importer.update(&mut |_| {}).is_err());
    }
}
