//! Base renderer: turns options into lazily configured state and draws the
//! meta-importer's actors through the pass pipeline.
//!
//! Every option setter compares against the current value and, on change,
//! marks the matching [`Node`] of the dirty graph. Nothing is recomputed
//! until the next frame, where dirty nodes are configured once, upstream
//! first.

use std::path::{Path, PathBuf};

use glam::{Mat3, Mat4, Vec2, Vec3, Vec4, Vec4Swizzles};

use super::camera::Camera;
use super::dirty::{DirtyGraph, Node};
use super::hdri::HdriChain;
use super::ibl::EnvironmentMap;
use super::passes::{PassContext, Prop, PropId, PropKind, PropPainter, RenderPass, Stage};
use super::post::{self, FilmicCurve};
use super::raster::{self, Culling, DepthMode, Fragment, Layer, RasterState, RasterVertex};
use super::shading::{self, LightingEnvironment, SpriteShape, SurfaceSample};
use super::volume;
use crate::dataset::{BoundingBox, PolyData};
use crate::importer::{srgb_to_linear, Material, Texture};
use crate::options::{ModelOptions, Options};
use crate::scene::variants::{ColorMode, Mapper, VectorMode};
use crate::scene::MetaImporter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AntiAliasing {
    Off,
    Fxaa,
    Ssaa,
}

/// Surface values forced on every actor, each one optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SurfaceOverrides {
    pub color: Option<Vec3>,
    pub opacity: Option<f32>,
    pub roughness: Option<f32>,
    pub metallic: Option<f32>,
    pub emissive_factor: Option<Vec3>,
    pub normal_scale: Option<f32>,
    pub base_color_texture: Option<PathBuf>,
    pub orm_texture: Option<PathBuf>,
    pub emissive_texture: Option<PathBuf>,
    pub normal_texture: Option<PathBuf>,
    pub matcap_texture: Option<PathBuf>,
}

impl SurfaceOverrides {
    pub fn from_options(model: &ModelOptions) -> Self {
        let vec3 = |v: [f64; 3]| Vec3::new(v[0] as f32, v[1] as f32, v[2] as f32);
        Self {
            color: model.color.rgb.map(vec3),
            opacity: model.color.opacity.map(|v| v as f32),
            roughness: model.material.roughness.map(|v| v as f32),
            metallic: model.material.metallic.map(|v| v as f32),
            emissive_factor: model.emissive.factor.map(vec3),
            normal_scale: model.normal.scale.map(|v| v as f32),
            base_color_texture: model.color.texture.as_ref().map(PathBuf::from),
            orm_texture: model.material.texture.as_ref().map(PathBuf::from),
            emissive_texture: model.emissive.texture.as_ref().map(PathBuf::from),
            normal_texture: model.normal.texture.as_ref().map(PathBuf::from),
            matcap_texture: model.matcap.texture.as_ref().map(PathBuf::from),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct TextureOverrides {
    base_color: Option<Texture>,
    orm: Option<Texture>,
    emissive: Option<Texture>,
    normal: Option<Texture>,
    matcap: Option<Texture>,
}

fn load_texture(path: Option<&Path>, srgb: bool) -> Option<Texture> {
    let path = path?;
    if !path.is_file() {
        log::warn!("Texture file does not exist {}", path.display());
        return None;
    }
    match Texture::load(path, srgb) {
        Ok(texture) => Some(texture),
        Err(err) => {
            log::warn!("Cannot open texture file {}: {}", path.display(), err);
            None
        }
    }
}

/// Ground grid placement derived from the scene bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSetup {
    pub unit_square: f32,
    pub origin: Vec3,
    pub fade_distance: f32,
}

impl GridSetup {
    pub fn from_bounds(bounds: &BoundingBox) -> Option<Self> {
        if !bounds.is_valid() {
            return None;
        }
        let diagonal = bounds.diagonal().max(f32::EPSILON);
        let unit_square = 10f32.powf((diagonal * 0.1).log10().round());
        let center = bounds.center();
        Some(Self {
            unit_square,
            origin: Vec3::new(center.x, bounds.min.y - 0.0001 * diagonal, center.z),
            fade_distance: diagonal,
        })
    }

    pub fn description(&self) -> String {
        format!(
            "Using grid unit square size = {}\nGrid origin set to [{}, {}, {}]\n\n",
            self.unit_square, self.origin.x, self.origin.y, self.origin.z
        )
    }
}

/// Overlay state kept next to the 3D configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct HudState {
    pub filename_visible: bool,
    pub filename: String,
    pub metadata_visible: bool,
    pub metadata: String,
    pub fps_visible: bool,
    pub cheat_sheet_visible: bool,
    pub cheat_sheet: Vec<String>,
    pub dropzone_visible: bool,
    pub axes_visible: bool,
    pub font_scale: f32,
}

impl Default for HudState {
    fn default() -> Self {
        Self {
            filename_visible: false,
            filename: String::new(),
            metadata_visible: false,
            metadata: String::new(),
            fps_visible: false,
            cheat_sheet_visible: false,
            cheat_sheet: Vec::new(),
            dropzone_visible: false,
            axes_visible: false,
            font_scale: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Variant {
    Original,
    Coloring,
    Sprites,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DrawItem {
    Skybox,
    Grid,
    Surface { entry: usize, variant: Variant },
    Volume(usize),
}

macro_rules! setter {
    ($(#[$doc:meta])* $name:ident, $field:ident: $ty:ty => $node:expr) => {
        $(#[$doc])*
        pub fn $name(&mut self, value: $ty) {
            if self.$field != value {
                self.$field = value;
                self.dirty.mark($node);
                self.scene_modified = true;
            }
        }
    };
    ($(#[$doc:meta])* $name:ident, $field:ident: $ty:ty) => {
        $(#[$doc])*
        pub fn $name(&mut self, value: $ty) {
            if self.$field != value {
                self.$field = value;
                self.scene_modified = true;
            }
        }
    };
}

pub struct Renderer {
    pub(crate) dirty: DirtyGraph,
    camera: Camera,
    hdri: HdriChain,
    passes: RenderPass,

    show_edges: bool,
    line_width: f32,
    point_size: f32,
    culling: Culling,
    backface_type: Option<String>,
    grid_visible: bool,
    light_intensity: f32,
    background_color: Vec3,
    use_ssao: bool,
    use_translucency: bool,
    anti_aliasing: AntiAliasing,
    use_tone_mapping: bool,
    use_raytracing: bool,
    use_denoiser: bool,
    raytracing_samples: i32,
    use_blur_background: bool,
    circle_of_confusion: f32,
    armature_visible: bool,
    sprite_shape: SpriteShape,
    sprite_size: f32,

    overrides: SurfaceOverrides,
    textures: TextureOverrides,
    textures_loaded_for: Option<SurfaceOverrides>,
    materials: Vec<Material>,
    grid: Option<GridSetup>,
    hud: HudState,

    importer_time: u64,
    scene_modified: bool,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer {
    pub fn new() -> Self {
        Self {
            dirty: DirtyGraph::new(),
            camera: Camera::new(),
            hdri: HdriChain::new(),
            passes: RenderPass::new(),
            show_edges: false,
            line_width: 1.0,
            point_size: 10.0,
            culling: Culling::None,
            backface_type: None,
            grid_visible: false,
            light_intensity: 1.0,
            background_color: Vec3::splat(0.2),
            use_ssao: false,
            use_translucency: false,
            anti_aliasing: AntiAliasing::Off,
            use_tone_mapping: false,
            use_raytracing: false,
            use_denoiser: false,
            raytracing_samples: 5,
            use_blur_background: false,
            circle_of_confusion: 20.0,
            armature_visible: false,
            sprite_shape: SpriteShape::Sphere,
            sprite_size: 10.0,
            overrides: SurfaceOverrides::default(),
            textures: TextureOverrides::default(),
            textures_loaded_for: None,
            materials: Vec::new(),
            grid: None,
            hud: HudState::default(),
            importer_time: 0,
            scene_modified: true,
        }
    }

    /// Pushes every option to its setter. Unchanged values invalidate nothing.
    pub fn apply_options(&mut self, options: &Options) {
        let render = &options.render;
        self.set_show_edges(render.show_edges);
        self.set_line_width(render.line_width as f32);
        self.set_point_size(render.point_size as f32);
        self.set_backface_type(render.backface_type.clone());
        self.set_grid_visible(render.grid.enable);
        self.set_use_translucency(render.effect.translucency_support);
        self.set_use_ssao(render.effect.ambient_occlusion);
        self.set_anti_aliasing(if render.effect.anti_aliasing {
            match render.effect.anti_aliasing_mode.as_str() {
                "fxaa" => AntiAliasing::Fxaa,
                "ssaa" => AntiAliasing::Ssaa,
                other => {
                    log::warn!("{other} is not a valid anti-aliasing mode, using fxaa");
                    AntiAliasing::Fxaa
                }
            }
        } else {
            AntiAliasing::Off
        });
        self.set_use_tone_mapping(render.effect.tone_mapping);
        self.set_use_raytracing(render.raytracing.enable);
        self.set_use_denoiser(render.raytracing.denoise);
        self.set_raytracing_samples(render.raytracing.samples);

        self.set_hdri_file(render.hdri.file.as_ref().map(PathBuf::from));
        self.set_hdri_cache_path(render.hdri.cache_path.as_ref().map(PathBuf::from));
        self.set_use_image_based_lighting(render.hdri.ambient);
        self.set_skybox_visible(render.background.skybox);
        let [r, g, b] = render.background.color;
        self.set_background_color(Vec3::new(r as f32, g as f32, b as f32));
        self.set_use_blur_background(render.background.blur.enable);
        self.set_circle_of_confusion(render.background.blur.coc as f32);
        self.set_light_intensity(render.light.intensity as f32);
        self.set_armature_visible(render.armature.enable);

        self.set_surface_overrides(SurfaceOverrides::from_options(&options.model));
        let sprites = &options.model.point_sprites;
        let shape = SpriteShape::parse(&sprites.kind).unwrap_or_else(|| {
            log::warn!("{} is not a valid point sprites type, using sphere", sprites.kind);
            SpriteShape::Sphere
        });
        self.set_sprite_shape(shape);
        self.set_sprite_size(sprites.size as f32);

        let ui = &options.ui;
        self.set_filename_visible(ui.filename);
        self.set_filename(ui.filename_name.clone());
        self.set_metadata_visible(ui.metadata);
        self.set_fps_visible(ui.fps);
        self.set_cheat_sheet_visible(ui.cheatsheet);
        self.set_dropzone_visible(ui.dropzone);
        self.set_axes_visible(ui.axis);
        self.set_font_scale(ui.font_scale as f32);
    }

    setter!(set_show_edges, show_edges: bool => Node::ActorsProperties);
    setter!(set_line_width, line_width: f32 => Node::ActorsProperties);
    setter!(set_point_size, point_size: f32 => Node::ActorsProperties);
    setter!(set_grid_visible, grid_visible: bool => Node::Grid);
    setter!(set_use_ssao, use_ssao: bool => Node::RenderPasses);
    setter!(set_use_translucency, use_translucency: bool => Node::RenderPasses);
    setter!(set_use_raytracing, use_raytracing: bool => Node::RenderPasses);
    setter!(set_use_denoiser, use_denoiser: bool => Node::RenderPasses);
    setter!(set_raytracing_samples, raytracing_samples: i32 => Node::RenderPasses);
    setter!(set_use_blur_background, use_blur_background: bool => Node::RenderPasses);
    setter!(set_circle_of_confusion, circle_of_confusion: f32 => Node::RenderPasses);
    setter!(set_armature_visible, armature_visible: bool => Node::RenderPasses);
    setter!(set_surface_overrides, overrides: SurfaceOverrides => Node::ActorsProperties);
    setter!(set_sprite_shape, sprite_shape: SpriteShape => Node::PointSpritesMappers);
    setter!(set_sprite_size, sprite_size: f32 => Node::PointSpritesMappers);
    setter!(set_anti_aliasing, anti_aliasing: AntiAliasing);
    setter!(set_use_tone_mapping, use_tone_mapping: bool);
    setter!(set_light_intensity, light_intensity: f32);
    setter!(set_background_color, background_color: Vec3);

    /// `visible` or `hidden`; anything else is reported and treated as visible.
    pub fn set_backface_type(&mut self, backface_type: Option<String>) {
        if self.backface_type == backface_type {
            return;
        }
        self.culling = match backface_type.as_deref() {
            None | Some("visible") => Culling::None,
            Some("hidden") => Culling::Back,
            Some(other) => {
                log::warn!("{other} is not a valid backface type, assuming visible");
                Culling::None
            }
        };
        self.backface_type = backface_type;
        self.dirty.mark(Node::ActorsProperties);
        self.scene_modified = true;
    }

    fn hdri_changed(&mut self) {
        self.dirty.mark(Node::HdriReader);
        self.dirty.mark(Node::HdriLut);
        self.dirty.mark(Node::HdriSkybox);
        self.scene_modified = true;
    }

    pub fn set_hdri_file(&mut self, file: Option<PathBuf>) {
        if self.hdri.set_file(file) {
            self.hdri_changed();
        }
    }

    pub fn set_hdri_cache_path(&mut self, path: Option<PathBuf>) {
        if self.hdri.set_cache_path(path) {
            self.hdri_changed();
        }
    }

    pub fn set_use_image_based_lighting(&mut self, use_ibl: bool) {
        if self.hdri.set_use_image_based_lighting(use_ibl) {
            self.hdri_changed();
        }
    }

    pub fn set_skybox_visible(&mut self, visible: bool) {
        if self.hdri.set_skybox_visible(visible) {
            self.hdri_changed();
        }
    }

    fn set_hud<T: PartialEq>(&mut self, value: T, field: impl FnOnce(&mut HudState) -> &mut T) -> bool {
        let slot = field(&mut self.hud);
        if *slot == value {
            return false;
        }
        *slot = value;
        true
    }

    pub fn set_filename_visible(&mut self, visible: bool) {
        self.set_hud(visible, |hud| &mut hud.filename_visible);
    }

    pub fn set_filename(&mut self, filename: String) {
        self.set_hud(filename, |hud| &mut hud.filename);
    }

    pub fn set_metadata_visible(&mut self, visible: bool) {
        if self.set_hud(visible, |hud| &mut hud.metadata_visible) {
            self.dirty.mark(Node::MetaData);
        }
    }

    pub fn set_fps_visible(&mut self, visible: bool) {
        self.set_hud(visible, |hud| &mut hud.fps_visible);
    }

    pub fn set_cheat_sheet_visible(&mut self, visible: bool) {
        if self.set_hud(visible, |hud| &mut hud.cheat_sheet_visible) {
            self.dirty.mark(Node::CheatSheet);
        }
    }

    pub fn set_dropzone_visible(&mut self, visible: bool) {
        self.set_hud(visible, |hud| &mut hud.dropzone_visible);
    }

    pub fn set_axes_visible(&mut self, visible: bool) {
        self.set_hud(visible, |hud| &mut hud.axes_visible);
    }

    pub fn set_font_scale(&mut self, scale: f32) {
        self.set_hud(scale, |hud| &mut hud.font_scale);
    }

    pub fn invalidate_cheat_sheet(&mut self) {
        self.dirty.mark(Node::CheatSheet);
    }

    /// Whether the cheat sheet needs new content before the next frame.
    pub fn cheat_sheet_outdated(&self) -> bool {
        self.hud.cheat_sheet_visible && self.dirty.is_dirty(Node::CheatSheet)
    }

    pub fn set_cheat_sheet(&mut self, lines: Vec<String>) {
        self.hud.cheat_sheet = lines;
        self.dirty.take(Node::CheatSheet);
    }

    pub fn hud(&self) -> &HudState {
        &self.hud
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    /// Any camera change requires a full scene render.
    pub fn camera_mut(&mut self) -> &mut Camera {
        self.scene_modified = true;
        &mut self.camera
    }

    pub fn hdri(&self) -> &HdriChain {
        &self.hdri
    }

    pub fn render_passes(&self) -> &RenderPass {
        &self.passes
    }

    pub fn grid(&self) -> Option<&GridSetup> {
        self.grid.as_ref()
    }

    pub fn grid_info(&self) -> String {
        self.grid.map(|grid| grid.description()).unwrap_or_default()
    }

    pub fn is_dirty(&self, node: Node) -> bool {
        self.dirty.is_dirty(node)
    }

    pub fn mark(&mut self, node: Node) {
        self.dirty.mark(node);
        self.scene_modified = true;
    }

    pub fn scene_modified(&self) -> bool {
        self.scene_modified
    }

    pub fn set_scene_modified(&mut self) {
        self.scene_modified = true;
    }

    pub fn armature_visible(&self) -> bool {
        self.armature_visible
    }

    pub fn use_raytracing(&self) -> bool {
        self.use_raytracing
    }

    pub fn effective_material(&self, entry: usize) -> Option<&Material> {
        self.materials.get(entry)
    }

    /// A new scene was loaded: everything depending on actors is recomputed.
    pub fn scene_changed(&mut self) {
        self.dirty.mark(Node::ActorsProperties);
        self.dirty.mark(Node::Coloring);
        self.dirty.mark(Node::Grid);
        self.dirty.mark(Node::MetaData);
        self.dirty.mark(Node::RenderPasses);
        self.scene_modified = true;
    }

    /// Configures one dirty node. Coloring nodes belong to the coloring renderer.
    pub(crate) fn configure_node(&mut self, node: Node, importer: &mut MetaImporter) {
        match node {
            Node::HdriReader => self.hdri.configure_reader(),
            Node::HdriHash => self.hdri.configure_hash(),
            Node::HdriTexture => self.hdri.configure_texture(),
            Node::HdriLut => self.hdri.configure_lut(),
            Node::HdriSh => self.hdri.configure_spherical_harmonics(),
            Node::HdriSpecular => self.hdri.configure_specular(),
            Node::HdriSkybox => self.hdri.configure_skybox(),
            Node::ActorsProperties => self.configure_actors_properties(importer),
            Node::ColoringActorsProperties => self.configure_coloring_actors_properties(importer),
            Node::Grid => self.configure_grid(importer),
            Node::MetaData => {
                if self.hud.metadata_visible {
                    self.hud.metadata = importer.metadata_description();
                }
            }
            Node::RenderPasses => self.configure_render_passes(),
            Node::Coloring
            | Node::ColorTransferFunction
            | Node::ColoringMappers
            | Node::PointSpritesMappers
            | Node::VolumePropsMappers
            | Node::ScalarBarActor
            | Node::CheatSheet => {}
        }
    }

    /// Configures every dirty base node in dependency order.
    pub fn update(&mut self, importer: &mut MetaImporter) {
        self.track_importer(importer);
        for node in Node::ALL {
            if node != Node::CheatSheet && self.dirty.take(node) {
                self.configure_node(node, importer);
            }
        }
    }

    pub(crate) fn track_importer(&mut self, importer: &MetaImporter) {
        if self.importer_time != importer.update_time() {
            self.importer_time = importer.update_time();
            self.scene_changed();
        }
    }

    fn configure_actors_properties(&mut self, importer: &mut MetaImporter) {
        if self.textures_loaded_for.as_ref() != Some(&self.overrides) {
            self.textures = TextureOverrides {
                base_color: load_texture(self.overrides.base_color_texture.as_deref(), true),
                orm: load_texture(self.overrides.orm_texture.as_deref(), false),
                emissive: load_texture(self.overrides.emissive_texture.as_deref(), true),
                normal: load_texture(self.overrides.normal_texture.as_deref(), false),
                matcap: load_texture(self.overrides.matcap_texture.as_deref(), true),
            };
            self.textures_loaded_for = Some(self.overrides.clone());
        }

        let mut materials = Vec::with_capacity(importer.entries().len());
        for entry in importer.entries() {
            let Some(actor) = importer.actor(entry.origin) else {
                materials.push(Material::default());
                continue;
            };
            let mut material = actor.material.clone();
            let overrides = &self.overrides;
            if let Some(color) = overrides.color {
                material.color = Vec3::new(
                    srgb_to_linear(color.x),
                    srgb_to_linear(color.y),
                    srgb_to_linear(color.z),
                );
            }
            if let Some(opacity) = overrides.opacity.filter(|_| !actor.armature) {
                material.opacity = opacity;
            }
            if let Some(roughness) = overrides.roughness {
                material.roughness = roughness;
            }
            if let Some(metallic) = overrides.metallic {
                material.metallic = metallic;
            }
            if let Some(factor) = overrides.emissive_factor {
                material.emissive_factor = factor;
            }
            if let Some(scale) = overrides.normal_scale {
                material.normal_scale = scale;
            }
            let textures = &self.textures;
            if textures.base_color.is_some() {
                material.base_color_texture = textures.base_color.clone();
            }
            if textures.orm.is_some() {
                material.orm_texture = textures.orm.clone();
            }
            if textures.emissive.is_some() {
                material.emissive_texture = textures.emissive.clone();
            }
            if textures.normal.is_some() {
                material.normal_texture = textures.normal.clone();
            }
            if textures.matcap.is_some() {
                material.matcap_texture = textures.matcap.clone();
            }
            materials.push(material);
        }
        self.materials = materials;
        self.dirty.mark(Node::ColoringActorsProperties);
    }

    fn configure_coloring_actors_properties(&mut self, importer: &mut MetaImporter) {
        for (index, entry) in importer.entries_mut().iter_mut().enumerate() {
            if let Some(material) = self.materials.get(index) {
                entry.coloring.material = material.clone();
                entry.point_sprites.material = material.clone();
            }
        }
    }

    fn configure_grid(&mut self, importer: &MetaImporter) {
        self.grid = if self.grid_visible {
            GridSetup::from_bounds(&importer.bounds())
        } else {
            None
        };
        if let Some(grid) = &self.grid {
            log::debug!("{}", grid.description());
        }
    }

    fn configure_render_passes(&mut self) {
        if self.use_raytracing {
            log::warn!("Raytracing options can't be used if lumaview has not been built with raytracing");
            if self.use_denoiser {
                log::debug!("Denoiser ignored without raytracing");
            }
            log::debug!("Raytracing samples ignored: {}", self.raytracing_samples);
        }
        self.passes.set_use_ssao(self.use_ssao);
        self.passes.set_use_depth_peeling(self.use_translucency);
        self.passes.set_use_blur_background(self.use_blur_background);
        self.passes.set_circle_of_confusion(self.circle_of_confusion);
        self.passes.set_armature_visible(self.armature_visible);
    }

    fn collect_items(&self, importer: &MetaImporter) -> (Vec<DrawItem>, Vec<Prop>) {
        let mut items = Vec::new();
        let mut props = Vec::new();
        let mut push = |item: DrawItem, kind: PropKind| {
            props.push(Prop {
                id: items.len(),
                kind,
            });
            items.push(item);
        };
        if self.hdri.skybox().is_some() {
            push(DrawItem::Skybox, PropKind::Skybox);
        }
        if self.grid.is_some() {
            push(DrawItem::Grid, PropKind::Scene);
        }
        for (index, entry) in importer.entries().iter().enumerate() {
            let Some(actor) = importer.actor(entry.origin) else {
                continue;
            };
            let kind = if actor.armature {
                PropKind::Armature
            } else {
                PropKind::Scene
            };
            if entry.visible && actor.visible {
                push(DrawItem::Surface { entry: index, variant: Variant::Original }, kind);
            }
            if entry.coloring.visible {
                push(DrawItem::Surface { entry: index, variant: Variant::Coloring }, kind);
            }
            if entry.point_sprites.visible {
                push(DrawItem::Surface { entry: index, variant: Variant::Sprites }, PropKind::Scene);
            }
        }
        for (index, volume) in importer.volumes().iter().enumerate() {
            if volume.visible && volume.mapper.is_some() {
                push(DrawItem::Volume(index), PropKind::Scene);
            }
        }
        (items, props)
    }

    /// Renders the 3D scene at `width` x `height`. The result is sRGB encoded
    /// with premultiplied alpha; without background, uncovered pixels stay
    /// transparent.
    pub fn render_frame(
        &mut self,
        importer: &MetaImporter,
        width: u32,
        height: u32,
        with_background: bool,
        ui_only: bool,
    ) -> Layer {
        let (items, props) = self.collect_items(importer);
        let mut bounds = importer.bounds();
        if let Some(grid) = &self.grid {
            bounds.add_point(grid.origin);
        }
        self.camera.reset_clipping_range(&bounds);

        self.passes.set_props(props);
        self.passes.set_bounds(importer.bounds());
        self.passes
            .set_force_opaque_background(with_background && self.hdri.skybox().is_some());

        let factor = if self.anti_aliasing == AntiAliasing::Ssaa { 2 } else { 1 };
        let aspect = width.max(1) as f32 / height.max(1) as f32;
        let projection = self.camera.projection_matrix(aspect);
        let view_projection = projection * self.camera.view_matrix();
        let context = PassContext {
            width: width * factor,
            height: height * factor,
            projection,
        };

        let mut passes = std::mem::take(&mut self.passes);
        let mut frame = {
            let mut painter = ScenePainter::new(self, importer, &items, view_projection, factor as f32);
            passes.render(&context, &mut painter, ui_only && !self.scene_modified)
        };
        self.passes = passes;

        if factor > 1 {
            frame = frame.downsample(factor);
        }
        if self.use_tone_mapping {
            post::tone_map(&mut frame, &FilmicCurve::default());
        }
        if with_background && self.hdri.skybox().is_none() {
            post::solid_background(&mut frame, self.background_color);
        }
        if self.anti_aliasing == AntiAliasing::Fxaa {
            post::fxaa(&mut frame);
        }
        self.scene_modified = false;
        frame
    }

    /// Bounds, camera and grid placement as text.
    pub fn scene_description(&self, importer: &MetaImporter) -> String {
        let bounds = importer.bounds();
        let camera = &self.camera;
        let v = |v: Vec3| format!("{}, {}, {}", v.x, v.y, v.z);
        let mut description = String::new();
        if bounds.is_valid() {
            description.push_str(&format!(
                "Scene bounding box: {},{},{},{},{},{}\n",
                bounds.min.x, bounds.max.x, bounds.min.y, bounds.max.y, bounds.min.z, bounds.max.z
            ));
        } else {
            description.push_str("Scene bounding box: none\n");
        }
        description.push_str(&format!(
            "Camera position: {}\nCamera focal point: {}\nCamera view up: {}\nCamera view angle: {}\n\n",
            v(camera.position),
            v(camera.focal_point),
            v(camera.view_up),
            camera.view_angle
        ));
        description.push_str(&self.grid_info());
        description
    }
}

/// Borrowed view of the renderer used while the pass graph executes.
struct ScenePainter<'a> {
    renderer: &'a Renderer,
    importer: &'a MetaImporter,
    items: &'a [DrawItem],
    view_projection: Mat4,
    environment: LightingEnvironment<'a>,
    pixel_scale: f32,
}

struct SurfaceDraw<'a> {
    geometry: &'a PolyData,
    transform: Mat4,
    material: &'a Material,
    mapper: Option<&'a Mapper>,
    sprites: bool,
}

/// Per vertex colouring resolved from a mapper.
enum ScalarSource {
    None,
    Mapped { point_values: Option<Vec<f32>>, cell_values: Option<Vec<f32>> },
    Direct { point_colors: Option<Vec<Vec4>>, cell_colors: Option<Vec<Vec4>> },
}

fn mapped_values(array: &crate::dataset::DataArray, mode: VectorMode) -> Vec<f32> {
    (0..array.number_of_tuples())
        .map(|i| match mode {
            VectorMode::Magnitude => array.magnitude(i) as f32,
            VectorMode::Component(c) => array.scalar(i, c as i32) as f32,
        })
        .collect()
}

fn direct_colors(array: &crate::dataset::DataArray) -> Vec<Vec4> {
    let scale = if array.values().iter().any(|v| *v > 1.0) { 1.0 / 255.0 } else { 1.0 };
    (0..array.number_of_tuples())
        .map(|i| {
            let tuple = array.tuple(i);
            let c = |k: usize| (tuple.get(k).or(tuple.first()).copied().unwrap_or(1.0) * scale) as f32;
            let alpha = if tuple.len() == 4 { c(3) } else { 1.0 };
            let rgb = if tuple.len() == 2 { Vec3::splat(c(0)) } else { Vec3::new(c(0), c(1), c(2)) };
            Vec4::new(srgb_to_linear(rgb.x), srgb_to_linear(rgb.y), srgb_to_linear(rgb.z), alpha)
        })
        .collect()
}

impl ScalarSource {
    fn new(geometry: &PolyData, mapper: Option<&Mapper>) -> Self {
        let Some(mapper) = mapper.filter(|m| m.scalar_visibility) else {
            return Self::None;
        };
        let attributes = if mapper.use_cell_data {
            &geometry.cell_data
        } else {
            &geometry.point_data
        };
        let Some(array) = attributes.array(&mapper.array_name) else {
            return Self::None;
        };
        match mapper.color_mode {
            ColorMode::MapScalars => {
                let values = mapped_values(array, mapper.vector_mode);
                if mapper.use_cell_data {
                    Self::Mapped { point_values: None, cell_values: Some(values) }
                } else {
                    Self::Mapped { point_values: Some(values), cell_values: None }
                }
            }
            ColorMode::DirectScalars => {
                let colors = direct_colors(array);
                if mapper.use_cell_data {
                    Self::Direct { point_colors: None, cell_colors: Some(colors) }
                } else {
                    Self::Direct { point_colors: Some(colors), cell_colors: None }
                }
            }
        }
    }

    fn point_scalar(&self, point: usize) -> f32 {
        match self {
            Self::Mapped { point_values: Some(values), .. } => values.get(point).copied().unwrap_or(0.0),
            _ => 0.0,
        }
    }

    fn point_color(&self, point: usize) -> Option<Vec4> {
        match self {
            Self::Direct { point_colors: Some(colors), .. } => colors.get(point).copied(),
            _ => None,
        }
    }

    fn cell_scalar(&self, cell: usize) -> Option<f32> {
        match self {
            Self::Mapped { cell_values: Some(values), .. } => values.get(cell).copied(),
            _ => None,
        }
    }

    fn cell_color(&self, cell: usize) -> Option<Vec4> {
        match self {
            Self::Direct { cell_colors: Some(colors), .. } => colors.get(cell).copied(),
            _ => None,
        }
    }

    fn is_mapped(&self) -> bool {
        matches!(self, Self::Mapped { .. })
    }

    fn is_direct(&self) -> bool {
        matches!(self, Self::Direct { .. })
    }
}

impl<'a> ScenePainter<'a> {
    fn new(
        renderer: &'a Renderer,
        importer: &'a MetaImporter,
        items: &'a [DrawItem],
        view_projection: Mat4,
        pixel_scale: f32,
    ) -> Self {
        let mut lights = importer.lights();
        if lights.is_empty() {
            lights = shading::light_kit(&renderer.camera);
        }
        for light in &mut lights {
            light.intensity *= renderer.light_intensity;
        }
        let mut environment = LightingEnvironment::new(lights, renderer.camera.position);
        environment.ibl = renderer.hdri.lighting();
        if environment.ibl.is_some() {
            environment.ambient = 0.0;
        }
        Self {
            renderer,
            importer,
            items,
            view_projection,
            environment,
            pixel_scale,
        }
    }

    fn surface(&self, entry: usize, variant: Variant) -> Option<SurfaceDraw<'a>> {
        let record = self.importer.entries().get(entry)?;
        match variant {
            Variant::Original => {
                let actor = self.importer.actor(record.origin)?;
                Some(SurfaceDraw {
                    geometry: &actor.geometry,
                    transform: actor.transform,
                    material: self.renderer.materials.get(entry).unwrap_or(&actor.material),
                    mapper: None,
                    sprites: false,
                })
            }
            Variant::Coloring => Some(SurfaceDraw {
                geometry: &record.coloring.geometry,
                transform: record.coloring.transform,
                material: &record.coloring.material,
                mapper: Some(&record.coloring.mapper),
                sprites: false,
            }),
            Variant::Sprites => Some(SurfaceDraw {
                geometry: &record.point_sprites.geometry,
                transform: record.point_sprites.transform,
                material: &record.point_sprites.material,
                mapper: Some(&record.point_sprites.mapper),
                sprites: true,
            }),
        }
    }

    fn is_translucent(&self, surface: &SurfaceDraw<'_>) -> bool {
        surface.material.is_translucent()
            || (surface.sprites && self.renderer.sprite_shape == SpriteShape::Gaussian)
    }

    fn paint_skybox(&self, target: &mut Layer, environment: &EnvironmentMap) {
        let inverse = self.view_projection.inverse();
        let eye = self.renderer.camera.position;
        let (width, height) = (target.width(), target.height());
        for y in 0..height {
            for x in 0..width {
                let ndc = Vec2::new(
                    (x as f32 + 0.5) / width as f32 * 2.0 - 1.0,
                    1.0 - (y as f32 + 0.5) / height as f32 * 2.0,
                );
                let far = inverse * Vec4::new(ndc.x, ndc.y, 1.0, 1.0);
                if far.w.abs() < 1e-12 {
                    continue;
                }
                let direction = (far.xyz() / far.w - eye).normalize_or_zero();
                let index = (y * width + x) as usize;
                if target.depth[index] >= 1.0 {
                    target.color[index] = environment.sample(direction).extend(1.0);
                }
            }
        }
    }

    fn paint_grid(&self, target: &mut Layer, grid: &GridSetup) {
        let unit = grid.unit_square;
        let half_lines = ((grid.fade_distance / unit).ceil() as i32).clamp(1, 200);
        let extent = half_lines as f32 * unit;
        let state = RasterState {
            culling: Culling::None,
            depth: DepthMode::Translucent,
        };
        let vertex = |world: Vec3| RasterVertex {
            clip: self.view_projection * world.extend(1.0),
            world,
            normal: Vec3::Y,
            color: Vec4::ONE,
            uv: Vec2::ZERO,
            scalar: 0.0,
        };
        let origin = grid.origin;
        let fade = grid.fade_distance.max(f32::EPSILON);
        let mut shade = |fragment: &Fragment| {
            let distance = (fragment.world - origin).length();
            let alpha = (1.0 - distance / fade).clamp(0.0, 1.0) * 0.5;
            (alpha > 0.0).then(|| Vec4::new(0.8 * alpha, 0.8 * alpha, 0.8 * alpha, alpha))
        };
        for i in -half_lines..=half_lines {
            let offset = i as f32 * unit;
            let along_x = (
                origin + Vec3::new(-extent, 0.0, offset),
                origin + Vec3::new(extent, 0.0, offset),
            );
            let along_z = (
                origin + Vec3::new(offset, 0.0, -extent),
                origin + Vec3::new(offset, 0.0, extent),
            );
            for (from, to) in [along_x, along_z] {
                raster::draw_line(target, vertex(from), vertex(to), 1.0, state, &mut shade);
            }
        }
    }

    fn sample_surface(
        &self,
        surface: &SurfaceDraw<'_>,
        scalars: &ScalarSource,
        fragment: &Fragment,
        tangents: Option<(Vec3, Vec3)>,
        cell: Option<usize>,
    ) -> Option<Vec4> {
        let material = surface.material;
        let mut base_color = material.color;
        let mut opacity = material.opacity;

        if let Some(texture) = &material.base_color_texture {
            let texel = texture.sample(fragment.uv);
            base_color *= texel.xyz();
            opacity *= texel.w;
        }
        if scalars.is_mapped() {
            let value = cell.and_then(|c| scalars.cell_scalar(c)).unwrap_or(fragment.scalar);
            if let Some(lut) = surface.mapper.and_then(|m| m.lookup_table.as_ref()) {
                let color = lut.map(value as f64);
                base_color = Vec3::new(
                    srgb_to_linear(color.x),
                    srgb_to_linear(color.y),
                    srgb_to_linear(color.z),
                );
            }
        } else if scalars.is_direct() {
            let color = cell.and_then(|c| scalars.cell_color(c)).unwrap_or(fragment.color);
            base_color = color.xyz();
            opacity *= color.w;
        }

        let mut normal = fragment.normal;
        let mut bulge_alpha = 1.0;
        if surface.sprites {
            let (alpha, bulge) = self.renderer.sprite_shape.coverage(fragment.sprite)?;
            let camera = &self.renderer.camera;
            let right = camera.right();
            let forward = camera.direction_of_projection();
            let up = right.cross(forward).normalize_or_zero();
            normal = (right * bulge.x + up * bulge.y - forward * bulge.z).normalize_or_zero();
            bulge_alpha = alpha;
        } else if !fragment.front_facing {
            normal = -normal;
        }

        if let (Some(texture), Some((tangent, bitangent))) = (&material.normal_texture, tangents) {
            let texel = texture.sample(fragment.uv).xyz() * 2.0 - Vec3::ONE;
            let t = (tangent - normal * normal.dot(tangent)).normalize_or_zero();
            let b = bitangent.normalize_or_zero();
            let mapped = t * texel.x * material.normal_scale
                + b * texel.y * material.normal_scale
                + normal * texel.z;
            if mapped.length_squared() > 1e-8 {
                normal = mapped.normalize();
            }
        }

        let opacity = (opacity * bulge_alpha).clamp(0.0, 1.0);
        if opacity <= 0.0 {
            return None;
        }

        if let Some(matcap) = &material.matcap_texture {
            let color = matcap.sample(shading::matcap_uv(&self.renderer.camera, normal)).xyz();
            return Some((color * opacity).extend(opacity));
        }

        let mut sample = SurfaceSample {
            base_color,
            opacity,
            roughness: material.roughness,
            metallic: material.metallic,
            occlusion: 1.0,
            emissive: Vec3::ZERO,
            normal,
        };
        if let Some(texture) = &material.orm_texture {
            let texel = texture.sample(fragment.uv);
            sample.occlusion = texel.x;
            sample.roughness *= texel.y;
            sample.metallic *= texel.z;
        }
        if let Some(texture) = &material.emissive_texture {
            sample.emissive = material.emissive_factor * texture.sample(fragment.uv).xyz();
        }
        let color = shading::shade(&sample, fragment.world, &self.environment);
        Some((color * opacity).extend(opacity))
    }

    fn draw_surface(&self, target: &mut Layer, surface: &SurfaceDraw<'_>, depth: DepthMode, sort: bool) {
        let geometry = surface.geometry;
        let normal_matrix = Mat3::from_mat4(surface.transform.inverse().transpose());
        let normals = geometry.shading_normals();
        let scalars = ScalarSource::new(geometry, surface.mapper);

        let vertices: Vec<RasterVertex> = geometry
            .points
            .iter()
            .enumerate()
            .map(|(index, point)| {
                let world = surface.transform.transform_point3(*point);
                RasterVertex {
                    clip: self.view_projection * world.extend(1.0),
                    world,
                    normal: (normal_matrix * normals.get(index).copied().unwrap_or(Vec3::Z))
                        .normalize_or_zero(),
                    color: scalars.point_color(index).unwrap_or(Vec4::ONE),
                    uv: geometry
                        .tcoords
                        .as_ref()
                        .and_then(|tcoords| tcoords.get(index).copied())
                        .unwrap_or(Vec2::ZERO),
                    scalar: scalars.point_scalar(index),
                }
            })
            .collect();

        let state = RasterState {
            culling: self.renderer.culling,
            depth,
        };

        if surface.sprites {
            let size = self.renderer.sprite_size * self.pixel_scale;
            for vertex in &vertices {
                let mut shade = |fragment: &Fragment| self.sample_surface(surface, &scalars, fragment, None, None);
                raster::draw_point(target, *vertex, size, state, &mut shade);
            }
            return;
        }

        let mut triangles = geometry.triangles();
        if sort {
            // Back to front for translucent compositing.
            let eye = self.renderer.camera.position;
            let distance = |tri: &[u32; 3]| {
                tri.iter()
                    .filter_map(|&i| vertices.get(i as usize))
                    .map(|v| (v.world - eye).length_squared())
                    .sum::<f32>()
            };
            triangles.sort_by(|a, b| distance(&b.0).total_cmp(&distance(&a.0)));
        }
        for (triangle, cell) in &triangles {
            let Some(corners) = triangle_vertices(&vertices, triangle) else {
                continue;
            };
            let tangents = tangent_frame(&corners);
            let mut shade =
                |fragment: &Fragment| self.sample_surface(surface, &scalars, fragment, tangents, Some(*cell));
            raster::draw_triangle(target, corners, state, &mut shade);
        }

        let line_width = self.renderer.line_width * self.pixel_scale;
        let first_line_cell = geometry.polys.len();
        for (offset, line) in geometry.lines.iter().enumerate() {
            let cell = first_line_cell + offset;
            for pair in line.windows(2) {
                let (Some(a), Some(b)) = (vertices.get(pair[0] as usize), vertices.get(pair[1] as usize)) else {
                    continue;
                };
                let mut shade = |fragment: &Fragment| {
                    let mut unlit = *fragment;
                    unlit.normal = (self.renderer.camera.position - fragment.world).normalize_or_zero();
                    self.sample_surface(surface, &scalars, &unlit, None, Some(cell))
                };
                raster::draw_line(target, *a, *b, line_width, state, &mut shade);
            }
        }

        if geometry.polys.is_empty() && geometry.lines.is_empty() {
            let size = self.renderer.point_size * self.pixel_scale;
            for vertex in &vertices {
                let mut shade = |fragment: &Fragment| {
                    let mut facing = *fragment;
                    facing.normal = (self.renderer.camera.position - fragment.world).normalize_or_zero();
                    self.sample_surface(surface, &scalars, &facing, None, None)
                };
                raster::draw_point(target, *vertex, size, state, &mut shade);
            }
        }

        if self.renderer.show_edges {
            let edge_state = RasterState {
                culling: Culling::None,
                depth,
            };
            let mut shade = |_: &Fragment| Some(Vec4::new(0.0, 0.0, 0.0, 1.0));
            for poly in &geometry.polys {
                for (i, &from) in poly.iter().enumerate() {
                    let to = poly[(i + 1) % poly.len()];
                    if let (Some(a), Some(b)) = (vertices.get(from as usize), vertices.get(to as usize)) {
                        raster::draw_line(target, *a, *b, line_width, edge_state, &mut shade);
                    }
                }
            }
        }
    }

    fn surfaces(&self, props: &[PropId]) -> Vec<SurfaceDraw<'a>> {
        props
            .iter()
            .filter_map(|&id| match self.items.get(id) {
                Some(DrawItem::Surface { entry, variant }) => self.surface(*entry, *variant),
                _ => None,
            })
            .collect()
    }
}

fn triangle_vertices(vertices: &[RasterVertex], triangle: &[u32; 3]) -> Option<[RasterVertex; 3]> {
    Some([
        *vertices.get(triangle[0] as usize)?,
        *vertices.get(triangle[1] as usize)?,
        *vertices.get(triangle[2] as usize)?,
    ])
}

/// Tangent and bitangent from texture coordinate derivatives.
fn tangent_frame(corners: &[RasterVertex; 3]) -> Option<(Vec3, Vec3)> {
    let e1 = corners[1].world - corners[0].world;
    let e2 = corners[2].world - corners[0].world;
    let d1 = corners[1].uv - corners[0].uv;
    let d2 = corners[2].uv - corners[0].uv;
    let r = d1.x * d2.y - d2.x * d1.y;
    if r.abs() < 1e-12 {
        return None;
    }
    Some(((e1 * d2.y - e2 * d1.y) / r, (e2 * d1.x - e1 * d2.x) / r))
}

impl<'a> PropPainter for ScenePainter<'a> {
    fn paint(&mut self, stage: Stage, props: &[PropId], target: &mut Layer) {
        match stage {
            Stage::Lights => {}
            Stage::Opaque => {
                for &id in props {
                    match self.items.get(id) {
                        Some(DrawItem::Skybox) => {
                            if let Some(skybox) = self.renderer.hdri.skybox() {
                                self.paint_skybox(target, skybox);
                            }
                        }
                        Some(DrawItem::Surface { entry, variant }) => {
                            if let Some(surface) = self.surface(*entry, *variant) {
                                if !self.is_translucent(&surface) {
                                    self.draw_surface(target, &surface, DepthMode::Opaque, false);
                                }
                            }
                        }
                        _ => {}
                    }
                }
            }
            Stage::Translucent { depth_peeling } => {
                if props.iter().any(|&id| self.items.get(id) == Some(&DrawItem::Grid)) {
                    if let Some(grid) = &self.renderer.grid {
                        self.paint_grid(target, grid);
                    }
                }
                let mut translucent: Vec<SurfaceDraw<'a>> = self
                    .surfaces(props)
                    .into_iter()
                    .filter(|surface| self.is_translucent(surface))
                    .collect();
                if depth_peeling {
                    let eye = self.renderer.camera.position;
                    let distance = |surface: &SurfaceDraw<'_>| {
                        (surface.geometry.bounds().transformed(&surface.transform).center() - eye)
                            .length_squared()
                    };
                    translucent.sort_by(|a, b| distance(b).total_cmp(&distance(a)));
                }
                for surface in &translucent {
                    self.draw_surface(target, surface, DepthMode::Translucent, depth_peeling);
                }
            }
            Stage::Volumetric => {
                for &id in props {
                    if let Some(DrawItem::Volume(index)) = self.items.get(id) {
                        let Some(volume) = self.importer.volumes().get(*index) else {
                            continue;
                        };
                        if let Some(mapper) = &volume.mapper {
                            volume::render_volume(
                                target,
                                &volume.image,
                                volume.transform,
                                mapper,
                                self.view_projection,
                            );
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AntiAliasing, GridSetup, Renderer, SurfaceOverrides};
    use crate::dataset::{BoundingBox, PolyData};
    use crate::options::Options;
    use crate::render::dirty::Node;
    use crate::scene::{MetaImporter, Scene, SceneHost, AnimationHost};
    use glam::Vec3;

    #[derive(Default)]
    struct Host;

    impl AnimationHost for Host {
        fn set_animation_progress(&mut self, _progress: Option<f64>) {}
        fn on_time_changed(&mut self) {}
        fn request_render(&mut self) {}
        fn set_camera_movement_enabled(&mut self, _enabled: bool) {}
        fn invalidate_cheat_sheet(&mut self) {}
    }

    impl SceneHost for Host {
        fn set_load_progress(&mut self, _progress: Option<f64>) {}
        fn scene_loaded(&mut self, _importer: &mut MetaImporter, _reset_camera: bool) {}
        fn scene_cleared(&mut self) {}
    }

    fn triangle_scene() -> Scene {
        let mut poly = PolyData::new(vec![
            Vec3::new(-1.0, -1.0, 0.0),
            Vec3::new(1.0, -1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ]);
        poly.polys = vec![vec![0, 1, 2]];
        let mut scene = Scene::new();
        scene
            .add_mesh(poly, &Options::default(), &mut Host)
            .unwrap_or_else(|err| panic!("{err}"));
        scene
    }

    fn fresh_renderer(scene: &mut Scene) -> Renderer {
        let mut renderer = Renderer::new();
        renderer.apply_options(&Options::default());
        renderer.update(scene.importer_mut());
        let bounds = scene.importer().bounds();
        renderer.camera_mut().reset_to_bounds(&bounds);
        renderer
    }

    #[test]
    fn grid_unit_follows_scene_size() {
        let bounds = BoundingBox::from_points(&[Vec3::ZERO, Vec3::new(30.0, 40.0, 0.0)]);
        let grid = GridSetup::from_bounds(&bounds).unwrap_or_else(|| panic!("valid bounds"));
        assert_eq!(grid.unit_square, 10.0);
        assert!(grid.origin.y < 0.0);
        assert!(grid.description().starts_with("Using grid unit square size = 10\n"));
        assert!(GridSetup::from_bounds(&BoundingBox::empty()).is_none());
    }

    #[test]
    fn setters_only_invalidate_on_change() {
        let mut scene = triangle_scene();
        let mut renderer = fresh_renderer(&mut scene);
        assert!(!renderer.is_dirty(Node::ActorsProperties));

        renderer.apply_options(&Options::default());
        assert!(!renderer.is_dirty(Node::ActorsProperties));
        assert!(!renderer.is_dirty(Node::RenderPasses));

        let mut options = Options::default();
        options.ui.filename = true;
        renderer.apply_options(&options);
        assert!(!renderer.is_dirty(Node::RenderPasses));
        assert!(!renderer.is_dirty(Node::ActorsProperties));

        options.render.show_edges = true;
        renderer.apply_options(&options);
        assert!(renderer.is_dirty(Node::ActorsProperties));
        assert!(renderer.is_dirty(Node::ColoringActorsProperties));
    }

    #[test]
    fn filename_toggle_keeps_render_passes() {
        let mut scene = triangle_scene();
        let mut renderer = fresh_renderer(&mut scene);
        renderer.render_frame(scene.importer(), 8, 8, true, false);
        let initialized = renderer.render_passes().initialize_count();

        let mut options = Options::default();
        options.ui.filename = true;
        renderer.apply_options(&options);
        renderer.update(scene.importer_mut());
        renderer.render_frame(scene.importer(), 8, 8, true, true);
        assert_eq!(renderer.render_passes().initialize_count(), initialized);
        assert!(renderer.render_passes().initialize_time() >= renderer.render_passes().configuration_mtime());

        options.render.effect.ambient_occlusion = true;
        renderer.apply_options(&options);
        renderer.update(scene.importer_mut());
        renderer.render_frame(scene.importer(), 8, 8, true, false);
        assert_eq!(renderer.render_passes().initialize_count(), initialized + 1);
    }

    #[test]
    fn triangle_is_drawn_over_the_background() {
        let mut scene = triangle_scene();
        let mut renderer = fresh_renderer(&mut scene);
        let frame = renderer.render_frame(scene.importer(), 16, 16, true, false);
        let background = frame.pixel(0, 0);
        let center = frame.pixel(8, 9);
        assert_eq!(background.w, 1.0);
        assert!((background.x - 0.2).abs() < 1e-3);
        assert_ne!(center, background);

        let transparent = renderer.render_frame(scene.importer(), 16, 16, false, false);
        assert_eq!(transparent.pixel(0, 0).w, 0.0);
    }

    #[test]
    fn overrides_reach_materials_and_missing_textures_are_skipped() {
        let mut scene = triangle_scene();
        let mut renderer = fresh_renderer(&mut scene);
        renderer.set_surface_overrides(SurfaceOverrides {
            opacity: Some(0.5),
            roughness: Some(0.9),
            base_color_texture: Some("/nonexistent/texture.png".into()),
            ..SurfaceOverrides::default()
        });
        renderer.update(scene.importer_mut());
        let material = renderer.effective_material(0).unwrap_or_else(|| panic!("one actor"));
        assert_eq!(material.opacity, 0.5);
        assert_eq!(material.roughness, 0.9);
        assert!(material.base_color_texture.is_none());
        assert_eq!(scene.importer().entries()[0].coloring.material.opacity, 0.5);
    }

    #[test]
    fn translucent_surfaces_blend_with_the_background() {
        let mut scene = triangle_scene();
        let mut renderer = fresh_renderer(&mut scene);
        let opaque = renderer.render_frame(scene.importer(), 16, 16, true, false).pixel(8, 9);

        renderer.set_use_translucency(true);
        renderer.set_surface_overrides(SurfaceOverrides {
            opacity: Some(0.5),
            ..SurfaceOverrides::default()
        });
        renderer.update(scene.importer_mut());
        let frame = renderer.render_frame(scene.importer(), 16, 16, true, false);
        let background = frame.pixel(0, 0);
        let center = frame.pixel(8, 9);
        assert_ne!(center, background);
        assert_ne!(center, opaque);
        assert_eq!(center.w, 1.0);
    }

    #[test]
    fn ssaa_and_scene_description() {
        let mut scene = triangle_scene();
        let mut renderer = fresh_renderer(&mut scene);
        renderer.set_anti_aliasing(AntiAliasing::Ssaa);
        let frame = renderer.render_frame(scene.importer(), 6, 4, true, false);
        assert_eq!(frame.size(), [6, 4]);

        let description = renderer.scene_description(scene.importer());
        assert!(description.starts_with("Scene bounding box: -1,1,-1,1,0,0\n"));
        assert!(description.contains("Camera view angle: 30\n"));
    }

    #[test]
    fn unknown_backface_type_is_visible() {
        let mut renderer = Renderer::new();
        renderer.set_backface_type(Some("sideways".into()));
        assert!(renderer.is_dirty(Node::ActorsProperties));
        renderer.set_backface_type(Some("hidden".into()));
        assert_eq!(renderer.culling, super::Culling::Back);
    }
}
