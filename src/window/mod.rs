//! Render surface owning the scene, the renderer and the HUD.
//!
//! A [`Window`] is either offscreen (render once, save an image) or backs the
//! desktop shell, which copies [`Window::frame`] into its presentation buffer.

use crate::dataset::PolyData;
use crate::options::Options;
use crate::render::{Camera, ColoringRenderer};
use crate::scene::{AnimationHost, MetaImporter, Scene, SceneError, SceneHost};
use crate::ui::{Overlay, OverlayContent};
use image::RgbaImage;
use std::path::{Path, PathBuf};
use std::time::Instant;

pub const DEFAULT_SIZE: [u32; 2] = [1000, 600];
pub const DEFAULT_NAME: &str = "lumaview";

#[derive(Debug, thiserror::Error)]
pub enum WindowError {
    #[error(transparent)]
    Scene(#[from] SceneError),
    #[error("cannot decode window icon")]
    Icon(#[source] image::ImageError),
    #[error("cannot save image to {path}")]
    Save {
        path: String,
        #[source]
        source: image::ImageError,
    },
}

pub type Result<T> = std::result::Result<T, WindowError>;

/// Renderer and HUD state, notified by the scene while it loads and animates.
pub struct Viewport {
    renderer: ColoringRenderer,
    overlay: Overlay,
    size: [u32; 2],
    initial_camera: Camera,
    load_progress: Option<f64>,
    animation_progress: Option<f64>,
    fps: Option<f64>,
    render_requested: bool,
    camera_movement_enabled: bool,
}

impl Viewport {
    fn new() -> Self {
        Self {
            renderer: ColoringRenderer::new(),
            overlay: Overlay::new(),
            size: DEFAULT_SIZE,
            initial_camera: Camera::new(),
            load_progress: None,
            animation_progress: None,
            fps: None,
            render_requested: false,
            camera_movement_enabled: true,
        }
    }

    fn compose(&mut self, importer: &mut MetaImporter, with_background: bool, input: egui::RawInput) -> RgbaImage {
        let [width, height] = self.size;
        let layer = self
            .renderer
            .render_frame(importer, width, height, with_background, false);
        let mut image = layer.to_rgba8();

        let base = self.renderer.base();
        let content = OverlayContent {
            hud: base.hud(),
            fps: self.fps,
            scalar_bar: self.renderer.scalar_bar(),
            load_progress: self.load_progress,
            animation_progress: self.animation_progress,
            view: base.camera().view_matrix(),
        };
        self.overlay.draw(&mut image, &content, input);
        image
    }
}

impl AnimationHost for Viewport {
    fn set_animation_progress(&mut self, progress: Option<f64>) {
        self.animation_progress = progress;
    }

    fn on_time_changed(&mut self) {
        self.renderer.base_mut().set_scene_modified();
        self.render_requested = true;
    }

    fn request_render(&mut self) {
        self.render_requested = true;
    }

    fn set_camera_movement_enabled(&mut self, enabled: bool) {
        self.camera_movement_enabled = enabled;
    }

    fn invalidate_cheat_sheet(&mut self) {
        self.renderer.base_mut().invalidate_cheat_sheet();
    }
}

impl SceneHost for Viewport {
    fn set_load_progress(&mut self, progress: Option<f64>) {
        self.load_progress = progress;
    }

    fn scene_loaded(&mut self, importer: &mut MetaImporter, reset_camera: bool) {
        self.renderer.scene_loaded();
        let camera = self.renderer.base_mut().camera_mut();
        if let Some(imported) = importer.selected_camera() {
            *camera = Camera::from_imported(imported);
        } else if reset_camera {
            *camera = Camera::new();
            camera.reset_to_bounds(&importer.bounds());
        }
        self.initial_camera = camera.clone();
        self.render_requested = true;
    }

    fn scene_cleared(&mut self) {
        self.renderer.scene_loaded();
        self.render_requested = true;
    }
}

pub struct Window {
    scene: Scene,
    options: Options,
    viewport: Viewport,
    name: String,
    icon: Option<RgbaImage>,
    frame: RgbaImage,
    offscreen: bool,
}

impl Window {
    pub fn new(offscreen: bool) -> Self {
        Self::with_scene(Scene::new(), offscreen)
    }

    pub fn with_scene(scene: Scene, offscreen: bool) -> Self {
        let mut window = Self {
            scene,
            options: Options::default(),
            viewport: Viewport::new(),
            name: DEFAULT_NAME.to_string(),
            icon: None,
            frame: RgbaImage::new(0, 0),
            offscreen,
        };
        window.apply_options();
        window
    }

    pub fn is_offscreen(&self) -> bool {
        self.offscreen
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Changes are pushed to the renderer by [`Window::apply_options`].
    pub fn options_mut(&mut self) -> &mut Options {
        &mut self.options
    }

    pub fn set_options(&mut self, options: Options) {
        self.options = options;
        self.apply_options();
    }

    pub fn apply_options(&mut self) {
        self.viewport.renderer.apply_options(&self.options);
        self.scene.animation_mut().apply_options(&self.options);
        if !self.options.ui.filename_name.is_empty() {
            let name = self.options.ui.filename_name.clone();
            self.viewport.renderer.base_mut().set_filename(name);
        }
        self.viewport.render_requested = true;
    }

    /// Adds files to the scene; on failure the scene is left empty.
    pub fn load(&mut self, paths: &[PathBuf]) -> Result<()> {
        self.scene.add(paths, &self.options, &mut self.viewport)?;
        self.refresh_filename();
        Ok(())
    }

    pub fn load_mesh(&mut self, poly: PolyData) -> Result<()> {
        self.scene.add_mesh(poly, &self.options, &mut self.viewport)?;
        self.refresh_filename();
        Ok(())
    }

    pub fn clear(&mut self) {
        self.scene.clear(&mut self.viewport);
        self.refresh_filename();
    }

    fn refresh_filename(&mut self) {
        if !self.options.ui.filename_name.is_empty() {
            return;
        }
        let names: Vec<String> = self
            .scene
            .files()
            .iter()
            .map(|path| {
                path.file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string())
            })
            .collect();
        self.viewport.renderer.base_mut().set_filename(names.join(", "));
    }

    /// Forwarded to the readers created by later loads.
    pub fn set_reader_option(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.scene.registry_mut().set_reader_option(key, value);
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn renderer(&self) -> &ColoringRenderer {
        &self.viewport.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut ColoringRenderer {
        &mut self.viewport.renderer
    }

    /// Scene importer and renderer together, for operations needing both.
    pub fn renderer_and_importer(&mut self) -> (&mut ColoringRenderer, &mut MetaImporter) {
        (&mut self.viewport.renderer, self.scene.importer_mut())
    }

    pub fn camera(&self) -> &Camera {
        self.viewport.renderer.base().camera()
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        self.viewport.renderer.base_mut().camera_mut()
    }

    /// Back to the camera chosen when the scene was loaded.
    pub fn reset_camera(&mut self) {
        let initial = self.viewport.initial_camera.clone();
        *self.camera_mut() = initial;
        self.viewport.render_requested = true;
    }

    pub fn camera_movement_enabled(&self) -> bool {
        self.viewport.camera_movement_enabled
    }

    pub fn tick(&mut self, now: Instant) {
        self.scene.tick(now, &mut self.viewport);
    }

    pub fn toggle_animation(&mut self) {
        self.scene.toggle_animation(&mut self.viewport);
    }

    pub fn stop_animation(&mut self) {
        if self.scene.animation().is_playing() {
            self.scene.stop_animation(&mut self.viewport);
        }
    }

    pub fn cycle_animation(&mut self) {
        self.scene.cycle_animation(&mut self.viewport);
    }

    pub fn load_animation_time(&mut self, time: f64) -> bool {
        self.scene.load_animation_time(time, &mut self.viewport)
    }

    pub fn animation_name(&self) -> String {
        self.scene.animation_name()
    }

    pub fn next_animation_deadline(&self, now: Instant) -> Option<Instant> {
        self.scene.animation().next_deadline(now)
    }

    pub fn set_fps(&mut self, fps: Option<f64>) {
        self.viewport.fps = fps;
    }

    pub fn request_render(&mut self) {
        self.viewport.render_requested = true;
    }

    /// Whether something asked for a new frame since the last call.
    pub fn take_render_request(&mut self) -> bool {
        std::mem::take(&mut self.viewport.render_requested)
    }

    pub fn size(&self) -> [u32; 2] {
        self.viewport.size
    }

    pub fn set_size(&mut self, width: u32, height: u32) {
        let size = [width.max(1), height.max(1)];
        if self.viewport.size != size {
            self.viewport.size = size;
            self.viewport.renderer.base_mut().set_scene_modified();
            self.viewport.render_requested = true;
        }
    }

    /// Decodes an icon from encoded image bytes (PNG, ICO, ...).
    pub fn set_icon(&mut self, bytes: &[u8]) -> Result<()> {
        let icon = image::load_from_memory(bytes).map_err(WindowError::Icon)?;
        self.icon = Some(icon.to_rgba8());
        Ok(())
    }

    pub fn icon(&self) -> Option<&RgbaImage> {
        self.icon.as_ref()
    }

    pub fn set_window_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn window_name(&self) -> &str {
        &self.name
    }

    /// Renders a frame with the background and HUD into [`Window::frame`].
    pub fn render(&mut self) -> bool {
        let [width, height] = self.viewport.size;
        self.render_with_input(Overlay::offscreen_input(width, height, 1.0))
    }

    /// Same as [`Window::render`], with egui input coming from the platform.
    pub fn render_with_input(&mut self, input: egui::RawInput) -> bool {
        self.frame = self.viewport.compose(self.scene.importer_mut(), true, input);
        true
    }

    /// egui context the HUD runs in, for platform input bridging.
    pub fn ui_context(&self) -> &egui::Context {
        self.viewport.overlay.context()
    }

    /// Last rendered frame, straight alpha sRGB.
    pub fn frame(&self) -> &RgbaImage {
        &self.frame
    }

    pub fn render_to_image(&mut self, no_background: bool) -> RgbaImage {
        let [width, height] = self.viewport.size;
        let input = Overlay::offscreen_input(width, height, 1.0);
        self.viewport
            .compose(self.scene.importer_mut(), !no_background, input)
    }

    pub fn save_png(&mut self, path: &Path, no_background: bool) -> Result<()> {
        let image = self.render_to_image(no_background);
        image
            .save_with_format(path, image::ImageFormat::Png)
            .map_err(|source| WindowError::Save {
                path: path.display().to_string(),
                source,
            })?;
        log::info!("Saved rendering to {}", path.display());
        Ok(())
    }

    /// Bounds, camera, grid and coloring state as text.
    pub fn scene_description(&mut self) -> String {
        let importer = self.scene.importer_mut();
        let renderer = &self.viewport.renderer;
        let mut description = renderer.base().scene_description(importer);
        description.push_str(&renderer.coloring_description(importer));
        description
    }

    /// Cheat sheet lines for the renderer: the coloring state followed by `bindings`.
    pub fn refresh_cheat_sheet(&mut self, bindings: &[String]) {
        let renderer = &mut self.viewport.renderer;
        if !renderer.base().cheat_sheet_outdated() {
            return;
        }
        let importer = self.scene.importer_mut();
        let mut lines = renderer.cheat_sheet_lines(importer);
        lines.extend(bindings.iter().cloned());
        renderer.base_mut().set_cheat_sheet(lines);
    }
}

#[cfg(test)]
mod tests {
    use super::{Window, WindowError};
    use crate::dataset::PolyData;
    use crate::scene::SceneError;
    use glam::Vec3;
    use std::io::Cursor;
    use std::path::PathBuf;

    fn triangle() -> PolyData {
        let mut poly = PolyData::new(vec![
            Vec3::new(-1.0, -1.0, 0.0),
            Vec3::new(1.0, -1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ]);
        poly.polys = vec![vec![0, 1, 2]];
        poly
    }

    fn small_window() -> Window {
        let mut window = Window::new(true);
        window.set_size(40, 30);
        window
            .load_mesh(triangle())
            .unwrap_or_else(|err| panic!("{err}"));
        window
    }

    #[test]
    fn loading_frames_the_scene() {
        let window = small_window();
        let camera = window.camera();
        assert!(camera.focal_point.distance(Vec3::ZERO) < 1e-5);
        assert!(camera.position.z > 1.0);
    }

    #[test]
    fn render_to_image_with_and_without_background() {
        let mut window = small_window();
        let with_background = window.render_to_image(false);
        assert_eq!(with_background.dimensions(), (40, 30));
        assert_eq!(with_background.get_pixel(0, 0).0, [51, 51, 51, 255]);
        assert!(with_background.get_pixel(20, 15).0 != [51, 51, 51, 255]);

        let transparent = window.render_to_image(true);
        assert_eq!(transparent.get_pixel(0, 0).0[3], 0);
        assert!(transparent.get_pixel(20, 15).0[3] > 0);
    }

    #[test]
    fn render_fills_the_frame() {
        let mut window = small_window();
        assert!(window.render());
        assert_eq!(window.frame().dimensions(), (40, 30));
    }

    #[test]
    fn missing_file_fails_the_load() {
        let mut window = Window::new(true);
        let missing = PathBuf::from("/nonexistent/lumaview/missing.ply");
        let result = window.load(&[missing]);
        assert!(matches!(result, Err(WindowError::Scene(SceneError::Missing(_)))));
        assert!(window.scene().files().is_empty());
    }

    #[test]
    fn icon_must_be_an_image() {
        let mut window = Window::new(true);
        assert!(matches!(window.set_icon(b"not an image"), Err(WindowError::Icon(_))));

        let mut bytes = Vec::new();
        image::RgbaImage::from_pixel(4, 4, image::Rgba([255, 0, 0, 255]))
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap_or_else(|err| panic!("{err}"));
        window.set_icon(&bytes).unwrap_or_else(|err| panic!("{err}"));
        assert_eq!(window.icon().map(|icon| icon.dimensions()), Some((4, 4)));
    }

    #[test]
    fn png_is_written() {
        let mut window = small_window();
        let path = std::env::temp_dir().join(format!(
            "lumaview-window-{}-{}.png",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_nanos())
                .unwrap_or_default()
        ));
        window.save_png(&path, false).unwrap_or_else(|err| panic!("{err}"));
        let image = image::open(&path).unwrap_or_else(|err| panic!("{err}"));
        assert_eq!((image.width(), image.height()), (40, 30));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn camera_reset_restores_the_loaded_view() {
        let mut window = small_window();
        let loaded = window.camera().clone();
        window.camera_mut().azimuth(45.0);
        assert_ne!(window.camera().position, loaded.position);
        window.reset_camera();
        assert_eq!(window.camera().position, loaded.position);
    }

    #[test]
    fn description_includes_coloring() {
        let mut window = small_window();
        let description = window.scene_description();
        assert!(description.starts_with("Scene bounding box: -1,1,-1,1,0,0\n"));
        assert!(description.ends_with("Not coloring\n"));
    }
}
