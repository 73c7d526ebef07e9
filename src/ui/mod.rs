//! Heads-up display drawn over the 3D frame with egui: filename, metadata,
//! cheat sheet, scalar bar, FPS counter, progress bars, drop zone and axes.

use crate::render::{EguiPainter, HudState, ScalarBar};
use egui::{Align2, Color32, FontId, Pos2, Rect, Stroke};
use glam::{Mat4, Vec3};
use image::RgbaImage;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

pub const DROPZONE_TEXT: &str = "Drop a file or HDRI to load it\nPress H to show cheatsheet";

const PANEL_FILL: Color32 = Color32::from_rgba_premultiplied(0, 0, 0, 160);
const TEXT_COLOR: Color32 = Color32::WHITE;
const BASE_FONT_SIZE: f32 = 14.0;
const SCALAR_BAR_SAMPLES: usize = 64;

/// Everything the HUD may show for one frame.
#[derive(Debug, Clone, Copy)]
pub struct OverlayContent<'a> {
    pub hud: &'a HudState,
    pub fps: Option<f64>,
    pub scalar_bar: Option<&'a ScalarBar>,
    pub load_progress: Option<f64>,
    pub animation_progress: Option<f64>,
    /// View matrix of the camera, used by the orientation axes.
    pub view: Mat4,
}

impl OverlayContent<'_> {
    /// Whether drawing would leave the frame untouched.
    pub fn is_empty(&self) -> bool {
        let hud = self.hud;
        !(hud.filename_visible && !hud.filename.is_empty())
            && !(hud.metadata_visible && !hud.metadata.is_empty())
            && !(hud.cheat_sheet_visible && !hud.cheat_sheet.is_empty())
            && !(hud.fps_visible && self.fps.is_some())
            && !hud.dropzone_visible
            && !hud.axes_visible
            && self.scalar_bar.is_none()
            && self.load_progress.is_none()
            && self.animation_progress.is_none()
    }

    /// Changes whenever the size of an anchored panel may change.
    fn layout_key(&self) -> u64 {
        let hud = self.hud;
        let mut hasher = DefaultHasher::new();
        (hud.filename_visible, &hud.filename).hash(&mut hasher);
        (hud.metadata_visible, &hud.metadata).hash(&mut hasher);
        (hud.cheat_sheet_visible, &hud.cheat_sheet).hash(&mut hasher);
        (hud.fps_visible, self.fps.map(|fps| fps.round() as i64)).hash(&mut hasher);
        hud.font_scale.to_bits().hash(&mut hasher);
        hasher.finish()
    }
}

/// egui context plus the software painter drawing into frames.
pub struct Overlay {
    context: egui::Context,
    painter: EguiPainter,
    layout_key: Option<u64>,
}

impl Default for Overlay {
    fn default() -> Self {
        Self::new()
    }
}

impl Overlay {
    pub fn new() -> Self {
        Self {
            context: egui::Context::default(),
            painter: EguiPainter::new(),
            layout_key: None,
        }
    }

    pub fn context(&self) -> &egui::Context {
        &self.context
    }

    /// Input covering a `width` x `height` pixel frame, for offscreen rendering.
    pub fn offscreen_input(width: u32, height: u32, pixels_per_point: f32) -> egui::RawInput {
        let ppp = pixels_per_point.max(0.01);
        egui::RawInput {
            screen_rect: Some(Rect::from_min_size(
                Pos2::ZERO,
                egui::vec2(width as f32 / ppp, height as f32 / ppp),
            )),
            ..Default::default()
        }
    }

    /// Runs the HUD for `input` and paints it over `frame`.
    pub fn draw(&mut self, frame: &mut RgbaImage, content: &OverlayContent<'_>, input: egui::RawInput) {
        if content.is_empty() {
            return;
        }
        // Anchored areas are placed from their previous size: lay out once more when it changed.
        let key = content.layout_key();
        if self.layout_key != Some(key) {
            let sizing = self.context.run(input.clone(), |ctx| show(ctx, content));
            self.painter.apply_textures(&sizing.textures_delta);
            self.layout_key = Some(key);
        }
        let output = self.context.run(input, |ctx| show(ctx, content));
        let pixels_per_point = output.pixels_per_point;
        let primitives = self.context.tessellate(output.shapes, pixels_per_point);
        self.painter.apply_textures(&output.textures_delta);
        self.painter.paint(frame, &primitives, pixels_per_point);
    }
}

fn font(hud: &HudState, monospace: bool) -> FontId {
    let size = BASE_FONT_SIZE * hud.font_scale.max(0.1);
    if monospace {
        FontId::monospace(size)
    } else {
        FontId::proportional(size)
    }
}

fn panel(ctx: &egui::Context, id: &str, anchor: Align2, offset: [f32; 2], text: &str, font: FontId) {
    egui::Area::new(egui::Id::new(id))
        .anchor(anchor, offset)
        .interactable(false)
        .show(ctx, |ui| {
            egui::Frame::default()
                .fill(PANEL_FILL)
                .inner_margin(6.0)
                .show(ui, |ui| {
                    ui.label(egui::RichText::new(text).font(font).color(TEXT_COLOR));
                });
        });
}

fn show(ctx: &egui::Context, content: &OverlayContent<'_>) {
    let hud = content.hud;
    if hud.filename_visible && !hud.filename.is_empty() {
        panel(ctx, "filename", Align2::CENTER_TOP, [0.0, 8.0], &hud.filename, font(hud, false));
    }
    if hud.metadata_visible && !hud.metadata.is_empty() {
        panel(
            ctx,
            "metadata",
            Align2::RIGHT_CENTER,
            [-8.0, 0.0],
            hud.metadata.trim_end(),
            font(hud, true),
        );
    }
    if hud.cheat_sheet_visible && !hud.cheat_sheet.is_empty() {
        panel(
            ctx,
            "cheatsheet",
            Align2::LEFT_CENTER,
            [8.0, 0.0],
            &hud.cheat_sheet.join("\n"),
            font(hud, true),
        );
    }
    if let (true, Some(fps)) = (hud.fps_visible, content.fps) {
        panel(
            ctx,
            "fps",
            Align2::RIGHT_BOTTOM,
            [-8.0, -8.0],
            &format!("{} fps", fps.round() as i64),
            font(hud, false),
        );
    }
    if hud.dropzone_visible {
        show_dropzone(ctx, hud);
    }
    if let Some(bar) = content.scalar_bar {
        show_scalar_bar(ctx, hud, bar);
    }
    if hud.axes_visible {
        show_axes(ctx, content.view);
    }
    let painter = ctx.layer_painter(egui::LayerId::new(egui::Order::Foreground, egui::Id::new("progress")));
    let screen = ctx.screen_rect();
    if let Some(progress) = content.load_progress {
        progress_bar(&painter, screen, screen.top() + 2.0, progress, Color32::WHITE);
    }
    if let Some(progress) = content.animation_progress {
        progress_bar(&painter, screen, screen.bottom() - 6.0, progress, Color32::from_rgb(120, 170, 255));
    }
}

fn progress_bar(painter: &egui::Painter, screen: Rect, top: f32, progress: f64, color: Color32) {
    let progress = progress.clamp(0.0, 1.0) as f32;
    let width = screen.width() * progress;
    if width <= 0.0 {
        return;
    }
    let rect = Rect::from_min_size(egui::pos2(screen.left(), top), egui::vec2(width, 4.0));
    painter.rect_filled(rect, 0.0, color);
}

fn show_dropzone(ctx: &egui::Context, hud: &HudState) {
    let screen = ctx.screen_rect();
    let painter = ctx.layer_painter(egui::LayerId::new(egui::Order::Background, egui::Id::new("dropzone")));
    let frame = screen.shrink(screen.width().min(screen.height()) * 0.1);
    let stroke = Stroke::new(2.0, Color32::WHITE);
    let corners = [frame.left_top(), frame.right_top(), frame.right_bottom(), frame.left_bottom()];
    for (i, corner) in corners.iter().enumerate() {
        painter.line_segment([*corner, corners[(i + 1) % 4]], stroke);
    }
    painter.text(frame.center(), Align2::CENTER_CENTER, DROPZONE_TEXT, font(hud, false), TEXT_COLOR);
}

fn to_color32(color: Vec3) -> Color32 {
    let c = color.clamp(Vec3::ZERO, Vec3::ONE) * 255.0;
    Color32::from_rgb(c.x.round() as u8, c.y.round() as u8, c.z.round() as u8)
}

fn format_bound(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e9 {
        format!("{}", value as i64)
    } else {
        format!("{:.3}", value)
    }
}

fn show_scalar_bar(ctx: &egui::Context, hud: &HudState, bar: &ScalarBar) {
    let screen = ctx.screen_rect();
    let painter = ctx.layer_painter(egui::LayerId::new(egui::Order::Middle, egui::Id::new("scalar_bar")));
    let width = screen.width() * 0.4;
    let height = 14.0 * hud.font_scale.max(0.1);
    let left = screen.center().x - width * 0.5;
    let top = screen.bottom() - height * 2.5 - 12.0;

    let colors = bar.lookup_table.table(SCALAR_BAR_SAMPLES);
    let step = width / colors.len().max(1) as f32;
    for (i, color) in colors.iter().enumerate() {
        let rect = Rect::from_min_size(
            egui::pos2(left + i as f32 * step, top),
            egui::vec2(step + 0.5, height),
        );
        painter.rect_filled(rect, 0.0, to_color32(*color));
    }

    let text_font = font(hud, false);
    painter.text(
        egui::pos2(screen.center().x, top - 2.0),
        Align2::CENTER_BOTTOM,
        &bar.title,
        text_font.clone(),
        TEXT_COLOR,
    );
    painter.text(
        egui::pos2(left, top + height + 2.0),
        Align2::LEFT_TOP,
        format_bound(bar.range[0]),
        text_font.clone(),
        TEXT_COLOR,
    );
    painter.text(
        egui::pos2(left + width, top + height + 2.0),
        Align2::RIGHT_TOP,
        format_bound(bar.range[1]),
        text_font,
        TEXT_COLOR,
    );
}

fn show_axes(ctx: &egui::Context, view: Mat4) {
    let screen = ctx.screen_rect();
    let painter = ctx.layer_painter(egui::LayerId::new(egui::Order::Middle, egui::Id::new("axes")));
    let length = screen.width().min(screen.height()) * 0.08;
    let origin = egui::pos2(screen.left() + length * 1.5, screen.bottom() - length * 1.5);
    let axes = [
        (Vec3::X, Color32::from_rgb(230, 60, 60), "X"),
        (Vec3::Y, Color32::from_rgb(60, 200, 60), "Y"),
        (Vec3::Z, Color32::from_rgb(70, 110, 240), "Z"),
    ];
    for (axis, color, label) in axes {
        let direction = view.transform_vector3(axis);
        let tip = origin + egui::vec2(direction.x, -direction.y) * length;
        painter.line_segment([origin, tip], Stroke::new(2.0, color));
        painter.text(tip, Align2::CENTER_CENTER, label, FontId::proportional(11.0), color);
    }
}

#[cfg(test)]
mod tests {
    use super::{format_bound, Overlay, OverlayContent};
    use crate::render::{ColorTransferFunction, HudState, ScalarBar};
    use glam::Mat4;
    use image::{Rgba, RgbaImage};
    use std::sync::Arc;

    const BACKGROUND: Rgba<u8> = Rgba([10, 20, 30, 255]);

    fn content<'a>(hud: &'a HudState, bar: Option<&'a ScalarBar>) -> OverlayContent<'a> {
        OverlayContent {
            hud,
            fps: None,
            scalar_bar: bar,
            load_progress: None,
            animation_progress: None,
            view: Mat4::IDENTITY,
        }
    }

    fn draw(content: &OverlayContent<'_>) -> RgbaImage {
        let mut frame = RgbaImage::from_pixel(200, 120, BACKGROUND);
        let mut overlay = Overlay::new();
        overlay.draw(&mut frame, content, Overlay::offscreen_input(200, 120, 1.0));
        frame
    }

    #[test]
    fn empty_hud_leaves_the_frame_untouched() {
        let hud = HudState::default();
        let content = content(&hud, None);
        assert!(content.is_empty());
        let frame = draw(&content);
        assert!(frame.pixels().all(|p| *p == BACKGROUND));
    }

    #[test]
    fn cheat_sheet_is_drawn_on_the_left() {
        let hud = HudState {
            cheat_sheet_visible: true,
            cheat_sheet: vec![" H: Help".into()],
            ..HudState::default()
        };
        let frame = draw(&content(&hud, None));
        let changed_left = (0..100).any(|x| (0..120).any(|y| *frame.get_pixel(x, y) != BACKGROUND));
        let changed_right = (150..200).any(|x| (0..120).any(|y| *frame.get_pixel(x, y) != BACKGROUND));
        assert!(changed_left);
        assert!(!changed_right);
    }

    #[test]
    fn scalar_bar_shows_the_lookup_table() {
        let hud = HudState::default();
        let bar = ScalarBar {
            title: "height (Magnitude)".into(),
            lookup_table: Arc::new(ColorTransferFunction::default()),
            range: [0.0, 1.0],
        };
        let frame = draw(&content(&hud, Some(&bar)));
        let top = 120.0 - 14.0 * 2.5 - 12.0;
        let y = (top + 7.0) as u32;
        let dark = frame.get_pixel(62, y).0[0];
        let light = frame.get_pixel(138, y).0[0];
        assert!(light > dark + 100, "dark {dark} light {light}");
    }

    #[test]
    fn bounds_are_printed_compactly() {
        assert_eq!(format_bound(1.0), "1");
        assert_eq!(format_bound(0.25), "0.250");
    }
}
