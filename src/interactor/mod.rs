//! User interaction: key bindings, string commands, command scripts, dropped
//! files and mouse driven camera manipulation on top of a [`Window`].

pub mod bindings;
pub mod commands;

pub use bindings::{Binding, BindingDoc, Bindings, InteractionBind, ModifierKeys};
pub use commands::{tokenize, CommandError, CommandFn, CommandRegistry};

use crate::window::Window;
use glam::Vec3;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

const ALIAS_DEPTH: usize = 16;
const ZOOM_STEP: f32 = 1.1;

pub struct Interactor {
    window: Window,
    commands: CommandRegistry,
    bindings: Bindings,
    aliases: HashMap<String, Vec<String>>,
    stopped: bool,
}

impl Interactor {
    pub fn new(window: Window) -> Self {
        Self {
            window,
            commands: CommandRegistry::with_defaults(),
            bindings: Bindings::with_defaults(),
            aliases: HashMap::new(),
            stopped: false,
        }
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn window_mut(&mut self) -> &mut Window {
        &mut self.window
    }

    pub fn into_window(self) -> Window {
        self.window
    }

    pub fn commands_mut(&mut self) -> &mut CommandRegistry {
        &mut self.commands
    }

    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    pub fn bindings_mut(&mut self) -> &mut Bindings {
        self.window.renderer_mut().base_mut().invalidate_cheat_sheet();
        &mut self.bindings
    }

    pub fn add_alias(&mut self, name: &str, tokens: Vec<String>) {
        self.aliases.insert(name.to_string(), tokens);
    }

    pub fn stop(&mut self) {
        self.stopped = true;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Runs one command line such as `set render.show-edges true`.
    pub fn trigger_command(&mut self, line: &str) -> commands::Result<()> {
        let tokens = tokenize(line)?;
        self.run_tokens(tokens)
    }

    fn run_tokens(&mut self, mut tokens: Vec<String>) -> commands::Result<()> {
        let mut depth = 0;
        while let Some(expansion) = tokens.first().and_then(|name| self.aliases.get(name)) {
            depth += 1;
            if depth > ALIAS_DEPTH {
                return Err(CommandError::AliasLoop(tokens[0].clone()));
            }
            let mut expanded = expansion.clone();
            expanded.extend(tokens.drain(1..));
            tokens = expanded;
        }
        let Some((name, args)) = tokens.split_first() else {
            return Ok(());
        };
        let action = self
            .commands
            .get(name)
            .ok_or_else(|| CommandError::Unknown(name.clone()))?;
        log::debug!("Running command: {}", tokens.join(" "));
        action(self, args)?;
        self.window.renderer_mut().base_mut().invalidate_cheat_sheet();
        self.window.request_render();
        Ok(())
    }

    /// Runs the commands bound to `key`. Returns whether a binding exists.
    pub fn trigger_key(&mut self, modifiers: ModifierKeys, key: &str) -> bool {
        let Some(binding) = self.bindings.lookup(modifiers, key) else {
            log::debug!("No binding for {modifiers:?}+{key}");
            return false;
        };
        let commands = binding.commands.clone();
        for command in commands {
            if let Err(err) = self.trigger_command(&command) {
                log::error!("{err}");
            }
        }
        true
    }

    /// Runs every line of a command script, skipping blank lines and `#`
    /// comments. Failing commands are logged and the script goes on.
    /// Returns how many commands succeeded.
    pub fn play_script(&mut self, path: &Path) -> commands::Result<usize> {
        let text = std::fs::read_to_string(path).map_err(|source| CommandError::Script {
            path: path.display().to_string(),
            source,
        })?;
        Ok(self.play_commands(&text))
    }

    pub fn play_commands(&mut self, text: &str) -> usize {
        let mut succeeded = 0;
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match self.trigger_command(line) {
                Ok(()) => succeeded += 1,
                Err(err) => log::error!("{err}"),
            }
        }
        succeeded
    }

    /// Loads files dropped on the window.
    pub fn drop_files(&mut self, paths: &[PathBuf]) {
        if paths.is_empty() {
            return;
        }
        let mut tokens = vec!["add_files".to_string()];
        tokens.extend(paths.iter().map(|path| path.display().to_string()));
        if let Err(err) = self.run_tokens(tokens) {
            log::error!("{err}");
        }
    }

    /// Orbits by a mouse drag of `dx`, `dy` pixels.
    pub fn rotate_camera(&mut self, dx: f32, dy: f32) {
        if !self.window.camera_movement_enabled() {
            return;
        }
        let degrees_per_pixel = 180.0 / self.window.size()[1] as f32;
        let trackball = self.window.options().interactor.trackball;
        self.window
            .camera_mut()
            .rotate(dx * degrees_per_pixel, dy * degrees_per_pixel, trackball, Vec3::Y);
        self.window.request_render();
    }

    pub fn pan_camera(&mut self, dx: f32, dy: f32) {
        if !self.window.camera_movement_enabled() {
            return;
        }
        let height = self.window.size()[1] as f32;
        self.window.camera_mut().pan(dx / height, dy / height);
        self.window.request_render();
    }

    /// Dollies by wheel `steps`, positive moving closer unless zoom is inverted.
    pub fn zoom_camera(&mut self, steps: f32) {
        if !self.window.camera_movement_enabled() || steps == 0.0 {
            return;
        }
        let steps = if self.window.options().interactor.invert_zoom {
            -steps
        } else {
            steps
        };
        self.window.camera_mut().dolly(ZOOM_STEP.powf(steps));
        self.window.request_render();
    }

    pub fn tick(&mut self, now: Instant) {
        self.window.tick(now);
    }

    fn refresh_cheat_sheet(&mut self) {
        if self.window.renderer().base().cheat_sheet_outdated() {
            let lines = self.bindings.cheat_sheet_lines(&self.window);
            self.window.refresh_cheat_sheet(&lines);
        }
    }

    pub fn render(&mut self) -> bool {
        self.refresh_cheat_sheet();
        self.window.render()
    }

    pub fn render_with_input(&mut self, input: egui::RawInput) -> bool {
        self.refresh_cheat_sheet();
        self.window.render_with_input(input)
    }

    /// Renders offscreen and writes a PNG.
    pub fn save_png(&mut self, path: &Path, no_background: bool) -> commands::Result<()> {
        self.refresh_cheat_sheet();
        self.window.save_png(path, no_background)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{CommandError, Interactor, ModifierKeys};
    use crate::dataset::{DataArray, PolyData};
    use crate::window::Window;
    use glam::Vec3;
    use std::path::PathBuf;

    fn interactor() -> Interactor {
        let mut poly = PolyData::new(vec![
            Vec3::new(-1.0, -1.0, 0.0),
            Vec3::new(1.0, -1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ]);
        poly.polys = vec![vec![0, 1, 2]];
        poly.point_data.add_array(
            DataArray::new("height", 1, vec![0.0, 1.0, 2.0]).unwrap_or_else(|err| panic!("{err}")),
        );
        let mut window = Window::new(true);
        window.set_size(40, 30);
        window.load_mesh(poly).unwrap_or_else(|err| panic!("{err}"));
        Interactor::new(window)
    }

    #[test]
    fn set_toggle_and_reset_update_options() {
        let mut interactor = interactor();
        interactor.trigger_command("set render.light.intensity 2.5").unwrap();
        assert_eq!(interactor.window().options().render.light.intensity, 2.5);
        interactor.trigger_command("toggle ui.fps").unwrap();
        assert!(interactor.window().options().ui.fps);
        interactor.trigger_command("reset render.light.intensity").unwrap();
        assert_eq!(interactor.window().options().render.light.intensity, 1.0);
    }

    #[test]
    fn malformed_commands_are_reported() {
        let mut interactor = interactor();
        assert!(matches!(
            interactor.trigger_command("frobnicate"),
            Err(CommandError::Unknown(name)) if name == "frobnicate"
        ));
        assert!(matches!(
            interactor.trigger_command("set ui.fps"),
            Err(CommandError::ArgumentCount { expected: 2, .. })
        ));
        assert!(matches!(
            interactor.trigger_command("cycle_coloring colors"),
            Err(CommandError::InvalidArgument { .. })
        ));
        assert!(matches!(
            interactor.trigger_command("roll_camera quarter"),
            Err(CommandError::InvalidArgument { .. })
        ));
        assert!(matches!(
            interactor.trigger_command("toggle render.light.intensity"),
            Err(CommandError::Options(_))
        ));
        assert!(interactor.trigger_command("   ").is_ok());
    }

    #[test]
    fn keys_trigger_their_commands() {
        let mut interactor = interactor();
        assert!(interactor.trigger_key(ModifierKeys::None, "E"));
        assert!(interactor.window().options().render.show_edges);
        assert!(interactor.trigger_key(ModifierKeys::None, "L"));
        assert!((interactor.window().options().render.light.intensity - 1.05).abs() < 1e-9);
        assert!(interactor.trigger_key(ModifierKeys::Shift, "P"));
        let opacity = interactor.window().options().model.color.opacity.unwrap();
        assert!((opacity - 0.95).abs() < 1e-9);
        assert!(!interactor.trigger_key(ModifierKeys::None, "F12"));
        assert!(!interactor.is_stopped());
        assert!(interactor.trigger_key(ModifierKeys::Ctrl, "Q"));
        assert!(interactor.is_stopped());
    }

    #[test]
    fn cycling_coloring_syncs_options() {
        let mut interactor = interactor();
        assert!(!interactor.window().options().model.scivis.enable);
        interactor.trigger_command("cycle_coloring array").unwrap();
        let scivis = &interactor.window().options().model.scivis;
        assert!(scivis.enable);
        assert!(!scivis.cells);
        assert_eq!(scivis.array_name.as_deref(), Some("height"));
        let (renderer, importer) = interactor.window_mut().renderer_and_importer();
        assert_eq!(renderer.array_index(importer), 0);
    }

    #[test]
    fn camera_commands_move_the_camera() {
        let mut interactor = interactor();
        interactor.trigger_command("set_camera top").unwrap();
        let camera = interactor.window().camera();
        let direction = (camera.position - camera.focal_point).normalize();
        assert!(direction.distance(Vec3::Y) < 1e-4);

        interactor.trigger_key(ModifierKeys::Shift, "5");
        assert!(interactor.window().camera().parallel_projection);

        interactor.trigger_key(ModifierKeys::None, "Return");
        let camera = interactor.window().camera();
        assert!(!camera.parallel_projection);
        assert!(camera.position.z > 1.0);
    }

    #[test]
    fn mouse_moves_the_camera() {
        let mut interactor = interactor();
        let before = interactor.window().camera().clone();
        interactor.zoom_camera(2.0);
        assert!(interactor.window().camera().distance() < before.distance());
        interactor.rotate_camera(10.0, 0.0);
        assert!(interactor.window().camera().position.x.abs() > 1e-3);
        let focal = interactor.window().camera().focal_point;
        interactor.pan_camera(4.0, 0.0);
        assert!(interactor.window().camera().focal_point.distance(focal) > 1e-4);
    }

    #[test]
    fn aliases_expand_to_commands() {
        let mut interactor = interactor();
        interactor.trigger_command("alias edges toggle render.show-edges").unwrap();
        interactor.trigger_command("edges").unwrap();
        assert!(interactor.window().options().render.show_edges);
        interactor.trigger_command("alias loop loop").unwrap();
        assert!(matches!(
            interactor.trigger_command("loop"),
            Err(CommandError::AliasLoop(_))
        ));
    }

    #[test]
    fn scripts_skip_comments_and_bad_lines() {
        let mut interactor = interactor();
        let path = std::env::temp_dir().join(format!(
            "lumaview-script-{}-{}.txt",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|elapsed| elapsed.as_nanos())
                .unwrap_or(0)
        ));
        std::fs::write(
            &path,
            "# setup\nset ui.metadata true\n\nnot_a_command\ntoggle render.grid.enable\n",
        )
        .unwrap();
        let succeeded = interactor.play_script(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(succeeded, 2);
        assert!(interactor.window().options().ui.metadata);
        assert!(interactor.window().options().render.grid.enable);

        assert!(matches!(
            interactor.play_script(&PathBuf::from("/nonexistent/lumaview.script")),
            Err(CommandError::Script { .. })
        ));
    }

    #[test]
    fn dropping_a_missing_file_keeps_running() {
        let mut interactor = interactor();
        interactor.drop_files(&[PathBuf::from("/nonexistent/model.ply")]);
        assert!(!interactor.is_stopped());
    }

    #[test]
    fn rendering_fills_the_cheat_sheet() {
        let mut interactor = interactor();
        interactor.trigger_command("set ui.cheatsheet true").unwrap();
        assert!(interactor.render());
        let sheet = &interactor.window().renderer().base().hud().cheat_sheet;
        assert!(sheet.iter().any(|line| line.starts_with(" C: Cell scalars coloring")));
        assert!(sheet.iter().any(|line| line == " G: Grid [OFF]"));
    }
}
