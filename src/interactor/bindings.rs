//! Key bindings: which commands a key triggers and how it is documented in
//! the cheat sheet.

use crate::window::Window;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Group whose bindings are documented by the coloring renderer itself.
pub const COLORING_GROUP: &str = "Coloring";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ModifierKeys {
    None,
    Ctrl,
    Shift,
    CtrlShift,
    /// Matches whatever modifiers are held.
    Any,
}

impl ModifierKeys {
    pub fn from_state(ctrl: bool, shift: bool) -> Self {
        match (ctrl, shift) {
            (false, false) => Self::None,
            (true, false) => Self::Ctrl,
            (false, true) => Self::Shift,
            (true, true) => Self::CtrlShift,
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            Self::None => "",
            Self::Ctrl => "Ctrl+",
            Self::Shift => "Shift+",
            Self::CtrlShift => "Ctrl+Shift+",
            Self::Any => "Any+",
        }
    }
}

/// A key name such as `P`, `5` or `Return` plus modifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InteractionBind {
    pub modifiers: ModifierKeys,
    pub key: String,
}

impl InteractionBind {
    pub fn new(modifiers: ModifierKeys, key: impl Into<String>) -> Self {
        Self {
            modifiers,
            key: key.into(),
        }
    }
}

impl fmt::Display for InteractionBind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.modifiers.prefix(), self.key)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid interaction bind \"{0}\"")]
pub struct BindParseError(String);

impl FromStr for InteractionBind {
    type Err = BindParseError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = text.split('+').collect();
        let (key, modifiers) = match parts.as_slice() {
            [key] => (*key, ModifierKeys::None),
            ["Ctrl", key] => (*key, ModifierKeys::Ctrl),
            ["Shift", key] => (*key, ModifierKeys::Shift),
            ["Ctrl", "Shift", key] | ["Shift", "Ctrl", key] => (*key, ModifierKeys::CtrlShift),
            ["Any", key] => (*key, ModifierKeys::Any),
            _ => return Err(BindParseError(text.to_string())),
        };
        if key.is_empty() {
            return Err(BindParseError(text.to_string()));
        }
        Ok(Self::new(modifiers, key))
    }
}

/// How a binding describes itself, evaluated against the current window state.
#[derive(Debug, Clone, PartialEq)]
pub enum BindingDoc {
    /// Description only.
    Text(String),
    /// Boolean option shown as `[ON]`/`[OFF]`.
    Toggle(String, String),
    /// Numeric option shown with two decimals.
    Number(String, String),
    /// Optional numeric option, `Unset` when empty.
    OptionalNumber(String, String),
    /// Name of the current animation.
    Animation(String),
    /// Camera projection state.
    Orthographic(String),
}

impl BindingDoc {
    pub fn text(description: &str) -> Self {
        Self::Text(description.to_string())
    }

    pub fn toggle(description: &str, key: &str) -> Self {
        Self::Toggle(description.to_string(), key.to_string())
    }

    /// Description and current value, the value possibly empty.
    pub fn describe(&self, window: &Window) -> (String, String) {
        let options = window.options();
        match self {
            Self::Text(description) => (description.clone(), String::new()),
            Self::Toggle(description, key) => {
                let value = match options.get(key) {
                    Ok(Value::Bool(true)) => "ON",
                    _ => "OFF",
                };
                (description.clone(), value.to_string())
            }
            Self::Number(description, key) => {
                let value = options
                    .get(key)
                    .ok()
                    .and_then(|value| value.as_f64())
                    .map(|value| format!("{value:.2}"))
                    .unwrap_or_default();
                (description.clone(), value)
            }
            Self::OptionalNumber(description, key) => {
                let value = match options.get(key) {
                    Ok(Value::Number(number)) => number
                        .as_f64()
                        .map(|value| format!("{value:.2}"))
                        .unwrap_or_default(),
                    _ => "Unset".to_string(),
                };
                (description.clone(), value)
            }
            Self::Animation(description) => (description.clone(), window.animation_name()),
            Self::Orthographic(description) => {
                let value = if window.camera().parallel_projection {
                    "ON"
                } else {
                    "OFF"
                };
                (description.clone(), value.to_string())
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Binding {
    pub commands: Vec<String>,
    pub group: String,
    pub doc: BindingDoc,
}

/// Interaction binds grouped in insertion order.
#[derive(Debug, Default)]
pub struct Bindings {
    binds: BTreeMap<InteractionBind, Binding>,
    groups: Vec<String>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any binding already present for `bind`.
    pub fn add(&mut self, bind: InteractionBind, commands: &[&str], group: &str, doc: BindingDoc) {
        if !self.groups.iter().any(|existing| existing == group) {
            self.groups.push(group.to_string());
        }
        self.binds.insert(
            bind,
            Binding {
                commands: commands.iter().map(|command| command.to_string()).collect(),
                group: group.to_string(),
                doc,
            },
        );
    }

    pub fn remove(&mut self, bind: &InteractionBind) -> Option<Binding> {
        let removed = self.binds.remove(bind)?;
        if !self.binds.values().any(|binding| binding.group == removed.group) {
            self.groups.retain(|group| *group != removed.group);
        }
        Some(removed)
    }

    pub fn get(&self, bind: &InteractionBind) -> Option<&Binding> {
        self.binds.get(bind)
    }

    /// Binding triggered by `key` with `modifiers` held, exact match first.
    pub fn lookup(&self, modifiers: ModifierKeys, key: &str) -> Option<&Binding> {
        self.binds
            .get(&InteractionBind::new(modifiers, key))
            .or_else(|| self.binds.get(&InteractionBind::new(ModifierKeys::Any, key)))
    }

    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    pub fn binds_for_group<'a>(&'a self, group: &'a str) -> impl Iterator<Item = &'a InteractionBind> + 'a {
        self.binds
            .iter()
            .filter(move |(_, binding)| binding.group == group)
            .map(|(bind, _)| bind)
    }

    pub fn len(&self) -> usize {
        self.binds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.binds.is_empty()
    }

    /// Cheat sheet lines for every group but [`COLORING_GROUP`].
    pub fn cheat_sheet_lines(&self, window: &Window) -> Vec<String> {
        let mut lines = Vec::new();
        for group in self.groups.iter().filter(|group| *group != COLORING_GROUP) {
            for (bind, binding) in self.binds.iter().filter(|(_, binding)| binding.group == *group) {
                let (description, value) = binding.doc.describe(window);
                if value.is_empty() {
                    lines.push(format!(" {bind}: {description}"));
                } else {
                    lines.push(format!(" {bind}: {description} [{value}]"));
                }
            }
        }
        lines
    }

    /// The default key map.
    pub fn with_defaults() -> Self {
        use ModifierKeys::{Any, Ctrl, Shift};
        let none = ModifierKeys::None;
        let mut bindings = Self::new();
        let mut bind = |modifiers: ModifierKeys, key: &str, commands: &[&str], group: &str, doc: BindingDoc| {
            bindings.add(InteractionBind::new(modifiers, key), commands, group, doc);
        };

        bind(none, "W", &["cycle_animation"], "Scene", BindingDoc::Animation("Animation".into()));
        bind(none, "Space", &["toggle_animation"], "Scene", BindingDoc::text("Play/pause animation"));
        bind(none, "P", &["toggle render.effect.translucency-support"], "Scene", BindingDoc::toggle("Translucency support", "render.effect.translucency-support"));
        bind(none, "Q", &["toggle render.effect.ambient-occlusion"], "Scene", BindingDoc::toggle("Ambient occlusion", "render.effect.ambient-occlusion"));
        bind(none, "A", &["toggle render.effect.anti-aliasing"], "Scene", BindingDoc::toggle("Anti-aliasing", "render.effect.anti-aliasing"));
        bind(none, "T", &["toggle render.effect.tone-mapping"], "Scene", BindingDoc::toggle("Tone mapping", "render.effect.tone-mapping"));
        bind(none, "E", &["toggle render.show-edges"], "Scene", BindingDoc::toggle("Edges", "render.show-edges"));
        bind(none, "X", &["toggle ui.axis"], "Scene", BindingDoc::toggle("Axes", "ui.axis"));
        bind(none, "G", &["toggle render.grid.enable"], "Scene", BindingDoc::toggle("Grid", "render.grid.enable"));
        bind(none, "N", &["toggle ui.filename"], "Scene", BindingDoc::toggle("File name", "ui.filename"));
        bind(none, "M", &["toggle ui.metadata"], "Scene", BindingDoc::toggle("Metadata", "ui.metadata"));
        bind(none, "Z", &["toggle ui.fps"], "Scene", BindingDoc::toggle("FPS counter", "ui.fps"));
        bind(none, "R", &["toggle render.raytracing.enable"], "Scene", BindingDoc::toggle("Raytracing", "render.raytracing.enable"));
        bind(none, "D", &["toggle render.raytracing.denoise"], "Scene", BindingDoc::toggle("Denoiser", "render.raytracing.denoise"));
        bind(none, "U", &["toggle render.background.blur.enable"], "Scene", BindingDoc::toggle("Blur background", "render.background.blur.enable"));
        bind(none, "K", &["toggle interactor.trackball"], "Scene", BindingDoc::toggle("Trackball interaction", "interactor.trackball"));
        bind(none, "F", &["toggle render.hdri.ambient"], "Scene", BindingDoc::toggle("HDRI ambient lighting", "render.hdri.ambient"));
        bind(none, "J", &["toggle render.background.skybox"], "Scene", BindingDoc::toggle("HDRI skybox", "render.background.skybox"));
        bind(none, "L", &["increase_light_intensity"], "Scene", BindingDoc::Number("Increase light intensity".into(), "render.light.intensity".into()));
        bind(Shift, "L", &["decrease_light_intensity"], "Scene", BindingDoc::Number("Decrease light intensity".into(), "render.light.intensity".into()));
        bind(Ctrl, "P", &["increase_opacity"], "Scene", BindingDoc::OptionalNumber("Increase opacity".into(), "model.color.opacity".into()));
        bind(Shift, "P", &["decrease_opacity"], "Scene", BindingDoc::OptionalNumber("Decrease opacity".into(), "model.color.opacity".into()));
        bind(Shift, "A", &["toggle render.armature.enable"], "Scene", BindingDoc::toggle("Armature", "render.armature.enable"));

        bind(none, "C", &["cycle_coloring field"], COLORING_GROUP, BindingDoc::text("Cycle point/cell data coloring"));
        bind(none, "S", &["cycle_coloring array"], COLORING_GROUP, BindingDoc::text("Cycle array to color with"));
        bind(none, "Y", &["cycle_coloring component"], COLORING_GROUP, BindingDoc::text("Cycle component to color with"));
        bind(none, "B", &["toggle ui.scalar-bar"], COLORING_GROUP, BindingDoc::toggle("Scalar bar", "ui.scalar-bar"));
        bind(none, "V", &["toggle_volume_rendering"], COLORING_GROUP, BindingDoc::toggle("Volume representation", "model.volume.enable"));
        bind(none, "I", &["toggle model.volume.inverse"], COLORING_GROUP, BindingDoc::toggle("Inverse volume opacity", "model.volume.inverse"));
        bind(none, "O", &["toggle model.point-sprites.enable"], COLORING_GROUP, BindingDoc::toggle("Point sprites", "model.point-sprites.enable"));

        bind(Any, "1", &["set_camera front"], "Camera", BindingDoc::text("Front View camera"));
        bind(Any, "3", &["set_camera right"], "Camera", BindingDoc::text("Right View camera"));
        bind(Any, "4", &["roll_camera -90"], "Camera", BindingDoc::text("Rotate camera right"));
        bind(Any, "5", &["toggle_orthographic"], "Camera", BindingDoc::Orthographic("Orthographic projection".into()));
        bind(Any, "6", &["roll_camera 90"], "Camera", BindingDoc::text("Rotate camera left"));
        bind(Any, "7", &["set_camera top"], "Camera", BindingDoc::text("Top View camera"));
        bind(Any, "9", &["set_camera isometric"], "Camera", BindingDoc::text("Isometric View camera"));
        bind(none, "Return", &["reset_camera"], "Camera", BindingDoc::text("Reset camera to initial parameters"));

        bind(none, "H", &["toggle ui.cheatsheet"], "Others", BindingDoc::text("Cheatsheet"));
        bind(Ctrl, "Q", &["stop_interactor"], "Others", BindingDoc::text("Quit"));
        bind(none, "Escape", &["stop_interactor"], "Others", BindingDoc::text("Quit"));
        bindings
    }
}

#[cfg(test)]
mod tests {
    use super::{BindingDoc, Bindings, InteractionBind, ModifierKeys, COLORING_GROUP};
    use crate::window::Window;

    #[test]
    fn binds_parse_and_display() {
        let bind: InteractionBind = "Ctrl+P".parse().unwrap();
        assert_eq!(bind, InteractionBind::new(ModifierKeys::Ctrl, "P"));
        assert_eq!(bind.to_string(), "Ctrl+P");
        let bind: InteractionBind = "Shift+Ctrl+Return".parse().unwrap();
        assert_eq!(bind.modifiers, ModifierKeys::CtrlShift);
        assert_eq!(bind.to_string(), "Ctrl+Shift+Return");
        assert!("Alt+P".parse::<InteractionBind>().is_err());
        assert!("Ctrl+".parse::<InteractionBind>().is_err());
    }

    #[test]
    fn lookup_prefers_exact_modifiers_then_any() {
        let bindings = Bindings::with_defaults();
        let plain = bindings.lookup(ModifierKeys::None, "P").unwrap();
        assert_eq!(plain.commands, vec!["toggle render.effect.translucency-support"]);
        let ctrl = bindings.lookup(ModifierKeys::Ctrl, "P").unwrap();
        assert_eq!(ctrl.commands, vec!["increase_opacity"]);
        let any = bindings.lookup(ModifierKeys::CtrlShift, "1").unwrap();
        assert_eq!(any.commands, vec!["set_camera front"]);
        assert!(bindings.lookup(ModifierKeys::Ctrl, "W").is_none());
    }

    #[test]
    fn removing_the_last_bind_of_a_group_drops_the_group() {
        let mut bindings = Bindings::new();
        bindings.add(InteractionBind::new(ModifierKeys::None, "K"), &["print ui.fps"], "Custom", BindingDoc::text("Print"));
        assert_eq!(bindings.groups(), ["Custom".to_string()]);
        assert!(bindings.remove(&InteractionBind::new(ModifierKeys::None, "K")).is_some());
        assert!(bindings.groups().is_empty());
        assert!(bindings.is_empty());
    }

    #[test]
    fn docs_follow_the_window_state() {
        let mut window = Window::new(true);
        let bindings = Bindings::with_defaults();
        let lines = bindings.cheat_sheet_lines(&window);
        assert!(lines.contains(&" E: Edges [OFF]".to_string()));
        assert!(lines.contains(&" Ctrl+P: Increase opacity [Unset]".to_string()));
        assert!(lines.contains(&" L: Increase light intensity [1.00]".to_string()));
        assert!(lines.contains(&" H: Cheatsheet".to_string()));
        assert!(bindings.binds_for_group(COLORING_GROUP).count() == 7);
        assert!(!lines.iter().any(|line| line.starts_with(" C:")));

        window.options_mut().render.show_edges = true;
        window.options_mut().model.color.opacity = Some(0.5);
        let lines = bindings.cheat_sheet_lines(&window);
        assert!(lines.contains(&" E: Edges [ON]".to_string()));
        assert!(lines.contains(&" Shift+P: Decrease opacity [0.50]".to_string()));
    }
}
