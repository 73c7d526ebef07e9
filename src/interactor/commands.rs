//! Named string commands run by key bindings, scripts and the command line.

use super::Interactor;
use crate::options::OptionsError;
use crate::render::{CycleType, StandardView};
use crate::window::WindowError;
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Command: \"{0}\" is not recognized, ignoring")]
    Unknown(String),
    #[error("Command: {command} is expecting {expected} arguments")]
    ArgumentCount { command: String, expected: usize },
    #[error("Command: {command} arg:\"{arg}\" is not recognized.")]
    InvalidArgument { command: String, arg: String },
    #[error("Command: unbalanced quotes in \"{0}\"")]
    Quotes(String),
    #[error("alias {0} expands to itself")]
    AliasLoop(String),
    #[error(transparent)]
    Options(#[from] OptionsError),
    #[error(transparent)]
    Window(#[from] WindowError),
    #[error("cannot read command script {path}")]
    Script {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, CommandError>;

pub type CommandFn = fn(&mut Interactor, &[String]) -> Result<()>;

/// Splits a command line on whitespace. Single and double quotes group
/// words, a backslash escapes the next character.
pub fn tokenize(line: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
                in_token = true;
            }
            '"' | '\'' if quote == Some(c) => quote = None,
            '"' | '\'' if quote.is_none() => {
                quote = Some(c);
                in_token = true;
            }
            c if c.is_whitespace() && quote.is_none() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            c => {
                current.push(c);
                in_token = true;
            }
        }
    }
    if quote.is_some() {
        return Err(CommandError::Quotes(line.to_string()));
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}

/// Command name to action table.
#[derive(Default)]
pub struct CommandRegistry {
    actions: HashMap<String, CommandFn>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in command.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.add("set", set);
        registry.add("toggle", toggle);
        registry.add("reset", reset);
        registry.add("print", print);
        registry.add("cycle_coloring", cycle_coloring);
        registry.add("cycle_animation", cycle_animation);
        registry.add("toggle_animation", toggle_animation);
        registry.add("set_camera", set_camera);
        registry.add("roll_camera", roll_camera);
        registry.add("toggle_orthographic", toggle_orthographic);
        registry.add("increase_light_intensity", increase_light_intensity);
        registry.add("decrease_light_intensity", decrease_light_intensity);
        registry.add("increase_opacity", increase_opacity);
        registry.add("decrease_opacity", decrease_opacity);
        registry.add("reset_camera", reset_camera);
        registry.add("toggle_volume_rendering", toggle_volume_rendering);
        registry.add("stop_interactor", stop_interactor);
        registry.add("print_scene_info", print_scene_info);
        registry.add("print_coloring_info", print_coloring_info);
        registry.add("print_options_info", print_options_info);
        registry.add("add_files", add_files);
        registry.add("alias", alias);
        registry
    }

    /// Replaces any action already registered under `name`.
    pub fn add(&mut self, name: &str, action: CommandFn) {
        self.actions.insert(name.to_string(), action);
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.actions.remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<CommandFn> {
        self.actions.get(name).copied()
    }

    /// Sorted command names.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.actions.keys().cloned().collect();
        names.sort();
        names
    }
}

fn expect_args(command: &str, args: &[String], expected: usize) -> Result<()> {
    if args.len() != expected {
        return Err(CommandError::ArgumentCount {
            command: command.to_string(),
            expected,
        });
    }
    Ok(())
}

fn set(interactor: &mut Interactor, args: &[String]) -> Result<()> {
    expect_args("set", args, 2)?;
    let window = interactor.window_mut();
    window.options_mut().set_as_string(&args[0], &args[1])?;
    window.apply_options();
    Ok(())
}

fn toggle(interactor: &mut Interactor, args: &[String]) -> Result<()> {
    expect_args("toggle", args, 1)?;
    let window = interactor.window_mut();
    window.options_mut().toggle(&args[0])?;
    window.apply_options();
    Ok(())
}

fn reset(interactor: &mut Interactor, args: &[String]) -> Result<()> {
    expect_args("reset", args, 1)?;
    let window = interactor.window_mut();
    window.options_mut().reset(&args[0])?;
    window.apply_options();
    Ok(())
}

fn print(interactor: &mut Interactor, args: &[String]) -> Result<()> {
    expect_args("print", args, 1)?;
    let value = interactor.window().options().get_as_string(&args[0])?;
    log::info!("{value}");
    Ok(())
}

fn cycle_coloring(interactor: &mut Interactor, args: &[String]) -> Result<()> {
    expect_args("cycle_coloring", args, 1)?;
    let cycle = match args[0].as_str() {
        "field" => CycleType::Field,
        "array" => CycleType::ArrayIndex,
        "component" => CycleType::Component,
        other => {
            return Err(CommandError::InvalidArgument {
                command: "cycle_coloring".to_string(),
                arg: other.to_string(),
            })
        }
    };
    let window = interactor.window_mut();
    let (renderer, importer) = window.renderer_and_importer();
    renderer.cycle_scalars(importer, cycle);

    // Keep the options in line with what the renderer now shows.
    let index = renderer.array_index(importer);
    let cells = renderer.use_cell_coloring(importer);
    let name = renderer.array_name(importer);
    let component = renderer.component();
    let scivis = &mut window.options_mut().model.scivis;
    scivis.enable = index != -1;
    scivis.cells = cells;
    scivis.array_name = name;
    scivis.component = component;
    window.apply_options();
    Ok(())
}

fn cycle_animation(interactor: &mut Interactor, args: &[String]) -> Result<()> {
    expect_args("cycle_animation", args, 0)?;
    interactor.window_mut().cycle_animation();
    Ok(())
}

fn toggle_animation(interactor: &mut Interactor, args: &[String]) -> Result<()> {
    expect_args("toggle_animation", args, 0)?;
    interactor.window_mut().toggle_animation();
    Ok(())
}

fn set_camera(interactor: &mut Interactor, args: &[String]) -> Result<()> {
    expect_args("set_camera", args, 1)?;
    let view = match args[0].as_str() {
        "front" => StandardView::Front,
        "right" => StandardView::Right,
        "top" => StandardView::Top,
        "isometric" => StandardView::Isometric,
        other => {
            return Err(CommandError::InvalidArgument {
                command: "set_camera".to_string(),
                arg: other.to_string(),
            })
        }
    };
    let window = interactor.window_mut();
    window.camera_mut().set_standard_view(view);
    let bounds = window.scene().importer().bounds();
    window.camera_mut().reset_to_bounds(&bounds);
    window.request_render();
    Ok(())
}

fn roll_camera(interactor: &mut Interactor, args: &[String]) -> Result<()> {
    expect_args("roll_camera", args, 1)?;
    let angle: i32 = args[0].parse().map_err(|_| CommandError::InvalidArgument {
        command: "roll_camera".to_string(),
        arg: args[0].clone(),
    })?;
    let window = interactor.window_mut();
    window.camera_mut().roll(angle as f32);
    window.request_render();
    Ok(())
}

fn toggle_orthographic(interactor: &mut Interactor, args: &[String]) -> Result<()> {
    expect_args("toggle_orthographic", args, 0)?;
    let window = interactor.window_mut();
    let camera = window.camera_mut();
    camera.parallel_projection = !camera.parallel_projection;
    window.renderer_mut().base_mut().invalidate_cheat_sheet();
    window.request_render();
    Ok(())
}

/// Next light intensity, moving by a step that grows with the intensity.
pub fn step_light_intensity(intensity: f64, increase: bool) -> f64 {
    let reference = if increase { intensity } else { intensity - 1e-6 };
    let offset = if reference < 0.5 {
        1.0
    } else if reference < 1.0 {
        2.0
    } else if reference < 5.0 {
        5.0
    } else if reference < 10.0 {
        10.0
    } else {
        25.0
    };
    let percent = (intensity * 100.0).round();
    let stepped = if increase { percent + offset } else { percent - offset };
    stepped.max(0.0) / 100.0
}

/// Next opacity, starting from fully opaque when unset.
pub fn step_opacity(opacity: Option<f64>, increase: bool) -> f64 {
    let current = opacity.unwrap_or(1.0);
    let delta = if increase { 0.05 } else { -0.05 };
    let next = current + delta;
    if (0.0..=1.0).contains(&current) {
        next.clamp(0.0, 1.0)
    } else {
        next
    }
}

fn change_light_intensity(interactor: &mut Interactor, increase: bool) {
    let window = interactor.window_mut();
    let light = &mut window.options_mut().render.light;
    light.intensity = step_light_intensity(light.intensity, increase);
    window.apply_options();
}

fn increase_light_intensity(interactor: &mut Interactor, args: &[String]) -> Result<()> {
    expect_args("increase_light_intensity", args, 0)?;
    change_light_intensity(interactor, true);
    Ok(())
}

fn decrease_light_intensity(interactor: &mut Interactor, args: &[String]) -> Result<()> {
    expect_args("decrease_light_intensity", args, 0)?;
    change_light_intensity(interactor, false);
    Ok(())
}

fn change_opacity(interactor: &mut Interactor, increase: bool) {
    let window = interactor.window_mut();
    let color = &mut window.options_mut().model.color;
    color.opacity = Some(step_opacity(color.opacity, increase));
    window.apply_options();
}

fn increase_opacity(interactor: &mut Interactor, args: &[String]) -> Result<()> {
    expect_args("increase_opacity", args, 0)?;
    change_opacity(interactor, true);
    Ok(())
}

fn decrease_opacity(interactor: &mut Interactor, args: &[String]) -> Result<()> {
    expect_args("decrease_opacity", args, 0)?;
    change_opacity(interactor, false);
    Ok(())
}

fn reset_camera(interactor: &mut Interactor, args: &[String]) -> Result<()> {
    expect_args("reset_camera", args, 0)?;
    interactor.window_mut().reset_camera();
    Ok(())
}

fn toggle_volume_rendering(interactor: &mut Interactor, args: &[String]) -> Result<()> {
    expect_args("toggle_volume_rendering", args, 0)?;
    let window = interactor.window_mut();
    let volume = &mut window.options_mut().model.volume;
    volume.enable = !volume.enable;
    window.apply_options();
    Ok(())
}

fn stop_interactor(interactor: &mut Interactor, args: &[String]) -> Result<()> {
    expect_args("stop_interactor", args, 0)?;
    interactor.stop();
    Ok(())
}

fn print_scene_info(interactor: &mut Interactor, args: &[String]) -> Result<()> {
    expect_args("print_scene_info", args, 0)?;
    let description = interactor.window_mut().scene_description();
    log::info!("{description}");
    Ok(())
}

fn print_coloring_info(interactor: &mut Interactor, args: &[String]) -> Result<()> {
    expect_args("print_coloring_info", args, 0)?;
    let (renderer, importer) = interactor.window_mut().renderer_and_importer();
    let description = renderer.coloring_description(importer);
    log::info!("{description}");
    Ok(())
}

fn print_options_info(interactor: &mut Interactor, args: &[String]) -> Result<()> {
    expect_args("print_options_info", args, 0)?;
    let options = interactor.window().options();
    for key in options.keys() {
        let value = options.get_as_string(&key)?;
        log::info!("{key}: {value}");
    }
    Ok(())
}

fn add_files(interactor: &mut Interactor, args: &[String]) -> Result<()> {
    if args.is_empty() {
        return Err(CommandError::ArgumentCount {
            command: "add_files".to_string(),
            expected: 1,
        });
    }
    let paths: Vec<PathBuf> = args.iter().map(PathBuf::from).collect();
    let window = interactor.window_mut();
    window.stop_animation();
    window.load(&paths)?;
    window.request_render();
    Ok(())
}

fn alias(interactor: &mut Interactor, args: &[String]) -> Result<()> {
    if args.len() < 2 {
        return Err(CommandError::ArgumentCount {
            command: "alias".to_string(),
            expected: 2,
        });
    }
    interactor.add_alias(&args[0], args[1..].to_vec());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{step_light_intensity, step_opacity, tokenize, CommandError, CommandRegistry};

    #[test]
    fn tokenizer_groups_quoted_words() {
        let tokens = tokenize(r#"set ui.filename-name "my model.ply"  'a b' c\ d"#).unwrap();
        assert_eq!(tokens, vec!["set", "ui.filename-name", "my model.ply", "a b", "c d"]);
        assert!(tokenize("   ").unwrap().is_empty());
        assert_eq!(tokenize(r#"print """#).unwrap(), vec!["print", ""]);
    }

    #[test]
    fn tokenizer_rejects_unbalanced_quotes() {
        assert!(matches!(tokenize("set a \"b"), Err(CommandError::Quotes(_))));
    }

    #[test]
    fn light_intensity_steps_grow_with_intensity() {
        assert!((step_light_intensity(1.0, true) - 1.05).abs() < 1e-9);
        assert!((step_light_intensity(1.0, false) - 0.98).abs() < 1e-9);
        assert!((step_light_intensity(0.3, true) - 0.31).abs() < 1e-9);
        assert!((step_light_intensity(0.5, false) - 0.49).abs() < 1e-9);
        assert!((step_light_intensity(12.0, true) - 12.25).abs() < 1e-9);
        assert_eq!(step_light_intensity(0.0, false), 0.0);
    }

    #[test]
    fn opacity_steps_are_clamped() {
        assert!((step_opacity(None, false) - 0.95).abs() < 1e-9);
        assert_eq!(step_opacity(None, true), 1.0);
        assert_eq!(step_opacity(Some(0.02), false), 0.0);
        assert!((step_opacity(Some(0.5), true) - 0.55).abs() < 1e-9);
    }

    #[test]
    fn registry_lists_and_removes_commands() {
        let mut registry = CommandRegistry::with_defaults();
        let names = registry.names();
        assert!(names.contains(&"cycle_coloring".to_string()));
        assert!(names.windows(2).all(|pair| pair[0] <= pair[1]));
        assert!(registry.remove("print"));
        assert!(registry.get("print").is_none());
        assert!(!registry.remove("print"));
    }
}
