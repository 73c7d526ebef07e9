//! Viewer options.
//!
//! Options are stored as a tree of typed structs but are addressed through
//! flat dotted keys such as `render.effect.anti-aliasing` or
//! `model.scivis.array-name`. The flat view is produced by walking the
//! `serde_json::Value` form of the tree, so the struct definitions below are
//! the single source of truth for key names, types and defaults.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum OptionsError {
    #[error("option {0} does not exist")]
    Inexistent(String),
    #[error("value for option {key} is incompatible: {reason}")]
    Incompatible { key: String, reason: String },
    #[error("failed to read configuration file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("configuration file {0} must contain a JSON object")]
    NotAnObject(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, OptionsError>;

/// Default color map, given as `(value, r, g, b)` quadruples.
pub const DEFAULT_COLORMAP: [f64; 16] = [
    0.0, 0.0, 0.0, 0.0, //
    0.4, 0.9, 0.0, 0.0, //
    0.8, 0.9, 0.9, 0.0, //
    1.0, 1.0, 1.0, 1.0,
];

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Options {
    pub scene: SceneOptions,
    pub render: RenderOptions,
    pub model: ModelOptions,
    pub ui: UiOptions,
    pub interactor: InteractorOptions,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SceneOptions {
    pub animation: AnimationOptions,
    pub camera: CameraOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct AnimationOptions {
    pub autoplay: bool,
    /// Index of the animation to play, `-1` plays all of them.
    pub index: i32,
    pub speed_factor: f64,
    pub time: Option<f64>,
    pub frame_rate: f64,
}

impl Default for AnimationOptions {
    fn default() -> Self {
        Self {
            autoplay: false,
            index: 0,
            speed_factor: 1.0,
            time: None,
            frame_rate: 30.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CameraOptions {
    pub index: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RenderOptions {
    pub show_edges: bool,
    pub line_width: f64,
    pub point_size: f64,
    pub backface_type: Option<String>,
    pub grid: GridOptions,
    pub effect: EffectOptions,
    pub raytracing: RaytracingOptions,
    pub hdri: HdriOptions,
    pub background: BackgroundOptions,
    pub light: LightOptions,
    pub armature: ArmatureOptions,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            show_edges: false,
            line_width: 1.0,
            point_size: 10.0,
            backface_type: None,
            grid: GridOptions::default(),
            effect: EffectOptions::default(),
            raytracing: RaytracingOptions::default(),
            hdri: HdriOptions::default(),
            background: BackgroundOptions::default(),
            light: LightOptions::default(),
            armature: ArmatureOptions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct GridOptions {
    pub enable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct EffectOptions {
    pub translucency_support: bool,
    pub ambient_occlusion: bool,
    pub anti_aliasing: bool,
    /// `fxaa` or `ssaa`.
    pub anti_aliasing_mode: String,
    pub tone_mapping: bool,
}

impl Default for EffectOptions {
    fn default() -> Self {
        Self {
            translucency_support: false,
            ambient_occlusion: false,
            anti_aliasing: false,
            anti_aliasing_mode: "fxaa".to_string(),
            tone_mapping: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RaytracingOptions {
    pub enable: bool,
    pub denoise: bool,
    pub samples: i32,
}

impl Default for RaytracingOptions {
    fn default() -> Self {
        Self {
            enable: false,
            denoise: false,
            samples: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct HdriOptions {
    pub file: Option<String>,
    pub ambient: bool,
    pub cache_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct BackgroundOptions {
    pub skybox: bool,
    pub color: [f64; 3],
    pub blur: BlurOptions,
}

impl Default for BackgroundOptions {
    fn default() -> Self {
        Self {
            skybox: false,
            color: [0.2, 0.2, 0.2],
            blur: BlurOptions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct BlurOptions {
    pub enable: bool,
    /// Circle of confusion radius, in pixels.
    pub coc: f64,
}

impl Default for BlurOptions {
    fn default() -> Self {
        Self {
            enable: false,
            coc: 20.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct LightOptions {
    pub intensity: f64,
}

impl Default for LightOptions {
    fn default() -> Self {
        Self { intensity: 1.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ArmatureOptions {
    pub enable: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ModelOptions {
    pub scivis: ScivisOptions,
    pub point_sprites: PointSpritesOptions,
    pub volume: VolumeOptions,
    pub color: ColorOptions,
    pub material: MaterialOptions,
    pub normal: NormalOptions,
    pub emissive: EmissiveOptions,
    pub matcap: MatcapOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ScivisOptions {
    pub enable: bool,
    pub cells: bool,
    pub array_name: Option<String>,
    /// `-2` direct scalars, `-1` magnitude, `>= 0` a component.
    pub component: i32,
    pub colormap: Vec<f64>,
    pub range: Option<Vec<f64>>,
}

impl Default for ScivisOptions {
    fn default() -> Self {
        Self {
            enable: false,
            cells: false,
            array_name: None,
            component: -1,
            colormap: DEFAULT_COLORMAP.to_vec(),
            range: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct PointSpritesOptions {
    pub enable: bool,
    /// `sphere`, `gaussian` or `circle`.
    #[serde(rename = "type")]
    pub kind: String,
    pub size: f64,
}

impl Default for PointSpritesOptions {
    fn default() -> Self {
        Self {
            enable: false,
            kind: "sphere".to_string(),
            size: 10.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct VolumeOptions {
    pub enable: bool,
    pub inverse: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ColorOptions {
    pub rgb: Option<[f64; 3]>,
    pub opacity: Option<f64>,
    pub texture: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct MaterialOptions {
    pub roughness: Option<f64>,
    pub metallic: Option<f64>,
    /// Occlusion-roughness-metallic texture.
    pub texture: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct NormalOptions {
    pub texture: Option<String>,
    pub scale: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct EmissiveOptions {
    pub factor: Option<[f64; 3]>,
    pub texture: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct MatcapOptions {
    pub texture: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct UiOptions {
    pub scalar_bar: bool,
    pub filename: bool,
    pub filename_name: String,
    pub metadata: bool,
    pub fps: bool,
    pub cheatsheet: bool,
    pub loader_progress: bool,
    pub animation_progress: bool,
    pub dropzone: bool,
    pub axis: bool,
    pub font_scale: f64,
}

impl Default for UiOptions {
    fn default() -> Self {
        Self {
            scalar_bar: false,
            filename: false,
            filename_name: String::new(),
            metadata: false,
            fps: false,
            cheatsheet: false,
            loader_progress: false,
            animation_progress: false,
            dropzone: false,
            axis: false,
            font_scale: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct InteractorOptions {
    pub trackball: bool,
    pub invert_zoom: bool,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of a leaf option.
    pub fn get(&self, key: &str) -> Result<Value> {
        let root = serde_json::to_value(self)?;
        let node = leaf(&root, key)?;
        Ok(node.clone())
    }

    /// Leaf option rendered as text, strings without quotes and unset values as empty.
    pub fn get_as_string(&self, key: &str) -> Result<String> {
        Ok(match self.get(key)? {
            Value::Null => String::new(),
            Value::String(text) => text,
            Value::Array(values) => values
                .iter()
                .map(value_to_text)
                .collect::<Vec<_>>()
                .join(","),
            other => value_to_text(&other),
        })
    }

    pub fn set(&mut self, key: &str, value: Value) -> Result<()> {
        let mut root = serde_json::to_value(&*self)?;
        let node = leaf_mut(&mut root, key)?;
        *node = value;
        let updated: Options =
            serde_json::from_value(root).map_err(|err| OptionsError::Incompatible {
                key: key.to_string(),
                reason: err.to_string(),
            })?;
        *self = updated;
        Ok(())
    }

    /// Parses `text` as JSON, falling back to a plain string.
    pub fn set_as_string(&mut self, key: &str, text: &str) -> Result<()> {
        let trimmed = text.trim();
        match serde_json::from_str::<Value>(trimmed) {
            Ok(parsed) if !parsed.is_string() => match self.set(key, parsed) {
                Err(OptionsError::Incompatible { .. }) => {
                    self.set(key, Value::String(trimmed.to_string()))
                }
                other => other,
            },
            Ok(parsed) => self.set(key, parsed),
            Err(_) => {
                if trimmed.contains(',') {
                    let list = format!("[{trimmed}]");
                    if let Ok(parsed) = serde_json::from_str::<Value>(&list) {
                        if self.set(key, parsed).is_ok() {
                            return Ok(());
                        }
                    }
                }
                self.set(key, Value::String(trimmed.to_string()))
            }
        }
    }

    pub fn toggle(&mut self, key: &str) -> Result<()> {
        match self.get(key)? {
            Value::Bool(value) => self.set(key, Value::Bool(!value)),
            _ => Err(OptionsError::Incompatible {
                key: key.to_string(),
                reason: "only boolean options can be toggled".to_string(),
            }),
        }
    }

    pub fn reset(&mut self, key: &str) -> Result<()> {
        let default = Options::default().get(key)?;
        self.set(key, default)
    }

    /// All leaf keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        if let Ok(root) = serde_json::to_value(self) {
            collect_keys(&root, "", &mut keys);
        }
        keys
    }

    /// Applies a JSON object of dotted keys (nested objects are flattened).
    /// Invalid entries are logged and skipped; returns how many were applied.
    pub fn apply_json(&mut self, value: &Value) -> usize {
        let Value::Object(map) = value else {
            return 0;
        };
        let mut applied = 0;
        for (key, entry) in map {
            applied += self.apply_entry(key, entry);
        }
        applied
    }

    fn apply_entry(&mut self, key: &str, entry: &Value) -> usize {
        if let Value::Object(children) = entry {
            let mut applied = 0;
            for (child, value) in children {
                applied += self.apply_entry(&format!("{key}.{child}"), value);
            }
            return applied;
        }
        match self.set(key, entry.clone()) {
            Ok(()) => 1,
            Err(err) => {
                log::warn!("Ignoring configuration entry: {err}");
                0
            }
        }
    }

    pub fn load_config_file(&mut self, path: &Path) -> Result<usize> {
        let text = std::fs::read_to_string(path).map_err(|source| OptionsError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let value: Value = serde_json::from_str(&text).map_err(|source| OptionsError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        if !value.is_object() {
            return Err(OptionsError::NotAnObject(path.display().to_string()));
        }
        let applied = self.apply_json(&value);
        log::debug!(
            "Applied {} options from configuration file {}",
            applied,
            path.display()
        );
        Ok(applied)
    }
}

fn leaf<'a>(root: &'a Value, key: &str) -> Result<&'a Value> {
    let mut node = root;
    for part in key.split('.') {
        node = node
            .get(part)
            .ok_or_else(|| OptionsError::Inexistent(key.to_string()))?;
    }
    if node.is_object() {
        return Err(OptionsError::Inexistent(key.to_string()));
    }
    Ok(node)
}

fn leaf_mut<'a>(root: &'a mut Value, key: &str) -> Result<&'a mut Value> {
    let mut node = root;
    for part in key.split('.') {
        node = node
            .get_mut(part)
            .ok_or_else(|| OptionsError::Inexistent(key.to_string()))?;
    }
    if node.is_object() {
        return Err(OptionsError::Inexistent(key.to_string()));
    }
    Ok(node)
}

fn collect_keys(node: &Value, prefix: &str, keys: &mut Vec<String>) {
    match node {
        Value::Object(map) => {
            for (name, child) in map {
                let key = if prefix.is_empty() {
                    name.clone()
                } else {
                    format!("{prefix}.{name}")
                };
                collect_keys(child, &key, keys);
            }
        }
        _ => keys.push(prefix.to_string()),
    }
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{Options, OptionsError};
    use serde_json::json;

    #[test]
    fn dotted_keys_address_nested_fields() {
        let mut options = Options::new();
        options
            .set("render.effect.anti-aliasing", json!(true))
            .unwrap();
        assert!(options.render.effect.anti_aliasing);
        assert_eq!(options.get("render.background.blur.coc").unwrap(), json!(20.0));
        assert_eq!(options.get("model.scivis.component").unwrap(), json!(-1));
    }

    #[test]
    fn set_as_string_parses_or_falls_back_to_text() {
        let mut options = Options::new();
        options.set_as_string("model.scivis.array-name", "123").unwrap();
        assert_eq!(options.model.scivis.array_name.as_deref(), Some("123"));
        options.set_as_string("render.point-size", "4.5").unwrap();
        assert_eq!(options.render.point_size, 4.5);
        options.set_as_string("model.scivis.range", "0,5").unwrap();
        assert_eq!(options.model.scivis.range, Some(vec![0.0, 5.0]));
        options.set_as_string("render.hdri.file", "sky.hdr").unwrap();
        assert_eq!(options.render.hdri.file.as_deref(), Some("sky.hdr"));
    }

    #[test]
    fn unknown_and_incompatible_values_are_rejected() {
        let mut options = Options::new();
        assert!(matches!(
            options.set("render.nope", json!(1)),
            Err(OptionsError::Inexistent(_))
        ));
        assert!(matches!(
            options.set("render", json!(1)),
            Err(OptionsError::Inexistent(_))
        ));
        assert!(matches!(
            options.set("render.show-edges", json!("yes")),
            Err(OptionsError::Incompatible { .. })
        ));
        assert!(!options.render.show_edges);
    }

    #[test]
    fn toggle_and_reset() {
        let mut options = Options::new();
        options.toggle("ui.cheatsheet").unwrap();
        assert!(options.ui.cheatsheet);
        options.toggle("ui.cheatsheet").unwrap();
        assert!(!options.ui.cheatsheet);
        assert!(options.toggle("render.point-size").is_err());

        options.set("render.light.intensity", json!(3.0)).unwrap();
        options.reset("render.light.intensity").unwrap();
        assert_eq!(options.render.light.intensity, 1.0);
    }

    #[test]
    fn keys_are_leaves() {
        let keys = Options::new().keys();
        assert!(keys.contains(&"model.point-sprites.type".to_string()));
        assert!(keys.contains(&"scene.animation.speed-factor".to_string()));
        assert!(!keys.contains(&"render".to_string()));
    }

    #[test]
    fn config_file_applies_valid_entries_and_skips_bad_ones() {
        let mut path = std::env::temp_dir();
        let nonce = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        path.push(format!("lumaview_config_{}_{}.json", std::process::id(), nonce));
        std::fs::write(
            &path,
            r#"{ "render.grid.enable": true, "ui": { "fps": true }, "render.bogus": 1 }"#,
        )
        .unwrap();

        let mut options = Options::new();
        let applied = options.load_config_file(&path).unwrap();
        assert_eq!(applied, 2);
        assert!(options.render.grid.enable);
        assert!(options.ui.fps);

        let _ = std::fs::remove_file(path);
    }
}
