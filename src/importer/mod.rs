//! Importers turn one input file into actors, cameras, lights and animations.

mod generic;
mod gltf;
mod material;

pub use generic::GenericImporter;
pub use self::gltf::GltfImporter;
pub use material::{linear_to_srgb, srgb_to_linear, Material, ShadingModel, Texture};

use crate::dataset::{BoundingBox, ImageData, PolyData};
use crate::readers::ReaderError;
use glam::{Mat4, Vec3};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum ImporterError {
    #[error(transparent)]
    Reader(#[from] ReaderError),
    #[error("{path}: {reason}")]
    Invalid { path: String, reason: String },
    #[error("importer has not been updated")]
    NotUpdated,
}

pub type Result<T> = std::result::Result<T, ImporterError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateStatus {
    #[default]
    NotUpdated,
    Success,
    Failure,
}

/// How many animations an importer can play at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimationSupport {
    None,
    /// Exactly one animation exists.
    Unique,
    /// Only one animation can be enabled at a time.
    Single,
    /// Any subset of animations can be enabled.
    Multi,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TemporalInfo {
    pub number_of_time_steps: usize,
    pub time_range: [f64; 2],
    pub time_steps: Vec<f64>,
}

/// A drawable unit owned by its importer.
#[derive(Debug, Clone)]
pub struct Actor {
    pub name: String,
    pub geometry: Arc<PolyData>,
    pub material: Material,
    pub transform: Mat4,
    pub visible: bool,
    /// Skeleton geometry, drawn in the on-top pass.
    pub armature: bool,
}

impl Actor {
    pub fn new(name: impl Into<String>, geometry: Arc<PolyData>) -> Self {
        Self {
            name: name.into(),
            geometry,
            material: Material::default(),
            transform: Mat4::IDENTITY,
            visible: true,
            armature: false,
        }
    }

    pub fn world_bounds(&self) -> BoundingBox {
        self.geometry.bounds().transformed(&self.transform)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportedCamera {
    pub name: String,
    pub position: Vec3,
    pub focal_point: Vec3,
    pub view_up: Vec3,
    /// Vertical field of view in degrees.
    pub view_angle: f32,
    /// Half height of the view for orthographic cameras.
    pub parallel_scale: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightKind {
    Directional,
    Point,
    Spot { cone_angle: f32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Light {
    pub kind: LightKind,
    pub position: Vec3,
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
}

impl Light {
    pub fn headlight() -> Self {
        Self {
            kind: LightKind::Directional,
            position: Vec3::ZERO,
            direction: Vec3::NEG_Z,
            color: Vec3::ONE,
            intensity: 1.0,
        }
    }
}

/// Capabilities every per-file importer provides.
///
/// Animation and camera indices are local to the importer. A negative
/// animation count means animations are not supported at all.
pub trait Importer {
    /// Pulls the file and builds the outputs. `progress` receives fractions in `[0, 1]`.
    fn update(&mut self, progress: &mut dyn FnMut(f64)) -> Result<()>;

    fn update_status(&self) -> UpdateStatus;

    fn actors(&self) -> &[Actor];

    fn actors_mut(&mut self) -> &mut [Actor];

    fn lights(&self) -> &[Light] {
        &[]
    }

    fn outputs_description(&self) -> String;

    fn number_of_animations(&self) -> i32 {
        -1
    }

    fn animation_name(&self, _index: usize) -> Option<String> {
        None
    }

    fn enable_animation(&mut self, _index: usize) {}

    fn disable_animation(&mut self, _index: usize) {}

    fn is_animation_enabled(&self, _index: usize) -> bool {
        false
    }

    fn animation_support(&self) -> AnimationSupport {
        AnimationSupport::None
    }

    fn temporal_information(&self, _index: usize, _frame_rate: f64) -> Option<TemporalInfo> {
        None
    }

    fn update_at_time_value(&mut self, _time: f64) -> Result<()> {
        Ok(())
    }

    fn number_of_cameras(&self) -> i32 {
        0
    }

    fn camera_name(&self, _index: usize) -> Option<String> {
        None
    }

    fn set_camera(&mut self, _index: Option<usize>) {}

    /// Camera selected through `set_camera`, if any.
    fn selected_camera(&self) -> Option<&ImportedCamera> {
        None
    }

    /// Dedicated point cloud for point sprites and coloring of `actor`.
    fn point_cloud(&self, _actor: usize) -> Option<Arc<PolyData>> {
        None
    }

    /// Volumetric image behind `actor`, for volume rendering.
    fn image_data(&self, _actor: usize) -> Option<Arc<ImageData>> {
        None
    }

    /// Generic importers keep their dedicated point clouds across time steps.
    fn is_generic(&self) -> bool {
        false
    }
}

/// Standard multi-line description of a polygonal dataset.
pub(crate) fn describe_poly_data(poly: &PolyData) -> String {
    let mut description = format!(
        "Number of points: {}\nNumber of cells: {}\n",
        poly.number_of_points(),
        poly.number_of_cells()
    );
    describe_arrays(&mut description, "Point", poly.point_data.arrays());
    describe_arrays(&mut description, "Cell", poly.cell_data.arrays());
    let bounds = poly.bounds();
    if bounds.is_valid() {
        description.push_str(&format!(
            "Bounds: [{:.3}, {:.3}] x [{:.3}, {:.3}] x [{:.3}, {:.3}]\n",
            bounds.min.x, bounds.max.x, bounds.min.y, bounds.max.y, bounds.min.z, bounds.max.z
        ));
    }
    description
}

pub(crate) fn describe_arrays(
    description: &mut String,
    domain: &str,
    arrays: &[crate::dataset::DataArray],
) {
    if arrays.is_empty() {
        return;
    }
    description.push_str(&format!("{domain} data arrays:\n"));
    for array in arrays {
        let range = array
            .range(-1)
            .map(|[lo, hi]| format!("[{lo}, {hi}]"))
            .unwrap_or_else(|| "empty".to_string());
        description.push_str(&format!(
            "  {} ({} components) magnitude range {}\n",
            array.name(),
            array.number_of_components(),
            range
        ));
    }
}
