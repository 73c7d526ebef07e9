//! Render variants mirroring an imported actor with their own mapper.

use crate::dataset::{ImageData, PolyData};
use crate::importer::{Actor, Material};
use crate::render::colormap::{ColorTransferFunction, OpacityFunction};
use glam::Mat4;
use std::sync::Arc;

/// Non-owning reference to an actor: importer position, then actor position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActorRef {
    pub importer: usize,
    pub actor: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMode {
    MapScalars,
    /// Raw array values used as RGB(A).
    DirectScalars,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorMode {
    Magnitude,
    Component(usize),
}

/// Scalar coloring state of a surface or point sprite mapper.
#[derive(Debug, Clone)]
pub struct Mapper {
    pub scalar_visibility: bool,
    pub array_name: String,
    pub use_cell_data: bool,
    pub color_mode: ColorMode,
    pub vector_mode: VectorMode,
    pub range: [f64; 2],
    pub lookup_table: Option<Arc<ColorTransferFunction>>,
}

impl Default for Mapper {
    fn default() -> Self {
        Self {
            scalar_visibility: false,
            array_name: String::new(),
            use_cell_data: false,
            color_mode: ColorMode::MapScalars,
            vector_mode: VectorMode::Magnitude,
            range: [0.0, 1.0],
            lookup_table: None,
        }
    }
}

/// Volume mapper configuration: array, vector mode, colour and opacity functions.
#[derive(Debug, Clone)]
pub struct VolumeMapper {
    pub array_name: String,
    pub use_cell_data: bool,
    /// `None` uses the raw components directly.
    pub vector_mode: Option<VectorMode>,
    pub color: Arc<ColorTransferFunction>,
    pub opacity: OpacityFunction,
}

/// A surface or point sprite copy of an imported actor.
#[derive(Debug, Clone)]
pub struct ActorVariant {
    pub origin: ActorRef,
    pub geometry: Arc<PolyData>,
    pub transform: Mat4,
    pub material: Material,
    pub visible: bool,
    pub mapper: Mapper,
}

impl ActorVariant {
    /// Hidden variant sharing the actor transform, drawing `geometry`.
    pub fn new(origin: ActorRef, actor: &Actor, geometry: Arc<PolyData>) -> Self {
        Self {
            origin,
            geometry,
            transform: actor.transform,
            material: Material::default(),
            visible: false,
            mapper: Mapper::default(),
        }
    }

    /// Copies the transform of `original` and takes `geometry`, keeping the visibility.
    pub fn sync(&mut self, original: &Actor, geometry: Arc<PolyData>) {
        self.transform = original.transform;
        self.geometry = geometry;
    }
}

/// Volume prop created for actors backed by an image.
#[derive(Debug, Clone)]
pub struct VolumeVariant {
    pub origin: ActorRef,
    pub image: Arc<ImageData>,
    pub transform: Mat4,
    pub visible: bool,
    pub mapper: Option<VolumeMapper>,
}

impl VolumeVariant {
    pub fn new(origin: ActorRef, actor: &Actor, image: Arc<ImageData>) -> Self {
        Self {
            origin,
            image,
            transform: actor.transform,
            visible: false,
            mapper: None,
        }
    }

    pub fn sync(&mut self, original: &Actor, image: Arc<ImageData>) {
        self.transform = original.transform;
        self.image = image;
    }
}

#[cfg(test)]
mod tests {
    use super::{ActorRef, ActorVariant};
    use crate::dataset::PolyData;
    use crate::importer::Actor;
    use glam::{Mat4, Vec3};
    use std::sync::Arc;

    #[test]
    fn sync_keeps_visibility() {
        let mut actor = Actor::new("a", Arc::new(PolyData::default()));
        let origin = ActorRef { importer: 0, actor: 0 };
        let mut variant = ActorVariant::new(origin, &actor, Arc::clone(&actor.geometry));
        assert!(!variant.visible);
        variant.visible = true;

        actor.transform = Mat4::from_translation(Vec3::X);
        let moved = Arc::new(PolyData::new(vec![Vec3::ONE]));
        variant.sync(&actor, Arc::clone(&moved));
        assert!(variant.visible);
        assert_eq!(variant.transform, actor.transform);
        assert!(Arc::ptr_eq(&variant.geometry, &moved));
    }
}
