//! Aggregation of every per-file importer into one scene.
//!
//! The meta-importer owns the importers, translates global animation and
//! camera indices into importer-local ones, and keeps the derived render
//! variants (coloring, point sprites, volumes) of every imported actor.

use super::coloring::ColoringInfoHandler;
use super::variants::{ActorRef, ActorVariant, VolumeVariant};
use crate::dataset::BoundingBox;
use crate::importer::{
    Actor, AnimationSupport, ImportedCamera, Importer, ImporterError, Light, TemporalInfo,
};
use std::sync::Arc;

struct ImporterSlot {
    importer: Box<dyn Importer>,
    updated: bool,
}

/// One imported actor and the variants derived from it.
#[derive(Debug, Clone)]
pub struct ActorEntry {
    pub origin: ActorRef,
    /// Whether the original actor is drawn. Owned by the renderer.
    pub visible: bool,
    pub coloring: ActorVariant,
    pub point_sprites: ActorVariant,
    /// Generic importers keep their dedicated point cloud across time steps.
    sprites_from_importer: bool,
}

#[derive(Default)]
pub struct MetaImporter {
    importers: Vec<ImporterSlot>,
    entries: Vec<ActorEntry>,
    volumes: Vec<VolumeVariant>,
    bounds: BoundingBox,
    camera_index: Option<i32>,
    coloring: ColoringInfoHandler,
    update_time: u64,
    coloring_info_time: u64,
}

impl MetaImporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.importers.clear();
        self.entries.clear();
        self.volumes.clear();
        self.bounds = BoundingBox::empty();
        self.coloring.clear_coloring_info();
        self.update_time += 1;
        self.coloring_info_time = self.update_time;
    }

    pub fn add_importer(&mut self, importer: Box<dyn Importer>) {
        self.importers.push(ImporterSlot {
            importer,
            updated: false,
        });
    }

    pub fn number_of_importers(&self) -> usize {
        self.importers.len()
    }

    /// Updates every importer not updated yet and derives the render variants
    /// of their actors. `progress` receives the global fraction
    /// `(importer index + local progress) / importer count`.
    pub fn update(&mut self, progress: &mut dyn FnMut(f64)) -> Result<(), ImporterError> {
        self.update_time += 1;

        let mut local_camera = -1;
        if let Some(index) = self.camera_index {
            if index < 0 {
                log::warn!("Invalid camera index: {}. Camera may be incorrect.", index);
            }
            local_camera = index;
        }

        let count = self.importers.len();
        for position in 0..count {
            let slot = &mut self.importers[position];
            if slot.updated {
                local_camera -= slot.importer.number_of_cameras();
                continue;
            }

            if local_camera >= 0 {
                slot.importer.set_camera(Some(local_camera as usize));
            }

            let mut forward = |local: f64| progress((position as f64 + local) / count as f64);
            slot.importer.update(&mut forward)?;
            local_camera -= slot.importer.number_of_cameras();

            for actor in slot.importer.actors_mut() {
                actor.material.upgrade_to_pbr();
            }
            self.register_actors(position);
            self.importers[position].updated = true;
        }

        if let Some(index) = self.camera_index {
            if index >= 0 && local_camera >= 0 {
                log::warn!(
                    "Camera index {} is higher than the number of available camera in the files. Camera may be incorrect.",
                    index
                );
            }
        }
        Ok(())
    }

    fn register_actors(&mut self, position: usize) {
        let importer = &self.importers[position].importer;
        let generic = importer.is_generic();
        for (index, actor) in importer.actors().iter().enumerate() {
            let origin = ActorRef {
                importer: position,
                actor: index,
            };
            self.bounds.add_bounds(&actor.world_bounds());

            let sprites = if generic {
                importer.point_cloud(index)
            } else {
                None
            };
            let sprites_from_importer = sprites.is_some();
            let sprites = sprites.unwrap_or_else(|| Arc::clone(&actor.geometry));

            self.entries.push(ActorEntry {
                origin,
                visible: actor.visible,
                coloring: ActorVariant::new(origin, actor, Arc::clone(&actor.geometry)),
                point_sprites: ActorVariant::new(origin, actor, sprites),
                sprites_from_importer,
            });

            if let Some(image) = importer.image_data(index) {
                self.volumes.push(VolumeVariant::new(origin, actor, image));
            }
        }
    }

    /// Moves every importer to `time` and re-synchronizes the variants.
    /// Every importer is updated even when one fails; the first error is returned.
    pub fn update_at_time_value(&mut self, time: f64) -> Result<(), ImporterError> {
        let mut result = Ok(());
        for slot in &mut self.importers {
            if let Err(err) = slot.importer.update_at_time_value(time) {
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }

        for entry in &mut self.entries {
            let importer = &self.importers[entry.origin.importer].importer;
            let Some(actor) = importer.actors().get(entry.origin.actor) else {
                continue;
            };
            entry.coloring.sync(actor, Arc::clone(&actor.geometry));
            let sprites = if entry.sprites_from_importer {
                importer
                    .point_cloud(entry.origin.actor)
                    .unwrap_or_else(|| Arc::clone(&actor.geometry))
            } else {
                Arc::clone(&actor.geometry)
            };
            entry.point_sprites.sync(actor, sprites);
        }

        for volume in &mut self.volumes {
            let importer = &self.importers[volume.origin.importer].importer;
            let (Some(actor), Some(image)) = (
                importer.actors().get(volume.origin.actor),
                importer.image_data(volume.origin.actor),
            ) else {
                continue;
            };
            volume.sync(actor, image);
        }

        self.update_time += 1;
        result
    }

    /// Monotonic counter bumped whenever new geometry is available.
    pub fn update_time(&self) -> u64 {
        self.update_time
    }

    /// Coloring candidates of the current geometry, refreshed lazily.
    pub fn coloring_info_handler(&mut self) -> &mut ColoringInfoHandler {
        if self.update_time > self.coloring_info_time {
            self.update_info_for_coloring();
        }
        &mut self.coloring
    }

    fn update_info_for_coloring(&mut self) {
        for entry in &self.entries {
            let importer = &self.importers[entry.origin.importer].importer;
            let index = entry.origin.actor;
            let image = importer.image_data(index);
            let points = importer.point_cloud(index);

            let (point_data, cell_data) = match (&image, &points) {
                (Some(image), _) => (&image.point_data, &image.cell_data),
                (None, Some(points)) => (&points.point_data, &points.cell_data),
                (None, None) => (
                    &entry.coloring.geometry.point_data,
                    &entry.coloring.geometry.cell_data,
                ),
            };
            self.coloring.update_coloring_info(point_data, false);
            self.coloring.update_coloring_info(cell_data, true);
        }
        self.coloring.finalize_coloring_info(false);
        self.coloring.finalize_coloring_info(true);
        self.coloring_info_time = self.update_time;
    }

    pub fn bounds(&self) -> BoundingBox {
        self.bounds
    }

    pub fn entries(&self) -> &[ActorEntry] {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut [ActorEntry] {
        &mut self.entries
    }

    pub fn volumes(&self) -> &[VolumeVariant] {
        &self.volumes
    }

    pub fn volumes_mut(&mut self) -> &mut [VolumeVariant] {
        &mut self.volumes
    }

    /// Original actor behind a variant.
    pub fn actor(&self, origin: ActorRef) -> Option<&Actor> {
        self.importers
            .get(origin.importer)?
            .importer
            .actors()
            .get(origin.actor)
    }

    pub fn lights(&self) -> Vec<Light> {
        self.importers
            .iter()
            .flat_map(|slot| slot.importer.lights().iter().cloned())
            .collect()
    }

    pub fn outputs_description(&self) -> String {
        let mut description = format!(
            "Number of files: {}\nNumber of actors: {}\n",
            self.importers.len(),
            self.entries.len()
        );
        for slot in &self.importers {
            description.push_str("----------\n");
            description.push_str(&slot.importer.outputs_description());
        }
        description
    }

    pub fn metadata_description(&self) -> String {
        let mut description = String::new();
        if self.importers.len() > 1 {
            description.push_str(&format!("Number of files: {}\n", self.importers.len()));
        }
        let (points, cells) = self
            .importers
            .iter()
            .flat_map(|slot| slot.importer.actors())
            .fold((0, 0), |(points, cells), actor| {
                (
                    points + actor.geometry.number_of_points(),
                    cells + actor.geometry.number_of_cells(),
                )
            });
        description.push_str(&format!(
            "Number of actors: {}\nNumber of points: {}\nNumber of cells: {}",
            self.entries.len(),
            points,
            cells
        ));
        description
    }

    /// Merged support level: NONE is neutral, two UNIQUE make MULTI, SINGLE dominates.
    pub fn animation_support_level(&self) -> AnimationSupport {
        self.importers
            .iter()
            .fold(AnimationSupport::None, |level, slot| {
                match slot.importer.animation_support() {
                    AnimationSupport::None => level,
                    AnimationSupport::Unique => match level {
                        AnimationSupport::None => AnimationSupport::Unique,
                        AnimationSupport::Unique => AnimationSupport::Multi,
                        other => other,
                    },
                    AnimationSupport::Single => AnimationSupport::Single,
                    AnimationSupport::Multi => {
                        if level == AnimationSupport::Single {
                            AnimationSupport::Single
                        } else {
                            AnimationSupport::Multi
                        }
                    }
                }
            })
    }

    pub fn number_of_animations(&self) -> usize {
        self.importers
            .iter()
            .map(|slot| slot.importer.number_of_animations().max(0) as usize)
            .sum()
    }

    /// Importer position and local index of a global animation index.
    fn locate_animation(&self, index: usize) -> Option<(usize, usize)> {
        let mut local = index;
        for (position, slot) in self.importers.iter().enumerate() {
            let count = slot.importer.number_of_animations().max(0) as usize;
            if local < count {
                return Some((position, local));
            }
            local -= count;
        }
        None
    }

    /// Animation name, `unnamed_<index>` when the importer gives none, empty when out of range.
    pub fn animation_name(&self, index: usize) -> String {
        let Some((position, local)) = self.locate_animation(index) else {
            return String::new();
        };
        self.importers[position]
            .importer
            .animation_name(local)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| format!("unnamed_{}", index))
    }

    pub fn enable_animation(&mut self, index: usize) {
        if let Some((position, local)) = self.locate_animation(index) {
            self.importers[position].importer.enable_animation(local);
        }
    }

    pub fn disable_animation(&mut self, index: usize) {
        if let Some((position, local)) = self.locate_animation(index) {
            self.importers[position].importer.disable_animation(local);
        }
    }

    pub fn is_animation_enabled(&self, index: usize) -> bool {
        self.locate_animation(index)
            .map(|(position, local)| self.importers[position].importer.is_animation_enabled(local))
            .unwrap_or(false)
    }

    pub fn temporal_information(&self, index: usize, frame_rate: f64) -> Option<TemporalInfo> {
        let (position, local) = self.locate_animation(index)?;
        self.importers[position]
            .importer
            .temporal_information(local, frame_rate)
    }

    pub fn number_of_cameras(&self) -> usize {
        self.importers
            .iter()
            .map(|slot| slot.importer.number_of_cameras().max(0) as usize)
            .sum()
    }

    /// Camera name, `unnamed_<index>` when the importer gives none, empty when out of range.
    pub fn camera_name(&self, index: usize) -> String {
        let mut local = index;
        for slot in &self.importers {
            let count = slot.importer.number_of_cameras().max(0) as usize;
            if local < count {
                return slot
                    .importer
                    .camera_name(local)
                    .filter(|name| !name.is_empty())
                    .unwrap_or_else(|| format!("unnamed_{}", index));
            }
            local -= count;
        }
        String::new()
    }

    /// Global camera index consumed by the next `update`.
    pub fn set_camera_index(&mut self, index: Option<i32>) {
        self.camera_index = index;
    }

    pub fn camera_index(&self) -> Option<i32> {
        self.camera_index
    }

    /// First camera selected by an importer, if any.
    pub fn selected_camera(&self) -> Option<&ImportedCamera> {
        self.importers
            .iter()
            .find_map(|slot| slot.importer.selected_camera())
    }
}

#[cfg(test)]
mod tests {
    use super::MetaImporter;
    use crate::dataset::{DataArray, PolyData};
    use crate::importer::{
        Actor, AnimationSupport, ImportedCamera, Importer, ImporterError, Material, Result,
        UpdateStatus,
    };
    use glam::Vec3;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::Arc;

    #[derive(Default)]
    struct Log {
        set_cameras: Vec<(String, Option<usize>)>,
        times: Vec<f64>,
    }

    struct Fake {
        name: String,
        cameras: Vec<String>,
        animations: i32,
        support: AnimationSupport,
        fail: bool,
        actors: Vec<Actor>,
        selected: Option<ImportedCamera>,
        log: Rc<RefCell<Log>>,
    }

    impl Fake {
        fn new(name: &str, cameras: &[&str], log: &Rc<RefCell<Log>>) -> Self {
            let mut geometry = PolyData::new(vec![Vec3::ZERO, Vec3::X, Vec3::Y]);
            geometry.polys.push(vec![0, 1, 2]);
            geometry
                .point_data
                .add_array(DataArray::new("height", 1, vec![0.0, 0.5, 1.0]).unwrap());
            Self {
                name: name.to_string(),
                cameras: cameras.iter().map(|c| c.to_string()).collect(),
                animations: -1,
                support: AnimationSupport::None,
                fail: false,
                actors: vec![Actor::new(name, Arc::new(geometry))],
                selected: None,
                log: Rc::clone(log),
            }
        }
    }

    impl Importer for Fake {
        fn update(&mut self, progress: &mut dyn FnMut(f64)) -> Result<()> {
            progress(0.0);
            progress(1.0);
            if self.fail {
                return Err(ImporterError::Invalid {
                    path: self.name.clone(),
                    reason: "cannot read".to_string(),
                });
            }
            Ok(())
        }

        fn update_status(&self) -> UpdateStatus {
            UpdateStatus::Success
        }

        fn actors(&self) -> &[Actor] {
            &self.actors
        }

        fn actors_mut(&mut self) -> &mut [Actor] {
            &mut self.actors
        }

        fn outputs_description(&self) -> String {
            format!("{}\n", self.name)
        }

        fn number_of_animations(&self) -> i32 {
            self.animations
        }

        fn animation_name(&self, index: usize) -> Option<String> {
            (index == 0).then(String::new)
        }

        fn animation_support(&self) -> AnimationSupport {
            self.support
        }

        fn update_at_time_value(&mut self, time: f64) -> Result<()> {
            self.log.borrow_mut().times.push(time);
            Ok(())
        }

        fn number_of_cameras(&self) -> i32 {
            self.cameras.len() as i32
        }

        fn camera_name(&self, index: usize) -> Option<String> {
            self.cameras.get(index).cloned()
        }

        fn set_camera(&mut self, index: Option<usize>) {
            self.log
                .borrow_mut()
                .set_cameras
                .push((self.name.clone(), index));
            self.selected = index.and_then(|i| self.cameras.get(i)).map(|name| ImportedCamera {
                name: name.clone(),
                position: Vec3::Z,
                focal_point: Vec3::ZERO,
                view_up: Vec3::Y,
                view_angle: 30.0,
                parallel_scale: None,
            });
        }

        fn selected_camera(&self) -> Option<&ImportedCamera> {
            self.selected.as_ref()
        }
    }

    #[test]
    fn camera_names_resolve_to_owning_importer() {
        let log = Rc::new(RefCell::new(Log::default()));
        let mut meta = MetaImporter::new();
        meta.add_importer(Box::new(Fake::new("a", &["a0", "a1"], &log)));
        meta.add_importer(Box::new(Fake::new("b", &[], &log)));
        meta.add_importer(Box::new(Fake::new("c", &["c0", "", "c2"], &log)));

        assert_eq!(meta.number_of_cameras(), 5);
        let names: Vec<String> = (0..6).map(|i| meta.camera_name(i)).collect();
        assert_eq!(names, vec!["a0", "a1", "c0", "unnamed_3", "c2", ""]);
    }

    #[test]
    fn camera_index_is_assigned_to_the_right_importer() {
        let log = Rc::new(RefCell::new(Log::default()));
        let mut meta = MetaImporter::new();
        meta.add_importer(Box::new(Fake::new("a", &["a0", "a1"], &log)));
        meta.add_importer(Box::new(Fake::new("b", &["b0", "b1"], &log)));
        meta.set_camera_index(Some(3));
        meta.update(&mut |_| {}).unwrap();

        assert_eq!(
            log.borrow().set_cameras,
            vec![("a".to_string(), Some(3)), ("b".to_string(), Some(1))]
        );
        assert_eq!(meta.selected_camera().map(|c| c.name.as_str()), Some("b1"));
    }

    #[test]
    fn animation_indices_skip_unsupported_importers() {
        let log = Rc::new(RefCell::new(Log::default()));
        let mut first = Fake::new("a", &[], &log);
        first.animations = 2;
        first.support = AnimationSupport::Unique;
        let unsupported = Fake::new("b", &[], &log);
        let mut last = Fake::new("c", &[], &log);
        last.animations = 1;
        last.support = AnimationSupport::Unique;

        let mut meta = MetaImporter::new();
        meta.add_importer(Box::new(first));
        meta.add_importer(Box::new(unsupported));
        meta.add_importer(Box::new(last));

        assert_eq!(meta.number_of_animations(), 3);
        assert_eq!(meta.animation_name(0), "unnamed_0");
        assert_eq!(meta.animation_name(2), "unnamed_2");
        assert_eq!(meta.animation_name(3), "");
        assert_eq!(meta.animation_support_level(), AnimationSupport::Multi);
    }

    #[test]
    fn update_forwards_global_progress_and_collects_actors() {
        let log = Rc::new(RefCell::new(Log::default()));
        let mut meta = MetaImporter::new();
        let mut phong = Fake::new("a", &[], &log);
        phong.actors[0].material = Material::phong(Vec3::splat(0.5));
        meta.add_importer(Box::new(phong));
        meta.add_importer(Box::new(Fake::new("b", &[], &log)));

        let mut reported = Vec::new();
        meta.update(&mut |p| reported.push(p)).unwrap();
        assert_eq!(reported, vec![0.0, 0.5, 0.5, 1.0]);
        assert_eq!(meta.entries().len(), 2);
        assert!(!meta.entries()[0].coloring.visible);
        assert!(meta.bounds().is_valid());

        let upgraded = &meta.actor(meta.entries()[0].origin).unwrap().material;
        assert!((upgraded.color.x - 0.214).abs() < 1e-3);

        assert!(meta.outputs_description().starts_with("Number of files: 2\nNumber of actors: 2\n----------\na\n"));
        assert_eq!(
            meta.metadata_description(),
            "Number of files: 2\nNumber of actors: 2\nNumber of points: 6\nNumber of cells: 2"
        );
    }

    #[test]
    fn failing_importer_aborts_update() {
        let log = Rc::new(RefCell::new(Log::default()));
        let mut broken = Fake::new("broken", &[], &log);
        broken.fail = true;
        let mut meta = MetaImporter::new();
        meta.add_importer(Box::new(broken));
        assert!(meta.update(&mut |_| {}).is_err());
        assert!(meta.entries().is_empty());
    }

    #[test]
    fn coloring_info_is_refreshed_after_time_changes() {
        let log = Rc::new(RefCell::new(Log::default()));
        let mut meta = MetaImporter::new();
        meta.add_importer(Box::new(Fake::new("a", &[], &log)));
        meta.update(&mut |_| {}).unwrap();

        let handler = meta.coloring_info_handler();
        assert_eq!(handler.array_names(false), vec!["height"]);
        assert_eq!(handler.number_of_indexes_for_coloring(true), 0);

        meta.update_at_time_value(0.25).unwrap();
        assert_eq!(log.borrow().times, vec![0.25]);
        assert_eq!(meta.coloring_info_handler().number_of_indexes_for_coloring(false), 1);
    }
}
