//! Scene loading: file lookup, importer creation and the aggregated scene state.

pub mod animation;
pub mod coloring;
pub mod meta_importer;
pub mod variants;

pub use animation::{AnimationHost, AnimationManager, AnimationState};
pub use coloring::{ColoringInfo, ColoringInfoHandler};
pub use meta_importer::{ActorEntry, MetaImporter};
pub use variants::{ActorRef, ActorVariant, VolumeVariant};

use crate::dataset::{Dataset, DatasetError, PolyData};
use crate::importer::{GenericImporter, Importer, ImporterError};
use crate::options::Options;
use crate::readers::{GeometryReader, ReaderError, ReaderRegistry};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Loads faster than this never show the loader progress bar.
const LOADER_PROGRESS_DELAY: Duration = Duration::from_millis(150);

#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    #[error("{0} does not exist")]
    Missing(String),
    #[error("{0} is not a file of a supported 3D scene file format")]
    NoReader(String),
    #[error("reader {reader} cannot create an importer for {path}")]
    NoImporter { reader: String, path: String },
    #[error("invalid mesh: {0}")]
    InvalidMesh(#[from] DatasetError),
    #[error("failed to load scene")]
    Load(#[source] ImporterError),
}

pub type Result<T> = std::result::Result<T, SceneError>;

/// What a loaded scene notifies beyond animation playback.
pub trait SceneHost: AnimationHost {
    /// `None` hides the loader progress bar.
    fn set_load_progress(&mut self, progress: Option<f64>);

    /// Called once importers are updated and the animation is initialized.
    fn scene_loaded(&mut self, importer: &mut MetaImporter, reset_camera: bool);

    fn scene_cleared(&mut self);
}

/// Geometry reader serving an in-memory mesh.
struct MemoryMesh {
    poly: Arc<PolyData>,
}

impl GeometryReader for MemoryMesh {
    fn read(&mut self) -> std::result::Result<Dataset, ReaderError> {
        Ok(Dataset::Poly(Arc::clone(&self.poly)))
    }

    fn description(&self) -> String {
        "In memory mesh".to_string()
    }
}

pub struct Scene {
    registry: ReaderRegistry,
    importer: MetaImporter,
    animation: AnimationManager,
    files: Vec<PathBuf>,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    pub fn new() -> Self {
        Self::with_registry(ReaderRegistry::with_builtin_readers())
    }

    pub fn with_registry(registry: ReaderRegistry) -> Self {
        Self {
            registry,
            importer: MetaImporter::new(),
            animation: AnimationManager::new(),
            files: Vec::new(),
        }
    }

    /// Whether a registered reader can read `path`.
    pub fn supports(&self, path: &Path) -> bool {
        self.registry.reader_for(path).is_some()
    }

    /// Adds files to the scene. Any failure clears the whole scene.
    pub fn add<H: SceneHost>(
        &mut self,
        paths: &[PathBuf],
        options: &Options,
        host: &mut H,
    ) -> Result<()> {
        if paths.is_empty() {
            log::debug!("No file to load a full scene provided");
            return Ok(());
        }

        let mut importers: Vec<Box<dyn Importer>> = Vec::with_capacity(paths.len());
        for path in paths {
            if path.as_os_str().is_empty() {
                log::debug!("An empty file to load was provided");
                continue;
            }
            if !path.exists() {
                return Err(SceneError::Missing(path.display().to_string()));
            }
            let Some(reader) = self.registry.reader_for(path) else {
                return Err(SceneError::NoReader(path.display().to_string()));
            };
            log::debug!("Found a reader for \"{}\" : \"{}\"", path.display(), reader.name());

            let reader_options = self.registry.reader_options();
            let importer: Box<dyn Importer> = match reader.create_scene_reader(path, reader_options) {
                Some(importer) => importer,
                None => match reader.create_geometry_reader(path, reader_options) {
                    Some(geometry) => Box::new(GenericImporter::new(geometry)),
                    None => {
                        return Err(SceneError::NoImporter {
                            reader: reader.name().to_string(),
                            path: path.display().to_string(),
                        })
                    }
                },
            };
            importers.push(importer);
        }

        log::debug!("Loading files:");
        for path in paths {
            log::debug!("- {}", path.display());
        }

        self.load(importers, options, host)?;
        self.files.extend(paths.iter().cloned());
        Ok(())
    }

    /// Adds an in-memory mesh to the scene.
    pub fn add_mesh<H: SceneHost>(
        &mut self,
        poly: PolyData,
        options: &Options,
        host: &mut H,
    ) -> Result<()> {
        poly.validate()?;
        log::debug!("Loading 3D scene from memory");
        let reader = MemoryMesh {
            poly: Arc::new(poly),
        };
        let importer: Box<dyn Importer> = Box::new(GenericImporter::new(Box::new(reader)));
        self.load(vec![importer], options, host)
    }

    fn load<H: SceneHost>(
        &mut self,
        importers: Vec<Box<dyn Importer>>,
        options: &Options,
        host: &mut H,
    ) -> Result<()> {
        for importer in importers {
            self.importer.add_importer(importer);
        }
        if let Some(index) = options.scene.camera.index {
            self.importer.set_camera_index(Some(index));
        }

        let start = Instant::now();
        let show_progress = options.ui.loader_progress;
        let mut shown = false;
        let result = {
            let mut progress = |fraction: f64| {
                if show_progress && start.elapsed() >= LOADER_PROGRESS_DELAY {
                    shown = true;
                    host.set_load_progress(Some(fraction));
                }
            };
            self.importer.update(&mut progress)
        };
        if shown {
            host.set_load_progress(None);
        }

        if let Err(err) = result {
            log::error!("{}", err);
            self.clear(host);
            return Err(SceneError::Load(err));
        }

        self.animation.initialize(options, &mut self.importer, host);
        host.scene_loaded(&mut self.importer, options.scene.camera.index.is_none());

        let cameras = self.importer.number_of_cameras();
        if cameras == 0 {
            log::debug!("No camera available");
        } else {
            log::debug!("Camera(s) available are:");
            for index in 0..cameras {
                log::debug!("{}: {}", index, self.importer.camera_name(index));
            }
        }
        log::debug!("{}", self.importer.outputs_description());
        Ok(())
    }

    /// Removes every file from the scene.
    pub fn clear<H: SceneHost>(&mut self, host: &mut H) {
        self.importer.clear();
        self.files.clear();
        self.animation = AnimationManager::new();
        host.scene_cleared();
    }

    pub fn tick<H: AnimationHost>(&mut self, now: Instant, host: &mut H) {
        self.animation.tick(now, &mut self.importer, host);
    }

    pub fn load_animation_time<H: AnimationHost>(&mut self, time: f64, host: &mut H) -> bool {
        self.animation.load_at_time(time, &mut self.importer, host)
    }

    pub fn toggle_animation<H: AnimationHost>(&mut self, host: &mut H) {
        self.animation.toggle(&mut self.importer, host);
    }

    pub fn stop_animation<H: AnimationHost>(&mut self, host: &mut H) {
        self.animation.stop(&mut self.importer, host);
    }

    pub fn cycle_animation<H: AnimationHost>(&mut self, host: &mut H) {
        self.animation.cycle_animation(&mut self.importer, host);
    }

    pub fn animation_name(&self) -> String {
        self.animation.animation_name(&self.importer)
    }

    pub fn animation(&self) -> &AnimationManager {
        &self.animation
    }

    pub fn animation_mut(&mut self) -> &mut AnimationManager {
        &mut self.animation
    }

    pub fn importer(&self) -> &MetaImporter {
        &self.importer
    }

    pub fn importer_mut(&mut self) -> &mut MetaImporter {
        &mut self.importer
    }

    pub fn registry(&self) -> &ReaderRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ReaderRegistry {
        &mut self.registry
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }
}
