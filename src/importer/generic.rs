use super::{
    describe_poly_data, Actor, AnimationSupport, Importer, ImporterError, Result, TemporalInfo,
    UpdateStatus,
};
use crate::dataset::{Dataset, ImageData, PolyData};
use crate::readers::GeometryReader;
use std::sync::Arc;

/// Importer wrapping a low-level geometry reader into a single actor.
///
/// Volumes are represented by their outer surface, a per-voxel point cloud
/// and the image itself; temporal readers expose one animation named "default".
pub struct GenericImporter {
    reader: Box<dyn GeometryReader>,
    status: UpdateStatus,
    actors: Vec<Actor>,
    points: Option<Arc<PolyData>>,
    image: Option<Arc<ImageData>>,
    time_steps: Vec<f64>,
    animation_enabled: bool,
    description: String,
}

impl GenericImporter {
    pub fn new(reader: Box<dyn GeometryReader>) -> Self {
        Self {
            reader,
            status: UpdateStatus::NotUpdated,
            actors: Vec::new(),
            points: None,
            image: None,
            time_steps: Vec::new(),
            animation_enabled: false,
            description: String::new(),
        }
    }

    fn has_animation(&self) -> bool {
        !self.time_steps.is_empty()
    }

    fn set_dataset(&mut self, dataset: Dataset) {
        let (surface, points, image) = match dataset {
            Dataset::Poly(poly) => (Arc::clone(&poly), poly, None),
            Dataset::Image(image) => (
                Arc::new(image.outer_surface()),
                Arc::new(image.to_point_cloud()),
                Some(image),
            ),
        };

        self.description = match &image {
            Some(image) => format!(
                "{}\nImage dimensions: {} x {} x {}\n{}",
                self.reader.description(),
                image.dimensions[0],
                image.dimensions[1],
                image.dimensions[2],
                describe_poly_data(&points)
            ),
            None => format!("{}\n{}", self.reader.description(), describe_poly_data(&surface)),
        };

        match self.actors.first_mut() {
            Some(actor) => actor.geometry = surface,
            None => self
                .actors
                .push(Actor::new(self.reader.description(), surface)),
        }
        self.points = Some(points);
        self.image = image;
    }
}

impl Importer for GenericImporter {
    fn update(&mut self, progress: &mut dyn FnMut(f64)) -> Result<()> {
        progress(0.0);
        self.time_steps = self.reader.time_steps();
        let dataset = match self.time_steps.first() {
            Some(&first) => self.reader.read_at(first),
            None => self.reader.read(),
        };
        let dataset = match dataset {
            Ok(dataset) => dataset,
            Err(err) => {
                self.status = UpdateStatus::Failure;
                return Err(err.into());
            }
        };
        progress(0.5);
        self.set_dataset(dataset);
        self.status = UpdateStatus::Success;
        progress(1.0);
        Ok(())
    }

    fn update_status(&self) -> UpdateStatus {
        self.status
    }

    fn actors(&self) -> &[Actor] {
        &self.actors
    }

    fn actors_mut(&mut self) -> &mut [Actor] {
        &mut self.actors
    }

    fn outputs_description(&self) -> String {
        self.description.clone()
    }

    fn number_of_animations(&self) -> i32 {
        i32::from(self.has_animation())
    }

    fn animation_name(&self, index: usize) -> Option<String> {
        (index == 0 && self.has_animation()).then(|| "default".to_string())
    }

    fn enable_animation(&mut self, index: usize) {
        if index == 0 && self.has_animation() {
            self.animation_enabled = true;
        }
    }

    fn disable_animation(&mut self, index: usize) {
        if index == 0 {
            self.animation_enabled = false;
        }
    }

    fn is_animation_enabled(&self, index: usize) -> bool {
        index == 0 && self.animation_enabled
    }

    fn animation_support(&self) -> AnimationSupport {
        if self.has_animation() {
            AnimationSupport::Unique
        } else {
            AnimationSupport::None
        }
    }

    fn temporal_information(&self, index: usize, _frame_rate: f64) -> Option<TemporalInfo> {
        if index != 0 {
            return None;
        }
        let first = *self.time_steps.first()?;
        let last = *self.time_steps.last()?;
        Some(TemporalInfo {
            number_of_time_steps: self.time_steps.len(),
            time_range: [first, last],
            time_steps: self.time_steps.clone(),
        })
    }

    fn update_at_time_value(&mut self, time: f64) -> Result<()> {
        if self.status != UpdateStatus::Success {
            return Err(ImporterError::NotUpdated);
        }
        if !self.has_animation() || !self.animation_enabled {
            return Ok(());
        }
        // Largest time step not after the requested time.
        let step = self
            .time_steps
            .iter()
            .copied()
            .filter(|&step| step <= time)
            .last()
            .unwrap_or(self.time_steps[0]);
        let dataset = self.reader.read_at(step)?;
        self.set_dataset(dataset);
        Ok(())
    }

    fn point_cloud(&self, actor: usize) -> Option<Arc<PolyData>> {
        (actor == 0).then(|| self.points.clone()).flatten()
    }

    fn image_data(&self, actor: usize) -> Option<Arc<ImageData>> {
        (actor == 0).then(|| self.image.clone()).flatten()
    }

    fn is_generic(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::GenericImporter;
    use crate::dataset::{DataArray, Dataset, ImageData, PolyData};
    use crate::importer::{AnimationSupport, Importer, UpdateStatus};
    use crate::readers::{GeometryReader, ReaderError};
    use glam::Vec3;
    use std::path::Path;
    use std::sync::Arc;

    struct Temporal;

    impl GeometryReader for Temporal {
        fn read(&mut self) -> Result<Dataset, ReaderError> {
            self.read_at(0.0)
        }

        fn time_steps(&self) -> Vec<f64> {
            vec![0.0, 1.0, 2.0]
        }

        fn read_at(&mut self, time: f64) -> Result<Dataset, ReaderError> {
            Ok(Dataset::Poly(Arc::new(PolyData::new(vec![Vec3::splat(
                time as f32,
            )]))))
        }

        fn description(&self) -> String {
            "temporal".to_string()
        }
    }

    struct Volume;

    impl GeometryReader for Volume {
        fn read(&mut self) -> Result<Dataset, ReaderError> {
            let mut image = ImageData::new([2, 2, 2], Vec3::ONE, Vec3::ZERO);
            image
                .point_data
                .add_array(DataArray::new("density", 1, (0..8).map(f64::from).collect()).unwrap());
            Ok(Dataset::Image(Arc::new(image)))
        }

        fn description(&self) -> String {
            "volume".to_string()
        }
    }

    struct Broken;

    impl GeometryReader for Broken {
        fn read(&mut self) -> Result<Dataset, ReaderError> {
            Err(ReaderError::format(Path::new("broken.ply"), "bad header"))
        }

        fn description(&self) -> String {
            "broken".to_string()
        }
    }

    #[test]
    fn temporal_reader_exposes_default_animation() {
        let mut importer = GenericImporter::new(Box::new(Temporal));
        let mut reported = Vec::new();
        importer.update(&mut |p| reported.push(p)).unwrap();
        assert_eq!(reported, vec![0.0, 0.5, 1.0]);
        assert_eq!(importer.number_of_animations(), 1);
        assert_eq!(importer.animation_name(0).as_deref(), Some("default"));
        assert_eq!(importer.animation_support(), AnimationSupport::Unique);

        let info = importer.temporal_information(0, 30.0).unwrap();
        assert_eq!(info.time_range, [0.0, 2.0]);
        assert_eq!(info.number_of_time_steps, 3);

        importer.enable_animation(0);
        importer.update_at_time_value(1.5).unwrap();
        assert_eq!(importer.actors()[0].geometry.points[0], Vec3::ONE);
    }

    #[test]
    fn volume_outputs_surface_points_and_image() {
        let mut importer = GenericImporter::new(Box::new(Volume));
        importer.update(&mut |_| {}).unwrap();
        assert_eq!(importer.number_of_animations(), 0);
        assert_eq!(importer.actors().len(), 1);
        assert_eq!(importer.actors()[0].geometry.polys.len(), 6);
        assert_eq!(importer.point_cloud(0).unwrap().number_of_points(), 8);
        assert!(importer.image_data(0).unwrap().point_data.array("density").is_some());
        assert!(importer.image_data(1).is_none());
        assert!(importer.outputs_description().contains("Image dimensions: 2 x 2 x 2"));
    }

    #[test]
    fn reader_failure_marks_status() {
        let mut importer = GenericImporter::new(Box::new(Broken));
        assert!(importer.update(&mut |_| {}).is_err());
        assert_eq!(importer.update_status(), UpdateStatus::Failure);
        assert!(importer.actors().is_empty());
    }
}
