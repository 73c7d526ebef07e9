//! In-memory dataset model shared by readers, importers and the renderer.

use glam::{Mat4, Vec2, Vec3};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("array {name} has {len} values which is not a multiple of {components} components")]
    RaggedArray {
        name: String,
        len: usize,
        components: usize,
    },
    #[error("array {0} must have at least one component")]
    NoComponents(String),
    #[error("cell {cell} references point {point} but the dataset has {points} points")]
    PointOutOfRange {
        cell: usize,
        point: u32,
        points: usize,
    },
}

/// A named array of fixed-size tuples.
#[derive(Debug, Clone, PartialEq)]
pub struct DataArray {
    name: String,
    components: usize,
    values: Vec<f64>,
    component_names: Vec<String>,
}

impl DataArray {
    pub fn new(
        name: impl Into<String>,
        components: usize,
        values: Vec<f64>,
    ) -> Result<Self, DatasetError> {
        let name = name.into();
        if components == 0 {
            return Err(DatasetError::NoComponents(name));
        }
        if values.len() % components != 0 {
            return Err(DatasetError::RaggedArray {
                name,
                len: values.len(),
                components,
            });
        }
        Ok(Self {
            name,
            components,
            values,
            component_names: Vec::new(),
        })
    }

    pub fn with_component_names(mut self, names: Vec<String>) -> Self {
        self.component_names = names;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn number_of_components(&self) -> usize {
        self.components
    }

    pub fn number_of_tuples(&self) -> usize {
        self.values.len() / self.components
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn tuple(&self, index: usize) -> &[f64] {
        let start = index * self.components;
        &self.values[start..start + self.components]
    }

    /// Name of a component, when the producer provided one.
    pub fn component_name(&self, component: usize) -> Option<&str> {
        self.component_names
            .get(component)
            .map(String::as_str)
            .filter(|name| !name.is_empty())
    }

    pub fn magnitude(&self, index: usize) -> f64 {
        self.tuple(index).iter().map(|v| v * v).sum::<f64>().sqrt()
    }

    /// Value used for scalar mapping: a component, or the magnitude for `-1`.
    pub fn scalar(&self, index: usize, component: i32) -> f64 {
        if component < 0 {
            self.magnitude(index)
        } else {
            self.tuple(index)
                .get(component as usize)
                .copied()
                .unwrap_or(0.0)
        }
    }

    /// `[min, max]` of a component, or of the magnitude for `-1`.
    /// Returns `None` for an empty array or an out of range component.
    pub fn range(&self, component: i32) -> Option<[f64; 2]> {
        if component >= self.components as i32 || self.number_of_tuples() == 0 {
            return None;
        }
        let mut range = [f64::MAX, f64::MIN];
        for index in 0..self.number_of_tuples() {
            let value = self.scalar(index, component);
            if value.is_nan() {
                continue;
            }
            range[0] = range[0].min(value);
            range[1] = range[1].max(value);
        }
        (range[0] <= range[1]).then_some(range)
    }
}

/// Named arrays attached to points or cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeData {
    arrays: Vec<DataArray>,
}

impl AttributeData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an array, replacing any array with the same name.
    pub fn add_array(&mut self, array: DataArray) {
        if let Some(existing) = self.arrays.iter_mut().find(|a| a.name == array.name) {
            *existing = array;
        } else {
            self.arrays.push(array);
        }
    }

    pub fn array(&self, name: &str) -> Option<&DataArray> {
        self.arrays.iter().find(|array| array.name == name)
    }

    pub fn arrays(&self) -> &[DataArray] {
        &self.arrays
    }

    pub fn len(&self) -> usize {
        self.arrays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }
}

/// Axis aligned bounds. A freshly created box is invalid until a point is added.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::empty()
    }
}

impl BoundingBox {
    pub fn empty() -> Self {
        Self {
            min: Vec3::splat(f32::MAX),
            max: Vec3::splat(f32::MIN),
        }
    }

    pub fn from_points(points: &[Vec3]) -> Self {
        let mut bounds = Self::empty();
        for point in points {
            bounds.add_point(*point);
        }
        bounds
    }

    pub fn is_valid(&self) -> bool {
        self.min.x <= self.max.x && self.min.y <= self.max.y && self.min.z <= self.max.z
    }

    pub fn add_point(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    pub fn add_bounds(&mut self, other: &BoundingBox) {
        if other.is_valid() {
            self.add_point(other.min);
            self.add_point(other.max);
        }
    }

    pub fn center(&self) -> Vec3 {
        if self.is_valid() {
            (self.min + self.max) * 0.5
        } else {
            Vec3::ZERO
        }
    }

    pub fn extent(&self) -> Vec3 {
        if self.is_valid() {
            self.max - self.min
        } else {
            Vec3::ZERO
        }
    }

    pub fn diagonal(&self) -> f32 {
        self.extent().length()
    }

    pub fn corners(&self) -> [Vec3; 8] {
        let (a, b) = (self.min, self.max);
        [
            Vec3::new(a.x, a.y, a.z),
            Vec3::new(b.x, a.y, a.z),
            Vec3::new(a.x, b.y, a.z),
            Vec3::new(b.x, b.y, a.z),
            Vec3::new(a.x, a.y, b.z),
            Vec3::new(b.x, a.y, b.z),
            Vec3::new(a.x, b.y, b.z),
            Vec3::new(b.x, b.y, b.z),
        ]
    }

    /// World-space bounds of this box after `transform`.
    pub fn transformed(&self, transform: &Mat4) -> Self {
        if !self.is_valid() {
            return *self;
        }
        let mut out = Self::empty();
        for corner in self.corners() {
            out.add_point(transform.transform_point3(corner));
        }
        out
    }
}

/// Points with polygonal and line cells.
#[derive(Debug, Clone, Default)]
pub struct PolyData {
    pub points: Vec<Vec3>,
    pub polys: Vec<Vec<u32>>,
    pub lines: Vec<Vec<u32>>,
    pub normals: Option<Vec<Vec3>>,
    pub tcoords: Option<Vec<Vec2>>,
    pub point_data: AttributeData,
    /// Cell arrays are indexed with polygons first, then lines.
    pub cell_data: AttributeData,
}

impl PolyData {
    pub fn new(points: Vec<Vec3>) -> Self {
        Self {
            points,
            ..Self::default()
        }
    }

    pub fn number_of_points(&self) -> usize {
        self.points.len()
    }

    pub fn number_of_cells(&self) -> usize {
        self.polys.len() + self.lines.len()
    }

    pub fn bounds(&self) -> BoundingBox {
        BoundingBox::from_points(&self.points)
    }

    pub fn validate(&self) -> Result<(), DatasetError> {
        let points = self.points.len();
        for (cell, ids) in self.polys.iter().chain(self.lines.iter()).enumerate() {
            if let Some(&point) = ids.iter().find(|&&id| id as usize >= points) {
                return Err(DatasetError::PointOutOfRange {
                    cell,
                    point,
                    points,
                });
            }
        }
        Ok(())
    }

    /// Fan triangulation of every polygon, tagged with its cell index.
    pub fn triangles(&self) -> Vec<([u32; 3], usize)> {
        let mut triangles = Vec::new();
        for (cell, poly) in self.polys.iter().enumerate() {
            if poly.len() < 3 {
                continue;
            }
            for i in 1..poly.len() - 1 {
                triangles.push(([poly[0], poly[i], poly[i + 1]], cell));
            }
        }
        triangles
    }

    /// Area weighted vertex normals.
    pub fn compute_point_normals(&self) -> Vec<Vec3> {
        let mut normals = vec![Vec3::ZERO; self.points.len()];
        for (tri, _) in self.triangles() {
            let [a, b, c] = tri.map(|i| self.points[i as usize]);
            let face = (b - a).cross(c - a);
            for index in tri {
                normals[index as usize] += face;
            }
        }
        for normal in &mut normals {
            *normal = normal.try_normalize().unwrap_or(Vec3::Z);
        }
        normals
    }

    /// Normals to shade with: provided ones when consistent, computed otherwise.
    pub fn shading_normals(&self) -> Vec<Vec3> {
        match &self.normals {
            Some(normals) if normals.len() == self.points.len() => normals.clone(),
            _ => self.compute_point_normals(),
        }
    }
}

/// Uniform grid of voxels, used for volume rendering.
#[derive(Debug, Clone)]
pub struct ImageData {
    pub dimensions: [usize; 3],
    pub spacing: Vec3,
    pub origin: Vec3,
    pub point_data: AttributeData,
    pub cell_data: AttributeData,
}

impl ImageData {
    pub fn new(dimensions: [usize; 3], spacing: Vec3, origin: Vec3) -> Self {
        Self {
            dimensions,
            spacing,
            origin,
            point_data: AttributeData::new(),
            cell_data: AttributeData::new(),
        }
    }

    pub fn number_of_points(&self) -> usize {
        self.dimensions.iter().product()
    }

    pub fn number_of_cells(&self) -> usize {
        self.dimensions
            .iter()
            .map(|d| d.saturating_sub(1).max(1))
            .product()
    }

    pub fn point_index(&self, i: usize, j: usize, k: usize) -> usize {
        i + self.dimensions[0] * (j + self.dimensions[1] * k)
    }

    pub fn point_position(&self, i: usize, j: usize, k: usize) -> Vec3 {
        self.origin + self.spacing * Vec3::new(i as f32, j as f32, k as f32)
    }

    pub fn bounds(&self) -> BoundingBox {
        let [nx, ny, nz] = self.dimensions;
        if nx == 0 || ny == 0 || nz == 0 {
            return BoundingBox::empty();
        }
        let mut bounds = BoundingBox::empty();
        bounds.add_point(self.origin);
        bounds.add_point(self.point_position(nx - 1, ny - 1, nz - 1));
        bounds
    }

    /// Continuous voxel coordinates of a world position.
    pub fn to_voxel(&self, position: Vec3) -> Vec3 {
        let spacing = Vec3::new(
            nonzero(self.spacing.x),
            nonzero(self.spacing.y),
            nonzero(self.spacing.z),
        );
        (position - self.origin) / spacing
    }

    /// Points at every voxel, carrying the point arrays.
    pub fn to_point_cloud(&self) -> PolyData {
        let [nx, ny, nz] = self.dimensions;
        let mut points = Vec::with_capacity(self.number_of_points());
        for k in 0..nz {
            for j in 0..ny {
                for i in 0..nx {
                    points.push(self.point_position(i, j, k));
                }
            }
        }
        let mut cloud = PolyData::new(points);
        cloud.point_data = self.point_data.clone();
        cloud
    }

    /// Six outer faces of the grid, used as its surface representation.
    pub fn outer_surface(&self) -> PolyData {
        let bounds = self.bounds();
        if !bounds.is_valid() {
            return PolyData::default();
        }
        let mut surface = PolyData::new(bounds.corners().to_vec());
        surface.polys = vec![
            vec![0, 2, 3, 1],
            vec![4, 5, 7, 6],
            vec![0, 1, 5, 4],
            vec![2, 6, 7, 3],
            vec![0, 4, 6, 2],
            vec![1, 3, 7, 5],
        ];
        surface
    }
}

fn nonzero(value: f32) -> f32 {
    if value.abs() < f32::EPSILON {
        1.0
    } else {
        value
    }
}

/// Output of a geometry reader.
#[derive(Debug, Clone)]
pub enum Dataset {
    Poly(Arc<PolyData>),
    Image(Arc<ImageData>),
}

impl Dataset {
    pub fn bounds(&self) -> BoundingBox {
        match self {
            Dataset::Poly(poly) => poly.bounds(),
            Dataset::Image(image) => image.bounds(),
        }
    }

    pub fn number_of_points(&self) -> usize {
        match self {
            Dataset::Poly(poly) => poly.number_of_points(),
            Dataset::Image(image) => image.number_of_points(),
        }
    }

    pub fn number_of_cells(&self) -> usize {
        match self {
            Dataset::Poly(poly) => poly.number_of_cells(),
            Dataset::Image(image) => image.number_of_cells(),
        }
    }

    pub fn attributes(&self, use_cell_data: bool) -> &AttributeData {
        match (self, use_cell_data) {
            (Dataset::Poly(poly), false) => &poly.point_data,
            (Dataset::Poly(poly), true) => &poly.cell_data,
            (Dataset::Image(image), false) => &image.point_data,
            (Dataset::Image(image), true) => &image.cell_data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{BoundingBox, DataArray, ImageData, PolyData};
    use glam::{Mat4, Vec3};

    #[test]
    fn array_ranges_cover_components_and_magnitude() {
        let array = DataArray::new("velocity", 2, vec![3.0, 4.0, -1.0, 0.0]).unwrap();
        assert_eq!(array.number_of_tuples(), 2);
        assert_eq!(array.range(0), Some([-1.0, 3.0]));
        assert_eq!(array.range(1), Some([0.0, 4.0]));
        assert_eq!(array.range(-1), Some([1.0, 5.0]));
        assert_eq!(array.range(2), None);
    }

    #[test]
    fn ragged_arrays_are_rejected() {
        assert!(DataArray::new("bad", 3, vec![1.0, 2.0]).is_err());
        assert!(DataArray::new("bad", 0, vec![]).is_err());
    }

    #[test]
    fn bounding_box_transforms_and_merges() {
        let mut bounds = BoundingBox::empty();
        assert!(!bounds.is_valid());
        bounds.add_point(Vec3::new(-1.0, 0.0, 0.0));
        bounds.add_point(Vec3::new(1.0, 2.0, 0.0));
        let moved = bounds.transformed(&Mat4::from_translation(Vec3::new(10.0, 0.0, 0.0)));
        assert_eq!(moved.min, Vec3::new(9.0, 0.0, 0.0));

        let mut merged = BoundingBox::empty();
        merged.add_bounds(&bounds);
        merged.add_bounds(&BoundingBox::empty());
        merged.add_bounds(&moved);
        assert_eq!(merged.min.x, -1.0);
        assert_eq!(merged.max.x, 11.0);
    }

    #[test]
    fn quads_are_fan_triangulated_with_cell_ids() {
        let mut poly = PolyData::new(vec![
            Vec3::ZERO,
            Vec3::X,
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::Y,
        ]);
        poly.polys = vec![vec![0, 1, 2, 3]];
        let triangles = poly.triangles();
        assert_eq!(triangles, vec![([0, 1, 2], 0), ([0, 2, 3], 0)]);
        let normals = poly.compute_point_normals();
        assert!(normals.iter().all(|n| (*n - Vec3::Z).length() < 1e-6));
    }

    #[test]
    fn invalid_cells_are_detected() {
        let mut poly = PolyData::new(vec![Vec3::ZERO]);
        poly.lines = vec![vec![0, 3]];
        assert!(poly.validate().is_err());
    }

    #[test]
    fn image_geometry_helpers() {
        let image = ImageData::new([2, 3, 4], Vec3::splat(0.5), Vec3::ONE);
        assert_eq!(image.number_of_points(), 24);
        assert_eq!(image.number_of_cells(), 6);
        assert_eq!(image.bounds().max, Vec3::new(1.5, 2.0, 2.5));
        assert_eq!(image.to_point_cloud().number_of_points(), 24);
        assert_eq!(image.outer_surface().polys.len(), 6);
    }
}
