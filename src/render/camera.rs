use crate::dataset::BoundingBox;
use crate::importer::ImportedCamera;
use glam::{Mat4, Quat, Vec3};

/// Preset orientations reachable from the number keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StandardView {
    Front,
    Right,
    Top,
    Isometric,
}

/// Look-at camera around a focal point.
///
/// Angles are in degrees. The up axis of the environment is +Y.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub focal_point: Vec3,
    pub view_up: Vec3,
    /// Vertical field of view.
    pub view_angle: f32,
    pub parallel_projection: bool,
    /// Half of the visible height when using parallel projection.
    pub parallel_scale: f32,
    pub clipping_range: [f32; 2],
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 1.0),
            focal_point: Vec3::ZERO,
            view_up: Vec3::Y,
            view_angle: 30.0,
            parallel_projection: false,
            parallel_scale: 1.0,
            clipping_range: [0.01, 1000.01],
        }
    }
}

impl Camera {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_imported(imported: &ImportedCamera) -> Self {
        let mut camera = Self {
            position: imported.position,
            focal_point: imported.focal_point,
            view_up: imported.view_up,
            view_angle: imported.view_angle,
            parallel_projection: imported.parallel_scale.is_some(),
            parallel_scale: imported.parallel_scale.unwrap_or(1.0),
            ..Self::default()
        };
        camera.orthogonalize_view_up();
        camera
    }

    pub fn distance(&self) -> f32 {
        self.position.distance(self.focal_point)
    }

    /// Unit vector from the position to the focal point.
    pub fn direction_of_projection(&self) -> Vec3 {
        (self.focal_point - self.position)
            .try_normalize()
            .unwrap_or(Vec3::NEG_Z)
    }

    pub fn right(&self) -> Vec3 {
        self.direction_of_projection()
            .cross(self.view_up)
            .try_normalize()
            .unwrap_or(Vec3::X)
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.focal_point, self.view_up)
    }

    /// Projection with a `[0, 1]` depth range.
    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        let aspect = if aspect.is_finite() && aspect > 0.0 { aspect } else { 1.0 };
        let [near, far] = self.clipping_range;
        if self.parallel_projection {
            let h = self.parallel_scale.max(1e-6);
            let w = h * aspect;
            Mat4::orthographic_rh(-w, w, -h, h, near, far)
        } else {
            Mat4::perspective_rh(self.view_angle.to_radians(), aspect, near, far)
        }
    }

    pub fn view_projection(&self, aspect: f32) -> Mat4 {
        self.projection_matrix(aspect) * self.view_matrix()
    }

    /// Rotates the position around the view up vector centered at the focal point.
    pub fn azimuth(&mut self, angle: f32) {
        let rotation = Quat::from_axis_angle(self.view_up.normalize_or_zero(), angle.to_radians());
        self.position = self.focal_point + rotation * (self.position - self.focal_point);
    }

    /// Rotates the position around the right axis centered at the focal point.
    pub fn elevation(&mut self, angle: f32) {
        let axis = self.right();
        let rotation = Quat::from_axis_angle(axis, -angle.to_radians());
        self.position = self.focal_point + rotation * (self.position - self.focal_point);
        self.view_up = rotation * self.view_up;
        self.orthogonalize_view_up();
    }

    /// Rotates the view up vector around the direction of projection.
    pub fn roll(&mut self, angle: f32) {
        let rotation =
            Quat::from_axis_angle(self.direction_of_projection(), -angle.to_radians());
        self.view_up = (rotation * self.view_up).normalize_or_zero();
    }

    /// Moves toward the focal point by `factor`, `> 1` moves closer.
    pub fn dolly(&mut self, factor: f32) {
        if factor <= 0.0 || !factor.is_finite() {
            return;
        }
        if self.parallel_projection {
            self.parallel_scale /= factor;
            return;
        }
        let distance = self.distance() / factor;
        self.position = self.focal_point - self.direction_of_projection() * distance;
    }

    /// Translates both the position and the focal point.
    pub fn translate(&mut self, delta: Vec3) {
        self.position += delta;
        self.focal_point += delta;
    }

    /// Pans by a fraction of the visible height, in screen axes.
    pub fn pan(&mut self, dx: f32, dy: f32) {
        let height = if self.parallel_projection {
            self.parallel_scale * 2.0
        } else {
            2.0 * self.distance() * (self.view_angle.to_radians() * 0.5).tan()
        };
        let up = self.view_up.normalize_or_zero();
        self.translate((self.right() * -dx + up * dy) * height);
    }

    /// Mouse rotation. Without trackball the up vector stays aligned with `environment_up`.
    pub fn rotate(&mut self, dx: f32, dy: f32, trackball: bool, environment_up: Vec3) {
        if trackball {
            self.azimuth(-dx);
            self.elevation(dy);
            return;
        }
        let rotation = Quat::from_axis_angle(environment_up, -dx.to_radians());
        self.position = self.focal_point + rotation * (self.position - self.focal_point);
        self.view_up = rotation * self.view_up;

        let offset = self.position - self.focal_point;
        let current = offset.normalize_or_zero().dot(environment_up).clamp(-1.0, 1.0).acos();
        // Keep away from the poles so the up vector stays defined.
        let target = (current.to_degrees() - dy).clamp(1.0, 179.0);
        self.elevation(current.to_degrees() - target);
        let right = self.right();
        self.view_up = right.cross(self.direction_of_projection()).normalize_or_zero();
    }

    pub fn set_standard_view(&mut self, view: StandardView) {
        let distance = self.distance().max(f32::EPSILON);
        let (direction, up) = match view {
            StandardView::Front => (Vec3::Z, Vec3::Y),
            StandardView::Right => (Vec3::X, Vec3::Y),
            StandardView::Top => (Vec3::Y, Vec3::NEG_Z),
            StandardView::Isometric => (Vec3::ONE.normalize(), Vec3::Y),
        };
        self.position = self.focal_point + direction * distance;
        self.view_up = up;
        self.orthogonalize_view_up();
    }

    /// Frames `bounds` keeping the current orientation.
    pub fn reset_to_bounds(&mut self, bounds: &BoundingBox) {
        if !bounds.is_valid() {
            return;
        }
        let mut radius = bounds.diagonal() * 0.5;
        if radius <= f32::EPSILON {
            radius = 0.5;
        }
        let half_angle = (self.view_angle.to_radians() * 0.5).max(1e-3);
        let distance = radius / half_angle.sin();
        let direction = self.direction_of_projection();
        self.focal_point = bounds.center();
        self.position = self.focal_point - direction * distance;
        self.parallel_scale = radius;
        self.orthogonalize_view_up();
        self.reset_clipping_range(bounds);
    }

    /// Fits the near and far planes around `bounds`.
    pub fn reset_clipping_range(&mut self, bounds: &BoundingBox) {
        if !bounds.is_valid() {
            return;
        }
        let direction = self.direction_of_projection();
        let mut near = f32::MAX;
        let mut far = f32::MIN;
        for corner in bounds.corners() {
            let depth = (corner - self.position).dot(direction);
            near = near.min(depth);
            far = far.max(depth);
        }
        let margin = (far - near).max(bounds.diagonal()) * 0.01;
        far += margin;
        near -= margin;
        let min_near = far * 0.001;
        self.clipping_range = [near.max(min_near).max(1e-4), far.max(1e-3)];
    }

    fn orthogonalize_view_up(&mut self) {
        let direction = self.direction_of_projection();
        let up = self.view_up - direction * self.view_up.dot(direction);
        self.view_up = up.try_normalize().unwrap_or_else(|| {
            if direction.y.abs() < 0.99 {
                let right = direction.cross(Vec3::Y).normalize();
                right.cross(direction)
            } else {
                Vec3::NEG_Z
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::{Camera, StandardView};
    use crate::dataset::BoundingBox;
    use crate::importer::ImportedCamera;
    use glam::Vec3;

    fn unit_box() -> BoundingBox {
        BoundingBox::from_points(&[Vec3::splat(-1.0), Vec3::splat(1.0)])
    }

    #[test]
    fn reset_to_bounds_keeps_orientation_and_sees_everything() {
        let mut camera = Camera::new();
        camera.position = Vec3::new(3.0, 0.0, 0.0);
        camera.reset_to_bounds(&unit_box());
        assert!(camera.focal_point.length() < 1e-6);
        assert!((camera.direction_of_projection() - Vec3::NEG_X).length() < 1e-6);
        assert!(camera.distance() > 3.0_f32.sqrt());
        let [near, far] = camera.clipping_range;
        assert!(near > 0.0 && near < far);
        assert!(camera.position.to_array().iter().all(|value| value.is_finite()));
    }

    #[test]
    fn azimuth_and_elevation_preserve_distance() {
        let mut camera = Camera::new();
        camera.position = Vec3::new(0.0, 0.0, 5.0);
        camera.azimuth(90.0);
        assert!((camera.position - Vec3::new(5.0, 0.0, 0.0)).length() < 1e-4);
        camera.elevation(30.0);
        assert!((camera.distance() - 5.0).abs() < 1e-4);
        assert!(camera.position.y > 0.0);
        assert!(camera.view_up.dot(camera.direction_of_projection()).abs() < 1e-5);
    }

    #[test]
    fn roll_and_dolly() {
        let mut camera = Camera::new();
        camera.roll(90.0);
        assert!((camera.view_up - Vec3::X).length() < 1e-5 || (camera.view_up + Vec3::X).length() < 1e-5);
        camera.dolly(2.0);
        assert!((camera.distance() - 0.5).abs() < 1e-6);
        camera.dolly(0.0);
        assert!((camera.distance() - 0.5).abs() < 1e-6);

        camera.parallel_projection = true;
        camera.dolly(2.0);
        assert!((camera.parallel_scale - 0.5).abs() < 1e-6);
    }

    #[test]
    fn standard_views_look_at_the_focal_point() {
        let mut camera = Camera::new();
        camera.position = Vec3::new(0.0, 0.0, 4.0);
        camera.set_standard_view(StandardView::Top);
        assert!((camera.position - Vec3::new(0.0, 4.0, 0.0)).length() < 1e-5);
        assert_eq!(camera.view_up, Vec3::NEG_Z);
        camera.set_standard_view(StandardView::Isometric);
        assert!((camera.distance() - 4.0).abs() < 1e-4);
        assert!(camera.view_up.y > 0.0);
    }

    #[test]
    fn turntable_rotation_keeps_up_vector_upright() {
        let mut camera = Camera::new();
        camera.position = Vec3::new(0.0, 0.0, 5.0);
        camera.rotate(45.0, 20.0, false, Vec3::Y);
        assert!(camera.view_up.y > 0.0);
        assert!((camera.distance() - 5.0).abs() < 1e-3);
        for _ in 0..20 {
            camera.rotate(0.0, 30.0, false, Vec3::Y);
        }
        assert!(camera.view_up.is_finite());
        assert!(camera.position.y < 5.0);
    }

    #[test]
    fn imported_parallel_camera() {
        let camera = Camera::from_imported(&ImportedCamera {
            name: "ortho".to_string(),
            position: Vec3::new(0.0, 0.0, 10.0),
            focal_point: Vec3::ZERO,
            view_up: Vec3::new(0.0, 1.0, 1.0),
            view_angle: 45.0,
            parallel_scale: Some(2.0),
        });
        assert!(camera.parallel_projection);
        assert_eq!(camera.parallel_scale, 2.0);
        assert!((camera.view_up - Vec3::Y).length() < 1e-6);
        let projection = camera.projection_matrix(1.0);
        assert!(projection.is_finite());
    }
}
