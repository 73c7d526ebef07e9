use glam::Vec3;

/// Piecewise linear mapping from scalar values to colours.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorTransferFunction {
    /// `(value, colour)` nodes sorted by value.
    nodes: Vec<(f64, Vec3)>,
}

impl Default for ColorTransferFunction {
    /// Grayscale ramp over `[0, 1]`.
    fn default() -> Self {
        Self {
            nodes: vec![(0.0, Vec3::ZERO), (1.0, Vec3::ONE)],
        }
    }
}

impl ColorTransferFunction {
    /// Builds a function from `value, r, g, b` quadruplets whose values are
    /// normalized and stretched over `range`. Returns `None` when the list
    /// length is not a multiple of 4.
    pub fn from_colormap(colormap: &[f64], range: [f64; 2]) -> Option<Self> {
        if colormap.is_empty() || colormap.len() % 4 != 0 {
            return None;
        }
        let mut nodes: Vec<(f64, Vec3)> = colormap
            .chunks_exact(4)
            .map(|node| {
                (
                    range[0] + node[0] * (range[1] - range[0]),
                    Vec3::new(node[1] as f32, node[2] as f32, node[3] as f32),
                )
            })
            .collect();
        nodes.sort_by(|a, b| a.0.total_cmp(&b.0));
        Some(Self { nodes })
    }

    pub fn range(&self) -> [f64; 2] {
        match (self.nodes.first(), self.nodes.last()) {
            (Some(first), Some(last)) => [first.0, last.0],
            _ => [0.0, 1.0],
        }
    }

    /// Colour of `value`, clamped to the first and last nodes.
    pub fn map(&self, value: f64) -> Vec3 {
        let Some(first) = self.nodes.first() else {
            return Vec3::ONE;
        };
        if value.is_nan() || value <= first.0 {
            return first.1;
        }
        for pair in self.nodes.windows(2) {
            let (lo, hi) = (pair[0], pair[1]);
            if value <= hi.0 {
                let span = hi.0 - lo.0;
                if span <= f64::EPSILON {
                    return hi.1;
                }
                return lo.1.lerp(hi.1, ((value - lo.0) / span) as f32);
            }
        }
        self.nodes[self.nodes.len() - 1].1
    }

    /// `count` evenly spaced colours over the range, for scalar bars.
    pub fn table(&self, count: usize) -> Vec<Vec3> {
        let [lo, hi] = self.range();
        (0..count)
            .map(|i| {
                let t = if count > 1 {
                    i as f64 / (count - 1) as f64
                } else {
                    0.0
                };
                self.map(lo + t * (hi - lo))
            })
            .collect()
    }
}

/// Two point scalar opacity ramp used by volume rendering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OpacityFunction {
    pub range: [f64; 2],
    pub inverse: bool,
}

impl OpacityFunction {
    pub fn opacity(&self, value: f64) -> f32 {
        let span = self.range[1] - self.range[0];
        let t = if span.abs() <= f64::EPSILON {
            1.0
        } else {
            ((value - self.range[0]) / span).clamp(0.0, 1.0)
        };
        if self.inverse {
            (1.0 - t) as f32
        } else {
            t as f32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ColorTransferFunction, OpacityFunction};
    use crate::options::DEFAULT_COLORMAP;
    use glam::Vec3;

    #[test]
    fn colormap_is_stretched_over_range() {
        let ctf = ColorTransferFunction::from_colormap(&DEFAULT_COLORMAP, [10.0, 20.0]).unwrap();
        assert_eq!(ctf.range(), [10.0, 20.0]);
        assert_eq!(ctf.map(0.0), Vec3::ZERO);
        assert_eq!(ctf.map(30.0), Vec3::ONE);
        let mid = ctf.map(12.0);
        assert!((mid - Vec3::new(0.45, 0.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn malformed_colormap_is_rejected() {
        assert!(ColorTransferFunction::from_colormap(&[0.0, 1.0, 1.0], [0.0, 1.0]).is_none());
        assert!(ColorTransferFunction::from_colormap(&[], [0.0, 1.0]).is_none());
    }

    #[test]
    fn opacity_ramp_and_inverse() {
        let ramp = OpacityFunction { range: [0.0, 4.0], inverse: false };
        assert_eq!(ramp.opacity(1.0), 0.25);
        let inverse = OpacityFunction { inverse: true, ..ramp };
        assert_eq!(inverse.opacity(1.0), 0.75);
        assert_eq!(inverse.opacity(-3.0), 1.0);
    }
}
