//! Axis-aligned bounding boxes for framing loaded models.

use cgmath::{EuclideanSpace, InnerSpace, Point3};

/// Axis-aligned bounding box in world space.
///
/// Grown point-by-point while decoding a model, then used to recenter the
/// mesh data and to place the camera. The diagonal length doubles as a
/// scale-independent "size" of the model.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: Point3<f32>,
    pub max: Point3<f32>,
}

impl Aabb {
    /// An inverted box that any first included point will collapse onto.
    pub fn empty() -> Self {
        Self {
            min: Point3::new(f32::INFINITY, f32::INFINITY, f32::INFINITY),
            max: Point3::new(f32::NEG_INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY),
        }
    }

    pub fn new(min: Point3<f32>, max: Point3<f32>) -> Self {
        Self { min, max }
    }

    /// Grow the box to contain `point`.
    pub fn include(&mut self, point: Point3<f32>) {
        self.min.x = self.min.x.min(point.x);
        self.min.y = self.min.y.min(point.y);
        self.min.z = self.min.z.min(point.z);
        self.max.x = self.max.x.max(point.x);
        self.max.y = self.max.y.max(point.y);
        self.max.z = self.max.z.max(point.z);
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        let mut out = *self;
        out.include(other.min);
        out.include(other.max);
        out
    }

    /// True until at least one point has been included.
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x
    }

    pub fn center(&self) -> Point3<f32> {
        self.min.midpoint(self.max)
    }

    /// Length of the diagonal, the model's "size".
    pub fn diagonal(&self) -> f32 {
        if self.is_empty() {
            return 0.0;
        }
        (self.max - self.min).magnitude()
    }

    /// Shift both corners by `offset`.
    pub fn translate(&mut self, offset: cgmath::Vector3<f32>) {
        self.min += offset;
        self.max += offset;
    }

    pub fn center_offset(&self) -> cgmath::Vector3<f32> {
        Point3::origin() - self.center()
    }
}
