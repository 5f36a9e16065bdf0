use bytemuck::{Pod, Zeroable};
use glam::Vec3;

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct BoundingBox {
    pub start: Vec3,
    pub end: Vec3,
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl BoundingBox {
    pub const EMPTY: Self = Self {
        start: Vec3::splat(f32::INFINITY),
        end: Vec3::splat(f32::NEG_INFINITY),
    };

    pub const fn new(start: Vec3, end: Vec3) -> Self {
        Self { start, end }
    }

    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Self {
        let mut bounds = Self::EMPTY;

        for point in points {
            bounds.expand(point);
        }

        bounds
    }

    pub fn size(&self) -> Vec3 {
        self.end - self.start
    }

    pub fn center(&self) -> Vec3 {
        (self.start + self.end) * 0.5
    }

    pub fn volume(&self) -> f32 {
        let size = self.size();
        size.x * size.y * size.z
    }

    pub fn point_in(&self, point: Vec3) -> bool {
        point.cmpge(self.start).all() && point.cmple(self.end).all()
    }

    pub fn point_in_tolerance(&self, point: Vec3, tolerance: f32) -> bool {
        let start = self.start - Vec3::splat(tolerance);
        let end = self.end + Vec3::splat(tolerance);
        point.cmpge(start).all() && point.cmple(end).all()
    }

    pub fn overlap(&self, other: &Self) -> Self {
        Self {
            start: self.start.max(other.start),
            end: self.end.min(other.end),
        }
    }

    /// Touching faces count as intersecting.
    pub fn intersects(&self, other: &Self) -> bool {
        let overlap = self.overlap(other);
        overlap.end.cmpge(overlap.start).all()
    }

    pub fn intersect(&mut self, other: &Self) {
        *self = self.overlap(other);
    }

    /// Disjoint boxes collapse to zero volume instead of inverting.
    pub fn intersect_guarded(&mut self, other: &Self) {
        self.intersect(other);
        self.end = self.end.max(self.start);
    }

    pub fn expand(&mut self, point: Vec3) {
        self.start = self.start.min(point);
        self.end = self.end.max(point);
    }

    pub fn expand_box(&mut self, other: &Self) {
        self.start = self.start.min(other.start);
        self.end = self.end.max(other.end);
    }

    pub fn contains_box(&self, other: &Self) -> bool {
        other.start.cmpge(self.start).all() && other.end.cmple(self.end).all()
    }

    pub fn is_finite(&self) -> bool {
        self.start.is_finite() && self.end.is_finite()
    }

    pub fn translated(&self, offset: Vec3) -> Self {
        Self {
            start: self.start + offset,
            end: self.end + offset,
        }
    }
}
