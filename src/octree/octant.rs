use glam::Vec3;

use crate::bounds::BoundingBox;

// strict comparisons, the midpoint itself lands in octant 0
pub fn which_octant(mid: Vec3, point: Vec3) -> u32 {
    let mut octant = 0;

    if point.x > mid.x {
        octant |= 1;
    }

    if point.y > mid.y {
        octant |= 2;
    }

    if point.z > mid.z {
        octant |= 4;
    }

    octant
}

pub fn octant_bounds(parent: &BoundingBox, octant: u32) -> BoundingBox {
    let mid = parent.center();
    let mut bounds = *parent;

    if octant & 1 != 0 {
        bounds.start.x = mid.x;
    } else {
        bounds.end.x = mid.x;
    }

    if octant & 2 != 0 {
        bounds.start.y = mid.y;
    } else {
        bounds.end.y = mid.y;
    }

    if octant & 4 != 0 {
        bounds.start.z = mid.z;
    } else {
        bounds.end.z = mid.z;
    }

    bounds
}
