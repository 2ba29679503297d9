//! World-space geometry: bounds, exclusion volumes, poses and layer masks.
//!
//! The world is Y-up with +Z as the default forward direction.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use std::ops::BitOr;

/// Small distance used to reject self-hits and rounding noise.
pub const GEOMETRY_EPSILON: f32 = 1.0e-4;

/// Bit set of collision layers used to filter spatial queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LayerMask(u32);

impl LayerMask {
    /// Matches nothing.
    pub const NONE: Self = Self(0);
    /// Untagged static geometry.
    pub const DEFAULT: Self = Self(1);
    /// Walkable floors.
    pub const GROUND: Self = Self(1 << 1);
    /// Walls, furniture and anything that blocks sight or movement.
    pub const OBSTACLE: Self = Self(1 << 2);
    /// Player characters.
    pub const PLAYER: Self = Self(1 << 3);
    /// Enemy characters.
    pub const ENEMY: Self = Self(1 << 4);
    /// Matches every layer.
    pub const ALL: Self = Self(u32::MAX);

    /// Creates a mask from raw bits.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// True if any layer is shared with `other`.
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for LayerMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl Default for LayerMask {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    /// Minimum corner
    pub min: Vec3,
    /// Maximum corner
    pub max: Vec3,
}

impl Aabb {
    /// Creates a box from two opposite corners in any order.
    #[must_use]
    pub fn new(a: Vec3, b: Vec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Creates a box from its center and half extents.
    #[must_use]
    pub fn from_center_extents(center: Vec3, half_extents: Vec3) -> Self {
        let half = half_extents.abs();
        Self {
            min: center - half,
            max: center + half,
        }
    }

    /// Smallest box enclosing every box in `boxes`, or `None` for an empty input.
    pub fn union_all<I: IntoIterator<Item = Aabb>>(boxes: I) -> Option<Self> {
        boxes.into_iter().reduce(|acc, b| acc.union(&b))
    }

    /// Center point.
    #[must_use]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Full size along each axis.
    #[must_use]
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Half size along each axis.
    #[must_use]
    pub fn extents(&self) -> Vec3 {
        self.size() * 0.5
    }

    /// Enclosed volume.
    #[must_use]
    pub fn volume(&self) -> f32 {
        let s = self.size();
        s.x * s.y * s.z
    }

    /// Whether the point lies inside or on the boundary.
    #[must_use]
    pub fn contains(&self, p: Vec3) -> bool {
        p.cmpge(self.min).all() && p.cmple(self.max).all()
    }

    /// Whether the point lies inside the box footprint, ignoring height.
    #[must_use]
    pub fn contains_xz(&self, p: Vec3) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.z >= self.min.z && p.z <= self.max.z
    }

    /// Box enclosing both boxes.
    #[must_use]
    pub fn union(&self, other: &Aabb) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Box grown by `amount` on every side.
    #[must_use]
    pub fn expanded(&self, amount: f32) -> Self {
        Self::new(self.min - Vec3::splat(amount), self.max + Vec3::splat(amount))
    }

    /// Closest point of the box to `p`.
    #[must_use]
    pub fn closest_point(&self, p: Vec3) -> Vec3 {
        p.clamp(self.min, self.max)
    }

    /// Distance from `p` to the box; zero when inside.
    #[must_use]
    pub fn distance_to(&self, p: Vec3) -> f32 {
        self.closest_point(p).distance(p)
    }

    /// Horizontal distance from an interior point to the nearest side wall.
    #[must_use]
    pub fn edge_distance_xz(&self, p: Vec3) -> f32 {
        let dx = (p.x - self.min.x).min(self.max.x - p.x);
        let dz = (p.z - self.min.z).min(self.max.z - p.z);
        dx.min(dz).max(0.0)
    }

    /// Whether a sphere touches the box.
    #[must_use]
    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        self.distance_to(center) <= radius
    }

    /// Slab test. Returns the entry distance and the surface normal of the
    /// face that was hit, for hits within `max_distance`.
    #[must_use]
    pub fn ray_intersection(&self, origin: Vec3, dir: Vec3, max_distance: f32) -> Option<(f32, Vec3)> {
        let mut t_min = 0.0_f32;
        let mut t_max = max_distance;
        let mut normal = Vec3::ZERO;

        for axis in 0..3 {
            let o = origin[axis];
            let d = dir[axis];
            let (lo, hi) = (self.min[axis], self.max[axis]);
            if d.abs() < GEOMETRY_EPSILON {
                if o < lo || o > hi {
                    return None;
                }
                continue;
            }
            let inv = 1.0 / d;
            let mut t0 = (lo - o) * inv;
            let mut t1 = (hi - o) * inv;
            let mut sign = -1.0;
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
                sign = 1.0;
            }
            if t0 > t_min {
                t_min = t0;
                normal = Vec3::ZERO;
                normal[axis] = sign;
            }
            t_max = t_max.min(t1);
            if t_min > t_max {
                return None;
            }
        }

        Some((t_min, normal))
    }
}

/// Volume in which no patrol waypoint may be generated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ExclusionZone {
    /// Oriented box
    Box {
        /// World-space center
        center: Vec3,
        /// Half size in local space
        half_extents: Vec3,
        /// World rotation of the box
        rotation: Quat,
    },
    /// Sphere
    Sphere {
        /// World-space center
        center: Vec3,
        /// Radius
        radius: f32,
    },
}

impl ExclusionZone {
    /// Axis-aligned box zone.
    #[must_use]
    pub fn aligned_box(center: Vec3, half_extents: Vec3) -> Self {
        Self::Box {
            center,
            half_extents,
            rotation: Quat::IDENTITY,
        }
    }

    /// Whether a world-space point lies inside the zone.
    #[must_use]
    pub fn contains(&self, p: Vec3) -> bool {
        match *self {
            Self::Box {
                center,
                half_extents,
                rotation,
            } => {
                let local = rotation.inverse() * (p - center);
                local.abs().cmple(half_extents.abs()).all()
            },
            Self::Sphere { center, radius } => p.distance_squared(center) <= radius * radius,
        }
    }
}

/// Position and facing of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// World position (feet)
    pub position: Vec3,
    /// Unit forward direction
    pub forward: Vec3,
}

impl Pose {
    /// Creates a pose, normalising the forward vector.
    #[must_use]
    pub fn new(position: Vec3, forward: Vec3) -> Self {
        Self {
            position,
            forward: forward.try_normalize().unwrap_or(Vec3::Z),
        }
    }

    /// Creates a pose facing the given yaw.
    #[must_use]
    pub fn from_yaw(position: Vec3, yaw: f32) -> Self {
        Self {
            position,
            forward: forward_from_yaw(yaw),
        }
    }

    /// Yaw of the forward direction.
    #[must_use]
    pub fn yaw(&self) -> f32 {
        yaw_of(self.forward)
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::new(Vec3::ZERO, Vec3::Z)
    }
}

/// Drops the vertical component.
#[must_use]
pub fn flatten(v: Vec3) -> Vec3 {
    Vec3::new(v.x, 0.0, v.z)
}

/// Yaw in radians of a direction, measured from +Z toward +X.
#[must_use]
pub fn yaw_of(dir: Vec3) -> f32 {
    dir.x.atan2(dir.z)
}

/// Horizontal unit direction for a yaw.
#[must_use]
pub fn forward_from_yaw(yaw: f32) -> Vec3 {
    Vec3::new(yaw.sin(), 0.0, yaw.cos())
}

/// Wraps an angle into `(-PI, PI]`.
#[must_use]
pub fn wrap_angle(angle: f32) -> f32 {
    use std::f32::consts::{PI, TAU};
    let mut a = angle.rem_euclid(TAU);
    if a > PI {
        a -= TAU;
    }
    a
}

/// Unsigned horizontal angle between two directions, in radians.
#[must_use]
pub fn horizontal_angle(from: Vec3, to: Vec3) -> f32 {
    let a = flatten(from);
    let b = flatten(to);
    if a.length_squared() < GEOMETRY_EPSILON || b.length_squared() < GEOMETRY_EPSILON {
        return 0.0;
    }
    wrap_angle(yaw_of(b) - yaw_of(a)).abs()
}

/// Unsigned vertical angle between two directions, in radians.
///
/// Compares elevation above the horizontal plane, so a level forward and a
/// target straight ahead but above the eye yields the target's elevation.
#[must_use]
pub fn vertical_angle(from: Vec3, to: Vec3) -> f32 {
    (elevation(to) - elevation(from)).abs()
}

/// Elevation of a direction above the horizontal plane, in radians.
#[must_use]
pub fn elevation(dir: Vec3) -> f32 {
    let horizontal = flatten(dir).length();
    dir.y.atan2(horizontal)
}

/// Rotates a horizontal facing toward `target` by at most `max_radians`.
#[must_use]
pub fn rotate_towards(current: Vec3, target: Vec3, max_radians: f32) -> Vec3 {
    let target = flatten(target);
    if target.length_squared() < GEOMETRY_EPSILON {
        return current;
    }
    let from = yaw_of(flatten(current));
    let delta = wrap_angle(yaw_of(target) - from);
    let step = delta.clamp(-max_radians.abs(), max_radians.abs());
    forward_from_yaw(from + step)
}

/// Rotates a direction toward `target` in 3D by at most `max_radians`.
#[must_use]
pub fn turn_towards(current: Vec3, target: Vec3, max_radians: f32) -> Vec3 {
    let (Some(from), Some(to)) = (current.try_normalize(), target.try_normalize()) else {
        return current;
    };
    let angle = from.angle_between(to);
    if angle <= max_radians.abs() || angle < GEOMETRY_EPSILON {
        return to;
    }
    let partial = Quat::IDENTITY.slerp(Quat::from_rotation_arc(from, to), max_radians.abs() / angle);
    (partial * from).normalize_or_zero()
}

/// Orders points by a greedy nearest-neighbour walk starting at `start`.
///
/// Ties keep the earlier point in the input order.
#[must_use]
pub fn nearest_neighbour_order(points: &[Vec3], start: usize) -> Vec<Vec3> {
    if points.is_empty() {
        return Vec::new();
    }
    let mut remaining: Vec<Vec3> = points.to_vec();
    let mut current = remaining.remove(start.min(points.len() - 1));
    let mut ordered = Vec::with_capacity(points.len());
    ordered.push(current);

    while !remaining.is_empty() {
        let mut best = 0;
        let mut best_dist = f32::INFINITY;
        for (i, p) in remaining.iter().enumerate() {
            let d = p.distance_squared(current);
            if d < best_dist {
                best_dist = d;
                best = i;
            }
        }
        current = remaining.remove(best);
        ordered.push(current);
    }

    ordered
}
