//! Field-of-view perception.
//!
//! A [`PerceptionUnit`] polls the spatial query service on a fixed interval
//! rather than every tick, and keeps the most recent result until the next
//! poll. A poll yields at most one target: the nearest candidate inside both
//! view cones with an unobstructed line of sight.

use heist_common::{horizontal_angle, vertical_angle, EntityId, LayerMask, Pose, Vec3, GEOMETRY_EPSILON};

use crate::config::PerceptionConfig;
use crate::world::{SpatialQuery, Targets};

/// Whether nothing on `mask` blocks the segment from `eye` to `point`.
pub fn line_of_sight(spatial: &dyn SpatialQuery, eye: Vec3, point: Vec3, mask: LayerMask) -> bool {
    let to = point - eye;
    let distance = to.length();
    if distance < GEOMETRY_EPSILON {
        return true;
    }
    match spatial.raycast(eye, to / distance, distance, mask) {
        Some(hit) => hit.distance >= distance,
        None => true,
    }
}

/// A viewing cone split into independent horizontal and vertical half-angles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewCone {
    /// Horizontal half-angle in radians
    pub half_horizontal: f32,
    /// Vertical half-angle in radians
    pub half_vertical: f32,
    /// Maximum distance
    pub range: f32,
}

impl ViewCone {
    /// Cone from full field-of-view angles in degrees.
    #[must_use]
    pub fn from_degrees(horizontal: f32, vertical: f32, range: f32) -> Self {
        Self {
            half_horizontal: (horizontal * 0.5).to_radians(),
            half_vertical: (vertical * 0.5).to_radians(),
            range,
        }
    }

    /// Whether `offset` (target minus eye) lies inside the cone around `forward`.
    #[must_use]
    pub fn contains(&self, forward: Vec3, offset: Vec3) -> bool {
        let distance = offset.length();
        if distance > self.range {
            return false;
        }
        if distance < GEOMETRY_EPSILON {
            return true;
        }
        horizontal_angle(forward, offset) <= self.half_horizontal
            && vertical_angle(forward, offset) <= self.half_vertical
    }
}

/// Nearest target on `mask` that lies inside `cone` and is visible from `eye`.
///
/// Candidates are visited in the order the spatial query returned them, so
/// equal distances resolve to the earlier candidate.
pub fn nearest_visible(
    spatial: &dyn SpatialQuery,
    targets: &dyn Targets,
    eye: Vec3,
    forward: Vec3,
    cone: &ViewCone,
    target_mask: LayerMask,
    obstacle_mask: LayerMask,
) -> Option<EntityId> {
    let mut best: Option<(EntityId, f32)> = None;

    for candidate in spatial.overlap_sphere(eye, cone.range, target_mask) {
        if !targets.is_alive(candidate) {
            continue;
        }
        let Some(position) = targets.position(candidate) else {
            continue;
        };
        let offset = position - eye;
        if !cone.contains(forward, offset) {
            continue;
        }
        if !line_of_sight(spatial, eye, position, obstacle_mask) {
            continue;
        }
        let distance = offset.length();
        if best.map_or(true, |(_, d)| distance < d) {
            best = Some((candidate, distance));
        }
    }

    best.map(|(id, _)| id)
}

/// Per-enemy interval-driven perception.
#[derive(Debug, Clone)]
pub struct PerceptionUnit {
    config: PerceptionConfig,
    cone: ViewCone,
    poll_timer: f32,
    detected: Option<EntityId>,
}

impl PerceptionUnit {
    /// Creates a unit that polls on its first update.
    #[must_use]
    pub fn new(config: PerceptionConfig) -> Self {
        let cone = ViewCone::from_degrees(
            config.horizontal_fov_degrees,
            config.vertical_fov_degrees,
            config.detection_radius,
        );
        Self {
            config,
            cone,
            poll_timer: 0.0,
            detected: None,
        }
    }

    /// Config in use.
    #[must_use]
    pub fn config(&self) -> &PerceptionConfig {
        &self.config
    }

    /// Runs a single detection pass from `pose`.
    #[must_use]
    pub fn poll(&self, pose: Pose, spatial: &dyn SpatialQuery, targets: &dyn Targets) -> Option<EntityId> {
        let eye = pose.position + Vec3::Y * self.config.eye_height;
        nearest_visible(
            spatial,
            targets,
            eye,
            pose.forward,
            &self.cone,
            self.config.target_mask,
            self.config.obstacle_mask,
        )
    }

    /// Advances the poll timer and re-polls when it elapses.
    ///
    /// Returns `true` when a poll ran this call.
    pub fn update(&mut self, dt: f32, pose: Pose, spatial: &dyn SpatialQuery, targets: &dyn Targets) -> bool {
        self.poll_timer -= dt;
        if self.poll_timer > 0.0 {
            return false;
        }
        self.poll_timer = self.config.poll_interval;
        self.detected = self.poll(pose, spatial, targets);
        true
    }

    /// Most recent detection, dropping handles that are no longer live.
    #[must_use]
    pub fn detected(&self, targets: &dyn Targets) -> Option<EntityId> {
        self.detected.filter(|t| targets.is_alive(*t))
    }

    /// Clears the cached detection.
    pub fn clear(&mut self) {
        self.detected = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockWorld;
    use heist_common::Aabb;

    fn unit() -> PerceptionUnit {
        PerceptionUnit::new(PerceptionConfig {
            detection_radius: 10.0,
            horizontal_fov_degrees: 90.0,
            vertical_fov_degrees: 60.0,
            eye_height: 1.5,
            poll_interval: 0.5,
            ..PerceptionConfig::default()
        })
    }

    fn pose() -> Pose {
        Pose::new(Vec3::ZERO, Vec3::Z)
    }

    #[test]
    fn test_detects_target_in_front() {
        let mut world = MockWorld::new();
        let player = world.add_player(Vec3::new(0.0, 1.5, 5.0));
        assert_eq!(unit().poll(pose(), &world, &world), Some(player));
    }

    #[test]
    fn test_rejects_outside_horizontal_cone() {
        let mut world = MockWorld::new();
        world.add_player(Vec3::new(5.0, 1.5, 1.0));
        assert_eq!(unit().poll(pose(), &world, &world), None);
    }

    #[test]
    fn test_rejects_outside_vertical_cone() {
        let mut world = MockWorld::new();
        // Almost straight above the eye.
        world.add_player(Vec3::new(0.0, 8.0, 1.0));
        assert_eq!(unit().poll(pose(), &world, &world), None);
    }

    #[test]
    fn test_rejects_out_of_range() {
        let mut world = MockWorld::new();
        world.add_player(Vec3::new(0.0, 1.5, 11.0));
        assert_eq!(unit().poll(pose(), &world, &world), None);
    }

    #[test]
    fn test_rejects_obstructed_target() {
        let mut world = MockWorld::new();
        world.add_player(Vec3::new(0.0, 1.5, 6.0));
        world.add_obstacle(Aabb::new(Vec3::new(-2.0, 0.0, 3.0), Vec3::new(2.0, 3.0, 3.5)));
        assert_eq!(unit().poll(pose(), &world, &world), None);
    }

    #[test]
    fn test_thin_wall_just_before_target_blocks() {
        let mut world = MockWorld::new();
        world.add_player(Vec3::new(0.0, 1.5, 5.0));
        world.add_obstacle(Aabb::new(Vec3::new(-1.0, 0.0, 4.97), Vec3::new(1.0, 3.0, 4.99)));

        let eye = Vec3::new(0.0, 1.5, 0.0);
        assert!(!line_of_sight(&world, eye, Vec3::new(0.0, 1.5, 5.0), LayerMask::OBSTACLE));
        assert_eq!(unit().poll(pose(), &world, &world), None);
    }

    #[test]
    fn test_picks_nearest_visible() {
        let mut world = MockWorld::new();
        let far = world.add_player(Vec3::new(3.0, 1.5, 8.0));
        let near = world.add_player(Vec3::new(-2.0, 1.5, 4.0));
        let hidden = world.add_player(Vec3::new(0.0, 1.5, 2.0));
        world.add_obstacle(Aabb::new(Vec3::new(-0.3, 0.0, 1.0), Vec3::new(0.3, 3.0, 1.2)));

        let seen = unit().poll(pose(), &world, &world);
        assert_eq!(seen, Some(near));
        assert_ne!(seen, Some(hidden));

        world.kill(near);
        assert_eq!(unit().poll(pose(), &world, &world), Some(far));
    }

    #[test]
    fn test_update_respects_interval() {
        let mut world = MockWorld::new();
        let mut unit = unit();
        assert!(unit.update(0.016, pose(), &world, &world));
        assert_eq!(unit.detected(&world), None);

        let player = world.add_player(Vec3::new(0.0, 1.5, 5.0));
        assert!(!unit.update(0.1, pose(), &world, &world));
        assert_eq!(unit.detected(&world), None);

        assert!(unit.update(0.5, pose(), &world, &world));
        assert_eq!(unit.detected(&world), Some(player));
    }

    #[test]
    fn test_dead_target_is_not_detected() {
        let mut world = MockWorld::new();
        let player = world.add_player(Vec3::new(0.0, 1.5, 5.0));
        let mut unit = unit();
        unit.update(0.0, pose(), &world, &world);
        assert_eq!(unit.detected(&world), Some(player));

        world.kill(player);
        assert_eq!(unit.detected(&world), None);
    }
}
