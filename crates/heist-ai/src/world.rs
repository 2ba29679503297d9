//! Interfaces to the host engine.
//!
//! The encounter core never owns physics, navigation, scene graphs or audio.
//! It reaches them through the narrow traits in this module, which the host
//! implements and hands in once per call.

use heist_common::{Aabb, EntityId, ExclusionZone, LayerMask, Pose, RoomId, Vec3};
use serde::{Deserialize, Serialize};

/// Result of a successful raycast.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    /// World-space hit point
    pub point: Vec3,
    /// Distance from the ray origin
    pub distance: f32,
    /// Surface normal at the hit point
    pub normal: Vec3,
    /// Collider that was hit, if the host tracks one
    pub collider: Option<EntityId>,
}

/// Physics queries against the live scene.
pub trait SpatialQuery {
    /// Entities on `mask` whose colliders touch the sphere.
    fn overlap_sphere(&self, center: Vec3, radius: f32, mask: LayerMask) -> Vec<EntityId>;

    /// First hit along a ray, if any.
    fn raycast(&self, origin: Vec3, direction: Vec3, max_distance: f32, mask: LayerMask) -> Option<RayHit>;
}

/// Liveness and position of perceivable targets (players).
pub trait Targets {
    /// Whether the handle still refers to a live target.
    fn is_alive(&self, target: EntityId) -> bool;

    /// Aim point of the target, `None` once it is gone.
    fn position(&self, target: EntityId) -> Option<Vec3>;
}

/// Per-agent path following, keyed by entity.
pub trait Navigation {
    /// Whether the navigable surface has been built.
    fn is_ready(&self) -> bool;

    /// Snaps a point onto the navigable surface within `max_distance`.
    fn sample_position(&self, point: Vec3, max_distance: f32) -> Option<Vec3>;

    /// Places a new agent on the surface.
    fn add_agent(&mut self, agent: EntityId, pose: Pose);

    /// Removes an agent.
    fn remove_agent(&mut self, agent: EntityId);

    /// Current pose of an agent.
    fn pose(&self, agent: EntityId) -> Option<Pose>;

    /// Overrides the facing of an agent.
    fn set_forward(&mut self, agent: EntityId, forward: Vec3);

    /// Computes and starts following a path.
    fn move_to(&mut self, agent: EntityId, destination: Vec3);

    /// Halts movement, keeping the current destination.
    fn stop(&mut self, agent: EntityId);

    /// Resumes movement after [`Navigation::stop`].
    fn resume(&mut self, agent: EntityId);

    /// Whether a path request is still being computed.
    fn is_path_pending(&self, agent: EntityId) -> bool;

    /// Path distance left to the destination.
    fn remaining_distance(&self, agent: EntityId) -> f32;

    /// Distance at which the agent considers itself arrived.
    fn stopping_distance(&self, agent: EntityId) -> f32;
}

/// A room-tagged scene object with its combined render/collision bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomInfo {
    /// Room key
    pub id: RoomId,
    /// Union of the room's descendant bounds
    pub bounds: Aabb,
}

/// A spawner placed in the scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnerInfo {
    /// World position
    pub position: Vec3,
    /// Facing yaw in radians
    pub yaw: f32,
    /// Room the spawner is parented under in the scene hierarchy, if any
    pub parent_room: Option<RoomId>,
}

/// Static scene metadata read at map load.
pub trait SceneMetadata {
    /// Combined bounds of all map-tagged geometry.
    fn map_bounds(&self) -> Option<Aabb>;

    /// Every room-tagged object.
    fn rooms(&self) -> Vec<RoomInfo>;

    /// Volumes excluded from waypoint generation.
    fn exclusion_zones(&self) -> Vec<ExclusionZone>;

    /// Every spawner in the scene.
    fn spawners(&self) -> Vec<SpawnerInfo>;

    /// Room whose hierarchy owns the given collider.
    fn room_of_collider(&self, collider: EntityId) -> Option<RoomId>;
}

/// Fire-and-forget presentation cues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cue {
    /// Melee swing
    Attack,
    /// Detector spotted someone
    Alert,
    /// Enemy appeared at a spawner
    Spawn,
}

/// Receiver of presentation cues (animation, audio).
pub trait CueSink {
    /// Triggers a cue on an entity.
    fn fire(&mut self, source: EntityId, cue: Cue);
}

/// Cue sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCues;

impl CueSink for NullCues {
    fn fire(&mut self, _source: EntityId, _cue: Cue) {}
}

/// Collaborators needed for a simulation tick.
pub struct Services<'a> {
    /// Physics queries
    pub spatial: &'a dyn SpatialQuery,
    /// Target registry
    pub targets: &'a dyn Targets,
    /// Navigation agents
    pub nav: &'a mut dyn Navigation,
    /// Presentation cues
    pub cues: &'a mut dyn CueSink,
}

impl<'a> Services<'a> {
    /// Bundles the collaborators.
    pub fn new(
        spatial: &'a dyn SpatialQuery,
        targets: &'a dyn Targets,
        nav: &'a mut dyn Navigation,
        cues: &'a mut dyn CueSink,
    ) -> Self {
        Self {
            spatial,
            targets,
            nav,
            cues,
        }
    }

    /// Shorter-lived copy for passing down into helpers.
    pub fn reborrow(&mut self) -> Services<'_> {
        Services {
            spatial: self.spatial,
            targets: self.targets,
            nav: &mut *self.nav,
            cues: &mut *self.cues,
        }
    }

    /// Live position of a target, treating dead handles as absent.
    pub fn live_target_position(&self, target: EntityId) -> Option<Vec3> {
        if self.targets.is_alive(target) {
            self.targets.position(target)
        } else {
            None
        }
    }
}
