//! Reinforcement calls from detectors to nearby pursuers.
//!
//! A detector cannot reach the roster while it is being updated, so it only
//! raises [`ReinforcementRequest`]s. The encounter applies them after the
//! update loop: choosing allies, alerting them and pushing target updates.

use heist_common::{EntityId, Vec3};

/// What a detector asks the encounter to do after its update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReinforcementRequest {
    /// First acquisition: alert the nearest pursuers
    Call {
        /// Where the target was seen
        position: Vec3,
        /// Target handle, if still live
        target: Option<EntityId>,
    },
    /// Periodic position update for allies already alerted
    Push {
        /// Latest target position
        position: Vec3,
        /// Target handle, if still live
        target: Option<EntityId>,
    },
}

/// Allies within `radius` of `origin`, nearest first, at most `max`.
///
/// Equal distances keep the candidate order.
pub fn select_allies<I>(origin: Vec3, candidates: I, radius: f32, max: usize) -> Vec<EntityId>
where
    I: IntoIterator<Item = (EntityId, Vec3)>,
{
    let mut in_range: Vec<(EntityId, f32)> = candidates
        .into_iter()
        .map(|(id, position)| (id, position.distance(origin)))
        .filter(|(_, d)| *d <= radius)
        .collect();
    in_range.sort_by(|a, b| a.1.total_cmp(&b.1));
    in_range.truncate(max);
    in_range.into_iter().map(|(id, _)| id).collect()
}

/// A detector's list of alerted allies and its push timer.
#[derive(Debug, Clone, Default)]
pub struct AllyLink {
    allies: Vec<EntityId>,
    push_timer: f32,
}

impl AllyLink {
    /// Empty link.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Alerted allies, nearest first at the time of the call.
    #[must_use]
    pub fn allies(&self) -> &[EntityId] {
        &self.allies
    }

    /// Whether any ally is still linked.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.allies.is_empty()
    }

    /// Replaces the list after a call; the first push waits a full interval.
    pub fn link(&mut self, allies: Vec<EntityId>, interval: f32) {
        self.allies = allies;
        self.push_timer = interval;
    }

    /// Advances the push timer. Returns `true` when an update is due.
    pub fn tick(&mut self, dt: f32, interval: f32) -> bool {
        if self.allies.is_empty() {
            return false;
        }
        self.push_timer -= dt;
        if self.push_timer > 0.0 {
            return false;
        }
        self.push_timer = interval;
        true
    }

    /// Drops allies that are no longer live.
    pub fn retain_live(&mut self, mut is_live: impl FnMut(EntityId) -> bool) {
        self.allies.retain(|id| is_live(*id));
    }

    /// Removes one ally.
    pub fn remove(&mut self, ally: EntityId) {
        self.allies.retain(|id| *id != ally);
    }

    /// Forgets every ally.
    pub fn clear(&mut self) {
        self.allies.clear();
        self.push_timer = 0.0;
    }
}
