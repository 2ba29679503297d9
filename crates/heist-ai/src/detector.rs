//! Spotlight detector ("Grimoire").
//!
//! A slow patroller carrying a narrow spotlight. It does not use the generic
//! perception unit: detection is a forward cone along the spotlight itself.
//! The first acquisition of a target raises a reinforcement call; while it
//! keeps tracking, linked allies receive periodic position updates.

use heist_common::{turn_towards, EntityId, Vec3};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{DetectorConfig, ReinforcementConfig};
use crate::fsm::{no_hook, StateHooks, StateKind, StateMachine, StateTable, Transition};
use crate::perception::{nearest_visible, ViewCone};
use crate::reinforcement::{AllyLink, ReinforcementRequest};
use crate::route::{PatrolCursor, PatrolRoute};
use crate::world::{Cue, Services};

/// Detector behavior states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DetectorState {
    /// Walking the route, spotlight easing back to rest
    Patrol,
    /// Halted and locking the spotlight on a fresh target
    Alert,
    /// Following the target with spotlight and body
    Tracking,
}

impl StateKind for DetectorState {
    fn name(self) -> &'static str {
        match self {
            Self::Patrol => "Patrol",
            Self::Alert => "Alert",
            Self::Tracking => "Tracking",
        }
    }
}

/// Data the detector's states read and write.
#[derive(Debug, Clone)]
pub struct DetectorBody {
    id: EntityId,
    config: DetectorConfig,
    patrol: PatrolCursor,
    spotlight: Vec3,
    target: Option<EntityId>,
    alert_elapsed: f32,
    follow_refresh: f32,
}

impl DetectorBody {
    fn aim_at_target(&mut self, svc: &Services<'_>, degrees_per_second: f32, dt: f32) {
        let Some(target) = self.target.and_then(|t| svc.live_target_position(t)) else {
            return;
        };
        let Some(pose) = svc.nav.pose(self.id) else {
            return;
        };
        let eye = pose.position + Vec3::Y * self.config.eye_height;
        self.spotlight = turn_towards(self.spotlight, target - eye, degrees_per_second.to_radians() * dt);
    }
}

/// What the state hooks get to work with.
pub struct DetectorCtx<'a> {
    body: &'a mut DetectorBody,
    svc: Services<'a>,
}

impl<'a> StateTable<DetectorCtx<'a>> for DetectorState {
    fn hooks(self) -> StateHooks<DetectorCtx<'a>> {
        match self {
            Self::Patrol => StateHooks {
                on_enter: patrol_enter,
                on_update: patrol_update,
                on_exit: no_hook,
            },
            Self::Alert => StateHooks {
                on_enter: alert_enter,
                on_update: alert_update,
                on_exit: no_hook,
            },
            Self::Tracking => StateHooks {
                on_enter: tracking_enter,
                on_update: tracking_update,
                on_exit: no_hook,
            },
        }
    }
}

fn patrol_enter(ctx: &mut DetectorCtx<'_>) {
    let id = ctx.body.id;
    ctx.svc.nav.resume(id);
    ctx.body.patrol.begin(id, ctx.svc.nav);
}

fn patrol_update(ctx: &mut DetectorCtx<'_>, dt: f32) {
    let body = &mut *ctx.body;
    body.patrol.advance(body.id, ctx.svc.nav);

    if let Some(pose) = ctx.svc.nav.pose(body.id) {
        let step = body.config.return_speed_degrees.to_radians() * dt;
        body.spotlight = turn_towards(body.spotlight, pose.forward, step);
    }
}

fn alert_enter(ctx: &mut DetectorCtx<'_>) {
    let id = ctx.body.id;
    ctx.body.alert_elapsed = 0.0;
    ctx.svc.nav.stop(id);
    ctx.svc.cues.fire(id, Cue::Alert);
}

fn alert_update(ctx: &mut DetectorCtx<'_>, dt: f32) {
    let speed = ctx.body.config.tracking_turn_speed_degrees;
    ctx.body.alert_elapsed += dt;
    ctx.body.aim_at_target(&ctx.svc, speed, dt);
}

fn tracking_enter(ctx: &mut DetectorCtx<'_>) {
    ctx.body.follow_refresh = 0.0;
    ctx.svc.nav.resume(ctx.body.id);
}

fn tracking_update(ctx: &mut DetectorCtx<'_>, dt: f32) {
    let speed = ctx.body.config.tracking_turn_speed_degrees;
    ctx.body.aim_at_target(&ctx.svc, speed, dt);

    let body = &mut *ctx.body;
    body.follow_refresh -= dt;
    if body.follow_refresh > 0.0 {
        return;
    }
    body.follow_refresh = body.config.follow_refresh_interval;
    if let Some(position) = body.target.and_then(|t| ctx.svc.live_target_position(t)) {
        ctx.svc.nav.move_to(body.id, position);
    }
}

/// A spotlight detector.
#[derive(Debug, Clone)]
pub struct Detector {
    body: DetectorBody,
    fsm: StateMachine<DetectorState>,
    cone: ViewCone,
    reinforcement: ReinforcementConfig,
    detect_timer: f32,
    detecting: bool,
    last_seen: Option<Vec3>,
    call_cooldown: f32,
    call_countdown: Option<u32>,
    link: AllyLink,
    requests: Vec<ReinforcementRequest>,
}

impl Detector {
    /// Creates a detector; call [`Detector::start`] before its first update.
    #[must_use]
    pub fn new(id: EntityId, config: DetectorConfig, reinforcement: ReinforcementConfig) -> Self {
        let cone = ViewCone::from_degrees(
            config.spotlight_angle_degrees,
            config.spotlight_angle_degrees,
            config.spotlight_range,
        );
        Self {
            body: DetectorBody {
                id,
                config,
                patrol: PatrolCursor::new(),
                spotlight: Vec3::Z,
                target: None,
                alert_elapsed: 0.0,
                follow_refresh: 0.0,
            },
            fsm: StateMachine::new(),
            cone,
            reinforcement,
            detect_timer: 0.0,
            detecting: false,
            last_seen: None,
            call_cooldown: 0.0,
            call_countdown: None,
            link: AllyLink::new(),
            requests: Vec::new(),
        }
    }

    /// Entity handle.
    #[must_use]
    pub fn id(&self) -> EntityId {
        self.body.id
    }

    /// Active state, `None` once torn down.
    #[must_use]
    pub fn state(&self) -> Option<DetectorState> {
        self.fsm.current()
    }

    /// Target in the spotlight.
    #[must_use]
    pub fn target(&self) -> Option<EntityId> {
        self.body.target
    }

    /// Whether the spotlight currently holds a target.
    #[must_use]
    pub fn is_detecting(&self) -> bool {
        self.detecting
    }

    /// World direction of the spotlight.
    #[must_use]
    pub fn spotlight(&self) -> Vec3 {
        self.body.spotlight
    }

    /// Seconds until another reinforcement call is allowed.
    #[must_use]
    pub fn call_cooldown(&self) -> f32 {
        self.call_cooldown
    }

    /// Whether a delayed call is counting down.
    #[must_use]
    pub fn is_call_pending(&self) -> bool {
        self.call_countdown.is_some()
    }

    /// Allies alerted by the last call that are still linked.
    #[must_use]
    pub fn allies(&self) -> &[EntityId] {
        self.link.allies()
    }

    /// Ally bookkeeping.
    pub fn link_mut(&mut self) -> &mut AllyLink {
        &mut self.link
    }

    /// Links the allies chosen for a call.
    pub fn link_allies(&mut self, allies: Vec<EntityId>) {
        self.link.link(allies, self.reinforcement.update_interval);
    }

    /// Assigned route.
    #[must_use]
    pub fn route(&self) -> Option<&PatrolRoute> {
        self.body.patrol.route()
    }

    /// Replaces the route; a patrolling detector re-targets on its next update.
    pub fn set_route(&mut self, route: Option<PatrolRoute>) {
        self.body.patrol.set_route(route);
    }

    /// Enters the initial Patrol state with the spotlight at rest.
    pub fn start(&mut self, mut svc: Services<'_>) {
        if let Some(pose) = svc.nav.pose(self.body.id) {
            self.body.spotlight = pose.forward;
        }
        let mut ctx = DetectorCtx {
            body: &mut self.body,
            svc: svc.reborrow(),
        };
        self.fsm.transition(DetectorState::Patrol, &mut ctx);
    }

    /// Runs one simulation tick.
    pub fn update(&mut self, dt: f32, mut svc: Services<'_>) {
        if self.fsm.current().is_none() {
            return;
        }
        let id = self.body.id;
        if svc.nav.pose(id).is_none() {
            return;
        }

        self.call_cooldown = (self.call_cooldown - dt).max(0.0);
        self.refresh_detection(dt, &svc);

        {
            let mut ctx = DetectorCtx {
                body: &mut self.body,
                svc: svc.reborrow(),
            };
            self.fsm.update(&mut ctx, dt);
        }

        self.advance_call_countdown(&svc);

        let next = self.decide();
        let mut ctx = DetectorCtx {
            body: &mut self.body,
            svc: svc.reborrow(),
        };
        self.fsm.transition(next, &mut ctx);

        if self.fsm.is(DetectorState::Patrol) {
            self.link.clear();
        } else if self.detecting && self.link.tick(dt, self.reinforcement.update_interval) {
            if let Some(position) = self.body.target.and_then(|t| svc.live_target_position(t)) {
                self.requests.push(ReinforcementRequest::Push {
                    position,
                    target: self.body.target,
                });
            }
        }
    }

    fn refresh_detection(&mut self, dt: f32, svc: &Services<'_>) {
        self.detect_timer -= dt;
        if self.detect_timer <= 0.0 {
            self.detect_timer = self.body.config.detect_interval;
            let seen = svc.nav.pose(self.body.id).and_then(|pose| {
                let eye = pose.position + Vec3::Y * self.body.config.eye_height;
                nearest_visible(
                    svc.spatial,
                    svc.targets,
                    eye,
                    self.body.spotlight,
                    &self.cone,
                    self.body.config.target_mask,
                    self.body.config.obstacle_mask,
                )
            });
            self.body.target = seen;
        } else if self.body.target.is_some_and(|t| !svc.targets.is_alive(t)) {
            self.body.target = None;
        }

        let was_detecting = self.detecting;
        self.detecting = self.body.target.is_some();
        if let Some(position) = self.body.target.and_then(|t| svc.live_target_position(t)) {
            self.last_seen = Some(position);
        }

        if self.detecting && !was_detecting {
            self.on_acquire();
        }
    }

    fn on_acquire(&mut self) {
        if self.call_cooldown > 0.0 || self.call_countdown.is_some() {
            debug!("Detector {} acquired a target but its call is on cooldown", self.body.id);
            return;
        }
        if self.reinforcement.call_delay_ticks == 0 {
            self.raise_call(self.body.target);
        } else {
            self.call_countdown = Some(self.reinforcement.call_delay_ticks);
        }
    }

    fn advance_call_countdown(&mut self, svc: &Services<'_>) {
        let Some(remaining) = self.call_countdown else {
            return;
        };
        if remaining > 1 {
            self.call_countdown = Some(remaining - 1);
            return;
        }
        self.call_countdown = None;
        self.raise_call(self.body.target.filter(|t| svc.targets.is_alive(*t)));
    }

    fn raise_call(&mut self, target: Option<EntityId>) {
        let Some(position) = self.last_seen else {
            return;
        };
        self.call_cooldown = self.reinforcement.call_cooldown;
        self.requests.push(ReinforcementRequest::Call { position, target });
    }

    fn decide(&self) -> DetectorState {
        match self.fsm.current() {
            Some(DetectorState::Alert) => {
                if self.body.alert_elapsed < self.body.config.alert_duration {
                    DetectorState::Alert
                } else if self.detecting {
                    DetectorState::Tracking
                } else {
                    DetectorState::Patrol
                }
            },
            Some(DetectorState::Tracking) if self.detecting => DetectorState::Tracking,
            Some(DetectorState::Patrol) | None if self.detecting => DetectorState::Alert,
            _ => DetectorState::Patrol,
        }
    }

    /// Exits the active state and stops ticking.
    pub fn teardown(&mut self, mut svc: Services<'_>) {
        let mut ctx = DetectorCtx {
            body: &mut self.body,
            svc: svc.reborrow(),
        };
        self.fsm.teardown(&mut ctx);
        self.body.target = None;
        self.detecting = false;
        self.call_countdown = None;
        self.link.clear();
        self.requests.clear();
    }

    /// Reinforcement requests raised since the last call.
    pub fn drain_requests(&mut self) -> Vec<ReinforcementRequest> {
        std::mem::take(&mut self.requests)
    }

    /// State changes since the last call.
    pub fn drain_transitions(&mut self) -> Vec<Transition<DetectorState>> {
        self.fsm.drain_transitions()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockNavigation, MockWorld, RecordingCues};
    use crate::world::Navigation;
    use heist_common::{Aabb, Pose};

    struct Rig {
        world: MockWorld,
        nav: MockNavigation,
        cues: RecordingCues,
    }

    impl Rig {
        fn new() -> Self {
            Self {
                world: MockWorld::new(),
                nav: MockNavigation::new(),
                cues: RecordingCues::new(),
            }
        }

        fn services(&mut self) -> Services<'_> {
            Services::new(&self.world, &self.world, &mut self.nav, &mut self.cues)
        }

        fn spawn(&mut self, reinforcement: ReinforcementConfig) -> Detector {
            let id = EntityId::new();
            self.nav.add_agent(id, Pose::new(Vec3::ZERO, Vec3::Z));
            let config = DetectorConfig {
                detect_interval: 0.0,
                alert_duration: 1.0,
                ..DetectorConfig::default()
            };
            let mut detector = Detector::new(id, config, reinforcement);
            detector.start(self.services());
            detector
        }

        fn tick(&mut self, detector: &mut Detector, dt: f32) {
            detector.update(dt, self.services());
        }

        fn wall(&mut self) -> EntityId {
            self.world
                .add_obstacle(Aabb::new(Vec3::new(-3.0, 0.0, 2.0), Vec3::new(3.0, 5.0, 2.5)))
        }
    }

    fn calls(requests: &[ReinforcementRequest]) -> usize {
        requests
            .iter()
            .filter(|r| matches!(r, ReinforcementRequest::Call { .. }))
            .count()
    }

    #[test]
    fn test_patrol_to_alert_to_tracking() {
        let mut rig = Rig::new();
        let mut detector = rig.spawn(ReinforcementConfig::default());
        assert_eq!(detector.state(), Some(DetectorState::Patrol));

        rig.world.add_player(Vec3::new(0.0, 1.5, 5.0));
        rig.tick(&mut detector, 0.5);
        assert_eq!(detector.state(), Some(DetectorState::Alert));
        assert_eq!(rig.cues.count(Cue::Alert), 1);
        assert!(rig.nav.is_stopped(detector.id()));

        rig.tick(&mut detector, 0.5);
        assert_eq!(detector.state(), Some(DetectorState::Alert));
        rig.tick(&mut detector, 0.5);
        assert_eq!(detector.state(), Some(DetectorState::Tracking));
        assert!(!rig.nav.is_stopped(detector.id()));
        assert_eq!(rig.cues.count(Cue::Alert), 1);
    }

    #[test]
    fn test_alert_falls_back_to_patrol_when_lost() {
        let mut rig = Rig::new();
        let mut detector = rig.spawn(ReinforcementConfig::default());
        rig.world.add_player(Vec3::new(0.0, 1.5, 5.0));
        rig.tick(&mut detector, 0.5);
        assert_eq!(detector.state(), Some(DetectorState::Alert));

        rig.wall();
        rig.tick(&mut detector, 0.5);
        rig.tick(&mut detector, 0.5);
        assert_eq!(detector.state(), Some(DetectorState::Patrol));
    }

    #[test]
    fn test_tracking_reverts_immediately_and_unlinks() {
        let mut rig = Rig::new();
        let mut detector = rig.spawn(ReinforcementConfig::default());
        rig.world.add_player(Vec3::new(0.0, 1.5, 5.0));
        for _ in 0..3 {
            rig.tick(&mut detector, 0.5);
        }
        assert_eq!(detector.state(), Some(DetectorState::Tracking));
        detector.link_allies(vec![EntityId::new()]);

        rig.wall();
        rig.tick(&mut detector, 0.1);
        assert_eq!(detector.state(), Some(DetectorState::Patrol));
        assert!(detector.allies().is_empty());
    }

    #[test]
    fn test_single_call_per_continuous_detection() {
        let mut rig = Rig::new();
        let mut detector = rig.spawn(ReinforcementConfig {
            call_cooldown: 5.0,
            ..ReinforcementConfig::default()
        });
        rig.world.add_player(Vec3::new(0.0, 1.5, 5.0));

        let mut requests = Vec::new();
        for _ in 0..10 {
            rig.tick(&mut detector, 0.2);
            requests.extend(detector.drain_requests());
        }
        assert_eq!(calls(&requests), 1);
    }

    #[test]
    fn test_reacquire_respects_cooldown() {
        let mut rig = Rig::new();
        let mut detector = rig.spawn(ReinforcementConfig {
            call_cooldown: 2.0,
            ..ReinforcementConfig::default()
        });
        let player = rig.world.add_player(Vec3::new(0.0, 1.5, 5.0));
        rig.tick(&mut detector, 0.1);
        assert_eq!(calls(&detector.drain_requests()), 1);

        rig.world.move_player(player, Vec3::new(0.0, 1.5, -5.0));
        rig.tick(&mut detector, 0.1);
        rig.world.move_player(player, Vec3::new(0.0, 1.5, 5.0));
        rig.tick(&mut detector, 0.1);
        assert_eq!(calls(&detector.drain_requests()), 0);

        rig.world.move_player(player, Vec3::new(0.0, 1.5, -5.0));
        rig.tick(&mut detector, 2.0);
        rig.world.move_player(player, Vec3::new(0.0, 1.5, 5.0));
        rig.tick(&mut detector, 0.1);
        assert_eq!(calls(&detector.drain_requests()), 1);
    }

    #[test]
    fn test_call_delay_counts_ticks() {
        let mut rig = Rig::new();
        let mut detector = rig.spawn(ReinforcementConfig {
            call_delay_ticks: 3,
            ..ReinforcementConfig::default()
        });
        let player = rig.world.add_player(Vec3::new(0.0, 1.5, 5.0));

        rig.tick(&mut detector, 0.1);
        assert!(detector.is_call_pending());
        assert!(detector.drain_requests().is_empty());
        rig.tick(&mut detector, 0.1);
        assert!(detector.drain_requests().is_empty());
        rig.tick(&mut detector, 0.1);

        let requests = detector.drain_requests();
        assert_eq!(
            requests,
            vec![ReinforcementRequest::Call {
                position: Vec3::new(0.0, 1.5, 5.0),
                target: Some(player),
            }]
        );
        assert!(!detector.is_call_pending());
    }

    #[test]
    fn test_pushes_updates_while_linked() {
        let mut rig = Rig::new();
        let mut detector = rig.spawn(ReinforcementConfig {
            update_interval: 0.5,
            ..ReinforcementConfig::default()
        });
        rig.world.add_player(Vec3::new(0.0, 1.5, 5.0));
        rig.tick(&mut detector, 0.25);
        detector.drain_requests();
        detector.link_allies(vec![EntityId::new()]);

        let mut pushes = 0;
        for _ in 0..8 {
            rig.tick(&mut detector, 0.25);
            pushes += detector
                .drain_requests()
                .iter()
                .filter(|r| matches!(r, ReinforcementRequest::Push { .. }))
                .count();
        }
        assert_eq!(pushes, 4);
    }

    #[test]
    fn test_spotlight_tracks_and_returns() {
        let mut rig = Rig::new();
        let mut detector = rig.spawn(ReinforcementConfig::default());
        let player = rig.world.add_player(Vec3::new(1.0, 1.5, 5.0));
        for _ in 0..4 {
            rig.tick(&mut detector, 0.5);
        }
        assert!(detector.spotlight().x > 0.1);

        rig.world.kill(player);
        for _ in 0..20 {
            rig.tick(&mut detector, 0.5);
        }
        assert_eq!(detector.state(), Some(DetectorState::Patrol));
        let rest = rig.nav.pose(detector.id()).map(|p| p.forward).expect("pose");
        assert!(detector.spotlight().angle_between(rest) < 1e-3);
    }
}
