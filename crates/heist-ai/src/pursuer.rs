//! Melee pursuer ("Hanadura").
//!
//! Patrols its room, chases whatever its perception unit reports, attacks in
//! melee range and investigates positions it is alerted to. States only act;
//! the choice of the next state is made after the state's update, in
//! priority order:
//!
//! 1. a pending external alert (consumed once),
//! 2. a live detection (attack if in range, else chase),
//! 3. a remembered target while the forget timer runs (chase),
//! 4. an unfinished investigation,
//! 5. patrol.

use heist_common::{flatten, forward_from_yaw, rotate_towards, EntityId, Vec3};
use serde::{Deserialize, Serialize};

use crate::config::{PerceptionConfig, PursuerConfig};
use crate::fsm::{no_hook, StateHooks, StateKind, StateMachine, StateTable, Transition};
use crate::perception::PerceptionUnit;
use crate::route::{PatrolCursor, PatrolRoute};
use crate::world::{Cue, Services, Targets};

/// Pursuer behavior states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PursuerState {
    /// Walking the assigned route
    Patrol,
    /// Moving toward the target or its last known position
    Chase,
    /// Standing and striking
    Attack,
    /// Checking out an alerted position
    Investigate,
}

impl StateKind for PursuerState {
    fn name(self) -> &'static str {
        match self {
            Self::Patrol => "Patrol",
            Self::Chase => "Chase",
            Self::Attack => "Attack",
            Self::Investigate => "Investigate",
        }
    }
}

/// Progress through an investigation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum InvestigatePhase {
    /// Walking to the alerted position
    Travelling,
    /// Turning in place at the position
    Scanning {
        /// Seconds spent scanning
        elapsed: f32,
    },
    /// Scan finished; waiting for the tick to send us back to patrol
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PendingAlert {
    position: Vec3,
    target: Option<EntityId>,
}

/// Data the pursuer's states read and write.
#[derive(Debug, Clone)]
pub struct PursuerBody {
    id: EntityId,
    config: PursuerConfig,
    patrol: PatrolCursor,
    target: Option<EntityId>,
    last_known: Option<Vec3>,
    forget_timer: f32,
    attack_cooldown: f32,
    attack_fired: bool,
    chase_refresh: f32,
    investigating: bool,
    investigate: InvestigatePhase,
    detected: bool,
    landed: Vec<EntityId>,
}

impl PursuerBody {
    fn acquire(&mut self, target: EntityId, target_position: Vec3, own_position: Vec3) -> PursuerState {
        self.target = Some(target);
        self.last_known = Some(target_position);
        self.forget_timer = self.config.forget_target_time;
        self.investigating = false;

        if flatten(target_position - own_position).length() <= self.config.attack_range {
            PursuerState::Attack
        } else {
            PursuerState::Chase
        }
    }

    fn forget(&mut self) {
        self.target = None;
        self.last_known = None;
        self.forget_timer = 0.0;
    }

    fn tick_cooldown(&mut self, dt: f32) {
        if self.attack_cooldown > 0.0 {
            self.attack_cooldown -= dt;
            if self.attack_cooldown <= 0.0 {
                self.attack_cooldown = 0.0;
                self.attack_fired = false;
            }
        }
    }
}

/// What the state hooks get to work with.
pub struct PursuerCtx<'a> {
    body: &'a mut PursuerBody,
    svc: Services<'a>,
}

impl<'a> StateTable<PursuerCtx<'a>> for PursuerState {
    fn hooks(self) -> StateHooks<PursuerCtx<'a>> {
        match self {
            Self::Patrol => StateHooks {
                on_enter: patrol_enter,
                on_update: patrol_update,
                on_exit: no_hook,
            },
            Self::Chase => StateHooks {
                on_enter: chase_enter,
                on_update: chase_update,
                on_exit: no_hook,
            },
            Self::Attack => StateHooks {
                on_enter: attack_enter,
                on_update: attack_update,
                on_exit: resume,
            },
            Self::Investigate => StateHooks {
                on_enter: investigate_enter,
                on_update: investigate_update,
                on_exit: resume,
            },
        }
    }
}

fn resume(ctx: &mut PursuerCtx<'_>) {
    ctx.svc.nav.resume(ctx.body.id);
}

fn patrol_enter(ctx: &mut PursuerCtx<'_>) {
    let id = ctx.body.id;
    ctx.svc.nav.resume(id);
    ctx.body.patrol.begin(id, ctx.svc.nav);
}

fn patrol_update(ctx: &mut PursuerCtx<'_>, _dt: f32) {
    let id = ctx.body.id;
    ctx.body.patrol.advance(id, ctx.svc.nav);
}

fn chase_enter(ctx: &mut PursuerCtx<'_>) {
    ctx.body.chase_refresh = 0.0;
    ctx.svc.nav.resume(ctx.body.id);
}

fn chase_update(ctx: &mut PursuerCtx<'_>, dt: f32) {
    let body = &mut *ctx.body;
    body.chase_refresh -= dt;
    if body.chase_refresh > 0.0 {
        return;
    }
    body.chase_refresh = body.config.chase_refresh_interval;

    let destination = body
        .target
        .and_then(|t| ctx.svc.live_target_position(t))
        .or(body.last_known);
    if let Some(destination) = destination {
        ctx.svc.nav.move_to(body.id, destination);
    }
}

fn attack_enter(ctx: &mut PursuerCtx<'_>) {
    ctx.svc.nav.stop(ctx.body.id);
}

fn attack_update(ctx: &mut PursuerCtx<'_>, dt: f32) {
    let body = &mut *ctx.body;
    let Some(target) = body.target else {
        return;
    };
    let Some(target_position) = ctx.svc.live_target_position(target) else {
        return;
    };
    let Some(pose) = ctx.svc.nav.pose(body.id) else {
        return;
    };

    let max_turn = body.config.turn_speed_degrees.to_radians() * dt;
    let facing = rotate_towards(pose.forward, target_position - pose.position, max_turn);
    ctx.svc.nav.set_forward(body.id, facing);

    let in_range = flatten(target_position - pose.position).length() <= body.config.attack_range;
    if body.attack_cooldown > 0.0 || !in_range {
        return;
    }

    body.attack_cooldown = body.config.attack_cooldown;
    if !body.attack_fired {
        ctx.svc.cues.fire(body.id, Cue::Attack);
        body.attack_fired = true;
    }
    body.landed.push(target);
}

fn investigate_enter(ctx: &mut PursuerCtx<'_>) {
    let body = &mut *ctx.body;
    body.investigate = InvestigatePhase::Travelling;
    ctx.svc.nav.resume(body.id);
    if let Some(position) = body.last_known {
        ctx.svc.nav.move_to(body.id, position);
    }
}

fn investigate_update(ctx: &mut PursuerCtx<'_>, dt: f32) {
    let body = &mut *ctx.body;
    let Some(pose) = ctx.svc.nav.pose(body.id) else {
        return;
    };

    match body.investigate {
        InvestigatePhase::Travelling => {
            let arrived = body.last_known.map_or(true, |p| {
                flatten(p - pose.position).length() <= body.config.investigate_arrival_threshold
            });
            if arrived {
                ctx.svc.nav.stop(body.id);
                body.investigate = InvestigatePhase::Scanning { elapsed: 0.0 };
            }
        },
        InvestigatePhase::Scanning { elapsed } => {
            let spin = body.config.investigate_spin_degrees.to_radians() * dt;
            ctx.svc.nav.set_forward(body.id, forward_from_yaw(pose.yaw() + spin));

            let elapsed = elapsed + dt;
            body.investigate = if elapsed >= body.config.investigate_duration {
                InvestigatePhase::Done
            } else {
                InvestigatePhase::Scanning { elapsed }
            };
        },
        InvestigatePhase::Done => {},
    }
}

/// A melee pursuer.
#[derive(Debug, Clone)]
pub struct Pursuer {
    body: PursuerBody,
    perception: PerceptionUnit,
    fsm: StateMachine<PursuerState>,
    pending_alert: Option<PendingAlert>,
}

impl Pursuer {
    /// Creates a pursuer; call [`Pursuer::start`] before its first update.
    #[must_use]
    pub fn new(id: EntityId, config: PursuerConfig, perception: PerceptionConfig) -> Self {
        Self {
            body: PursuerBody {
                id,
                config,
                patrol: PatrolCursor::new(),
                target: None,
                last_known: None,
                forget_timer: 0.0,
                attack_cooldown: 0.0,
                attack_fired: false,
                chase_refresh: 0.0,
                investigating: false,
                investigate: InvestigatePhase::Done,
                detected: false,
                landed: Vec::new(),
            },
            perception: PerceptionUnit::new(perception),
            fsm: StateMachine::new(),
            pending_alert: None,
        }
    }

    /// Entity handle.
    #[must_use]
    pub fn id(&self) -> EntityId {
        self.body.id
    }

    /// Active state, `None` once torn down.
    #[must_use]
    pub fn state(&self) -> Option<PursuerState> {
        self.fsm.current()
    }

    /// Current target handle.
    #[must_use]
    pub fn target(&self) -> Option<EntityId> {
        self.body.target
    }

    /// Last known target position.
    #[must_use]
    pub fn last_known_position(&self) -> Option<Vec3> {
        self.body.last_known
    }

    /// Seconds left before a lost target is forgotten.
    #[must_use]
    pub fn forget_timer(&self) -> f32 {
        self.body.forget_timer
    }

    /// Whether an external alert is being investigated.
    #[must_use]
    pub fn is_investigating(&self) -> bool {
        self.body.investigating
    }

    /// Investigation progress.
    #[must_use]
    pub fn investigate_phase(&self) -> InvestigatePhase {
        self.body.investigate
    }

    /// Whether the last perception poll saw a target.
    #[must_use]
    pub fn is_detecting(&self) -> bool {
        self.body.detected
    }

    /// Assigned route.
    #[must_use]
    pub fn route(&self) -> Option<&PatrolRoute> {
        self.body.patrol.route()
    }

    /// Replaces the route; a patrolling pursuer re-targets on its next update.
    pub fn set_route(&mut self, route: Option<PatrolRoute>) {
        self.body.patrol.set_route(route);
    }

    /// Enters the initial Patrol state.
    pub fn start(&mut self, mut svc: Services<'_>) {
        let mut ctx = PursuerCtx {
            body: &mut self.body,
            svc: svc.reborrow(),
        };
        self.fsm.transition(PursuerState::Patrol, &mut ctx);
    }

    /// Queues an alert consumed on the next update.
    ///
    /// With a live `target` the pursuer engages it; otherwise it investigates `position`.
    pub fn alert(&mut self, position: Vec3, target: Option<EntityId>) {
        self.pending_alert = Some(PendingAlert { position, target });
    }

    /// Runs one simulation tick.
    pub fn update(&mut self, dt: f32, mut svc: Services<'_>) {
        if self.fsm.current().is_none() {
            return;
        }
        let id = self.body.id;
        let Some(pose) = svc.nav.pose(id) else {
            return;
        };

        self.perception.update(dt, pose, svc.spatial, svc.targets);
        self.body.tick_cooldown(dt);

        {
            let mut ctx = PursuerCtx {
                body: &mut self.body,
                svc: svc.reborrow(),
            };
            self.fsm.update(&mut ctx, dt);
        }

        let detected = self.perception.detected(svc.targets);
        self.body.detected = detected.is_some();
        let position = svc.nav.pose(id).map_or(pose.position, |p| p.position);
        let (next, restart) = self.decide(dt, detected, position, svc.targets);

        let mut ctx = PursuerCtx {
            body: &mut self.body,
            svc: svc.reborrow(),
        };
        if restart {
            self.fsm.force(next, &mut ctx);
        } else {
            self.fsm.transition(next, &mut ctx);
        }
    }

    fn decide(
        &mut self,
        dt: f32,
        detected: Option<EntityId>,
        position: Vec3,
        targets: &dyn Targets,
    ) -> (PursuerState, bool) {
        let body = &mut self.body;

        if let Some(alert) = self.pending_alert.take() {
            if let Some(target) = alert.target.filter(|t| targets.is_alive(*t)) {
                let target_position = targets.position(target).unwrap_or(alert.position);
                return (body.acquire(target, target_position, position), false);
            }
            body.forget();
            body.last_known = Some(alert.position);
            body.investigating = true;
            return (PursuerState::Investigate, true);
        }

        if let Some(target) = detected {
            if let Some(target_position) = targets.position(target) {
                return (body.acquire(target, target_position, position), false);
            }
        }

        if body.target.is_some_and(|t| !targets.is_alive(t)) {
            body.forget();
        }

        if body.target.is_some() {
            body.forget_timer -= dt;
            if body.forget_timer > 0.0 {
                return (PursuerState::Chase, false);
            }
            body.forget();
            return (PursuerState::Patrol, false);
        }

        if body.investigating {
            if body.investigate == InvestigatePhase::Done {
                body.investigating = false;
                body.last_known = None;
                return (PursuerState::Patrol, false);
            }
            return (PursuerState::Investigate, false);
        }

        (PursuerState::Patrol, false)
    }

    /// Exits the active state and stops ticking.
    pub fn teardown(&mut self, mut svc: Services<'_>) {
        let mut ctx = PursuerCtx {
            body: &mut self.body,
            svc: svc.reborrow(),
        };
        self.fsm.teardown(&mut ctx);
        self.body.forget();
        self.body.investigating = false;
        self.perception.clear();
        self.pending_alert = None;
    }

    /// Targets hit since the last call.
    pub fn drain_landed_attacks(&mut self) -> Vec<EntityId> {
        std::mem::take(&mut self.body.landed)
    }

    /// State changes since the last call.
    pub fn drain_transitions(&mut self) -> Vec<Transition<PursuerState>> {
        self.fsm.drain_transitions()
    }
}
