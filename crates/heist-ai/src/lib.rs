//! # Heist AI
//!
//! Enemy behavior and encounter orchestration for the heist game.
//!
//! This crate provides the authoritative simulation core:
//! - Field-of-view perception with line-of-sight checks
//! - Behavior state machines (pursuer, spotlight detector)
//! - Reinforcement calls between archetypes
//! - Waypoint generation and room patrol zones
//! - Spawn/respawn scheduling with per-room capacity
//! - Event bus and observer snapshots
//!
//! The host engine is reached only through the traits in [`world`];
//! [`mock`] implements them in memory for tests and the headless harness.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod authority;
pub mod config;
pub mod detector;
pub mod encounter;
pub mod enemy;
pub mod events;
pub mod fsm;
pub mod mock;
pub mod patrol_zone;
pub mod perception;
pub mod pursuer;
pub mod reinforcement;
pub mod route;
pub mod route_gen;
pub mod snapshot;
pub mod spawn;
pub mod world;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::authority::*;
    pub use crate::config::*;
    pub use crate::detector::{Detector, DetectorState};
    pub use crate::encounter::*;
    pub use crate::enemy::*;
    pub use crate::events::*;
    pub use crate::fsm::{StateKind, Transition};
    pub use crate::patrol_zone::*;
    pub use crate::perception::*;
    pub use crate::pursuer::{InvestigatePhase, Pursuer, PursuerState};
    pub use crate::reinforcement::*;
    pub use crate::route::*;
    pub use crate::route_gen::*;
    pub use crate::snapshot::*;
    pub use crate::spawn::*;
    pub use crate::world::*;
}

pub use prelude::*;
