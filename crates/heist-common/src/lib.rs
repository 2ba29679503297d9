//! # Heist Common
//!
//! Common types shared by the heist encounter crates:
//! - ID types (EntityId, RoomId, SpawnerId)
//! - World geometry (bounds, exclusion zones, poses, layer masks)
//! - Common error types
//! - Prelude for convenient imports

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod error;
pub mod geometry;
pub mod ids;

pub use glam::{Quat, Vec3};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::*;
    pub use crate::geometry::*;
    pub use crate::ids::*;
    pub use glam::{Quat, Vec3};
}

pub use prelude::*;
