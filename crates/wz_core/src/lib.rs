//! # WZ Core
//!
//! Deterministic droid kernel: what every unit is told to do (orders), what
//! it is doing right now (actions), how it moves, and the spatial index the
//! three layers share.
//!
//! This crate contains **only** deterministic logic:
//! - No rendering
//! - No IO besides (de)serialising in-memory buffers
//! - No system randomness
//! - No floating-point math (uses fixed-point)
//!
//! ## Crate Structure
//!
//! - [`grid`] - Spatial index over every object
//! - [`movement`] - Movement kernel: steering, collision, VTOL flight
//! - [`action`] - Action state machine
//! - [`order`] - Order state machine and order queue
//! - [`secondary`] - Secondary toggles (attack range, repair level, ...)
//! - [`repair`] - Repair arbitration and repair facilities
//! - [`world`] - Object storage and per-player bookkeeping
//! - [`environment`] - Terrain, pathfinding and combat collaborators
//! - [`simulation`] - Per-tick pipeline and provided API
//! - [`replay`] - Command recording and verification

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod action;
pub mod config;
pub mod droid;
pub mod environment;
pub mod error;
pub mod grid;
pub mod math;
pub mod movement;
pub mod object;
pub mod order;
pub mod pathfinding;
pub mod repair;
pub mod replay;
pub mod rng;
pub mod secondary;
pub mod simulation;
pub mod spiral;
pub mod structure;
pub mod world;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::action::{ActionKind, ActionState};
    pub use crate::config::Tuning;
    pub use crate::droid::{
        BodySize, Droid, DroidCategory, DroidTemplate, PropulsionKind, PropulsionStats, WeaponStats,
    };
    pub use crate::environment::{Combat, Environment, PathResult, Pathfinder, Terrain, TerrainType};
    pub use crate::error::{Result, SimError};
    pub use crate::math::{Fixed, TilePos, Vec2Fixed, TILE_UNITS};
    pub use crate::movement::MoveStatus;
    pub use crate::object::{ObjectId, PlayerId};
    pub use crate::order::{Order, OrderKind, OrderOutcome, OrderRequest, RejectReason};
    pub use crate::replay::{Replay, ReplayPlayer, SimCommand};
    pub use crate::secondary::{
        AttackLevel, AttackRange, HaltType, RepairLevel, ReturnToLoc, SecondaryKind, SecondaryState,
    };
    pub use crate::simulation::{Simulation, TickEvents};
    pub use crate::structure::{FeatureKind, StructureKind, StructureStatus, StructureTemplate};
    pub use crate::world::{TickEvent, World};
}
