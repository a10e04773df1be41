//! Order state machine.
//!
//! An order is a droid's high-level intent: move there, attack that, build
//! this. The order layer validates and assigns orders ([`assign`]), keeps
//! the queue of orders still to come ([`queue`]) and, every tick, checks
//! that the action layer is still serving the current order
//! ([`update::order_update_droid`]).
//!
//! The stored [`Order`] is a sum type: each kind carries only the fields
//! it needs. Object references are weak [`ObjectId`]s; a dead target is
//! cleared to `None` and the per-kind update decides what that means.

pub mod assign;
pub mod queue;
pub mod update;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::action::{action_droid, ActionKind};
use crate::droid::Droid;
use crate::environment::Environment;
use crate::math::{Angle, Vec2Fixed};
use crate::object::ObjectId;
use crate::structure::StructureTemplate;
use crate::world::World;

pub use assign::order_droid_base;
pub use queue::{order_droid_add, order_droid_list, OrderQueue};
pub use update::order_update_droid;

/// Kind of a droid order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OrderKind {
    /// No order.
    #[default]
    None,
    /// Stop whatever is going on.
    Stop,
    /// Move to a point.
    Move,
    /// Attack an object.
    Attack,
    /// Build a structure.
    Build,
    /// Help build a structure someone else started.
    HelpBuild,
    /// Build a line of structures.
    LineBuild,
    /// Demolish a structure.
    Demolish,
    /// Repair a structure.
    Repair,
    /// Keep an object in sensor view.
    Observe,
    /// Fire at whatever a sensor spots.
    FireSupport,
    /// Fall back to the retreat point.
    Retreat,
    /// Return to base.
    Rtb,
    /// Return for repair.
    Rtr,
    /// Return for repair at a chosen facility.
    RtrSpecified,
    /// Board a transporter.
    Embark,
    /// Unload a transporter.
    Disembark,
    /// Attack an object without dropping a guard order.
    AttackTarget,
    /// Commander placeholder.
    Command,
    /// Build a module onto a structure.
    BuildModule,
    /// Drive to a factory or repair facility and be recycled.
    Recycle,
    /// Transporter leaves the map.
    TransportOut,
    /// Transporter flies in.
    TransportIn,
    /// Transporter returns after unloading.
    TransportReturn,
    /// Guard a point or an object.
    Guard,
    /// Circle a point.
    Circle,
    /// Hold position until the next order.
    TempHold,
    /// Patrol between two points.
    Patrol,
    /// Land on a rearm pad.
    Rearm,
    /// Pick up an artifact.
    Recover,
    /// Fly off the map.
    LeaveMap,
    /// Burning person running about.
    RunBurn,
    /// Clear a wreck.
    ClearWreck,
    /// Repair another droid.
    DroidRepair,
    /// Restore a structure's resistance.
    Restore,
    /// Move, fighting what is on the way.
    Scout,
    /// Run from danger.
    Run,
    /// Move, attacking a wall in the way.
    MoveAttackWall,
    /// Scout, attacking a wall in the way.
    ScoutAttackWall,
    /// Self destruct.
    Destruct,
}

impl OrderKind {
    /// Diagnostic name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "DORDER_NONE",
            Self::Stop => "DORDER_STOP",
            Self::Move => "DORDER_MOVE",
            Self::Attack => "DORDER_ATTACK",
            Self::Build => "DORDER_BUILD",
            Self::HelpBuild => "DORDER_HELPBUILD",
            Self::LineBuild => "DORDER_LINEBUILD",
            Self::Demolish => "DORDER_DEMOLISH",
            Self::Repair => "DORDER_REPAIR",
            Self::Observe => "DORDER_OBSERVE",
            Self::FireSupport => "DORDER_FIRESUPPORT",
            Self::Retreat => "DORDER_RETREAT",
            Self::Rtb => "DORDER_RTB",
            Self::Rtr => "DORDER_RTR",
            Self::RtrSpecified => "DORDER_RTR_SPECIFIED",
            Self::Embark => "DORDER_EMBARK",
            Self::Disembark => "DORDER_DISEMBARK",
            Self::AttackTarget => "DORDER_ATTACKTARGET",
            Self::Command => "DORDER_COMMAND",
            Self::BuildModule => "DORDER_BUILDMODULE",
            Self::Recycle => "DORDER_RECYCLE",
            Self::TransportOut => "DORDER_TRANSPORTOUT",
            Self::TransportIn => "DORDER_TRANSPORTIN",
            Self::TransportReturn => "DORDER_TRANSPORTRETURN",
            Self::Guard => "DORDER_GUARD",
            Self::Circle => "DORDER_CIRCLE",
            Self::TempHold => "DORDER_TEMP_HOLD",
            Self::Patrol => "DORDER_PATROL",
            Self::Rearm => "DORDER_REARM",
            Self::Recover => "DORDER_RECOVER",
            Self::LeaveMap => "DORDER_LEAVEMAP",
            Self::RunBurn => "DORDER_RUNBURN",
            Self::ClearWreck => "DORDER_CLEARWRECK",
            Self::DroidRepair => "DORDER_DROIDREPAIR",
            Self::Restore => "DORDER_RESTORE",
            Self::Scout => "DORDER_SCOUT",
            Self::Run => "DORDER_RUN",
            Self::MoveAttackWall => "DORDER_MOVE_ATTACKWALL",
            Self::ScoutAttackWall => "DORDER_SCOUT_ATTACKWALL",
            Self::Destruct => "DORDER_DESTRUCT",
        }
    }

    /// Orders that may be given with a bare position.
    #[must_use]
    pub const fn valid_for_loc(self) -> bool {
        matches!(
            self,
            Self::None
                | Self::Move
                | Self::Guard
                | Self::Scout
                | Self::Run
                | Self::Patrol
                | Self::TransportOut
                | Self::TransportIn
                | Self::TransportReturn
                | Self::Disembark
                | Self::Circle
        )
    }

    /// Orders that may be given with an object target.
    #[must_use]
    pub const fn valid_for_obj(self) -> bool {
        matches!(
            self,
            Self::None
                | Self::HelpBuild
                | Self::Demolish
                | Self::Repair
                | Self::Attack
                | Self::FireSupport
                | Self::Observe
                | Self::AttackTarget
                | Self::Rtr
                | Self::RtrSpecified
                | Self::Embark
                | Self::Guard
                | Self::DroidRepair
                | Self::Restore
                | Self::BuildModule
                | Self::Rearm
                | Self::ClearWreck
                | Self::Recover
        )
    }

    /// Orders that may wait in the queue.
    #[must_use]
    pub const fn queueable(self) -> bool {
        matches!(
            self,
            Self::Move
                | Self::Scout
                | Self::Disembark
                | Self::Attack
                | Self::Repair
                | Self::Observe
                | Self::DroidRepair
                | Self::FireSupport
                | Self::ClearWreck
                | Self::Demolish
                | Self::HelpBuild
                | Self::BuildModule
                | Self::Build
                | Self::LineBuild
        )
    }

    /// Queued orders that need a living target to stay in the queue.
    #[must_use]
    pub const fn needs_target(self) -> bool {
        matches!(
            self,
            Self::Attack
                | Self::Repair
                | Self::Observe
                | Self::DroidRepair
                | Self::FireSupport
                | Self::ClearWreck
                | Self::Demolish
                | Self::HelpBuild
                | Self::BuildModule
        )
    }
}

/// What a caller asks a droid to do.
///
/// This is the loose, all-optional shape that arrives from players and
/// scripts and sits in the order queue; [`order_droid_base`] turns it into
/// a stored [`Order`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Order kind.
    pub kind: OrderKind,
    /// Object target.
    pub target: Option<ObjectId>,
    /// Position target.
    #[serde(with = "crate::math::option_vec_serde", default)]
    pub pos: Option<Vec2Fixed>,
    /// Second position (line build end, patrol origin).
    #[serde(with = "crate::math::option_vec_serde", default)]
    pub end: Option<Vec2Fixed>,
    /// Structure to build.
    pub template: Option<StructureTemplate>,
    /// Facing of a new structure.
    pub direction: Angle,
}

impl OrderRequest {
    /// An order without a target.
    #[must_use]
    pub fn new(kind: OrderKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    /// An order about a position.
    #[must_use]
    pub fn loc(kind: OrderKind, pos: Vec2Fixed) -> Self {
        Self {
            kind,
            pos: Some(pos),
            ..Self::default()
        }
    }

    /// An order about an object.
    #[must_use]
    pub fn obj(kind: OrderKind, target: ObjectId) -> Self {
        Self {
            kind,
            target: Some(target),
            ..Self::default()
        }
    }

    /// Build `template` at `pos`.
    #[must_use]
    pub fn build(template: StructureTemplate, pos: Vec2Fixed, direction: Angle) -> Self {
        Self {
            kind: OrderKind::Build,
            pos: Some(pos),
            template: Some(template),
            direction,
            ..Self::default()
        }
    }

    /// Build a straight line of `template` from `from` to `to`.
    #[must_use]
    pub fn line_build(template: StructureTemplate, from: Vec2Fixed, to: Vec2Fixed) -> Self {
        Self {
            kind: OrderKind::LineBuild,
            pos: Some(from),
            end: Some(to),
            template: Some(template),
            ..Self::default()
        }
    }
}

/// Why an order was not taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    /// The droid's category cannot carry out this order.
    WrongCategory,
    /// The order needs a weapon the droid does not carry.
    NoWeapon,
    /// The destination cannot be reached.
    Unreachable,
    /// The order needs a target or position that was not given.
    MissingTarget,
    /// The target is dead or unknown.
    DeadTarget,
    /// The target is not of a usable kind.
    InvalidTarget,
    /// This order cannot be queued.
    NotQueueable,
    /// Lift droids cannot go to a blocking tile.
    BlockedDestination,
    /// Nowhere suitable to go (no facility, landing zone or retreat point).
    NoDestination,
}

/// Result of giving an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderOutcome {
    /// The order is now the droid's current order (or was handed on to
    /// the commander's group).
    Accepted,
    /// The order was appended to the queue.
    Queued,
    /// The order was refused; the droid is unchanged.
    Rejected(RejectReason),
}

impl OrderOutcome {
    /// True unless the order was refused.
    #[must_use]
    pub fn is_ok(self) -> bool {
        !matches!(self, Self::Rejected(_))
    }
}

/// Current order of a droid, with exactly the data each kind needs.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Order {
    /// Idle.
    #[default]
    None,
    /// Transient stop request; never stored for long.
    Stop,
    /// Move to `pos`.
    Move {
        /// Destination.
        pos: Vec2Fixed,
    },
    /// Attack `target`.
    Attack {
        /// Object attacked.
        target: Option<ObjectId>,
    },
    /// Build a new structure.
    Build {
        /// What to build.
        template: StructureTemplate,
        /// Centre of the site.
        pos: Vec2Fixed,
        /// Facing.
        direction: Angle,
        /// Foundation once laid.
        target: Option<ObjectId>,
    },
    /// Help build an existing foundation.
    HelpBuild {
        /// Structure under construction.
        target: Option<ObjectId>,
        /// Its position.
        pos: Vec2Fixed,
    },
    /// Build a line of structures.
    LineBuild {
        /// What to build.
        template: StructureTemplate,
        /// Current site.
        pos: Vec2Fixed,
        /// Last site of the line.
        end: Vec2Fixed,
        /// Facing.
        direction: Angle,
        /// Foundation of the current site.
        target: Option<ObjectId>,
    },
    /// Demolish a structure.
    Demolish {
        /// Structure to tear down.
        target: Option<ObjectId>,
        /// Its position.
        pos: Vec2Fixed,
    },
    /// Repair a structure.
    Repair {
        /// Structure to repair.
        target: Option<ObjectId>,
        /// Its position.
        pos: Vec2Fixed,
    },
    /// Keep an object in view.
    Observe {
        /// Object observed.
        target: Option<ObjectId>,
    },
    /// Fire at whatever the spotter targets.
    FireSupport {
        /// Sensor droid or sensor structure.
        target: Option<ObjectId>,
    },
    /// Fall back to a point.
    Retreat {
        /// Retreat point.
        pos: Vec2Fixed,
    },
    /// Return to base.
    Rtb {
        /// HQ, landing spot or landing zone.
        pos: Vec2Fixed,
    },
    /// Return for repair.
    Rtr {
        /// Repair facility or repair droid.
        target: Option<ObjectId>,
        /// Where it stands.
        pos: Vec2Fixed,
    },
    /// Return for repair to a chosen facility.
    RtrSpecified {
        /// Repair facility.
        target: Option<ObjectId>,
        /// Where it stands.
        pos: Vec2Fixed,
    },
    /// Board a transporter.
    Embark {
        /// Transporter.
        target: Option<ObjectId>,
        /// Where it stood when ordered.
        pos: Vec2Fixed,
    },
    /// Unload a transporter at a point.
    Disembark {
        /// Unload point.
        pos: Vec2Fixed,
    },
    /// Attack without dropping the guard order.
    AttackTarget {
        /// Object attacked.
        target: Option<ObjectId>,
    },
    /// Commander placeholder.
    Command,
    /// Recycle at a structure.
    Recycle {
        /// Factory or repair facility.
        target: Option<ObjectId>,
        /// Point in front of it.
        pos: Vec2Fixed,
    },
    /// Transporter leaves the map.
    TransportOut {
        /// Exit point.
        pos: Vec2Fixed,
    },
    /// Transporter flies in.
    TransportIn {
        /// Landing point.
        pos: Vec2Fixed,
    },
    /// Transporter returns.
    TransportReturn {
        /// Exit point.
        pos: Vec2Fixed,
    },
    /// Guard a point or an object.
    Guard {
        /// Object guarded.
        target: Option<ObjectId>,
        /// Point guarded.
        pos: Vec2Fixed,
    },
    /// Circle a point.
    Circle {
        /// Centre of the orbit.
        center: Vec2Fixed,
    },
    /// Hold position.
    TempHold,
    /// Patrol between two points.
    Patrol {
        /// Endpoint currently headed for.
        pos: Vec2Fixed,
        /// The other endpoint.
        origin: Vec2Fixed,
    },
    /// Land on a rearm pad.
    Rearm {
        /// Pad.
        target: Option<ObjectId>,
    },
    /// Pick up an artifact.
    Recover {
        /// Artifact feature.
        target: Option<ObjectId>,
    },
    /// Fly off the map.
    LeaveMap {
        /// Exit point.
        pos: Vec2Fixed,
    },
    /// Burning; runs until it dies.
    RunBurn {
        /// Where it runs.
        pos: Vec2Fixed,
        /// Game time (ms) the fire started.
        started: u64,
    },
    /// Clear a wreck.
    ClearWreck {
        /// Wreck feature.
        target: Option<ObjectId>,
        /// Its position.
        pos: Vec2Fixed,
    },
    /// Repair another droid.
    DroidRepair {
        /// Patient.
        target: Option<ObjectId>,
    },
    /// Restore a structure's resistance.
    Restore {
        /// Structure.
        target: Option<ObjectId>,
        /// Its position.
        pos: Vec2Fixed,
    },
    /// Move, fighting on the way.
    Scout {
        /// Destination.
        pos: Vec2Fixed,
    },
    /// Run from danger.
    Run {
        /// Where to.
        pos: Vec2Fixed,
        /// Game time (ms) the run began.
        started: u64,
    },
    /// Move, attacking a wall on the way.
    MoveAttackWall {
        /// Wall.
        target: Option<ObjectId>,
        /// Destination.
        pos: Vec2Fixed,
    },
    /// Scout, attacking a wall on the way.
    ScoutAttackWall {
        /// Wall.
        target: Option<ObjectId>,
        /// Destination.
        pos: Vec2Fixed,
    },
    /// Self destruct.
    Destruct,
}

impl Order {
    /// Kind of this order.
    #[must_use]
    pub fn kind(&self) -> OrderKind {
        match self {
            Self::None => OrderKind::None,
            Self::Stop => OrderKind::Stop,
            Self::Move { .. } => OrderKind::Move,
            Self::Attack { .. } => OrderKind::Attack,
            Self::Build { .. } => OrderKind::Build,
            Self::HelpBuild { .. } => OrderKind::HelpBuild,
            Self::LineBuild { .. } => OrderKind::LineBuild,
            Self::Demolish { .. } => OrderKind::Demolish,
            Self::Repair { .. } => OrderKind::Repair,
            Self::Observe { .. } => OrderKind::Observe,
            Self::FireSupport { .. } => OrderKind::FireSupport,
            Self::Retreat { .. } => OrderKind::Retreat,
            Self::Rtb { .. } => OrderKind::Rtb,
            Self::Rtr { .. } => OrderKind::Rtr,
            Self::RtrSpecified { .. } => OrderKind::RtrSpecified,
            Self::Embark { .. } => OrderKind::Embark,
            Self::Disembark { .. } => OrderKind::Disembark,
            Self::AttackTarget { .. } => OrderKind::AttackTarget,
            Self::Command => OrderKind::Command,
            Self::Recycle { .. } => OrderKind::Recycle,
            Self::TransportOut { .. } => OrderKind::TransportOut,
            Self::TransportIn { .. } => OrderKind::TransportIn,
            Self::TransportReturn { .. } => OrderKind::TransportReturn,
            Self::Guard { .. } => OrderKind::Guard,
            Self::Circle { .. } => OrderKind::Circle,
            Self::TempHold => OrderKind::TempHold,
            Self::Patrol { .. } => OrderKind::Patrol,
            Self::Rearm { .. } => OrderKind::Rearm,
            Self::Recover { .. } => OrderKind::Recover,
            Self::LeaveMap { .. } => OrderKind::LeaveMap,
            Self::RunBurn { .. } => OrderKind::RunBurn,
            Self::ClearWreck { .. } => OrderKind::ClearWreck,
            Self::DroidRepair { .. } => OrderKind::DroidRepair,
            Self::Restore { .. } => OrderKind::Restore,
            Self::Scout { .. } => OrderKind::Scout,
            Self::Run { .. } => OrderKind::Run,
            Self::MoveAttackWall { .. } => OrderKind::MoveAttackWall,
            Self::ScoutAttackWall { .. } => OrderKind::ScoutAttackWall,
            Self::Destruct => OrderKind::Destruct,
        }
    }

    /// Object the order is about.
    #[must_use]
    pub fn target(&self) -> Option<ObjectId> {
        match self {
            Self::Attack { target }
            | Self::AttackTarget { target }
            | Self::Build { target, .. }
            | Self::HelpBuild { target, .. }
            | Self::LineBuild { target, .. }
            | Self::Demolish { target, .. }
            | Self::Repair { target, .. }
            | Self::Observe { target }
            | Self::FireSupport { target }
            | Self::Rtr { target, .. }
            | Self::RtrSpecified { target, .. }
            | Self::Embark { target, .. }
            | Self::Recycle { target, .. }
            | Self::Guard { target, .. }
            | Self::Rearm { target }
            | Self::Recover { target }
            | Self::ClearWreck { target, .. }
            | Self::DroidRepair { target }
            | Self::Restore { target, .. }
            | Self::MoveAttackWall { target, .. }
            | Self::ScoutAttackWall { target, .. } => *target,
            _ => None,
        }
    }

    /// Replace the object the order is about. Orders without a target
    /// slot ignore this.
    pub fn set_target(&mut self, id: Option<ObjectId>) {
        match self {
            Self::Attack { target }
            | Self::AttackTarget { target }
            | Self::Build { target, .. }
            | Self::HelpBuild { target, .. }
            | Self::LineBuild { target, .. }
            | Self::Demolish { target, .. }
            | Self::Repair { target, .. }
            | Self::Observe { target }
            | Self::FireSupport { target }
            | Self::Rtr { target, .. }
            | Self::RtrSpecified { target, .. }
            | Self::Embark { target, .. }
            | Self::Recycle { target, .. }
            | Self::Guard { target, .. }
            | Self::Rearm { target }
            | Self::Recover { target }
            | Self::ClearWreck { target, .. }
            | Self::DroidRepair { target }
            | Self::Restore { target, .. }
            | Self::MoveAttackWall { target, .. }
            | Self::ScoutAttackWall { target, .. } => *target = id,
            _ => {}
        }
    }

    /// Position the order is about.
    #[must_use]
    pub fn pos(&self) -> Option<Vec2Fixed> {
        match self {
            Self::Move { pos }
            | Self::Build { pos, .. }
            | Self::HelpBuild { pos, .. }
            | Self::LineBuild { pos, .. }
            | Self::Demolish { pos, .. }
            | Self::Repair { pos, .. }
            | Self::Retreat { pos }
            | Self::Rtb { pos }
            | Self::Rtr { pos, .. }
            | Self::RtrSpecified { pos, .. }
            | Self::Embark { pos, .. }
            | Self::Disembark { pos }
            | Self::Recycle { pos, .. }
            | Self::TransportOut { pos }
            | Self::TransportIn { pos }
            | Self::TransportReturn { pos }
            | Self::Guard { pos, .. }
            | Self::Patrol { pos, .. }
            | Self::LeaveMap { pos }
            | Self::RunBurn { pos, .. }
            | Self::ClearWreck { pos, .. }
            | Self::Restore { pos, .. }
            | Self::Scout { pos }
            | Self::Run { pos, .. }
            | Self::MoveAttackWall { pos, .. }
            | Self::ScoutAttackWall { pos, .. } => Some(*pos),
            Self::Circle { center } => Some(*center),
            _ => None,
        }
    }

    /// Structure template of a build order.
    #[must_use]
    pub fn template(&self) -> Option<&StructureTemplate> {
        match self {
            Self::Build { template, .. } | Self::LineBuild { template, .. } => Some(template),
            _ => None,
        }
    }
}

/// True if the droid's order is `kind`. RTR also matches a specified RTR.
#[must_use]
pub fn order_state(droid: &Droid, kind: OrderKind) -> bool {
    let current = droid.order.kind();
    if kind == OrderKind::Rtr {
        return matches!(current, OrderKind::Rtr | OrderKind::RtrSpecified);
    }
    current == kind
}

/// Target of the droid's order, if the order is `kind`.
#[must_use]
pub fn order_state_obj(droid: &Droid, kind: OrderKind) -> Option<ObjectId> {
    if order_state(droid, kind) {
        droid.order.target()
    } else {
        None
    }
}

/// Give an immediate order without a target. The queue is cleared.
pub fn order_droid(world: &mut World, env: &mut Environment, droid: &mut Droid, kind: OrderKind) {
    droid.order_queue.clear();
    order_droid_base(world, env, droid, &OrderRequest::new(kind));
}

/// Give an immediate order about a position. The queue is cleared.
pub fn order_droid_loc(world: &mut World, env: &mut Environment, droid: &mut Droid, kind: OrderKind, pos: Vec2Fixed) {
    if !kind.valid_for_loc() {
        debug!(droid = droid.id.0, order = kind.name(), "not a location order");
        return;
    }
    droid.order_queue.clear();
    order_droid_base(world, env, droid, &OrderRequest::loc(kind, pos));
}

/// Give an immediate order about an object. The queue is cleared.
pub fn order_droid_obj(world: &mut World, env: &mut Environment, droid: &mut Droid, kind: OrderKind, target: ObjectId) {
    if !kind.valid_for_obj() {
        debug!(droid = droid.id.0, order = kind.name(), "not an object order");
        return;
    }
    droid.order_queue.clear();
    order_droid_base(world, env, droid, &OrderRequest::obj(kind, target));
}

/// Give an order from a caller, either now or at the back of the queue.
pub fn order_droid_request(
    world: &mut World,
    env: &mut Environment,
    droid: &mut Droid,
    request: &OrderRequest,
    queue: bool,
) -> OrderOutcome {
    if queue {
        return order_droid_add(world, env, droid, request);
    }
    droid.order_queue.clear();
    order_droid_base(world, env, droid, request)
}

/// Give up on the current build: start the next queued order, or idle.
pub fn cancel_build(world: &mut World, env: &mut Environment, droid: &mut Droid) {
    debug!(droid = droid.id.0, order = droid.order.kind().name(), "build cancelled");
    if order_droid_list(world, env, droid) {
        return;
    }
    droid.order = Order::None;
    action_droid(world, env, droid, ActionKind::None);
}
