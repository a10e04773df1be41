//! Secondary orders.
//!
//! Secondary orders are persistent behaviour toggles that live next to the
//! primary order: how far to engage, when to retreat for repair, whether to
//! hold, guard or pursue when idle. Several of them have side effects on the
//! current order when changed, and a commander passes every change on to its
//! group.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::action::{action_droid, action_droid_loc, vtol::move_to_rearm, ActionKind};
use crate::droid::Droid;
use crate::environment::Environment;
use crate::object::{ObjectId, PlayerId};
use crate::order::{order_droid, order_droid_loc, order_droid_obj, OrderKind};
use crate::world::World;

/// Health percentage at which a droid set to "repair at low damage" retreats.
pub const REPAIRLEV_HIGH: u32 = 75;

/// Health percentage at which a droid set to "repair at high damage" retreats.
pub const REPAIRLEV_LOW: u32 = 50;

/// Preferred engagement range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AttackRange {
    /// Whichever of short and long range hits more often.
    #[default]
    Optimum,
    /// Short range.
    Short,
    /// Long range.
    Long,
}

/// Damage threshold for returning to repair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RepairLevel {
    /// Fight to the death.
    #[default]
    Never,
    /// Retreat after light damage.
    Low,
    /// Retreat only after heavy damage.
    High,
}

/// Aggressiveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AttackLevel {
    /// Fire at anything hostile.
    #[default]
    Always,
    /// Only return fire.
    Attacked,
    /// Never open fire.
    Never,
}

/// Behaviour when there is nothing to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum HaltType {
    /// Stay put, never chase.
    Hold,
    /// Chase a little, then return to the post.
    #[default]
    Guard,
    /// Chase targets indefinitely.
    Pursue,
}

/// Where to go after being told to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ReturnToLoc {
    /// Nowhere.
    #[default]
    None,
    /// To repair.
    Repair,
    /// To the HQ.
    Base,
    /// Onto a transporter.
    Transport,
}

/// Which secondary toggle is addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SecondaryKind {
    /// Preferred engagement range.
    AttackRange,
    /// Repair threshold.
    RepairLevel,
    /// Aggressiveness.
    AttackLevel,
    /// Recycle on/off.
    Recycle,
    /// Patrol on/off.
    Patrol,
    /// Circle on/off (VTOL only).
    Circle,
    /// Idle behaviour.
    HaltType,
    /// Return-to-location target.
    ReturnToLoc,
}

/// A value for one secondary toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SecondaryState {
    /// Value for [`SecondaryKind::AttackRange`].
    AttackRange(AttackRange),
    /// Value for [`SecondaryKind::RepairLevel`].
    RepairLevel(RepairLevel),
    /// Value for [`SecondaryKind::AttackLevel`].
    AttackLevel(AttackLevel),
    /// Value for [`SecondaryKind::HaltType`].
    HaltType(HaltType),
    /// Value for [`SecondaryKind::ReturnToLoc`].
    ReturnToLoc(ReturnToLoc),
    /// Value for the on/off toggles.
    Flag(bool),
}

impl SecondaryState {
    /// True if this value can be assigned to `kind`.
    #[must_use]
    pub const fn fits(self, kind: SecondaryKind) -> bool {
        matches!(
            (kind, self),
            (SecondaryKind::AttackRange, Self::AttackRange(_))
                | (SecondaryKind::RepairLevel, Self::RepairLevel(_))
                | (SecondaryKind::AttackLevel, Self::AttackLevel(_))
                | (SecondaryKind::HaltType, Self::HaltType(_))
                | (SecondaryKind::ReturnToLoc, Self::ReturnToLoc(_))
                | (
                    SecondaryKind::Recycle | SecondaryKind::Patrol | SecondaryKind::Circle,
                    Self::Flag(_)
                )
        )
    }
}

/// The full set of secondary toggles of one droid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SecondaryOrders {
    /// Preferred engagement range.
    pub attack_range: AttackRange,
    /// Repair threshold.
    pub repair_level: RepairLevel,
    /// Aggressiveness.
    pub attack_level: AttackLevel,
    /// Idle behaviour.
    pub halt: HaltType,
    /// Return-to-location target.
    pub return_to_loc: ReturnToLoc,
    /// Heading for recycling.
    pub recycle: bool,
    /// Patrolling.
    pub patrol: bool,
    /// Circling.
    pub circle: bool,
}

impl SecondaryOrders {
    /// Stored value of one toggle.
    #[must_use]
    pub const fn get(&self, kind: SecondaryKind) -> SecondaryState {
        match kind {
            SecondaryKind::AttackRange => SecondaryState::AttackRange(self.attack_range),
            SecondaryKind::RepairLevel => SecondaryState::RepairLevel(self.repair_level),
            SecondaryKind::AttackLevel => SecondaryState::AttackLevel(self.attack_level),
            SecondaryKind::HaltType => SecondaryState::HaltType(self.halt),
            SecondaryKind::ReturnToLoc => SecondaryState::ReturnToLoc(self.return_to_loc),
            SecondaryKind::Recycle => SecondaryState::Flag(self.recycle),
            SecondaryKind::Patrol => SecondaryState::Flag(self.patrol),
            SecondaryKind::Circle => SecondaryState::Flag(self.circle),
        }
    }

    /// Overwrite one toggle without side effects. Mismatched values are ignored.
    pub fn store(&mut self, kind: SecondaryKind, state: SecondaryState) {
        match (kind, state) {
            (SecondaryKind::AttackRange, SecondaryState::AttackRange(v)) => self.attack_range = v,
            (SecondaryKind::RepairLevel, SecondaryState::RepairLevel(v)) => self.repair_level = v,
            (SecondaryKind::AttackLevel, SecondaryState::AttackLevel(v)) => self.attack_level = v,
            (SecondaryKind::HaltType, SecondaryState::HaltType(v)) => self.halt = v,
            (SecondaryKind::ReturnToLoc, SecondaryState::ReturnToLoc(v)) => self.return_to_loc = v,
            (SecondaryKind::Recycle, SecondaryState::Flag(v)) => self.recycle = v,
            (SecondaryKind::Patrol, SecondaryState::Flag(v)) => self.patrol = v,
            (SecondaryKind::Circle, SecondaryState::Flag(v)) => self.circle = v,
            _ => {}
        }
    }

    /// Health percentage at or below which the droid heads for repair.
    #[must_use]
    pub const fn repair_threshold(&self) -> Option<u32> {
        match self.repair_level {
            RepairLevel::Never => None,
            RepairLevel::Low => Some(REPAIRLEV_HIGH),
            RepairLevel::High => Some(REPAIRLEV_LOW),
        }
    }
}

/// A secondary change waiting for the next tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedSecondary {
    /// Droid addressed.
    pub droid: ObjectId,
    /// Toggle.
    pub kind: SecondaryKind,
    /// New value.
    pub state: SecondaryState,
}

/// Effective value of a toggle. A droid on temporary hold reads as holding.
#[must_use]
pub fn secondary_get_state(droid: &Droid, kind: SecondaryKind) -> SecondaryState {
    if kind == SecondaryKind::HaltType && droid.order.kind() == OrderKind::TempHold {
        return SecondaryState::HaltType(HaltType::Hold);
    }
    droid.secondary.get(kind)
}

/// Effective halt type.
#[must_use]
pub fn halt_type(droid: &Droid) -> HaltType {
    match secondary_get_state(droid, SecondaryKind::HaltType) {
        SecondaryState::HaltType(halt) => halt,
        _ => droid.secondary.halt,
    }
}

/// Whether the droid's category accepts a toggle.
#[must_use]
pub fn secondary_supported(world: &World, droid: &Droid, kind: SecondaryKind) -> bool {
    match kind {
        SecondaryKind::AttackRange | SecondaryKind::AttackLevel => {
            !droid.is_repairer() && !droid.is_constructor()
        }
        SecondaryKind::Circle => droid.is_vtol(),
        SecondaryKind::RepairLevel | SecondaryKind::Patrol | SecondaryKind::HaltType | SecondaryKind::ReturnToLoc => {
            true
        }
        SecondaryKind::Recycle => world.has_recycling_point(droid.player),
    }
}

/// Clear sticky toggles when a new primary order arrives.
pub fn secondary_got_primary_order(droid: &mut Droid, order: OrderKind) {
    if droid.is_transporter() {
        return;
    }
    if !matches!(
        order,
        OrderKind::None | OrderKind::Stop | OrderKind::Destruct | OrderKind::Guard
    ) {
        droid.secondary.return_to_loc = ReturnToLoc::None;
        droid.secondary.recycle = false;
        droid.secondary.patrol = false;
    }
}

/// Send the droid for repair once its health drops to the repair threshold.
pub fn secondary_check_damage_level(world: &mut World, env: &mut Environment, droid: &mut Droid) {
    let Some(threshold) = droid.secondary.repair_threshold() else {
        return;
    };
    if droid.health_percent() > threshold {
        return;
    }
    if !droid.is_vtol() {
        droid.group = None;
    }
    if !matches!(droid.order.kind(), OrderKind::Rtr | OrderKind::RtrSpecified | OrderKind::Rtb) && !droid.vtol_rearming() {
        debug!(droid = droid.id.0, health = droid.health_percent(), "damage threshold reached");
        if droid.is_vtol() {
            move_to_rearm(world, env, droid);
        } else {
            order_droid(world, env, droid, OrderKind::Rtr);
        }
    }
}

/// Change a toggle, applying its side effects. Returns `false` if the value
/// could not be applied.
pub fn secondary_set_state(
    world: &mut World,
    env: &mut Environment,
    droid: &mut Droid,
    kind: SecondaryKind,
    state: SecondaryState,
) -> bool {
    if !state.fits(kind) {
        debug!(droid = droid.id.0, ?kind, ?state, "secondary value does not fit toggle");
        return false;
    }

    if kind != SecondaryKind::Recycle && droid.is_commander() {
        for member in world.group_members(droid.id) {
            world.with_droid(member, |world, other| {
                secondary_set_state(world, env, other, kind, state);
            });
        }
    }

    let mut applied = true;
    match state {
        SecondaryState::AttackRange(range) => droid.secondary.attack_range = range,
        SecondaryState::RepairLevel(level) => {
            droid.secondary.repair_level = level;
            secondary_check_damage_level(world, env, droid);
        }
        SecondaryState::AttackLevel(level) => {
            droid.secondary.attack_level = level;
            if level == AttackLevel::Never {
                let order = droid.order.kind();
                if order == OrderKind::Attack {
                    order_droid(world, env, droid, OrderKind::Stop);
                    if droid.is_vtol() {
                        move_to_rearm(world, env, droid);
                    }
                } else if order == OrderKind::Guard && droid.action.kind.is_attacking() {
                    action_droid(world, env, droid, ActionKind::None);
                } else if order == OrderKind::Patrol {
                    let back = droid.action.pos;
                    action_droid_loc(world, env, droid, ActionKind::ReturnToPos, back);
                }
            }
        }
        SecondaryState::Flag(on) => match kind {
            SecondaryKind::Recycle => set_recycle(world, env, droid, on),
            SecondaryKind::Patrol => droid.secondary.patrol = on,
            SecondaryKind::Circle => droid.secondary.circle = on,
            _ => {}
        },
        SecondaryState::HaltType(halt) => {
            droid.secondary.halt = halt;
            match halt {
                HaltType::Pursue => {
                    if droid.order.kind() == OrderKind::Guard {
                        order_droid(world, env, droid, OrderKind::Stop);
                    }
                }
                HaltType::Guard => {
                    let here = droid.pos;
                    order_droid_loc(world, env, droid, OrderKind::Guard, here);
                }
                HaltType::Hold => {
                    if droid.order.kind() != OrderKind::FireSupport {
                        order_droid(world, env, droid, OrderKind::Stop);
                    }
                }
            }
        }
        SecondaryState::ReturnToLoc(rtl) => applied = set_return_to_loc(world, env, droid, rtl),
    }
    applied
}

fn set_recycle(world: &mut World, env: &mut Environment, droid: &mut Droid, on: bool) {
    if on {
        if droid.order.kind() != OrderKind::Recycle {
            order_droid(world, env, droid, OrderKind::Recycle);
        }
        droid.secondary.return_to_loc = ReturnToLoc::None;
        droid.secondary.recycle = true;
        droid.secondary.halt = HaltType::Guard;
        droid.group = None;
        if droid.is_commander() {
            for member in world.group_members(droid.id) {
                world.with_droid(member, |world, other| {
                    other.commander = None;
                    order_droid(world, env, other, OrderKind::Stop);
                });
            }
        } else {
            droid.commander = None;
        }
    } else {
        if droid.order.kind() == OrderKind::Recycle {
            order_droid(world, env, droid, OrderKind::Stop);
        }
        droid.secondary.recycle = false;
    }
}

fn set_return_to_loc(world: &mut World, env: &mut Environment, droid: &mut Droid, rtl: ReturnToLoc) -> bool {
    if rtl == ReturnToLoc::None {
        if matches!(
            droid.order.kind(),
            OrderKind::Rtr | OrderKind::Rtb | OrderKind::Embark
        ) {
            order_droid(world, env, droid, OrderKind::Stop);
        }
        droid.secondary.return_to_loc = ReturnToLoc::None;
        return true;
    }

    droid.secondary.return_to_loc = ReturnToLoc::None;
    if droid.secondary.halt == HaltType::Hold {
        droid.secondary.halt = HaltType::Guard;
    }
    let order = match rtl {
        ReturnToLoc::Repair => OrderKind::Rtr,
        ReturnToLoc::Base => OrderKind::Rtb,
        ReturnToLoc::Transport => {
            let Some(transport) = world.find_transporter(droid.player) else {
                return false;
            };
            droid.secondary.return_to_loc = ReturnToLoc::Transport;
            if droid.order.kind() != OrderKind::Embark {
                order_droid_obj(world, env, droid, OrderKind::Embark, transport);
            }
            return true;
        }
        ReturnToLoc::None => OrderKind::None,
    };
    droid.secondary.return_to_loc = rtl;
    if droid.order.kind() != order {
        order_droid(world, env, droid, order);
    }
    true
}

/// Apply a toggle to every droid of a numeric group that differs from it.
pub fn secondary_set_group_state(
    world: &mut World,
    env: &mut Environment,
    player: PlayerId,
    group: u8,
    kind: SecondaryKind,
    state: SecondaryState,
) {
    let members = world.droid_ids_matching(|d| d.player == player && d.group == Some(group));
    for id in members {
        world.with_droid(id, |world, droid| {
            if secondary_get_state(droid, kind) != state {
                secondary_set_state(world, env, droid, kind, state);
            }
        });
    }
}

/// Most common stored value of a toggle across a numeric group.
///
/// Ties go to the value seen first in update order.
#[must_use]
pub fn secondary_average_group_state(
    world: &World,
    player: PlayerId,
    group: u8,
    kind: SecondaryKind,
) -> Option<SecondaryState> {
    let mut counts: Vec<(SecondaryState, usize)> = Vec::new();
    for id in world.droid_ids_matching(|d| d.player == player && d.group == Some(group)) {
        let Some(droid) = world.droid(id) else {
            continue;
        };
        let state = droid.secondary.get(kind);
        match counts.iter_mut().find(|(s, _)| *s == state) {
            Some((_, n)) => *n += 1,
            None => counts.push((state, 1)),
        }
    }
    let mut best: Option<(SecondaryState, usize)> = None;
    for (state, n) in counts {
        if best.map_or(true, |(_, m)| n > m) {
            best = Some((state, n));
        }
    }
    best.map(|(state, _)| state)
}

/// Make every member of a numeric group share the group's majority stance.
pub fn secondary_set_average_group_state(world: &mut World, env: &mut Environment, player: PlayerId, group: u8) {
    for kind in [
        SecondaryKind::AttackRange,
        SecondaryKind::RepairLevel,
        SecondaryKind::AttackLevel,
        SecondaryKind::HaltType,
    ] {
        if let Some(state) = secondary_average_group_state(world, player, group, kind) {
            secondary_set_group_state(world, env, player, group, kind, state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let orders = SecondaryOrders::default();
        assert_eq!(orders.attack_level, AttackLevel::Always);
        assert_eq!(orders.halt, HaltType::Guard);
        assert_eq!(orders.repair_level, RepairLevel::Never);
        assert!(orders.repair_threshold().is_none());
    }

    #[test]
    fn test_repair_thresholds_are_inverted() {
        let mut orders = SecondaryOrders::default();
        orders.repair_level = RepairLevel::Low;
        assert_eq!(orders.repair_threshold(), Some(REPAIRLEV_HIGH));
        orders.repair_level = RepairLevel::High;
        assert_eq!(orders.repair_threshold(), Some(REPAIRLEV_LOW));
    }

    #[test]
    fn test_store_and_get() {
        let mut orders = SecondaryOrders::default();
        orders.store(SecondaryKind::Patrol, SecondaryState::Flag(true));
        orders.store(SecondaryKind::AttackRange, SecondaryState::AttackRange(AttackRange::Long));
        assert_eq!(orders.get(SecondaryKind::Patrol), SecondaryState::Flag(true));
        assert_eq!(
            orders.get(SecondaryKind::AttackRange),
            SecondaryState::AttackRange(AttackRange::Long)
        );
    }

    #[test]
    fn test_mismatched_value_is_ignored() {
        let mut orders = SecondaryOrders::default();
        orders.store(SecondaryKind::HaltType, SecondaryState::Flag(true));
        assert_eq!(orders.halt, HaltType::Guard);
        assert!(!SecondaryState::Flag(true).fits(SecondaryKind::HaltType));
        assert!(SecondaryState::Flag(true).fits(SecondaryKind::Circle));
    }
}
