//! Work actions: building, demolishing, repairing, restoring and clearing.
//!
//! Every work action accrues points from the game time elapsed since it
//! started, `rate * elapsed / 1000`, and applies only the difference to
//! what it already applied. Rounding therefore never loses points across
//! ticks.

use tracing::{debug, trace};

use super::{set_kind, ActionKind};
use crate::droid::Droid;
use crate::environment::Environment;
use crate::math::TilePos;
use crate::object::ObjectId;
use crate::order::{cancel_build, Order, OrderKind};
use crate::structure::{FeatureKind, Structure, StructureKind, StructureStatus};
use crate::world::{TickEvent, World};

/// Demolition and wreck clearing run this much faster than building.
const TEARDOWN_FACTOR: u32 = 5;

/// Points a `rate`-per-second worker has earned since `started`.
fn points_earned(rate: u32, started: u64, now: u64) -> u32 {
    let total = u64::from(rate) * now.saturating_sub(started) / 1000;
    u32::try_from(total).unwrap_or(u32::MAX)
}

/// Points to apply this tick, recording the running total on the droid.
fn take_points(world: &World, droid: &mut Droid, rate: u32) -> u32 {
    let total = points_earned(rate, droid.action.started, world.time_ms);
    let add = total.saturating_sub(droid.action.points);
    droid.action.points = total;
    add
}

/// Reset the work clock of the droid's current action.
pub fn start_work(world: &World, droid: &mut Droid) {
    droid.action.started = world.time_ms;
    droid.action.points = 0;
}

/// Live oil resource on a tile.
#[must_use]
pub fn oil_at(world: &World, tile: TilePos) -> Option<ObjectId> {
    world
        .features()
        .find(|f| f.kind == FeatureKind::OilResource && f.died.is_none() && TilePos::of(f.pos) == tile)
        .map(|f| f.id)
}

/// True if a fire burns on the oil resource at `tile`.
#[must_use]
pub fn oil_burning(world: &World, tile: TilePos) -> bool {
    oil_at(world, tile)
        .and_then(|id| world.feature(id))
        .is_some_and(|f| f.is_burning(world.time_ms))
}

/// Lay the foundation of a new structure, or join an existing one.
///
/// Returns false if building cannot start; the build is then cancelled or
/// the target is gone.
pub fn start_build(world: &mut World, env: &mut Environment, droid: &mut Droid) -> bool {
    let new_site =
        matches!(droid.order.kind(), OrderKind::Build | OrderKind::LineBuild) && droid.order.target().is_none();

    let id = if new_site {
        let (Some(template), Some(pos)) = (droid.order.template().cloned(), droid.order.pos()) else {
            cancel_build(world, env, droid);
            return false;
        };
        let tile = TilePos::of(pos);
        if template.kind == StructureKind::ResourceExtractor && oil_burning(world, tile) {
            debug!(droid = droid.id.0, "oil is burning, cannot build");
            cancel_build(world, env, droid);
            return false;
        }
        if template.kind == StructureKind::ResourceExtractor {
            if let Some(oil) = oil_at(world, tile) {
                world.destroy(oil);
            }
        }
        let id = world.allocate_id();
        world.insert_structure(Structure::new(id, droid.player, &template, pos, StructureStatus::BeingBuilt));
        debug!(droid = droid.id.0, structure = id.0, kind = ?template.kind, "foundation laid");
        id
    } else {
        let Some(id) = droid.order.target().or_else(|| droid.action.target()) else {
            return false;
        };
        if !world.is_alive(id) {
            return false;
        }
        set_up_build_module(world, droid, id);
        id
    };

    let Some((built, owner)) = world.structure(id).map(|s| (s.is_built(), s.player)) else {
        return false;
    };
    if !built && world.allied(owner, droid.player) {
        start_work(world, droid);
        droid.order.set_target(Some(id));
        droid.action.set_target(0, Some(id));
    }
    true
}

/// Reopen a finished factory for its next module when the build order
/// carries a module of the same kind.
fn set_up_build_module(world: &mut World, droid: &Droid, id: ObjectId) {
    let Order::Build { template, .. } = &droid.order else {
        return;
    };
    let Some(s) = world.structure_mut(id) else {
        return;
    };
    if !s.is_built() || s.kind != template.kind || !s.kind.is_factory() {
        return;
    }
    s.status = StructureStatus::BeingBuilt;
    s.modules = s.modules.saturating_add(1);
    s.build_points = 0;
    s.build_points_required = template.build_points.max(1);
    debug!(structure = id.0, modules = s.modules, "module started");
}

/// Add build points to a structure, finishing it when complete.
fn structure_build(world: &mut World, id: ObjectId, by: ObjectId, add: u32) {
    let Some(s) = world.structure_mut(id) else {
        return;
    };
    let required = s.build_points_required.max(1);
    s.build_points = s.build_points.saturating_add(add).min(required);
    let share = u64::from(s.max_body) * u64::from(s.build_points) / u64::from(required);
    s.body = s.body.max(u32::try_from(share).unwrap_or(s.max_body));
    if s.build_points < required {
        return;
    }
    s.status = StructureStatus::Built;
    debug!(structure = id.0, by = by.0, "structure built");
    world.events.push(TickEvent::StructureBuilt { structure: id, by });
}

/// One tick of construction. Returns true while building continues.
pub fn update_build(world: &mut World, env: &mut Environment, droid: &mut Droid) -> bool {
    let Some(id) = droid.order.target() else {
        return false;
    };
    let Some((built, owner)) = world
        .structure(id)
        .filter(|s| s.died.is_none())
        .map(|s| (s.is_built(), s.player))
    else {
        return false;
    };

    if built {
        let line_done = match &droid.order {
            Order::LineBuild { pos, end, .. } => TilePos::of(*pos) == TilePos::of(*end),
            _ => true,
        };
        if line_done {
            cancel_build(world, env, droid);
        } else {
            // Let the line build order pick the next tile.
            set_kind(droid, ActionKind::None);
            droid.order.set_target(None);
            droid.action.clear_targets();
        }
        return false;
    }
    if !world.allied(owner, droid.player) {
        cancel_build(world, env, droid);
        return false;
    }

    let add = take_points(world, droid, droid.construct_points);
    if add > 0 {
        structure_build(world, id, droid.id, add);
    }
    true
}

/// One tick of demolition. Returns true while the structure stands.
pub fn update_demolish(world: &mut World, droid: &mut Droid) -> bool {
    let Some(id) = droid.order.target().or_else(|| droid.action.target()) else {
        return false;
    };
    if !world.is_alive(id) {
        return false;
    }
    let add = take_points(world, droid, droid.construct_points * TEARDOWN_FACTOR);
    let Some(s) = world.structure_mut(id) else {
        return false;
    };
    s.build_points = s.build_points.saturating_sub(add);
    if s.build_points > 0 {
        return true;
    }
    debug!(structure = id.0, by = droid.id.0, "structure demolished");
    world.destroy(id);
    false
}

/// One tick of structure repair. Returns true while damage remains.
pub fn update_repair(world: &mut World, droid: &mut Droid) -> bool {
    let Some(id) = droid.action.target() else {
        return false;
    };
    if !world.is_alive(id) {
        return false;
    }
    let add = take_points(world, droid, droid.construct_points);
    let Some(s) = world.structure_mut(id) else {
        return false;
    };
    s.body = s.body.saturating_add(add).min(s.max_body);
    s.is_damaged()
}

/// One tick of resistance restoration. Returns true until fully restored.
pub fn update_restore(world: &mut World, droid: &mut Droid) -> bool {
    let Some(id) = droid.order.target().or_else(|| droid.action.target()) else {
        return false;
    };
    if !world.is_alive(id) {
        return false;
    }
    let add = take_points(world, droid, world.tuning.restore_rate);
    let Some(s) = world.structure_mut(id) else {
        return false;
    };
    s.resistance = s.resistance.saturating_add(add).min(s.max_resistance);
    if s.resistance < s.max_resistance {
        return true;
    }
    trace!(structure = id.0, "resistance restored");
    false
}

/// One tick of wreck clearing. Returns true while the wreck remains.
pub fn update_clear_wreck(world: &mut World, droid: &mut Droid) -> bool {
    let Some(id) = droid.action.target().or_else(|| droid.order.target()) else {
        return false;
    };
    if !world.is_alive(id) {
        return false;
    }
    let add = take_points(world, droid, droid.construct_points * TEARDOWN_FACTOR);
    let Some(f) = world.feature_mut(id) else {
        return false;
    };
    f.body = f.body.saturating_sub(add);
    if f.body > 0 {
        return true;
    }
    debug!(feature = id.0, by = droid.id.0, "wreck cleared");
    world.destroy(id);
    false
}

/// Nearest wreck within constructor reach of the droid.
#[must_use]
pub fn check_for_wreckage(world: &World, droid: &Droid) -> Option<ObjectId> {
    let reach = world.tuning.construct_max_dist;
    let reach_sq = i64::from(reach) * i64::from(reach);
    world
        .grid
        .query(droid.pos, reach)
        .into_iter()
        .filter_map(|id| world.feature(id))
        .filter(|f| f.kind == FeatureKind::Wreck && f.died.is_none())
        .map(|f| (droid.pos.distance_squared(f.pos), f.id))
        .filter(|(d, _)| *d <= reach_sq)
        .min()
        .map(|(_, id)| id)
}

fn heal(patient: &mut Droid, amount: u32) -> (u32, bool) {
    let added = amount.min(patient.original_body.saturating_sub(patient.body));
    patient.body += added;
    (added, patient.body < patient.original_body)
}

/// One tick of droid repair. Returns true while the patient is damaged.
///
/// A repair droid may be its own patient.
pub fn update_droid_repair(world: &mut World, droid: &mut Droid) -> bool {
    let Some(patient) = droid.action.target() else {
        return false;
    };
    let total = points_earned(droid.repair_points, droid.action.started, world.time_ms);
    let due = total.saturating_sub(droid.action.points);
    let (added, damaged) = if patient == droid.id {
        heal(droid, due)
    } else {
        match world.droid_mut(patient).filter(|p| p.died.is_none()) {
            Some(p) => heal(p, due),
            None => return false,
        }
    };
    droid.action.points += added;
    if !damaged && added > 0 {
        debug!(droid = patient.0, by = droid.id.0, "droid repaired");
        world.events.push(TickEvent::Repaired { droid: patient, by: droid.id });
    }
    damaged
}

/// Damaged ground repairers fix themselves.
pub fn self_repair(world: &World, droid: &mut Droid) {
    if droid.is_vtol() || droid.repair_points == 0 || droid.body >= droid.original_body {
        return;
    }
    set_kind(droid, ActionKind::DroidRepair);
    droid.action.set_target(0, Some(droid.id));
    start_work(world, droid);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Tuning;
    use crate::droid::{BodySize, DroidCategory, DroidTemplate, PropulsionKind, PropulsionStats};
    use crate::math::Vec2Fixed;
    use crate::object::PlayerId;
    use crate::structure::{Feature, StructureTemplate};

    fn truck(id: u32, player: PlayerId, tile: TilePos) -> Droid {
        let template = DroidTemplate {
            category: DroidCategory::Construct,
            body_size: BodySize::Light,
            propulsion: PropulsionStats {
                kind: PropulsionKind::Wheeled,
                max_speed: 400,
            },
            body: 100,
            weapons: vec![],
            sensor_range: 1024,
            construct_points: 100,
            repair_points: 50,
        };
        Droid::new(ObjectId(id), player, &template, tile.center())
    }

    fn setup() -> (World, Environment) {
        (World::new(5, Tuning::default(), (32, 32)), Environment::flat(32, 32))
    }

    fn tower() -> StructureTemplate {
        StructureTemplate {
            build_points: 200,
            ..StructureTemplate::single_tile(StructureKind::Defense)
        }
    }

    fn build_order(template: StructureTemplate, tile: TilePos) -> Order {
        Order::Build {
            template,
            pos: tile.center(),
            direction: 0,
            target: None,
        }
    }

    #[test]
    fn test_points_accrue_without_rounding_loss() {
        assert_eq!(points_earned(15, 0, 100), 1);
        assert_eq!(points_earned(15, 0, 200), 3);
        assert_eq!(points_earned(15, 500, 100), 0);
    }

    #[test]
    fn test_build_runs_to_completion() {
        let (mut world, mut env) = setup();
        let mut droid = truck(1, 0, TilePos::new(4, 5));
        droid.order = build_order(tower(), TilePos::new(5, 5));
        droid.action.kind = ActionKind::Build;
        assert!(start_build(&mut world, &mut env, &mut droid));
        let site = droid.order.target().expect("foundation");
        assert_eq!(world.structure(site).map(|s| s.status), Some(StructureStatus::BeingBuilt));

        let mut ticks = 0;
        while update_build(&mut world, &mut env, &mut droid) {
            world.time_ms += 100;
            ticks += 1;
            assert!(ticks < 100, "build never finished");
        }
        assert!(world.structure(site).is_some_and(Structure::is_built));
        assert!(world.events.contains(&TickEvent::StructureBuilt {
            structure: site,
            by: ObjectId(1)
        }));
        assert_eq!(droid.order, Order::None);
        assert_eq!(droid.action.kind, ActionKind::None);
    }

    #[test]
    fn test_burning_oil_cancels_derrick() {
        let (mut world, mut env) = setup();
        let tile = TilePos::new(8, 8);
        let oil = world.allocate_id();
        let mut feature = Feature::new(oil, FeatureKind::OilResource, tile.center());
        feature.burning_until = Some(60_000);
        world.insert_feature(feature);
        let mut droid = truck(1, 0, TilePos::new(7, 8));
        droid.order = build_order(StructureTemplate::single_tile(StructureKind::ResourceExtractor), tile);
        assert!(!start_build(&mut world, &mut env, &mut droid));
        assert_eq!(droid.order, Order::None);
        assert!(world.is_alive(oil));

        if let Some(f) = world.feature_mut(oil) {
            f.burning_until = None;
        }
        droid.order = build_order(StructureTemplate::single_tile(StructureKind::ResourceExtractor), tile);
        assert!(start_build(&mut world, &mut env, &mut droid));
        assert!(!world.is_alive(oil));
    }

    #[test]
    fn test_module_reopens_factory() {
        let (mut world, mut env) = setup();
        let template = StructureTemplate {
            width: 2,
            breadth: 2,
            ..StructureTemplate::single_tile(StructureKind::Factory)
        };
        let id = world.allocate_id();
        world.insert_structure(Structure::new(
            id,
            0,
            &template,
            Vec2Fixed::from_ints(1280, 1280),
            StructureStatus::Built,
        ));
        let mut droid = truck(1, 0, TilePos::new(8, 10));
        droid.order = Order::Build {
            template,
            pos: Vec2Fixed::from_ints(1280, 1280),
            direction: 0,
            target: Some(id),
        };
        assert!(start_build(&mut world, &mut env, &mut droid));
        let s = world.structure(id).expect("factory");
        assert_eq!(s.modules, 1);
        assert_eq!(s.status, StructureStatus::BeingBuilt);
        assert_eq!(droid.action.target(), Some(id));
    }

    #[test]
    fn test_demolish_removes_structure() {
        let (mut world, _) = setup();
        let id = world.allocate_id();
        world.insert_structure(Structure::new(
            id,
            0,
            &tower(),
            TilePos::new(5, 5).center(),
            StructureStatus::Built,
        ));
        let mut droid = truck(1, 0, TilePos::new(4, 5));
        droid.order = Order::Demolish {
            target: Some(id),
            pos: TilePos::new(5, 5).center(),
        };
        let mut ticks = 0;
        while update_demolish(&mut world, &mut droid) {
            world.time_ms += 100;
            ticks += 1;
            assert!(ticks < 50);
        }
        assert!(!world.is_alive(id));
    }

    #[test]
    fn test_droid_repair_heals_and_reports() {
        let (mut world, _) = setup();
        let mut patient = truck(2, 0, TilePos::new(3, 3));
        patient.body = 90;
        world.insert_droid(patient);
        let mut medic = truck(1, 0, TilePos::new(3, 4));
        medic.action.set_target(0, Some(ObjectId(2)));
        world.time_ms = 100;
        assert!(update_droid_repair(&mut world, &mut medic));
        world.time_ms = 1000;
        assert!(!update_droid_repair(&mut world, &mut medic));
        assert_eq!(world.droid(ObjectId(2)).map(|d| d.body), Some(100));
        assert_eq!(medic.action.points, 10);
        assert!(world.events.contains(&TickEvent::Repaired {
            droid: ObjectId(2),
            by: ObjectId(1)
        }));
    }

    #[test]
    fn test_self_repair_targets_self() {
        let (world, _) = setup();
        let mut medic = truck(1, 0, TilePos::new(3, 4));
        medic.body = 50;
        self_repair(&world, &mut medic);
        assert_eq!(medic.action.kind, ActionKind::DroidRepair);
        assert_eq!(medic.action.target(), Some(ObjectId(1)));
    }

    #[test]
    fn test_wreckage_search_picks_nearest() {
        let (mut world, _) = setup();
        let near = world.allocate_id();
        world.insert_feature(Feature::new(near, FeatureKind::Wreck, TilePos::new(6, 5).center()));
        let far = world.allocate_id();
        world.insert_feature(Feature::new(far, FeatureKind::Wreck, TilePos::new(9, 5).center()));
        let droid = truck(1, 0, TilePos::new(5, 5));
        assert_eq!(check_for_wreckage(&world, &droid), Some(near));
        let lonely = truck(2, 0, TilePos::new(30, 30));
        assert_eq!(check_for_wreckage(&world, &lonely), None);
    }
}
