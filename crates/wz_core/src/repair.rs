//! Repair arbitration and repair facilities.
//!
//! Damaged droids pick a repair provider with [`decide_where_to_repair`],
//! which spreads them over every provider near the closest one instead of
//! piling onto a single facility. Facilities then pick whom to service
//! next with [`find_someone_to_repair`] and heal that droid each tick in
//! [`update_repair_facility`].

use tracing::{debug, trace};

use crate::action::{action_droid, action_droid_obj_loc, ActionKind};
use crate::droid::Droid;
use crate::environment::Environment;
use crate::math::Vec2Fixed;
use crate::object::ObjectId;
use crate::order::{order_droid_obj, Order, OrderKind};
use crate::secondary::ReturnToLoc;
use crate::structure::{StructureFunction, StructureKind};
use crate::world::{TickEvent, World};

/// Somewhere a damaged droid can get repaired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepairProvider {
    /// Facility or repair droid.
    pub id: ObjectId,
    /// Where it stands.
    pub pos: Vec2Fixed,
    /// True for a repair facility, false for a repair droid.
    pub facility: bool,
}

fn rtr_target(droid: &Droid) -> Option<ObjectId> {
    match droid.order.kind() {
        OrderKind::Rtr | OrderKind::RtrSpecified => droid.order.target(),
        _ => None,
    }
}

/// Every repair provider the droid's player owns.
fn providers(world: &World, droid: &Droid) -> Vec<RepairProvider> {
    let facilities = world
        .structures()
        .filter(|s| {
            s.died.is_none() && s.player == droid.player && s.kind == StructureKind::RepairFacility && s.is_built()
        })
        .map(|s| RepairProvider {
            id: s.id,
            pos: s.pos,
            facility: true,
        });
    let medics = world
        .droids()
        .filter(|d| {
            d.died.is_none() && d.id != droid.id && d.player == droid.player && d.is_repairer() && rtr_target(d).is_none()
        })
        .map(|d| RepairProvider {
            id: d.id,
            pos: d.pos,
            facility: false,
        });
    facilities.chain(medics).collect()
}

/// Pick a repair provider for `droid`.
///
/// The closest provider defines a suitable area of
/// [`Tuning::repair_area`](crate::config::Tuning::repair_area) around it.
/// A facility inside that area is always preferred over a repair droid; among
/// providers of the preferred kind one is picked at random from the shared
/// generator. Returns `None` if the player has no provider at all.
pub fn decide_where_to_repair(world: &mut World, droid: &Droid) -> Option<RepairProvider> {
    let all = providers(world, droid);
    let closest = all
        .iter()
        .min_by_key(|p| (droid.pos.distance_squared(p.pos), p.id))
        .copied()?;
    let area = i64::from(world.tuning.repair_area());
    let area_sq = area * area;
    let nearby: Vec<RepairProvider> = all
        .into_iter()
        .filter(|p| p.pos.distance_squared(closest.pos) <= area_sq)
        .collect();
    let facilities: Vec<RepairProvider> = nearby.iter().filter(|p| p.facility).copied().collect();
    let pool = if facilities.is_empty() { nearby } else { facilities };
    let pick = world.rng.index(pool.len())?;
    let chosen = pool[pick];
    trace!(droid = droid.id.0, provider = chosen.id.0, candidates = pool.len(), "repair provider chosen");
    Some(chosen)
}

/// Priority of a repair candidate; lower is served first.
type RepairRank = (u8, u8, i64, ObjectId);

/// The droid a repair facility should service next.
///
/// Own droids come before allied ones. Within each side, droids waiting
/// on an RTR to this facility come first (the farthest first, so stragglers
/// are not starved), then droids waiting for another facility, then idle
/// damaged droids in service range, nearest first.
#[must_use]
pub fn find_someone_to_repair(world: &World, facility: ObjectId) -> Option<ObjectId> {
    let fac = world.structure(facility)?;
    let (owner, pos) = (fac.player, fac.pos);
    let service = i64::from(world.tuning.facility_service_radius);
    let wait = i64::from(world.tuning.rtr_wait_dist);

    let mut best: Option<RepairRank> = None;
    for d in world.droids() {
        if d.died.is_some() || d.is_vtol() || d.body >= d.original_body || !world.allied(d.player, owner) {
            continue;
        }
        let dist = d.pos.distance_squared(pos);
        let waiting = d.action.kind == ActionKind::WaitForRepair;
        let target = rtr_target(d);
        let rank = if target == Some(facility) && waiting {
            (0, -dist)
        } else if waiting
            && dist <= wait * wait
            && target.is_some_and(|t| world.structure(t).is_some_and(|s| s.kind == StructureKind::RepairFacility))
        {
            (1, dist)
        } else if target.is_none()
            && d.is_stopped()
            && dist <= service * service
            && matches!(d.order.kind(), OrderKind::None | OrderKind::TempHold)
        {
            (2, dist)
        } else {
            continue;
        };
        let key = (u8::from(d.player != owner), rank.0, rank.1, d.id);
        if best.map_or(true, |b| key < b) {
            best = Some(key);
        }
    }
    best.map(|(_, _, _, id)| id)
}

/// Send a repaired droid back to work: to its commander if it has one,
/// otherwise to idle.
pub fn release_repaired(world: &mut World, env: &mut Environment, droid: &mut Droid) {
    droid.secondary.return_to_loc = ReturnToLoc::None;
    let commander = droid
        .commander
        .filter(|c| *c != droid.id && !droid.is_commander() && world.is_alive(*c));
    debug!(droid = droid.id.0, "repair finished");
    match commander {
        Some(commander) => order_droid_obj(world, env, droid, OrderKind::Guard, commander),
        None => {
            droid.order = Order::None;
            action_droid(world, env, droid, ActionKind::None);
        }
    }
}

fn set_patient(world: &mut World, facility: ObjectId, next: Option<ObjectId>) {
    if let Some(s) = world.structure_mut(facility) {
        if let StructureFunction::RepairFacility {
            patient, started, points, ..
        } = &mut s.function
        {
            *patient = next;
            *started = None;
            *points = 0;
        }
    }
}

/// Release droids that queued for this facility but are already healthy.
fn release_healthy_waiters(world: &mut World, env: &mut Environment, facility: ObjectId) {
    let healthy = world.droid_ids_matching(|d| {
        d.died.is_none()
            && rtr_target(d) == Some(facility)
            && d.action.kind == ActionKind::WaitForRepair
            && d.body >= d.original_body
    });
    for id in healthy {
        world.with_droid(id, |w, d| release_repaired(w, env, d));
    }
}

/// One tick of a repair facility.
///
/// A facility without a valid patient calls the next one onto its repair
/// point. A patient that has arrived is healed at the facility's rate and
/// released when whole.
pub fn update_repair_facility(world: &mut World, env: &mut Environment, id: ObjectId) {
    let Some((pos, patient, rate, started, points)) = world
        .structure(id)
        .filter(|s| s.died.is_none() && s.is_built())
        .and_then(|s| match s.function {
            StructureFunction::RepairFacility {
                patient,
                repair_rate,
                started,
                points,
            } => Some((s.pos, patient, repair_rate, started, points)),
            _ => None,
        })
    else {
        return;
    };

    release_healthy_waiters(world, env, id);

    let patient = patient.filter(|p| {
        world
            .droid(*p)
            .is_some_and(|d| d.died.is_none() && rtr_target(d) == Some(id))
    });
    let Some(patient) = patient else {
        let next = find_someone_to_repair(world, id);
        set_patient(world, id, next);
        if let Some(next) = next {
            debug!(facility = id.0, droid = next.0, "calling droid to repair point");
            world.with_droid(next, |w, d| {
                if rtr_target(d) != Some(id) {
                    d.order = Order::RtrSpecified {
                        target: Some(id),
                        pos,
                    };
                }
                action_droid_obj_loc(w, env, d, ActionKind::MoveToRepairPoint, id, pos);
            });
        }
        return;
    };

    let service = i64::from(world.tuning.facility_service_radius);
    let ready = world.droid(patient).is_some_and(|d| {
        d.action.kind == ActionKind::WaitDuringRepair && d.pos.distance_squared(pos) <= service * service
    });
    if !ready {
        return;
    }

    let now = world.time_ms;
    let started = started.unwrap_or(now);
    let total = u64::from(rate) * now.saturating_sub(started) / 1000;
    let total = u32::try_from(total).unwrap_or(u32::MAX);
    let due = total.saturating_sub(points);
    let mut healed = false;
    if let Some(d) = world.droid_mut(patient) {
        let add = due.min(d.original_body.saturating_sub(d.body));
        d.body += add;
        healed = d.body >= d.original_body;
    }
    if let Some(s) = world.structure_mut(id) {
        if let StructureFunction::RepairFacility {
            started: s_started,
            points: s_points,
            ..
        } = &mut s.function
        {
            *s_started = Some(started);
            *s_points = total;
        }
    }
    if !healed {
        return;
    }

    set_patient(world, id, None);
    world.events.push(TickEvent::Repaired { droid: patient, by: id });
    world.with_droid(patient, |w, d| release_repaired(w, env, d));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Tuning;
    use crate::droid::{BodySize, DroidCategory, DroidTemplate, PropulsionKind, PropulsionStats};
    use crate::math::TilePos;
    use crate::structure::{Structure, StructureStatus, StructureTemplate};

    fn template(category: DroidCategory) -> DroidTemplate {
        DroidTemplate {
            category,
            body_size: BodySize::Light,
            propulsion: PropulsionStats {
                kind: PropulsionKind::Wheeled,
                max_speed: 400,
            },
            body: 100,
            weapons: vec![],
            sensor_range: 1024,
            construct_points: 0,
            repair_points: 20,
        }
    }

    fn facility(world: &mut World, id: u32, tile: TilePos) -> ObjectId {
        world.insert_structure(Structure::new(
            ObjectId(id),
            0,
            &StructureTemplate::single_tile(StructureKind::RepairFacility),
            tile.center(),
            StructureStatus::Built,
        ))
    }

    fn damaged(id: u32, player: u8, tile: TilePos) -> Droid {
        let mut d = Droid::new(ObjectId(id), player, &template(DroidCategory::Weapon), tile.center());
        d.body = 40;
        d
    }

    fn setup() -> (World, Environment) {
        (World::new(21, Tuning::default(), (64, 64)), Environment::flat(64, 64))
    }

    #[test]
    fn test_no_provider_means_none() {
        let (mut world, _) = setup();
        let droid = damaged(1, 0, TilePos::new(5, 5));
        assert_eq!(decide_where_to_repair(&mut world, &droid), None);
    }

    #[test]
    fn test_facility_preferred_over_repair_droid() {
        let (mut world, _) = setup();
        world.insert_droid(Droid::new(
            ObjectId(2),
            0,
            &template(DroidCategory::Repair),
            TilePos::new(6, 5).center(),
        ));
        facility(&mut world, 3, TilePos::new(8, 5));
        let droid = damaged(1, 0, TilePos::new(5, 5));
        for _ in 0..10 {
            let p = decide_where_to_repair(&mut world, &droid).expect("provider");
            assert_eq!(p.id, ObjectId(3));
            assert!(p.facility);
        }
    }

    #[test]
    fn test_load_balances_between_nearby_facilities() {
        let (mut world, _) = setup();
        facility(&mut world, 2, TilePos::new(10, 10));
        facility(&mut world, 3, TilePos::new(12, 10));
        facility(&mut world, 4, TilePos::new(60, 60));
        let droid = damaged(1, 0, TilePos::new(9, 10));
        let mut hits = [0u32; 2];
        for _ in 0..200 {
            match decide_where_to_repair(&mut world, &droid).map(|p| p.id) {
                Some(ObjectId(2)) => hits[0] += 1,
                Some(ObjectId(3)) => hits[1] += 1,
                other => panic!("unexpected provider {other:?}"),
            }
        }
        assert!(hits[0] > 60 && hits[1] > 60, "skewed picks {hits:?}");
    }

    #[test]
    fn test_rtr_waiters_before_idle_droids() {
        let (mut world, _) = setup();
        let fac = facility(&mut world, 10, TilePos::new(10, 10));
        world.insert_droid(damaged(1, 0, TilePos::new(11, 10)));
        let mut waiter = damaged(2, 0, TilePos::new(14, 10));
        waiter.order = Order::Rtr {
            target: Some(fac),
            pos: TilePos::new(10, 10).center(),
        };
        waiter.action.kind = ActionKind::WaitForRepair;
        world.insert_droid(waiter);
        let mut closer = damaged(3, 0, TilePos::new(12, 10));
        closer.order = Order::Rtr {
            target: Some(fac),
            pos: TilePos::new(10, 10).center(),
        };
        closer.action.kind = ActionKind::WaitForRepair;
        world.insert_droid(closer);
        assert_eq!(find_someone_to_repair(&world, fac), Some(ObjectId(2)));
    }

    #[test]
    fn test_own_droids_before_allies() {
        let (mut world, _) = setup();
        world.set_alliance(0, 1, true);
        let fac = facility(&mut world, 10, TilePos::new(10, 10));
        world.insert_droid(damaged(1, 1, TilePos::new(11, 10)));
        world.insert_droid(damaged(2, 0, TilePos::new(11, 11)));
        assert_eq!(find_someone_to_repair(&world, fac), Some(ObjectId(2)));
    }

    #[test]
    fn test_facility_heals_and_releases_patient() {
        let (mut world, mut env) = setup();
        let fac = facility(&mut world, 10, TilePos::new(10, 10));
        let mut patient = damaged(1, 0, TilePos::new(11, 10));
        patient.order = Order::Rtr {
            target: Some(fac),
            pos: TilePos::new(10, 10).center(),
        };
        patient.action.kind = ActionKind::WaitForRepair;
        world.insert_droid(patient);

        update_repair_facility(&mut world, &mut env, fac);
        assert_eq!(world.structure(fac).and_then(|s| s.facility_patient()), Some(ObjectId(1)));
        assert_eq!(
            world.droid(ObjectId(1)).map(|d| d.action.kind),
            Some(ActionKind::MoveToRepairPoint)
        );
        if let Some(d) = world.droid_mut(ObjectId(1)) {
            d.action.kind = ActionKind::WaitDuringRepair;
        }

        for _ in 0..20 {
            world.time_ms += 100;
            update_repair_facility(&mut world, &mut env, fac);
        }
        let d = world.droid(ObjectId(1)).expect("patient");
        assert_eq!(d.body, d.original_body);
        assert_eq!(d.order, Order::None);
        assert!(world.events.contains(&TickEvent::Repaired {
            droid: ObjectId(1),
            by: fac
        }));
        assert_eq!(world.structure(fac).and_then(|s| s.facility_patient()), None);
    }
}
