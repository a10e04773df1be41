//! End-to-end scenarios for wz_core.
//!
//! Each test drives a small world through the public simulation API and
//! checks what the order, action and movement layers agreed on.

use wz_core::prelude::*;
use wz_test_utils::fixtures::{
    constructor, pos, tank, tank_with_range, vtol, RecordingCombat, ScenarioBuilder, ScriptedPathfinder,
};

fn fixed(n: i32) -> Fixed {
    Fixed::from_num(n)
}

fn fast_tank() -> DroidTemplate {
    DroidTemplate {
        propulsion: PropulsionStats {
            kind: PropulsionKind::Wheeled,
            max_speed: 1000,
        },
        ..tank()
    }
}

// =============================================================================
// Movement
// =============================================================================

mod movement {
    use super::*;

    #[test]
    fn test_simple_move_arrives_and_stops() {
        let mut scenario = ScenarioBuilder::new(48, 48)
            .droid_at(0, fast_tank(), pos(1000, 1000))
            .build();
        let id = scenario.droids[0];
        let dest = pos(5000, 1000);

        let outcome = scenario
            .sim
            .issue_order(id, &OrderRequest::loc(OrderKind::Move, dest), false)
            .unwrap();
        assert_eq!(outcome, OrderOutcome::Accepted);

        let ticks = scenario.run_until(400, |sim| {
            sim.world()
                .droid(id)
                .is_some_and(|d| d.movement.status == MoveStatus::Inactive && d.pos.distance(dest) < fixed(128))
        });
        assert!(ticks.is_some(), "droid never settled at its destination");
        assert!(scenario.droid(id).pos.distance(dest) < fixed(128));
    }

    #[test]
    fn test_pending_route_is_followed_once_ready() {
        let mut scenario = ScenarioBuilder::new(32, 32)
            .pathfinder(ScriptedPathfinder::straight().then(PathResult::Pending))
            .droid(0, tank(), TilePos::new(4, 4))
            .build();
        let id = scenario.droids[0];
        let dest = TilePos::new(12, 4).center();

        scenario
            .sim
            .issue_order(id, &OrderRequest::loc(OrderKind::Move, dest), false)
            .unwrap();
        assert_eq!(scenario.droid(id).movement.status, MoveStatus::WaitRoute);

        scenario.run(300);
        assert!(scenario.droid(id).pos.distance(dest) < fixed(128));
    }

    #[test]
    fn test_unreachable_destination_is_refused() {
        let mut scenario = ScenarioBuilder::new(32, 32)
            .pathfinder(ScriptedPathfinder::unreachable())
            .droid(0, tank(), TilePos::new(4, 4))
            .build();
        let id = scenario.droids[0];

        let outcome = scenario
            .sim
            .issue_order(id, &OrderRequest::loc(OrderKind::Move, TilePos::new(20, 20).center()), false)
            .unwrap();
        assert_eq!(outcome, OrderOutcome::Rejected(RejectReason::Unreachable));
        assert_eq!(scenario.sim.current_order_name(id).unwrap(), "DORDER_NONE");
    }
}

// =============================================================================
// Combat
// =============================================================================

mod combat {
    use super::*;

    #[test]
    fn test_attack_out_of_range_closes_then_fires() {
        let combat = RecordingCombat::new(1);
        let shots = combat.log();
        let mut scenario = ScenarioBuilder::new(48, 48)
            .combat(combat)
            .droid_at(0, tank_with_range(300), pos(1000, 1000))
            .droid_at(1, DroidTemplate::default(), pos(2000, 1000))
            .build();
        let (attacker, target) = (scenario.droids[0], scenario.droids[1]);

        scenario
            .sim
            .issue_order(attacker, &OrderRequest::obj(OrderKind::AttackTarget, target), false)
            .unwrap();
        // Assignment only starts a plain move towards the target. The switch
        // to MoveToAttack waits for the next order update, one tick later,
        // rather than happening as the order is given.
        assert_eq!(scenario.droid(attacker).action.kind, ActionKind::Move);

        // The target is in sight, so the order layer turns the approach into an attack.
        scenario.run(1);
        assert_eq!(scenario.droid(attacker).action.kind, ActionKind::MoveToAttack);
        assert_eq!(scenario.droid(attacker).action.target(), Some(target));

        let ticks = scenario.run_until(400, |sim| {
            sim.world()
                .droid(attacker)
                .is_some_and(|d| d.action.kind == ActionKind::Attack)
        });
        assert!(ticks.is_some(), "attacker never got in range");
        let d = scenario.droid(attacker);
        assert!(d.pos.distance(pos(2000, 1000)) <= fixed(300 + 128));

        scenario.run(50);
        let shots = shots.lock().unwrap();
        assert!(shots.iter().any(|&(firer, _, hit)| firer == attacker && hit == target));
    }

    #[test]
    fn test_dead_target_is_pruned() {
        let mut scenario = ScenarioBuilder::new(32, 32)
            .droid(0, tank(), TilePos::new(4, 4))
            .droid(1, DroidTemplate::default(), TilePos::new(7, 4))
            .build();
        let (attacker, target) = (scenario.droids[0], scenario.droids[1]);

        scenario
            .sim
            .issue_order(attacker, &OrderRequest::obj(OrderKind::AttackTarget, target), false)
            .unwrap();
        scenario.run(3);
        assert_eq!(scenario.droid(attacker).order.target(), Some(target));

        scenario.sim.destroy_object(target).unwrap();
        scenario.run(2);

        let d = scenario.droid(attacker);
        assert_eq!(d.order.target(), None);
        assert_ne!(d.order.kind(), OrderKind::AttackTarget);
        assert_ne!(d.action.target(), Some(target));
        assert!(scenario.sim.world().droid(target).is_none());
    }

    #[test]
    fn test_allies_are_not_engaged() {
        let mut scenario = ScenarioBuilder::new(32, 32)
            .alliance(0, 1)
            .droid(0, tank(), TilePos::new(4, 4))
            .droid(1, DroidTemplate::default(), TilePos::new(6, 4))
            .build();
        let id = scenario.droids[0];

        scenario.run(10);
        assert!(!scenario.droid(id).action.kind.is_attacking());
    }
}

// =============================================================================
// Orders
// =============================================================================

mod orders {
    use super::*;

    #[test]
    fn test_build_module_runs_as_build() {
        let mut scenario = ScenarioBuilder::new(32, 32)
            .structure(0, StructureKind::Factory, TilePos::new(10, 10))
            .droid(0, constructor(), TilePos::new(6, 10))
            .build();
        let (id, factory) = (scenario.droids[0], scenario.structures[0]);

        let outcome = scenario
            .sim
            .issue_order(id, &OrderRequest::obj(OrderKind::BuildModule, factory), false)
            .unwrap();
        assert!(outcome.is_ok());
        assert_eq!(scenario.sim.current_order_name(id).unwrap(), "DORDER_BUILD");

        scenario.run(5);
        assert_ne!(scenario.droid(id).order.kind(), OrderKind::BuildModule);
    }

    #[test]
    fn test_stop_supersedes_build() {
        let mut scenario = ScenarioBuilder::new(48, 48)
            .droid(0, constructor(), TilePos::new(4, 4))
            .build();
        let id = scenario.droids[0];
        let site = TilePos::new(30, 30).center();

        let outcome = scenario
            .sim
            .issue_order(
                id,
                &OrderRequest::build(StructureTemplate::single_tile(StructureKind::Factory), site, 0),
                false,
            )
            .unwrap();
        assert!(outcome.is_ok());
        assert_eq!(scenario.droid(id).action.kind, ActionKind::MoveToBuild);

        scenario.run(5);
        scenario
            .sim
            .issue_order(id, &OrderRequest::new(OrderKind::Stop), false)
            .unwrap();

        let d = scenario.droid(id);
        assert_eq!(d.action.kind, ActionKind::None);
        assert_eq!(d.movement.status, MoveStatus::Inactive);
        assert!(d.movement.path.is_empty());
        assert_eq!(d.movement.path_index, 0);
        assert_eq!(scenario.sim.current_order_name(id).unwrap(), "DORDER_NONE");

        scenario.run(1);
        let d = scenario.droid(id);
        assert_eq!(d.action.kind, ActionKind::None);
        assert_eq!(d.movement.status, MoveStatus::Inactive);
        assert!(d.movement.path.is_empty());
    }

    #[test]
    fn test_queued_orders_run_in_order() {
        let mut scenario = ScenarioBuilder::new(48, 48)
            .droid_at(0, fast_tank(), pos(1000, 1000))
            .build();
        let id = scenario.droids[0];
        let stops = [pos(2000, 1000), pos(2000, 2000), pos(1000, 2000)];

        let first = scenario
            .sim
            .issue_order(id, &OrderRequest::loc(OrderKind::Move, stops[0]), false)
            .unwrap();
        assert_eq!(first, OrderOutcome::Accepted);
        for stop in &stops[1..] {
            let queued = scenario
                .sim
                .issue_order(id, &OrderRequest::loc(OrderKind::Move, *stop), true)
                .unwrap();
            assert_eq!(queued, OrderOutcome::Queued);
        }
        assert_eq!(scenario.droid(id).order_queue.len(), 2);

        let mut visited: Vec<Vec2Fixed> = Vec::new();
        for _ in 0..1500 {
            let d = scenario.droid(id);
            if d.order.kind() == OrderKind::Move {
                if let Some(p) = d.order.pos() {
                    if visited.last() != Some(&p) {
                        visited.push(p);
                    }
                }
            }
            scenario.sim.tick();
        }
        assert_eq!(visited, stops.to_vec());
        assert!(scenario.droid(id).order_queue.is_empty());
        assert!(scenario.droid(id).pos.distance(stops[2]) < fixed(128));
    }

    #[test]
    fn test_new_order_clears_queue() {
        let mut scenario = ScenarioBuilder::new(48, 48)
            .droid(0, tank(), TilePos::new(4, 4))
            .build();
        let id = scenario.droids[0];

        scenario
            .sim
            .issue_order(id, &OrderRequest::loc(OrderKind::Move, TilePos::new(20, 4).center()), false)
            .unwrap();
        scenario
            .sim
            .issue_order(id, &OrderRequest::loc(OrderKind::Move, TilePos::new(20, 20).center()), true)
            .unwrap();
        assert_eq!(scenario.droid(id).order_queue.len(), 1);

        scenario
            .sim
            .issue_order(id, &OrderRequest::loc(OrderKind::Scout, TilePos::new(4, 20).center()), false)
            .unwrap();
        assert!(scenario.droid(id).order_queue.is_empty());
        assert_eq!(scenario.sim.current_order_name(id).unwrap(), "DORDER_SCOUT");
    }

    #[test]
    fn test_queueing_dead_target_is_rejected() {
        let mut scenario = ScenarioBuilder::new(32, 32)
            .droid(0, tank(), TilePos::new(4, 4))
            .droid(1, DroidTemplate::default(), TilePos::new(9, 9))
            .build();
        let (id, victim) = (scenario.droids[0], scenario.droids[1]);
        scenario
            .sim
            .issue_order(id, &OrderRequest::loc(OrderKind::Move, TilePos::new(20, 4).center()), false)
            .unwrap();
        scenario.sim.destroy_object(victim).unwrap();

        let outcome = scenario
            .sim
            .issue_order(id, &OrderRequest::obj(OrderKind::AttackTarget, victim), true)
            .unwrap();
        assert_eq!(outcome, OrderOutcome::Rejected(RejectReason::DeadTarget));
        assert!(scenario.droid(id).order_queue.is_empty());
    }
}

// =============================================================================
// Repair
// =============================================================================

mod repair {
    use super::*;

    fn damage(scenario: &mut wz_test_utils::fixtures::Scenario, id: ObjectId) {
        if let Some(d) = scenario.sim.world_mut().droid_mut(id) {
            d.body = d.original_body / 4;
        }
    }

    #[test]
    fn test_facility_overload_serves_one_at_a_time() {
        let mut builder = ScenarioBuilder::new(48, 48).structure(0, StructureKind::RepairFacility, TilePos::new(24, 24));
        for i in 0..10 {
            builder = builder.droid(0, tank(), TilePos::new(10 + i * 2, 10));
        }
        let mut scenario = builder.build();
        let facility = scenario.structures[0];
        let droids = scenario.droids.clone();

        for &id in &droids {
            damage(&mut scenario, id);
            let outcome = scenario
                .sim
                .issue_order(id, &OrderRequest::new(OrderKind::Rtr), false)
                .unwrap();
            assert!(outcome.is_ok());
            assert_eq!(scenario.droid(id).order.target(), Some(facility));
        }

        for _ in 0..200 {
            scenario.sim.tick();
            let in_service = scenario
                .sim
                .world()
                .droids()
                .filter(|d| matches!(d.action.kind, ActionKind::MoveToRepairPoint | ActionKind::WaitDuringRepair))
                .count();
            assert!(in_service <= 1, "{in_service} droids serviced at once");
        }
    }

    #[test]
    fn test_rtr_spreads_over_nearby_facilities() {
        let mut builder = ScenarioBuilder::new(48, 48)
            .seed(17)
            .structure(0, StructureKind::RepairFacility, TilePos::new(20, 30))
            .structure(0, StructureKind::RepairFacility, TilePos::new(22, 30));
        for i in 0..20 {
            builder = builder.droid(0, tank(), TilePos::new(10 + i, 10));
        }
        let mut scenario = builder.build();
        let (a, b) = (scenario.structures[0], scenario.structures[1]);
        let droids = scenario.droids.clone();

        let mut picks = (0, 0);
        for &id in &droids {
            damage(&mut scenario, id);
            scenario
                .sim
                .issue_order(id, &OrderRequest::new(OrderKind::Rtr), false)
                .unwrap();
            match scenario.droid(id).order.target() {
                Some(t) if t == a => picks.0 += 1,
                Some(t) if t == b => picks.1 += 1,
                other => panic!("unexpected repair target {other:?}"),
            }
        }
        assert!(picks.0 > 0 && picks.1 > 0, "picks were {picks:?}");
    }

    #[test]
    fn test_repair_picks_are_uniform_within_suitable_area() {
        use wz_core::repair::decide_where_to_repair;

        // Three facilities near each other, a fourth far beyond the
        // suitable area around the closest one.
        let mut scenario = ScenarioBuilder::new(48, 48)
            .seed(99)
            .structure(0, StructureKind::RepairFacility, TilePos::new(20, 30))
            .structure(0, StructureKind::RepairFacility, TilePos::new(22, 30))
            .structure(0, StructureKind::RepairFacility, TilePos::new(24, 30))
            .structure(0, StructureKind::RepairFacility, TilePos::new(42, 30))
            .droid(0, tank(), TilePos::new(5, 30))
            .build();
        let id = scenario.droids[0];
        damage(&mut scenario, id);
        let droid = scenario.droid(id).clone();
        let near = &scenario.structures[..3];
        let far = scenario.structures[3];

        let area = i64::from(scenario.sim.world().tuning.repair_area());
        let far_pos = scenario.sim.world().structure(far).unwrap().pos;
        let closest_pos = scenario.sim.world().structure(near[0]).unwrap().pos;
        assert!(far_pos.distance_squared(closest_pos) > area * area);

        let trials = 900;
        let mut counts = [0usize; 3];
        for _ in 0..trials {
            let provider = decide_where_to_repair(scenario.sim.world_mut(), &droid).unwrap();
            assert!(provider.facility);
            assert_ne!(provider.id, far, "facility outside the suitable area was picked");
            let slot = near.iter().position(|&f| f == provider.id).unwrap();
            counts[slot] += 1;
        }

        let expected = trials / near.len();
        let tolerance = expected / 5;
        for (slot, &count) in counts.iter().enumerate() {
            assert!(
                count.abs_diff(expected) <= tolerance,
                "facility {slot} picked {count} times out of {trials}: {counts:?}"
            );
        }
    }

    #[test]
    fn test_rtr_without_provider_returns_to_base() {
        let mut scenario = ScenarioBuilder::new(32, 32)
            .structure(0, StructureKind::Hq, TilePos::new(20, 20))
            .droid(0, tank(), TilePos::new(4, 4))
            .build();
        let id = scenario.droids[0];
        damage(&mut scenario, id);

        scenario
            .sim
            .issue_order(id, &OrderRequest::new(OrderKind::Rtr), false)
            .unwrap();
        assert_eq!(scenario.sim.current_order_name(id).unwrap(), "DORDER_RTB");
    }
}

// =============================================================================
// VTOLs
// =============================================================================

mod vtols {
    use super::*;

    #[test]
    fn test_empty_vtol_heads_for_pad() {
        let mut scenario = ScenarioBuilder::new(48, 48)
            .structure(0, StructureKind::RearmPad, TilePos::new(30, 30))
            .droid(0, vtol(1), TilePos::new(6, 6))
            .droid(1, DroidTemplate::default(), TilePos::new(12, 6))
            .build();
        let (pad, id, enemy) = (scenario.structures[0], scenario.droids[0], scenario.droids[1]);
        if let Some(d) = scenario.sim.world_mut().droid_mut(id) {
            d.weapons[0].used_ammo = 1;
        }
        assert!(scenario.droid(id).vtol_empty());

        scenario
            .sim
            .issue_order(id, &OrderRequest::obj(OrderKind::AttackTarget, enemy), false)
            .unwrap();
        scenario.run(2);

        let d = scenario.droid(id);
        assert!(
            matches!(
                d.action.kind,
                ActionKind::MoveToRearm
                    | ActionKind::WaitForRearm
                    | ActionKind::MoveToRearmPoint
                    | ActionKind::WaitDuringRearm
            ),
            "action was {:?}",
            d.action.kind
        );
        assert_eq!(d.base_structure, Some(pad));
    }

    #[test]
    fn test_rtr_sends_vtol_to_rearm() {
        let mut scenario = ScenarioBuilder::new(48, 48)
            .structure(0, StructureKind::RearmPad, TilePos::new(30, 30))
            .droid(0, vtol(2), TilePos::new(6, 6))
            .build();
        let (pad, id) = (scenario.structures[0], scenario.droids[0]);

        scenario
            .sim
            .issue_order(id, &OrderRequest::new(OrderKind::Rtr), false)
            .unwrap();
        let d = scenario.droid(id);
        assert_eq!(d.order.kind(), OrderKind::Rearm);
        assert_eq!(d.order.target(), Some(pad));
        assert_eq!(d.action.kind, ActionKind::MoveToRearm);
    }

    #[test]
    fn test_vtol_without_pad_returns_to_base() {
        let mut scenario = ScenarioBuilder::new(48, 48)
            .structure(0, StructureKind::Hq, TilePos::new(30, 30))
            .droid(0, vtol(1), TilePos::new(6, 6))
            .build();
        let id = scenario.droids[0];

        scenario
            .sim
            .issue_order(id, &OrderRequest::new(OrderKind::Rtr), false)
            .unwrap();
        assert_eq!(scenario.sim.current_order_name(id).unwrap(), "DORDER_RTB");
    }
}
