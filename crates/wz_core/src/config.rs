//! Gameplay tuning.
//!
//! Every magic number the order, action and movement layers consult lives
//! in [`Tuning`]. The defaults reproduce the classic game balance; a RON
//! document can override any subset of them.
//!
//! Distances are world units (`128` per tile), times are milliseconds,
//! angles are whole degrees and speeds are world units per second.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};
use crate::math::{Fixed, TILE_UNITS};

/// Tunable constants for the kernel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tuning {
    /// Simulated milliseconds per tick.
    pub tick_ms: u32,

    // Movement blocking and shuffling.
    /// Time a droid may be stuck before its route is recomputed.
    pub block_time: u32,
    /// Time a shuffling droid may be stuck before giving up.
    pub shuffle_block_time: u32,
    /// Pause length after bumping into a stationary obstacle.
    pub block_pause_time: u32,
    /// Time after a pause before the droid tries again.
    pub block_pause_release: u32,
    /// Movement that clears the bump record.
    pub block_dist: i32,
    /// Facing change that clears the bump record.
    pub block_dir_degrees: i32,
    /// Maximum duration of a shuffle.
    pub shuffle_time: u32,
    /// Radius in which other droids block a shuffle direction.
    pub shuffle_dist: i32,
    /// Length of a shuffle step.
    pub shuffle_move: i32,
    /// Radius for obstacle avoidance.
    pub avoid_dist: i32,
    /// Largest object radius considered for collisions.
    pub obj_max_radius: i32,

    // Speed shaping.
    /// Speed floor while braking towards the final waypoint.
    pub min_end_speed: i32,
    /// Range from the final waypoint where braking starts.
    pub end_speed_range: i32,
    /// How long after firing a non fire-on-move weapon the droid stays put.
    pub fire_on_move_pause: u32,
    /// Pitch at which ground speed drops to the floor.
    pub max_speed_pitch_degrees: i32,
    /// Speed floor applied on steep slopes.
    pub min_pitch_speed: i32,
    /// Maximum nose-down pitch change per second.
    pub pitch_limit_degrees: i32,

    // VTOL flight.
    /// Lowest cruise height above terrain.
    pub vtol_height_min: i32,
    /// Level cruise height above terrain.
    pub vtol_height_level: i32,
    /// Highest cruise height above terrain.
    pub vtol_height_max: i32,
    /// Minimum vertical speed.
    pub vtol_min_vertical_speed: i32,
    /// Distance flown past the target on an attack run.
    pub vtol_attack_length: i32,
    /// Sideways offset of the attack run.
    pub vtol_attack_width: i32,
    /// Distance at which the attack run waypoint is considered reached.
    pub vtol_attack_target_dist: i32,
    /// VTOL turret arc either side of the nose.
    pub vtol_turret_limit_degrees: i32,
    /// Facing tolerance for bombs and other non-turning VTOL weapons.
    pub vtol_bomb_tolerance_degrees: i32,
    /// Spiral search radius (tiles) for free landing tiles.
    pub vtol_landing_radius: i32,

    // Turrets.
    /// Weapon weight at which turret rotation rate halves.
    pub heavy_weapon_weight: u32,
    /// Base turret rotation rate.
    pub turret_rotation_rate_degrees: i32,
    /// Facing tolerance for fixed (non-turreted) weapons.
    pub fixed_turret_dir_degrees: i32,
    /// Cosmetic pitch band for repair turrets, lower bound.
    pub repair_pitch_lower_degrees: i32,
    /// Cosmetic pitch band for repair turrets, upper bound.
    pub repair_pitch_upper_degrees: i32,

    // Actions.
    /// Distance (tiles) a direct-fire droid backs off when inside min range.
    pub pull_back_dist_tiles: i32,
    /// Delay before a self-destruct goes off.
    pub destruct_time: u32,
    /// Minimum sulk time after a route failure.
    pub min_sulk_time: u32,
    /// Maximum sulk time after a route failure.
    pub max_sulk_time: u32,

    // Orders.
    /// Time a broken droid runs before stopping.
    pub run_time: u32,
    /// Time a burning droid runs before dying.
    pub run_burn_time: u32,
    /// Range at which repair droids start repairing.
    pub repair_range: i32,
    /// Range idle repair droids search for patients.
    pub repair_max_dist: i32,
    /// Range guarding droids chase targets.
    pub defend_max_dist: i32,
    /// Range guarding droids return to their post from.
    pub defend_base_dist: i32,
    /// Chase range for droids guarding a commander.
    pub defend_cmd_max_dist: i32,
    /// Return range for droids guarding a commander.
    pub defend_cmd_base_dist: i32,
    /// Range idle constructors search for damaged structures.
    pub construct_max_dist: i32,
    /// Scouts stop to fight targets inside this range.
    pub scout_dist: i32,
    /// Scouts and patrols return to their route beyond this range.
    pub scout_attack_dist: i32,
    /// Radius of the circle order orbit.
    pub circle_radius: i32,
    /// Angle step of the circle order per waypoint.
    pub circle_step_degrees: i32,
    /// Beyond this distance a circling VTOL returns to its centre.
    pub circle_leash: i32,
    /// RTR droids this close to a facility wait for repair.
    pub rtr_wait_dist: i32,
    /// Multiple of the repair range forming the load-balancing area.
    pub repair_area_multiplier: i32,
    /// Droids this close to a repair facility are serviced by it.
    pub facility_service_radius: i32,
    /// Body points per second a rearm pad restores on a landed VTOL.
    pub vtol_repair_rate: u32,
    /// Resistance points per second restored by an electronic droid.
    pub restore_rate: u32,

    // Spatial grid.
    /// Grid cell size in tiles.
    pub grid_cell_tiles: i32,
    /// Influence radius of droids in tiles.
    pub droid_grid_range_tiles: i32,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            tick_ms: 100,
            block_time: 6000,
            shuffle_block_time: 2000,
            block_pause_time: 1500,
            block_pause_release: 500,
            block_dist: 64,
            block_dir_degrees: 90,
            shuffle_time: 10_000,
            shuffle_dist: 3 * TILE_UNITS / 2,
            shuffle_move: TILE_UNITS,
            avoid_dist: 2 * TILE_UNITS,
            obj_max_radius: 4 * TILE_UNITS,
            min_end_speed: 60,
            end_speed_range: 3 * TILE_UNITS,
            fire_on_move_pause: 1500,
            max_speed_pitch_degrees: 60,
            min_pitch_speed: 10,
            pitch_limit_degrees: 150,
            vtol_height_min: 250,
            vtol_height_level: 300,
            vtol_height_max: 350,
            vtol_min_vertical_speed: 60,
            vtol_attack_length: 1000,
            vtol_attack_width: 200,
            vtol_attack_target_dist: 400,
            vtol_turret_limit_degrees: 45,
            vtol_bomb_tolerance_degrees: 60,
            vtol_landing_radius: 23,
            heavy_weapon_weight: 50_000,
            turret_rotation_rate_degrees: 45,
            fixed_turret_dir_degrees: 1,
            repair_pitch_lower_degrees: 30,
            repair_pitch_upper_degrees: -15,
            pull_back_dist_tiles: 10,
            destruct_time: 2000,
            min_sulk_time: 1500,
            max_sulk_time: 4000,
            run_time: 8000,
            run_burn_time: 10_000,
            repair_range: 2 * TILE_UNITS,
            repair_max_dist: 5 * TILE_UNITS,
            defend_max_dist: 3 * TILE_UNITS,
            defend_base_dist: 3 * TILE_UNITS,
            defend_cmd_max_dist: 8 * TILE_UNITS,
            defend_cmd_base_dist: 5 * TILE_UNITS,
            construct_max_dist: 8 * TILE_UNITS,
            scout_dist: 8 * TILE_UNITS,
            scout_attack_dist: 5 * TILE_UNITS,
            circle_radius: 1500,
            circle_step_degrees: 30,
            circle_leash: 2000,
            rtr_wait_dist: 8 * TILE_UNITS,
            repair_area_multiplier: 5,
            facility_service_radius: TILE_UNITS * 5 / 2,
            vtol_repair_rate: 10,
            restore_rate: 20,
            grid_cell_tiles: 8,
            droid_grid_range_tiles: 20,
        }
    }
}

impl Tuning {
    /// Parse tuning overrides from a RON document.
    ///
    /// Fields missing from the document keep their default values.
    pub fn from_ron_str(source: &str) -> Result<Self> {
        ron::from_str(source).map_err(|e| SimError::Config(format!("tuning: {e}")))
    }

    /// Amount of a per-second quantity that elapses in one tick.
    #[must_use]
    pub fn per_tick(&self, per_second: Fixed) -> Fixed {
        per_second * Fixed::from_num(self.tick_ms) / Fixed::from_num(1000)
    }

    /// Integer variant of [`Tuning::per_tick`].
    #[must_use]
    pub fn per_tick_i(&self, per_second: i32) -> i32 {
        (i64::from(per_second) * i64::from(self.tick_ms) / 1000) as i32
    }

    /// Radius of the repair load-balancing area.
    #[must_use]
    pub fn repair_area(&self) -> i32 {
        self.repair_range * self.repair_area_multiplier
    }

    /// Grid cell size in world units.
    #[must_use]
    pub fn grid_cell_units(&self) -> i32 {
        self.grid_cell_tiles * TILE_UNITS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_consistent() {
        let tuning = Tuning::default();
        assert!(tuning.vtol_height_min < tuning.vtol_height_level);
        assert!(tuning.vtol_height_level < tuning.vtol_height_max);
        assert!(tuning.min_sulk_time < tuning.max_sulk_time);
        assert!(tuning.defend_base_dist <= tuning.defend_cmd_base_dist);
        assert!(tuning.repair_range < tuning.repair_max_dist);
    }

    #[test]
    fn test_partial_ron_override() {
        let tuning = Tuning::from_ron_str("(tick_ms: 50, repair_area_multiplier: 3)").unwrap();
        assert_eq!(tuning.tick_ms, 50);
        assert_eq!(tuning.repair_area_multiplier, 3);
        assert_eq!(tuning.block_time, Tuning::default().block_time);
    }

    #[test]
    fn test_bad_ron_is_config_error() {
        let err = Tuning::from_ron_str("(tick_ms: \"fast\")").unwrap_err();
        assert!(matches!(err, SimError::Config(_)));
    }

    #[test]
    fn test_per_tick_scaling() {
        let tuning = Tuning::default();
        assert_eq!(tuning.per_tick(Fixed::from_num(1000)), Fixed::from_num(100));
        assert_eq!(tuning.per_tick_i(250), 25);
    }
}
