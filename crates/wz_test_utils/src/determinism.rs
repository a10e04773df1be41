//! Determinism testing utilities.
//!
//! Provides a harness for verifying that the simulation
//! produces identical results given identical inputs.
//!
//! # Testing Strategy
//!
//! The kernel must be 100% deterministic for lockstep multiplayer and
//! replays. Sources of non-determinism include:
//!
//! - **Floating-point math**: positions and speeds are fixed-point via
//!   [`wz_core::math::Fixed`].
//!
//! - **HashMap iteration order**: objects live in ordered maps and are
//!   updated in id order.
//!
//! - **System randomness**: tie-breaks draw from the world's seeded
//!   generator only.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::thread;

use wz_core::simulation::Simulation;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of ticks simulated.
    pub ticks: u64,
}

impl DeterminismResult {
    /// Get all unique hashes (should be 1 for deterministic simulation).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that the simulation was deterministic, with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if the simulation produced different hashes across runs.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Simulation is non-deterministic!\n\
                 Runs: {}\n\
                 Ticks: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run a simulation multiple times and verify determinism.
///
/// # Arguments
///
/// * `runs` - Number of times to run the simulation
/// * `ticks` - Number of ticks to simulate per run
/// * `setup` - Function to create initial simulation state
/// * `step` - Function to advance simulation by one tick
/// * `hash` - Function to compute state hash
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    ticks: u64,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S, u64),
    HashFn: Fn(&S) -> u64,
{
    let mut hashes = Vec::with_capacity(runs);

    for _ in 0..runs {
        let mut state = setup();

        for tick in 0..ticks {
            step(&mut state, tick);
        }

        hashes.push(hash(&state));
    }

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);

    DeterminismResult {
        is_deterministic,
        hashes,
        ticks,
    }
}

/// Run a simulation twice from the same setup and compare final hashes.
pub fn verify_simulation_determinism<F>(setup_fn: F, num_ticks: u64) -> bool
where
    F: Fn() -> Simulation,
{
    verify_determinism(
        2,
        num_ticks,
        &setup_fn,
        |sim, _| {
            sim.tick();
        },
        Simulation::state_hash,
    )
    .is_deterministic
}

/// Run N simulations on scoped threads and collect their final hashes.
///
/// Catches state that leaks between runs through globals or thread-local
/// storage.
///
/// # Panics
///
/// Panics if a simulation thread panics.
pub fn run_parallel_simulations<F>(setup_fn: F, num_sims: usize, num_ticks: u64) -> DeterminismResult
where
    F: Fn() -> Simulation + Sync,
{
    let hashes: Vec<u64> = thread::scope(|s| {
        let handles: Vec<_> = (0..num_sims)
            .map(|_| {
                s.spawn(|| {
                    let mut sim = setup_fn();
                    for _ in 0..num_ticks {
                        sim.tick();
                    }
                    sim.state_hash()
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().expect("simulation thread panicked"))
            .collect()
    });

    DeterminismResult {
        is_deterministic: hashes.windows(2).all(|w| w[0] == w[1]),
        hashes,
        ticks: num_ticks,
    }
}

/// Compare two simulation runs tick-by-tick, finding first divergence.
///
/// # Returns
///
/// `None` if simulations are deterministic, `Some(tick)` if they diverge
/// at that tick.
pub fn find_first_divergence<F>(setup_fn: F, num_ticks: u64) -> Option<u64>
where
    F: Fn() -> Simulation,
{
    let mut sim1 = setup_fn();
    let mut sim2 = setup_fn();

    if sim1.state_hash() != sim2.state_hash() {
        return Some(0);
    }

    for tick in 1..=num_ticks {
        sim1.tick();
        sim2.tick();

        if sim1.state_hash() != sim2.state_hash() {
            return Some(tick);
        }
    }

    None
}

/// Verify that a save/restore round trip keeps the simulation on the same
/// track, both immediately and after `after` further ticks.
pub fn verify_serialization_determinism<F, E>(setup_fn: F, env_fn: E, num_ticks: u64, after: u64) -> bool
where
    F: Fn() -> Simulation,
    E: Fn() -> wz_core::environment::Environment,
{
    let mut sim = setup_fn();
    for _ in 0..num_ticks {
        sim.tick();
    }

    let Ok(bytes) = sim.serialize() else {
        return false;
    };
    let Ok(mut restored) = Simulation::deserialize(&bytes, env_fn()) else {
        return false;
    };
    if restored.state_hash() != sim.state_hash() {
        return false;
    }

    for _ in 0..after {
        sim.tick();
        restored.tick();
    }
    restored.state_hash() == sim.state_hash()
}

/// Compute a simple hash for any hashable value.
pub fn compute_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Proptest strategies for kernel inputs.
pub mod strategies {
    use proptest::prelude::*;
    use wz_core::math::{TilePos, Vec2Fixed, TILE_UNITS};
    use wz_core::order::{OrderKind, OrderRequest};

    /// A world position on a map of `tiles` × `tiles` tiles.
    pub fn arb_position(tiles: i32) -> impl Strategy<Value = Vec2Fixed> {
        let max = tiles * TILE_UNITS - 1;
        (0..max, 0..max).prop_map(|(x, y)| Vec2Fixed::from_ints(x, y))
    }

    /// A tile on a map of `tiles` × `tiles` tiles.
    pub fn arb_tile(tiles: i32) -> impl Strategy<Value = TilePos> {
        (0..tiles, 0..tiles).prop_map(|(x, y)| TilePos::new(x, y))
    }

    /// A query or influence radius between a quarter tile and four tiles.
    pub fn arb_radius() -> impl Strategy<Value = i32> {
        (TILE_UNITS / 4)..(4 * TILE_UNITS)
    }

    /// A location order droids of every category accept.
    pub fn arb_location_order(tiles: i32) -> impl Strategy<Value = OrderRequest> {
        (
            prop_oneof![Just(OrderKind::Move), Just(OrderKind::Scout)],
            arb_tile(tiles),
        )
            .prop_map(|(kind, tile)| OrderRequest::loc(kind, tile.center()))
    }

    /// A sequence of location orders.
    pub fn arb_order_sequence(tiles: i32, max_len: usize) -> impl Strategy<Value = Vec<OrderRequest>> {
        proptest::collection::vec(arb_location_order(tiles), 0..max_len)
    }
}
