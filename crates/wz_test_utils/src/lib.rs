//! # WZ Test Utilities
//!
//! Shared testing utilities for the kernel crates:
//! - Determinism test harness
//! - Fixture collaborators (terrain, pathfinder, combat)
//! - Scenario builder and droid templates
//! - Property-based testing strategies

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod determinism;
pub mod fixtures;

/// Re-export proptest for convenience.
pub use proptest;
