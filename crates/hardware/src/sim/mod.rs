//! Simulation layer.
//!
//! Wires a [`crate::core::Proc`] to the backing memory, loads program
//! images and drives the cycle loop.

/// ELF and flat-image loading.
pub mod loader;
/// The cycle-loop driver.
pub mod simulator;
