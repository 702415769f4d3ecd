//! Cycle-level model of the River 64-bit RISC-V processor.
//!
//! This crate implements one RISC-V hart as a set of synchronous state
//! machines that advance in discrete cycles, together with its L1 cache
//! subsystem:
//! 1. **Core:** fetch, two-slice decode (with the compressed-instruction
//!    recoder), execute with functional units and the AMO sub-machine,
//!    queue-backed memory access, write-back arbitration, and a tag-based
//!    integer/FP register file.
//! 2. **Privilege:** the full CSR machine (trap entry/return, delegation,
//!    counters, PMP update pipeline, fence orchestration) and the debug
//!    port with program-buffer execution and a stack-trace ring.
//! 3. **Memory:** per-direction MMUs (Sv39/Sv48 walker + TLB), PMP/PMA
//!    region checks, LRU write-back D-cache with snoop coherence and
//!    LR/SC reservations, a coupled-tag I-cache, and the L1 request
//!    arbiter.
//! 4. **Simulation:** a `Simulator` that wires the hart to a backing
//!    memory, an ELF/flat-image loader, and run statistics.

/// Common types and constants (exceptions, cache lines, bus encodings).
pub mod common;
/// Model configuration (defaults, hierarchical config structures).
pub mod config;
/// The processor core: pipeline stages, register file, CSRs, MMU, debug.
pub mod core;
/// The L1 cache subsystem: I-/D-caches, tag memory, PMP/PMA, arbiter.
pub mod cache;
/// Simulation: `Simulator`, binary loader.
pub mod sim;
/// Backing memory model speaking the cacheline-wide bus protocol.
pub mod soc;
/// Run statistics collection and reporting.
pub mod stats;

/// Root configuration type; use `Config::default()` or deserialize from JSON.
pub use crate::config::Config;
/// The hart: owns every pipeline and cache component, advanced by `tick`.
pub use crate::core::Proc;
/// Top-level simulator; owns the hart and the backing memory side-by-side.
pub use crate::sim::simulator::Simulator;
