//! Configuration for the River core model.
//!
//! This module defines the configuration structures and the baseline
//! hardware constants. It provides:
//! 1. **Defaults:** the fixed geometry of the modelled hart (reset vector,
//!    cache shape, predictor depth, TLB and PMP sizes).
//! 2. **Structures:** hierarchical serde-deserializable config for the
//!    core, caches and MMU.
//!
//! Configuration is supplied via JSON or `Config::default()` for the CLI.

use serde::Deserialize;

/// Baseline hardware constants of the modelled core.
///
/// These mirror the generation-time parameters of the hardware design and
/// are used as defaults when a field is not overridden.
pub mod defaults {
    /// Power-on program counter.
    pub const RESET_VECTOR: u64 = 0x10000;

    /// Number of meaningful physical/virtual address bits.
    pub const CPU_ADDR_BITS: u32 = 48;

    /// Branch Target Buffer entries.
    pub const BTB_SIZE: usize = 8;

    /// Branch predictor lookahead depth (speculative fetch addresses).
    pub const BP_DEPTH: usize = 5;

    /// Decoded-instruction history kept by the decoder for the predictor
    /// cross-check (requested/fetching/fetched are tracked by Fetch).
    pub const DEC_DEPTH: usize = BP_DEPTH - 3;

    /// log2 of L1 cache line size in bytes (32 B lines).
    pub const LOG2_L1_BYTES_PER_LINE: u32 = 5;

    /// L1 cache line size in bytes.
    pub const L1_BYTES_PER_LINE: usize = 1 << LOG2_L1_BYTES_PER_LINE as usize;

    /// log2 of the number of D-cache ways.
    pub const DCACHE_WAY_BITS: u32 = 2;

    /// log2 of the number of D-cache lines per way.
    pub const DCACHE_INDEX_BITS: u32 = 7;

    /// log2 of the number of I-cache ways.
    pub const ICACHE_WAY_BITS: u32 = 2;

    /// log2 of the number of I-cache lines per way.
    pub const ICACHE_INDEX_BITS: u32 = 7;

    /// log2 of the TLB entry count (64 entries per MMU direction).
    pub const MMU_TLB_ADDR_BITS: u32 = 6;

    /// Number of TLB entries per MMU direction.
    pub const MMU_TLB_SIZE: usize = 1 << MMU_TLB_ADDR_BITS as usize;

    /// Number of PMP table regions.
    pub const PMP_TBL_SIZE: usize = 8;

    /// Depth of the FIFO between Execute and MemAccess.
    pub const MEMACCESS_QUEUE_DEPTH: usize = 2;

    /// Width of the per-register write tag counters. Must exceed the
    /// number of slots in the Execute-to-MemAccess FIFO.
    pub const REG_TAG_WIDTH: u32 = 3;

    /// Program buffer size in 32-bit words.
    pub const PROGBUF_REG_TOTAL: usize = 16;

    /// Number of `{pc, npc}` pairs in the debug stack-trace buffer.
    pub const STACK_TRACE_BUF_SIZE: usize = 32;

    /// Value reported by `mvendorid`.
    pub const VENDOR_ID: u64 = 0x0000_00F1;

    /// Value reported by `mimpid`.
    pub const IMPLEMENTATION_ID: u64 = 0x2022_0813;
}

/// Geometry of one L1 cache.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// log2 of the number of ways.
    pub way_bits: u32,
    /// log2 of the number of lines per way.
    pub index_bits: u32,
}

impl CacheConfig {
    /// Number of ways.
    pub fn ways(&self) -> usize {
        1 << self.way_bits as usize
    }

    /// Number of line indexes per way.
    pub fn lines(&self) -> usize {
        1 << self.index_bits as usize
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            way_bits: defaults::DCACHE_WAY_BITS,
            index_bits: defaults::DCACHE_INDEX_BITS,
        }
    }
}

/// Top-level configuration of the modelled hart.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Hart index reported by `mhartid`.
    pub hartid: u64,
    /// Power-on program counter.
    pub reset_vector: u64,
    /// Instruction L1 geometry.
    pub icache: CacheConfig,
    /// Data L1 geometry.
    pub dcache: CacheConfig,
    /// Participate in the snoop coherence protocol.
    pub coherence_ena: bool,
    /// Enable the hardware FPU. The shipped configuration keeps the FPU
    /// seam but reports double-precision operations as unimplemented.
    pub fpu_ena: bool,
    /// Keep a retirement log for an external tracer.
    pub tracer_ena: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hartid: 0,
            reset_vector: defaults::RESET_VECTOR,
            icache: CacheConfig {
                way_bits: defaults::ICACHE_WAY_BITS,
                index_bits: defaults::ICACHE_INDEX_BITS,
            },
            dcache: CacheConfig {
                way_bits: defaults::DCACHE_WAY_BITS,
                index_bits: defaults::DCACHE_INDEX_BITS,
            },
            coherence_ena: true,
            fpu_ena: false,
            tracer_ena: false,
        }
    }
}

impl Config {
    /// Parses a configuration from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns the underlying `serde_json` error when the document does
    /// not describe a valid configuration.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
