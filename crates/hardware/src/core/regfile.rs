//! Integer and floating-point register file with write tags.
//!
//! This module implements the unified register file of the hart:
//! 1. **Storage:** 32 integer registers plus 32 FP registers addressed by
//!    the upper half of the 6-bit register namespace.
//! 2. **Invariant enforcement:** register `x0` reads as zero and ignores
//!    writes.
//! 3. **Hazard tags:** each register carries a small wrap-around write
//!    tag. Execute increments its private copy of the tag when it issues
//!    a producer; the write port commits the value together with that
//!    tag, and a consumer detects an outstanding write by comparing tags.

use crate::common::{FPUREGS_OFFSET, REGS_TOTAL};
use crate::config::defaults::REG_TAG_WIDTH;

/// Mask applied to tag arithmetic so the counters wrap.
pub const TAG_MASK: u8 = (1 << REG_TAG_WIDTH) - 1;

/// One register entry: the value and the tag of its last committed write.
#[derive(Clone, Copy, Default)]
struct RegEntry {
    val: u64,
    tag: u8,
}

/// A register-file write request.
#[derive(Clone, Copy, Debug, Default)]
pub struct RegWrite {
    /// Unified register index (0-63).
    pub addr: usize,
    /// Value to commit.
    pub data: u64,
    /// Tag captured at issue time; stale tags are dropped.
    pub tag: u8,
}

/// Unified integer + FP register file.
pub struct RegFile {
    regs: [RegEntry; REGS_TOTAL],
}

impl RegFile {
    /// Creates a register file with all registers and tags cleared.
    pub fn new() -> Self {
        Self {
            regs: [RegEntry::default(); REGS_TOTAL],
        }
    }

    /// Reads a register; index 0 is hard-wired to zero.
    pub fn read(&self, addr: usize) -> u64 {
        if addr == 0 { 0 } else { self.regs[addr].val }
    }

    /// Reads an FP register by its 5-bit index.
    pub fn read_f(&self, idx: usize) -> u64 {
        self.regs[FPUREGS_OFFSET + idx].val
    }

    /// Returns the tag of the last committed write to `addr`.
    pub fn tag(&self, addr: usize) -> u8 {
        self.regs[addr].tag
    }

    /// Commits a write.
    ///
    /// Writes to `x0` are dropped. A write whose tag equals the current
    /// tag is a stale duplicate (the producer was squashed and re-issued)
    /// and is dropped as well.
    pub fn write(&mut self, w: &RegWrite) {
        if w.addr == 0 || w.addr >= REGS_TOTAL {
            return;
        }
        if self.regs[w.addr].tag == w.tag {
            return;
        }
        self.regs[w.addr] = RegEntry {
            val: w.data,
            tag: w.tag,
        };
    }

    /// Debug-port write: sets a register directly without touching tags.
    pub fn dport_write(&mut self, addr: usize, val: u64) {
        if addr != 0 && addr < REGS_TOTAL {
            self.regs[addr].val = val;
        }
    }

    /// Debug-port read.
    pub fn dport_read(&self, addr: usize) -> u64 {
        if addr == 0 || addr >= REGS_TOTAL {
            0
        } else {
            self.regs[addr].val
        }
    }

    /// Snapshot of every committed tag, used by Execute to resynchronise
    /// its issue counters after a pipeline flush.
    pub fn tags(&self) -> [u8; REGS_TOTAL] {
        let mut out = [0u8; REGS_TOTAL];
        for (i, e) in self.regs.iter().enumerate() {
            out[i] = e.tag;
        }
        out
    }
}

impl Default for RegFile {
    fn default() -> Self {
        Self::new()
    }
}
