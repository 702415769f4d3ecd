//! Physical memory protection table.
//!
//! Expanded `{start, end, flags}` regions pushed one per cycle by the
//! CSR block. Each cycle both the instruction and the data address are
//! checked: the table is walked from the highest-priority region (entry
//! 0) down, and the first matching valid region contributes its R/W/X
//! bits. Addresses not covered by any region are permissive only while
//! PMP is inactive (pure M-mode with `MPRV` clear); a locked region is
//! enforced even then.

use crate::config::defaults::PMP_TBL_SIZE;
use crate::core::csr::{PmpWrite, pmp_fl};

/// One expanded region.
#[derive(Clone, Copy, Debug, Default)]
struct PmpRegion {
    start: u64,
    end: u64,
    flags: u8,
}

/// Permissions reported for one address.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PmpAccess {
    /// Read permitted.
    pub r: bool,
    /// Write permitted.
    pub w: bool,
    /// Execute permitted.
    pub x: bool,
}

/// The expanded PMP table.
pub struct Pmp {
    table: [PmpRegion; PMP_TBL_SIZE],
}

impl Pmp {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self {
            table: [PmpRegion::default(); PMP_TBL_SIZE],
        }
    }

    /// Applies one region write from the CSR update pipeline.
    pub fn write(&mut self, w: &PmpWrite) {
        if !w.we || w.region >= PMP_TBL_SIZE {
            return;
        }
        self.table[w.region] = PmpRegion {
            start: w.start,
            end: w.end,
            flags: w.flags,
        };
    }

    /// Checks an address; `active` reflects the CSR-side PMP enable.
    pub fn check(&self, addr: u64, active: bool) -> PmpAccess {
        for region in &self.table {
            if region.flags & pmp_fl::V == 0 {
                continue;
            }
            // Inactive PMP still honours locked regions.
            if !active && region.flags & pmp_fl::L == 0 {
                continue;
            }
            if addr >= region.start && addr <= region.end {
                return PmpAccess {
                    r: region.flags & pmp_fl::R != 0,
                    w: region.flags & pmp_fl::W != 0,
                    x: region.flags & pmp_fl::X != 0,
                };
            }
        }
        // No region matched: permissive only while PMP is inactive.
        PmpAccess {
            r: !active,
            w: !active,
            x: !active,
        }
    }
}

impl Default for Pmp {
    fn default() -> Self {
        Self::new()
    }
}
