//! Branch Target Buffer.
//!
//! A small fully-associative table of `{pc, npc, exec}` entries kept as
//! an ordered vector: every write shifts the table down and inserts at
//! slot 0, so the array order doubles as an LRU order. Entries written by
//! the executor (`exec = true`) outrank pre-decoder guesses for the same
//! PC and cannot be overwritten by them.

use crate::config::defaults::BTB_SIZE;

/// One BTB entry.
#[derive(Clone, Copy, Debug)]
pub struct BtbEntry {
    /// Branch/jump instruction address.
    pub pc: u64,
    /// Predicted successor address.
    pub npc: u64,
    /// Written by the executor (highest priority).
    pub exec: bool,
}

impl Default for BtbEntry {
    fn default() -> Self {
        Self {
            pc: u64::MAX,
            npc: 0,
            exec: false,
        }
    }
}

/// The Branch Target Buffer.
pub struct Btb {
    table: [BtbEntry; BTB_SIZE],
}

impl Btb {
    /// Creates an empty BTB.
    pub fn new() -> Self {
        Self {
            table: [BtbEntry::default(); BTB_SIZE],
        }
    }

    /// Looks up the predicted successor for `pc`.
    ///
    /// Returns `(npc, exec)` on a hit.
    pub fn lookup(&self, pc: u64) -> Option<(u64, bool)> {
        self.table
            .iter()
            .find(|e| e.pc == pc)
            .map(|e| (e.npc, e.exec))
    }

    /// Writes `{pc → npc}`.
    ///
    /// A pre-decoder write (`exec = false`) that would displace an
    /// executor-confirmed entry for the same PC is suppressed. Otherwise
    /// the entry is inserted at the MRU slot and any older entry for the
    /// same PC is squeezed out by the shift.
    pub fn write(&mut self, pc: u64, npc: u64, exec: bool) {
        let existing = self.table.iter().position(|e| e.pc == pc);
        if let Some(idx) = existing {
            if self.table[idx].exec && !exec {
                return;
            }
            // Shift only the slots above the old copy, dropping it.
            for i in (1..=idx).rev() {
                self.table[i] = self.table[i - 1];
            }
        } else {
            for i in (1..BTB_SIZE).rev() {
                self.table[i] = self.table[i - 1];
            }
        }
        self.table[0] = BtbEntry { pc, npc, exec };
    }

    /// Pipeline flush: invalidate every entry.
    pub fn flush(&mut self) {
        self.table = [BtbEntry::default(); BTB_SIZE];
    }

    /// Read-only view of the table, MRU first.
    pub fn entries(&self) -> &[BtbEntry] {
        &self.table
    }
}

impl Default for Btb {
    fn default() -> Self {
        Self::new()
    }
}
