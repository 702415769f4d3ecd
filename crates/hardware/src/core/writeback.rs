//! Write-back arbiter.
//!
//! One write port reaches the register file per cycle. When both the
//! Execute-side result and the MemAccess-side load result fire in the
//! same cycle, the MemAccess side wins and the Execute-side write is held
//! one cycle; its tag keeps the hazard system treating the register as
//! in flight until the held write commits. Writes into `x0` are dropped
//! by the register file itself.

use crate::core::regfile::{RegFile, RegWrite};

/// The write-back arbiter.
#[derive(Default)]
pub struct Writeback {
    held: Option<RegWrite>,
    committed: Option<RegWrite>,
}

impl Writeback {
    /// Creates an empty arbiter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies at most one write this cycle, preferring the memory side.
    pub fn step(
        &mut self,
        regs: &mut RegFile,
        exec_wb: Option<RegWrite>,
        mem_wb: Option<RegWrite>,
    ) {
        self.committed = None;

        // A write held from the previous conflict goes first unless the
        // memory side fires again.
        let pending_exec = self.held.take().or(exec_wb);

        match (mem_wb, pending_exec) {
            (Some(m), e) => {
                regs.write(&m);
                self.committed = Some(m);
                self.held = e;
            }
            (None, Some(e)) => {
                regs.write(&e);
                self.committed = Some(e);
            }
            (None, None) => {}
        }
    }

    /// The arbiter has no held write and can absorb a load result.
    pub fn ready(&self) -> bool {
        self.held.is_none()
    }

    /// The write that committed this cycle.
    pub fn committed(&self) -> Option<&RegWrite> {
        self.committed.as_ref()
    }

    /// Pipeline flush: a held speculative write is dropped.
    pub fn flush(&mut self) {
        self.held = None;
    }
}
