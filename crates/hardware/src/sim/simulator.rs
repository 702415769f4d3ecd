//! Simulator: owns the hart and the backing memory side-by-side.
//!
//! Each tick the memory answers the previous bus request and the hart
//! advances one cycle. External stimulus (interrupt lines, halt/resume,
//! debug requests, snoop probes) is injected through setter methods and
//! sampled by the next tick.

use tracing::info;

use crate::cache::dcache::SnoopRequest;
use crate::config::Config;
use crate::core::dbg::{DportRequest, DportResponse};
use crate::core::execute::RetireEvent;
use crate::core::{Proc, ProcInputs};
use crate::soc::SocMemory;
use crate::stats::Stats;

/// Retirement log depth kept when tracing is enabled.
const RETIRE_LOG_DEPTH: usize = 64;

/// Top-level simulator.
pub struct Simulator {
    /// The hart.
    pub proc: Proc,
    /// Backing memory and interconnect stand-in.
    pub memory: SocMemory,
    tracer_ena: bool,
    irq_pending: u16,
    haltreq: bool,
    resumereq: bool,
    snoop: Option<SnoopRequest>,
    dport: Option<DportRequest>,
    mtime: u64,
    retire_log: Vec<RetireEvent>,
}

impl Simulator {
    /// Creates a simulator with the given memory image.
    pub fn new(config: &Config, memory: SocMemory) -> Self {
        Self {
            proc: Proc::new(config),
            memory,
            tracer_ena: config.tracer_ena,
            irq_pending: 0,
            haltreq: false,
            resumereq: false,
            snoop: None,
            dport: None,
            mtime: 0,
            retire_log: Vec::new(),
        }
    }

    /// Sets the raw pending interrupt lines.
    pub fn set_irq_pending(&mut self, mask: u16) {
        self.irq_pending = mask;
    }

    /// Drives the external halt request line.
    pub fn set_haltreq(&mut self, level: bool) {
        self.haltreq = level;
    }

    /// Drives the external resume request line.
    pub fn set_resumereq(&mut self, level: bool) {
        self.resumereq = level;
    }

    /// Injects one snoop probe for the next cycle.
    pub fn inject_snoop(&mut self, snoop: SnoopRequest) {
        self.snoop = Some(snoop);
    }

    /// Advances the simulation by one clock cycle.
    pub fn tick(&mut self) {
        let req = self.proc.mem_req().copied();
        let (accepted, resp) = self.memory.step(req.as_ref());

        let inputs = ProcInputs {
            req_mem_ready: accepted,
            mem_resp: resp,
            snoop: self.snoop.take(),
            irq_pending: self.irq_pending,
            mtime: self.mtime,
            haltreq: self.haltreq,
            resumereq: self.resumereq,
            dport: self.dport,
            dport_resp_ready: true,
        };
        self.proc.tick(&inputs);
        self.mtime += 1;

        if self.tracer_ena {
            if let Some(r) = self.proc.retire() {
                self.retire_log.push(*r);
                if self.retire_log.len() > RETIRE_LOG_DEPTH {
                    let _ = self.retire_log.remove(0);
                }
            }
        }
    }

    /// Advances `n` cycles.
    pub fn run(&mut self, n: u64) {
        for _ in 0..n {
            self.tick();
        }
    }

    /// Runs until the hart halts or the cycle budget is exhausted.
    ///
    /// Returns true when the hart halted.
    pub fn run_until_halt(&mut self, max_cycles: u64) -> bool {
        for _ in 0..max_cycles {
            self.tick();
            if self.proc.halted() {
                return true;
            }
        }
        false
    }

    /// Performs one debug-port transaction, ticking until the response.
    ///
    /// Returns `None` when the port never answered within the budget.
    pub fn dport_transaction(
        &mut self,
        req: DportRequest,
        max_cycles: u64,
    ) -> Option<DportResponse> {
        self.dport = Some(req);
        for _ in 0..max_cycles {
            self.tick();
            if let Some(resp) = self.proc.dport_resp().copied() {
                self.dport = None;
                // One more cycle completes the ready handshake.
                self.tick();
                return Some(resp);
            }
        }
        self.dport = None;
        None
    }

    /// Run counters.
    pub fn stats(&self) -> &Stats {
        &self.proc.stats
    }

    /// Recent retirement events (tracing enabled).
    pub fn retire_log(&self) -> &[RetireEvent] {
        &self.retire_log
    }

    /// Logs a run summary.
    pub fn report(&self) {
        info!(summary = %self.proc.stats.summary(), "simulation finished");
    }
}
