//! The processor core.
//!
//! [`Proc`] owns every component of one hart and advances them in
//! discrete cycles. A cycle evaluates the components in a fixed order —
//! CSR, memory access, execute, write-back, debug port, decode, branch
//! predictor, fetch, the two MMUs and the cache subsystem — with all
//! cross-component traffic flowing through each component's latched
//! outputs, so ordering inside a cycle is not architecturally
//! observable.

/// Branch predictor (BTB + pre-decoder).
pub mod bp;
/// CSR block.
pub mod csr;
/// Debug port.
pub mod dbg;
/// Two-slice decoder.
pub mod decode;
/// Execute stage.
pub mod execute;
/// Fetch stage.
pub mod fetch;
/// CSR command interconnect.
pub mod ic_csr;
/// Memory-access stage.
pub mod memaccess;
/// Per-direction MMU.
pub mod mmu;
/// Tagged register file.
pub mod regfile;
/// Functional units.
pub mod units;
/// Write-back arbiter.
pub mod writeback;

use self::bp::{BpInputs, BranchPredictor};
use self::csr::{CsrInputs, CsrRegs};
use self::dbg::{DebugPort, DportInputs, DportRequest, DportResponse};
use self::decode::Decoder;
use self::execute::{Execute, ExecuteInputs, RetireEvent};
use self::fetch::{Fetch, FetchInputs, FetchResp};
use self::ic_csr::{CsrBus, CsrMaster};
use self::memaccess::{DataReq, MemAccess, MemAccessInputs};
use self::mmu::{Mmu, MmuInputs};
use self::regfile::RegFile;
use self::writeback::Writeback;
use crate::cache::dcache::{SnoopRequest, SnoopResponse};
use crate::cache::{CacheTop, CacheTopInputs, MemRequest, MemResponse};
use crate::common::{MemopType, REG_RA, REG_SP, memop_size};
use crate::config::Config;
use crate::stats::Stats;

/// Inputs the hart samples each cycle.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcInputs {
    /// The interconnect accepts the presented bus request.
    pub req_mem_ready: bool,
    /// Bus response (line-wide, path-steered).
    pub mem_resp: Option<MemResponse>,
    /// Snoop probe from the interconnect.
    pub snoop: Option<SnoopRequest>,
    /// Per-hart pending interrupt lines.
    pub irq_pending: u16,
    /// Real-time counter value.
    pub mtime: u64,
    /// External halt request.
    pub haltreq: bool,
    /// External resume request.
    pub resumereq: bool,
    /// Debug-module request.
    pub dport: Option<DportRequest>,
    /// Debug module consumes the response this cycle.
    pub dport_resp_ready: bool,
}

/// One hart of the River core.
pub struct Proc {
    /// Unified register file.
    pub regs: RegFile,
    /// Branch predictor.
    pub bp: BranchPredictor,
    /// Fetch stage.
    pub fetch: Fetch,
    /// Decode stage.
    pub dec: Decoder,
    /// Execute stage.
    pub exec: Execute,
    /// Memory-access stage.
    pub mem: MemAccess,
    /// Write-back arbiter.
    pub wb: Writeback,
    /// CSR block.
    pub csr: CsrRegs,
    /// CSR command interconnect.
    pub csrbus: CsrBus,
    /// Debug port.
    pub dbg: DebugPort,
    /// Fetch-side MMU.
    pub mmu_fetch: Mmu,
    /// Data-side MMU.
    pub mmu_data: Mmu,
    /// L1 cache subsystem.
    pub cache: CacheTop,
    /// Run counters.
    pub stats: Stats,

    /// Last retirement event (tracer fidelity).
    last_retire: Option<RetireEvent>,
}

impl Proc {
    /// Creates a hart in its reset state.
    pub fn new(config: &Config) -> Self {
        Self {
            regs: RegFile::new(),
            bp: BranchPredictor::new(config.reset_vector),
            fetch: Fetch::new(),
            dec: Decoder::new(),
            exec: Execute::new(config),
            mem: MemAccess::new(),
            wb: Writeback::new(),
            csr: CsrRegs::new(config),
            csrbus: CsrBus::new(),
            dbg: DebugPort::new(),
            mmu_fetch: Mmu::new(true),
            mmu_data: Mmu::new(false),
            cache: CacheTop::new(config),
            stats: Stats::default(),
            last_retire: None,
        }
    }

    /// The hart is halted in Debug Mode.
    pub fn halted(&self) -> bool {
        self.exec.halted()
    }

    /// Bus request presented to the interconnect this cycle.
    pub fn mem_req(&self) -> Option<&MemRequest> {
        self.cache.mem_req()
    }

    /// Snoop response toward the interconnect.
    pub fn snoop_resp(&self) -> Option<&SnoopResponse> {
        self.cache.snoop_resp()
    }

    /// Debug response toward the debug module.
    pub fn dport_resp(&self) -> Option<&DportResponse> {
        self.dbg.resp()
    }

    /// Last retirement event, for an external trace sink.
    pub fn retire(&self) -> Option<&RetireEvent> {
        self.last_retire.as_ref()
    }

    /// Advances the hart by one clock cycle.
    pub fn tick(&mut self, i: &ProcInputs) {
        // ---- CSR command arbitration (previous-cycle requests). ----
        let pre_owner = self.csrbus.owner();
        let granted = self.csrbus.grant(
            self.exec.csr_req(),
            self.dbg.csr_req(),
            self.csr.outputs().req_ready,
        );
        let grant_owner = self.csrbus.owner();
        let exec_accepted =
            pre_owner.is_none() && granted.is_some() && grant_owner == Some(CsrMaster::Exec);
        let dbg_accepted =
            pre_owner.is_none() && granted.is_some() && grant_owner == Some(CsrMaster::Dbg);

        // ---- CSR block. ----
        let csr_in = CsrInputs {
            req: granted,
            resp_ready: true,
            e_pc: self.exec.e_pc(),
            e_valid: self.exec.valid(),
            e_halted: self.exec.halted(),
            dbg_progbuf_ena: self.exec.progbuf_ena(),
            irq_pending: i.irq_pending,
            mtime: i.mtime,
            sp: self.regs.read(REG_SP),
            mem_idle: self.mem.idle(),
            mem_memop_ready: self.mem.memop_ready(),
            flushd_end: self.cache.flushd_end(),
        };
        self.csr.step(&csr_in);
        let csr_out = *self.csr.outputs();

        let (exec_csr_resp, dbg_csr_resp) = match self.csrbus.take_resp(csr_out.resp) {
            Some((CsrMaster::Exec, r)) => (Some(r), None),
            Some((CsrMaster::Dbg, r)) => (None, Some(r)),
            None => (None, None),
        };

        // ---- Memory-access stage (consumes last-cycle D-path resp). ----
        let dmem_resp = self.mmu_data.core_resp().copied();
        self.mem.step(&MemAccessInputs {
            memop: self.exec.memop(),
            dmem_req_ready: self.mmu_data.core_req_ready(),
            dmem_resp: dmem_resp.map(|r| memaccess::DataResp {
                addr: r.addr,
                data: r.data,
                load_fault: r.load_fault,
                store_fault: r.store_fault,
                page_fault_r: r.page_fault_r,
                page_fault_w: r.page_fault_w,
            }),
            wb_ready: self.wb.ready(),
        });

        // ---- Execute stage. ----
        let exec_in = ExecuteInputs {
            decoded: self.dec.decoded().copied(),
            memop_ready: self.mem.memop_ready(),
            mem_complete: self.mem.complete().copied(),
            mem_fault: self.mem.fault().copied(),
            csr_req_accepted: exec_accepted,
            csr_resp: exec_csr_resp,
            irq_pending: csr_out.irq_pending,
            wakeup: csr_out.wakeup,
            stack_overflow: csr_out.stack_overflow,
            stack_underflow: csr_out.stack_underflow,
            haltreq: i.haltreq,
            resumereq: i.resumereq,
            step: csr_out.step,
            progbuf_exec: self.dbg.progbuf_exec(),
            progbuf_end: csr_out.progbuf_end,
            progbuf_error: csr_out.progbuf_error,
            dbg_mem: self.dbg.dbg_mem(),
            wb_ready: self.wb.ready(),
        };
        self.exec.step(&self.regs, &exec_in);

        // ---- Write-back arbiter: memory side wins. ----
        self.wb
            .step(&mut self.regs, self.exec.wb(), self.mem.wb().copied());

        // ---- Debug port. ----
        let dbg_in = DportInputs {
            req: i.dport,
            resp_ready: i.dport_resp_ready,
            e_halted: self.exec.halted(),
            dbg_mem_resp: self.exec.dbg_mem_resp(),
            csr_req_accepted: dbg_accepted,
            csr_resp: dbg_csr_resp,
            progbuf_end: csr_out.progbuf_end,
            progbuf_error: csr_out.progbuf_error,
            e_call: self.exec.call(),
            e_ret: self.exec.ret(),
            e_pc: self.exec.retire().map_or(0, |r| r.pc),
            e_npc: self.exec.npc(),
        };
        self.dbg.step(&dbg_in, &mut self.regs);

        // ---- Pipeline flush fan-out. ----
        let flush = self.exec.flush_pipeline() || csr_out.flush_pipeline;
        if flush {
            self.dec.flush();
            self.wb.flush();
            self.exec.external_flush(&self.regs);
            self.stats.flushes += 1;
        }

        // ---- Decode (consumes last-cycle fetch latch). ----
        let fetched = if flush {
            None
        } else {
            self.fetch.fetched().copied()
        };
        self.dec.step(fetched.as_ref());

        // ---- Branch predictor. ----
        let imem_resp_last = self.mmu_fetch.core_resp().copied();
        let bp_in = BpInputs {
            e_jmp: self.exec.jmp().is_some(),
            e_pc: self.exec.jmp().map_or(0, |(pc, _)| pc),
            e_npc: self.exec.jmp().map_or(0, |(_, npc)| npc),
            start_pc: self.exec.npc(),
            ra: self.regs.read(REG_RA),
            resp_mem_valid: imem_resp_last.is_some(),
            resp_mem_addr: imem_resp_last.map_or(0, |r| r.addr),
            resp_mem_data: imem_resp_last.map_or(0, |r| r.data as u32),
            requested_pc: self.fetch.requested_pc(),
            fetching_pc: self.fetch.fetching_pc(),
            fetched_pc: self.fetch.fetched_pc(),
            decoded_pc: self.dec.decoded_pcs().first().copied().unwrap_or(u64::MAX),
            flush_pipeline: flush,
        };
        self.bp.step(&bp_in);

        // ---- Fetch. ----
        let fetch_in = FetchInputs {
            bp_npc: self.bp.npc(),
            imem_req_ready: self.mmu_fetch.core_req_ready(),
            imem_resp: imem_resp_last.map(|r| FetchResp {
                addr: r.addr,
                data: r.data as u32,
                load_fault: r.load_fault,
                page_fault_x: r.page_fault_x,
            }),
            flush,
            progbuf_ena: self.exec.progbuf_ena(),
            progbuf_pc: self.exec.progbuf_pc(),
            progbuf: self.dbg.progbuf(),
        };
        self.fetch.step(&fetch_in);

        // ---- MMUs. ----
        let mmu_fence_addr = if csr_out.flush_addr & 1 != 0 {
            0
        } else {
            csr_out.flush_addr
        };
        self.mmu_fetch.step(&MmuInputs {
            core_req: self.fetch.imem_req().map(|addr| DataReq {
                mtype: MemopType::LOAD_OP,
                addr,
                wdata: 0,
                wstrb: 0,
                size: memop_size::WORD,
            }),
            mem_req_ready: self.cache.i_req_ready(),
            mem_resp: self.cache.i_resp().copied(),
            mmu_ena: csr_out.mmu_ena,
            sv39: csr_out.mmu_sv39,
            sv48: csr_out.mmu_sv48,
            ppn: csr_out.mmu_ppn,
            mprv: csr_out.mprv,
            mxr: csr_out.mxr,
            sum: csr_out.sum,
            fence: csr_out.flushmmu,
            fence_addr: mmu_fence_addr,
        });

        self.mmu_data.step(&MmuInputs {
            core_req: self.mem.dmem_req().copied(),
            mem_req_ready: self.cache.d_req_ready(),
            mem_resp: self.cache.d_resp().copied(),
            mmu_ena: csr_out.mmu_ena,
            sv39: csr_out.mmu_sv39,
            sv48: csr_out.mmu_sv48,
            ppn: csr_out.mmu_ppn,
            mprv: csr_out.mprv,
            mxr: csr_out.mxr,
            sum: csr_out.sum,
            fence: csr_out.flushmmu,
            fence_addr: mmu_fence_addr,
        });

        // ---- Cache subsystem. ----
        self.cache.step(&CacheTopInputs {
            imem_req: self.mmu_fetch.mem_req().copied(),
            dmem_req: self.mmu_data.mem_req().copied(),
            req_mem_ready: i.req_mem_ready,
            mem_resp: i.mem_resp,
            snoop: i.snoop,
            flushi: csr_out.flushi.then_some(csr_out.flush_addr),
            flushd: csr_out.flushd.then_some(csr_out.flush_addr),
            pmp_write: csr_out.pmp,
            pmp_active: csr_out.pmp_ena,
        });

        // ---- Counters. ----
        self.stats.cycles += 1;
        if self.exec.valid() {
            self.stats.retired += 1;
        }
        self.last_retire = self.exec.retire().copied();
        self.stats.dcache_hits = self.cache.dcache.hits;
        self.stats.dcache_misses = self.cache.dcache.misses;
        self.stats.dcache_writebacks = self.cache.dcache.writebacks;
        self.stats.icache_hits = self.cache.icache.hits;
        self.stats.icache_misses = self.cache.icache.misses;
        self.stats.tlb_hits = self.mmu_fetch.tlb_hits + self.mmu_data.tlb_hits;
        self.stats.tlb_walks = self.mmu_fetch.walks + self.mmu_data.walks;
    }
}
