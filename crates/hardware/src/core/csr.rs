//! Control and status register block.
//!
//! One state machine owns every CSR of the hart. It provides:
//! 1. **Command processing:** Execute and the debug port issue
//!    `{type, addr, data}` commands through the 2-master interconnect;
//!    reads, writes, trap entry/return, WFI, halt/resume and fences all
//!    flow through here and produce a single response.
//! 2. **Privilege state:** four mode slots (U/S/H/M) each holding
//!    `{epc, previous privilege, IE bits, tvec, tval, cause, scratch,
//!    counteren}` plus the global `mstatus` fields.
//! 3. **Interrupt masking and delegation:** the pending mask is filtered
//!    by per-source enables and `mideleg`, and trap entry picks M- or
//!    S-mode accordingly.
//! 4. **PMP update pipeline:** `pmpcfg*`/`pmpaddr*` writes are expanded
//!    (NAPOT/TOR/NA4) and pushed to the PMP table one region per cycle.
//! 5. **Fence orchestration:** the data-barrier/flush/instruction-flush
//!    chain that serves `fence`, `fence.i` and `sfence.vma`.

use tracing::debug;

use crate::common::error::HaltCause;
use crate::common::{PrivMode, csr_req, irq};
use crate::config::Config;
use crate::config::defaults::{IMPLEMENTATION_ID, PMP_TBL_SIZE, RESET_VECTOR, VENDOR_ID};

/// CSR command carried over the core's internal command bus.
#[derive(Clone, Copy, Debug, Default)]
pub struct CsrCommand {
    /// Command type bits (`csr_req::*`).
    pub ctype: u16,
    /// CSR address, exception code or fence selector.
    pub addr: u16,
    /// Write data / trap value.
    pub data: u64,
}

/// Response to a CSR command.
#[derive(Clone, Copy, Debug, Default)]
pub struct CsrResponse {
    /// Read data, trap vector or return PC depending on the command.
    pub data: u64,
    /// The command raised an exception (illegal access).
    pub exception: bool,
}

/// Fence selector bits in the `FENCE` command address.
pub mod fence_sel {
    /// Plain data barrier (`fence`).
    pub const DATA: u16 = 1 << 0;
    /// Data flush plus instruction-cache flush (`fence.i`).
    pub const FENCE_I: u16 = 1 << 1;
    /// TLB sweep (`sfence.vma`).
    pub const VMA: u16 = 1 << 2;
}

/// One region write toward the PMP table.
#[derive(Clone, Copy, Debug, Default)]
pub struct PmpWrite {
    /// Region entry being replaced.
    pub region: usize,
    /// Write strobe; clear entries push `we = false`.
    pub we: bool,
    /// First byte covered.
    pub start: u64,
    /// Last byte covered.
    pub end: u64,
    /// `{V, L, X, W, R}` flag bits (`pmp_fl::*`).
    pub flags: u8,
}

/// PMP region flag bit positions.
pub mod pmp_fl {
    /// Read permission.
    pub const R: u8 = 1 << 0;
    /// Write permission.
    pub const W: u8 = 1 << 1;
    /// Execute permission.
    pub const X: u8 = 1 << 2;
    /// Locked: enforced in M-mode as well.
    pub const L: u8 = 1 << 3;
    /// Entry valid.
    pub const V: u8 = 1 << 4;
}

/// Per-privilege-mode CSR slot.
#[derive(Clone, Copy, Debug, Default)]
struct ModeSlot {
    xepc: u64,
    xpp: PrivMode,
    xpie: bool,
    xie: bool,
    /// Software-interrupt enable for this mode.
    xsie: bool,
    /// Timer-interrupt enable.
    xtie: bool,
    /// External-interrupt enable.
    xeie: bool,
    xtvec_off: u64,
    xtvec_mode: u8,
    xtval: u64,
    xcause_code: u64,
    xcause_irq: bool,
    xscratch: u64,
    xcounteren: u32,
}

/// Shadowed PMP entry (the raw programming model side).
#[derive(Clone, Copy, Debug, Default)]
struct PmpEntry {
    cfg: u8,
    /// Byte address (programmed word address << 2).
    addr: u64,
    /// NAPOT byte mask.
    mask: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
enum CsrState {
    #[default]
    Idle,
    Rw,
    Exception,
    Breakpoint,
    Interrupt,
    TrapReturn,
    Halt,
    Resume,
    Wfi,
    Fence,
    WaitPmp,
    Response,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
enum FenceState {
    #[default]
    None,
    DataBarrier,
    DataFlush,
    WaitDataFlushEnd,
    FlushInstr,
    End,
}

/// Inputs sampled by the CSR block each cycle.
#[derive(Clone, Copy, Debug, Default)]
pub struct CsrInputs {
    /// Command granted by the interconnect this cycle.
    pub req: Option<CsrCommand>,
    /// Requester consumes the response this cycle.
    pub resp_ready: bool,
    /// PC of the instruction Execute currently holds.
    pub e_pc: u64,
    /// An instruction retired this cycle.
    pub e_valid: bool,
    /// The hart is halted in Debug Mode.
    pub e_halted: bool,
    /// Program buffer execution is active.
    pub dbg_progbuf_ena: bool,
    /// Raw external pending lines.
    pub irq_pending: u16,
    /// Real-time counter value for the `time` CSR.
    pub mtime: u64,
    /// Current stack pointer (stack limit checks).
    pub sp: u64,
    /// MemAccess queue is empty (fence data barrier).
    pub mem_idle: bool,
    /// MemAccess accepts a request (flush-d launch).
    pub mem_memop_ready: bool,
    /// D-cache finished its flush walk.
    pub flushd_end: bool,
}

/// Outputs latched by the CSR block each cycle.
#[derive(Clone, Copy, Debug, Default)]
pub struct CsrOutputs {
    /// A new command can be accepted.
    pub req_ready: bool,
    /// Response to the active command.
    pub resp: Option<CsrResponse>,
    /// Request a D-cache flush-all through MemAccess.
    pub flushd: bool,
    /// Request an I-cache flush-all.
    pub flushi: bool,
    /// Request a TLB sweep in both MMUs.
    pub flushmmu: bool,
    /// Flush the pipeline (stage latches reset).
    pub flush_pipeline: bool,
    /// Address operand for targeted flushes.
    pub flush_addr: u64,
    /// Program buffer execution finished.
    pub progbuf_end: bool,
    /// Program buffer execution failed.
    pub progbuf_error: bool,
    /// Pending-and-enabled interrupt lines after delegation masking.
    pub irq_pending: u16,
    /// Any raw pending line (WFI wake-up).
    pub wakeup: bool,
    /// Stack-limit overflow detected this cycle.
    pub stack_overflow: bool,
    /// Stack-limit underflow detected this cycle.
    pub stack_underflow: bool,
    /// One region toward the PMP table.
    pub pmp: Option<PmpWrite>,
    /// PMP checks are active (S/U mode or `MPRV`).
    pub pmp_ena: bool,
    /// Address translation active.
    pub mmu_ena: bool,
    /// `satp.mode` is Sv39.
    pub mmu_sv39: bool,
    /// `satp.mode` is Sv48.
    pub mmu_sv48: bool,
    /// Root page-table PPN.
    pub mmu_ppn: u64,
    /// `mstatus.MPRV`.
    pub mprv: bool,
    /// `mstatus.MXR`.
    pub mxr: bool,
    /// `mstatus.SUM`.
    pub sum: bool,
    /// `dcsr.step` single-step mode.
    pub step: bool,
}

const IDX_U: usize = 0;
const IDX_S: usize = 1;
const IDX_M: usize = 3;

/// Delegable synchronous exception codes.
const MEDELEG_WRITE_MASK: u64 = 0xB3FF;
/// Delegable interrupt lines (supervisor software/timer/external).
const MIDELEG_WRITE_MASK: u64 = 0x222;

/// `misa` for RV64 with A, C, D, I, M, S and U.
const MISA_VALUE: u64 = (2 << 62)
    | (1 << 0)
    | (1 << 2)
    | (1 << 3)
    | (1 << 8)
    | (1 << 12)
    | (1 << 18)
    | (1 << 20);

/// The CSR block.
pub struct CsrRegs {
    hartid: u64,
    state: CsrState,
    fence: FenceState,
    cmd: CsrCommand,
    cmd_exception: bool,
    progbuf_end: bool,
    progbuf_err: bool,

    xmode: [ModeSlot; 4],
    mode: PrivMode,
    mprv: bool,
    mxr: bool,
    sum: bool,
    tvm: bool,
    medeleg: u64,
    mideleg: u64,
    mcountinhibit: u64,
    mcycle: u64,
    minstret: u64,
    /// Software-set supervisor pending bits.
    mip_ssip: bool,
    mip_stip: bool,
    mip_seip: bool,

    satp_ppn: u64,
    satp_sv39: bool,
    satp_sv48: bool,
    mmu_ena: bool,

    mstackovr: u64,
    mstackund: u64,

    dpc: u64,
    dscratch0: u64,
    dscratch1: u64,
    halt_cause: u64,
    dcsr_ebreakm: bool,
    dcsr_stopcount: bool,
    dcsr_stoptimer: bool,
    dcsr_step: bool,
    dcsr_stepie: bool,

    pmp: [PmpEntry; PMP_TBL_SIZE],
    pmp_upd_ena: u32,
    pmp_upd_cnt: usize,
    /// End address of the previously expanded region (TOR chaining).
    pmp_prev_end: u64,

    out: CsrOutputs,
}

impl CsrRegs {
    /// Creates a CSR block in its reset state.
    pub fn new(config: &Config) -> Self {
        Self {
            hartid: config.hartid,
            state: CsrState::Idle,
            fence: FenceState::None,
            cmd: CsrCommand::default(),
            cmd_exception: false,
            progbuf_end: false,
            progbuf_err: false,
            xmode: [ModeSlot::default(); 4],
            mode: PrivMode::Machine,
            mprv: false,
            mxr: false,
            sum: false,
            tvm: false,
            medeleg: 0,
            mideleg: 0,
            mcountinhibit: 0,
            mcycle: 0,
            minstret: 0,
            mip_ssip: false,
            mip_stip: false,
            mip_seip: false,
            satp_ppn: 0,
            satp_sv39: false,
            satp_sv48: false,
            mmu_ena: false,
            mstackovr: 0,
            mstackund: 0,
            dpc: RESET_VECTOR,
            dscratch0: 0,
            dscratch1: 0,
            halt_cause: 0,
            dcsr_ebreakm: false,
            dcsr_stopcount: false,
            dcsr_stoptimer: false,
            dcsr_step: false,
            dcsr_stepie: false,
            pmp: [PmpEntry::default(); PMP_TBL_SIZE],
            pmp_upd_ena: 0,
            pmp_upd_cnt: 0,
            pmp_prev_end: 0,
            out: CsrOutputs::default(),
        }
    }

    /// Current privilege mode.
    pub fn mode(&self) -> PrivMode {
        self.mode
    }

    /// Architectural retired-instruction counter.
    pub fn minstret(&self) -> u64 {
        self.minstret
    }

    /// Latched outputs of the last `step`.
    pub fn outputs(&self) -> &CsrOutputs {
        &self.out
    }

    /// Advances one cycle.
    pub fn step(&mut self, i: &CsrInputs) {
        let mut out = CsrOutputs::default();

        // Exception/interrupt events raised while processing the command.
        let mut e_emux: u64 = 0;
        let mut e_imux: u64 = 0;
        let mut trap_cause: u64 = 0;
        let mut xtval: u64 = 0;
        let mut trapreturn = false;

        match self.state {
            CsrState::Idle => {
                self.progbuf_end = false;
                self.progbuf_err = false;
                out.req_ready = true;
                if let Some(req) = i.req {
                    self.cmd = req;
                    self.cmd_exception = false;
                    if req.ctype & csr_req::EXCEPTION != 0 {
                        self.state = CsrState::Exception;
                        // Environment-call code is offset by the mode.
                        if u64::from(req.addr)
                            == crate::common::error::Exception::CallFromUmode.code()
                        {
                            self.cmd.addr = req.addr + self.mode.to_bits() as u16;
                        }
                    } else if req.ctype & csr_req::BREAKPOINT != 0 {
                        self.state = CsrState::Breakpoint;
                    } else if req.ctype & csr_req::HALT != 0 {
                        self.state = CsrState::Halt;
                    } else if req.ctype & csr_req::RESUME != 0 {
                        self.state = CsrState::Resume;
                    } else if req.ctype & csr_req::INTERRUPT != 0 {
                        self.state = CsrState::Interrupt;
                    } else if req.ctype & csr_req::TRAP_RETURN != 0 {
                        self.state = CsrState::TrapReturn;
                    } else if req.ctype & csr_req::WFI != 0 {
                        self.state = CsrState::Wfi;
                    } else if req.ctype & csr_req::FENCE != 0 {
                        self.state = CsrState::Fence;
                        if req.addr & fence_sel::DATA != 0 {
                            self.fence = FenceState::DataBarrier;
                        } else if req.addr & fence_sel::FENCE_I != 0 {
                            out.flushmmu = true;
                            self.fence = FenceState::DataFlush;
                        } else if req.addr & fence_sel::VMA != 0 {
                            if self.tvm && self.mode < PrivMode::Machine {
                                // sfence.vma is illegal below M when TVM.
                                self.state = CsrState::Response;
                                self.cmd_exception = true;
                            } else {
                                out.flushmmu = true;
                                self.fence = FenceState::End;
                            }
                        } else {
                            self.state = CsrState::Response;
                            self.cmd_exception = true;
                        }
                    } else {
                        self.state = CsrState::Rw;
                    }
                }
            }
            CsrState::Exception => {
                self.state = CsrState::Response;
                let code = u64::from(self.cmd.addr) & 0x1F;
                e_emux = 1 << code;
                trap_cause = code;
                xtval = self.cmd.data;
                self.cmd.data = self.trap_vector_exception(code);
                if i.dbg_progbuf_ena {
                    self.progbuf_err = true;
                    self.progbuf_end = true;
                    self.cmd_exception = true;
                    // Architectural CSRs stay untouched inside progbuf.
                    e_emux = 0;
                }
                debug!(code, tval = format_args!("{xtval:#x}"), "exception");
            }
            CsrState::Breakpoint => {
                self.state = CsrState::Response;
                if i.dbg_progbuf_ena {
                    // Progbuf ends on ebreak; halt cause stays untouched.
                    self.progbuf_end = true;
                    self.cmd.data = u64::MAX;
                } else if self.dcsr_ebreakm {
                    self.halt_cause = HaltCause::Ebreak.code();
                    self.dpc = self.cmd.data;
                    self.cmd.data = u64::MAX;
                } else {
                    let code = crate::common::error::Exception::Breakpoint.code();
                    e_emux = 1 << code;
                    trap_cause = code;
                    xtval = i.e_pc;
                    self.cmd.data = self.trap_vector_exception(code);
                }
            }
            CsrState::Halt => {
                self.state = CsrState::Response;
                self.halt_cause = u64::from(self.cmd.addr) & 0x7;
                self.dpc = i.e_pc;
            }
            CsrState::Resume => {
                self.state = CsrState::Response;
                self.cmd.data = if i.dbg_progbuf_ena { 0 } else { self.dpc };
            }
            CsrState::Interrupt => {
                self.state = CsrState::Response;
                let code = u64::from(self.cmd.addr) & 0xF;
                e_imux = 1 << code;
                trap_cause = code;
                let (base, vectored) = self.trap_vector_interrupt(code);
                self.cmd.data = if vectored { base + (trap_cause << 2) } else { base };
            }
            CsrState::TrapReturn => {
                self.state = CsrState::Response;
                trapreturn = true;
                self.cmd.data = self.xmode[self.mode as usize].xepc;
            }
            CsrState::Rw => {
                self.state = CsrState::Response;
                // csr[9:8] encode the lowest privilege allowed to access.
                let required = PrivMode::from_bits(u64::from(self.cmd.addr >> 8) & 0x3);
                if self.mode < required {
                    self.cmd_exception = true;
                } else {
                    let rena = self.cmd.ctype & csr_req::READ != 0;
                    let wena = self.cmd.ctype & csr_req::WRITE != 0;
                    let (rdata, known) = self.access(wena, i);
                    if !known {
                        self.cmd_exception = true;
                    } else if rena {
                        self.cmd.data = rdata;
                    }
                    if wena && (self.cmd.addr >> 4) == 0x3A {
                        self.state = CsrState::WaitPmp;
                    }
                    if i.dbg_progbuf_ena && self.cmd_exception {
                        self.cmd_exception = false;
                        self.progbuf_err = true;
                        self.progbuf_end = true;
                    }
                }
            }
            CsrState::Wfi => {
                self.state = CsrState::Response;
                self.cmd.data = 0;
            }
            CsrState::Fence => {
                if self.fence == FenceState::End {
                    self.cmd.data = 0;
                    self.state = CsrState::Response;
                    self.fence = FenceState::None;
                    out.flush_pipeline = true;
                }
            }
            CsrState::WaitPmp => {
                if self.pmp_upd_ena == 0 {
                    self.state = CsrState::Response;
                }
            }
            CsrState::Response => {
                out.resp = Some(CsrResponse {
                    data: self.cmd.data,
                    exception: self.cmd_exception,
                });
                if i.resp_ready {
                    self.state = CsrState::Idle;
                }
            }
        }

        // Cache flush chain.
        match self.fence {
            FenceState::None | FenceState::End => {}
            FenceState::DataBarrier => {
                if i.mem_idle {
                    self.fence = FenceState::End;
                }
            }
            FenceState::DataFlush => {
                out.flushd = true;
                if i.mem_memop_ready {
                    self.fence = FenceState::WaitDataFlushEnd;
                }
            }
            FenceState::WaitDataFlushEnd => {
                if i.flushd_end {
                    self.fence = FenceState::FlushInstr;
                }
            }
            FenceState::FlushInstr => {
                out.flushi = true;
                self.fence = FenceState::End;
            }
        }
        out.flush_addr = self.cmd.data;

        // Trap return updates.
        if trapreturn {
            let cur = self.mode as usize;
            let prev_xpp = self.xmode[cur].xpp;
            if self.mode.to_bits() == u64::from(self.cmd.addr) {
                self.mode = prev_xpp;
                self.xmode[cur].xie = self.xmode[cur].xpie;
                self.xmode[cur].xpie = true;
                self.xmode[cur].xpp = PrivMode::User;
            } else {
                // xRET in a mode it does not belong to.
                self.cmd_exception = true;
            }
            if prev_xpp != PrivMode::Machine {
                self.mprv = false;
            }
        }

        // Trap entry: delegated to S-mode when enabled, M otherwise.
        if (e_emux | e_imux) != 0 {
            let delegated = self.mode <= PrivMode::Supervisor
                && ((e_emux & self.medeleg) != 0 || (e_imux & self.mideleg) != 0);
            let target = if delegated { IDX_S } else { IDX_M };
            self.xmode[target].xpp = self.mode;
            self.xmode[target].xpie = self.xmode[self.mode as usize].xie;
            self.xmode[target].xie = false;
            self.xmode[target].xepc = i.e_pc;
            self.xmode[target].xtval = xtval;
            self.xmode[target].xcause_code = trap_cause;
            self.xmode[target].xcause_irq = e_emux == 0;
            self.mode = if delegated {
                PrivMode::Supervisor
            } else {
                PrivMode::Machine
            };
        }

        // MMU activation follows satp and the effective privilege.
        let was_ena = self.mmu_ena;
        self.mmu_ena = false;
        if self.satp_sv39 || self.satp_sv48 {
            let xpp = self.xmode[self.mode as usize].xpp;
            if self.mode <= PrivMode::Supervisor
                || (self.mprv && xpp <= PrivMode::Supervisor)
            {
                self.mmu_ena = true;
                if !was_ena {
                    out.flush_pipeline = true;
                }
            }
        }
        if self.mode == PrivMode::Machine && (e_emux | e_imux) != 0 {
            // Traps into M-mode run untranslated.
            self.mmu_ena = self.mprv
                && (self.satp_sv39 || self.satp_sv48)
                && self.xmode[IDX_M].xpp <= PrivMode::Supervisor;
        }

        // Interrupt enable mask after delegation.
        let mut irq_ena: u64 = 0;
        if !self.dcsr_step || self.dcsr_stepie {
            if self.xmode[IDX_M].xie {
                irq_ena |= !self.mideleg;
            }
            if self.xmode[IDX_S].xie {
                irq_ena |= self.mideleg;
            }
        }

        let raw = u64::from(i.irq_pending);
        let mut pending: u64 = 0;
        pending |= (raw >> irq::MSIP & 1) * u64::from(self.xmode[IDX_M].xsie) << irq::MSIP;
        pending |= (raw >> irq::MTIP & 1) * u64::from(self.xmode[IDX_M].xtie) << irq::MTIP;
        pending |= (raw >> irq::MEIP & 1) * u64::from(self.xmode[IDX_M].xeie) << irq::MEIP;
        pending |= u64::from((raw >> irq::SSIP & 1 != 0 || self.mip_ssip) && self.xmode[IDX_S].xsie)
            << irq::SSIP;
        pending |= u64::from((raw >> irq::STIP & 1 != 0 || self.mip_stip) && self.xmode[IDX_S].xtie)
            << irq::STIP;
        pending |= u64::from((raw >> irq::SEIP & 1 != 0 || self.mip_seip) && self.xmode[IDX_S].xeie)
            << irq::SEIP;

        out.irq_pending = (pending & irq_ena) as u16;
        out.wakeup = raw != 0;

        // PMP update pipeline: one region per cycle.
        if self.pmp_upd_ena != 0 {
            let region = self.pmp_upd_cnt;
            let we = self.pmp_upd_ena & (1 << region) != 0;
            self.pmp_upd_ena &= !(1 << region);
            self.pmp_upd_cnt = (self.pmp_upd_cnt + 1) % PMP_TBL_SIZE;
            let e = self.pmp[region];
            let mode = (e.cfg >> 3) & 0x3;
            let (start, end, flags) = match mode {
                0 => (0, e.addr, 0),
                1 => {
                    // TOR: from the previous region's end.
                    let start = if self.pmp_prev_end & 1 != 0 {
                        self.pmp_prev_end + 1
                    } else {
                        self.pmp_prev_end
                    };
                    (
                        start,
                        e.addr.wrapping_sub(1),
                        pmp_fl::V | (e.cfg >> 7 << 3) | (e.cfg & 0x7),
                    )
                }
                2 => (
                    e.addr,
                    e.addr | 0x3,
                    pmp_fl::V | (e.cfg >> 7 << 3) | (e.cfg & 0x7),
                ),
                _ => (
                    e.addr & !e.mask,
                    e.addr | e.mask,
                    pmp_fl::V | (e.cfg >> 7 << 3) | (e.cfg & 0x7),
                ),
            };
            self.pmp_prev_end = end;
            out.pmp = Some(PmpWrite {
                region,
                we,
                start,
                end,
                flags,
            });
        } else {
            self.pmp_upd_cnt = 0;
        }
        out.pmp_ena = self.mode <= PrivMode::Supervisor || self.mprv;

        // Non-standard stack limit checks; a firing limit disarms itself.
        if self.mstackovr != 0 && i.sp < self.mstackovr {
            out.stack_overflow = true;
            self.mstackovr = 0;
        }
        if self.mstackund != 0 && i.sp > self.mstackund {
            out.stack_underflow = true;
            self.mstackund = 0;
        }

        // Counters honour stopcount and mcountinhibit.
        if !i.e_halted && !self.dcsr_stopcount && self.mcountinhibit & 0x1 == 0 {
            self.mcycle = self.mcycle.wrapping_add(1);
        }
        if i.e_valid && !self.dcsr_stopcount && !i.dbg_progbuf_ena && self.mcountinhibit & 0x4 == 0
        {
            self.minstret = self.minstret.wrapping_add(1);
        }

        out.progbuf_end = self.progbuf_end && i.resp_ready;
        out.progbuf_error = self.progbuf_err && i.resp_ready;
        out.mmu_ena = self.mmu_ena;
        out.mmu_sv39 = self.satp_sv39;
        out.mmu_sv48 = self.satp_sv48;
        out.mmu_ppn = self.satp_ppn;
        out.mprv = self.mprv;
        out.mxr = self.mxr;
        out.sum = self.sum;
        out.step = self.dcsr_step;
        self.out = out;
    }

    /// Exception trap vector after `medeleg` routing.
    fn trap_vector_exception(&self, code: u64) -> u64 {
        if self.mode <= PrivMode::Supervisor && self.medeleg & (1 << code) != 0 {
            self.xmode[IDX_S].xtvec_off
        } else {
            self.xmode[IDX_M].xtvec_off
        }
    }

    /// Interrupt trap vector after `mideleg` routing; the flag reports
    /// whether the target vector is in vectored mode.
    fn trap_vector_interrupt(&self, code: u64) -> (u64, bool) {
        if self.mode <= PrivMode::Supervisor && self.mideleg & (1 << code) != 0 {
            (
                self.xmode[IDX_S].xtvec_off,
                self.xmode[IDX_S].xtvec_mode == 1,
            )
        } else {
            (
                self.xmode[IDX_M].xtvec_off,
                self.xmode[IDX_M].xtvec_mode == 1,
            )
        }
    }

    fn mstatus_read(&self) -> u64 {
        let mut v = 0u64;
        v |= u64::from(self.xmode[IDX_S].xie) << 1;
        v |= u64::from(self.xmode[IDX_M].xie) << 3;
        v |= u64::from(self.xmode[IDX_S].xpie) << 5;
        v |= u64::from(self.xmode[IDX_M].xpie) << 7;
        v |= u64::from(self.xmode[IDX_S].xpp != PrivMode::User) << 8;
        v |= self.xmode[IDX_M].xpp.to_bits() << 11;
        v |= u64::from(self.mprv) << 17;
        v |= u64::from(self.sum) << 18;
        v |= u64::from(self.mxr) << 19;
        v |= u64::from(self.tvm) << 20;
        v
    }

    fn mstatus_write(&mut self, v: u64) {
        self.xmode[IDX_S].xie = v >> 1 & 1 != 0;
        self.xmode[IDX_M].xie = v >> 3 & 1 != 0;
        self.xmode[IDX_S].xpie = v >> 5 & 1 != 0;
        self.xmode[IDX_M].xpie = v >> 7 & 1 != 0;
        self.xmode[IDX_S].xpp = if v >> 8 & 1 != 0 {
            PrivMode::Supervisor
        } else {
            PrivMode::User
        };
        self.xmode[IDX_M].xpp = PrivMode::from_bits(v >> 11);
        self.mprv = v >> 17 & 1 != 0;
        self.sum = v >> 18 & 1 != 0;
        self.mxr = v >> 19 & 1 != 0;
        self.tvm = v >> 20 & 1 != 0;
    }

    fn sstatus_write(&mut self, v: u64) {
        self.xmode[IDX_S].xie = v >> 1 & 1 != 0;
        self.xmode[IDX_S].xpie = v >> 5 & 1 != 0;
        self.xmode[IDX_S].xpp = if v >> 8 & 1 != 0 {
            PrivMode::Supervisor
        } else {
            PrivMode::User
        };
        self.sum = v >> 18 & 1 != 0;
        self.mxr = v >> 19 & 1 != 0;
    }

    fn mie_read(&self) -> u64 {
        let mut v = 0u64;
        v |= u64::from(self.xmode[IDX_S].xsie) << irq::SSIP;
        v |= u64::from(self.xmode[IDX_M].xsie) << irq::MSIP;
        v |= u64::from(self.xmode[IDX_S].xtie) << irq::STIP;
        v |= u64::from(self.xmode[IDX_M].xtie) << irq::MTIP;
        v |= u64::from(self.xmode[IDX_S].xeie) << irq::SEIP;
        v |= u64::from(self.xmode[IDX_M].xeie) << irq::MEIP;
        v
    }

    fn mip_read(&self, i: &CsrInputs) -> u64 {
        let raw = u64::from(i.irq_pending);
        let mut v = raw & ((1 << irq::MSIP) | (1 << irq::MTIP) | (1 << irq::MEIP));
        v |= u64::from(raw >> irq::SSIP & 1 != 0 || self.mip_ssip) << irq::SSIP;
        v |= u64::from(raw >> irq::STIP & 1 != 0 || self.mip_stip) << irq::STIP;
        v |= u64::from(raw >> irq::SEIP & 1 != 0 || self.mip_seip) << irq::SEIP;
        v
    }

    fn dcsr_read(&self) -> u64 {
        (4 << 28)
            | (u64::from(self.dcsr_ebreakm) << 15)
            | (u64::from(self.dcsr_stepie) << 11)
            | (u64::from(self.dcsr_stopcount) << 10)
            | (u64::from(self.dcsr_stoptimer) << 9)
            | (self.halt_cause << 6)
            | (u64::from(self.dcsr_step) << 2)
            | self.mode.to_bits()
    }

    /// Reads and/or writes one CSR; returns `(read data, implemented)`.
    fn access(&mut self, wena: bool, i: &CsrInputs) -> (u64, bool) {
        let addr = self.cmd.addr;
        let wdata = self.cmd.data;
        let mut rdata = 0u64;

        match addr {
            // fflags/frm/fcsr: FPU seam; flags are hard zero without FPU.
            0x001 | 0x002 | 0x003 => {}
            0x100 => {
                rdata = self.mstatus_read()
                    & ((1 << 1) | (1 << 5) | (1 << 8) | (1 << 18) | (1 << 19));
                if wena {
                    self.sstatus_write(wdata);
                }
            }
            0x104 => {
                rdata = self.mie_read() & self.mideleg_view();
                if wena {
                    self.xmode[IDX_S].xsie = wdata >> irq::SSIP & 1 != 0;
                    self.xmode[IDX_S].xtie = wdata >> irq::STIP & 1 != 0;
                    self.xmode[IDX_S].xeie = wdata >> irq::SEIP & 1 != 0;
                }
            }
            0x105 => {
                rdata = self.xmode[IDX_S].xtvec_off | u64::from(self.xmode[IDX_S].xtvec_mode);
                if wena {
                    self.xmode[IDX_S].xtvec_off = wdata & !0x3;
                    self.xmode[IDX_S].xtvec_mode = (wdata & 0x3) as u8;
                }
            }
            0x106 => {
                rdata = u64::from(self.xmode[IDX_S].xcounteren);
                if wena {
                    self.xmode[IDX_S].xcounteren = wdata as u32;
                }
            }
            0x140 => {
                rdata = self.xmode[IDX_S].xscratch;
                if wena {
                    self.xmode[IDX_S].xscratch = wdata;
                }
            }
            0x141 => {
                rdata = self.xmode[IDX_S].xepc;
                if wena {
                    self.xmode[IDX_S].xepc = wdata;
                }
            }
            0x142 => {
                rdata =
                    (u64::from(self.xmode[IDX_S].xcause_irq) << 63) | self.xmode[IDX_S].xcause_code;
                if wena {
                    self.xmode[IDX_S].xcause_irq = wdata >> 63 != 0;
                    self.xmode[IDX_S].xcause_code = wdata & 0x1F;
                }
            }
            0x143 => {
                rdata = self.xmode[IDX_S].xtval;
                if wena {
                    self.xmode[IDX_S].xtval = wdata;
                }
            }
            0x144 => {
                rdata = self.mip_read(i) & self.mideleg_view();
                if wena {
                    self.mip_ssip = wdata >> irq::SSIP & 1 != 0;
                }
            }
            0x180 => {
                // satp is guarded by TVM in S-mode.
                if self.tvm && self.mode == PrivMode::Supervisor {
                    return (0, false);
                }
                rdata = self.satp_ppn;
                if self.satp_sv39 {
                    rdata |= 8 << 60;
                } else if self.satp_sv48 {
                    rdata |= 9 << 60;
                }
                if wena {
                    match wdata >> 60 {
                        0 => {
                            self.satp_sv39 = false;
                            self.satp_sv48 = false;
                            self.satp_ppn = wdata & 0xFFF_FFFF_FFFF;
                        }
                        8 => {
                            self.satp_sv39 = true;
                            self.satp_sv48 = false;
                            self.satp_ppn = wdata & 0xFFF_FFFF_FFFF;
                        }
                        9 => {
                            self.satp_sv48 = true;
                            self.satp_sv39 = false;
                            self.satp_ppn = wdata & 0xFFF_FFFF_FFFF;
                        }
                        // Unsupported translation modes leave satp as is.
                        _ => {}
                    }
                }
            }
            0x300 => {
                rdata = self.mstatus_read();
                if wena {
                    self.mstatus_write(wdata);
                }
            }
            0x301 => rdata = MISA_VALUE,
            0x302 => {
                rdata = self.medeleg;
                if wena {
                    self.medeleg = wdata & MEDELEG_WRITE_MASK;
                }
            }
            0x303 => {
                rdata = self.mideleg;
                if wena {
                    self.mideleg = wdata & MIDELEG_WRITE_MASK;
                }
            }
            0x304 => {
                rdata = self.mie_read();
                if wena {
                    self.xmode[IDX_S].xsie = wdata >> irq::SSIP & 1 != 0;
                    self.xmode[IDX_M].xsie = wdata >> irq::MSIP & 1 != 0;
                    self.xmode[IDX_S].xtie = wdata >> irq::STIP & 1 != 0;
                    self.xmode[IDX_M].xtie = wdata >> irq::MTIP & 1 != 0;
                    self.xmode[IDX_S].xeie = wdata >> irq::SEIP & 1 != 0;
                    self.xmode[IDX_M].xeie = wdata >> irq::MEIP & 1 != 0;
                }
            }
            0x305 => {
                rdata = self.xmode[IDX_M].xtvec_off | u64::from(self.xmode[IDX_M].xtvec_mode);
                if wena {
                    self.xmode[IDX_M].xtvec_off = wdata & !0x3;
                    self.xmode[IDX_M].xtvec_mode = (wdata & 0x3) as u8;
                }
            }
            0x306 => {
                rdata = u64::from(self.xmode[IDX_M].xcounteren);
                if wena {
                    self.xmode[IDX_M].xcounteren = wdata as u32;
                }
            }
            0x320 => {
                rdata = self.mcountinhibit;
                if wena {
                    self.mcountinhibit = wdata & 0x5;
                }
            }
            0x340 => {
                rdata = self.xmode[IDX_M].xscratch;
                if wena {
                    self.xmode[IDX_M].xscratch = wdata;
                }
            }
            0x341 => {
                rdata = self.xmode[IDX_M].xepc;
                if wena {
                    self.xmode[IDX_M].xepc = wdata;
                }
            }
            0x342 => {
                rdata =
                    (u64::from(self.xmode[IDX_M].xcause_irq) << 63) | self.xmode[IDX_M].xcause_code;
                if wena {
                    self.xmode[IDX_M].xcause_irq = wdata >> 63 != 0;
                    self.xmode[IDX_M].xcause_code = wdata & 0x1F;
                }
            }
            0x343 => {
                rdata = self.xmode[IDX_M].xtval;
                if wena {
                    self.xmode[IDX_M].xtval = wdata;
                }
            }
            0x344 => {
                rdata = self.mip_read(i);
                if wena {
                    self.mip_ssip = wdata >> irq::SSIP & 1 != 0;
                    self.mip_stip = wdata >> irq::STIP & 1 != 0;
                    self.mip_seip = wdata >> irq::SEIP & 1 != 0;
                }
            }
            0x3A0 => {
                for (n, e) in self.pmp.iter().enumerate() {
                    rdata |= u64::from(e.cfg) << (8 * n);
                }
                if wena {
                    for n in 0..PMP_TBL_SIZE {
                        let cfg = (wdata >> (8 * n)) as u8;
                        // Locked entries ignore further writes.
                        if self.pmp[n].cfg & 0x80 == 0 {
                            self.pmp[n].cfg = cfg;
                        }
                    }
                    // Expand the whole table so TOR chaining stays valid.
                    self.pmp_upd_ena = (1 << PMP_TBL_SIZE) - 1;
                    self.pmp_upd_cnt = 0;
                    self.pmp_prev_end = 0;
                }
            }
            0x3B0..=0x3BF => {
                let idx = (addr - 0x3B0) as usize;
                // pmpaddr beyond the table is decoded but inert.
                if idx < PMP_TBL_SIZE {
                    rdata = self.pmp[idx].addr >> 2;
                    if wena && self.pmp[idx].cfg & 0x80 == 0 {
                        self.pmp[idx].addr = wdata << 2;
                        // NAPOT mask grows with the trailing ones; an
                        // all-ones address covers the whole space.
                        let ones = wdata.trailing_ones();
                        self.pmp[idx].mask = if ones >= 61 {
                            u64::MAX
                        } else {
                            (1u64 << (ones + 3)) - 1
                        };
                        self.pmp_upd_ena |= 1 << idx;
                    }
                }
            }
            0x7B0 => {
                rdata = self.dcsr_read();
                if wena {
                    self.dcsr_ebreakm = wdata >> 15 & 1 != 0;
                    self.dcsr_stepie = wdata >> 11 & 1 != 0;
                    self.dcsr_stopcount = wdata >> 10 & 1 != 0;
                    self.dcsr_stoptimer = wdata >> 9 & 1 != 0;
                    self.dcsr_step = wdata >> 2 & 1 != 0;
                }
            }
            0x7B1 => {
                rdata = self.dpc;
                if wena {
                    self.dpc = wdata;
                }
            }
            0x7B2 => {
                rdata = self.dscratch0;
                if wena {
                    self.dscratch0 = wdata;
                }
            }
            0x7B3 => {
                rdata = self.dscratch1;
                if wena {
                    self.dscratch1 = wdata;
                }
            }
            0xB00 => {
                rdata = self.mcycle;
                if wena {
                    self.mcycle = wdata;
                }
            }
            0xB02 => {
                rdata = self.minstret;
                if wena {
                    self.minstret = wdata;
                }
            }
            0xBC0 => {
                rdata = self.mstackovr;
                if wena {
                    self.mstackovr = wdata;
                }
            }
            0xBC1 => {
                rdata = self.mstackund;
                if wena {
                    self.mstackund = wdata;
                }
            }
            0xC00 => {
                if self.counter_blocked(0) {
                    return (0, false);
                }
                rdata = self.mcycle;
            }
            0xC01 => {
                if self.counter_blocked(1) {
                    return (0, false);
                }
                rdata = i.mtime;
            }
            0xC02 => {
                if self.counter_blocked(2) {
                    return (0, false);
                }
                rdata = self.minstret;
            }
            0xF11 => rdata = VENDOR_ID,
            0xF12 => rdata = 0,
            0xF13 => rdata = IMPLEMENTATION_ID,
            0xF14 => rdata = self.hartid,
            _ => return (0, false),
        }
        (rdata, true)
    }

    /// Shadow counters are gated by the `counteren` chain below M-mode.
    fn counter_blocked(&self, bit: u32) -> bool {
        match self.mode {
            PrivMode::User => {
                self.xmode[IDX_M].xcounteren >> bit & 1 == 0
                    || self.xmode[IDX_S].xcounteren >> bit & 1 == 0
            }
            PrivMode::Supervisor => self.xmode[IDX_M].xcounteren >> bit & 1 == 0,
            _ => false,
        }
    }

    /// The S-mode visible interrupt bits.
    fn mideleg_view(&self) -> u64 {
        (1 << irq::SSIP) | (1 << irq::STIP) | (1 << irq::SEIP)
    }

}
