//! Debug port.
//!
//! Services the abstract-command and memory-access path of an external
//! debug module. Requests select one of five kinds by type bits:
//! register access (CSR space, register bank or the stack-trace region),
//! physical/virtual memory access (routed through MemAccess via Execute),
//! and program-buffer execution. CSR-space accesses travel over the same
//! two-master command interconnect Execute uses. The port also owns the
//! stack-trace ring buffer pushed on calls and popped on returns.

use crate::common::error::ProgbufError;
use crate::common::{REGS_TOTAL, csr_req, dport_req};
use crate::config::defaults::{PROGBUF_REG_TOTAL, STACK_TRACE_BUF_SIZE};
use crate::core::csr::{CsrCommand, CsrResponse};
use crate::core::execute::{DbgMemRequest, DbgMemResponse};
use crate::core::regfile::RegFile;

/// Request from the external debug module.
#[derive(Clone, Copy, Debug, Default)]
pub struct DportRequest {
    /// Request kind bits (`dport_req::*`).
    pub dtype: u8,
    /// Register/CSR address or memory address.
    pub addr: u64,
    /// Write data.
    pub wdata: u64,
    /// log2 of the memory access width.
    pub size: u8,
}

/// Response toward the external debug module.
#[derive(Clone, Copy, Debug, Default)]
pub struct DportResponse {
    /// The command failed (misalignment, bus error, progbuf error).
    pub error: bool,
    /// Read data.
    pub rdata: u64,
}

/// Register-bank base inside the debug address map.
const REG_BANK_BASE: u64 = 0x1000;
/// Stack-trace counter address.
const STKTR_CNT_ADDR: u64 = 0xC040;
/// First stack-trace buffer slot.
const STKTR_BUF_BASE: u64 = 0xC080;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
enum DportState {
    #[default]
    Idle,
    CsrRegion,
    ExecProgbuf,
    AbstractMem,
    WaitToAccept,
}

/// Inputs sampled by the debug port each cycle.
#[derive(Clone, Copy, Debug, Default)]
pub struct DportInputs {
    /// Request presented by the debug module.
    pub req: Option<DportRequest>,
    /// The debug module consumes the response this cycle.
    pub resp_ready: bool,
    /// The hart is halted.
    pub e_halted: bool,
    /// Memory-access completion from Execute.
    pub dbg_mem_resp: Option<DbgMemResponse>,
    /// Our CSR command was granted this cycle.
    pub csr_req_accepted: bool,
    /// CSR response routed to this master.
    pub csr_resp: Option<CsrResponse>,
    /// CSR reports progbuf completion.
    pub progbuf_end: bool,
    /// CSR reports progbuf failure.
    pub progbuf_error: bool,
    /// Execute retired a call this cycle.
    pub e_call: bool,
    /// Execute retired a return this cycle.
    pub e_ret: bool,
    /// PC of the retired call/return.
    pub e_pc: u64,
    /// Its target.
    pub e_npc: u64,
}

/// The debug port.
pub struct DebugPort {
    state: DportState,
    resp: Option<DportResponse>,
    progbuf: [u32; PROGBUF_REG_TOTAL],
    progbuf_exec: bool,
    dbg_mem: Option<DbgMemRequest>,
    csr_req: Option<CsrCommand>,

    stktr: [(u64, u64); STACK_TRACE_BUF_SIZE],
    stktr_cnt: usize,
}

impl DebugPort {
    /// Creates an idle debug port.
    pub fn new() -> Self {
        Self {
            state: DportState::Idle,
            resp: None,
            progbuf: [0; PROGBUF_REG_TOTAL],
            progbuf_exec: false,
            dbg_mem: None,
            csr_req: None,
            stktr: [(0, 0); STACK_TRACE_BUF_SIZE],
            stktr_cnt: 0,
        }
    }

    /// Program buffer contents for Fetch.
    pub fn progbuf(&self) -> [u32; PROGBUF_REG_TOTAL] {
        self.progbuf
    }

    /// Loads one program buffer word (written by the debug module).
    pub fn write_progbuf(&mut self, idx: usize, word: u32) {
        if idx < PROGBUF_REG_TOTAL {
            self.progbuf[idx] = word;
        }
    }

    /// Progbuf execution request toward Execute (single-cycle pulse).
    pub fn progbuf_exec(&self) -> bool {
        self.progbuf_exec
    }

    /// Abstract memory access toward Execute.
    pub fn dbg_mem(&self) -> Option<DbgMemRequest> {
        self.dbg_mem
    }

    /// CSR command presented to the interconnect.
    pub fn csr_req(&self) -> Option<CsrCommand> {
        self.csr_req
    }

    /// Response toward the debug module.
    pub fn resp(&self) -> Option<&DportResponse> {
        self.resp.as_ref()
    }

    /// Advances one cycle.
    pub fn step(&mut self, i: &DportInputs, regs: &mut RegFile) {
        self.progbuf_exec = false;
        if i.csr_req_accepted {
            self.csr_req = None;
        }

        // Stack-trace ring: pushed on calls, popped on returns.
        if i.e_call {
            self.stktr[self.stktr_cnt] = (i.e_pc, i.e_npc);
            self.stktr_cnt = (self.stktr_cnt + 1) % STACK_TRACE_BUF_SIZE;
        } else if i.e_ret && self.stktr_cnt > 0 {
            self.stktr_cnt -= 1;
        }

        match self.state {
            DportState::Idle => {
                let Some(req) = i.req else {
                    return;
                };
                let write = req.dtype & dport_req::WRITE != 0;

                if req.dtype & dport_req::REG_ACCESS != 0 {
                    if req.addr < REG_BANK_BASE {
                        // CSR region goes over the command interconnect.
                        self.csr_req = Some(CsrCommand {
                            ctype: if write { csr_req::WRITE } else { csr_req::READ },
                            addr: req.addr as u16,
                            data: req.wdata,
                        });
                        self.state = DportState::CsrRegion;
                    } else {
                        let resp = self.reg_access(&req, write, regs);
                        self.resp = Some(resp);
                        self.state = DportState::WaitToAccept;
                    }
                } else if req.dtype & (dport_req::MEM_ACCESS | dport_req::MEM_VIRTUAL) != 0 {
                    let align = (1u64 << req.size) - 1;
                    if req.addr & align != 0 {
                        // Misaligned debug access: error, no bus traffic.
                        self.resp = Some(DportResponse {
                            error: true,
                            rdata: 0,
                        });
                        self.state = DportState::WaitToAccept;
                    } else if i.e_halted {
                        self.dbg_mem = Some(DbgMemRequest {
                            write,
                            addr: req.addr,
                            wdata: req.wdata,
                            size: req.size,
                        });
                        self.state = DportState::AbstractMem;
                    } else {
                        self.resp = Some(DportResponse {
                            error: true,
                            rdata: u64::from(ProgbufError::HaltResume as u8),
                        });
                        self.state = DportState::WaitToAccept;
                    }
                } else if req.dtype & dport_req::PROGEXEC != 0 {
                    if i.e_halted {
                        self.progbuf_exec = true;
                        self.state = DportState::ExecProgbuf;
                    } else {
                        self.resp = Some(DportResponse {
                            error: true,
                            rdata: u64::from(ProgbufError::HaltResume as u8),
                        });
                        self.state = DportState::WaitToAccept;
                    }
                } else {
                    self.resp = Some(DportResponse {
                        error: true,
                        rdata: u64::from(ProgbufError::NotSupported as u8),
                    });
                    self.state = DportState::WaitToAccept;
                }
            }
            DportState::CsrRegion => {
                if let Some(r) = i.csr_resp {
                    self.resp = Some(DportResponse {
                        error: r.exception,
                        rdata: r.data,
                    });
                    self.state = DportState::WaitToAccept;
                }
            }
            DportState::ExecProgbuf => {
                if i.progbuf_error {
                    self.resp = Some(DportResponse {
                        error: true,
                        rdata: u64::from(ProgbufError::Exception as u8),
                    });
                    self.state = DportState::WaitToAccept;
                } else if i.progbuf_end {
                    self.resp = Some(DportResponse {
                        error: false,
                        rdata: 0,
                    });
                    self.state = DportState::WaitToAccept;
                }
            }
            DportState::AbstractMem => {
                if let Some(r) = i.dbg_mem_resp {
                    self.dbg_mem = None;
                    self.resp = Some(DportResponse {
                        error: r.error,
                        rdata: r.rdata,
                    });
                    self.state = DportState::WaitToAccept;
                }
            }
            DportState::WaitToAccept => {
                if i.resp_ready {
                    self.resp = None;
                    self.state = DportState::Idle;
                }
            }
        }
    }

    /// Register-bank and stack-trace region decode.
    fn reg_access(&mut self, req: &DportRequest, write: bool, regs: &mut RegFile) -> DportResponse {
        let addr = req.addr;
        let mut rdata = 0;
        let mut error = false;

        if (REG_BANK_BASE..REG_BANK_BASE + REGS_TOTAL as u64).contains(&addr) {
            let idx = (addr - REG_BANK_BASE) as usize;
            if write {
                regs.dport_write(idx, req.wdata);
            } else {
                rdata = regs.dport_read(idx);
            }
        } else if addr == STKTR_CNT_ADDR {
            rdata = self.stktr_cnt as u64;
            if write {
                self.stktr_cnt = (req.wdata as usize) % STACK_TRACE_BUF_SIZE;
            }
        } else if (STKTR_BUF_BASE..STKTR_BUF_BASE + 2 * STACK_TRACE_BUF_SIZE as u64)
            .contains(&addr)
        {
            // Each entry occupies two slots: the call site and its target.
            let off = (addr - STKTR_BUF_BASE) as usize;
            let entry = self.stktr[off / 2 % STACK_TRACE_BUF_SIZE];
            rdata = if off & 1 == 0 { entry.0 } else { entry.1 };
        } else {
            error = true;
        }

        DportResponse { error, rdata }
    }
}

impl Default for DebugPort {
    fn default() -> Self {
        Self::new()
    }
}
