//! Memory-access stage.
//!
//! A queue-backed stage between Execute and the data MMU/D-cache. On
//! enqueue the entry carries the complete transaction descriptor; byte
//! lanes are replicated according to the access size so a narrow store
//! broadcasts across the 64-bit bus with the proper strobe. Loads
//! sign- or zero-extend their result according to the stored flag and
//! retire through the write-back arbiter.

use std::collections::VecDeque;

use crate::common::error::Exception;
use crate::common::line::{extract_rdata, replicate_wdata};
use crate::common::MemopType;
use crate::config::defaults::MEMACCESS_QUEUE_DEPTH;
use crate::core::regfile::RegWrite;

/// One memory operation issued by Execute.
#[derive(Clone, Copy, Debug, Default)]
pub struct Memop {
    /// Operation type bits.
    pub mtype: MemopType,
    /// log2 of the access width.
    pub size: u8,
    /// Sign-extend the load result.
    pub sign_ext: bool,
    /// Byte address.
    pub addr: u64,
    /// Store data (pre-replication).
    pub wdata: u64,
    /// Destination register for the load/SC result (0 = none).
    pub waddr: usize,
    /// Write tag captured at issue.
    pub wtag: u8,
    /// PC of the issuing instruction.
    pub pc: u64,
    /// Raw instruction (trace fidelity).
    pub instr: u32,
    /// Debug-port access: faults become response errors, not traps.
    pub debug: bool,
}

/// Request presented to the data MMU / D-cache.
#[derive(Clone, Copy, Debug, Default)]
pub struct DataReq {
    /// Operation type bits.
    pub mtype: MemopType,
    /// Byte address.
    pub addr: u64,
    /// Lane-replicated store data.
    pub wdata: u64,
    /// Per-byte lane strobe.
    pub wstrb: u8,
    /// log2 of the access width.
    pub size: u8,
}

/// Response from the data MMU / D-cache.
#[derive(Clone, Copy, Debug, Default)]
pub struct DataResp {
    /// Address the response belongs to (virtual on the core side).
    pub addr: u64,
    /// 64-bit lane data (loads) or the SC status code.
    pub data: u64,
    /// Bus fault on the read path.
    pub load_fault: bool,
    /// Bus fault on the write path.
    pub store_fault: bool,
    /// Translation fault, load side.
    pub page_fault_r: bool,
    /// Translation fault, store side.
    pub page_fault_w: bool,
}

/// Memory fault forwarded to Execute for trap entry.
#[derive(Clone, Copy, Debug)]
pub struct MemFault {
    /// Exception classification.
    pub ex: Exception,
    /// Faulting address.
    pub addr: u64,
    /// PC of the faulting memop.
    pub pc: u64,
    /// The memop came from the debug port.
    pub debug: bool,
}

/// Completion event for Execute's in-flight bookkeeping.
#[derive(Clone, Copy, Debug)]
pub struct MemComplete {
    /// PC of the completed memop.
    pub pc: u64,
    /// Result value visible to the register file.
    pub data: u64,
    /// The completed operation was a store (no register result).
    pub store: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
enum MemState {
    #[default]
    Idle,
    WaitReqAccept,
    WaitResponse,
    Hold,
}

/// Inputs sampled by the stage each cycle.
#[derive(Clone, Copy, Debug, Default)]
pub struct MemAccessInputs {
    /// New memop from Execute (accepted only while `memop_ready`).
    pub memop: Option<Memop>,
    /// The data path accepts a request this cycle.
    pub dmem_req_ready: bool,
    /// Response from the data path.
    pub dmem_resp: Option<DataResp>,
    /// The write-back arbiter can take the load result.
    pub wb_ready: bool,
}

/// The memory-access stage.
pub struct MemAccess {
    state: MemState,
    queue: VecDeque<Memop>,
    /// Memop whose cache transaction is in flight.
    active: Option<Memop>,
    /// Load result held while write-back is busy.
    held: Option<RegWrite>,
    dmem_req: Option<DataReq>,
    wb: Option<RegWrite>,
    fault: Option<MemFault>,
    complete: Option<MemComplete>,
}

impl MemAccess {
    /// Creates an empty stage.
    pub fn new() -> Self {
        Self {
            state: MemState::Idle,
            queue: VecDeque::with_capacity(MEMACCESS_QUEUE_DEPTH),
            active: None,
            held: None,
            dmem_req: None,
            wb: None,
            fault: None,
            complete: None,
        }
    }

    /// The stage can accept a new memop this cycle.
    pub fn memop_ready(&self) -> bool {
        self.queue.len() < MEMACCESS_QUEUE_DEPTH
    }

    /// The stage holds no transaction at all (fence data barrier).
    pub fn idle(&self) -> bool {
        self.state == MemState::Idle && self.queue.is_empty() && self.active.is_none()
    }

    /// Advances one cycle.
    pub fn step(&mut self, i: &MemAccessInputs) {
        self.wb = None;
        self.fault = None;
        self.complete = None;

        // Pipeline flushes never reach the queue: every entry here was
        // already retired in program order and must drain to memory.
        if let Some(m) = i.memop {
            if self.memop_ready() {
                self.queue.push_back(m);
            }
        }

        match self.state {
            MemState::Idle => {
                if let Some(m) = self.queue.pop_front() {
                    let (wdata, wstrb) = replicate_wdata(m.addr, m.size, m.wdata);
                    self.dmem_req = Some(DataReq {
                        mtype: m.mtype,
                        addr: m.addr,
                        wdata,
                        wstrb: if m.mtype.is_store() { wstrb } else { 0 },
                        size: m.size,
                    });
                    self.active = Some(m);
                    self.state = MemState::WaitReqAccept;
                }
            }
            MemState::WaitReqAccept => {
                if i.dmem_req_ready {
                    self.dmem_req = None;
                    self.state = MemState::WaitResponse;
                }
            }
            MemState::WaitResponse => {
                if let Some(resp) = i.dmem_resp {
                    let m = self.active.take().unwrap_or_default();
                    self.finish(&m, &resp, i.wb_ready);
                }
            }
            MemState::Hold => {
                if i.wb_ready {
                    self.wb = self.held.take();
                    self.state = MemState::Idle;
                }
            }
        }
    }

    fn finish(&mut self, m: &Memop, resp: &DataResp, wb_ready: bool) {
        let store = m.mtype.is_store() && !m.mtype.is_release();

        if resp.load_fault || resp.store_fault || resp.page_fault_r || resp.page_fault_w {
            let ex = if resp.page_fault_w {
                Exception::StorePageFault
            } else if resp.page_fault_r {
                Exception::LoadPageFault
            } else if resp.store_fault {
                Exception::StoreFault
            } else {
                Exception::LoadFault
            };
            self.fault = Some(MemFault {
                ex,
                addr: m.addr,
                pc: m.pc,
                debug: m.debug,
            });
            self.state = MemState::Idle;
            return;
        }

        let mut value = resp.data;
        if !m.mtype.is_store() {
            value = extract_rdata(m.addr, m.size, m.sign_ext, resp.data);
        }
        if m.mtype.is_release() {
            // SC result is the raw success/failure code.
            value = resp.data;
        }

        self.complete = Some(MemComplete {
            pc: m.pc,
            data: value,
            store,
        });

        if m.waddr != 0 {
            let w = RegWrite {
                addr: m.waddr,
                data: value,
                tag: m.wtag,
            };
            if wb_ready {
                self.wb = Some(w);
                self.state = MemState::Idle;
            } else {
                self.held = Some(w);
                self.state = MemState::Hold;
            }
        } else {
            self.state = MemState::Idle;
        }
    }

    /// Request presented to the data path this cycle.
    pub fn dmem_req(&self) -> Option<&DataReq> {
        self.dmem_req.as_ref()
    }

    /// Write-back port toward the register file.
    pub fn wb(&self) -> Option<&RegWrite> {
        self.wb.as_ref()
    }

    /// Fault raised by the completed memop, if any.
    pub fn fault(&self) -> Option<&MemFault> {
        self.fault.as_ref()
    }

    /// Completion event for Execute.
    pub fn complete(&self) -> Option<&MemComplete> {
        self.complete.as_ref()
    }
}

impl Default for MemAccess {
    fn default() -> Self {
        Self::new()
    }
}
