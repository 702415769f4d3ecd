//! Memory management unit (one instance per direction).
//!
//! Sits between a core-side requester (Fetch or MemAccess) and its L1
//! cache. When translation is off, requests pass straight through. When
//! on, the virtual address is tried against the one-entry "last
//! translation" cache, then the TLB, and finally the hardware walker
//! descends the Sv39 (3-level) or Sv48 (4-level) page table, reading
//! PTEs through the same cache port. Valid leaves are inserted into the
//! TLB before the original access is replayed at the physical address.
//! `sfence.vma` schedules a background sweep through the TLB memory.

/// The direct-mapped TLB memory.
pub mod tlb;

use tracing::trace;

use self::tlb::{Tlb, TlbEntry};
use crate::common::MemopType;
use crate::core::memaccess::DataReq;

/// PTE permission byte bits.
pub mod pte {
    /// Valid.
    pub const V: u8 = 1 << 0;
    /// Readable.
    pub const R: u8 = 1 << 1;
    /// Writable.
    pub const W: u8 = 1 << 2;
    /// Executable.
    pub const X: u8 = 1 << 3;
    /// User-accessible.
    pub const U: u8 = 1 << 4;
    /// Accessed.
    pub const A: u8 = 1 << 6;
    /// Dirty.
    pub const D: u8 = 1 << 7;
}

/// Response from the cache toward the MMU's core side.
#[derive(Clone, Copy, Debug, Default)]
pub struct MmuResp {
    /// Core-side (virtual) address of the completed request.
    pub addr: u64,
    /// Response data (64-bit lane).
    pub data: u64,
    /// Bus fault on the read path.
    pub load_fault: bool,
    /// Bus fault on the write path.
    pub store_fault: bool,
    /// Translation fault on an execute access.
    pub page_fault_x: bool,
    /// Translation fault on a read access.
    pub page_fault_r: bool,
    /// Translation fault on a write access.
    pub page_fault_w: bool,
}

/// Cache-side response consumed by the MMU.
#[derive(Clone, Copy, Debug, Default)]
pub struct CacheResp {
    /// Physical address of the completed request.
    pub addr: u64,
    /// Response data.
    pub data: u64,
    /// Bus fault on the read path.
    pub load_fault: bool,
    /// Bus fault on the write path.
    pub store_fault: bool,
}

/// Inputs sampled by the MMU each cycle.
#[derive(Clone, Copy, Debug, Default)]
pub struct MmuInputs {
    /// Core-side request.
    pub core_req: Option<DataReq>,
    /// The cache accepts a request this cycle.
    pub mem_req_ready: bool,
    /// Cache-side response.
    pub mem_resp: Option<CacheResp>,
    /// Translation enabled by the CSR block.
    pub mmu_ena: bool,
    /// Three-level scheme selected.
    pub sv39: bool,
    /// Four-level scheme selected.
    pub sv48: bool,
    /// Root page-table PPN from `satp`.
    pub ppn: u64,
    /// `mstatus.MPRV` modifies M-mode data accesses.
    pub mprv: bool,
    /// Make-executable-readable.
    pub mxr: bool,
    /// Permit-supervisor-user-memory (reserved for the access layer).
    pub sum: bool,
    /// TLB sweep request (`sfence.vma`).
    pub fence: bool,
    /// Address operand of the sweep; zero sweeps everything.
    pub fence_addr: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
enum MmuState {
    #[default]
    Idle,
    WaitRespNoMmu,
    WaitRespLast,
    CheckTlb,
    CacheReq,
    WaitResp,
    HandleResp,
    UpdateTlb,
    AcceptCore,
    FlushTlb,
}

/// One MMU direction.
pub struct Mmu {
    /// Instruction-side instance: requests check X instead of R/W.
    fetch_path: bool,
    state: MmuState,
    tlb: Tlb,

    // One-entry "last translation" cache.
    last_va: u64,
    last_pa: u64,
    last_permission: u8,
    last_page_size: u8,
    last_mmu_ena: bool,

    // Saved request and its access classification.
    req: DataReq,
    req_x: bool,
    req_r: bool,
    req_w: bool,
    tlb_hit: bool,

    // Walker state.
    tlb_level: u8,
    tlb_page_size: u8,
    req_pa: u64,
    resp_data: u64,
    resp_load_fault: bool,
    resp_store_fault: bool,
    ex_page_fault: bool,
    tlb_wdata: TlbEntry,

    // Flush sweep.
    req_flush: bool,
    tlb_flush_cnt: usize,
    tlb_flush_adr: usize,

    // Per-cycle outputs.
    core_req_ready: bool,
    core_resp: Option<MmuResp>,
    mem_req: Option<DataReq>,

    /// Observability counter: TLB and last-translation hits.
    pub tlb_hits: u64,
    /// Observability counter: page-table walks started.
    pub walks: u64,
}

impl Mmu {
    /// Creates an MMU; `fetch_path` selects execute-permission checks.
    pub fn new(fetch_path: bool) -> Self {
        Self {
            fetch_path,
            state: MmuState::Idle,
            tlb: Tlb::new(),
            last_va: u64::MAX,
            last_pa: u64::MAX,
            last_permission: 0,
            last_page_size: 0,
            last_mmu_ena: false,
            req: DataReq::default(),
            req_x: false,
            req_r: false,
            req_w: false,
            tlb_hit: false,
            tlb_level: 0,
            tlb_page_size: 0,
            req_pa: 0,
            resp_data: 0,
            resp_load_fault: false,
            resp_store_fault: false,
            ex_page_fault: false,
            tlb_wdata: TlbEntry::default(),
            req_flush: false,
            tlb_flush_cnt: 0,
            tlb_flush_adr: 0,
            core_req_ready: false,
            core_resp: None,
            mem_req: None,
            tlb_hits: 0,
            walks: 0,
        }
    }

    /// The MMU accepts a core request this cycle.
    pub fn core_req_ready(&self) -> bool {
        self.core_req_ready
    }

    /// Response toward the core side.
    pub fn core_resp(&self) -> Option<&MmuResp> {
        self.core_resp.as_ref()
    }

    /// Request toward the cache.
    pub fn mem_req(&self) -> Option<&DataReq> {
        self.mem_req.as_ref()
    }

    /// Direct TLB access for tests.
    pub fn tlb(&mut self) -> &mut Tlb {
        &mut self.tlb
    }

    /// Advances one cycle.
    pub fn step(&mut self, i: &MmuInputs) {
        self.core_req_ready = false;
        self.core_resp = None;
        self.mem_req = None;

        if i.fence {
            self.req_flush = true;
            self.tlb_flush_cnt = if i.fence_addr == 0 { Tlb::len() } else { 1 };
            self.tlb_flush_adr = if i.fence_addr == 0 {
                0
            } else {
                Tlb::index(i.fence_addr, 0)
            };
        }

        match self.state {
            MmuState::Idle => {
                self.tlb_hit = false;
                self.resp_load_fault = false;
                self.resp_store_fault = false;
                self.ex_page_fault = false;

                if self.req_flush {
                    self.req_flush = false;
                    self.state = MmuState::FlushTlb;
                    return;
                }

                let Some(req) = i.core_req else {
                    self.core_req_ready = true;
                    return;
                };

                // M-mode with MPRV operates on physical addresses when
                // the VA is not sign-extended into the virtual hole.
                let va_ena = i.mmu_ena && !(i.mprv && req.addr >> 48 == 0);

                if !va_ena {
                    // Pass-through.
                    if i.mem_req_ready {
                        self.core_req_ready = true;
                        self.mem_req = Some(req);
                        self.req = req;
                        self.last_mmu_ena = false;
                        self.state = MmuState::WaitRespNoMmu;
                    }
                    return;
                }

                self.classify(&req);
                self.req = req;

                if self.last_mmu_ena && self.last_match(req.addr) {
                    // Fast path: same page as the previous translation.
                    if self.last_fault() {
                        self.last_va = req.addr;
                        self.ex_page_fault = true;
                        self.state = MmuState::AcceptCore;
                        return;
                    }
                    if i.mem_req_ready {
                        self.core_req_ready = true;
                        let mut phys = req;
                        phys.addr = self.last_translate(req.addr);
                        self.last_va = req.addr;
                        self.mem_req = Some(phys);
                        self.state = MmuState::WaitRespLast;
                    }
                    return;
                }

                self.core_req_ready = true;
                self.last_va = req.addr;
                self.last_mmu_ena = true;
                self.state = MmuState::CheckTlb;
            }
            MmuState::WaitRespNoMmu => {
                if let Some(r) = i.mem_resp {
                    self.core_resp = Some(MmuResp {
                        addr: r.addr,
                        data: r.data,
                        load_fault: r.load_fault,
                        store_fault: r.store_fault,
                        ..MmuResp::default()
                    });
                    self.state = MmuState::Idle;
                }
            }
            MmuState::WaitRespLast => {
                if let Some(r) = i.mem_resp {
                    self.core_resp = Some(MmuResp {
                        addr: self.last_va,
                        data: r.data,
                        load_fault: r.load_fault,
                        store_fault: r.store_fault,
                        ..MmuResp::default()
                    });
                    self.state = MmuState::Idle;
                }
            }
            MmuState::CheckTlb => {
                let entry = *self.tlb.read(self.last_va, self.last_page_size);
                if entry.matches(self.last_va) {
                    self.tlb_hits += 1;
                    // TLB hit: permissions travel with the entry.
                    if self.permission_fault(entry.permission, i.mxr) {
                        self.ex_page_fault = true;
                        self.state = MmuState::AcceptCore;
                        return;
                    }
                    self.tlb_hit = true;
                    self.last_pa = entry.ppn;
                    self.last_permission = entry.permission;
                    self.last_page_size = entry.page_size;
                    self.req_pa = entry.translate(self.last_va);
                    self.state = MmuState::CacheReq;
                } else {
                    // TLB miss: start the walk at the root table.
                    self.walks += 1;
                    if i.sv39 {
                        self.tlb_level = 2;
                        self.tlb_page_size = 2;
                        self.req_pa = pte_addr(i.ppn, self.last_va, 2);
                    } else {
                        self.tlb_level = 1;
                        self.tlb_page_size = 3;
                        self.req_pa = pte_addr(i.ppn, self.last_va, 3);
                    }
                    self.state = MmuState::CacheReq;
                }
            }
            MmuState::CacheReq => {
                let req = if self.tlb_hit {
                    let mut phys = self.req;
                    phys.addr = self.req_pa;
                    phys
                } else {
                    // Walker PTE load.
                    DataReq {
                        mtype: MemopType::LOAD_OP,
                        addr: self.req_pa,
                        wdata: 0,
                        wstrb: 0,
                        size: 3,
                    }
                };
                self.mem_req = Some(req);
                if i.mem_req_ready {
                    self.state = MmuState::WaitResp;
                }
            }
            MmuState::WaitResp => {
                if let Some(r) = i.mem_resp {
                    self.resp_data = r.data;
                    self.resp_load_fault = r.load_fault;
                    self.resp_store_fault = r.store_fault;
                    if self.tlb_hit || r.load_fault || r.store_fault {
                        self.state = MmuState::AcceptCore;
                    } else {
                        self.state = MmuState::HandleResp;
                    }
                }
            }
            MmuState::HandleResp => self.handle_pte(i),
            MmuState::UpdateTlb => {
                // Translation finished: install and replay the access.
                self.tlb.insert(self.tlb_wdata);
                self.tlb_hit = true;
                self.state = MmuState::CacheReq;
            }
            MmuState::AcceptCore => {
                self.core_resp = Some(MmuResp {
                    addr: self.last_va,
                    data: self.resp_data,
                    load_fault: self.resp_load_fault,
                    store_fault: self.resp_store_fault,
                    page_fault_x: self.ex_page_fault && self.req_x,
                    page_fault_r: self.ex_page_fault && self.req_r,
                    page_fault_w: self.ex_page_fault && self.req_w,
                });
                if self.ex_page_fault {
                    self.last_va = u64::MAX;
                    self.last_pa = u64::MAX;
                }
                self.state = MmuState::Idle;
            }
            MmuState::FlushTlb => {
                self.last_va = u64::MAX;
                self.last_pa = u64::MAX;
                self.last_mmu_ena = false;
                self.tlb.invalidate_index(self.tlb_flush_adr);
                if self.tlb_flush_cnt <= 1 {
                    self.state = MmuState::Idle;
                } else {
                    self.tlb_flush_cnt -= 1;
                    self.tlb_flush_adr += 1;
                }
            }
        }
    }

    /// Access classification from the request shape.
    fn classify(&mut self, req: &DataReq) {
        self.req_x = self.fetch_path;
        self.req_r = !self.fetch_path && (!req.mtype.is_store() || req.mtype.is_reserve());
        self.req_w = !self.fetch_path && req.mtype.is_store() && !req.mtype.is_reserve();
    }

    /// Permission check per the leaf rules.
    fn permission_fault(&self, perm: u8, mxr: bool) -> bool {
        if perm & pte::A == 0 {
            return true;
        }
        if self.req_x && perm & pte::X == 0 {
            return true;
        }
        if self.req_r {
            let readable = perm & pte::R != 0 || (mxr && perm & pte::X != 0);
            if !readable {
                return true;
            }
        }
        if self.req_w && (perm & pte::W == 0 || perm & pte::D == 0) {
            return true;
        }
        false
    }

    /// "Last translation" fault re-check for the fast path.
    fn last_fault(&self) -> bool {
        let perm = self.last_permission;
        if perm & pte::A == 0 {
            return true;
        }
        if self.req_x && perm & pte::X == 0 {
            return true;
        }
        if self.req_r && perm & pte::R == 0 {
            return true;
        }
        if self.req_w && (perm & pte::W == 0 || perm & pte::D == 0) {
            return true;
        }
        false
    }

    fn last_match(&self, va: u64) -> bool {
        let shift = 12 + 9 * u32::from(self.last_page_size);
        va >> shift == self.last_va >> shift
    }

    fn last_translate(&self, va: u64) -> u64 {
        let shift = 12 + 9 * u32::from(self.last_page_size);
        ((self.last_pa << 12) >> shift << shift) | (va & ((1u64 << shift) - 1))
    }

    /// Leaf/pointer decision on a fetched PTE.
    fn handle_pte(&mut self, i: &MmuInputs) {
        let pte_raw = self.resp_data;
        let perm = (pte_raw & 0xFF) as u8;
        let ppn = (pte_raw >> 10) & 0xFFF_FFFF_FFFF;

        let invalid = perm & pte::V == 0 || (perm & pte::R == 0 && perm & pte::W != 0);
        if invalid {
            self.ex_page_fault = true;
            self.state = MmuState::AcceptCore;
            return;
        }

        if perm & (pte::R | pte::W | pte::X) == 0 {
            // Pointer to the next level.
            if self.tlb_page_size == 0 {
                self.ex_page_fault = true;
                self.state = MmuState::AcceptCore;
                return;
            }
            self.tlb_level += 1;
            self.tlb_page_size -= 1;
            self.req_pa = pte_addr(ppn, self.last_va, self.tlb_page_size);
            self.state = MmuState::CacheReq;
            return;
        }

        // Leaf: permission check and TLB install.
        if self.permission_fault(perm, i.mxr) {
            self.ex_page_fault = true;
            self.state = MmuState::AcceptCore;
            return;
        }

        let shift = 12 + 9 * u32::from(self.tlb_page_size);
        let pa = ((ppn << 12) >> shift << shift) | (self.last_va & ((1u64 << shift) - 1));
        self.last_permission = perm;
        self.last_page_size = self.tlb_page_size;
        self.last_pa = pa >> 12;
        self.req_pa = pa;
        self.tlb_wdata = TlbEntry {
            va_tag: self.last_va >> 12,
            ppn: pa >> 12,
            page_size: self.tlb_page_size,
            permission: perm,
            valid: true,
        };
        trace!(
            va = format_args!("{:#x}", self.last_va),
            pa = format_args!("{pa:#x}"),
            size = self.tlb_page_size,
            "tlb fill"
        );
        self.state = MmuState::UpdateTlb;
    }
}

/// PTE address for one walk level.
fn pte_addr(table_ppn: u64, va: u64, page_size: u8) -> u64 {
    let vpn_shift = 12 + 9 * u32::from(page_size);
    let vpn = (va >> vpn_shift) & 0x1FF;
    (table_ppn << 12) + vpn * 8
}
