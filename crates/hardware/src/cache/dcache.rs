//! Data L1 cache.
//!
//! N-way LRU write-back cache with snoop coherence and LR/SC reservation
//! tracking. One state machine serves the CPU port, the external bus and
//! the snoop channel:
//! - a store hitting a Shared line upgrades it with `WriteLineUnique`
//!   before other caches may observe the data;
//! - a miss with a dirty victim offloads the victim (`WriteBack`) before
//!   refilling with `ReadMakeUnique` (stores) or `ReadShared` (loads);
//! - uncached regions (per PMA) bypass the line storage with narrow
//!   `ReadNoSnoop`/`WriteNoSnoop` transactions;
//! - SC succeeds only on a line still carrying the reservation flag and
//!   reports 0/1 on the load-data channel;
//! - snoops are serviced opportunistically while the machine waits on
//!   the bus, restoring the interrupted transaction afterwards;
//! - the flush engine walks the tag space offloading dirty lines, and
//!   the power-on reset walk writes invalid tags without bus traffic.

use tracing::trace;

use super::pma::Pma;
use super::pmp::Pmp;
use super::tagmem::{TagMem, fl};
use crate::common::line::CacheLine;
use crate::common::{BusReqType, snoop_type};
use crate::config::CacheConfig;
use crate::config::defaults::{L1_BYTES_PER_LINE, LOG2_L1_BYTES_PER_LINE};
use crate::core::memaccess::DataReq;
use crate::core::mmu::CacheResp;

/// Response from the external bus toward a cache.
#[derive(Clone, Copy, Debug, Default)]
pub struct BusResponse {
    /// Line-wide read data (ignored for write acknowledgements).
    pub data: CacheLine,
    /// Read-path bus fault.
    pub load_fault: bool,
    /// Write-path bus fault.
    pub store_fault: bool,
}

/// Outbound bus request of one cache (path added by the arbiter).
#[derive(Clone, Copy, Debug)]
pub struct CacheBusReq {
    /// Transaction type.
    pub rtype: BusReqType,
    /// log2 of the transfer size.
    pub size: u8,
    /// Physical address.
    pub addr: u64,
    /// Per-byte strobe across the line.
    pub strob: u32,
    /// Write data.
    pub data: CacheLine,
}

/// Snoop request from the interconnect.
#[derive(Clone, Copy, Debug, Default)]
pub struct SnoopRequest {
    /// Type bits (`snoop_type::*`); zero checks flags only.
    pub stype: u8,
    /// Line address.
    pub addr: u64,
}

/// Snoop response toward the interconnect.
#[derive(Clone, Copy, Debug, Default)]
pub struct SnoopResponse {
    /// Line data.
    pub data: CacheLine,
    /// Line flags at the time of the probe.
    pub flags: u8,
}

/// Inputs sampled by the D-cache each cycle.
#[derive(Clone, Copy, Debug, Default)]
pub struct DCacheInputs {
    /// CPU-side request (from the data MMU).
    pub req: Option<DataReq>,
    /// The arbiter queue accepts a bus request.
    pub mem_req_ready: bool,
    /// Bus response steered to this cache.
    pub mem_resp: Option<BusResponse>,
    /// Snoop probe.
    pub snoop: Option<SnoopRequest>,
    /// Flush request; bit 0 selects flush-all.
    pub flush: Option<u64>,
    /// PMP checks are active.
    pub pmp_active: bool,
    /// Coherence protocol enabled.
    pub coherence_ena: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DState {
    Idle,
    CheckHit,
    TranslateAddress,
    WaitGrant,
    WaitResp,
    CheckResp,
    SetupReadAdr,
    WriteBus,
    FlushAddr,
    FlushCheck,
    Reset,
    ResetWrite,
    SnoopSetupAddr,
    SnoopReadData,
}

/// The data L1 cache.
pub struct DCacheLru {
    mem: TagMem,
    way_bits: u32,
    flush_all_value: u64,

    state: DState,
    req: DataReq,
    load_fault: bool,
    write_first: bool,
    write_flush: bool,
    write_share: bool,
    /// Refill data latched from the bus.
    cache_line_i: CacheLine,
    mem_req: Option<CacheBusReq>,

    req_flush: bool,
    req_flush_all: bool,
    req_flush_addr: u64,
    req_flush_cnt: u64,
    flush_cnt: u64,
    /// Line captured by the flush walk.
    flush_line_addr: u64,
    flush_line_flags: u8,
    flush_line_data: CacheLine,

    snoop_stype: u8,
    snoop_addr: u64,
    snoop_restore_wait_resp: bool,
    snoop_restore_write_bus: bool,
    req_addr_restore: u64,

    // Per-cycle outputs.
    req_ready: bool,
    resp: Option<CacheResp>,
    snoop_ready: bool,
    snoop_resp: Option<SnoopResponse>,
    flush_end: bool,

    /// Observability counter: hits served from the line storage.
    pub hits: u64,
    /// Observability counter: misses that went to the bus.
    pub misses: u64,
    /// Observability counter: dirty lines offloaded.
    pub writebacks: u64,
}

impl DCacheLru {
    /// Creates the cache in its power-on reset walk.
    pub fn new(config: &CacheConfig) -> Self {
        let flush_all_value = (1u64 << (config.index_bits + config.way_bits)) - 1;
        Self {
            mem: TagMem::new(config),
            way_bits: config.way_bits,
            flush_all_value,
            state: DState::Reset,
            req: DataReq::default(),
            load_fault: false,
            write_first: false,
            write_flush: false,
            write_share: false,
            cache_line_i: CacheLine::ZERO,
            mem_req: None,
            req_flush: false,
            req_flush_all: false,
            req_flush_addr: 0,
            req_flush_cnt: 0,
            flush_cnt: flush_all_value,
            flush_line_addr: 0,
            flush_line_flags: 0,
            flush_line_data: CacheLine::ZERO,
            snoop_stype: 0,
            snoop_addr: 0,
            snoop_restore_wait_resp: false,
            snoop_restore_write_bus: false,
            req_addr_restore: 0,
            req_ready: false,
            resp: None,
            snoop_ready: false,
            snoop_resp: None,
            flush_end: false,
            hits: 0,
            misses: 0,
            writebacks: 0,
        }
    }

    /// CPU-side request accepted this cycle.
    pub fn req_ready(&self) -> bool {
        self.req_ready
    }

    /// CPU-side response.
    pub fn resp(&self) -> Option<&CacheResp> {
        self.resp.as_ref()
    }

    /// Bus request presented to the arbiter.
    pub fn mem_req(&self) -> Option<&CacheBusReq> {
        self.mem_req.as_ref()
    }

    /// Snoop probe accepted this cycle.
    pub fn snoop_ready(&self) -> bool {
        self.snoop_ready
    }

    /// Snoop response.
    pub fn snoop_resp(&self) -> Option<&SnoopResponse> {
        self.snoop_resp.as_ref()
    }

    /// Flush walk finished this cycle.
    pub fn flush_end(&self) -> bool {
        self.flush_end
    }

    /// Word index of the request inside its line.
    fn ridx(addr: u64) -> usize {
        ((addr >> 3) as usize) & (L1_BYTES_PER_LINE / 8 - 1)
    }

    fn line_base(addr: u64) -> u64 {
        addr & !((L1_BYTES_PER_LINE as u64) - 1)
    }

    /// Advances one cycle.
    pub fn step(&mut self, i: &DCacheInputs, pmp: &Pmp) {
        self.req_ready = false;
        self.resp = None;
        self.snoop_ready = false;
        self.snoop_resp = None;
        self.flush_end = false;

        if let Some(fa) = i.flush {
            self.req_flush = true;
            self.req_flush_all = fa & 1 != 0;
            if fa & 1 != 0 {
                self.req_flush_cnt = self.flush_all_value;
                self.req_flush_addr = 0;
            } else {
                self.req_flush_cnt = 0;
                self.req_flush_addr = fa;
            }
        }

        // Flags-only snoops are answered from the tag port directly.
        let snoop_data_req = i.snoop.filter(|s| s.stype != 0);
        if let Some(s) = i.snoop {
            if s.stype == 0 {
                let p = self.mem.snoop(s.addr);
                self.snoop_ready = true;
                self.snoop_resp = Some(SnoopResponse {
                    data: p.rdata,
                    flags: p.rflags,
                });
            }
        }

        let mut ready_next = false;

        match self.state {
            DState::Idle => {
                self.load_fault = false;
                ready_next = true;
            }
            DState::CheckHit => self.check_hit(i, &mut ready_next),
            DState::TranslateAddress => self.translate_address(i, pmp),
            DState::WaitGrant => {
                if i.mem_req_ready {
                    let uncached_store = self.req.mtype.is_store()
                        && self
                            .mem_req
                            .is_some_and(|m| !m.rtype.is_cached() && m.rtype.is_write());
                    self.mem_req = None;
                    if self.write_flush || self.write_first || self.write_share || uncached_store {
                        self.state = DState::WriteBus;
                    } else {
                        self.state = DState::WaitResp;
                    }
                }
            }
            DState::WaitResp => {
                if let Some(r) = i.mem_resp {
                    self.cache_line_i = r.data;
                    if r.load_fault {
                        self.load_fault = true;
                    }
                    self.state = DState::CheckResp;
                } else if i.coherence_ena {
                    if let Some(s) = snoop_data_req {
                        self.snoop_ready = true;
                        self.snoop_restore_wait_resp = true;
                        self.req_addr_restore = self.req.addr;
                        self.begin_snoop(&s);
                    }
                }
            }
            DState::CheckResp => self.check_resp(),
            DState::SetupReadAdr => self.state = DState::CheckHit,
            DState::WriteBus => {
                if let Some(r) = i.mem_resp {
                    if self.write_share {
                        self.write_share = false;
                        self.state = DState::Idle;
                    } else if self.write_flush {
                        self.state = DState::FlushAddr;
                    } else if self.write_first {
                        // Victim offloaded; now fetch the wanted line.
                        self.write_first = false;
                        self.mem_req = Some(CacheBusReq {
                            rtype: if self.req.mtype.is_store() {
                                BusReqType::ReadMakeUnique
                            } else {
                                BusReqType::ReadShared
                            },
                            size: LOG2_L1_BYTES_PER_LINE as u8,
                            addr: Self::line_base(self.req.addr),
                            strob: 0,
                            data: CacheLine::ZERO,
                        });
                        self.state = DState::WaitGrant;
                    } else {
                        // Uncached write acknowledgement.
                        self.resp = Some(CacheResp {
                            addr: self.req.addr,
                            data: 0,
                            load_fault: false,
                            store_fault: r.store_fault,
                        });
                        self.state = DState::Idle;
                    }
                } else if i.coherence_ena {
                    if let Some(s) = snoop_data_req {
                        self.snoop_ready = true;
                        self.snoop_restore_write_bus = true;
                        self.req_addr_restore = self.req.addr;
                        self.begin_snoop(&s);
                    }
                }
            }
            DState::FlushAddr => {
                // Capture and invalidate the walked entry.
                let (addr, flags, data) = if self.req_flush_all {
                    self.mem.invalidate_direct(self.req.addr, self.way_bits)
                } else {
                    let p = self.mem.snoop(self.req.addr);
                    self.mem.invalidate(self.req.addr);
                    (p.raddr, p.rflags, p.rdata)
                };
                self.flush_line_addr = addr;
                self.flush_line_flags = flags;
                self.flush_line_data = data;
                self.write_flush = false;
                self.cache_line_i = CacheLine::ZERO;
                self.state = DState::FlushCheck;
            }
            DState::FlushCheck => {
                if self.flush_line_flags & fl::VALID != 0 && self.flush_line_flags & fl::DIRTY != 0
                {
                    // Off-load the dirty victim before moving on.
                    self.write_flush = true;
                    self.writebacks += 1;
                    self.mem_req = Some(CacheBusReq {
                        rtype: BusReqType::WriteBack,
                        size: LOG2_L1_BYTES_PER_LINE as u8,
                        addr: self.flush_line_addr,
                        strob: u32::MAX,
                        data: self.flush_line_data,
                    });
                    self.state = DState::WaitGrant;
                } else {
                    self.state = DState::FlushAddr;
                    if self.flush_cnt == 0 {
                        self.state = DState::Idle;
                        self.flush_end = true;
                    }
                }
                if self.flush_cnt != 0 {
                    self.flush_cnt -= 1;
                    if self.req_flush_all {
                        self.req.addr = self.next_direct_addr(self.req.addr);
                    } else {
                        self.req.addr += L1_BYTES_PER_LINE as u64;
                    }
                }
            }
            DState::Reset => {
                if self.req_flush {
                    self.req_flush = false;
                    self.flush_cnt = self.flush_all_value;
                }
                self.state = DState::ResetWrite;
            }
            DState::ResetWrite => {
                let _ = self.mem.invalidate_direct(self.req.addr, self.way_bits);
                self.state = DState::Reset;
                if self.flush_cnt != 0 {
                    self.flush_cnt -= 1;
                    self.req.addr = self.next_direct_addr(self.req.addr);
                } else {
                    self.state = DState::Idle;
                }
            }
            DState::SnoopSetupAddr => {
                if self.snoop_stype & snoop_type::READ_CLEAN != 0 {
                    // Probe first so the response carries the old line.
                    let p = self.mem.snoop(self.snoop_addr);
                    self.flush_line_data = p.rdata;
                    self.flush_line_flags = p.rflags;
                    self.mem.invalidate(self.snoop_addr);
                } else {
                    let p = self.mem.snoop(self.snoop_addr);
                    self.flush_line_data = p.rdata;
                    self.flush_line_flags = p.rflags;
                }
                self.state = DState::SnoopReadData;
            }
            DState::SnoopReadData => {
                self.snoop_resp = Some(SnoopResponse {
                    data: self.flush_line_data,
                    flags: self.flush_line_flags,
                });
                if self.snoop_stype & snoop_type::READ_CLEAN == 0
                    && self.flush_line_flags & fl::VALID != 0
                {
                    // Downgrade: shared, clean, reservation dropped.
                    let flags = (self.flush_line_flags | fl::SHARED) & !(fl::DIRTY | fl::RESERVED);
                    self.mem.write_flags(self.snoop_addr, flags);
                }
                let restore_wait = self.snoop_restore_wait_resp;
                let restore_write = self.snoop_restore_write_bus;
                self.snoop_restore_wait_resp = false;
                self.snoop_restore_write_bus = false;
                if restore_wait {
                    self.req.addr = self.req_addr_restore;
                    self.state = DState::WaitResp;
                } else if restore_write {
                    self.req.addr = self.req_addr_restore;
                    self.state = DState::WriteBus;
                } else {
                    self.state = DState::Idle;
                }
            }
        }

        if ready_next {
            if i.coherence_ena && snoop_data_req.is_some() {
                let s = snoop_data_req.unwrap_or_default();
                self.snoop_ready = true;
                self.begin_snoop(&s);
            } else if self.req_flush {
                self.state = DState::FlushAddr;
                self.req_flush = false;
                self.cache_line_i = CacheLine::ZERO;
                self.req.addr = self.req_flush_addr & !((L1_BYTES_PER_LINE as u64) - 1);
                self.flush_cnt = self.req_flush_cnt;
            } else {
                self.req_ready = true;
                if let Some(req) = i.req {
                    self.req = req;
                    self.state = DState::CheckHit;
                }
            }
        }
    }

    fn begin_snoop(&mut self, s: &SnoopRequest) {
        self.snoop_stype = s.stype;
        self.snoop_addr = s.addr;
        self.state = DState::SnoopSetupAddr;
    }

    /// `CheckHit`: serve hits, classify misses.
    fn check_hit(&mut self, i: &DCacheInputs, ready_next: &mut bool) {
        let p = self.mem.probe(self.req.addr);
        let ridx = Self::ridx(self.req.addr);
        let mut resp_data = p.rdata.word(ridx);

        if p.hit {
            self.hits += 1;
            if self.req.mtype.is_store() {
                if self.req.mtype.is_release() && p.rflags & fl::RESERVED == 0 {
                    // SC against a line that lost its reservation.
                    self.resp = Some(CacheResp {
                        addr: self.req.addr,
                        data: 1,
                        load_fault: false,
                        store_fault: false,
                    });
                    self.state = DState::Idle;
                    return;
                }

                let mut line = p.rdata;
                line.merge_word(ridx, self.req.wdata, self.req.wstrb);
                let flags = fl::VALID | fl::DIRTY;
                self.mem.write(self.req.addr, &line, u32::MAX, flags);
                self.req.mtype = self.req.mtype.without_store();

                if self.req.mtype.is_release() {
                    resp_data = 0;
                }
                self.resp = Some(CacheResp {
                    addr: self.req.addr,
                    data: resp_data,
                    load_fault: false,
                    store_fault: false,
                });

                if i.coherence_ena && p.rflags & fl::SHARED != 0 {
                    // Shared line must become unique on the bus.
                    self.write_share = true;
                    self.state = DState::TranslateAddress;
                } else {
                    *ready_next = true;
                    self.state = DState::Idle;
                }
            } else if self.req.mtype.is_reserve() {
                // LR: mark the line reserved.
                trace!(addr = format_args!("{:#x}", self.req.addr), "lr reserve");
                self.mem.write_flags(self.req.addr, p.rflags | fl::RESERVED);
                self.resp = Some(CacheResp {
                    addr: self.req.addr,
                    data: resp_data,
                    load_fault: false,
                    store_fault: false,
                });
                self.state = DState::Idle;
            } else {
                self.resp = Some(CacheResp {
                    addr: self.req.addr,
                    data: resp_data,
                    load_fault: false,
                    store_fault: false,
                });
                *ready_next = true;
                self.state = DState::Idle;
            }
        } else if self.req.mtype.is_store() && self.req.mtype.is_release() {
            // SC cannot store into an unreserved (absent) line.
            self.resp = Some(CacheResp {
                addr: self.req.addr,
                data: 1,
                load_fault: false,
                store_fault: false,
            });
            self.state = DState::Idle;
        } else {
            self.misses += 1;
            self.state = DState::TranslateAddress;
        }
    }

    /// `TranslateAddress`: PMP gate, then shape the bus transaction.
    fn translate_address(&mut self, i: &DCacheInputs, pmp: &Pmp) {
        let access = pmp.check(self.req.addr, i.pmp_active);
        let denied = if self.req.mtype.is_store() {
            !access.w
        } else {
            !access.r
        };
        if denied {
            self.load_fault = true;
            self.cache_line_i = CacheLine::ONES;
            self.state = DState::CheckResp;
            return;
        }

        let p = self.mem.probe(self.req.addr);
        self.load_fault = false;

        if Pma::cached(self.req.addr) {
            let (rtype, addr) = if self.write_share {
                (BusReqType::WriteLineUnique, Self::line_base(p.raddr))
            } else if p.rflags & fl::VALID != 0 && p.rflags & fl::DIRTY != 0 {
                self.write_first = true;
                self.writebacks += 1;
                (BusReqType::WriteBack, Self::line_base(p.raddr))
            } else if self.req.mtype.is_store() {
                (BusReqType::ReadMakeUnique, Self::line_base(self.req.addr))
            } else {
                (BusReqType::ReadShared, Self::line_base(self.req.addr))
            };
            self.mem_req = Some(CacheBusReq {
                rtype,
                size: LOG2_L1_BYTES_PER_LINE as u8,
                addr,
                strob: u32::MAX,
                data: p.rdata,
            });
        } else {
            let rtype = if self.req.mtype.is_store() {
                BusReqType::WriteNoSnoop
            } else {
                BusReqType::ReadNoSnoop
            };
            self.mem_req = Some(CacheBusReq {
                rtype,
                size: self.req.size,
                addr: self.req.addr,
                strob: u32::from(self.req.wstrb),
                data: CacheLine::from_u64(self.req.wdata),
            });
        }
        self.cache_line_i = CacheLine::ZERO;
        self.state = DState::WaitGrant;
    }

    /// `CheckResp`: uncached data return or line install.
    fn check_resp(&mut self) {
        let uncached = self
            .mem_req
            .map_or_else(|| !Pma::cached(self.req.addr), |m| !m.rtype.is_cached());

        if uncached || self.load_fault {
            let is_store = self.req.mtype.is_store();
            self.resp = Some(CacheResp {
                addr: self.req.addr,
                data: self.cache_line_i.word(0),
                load_fault: self.load_fault && !is_store,
                store_fault: self.load_fault && is_store,
            });
            self.state = DState::Idle;
            return;
        }

        // Install the refilled line.
        let mut flags = fl::VALID | fl::SHARED;
        if self.req.mtype.is_reserve() {
            flags |= fl::RESERVED;
        }
        let mut line = self.cache_line_i;

        if self.req.mtype.is_store() {
            let ridx = Self::ridx(self.req.addr);
            line.merge_word(ridx, self.req.wdata, self.req.wstrb);
            flags = fl::VALID | fl::DIRTY;
            self.req.mtype = self.req.mtype.without_store();
            self.mem.write(self.req.addr, &line, u32::MAX, flags);
            self.resp = Some(CacheResp {
                addr: self.req.addr,
                data: 0,
                load_fault: false,
                store_fault: false,
            });
            self.state = DState::Idle;
        } else {
            self.mem.write(self.req.addr, &line, u32::MAX, flags);
            self.state = DState::SetupReadAdr;
        }
    }

    /// Flush/reset walk address increment: ways first, then indexes.
    fn next_direct_addr(&self, addr: u64) -> u64 {
        let ways = (1u64 << self.way_bits) - 1;
        if addr & ways == ways {
            (addr + L1_BYTES_PER_LINE as u64) & !((L1_BYTES_PER_LINE as u64) - 1)
        } else {
            addr + 1
        }
    }
}
