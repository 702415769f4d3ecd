//! Instruction L1 cache.
//!
//! Read-only sibling of the data cache with one extra trick: the tag
//! probe covers two consecutive lines so a 32-bit instruction window can
//! straddle a line boundary. A compressed instruction at offset
//! `line-2` combines the last half-word of line N with the first
//! half-word of line N+1 in a single response. Lines carry only the
//! valid flag; the flush engine invalidates without write-backs.

use super::pma::Pma;
use super::pmp::Pmp;
use super::dcache::{BusResponse, CacheBusReq};
use super::tagmem::{TagMem, fl};
use crate::common::BusReqType;
use crate::common::line::CacheLine;
use crate::config::CacheConfig;
use crate::config::defaults::{L1_BYTES_PER_LINE, LOG2_L1_BYTES_PER_LINE};
use crate::core::mmu::CacheResp;

/// Inputs sampled by the I-cache each cycle.
#[derive(Clone, Copy, Debug, Default)]
pub struct ICacheInputs {
    /// Fetch-side request address (from the fetch MMU).
    pub req: Option<u64>,
    /// The arbiter queue accepts a bus request.
    pub mem_req_ready: bool,
    /// Bus response steered to this cache.
    pub mem_resp: Option<BusResponse>,
    /// Flush request; bit 0 selects flush-all.
    pub flush: Option<u64>,
    /// PMP checks are active.
    pub pmp_active: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum IState {
    Idle,
    CheckHit,
    TranslateAddress,
    WaitGrant,
    WaitResp,
    CheckResp,
    SetupReadAdr,
    FlushAddr,
    FlushCheck,
    Reset,
    ResetWrite,
}

/// The instruction L1 cache.
pub struct ICacheLru {
    mem: TagMem,
    way_bits: u32,
    flush_all_value: u64,

    state: IState,
    /// Requested (virtual-side physical) fetch address.
    req_addr: u64,
    /// Line currently being refilled.
    fill_addr: u64,
    load_fault: bool,
    uncached: bool,
    cache_line_i: CacheLine,
    mem_req: Option<CacheBusReq>,

    req_flush: bool,
    req_flush_all: bool,
    req_flush_addr: u64,
    req_flush_cnt: u64,
    flush_cnt: u64,

    // Per-cycle outputs.
    req_ready: bool,
    resp: Option<CacheResp>,
    flush_end: bool,

    /// Observability counter: hits served from the line storage.
    pub hits: u64,
    /// Observability counter: misses that went to the bus.
    pub misses: u64,
}

impl ICacheLru {
    /// Creates the cache in its power-on reset walk.
    pub fn new(config: &CacheConfig) -> Self {
        let flush_all_value = (1u64 << (config.index_bits + config.way_bits)) - 1;
        Self {
            mem: TagMem::new(config),
            way_bits: config.way_bits,
            flush_all_value,
            state: IState::Reset,
            req_addr: 0,
            fill_addr: 0,
            load_fault: false,
            uncached: false,
            cache_line_i: CacheLine::ZERO,
            mem_req: None,
            req_flush: false,
            req_flush_all: false,
            req_flush_addr: 0,
            req_flush_cnt: 0,
            flush_cnt: flush_all_value,
            req_ready: false,
            resp: None,
            flush_end: false,
            hits: 0,
            misses: 0,
        }
    }

    /// Fetch-side request accepted this cycle.
    pub fn req_ready(&self) -> bool {
        self.req_ready
    }

    /// Fetch-side response: 32 instruction bits in the data word.
    pub fn resp(&self) -> Option<&CacheResp> {
        self.resp.as_ref()
    }

    /// Bus request presented to the arbiter.
    pub fn mem_req(&self) -> Option<&CacheBusReq> {
        self.mem_req.as_ref()
    }

    /// Flush walk finished this cycle.
    pub fn flush_end(&self) -> bool {
        self.flush_end
    }

    fn line_base(addr: u64) -> u64 {
        addr & !((L1_BYTES_PER_LINE as u64) - 1)
    }

    /// The 32-bit window crosses into the next line.
    fn straddles(addr: u64) -> bool {
        (addr as usize) & (L1_BYTES_PER_LINE - 1) > L1_BYTES_PER_LINE - 4
    }

    /// Advances one cycle.
    pub fn step(&mut self, i: &ICacheInputs, pmp: &Pmp) {
        self.req_ready = false;
        self.resp = None;
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

        let mut ready_next = false;

        match self.state {
            IState::Idle => {
                self.load_fault = false;
                ready_next = true;
            }
            IState::CheckHit => self.check_hit(),
            IState::TranslateAddress => {
                let access = pmp.check(self.fill_addr, i.pmp_active);
                if !access.x {
                    // Non-executable region reads back as bus fault.
                    self.load_fault = true;
                    self.cache_line_i = CacheLine::ONES;
                    self.state = IState::CheckResp;
                    return;
                }
                self.uncached = !Pma::cached(self.fill_addr);
                self.mem_req = Some(if self.uncached {
                    CacheBusReq {
                        rtype: BusReqType::ReadNoSnoop,
                        size: 3,
                        addr: self.fill_addr & !0x7,
                        strob: 0,
                        data: CacheLine::ZERO,
                    }
                } else {
                    CacheBusReq {
                        rtype: BusReqType::ReadShared,
                        size: LOG2_L1_BYTES_PER_LINE as u8,
                        addr: Self::line_base(self.fill_addr),
                        strob: 0,
                        data: CacheLine::ZERO,
                    }
                });
                self.state = IState::WaitGrant;
            }
            IState::WaitGrant => {
                if i.mem_req_ready {
                    self.mem_req = None;
                    self.state = IState::WaitResp;
                }
            }
            IState::WaitResp => {
                if let Some(r) = i.mem_resp {
                    self.cache_line_i = r.data;
                    if r.load_fault {
                        self.load_fault = true;
                    }
                    self.state = IState::CheckResp;
                }
            }
            IState::CheckResp => {
                if self.uncached || self.load_fault {
                    self.resp = Some(CacheResp {
                        addr: self.req_addr,
                        data: self.uncached_window(),
                        load_fault: self.load_fault,
                        store_fault: false,
                    });
                    self.state = IState::Idle;
                } else {
                    let line = self.cache_line_i;
                    self.mem.write(self.fill_addr, &line, u32::MAX, fl::VALID);
                    self.state = IState::SetupReadAdr;
                }
            }
            IState::SetupReadAdr => self.state = IState::CheckHit,
            IState::FlushAddr => {
                if self.req_flush_all {
                    let _ = self.mem.invalidate_direct(self.req_addr, self.way_bits);
                } else {
                    self.mem.invalidate(self.req_addr);
                }
                self.state = IState::FlushCheck;
            }
            IState::FlushCheck => {
                self.state = IState::FlushAddr;
                if self.flush_cnt == 0 {
                    self.state = IState::Idle;
                    self.flush_end = true;
                } else {
                    self.flush_cnt -= 1;
                    if self.req_flush_all {
                        self.req_addr = self.next_direct_addr(self.req_addr);
                    } else {
                        self.req_addr += L1_BYTES_PER_LINE as u64;
                    }
                }
            }
            IState::Reset => {
                if self.req_flush {
                    self.req_flush = false;
                    self.flush_cnt = self.flush_all_value;
                }
                self.state = IState::ResetWrite;
            }
            IState::ResetWrite => {
                let _ = self.mem.invalidate_direct(self.req_addr, self.way_bits);
                self.state = IState::Reset;
                if self.flush_cnt != 0 {
                    self.flush_cnt -= 1;
                    self.req_addr = self.next_direct_addr(self.req_addr);
                } else {
                    self.state = IState::Idle;
                }
            }
        }

        if ready_next {
            if self.req_flush {
                self.state = IState::FlushAddr;
                self.req_flush = false;
                self.req_addr = self.req_flush_addr & !((L1_BYTES_PER_LINE as u64) - 1);
                self.flush_cnt = self.req_flush_cnt;
            } else {
                self.req_ready = true;
                if let Some(addr) = i.req {
                    self.req_addr = addr;
                    self.state = IState::CheckHit;
                }
            }
        }
    }

    /// Coupled probe of the line pair covering the 32-bit window.
    fn check_hit(&mut self) {
        let addr = self.req_addr;
        let p0 = self.mem.probe(addr);
        let straddle = Self::straddles(addr);

        if !p0.hit {
            self.misses += 1;
            self.fill_addr = addr;
            self.state = IState::TranslateAddress;
            return;
        }

        let off = (addr as usize) & (L1_BYTES_PER_LINE - 1);
        if !straddle {
            self.hits += 1;
            // Page-table-walker reads through this port are 8-byte
            // aligned, so a full 64-bit window fits whenever it exists;
            // near the line end the 32-bit instruction window remains.
            let data = if off <= L1_BYTES_PER_LINE - 8 {
                p0.rdata.word_at(off)
            } else {
                u64::from(p0.rdata.word32(off))
            };
            self.resp = Some(CacheResp {
                addr,
                data,
                load_fault: false,
                store_fault: false,
            });
            self.state = IState::Idle;
            return;
        }

        // The window continues into the next line.
        let next_line = Self::line_base(addr) + L1_BYTES_PER_LINE as u64;
        let p1 = self.mem.probe(next_line);
        if !p1.hit {
            self.misses += 1;
            self.fill_addr = next_line;
            self.state = IState::TranslateAddress;
            return;
        }

        self.hits += 1;
        let lo = u64::from(p0.rdata.half(off));
        let hi = u64::from(p1.rdata.half(0));
        self.resp = Some(CacheResp {
            addr,
            data: (hi << 16) | lo,
            load_fault: false,
            store_fault: false,
        });
        self.state = IState::Idle;
    }

    /// Window out of an uncached 8-byte read.
    fn uncached_window(&self) -> u64 {
        let off = (self.req_addr & 0x7) as u32;
        let lane = self.cache_line_i.word(0);
        lane >> (8 * off)
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
