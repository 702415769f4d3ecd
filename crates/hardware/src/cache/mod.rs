//! L1 cache subsystem.
//!
//! Owns the two L1 caches, the PMP table and the external-request
//! arbiter. Both caches present at most one cacheline-wide request; a
//! two-deep FIFO holds `{path, type, size, addr, strobe, data}` with the
//! data side taking priority (the instruction side is accepted only when
//! the data side has nothing pending). The external response is steered
//! back to the originating cache by the path bit it carries.

/// The data L1 cache.
pub mod dcache;
/// The instruction L1 cache.
pub mod icache;
/// Per-index LRU order tracking.
pub mod lru;
/// Physical memory attributes (cached/uncached classification).
pub mod pma;
/// Physical memory protection table.
pub mod pmp;
/// External-request FIFO.
pub mod queue;
/// N-way tag/data memory.
pub mod tagmem;

use self::dcache::{BusResponse, DCacheInputs, DCacheLru, SnoopRequest, SnoopResponse};
use self::icache::{ICacheInputs, ICacheLru};
use self::pmp::Pmp;
use self::queue::{BusRequest, ReqQueue};
use crate::common::line::CacheLine;
use crate::common::BusPath;
use crate::config::Config;
use crate::core::csr::PmpWrite;
use crate::core::memaccess::DataReq;
use crate::core::mmu::CacheResp;

/// External bus request leaving the hart.
pub type MemRequest = BusRequest;

/// External bus response entering the hart.
#[derive(Clone, Copy, Debug)]
pub struct MemResponse {
    /// Cache the transaction belongs to.
    pub path: BusPath,
    /// Line-wide response data.
    pub data: CacheLine,
    /// Read-path fault.
    pub load_fault: bool,
    /// Write-path fault.
    pub store_fault: bool,
}

/// Inputs sampled by the cache subsystem each cycle.
#[derive(Clone, Copy, Debug, Default)]
pub struct CacheTopInputs {
    /// Instruction-side request (fetch MMU output).
    pub imem_req: Option<DataReq>,
    /// Data-side request (data MMU output).
    pub dmem_req: Option<DataReq>,
    /// The interconnect accepts the presented request this cycle.
    pub req_mem_ready: bool,
    /// Response from the interconnect.
    pub mem_resp: Option<MemResponse>,
    /// Snoop probe from the interconnect.
    pub snoop: Option<SnoopRequest>,
    /// I-cache flush request (bit 0 = all).
    pub flushi: Option<u64>,
    /// D-cache flush request (bit 0 = all).
    pub flushd: Option<u64>,
    /// One region from the CSR PMP update pipeline.
    pub pmp_write: Option<PmpWrite>,
    /// PMP checks are active.
    pub pmp_active: bool,
}

/// The L1 cache subsystem.
pub struct CacheTop {
    /// Instruction cache.
    pub icache: ICacheLru,
    /// Data cache.
    pub dcache: DCacheLru,
    pmp: Pmp,
    queue: ReqQueue,
    coherence_ena: bool,

    /// One-deep request mailboxes toward each cache.
    pending_i: Option<DataReq>,
    pending_d: Option<DataReq>,

    i_resp: Option<CacheResp>,
    d_resp: Option<CacheResp>,
    snoop_ready: bool,
    snoop_resp: Option<SnoopResponse>,
    flushd_end: bool,
}

impl CacheTop {
    /// Creates the subsystem; both caches start in their reset walk.
    pub fn new(config: &Config) -> Self {
        Self {
            icache: ICacheLru::new(&config.icache),
            dcache: DCacheLru::new(&config.dcache),
            pmp: Pmp::new(),
            queue: ReqQueue::new(),
            coherence_ena: config.coherence_ena,
            pending_i: None,
            pending_d: None,
            i_resp: None,
            d_resp: None,
            snoop_ready: false,
            snoop_resp: None,
            flushd_end: false,
        }
    }

    /// The instruction side can take another request.
    pub fn i_req_ready(&self) -> bool {
        self.pending_i.is_none()
    }

    /// The data side can take another request.
    pub fn d_req_ready(&self) -> bool {
        self.pending_d.is_none()
    }

    /// Instruction-side response.
    pub fn i_resp(&self) -> Option<&CacheResp> {
        self.i_resp.as_ref()
    }

    /// Data-side response.
    pub fn d_resp(&self) -> Option<&CacheResp> {
        self.d_resp.as_ref()
    }

    /// Request presented to the interconnect.
    pub fn mem_req(&self) -> Option<&MemRequest> {
        self.queue.head()
    }

    /// Snoop probe accepted this cycle.
    pub fn snoop_ready(&self) -> bool {
        self.snoop_ready
    }

    /// Snoop response toward the interconnect.
    pub fn snoop_resp(&self) -> Option<&SnoopResponse> {
        self.snoop_resp.as_ref()
    }

    /// D-cache flush walk completed this cycle.
    pub fn flushd_end(&self) -> bool {
        self.flushd_end
    }

    /// PMP table access for the test harness.
    pub fn pmp(&self) -> &Pmp {
        &self.pmp
    }

    /// Advances one cycle.
    pub fn step(&mut self, i: &CacheTopInputs) {
        if let Some(w) = i.pmp_write {
            self.pmp.write(&w);
        }

        // Capture single-cycle MMU request pulses into the mailboxes.
        if self.pending_d.is_none() {
            self.pending_d = i.dmem_req;
        }
        if self.pending_i.is_none() {
            self.pending_i = i.imem_req;
        }

        // Head-of-queue handshake with the interconnect.
        if i.req_mem_ready {
            let _ = self.queue.pop();
        }

        // Grant at most one cache per cycle into the queue; the data
        // side wins, the instruction side only runs when D is silent.
        let d_pending = self.dcache.mem_req().is_some();
        let i_pending = self.icache.mem_req().is_some();
        let d_grant = d_pending && self.queue.ready();
        let i_grant = !d_pending && i_pending && self.queue.ready();

        if d_grant {
            if let Some(r) = self.dcache.mem_req() {
                self.queue.push(BusRequest {
                    path: BusPath::Data,
                    rtype: r.rtype,
                    size: r.size,
                    addr: r.addr,
                    strob: r.strob,
                    data: r.data,
                });
            }
        } else if i_grant {
            if let Some(r) = self.icache.mem_req() {
                self.queue.push(BusRequest {
                    path: BusPath::Ctrl,
                    rtype: r.rtype,
                    size: r.size,
                    addr: r.addr,
                    strob: r.strob,
                    data: r.data,
                });
            }
        }

        let d_resp_in = i.mem_resp.filter(|r| r.path == BusPath::Data);
        let i_resp_in = i.mem_resp.filter(|r| r.path == BusPath::Ctrl);

        self.dcache.step(
            &DCacheInputs {
                req: self.pending_d,
                mem_req_ready: d_grant,
                mem_resp: d_resp_in.map(|r| BusResponse {
                    data: r.data,
                    load_fault: r.load_fault,
                    store_fault: r.store_fault,
                }),
                snoop: i.snoop,
                flush: i.flushd,
                pmp_active: i.pmp_active,
                coherence_ena: self.coherence_ena,
            },
            &self.pmp,
        );

        self.icache.step(
            &ICacheInputs {
                req: self.pending_i.map(|r| r.addr),
                mem_req_ready: i_grant,
                mem_resp: i_resp_in.map(|r| BusResponse {
                    data: r.data,
                    load_fault: r.load_fault,
                    store_fault: r.store_fault,
                }),
                flush: i.flushi,
                pmp_active: i.pmp_active,
            },
            &self.pmp,
        );

        if self.dcache.req_ready() {
            self.pending_d = None;
        }
        if self.icache.req_ready() {
            self.pending_i = None;
        }

        self.d_resp = self.dcache.resp().copied();
        self.i_resp = self.icache.resp().copied();
        self.snoop_ready = self.dcache.snoop_ready();
        self.snoop_resp = self.dcache.snoop_resp().copied();
        self.flushd_end = self.dcache.flush_end();
    }
}
