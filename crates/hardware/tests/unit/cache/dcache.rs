//! D-cache state machine tests.
//!
//! Drives one `DCacheLru` with a scripted backing memory: hits and
//! misses, write-back of dirty victims, the shared-to-unique upgrade,
//! LR/SC reservations, snoop service and the flush engine.

use std::collections::HashMap;

use pretty_assertions::assert_eq;

use river_core::cache::dcache::{BusResponse, DCacheInputs, DCacheLru, SnoopRequest};
use river_core::cache::pmp::Pmp;
use river_core::cache::tagmem::fl;
use river_core::common::line::CacheLine;
use river_core::common::{BusReqType, MemopType, memop_size, snoop_type};
use river_core::config::CacheConfig;
use river_core::core::memaccess::DataReq;
use river_core::core::mmu::CacheResp;

// ══════════════════════════════════════════════════════════
// Harness
// ══════════════════════════════════════════════════════════

/// Small geometry: 2 ways x 4 indexes of 32-byte lines.
fn small_config() -> CacheConfig {
    CacheConfig {
        way_bits: 1,
        index_bits: 2,
    }
}

struct DBed {
    dc: DCacheLru,
    pmp: Pmp,
    mem: HashMap<u64, CacheLine>,
    /// `(type, addr)` of every bus transaction, in order.
    bus: Vec<(BusReqType, u64)>,
    pending: Option<BusResponse>,
    pmp_active: bool,
}

impl DBed {
    fn new() -> Self {
        let mut bed = Self {
            dc: DCacheLru::new(&small_config()),
            pmp: Pmp::new(),
            mem: HashMap::new(),
            bus: Vec::new(),
            pending: None,
            pmp_active: false,
        };
        // Power-on reset walk: 8 entries, two cycles each.
        for _ in 0..64 {
            bed.step(None, None, None);
        }
        bed
    }

    fn line_at(&self, addr: u64) -> CacheLine {
        self.mem
            .get(&(addr & !0x1F))
            .copied()
            .unwrap_or(CacheLine::ZERO)
    }

    fn plant_u64(&mut self, addr: u64, value: u64) {
        let mut line = self.line_at(addr);
        line.set_word(((addr >> 3) & 3) as usize, value);
        let _ = self.mem.insert(addr & !0x1F, line);
    }

    fn backing_u64(&self, addr: u64) -> u64 {
        self.line_at(addr).word(((addr >> 3) & 3) as usize)
    }

    /// One cycle: presents the request (if any), serves the bus.
    fn step(
        &mut self,
        req: Option<DataReq>,
        snoop: Option<SnoopRequest>,
        flush: Option<u64>,
    ) {
        let inputs = DCacheInputs {
            req,
            mem_req_ready: true,
            mem_resp: self.pending.take(),
            snoop,
            flush,
            pmp_active: self.pmp_active,
            coherence_ena: true,
        };
        self.dc.step(&inputs, &self.pmp);

        if let Some(r) = self.dc.mem_req().copied() {
            self.bus.push((r.rtype, r.addr));
            if r.rtype.is_write() {
                let mut line = self.line_at(r.addr);
                if r.rtype.is_cached() {
                    line.merge(&r.data, r.strob);
                } else {
                    // Narrow write: the strobe addresses the aligned
                    // 64-bit lane, mirroring the interconnect contract.
                    let lane_off = ((r.addr & !0x7) & 0x1F) as usize;
                    for n in 0..8 {
                        if r.strob & (1 << n) != 0 {
                            line.bytes[lane_off + n] = r.data.bytes[n];
                        }
                    }
                }
                let _ = self.mem.insert(r.addr & !0x1F, line);
                self.pending = Some(BusResponse::default());
            } else {
                let data = if r.rtype.is_cached() {
                    self.line_at(r.addr)
                } else {
                    // Narrow read returns the aligned lane in byte 0.
                    let line = self.line_at(r.addr);
                    let lane_off = ((r.addr & !0x7) & 0x1F) as usize / 8;
                    CacheLine::from_u64(line.word(lane_off))
                };
                self.pending = Some(BusResponse {
                    data,
                    load_fault: false,
                    store_fault: false,
                });
            }
        }
    }

    /// Runs one CPU operation to completion.
    fn op(&mut self, req: DataReq) -> CacheResp {
        let mut presented = Some(req);
        for _ in 0..64 {
            self.step(presented, None, None);
            if self.dc.req_ready() {
                presented = None;
            }
            if let Some(r) = self.dc.resp().copied() {
                return r;
            }
        }
        panic!("dcache never answered");
    }

    fn load(&mut self, addr: u64) -> CacheResp {
        self.op(DataReq {
            mtype: MemopType::LOAD_OP,
            addr,
            wdata: 0,
            wstrb: 0,
            size: memop_size::DOUBLE,
        })
    }

    fn store(&mut self, addr: u64, value: u64) -> CacheResp {
        self.op(DataReq {
            mtype: MemopType::STORE_OP,
            addr,
            wdata: value,
            wstrb: 0xFF,
            size: memop_size::DOUBLE,
        })
    }

    fn lr(&mut self, addr: u64) -> CacheResp {
        self.op(DataReq {
            mtype: MemopType(MemopType::RESERVE),
            addr,
            wdata: 0,
            wstrb: 0,
            size: memop_size::DOUBLE,
        })
    }

    fn sc(&mut self, addr: u64, value: u64) -> CacheResp {
        self.op(DataReq {
            mtype: MemopType(MemopType::STORE | MemopType::RELEASE),
            addr,
            wdata: value,
            wstrb: 0xFF,
            size: memop_size::DOUBLE,
        })
    }

    /// Flags-only snoop probe.
    fn snoop_flags(&mut self, addr: u64) -> u8 {
        self.step(None, Some(SnoopRequest { stype: 0, addr }), None);
        let flags = self.dc.snoop_resp().map(|r| r.flags);
        flags.expect("flags snoop answers combinationally")
    }

    /// Data snoop; runs until the response appears.
    fn snoop_data(&mut self, stype: u8, addr: u64) -> (CacheLine, u8) {
        let mut snoop = Some(SnoopRequest { stype, addr });
        for _ in 0..16 {
            self.step(None, snoop, None);
            if self.dc.snoop_ready() {
                snoop = None;
            }
            if let Some(r) = self.dc.snoop_resp().copied() {
                return (r.data, r.flags);
            }
        }
        panic!("snoop never answered");
    }
}

// ══════════════════════════════════════════════════════════
// 1. Hit and miss paths
// ══════════════════════════════════════════════════════════

#[test]
fn load_miss_fetches_read_shared() {
    let mut bed = DBed::new();
    bed.plant_u64(0x1008, 0xFACE);
    let r = bed.load(0x1008);
    assert_eq!(r.data, 0xFACE);
    assert_eq!(bed.bus, vec![(BusReqType::ReadShared, 0x1000)]);
}

#[test]
fn load_hit_stays_off_the_bus() {
    let mut bed = DBed::new();
    bed.plant_u64(0x1000, 1);
    let _ = bed.load(0x1000);
    let before = bed.bus.len();
    let r = bed.load(0x1000);
    assert_eq!(r.data, 1);
    assert_eq!(bed.bus.len(), before, "hit must not touch the bus");
}

#[test]
fn store_miss_fetches_read_make_unique() {
    let mut bed = DBed::new();
    let r = bed.store(0x2000, 0xBEEF);
    assert!(!r.store_fault);
    assert_eq!(bed.bus, vec![(BusReqType::ReadMakeUnique, 0x2000)]);
    let l = bed.load(0x2000);
    assert_eq!(l.data, 0xBEEF);
}

#[test]
fn store_marks_line_dirty() {
    let mut bed = DBed::new();
    let _ = bed.store(0x2000, 1);
    let flags = bed.snoop_flags(0x2000);
    assert_ne!(flags & fl::DIRTY, 0);
    assert_ne!(flags & fl::VALID, 0);
}

#[test]
fn store_hit_on_shared_line_issues_write_line_unique() {
    let mut bed = DBed::new();
    // Load installs the line as Shared.
    let _ = bed.load(0x3000);
    assert_ne!(bed.snoop_flags(0x3000) & fl::SHARED, 0);

    let _ = bed.store(0x3000, 5);
    // The upgrade transaction runs after the core already got its
    // response; let the machine drain.
    for _ in 0..16 {
        bed.step(None, None, None);
    }
    assert!(
        bed.bus.contains(&(BusReqType::WriteLineUnique, 0x3000)),
        "upgrade transaction missing: {:?}",
        bed.bus
    );
}

#[test]
fn dirty_victim_is_written_back_first() {
    let mut bed = DBed::new();
    // Two ways per index: fill both, then force an eviction.
    let _ = bed.store(0x1000, 0xAAAA);
    let _ = bed.load(0x2000);
    bed.bus.clear();
    let _ = bed.load(0x3000);
    assert_eq!(
        bed.bus,
        vec![
            (BusReqType::WriteBack, 0x1000),
            (BusReqType::ReadShared, 0x3000)
        ]
    );
    assert_eq!(bed.backing_u64(0x1000), 0xAAAA, "victim data reached memory");
}

// ══════════════════════════════════════════════════════════
// 2. LR/SC reservations
// ══════════════════════════════════════════════════════════

#[test]
fn lr_sets_reserved_flag() {
    let mut bed = DBed::new();
    bed.plant_u64(0x4000, 7);
    let r = bed.lr(0x4000);
    assert_eq!(r.data, 7);
    assert_ne!(bed.snoop_flags(0x4000) & fl::RESERVED, 0);
}

#[test]
fn sc_succeeds_on_reserved_line() {
    let mut bed = DBed::new();
    let _ = bed.lr(0x4000);
    let r = bed.sc(0x4000, 0x1234);
    assert_eq!(r.data, 0, "SC success reports zero");
    assert_eq!(bed.load(0x4000).data, 0x1234);
}

#[test]
fn sc_fails_without_reservation() {
    let mut bed = DBed::new();
    bed.plant_u64(0x4000, 7);
    let _ = bed.load(0x4000);
    let r = bed.sc(0x4000, 0x1234);
    assert_eq!(r.data, 1, "SC failure reports one");
    assert_eq!(bed.load(0x4000).data, 7, "memory unchanged");
}

#[test]
fn plain_store_clears_reservation() {
    let mut bed = DBed::new();
    let _ = bed.lr(0x4000);
    let _ = bed.store(0x4000, 9);
    assert_eq!(bed.snoop_flags(0x4000) & fl::RESERVED, 0);
}

#[test]
fn snoop_read_clean_breaks_reservation() {
    let mut bed = DBed::new();
    bed.plant_u64(0x4000, 7);
    let _ = bed.lr(0x4000);
    let _ = bed.snoop_data(snoop_type::READ_CLEAN, 0x4000);
    let r = bed.sc(0x4000, 0x1234);
    assert_eq!(r.data, 1, "invalidated line cannot satisfy SC");
}

// ══════════════════════════════════════════════════════════
// 3. Snoop service
// ══════════════════════════════════════════════════════════

#[test]
fn snoop_read_data_downgrades_to_shared() {
    let mut bed = DBed::new();
    let _ = bed.store(0x5000, 0x77);
    let (line, flags) = bed.snoop_data(snoop_type::READ_DATA, 0x5000);
    assert_eq!(line.word(0), 0x77, "snoop returns the dirty data");
    assert_ne!(flags & fl::DIRTY, 0, "flags snapshot the pre-probe state");
    let after = bed.snoop_flags(0x5000);
    assert_ne!(after & fl::SHARED, 0);
    assert_eq!(after & fl::DIRTY, 0, "downgrade cleaned the line");
}

#[test]
fn snoop_read_clean_invalidates() {
    let mut bed = DBed::new();
    let _ = bed.load(0x5000);
    let _ = bed.snoop_data(snoop_type::READ_CLEAN, 0x5000);
    assert_eq!(bed.snoop_flags(0x5000) & fl::VALID, 0);
}

// ══════════════════════════════════════════════════════════
// 4. Flush engine
// ══════════════════════════════════════════════════════════

#[test]
fn flush_one_offloads_dirty_line() {
    let mut bed = DBed::new();
    let _ = bed.store(0x6000, 0xD1D1);
    bed.bus.clear();

    bed.step(None, None, Some(0x6000));
    for _ in 0..32 {
        bed.step(None, None, None);
        if bed.dc.flush_end() {
            break;
        }
    }
    assert!(bed.bus.contains(&(BusReqType::WriteBack, 0x6000)));
    assert_eq!(bed.backing_u64(0x6000), 0xD1D1);
    assert_eq!(bed.snoop_flags(0x6000) & fl::VALID, 0);
}

#[test]
fn flush_all_walks_every_entry() {
    let mut bed = DBed::new();
    let _ = bed.store(0x1000, 1);
    let _ = bed.store(0x2020, 2);
    bed.bus.clear();

    bed.step(None, None, Some(u64::MAX));
    let mut done = false;
    for _ in 0..128 {
        bed.step(None, None, None);
        if bed.dc.flush_end() {
            done = true;
            break;
        }
    }
    assert!(done, "flush-all must terminate");
    let writebacks = bed
        .bus
        .iter()
        .filter(|(t, _)| *t == BusReqType::WriteBack)
        .count();
    assert_eq!(writebacks, 2, "both dirty lines offloaded");
    assert_eq!(bed.backing_u64(0x1000), 1);
    assert_eq!(bed.backing_u64(0x2020), 2);
}

// ══════════════════════════════════════════════════════════
// 5. Uncached and protected regions
// ══════════════════════════════════════════════════════════

#[test]
fn io_window_bypasses_the_cache() {
    let mut bed = DBed::new();
    bed.plant_u64(0x1000_0000, 0xF00D);
    let r = bed.load(0x1000_0000);
    assert_eq!(r.data, 0xF00D);
    assert_eq!(bed.bus, vec![(BusReqType::ReadNoSnoop, 0x1000_0000)]);

    let _ = bed.store(0x1000_0008, 0x0D15EA5E);
    assert!(bed.bus.contains(&(BusReqType::WriteNoSnoop, 0x1000_0008)));
    assert_eq!(bed.backing_u64(0x1000_0008), 0x0D15EA5E);
}

#[test]
fn pmp_denial_faults_without_bus_traffic() {
    let mut bed = DBed::new();
    bed.pmp_active = true; // empty table: nothing is permitted
    let r = bed.load(0x7000);
    assert!(r.load_fault);
    assert!(bed.bus.is_empty(), "denied access must not reach the bus");
}
