//! MMU tests: TLB matching, the Sv39 walker, the last-translation fast
//! path, permission faults and the fence sweep.

use std::collections::HashMap;

use pretty_assertions::assert_eq;

use river_core::common::MemopType;
use river_core::core::memaccess::DataReq;
use river_core::core::mmu::tlb::{Tlb, TlbEntry};
use river_core::core::mmu::{CacheResp, Mmu, MmuInputs, MmuResp, pte};

// ══════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════

/// Scripted memory serving PTE and data reads to a walking MMU.
struct WalkBed {
    mmu: Mmu,
    mem: HashMap<u64, u64>,
    /// Addresses of every memory read the MMU issued, in order.
    reads: Vec<u64>,
    root_ppn: u64,
}

impl WalkBed {
    fn new(fetch_path: bool, root_ppn: u64) -> Self {
        Self {
            mmu: Mmu::new(fetch_path),
            mem: HashMap::new(),
            reads: Vec::new(),
            root_ppn,
        }
    }

    fn pte(&mut self, table_ppn: u64, vpn: u64, value: u64) {
        let addr = (table_ppn << 12) + vpn * 8;
        let _ = self.mem.insert(addr, value);
    }

    fn data(&mut self, pa: u64, value: u64) {
        let _ = self.mem.insert(pa & !7, value);
    }

    /// Runs one load through the MMU; returns the core response.
    fn access(&mut self, va: u64) -> MmuResp {
        let req = DataReq {
            mtype: MemopType::LOAD_OP,
            addr: va,
            wdata: 0,
            wstrb: 0,
            size: 3,
        };
        let mut presented = Some(req);
        let mut pending: Option<CacheResp> = None;

        for _ in 0..64 {
            let inputs = MmuInputs {
                core_req: presented,
                mem_req_ready: true,
                mem_resp: pending.take(),
                mmu_ena: true,
                sv39: true,
                ppn: self.root_ppn,
                ..MmuInputs::default()
            };
            self.mmu.step(&inputs);
            if self.mmu.core_req_ready() {
                presented = None;
            }
            if let Some(r) = self.mmu.mem_req().copied() {
                self.reads.push(r.addr);
                let value = self.mem.get(&(r.addr & !7)).copied().unwrap_or(0);
                pending = Some(CacheResp {
                    addr: r.addr,
                    data: value,
                    load_fault: false,
                    store_fault: false,
                });
            }
            if let Some(resp) = self.mmu.core_resp().copied() {
                return resp;
            }
        }
        panic!("mmu never answered");
    }
}

fn leaf(ppn: u64) -> u64 {
    (ppn << 10) | u64::from(pte::V | pte::R | pte::W | pte::A | pte::D)
}

fn pointer(ppn: u64) -> u64 {
    (ppn << 10) | u64::from(pte::V)
}

// ══════════════════════════════════════════════════════════
// 1. TLB entry matching
// ══════════════════════════════════════════════════════════

#[test]
fn entry_matches_within_its_page_size() {
    let e = TlbEntry {
        va_tag: 0x4_0000,
        ppn: 0x12345,
        page_size: 0,
        permission: pte::V | pte::R,
        valid: true,
    };
    assert!(e.matches(0x4_0000_000));
    assert!(e.matches(0x4_0000_FFF));
    assert!(!e.matches(0x4_0001_000));
}

#[test]
fn megapage_entry_covers_two_megabytes() {
    let e = TlbEntry {
        va_tag: 0x4_0000,
        ppn: 0x12200,
        page_size: 1,
        permission: pte::V | pte::R,
        valid: true,
    };
    assert!(e.matches(0x4_0000_000));
    assert!(e.matches(0x4_01F_F000));
    assert_eq!(e.translate(0x4_0012_345) & 0x1F_FFFF, 0x12_345);
}

#[test]
fn tlb_insert_and_read() {
    let mut tlb = Tlb::new();
    let entry = TlbEntry {
        va_tag: 0xABCDE,
        ppn: 0x54321,
        page_size: 0,
        permission: pte::V | pte::R,
        valid: true,
    };
    tlb.insert(entry);
    let got = tlb.read(0xABCDE << 12, 0);
    assert!(got.matches(0xABCDE << 12));
    assert_eq!(got.ppn, 0x54321);
}

// ══════════════════════════════════════════════════════════
// 2. Sv39 walks
// ══════════════════════════════════════════════════════════

#[test]
fn three_level_walk_reaches_4k_page() {
    let mut bed = WalkBed::new(false, 0x100);
    let va: u64 = 0x0000_0000_4020_1000;
    let vpn2 = (va >> 30) & 0x1FF;
    let vpn1 = (va >> 21) & 0x1FF;
    let vpn0 = (va >> 12) & 0x1FF;
    bed.pte(0x100, vpn2, pointer(0x200));
    bed.pte(0x200, vpn1, pointer(0x300));
    bed.pte(0x300, vpn0, leaf(0x12345));
    bed.data(0x12345_000, 0xFEED_FACE);

    let resp = bed.access(va);
    assert_eq!(resp.data, 0xFEED_FACE);
    assert!(!resp.page_fault_r);
    // Three PTE reads, then the data read at the translated address.
    assert_eq!(bed.reads.len(), 4);
    assert_eq!(*bed.reads.last().unwrap(), 0x12345_000);
}

#[test]
fn two_level_walk_reaches_megapage() {
    let mut bed = WalkBed::new(false, 0x100);
    let va: u64 = 0x0000_0000_4020_1000;
    let vpn2 = (va >> 30) & 0x1FF;
    let vpn1 = (va >> 21) & 0x1FF;
    bed.pte(0x100, vpn2, pointer(0x200));
    // Leaf at level 1: a 2 MiB page; PPN low bits must be clear.
    bed.pte(0x200, vpn1, leaf(0x12200));
    let pa = (0x12200u64 << 12) | (va & 0x1F_FFFF);
    bed.data(pa, 0xCAFE);

    let resp = bed.access(va);
    assert_eq!(resp.data, 0xCAFE);
    // Exactly two walker reads, then one data read.
    assert_eq!(bed.reads.len(), 3);
    assert_eq!(*bed.reads.last().unwrap(), pa & !7);
}

#[test]
fn repeated_access_uses_last_translation() {
    let mut bed = WalkBed::new(false, 0x100);
    let va: u64 = 0x0000_0000_4020_1000;
    bed.pte(0x100, (va >> 30) & 0x1FF, pointer(0x200));
    bed.pte(0x200, (va >> 21) & 0x1FF, pointer(0x300));
    bed.pte(0x300, (va >> 12) & 0x1FF, leaf(0x12345));
    bed.data(0x12345_000, 1);
    bed.data(0x12345_008, 2);

    let _ = bed.access(va);
    let reads_after_walk = bed.reads.len();
    let resp = bed.access(va + 8);
    assert_eq!(resp.data, 2);
    // Only the data read was issued the second time.
    assert_eq!(bed.reads.len(), reads_after_walk + 1);
}

// ══════════════════════════════════════════════════════════
// 3. Faults
// ══════════════════════════════════════════════════════════

#[test]
fn invalid_pte_raises_read_fault() {
    let mut bed = WalkBed::new(false, 0x100);
    let va: u64 = 0x0000_0000_4020_1000;
    // No PTEs planted: the root entry reads as zero.
    let resp = bed.access(va);
    assert!(resp.page_fault_r);
    assert!(!resp.page_fault_x);
    assert!(!resp.page_fault_w);
}

#[test]
fn missing_accessed_bit_faults() {
    let mut bed = WalkBed::new(false, 0x100);
    let va: u64 = 0x0000_0000_4020_1000;
    bed.pte(0x100, (va >> 30) & 0x1FF, pointer(0x200));
    bed.pte(0x200, (va >> 21) & 0x1FF, pointer(0x300));
    let no_a = (0x12345u64 << 10) | u64::from(pte::V | pte::R | pte::W | pte::D);
    bed.pte(0x300, (va >> 12) & 0x1FF, no_a);

    let resp = bed.access(va);
    assert!(resp.page_fault_r);
}

#[test]
fn fetch_path_checks_execute_permission() {
    let mut bed = WalkBed::new(true, 0x100);
    let va: u64 = 0x0000_0000_4020_1000;
    bed.pte(0x100, (va >> 30) & 0x1FF, pointer(0x200));
    bed.pte(0x200, (va >> 21) & 0x1FF, pointer(0x300));
    // Readable but not executable.
    bed.pte(0x300, (va >> 12) & 0x1FF, leaf(0x12345));

    let resp = bed.access(va);
    assert!(resp.page_fault_x, "R-only page must not execute");
}

// ══════════════════════════════════════════════════════════
// 4. Fence sweep
// ══════════════════════════════════════════════════════════

#[test]
fn fence_forces_a_new_walk() {
    let mut bed = WalkBed::new(false, 0x100);
    let va: u64 = 0x0000_0000_4020_1000;
    bed.pte(0x100, (va >> 30) & 0x1FF, pointer(0x200));
    bed.pte(0x200, (va >> 21) & 0x1FF, pointer(0x300));
    bed.pte(0x300, (va >> 12) & 0x1FF, leaf(0x12345));
    bed.data(0x12345_000, 7);

    let _ = bed.access(va);
    let walks_before = bed.mmu.walks;

    // Full sweep.
    bed.mmu.step(&MmuInputs {
        fence: true,
        fence_addr: 0,
        mmu_ena: true,
        sv39: true,
        ppn: 0x100,
        mem_req_ready: true,
        ..MmuInputs::default()
    });
    // Let the sweep drain.
    for _ in 0..Tlb::len() + 4 {
        bed.mmu.step(&MmuInputs {
            mmu_ena: true,
            sv39: true,
            ppn: 0x100,
            mem_req_ready: true,
            ..MmuInputs::default()
        });
    }

    let _ = bed.access(va);
    assert_eq!(bed.mmu.walks, walks_before + 1, "entry was swept");
}
