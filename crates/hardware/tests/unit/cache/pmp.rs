//! PMP region table tests.

use pretty_assertions::assert_eq;

use river_core::cache::pmp::{Pmp, PmpAccess};
use river_core::core::csr::{PmpWrite, pmp_fl};

fn region(region: usize, start: u64, end: u64, flags: u8) -> PmpWrite {
    PmpWrite {
        region,
        we: true,
        start,
        end,
        flags,
    }
}

// ══════════════════════════════════════════════════════════
// 1. Uncovered addresses
// ══════════════════════════════════════════════════════════

#[test]
fn empty_table_permissive_when_inactive() {
    let pmp = Pmp::new();
    let a = pmp.check(0x1000, false);
    assert_eq!(
        a,
        PmpAccess {
            r: true,
            w: true,
            x: true
        }
    );
}

#[test]
fn empty_table_denies_when_active() {
    let pmp = Pmp::new();
    let a = pmp.check(0x1000, true);
    assert_eq!(
        a,
        PmpAccess {
            r: false,
            w: false,
            x: false
        }
    );
}

// ══════════════════════════════════════════════════════════
// 2. Region matching and priority
// ══════════════════════════════════════════════════════════

#[test]
fn matching_region_grants_its_bits() {
    let mut pmp = Pmp::new();
    pmp.write(&region(0, 0x1000, 0x1FFF, pmp_fl::V | pmp_fl::R | pmp_fl::X));
    let a = pmp.check(0x1800, true);
    assert!(a.r && a.x && !a.w);
}

#[test]
fn lower_index_wins() {
    let mut pmp = Pmp::new();
    pmp.write(&region(0, 0x1000, 0x1FFF, pmp_fl::V | pmp_fl::R));
    pmp.write(&region(1, 0x0000, 0xFFFF, pmp_fl::V | pmp_fl::R | pmp_fl::W));
    let a = pmp.check(0x1800, true);
    assert!(a.r && !a.w, "entry 0 shadows entry 1");
    let b = pmp.check(0x3000, true);
    assert!(b.w, "entry 1 still covers the rest");
}

#[test]
fn boundaries_are_inclusive() {
    let mut pmp = Pmp::new();
    pmp.write(&region(0, 0x1000, 0x1FFF, pmp_fl::V | pmp_fl::R));
    assert!(pmp.check(0x1000, true).r);
    assert!(pmp.check(0x1FFF, true).r);
    assert!(!pmp.check(0x2000, true).r);
}

// ══════════════════════════════════════════════════════════
// 3. Lock semantics
// ══════════════════════════════════════════════════════════

#[test]
fn locked_region_enforced_while_inactive() {
    let mut pmp = Pmp::new();
    pmp.write(&region(0, 0x1000, 0x1FFF, pmp_fl::V | pmp_fl::L | pmp_fl::R));
    // M-mode with PMP inactive: the locked region still applies.
    let a = pmp.check(0x1800, false);
    assert!(a.r && !a.w && !a.x);
    // Unlocked regions are invisible while inactive.
    let b = pmp.check(0x3000, false);
    assert!(b.r && b.w && b.x);
}

#[test]
fn clearing_write_invalidates() {
    let mut pmp = Pmp::new();
    pmp.write(&region(0, 0x1000, 0x1FFF, pmp_fl::V | pmp_fl::R));
    pmp.write(&region(0, 0, 0, 0));
    assert!(!pmp.check(0x1800, true).r);
}
