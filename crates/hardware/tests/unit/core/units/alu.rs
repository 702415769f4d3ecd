//! ALU and comparison flag tests.

use pretty_assertions::assert_eq;
use proptest::prelude::*;

use river_core::core::units::alu;

// ══════════════════════════════════════════════════════════
// 1. Comparison flags from the shared subtractor
// ══════════════════════════════════════════════════════════

#[test]
fn equal_operands() {
    let f = alu::compare(5, 5);
    assert!(f.eq && !f.ne);
    assert!(f.ge && f.geu);
    assert!(!f.lt && !f.ltu);
}

#[test]
fn signedness_disagrees_on_sign_bit() {
    // -1 < 1 signed, but 0xFFFF.. > 1 unsigned.
    let f = alu::compare(u64::MAX, 1);
    assert!(f.lt);
    assert!(!f.ltu);
    assert!(f.geu);
}

proptest! {
    #[test]
    fn flags_are_consistent(a: u64, b: u64) {
        let f = alu::compare(a, b);
        prop_assert_eq!(f.eq, a == b);
        prop_assert_eq!(f.ne, a != b);
        prop_assert_eq!(f.ltu, a < b);
        prop_assert_eq!(f.lt, (a as i64) < (b as i64));
        prop_assert_eq!(f.ge, !f.lt);
        prop_assert_eq!(f.geu, !f.ltu);
    }
}

// ══════════════════════════════════════════════════════════
// 2. Add/sub widths
// ══════════════════════════════════════════════════════════

#[test]
fn add_wraps() {
    assert_eq!(alu::add(u64::MAX, 1, false), 0);
}

#[test]
fn addw_sign_extends() {
    // 0x7FFF_FFFF + 1 overflows the 32-bit range.
    assert_eq!(alu::add(0x7FFF_FFFF, 1, true), 0xFFFF_FFFF_8000_0000);
}

#[test]
fn subw_sign_extends() {
    assert_eq!(alu::sub(0, 1, true), u64::MAX);
}

#[test]
fn sext32_copies_bit31() {
    assert_eq!(alu::sext32(0x8000_0000), 0xFFFF_FFFF_8000_0000);
    assert_eq!(alu::sext32(0x7FFF_FFFF), 0x7FFF_FFFF);
}
