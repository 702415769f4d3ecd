//! Multi-cycle multiplier and divider tests.

use pretty_assertions::assert_eq;

use river_core::core::decode::Instr;
use river_core::core::units::muldiv::{Div, Mul};

fn run_mul(op: Instr, a: u64, b: u64) -> (u64, u32) {
    let mut unit = Mul::default();
    unit.start(op, a, b);
    let mut cycles = 0;
    loop {
        cycles += 1;
        if let Some(v) = unit.step() {
            return (v, cycles);
        }
        assert!(cycles < 100, "multiplier never completed");
    }
}

fn run_div(op: Instr, a: u64, b: u64) -> (u64, u32) {
    let mut unit = Div::default();
    unit.start(op, a, b);
    let mut cycles = 0;
    loop {
        cycles += 1;
        if let Some(v) = unit.step() {
            return (v, cycles);
        }
        assert!(cycles < 100, "divider never completed");
    }
}

// ══════════════════════════════════════════════════════════
// 1. Latency model
// ══════════════════════════════════════════════════════════

#[test]
fn multiplier_takes_multiple_cycles() {
    let (v, cycles) = run_mul(Instr::Mul, 7, 6);
    assert_eq!(v, 42);
    assert!(cycles > 1, "a multi-cycle unit must not answer instantly");
}

#[test]
fn divider_is_slower_than_multiplier() {
    let (_, mul_cycles) = run_mul(Instr::Mul, 1, 1);
    let (_, div_cycles) = run_div(Instr::Divu, 1, 1);
    assert!(div_cycles > mul_cycles);
}

#[test]
fn busy_flag_tracks_flight() {
    let mut unit = Mul::default();
    assert!(!unit.busy());
    unit.start(Instr::Mul, 2, 3);
    assert!(unit.busy());
    while unit.step().is_none() {}
    assert!(!unit.busy());
}

// ══════════════════════════════════════════════════════════
// 2. Multiplier results
// ══════════════════════════════════════════════════════════

#[test]
fn mulh_signed_high_bits() {
    let (v, _) = run_mul(Instr::Mulh, u64::MAX, u64::MAX);
    // (-1) * (-1) = 1, high bits zero.
    assert_eq!(v, 0);
}

#[test]
fn mulhu_unsigned_high_bits() {
    let (v, _) = run_mul(Instr::Mulhu, u64::MAX, u64::MAX);
    assert_eq!(v, 0xFFFF_FFFF_FFFF_FFFE);
}

#[test]
fn mulw_sign_extends() {
    let (v, _) = run_mul(Instr::Mulw, 0x7FFF_FFFF, 2);
    assert_eq!(v, 0xFFFF_FFFF_FFFF_FFFE);
}

// ══════════════════════════════════════════════════════════
// 3. Divider special cases (M-extension rules)
// ══════════════════════════════════════════════════════════

#[test]
fn divide_by_zero_returns_all_ones() {
    assert_eq!(run_div(Instr::Div, 5, 0).0, u64::MAX);
    assert_eq!(run_div(Instr::Divu, 5, 0).0, u64::MAX);
}

#[test]
fn remainder_by_zero_returns_dividend() {
    assert_eq!(run_div(Instr::Rem, 5, 0).0, 5);
    assert_eq!(run_div(Instr::Remu, 7, 0).0, 7);
}

#[test]
fn signed_overflow_case() {
    let min = i64::MIN as u64;
    assert_eq!(run_div(Instr::Div, min, u64::MAX).0, min);
    assert_eq!(run_div(Instr::Rem, min, u64::MAX).0, 0);
}

#[test]
fn divw_operates_on_words() {
    let (v, _) = run_div(Instr::Divw, 0xFFFF_FFFF_FFFF_FFF8, 2);
    // -8 / 2 = -4 in the 32-bit domain.
    assert_eq!(v, 0xFFFF_FFFF_FFFF_FFFC);
}

#[test]
fn flush_abandons_flight() {
    let mut unit = Div::default();
    unit.start(Instr::Divu, 10, 2);
    unit.flush();
    assert!(!unit.busy());
    assert_eq!(unit.step(), None);
}
