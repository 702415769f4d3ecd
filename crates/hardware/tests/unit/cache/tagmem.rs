//! Tag/data memory tests.

use pretty_assertions::assert_eq;

use river_core::cache::tagmem::{TagMem, fl};
use river_core::common::line::CacheLine;
use river_core::config::CacheConfig;

fn small_mem() -> TagMem {
    // 2 ways x 4 indexes of 32-byte lines.
    TagMem::new(&CacheConfig {
        way_bits: 1,
        index_bits: 2,
    })
}

fn line_with(value: u64) -> CacheLine {
    CacheLine::from_u64(value)
}

// ══════════════════════════════════════════════════════════
// 1. Probe behaviour
// ══════════════════════════════════════════════════════════

#[test]
fn empty_memory_misses() {
    let mut mem = small_mem();
    let p = mem.probe(0x1000);
    assert!(!p.hit);
    assert_eq!(p.rflags, 0);
}

#[test]
fn write_then_hit() {
    let mut mem = small_mem();
    mem.write(0x1000, &line_with(0xAB), u32::MAX, fl::VALID);
    let p = mem.probe(0x1000);
    assert!(p.hit);
    assert_eq!(p.rdata.word(0), 0xAB);
    assert_eq!(p.raddr, 0x1000);
}

#[test]
fn offset_within_line_still_hits() {
    let mut mem = small_mem();
    mem.write(0x1000, &line_with(0xAB), u32::MAX, fl::VALID);
    assert!(mem.probe(0x101C).hit);
    assert!(!mem.probe(0x1020).hit, "next line is a different index");
}

#[test]
fn miss_reports_victim_line() {
    let mut mem = small_mem();
    mem.write(0x1000, &line_with(1), u32::MAX, fl::VALID | fl::DIRTY);
    mem.write(0x2000, &line_with(2), u32::MAX, fl::VALID);
    // Same index, third tag: the probe reports the LRU victim (0x1000).
    let p = mem.probe(0x3000);
    assert!(!p.hit);
    assert_eq!(p.raddr, 0x1000);
    assert_ne!(p.rflags & fl::DIRTY, 0);
}

// ══════════════════════════════════════════════════════════
// 2. Flag updates and invalidation
// ══════════════════════════════════════════════════════════

#[test]
fn write_flags_only_touches_present_line() {
    let mut mem = small_mem();
    mem.write(0x1000, &line_with(1), u32::MAX, fl::VALID);
    mem.write_flags(0x1000, fl::VALID | fl::RESERVED);
    assert_ne!(mem.probe(0x1000).rflags & fl::RESERVED, 0);
    // Data untouched.
    assert_eq!(mem.probe(0x1000).rdata.word(0), 1);
}

#[test]
fn invalidate_clears_hit() {
    let mut mem = small_mem();
    mem.write(0x1000, &line_with(1), u32::MAX, fl::VALID);
    mem.invalidate(0x1000);
    assert!(!mem.probe(0x1000).hit);
}

#[test]
fn snoop_does_not_touch_lru() {
    let mut mem = small_mem();
    mem.write(0x1000, &line_with(1), u32::MAX, fl::VALID);
    mem.write(0x2000, &line_with(2), u32::MAX, fl::VALID);
    // Snoop the older line; it must stay the victim.
    let s = mem.snoop(0x1000);
    assert!(s.hit);
    let p = mem.probe(0x3000);
    assert_eq!(p.raddr, 0x1000, "snoop must not refresh LRU order");
}

// ══════════════════════════════════════════════════════════
// 3. Direct-access walk
// ══════════════════════════════════════════════════════════

#[test]
fn direct_invalidate_clears_each_way() {
    let mut mem = small_mem();
    mem.write(0x1000, &line_with(1), u32::MAX, fl::VALID);
    mem.write(0x2000, &line_with(2), u32::MAX, fl::VALID);

    // Index of 0x1000 in this geometry is (0x1000 >> 5) & 3 == 0.
    let (_, flags0, _) = mem.invalidate_direct(0x0, 1);
    let (_, flags1, _) = mem.invalidate_direct(0x1, 1);
    assert_ne!(
        (flags0 | flags1) & fl::VALID,
        0,
        "one of the two ways held a line"
    );
    assert!(!mem.probe(0x1000).hit);
    assert!(!mem.probe(0x2000).hit);
}

#[test]
fn partial_strobe_merges() {
    let mut mem = small_mem();
    mem.write(0x1000, &line_with(0x1111_1111_1111_1111), u32::MAX, fl::VALID);
    let mut update = CacheLine::ZERO;
    update.set_word(0, 0xFFFF_FFFF_FFFF_FFFF);
    mem.write(0x1000, &update, 0x0000_00FF, fl::VALID | fl::DIRTY);
    let p = mem.probe(0x1000);
    assert_eq!(p.rdata.word(0), 0xFFFF_FFFF_FFFF_FFFF);
    assert_eq!(p.rdata.word(1), 0, "untouched words keep old data");
}
