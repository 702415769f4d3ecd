//! Register file and write-tag tests.

use pretty_assertions::assert_eq;

use river_core::core::regfile::{RegFile, RegWrite};

// ══════════════════════════════════════════════════════════
// 1. x0 invariant
// ══════════════════════════════════════════════════════════

#[test]
fn x0_reads_zero() {
    let regs = RegFile::new();
    assert_eq!(regs.read(0), 0);
}

#[test]
fn x0_ignores_writes() {
    let mut regs = RegFile::new();
    regs.write(&RegWrite {
        addr: 0,
        data: 0xDEAD,
        tag: 1,
    });
    assert_eq!(regs.read(0), 0);
    assert_eq!(regs.tag(0), 0);
}

// ══════════════════════════════════════════════════════════
// 2. Tagged writes
// ══════════════════════════════════════════════════════════

#[test]
fn fresh_tag_commits() {
    let mut regs = RegFile::new();
    regs.write(&RegWrite {
        addr: 5,
        data: 42,
        tag: 1,
    });
    assert_eq!(regs.read(5), 42);
    assert_eq!(regs.tag(5), 1);
}

#[test]
fn stale_duplicate_tag_dropped() {
    let mut regs = RegFile::new();
    regs.write(&RegWrite {
        addr: 5,
        data: 42,
        tag: 1,
    });
    // Same tag again: squashed producer re-delivering its result.
    regs.write(&RegWrite {
        addr: 5,
        data: 99,
        tag: 1,
    });
    assert_eq!(regs.read(5), 42);
}

#[test]
fn tag_progression_wraps() {
    let mut regs = RegFile::new();
    for t in 1..=8u8 {
        regs.write(&RegWrite {
            addr: 3,
            data: u64::from(t),
            tag: t & 0x7,
        });
    }
    // Tag 8 wraps to 0, distinct from the previous tag 7.
    assert_eq!(regs.read(3), 8);
    assert_eq!(regs.tag(3), 0);
}

// ══════════════════════════════════════════════════════════
// 3. FP half of the namespace
// ══════════════════════════════════════════════════════════

#[test]
fn fp_registers_are_upper_namespace() {
    let mut regs = RegFile::new();
    regs.write(&RegWrite {
        addr: 32,
        data: 0x3FF0_0000_0000_0000,
        tag: 1,
    });
    assert_eq!(regs.read_f(0), 0x3FF0_0000_0000_0000);
    // Integer x0 stays untouched.
    assert_eq!(regs.read(0), 0);
}

// ══════════════════════════════════════════════════════════
// 4. Debug port
// ══════════════════════════════════════════════════════════

#[test]
fn dport_bypasses_tags() {
    let mut regs = RegFile::new();
    regs.dport_write(7, 0x1234);
    assert_eq!(regs.dport_read(7), 0x1234);
    assert_eq!(regs.tag(7), 0);
}

#[test]
fn tags_snapshot_matches() {
    let mut regs = RegFile::new();
    regs.write(&RegWrite {
        addr: 9,
        data: 1,
        tag: 3,
    });
    let tags = regs.tags();
    assert_eq!(tags[9], 3);
    assert_eq!(tags[8], 0);
}
