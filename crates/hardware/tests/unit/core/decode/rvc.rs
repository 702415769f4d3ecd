//! Compressed recoder tests.
//!
//! Each case checks that a 16-bit encoding expands into the expected
//! 32-bit instruction (compared through the full decoder, which is
//! independently covered).

use pretty_assertions::assert_eq;

use river_core::core::decode::{Instr, rv, rvc};

// ══════════════════════════════════════════════════════════
// 1. Quadrant 0
// ══════════════════════════════════════════════════════════

#[test]
fn all_zero_is_illegal() {
    assert_eq!(rvc::expand(0), 0);
}

#[test]
fn c_addi4spn() {
    // c.addi4spn a0, sp, 16 => 0x0808
    let d = rv::decode(rvc::expand(0x0808));
    assert_eq!(d.op, Instr::Addi);
    assert_eq!(d.rd, 10);
    assert_eq!(d.rs1, 2);
    assert_eq!(d.imm, 16);
}

#[test]
fn c_addi4spn_zero_imm_reserved() {
    // funct3 000 with a zero immediate is the reserved encoding.
    assert_eq!(rvc::expand(0x0000), 0);
}

#[test]
fn c_lw() {
    // c.lw a2, 8(a0) => 010 0 1010 10 010 00 == 0x4510
    let d = rv::decode(rvc::expand(0x4510));
    assert_eq!(d.op, Instr::Lw);
    assert_eq!(d.rd, 12);
    assert_eq!(d.rs1, 10);
    assert_eq!(d.imm, 8);
}

#[test]
fn c_sd() {
    // c.sd a2, 8(a0) => 0xE510
    let d = rv::decode(rvc::expand(0xE510));
    assert_eq!(d.op, Instr::Sd);
    assert_eq!(d.rs2, 12);
    assert_eq!(d.rs1, 10);
    assert_eq!(d.imm, 8);
}

// ══════════════════════════════════════════════════════════
// 2. Quadrant 1
// ══════════════════════════════════════════════════════════

#[test]
fn c_nop_is_addi_x0() {
    // c.nop == c.addi x0, 0 => 0x0001
    let d = rv::decode(rvc::expand(0x0001));
    assert_eq!(d.op, Instr::Addi);
    assert_eq!(d.rd, 0);
    assert_eq!(d.imm, 0);
}

#[test]
fn c_addi_negative() {
    // c.addi a0, -1 => 0x157D
    let d = rv::decode(rvc::expand(0x157D));
    assert_eq!(d.op, Instr::Addi);
    assert_eq!(d.rd, 10);
    assert_eq!(d.rs1, 10);
    assert_eq!(d.imm, -1);
}

#[test]
fn c_li() {
    // c.li a5, 5 => 0x4795
    let d = rv::decode(rvc::expand(0x4795));
    assert_eq!(d.op, Instr::Addi);
    assert_eq!(d.rd, 15);
    assert_eq!(d.rs1, 0);
    assert_eq!(d.imm, 5);
}

#[test]
fn c_addiw_x0_reserved() {
    // c.addiw with rd = x0 is reserved.
    assert_eq!(rvc::expand(0x2001), 0);
}

#[test]
fn c_sub() {
    // c.sub a0, a1 => 100 0 11 010 00 011 01 == 0x8D0D
    let d = rv::decode(rvc::expand(0x8D0D));
    assert_eq!(d.op, Instr::Sub);
    assert_eq!(d.rd, 10);
    assert_eq!(d.rs1, 10);
    assert_eq!(d.rs2, 11);
}

#[test]
fn c_j_forward() {
    // c.j +8 => 0xA021
    let d = rv::decode(rvc::expand(0xA021));
    assert_eq!(d.op, Instr::Jal);
    assert_eq!(d.rd, 0);
    assert_eq!(d.imm, 8);
}

#[test]
fn c_beqz() {
    // c.beqz a0, +6 => 0xC119
    let d = rv::decode(rvc::expand(0xC119));
    assert_eq!(d.op, Instr::Beq);
    assert_eq!(d.rs1, 10);
    assert_eq!(d.rs2, 0);
    assert_eq!(d.imm, 6);
}

// ══════════════════════════════════════════════════════════
// 3. Quadrant 2
// ══════════════════════════════════════════════════════════

#[test]
fn c_slli() {
    // c.slli a0, 32 => 0x1502
    let d = rv::decode(rvc::expand(0x1502));
    assert_eq!(d.op, Instr::Slli);
    assert_eq!(d.rd, 10);
    assert_eq!(d.imm & 0x3F, 32);
}

#[test]
fn c_jr_is_jalr_x0() {
    // c.jr a0 => 0x8502
    let d = rv::decode(rvc::expand(0x8502));
    assert_eq!(d.op, Instr::Jalr);
    assert_eq!(d.rd, 0);
    assert_eq!(d.rs1, 10);
    assert_eq!(d.imm, 0);
}

#[test]
fn c_ret_is_jalr_ra() {
    // ret == c.jr ra => 0x8082
    let d = rv::decode(rvc::expand(0x8082));
    assert_eq!(d.op, Instr::Jalr);
    assert_eq!(d.rd, 0);
    assert_eq!(d.rs1, 1);
}

#[test]
fn c_jr_x0_reserved() {
    assert_eq!(rvc::expand(0x8002), 0);
}

#[test]
fn c_ebreak() {
    // c.ebreak => 0x9002
    let d = rv::decode(rvc::expand(0x9002));
    assert_eq!(d.op, Instr::Ebreak);
}

#[test]
fn c_add() {
    // c.add a0, a1 => 0x952E
    let d = rv::decode(rvc::expand(0x952E));
    assert_eq!(d.op, Instr::Add);
    assert_eq!(d.rd, 10);
    assert_eq!(d.rs1, 10);
    assert_eq!(d.rs2, 11);
}

#[test]
fn c_mv() {
    // c.mv a0, a1 => 0x852E
    let d = rv::decode(rvc::expand(0x852E));
    assert_eq!(d.op, Instr::Add);
    assert_eq!(d.rd, 10);
    assert_eq!(d.rs1, 0);
    assert_eq!(d.rs2, 11);
}

#[test]
fn c_ldsp() {
    // c.ldsp a0, 8(sp) => 0x6522
    let d = rv::decode(rvc::expand(0x6522));
    assert_eq!(d.op, Instr::Ld);
    assert_eq!(d.rd, 10);
    assert_eq!(d.rs1, 2);
    assert_eq!(d.imm, 8);
}

#[test]
fn c_sdsp() {
    // c.sdsp a0, 8(sp) => 0xE42A
    let d = rv::decode(rvc::expand(0xE42A));
    assert_eq!(d.op, Instr::Sd);
    assert_eq!(d.rs2, 10);
    assert_eq!(d.rs1, 2);
    assert_eq!(d.imm, 8);
}
