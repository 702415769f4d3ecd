//! Compressed-instruction recoder.
//!
//! Expands a 16-bit RVC encoding into its 32-bit equivalent so that one
//! decoder back-end serves both slices. Returns 0 for encodings that have
//! no RV64 expansion (including the all-zero illegal pattern).

use super::rv::opcodes;

/// funct3 values reused while re-assembling 32-bit encodings.
mod f3 {
    pub const ADD_SUB: u32 = 0;
    pub const SLL: u32 = 1;
    pub const XOR: u32 = 4;
    pub const SRL_SRA: u32 = 5;
    pub const OR: u32 = 6;
    pub const AND: u32 = 7;
    pub const LW: u32 = 2;
    pub const LD: u32 = 3;
    pub const SW: u32 = 2;
    pub const SD: u32 = 3;
    pub const BEQ: u32 = 0;
    pub const BNE: u32 = 1;
}

fn sign_extend(val: u32, bits: u32) -> u32 {
    let shift = 32 - bits;
    (((val << shift) as i32) >> shift) as u32
}

/// Compact register index (3 bits mapping to x8-x15).
fn rc(inst: u16, shift: u16) -> u32 {
    8 + u32::from((inst >> shift) & 0x7)
}

/// Full register index (5 bits).
fn rf(inst: u16, shift: u16) -> u32 {
    u32::from((inst >> shift) & 0x1F)
}

fn i_type(imm: u32, rs1: u32, funct3: u32, rd: u32, opcode: u32) -> u32 {
    ((imm & 0xFFF) << 20) | (rs1 << 15) | (funct3 << 12) | (rd << 7) | opcode
}

fn r_type(funct7: u32, rs2: u32, rs1: u32, funct3: u32, rd: u32, opcode: u32) -> u32 {
    (funct7 << 25) | (rs2 << 20) | (rs1 << 15) | (funct3 << 12) | (rd << 7) | opcode
}

fn s_type(imm: u32, rs2: u32, rs1: u32, funct3: u32, opcode: u32) -> u32 {
    (((imm >> 5) & 0x7F) << 25) | (rs2 << 20) | (rs1 << 15) | (funct3 << 12) | ((imm & 0x1F) << 7) | opcode
}

fn b_type(imm: u32, rs2: u32, rs1: u32, funct3: u32) -> u32 {
    (((imm >> 12) & 1) << 31)
        | (((imm >> 5) & 0x3F) << 25)
        | (rs2 << 20)
        | (rs1 << 15)
        | (funct3 << 12)
        | (((imm >> 1) & 0xF) << 8)
        | (((imm >> 11) & 1) << 7)
        | opcodes::OP_BRANCH
}

fn j_type(imm: u32, rd: u32) -> u32 {
    (((imm >> 20) & 1) << 31)
        | (((imm >> 1) & 0x3FF) << 21)
        | (((imm >> 11) & 1) << 20)
        | (((imm >> 12) & 0xFF) << 12)
        | (rd << 7)
        | opcodes::OP_JAL
}

/// Expands a 16-bit RVC encoding; 0 when the encoding is illegal.
pub fn expand(inst: u16) -> u32 {
    let quadrant = inst & 0x3;
    let funct3 = (inst >> 13) & 0x7;

    match quadrant {
        0 => expand_q0(inst, funct3),
        1 => expand_q1(inst, funct3),
        2 => expand_q2(inst, funct3),
        _ => 0,
    }
}

fn expand_q0(inst: u16, funct3: u16) -> u32 {
    match funct3 {
        // C.ADDI4SPN
        0 => {
            let imm = (u32::from((inst >> 6) & 1) << 2)
                | (u32::from((inst >> 5) & 1) << 3)
                | (u32::from((inst >> 11) & 0x3) << 4)
                | (u32::from((inst >> 7) & 0xF) << 6);
            if imm == 0 {
                return 0;
            }
            i_type(imm, 2, f3::ADD_SUB, rc(inst, 2), opcodes::OP_IMM)
        }
        // C.FLD
        1 => {
            let imm = ld_uimm(inst);
            i_type(imm, rc(inst, 7), f3::LD, rc(inst, 2), opcodes::OP_LOAD_FP)
        }
        // C.LW
        2 => {
            let imm = lw_uimm(inst);
            i_type(imm, rc(inst, 7), f3::LW, rc(inst, 2), opcodes::OP_LOAD)
        }
        // C.LD
        3 => {
            let imm = ld_uimm(inst);
            i_type(imm, rc(inst, 7), f3::LD, rc(inst, 2), opcodes::OP_LOAD)
        }
        // C.FSD
        5 => {
            let imm = ld_uimm(inst);
            s_type(imm, rc(inst, 2), rc(inst, 7), f3::SD, opcodes::OP_STORE_FP)
        }
        // C.SW
        6 => {
            let imm = lw_uimm(inst);
            s_type(imm, rc(inst, 2), rc(inst, 7), f3::SW, opcodes::OP_STORE)
        }
        // C.SD
        7 => {
            let imm = ld_uimm(inst);
            s_type(imm, rc(inst, 2), rc(inst, 7), f3::SD, opcodes::OP_STORE)
        }
        _ => 0,
    }
}

fn expand_q1(inst: u16, funct3: u16) -> u32 {
    let imm6 = sign_extend(
        u32::from((inst >> 2) & 0x1F) | (u32::from((inst >> 12) & 1) << 5),
        6,
    );
    match funct3 {
        // C.NOP / C.ADDI
        0 => {
            let r = rf(inst, 7);
            i_type(imm6, r, f3::ADD_SUB, r, opcodes::OP_IMM)
        }
        // C.ADDIW
        1 => {
            let r = rf(inst, 7);
            if r == 0 {
                return 0;
            }
            i_type(imm6, r, f3::ADD_SUB, r, opcodes::OP_IMM_32)
        }
        // C.LI
        2 => i_type(imm6, 0, f3::ADD_SUB, rf(inst, 7), opcodes::OP_IMM),
        // C.ADDI16SP / C.LUI
        3 => {
            let r = rf(inst, 7);
            if r == 2 {
                let imm = sign_extend(
                    (u32::from((inst >> 6) & 1) << 4)
                        | (u32::from((inst >> 2) & 1) << 5)
                        | (u32::from((inst >> 5) & 1) << 6)
                        | (u32::from((inst >> 3) & 3) << 7)
                        | (u32::from((inst >> 12) & 1) << 9),
                    10,
                );
                if imm == 0 {
                    return 0;
                }
                i_type(imm, 2, f3::ADD_SUB, 2, opcodes::OP_IMM)
            } else {
                if imm6 == 0 {
                    return 0;
                }
                ((imm6 & 0xFFFFF) << 12) | (r << 7) | opcodes::OP_LUI
            }
        }
        // C.SRLI / C.SRAI / C.ANDI / register ALU group
        4 => {
            let r = rc(inst, 7);
            match (inst >> 10) & 0x3 {
                0 => i_type(imm6 & 0x3F, r, f3::SRL_SRA, r, opcodes::OP_IMM),
                1 => i_type((imm6 & 0x3F) | 0x400, r, f3::SRL_SRA, r, opcodes::OP_IMM),
                2 => i_type(imm6, r, f3::AND, r, opcodes::OP_IMM),
                _ => {
                    let rs2 = rc(inst, 2);
                    match ((inst >> 12) & 1, (inst >> 5) & 0x3) {
                        (0, 0) => r_type(0x20, rs2, r, f3::ADD_SUB, r, opcodes::OP_REG),
                        (0, 1) => r_type(0, rs2, r, f3::XOR, r, opcodes::OP_REG),
                        (0, 2) => r_type(0, rs2, r, f3::OR, r, opcodes::OP_REG),
                        (0, 3) => r_type(0, rs2, r, f3::AND, r, opcodes::OP_REG),
                        (1, 0) => r_type(0x20, rs2, r, f3::ADD_SUB, r, opcodes::OP_REG_32),
                        (1, 1) => r_type(0, rs2, r, f3::ADD_SUB, r, opcodes::OP_REG_32),
                        _ => 0,
                    }
                }
            }
        }
        // C.J
        5 => j_type(cj_imm(inst), 0),
        // C.BEQZ
        6 => b_type(cb_imm(inst), 0, rc(inst, 7), f3::BEQ),
        // C.BNEZ
        7 => b_type(cb_imm(inst), 0, rc(inst, 7), f3::BNE),
        _ => 0,
    }
}

fn expand_q2(inst: u16, funct3: u16) -> u32 {
    match funct3 {
        // C.SLLI
        0 => {
            let r = rf(inst, 7);
            let shamt = u32::from((inst >> 2) & 0x1F) | (u32::from((inst >> 12) & 1) << 5);
            i_type(shamt, r, f3::SLL, r, opcodes::OP_IMM)
        }
        // C.FLDSP
        1 => {
            let imm = ldsp_uimm(inst);
            i_type(imm, 2, f3::LD, rf(inst, 7), opcodes::OP_LOAD_FP)
        }
        // C.LWSP
        2 => {
            let r = rf(inst, 7);
            if r == 0 {
                return 0;
            }
            let imm = (u32::from((inst >> 4) & 0x7) << 2)
                | (u32::from((inst >> 12) & 1) << 5)
                | (u32::from((inst >> 2) & 0x3) << 6);
            i_type(imm, 2, f3::LW, r, opcodes::OP_LOAD)
        }
        // C.LDSP
        3 => {
            let r = rf(inst, 7);
            if r == 0 {
                return 0;
            }
            i_type(ldsp_uimm(inst), 2, f3::LD, r, opcodes::OP_LOAD)
        }
        // C.JR / C.MV / C.EBREAK / C.JALR / C.ADD
        4 => {
            let r = rf(inst, 7);
            let rs2 = rf(inst, 2);
            if (inst >> 12) & 1 == 0 {
                if rs2 == 0 {
                    if r == 0 {
                        return 0;
                    }
                    // C.JR
                    i_type(0, r, 0, 0, opcodes::OP_JALR)
                } else {
                    // C.MV
                    r_type(0, rs2, 0, f3::ADD_SUB, r, opcodes::OP_REG)
                }
            } else if rs2 == 0 {
                if r == 0 {
                    // C.EBREAK
                    0x0010_0073
                } else {
                    // C.JALR
                    i_type(0, r, 0, 1, opcodes::OP_JALR)
                }
            } else {
                // C.ADD
                r_type(0, rs2, r, f3::ADD_SUB, r, opcodes::OP_REG)
            }
        }
        // C.FSDSP
        5 => {
            let imm = sdsp_uimm(inst);
            s_type(imm, rf(inst, 2), 2, f3::SD, opcodes::OP_STORE_FP)
        }
        // C.SWSP
        6 => {
            let imm = (u32::from((inst >> 9) & 0xF) << 2) | (u32::from((inst >> 7) & 0x3) << 6);
            s_type(imm, rf(inst, 2), 2, f3::SW, opcodes::OP_STORE)
        }
        // C.SDSP
        7 => s_type(sdsp_uimm(inst), rf(inst, 2), 2, f3::SD, opcodes::OP_STORE),
        _ => 0,
    }
}

/// Word-scaled load/store immediate for C.LW/C.SW.
fn lw_uimm(inst: u16) -> u32 {
    (u32::from((inst >> 6) & 1) << 2)
        | (u32::from((inst >> 10) & 0x7) << 3)
        | (u32::from((inst >> 5) & 1) << 6)
}

/// Double-scaled load/store immediate for C.LD/C.SD/C.FLD/C.FSD.
fn ld_uimm(inst: u16) -> u32 {
    (u32::from((inst >> 10) & 0x7) << 3) | (u32::from((inst >> 5) & 0x3) << 6)
}

/// Stack-relative double load immediate for C.LDSP/C.FLDSP.
fn ldsp_uimm(inst: u16) -> u32 {
    (u32::from((inst >> 5) & 0x3) << 3)
        | (u32::from((inst >> 12) & 1) << 5)
        | (u32::from((inst >> 2) & 0x7) << 6)
}

/// Stack-relative double store immediate for C.SDSP/C.FSDSP.
fn sdsp_uimm(inst: u16) -> u32 {
    (u32::from((inst >> 10) & 0x7) << 3) | (u32::from((inst >> 7) & 0x7) << 6)
}

/// Branch offset for C.BEQZ/C.BNEZ.
fn cb_imm(inst: u16) -> u32 {
    sign_extend(
        (u32::from((inst >> 3) & 0x3) << 1)
            | (u32::from((inst >> 10) & 0x3) << 3)
            | (u32::from((inst >> 2) & 1) << 5)
            | (u32::from((inst >> 5) & 0x3) << 6)
            | (u32::from((inst >> 12) & 1) << 8),
        9,
    )
}

/// Jump offset for C.J.
fn cj_imm(inst: u16) -> u32 {
    sign_extend(
        (u32::from((inst >> 3) & 0x7) << 1)
            | (u32::from((inst >> 11) & 1) << 4)
            | (u32::from((inst >> 2) & 1) << 5)
            | (u32::from((inst >> 7) & 1) << 6)
            | (u32::from((inst >> 6) & 1) << 7)
            | (u32::from((inst >> 9) & 0x3) << 8)
            | (u32::from((inst >> 8) & 1) << 10)
            | (u32::from((inst >> 12) & 1) << 11),
        12,
    )
}
