//! Full 32-bit RV64 instruction decoder.
//!
//! Classifies an uncompressed encoding into the uniform [`DecodedInstr`]
//! record: operation, ISA format, sign-extended immediate, register
//! ports, CSR address and memory-operation descriptor. Covers RV64I, M,
//! A, the privileged/system group, and the D-extension loads, stores and
//! arithmetic forms.

use super::{DecodedInstr, Instr};
use crate::common::{FPUREGS_OFFSET, IsaFormat, memop_size};

/// Major opcode field constants.
pub mod opcodes {
    /// Load group.
    pub const OP_LOAD: u32 = 0x03;
    /// FP load group (`FLD`).
    pub const OP_LOAD_FP: u32 = 0x07;
    /// Fence group.
    pub const OP_MISC_MEM: u32 = 0x0F;
    /// Integer register-immediate group.
    pub const OP_IMM: u32 = 0x13;
    /// `AUIPC`.
    pub const OP_AUIPC: u32 = 0x17;
    /// 32-bit register-immediate group.
    pub const OP_IMM_32: u32 = 0x1B;
    /// Store group.
    pub const OP_STORE: u32 = 0x23;
    /// FP store group (`FSD`).
    pub const OP_STORE_FP: u32 = 0x27;
    /// Atomics group.
    pub const OP_AMO: u32 = 0x2F;
    /// Integer register-register group.
    pub const OP_REG: u32 = 0x33;
    /// `LUI`.
    pub const OP_LUI: u32 = 0x37;
    /// 32-bit register-register group.
    pub const OP_REG_32: u32 = 0x3B;
    /// FP arithmetic group.
    pub const OP_FP: u32 = 0x53;
    /// Conditional branch group.
    pub const OP_BRANCH: u32 = 0x63;
    /// `JALR`.
    pub const OP_JALR: u32 = 0x67;
    /// `JAL`.
    pub const OP_JAL: u32 = 0x6F;
    /// System group (CSR, ECALL/EBREAK, xRET, WFI, SFENCE.VMA).
    pub const OP_SYSTEM: u32 = 0x73;
}

fn rd(inst: u32) -> usize {
    ((inst >> 7) & 0x1F) as usize
}

fn rs1(inst: u32) -> usize {
    ((inst >> 15) & 0x1F) as usize
}

fn rs2(inst: u32) -> usize {
    ((inst >> 20) & 0x1F) as usize
}

fn funct3(inst: u32) -> u32 {
    (inst >> 12) & 0x7
}

fn funct7(inst: u32) -> u32 {
    inst >> 25
}

fn imm_i(inst: u32) -> i64 {
    ((inst as i32) >> 20) as i64
}

fn imm_s(inst: u32) -> i64 {
    let low = (inst >> 7) & 0x1F;
    let high = (inst >> 25) & 0x7F;
    sign_extend((high << 5) | low, 12)
}

fn imm_b(inst: u32) -> i64 {
    let b11 = (inst >> 7) & 1;
    let b4_1 = (inst >> 8) & 0xF;
    let b10_5 = (inst >> 25) & 0x3F;
    let b12 = (inst >> 31) & 1;
    sign_extend((b12 << 12) | (b11 << 11) | (b10_5 << 5) | (b4_1 << 1), 13)
}

fn imm_u(inst: u32) -> i64 {
    ((inst & 0xFFFF_F000) as i32) as i64
}

fn imm_j(inst: u32) -> i64 {
    let b19_12 = (inst >> 12) & 0xFF;
    let b11 = (inst >> 20) & 1;
    let b10_1 = (inst >> 21) & 0x3FF;
    let b20 = (inst >> 31) & 1;
    sign_extend((b20 << 20) | (b19_12 << 12) | (b11 << 11) | (b10_1 << 1), 21)
}

fn sign_extend(val: u32, bits: u32) -> i64 {
    let shift = 32 - bits;
    i64::from((val as i32) << shift >> shift)
}

/// Builds the record for an unrecognised encoding.
fn unimplemented(inst: u32) -> DecodedInstr {
    DecodedInstr {
        instr: inst,
        unimplemented: true,
        ..DecodedInstr::default()
    }
}

/// Decodes a 32-bit encoding into the uniform record.
pub fn decode(inst: u32) -> DecodedInstr {
    let opcode = inst & 0x7F;
    let f3 = funct3(inst);
    let f7 = funct7(inst);

    let mut d = DecodedInstr {
        instr: inst,
        rs1: rs1(inst),
        rs2: rs2(inst),
        rd: rd(inst),
        ..DecodedInstr::default()
    };

    match opcode {
        opcodes::OP_LUI => {
            d.op = Instr::Lui;
            d.format = IsaFormat::U;
            d.imm = imm_u(inst);
            d.rs1 = 0;
            d.rs2 = 0;
        }
        opcodes::OP_AUIPC => {
            d.op = Instr::Auipc;
            d.format = IsaFormat::U;
            d.imm = imm_u(inst);
            d.rs1 = 0;
            d.rs2 = 0;
        }
        opcodes::OP_JAL => {
            d.op = Instr::Jal;
            d.format = IsaFormat::Uj;
            d.imm = imm_j(inst);
            d.rs1 = 0;
            d.rs2 = 0;
        }
        opcodes::OP_JALR => {
            if f3 != 0 {
                return unimplemented(inst);
            }
            d.op = Instr::Jalr;
            d.format = IsaFormat::I;
            d.imm = imm_i(inst);
            d.rs2 = 0;
        }
        opcodes::OP_BRANCH => {
            d.format = IsaFormat::Sb;
            d.imm = imm_b(inst);
            d.rd = 0;
            d.op = match f3 {
                0 => Instr::Beq,
                1 => Instr::Bne,
                4 => Instr::Blt,
                5 => Instr::Bge,
                6 => Instr::Bltu,
                7 => Instr::Bgeu,
                _ => return unimplemented(inst),
            };
        }
        opcodes::OP_LOAD => {
            d.format = IsaFormat::I;
            d.imm = imm_i(inst);
            d.rs2 = 0;
            let (op, size, sign) = match f3 {
                0 => (Instr::Lb, memop_size::BYTE, true),
                1 => (Instr::Lh, memop_size::HALF, true),
                2 => (Instr::Lw, memop_size::WORD, true),
                3 => (Instr::Ld, memop_size::DOUBLE, false),
                4 => (Instr::Lbu, memop_size::BYTE, false),
                5 => (Instr::Lhu, memop_size::HALF, false),
                6 => (Instr::Lwu, memop_size::WORD, false),
                _ => return unimplemented(inst),
            };
            d.op = op;
            d.memop_size = size;
            d.memop_sign_ext = sign;
        }
        opcodes::OP_STORE => {
            d.format = IsaFormat::S;
            d.imm = imm_s(inst);
            d.rd = 0;
            let (op, size) = match f3 {
                0 => (Instr::Sb, memop_size::BYTE),
                1 => (Instr::Sh, memop_size::HALF),
                2 => (Instr::Sw, memop_size::WORD),
                3 => (Instr::Sd, memop_size::DOUBLE),
                _ => return unimplemented(inst),
            };
            d.op = op;
            d.memop_size = size;
        }
        opcodes::OP_IMM => {
            d.format = IsaFormat::I;
            d.imm = imm_i(inst);
            d.rs2 = 0;
            d.op = match f3 {
                0 => Instr::Addi,
                1 if f7 & 0x7E == 0 => Instr::Slli,
                2 => Instr::Slti,
                3 => Instr::Sltiu,
                4 => Instr::Xori,
                5 if f7 & 0x7E == 0 => Instr::Srli,
                5 if f7 & 0x7E == 0x40 => Instr::Srai,
                6 => Instr::Ori,
                7 => Instr::Andi,
                _ => return unimplemented(inst),
            };
        }
        opcodes::OP_IMM_32 => {
            d.format = IsaFormat::I;
            d.imm = imm_i(inst);
            d.rs2 = 0;
            d.rv32 = true;
            d.op = match (f3, f7) {
                (0, _) => Instr::Addiw,
                (1, 0x00) => Instr::Slliw,
                (5, 0x00) => Instr::Srliw,
                (5, 0x20) => Instr::Sraiw,
                _ => return unimplemented(inst),
            };
        }
        opcodes::OP_REG => {
            d.format = IsaFormat::R;
            d.op = match (f3, f7) {
                (0, 0x00) => Instr::Add,
                (0, 0x20) => Instr::Sub,
                (1, 0x00) => Instr::Sll,
                (2, 0x00) => Instr::Slt,
                (3, 0x00) => Instr::Sltu,
                (4, 0x00) => Instr::Xor,
                (5, 0x00) => Instr::Srl,
                (5, 0x20) => Instr::Sra,
                (6, 0x00) => Instr::Or,
                (7, 0x00) => Instr::And,
                (0, 0x01) => Instr::Mul,
                (1, 0x01) => Instr::Mulh,
                (2, 0x01) => Instr::Mulhsu,
                (3, 0x01) => Instr::Mulhu,
                (4, 0x01) => Instr::Div,
                (5, 0x01) => Instr::Divu,
                (6, 0x01) => Instr::Rem,
                (7, 0x01) => Instr::Remu,
                _ => return unimplemented(inst),
            };
        }
        opcodes::OP_REG_32 => {
            d.format = IsaFormat::R;
            d.rv32 = true;
            d.op = match (f3, f7) {
                (0, 0x00) => Instr::Addw,
                (0, 0x20) => Instr::Subw,
                (1, 0x00) => Instr::Sllw,
                (5, 0x00) => Instr::Srlw,
                (5, 0x20) => Instr::Sraw,
                (0, 0x01) => Instr::Mulw,
                (4, 0x01) => Instr::Divw,
                (5, 0x01) => Instr::Divuw,
                (6, 0x01) => Instr::Remw,
                (7, 0x01) => Instr::Remuw,
                _ => return unimplemented(inst),
            };
        }
        opcodes::OP_AMO => {
            d.format = IsaFormat::R;
            let f5 = f7 >> 2;
            let word = match f3 {
                2 => true,
                3 => false,
                _ => return unimplemented(inst),
            };
            d.memop_size = if word {
                memop_size::WORD
            } else {
                memop_size::DOUBLE
            };
            d.memop_sign_ext = word;
            d.rv32 = word;
            d.op = match (f5, word) {
                (0x00, true) => Instr::AmoaddW,
                (0x01, true) => Instr::AmoswapW,
                (0x02, true) => Instr::LrW,
                (0x03, true) => Instr::ScW,
                (0x04, true) => Instr::AmoxorW,
                (0x08, true) => Instr::AmoorW,
                (0x0C, true) => Instr::AmoandW,
                (0x10, true) => Instr::AmominW,
                (0x14, true) => Instr::AmomaxW,
                (0x18, true) => Instr::AmominuW,
                (0x1C, true) => Instr::AmomaxuW,
                (0x00, false) => Instr::AmoaddD,
                (0x01, false) => Instr::AmoswapD,
                (0x02, false) => Instr::LrD,
                (0x03, false) => Instr::ScD,
                (0x04, false) => Instr::AmoxorD,
                (0x08, false) => Instr::AmoorD,
                (0x0C, false) => Instr::AmoandD,
                (0x10, false) => Instr::AmominD,
                (0x14, false) => Instr::AmomaxD,
                (0x18, false) => Instr::AmominuD,
                (0x1C, false) => Instr::AmomaxuD,
                _ => return unimplemented(inst),
            };
        }
        opcodes::OP_MISC_MEM => {
            d.format = IsaFormat::I;
            d.op = match f3 {
                0 => Instr::Fence,
                1 => Instr::FenceI,
                _ => return unimplemented(inst),
            };
        }
        opcodes::OP_SYSTEM => {
            d.format = IsaFormat::I;
            d.csr_addr = (inst >> 20) as u16;
            d.rs2 = 0;
            match f3 {
                0 => {
                    d.op = match inst >> 7 {
                        0x0000_0000 => Instr::Ecall,
                        0x0000_2000 => Instr::Ebreak,
                        0x0000_4000 => Instr::Uret,
                        0x0020_4000 => Instr::Sret,
                        0x0040_4000 => Instr::Hret,
                        0x0060_4000 => Instr::Mret,
                        0x0020_A000 => Instr::Wfi,
                        _ if f7 == 0x09 => {
                            d.rd = 0;
                            Instr::SfenceVma
                        }
                        _ => return unimplemented(inst),
                    };
                }
                1 => d.op = Instr::Csrrw,
                2 => d.op = Instr::Csrrs,
                3 => d.op = Instr::Csrrc,
                5 => {
                    d.op = Instr::Csrrwi;
                    d.imm = i64::from(d.rs1 as u32);
                    d.rs1 = 0;
                }
                6 => {
                    d.op = Instr::Csrrsi;
                    d.imm = i64::from(d.rs1 as u32);
                    d.rs1 = 0;
                }
                7 => {
                    d.op = Instr::Csrrci;
                    d.imm = i64::from(d.rs1 as u32);
                    d.rs1 = 0;
                }
                _ => return unimplemented(inst),
            }
        }
        opcodes::OP_LOAD_FP => {
            if f3 != 3 {
                return unimplemented(inst);
            }
            d.op = Instr::Fld;
            d.format = IsaFormat::I;
            d.imm = imm_i(inst);
            d.rs2 = 0;
            d.rd += FPUREGS_OFFSET;
            d.memop_size = memop_size::DOUBLE;
            d.f64 = true;
        }
        opcodes::OP_STORE_FP => {
            if f3 != 3 {
                return unimplemented(inst);
            }
            d.op = Instr::Fsd;
            d.format = IsaFormat::S;
            d.imm = imm_s(inst);
            d.rd = 0;
            d.rs2 += FPUREGS_OFFSET;
            d.memop_size = memop_size::DOUBLE;
            d.f64 = true;
        }
        opcodes::OP_FP => {
            d.format = IsaFormat::R;
            d.f64 = true;
            let src2 = d.rs2 & 0x1F;
            // Register namespaces depend on the operation: comparisons and
            // X-bound conversions write integer rd, D-bound sources read
            // integer rs1.
            let (op, rd_fp, rs1_fp, rs2_fp) = match f7 {
                0x01 => (Instr::FaddD, true, true, true),
                0x05 => (Instr::FsubD, true, true, true),
                0x09 => (Instr::FmulD, true, true, true),
                0x0D => (Instr::FdivD, true, true, true),
                0x15 if f3 == 0 => (Instr::FminD, true, true, true),
                0x15 if f3 == 1 => (Instr::FmaxD, true, true, true),
                0x51 if f3 == 2 => (Instr::FeqD, false, true, true),
                0x51 if f3 == 1 => (Instr::FltD, false, true, true),
                0x51 if f3 == 0 => (Instr::FleD, false, true, true),
                0x61 => match src2 {
                    0 => (Instr::FcvtWD, false, true, false),
                    1 => (Instr::FcvtWuD, false, true, false),
                    2 => (Instr::FcvtLD, false, true, false),
                    3 => (Instr::FcvtLuD, false, true, false),
                    _ => return unimplemented(inst),
                },
                0x69 => match src2 {
                    0 => (Instr::FcvtDW, true, false, false),
                    1 => (Instr::FcvtDWu, true, false, false),
                    2 => (Instr::FcvtDL, true, false, false),
                    3 => (Instr::FcvtDLu, true, false, false),
                    _ => return unimplemented(inst),
                },
                0x71 if f3 == 0 && src2 == 0 => (Instr::FmovXD, false, true, false),
                0x79 if f3 == 0 && src2 == 0 => (Instr::FmovDX, true, false, false),
                _ => return unimplemented(inst),
            };
            d.op = op;
            if rd_fp {
                d.rd += FPUREGS_OFFSET;
            }
            if rs1_fp {
                d.rs1 += FPUREGS_OFFSET;
            }
            if rs2_fp {
                d.rs2 += FPUREGS_OFFSET;
            } else if matches!(op, Instr::FcvtWD | Instr::FcvtWuD | Instr::FcvtLD
                | Instr::FcvtLuD | Instr::FcvtDW | Instr::FcvtDWu | Instr::FcvtDL
                | Instr::FcvtDLu | Instr::FmovXD | Instr::FmovDX)
            {
                d.rs2 = 0;
            }
        }
        _ => return unimplemented(inst),
    }

    d
}
