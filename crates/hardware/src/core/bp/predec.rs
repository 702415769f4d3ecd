//! Lightweight pre-decoder.
//!
//! Scans raw instruction bytes coming back from the I-cache for control
//! flow that can be predicted without a full decode: unconditional `JAL`,
//! backward conditional branches, compressed `C.J` and the compressed
//! `RET` pseudo-instruction. Detected jumps feed speculative BTB writes.

/// Outcome of pre-decoding one instruction slot.
#[derive(Clone, Copy, Debug, Default)]
pub struct PreDecoded {
    /// The slot holds a predictable jump.
    pub jmp: bool,
    /// Instruction address.
    pub pc: u64,
    /// Predicted successor address.
    pub npc: u64,
}

/// Raw encoding of the compressed `ret` (`c.jr ra`).
const C_RET: u16 = 0x8082;

/// Pre-decodes the 32 bits at `pc`.
///
/// `c_valid` marks the low half-word as a compressed encoding; `ra` is
/// the current return-address register for `RET` prediction.
pub fn predecode(pc: u64, data: u32, c_valid: bool, ra: u64) -> PreDecoded {
    let mut out = PreDecoded {
        pc,
        npc: pc.wrapping_add(4),
        ..PreDecoded::default()
    };

    if data & 0x7F == 0x6F {
        // JAL: always taken.
        let off = jal_offset(data);
        out.jmp = true;
        out.npc = pc.wrapping_add(off as u64);
        return out;
    }

    if data & 0x7F == 0x63 && data & 0x8000_0000 != 0 {
        // Conditional branch with a negative offset: predict taken.
        let off = branch_offset(data);
        out.jmp = true;
        out.npc = pc.wrapping_add(off as u64);
        return out;
    }

    if c_valid && (data & 0x3) == 0x1 && (data >> 13) & 0x7 == 0x5 {
        // C.J: always taken.
        let off = c_j_offset(data as u16);
        out.jmp = true;
        out.npc = pc.wrapping_add(off as u64);
        return out;
    }

    if c_valid && (data & 0xFFFF) as u16 == C_RET {
        out.jmp = true;
        out.npc = ra;
        return out;
    }

    out
}

fn jal_offset(inst: u32) -> i64 {
    let b19_12 = (inst >> 12) & 0xFF;
    let b11 = (inst >> 20) & 1;
    let b10_1 = (inst >> 21) & 0x3FF;
    let b20 = (inst >> 31) & 1;
    sign_extend((b20 << 20) | (b19_12 << 12) | (b11 << 11) | (b10_1 << 1), 21)
}

fn branch_offset(inst: u32) -> i64 {
    let b11 = (inst >> 7) & 1;
    let b4_1 = (inst >> 8) & 0xF;
    let b10_5 = (inst >> 25) & 0x3F;
    let b12 = (inst >> 31) & 1;
    sign_extend((b12 << 12) | (b11 << 11) | (b10_5 << 5) | (b4_1 << 1), 13)
}

fn c_j_offset(inst: u16) -> i64 {
    let v = (u32::from((inst >> 3) & 0x7) << 1)
        | (u32::from((inst >> 11) & 1) << 4)
        | (u32::from((inst >> 2) & 1) << 5)
        | (u32::from((inst >> 7) & 1) << 6)
        | (u32::from((inst >> 6) & 1) << 7)
        | (u32::from((inst >> 9) & 0x3) << 8)
        | (u32::from((inst >> 8) & 1) << 10)
        | (u32::from((inst >> 12) & 1) << 11);
    sign_extend(v, 12)
}

fn sign_extend(val: u32, bits: u32) -> i64 {
    let shift = 32 - bits;
    i64::from((val as i32) << shift >> shift)
}
