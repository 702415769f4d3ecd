//! Logic ALU, adder/subtractor and branch condition derivation.
//!
//! Branch conditions come from a single 64-bit subtraction, the way the
//! hardware shares one subtractor between SUB, SLT and the branch
//! comparators.

/// Condition flags derived from `a - b`.
#[derive(Clone, Copy, Debug, Default)]
pub struct CmpFlags {
    /// `a == b`.
    pub eq: bool,
    /// `a != b`.
    pub ne: bool,
    /// `a < b`, unsigned.
    pub ltu: bool,
    /// `a < b`, signed.
    pub lt: bool,
    /// `a >= b`, signed.
    pub ge: bool,
    /// `a >= b`, unsigned.
    pub geu: bool,
}

/// Computes the comparison flags for a pair of operands.
pub fn compare(a: u64, b: u64) -> CmpFlags {
    let eq = a == b;
    let ltu = a < b;
    let lt = (a as i64) < (b as i64);
    CmpFlags {
        eq,
        ne: !eq,
        ltu,
        lt,
        ge: !lt,
        geu: !ltu,
    }
}

/// Addition with optional 32-bit operand width.
pub fn add(a: u64, b: u64, rv32: bool) -> u64 {
    let sum = a.wrapping_add(b);
    if rv32 { sext32(sum) } else { sum }
}

/// Subtraction with optional 32-bit operand width.
pub fn sub(a: u64, b: u64, rv32: bool) -> u64 {
    let diff = a.wrapping_sub(b);
    if rv32 { sext32(diff) } else { diff }
}

/// Bitwise AND.
pub fn and(a: u64, b: u64) -> u64 {
    a & b
}

/// Bitwise OR.
pub fn or(a: u64, b: u64) -> u64 {
    a | b
}

/// Bitwise XOR.
pub fn xor(a: u64, b: u64) -> u64 {
    a ^ b
}

/// Sign-extends the low 32 bits across a 64-bit register.
pub fn sext32(v: u64) -> u64 {
    v as u32 as i32 as i64 as u64
}
