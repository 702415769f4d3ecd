//! Multi-cycle multiplier and divider.
//!
//! Both units follow the same shape: `start` latches the operands,
//! `step` is called once per cycle and returns the result on the cycle
//! the hardware pipeline would raise `valid`. The Execute stage sits in
//! `WaitMulti` until that happens. Division by zero and the signed
//! overflow case follow the RISC-V M-extension rules.

use super::alu::sext32;
use crate::core::decode::Instr;

/// Cycles from `start` to `valid` for the multiplier.
const MUL_LATENCY: u8 = 4;

/// Cycles from `start` to `valid` for the radix-2 divider.
const DIV_LATENCY: u8 = 33;

/// One in-flight multi-cycle operation.
#[derive(Clone, Copy, Debug)]
struct Pending {
    op: Instr,
    a: u64,
    b: u64,
    countdown: u8,
}

/// The multiplier unit.
#[derive(Default)]
pub struct Mul {
    busy: Option<Pending>,
}

impl Mul {
    /// Latches a multiply operation; `op` must be one of the MUL family.
    pub fn start(&mut self, op: Instr, a: u64, b: u64) {
        self.busy = Some(Pending {
            op,
            a,
            b,
            countdown: MUL_LATENCY,
        });
    }

    /// Advances one cycle; returns the product on the `valid` cycle.
    pub fn step(&mut self) -> Option<u64> {
        let p = self.busy.as_mut()?;
        p.countdown -= 1;
        if p.countdown > 0 {
            return None;
        }
        let p = self.busy.take()?;
        let res = match p.op {
            Instr::Mul => p.a.wrapping_mul(p.b),
            Instr::Mulw => sext32(p.a.wrapping_mul(p.b)),
            Instr::Mulh => (((p.a as i64 as i128) * (p.b as i64 as i128)) >> 64) as u64,
            Instr::Mulhsu => (((p.a as i64 as i128) * (p.b as u128 as i128)) >> 64) as u64,
            Instr::Mulhu => ((u128::from(p.a) * u128::from(p.b)) >> 64) as u64,
            _ => 0,
        };
        Some(res)
    }

    /// True while an operation is in flight.
    pub fn busy(&self) -> bool {
        self.busy.is_some()
    }

    /// Pipeline flush: abandon the in-flight operation.
    pub fn flush(&mut self) {
        self.busy = None;
    }
}

/// The divider unit.
#[derive(Default)]
pub struct Div {
    busy: Option<Pending>,
}

impl Div {
    /// Latches a divide/remainder operation.
    pub fn start(&mut self, op: Instr, a: u64, b: u64) {
        self.busy = Some(Pending {
            op,
            a,
            b,
            countdown: DIV_LATENCY,
        });
    }

    /// Advances one cycle; returns the quotient/remainder on the `valid`
    /// cycle.
    pub fn step(&mut self) -> Option<u64> {
        let p = self.busy.as_mut()?;
        p.countdown -= 1;
        if p.countdown > 0 {
            return None;
        }
        let p = self.busy.take()?;
        Some(divide(p.op, p.a, p.b))
    }

    /// True while an operation is in flight.
    pub fn busy(&self) -> bool {
        self.busy.is_some()
    }

    /// Pipeline flush: abandon the in-flight operation.
    pub fn flush(&mut self) {
        self.busy = None;
    }
}

fn divide(op: Instr, a: u64, b: u64) -> u64 {
    match op {
        Instr::Div => {
            let (a, b) = (a as i64, b as i64);
            if b == 0 {
                u64::MAX
            } else if a == i64::MIN && b == -1 {
                a as u64
            } else {
                a.wrapping_div(b) as u64
            }
        }
        Instr::Divu => {
            if b == 0 {
                u64::MAX
            } else {
                a / b
            }
        }
        Instr::Divw => {
            let (a, b) = (a as i32, b as i32);
            if b == 0 {
                u64::MAX
            } else if a == i32::MIN && b == -1 {
                a as i64 as u64
            } else {
                a.wrapping_div(b) as i64 as u64
            }
        }
        Instr::Divuw => {
            let (a, b) = (a as u32, b as u32);
            if b == 0 {
                u64::MAX
            } else {
                sext32(u64::from(a / b))
            }
        }
        Instr::Rem => {
            let (a, b) = (a as i64, b as i64);
            if b == 0 {
                a as u64
            } else if a == i64::MIN && b == -1 {
                0
            } else {
                a.wrapping_rem(b) as u64
            }
        }
        Instr::Remu => {
            if b == 0 {
                a
            } else {
                a % b
            }
        }
        Instr::Remw => {
            let (a, b) = (a as i32, b as i32);
            if b == 0 {
                a as i64 as u64
            } else if a == i32::MIN && b == -1 {
                0
            } else {
                a.wrapping_rem(b) as i64 as u64
            }
        }
        Instr::Remuw => {
            let (a, b) = (a as u32, b as u32);
            if b == 0 {
                sext32(u64::from(a))
            } else {
                sext32(u64::from(a % b))
            }
        }
        _ => 0,
    }
}
