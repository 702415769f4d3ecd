//! Execute-stage functional units.
//!
//! Single-cycle combinational helpers (logic ALU, adder/subtractor,
//! shifter) and the multi-cycle multiplier and divider state machines
//! that suspend the Execute stage until their `valid` pulse.

/// Logic operations, addition/subtraction and branch condition flags.
pub mod alu;
/// Multi-cycle multiplier and divider.
pub mod muldiv;
/// Barrel shifter (64- and 32-bit operand widths).
pub mod shifter;
