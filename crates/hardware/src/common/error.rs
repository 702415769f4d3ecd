//! Exception, interrupt and debug failure definitions.
//!
//! This module defines every way the modelled hart can fail:
//! 1. **Exceptions:** the synchronous RISC-V taxonomy, including the two
//!    non-standard stack-limit codes.
//! 2. **Interrupts:** the asynchronous causes arbitrated by Execute.
//! 3. **Debug:** halt causes and program-buffer error codes reported on
//!    the debug response channel.
//! 4. **Host errors:** loader and configuration failures (`SimError`).

use std::fmt;

use thiserror::Error;

/// Synchronous exception codes.
///
/// The discriminants are the architectural cause codes written to
/// `mcause`/`scause` on trap entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Exception {
    /// Instruction address misaligned.
    InstrMisalign = 0,
    /// Instruction access fault (bus error on fetch).
    InstrFault = 1,
    /// Illegal or unimplemented instruction.
    InstrIllegal = 2,
    /// Breakpoint (`ebreak`).
    Breakpoint = 3,
    /// Load address misaligned.
    LoadMisalign = 4,
    /// Load access fault (bus error on load).
    LoadFault = 5,
    /// Store/AMO address misaligned.
    StoreMisalign = 6,
    /// Store/AMO access fault (bus error on store).
    StoreFault = 7,
    /// Environment call from U-mode; S/H/M calls are this code plus the
    /// current privilege mode.
    CallFromUmode = 8,
    /// Environment call from S-mode.
    CallFromSmode = 9,
    /// Environment call from H-mode.
    CallFromHmode = 10,
    /// Environment call from M-mode.
    CallFromMmode = 11,
    /// Instruction page fault.
    InstrPageFault = 12,
    /// Load page fault.
    LoadPageFault = 13,
    /// Store/AMO page fault.
    StorePageFault = 15,
    /// Non-standard: stack pointer above `mstackund`.
    StackOverflow = 16,
    /// Non-standard: stack pointer below `mstackovr`.
    StackUnderflow = 17,
}

impl Exception {
    /// Architectural cause code.
    pub fn code(self) -> u64 {
        self as u64
    }

    /// Environment-call exception for the given privilege mode.
    pub fn call_from(mode: crate::common::PrivMode) -> Self {
        match mode {
            crate::common::PrivMode::User => Self::CallFromUmode,
            crate::common::PrivMode::Supervisor => Self::CallFromSmode,
            crate::common::PrivMode::Hypervisor => Self::CallFromHmode,
            crate::common::PrivMode::Machine => Self::CallFromMmode,
        }
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InstrMisalign => "InstrMisalign",
            Self::InstrFault => "InstrFault",
            Self::InstrIllegal => "InstrIllegal",
            Self::Breakpoint => "Breakpoint",
            Self::LoadMisalign => "LoadMisalign",
            Self::LoadFault => "LoadFault",
            Self::StoreMisalign => "StoreMisalign",
            Self::StoreFault => "StoreFault",
            Self::CallFromUmode => "CallFromUmode",
            Self::CallFromSmode => "CallFromSmode",
            Self::CallFromHmode => "CallFromHmode",
            Self::CallFromMmode => "CallFromMmode",
            Self::InstrPageFault => "InstrPageFault",
            Self::LoadPageFault => "LoadPageFault",
            Self::StorePageFault => "StorePageFault",
            Self::StackOverflow => "StackOverflow",
            Self::StackUnderflow => "StackUnderflow",
        };
        write!(f, "{name}")
    }
}

impl std::error::Error for Exception {}

/// Reasons the hart enters Debug Mode, reported in `dcsr.cause`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HaltCause {
    /// `ebreak` executed with the matching `dcsr.ebreakm` policy.
    Ebreak = 1,
    /// Hardware trigger (not implemented; reserved encoding).
    Trigger = 2,
    /// External `haltreq` from the debug module.
    Haltreq = 3,
    /// Completion of a single step with `dcsr.step` set.
    Step = 4,
    /// Halt-on-reset request.
    ResetHaltreq = 5,
}

impl HaltCause {
    /// Encoding stored in the `dcsr.cause` field.
    pub fn code(self) -> u64 {
        self as u64
    }
}

/// Error codes reported on the debug response channel for abstract
/// commands and program-buffer execution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ProgbufError {
    /// No error.
    #[default]
    None = 0,
    /// An abstract command is already in progress.
    Busy = 1,
    /// The request type is not supported.
    NotSupported = 2,
    /// An exception occurred while executing the program buffer.
    Exception = 3,
    /// The command cannot run in the current halted/running state.
    HaltResume = 4,
    /// A bus error occurred.
    Bus = 5,
    /// Any other reason.
    Other = 7,
}

/// Host-level failures: everything that is not architectural behaviour.
#[derive(Debug, Error)]
pub enum SimError {
    /// The image file could not be read.
    #[error("failed to read image: {0}")]
    Io(#[from] std::io::Error),
    /// The ELF container was malformed.
    #[error("failed to parse ELF: {0}")]
    Elf(#[from] object::Error),
    /// A loadable segment fell outside the backing memory.
    #[error("segment at {addr:#x}+{len:#x} outside memory")]
    SegmentOutOfRange {
        /// Segment physical address.
        addr: u64,
        /// Segment length in bytes.
        len: u64,
    },
    /// The configuration document was invalid.
    #[error("bad configuration: {0}")]
    Config(#[from] serde_json::Error),
}
