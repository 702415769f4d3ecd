//! Common types shared by the core and the cache subsystem.
//!
//! This module defines the vocabulary both sides of the hart speak:
//! 1. **Privilege modes** and the interrupt line numbering.
//! 2. **Memory operation descriptors** (type bits, sizes) carried from
//!    Execute through MemAccess and the MMU into the D-cache.
//! 3. **Bus encodings** for the cacheline-wide external interface and the
//!    snoop channel.
//! 4. **Debug port** request types and CSR command bits.

/// Exception, interrupt, halt-cause and host error definitions.
pub mod error;
/// Cacheline-wide data values and byte-strobe helpers.
pub mod line;

/// Number of architectural bits (RV64).
pub const RISCV_ARCH: u32 = 64;

/// Integer register count; the FP file occupies the next 32 indexes of
/// the unified 6-bit register namespace.
pub const INTREGS_TOTAL: usize = 32;

/// Offset of the FP registers inside the unified register namespace.
pub const FPUREGS_OFFSET: usize = INTREGS_TOTAL;

/// Total registers in the unified namespace (integer + FP).
pub const REGS_TOTAL: usize = 64;

/// Return-address register (`ra`).
pub const REG_RA: usize = 1;

/// Stack-pointer register (`sp`).
pub const REG_SP: usize = 2;

/// Privilege mode encoding used by `mstatus.xPP` and the CSR machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum PrivMode {
    /// User mode (0).
    User = 0,
    /// Supervisor mode (1).
    Supervisor = 1,
    /// Hypervisor mode (2); unused but representable.
    Hypervisor = 2,
    /// Machine mode (3); the reset mode.
    #[default]
    Machine = 3,
}

impl PrivMode {
    /// Decodes a 2-bit privilege field.
    pub fn from_bits(bits: u64) -> Self {
        match bits & 0x3 {
            0 => Self::User,
            1 => Self::Supervisor,
            2 => Self::Hypervisor,
            _ => Self::Machine,
        }
    }

    /// Returns the 2-bit encoding.
    pub fn to_bits(self) -> u64 {
        self as u64
    }
}

/// Memory operation type bits carried with every data-path request.
///
/// The type is a small bit-set rather than an enum because the D-cache
/// strips the `STORE` bit once a read-modify-write has absorbed the
/// store, while keeping the atomic qualifiers intact.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemopType(pub u8);

impl MemopType {
    /// Store operation (otherwise a load).
    pub const STORE: u8 = 1 << 0;
    /// AMO read-modify-write operation.
    pub const LOCKED: u8 = 1 << 1;
    /// Load-reserved: acquire a reservation on the target line.
    pub const RESERVE: u8 = 1 << 2;
    /// Store-conditional: commit only while the reservation holds.
    pub const RELEASE: u8 = 1 << 3;

    /// A plain load.
    pub const LOAD_OP: Self = Self(0);
    /// A plain store.
    pub const STORE_OP: Self = Self(Self::STORE);

    /// True for stores (including SC and the AMO write phase).
    pub fn is_store(self) -> bool {
        self.0 & Self::STORE != 0
    }

    /// True for AMO read-modify-write accesses.
    pub fn is_locked(self) -> bool {
        self.0 & Self::LOCKED != 0
    }

    /// True for LR accesses.
    pub fn is_reserve(self) -> bool {
        self.0 & Self::RESERVE != 0
    }

    /// True for SC accesses.
    pub fn is_release(self) -> bool {
        self.0 & Self::RELEASE != 0
    }

    /// Returns the type with the store bit cleared (the cache uses this
    /// after folding the store data into a fetched line).
    pub fn without_store(self) -> Self {
        Self(self.0 & !Self::STORE)
    }
}

/// log2-encoded memory operation sizes.
pub mod memop_size {
    /// 1-byte access.
    pub const BYTE: u8 = 0;
    /// 2-byte access.
    pub const HALF: u8 = 1;
    /// 4-byte access.
    pub const WORD: u8 = 2;
    /// 8-byte access.
    pub const DOUBLE: u8 = 3;
}

/// Request type on the cacheline-wide external bus.
///
/// The wire encoding is three bits: write, cached, unique.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BusReqType {
    /// Uncached narrow read; not observed by other caches.
    ReadNoSnoop,
    /// Cached line read; other caches may keep shared copies.
    ReadShared,
    /// Cached line read that invalidates other copies before a store.
    ReadMakeUnique,
    /// Uncached narrow write.
    WriteNoSnoop,
    /// Broadcast line write upgrading a shared line to unique.
    WriteLineUnique,
    /// Eviction write of a dirty line.
    WriteBack,
}

impl BusReqType {
    /// Write transaction (data flows toward memory).
    pub fn is_write(self) -> bool {
        matches!(
            self,
            Self::WriteNoSnoop | Self::WriteLineUnique | Self::WriteBack
        )
    }

    /// Transaction participates in the coherence protocol.
    pub fn is_cached(self) -> bool {
        matches!(
            self,
            Self::ReadShared | Self::ReadMakeUnique | Self::WriteLineUnique | Self::WriteBack
        )
    }

    /// Transaction requests exclusive ownership.
    pub fn is_unique(self) -> bool {
        matches!(self, Self::ReadMakeUnique | Self::WriteLineUnique)
    }
}

/// Snoop request type bits (the 2-bit snoop channel encoding).
pub mod snoop_type {
    /// Transfer the line data to the requester.
    pub const READ_DATA: u8 = 1 << 0;
    /// Transfer the line data and invalidate the local copy.
    pub const READ_CLEAN: u8 = 1 << 1;
}

/// Which L1 cache an external bus transaction belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BusPath {
    /// Data-cache transaction.
    Data,
    /// Instruction-cache transaction.
    Ctrl,
}

/// Per-hart interrupt line numbering (bit positions in the pending mask).
pub mod irq {
    /// Supervisor software interrupt.
    pub const SSIP: usize = 1;
    /// Machine software interrupt.
    pub const MSIP: usize = 3;
    /// Supervisor timer interrupt.
    pub const STIP: usize = 5;
    /// Machine timer interrupt.
    pub const MTIP: usize = 7;
    /// Supervisor external interrupt.
    pub const SEIP: usize = 9;
    /// Machine external interrupt.
    pub const MEIP: usize = 11;
    /// Width of the pending mask.
    pub const TOTAL: usize = 16;
}

/// Debug port request type bits.
pub mod dport_req {
    /// Write (otherwise read).
    pub const WRITE: u8 = 1 << 0;
    /// CSR / register-bank access.
    pub const REG_ACCESS: u8 = 1 << 1;
    /// Physical memory access.
    pub const MEM_ACCESS: u8 = 1 << 2;
    /// Virtual memory access (translated by the data MMU).
    pub const MEM_VIRTUAL: u8 = 1 << 3;
    /// Execute the program buffer.
    pub const PROGEXEC: u8 = 1 << 4;
}

/// CSR command type bits issued by Execute and the debug port.
pub mod csr_req {
    /// Read a CSR.
    pub const READ: u16 = 1 << 0;
    /// Write a CSR.
    pub const WRITE: u16 = 1 << 1;
    /// Trap return (`xRET`); response carries the return PC.
    pub const TRAP_RETURN: u16 = 1 << 2;
    /// Exception entry; response carries the trap vector.
    pub const EXCEPTION: u16 = 1 << 3;
    /// Interrupt entry; response carries the trap vector.
    pub const INTERRUPT: u16 = 1 << 4;
    /// Breakpoint entry (`ebreak`).
    pub const BREAKPOINT: u16 = 1 << 5;
    /// Enter the halted (debug) state.
    pub const HALT: u16 = 1 << 6;
    /// Resume from the halted state.
    pub const RESUME: u16 = 1 << 7;
    /// Wait for interrupt.
    pub const WFI: u16 = 1 << 8;
    /// One of the fence instructions; the address selects the flavour.
    pub const FENCE: u16 = 1 << 9;
}

/// ISA instruction formats selecting the immediate decode and operand mux.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum IsaFormat {
    /// Register-register.
    #[default]
    R,
    /// Register-immediate (also loads, JALR, system).
    I,
    /// Store.
    S,
    /// Conditional branch.
    Sb,
    /// Upper immediate.
    U,
    /// Jump-and-link.
    Uj,
}
