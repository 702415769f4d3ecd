//! Instruction decode stage.
//!
//! Two 16-bit slices cover each fetched word: the compressed recoder
//! ([`rvc`]) expands a 16-bit opcode into its 32-bit equivalent and the
//! full decoder ([`rv`]) classifies the 32-bit encoding into a uniform
//! record. A short shift-register history of decoded PCs is kept so the
//! branch predictor can cross-check addresses already in the pipeline.

/// Full 32-bit RV64 decoder.
pub mod rv;
/// Compressed (RVC) instruction recoder.
pub mod rvc;

use crate::common::IsaFormat;
use crate::config::defaults::DEC_DEPTH;

/// Decoded operation identifiers.
///
/// One variant per implemented instruction; the decoder's one-hot select
/// collapses to this enum.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[allow(missing_docs)]
pub enum Instr {
    Add, Addi, Addiw, Addw, And, Andi, Auipc,
    Beq, Bge, Bgeu, Blt, Bltu, Bne,
    Jal, Jalr,
    Lb, Lh, Lw, Ld, Lbu, Lhu, Lwu, Lui,
    Or, Ori,
    Slli, Slt, Slti, Sltu, Sltiu, Sll, Sllw, Slliw,
    Sra, Sraw, Srai, Sraiw, Srl, Srli, Srliw, Srlw,
    Sb, Sh, Sw, Sd, Sub, Subw, Xor, Xori,
    Csrrw, Csrrs, Csrrc, Csrrwi, Csrrci, Csrrsi,
    Uret, Sret, Hret, Mret,
    Fence, FenceI, Wfi, SfenceVma,
    Div, Divu, Divw, Divuw,
    Mul, Mulw, Mulh, Mulhsu, Mulhu,
    Rem, Remu, Remw, Remuw,
    AmoaddW, AmoxorW, AmoorW, AmoandW, AmominW, AmomaxW, AmominuW, AmomaxuW, AmoswapW,
    LrW, ScW,
    AmoaddD, AmoxorD, AmoorD, AmoandD, AmominD, AmomaxD, AmominuD, AmomaxuD, AmoswapD,
    LrD, ScD,
    Ecall, Ebreak,
    Fld, Fsd,
    FaddD, FsubD, FmulD, FdivD, FminD, FmaxD,
    FeqD, FltD, FleD,
    FcvtDW, FcvtDWu, FcvtDL, FcvtDLu, FcvtWD, FcvtWuD, FcvtLD, FcvtLuD,
    FmovDX, FmovXD,
    /// Unrecognised encoding; raises illegal-instruction at Execute.
    #[default]
    Unimplemented,
}

impl Instr {
    /// Conditional branch.
    pub fn is_branch(self) -> bool {
        matches!(
            self,
            Self::Beq | Self::Bge | Self::Bgeu | Self::Blt | Self::Bltu | Self::Bne
        )
    }

    /// Memory load (including LR and FLD).
    pub fn is_load(self) -> bool {
        matches!(
            self,
            Self::Lb
                | Self::Lh
                | Self::Lw
                | Self::Ld
                | Self::Lbu
                | Self::Lhu
                | Self::Lwu
                | Self::LrW
                | Self::LrD
                | Self::Fld
        )
    }

    /// Memory store (including SC and FSD).
    pub fn is_store(self) -> bool {
        matches!(
            self,
            Self::Sb | Self::Sh | Self::Sw | Self::Sd | Self::ScW | Self::ScD | Self::Fsd
        )
    }

    /// Atomic read-modify-write (AMOs, excluding LR/SC).
    pub fn is_amo(self) -> bool {
        matches!(
            self,
            Self::AmoaddW
                | Self::AmoxorW
                | Self::AmoorW
                | Self::AmoandW
                | Self::AmominW
                | Self::AmomaxW
                | Self::AmominuW
                | Self::AmomaxuW
                | Self::AmoswapW
                | Self::AmoaddD
                | Self::AmoxorD
                | Self::AmoorD
                | Self::AmoandD
                | Self::AmominD
                | Self::AmomaxD
                | Self::AmominuD
                | Self::AmomaxuD
                | Self::AmoswapD
        )
    }

    /// Multi-cycle multiplier operation.
    pub fn is_mul(self) -> bool {
        matches!(
            self,
            Self::Mul | Self::Mulw | Self::Mulh | Self::Mulhsu | Self::Mulhu
        )
    }

    /// Multi-cycle divider operation.
    pub fn is_div(self) -> bool {
        matches!(
            self,
            Self::Div
                | Self::Divu
                | Self::Divw
                | Self::Divuw
                | Self::Rem
                | Self::Remu
                | Self::Remw
                | Self::Remuw
        )
    }

    /// CSR read-modify instruction.
    pub fn is_csr(self) -> bool {
        matches!(
            self,
            Self::Csrrw | Self::Csrrs | Self::Csrrc | Self::Csrrwi | Self::Csrrci | Self::Csrrsi
        )
    }

    /// Trap-return instruction.
    pub fn is_xret(self) -> bool {
        matches!(self, Self::Uret | Self::Sret | Self::Hret | Self::Mret)
    }

    /// Double-precision FPU operation (loads/stores excluded).
    pub fn is_fpu(self) -> bool {
        matches!(
            self,
            Self::FaddD
                | Self::FsubD
                | Self::FmulD
                | Self::FdivD
                | Self::FminD
                | Self::FmaxD
                | Self::FeqD
                | Self::FltD
                | Self::FleD
                | Self::FcvtDW
                | Self::FcvtDWu
                | Self::FcvtDL
                | Self::FcvtDLu
                | Self::FcvtWD
                | Self::FcvtWuD
                | Self::FcvtLD
                | Self::FcvtLuD
                | Self::FmovDX
                | Self::FmovXD
        )
    }
}

/// Uniform decoded-instruction record handed to Execute.
#[derive(Clone, Copy, Debug, Default)]
pub struct DecodedInstr {
    /// Program counter of the instruction.
    pub pc: u64,
    /// Expanded 32-bit encoding.
    pub instr: u32,
    /// Decoded operation.
    pub op: Instr,
    /// ISA format, selecting the operand/immediate mux.
    pub format: IsaFormat,
    /// First source register (unified namespace).
    pub rs1: usize,
    /// Second source register (unified namespace).
    pub rs2: usize,
    /// Destination register (unified namespace).
    pub rd: usize,
    /// Sign-extended immediate.
    pub imm: i64,
    /// CSR address for system instructions.
    pub csr_addr: u16,
    /// log2 of the memory access width for loads/stores/AMOs.
    pub memop_size: u8,
    /// Loads sign-extend the result.
    pub memop_sign_ext: bool,
    /// Instruction operates on 32-bit values (W-variant).
    pub rv32: bool,
    /// Expanded from a 16-bit encoding.
    pub compressed: bool,
    /// Operates on the FP register file.
    pub f64: bool,
    /// The fetch of this instruction reported a bus fault.
    pub load_fault: bool,
    /// The fetch of this instruction reported a page fault.
    pub page_fault_x: bool,
    /// Sourced from the debug program buffer.
    pub progbuf_ena: bool,
    /// No decode slice recognised the encoding.
    pub unimplemented: bool,
}

impl DecodedInstr {
    /// Size of the original encoding in bytes.
    pub fn len(&self) -> u64 {
        if self.compressed { 2 } else { 4 }
    }

    /// Sequential successor PC.
    pub fn npc(&self) -> u64 {
        self.pc.wrapping_add(self.len())
    }
}

/// The decode stage: recodes fetched words and remembers what it decoded.
pub struct Decoder {
    history: [u64; DEC_DEPTH],
    latched: Option<DecodedInstr>,
}

impl Decoder {
    /// Creates an empty decoder.
    pub fn new() -> Self {
        Self {
            history: [u64::MAX; DEC_DEPTH],
            latched: None,
        }
    }

    /// Decodes one fetched word.
    ///
    /// The lower half-word selects the slice: a compressed encoding is
    /// expanded by the RVC recoder, otherwise the full 32 bits go through
    /// the RV decoder. Fetch-side faults propagate on the record.
    pub fn step(&mut self, fetched: Option<&crate::core::fetch::FetchedInstr>) {
        let Some(f) = fetched else {
            self.latched = None;
            return;
        };

        let lo = (f.data & 0xFFFF) as u16;
        let mut d = if lo & 0x3 != 0x3 {
            let expanded = rvc::expand(lo);
            let mut d = if expanded == 0 {
                DecodedInstr {
                    instr: u32::from(lo),
                    unimplemented: true,
                    ..DecodedInstr::default()
                }
            } else {
                rv::decode(expanded)
            };
            d.compressed = true;
            d
        } else {
            rv::decode(f.data)
        };

        d.pc = f.pc;
        d.load_fault = f.load_fault;
        d.page_fault_x = f.page_fault_x;
        d.progbuf_ena = f.progbuf_ena;

        self.history.rotate_right(1);
        self.history[0] = f.pc;
        self.latched = Some(d);
    }

    /// The instruction decoded this cycle, if any.
    pub fn decoded(&self) -> Option<&DecodedInstr> {
        self.latched.as_ref()
    }

    /// Recently decoded PCs, newest first, for the predictor cross-check.
    pub fn decoded_pcs(&self) -> &[u64] {
        &self.history
    }

    /// Pipeline flush: drop the latched instruction and the history.
    pub fn flush(&mut self) {
        self.latched = None;
        self.history = [u64::MAX; DEC_DEPTH];
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}
