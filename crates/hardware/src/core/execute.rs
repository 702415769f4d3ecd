//! Execute stage: the central pipeline controller.
//!
//! Per issued instruction the stage performs the hazard check against the
//! register-file tags, muxes operands by ISA format, selects a functional
//! unit, resolves branches with the shared subtractor flags, and issues
//! memory operations and CSR commands. Multi-cycle work (multiplier,
//! divider, AMO sub-machine, CSR round-trips, WFI) suspends the stage in
//! a dedicated state. The stage also owns the interrupt/exception
//! classifier, the debug step/halt engine and the retirement stream.

use tracing::trace;

use crate::common::error::{Exception, HaltCause};
use crate::common::{IsaFormat, MemopType, PrivMode, REG_RA, REGS_TOTAL, csr_req, irq};
use crate::config::Config;
use crate::core::csr::{CsrCommand, CsrResponse, fence_sel};
use crate::core::decode::{DecodedInstr, Instr};
use crate::core::memaccess::{MemComplete, MemFault, Memop};
use crate::core::regfile::{RegFile, RegWrite, TAG_MASK};
use crate::core::units::{alu, muldiv, shifter};

/// What the stage is waiting for after issuing a CSR command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CsrWait {
    /// Read phase of a `csrr*` read-modify-write.
    ReadPhase,
    /// Write phase of a `csrr*` read-modify-write.
    WritePhase,
    /// Trap vector for an exception or interrupt entry.
    Trap,
    /// Breakpoint entry (may signal a debug halt instead).
    Breakpoint,
    /// Return PC for an `xRET`.
    TrapReturn,
    /// WFI acknowledgement.
    Wfi,
    /// Fence completion.
    Fence,
    /// Halt acknowledgement.
    Halt,
    /// Resume acknowledgement (carries the restart PC).
    Resume,
}

/// AMO sub-machine phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AmoPhase {
    /// Locked read issued, waiting for the old value.
    Read,
    /// Old value latched; modify and issue the write.
    Modify,
    /// Write issued, waiting for its completion.
    Write,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
enum ExecState {
    #[default]
    Idle,
    WaitMulti,
    Amo(AmoPhase),
    Csr(CsrWait),
    Wfi,
    Halted,
    DebugMemRequest,
    DebugMemError,
}

/// Debug-port abstract memory access routed through the stage.
#[derive(Clone, Copy, Debug, Default)]
pub struct DbgMemRequest {
    /// Write access.
    pub write: bool,
    /// Target address.
    pub addr: u64,
    /// Write data.
    pub wdata: u64,
    /// log2 of the access width.
    pub size: u8,
}

/// Response for a debug memory access.
#[derive(Clone, Copy, Debug, Default)]
pub struct DbgMemResponse {
    /// Read data.
    pub rdata: u64,
    /// Misalignment or bus error.
    pub error: bool,
}

/// One retired instruction, with enough fidelity to rebuild a trace log.
#[derive(Clone, Copy, Debug, Default)]
pub struct RetireEvent {
    /// Instruction address.
    pub pc: u64,
    /// Expanded 32-bit encoding.
    pub instr: u32,
    /// Register written (0 = none).
    pub wb_addr: usize,
    /// Value written.
    pub wb_data: u64,
    /// Memory operation address, when any.
    pub memop_addr: u64,
    /// log2 of the memop width.
    pub memop_size: u8,
    /// Memop store data.
    pub memop_data: u64,
    /// The memop was a store.
    pub memop_store: bool,
    /// The instruction performed a memop.
    pub memop: bool,
    /// Retired inside the debug program buffer (ignored by `minstret`).
    pub ignored: bool,
}

/// Inputs sampled by the stage each cycle.
#[derive(Clone, Copy, Debug, Default)]
pub struct ExecuteInputs {
    /// Instruction offered by Decode.
    pub decoded: Option<DecodedInstr>,
    /// MemAccess can accept a memop.
    pub memop_ready: bool,
    /// Memop completion event.
    pub mem_complete: Option<MemComplete>,
    /// Memop fault event.
    pub mem_fault: Option<MemFault>,
    /// Our CSR command was granted this cycle.
    pub csr_req_accepted: bool,
    /// CSR response routed to this master.
    pub csr_resp: Option<CsrResponse>,
    /// Masked pending interrupt lines (from the CSR block).
    pub irq_pending: u16,
    /// CSR wake-up signal (any raw pending line).
    pub wakeup: bool,
    /// Stack-limit overflow pulse.
    pub stack_overflow: bool,
    /// Stack-limit underflow pulse.
    pub stack_underflow: bool,
    /// External halt request.
    pub haltreq: bool,
    /// External resume request.
    pub resumereq: bool,
    /// `dcsr.step` is set.
    pub step: bool,
    /// Debug port wants the program buffer executed.
    pub progbuf_exec: bool,
    /// CSR reports progbuf completion.
    pub progbuf_end: bool,
    /// CSR reports progbuf failure.
    pub progbuf_error: bool,
    /// Debug abstract memory request (only while halted).
    pub dbg_mem: Option<DbgMemRequest>,
    /// The write-back arbiter can take an Execute-side result.
    pub wb_ready: bool,
}

/// The Execute stage.
pub struct Execute {
    fpu_ena: bool,
    state: ExecState,
    /// Issue-side copy of the register tags.
    tagcnt: [u8; REGS_TOTAL],
    /// Committed next PC: the instruction expected from Decode.
    npc: u64,
    /// Instruction being executed in a multi-cycle state.
    d: DecodedInstr,
    rv1: u64,
    rv2: u64,
    mul: muldiv::Mul,
    div: muldiv::Div,
    /// AMO old value latched in the Read phase.
    amo_old: u64,
    /// CSR command presented until granted.
    csr_req: Option<CsrCommand>,
    /// Old CSR value latched between the read and write phases.
    csr_old: u64,
    /// PC reported to the CSR block while a trap command is in flight.
    trap_pc: Option<u64>,
    /// Memop fault waiting for the stage to reach its issue point.
    pending_fault: Option<MemFault>,

    halted: bool,
    progbuf_ena: bool,
    progbuf_pc: u64,
    /// Pending single-step halt after the next retirement.
    step_armed: bool,

    // Per-cycle outputs.
    wb: Option<RegWrite>,
    memop: Option<Memop>,
    valid: bool,
    jmp: bool,
    jmp_pc: u64,
    jmp_npc: u64,
    call: bool,
    ret: bool,
    flush_pipeline: bool,
    retire: Option<RetireEvent>,
    dbg_mem_resp: Option<DbgMemResponse>,
}

impl Execute {
    /// Creates the stage with the PC at the reset vector.
    pub fn new(config: &Config) -> Self {
        Self {
            fpu_ena: config.fpu_ena,
            state: ExecState::Idle,
            tagcnt: [0; REGS_TOTAL],
            npc: config.reset_vector,
            d: DecodedInstr::default(),
            rv1: 0,
            rv2: 0,
            mul: muldiv::Mul::default(),
            div: muldiv::Div::default(),
            amo_old: 0,
            csr_req: None,
            csr_old: 0,
            trap_pc: None,
            pending_fault: None,
            halted: false,
            progbuf_ena: false,
            progbuf_pc: 0,
            step_armed: false,
            wb: None,
            memop: None,
            valid: false,
            jmp: false,
            jmp_pc: 0,
            jmp_npc: 0,
            call: false,
            ret: false,
            flush_pipeline: false,
            retire: None,
            dbg_mem_resp: None,
        }
    }

    /// PC of the instruction the stage expects next.
    pub fn npc(&self) -> u64 {
        self.npc
    }

    /// PC the CSR block records on trap entry: the offending memop's PC
    /// while a fault trap is in flight, the next unexecuted instruction
    /// otherwise.
    pub fn e_pc(&self) -> u64 {
        self.trap_pc.unwrap_or(self.npc)
    }

    /// The hart is halted in Debug Mode.
    pub fn halted(&self) -> bool {
        self.halted
    }

    /// Program buffer execution is active.
    pub fn progbuf_ena(&self) -> bool {
        self.progbuf_ena
    }

    /// PC inside the program buffer window.
    pub fn progbuf_pc(&self) -> u64 {
        self.progbuf_pc
    }

    /// An instruction retired this cycle.
    pub fn valid(&self) -> bool {
        self.valid
    }

    /// Execute-side write toward the arbiter.
    pub fn wb(&self) -> Option<RegWrite> {
        self.wb
    }

    /// Memop issued this cycle.
    pub fn memop(&self) -> Option<Memop> {
        self.memop
    }

    /// CSR command presented to the interconnect.
    pub fn csr_req(&self) -> Option<CsrCommand> {
        self.csr_req
    }

    /// Committed jump this cycle (BTB write port).
    pub fn jmp(&self) -> Option<(u64, u64)> {
        if self.jmp {
            Some((self.jmp_pc, self.jmp_npc))
        } else {
            None
        }
    }

    /// The retired jump was a call (stack-trace push).
    pub fn call(&self) -> bool {
        self.call
    }

    /// The retired jump was a return (stack-trace pop).
    pub fn ret(&self) -> bool {
        self.ret
    }

    /// Pipeline flush requested by a trap, return or redirection.
    pub fn flush_pipeline(&self) -> bool {
        self.flush_pipeline
    }

    /// Retirement event for the trace sink.
    pub fn retire(&self) -> Option<&RetireEvent> {
        self.retire.as_ref()
    }

    /// Response to a debug memory access.
    pub fn dbg_mem_resp(&self) -> Option<DbgMemResponse> {
        self.dbg_mem_resp
    }

    /// Resynchronises the issue tags after a pipeline flush.
    fn resync_tags(&mut self, regs: &RegFile) {
        self.tagcnt = regs.tags();
    }

    /// Advances one cycle.
    pub fn step(&mut self, regs: &RegFile, i: &ExecuteInputs) {
        self.wb = None;
        self.memop = None;
        self.valid = false;
        self.jmp = false;
        self.call = false;
        self.ret = false;
        self.flush_pipeline = false;
        self.retire = None;
        self.dbg_mem_resp = None;
        if i.csr_req_accepted {
            self.csr_req = None;
        }

        // Memop faults become traps at the next issue point; the queue
        // drains in order, so the fault's PC is the oldest memop.
        if let Some(f) = i.mem_fault {
            if f.debug {
                self.dbg_mem_resp = Some(DbgMemResponse {
                    rdata: 0,
                    error: true,
                });
                self.state = ExecState::Halted;
            } else {
                self.pending_fault = Some(f);
            }
        }

        // An aborted AMO read/write surfaces its fault immediately.
        if self.pending_fault.is_some() && matches!(self.state, ExecState::Amo(_)) {
            self.state = ExecState::Idle;
        }

        match self.state {
            ExecState::Idle => self.issue(regs, i),
            ExecState::WaitMulti => {
                let res = if self.d.op.is_mul() {
                    self.mul.step()
                } else {
                    self.div.step()
                };
                if let Some(v) = res {
                    self.write_rd(self.d.rd, v);
                    self.retire_instr(self.d.npc(), i);
                }
            }
            ExecState::Amo(phase) => self.amo_step(phase, i),
            ExecState::Csr(wait) => self.csr_step(wait, i),
            ExecState::Wfi => {
                if i.haltreq {
                    self.issue_csr(
                        CsrCommand {
                            ctype: csr_req::HALT,
                            addr: HaltCause::Haltreq.code() as u16,
                            data: 0,
                        },
                        CsrWait::Halt,
                    );
                } else if i.wakeup {
                    self.state = ExecState::Idle;
                }
            }
            ExecState::Halted => {
                if let Some(req) = i.dbg_mem {
                    let align = (1u64 << req.size) - 1;
                    if req.addr & align != 0 {
                        self.state = ExecState::DebugMemError;
                    } else if i.memop_ready {
                        self.memop = Some(Memop {
                            mtype: if req.write {
                                MemopType::STORE_OP
                            } else {
                                MemopType::LOAD_OP
                            },
                            size: req.size,
                            sign_ext: false,
                            addr: req.addr,
                            wdata: req.wdata,
                            waddr: 0,
                            wtag: 0,
                            pc: self.npc,
                            instr: 0,
                            debug: true,
                        });
                        self.state = ExecState::DebugMemRequest;
                    }
                } else if i.progbuf_exec {
                    self.progbuf_ena = true;
                    self.progbuf_pc = 0;
                    self.halted = false;
                    self.flush_pipeline = true;
                    self.state = ExecState::Idle;
                } else if i.resumereq {
                    self.issue_csr(
                        CsrCommand {
                            ctype: csr_req::RESUME,
                            addr: 0,
                            data: 0,
                        },
                        CsrWait::Resume,
                    );
                }
            }
            ExecState::DebugMemRequest => {
                if let Some(c) = i.mem_complete {
                    self.dbg_mem_resp = Some(DbgMemResponse {
                        rdata: c.data,
                        error: false,
                    });
                    self.state = ExecState::Halted;
                }
            }
            ExecState::DebugMemError => {
                // Misaligned debug access: error response, no bus traffic.
                self.dbg_mem_resp = Some(DbgMemResponse {
                    rdata: 0,
                    error: true,
                });
                self.state = ExecState::Halted;
            }
        }
    }

    /// Issue path: classify, check hazards and dispatch one instruction.
    fn issue(&mut self, regs: &RegFile, i: &ExecuteInputs) {
        if let Some(f) = self.pending_fault.take() {
            self.issue_exception(f.ex, f.addr, f.pc);
            return;
        }

        if self.halted {
            self.state = ExecState::Halted;
            return;
        }

        // External halt beats instruction issue.
        if i.haltreq && !self.progbuf_ena {
            self.issue_csr(
                CsrCommand {
                    ctype: csr_req::HALT,
                    addr: HaltCause::Haltreq.code() as u16,
                    data: 0,
                },
                CsrWait::Halt,
            );
            return;
        }

        // Interrupts are taken between instructions.
        if !self.progbuf_ena {
            if let Some(code) = highest_irq(i.irq_pending) {
                self.issue_csr(
                    CsrCommand {
                        ctype: csr_req::INTERRUPT,
                        addr: code as u16,
                        data: 0,
                    },
                    CsrWait::Trap,
                );
                return;
            }
        }

        // Non-standard stack limit exceptions.
        if i.stack_overflow {
            self.issue_exception(Exception::StackOverflow, regs.read(2), self.npc);
            return;
        }
        if i.stack_underflow {
            self.issue_exception(Exception::StackUnderflow, regs.read(2), self.npc);
            return;
        }

        let Some(d) = i.decoded else {
            return;
        };
        // Wrong-path fetches are ignored; the predictor re-converges on
        // the committed next PC. Progbuf instructions track the window
        // PC instead.
        let expected = if self.progbuf_ena {
            self.progbuf_pc
        } else {
            self.npc
        };
        if d.pc != expected {
            return;
        }

        // Hazard check: an in-flight producer stalls the consumer.
        for rs in [d.rs1, d.rs2] {
            if rs != 0 && self.tagcnt[rs] != regs.tag(rs) {
                return;
            }
        }
        if !i.wb_ready {
            return;
        }

        self.d = d;
        let rv1 = regs.read(d.rs1);
        let rv2 = regs.read(d.rs2);
        self.rv1 = rv1;
        self.rv2 = rv2;

        trace!(pc = format_args!("{:#x}", d.pc), op = ?d.op, "issue");

        // Exception priority chain.
        if d.pc & 1 != 0 {
            self.issue_exception(Exception::InstrMisalign, d.pc, d.pc);
            return;
        }
        if d.load_fault {
            self.issue_exception(Exception::InstrFault, d.pc, d.pc);
            return;
        }
        if d.unimplemented || (d.op.is_fpu() && !self.fpu_ena) {
            self.issue_exception(Exception::InstrIllegal, u64::from(d.instr), d.pc);
            return;
        }
        if d.op == Instr::Ebreak {
            self.issue_csr(
                CsrCommand {
                    ctype: csr_req::BREAKPOINT,
                    addr: Exception::Breakpoint.code() as u16,
                    data: d.pc,
                },
                CsrWait::Breakpoint,
            );
            return;
        }
        if d.page_fault_x {
            self.issue_exception(Exception::InstrPageFault, d.pc, d.pc);
            return;
        }

        // Memory operand address and its alignment classification.
        let memaddr = match d.format {
            IsaFormat::S => rv1.wrapping_add(d.imm as u64),
            _ if d.op.is_amo() || matches!(d.op, Instr::LrW | Instr::LrD | Instr::ScW | Instr::ScD) => {
                rv1
            }
            _ => rv1.wrapping_add(d.imm as u64),
        };
        if d.op.is_load() || d.op.is_store() || d.op.is_amo() {
            let align = (1u64 << d.memop_size) - 1;
            if memaddr & align != 0 {
                let ex = if d.op.is_store() || d.op.is_amo() {
                    Exception::StoreMisalign
                } else {
                    Exception::LoadMisalign
                };
                self.issue_exception(ex, memaddr, d.pc);
                return;
            }
        }

        if d.op == Instr::Ecall {
            // The CSR block offsets the call code by the current mode.
            self.issue_exception(Exception::CallFromUmode, d.pc, d.pc);
            return;
        }

        // Dispatch.
        match d.op {
            Instr::Lui => {
                self.write_rd(d.rd, d.imm as u64);
                self.retire_instr(d.npc(), i);
            }
            Instr::Auipc => {
                self.write_rd(d.rd, d.pc.wrapping_add(d.imm as u64));
                self.retire_instr(d.npc(), i);
            }
            Instr::Jal => {
                let target = d.pc.wrapping_add(d.imm as u64);
                self.write_rd(d.rd, d.npc());
                self.jump_to(target, i);
            }
            Instr::Jalr => {
                let target = rv1.wrapping_add(d.imm as u64) & !1;
                self.write_rd(d.rd, d.npc());
                self.jump_to(target, i);
            }
            op if op.is_branch() => {
                let f = alu::compare(rv1, rv2);
                let taken = match op {
                    Instr::Beq => f.eq,
                    Instr::Bne => f.ne,
                    Instr::Blt => f.lt,
                    Instr::Bge => f.ge,
                    Instr::Bltu => f.ltu,
                    _ => f.geu,
                };
                if taken {
                    self.jump_to(d.pc.wrapping_add(d.imm as u64), i);
                } else {
                    self.retire_instr(d.npc(), i);
                }
            }
            op if op.is_load() && !matches!(op, Instr::LrW | Instr::LrD) => {
                if !i.memop_ready {
                    return;
                }
                self.issue_memop(memaddr, MemopType::LOAD_OP, d.rd, rv2);
                self.retire_instr(d.npc(), i);
            }
            op if op.is_store() && !matches!(op, Instr::ScW | Instr::ScD) => {
                if !i.memop_ready {
                    return;
                }
                self.issue_memop(memaddr, MemopType::STORE_OP, 0, rv2);
                self.retire_instr(d.npc(), i);
            }
            Instr::LrW | Instr::LrD => {
                if !i.memop_ready {
                    return;
                }
                self.issue_memop(memaddr, MemopType(MemopType::RESERVE), d.rd, rv2);
                self.retire_instr(d.npc(), i);
            }
            Instr::ScW | Instr::ScD => {
                if !i.memop_ready {
                    return;
                }
                self.issue_memop(
                    memaddr,
                    MemopType(MemopType::STORE | MemopType::RELEASE),
                    d.rd,
                    rv2,
                );
                self.retire_instr(d.npc(), i);
            }
            op if op.is_amo() => {
                if !i.memop_ready {
                    return;
                }
                self.issue_memop(memaddr, MemopType(MemopType::LOCKED), d.rd, rv2);
                self.state = ExecState::Amo(AmoPhase::Read);
            }
            op if op.is_mul() => {
                self.mul.start(op, rv1, rv2);
                self.state = ExecState::WaitMulti;
            }
            op if op.is_div() => {
                self.div.start(op, rv1, rv2);
                self.state = ExecState::WaitMulti;
            }
            op if op.is_csr() => {
                // Read-modify-write as two command round trips, the way
                // the hardware serialises them on the CSR bus.
                self.issue_csr(
                    CsrCommand {
                        ctype: csr_req::READ,
                        addr: d.csr_addr,
                        data: 0,
                    },
                    CsrWait::ReadPhase,
                );
            }
            op if op.is_xret() => {
                let target = match op {
                    Instr::Mret => PrivMode::Machine,
                    Instr::Sret => PrivMode::Supervisor,
                    Instr::Hret => PrivMode::Hypervisor,
                    _ => PrivMode::User,
                };
                self.issue_csr(
                    CsrCommand {
                        ctype: csr_req::TRAP_RETURN,
                        addr: target.to_bits() as u16,
                        data: 0,
                    },
                    CsrWait::TrapReturn,
                );
            }
            Instr::Fence => {
                self.issue_csr(
                    CsrCommand {
                        ctype: csr_req::FENCE,
                        addr: fence_sel::DATA,
                        data: 0,
                    },
                    CsrWait::Fence,
                );
            }
            Instr::FenceI => {
                // All-ones flush address selects the flush-all walk.
                self.issue_csr(
                    CsrCommand {
                        ctype: csr_req::FENCE,
                        addr: fence_sel::FENCE_I,
                        data: u64::MAX,
                    },
                    CsrWait::Fence,
                );
            }
            Instr::SfenceVma => {
                self.issue_csr(
                    CsrCommand {
                        ctype: csr_req::FENCE,
                        addr: fence_sel::VMA,
                        data: rv1,
                    },
                    CsrWait::Fence,
                );
            }
            Instr::Wfi => {
                self.issue_csr(
                    CsrCommand {
                        ctype: csr_req::WFI,
                        addr: 0,
                        data: 0,
                    },
                    CsrWait::Wfi,
                );
            }
            op => {
                let value = self.alu_result(op, rv1, rv2);
                self.write_rd(d.rd, value);
                self.retire_instr(d.npc(), i);
            }
        }
    }

    /// Single-cycle integer operations.
    fn alu_result(&self, op: Instr, rv1: u64, rv2: u64) -> u64 {
        let d = &self.d;
        let imm = d.imm as u64;
        let b = if d.format == IsaFormat::I { imm } else { rv2 };
        match op {
            Instr::Add | Instr::Addi => alu::add(rv1, b, false),
            Instr::Addw | Instr::Addiw => alu::add(rv1, b, true),
            Instr::Sub => alu::sub(rv1, b, false),
            Instr::Subw => alu::sub(rv1, b, true),
            Instr::And | Instr::Andi => alu::and(rv1, b),
            Instr::Or | Instr::Ori => alu::or(rv1, b),
            Instr::Xor | Instr::Xori => alu::xor(rv1, b),
            Instr::Slt | Instr::Slti => u64::from(alu::compare(rv1, b).lt),
            Instr::Sltu | Instr::Sltiu => u64::from(alu::compare(rv1, b).ltu),
            Instr::Sll | Instr::Slli => shifter::sll(rv1, b),
            Instr::Sllw | Instr::Slliw => shifter::sllw(rv1, b),
            Instr::Srl | Instr::Srli => shifter::srl(rv1, b),
            Instr::Srlw | Instr::Srliw => shifter::srlw(rv1, b),
            Instr::Sra | Instr::Srai => shifter::sra(rv1, b),
            Instr::Sraw | Instr::Sraiw => shifter::sraw(rv1, b),
            _ => 0,
        }
    }

    /// AMO sub-machine: Read -> Modify -> Write.
    fn amo_step(&mut self, phase: AmoPhase, i: &ExecuteInputs) {
        match phase {
            AmoPhase::Read => {
                if let Some(c) = i.mem_complete {
                    self.amo_old = c.data;
                    self.state = ExecState::Amo(AmoPhase::Modify);
                }
            }
            AmoPhase::Modify => {
                if !i.memop_ready {
                    return;
                }
                let modified = amo_combine(self.d.op, self.amo_old, self.rv2);
                let addr = self.rv1;
                self.memop = Some(Memop {
                    mtype: MemopType(MemopType::STORE | MemopType::LOCKED),
                    size: self.d.memop_size,
                    sign_ext: false,
                    addr,
                    wdata: modified,
                    waddr: 0,
                    wtag: 0,
                    pc: self.d.pc,
                    instr: self.d.instr,
                    debug: false,
                });
                self.state = ExecState::Amo(AmoPhase::Write);
            }
            AmoPhase::Write => {
                if i.mem_complete.is_some() {
                    self.retire_instr(self.d.npc(), i);
                }
            }
        }
    }

    /// CSR round-trip completion.
    fn csr_step(&mut self, wait: CsrWait, i: &ExecuteInputs) {
        let Some(resp) = i.csr_resp else {
            return;
        };

        match wait {
            CsrWait::ReadPhase => {
                if resp.exception {
                    self.csr_illegal(i);
                    return;
                }
                self.csr_old = resp.data;
                let d = self.d;
                let mask = if matches!(d.op, Instr::Csrrw | Instr::Csrrs | Instr::Csrrc) {
                    self.rv1
                } else {
                    d.imm as u64
                };
                let wdata = match d.op {
                    Instr::Csrrw | Instr::Csrrwi => mask,
                    Instr::Csrrs | Instr::Csrrsi => self.csr_old | mask,
                    _ => self.csr_old & !mask,
                };
                // Set/clear forms with a zero source never write.
                let write = match d.op {
                    Instr::Csrrw | Instr::Csrrwi => true,
                    Instr::Csrrs | Instr::Csrrc => d.rs1 != 0,
                    _ => mask != 0,
                };
                if write {
                    self.issue_csr(
                        CsrCommand {
                            ctype: csr_req::WRITE,
                            addr: d.csr_addr,
                            data: wdata,
                        },
                        CsrWait::WritePhase,
                    );
                } else {
                    self.write_rd(d.rd, self.csr_old);
                    self.retire_instr(d.npc(), i);
                }
            }
            CsrWait::WritePhase => {
                if resp.exception {
                    self.csr_illegal(i);
                    return;
                }
                self.write_rd(self.d.rd, self.csr_old);
                self.retire_instr(self.d.npc(), i);
            }
            CsrWait::Trap => {
                self.trap_pc = None;
                self.flush_pipeline = true;
                self.npc = resp.data;
                self.valid = false;
                self.state = ExecState::Idle;
                if self.progbuf_ena && (i.progbuf_error || i.progbuf_end) {
                    self.end_progbuf(i.progbuf_error);
                }
            }
            CsrWait::Breakpoint => {
                self.state = ExecState::Idle;
                if resp.data == u64::MAX {
                    // Debug halt instead of an architectural trap.
                    if self.progbuf_ena {
                        self.end_progbuf(false);
                    } else {
                        self.halted = true;
                        self.state = ExecState::Halted;
                        self.flush_pipeline = true;
                    }
                } else {
                    self.flush_pipeline = true;
                    self.npc = resp.data;
                }
            }
            CsrWait::TrapReturn => {
                if resp.exception {
                    self.state = ExecState::Idle;
                    self.issue_exception(
                        Exception::InstrIllegal,
                        u64::from(self.d.instr),
                        self.d.pc,
                    );
                    return;
                }
                self.flush_pipeline = true;
                self.retire_to(resp.data, i);
                self.state = ExecState::Idle;
            }
            CsrWait::Fence => {
                self.flush_pipeline = true;
                self.retire_to(self.d.npc(), i);
                self.state = ExecState::Idle;
            }
            CsrWait::Wfi => {
                self.retire_to(self.d.npc(), i);
                self.state = ExecState::Wfi;
            }
            CsrWait::Halt => {
                self.halted = true;
                self.flush_pipeline = true;
                self.state = ExecState::Halted;
            }
            CsrWait::Resume => {
                if !self.progbuf_ena {
                    self.npc = resp.data;
                }
                self.halted = false;
                self.step_armed = i.step;
                self.flush_pipeline = true;
                self.state = ExecState::Idle;
            }
        }
    }

    /// CSR access fault: illegal instruction outside progbuf, progbuf
    /// error inside it.
    fn csr_illegal(&mut self, i: &ExecuteInputs) {
        self.state = ExecState::Idle;
        if self.progbuf_ena {
            self.retire_instr(self.d.npc(), i);
        } else {
            self.issue_exception(Exception::InstrIllegal, u64::from(self.d.instr), self.d.pc);
        }
    }

    fn end_progbuf(&mut self, _error: bool) {
        self.progbuf_ena = false;
        self.halted = true;
        self.state = ExecState::Halted;
        self.flush_pipeline = true;
    }

    fn issue_csr(&mut self, cmd: CsrCommand, wait: CsrWait) {
        self.csr_req = Some(cmd);
        self.state = ExecState::Csr(wait);
    }

    fn issue_exception(&mut self, ex: Exception, tval: u64, pc: u64) {
        self.trap_pc = Some(pc);
        self.issue_csr(
            CsrCommand {
                ctype: csr_req::EXCEPTION,
                addr: ex.code() as u16,
                data: tval,
            },
            CsrWait::Trap,
        );
    }

    /// Allocates the next write tag for `rd` and emits the result.
    fn write_rd(&mut self, rd: usize, value: u64) {
        if rd == 0 {
            return;
        }
        let tag = (self.tagcnt[rd].wrapping_add(1)) & TAG_MASK;
        self.tagcnt[rd] = tag;
        self.wb = Some(RegWrite {
            addr: rd,
            data: value,
            tag,
        });
    }

    fn issue_memop(&mut self, addr: u64, mtype: MemopType, waddr: usize, rv2: u64) {
        let d = &self.d;
        let mut wtag = 0;
        if waddr != 0 {
            wtag = (self.tagcnt[waddr].wrapping_add(1)) & TAG_MASK;
            self.tagcnt[waddr] = wtag;
        }
        self.memop = Some(Memop {
            mtype,
            size: d.memop_size,
            sign_ext: d.memop_sign_ext,
            addr,
            wdata: rv2,
            waddr,
            wtag,
            pc: d.pc,
            instr: d.instr,
            debug: false,
        });
    }

    /// Retires a taken jump: redirect fetch and mark the BTB write.
    fn jump_to(&mut self, target: u64, i: &ExecuteInputs) {
        let d = self.d;
        self.jmp = true;
        self.jmp_pc = d.pc;
        self.jmp_npc = target;
        self.call = matches!(d.op, Instr::Jal | Instr::Jalr) && d.rd == REG_RA;
        self.ret = d.op == Instr::Jalr && d.rd == 0 && d.rs1 == REG_RA;
        self.retire_to(target, i);
    }

    /// Sequential retirement to the instruction's successor.
    fn retire_instr(&mut self, npc: u64, i: &ExecuteInputs) {
        self.state = ExecState::Idle;
        self.retire_to(npc, i);
    }

    /// Commits the retirement: advance the PC, pulse `valid`, emit the
    /// trace event, and arm the single-step halt when stepping.
    fn retire_to(&mut self, npc: u64, i: &ExecuteInputs) {
        let d = self.d;
        self.valid = !self.progbuf_ena;
        if self.progbuf_ena {
            self.progbuf_pc = self.progbuf_pc.wrapping_add(d.len());
        } else {
            self.npc = npc;
        }

        self.retire = Some(RetireEvent {
            pc: d.pc,
            instr: d.instr,
            wb_addr: self.wb.map_or(0, |w| w.addr),
            wb_data: self.wb.map_or(0, |w| w.data),
            memop_addr: self.memop.map_or(0, |m| m.addr),
            memop_size: self.memop.map_or(0, |m| m.size),
            memop_data: self.memop.map_or(0, |m| m.wdata),
            memop_store: self.memop.is_some_and(|m| m.mtype.is_store()),
            memop: self.memop.is_some(),
            ignored: self.progbuf_ena,
        });

        if (i.step || self.step_armed) && !self.progbuf_ena && !self.halted {
            self.step_armed = false;
            self.issue_csr(
                CsrCommand {
                    ctype: csr_req::HALT,
                    addr: HaltCause::Step.code() as u16,
                    data: 0,
                },
                CsrWait::Halt,
            );
        }
    }

    /// Flush notification from the CSR fence engine or MMU enable edge.
    pub fn external_flush(&mut self, regs: &RegFile) {
        self.resync_tags(regs);
    }
}

/// Highest-priority pending interrupt line.
fn highest_irq(pending: u16) -> Option<usize> {
    const ORDER: [usize; 6] = [
        irq::MEIP,
        irq::MSIP,
        irq::MTIP,
        irq::SEIP,
        irq::SSIP,
        irq::STIP,
    ];
    ORDER
        .into_iter()
        .find(|&line| pending & (1 << line) != 0)
}

/// AMO combine network.
fn amo_combine(op: Instr, old: u64, rs2: u64) -> u64 {
    let word = matches!(
        op,
        Instr::AmoaddW
            | Instr::AmoxorW
            | Instr::AmoorW
            | Instr::AmoandW
            | Instr::AmominW
            | Instr::AmomaxW
            | Instr::AmominuW
            | Instr::AmomaxuW
            | Instr::AmoswapW
    );
    let (a, b) = if word {
        (alu::sext32(old), alu::sext32(rs2))
    } else {
        (old, rs2)
    };
    let res = match op {
        Instr::AmoaddW | Instr::AmoaddD => a.wrapping_add(b),
        Instr::AmoxorW | Instr::AmoxorD => a ^ b,
        Instr::AmoorW | Instr::AmoorD => a | b,
        Instr::AmoandW | Instr::AmoandD => a & b,
        Instr::AmominW | Instr::AmominD => {
            if (a as i64) < (b as i64) {
                a
            } else {
                b
            }
        }
        Instr::AmomaxW | Instr::AmomaxD => {
            if (a as i64) > (b as i64) {
                a
            } else {
                b
            }
        }
        Instr::AmominuW | Instr::AmominuD => a.min(b),
        Instr::AmomaxuW | Instr::AmomaxuD => a.max(b),
        _ => b,
    };
    if word { alu::sext32(res) } else { res }
}
