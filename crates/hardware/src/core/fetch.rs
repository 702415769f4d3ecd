//! Instruction fetch stage.
//!
//! Issues instruction reads toward the fetch MMU / I-cache, accepts the
//! responses and forwards one latched instruction per cycle to Decode.
//! While the debug port runs the program buffer, the stage sources
//! instructions from the 16-word buffer instead of the cache and the PC
//! advances inside that window. The stage exposes its requested,
//! fetching and fetched PCs so the branch predictor can cross-check the
//! speculative chain against what is already in flight.

use crate::config::defaults::PROGBUF_REG_TOTAL;

/// Fetch state machine states.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
enum FetchState {
    /// No request outstanding.
    #[default]
    Idle,
    /// Request presented, waiting for the cache to accept it.
    WaitReqAccept,
    /// Request accepted, waiting for the response.
    WaitResp,
}

/// One instruction handed to Decode.
#[derive(Clone, Copy, Debug, Default)]
pub struct FetchedInstr {
    /// Instruction address.
    pub pc: u64,
    /// 32 raw instruction bits (may combine two cache lines).
    pub data: u32,
    /// The fetch suffered a bus fault.
    pub load_fault: bool,
    /// The fetch suffered a translation fault.
    pub page_fault_x: bool,
    /// Sourced from the debug program buffer.
    pub progbuf_ena: bool,
}

/// Response from the fetch MMU / I-cache.
#[derive(Clone, Copy, Debug, Default)]
pub struct FetchResp {
    /// Address the response belongs to.
    pub addr: u64,
    /// 32 instruction bits.
    pub data: u32,
    /// Bus fault during the line fill.
    pub load_fault: bool,
    /// Translation fault.
    pub page_fault_x: bool,
}

/// Inputs sampled by the fetch stage each cycle.
#[derive(Clone, Copy, Debug, Default)]
pub struct FetchInputs {
    /// Address proposed by the branch predictor.
    pub bp_npc: u64,
    /// The I-side accepts a new request this cycle.
    pub imem_req_ready: bool,
    /// Response from the I-side, if any.
    pub imem_resp: Option<FetchResp>,
    /// Pipeline flush: drop the latched instruction and restart.
    pub flush: bool,
    /// Program buffer execution is active.
    pub progbuf_ena: bool,
    /// PC inside the program buffer window.
    pub progbuf_pc: u64,
    /// The program buffer contents.
    pub progbuf: [u32; PROGBUF_REG_TOTAL],
}

/// The fetch stage.
pub struct Fetch {
    state: FetchState,
    requested_pc: u64,
    fetching_pc: u64,
    fetched_pc: u64,
    latched: Option<FetchedInstr>,
    /// Request currently presented to the I-side.
    req_addr: Option<u64>,
}

impl Fetch {
    /// Creates an idle fetch stage.
    pub fn new() -> Self {
        Self {
            state: FetchState::Idle,
            requested_pc: u64::MAX,
            fetching_pc: u64::MAX,
            fetched_pc: u64::MAX,
            latched: None,
            req_addr: None,
        }
    }

    /// Advances one cycle.
    pub fn step(&mut self, i: &FetchInputs) {
        if i.flush {
            self.state = FetchState::Idle;
            self.latched = None;
            self.req_addr = None;
            self.requested_pc = u64::MAX;
            self.fetching_pc = u64::MAX;
            self.fetched_pc = u64::MAX;
            return;
        }

        if i.progbuf_ena {
            // Debug program buffer sources the instruction directly; the
            // window index is the PC's word offset.
            let idx = ((i.progbuf_pc >> 2) as usize) % PROGBUF_REG_TOTAL;
            self.latched = Some(FetchedInstr {
                pc: i.progbuf_pc,
                data: i.progbuf[idx],
                progbuf_ena: true,
                ..FetchedInstr::default()
            });
            self.state = FetchState::Idle;
            self.req_addr = None;
            return;
        }

        match self.state {
            FetchState::Idle => {
                // Fetch runs continuously: every idle cycle requests the
                // predictor's choice, even a PC already seen (tight
                // loops re-fetch their own body).
                self.latched = None;
                self.requested_pc = i.bp_npc;
                self.req_addr = Some(i.bp_npc);
                self.state = FetchState::WaitReqAccept;
            }
            FetchState::WaitReqAccept => {
                self.latched = None;
                if i.imem_req_ready {
                    self.fetching_pc = self.requested_pc;
                    self.req_addr = None;
                    self.state = FetchState::WaitResp;
                }
            }
            FetchState::WaitResp => {
                if let Some(resp) = i.imem_resp {
                    self.fetched_pc = resp.addr;
                    self.latched = Some(FetchedInstr {
                        pc: resp.addr,
                        data: resp.data,
                        load_fault: resp.load_fault,
                        page_fault_x: resp.page_fault_x,
                        progbuf_ena: false,
                    });
                    self.state = FetchState::Idle;
                }
            }
        }
    }

    /// Request the stage presents to the I-side this cycle.
    pub fn imem_req(&self) -> Option<u64> {
        self.req_addr
    }

    /// Instruction latched for Decode this cycle.
    pub fn fetched(&self) -> Option<&FetchedInstr> {
        self.latched.as_ref()
    }

    /// PC about to be requested (predictor cross-check).
    pub fn requested_pc(&self) -> u64 {
        self.requested_pc
    }

    /// PC of the in-flight request (predictor cross-check).
    pub fn fetching_pc(&self) -> u64 {
        self.fetching_pc
    }

    /// PC of the last accepted response (predictor cross-check).
    pub fn fetched_pc(&self) -> u64 {
        self.fetched_pc
    }
}

impl Default for Fetch {
    fn default() -> Self {
        Self::new()
    }
}
