//! Branch predictor.
//!
//! Keeps a pipeline of speculative fetch addresses. Each cycle it walks
//! the BTB along the `npc → npc` chain starting at the last
//! executor-committed PC, cross-checks the chain against the addresses
//! already in flight (requested, fetching, fetched, decoded) and picks
//! the first address not yet pipelined as the next fetch target. Raw
//! I-cache response bytes additionally run through the two pre-decoder
//! slices, generating speculative BTB writes for unconditional jumps,
//! back-edges and compressed returns.

/// The ordered-vector Branch Target Buffer.
pub mod btb;
/// The lightweight pre-decoder.
pub mod predec;

use self::btb::Btb;
use self::predec::{PreDecoded, predecode};
use crate::config::defaults::BP_DEPTH;

/// Inputs sampled by the predictor each cycle.
#[derive(Clone, Copy, Debug, Default)]
pub struct BpInputs {
    /// Executor committed a jump this cycle.
    pub e_jmp: bool,
    /// PC of the committed jump.
    pub e_pc: u64,
    /// Its resolved successor.
    pub e_npc: u64,
    /// Last committed PC (chain walk start).
    pub start_pc: u64,
    /// Current return-address register value.
    pub ra: u64,
    /// I-cache response visible this cycle.
    pub resp_mem_valid: bool,
    /// Address of the response.
    pub resp_mem_addr: u64,
    /// 32 instruction bits of the response.
    pub resp_mem_data: u32,
    /// PC the fetch stage is about to request.
    pub requested_pc: u64,
    /// PC of the in-flight I-cache request.
    pub fetching_pc: u64,
    /// PC of the last accepted response.
    pub fetched_pc: u64,
    /// PC of the instruction sitting in Decode.
    pub decoded_pc: u64,
    /// Flush clears the BTB.
    pub flush_pipeline: bool,
}

/// The branch predictor.
pub struct BranchPredictor {
    btb: Btb,
    npc: u64,
}

impl BranchPredictor {
    /// Creates a predictor proposing `reset_vector` first.
    pub fn new(reset_vector: u64) -> Self {
        Self {
            btb: Btb::new(),
            npc: reset_vector,
        }
    }

    /// Advances one cycle and updates the proposed fetch address.
    pub fn step(&mut self, i: &BpInputs) {
        if i.flush_pipeline {
            self.btb.flush();
        }

        // Speculative chain walk: addr[0] is the committed PC, each next
        // level follows a BTB hit or falls through to pc+4.
        let mut addr = [0u64; BP_DEPTH];
        let mut exec = [false; BP_DEPTH];
        addr[0] = i.start_pc;
        exec[0] = i.e_jmp;
        for lvl in 1..BP_DEPTH {
            let prev = addr[lvl - 1];
            if let Some((npc, e)) = self.btb.lookup(prev) {
                addr[lvl] = npc;
                exec[lvl] = e;
            } else {
                addr[lvl] = prev.wrapping_add(4);
            }
        }

        // Cross-check against what the pipeline already holds. Slot n of
        // the chain is satisfied when it matches any pipeline stage at
        // its depth or beyond.
        let piped = [
            i.decoded_pc >> 2,
            i.fetched_pc >> 2,
            i.fetching_pc >> 2,
            i.requested_pc >> 2,
        ];
        let mut hit = [false; 4];
        for (n, h) in hit.iter_mut().enumerate() {
            for p in &piped[n..] {
                if addr[n] >> 2 == *p {
                    *h = true;
                }
            }
        }

        let mut fetch_npc = addr[BP_DEPTH - 1];
        for n in (0..4).rev() {
            if !hit[n] {
                fetch_npc = addr[n];
            }
        }

        // Pre-decode both half-instruction slots of the returned word.
        let mut pd = [PreDecoded::default(); 2];
        if i.resp_mem_valid {
            let lo_compressed = i.resp_mem_data & 0x3 != 0x3;
            pd[0] = predecode(i.resp_mem_addr, i.resp_mem_data, lo_compressed, i.ra);
            let hi = i.resp_mem_data >> 16;
            let hi_compressed = hi & 0x3 != 0x3;
            pd[1] = predecode(i.resp_mem_addr + 2, hi, hi_compressed, i.ra);
        }

        let ignore_pd = |npc: u64| piped.contains(&(npc >> 2));

        // BTB write port: executor result wins over pre-decoder guesses.
        if i.e_jmp {
            self.btb.write(i.e_pc, i.e_npc, true);
        } else if pd[0].jmp {
            self.btb.write(pd[0].pc, pd[0].npc, false);
            if hit[0] && hit[1] && hit[2] && !exec[2] && !ignore_pd(pd[0].npc) {
                fetch_npc = pd[0].npc;
            }
        } else if pd[1].jmp {
            self.btb.write(pd[1].pc, pd[1].npc, false);
            if hit[0] && hit[1] && hit[2] && !exec[2] && !ignore_pd(pd[1].npc) {
                fetch_npc = pd[1].npc;
            }
        }

        self.npc = fetch_npc;
    }

    /// The fetch address the predictor proposes this cycle.
    pub fn npc(&self) -> u64 {
        self.npc
    }

    /// Read access to the BTB (tests and tracing).
    pub fn btb(&self) -> &Btb {
        &self.btb
    }
}
