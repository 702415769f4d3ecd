//! Backing memory speaking the cacheline-wide bus protocol.
//!
//! Stands in for the upstream interconnect and DRAM: accepts one request
//! per cycle, answers one cycle later, echoes the path bit so the L1
//! arbiter can steer the response, and reports bus faults for addresses
//! outside the populated range. Writes complete atomically, so a snoop
//! interrupting a cache's `WriteBus` state never observes a half-written
//! line.

use crate::cache::{MemRequest, MemResponse};
use crate::common::line::CacheLine;
use crate::config::defaults::L1_BYTES_PER_LINE;

/// Default backing storage size (16 MiB).
const DEFAULT_SIZE: usize = 16 * 1024 * 1024;

/// The memory model.
pub struct SocMemory {
    base: u64,
    data: Vec<u8>,
    /// Request accepted last cycle, answered this cycle.
    pending: Option<MemRequest>,
    /// Transaction log of request types, for protocol-level assertions.
    pub trace: Vec<MemRequest>,
}

impl SocMemory {
    /// Creates a zero-filled memory starting at `base`.
    pub fn new(base: u64, size: usize) -> Self {
        Self {
            base,
            data: vec![0; size],
            pending: None,
            trace: Vec::new(),
        }
    }

    /// Creates the default 16 MiB memory at address zero.
    pub fn with_default_size() -> Self {
        Self::new(0, DEFAULT_SIZE)
    }

    fn in_range(&self, addr: u64, len: usize) -> bool {
        addr >= self.base && (addr - self.base) as usize + len <= self.data.len()
    }

    /// Copies an image into memory; silently truncates at the end.
    pub fn load(&mut self, addr: u64, bytes: &[u8]) {
        if addr < self.base {
            return;
        }
        let off = (addr - self.base) as usize;
        let end = (off + bytes.len()).min(self.data.len());
        let n = end.saturating_sub(off);
        self.data[off..end].copy_from_slice(&bytes[..n]);
    }

    /// Direct read for assertions.
    pub fn read_u64(&self, addr: u64) -> u64 {
        if !self.in_range(addr, 8) {
            return 0;
        }
        let off = (addr - self.base) as usize;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&self.data[off..off + 8]);
        u64::from_le_bytes(buf)
    }

    /// Direct write for test setup.
    pub fn write_u64(&mut self, addr: u64, value: u64) {
        if self.in_range(addr, 8) {
            let off = (addr - self.base) as usize;
            self.data[off..off + 8].copy_from_slice(&value.to_le_bytes());
        }
    }

    /// Direct 32-bit write, convenient for planting instructions.
    pub fn write_u32(&mut self, addr: u64, value: u32) {
        if self.in_range(addr, 4) {
            let off = (addr - self.base) as usize;
            self.data[off..off + 4].copy_from_slice(&value.to_le_bytes());
        }
    }

    /// Advances one cycle: answers last cycle's request and accepts a
    /// new one. Returns `(req_accepted, response)`.
    pub fn step(&mut self, req: Option<&MemRequest>) -> (bool, Option<MemResponse>) {
        let resp = self.pending.take().map(|r| self.perform(&r));

        let accepted = if let Some(r) = req {
            self.pending = Some(*r);
            self.trace.push(*r);
            true
        } else {
            false
        };

        (accepted, resp)
    }

    fn perform(&mut self, req: &MemRequest) -> MemResponse {
        let line_len = 1usize << req.size;
        let fault = !self.in_range(req.addr & !7, line_len.max(8));

        if req.rtype.is_write() {
            if !fault {
                if req.rtype.is_cached() {
                    // Line-wide write under the line strobe.
                    let base = req.addr & !((L1_BYTES_PER_LINE as u64) - 1);
                    let off = (base - self.base) as usize;
                    for n in 0..L1_BYTES_PER_LINE {
                        if req.strob & (1 << n) != 0 {
                            self.data[off + n] = req.data.bytes[n];
                        }
                    }
                } else {
                    // Narrow write: the strobe addresses the 64-bit lane.
                    let lane = req.addr & !7;
                    let off = (lane - self.base) as usize;
                    for n in 0..8 {
                        if req.strob & (1 << n) != 0 {
                            self.data[off + n] = req.data.bytes[n];
                        }
                    }
                }
            }
            MemResponse {
                path: req.path,
                data: CacheLine::ZERO,
                load_fault: false,
                store_fault: fault,
            }
        } else {
            let mut line = CacheLine::ZERO;
            if !fault {
                if req.rtype.is_cached() {
                    let base = req.addr & !((L1_BYTES_PER_LINE as u64) - 1);
                    let off = (base - self.base) as usize;
                    line.bytes
                        .copy_from_slice(&self.data[off..off + L1_BYTES_PER_LINE]);
                } else {
                    // Narrow read returns the naturally aligned lane.
                    let lane = req.addr & !7;
                    let off = (lane - self.base) as usize;
                    line.bytes[..8].copy_from_slice(&self.data[off..off + 8]);
                }
            }
            MemResponse {
                path: req.path,
                data: line,
                load_fault: fault,
                store_fault: false,
            }
        }
    }
}
