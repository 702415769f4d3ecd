//! Run statistics.
//!
//! Counters collected while the model runs, reported by the simulator and
//! the CLI. These are observability counters only; the architectural
//! `mcycle`/`minstret` CSRs are kept by the CSR block itself.

/// Counters describing one simulation run.
#[derive(Clone, Copy, Debug, Default)]
pub struct Stats {
    /// Total clock cycles advanced.
    pub cycles: u64,
    /// Instructions retired (excluding debug program-buffer execution).
    pub retired: u64,
    /// D-cache hits.
    pub dcache_hits: u64,
    /// D-cache misses.
    pub dcache_misses: u64,
    /// Dirty-victim write-backs issued by the D-cache.
    pub dcache_writebacks: u64,
    /// I-cache hits.
    pub icache_hits: u64,
    /// I-cache misses.
    pub icache_misses: u64,
    /// TLB hits across both MMU directions.
    pub tlb_hits: u64,
    /// Page-table walks across both MMU directions.
    pub tlb_walks: u64,
    /// Pipeline flushes (traps, fences, redirections).
    pub flushes: u64,
}

impl Stats {
    /// Formats a short human-readable summary.
    pub fn summary(&self) -> String {
        format!(
            "cycles={} retired={} ipc={:.3} d$={}h/{}m i$={}h/{}m tlb={}h/{}w wb={}",
            self.cycles,
            self.retired,
            if self.cycles == 0 {
                0.0
            } else {
                self.retired as f64 / self.cycles as f64
            },
            self.dcache_hits,
            self.dcache_misses,
            self.icache_hits,
            self.icache_misses,
            self.tlb_hits,
            self.tlb_walks,
            self.dcache_writebacks,
        )
    }
}
