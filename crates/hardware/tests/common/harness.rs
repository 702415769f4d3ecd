//! Simulator harness for end-to-end scenarios.
//!
//! Builds a hart plus backing memory, plants a program at the reset
//! vector and offers helpers to run bounded cycle counts and inspect
//! architectural state. Cycle budgets are generous: both caches spend
//! roughly a thousand cycles in their power-on reset walk before the
//! first instruction fetch leaves the core.

use std::sync::Once;

use river_core::Config;
use river_core::config::defaults::RESET_VECTOR;
use river_core::sim::simulator::Simulator;
use river_core::soc::SocMemory;

static TRACING: Once = Once::new();

/// Installs the fmt subscriber once so `RUST_LOG` works under tests.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

/// Default cycle budget for a short program; covers the roughly one
/// thousand cycles of cache reset walks with plenty of head-room.
pub const RUN_BUDGET: u64 = 40_000;

/// A hart wired to 16 MiB of memory at address zero.
pub struct TestBed {
    /// The simulator under test.
    pub sim: Simulator,
}

impl TestBed {
    /// Creates a bed with the given 32-bit words planted at the reset
    /// vector.
    pub fn with_program(words: &[u32]) -> Self {
        Self::with_config_and_program(&Config::default(), words)
    }

    /// Creates a bed with an explicit configuration.
    pub fn with_config_and_program(config: &Config, words: &[u32]) -> Self {
        init_tracing();
        let mut memory = SocMemory::with_default_size();
        for (n, w) in words.iter().enumerate() {
            memory.write_u32(RESET_VECTOR + 4 * n as u64, *w);
        }
        Self {
            sim: Simulator::new(config, memory),
        }
    }

    /// Advances `n` cycles.
    pub fn run(&mut self, n: u64) {
        self.sim.run(n);
    }

    /// Runs until `n` instructions have retired or the budget expires.
    /// Returns the retired count.
    pub fn run_until_retired(&mut self, n: u64, budget: u64) -> u64 {
        for _ in 0..budget {
            if self.sim.stats().retired >= n {
                break;
            }
            self.sim.tick();
        }
        self.sim.stats().retired
    }

    /// Runs until the given register holds the given value; true on
    /// success.
    pub fn run_until_reg(&mut self, reg: usize, value: u64, budget: u64) -> bool {
        for _ in 0..budget {
            if self.sim.proc.regs.read(reg) == value {
                return true;
            }
            self.sim.tick();
        }
        false
    }

    /// Integer register read-back.
    pub fn reg(&self, idx: usize) -> u64 {
        self.sim.proc.regs.read(idx)
    }
}
