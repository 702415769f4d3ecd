//! Command-line runner for the River core model.
//!
//! Loads an ELF or flat image into the backing memory, runs the hart for
//! a bounded number of cycles and prints the run statistics.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use river_core::sim::loader;
use river_core::sim::simulator::Simulator;
use river_core::soc::SocMemory;
use river_core::Config;

/// River RISC-V core model runner.
#[derive(Parser, Debug)]
#[command(name = "river", version, about)]
struct Args {
    /// Program image (ELF, or raw binary with --flat-addr).
    image: PathBuf,

    /// Load the image as a flat binary at this address.
    #[arg(long, value_parser = parse_addr)]
    flat_addr: Option<u64>,

    /// Maximum number of cycles to simulate.
    #[arg(long, default_value_t = 10_000_000)]
    cycles: u64,

    /// JSON configuration file overriding the defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Record and print the tail of the retirement log.
    #[arg(long)]
    trace: bool,
}

fn parse_addr(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x") {
        u64::from_str_radix(hex, 16).map_err(|e| e.to_string())
    } else {
        s.parse().map_err(|e: std::num::ParseIntError| e.to_string())
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => {
            let text = match std::fs::read_to_string(path) {
                Ok(t) => t,
                Err(e) => {
                    error!("cannot read config: {e}");
                    return ExitCode::FAILURE;
                }
            };
            match Config::from_json(&text) {
                Ok(c) => c,
                Err(e) => {
                    error!("bad config: {e}");
                    return ExitCode::FAILURE;
                }
            }
        }
        None => Config::default(),
    };
    config.tracer_ena |= args.trace;

    let mut memory = SocMemory::with_default_size();
    if let Some(addr) = args.flat_addr {
        if let Err(e) = loader::load_flat(&args.image, addr, &mut memory) {
            error!("load failed: {e}");
            return ExitCode::FAILURE;
        }
    } else {
        match loader::load_elf(&args.image, &mut memory) {
            Ok(entry) => {
                if entry != config.reset_vector {
                    config.reset_vector = entry;
                }
            }
            Err(e) => {
                error!("load failed: {e}");
                return ExitCode::FAILURE;
            }
        }
    }

    let mut sim = Simulator::new(&config, memory);
    let halted = sim.run_until_halt(args.cycles);

    sim.report();
    println!("{}", sim.stats().summary());
    if args.trace {
        for ev in sim.retire_log() {
            println!(
                "retire pc={:#010x} instr={:#010x} rd=x{} data={:#x}",
                ev.pc, ev.instr, ev.wb_addr, ev.wb_data
            );
        }
    }
    if halted {
        println!("hart halted");
    }

    ExitCode::SUCCESS
}
