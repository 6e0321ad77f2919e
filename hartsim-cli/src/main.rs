mod trace;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use env_logger::Env;
use hartsim_core::mem::{
    Cache, CacheConfig, MainMemory, Memory, ReplacementPolicy, WritePolicy,
};
use hartsim_core::program::Program;
use hartsim_core::simulator::Simulator;
use std::fs;
use std::io::{self, Write};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Program binary: one line of 32 '0'/'1' characters per instruction,
    /// most significant bit first.
    binary: String,

    /// Run without a data cache; every access goes straight to main memory.
    #[arg(long)]
    no_cache: bool,

    /// Write policy of the cache.
    #[arg(long, value_enum, default_value = "write-through")]
    write_policy: WritePolicyArg,

    /// Replacement policy of the cache.
    #[arg(long, value_enum, default_value = "lru")]
    replacement_policy: ReplacementPolicyArg,

    /// Fixed seed for the random replacement policy, for reproducible runs.
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(ValueEnum, Debug, Copy, Clone)]
enum WritePolicyArg {
    WriteThrough,
    WriteBack,
}

impl From<WritePolicyArg> for WritePolicy {
    fn from(value: WritePolicyArg) -> Self {
        match value {
            WritePolicyArg::WriteThrough => Self::WriteThrough,
            WritePolicyArg::WriteBack => Self::WriteBack,
        }
    }
}

#[derive(ValueEnum, Debug, Copy, Clone)]
enum ReplacementPolicyArg {
    Lru,
    Fifo,
    Random,
}

impl From<ReplacementPolicyArg> for ReplacementPolicy {
    fn from(value: ReplacementPolicyArg) -> Self {
        match value {
            ReplacementPolicyArg::Lru => Self::Lru,
            ReplacementPolicyArg::Fifo => Self::Fifo,
            ReplacementPolicyArg::Random => Self::Random,
        }
    }
}

fn main() {
    let args = Args::parse();
    env_logger::init_from_env(Env::default().default_filter_or("warn"));

    println!("Beginning the simulation...\n");
    if let Err(error) = run(&args) {
        eprintln!("error: {error:#}");
    }
}

fn run(args: &Args) -> anyhow::Result<()> {
    let text = fs::read_to_string(&args.binary)
        .with_context(|| format!("could not read file `{}`", args.binary))?;
    let program = Program::parse(&text)?;

    let main_memory = MainMemory::default();
    let memory = match args.no_cache {
        true => Memory::direct(main_memory),
        false => {
            let cache = Cache::new(CacheConfig {
                write_policy: args.write_policy.into(),
                replacement_policy: args.replacement_policy.into(),
                rng_seed: args.seed,
                ..CacheConfig::default()
            })?;
            Memory::cached(cache, main_memory)
        }
    };
    let mut simulator = Simulator::new(memory, &program)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    while !simulator.is_finished() {
        writeln!(
            out,
            "Program Counter : {:#x}",
            simulator.core().registers().pc()
        )?;
        let report = simulator.step()?;
        trace::dump_registers(&mut out, simulator.core().registers())?;
        writeln!(out, "Time taken : {}\n", report.cycles)?;
    }

    writeln!(out, "Total simulation cycles : {}\n", simulator.total_cycles())?;
    if let Some(cache) = simulator.core().memory().cache() {
        trace::dump_cache(&mut out, cache)?;
        writeln!(out)?;
    }
    trace::dump_main_memory(&mut out, simulator.core().memory().main_memory())?;
    Ok(())
}
