// src/main.rs
//
// Research-harness friendly CLI entrypoint for Greenwave.
//
// Constraints:
// - Profile precedence: --profile overrides GREENWAVE_TUNING_PROFILE;
//   default Balanced.
// - Deterministic runs via --seed (drives both the synthetic traffic
//   and the mutation draws).
// - Optional CSV / JSONL generation logs.
// - Print a concise run header (profile, model, generations, cfg
//   version/hash) before the loop starts.

use std::path::PathBuf;

use anyhow::Context;
use clap::{ArgAction, Parser, ValueEnum};

use greenwave::config::{resolve_effective_profile, Config, PayoffModel, TuningProfile};
use greenwave::logging::{CsvSink, GenerationSink, JsonlSink};
use greenwave::network::{NetworkDescription, NetworkStore};
use greenwave::optimizer::Optimizer;
use greenwave::oracle::SyntheticOracle;

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ProfileArg {
    Gentle,
    Balanced,
    Thorough,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ModelArg {
    InverseDelay,
    ExpDecay,
    Weighted,
}

#[derive(Debug, Parser)]
#[command(
    name = "greenwave",
    about = "Evolutionary green-time tuner for one intersection (research harness)",
    version
)]
struct Args {
    /// Number of generations (overrides the profile default).
    #[arg(long)]
    generations: Option<u32>,

    /// Simulation steps per episode.
    #[arg(long)]
    episode_steps: Option<u64>,

    /// Tuning profile preset (optional).
    /// If omitted, uses GREENWAVE_TUNING_PROFILE (default Balanced).
    #[arg(long, value_enum)]
    profile: Option<ProfileArg>,

    /// Payoff model (overrides the profile's model).
    #[arg(long, value_enum)]
    model: Option<ModelArg>,

    /// Deterministic seed for traffic noise and mutation draws.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Signal program YAML. Defaults to the built-in four-approach
    /// program.
    #[arg(long)]
    network: Option<PathBuf>,

    /// Write per-generation CSV rows to this path.
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Write per-generation JSONL rows to this path.
    #[arg(long)]
    jsonl: Option<PathBuf>,

    /// Verbosity: -v, -vv
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn fnv1a64(s: &str) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;
    let mut h = FNV_OFFSET;
    for b in s.as_bytes() {
        h ^= *b as u64;
        h = h.wrapping_mul(FNV_PRIME);
    }
    h
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let cli_profile = args.profile.map(|p| match p {
        ProfileArg::Gentle => TuningProfile::Gentle,
        ProfileArg::Balanced => TuningProfile::Balanced,
        ProfileArg::Thorough => TuningProfile::Thorough,
    });

    // Resolve profile with proper precedence: CLI > env > default.
    let effective = resolve_effective_profile(cli_profile);
    effective.log_startup();

    let mut cfg = Config::from_env_or_profile(effective.profile);
    if let Some(g) = args.generations {
        cfg.num_generations = g;
    }
    if let Some(s) = args.episode_steps {
        cfg.episode_steps = s;
    }
    if let Some(m) = args.model {
        cfg.payoff.model = match m {
            ModelArg::InverseDelay => PayoffModel::InverseDelay,
            ModelArg::ExpDecay => PayoffModel::ExpDecay,
            ModelArg::Weighted => PayoffModel::WeightedMultiMetric,
        };
    }

    let cfg_hash = fnv1a64(&format!("{cfg:?}"));
    println!(
        "greenwave | cfg={} | cfg_hash=0x{:016x} | profile={} | model={} | generations={} | seed={}",
        cfg.version,
        cfg_hash,
        effective.profile.as_str(),
        cfg.payoff.model.as_str(),
        cfg.num_generations,
        args.seed
    );

    let base = match &args.network {
        Some(path) => NetworkDescription::from_yaml_file(path)
            .with_context(|| format!("loading signal program {}", path.display()))?,
        None => NetworkDescription::default_program(&cfg.approaches, cfg.initial_green_s),
    };
    let store = NetworkStore::new(base, &cfg.approaches)?;

    let mut sinks: Vec<Box<dyn GenerationSink>> = Vec::new();
    if let Some(path) = &args.csv {
        let sink = CsvSink::create(path)
            .with_context(|| format!("creating CSV log {}", path.display()))?;
        sinks.push(Box::new(sink));
    }
    if let Some(path) = &args.jsonl {
        let sink = JsonlSink::create(path)
            .with_context(|| format!("creating JSONL log {}", path.display()))?;
        sinks.push(Box::new(sink));
    }

    let oracle = SyntheticOracle::with_default_demand(&cfg.approaches, args.seed);

    let mut optimizer = Optimizer::new(&cfg, oracle, store, sinks)?;
    optimizer.set_seed(args.seed);
    optimizer.set_verbosity(args.verbose);

    let report = optimizer.run()?;
    optimizer.print_run_summary(&report);
    Ok(())
}
