// src/bin/batch_opt.rs
//
// Batch research harness: run the full optimization loop many times
// over seed offsets and summarize the outcomes.
//
// Goals:
// - Deterministic multi-run evaluation using seed offsets (run i uses
//   seed + i for both traffic noise and mutation draws).
// - Uses the same components as the main binary: synthetic oracle,
//   network store, generation loop.
//
// Run examples:
//   cargo run --bin batch_opt -- --runs 50 --generations 20 --seed 1
//   GREENWAVE_TUNING_PROFILE=gentle cargo run --bin batch_opt -- --runs 100 --quiet
//
// Optional CSV export:
//   cargo run --bin batch_opt -- --runs 200 --seed 7 --csv runs.csv

use std::env;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use greenwave::config::{resolve_effective_profile, Config, TuningProfile};
use greenwave::logging::NoopSink;
use greenwave::metrics::DelayStats;
use greenwave::network::{NetworkDescription, NetworkStore};
use greenwave::optimizer::Optimizer;
use greenwave::oracle::SyntheticOracle;

const DEFAULT_RUNS: usize = 50;
const DEFAULT_SEED: u64 = 1;
const DEFAULT_PRINT_EVERY: usize = 1;

#[derive(Debug, Clone)]
struct Args {
    runs: usize,
    generations: Option<u32>,
    episode_steps: Option<u64>,
    seed: u64,
    profile: Option<TuningProfile>,
    quiet: bool,
    print_every: usize,
    csv_out: Option<PathBuf>,
}

impl Args {
    fn usage() -> &'static str {
        "\
greenwave batch harness

USAGE:
  cargo run --bin batch_opt -- [FLAGS]

PROFILE PRECEDENCE:
  1) --profile overrides environment
  2) else GREENWAVE_TUNING_PROFILE
  3) else balanced

FLAGS:
  --profile NAME       gentle | balanced | thorough
  --runs N             Number of optimization runs (default: 50)
  --generations N      Generations per run (default: profile setting)
  --episode-steps N    Steps per episode (default: profile setting)
  --seed U64           Base seed (default: 1). Run i uses seed + i.
  --print-every N      Print every N runs (default: 1). Ignored with --quiet.
  --csv PATH           Write per-run CSV rows to PATH
  --quiet              Suppress per-run lines; only print final summary
  --help               Show this help

EXAMPLES:
  cargo run --bin batch_opt -- --runs 100 --generations 10 --seed 7
  GREENWAVE_TUNING_PROFILE=thorough cargo run --bin batch_opt -- --runs 200 --csv out.csv
"
    }

    fn parse_or_exit() -> Self {
        match Self::parse() {
            Ok(a) => a,
            Err(e) => {
                eprintln!("{e}\n\n{}", Self::usage());
                std::process::exit(2);
            }
        }
    }

    fn parse() -> Result<Self, String> {
        let mut out = Args {
            runs: DEFAULT_RUNS,
            generations: None,
            episode_steps: None,
            seed: DEFAULT_SEED,
            profile: None,
            quiet: false,
            print_every: DEFAULT_PRINT_EVERY,
            csv_out: None,
        };

        let mut args = env::args().skip(1);
        while let Some(flag) = args.next() {
            match flag.as_str() {
                "--help" | "-h" => {
                    println!("{}", Self::usage());
                    std::process::exit(0);
                }
                "--runs" => out.runs = parse_next(&mut args, "--runs")?,
                "--generations" => out.generations = Some(parse_next(&mut args, "--generations")?),
                "--episode-steps" => {
                    out.episode_steps = Some(parse_next(&mut args, "--episode-steps")?)
                }
                "--seed" => out.seed = parse_next(&mut args, "--seed")?,
                "--print-every" => out.print_every = parse_next(&mut args, "--print-every")?,
                "--profile" => {
                    let raw = args
                        .next()
                        .ok_or_else(|| "--profile requires a value".to_string())?;
                    out.profile = Some(
                        TuningProfile::parse(&raw)
                            .ok_or_else(|| format!("unknown profile '{raw}'"))?,
                    );
                }
                "--csv" => {
                    let raw = args
                        .next()
                        .ok_or_else(|| "--csv requires a path".to_string())?;
                    out.csv_out = Some(PathBuf::from(raw));
                }
                "--quiet" => out.quiet = true,
                other => return Err(format!("unknown flag '{other}'")),
            }
        }

        if out.runs == 0 {
            return Err("--runs must be positive".to_string());
        }
        if out.print_every == 0 {
            out.print_every = 1;
        }

        Ok(out)
    }
}

fn parse_next<T: std::str::FromStr>(
    args: &mut impl Iterator<Item = String>,
    flag: &str,
) -> Result<T, String> {
    let raw = args
        .next()
        .ok_or_else(|| format!("{flag} requires a value"))?;
    raw.parse::<T>()
        .map_err(|_| format!("could not parse {flag} value '{raw}'"))
}

/// Outcome of one optimization run.
struct RunOutcome {
    seed: u64,
    generations_run: u32,
    failed_generations: u32,
    mean_delay_s: f64,
    throughput: u64,
    final_greens: Vec<u32>,
}

fn main() {
    let args = Args::parse_or_exit();

    let effective = resolve_effective_profile(args.profile);
    effective.log_startup();

    let mut cfg = Config::from_env_or_profile(effective.profile);
    if let Some(g) = args.generations {
        cfg.num_generations = g;
    }
    if let Some(s) = args.episode_steps {
        cfg.episode_steps = s;
    }

    println!(
        "batch_opt | cfg={} | profile={} | model={} | runs={} | generations={} | base_seed={}",
        cfg.version,
        effective.profile.as_str(),
        cfg.payoff.model.as_str(),
        args.runs,
        cfg.num_generations,
        args.seed
    );

    let mut csv = args.csv_out.as_ref().map(|path| {
        let mut f = File::create(path).unwrap_or_else(|e| {
            eprintln!("could not create {}: {e}", path.display());
            std::process::exit(2);
        });
        let _ = writeln!(f, "Run,Seed,GenerationsOk,Failed,MeanDelay,Throughput,FinalGreens");
        f
    });

    let mut delay_stats = DelayStats::default();
    let mut outcomes: Vec<RunOutcome> = Vec::with_capacity(args.runs);

    for i in 0..args.runs {
        let seed = args.seed.wrapping_add(i as u64);

        match run_once(&cfg, seed) {
            Ok(outcome) => {
                delay_stats.add(outcome.mean_delay_s);

                if !args.quiet && i % args.print_every == 0 {
                    println!(
                        "run {:>4} | seed {:>6} | gens {:>3} (failed {}) | mean_delay {:>7.2} | throughput {:>6} | greens {:?}",
                        i,
                        outcome.seed,
                        outcome.generations_run,
                        outcome.failed_generations,
                        outcome.mean_delay_s,
                        outcome.throughput,
                        outcome.final_greens
                    );
                }

                if let Some(f) = csv.as_mut() {
                    let greens: Vec<String> =
                        outcome.final_greens.iter().map(|g| g.to_string()).collect();
                    let _ = writeln!(
                        f,
                        "{},{},{},{},{},{},{}",
                        i,
                        outcome.seed,
                        outcome.generations_run,
                        outcome.failed_generations,
                        outcome.mean_delay_s,
                        outcome.throughput,
                        greens.join(" ")
                    );
                }

                outcomes.push(outcome);
            }
            Err(e) => {
                eprintln!("run {i} (seed {seed}) failed: {e}");
            }
        }
    }

    println!();
    println!("=== Batch Summary ===");
    println!(
        "Runs completed: {} / {}",
        outcomes.len(),
        args.runs
    );
    println!(
        "Final mean delay (s): mean {:.2} | min {:.2} | max {:.2} | std {:.2}",
        delay_stats.mean(),
        delay_stats.min(),
        delay_stats.max(),
        delay_stats.stddev_sample()
    );
}

fn run_once(cfg: &Config, seed: u64) -> Result<RunOutcome, Box<dyn std::error::Error>> {
    let base = NetworkDescription::default_program(&cfg.approaches, cfg.initial_green_s);
    let store = NetworkStore::new(base, &cfg.approaches)?;
    let oracle = SyntheticOracle::with_default_demand(&cfg.approaches, seed);

    let mut optimizer = Optimizer::new(cfg, oracle, store, NoopSink)?;
    optimizer.set_seed(seed);

    let report = optimizer.run()?;

    // Throughput-weighted mean delay across approaches.
    let total_throughput: u64 = report.final_metrics.iter().map(|m| m.throughput).sum();
    let mean_delay_s = if total_throughput == 0 {
        0.0
    } else {
        report
            .final_metrics
            .iter()
            .map(|m| m.mean_delay_s * (m.throughput as f64))
            .sum::<f64>()
            / (total_throughput as f64)
    };

    Ok(RunOutcome {
        seed,
        generations_run: report.generations_run,
        failed_generations: report.failed_generations,
        mean_delay_s,
        throughput: total_throughput,
        final_greens: report.final_strategy.greens().to_vec(),
    })
}
