// src/optimizer.rs
//
// The generation loop. One Optimizer owns the Strategy exclusively and
// drives it through a fixed generation budget:
//
//   Idle -> Baseline -> Running(1) .. Running(N) -> Done
//
// Per generation: render the signal program from the immutable base,
// run one blocking episode against the oracle, aggregate metrics,
// compute payoffs, evolve the strategy, emit a GenerationRecord.
//
// Resilience: per-generation failures are logged and skipped with the
// strategy unchanged from the last successful update. Only baseline
// and configuration errors are fatal. The episode session is torn down
// on every exit path before the next generation starts.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::config::Config;
use crate::evolve::evolve_step;
use crate::logging::{ApproachRow, GenerationRecord, GenerationSink};
use crate::metrics::{aggregate_trips, approach_queue_sample, ApproachMetrics, QueueTracker};
use crate::network::{NetworkDescription, NetworkStore};
use crate::oracle::{OracleError, TrafficOracle};
use crate::payoff::PayoffEngine;
use crate::strategy::Strategy;
use crate::types::TripRecord;

/// Loop state. `Running(g)` counts generations from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Baseline,
    Running(u32),
    Done,
}

/// Shareable stop flag, checked at generation boundaries. Mid-episode
/// cancellation is not supported; a requested stop takes effect before
/// the next episode starts.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Fatal optimizer errors. Everything else is absorbed per generation.
#[derive(Debug)]
pub enum OptimizerError {
    Config { message: String },
    Baseline { source: OracleError },
}

impl std::fmt::Display for OptimizerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OptimizerError::Config { message } => {
                write!(f, "invalid configuration: {}", message)
            }
            OptimizerError::Baseline { source } => {
                write!(f, "baseline evaluation failed: {}", source)
            }
        }
    }
}

impl std::error::Error for OptimizerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            OptimizerError::Config { .. } => None,
            OptimizerError::Baseline { source } => Some(source),
        }
    }
}

/// End-of-run summary returned by `run`.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Generations that completed successfully (baseline excluded).
    pub generations_run: u32,
    /// Generations skipped because the episode or its result failed.
    pub failed_generations: u32,
    /// Trip records whose departure edge matched no approach.
    pub dropped_trips: u64,
    /// True if a stop was requested before the budget was exhausted.
    pub stopped_early: bool,
    pub final_strategy: Strategy,
    /// Metrics from the last successful episode (baseline if none).
    pub final_metrics: Vec<ApproachMetrics>,
}

/// The generation-loop optimizer.
#[derive(Debug)]
pub struct Optimizer<'a, O, S>
where
    O: TrafficOracle,
    S: GenerationSink,
{
    cfg: &'a Config,
    oracle: O,
    store: NetworkStore,
    /// Public so harnesses and tests can reach a capturing sink after
    /// the run.
    pub sink: S,
    strategy: Strategy,
    payoff_engine: PayoffEngine,
    rng: ChaCha8Rng,
    phase: Phase,
    stop: StopHandle,
    verbosity: u8,
    dropped_trips: u64,
    failed_generations: u32,
    last_metrics: Vec<ApproachMetrics>,
}

impl<'a, O, S> Optimizer<'a, O, S>
where
    O: TrafficOracle,
    S: GenerationSink,
{
    /// Construct an optimizer. Fails fast on configuration errors.
    pub fn new(
        cfg: &'a Config,
        oracle: O,
        store: NetworkStore,
        sink: S,
    ) -> Result<Self, OptimizerError> {
        if cfg.approaches.is_empty() {
            return Err(OptimizerError::Config {
                message: "no approaches configured".to_string(),
            });
        }
        if cfg.min_green_s > cfg.max_green_s {
            return Err(OptimizerError::Config {
                message: format!(
                    "min_green_s ({}) exceeds max_green_s ({})",
                    cfg.min_green_s, cfg.max_green_s
                ),
            });
        }
        if cfg.episode_steps == 0 {
            return Err(OptimizerError::Config {
                message: "episode_steps must be positive".to_string(),
            });
        }
        if !cfg.evolve.mutation_rate.is_finite()
            || !(0.0..=1.0).contains(&cfg.evolve.mutation_rate)
        {
            return Err(OptimizerError::Config {
                message: format!(
                    "mutation_rate ({}) must lie in [0, 1]",
                    cfg.evolve.mutation_rate
                ),
            });
        }

        Ok(Self {
            cfg,
            oracle,
            store,
            sink,
            strategy: Strategy::initial(cfg),
            payoff_engine: PayoffEngine::new(&cfg.payoff),
            rng: ChaCha8Rng::seed_from_u64(0),
            phase: Phase::Idle,
            stop: StopHandle::default(),
            verbosity: 0,
            dropped_trips: 0,
            failed_generations: 0,
            last_metrics: vec![ApproachMetrics::default(); cfg.num_approaches()],
        })
    }

    /// Deterministic seed for the mutation draws.
    pub fn set_seed(&mut self, seed: u64) {
        self.rng = ChaCha8Rng::seed_from_u64(seed);
    }

    /// Verbosity: 0 (quiet) / 1 (per-generation tables) / 2 (debug).
    pub fn set_verbosity(&mut self, v: u8) {
        self.verbosity = v;
    }

    /// Handle for requesting a stop at the next generation boundary.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    /// Run baseline + the full generation budget.
    pub fn run(&mut self) -> Result<RunReport, OptimizerError> {
        if self.cfg.baseline_enabled {
            self.phase = Phase::Baseline;
            self.run_baseline()?;
        }

        let mut generations_run = 0u32;
        let mut stopped_early = false;

        for g in 1..=self.cfg.num_generations {
            if self.stop.is_stop_requested() {
                stopped_early = true;
                break;
            }

            self.phase = Phase::Running(g);
            if self.verbosity >= 1 {
                println!("=== Generation {}/{} ===", g, self.cfg.num_generations);
            }

            match self.run_generation(g) {
                Ok(()) => generations_run += 1,
                Err(e) => {
                    // Resilience: keep the strategy from the last
                    // successful update and move on.
                    eprintln!("generation {g} failed: {e}; retaining previous strategy");
                    self.failed_generations += 1;
                }
            }
        }

        self.phase = Phase::Done;

        Ok(RunReport {
            generations_run,
            failed_generations: self.failed_generations,
            dropped_trips: self.dropped_trips,
            stopped_early,
            final_strategy: self.strategy.clone(),
            final_metrics: self.last_metrics.clone(),
        })
    }

    /// Evaluate generation 0 with the initial strategy, before any
    /// update, to establish the reference point. Failures here are
    /// fatal: no later comparison is meaningful without it.
    fn run_baseline(&mut self) -> Result<(), OptimizerError> {
        if self.verbosity >= 1 {
            println!("=== Baseline ===");
        }

        let net = self.store.render(&self.strategy, &self.cfg.approaches);
        let (trips, trackers) = self
            .run_episode(&net)
            .map_err(|source| OptimizerError::Baseline { source })?;

        let metrics = self.reduce_metrics(&trips, trackers);
        self.payoff_engine.observe(&metrics);

        let record = self.build_record(0, &metrics, None, None);
        self.sink.log_generation(&record);
        self.print_generation_table(&metrics);

        self.last_metrics = metrics;
        Ok(())
    }

    fn run_generation(&mut self, generation: u32) -> Result<(), OracleError> {
        let net = self.store.render(&self.strategy, &self.cfg.approaches);
        let (trips, trackers) = self.run_episode(&net)?;

        let metrics = self.reduce_metrics(&trips, trackers);
        let payoffs = self.payoff_engine.compute(&metrics);
        let (next, adjustments) = evolve_step(self.cfg, &self.strategy, &payoffs, &mut self.rng);

        // The record carries the strategy that PRODUCED these metrics
        // plus the adjustment applied to it for the next generation.
        let adjustment_totals: Vec<i64> = adjustments.iter().map(|a| a.total()).collect();
        let record = self.build_record(
            generation,
            &metrics,
            Some(&payoffs),
            Some(&adjustment_totals),
        );

        self.strategy = next;
        debug_assert!(self.strategy.is_within_bounds(self.cfg));

        self.sink.log_generation(&record);
        self.print_generation_table(&metrics);

        self.last_metrics = metrics;
        Ok(())
    }

    /// Run one full episode against the oracle. The session is closed
    /// on every path out of this function.
    fn run_episode(
        &mut self,
        net: &NetworkDescription,
    ) -> Result<(Vec<TripRecord>, Option<Vec<QueueTracker>>), OracleError> {
        let mut session = self.oracle.begin_episode(net)?;

        let mut trackers = if self.cfg.sample_queues() {
            Some(vec![QueueTracker::default(); self.cfg.num_approaches()])
        } else {
            None
        };

        for _ in 0..self.cfg.episode_steps {
            if let Err(e) = session.step() {
                // Tear the session down before surfacing the error;
                // the partial trip data is discarded.
                let _ = session.close();
                return Err(e);
            }

            if let Some(trackers) = trackers.as_mut() {
                let queues = session.lane_queues();
                for (idx, approach) in self.cfg.approaches.iter().enumerate() {
                    let (sum, max) = approach_queue_sample(&queues, approach);
                    trackers[idx].record_step(sum, max);
                }
            }
        }

        let trips = session.close()?;
        Ok((trips, trackers))
    }

    /// Aggregate trips and merge in queue statistics when sampled.
    fn reduce_metrics(
        &mut self,
        trips: &[TripRecord],
        trackers: Option<Vec<QueueTracker>>,
    ) -> Vec<ApproachMetrics> {
        let (mut metrics, counts) = aggregate_trips(trips, &self.cfg.approaches);
        self.dropped_trips += counts.dropped;

        if let Some(trackers) = trackers {
            for (m, t) in metrics.iter_mut().zip(trackers.iter()) {
                m.mean_queue = t.mean_queue();
                m.max_queue = t.max_queue();
            }
        }

        metrics
    }

    fn build_record(
        &self,
        generation: u32,
        metrics: &[ApproachMetrics],
        payoffs: Option<&[f64]>,
        adjustments: Option<&[i64]>,
    ) -> GenerationRecord {
        let rows = self
            .cfg
            .approaches
            .iter()
            .enumerate()
            .map(|(idx, a)| ApproachRow {
                approach: a.name.clone(),
                green_s: self.strategy.green_s(idx),
                metrics: metrics[idx],
                payoff: payoffs.map(|p| p[idx]).unwrap_or(0.0),
                adjustment: adjustments.map(|d| d[idx]).unwrap_or(0),
            })
            .collect();

        GenerationRecord { generation, rows }
    }

    fn print_generation_table(&self, metrics: &[ApproachMetrics]) {
        if self.verbosity < 1 {
            return;
        }

        println!(
            "{:<10} | {:>7} | {:>10} | {:>10} | {:>9}",
            "approach", "green_s", "mean_delay", "throughput", "max_queue"
        );
        for (idx, a) in self.cfg.approaches.iter().enumerate() {
            let m = &metrics[idx];
            println!(
                "{:<10} | {:>7} | {:>10.1} | {:>10} | {:>9}",
                a.name,
                self.strategy.green_s(idx),
                m.mean_delay_s,
                m.throughput,
                m.max_queue
            );
        }
    }

    /// Print the end-of-run summary block.
    pub fn print_run_summary(&self, report: &RunReport) {
        println!();
        println!("=== Run Summary ===");
        println!(
            "Generations (ok / failed): {} / {}",
            report.generations_run, report.failed_generations
        );
        if report.stopped_early {
            println!("Stopped early on request.");
        }
        println!("Dropped trip records: {}", report.dropped_trips);

        let greens: Vec<String> = self
            .cfg
            .approaches
            .iter()
            .enumerate()
            .map(|(idx, a)| format!("{}={}", a.name, report.final_strategy.green_s(idx)))
            .collect();
        println!("Final green times: {}", greens.join(" "));
    }
}
