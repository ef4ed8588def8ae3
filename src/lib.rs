//! Greenwave core library.
//!
//! This crate tunes the green-phase durations of one fixed-time
//! signalized intersection by repeated simulation: run an episode,
//! score each approach from its congestion metrics, and adjust green
//! times with a replicator-style payoff-proportional step plus bounded
//! random mutation. The binaries (`src/main.rs`, `src/bin/batch_opt.rs`)
//! are thin research harnesses around these components.
//!
//! # Architecture
//!
//! The codebase separates the pure optimization core from I/O:
//!
//! - **Strategy** (`strategy`): the per-approach green allocation,
//!   owned exclusively by the optimizer and clamped into configured
//!   bounds at every generation boundary.
//!
//! - **Evolve** (`evolve`): the pure update rule. Deterministic given
//!   a seeded random source; no I/O.
//!
//! - **Metrics** (`metrics`): trip attribution by departure edge and
//!   per-generation delay / throughput / queue aggregation.
//!
//! - **Payoff** (`payoff`): three payoff models behind one engine,
//!   selected by configuration.
//!
//! - **Oracle** (`oracle`): the blocking simulation session trait plus
//!   a deterministic synthetic queueing model for harnesses and tests.
//!
//! - **Network** (`network`): the immutable base signal program and
//!   the store that derives each generation's program from it.
//!
//! - **Optimizer** (`optimizer`): the generation loop, with a fatal
//!   baseline phase, per-generation failure absorption and a stop flag
//!   honored at generation boundaries.

pub mod config;
pub mod evolve;
pub mod logging;
pub mod metrics;
pub mod network;
pub mod optimizer;
pub mod oracle;
pub mod payoff;
pub mod strategy;
pub mod types;

// --- Re-exports for ergonomic external use ---------------------------------

pub use config::{
    ApproachConfig, Config, EffectiveProfile, PayoffModel, PayoffWeights, ProfileSource,
    TuningProfile,
};

pub use strategy::{clamp_green, Strategy, StrategyAdjustment};

pub use evolve::{evolve_step, TOTAL_PAYOFF_GUARD};

pub use metrics::{
    aggregate_trips, approach_queue_sample, ApproachMetrics, AttributionCounts, DelayStats,
    QueueTracker,
};

pub use payoff::PayoffEngine;

pub use network::{NetworkDescription, NetworkError, NetworkStore, PhaseSpec};

pub use oracle::{EpisodeSession, OracleError, SyntheticOracle, TrafficOracle};

pub use logging::{
    ApproachRow, CsvSink, GenerationRecord, GenerationSink, JsonlSink, MemorySink, NoopSink,
    CSV_HEADER, LOG_SCHEMA_VERSION,
};

pub use optimizer::{Optimizer, OptimizerError, Phase, RunReport, StopHandle};

pub use types::{edge_of_lane, LaneQueue, TripRecord};

// --- End-to-end smoke test --------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// A short full loop over the synthetic oracle: strategy stays in
    /// bounds, every generation logs one row per approach.
    #[test]
    fn short_run_respects_bounds_and_logs_every_generation() {
        let mut cfg = Config::default();
        cfg.num_generations = 3;
        cfg.episode_steps = 300;

        let base = NetworkDescription::default_program(&cfg.approaches, cfg.initial_green_s);
        let store = NetworkStore::new(base, &cfg.approaches).unwrap();
        let oracle = SyntheticOracle::with_default_demand(&cfg.approaches, 1);

        let mut opt = Optimizer::new(&cfg, oracle, store, MemorySink::default()).unwrap();
        opt.set_seed(99);
        let report = opt.run().unwrap();

        assert_eq!(report.generations_run, 3);
        assert_eq!(report.failed_generations, 0);
        assert!(report.final_strategy.is_within_bounds(&cfg));

        // Baseline + 3 generations, one row per approach each.
        assert_eq!(opt.sink.records.len(), 4);
        for (g, record) in opt.sink.records.iter().enumerate() {
            assert_eq!(record.generation, g as u32);
            assert_eq!(record.rows.len(), cfg.approaches.len());
            for row in &record.rows {
                assert!(row.green_s >= cfg.min_green_s && row.green_s <= cfg.max_green_s);
            }
        }
    }
}
