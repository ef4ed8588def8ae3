// src/config.rs
//
// Central configuration for the Greenwave tuner.
// This is the single source of truth for the optimization loop
// parameters (green-time bounds, replicator scaling, mutation,
// payoff model + weights, episode horizon) and for the approach
// topology (which network edges feed each approach).
//
// `Config::default()` is treated as the Balanced centre; the named
// tuning profiles only adjust a small set of knobs on top of it.

use std::env;

use serde::{Deserialize, Serialize};

/// One directional traffic movement into the intersection, identified
/// by the set of incoming network edges whose departures belong to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproachConfig {
    /// Identifying name, e.g. `"west"`.
    pub name: String,
    /// Network-edge ids attributed to this approach.
    pub edges: Vec<String>,
}

impl ApproachConfig {
    pub fn new(name: impl Into<String>, edges: &[&str]) -> Self {
        Self {
            name: name.into(),
            edges: edges.iter().map(|e| e.to_string()).collect(),
        }
    }
}

/// Replicator update + mutation parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct EvolveConfig {
    /// Integer scaling constant K for the payoff-proportional step.
    /// An approach gains `floor(K * payoff_share)` seconds of green.
    pub payoff_scale_k: u32,
    /// Independent per-approach probability of a mutation draw.
    pub mutation_rate: f64,
    /// Magnitude of a mutation delta in seconds.
    pub mutation_step: u32,
    /// Whether the mutation draw set includes 0 (`{-step, 0, +step}`)
    /// or only the non-zero deltas (`{-step, +step}`).
    pub mutation_zero_allowed: bool,
}

/// Payoff model selection.
///
/// All three models run through one engine; this is a configuration
/// variant, not a separate code path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoffModel {
    /// `1 / (mean_delay + epsilon)`.
    InverseDelay,
    /// `exp(-mean_delay / tau)`, bounded in (0, 1].
    #[default]
    ExpDecay,
    /// Weighted combination of normalized delay, throughput and queue.
    /// Selecting this model also enables per-step queue sampling.
    WeightedMultiMetric,
}

impl PayoffModel {
    /// Stable lowercase name (used in logs / CLI).
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoffModel::InverseDelay => "inverse_delay",
            PayoffModel::ExpDecay => "exp_decay",
            PayoffModel::WeightedMultiMetric => "weighted",
        }
    }

    /// Parse a model name (case-insensitive). Returns None if unrecognized.
    pub fn parse(s: &str) -> Option<PayoffModel> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inverse_delay" | "inverse" | "inv" => Some(PayoffModel::InverseDelay),
            "exp_decay" | "exp" => Some(PayoffModel::ExpDecay),
            "weighted" | "weighted_multi_metric" | "multi" => {
                Some(PayoffModel::WeightedMultiMetric)
            }
            _ => None,
        }
    }
}

/// Weights for the weighted multi-metric payoff.
///
/// Sign convention (fixed here, applied in the payoff engine):
/// throughput increases payoff, delay and queue decrease it.
/// The weights conventionally sum to 1 but are not required to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PayoffWeights {
    pub delay: f64,
    pub throughput: f64,
    pub queue: f64,
}

impl Default for PayoffWeights {
    fn default() -> Self {
        Self {
            delay: 0.5,
            throughput: 0.3,
            queue: 0.2,
        }
    }
}

/// Initial normalization ceilings for the weighted model. These are the
/// running observed maxima's starting values; the engine only ever
/// raises them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricCeilings {
    pub delay: f64,
    pub throughput: f64,
    pub queue: f64,
}

impl Default for MetricCeilings {
    fn default() -> Self {
        Self {
            delay: 100.0,
            throughput: 1000.0,
            queue: 20.0,
        }
    }
}

/// Payoff computation parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct PayoffConfig {
    pub model: PayoffModel,
    /// Decay constant for `PayoffModel::ExpDecay`, in seconds of delay.
    pub tau: f64,
    /// Division guard for `PayoffModel::InverseDelay`.
    pub epsilon: f64,
    pub weights: PayoffWeights,
    pub initial_ceilings: MetricCeilings,
}

impl Default for PayoffConfig {
    fn default() -> Self {
        Self {
            model: PayoffModel::ExpDecay,
            tau: 10.0,
            epsilon: 1e-6,
            weights: PayoffWeights::default(),
            initial_ceilings: MetricCeilings::default(),
        }
    }
}

/// Central configuration for one optimization run.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Human-readable config / release version.
    pub version: &'static str,
    /// Ordered approach list; index order is the deterministic
    /// iteration order everywhere (metrics, payoffs, mutation draws).
    pub approaches: Vec<ApproachConfig>,
    /// Lower green-time bound in seconds (inclusive).
    pub min_green_s: u32,
    /// Upper green-time bound in seconds (inclusive).
    pub max_green_s: u32,
    /// Green time every approach starts the run with.
    pub initial_green_s: u32,
    /// Simulation steps per episode (one step = one second).
    pub episode_steps: u64,
    /// Number of generations after the baseline.
    pub num_generations: u32,
    /// Whether to evaluate generation 0 with the initial strategy
    /// before any update. Failures during the baseline abort the run.
    pub baseline_enabled: bool,
    pub evolve: EvolveConfig,
    pub payoff: PayoffConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            version: "v0.3.1-weighted-queue",
            approaches: default_approaches(),
            min_green_s: 10,
            max_green_s: 60,
            initial_green_s: 30,
            episode_steps: 3600,
            num_generations: 20,
            baseline_enabled: true,
            evolve: EvolveConfig {
                payoff_scale_k: 8,
                mutation_rate: 0.2,
                mutation_step: 5,
                mutation_zero_allowed: false,
            },
            payoff: PayoffConfig::default(),
        }
    }
}

/// The validated approach/edge mapping for the reference intersection.
fn default_approaches() -> Vec<ApproachConfig> {
    vec![
        ApproachConfig::new("west", &["15491645#0"]),
        ApproachConfig::new("south", &["142049043#0"]),
        ApproachConfig::new("north", &["141821921#1"]),
        ApproachConfig::new("east", &["143870423"]),
    ]
}

/// Coarse tuning preset used by the CLI / batch harness.
///
/// Profiles only tweak the evolution and payoff knobs on top of the
/// default (which we treat as "Balanced").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TuningProfile {
    /// Small proportional steps, rare zero-inclusive mutation,
    /// inverse-delay payoff.
    Gentle,
    /// Aggressive scaling with large non-zero mutations and the
    /// exponential-decay payoff.
    Balanced,
    /// Balanced scaling plus the full multi-metric payoff with
    /// per-step queue sampling.
    Thorough,
}

impl TuningProfile {
    /// Return a stable lowercase name for the profile (used in logs).
    pub fn as_str(&self) -> &'static str {
        match self {
            TuningProfile::Gentle => "gentle",
            TuningProfile::Balanced => "balanced",
            TuningProfile::Thorough => "thorough",
        }
    }

    /// Parse a profile name (case-insensitive). Returns None if unrecognized.
    pub fn parse(s: &str) -> Option<TuningProfile> {
        match s.trim().to_ascii_lowercase().as_str() {
            "balanced" | "bal" | "b" => Some(TuningProfile::Balanced),
            "gentle" | "g" | "soft" => Some(TuningProfile::Gentle),
            "thorough" | "t" | "rich" => Some(TuningProfile::Thorough),
            _ => None,
        }
    }
}

/// Source of the effective tuning profile (for logging precedence).
///
/// Precedence order (highest to lowest):
/// 1. CLI argument (--profile)
/// 2. Environment variable (GREENWAVE_TUNING_PROFILE)
/// 3. Default (Balanced)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileSource {
    Cli,
    Env,
    Default,
}

impl ProfileSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileSource::Cli => "cli",
            ProfileSource::Env => "env",
            ProfileSource::Default => "default",
        }
    }
}

/// Resolved profile with its source for logging.
#[derive(Debug, Clone, Copy)]
pub struct EffectiveProfile {
    pub profile: TuningProfile,
    pub source: ProfileSource,
}

impl EffectiveProfile {
    /// Log the effective profile at startup (stderr).
    pub fn log_startup(&self) {
        eprintln!(
            "effective_tuning_profile={} source={}",
            self.profile.as_str(),
            self.source.as_str()
        );
    }
}

/// Resolve the effective tuning profile using standard precedence:
/// CLI > `GREENWAVE_TUNING_PROFILE` > default Balanced.
pub fn resolve_effective_profile(cli_profile: Option<TuningProfile>) -> EffectiveProfile {
    if let Some(p) = cli_profile {
        return EffectiveProfile {
            profile: p,
            source: ProfileSource::Cli,
        };
    }

    if let Ok(env_val) = env::var("GREENWAVE_TUNING_PROFILE") {
        if let Some(p) = TuningProfile::parse(&env_val) {
            return EffectiveProfile {
                profile: p,
                source: ProfileSource::Env,
            };
        }
        eprintln!(
            "[config] WARN: unrecognized GREENWAVE_TUNING_PROFILE = {:?}; using default balanced",
            env_val
        );
    }

    EffectiveProfile {
        profile: TuningProfile::Balanced,
        source: ProfileSource::Default,
    }
}

// --- Runtime config loader: profiles + env overrides -------------------------

impl Config {
    /// Build a Config using a given tuning profile on top of the
    /// defaults. `Config::default()` is the Balanced centre; other
    /// profiles only adjust a small set of knobs.
    pub fn for_profile(profile: TuningProfile) -> Self {
        let mut cfg = Config::default();

        match profile {
            TuningProfile::Balanced => {
                // Default centre: aggressive scaling, exp-decay payoff.
            }

            TuningProfile::Gentle => {
                cfg.evolve.payoff_scale_k = 2;
                cfg.evolve.mutation_rate = 0.1;
                cfg.evolve.mutation_step = 2;
                cfg.evolve.mutation_zero_allowed = true;
                cfg.payoff.model = PayoffModel::InverseDelay;
                cfg.num_generations = 10;
            }

            TuningProfile::Thorough => {
                cfg.evolve.mutation_rate = 0.1;
                cfg.evolve.mutation_step = 3;
                cfg.payoff.model = PayoffModel::WeightedMultiMetric;
            }
        }

        cfg
    }

    /// Build a Config from a profile, then apply environment overrides.
    ///
    /// Recognized variables:
    ///
    ///   - GREENWAVE_GENERATIONS     (u32)
    ///   - GREENWAVE_EPISODE_STEPS   (u64)
    ///   - GREENWAVE_PAYOFF_SCALE    (u32, the K constant)
    ///   - GREENWAVE_MUTATION_RATE   (f64 in [0, 1])
    ///   - GREENWAVE_MUTATION_STEP   (u32, seconds)
    ///   - GREENWAVE_MIN_GREEN       (u32, seconds)
    ///   - GREENWAVE_MAX_GREEN       (u32, seconds)
    ///   - GREENWAVE_WEIGHT_DELAY    (f64 >= 0)
    ///   - GREENWAVE_WEIGHT_THROUGHPUT (f64 >= 0)
    ///   - GREENWAVE_WEIGHT_QUEUE    (f64 >= 0)
    ///   - GREENWAVE_PAYOFF_MODEL    (inverse_delay | exp_decay | weighted)
    ///
    /// Any variable that fails to parse is ignored with a warning.
    pub fn from_env_or_profile(profile: TuningProfile) -> Self {
        let mut cfg = Config::for_profile(profile);

        if let Ok(raw) = env::var("GREENWAVE_GENERATIONS") {
            match raw.parse::<u32>() {
                Ok(v) => {
                    cfg.num_generations = v;
                    eprintln!("[config] GREENWAVE_GENERATIONS = {v} (overrode default)");
                }
                Err(_) => eprintln!(
                    "[config] WARN: could not parse GREENWAVE_GENERATIONS = {:?} as u32; using default {}",
                    raw, cfg.num_generations
                ),
            }
        }

        if let Ok(raw) = env::var("GREENWAVE_EPISODE_STEPS") {
            match raw.parse::<u64>() {
                Ok(v) => {
                    cfg.episode_steps = v;
                    eprintln!("[config] GREENWAVE_EPISODE_STEPS = {v} (overrode default)");
                }
                Err(_) => eprintln!(
                    "[config] WARN: could not parse GREENWAVE_EPISODE_STEPS = {:?} as u64; using default {}",
                    raw, cfg.episode_steps
                ),
            }
        }

        if let Ok(raw) = env::var("GREENWAVE_PAYOFF_SCALE") {
            match raw.parse::<u32>() {
                Ok(v) => {
                    cfg.evolve.payoff_scale_k = v;
                    eprintln!("[config] GREENWAVE_PAYOFF_SCALE = {v} (overrode default)");
                }
                Err(_) => eprintln!(
                    "[config] WARN: could not parse GREENWAVE_PAYOFF_SCALE = {:?} as u32; using default {}",
                    raw, cfg.evolve.payoff_scale_k
                ),
            }
        }

        if let Ok(raw) = env::var("GREENWAVE_MUTATION_RATE") {
            match raw.parse::<f64>() {
                Ok(v) => {
                    cfg.evolve.mutation_rate = v.clamp(0.0, 1.0);
                    eprintln!(
                        "[config] GREENWAVE_MUTATION_RATE = {} (overrode default)",
                        cfg.evolve.mutation_rate
                    );
                }
                Err(_) => eprintln!(
                    "[config] WARN: could not parse GREENWAVE_MUTATION_RATE = {:?} as f64; using default {}",
                    raw, cfg.evolve.mutation_rate
                ),
            }
        }

        if let Ok(raw) = env::var("GREENWAVE_MUTATION_STEP") {
            match raw.parse::<u32>() {
                Ok(v) => {
                    cfg.evolve.mutation_step = v;
                    eprintln!("[config] GREENWAVE_MUTATION_STEP = {v} (overrode default)");
                }
                Err(_) => eprintln!(
                    "[config] WARN: could not parse GREENWAVE_MUTATION_STEP = {:?} as u32; using default {}",
                    raw, cfg.evolve.mutation_step
                ),
            }
        }

        if let Ok(raw) = env::var("GREENWAVE_MIN_GREEN") {
            match raw.parse::<u32>() {
                Ok(v) => {
                    cfg.min_green_s = v;
                    eprintln!("[config] GREENWAVE_MIN_GREEN = {v} (overrode default)");
                }
                Err(_) => eprintln!(
                    "[config] WARN: could not parse GREENWAVE_MIN_GREEN = {:?} as u32; using default {}",
                    raw, cfg.min_green_s
                ),
            }
        }

        if let Ok(raw) = env::var("GREENWAVE_MAX_GREEN") {
            match raw.parse::<u32>() {
                Ok(v) => {
                    cfg.max_green_s = v;
                    eprintln!("[config] GREENWAVE_MAX_GREEN = {v} (overrode default)");
                }
                Err(_) => eprintln!(
                    "[config] WARN: could not parse GREENWAVE_MAX_GREEN = {:?} as u32; using default {}",
                    raw, cfg.max_green_s
                ),
            }
        }

        if let Ok(raw) = env::var("GREENWAVE_WEIGHT_DELAY") {
            match raw.parse::<f64>() {
                Ok(v) if v.is_finite() && v >= 0.0 => {
                    cfg.payoff.weights.delay = v;
                    eprintln!("[config] GREENWAVE_WEIGHT_DELAY = {v} (overrode default)");
                }
                _ => eprintln!(
                    "[config] WARN: could not parse GREENWAVE_WEIGHT_DELAY = {:?} as non-negative f64; using default {}",
                    raw, cfg.payoff.weights.delay
                ),
            }
        }

        if let Ok(raw) = env::var("GREENWAVE_WEIGHT_THROUGHPUT") {
            match raw.parse::<f64>() {
                Ok(v) if v.is_finite() && v >= 0.0 => {
                    cfg.payoff.weights.throughput = v;
                    eprintln!("[config] GREENWAVE_WEIGHT_THROUGHPUT = {v} (overrode default)");
                }
                _ => eprintln!(
                    "[config] WARN: could not parse GREENWAVE_WEIGHT_THROUGHPUT = {:?} as non-negative f64; using default {}",
                    raw, cfg.payoff.weights.throughput
                ),
            }
        }

        if let Ok(raw) = env::var("GREENWAVE_WEIGHT_QUEUE") {
            match raw.parse::<f64>() {
                Ok(v) if v.is_finite() && v >= 0.0 => {
                    cfg.payoff.weights.queue = v;
                    eprintln!("[config] GREENWAVE_WEIGHT_QUEUE = {v} (overrode default)");
                }
                _ => eprintln!(
                    "[config] WARN: could not parse GREENWAVE_WEIGHT_QUEUE = {:?} as non-negative f64; using default {}",
                    raw, cfg.payoff.weights.queue
                ),
            }
        }

        if let Ok(raw) = env::var("GREENWAVE_PAYOFF_MODEL") {
            match PayoffModel::parse(&raw) {
                Some(m) => {
                    cfg.payoff.model = m;
                    eprintln!(
                        "[config] GREENWAVE_PAYOFF_MODEL = {} (overrode default)",
                        m.as_str()
                    );
                }
                None => eprintln!(
                    "[config] WARN: unrecognized GREENWAVE_PAYOFF_MODEL = {:?}; using default {}",
                    raw,
                    cfg.payoff.model.as_str()
                ),
            }
        }

        cfg
    }

    /// Number of configured approaches.
    pub fn num_approaches(&self) -> usize {
        self.approaches.len()
    }

    /// Whether the selected payoff model needs per-step queue samples.
    pub fn sample_queues(&self) -> bool {
        self.payoff.model == PayoffModel::WeightedMultiMetric
    }
}
