// src/payoff.rs
//
// Payoff computation: per-approach scalar fitness derived from the
// current generation's metrics. Three models run through one engine;
// the model is a configuration variant, not a separate code path.
//
// The weighted model is the only stateful one: it normalizes each
// metric against a running observed maximum that never decreases
// across generations.

use crate::config::{MetricCeilings, PayoffConfig, PayoffModel};
use crate::metrics::ApproachMetrics;

/// Payoff engine for one optimization run.
///
/// For `InverseDelay` and `ExpDecay` the engine is memoryless; for
/// `WeightedMultiMetric` it carries the running normalization ceilings.
#[derive(Debug, Clone)]
pub struct PayoffEngine {
    model: PayoffModel,
    tau: f64,
    epsilon: f64,
    w_delay: f64,
    w_throughput: f64,
    w_queue: f64,
    /// Running observed maxima; monotonically non-decreasing.
    max_seen: MetricCeilings,
}

impl PayoffEngine {
    pub fn new(cfg: &PayoffConfig) -> Self {
        Self {
            model: cfg.model,
            tau: cfg.tau,
            epsilon: cfg.epsilon,
            w_delay: cfg.weights.delay,
            w_throughput: cfg.weights.throughput,
            w_queue: cfg.weights.queue,
            max_seen: cfg.initial_ceilings,
        }
    }

    pub fn model(&self) -> PayoffModel {
        self.model
    }

    /// Current normalization ceilings (weighted model only).
    pub fn ceilings(&self) -> MetricCeilings {
        self.max_seen
    }

    /// Compute per-approach payoffs for the current generation.
    ///
    /// Always finite and >= 0. A zero-vehicle approach has mean delay 0
    /// and therefore receives the "no congestion" maximal reward under
    /// the delay-only models.
    pub fn compute(&mut self, metrics: &[ApproachMetrics]) -> Vec<f64> {
        self.observe(metrics);
        metrics.iter().map(|m| self.payoff_for(m)).collect()
    }

    /// Feed a generation's metrics into the running ceilings without
    /// computing payoffs (used for the baseline episode). No-op for
    /// the memoryless models.
    pub fn observe(&mut self, metrics: &[ApproachMetrics]) {
        if self.model == PayoffModel::WeightedMultiMetric {
            self.raise_ceilings(metrics);
        }
    }

    fn payoff_for(&self, m: &ApproachMetrics) -> f64 {
        match self.model {
            PayoffModel::InverseDelay => 1.0 / (m.mean_delay_s.max(0.0) + self.epsilon),
            PayoffModel::ExpDecay => (-m.mean_delay_s.max(0.0) / self.tau).exp(),
            PayoffModel::WeightedMultiMetric => {
                // Ceilings start positive and only grow, so the
                // divisions are safe.
                let delay_norm = (m.mean_delay_s / self.max_seen.delay).clamp(0.0, 1.0);
                let tp_norm = ((m.throughput as f64) / self.max_seen.throughput).clamp(0.0, 1.0);
                let queue_norm = ((m.max_queue as f64) / self.max_seen.queue).clamp(0.0, 1.0);

                // Sign convention: throughput rewards, delay and queue
                // penalize.
                let score = self.w_delay * (1.0 - delay_norm)
                    + self.w_throughput * tp_norm
                    + self.w_queue * (1.0 - queue_norm);

                score.max(0.0)
            }
        }
    }

    /// Raise the running ceilings from this generation's observations.
    /// Ceilings never decrease.
    fn raise_ceilings(&mut self, metrics: &[ApproachMetrics]) {
        for m in metrics {
            if m.max_delay_s.is_finite() {
                self.max_seen.delay = self.max_seen.delay.max(m.max_delay_s);
            }
            self.max_seen.throughput = self.max_seen.throughput.max(m.throughput as f64);
            self.max_seen.queue = self.max_seen.queue.max(m.max_queue as f64);
        }
    }
}
