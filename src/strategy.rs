// src/strategy.rs
//
// Strategy representation: the per-approach green-phase allocation.
//
// The Strategy is the single mutable piece of state threaded through
// the generation loop. The Optimizer owns it exclusively; everything
// else sees it by reference. There are no ambient globals.

use serde::{Deserialize, Serialize};

use crate::config::Config;

/// Per-approach green-phase durations in whole seconds, parallel to
/// `Config::approaches`.
///
/// Invariant: every duration lies in `[min_green_s, max_green_s]`
/// at every generation boundary. The constructors and `apply_deltas`
/// re-establish it; `is_within_bounds` checks it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Strategy {
    greens: Vec<u32>,
}

impl Strategy {
    /// Uniform initial allocation, clamped into the configured bounds.
    pub fn initial(cfg: &Config) -> Self {
        let green = cfg.initial_green_s.clamp(cfg.min_green_s, cfg.max_green_s);
        Self {
            greens: vec![green; cfg.num_approaches()],
        }
    }

    /// Build from explicit per-approach values (tests / harnesses).
    /// Values are clamped into the configured bounds.
    pub fn from_greens(cfg: &Config, greens: &[u32]) -> Self {
        Self {
            greens: greens
                .iter()
                .map(|&g| g.clamp(cfg.min_green_s, cfg.max_green_s))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.greens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.greens.is_empty()
    }

    /// Green seconds for approach `idx`.
    pub fn green_s(&self, idx: usize) -> u32 {
        self.greens[idx]
    }

    pub fn greens(&self) -> &[u32] {
        &self.greens
    }

    /// Apply per-approach signed deltas, clamping each result into the
    /// configured bounds. Returns the new strategy; `self` is untouched.
    pub fn apply_deltas(&self, cfg: &Config, deltas: &[i64]) -> Strategy {
        debug_assert_eq!(deltas.len(), self.greens.len());

        let greens = self
            .greens
            .iter()
            .zip(deltas.iter())
            .map(|(&g, &d)| clamp_green(cfg, g as i64 + d))
            .collect();

        Strategy { greens }
    }

    /// True if every duration lies within the configured bounds.
    pub fn is_within_bounds(&self, cfg: &Config) -> bool {
        self.greens
            .iter()
            .all(|&g| g >= cfg.min_green_s && g <= cfg.max_green_s)
    }
}

/// Clamp a candidate green duration into `[min_green_s, max_green_s]`.
pub fn clamp_green(cfg: &Config, candidate_s: i64) -> u32 {
    candidate_s.clamp(cfg.min_green_s as i64, cfg.max_green_s as i64) as u32
}

/// Per-approach adjustment record for one generation: the pre-clamp
/// deltas applied to the green time, split into the replicator part
/// and the mutation part.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyAdjustment {
    /// `floor(K * payoff_share)`; zero when the division guard fired.
    pub proportional: i64,
    /// Mutation delta, if the mutation triggered this generation.
    pub mutation: i64,
}

impl StrategyAdjustment {
    /// Total pre-clamp delta.
    pub fn total(&self) -> i64 {
        self.proportional + self.mutation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn initial_strategy_is_uniform_and_in_bounds() {
        let cfg = Config::default();
        let s = Strategy::initial(&cfg);
        assert_eq!(s.len(), 4);
        assert!(s.greens().iter().all(|&g| g == 30));
        assert!(s.is_within_bounds(&cfg));
    }

    #[test]
    fn clamp_green_saturates_at_both_bounds() {
        let cfg = Config::default();
        assert_eq!(clamp_green(&cfg, 63), 60);
        assert_eq!(clamp_green(&cfg, 7), 10);
        assert_eq!(clamp_green(&cfg, 35), 35);
        // Duration 58 receiving a +5 mutation clamps to 60, not 63.
        assert_eq!(clamp_green(&cfg, 58 + 5), 60);
    }

    #[test]
    fn apply_deltas_clamps_per_approach() {
        let cfg = Config::default();
        let s = Strategy::from_greens(&cfg, &[58, 12, 30, 30]);
        let out = s.apply_deltas(&cfg, &[5, -5, 0, 100]);
        assert_eq!(out.greens(), &[60, 10, 30, 60]);
        assert!(out.is_within_bounds(&cfg));
        // Source strategy untouched.
        assert_eq!(s.greens(), &[58, 12, 30, 30]);
    }

    #[test]
    fn from_greens_clamps_out_of_range_inputs() {
        let cfg = Config::default();
        let s = Strategy::from_greens(&cfg, &[5, 70, 30, 30]);
        assert_eq!(s.greens(), &[10, 60, 30, 30]);
    }
}
