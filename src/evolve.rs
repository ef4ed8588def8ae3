// src/evolve.rs
//
// The replicator-style strategy update. Pure, deterministic given the
// supplied random source; no I/O. The optimizer calls this once per
// generation with the payoff snapshot for ALL approaches.
//
// Ordering: approaches are iterated in index order, and exactly one
// mutation-gate draw is consumed per approach, so a fixed seed always
// produces the same draw sequence.

use rand::Rng;

use crate::config::Config;
use crate::strategy::{Strategy, StrategyAdjustment};

/// Threshold below which the proportional step is skipped for the
/// whole generation (division guard). Mutation still applies.
pub const TOTAL_PAYOFF_GUARD: f64 = 1e-6;

/// Apply one generation's update to the strategy.
///
/// 1. Proportional step: each approach gains
///    `floor(K * payoff_i / total_payoff)` seconds. The term is always
///    >= 0: the rule reinforces additively rather than redistributing,
///    and relative share only shifts through clamping and mutation.
/// 2. Mutation: with independent probability `mutation_rate` per
///    approach, a delta from `{-step, 0, +step}` (or `{-step, +step}`
///    when zero is excluded).
/// 3. Clamp into `[min_green_s, max_green_s]`.
///
/// Returns the updated strategy plus the pre-clamp adjustment record
/// per approach for logging. Both are computed from the same payoff
/// snapshot; no approach sees another's updated value.
pub fn evolve_step<R: Rng>(
    cfg: &Config,
    strategy: &Strategy,
    payoffs: &[f64],
    rng: &mut R,
) -> (Strategy, Vec<StrategyAdjustment>) {
    debug_assert_eq!(strategy.len(), payoffs.len());

    let ev = &cfg.evolve;
    let total_payoff: f64 = payoffs.iter().sum();
    let proportional_enabled = total_payoff > TOTAL_PAYOFF_GUARD;

    let mut adjustments = Vec::with_capacity(strategy.len());

    for &payoff in payoffs.iter() {
        let proportional = if proportional_enabled {
            let share = payoff / total_payoff;
            ((ev.payoff_scale_k as f64) * share).floor() as i64
        } else {
            0
        };

        // One gate draw per approach, every generation, so the draw
        // sequence is independent of the payoff values.
        let gate: f64 = rng.gen();
        let mutation = if gate < ev.mutation_rate {
            draw_mutation(ev.mutation_step, ev.mutation_zero_allowed, rng)
        } else {
            0
        };

        adjustments.push(StrategyAdjustment {
            proportional,
            mutation,
        });
    }

    let deltas: Vec<i64> = adjustments.iter().map(|a| a.total()).collect();
    let next = strategy.apply_deltas(cfg, &deltas);

    debug_assert!(next.is_within_bounds(cfg));
    (next, adjustments)
}

fn draw_mutation<R: Rng>(step: u32, zero_allowed: bool, rng: &mut R) -> i64 {
    let step = step as i64;
    if zero_allowed {
        [-step, 0, step][rng.gen_range(0..3)]
    } else {
        [-step, step][rng.gen_range(0..2)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn no_mutation_cfg() -> Config {
        let mut cfg = Config::default();
        cfg.evolve.mutation_rate = 0.0;
        cfg
    }

    #[test]
    fn proportional_step_matches_floor_of_scaled_share() {
        let mut cfg = no_mutation_cfg();
        cfg.evolve.payoff_scale_k = 8;

        let strategy = Strategy::from_greens(&cfg, &[30, 30, 30, 30]);
        let payoffs = [0.5, 0.2, 0.2, 0.1];
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        let (next, adj) = evolve_step(&cfg, &strategy, &payoffs, &mut rng);

        let totals: Vec<i64> = adj.iter().map(|a| a.total()).collect();
        assert_eq!(totals, [4, 1, 1, 0]);
        assert_eq!(next.greens(), &[34, 31, 31, 30]);
    }

    #[test]
    fn sub_threshold_total_payoff_skips_proportional_step() {
        let cfg = no_mutation_cfg();
        let strategy = Strategy::from_greens(&cfg, &[25, 40, 15, 60]);
        let payoffs = [1e-9, 2e-9, 0.0, 1e-10];
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let (next, adj) = evolve_step(&cfg, &strategy, &payoffs, &mut rng);

        assert!(adj.iter().all(|a| a.proportional == 0));
        assert_eq!(next.greens(), strategy.greens());
    }

    #[test]
    fn update_uses_one_payoff_snapshot_for_all_approaches() {
        // Equal payoffs: every approach gets the same proportional gain,
        // regardless of position in the iteration order.
        let mut cfg = no_mutation_cfg();
        cfg.evolve.payoff_scale_k = 8;

        let strategy = Strategy::from_greens(&cfg, &[20, 30, 40, 50]);
        let payoffs = [0.25, 0.25, 0.25, 0.25];
        let mut rng = ChaCha8Rng::seed_from_u64(3);

        let (next, adj) = evolve_step(&cfg, &strategy, &payoffs, &mut rng);
        assert!(adj.iter().all(|a| a.proportional == 2));
        assert_eq!(next.greens(), &[22, 32, 42, 52]);
    }

    #[test]
    fn fixed_seed_reproduces_identical_updates() {
        let mut cfg = Config::default();
        cfg.evolve.mutation_rate = 0.5;

        let strategy = Strategy::from_greens(&cfg, &[30, 45, 12, 58]);
        let payoffs = [0.4, 0.1, 0.3, 0.2];

        let mut rng1 = ChaCha8Rng::seed_from_u64(42);
        let mut rng2 = ChaCha8Rng::seed_from_u64(42);

        let (next1, adj1) = evolve_step(&cfg, &strategy, &payoffs, &mut rng1);
        let (next2, adj2) = evolve_step(&cfg, &strategy, &payoffs, &mut rng2);

        assert_eq!(next1, next2);
        assert_eq!(adj1, adj2);
    }

    #[test]
    fn mutation_deltas_come_from_the_configured_set() {
        let mut cfg = Config::default();
        cfg.evolve.mutation_rate = 1.0;
        cfg.evolve.mutation_step = 5;
        cfg.evolve.mutation_zero_allowed = false;

        let strategy = Strategy::from_greens(&cfg, &[30; 4]);
        let payoffs = [0.0; 4];
        let mut rng = ChaCha8Rng::seed_from_u64(11);

        for _ in 0..50 {
            let (_, adj) = evolve_step(&cfg, &strategy, &payoffs, &mut rng);
            for a in &adj {
                assert!(a.mutation == -5 || a.mutation == 5);
            }
        }

        cfg.evolve.mutation_zero_allowed = true;
        for _ in 0..50 {
            let (_, adj) = evolve_step(&cfg, &strategy, &payoffs, &mut rng);
            for a in &adj {
                assert!(a.mutation == -5 || a.mutation == 0 || a.mutation == 5);
            }
        }
    }

    #[test]
    fn results_stay_within_bounds_under_heavy_mutation() {
        let mut cfg = Config::default();
        cfg.evolve.mutation_rate = 1.0;
        cfg.evolve.mutation_step = 7;

        let strategy = Strategy::from_greens(&cfg, &[10, 60, 58, 11]);
        let payoffs = [0.9, 0.05, 0.03, 0.02];
        let mut rng = ChaCha8Rng::seed_from_u64(5);

        for _ in 0..100 {
            let (next, _) = evolve_step(&cfg, &strategy, &payoffs, &mut rng);
            assert!(next.is_within_bounds(&cfg));
        }
    }
}
