// src/metrics.rs
//
// Metrics aggregation for one generation.
// - DelayStats: online mean/min/max (+ stddev for the batch harness).
// - QueueTracker: running mean/max over per-step queue samples.
// - aggregate_trips: attribute trip records to approaches and reduce
//   them to per-approach statistics.
//
// Everything here is recomputed fresh each generation; nothing is
// carried across episodes.

use serde::{Deserialize, Serialize};

use crate::config::ApproachConfig;
use crate::types::{lane_on_edge, LaneQueue, TripRecord};

/// Per-approach, per-generation aggregate statistics.
///
/// An approach with zero attributed records has all-zero delay
/// statistics and zero throughput; that is a defined outcome, not an
/// error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ApproachMetrics {
    pub mean_delay_s: f64,
    pub max_delay_s: f64,
    pub min_delay_s: f64,
    /// Completed trips attributed to the approach this generation.
    pub throughput: u64,
    /// Mean over sampled steps of the summed halting count across the
    /// approach's lanes. Zero when queue sampling is disabled.
    pub mean_queue: f64,
    /// Max over sampled steps of the largest single-lane halting count.
    pub max_queue: u32,
}

/// Diagnostic counters for trip attribution.
///
/// Records whose departure edge matches no configured approach are
/// silently dropped; this counter is the only place they show up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttributionCounts {
    pub attributed: u64,
    pub dropped: u64,
}

/// Online mean/min/max/variance accumulator (Welford). Non-finite
/// samples are ignored. With no samples, every accessor returns 0.
#[derive(Debug, Clone, Copy)]
pub struct DelayStats {
    n: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl Default for DelayStats {
    fn default() -> Self {
        Self {
            n: 0,
            mean: 0.0,
            m2: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }
}

impl DelayStats {
    pub fn add(&mut self, x: f64) {
        if !x.is_finite() {
            return;
        }

        self.n += 1;
        self.min = self.min.min(x);
        self.max = self.max.max(x);

        let delta = x - self.mean;
        self.mean += delta / (self.n as f64);
        let delta2 = x - self.mean;
        self.m2 += delta * delta2;
    }

    pub fn n(&self) -> u64 {
        self.n
    }

    pub fn mean(&self) -> f64 {
        if self.n == 0 {
            0.0
        } else {
            self.mean
        }
    }

    pub fn min(&self) -> f64 {
        if self.n == 0 {
            0.0
        } else {
            self.min
        }
    }

    pub fn max(&self) -> f64 {
        if self.n == 0 {
            0.0
        } else {
            self.max
        }
    }

    /// Sample standard deviation (divide by n-1).
    pub fn stddev_sample(&self) -> f64 {
        if self.n <= 1 {
            0.0
        } else {
            (self.m2 / ((self.n as f64) - 1.0)).sqrt()
        }
    }
}

/// Running queue statistics for one approach within one generation.
///
/// Each sampled step contributes:
/// - the sum of halting counts across the approach's lanes (feeds the
///   running mean), and
/// - the largest single-lane halting count (feeds the running max).
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueTracker {
    steps: u64,
    sum_of_sums: u64,
    max_single_lane: u32,
}

impl QueueTracker {
    pub fn record_step(&mut self, queue_sum: u32, max_lane: u32) {
        self.steps += 1;
        self.sum_of_sums += queue_sum as u64;
        self.max_single_lane = self.max_single_lane.max(max_lane);
    }

    pub fn mean_queue(&self) -> f64 {
        if self.steps == 0 {
            0.0
        } else {
            (self.sum_of_sums as f64) / (self.steps as f64)
        }
    }

    pub fn max_queue(&self) -> u32 {
        self.max_single_lane
    }
}

/// Reduce one step's per-lane halting counts to the (sum, max) sample
/// for an approach: lanes are matched by edge prefix against the
/// approach's edge set.
pub fn approach_queue_sample(queues: &[LaneQueue], approach: &ApproachConfig) -> (u32, u32) {
    let mut sum = 0u32;
    let mut max = 0u32;

    for q in queues {
        if approach.edges.iter().any(|e| lane_on_edge(&q.lane, e)) {
            sum = sum.saturating_add(q.halting);
            max = max.max(q.halting);
        }
    }

    (sum, max)
}

/// Attribute trip records to approaches and reduce them to delay and
/// throughput statistics. Queue fields are left at zero; the caller
/// merges `QueueTracker` results when per-step sampling is enabled.
///
/// Attribution: a record belongs to the first approach (in list order)
/// whose edge set contains the edge portion of its departure lane.
/// Unattributed records are dropped and counted.
pub fn aggregate_trips(
    trips: &[TripRecord],
    approaches: &[ApproachConfig],
) -> (Vec<ApproachMetrics>, AttributionCounts) {
    let mut stats: Vec<DelayStats> = vec![DelayStats::default(); approaches.len()];
    let mut counts = AttributionCounts::default();

    for trip in trips {
        let matched = approaches.iter().position(|a| {
            a.edges.iter().any(|e| lane_on_edge(&trip.depart_lane, e))
        });

        match matched {
            Some(idx) => {
                stats[idx].add(trip.time_loss_s.max(0.0));
                counts.attributed += 1;
            }
            None => counts.dropped += 1,
        }
    }

    let metrics = stats
        .iter()
        .map(|s| ApproachMetrics {
            mean_delay_s: s.mean(),
            max_delay_s: s.max(),
            min_delay_s: s.min(),
            throughput: s.n(),
            mean_queue: 0.0,
            max_queue: 0,
        })
        .collect();

    (metrics, counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn empty_trip_list_yields_all_zero_metrics() {
        let cfg = Config::default();
        let (metrics, counts) = aggregate_trips(&[], &cfg.approaches);

        assert_eq!(metrics.len(), 4);
        for m in &metrics {
            assert_eq!(m.mean_delay_s, 0.0);
            assert_eq!(m.max_delay_s, 0.0);
            assert_eq!(m.min_delay_s, 0.0);
            assert_eq!(m.throughput, 0);
        }
        assert_eq!(counts.attributed, 0);
        assert_eq!(counts.dropped, 0);
    }

    #[test]
    fn trip_on_east_edge_attributes_to_east_only() {
        let cfg = Config::default();
        let trips = vec![TripRecord::new(12.5, "143870423_0")];
        let (metrics, counts) = aggregate_trips(&trips, &cfg.approaches);

        // Approaches: west, south, north, east.
        assert_eq!(metrics[3].throughput, 1);
        assert_eq!(metrics[3].mean_delay_s, 12.5);
        for m in &metrics[..3] {
            assert_eq!(m.throughput, 0);
        }
        assert_eq!(counts.attributed, 1);
        assert_eq!(counts.dropped, 0);
    }

    #[test]
    fn unmatched_trips_are_dropped_and_counted() {
        let cfg = Config::default();
        let trips = vec![
            TripRecord::new(3.0, "999999_0"),
            TripRecord::new(4.0, "15491645#0_1"),
        ];
        let (metrics, counts) = aggregate_trips(&trips, &cfg.approaches);

        assert_eq!(counts.attributed, 1);
        assert_eq!(counts.dropped, 1);
        assert_eq!(metrics[0].throughput, 1); // west
    }

    #[test]
    fn delay_statistics_cover_mean_min_max() {
        let cfg = Config::default();
        let trips = vec![
            TripRecord::new(10.0, "143870423_0"),
            TripRecord::new(20.0, "143870423_1"),
            TripRecord::new(30.0, "143870423_0"),
        ];
        let (metrics, _) = aggregate_trips(&trips, &cfg.approaches);

        let east = &metrics[3];
        assert!((east.mean_delay_s - 20.0).abs() < 1e-9);
        assert_eq!(east.min_delay_s, 10.0);
        assert_eq!(east.max_delay_s, 30.0);
        assert_eq!(east.throughput, 3);
    }

    #[test]
    fn negative_time_loss_is_floored_at_zero() {
        let cfg = Config::default();
        let trips = vec![TripRecord::new(-1.0, "143870423_0")];
        let (metrics, _) = aggregate_trips(&trips, &cfg.approaches);
        assert_eq!(metrics[3].mean_delay_s, 0.0);
    }

    #[test]
    fn queue_tracker_runs_mean_and_max_over_steps() {
        let mut t = QueueTracker::default();
        t.record_step(4, 3);
        t.record_step(8, 5);
        t.record_step(0, 0);

        assert!((t.mean_queue() - 4.0).abs() < 1e-9);
        assert_eq!(t.max_queue(), 5);
    }

    #[test]
    fn queue_tracker_defaults_to_zero_without_samples() {
        let t = QueueTracker::default();
        assert_eq!(t.mean_queue(), 0.0);
        assert_eq!(t.max_queue(), 0);
    }

    #[test]
    fn approach_queue_sample_sums_matching_lanes_only() {
        let cfg = Config::default();
        let east = &cfg.approaches[3];
        let queues = vec![
            LaneQueue {
                lane: "143870423_0".to_string(),
                halting: 3,
            },
            LaneQueue {
                lane: "143870423_1".to_string(),
                halting: 7,
            },
            LaneQueue {
                lane: "15491645#0_0".to_string(),
                halting: 9,
            },
        ];

        let (sum, max) = approach_queue_sample(&queues, east);
        assert_eq!(sum, 10);
        assert_eq!(max, 7);
    }

    #[test]
    fn delay_stats_ignore_non_finite_samples() {
        let mut s = DelayStats::default();
        s.add(f64::NAN);
        s.add(f64::INFINITY);
        s.add(2.0);
        assert_eq!(s.n(), 1);
        assert_eq!(s.mean(), 2.0);
    }
}
