// src/types.rs
//
// Common shared types for the Greenwave tuner.

use serde::{Deserialize, Serialize};

/// Simulation step index within one episode (one step = one second).
pub type SimStep = u64;

/// One completed vehicle trip reported by the simulation oracle.
///
/// Only the fields the tuner consumes are modelled; the oracle's native
/// trip report carries far more.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripRecord {
    /// Seconds the vehicle lost to congestion over its whole trip (>= 0).
    pub time_loss_s: f64,
    /// Lane the vehicle departed on, e.g. `"143870423_0"`.
    pub depart_lane: String,
}

impl TripRecord {
    pub fn new(time_loss_s: f64, depart_lane: impl Into<String>) -> Self {
        Self {
            time_loss_s,
            depart_lane: depart_lane.into(),
        }
    }
}

/// Instantaneous halting-vehicle count on a single simulator lane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneQueue {
    /// Simulator lane id, e.g. `"15491645#0_1"`.
    pub lane: String,
    /// Vehicles currently halted on the lane.
    pub halting: u32,
}

/// Extract the edge portion of a lane id: the substring before the
/// first lane-index separator (`"143870423_0"` -> `"143870423"`).
///
/// Lane ids without a separator are returned unchanged.
pub fn edge_of_lane(lane: &str) -> &str {
    match lane.find('_') {
        Some(idx) => &lane[..idx],
        None => lane,
    }
}

/// True if `lane` belongs to `edge` (exact edge match after stripping
/// the lane-index suffix).
pub fn lane_on_edge(lane: &str, edge: &str) -> bool {
    edge_of_lane(lane) == edge
}
