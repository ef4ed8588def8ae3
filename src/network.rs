// src/network.rs
//
// Signal-program description + the store that derives per-generation
// programs from it.
//
// The store holds one immutable base description (the analogue of the
// intersection's network file). Every generation's program is rendered
// fresh from that base with the current strategy's green durations,
// never from the previous generation's rendered copy, and the base is
// never mutated in place.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::config::ApproachConfig;
use crate::strategy::Strategy;

/// Current network description schema version.
pub const NETWORK_SCHEMA_VERSION: u32 = 1;

/// One phase of the fixed-time signal program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseSpec {
    /// Phase duration in seconds.
    pub duration_s: u32,
    /// Name of the approach this phase serves green, or None for an
    /// interphase (yellow / all-red). Only green phases are retimed.
    #[serde(default)]
    pub green_for: Option<String>,
}

/// Declarative description of the intersection's signal program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkDescription {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    /// Traffic-light system id in the simulator network.
    pub tls_id: String,
    /// Ordered phase list; green phases interleaved with interphases.
    pub phases: Vec<PhaseSpec>,
}

fn default_schema_version() -> u32 {
    NETWORK_SCHEMA_VERSION
}

impl NetworkDescription {
    /// Load a description from a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, NetworkError> {
        let contents = fs::read_to_string(path.as_ref()).map_err(|e| NetworkError::Io {
            path: path.as_ref().display().to_string(),
            source: e.to_string(),
        })?;
        Self::from_yaml_str(&contents)
    }

    /// Parse a description from a YAML string.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, NetworkError> {
        let desc: NetworkDescription =
            serde_yaml::from_str(yaml).map_err(|e| NetworkError::Parse {
                source: e.to_string(),
            })?;
        Ok(desc)
    }

    /// Default four-approach program: one green phase per approach with
    /// a 3-second interphase after each, signal id `J0`.
    pub fn default_program(approaches: &[ApproachConfig], initial_green_s: u32) -> Self {
        let mut phases = Vec::with_capacity(approaches.len() * 2);
        for a in approaches {
            phases.push(PhaseSpec {
                duration_s: initial_green_s,
                green_for: Some(a.name.clone()),
            });
            phases.push(PhaseSpec {
                duration_s: 3,
                green_for: None,
            });
        }

        Self {
            schema_version: NETWORK_SCHEMA_VERSION,
            tls_id: "J0".to_string(),
            phases,
        }
    }

    /// Validate the description against the configured approaches:
    /// every approach must have exactly one green phase, and every
    /// green phase must name a configured approach.
    pub fn validate(&self, approaches: &[ApproachConfig]) -> Result<(), NetworkError> {
        if self.phases.is_empty() {
            return Err(NetworkError::Validation {
                field: "phases".to_string(),
                message: "signal program has no phases".to_string(),
            });
        }

        for phase in &self.phases {
            if let Some(name) = &phase.green_for {
                if !approaches.iter().any(|a| &a.name == name) {
                    return Err(NetworkError::Validation {
                        field: "phases.green_for".to_string(),
                        message: format!("unknown approach '{name}'"),
                    });
                }
            }
        }

        for a in approaches {
            let count = self
                .phases
                .iter()
                .filter(|p| p.green_for.as_deref() == Some(a.name.as_str()))
                .count();
            if count != 1 {
                return Err(NetworkError::Validation {
                    field: "phases".to_string(),
                    message: format!(
                        "approach '{}' must have exactly one green phase, found {count}",
                        a.name
                    ),
                });
            }
        }

        Ok(())
    }

    /// Total cycle length in seconds.
    pub fn cycle_s(&self) -> u32 {
        self.phases.iter().map(|p| p.duration_s).sum()
    }

    /// Green duration for the named approach, if it has a green phase.
    pub fn green_for(&self, approach: &str) -> Option<u32> {
        self.phases
            .iter()
            .find(|p| p.green_for.as_deref() == Some(approach))
            .map(|p| p.duration_s)
    }
}

/// Store that renders per-generation signal programs.
///
/// Owns the validated base description; `render` always derives from
/// it, so rendering is idempotent per generation.
#[derive(Debug, Clone)]
pub struct NetworkStore {
    base: NetworkDescription,
}

impl NetworkStore {
    pub fn new(
        base: NetworkDescription,
        approaches: &[ApproachConfig],
    ) -> Result<Self, NetworkError> {
        base.validate(approaches)?;
        Ok(Self { base })
    }

    pub fn base(&self) -> &NetworkDescription {
        &self.base
    }

    /// Derive the program for one generation: the base description with
    /// each approach's green phase set to the strategy's duration.
    pub fn render(&self, strategy: &Strategy, approaches: &[ApproachConfig]) -> NetworkDescription {
        let mut rendered = self.base.clone();

        for phase in &mut rendered.phases {
            if let Some(name) = &phase.green_for {
                if let Some(idx) = approaches.iter().position(|a| &a.name == name) {
                    phase.duration_s = strategy.green_s(idx);
                }
            }
        }

        rendered
    }
}

/// Errors from loading or validating a network description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    Io { path: String, source: String },
    Parse { source: String },
    Validation { field: String, message: String },
}

impl std::fmt::Display for NetworkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetworkError::Io { path, source } => {
                write!(f, "Failed to read network file '{}': {}", path, source)
            }
            NetworkError::Parse { source } => {
                write!(f, "Failed to parse network YAML: {}", source)
            }
            NetworkError::Validation { field, message } => {
                write!(f, "Network validation error in '{}': {}", field, message)
            }
        }
    }
}

impl std::error::Error for NetworkError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn default_program_validates_and_covers_every_approach() {
        let cfg = Config::default();
        let desc = NetworkDescription::default_program(&cfg.approaches, cfg.initial_green_s);

        assert!(desc.validate(&cfg.approaches).is_ok());
        assert_eq!(desc.phases.len(), 8);
        for a in &cfg.approaches {
            assert_eq!(desc.green_for(&a.name), Some(30));
        }
        // 4 greens of 30s + 4 interphases of 3s.
        assert_eq!(desc.cycle_s(), 132);
    }

    #[test]
    fn render_updates_greens_and_leaves_base_untouched() {
        let cfg = Config::default();
        let base = NetworkDescription::default_program(&cfg.approaches, cfg.initial_green_s);
        let store = NetworkStore::new(base.clone(), &cfg.approaches).unwrap();

        let strategy = Strategy::from_greens(&cfg, &[45, 20, 25, 10]);
        let rendered = store.render(&strategy, &cfg.approaches);

        assert_eq!(rendered.green_for("west"), Some(45));
        assert_eq!(rendered.green_for("south"), Some(20));
        assert_eq!(rendered.green_for("north"), Some(25));
        assert_eq!(rendered.green_for("east"), Some(10));

        // Interphases untouched, base unchanged.
        assert_eq!(rendered.phases[1].duration_s, 3);
        assert_eq!(store.base(), &base);
    }

    #[test]
    fn render_is_idempotent_per_generation() {
        // Always derived from the base, never from a prior render.
        let cfg = Config::default();
        let base = NetworkDescription::default_program(&cfg.approaches, cfg.initial_green_s);
        let store = NetworkStore::new(base, &cfg.approaches).unwrap();

        let s1 = Strategy::from_greens(&cfg, &[60, 60, 60, 60]);
        let s2 = Strategy::from_greens(&cfg, &[15, 15, 15, 15]);

        let _ = store.render(&s1, &cfg.approaches);
        let r2a = store.render(&s2, &cfg.approaches);
        let r2b = store.render(&s2, &cfg.approaches);
        assert_eq!(r2a, r2b);
    }

    #[test]
    fn validation_rejects_unknown_and_duplicate_approaches() {
        let cfg = Config::default();

        let mut desc = NetworkDescription::default_program(&cfg.approaches, 30);
        desc.phases[0].green_for = Some("northwest".to_string());
        assert!(matches!(
            desc.validate(&cfg.approaches),
            Err(NetworkError::Validation { .. })
        ));

        let mut dup = NetworkDescription::default_program(&cfg.approaches, 30);
        dup.phases[1].green_for = Some("west".to_string());
        assert!(dup.validate(&cfg.approaches).is_err());
    }

    #[test]
    fn yaml_roundtrip_preserves_the_program() {
        let yaml = "\
tls_id: J0
phases:
  - duration_s: 30
    green_for: west
  - duration_s: 3
  - duration_s: 30
    green_for: east
";
        let desc = NetworkDescription::from_yaml_str(yaml).unwrap();
        assert_eq!(desc.schema_version, NETWORK_SCHEMA_VERSION);
        assert_eq!(desc.tls_id, "J0");
        assert_eq!(desc.phases.len(), 3);
        assert_eq!(desc.green_for("west"), Some(30));
        assert_eq!(desc.phases[1].green_for, None);
    }

    #[test]
    fn malformed_yaml_is_a_parse_error() {
        let err = NetworkDescription::from_yaml_str(": not yaml").unwrap_err();
        assert!(matches!(err, NetworkError::Parse { .. }));
    }
}
