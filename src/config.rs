// Roel Kluin, 2023, GPL v3

use crate::error::{GraphError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const TRACE_ENV: &str = "TRACE_GRAPH_EVENTS";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub k: usize,
    pub vertex_bias: u64,
    pub edge_bias: u64,
    pub initial_capacity: usize,
    pub max_capacity: usize,
    /// Log every event, as `TRACE_GRAPH_EVENTS` does in debug builds.
    pub trace_events: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        GraphConfig {
            k: 21,
            vertex_bias: 0,
            edge_bias: 1 << 40,
            initial_capacity: 1024,
            max_capacity: 1 << 40,
            trace_events: false,
        }
    }
}

impl GraphConfig {
    pub fn with_k(k: usize) -> Self {
        GraphConfig {
            k,
            ..Default::default()
        }
    }
    pub fn validate(&self) -> Result<()> {
        let bad = |msg: String| Err(GraphError::PreconditionViolated(msg));
        if self.k == 0 {
            return bad("k must be positive".into());
        }
        if self.max_capacity == 0 {
            return bad("max_capacity must be positive".into());
        }
        let span = self.max_capacity as u64;
        let (lo, hi) = if self.vertex_bias <= self.edge_bias {
            (self.vertex_bias, self.edge_bias)
        } else {
            (self.edge_bias, self.vertex_bias)
        };
        if lo.checked_add(span).map_or(true, |end| end > hi) || hi.checked_add(span).is_none() {
            return bad(format!(
                "id ranges [{}, +{span}) and [{}, +{span}) overlap or overflow",
                self.vertex_bias, self.edge_bias
            ));
        }
        Ok(())
    }
    pub fn trace_enabled(&self) -> bool {
        self.trace_events || (cfg!(debug_assertions) && std::env::var_os(TRACE_ENV).is_some())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TipClipperConfig {
    /// In k-mers.
    pub max_tip_length: usize,
    pub max_coverage: f64,
    pub max_relative_coverage: f64,
}

impl Default for TipClipperConfig {
    fn default() -> Self {
        TipClipperConfig {
            max_tip_length: 100,
            max_coverage: 1000.0,
            max_relative_coverage: 1.2,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BulgeRemoverConfig {
    pub max_length_div_k: usize,
    pub max_coverage: f64,
    pub max_relative_coverage: f64,
    pub max_delta: usize,
    pub max_relative_delta: f64,
}

impl Default for BulgeRemoverConfig {
    fn default() -> Self {
        BulgeRemoverConfig {
            max_length_div_k: 3,
            max_coverage: 1000.0,
            max_relative_coverage: 1.2,
            max_delta: 3,
            max_relative_delta: 0.1,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimplificationConfig {
    pub tip_clipper: TipClipperConfig,
    pub bulge_remover: BulgeRemoverConfig,
    /// Rounds of tip clipping and bulge removal.
    pub cycles: usize,
}

impl Default for SimplificationConfig {
    fn default() -> Self {
        SimplificationConfig {
            tip_clipper: TipClipperConfig::default(),
            bulge_remover: BulgeRemoverConfig::default(),
            cycles: 3,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblyConfig {
    pub graph: GraphConfig,
    pub simplification: SimplificationConfig,
    pub threads: usize,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        AssemblyConfig {
            graph: GraphConfig::default(),
            simplification: SimplificationConfig::default(),
            threads: 8,
        }
    }
}

impl AssemblyConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: AssemblyConfig = toml::from_str(text)?;
        config.graph.validate()?;
        Ok(config)
    }
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_toml(&fs::read_to_string(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AssemblyConfig::default();
        config.graph.validate().unwrap();
        assert_eq!(config.graph.k, 21);
        assert_eq!(config.simplification.tip_clipper.max_tip_length, 100);
        assert_eq!(config.simplification.bulge_remover.max_delta, 3);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = AssemblyConfig::from_toml(
            "threads = 2\n[graph]\nk = 31\n[simplification.bulge_remover]\nmax_delta = 5\n",
        )
        .unwrap();
        assert_eq!(config.threads, 2);
        assert_eq!(config.graph.k, 31);
        assert_eq!(config.graph.edge_bias, 1 << 40);
        assert_eq!(config.simplification.bulge_remover.max_delta, 5);
        assert_eq!(config.simplification.bulge_remover.max_length_div_k, 3);
    }

    #[test]
    fn rejects_overlapping_ranges() {
        let config = GraphConfig {
            vertex_bias: 0,
            edge_bias: 100,
            max_capacity: 1_000,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert!(GraphConfig::with_k(0).validate().is_err());
        assert!(matches!(
            AssemblyConfig::from_toml("[graph]\nk = \"x\"\n"),
            Err(GraphError::Config(_))
        ));
    }

    #[test]
    fn trace_env_registers_event_log() {
        std::env::set_var(TRACE_ENV, "1");
        let config = GraphConfig::with_k(3);
        let enabled = config.trace_enabled();
        let graph = crate::graph::Graph::new(&config).unwrap();
        std::env::remove_var(TRACE_ENV);

        // the variable is only honored in debug builds
        assert_eq!(enabled, cfg!(debug_assertions));
        assert_eq!(
            graph.handlers().names() == vec!["event_log"],
            cfg!(debug_assertions)
        );
        assert!(!config.trace_events);
    }
}
