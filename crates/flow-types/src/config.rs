// ─────────────────────────────────────────────────────────────────────
// SCPN Flow Core — Config
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use crate::error::{FlowError, FlowResult};
use serde::{Deserialize, Serialize};

/// Top-level flow accumulation run configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowConfig {
    pub layout: LayoutConfig,
    #[serde(default)]
    pub accumulation: AccumulationConfig,
}

/// Partitioning of the grid and placement of partitions on nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Global grid shape `[rows, cols]`.
    pub grid_shape: [usize; 2],
    /// Number of partitions along `[rows, cols]`.
    #[serde(default = "default_partitions")]
    pub partitions: [usize; 2],
    /// Number of compute nodes partitions are spread over.
    #[serde(default = "default_nodes")]
    pub nodes: usize,
}

/// Tuning of the accumulation front driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccumulationConfig {
    /// Upper bound on absorb tasks running at the same time.
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,
    /// Capacity of each partition's request mailbox.
    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,
    /// Override for the number of rounds after which the run is declared
    /// non-convergent. When absent it is derived from the number of
    /// cross-partition flow edges.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round_limit: Option<usize>,
}

fn default_partitions() -> [usize; 2] {
    [1, 1]
}
fn default_nodes() -> usize {
    1
}
fn default_max_concurrent_tasks() -> usize {
    64
}
fn default_mailbox_capacity() -> usize {
    32
}

impl Default for AccumulationConfig {
    fn default() -> Self {
        AccumulationConfig {
            max_concurrent_tasks: default_max_concurrent_tasks(),
            mailbox_capacity: default_mailbox_capacity(),
            round_limit: None,
        }
    }
}

impl AccumulationConfig {
    pub fn validate(&self) -> FlowResult<()> {
        if self.max_concurrent_tasks == 0 {
            return Err(FlowError::ConfigError(
                "max_concurrent_tasks must be at least 1".to_string(),
            ));
        }
        if self.mailbox_capacity == 0 {
            return Err(FlowError::ConfigError(
                "mailbox_capacity must be at least 1".to_string(),
            ));
        }
        if self.round_limit == Some(0) {
            return Err(FlowError::ConfigError(
                "round_limit must be at least 1 when given".to_string(),
            ));
        }
        Ok(())
    }
}

impl LayoutConfig {
    pub fn validate(&self) -> FlowResult<()> {
        let [rows, cols] = self.grid_shape;
        let [prows, pcols] = self.partitions;
        if rows == 0 || cols == 0 {
            return Err(FlowError::ConfigError(format!(
                "grid_shape must be non-empty, got {rows}x{cols}"
            )));
        }
        if prows == 0 || pcols == 0 || prows > rows || pcols > cols {
            return Err(FlowError::ConfigError(format!(
                "partitions {prows}x{pcols} do not fit grid {rows}x{cols}"
            )));
        }
        if self.nodes == 0 {
            return Err(FlowError::ConfigError("nodes must be at least 1".to_string()));
        }
        Ok(())
    }
}

impl FlowConfig {
    /// Load from JSON file and validate.
    pub fn from_file(path: &str) -> FlowResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn from_json_str(contents: &str) -> FlowResult<Self> {
        let config: Self = serde_json::from_str(contents)?;
        config.layout.validate()?;
        config.accumulation.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config_uses_defaults() {
        let cfg = FlowConfig::from_json_str(r#"{ "layout": { "grid_shape": [100, 80] } }"#).unwrap();
        assert_eq!(cfg.layout.grid_shape, [100, 80]);
        assert_eq!(cfg.layout.partitions, [1, 1]);
        assert_eq!(cfg.layout.nodes, 1);
        assert_eq!(cfg.accumulation, AccumulationConfig::default());
        assert_eq!(cfg.accumulation.round_limit, None);
    }

    #[test]
    fn test_parse_full_config() {
        let json = r#"{
            "layout": { "grid_shape": [600, 400], "partitions": [6, 4], "nodes": 3 },
            "accumulation": { "max_concurrent_tasks": 8, "mailbox_capacity": 4, "round_limit": 50 }
        }"#;
        let cfg = FlowConfig::from_json_str(json).unwrap();
        assert_eq!(cfg.layout.partitions, [6, 4]);
        assert_eq!(cfg.layout.nodes, 3);
        assert_eq!(cfg.accumulation.max_concurrent_tasks, 8);
        assert_eq!(cfg.accumulation.mailbox_capacity, 4);
        assert_eq!(cfg.accumulation.round_limit, Some(50));
    }

    #[test]
    fn test_rejects_more_partitions_than_cells() {
        let err = FlowConfig::from_json_str(
            r#"{ "layout": { "grid_shape": [2, 2], "partitions": [3, 1] } }"#,
        )
        .expect_err("3 partition rows cannot fit 2 grid rows");
        match err {
            FlowError::ConfigError(msg) => assert!(msg.contains("3x1")),
            other => panic!("Unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_rejects_zero_concurrency() {
        let cfg = AccumulationConfig {
            max_concurrent_tasks: 0,
            ..AccumulationConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(FlowError::ConfigError(_))));

        let cfg = AccumulationConfig {
            round_limit: Some(0),
            ..AccumulationConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(FlowError::ConfigError(_))));
    }

    #[test]
    fn test_malformed_json_is_json_error() {
        let err = FlowConfig::from_json_str("{ not json").expect_err("must fail");
        assert!(matches!(err, FlowError::Json(_)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = FlowConfig::from_file("/nonexistent/flow_config.json").expect_err("must fail");
        assert!(matches!(err, FlowError::Io(_)));
    }
}
