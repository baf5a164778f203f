//! Configuration schema for the az search engine.
//!
//! Loaded from YAML; every field has a default so partial files are fine. The engine validates
//! the values it uses when a search is constructed, not here.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration loading errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Iterative (UCB) search settings.
    #[serde(default)]
    pub search: SearchConfig,
    /// Gumbel sequential-halving root selection settings.
    #[serde(default)]
    pub gumbel: GumbelConfig,
    /// NDJSON event output.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Iterative search configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    /// Number of descents per decision.
    #[serde(default = "default_simulations")]
    pub simulations: u32,
    /// Exploration bias in the UCB bonus term.
    #[serde(default = "default_exploration_bias")]
    pub exploration_bias: f32,
    /// Flush the batching coordinator once this many requests are queued.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Maximum chance outcomes cached under one action.
    #[serde(default = "default_max_chance_branches")]
    pub max_chance_branches: usize,
    /// Weight of the predictor's value in a new node's predicted value.
    ///
    /// At least one of `model_value_weight` and `random_playout_weight` must be set. When both
    /// are set the two estimates are summed with their weights, without normalizing.
    #[serde(default = "default_model_value_weight")]
    pub model_value_weight: Option<f32>,
    /// Weight of a random playout's result in a new node's predicted value.
    #[serde(default)]
    pub random_playout_weight: Option<f32>,
    /// Try every root action once before scoring with UCB.
    #[serde(default)]
    pub force_unvisited_root: bool,
    /// Seed for chance sampling and playouts.
    #[serde(default)]
    pub seed: u64,
}

fn default_simulations() -> u32 {
    32
}

fn default_exploration_bias() -> f32 {
    std::f32::consts::SQRT_2
}

fn default_batch_size() -> usize {
    8
}

fn default_max_chance_branches() -> usize {
    4
}

fn default_model_value_weight() -> Option<f32> {
    Some(1.0)
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            simulations: default_simulations(),
            exploration_bias: default_exploration_bias(),
            batch_size: default_batch_size(),
            max_chance_branches: default_max_chance_branches(),
            model_value_weight: default_model_value_weight(),
            random_playout_weight: None,
            force_unvisited_root: false,
            seed: 0,
        }
    }
}

/// Gumbel sequential-halving configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GumbelConfig {
    /// Total simulation budget for one root decision.
    #[serde(default = "default_simulations")]
    pub simulations: u32,
    /// Number of root candidates kept after Gumbel top-k sampling.
    #[serde(default = "default_initial_action_count")]
    pub initial_action_count: u32,
    /// Visit offset in the completed-value transform.
    #[serde(default = "default_c_visit")]
    pub c_visit: f32,
    /// Scale of the completed-value transform.
    #[serde(default = "default_c_scale")]
    pub c_scale: f32,
    /// Training mode: interior nodes keep UCB selection instead of the improved policy.
    #[serde(default)]
    pub train: bool,
}

fn default_initial_action_count() -> u32 {
    16
}

fn default_c_visit() -> f32 {
    50.0
}

fn default_c_scale() -> f32 {
    1.0
}

impl Default for GumbelConfig {
    fn default() -> Self {
        Self {
            simulations: default_simulations(),
            initial_action_count: default_initial_action_count(),
            c_visit: default_c_visit(),
            c_scale: default_c_scale(),
            train: false,
        }
    }
}

/// NDJSON event output.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Append events to this file. No events are written when unset.
    #[serde(default)]
    pub events_path: Option<String>,
    /// Flush the writer every N lines (0 flushes only on drop/explicit flush).
    #[serde(default)]
    pub flush_every_lines: u64,
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }
}
