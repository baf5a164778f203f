//! az-core: the contracts the search engine is written against, plus configuration.
//!
//! - [`Game`]: legal actions, transitions with a chance key, terminal results, player to move
//! - [`Predictor`]: batched value/policy inference over game snapshots
//! - [`Values`]: per-player value vectors shared by both contracts

pub mod config;
pub mod game;
pub mod predict;
pub mod values;

pub use config::{Config, ConfigError, GumbelConfig, LoggingConfig, SearchConfig};
pub use game::{Game, PlayerId};
pub use predict::{PredictError, Prediction, Predictor};
pub use values::Values;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
