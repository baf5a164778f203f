//! Batched Monte Carlo tree search.
//!
//! The design uses:
//! - An arena of state nodes, each owning its action nodes and their bounded chance caches
//! - A batching coordinator so many in-flight descents share one predictor call per flush
//! - UCB selection with in-flight visits counted, and Gumbel sequential halving at the root

pub mod arena;
pub mod batch;
pub mod gumbel;
pub mod infer;
pub mod mcts;
pub mod node;
pub mod playout;
pub mod select;
pub mod stats;
pub mod tree;

pub use arena::NodeId;
pub use batch::{Coordinator, Settlement, Ticket};
pub use gumbel::HalvingConfig;
pub use infer::{ConstantPredictor, FailingPredictor, UniformPredictor};
pub use mcts::{ActionSummary, CancelToken, Mcts, MctsConfig, SearchError, SearchResult};
pub use node::{ActionNode, Decision, StateKind, StateNode, ValueWeights};
pub use playout::{PlayoutPolicy, UniformPlayout};
pub use select::{C_SCALE, C_VISIT};
pub use stats::{EngineCounters, FlushRecord, ValueAggregate};
pub use tree::{Descent, InteriorRule, Tree};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
