//! Search drivers: iterative UCB search and Gumbel sequential halving over a [`Tree`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use az_core::{Game, PlayerId, PredictError, Predictor, SearchConfig, Values};
use thiserror::Error;

use crate::gumbel::{self, HalvingConfig};
use crate::node::ValueWeights;
use crate::select::{C_SCALE, C_VISIT};
use crate::stats::{EngineCounters, FlushRecord};
use crate::tree::Tree;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MctsConfig {
    pub simulations: u32,
    pub exploration_bias: f32,
    /// Flush once this many requests are queued.
    pub batch_size: usize,
    /// Chance outcomes cached per action.
    pub max_chance_branches: usize,
    pub model_value_weight: Option<f32>,
    pub random_playout_weight: Option<f32>,
    /// Try every root action once before scoring.
    pub force_unvisited_root: bool,
    pub seed: u64,
}

impl Default for MctsConfig {
    fn default() -> Self {
        Self::from(&SearchConfig::default())
    }
}

impl From<&SearchConfig> for MctsConfig {
    fn from(cfg: &SearchConfig) -> Self {
        Self {
            simulations: cfg.simulations,
            exploration_bias: cfg.exploration_bias,
            batch_size: cfg.batch_size,
            max_chance_branches: cfg.max_chance_branches,
            model_value_weight: cfg.model_value_weight,
            random_playout_weight: cfg.random_playout_weight,
            force_unvisited_root: cfg.force_unvisited_root,
            seed: cfg.seed,
        }
    }
}

impl MctsConfig {
    pub fn value_weights(&self) -> ValueWeights {
        ValueWeights {
            model: self.model_value_weight,
            playout: self.random_playout_weight,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SearchError {
    #[error("invalid config: {msg}")]
    InvalidConfig { msg: &'static str },
    #[error("predictor logit {logit} for action {action} yields no valid prior")]
    InvalidLogit { action: String, logit: f32 },
    #[error("no selectable action")]
    NoSelectableAction,
    #[error("predictor reported no logit for action {action}")]
    UnknownAction { action: String },
    #[error("terminal result and player to move disagree")]
    TerminalMismatch,
    #[error("cannot search from a terminal state")]
    TerminalRoot,
    #[error("node {index} is no longer in the tree")]
    MissingNode { index: usize },
    #[error("player values contain NaN")]
    NanValues,
    #[error("expected {expected} player values, got {got}")]
    ValueLength { expected: usize, got: usize },
    #[error(transparent)]
    Predictor(#[from] PredictError),
    #[error("search cancelled")]
    Cancelled,
}

/// External cancellation flag, checked after every flush.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    pub(crate) fn check(&self) -> Result<(), SearchError> {
        if self.is_cancelled() {
            Err(SearchError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Statistics for one root action.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionSummary<A> {
    pub action: A,
    pub prior: f32,
    pub logit: f32,
    /// Completed visits.
    pub visits: u32,
    /// Running mean per player; zeros for an unvisited action.
    pub values: Values,
}

#[derive(Debug, Clone)]
pub struct SearchResult<A> {
    /// Root actions in legal-action order.
    pub actions: Vec<ActionSummary<A>>,
    pub root_player: PlayerId,
    pub root_values: Values,
    /// Halving winner. `None` for iterative searches.
    pub chosen: Option<A>,
    pub improved_logits: Vec<f32>,
    pub counters: EngineCounters,
    pub flushes: Vec<FlushRecord>,
}

impl<A: PartialEq> SearchResult<A> {
    pub fn get(&self, action: &A) -> Option<&ActionSummary<A>> {
        self.actions.iter().find(|s| &s.action == action)
    }

    /// Action with the most completed visits; the first one wins ties.
    pub fn most_visited(&self) -> Option<&ActionSummary<A>> {
        self.actions
            .iter()
            .fold(None, |best: Option<&ActionSummary<A>>, s| match best {
                Some(b) if b.visits >= s.visits => Some(b),
                _ => Some(s),
            })
    }

    pub fn total_visits(&self) -> u32 {
        self.actions.iter().map(|s| s.visits).sum()
    }
}

pub struct Mcts {
    cfg: MctsConfig,
}

impl Mcts {
    pub fn new(cfg: MctsConfig) -> Result<Self, SearchError> {
        if !(cfg.exploration_bias.is_finite() && cfg.exploration_bias > 0.0) {
            return Err(SearchError::InvalidConfig {
                msg: "exploration_bias must be finite and > 0",
            });
        }
        if cfg.simulations == 0 {
            return Err(SearchError::InvalidConfig {
                msg: "simulations must be > 0",
            });
        }
        if cfg.batch_size == 0 {
            return Err(SearchError::InvalidConfig {
                msg: "batch_size must be > 0",
            });
        }
        if cfg.max_chance_branches == 0 {
            return Err(SearchError::InvalidConfig {
                msg: "max_chance_branches must be > 0",
            });
        }
        if cfg.model_value_weight.is_none() && cfg.random_playout_weight.is_none() {
            return Err(SearchError::InvalidConfig {
                msg: "one of model_value_weight or random_playout_weight must be set",
            });
        }
        let finite = |w: Option<f32>| w.map_or(true, f32::is_finite);
        if !(finite(cfg.model_value_weight) && finite(cfg.random_playout_weight)) {
            return Err(SearchError::InvalidConfig {
                msg: "value weights must be finite",
            });
        }
        Ok(Self { cfg })
    }

    pub fn config(&self) -> &MctsConfig {
        &self.cfg
    }

    /// Fresh tree for `root`, with the root request queued.
    pub fn tree<'g, G: Game>(
        &self,
        game: &'g G,
        root: G::State,
    ) -> Result<Tree<'g, G>, SearchError> {
        Tree::new(game, &self.cfg, root)
    }

    /// Iterative UCB search from `root`.
    pub fn run_search<G, P>(
        &self,
        game: &G,
        root: G::State,
        predictor: &mut P,
        cancel: &CancelToken,
    ) -> Result<SearchResult<G::Action>, SearchError>
    where
        G: Game,
        P: Predictor<G> + ?Sized,
    {
        let mut tree = self.tree(game, root)?;
        self.search(&mut tree, predictor, cancel)
    }

    /// Run `simulations` more descents on an existing tree.
    ///
    /// A root with exactly one legal action gets a single descent.
    pub fn search<G, P>(
        &self,
        tree: &mut Tree<'_, G>,
        predictor: &mut P,
        cancel: &CancelToken,
    ) -> Result<SearchResult<G::Action>, SearchError>
    where
        G: Game,
        P: Predictor<G> + ?Sized,
    {
        if tree.root_decision()?.actions.len() == 1 {
            tree.descend(Some(0))?;
        } else {
            for _ in 0..self.cfg.simulations {
                tree.descend(None)?;
                if tree.pending_requests() >= self.cfg.batch_size {
                    tree.flush(predictor)?;
                    cancel.check()?;
                }
            }
        }
        self.drain(tree, predictor, cancel)?;
        tree.result(None, C_VISIT, C_SCALE)
    }

    /// Gumbel sequential-halving search from `root`.
    pub fn run_halving<G, P>(
        &self,
        game: &G,
        root: G::State,
        predictor: &mut P,
        halving: &HalvingConfig,
        cancel: &CancelToken,
    ) -> Result<SearchResult<G::Action>, SearchError>
    where
        G: Game,
        P: Predictor<G> + ?Sized,
    {
        let mut tree = self.tree(game, root)?;
        gumbel::halving(self, &mut tree, predictor, halving, cancel)
    }

    /// Flush until nothing is queued, so every suspended descent has finished.
    pub(crate) fn drain<G, P>(
        &self,
        tree: &mut Tree<'_, G>,
        predictor: &mut P,
        cancel: &CancelToken,
    ) -> Result<(), SearchError>
    where
        G: Game,
        P: Predictor<G> + ?Sized,
    {
        while tree.pending_requests() > 0 {
            tree.flush(predictor)?;
            cancel.check()?;
        }
        Ok(())
    }
}
