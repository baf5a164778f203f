//! Gumbel top-k root sampling with sequential halving.
//!
//! The root request is flushed first so the candidates are drawn from real logits. Each round
//! spreads its budget over the surviving candidates (extra descents go to the best ranked ones),
//! waits for every descent to finish, then keeps the better half by
//! `noise + logit + sigma(expected value)`.

use az_core::{Game, GumbelConfig, Predictor};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Gumbel};

use crate::mcts::{CancelToken, Mcts, SearchError, SearchResult};
use crate::select::sigma;
use crate::tree::{InteriorRule, Tree};

/// Halving settings, validated by [`HalvingConfig::validate`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HalvingConfig {
    /// Total descents for the decision.
    pub simulations: u32,
    /// Candidates kept after Gumbel top-k sampling.
    pub initial_action_count: u32,
    pub c_visit: f32,
    pub c_scale: f32,
    /// Keep UCB below the root instead of improved-policy selection.
    pub train: bool,
}

impl Default for HalvingConfig {
    fn default() -> Self {
        Self::from(&GumbelConfig::default())
    }
}

impl From<&GumbelConfig> for HalvingConfig {
    fn from(cfg: &GumbelConfig) -> Self {
        Self {
            simulations: cfg.simulations,
            initial_action_count: cfg.initial_action_count,
            c_visit: cfg.c_visit,
            c_scale: cfg.c_scale,
            train: cfg.train,
        }
    }
}

impl HalvingConfig {
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.simulations == 0 {
            return Err(SearchError::InvalidConfig {
                msg: "halving simulations must be > 0",
            });
        }
        if self.initial_action_count == 0 {
            return Err(SearchError::InvalidConfig {
                msg: "initial_action_count must be > 0",
            });
        }
        if !(self.c_visit.is_finite() && self.c_scale.is_finite()) {
            return Err(SearchError::InvalidConfig {
                msg: "c_visit and c_scale must be finite",
            });
        }
        Ok(())
    }
}

/// Descents for one halving round.
///
/// Every round but the last gets `floor(remaining / log2(initial))`; the last round, the one
/// that leaves a single candidate, takes everything that is left.
pub fn round_budget(remaining: u32, initial: usize, candidates: usize) -> u32 {
    if candidates / 2 <= 1 {
        return remaining;
    }
    let per_round = (remaining as f32 / (initial as f32).log2()).floor() as u32;
    per_round.min(remaining)
}

/// Run a full halving search on `tree` and return the root statistics with the chosen action.
pub fn halving<G, P>(
    mcts: &Mcts,
    tree: &mut Tree<'_, G>,
    predictor: &mut P,
    cfg: &HalvingConfig,
    cancel: &CancelToken,
) -> Result<SearchResult<G::Action>, SearchError>
where
    G: Game,
    P: Predictor<G> + ?Sized,
{
    cfg.validate()?;
    if !cfg.train {
        tree.set_interior_rule(InteriorRule::ImprovedPolicy {
            c_visit: cfg.c_visit,
            c_scale: cfg.c_scale,
        });
    }
    mcts.drain(tree, predictor, cancel)?;

    let n = tree.root_decision()?.actions.len();
    if n == 0 {
        return Err(SearchError::NoSelectableAction);
    }
    if n == 1 {
        tree.descend(Some(0))?;
        mcts.drain(tree, predictor, cancel)?;
        return tree.result(Some(0), cfg.c_visit, cfg.c_scale);
    }

    let mut rng = ChaCha8Rng::seed_from_u64(mcts.config().seed ^ 0x6A09_E667_F3BC_C908u64);
    let gumbel = Gumbel::new(0.0f32, 1.0f32).map_err(|_| SearchError::InvalidConfig {
        msg: "gumbel distribution",
    })?;
    let noise: Vec<f32> = (0..n).map(|_| gumbel.sample(&mut rng)).collect();

    let logits: Vec<f32> = tree.root_decision()?.actions.iter().map(|a| a.logit).collect();
    let mut candidates: Vec<usize> = (0..n).collect();
    candidates.sort_by(|&a, &b| (noise[b] + logits[b]).total_cmp(&(noise[a] + logits[a])));
    candidates.truncate((cfg.initial_action_count as usize).min(n));

    let initial = candidates.len();
    let mut remaining = cfg.simulations;
    if initial == 1 {
        run_round(mcts, tree, predictor, &candidates, remaining, cancel)?;
        return tree.result(Some(candidates[0]), cfg.c_visit, cfg.c_scale);
    }

    while candidates.len() > 1 {
        let budget = round_budget(remaining, initial, candidates.len());
        run_round(mcts, tree, predictor, &candidates, budget, cancel)?;
        remaining -= budget;

        let d = tree.root_decision()?;
        let max_visits = d.max_completed();
        let score = |i: usize| {
            let a = &d.actions[i];
            noise[i]
                + a.logit
                + sigma(
                    a.expected_value(d.player),
                    max_visits,
                    cfg.c_visit,
                    cfg.c_scale,
                )
        };
        candidates.sort_by(|&a, &b| score(b).total_cmp(&score(a)));
        candidates.truncate((candidates.len() / 2).max(1));
    }
    tree.result(Some(candidates[0]), cfg.c_visit, cfg.c_scale)
}

/// Issue `budget` descents round-robin over `candidates` and wait for all of them.
fn run_round<G, P>(
    mcts: &Mcts,
    tree: &mut Tree<'_, G>,
    predictor: &mut P,
    candidates: &[usize],
    budget: u32,
    cancel: &CancelToken,
) -> Result<(), SearchError>
where
    G: Game,
    P: Predictor<G> + ?Sized,
{
    let batch_size = mcts.config().batch_size;
    let mut issued = 0;
    'rounds: loop {
        for &c in candidates {
            if issued == budget {
                break 'rounds;
            }
            tree.descend(Some(c))?;
            issued += 1;
            if tree.pending_requests() >= batch_size {
                tree.flush(predictor)?;
                cancel.check()?;
            }
        }
    }
    mcts.drain(tree, predictor, cancel)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_budget_follows_the_schedule() {
        // 4 candidates, 32 descents: 16 then the last 16.
        assert_eq!(round_budget(32, 4, 4), 16);
        assert_eq!(round_budget(16, 4, 2), 16);
        // 8 candidates: floor(32 / 3) twice, then the rest.
        assert_eq!(round_budget(32, 8, 8), 10);
        assert_eq!(round_budget(22, 8, 4), 7);
        assert_eq!(round_budget(15, 8, 2), 15);
        // 3 candidates: 3 / 2 == 1, so the first round is already the last.
        assert_eq!(round_budget(9, 3, 3), 9);
    }

    #[test]
    fn zero_candidates_is_rejected() {
        let cfg = HalvingConfig {
            initial_action_count: 0,
            ..HalvingConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(SearchError::InvalidConfig { .. })
        ));
    }
}
