//! Action selection: UCB for iterative descents, improved-policy scoring for Gumbel searches.

use az_core::Game;

use crate::mcts::SearchError;
use crate::node::Decision;

/// `c_visit` in the completed-value transform.
pub const C_VISIT: f32 = 50.0;
/// `c_scale` in the completed-value transform.
pub const C_SCALE: f32 = 1.0;

/// UCB score with combined (completed + in-flight) visit counts.
///
/// `score = v + p * sqrt(bias * ln(1 + N) / (1 + n))`
pub fn ucb_score(value: f32, prior: f32, parent_visits: u32, visits: u32, bias: f32) -> f32 {
    let explore = (bias * (1.0 + parent_visits as f32).ln() / (1.0 + visits as f32)).sqrt();
    value + prior * explore
}

/// Pick an action by UCB. `parent_visits` is the state node's combined visit count.
///
/// In-flight descents count as visits, so descents issued back to back before any inference
/// resolves spread over different actions. With `force_unvisited`, the first action that has
/// never been tried (not even in flight) is taken before any scoring.
pub fn select_ucb<G: Game>(
    decision: &Decision<G>,
    parent_visits: u32,
    bias: f32,
    force_unvisited: bool,
) -> Result<usize, SearchError> {
    if force_unvisited {
        if let Some(i) = decision.actions.iter().position(|a| a.combined() == 0) {
            return Ok(i);
        }
    }
    let mut best: Option<(usize, f32)> = None;
    for (i, a) in decision.actions.iter().enumerate() {
        let score = ucb_score(
            a.expected_value(decision.player),
            a.prior,
            parent_visits,
            a.combined(),
            bias,
        );
        if score.is_nan() || score == f32::NEG_INFINITY {
            continue;
        }
        if best.map_or(true, |(_, b)| score > b) {
            best = Some((i, score));
        }
    }
    best.map(|(i, _)| i).ok_or(SearchError::NoSelectableAction)
}

/// Completed-value transform `(c_visit + max_visits) * c_scale * q`.
pub fn sigma(q: f32, max_visits: u32, c_visit: f32, c_scale: f32) -> f32 {
    (c_visit + max_visits as f32) * c_scale * q
}

/// Numerically stable softmax. Uniform when every logit is `-inf` or the input is degenerate.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    if logits.is_empty() {
        return Vec::new();
    }
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() {
        return vec![1.0 / logits.len() as f32; logits.len()];
    }
    let exps: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if !(sum.is_finite() && sum > 0.0) {
        return vec![1.0 / logits.len() as f32; logits.len()];
    }
    exps.into_iter().map(|e| e / sum).collect()
}

/// State value for unvisited actions: the node's own estimate mixed with the prior-weighted
/// mean of visited actions, weighted by how many visits back that mean.
pub fn mixed_value<G: Game>(decision: &Decision<G>, own_value: f32) -> f32 {
    let mut total_visits = 0u32;
    let mut visited_prior = 0.0f32;
    let mut weighted = 0.0f32;
    for a in &decision.actions {
        let n = a.completed();
        if n == 0 {
            continue;
        }
        total_visits += n;
        visited_prior += a.prior;
        weighted += a.prior * a.expected_value(decision.player);
    }
    if total_visits == 0 || visited_prior <= 0.0 {
        return own_value;
    }
    let n = total_visits as f32;
    (own_value + n * weighted / visited_prior) / (1.0 + n)
}

/// `prior_logit + completed_q` for every action.
///
/// Visited actions use their running mean; unvisited ones fall back to [`mixed_value`].
pub fn improved_logits<G: Game>(
    decision: &Decision<G>,
    own_value: f32,
    c_visit: f32,
    c_scale: f32,
) -> Vec<f32> {
    let max_visits = decision.max_completed();
    let fallback = sigma(mixed_value(decision, own_value), max_visits, c_visit, c_scale);
    decision
        .actions
        .iter()
        .map(|a| {
            let q = match a.values.get(decision.player) {
                Some(v) => sigma(v, max_visits, c_visit, c_scale),
                None => fallback,
            };
            a.logit + q
        })
        .collect()
}

/// Interior selection for Gumbel searches: `argmax(pi'(a) - n(a) / (1 + N))` with `pi'` the
/// softmax of the improved logits and combined visit counts.
pub fn select_improved<G: Game>(
    decision: &Decision<G>,
    own_value: f32,
    c_visit: f32,
    c_scale: f32,
) -> Result<usize, SearchError> {
    let policy = softmax(&improved_logits(decision, own_value, c_visit, c_scale));
    let denom = 1.0 + decision.combined_visits() as f32;
    let mut best: Option<(usize, f32)> = None;
    for (i, (a, p)) in decision.actions.iter().zip(&policy).enumerate() {
        let score = p - a.combined() as f32 / denom;
        if score.is_nan() {
            continue;
        }
        if best.map_or(true, |(_, b)| score > b) {
            best = Some((i, score));
        }
    }
    best.map(|(i, _)| i).ok_or(SearchError::NoSelectableAction)
}
