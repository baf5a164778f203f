//! State and action nodes.

use std::rc::Rc;

use az_core::{Game, PlayerId, Prediction, Values};

use crate::arena::NodeId;
use crate::batch::Ticket;
use crate::mcts::SearchError;
use crate::stats::ValueAggregate;

/// How a fresh node's predicted value is assembled.
///
/// Both weights present means a plain weighted sum; the weights are not normalized.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueWeights {
    pub model: Option<f32>,
    pub playout: Option<f32>,
}

impl ValueWeights {
    /// Combine the model estimate and the playout result.
    ///
    /// Placeholder zeros stand in for a model estimate that has not arrived yet.
    pub fn blend(
        &self,
        players: usize,
        model: Option<&Values>,
        playout: Option<&Values>,
    ) -> Result<Values, SearchError> {
        if self.model.is_none() && self.playout.is_none() {
            return Err(SearchError::InvalidConfig {
                msg: "one of model_value_weight or random_playout_weight must be set",
            });
        }
        let mut out = Values::zeros(players);
        let parts = [(self.model, model), (self.playout, playout)];
        for (weight, part) in parts {
            let (Some(w), Some(v)) = (weight, part) else {
                continue;
            };
            if v.len() != players {
                return Err(SearchError::ValueLength {
                    expected: players,
                    got: v.len(),
                });
            }
            for (o, x) in out.iter_mut().zip(v.iter()) {
                *o += w * x;
            }
        }
        if out.has_nan() {
            return Err(SearchError::NanValues);
        }
        Ok(out)
    }
}

/// Bounded map from chance key to child state.
///
/// A handful of entries at most, so a `Vec` with linear scans.
#[derive(Debug, Clone)]
pub struct OutcomeCache<K> {
    entries: Vec<(K, NodeId)>,
    capacity: usize,
}

impl<K: PartialEq> OutcomeCache<K> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            capacity,
        }
    }

    pub fn get(&self, key: &K) -> Option<NodeId> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, id)| *id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn children(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.entries.iter().map(|(_, id)| *id)
    }

    /// Entry to evict before one more insert, if the cache is full.
    ///
    /// Picks the child with the fewest completed visits; the first one in scan order wins ties.
    pub fn victim(&self, completed: impl Fn(NodeId) -> u32) -> Option<NodeId> {
        if self.entries.len() < self.capacity {
            return None;
        }
        let mut best: Option<(NodeId, u32)> = None;
        for (_, id) in &self.entries {
            let n = completed(*id);
            if best.map_or(true, |(_, bn)| n < bn) {
                best = Some((*id, n));
            }
        }
        best.map(|(id, _)| id)
    }

    pub fn remove(&mut self, id: NodeId) {
        self.entries.retain(|(_, e)| *e != id);
    }

    pub fn insert(&mut self, key: K, id: NodeId) {
        self.entries.push((key, id));
    }
}

/// One legal action out of a decision node.
#[derive(Debug)]
pub struct ActionNode<G: Game> {
    pub action: G::Action,
    pub prior: f32,
    pub logit: f32,
    /// Value estimate for the acting player while the action has no completed visits.
    pub predicted_value: f32,
    pub values: ValueAggregate,
    pub in_flight: u32,
    pub outcomes: OutcomeCache<G::ChanceKey>,
}

impl<G: Game> ActionNode<G> {
    fn new(action: G::Action, prior: f32, max_outcomes: usize) -> Self {
        Self {
            action,
            prior,
            logit: 0.0,
            predicted_value: 0.0,
            values: ValueAggregate::default(),
            in_flight: 0,
            outcomes: OutcomeCache::new(max_outcomes),
        }
    }

    pub fn completed(&self) -> u32 {
        self.values.count()
    }

    /// Completed plus in-flight descents.
    pub fn combined(&self) -> u32 {
        self.values.count() + self.in_flight
    }

    /// Running mean for `player`, or the placeholder prediction before any completed visit.
    pub fn expected_value(&self, player: PlayerId) -> f32 {
        self.values.get(player).unwrap_or(self.predicted_value)
    }
}

/// Non-terminal state: the acting player's choices plus its own inference request.
#[derive(Debug)]
pub struct Decision<G: Game> {
    pub player: PlayerId,
    pub actions: Vec<ActionNode<G>>,
    pub request: Ticket,
    /// Model values once the request has settled.
    pub model_values: Option<Values>,
    /// Result of the playout run at construction, in playout value mode.
    pub playout_values: Option<Values>,
}

impl<G: Game> Decision<G> {
    pub fn is_settled(&self) -> bool {
        self.model_values.is_some()
    }

    /// Overwrite priors and per-action predictions from this node's own prediction.
    ///
    /// Runs once; later calls are ignored.
    pub fn settle(
        &mut self,
        prediction: &Prediction<G::Action>,
        players: usize,
    ) -> Result<(), SearchError> {
        if self.is_settled() {
            return Ok(());
        }
        if prediction.values.len() != players {
            return Err(SearchError::ValueLength {
                expected: players,
                got: prediction.values.len(),
            });
        }
        let mut logits = Vec::with_capacity(self.actions.len());
        for a in &self.actions {
            match prediction.logits.get(&a.action) {
                // `-inf` masks an action; NaN and `+inf` have no probability.
                Some(&l) if l.is_nan() || l == f32::INFINITY => {
                    return Err(SearchError::InvalidLogit {
                        action: format!("{:?}", a.action),
                        logit: l,
                    })
                }
                Some(&l) => logits.push(l),
                None => {
                    return Err(SearchError::UnknownAction {
                        action: format!("{:?}", a.action),
                    })
                }
            }
        }
        let priors = crate::select::softmax(&logits);
        let max_logit = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let own_value = prediction.values[self.player];

        for ((a, &logit), &prior) in self.actions.iter_mut().zip(&logits).zip(&priors) {
            a.prior = prior;
            a.logit = logit;
            let scalable = logit.is_finite() && max_logit.is_finite() && max_logit != 0.0;
            a.predicted_value = if scalable {
                (logit / max_logit) * own_value
            } else {
                0.0
            };
        }
        self.model_values = Some(prediction.values.clone());
        Ok(())
    }

    /// Sum of combined visits over all actions.
    pub fn combined_visits(&self) -> u32 {
        self.actions.iter().map(|a| a.combined()).sum()
    }

    /// Largest completed visit count among the actions.
    pub fn max_completed(&self) -> u32 {
        self.actions.iter().map(|a| a.completed()).max().unwrap_or(0)
    }
}

#[derive(Debug)]
pub enum StateKind<G: Game> {
    Decision(Decision<G>),
    Terminal { result: Values },
}

#[derive(Debug)]
pub struct StateNode<G: Game> {
    pub snapshot: Rc<G::State>,
    pub values: ValueAggregate,
    pub in_flight: u32,
    pub kind: StateKind<G>,
}

impl<G: Game> StateNode<G> {
    pub fn terminal(snapshot: Rc<G::State>, result: Values) -> Self {
        Self {
            snapshot,
            values: ValueAggregate::default(),
            in_flight: 0,
            kind: StateKind::Terminal { result },
        }
    }

    /// A decision node with a uniform prior over `actions`.
    pub fn new_decision(
        snapshot: Rc<G::State>,
        player: PlayerId,
        actions: Vec<G::Action>,
        request: Ticket,
        playout_values: Option<Values>,
        max_outcomes: usize,
    ) -> Self {
        let uniform = if actions.is_empty() {
            0.0
        } else {
            1.0 / actions.len() as f32
        };
        let actions = actions
            .into_iter()
            .map(|a| ActionNode::new(a, uniform, max_outcomes))
            .collect();
        Self {
            snapshot,
            values: ValueAggregate::default(),
            in_flight: 0,
            kind: StateKind::Decision(Decision {
                player,
                actions,
                request,
                model_values: None,
                playout_values,
            }),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, StateKind::Terminal { .. })
    }

    pub fn completed(&self) -> u32 {
        self.values.count()
    }

    pub fn combined(&self) -> u32 {
        self.values.count() + self.in_flight
    }

    pub fn decision(&self) -> Option<&Decision<G>> {
        match &self.kind {
            StateKind::Decision(d) => Some(d),
            StateKind::Terminal { .. } => None,
        }
    }

    pub fn decision_mut(&mut self) -> Option<&mut Decision<G>> {
        match &mut self.kind {
            StateKind::Decision(d) => Some(d),
            StateKind::Terminal { .. } => None,
        }
    }

    /// The value a descent reaching this node for the first time would report.
    ///
    /// Safe to call before the node's own request settles; the model part is zero until then.
    pub fn predicted_values(
        &self,
        weights: &ValueWeights,
        players: usize,
    ) -> Result<Values, SearchError> {
        match &self.kind {
            StateKind::Terminal { result } => Ok(result.clone()),
            StateKind::Decision(d) => weights.blend(
                players,
                d.model_values.as_ref(),
                d.playout_values.as_ref(),
            ),
        }
    }
}
