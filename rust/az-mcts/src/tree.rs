//! The search tree and its descents.
//!
//! A descent walks down from the root, picking one action per decision node and sampling its
//! chance outcome, until it reaches a terminal state or a chance outcome seen for the first time.
//! A first-time outcome becomes a new state node, which submits its own inference request. If
//! the new node's value depends on the model, the descent suspends on that request and resumes
//! when a flush settles it. Otherwise it completes on the spot.
//!
//! Suspended descents keep their path as node ids. If a chance-cache eviction frees part of the
//! path in the meantime, the stale ids are skipped during backup.

use std::rc::Rc;

use az_core::{Game, Predictor, Values};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rustc_hash::FxHashMap;

use crate::arena::{Arena, NodeId};
use crate::batch::{Coordinator, Settlement, Ticket};
use crate::mcts::{ActionSummary, MctsConfig, SearchError, SearchResult};
use crate::node::{ActionNode, Decision, StateKind, StateNode, ValueWeights};
use crate::playout::{playout, PlayoutPolicy, UniformPlayout};
use crate::select::{improved_logits, select_improved, select_ucb, softmax};
use crate::stats::{EngineCounters, FlushRecord};

/// Selection rule below the root.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InteriorRule {
    Ucb,
    /// Maximize improved policy minus visit share (Gumbel searches outside training).
    ImprovedPolicy { c_visit: f32, c_scale: f32 },
}

/// One edge of a descent path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub node: NodeId,
    pub action: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Descent {
    /// Backed up already.
    Complete(Values),
    /// Waiting on a new node's request; resumed by the flush that settles it.
    Suspended(Ticket),
}

#[derive(Debug)]
struct Suspended {
    path: Vec<Step>,
    ticket: Ticket,
    playout: Option<Values>,
}

/// Turns snapshots into fresh nodes.
struct Expander<'g, G: Game> {
    game: &'g G,
    weights: ValueWeights,
    max_outcomes: usize,
    rng: ChaCha8Rng,
    playout: Box<dyn PlayoutPolicy<G> + 'g>,
    coordinator: Coordinator<G>,
    counters: EngineCounters,
}

impl<'g, G: Game> Expander<'g, G> {
    fn state(&mut self, snapshot: G::State) -> Result<StateNode<G>, SearchError> {
        let players = self.game.num_players();
        let result = self.game.result(&snapshot);
        let player = self.game.current_player(&snapshot);
        match (result, player) {
            (Some(result), None) => {
                if result.len() != players {
                    return Err(SearchError::ValueLength {
                        expected: players,
                        got: result.len(),
                    });
                }
                if result.has_nan() {
                    return Err(SearchError::NanValues);
                }
                self.counters.state_nodes += 1;
                Ok(StateNode::terminal(Rc::new(snapshot), result))
            }
            (None, Some(player)) => {
                let snapshot = Rc::new(snapshot);
                let playout_values = match self.weights.playout {
                    Some(_) => Some(playout(
                        self.game,
                        &*snapshot,
                        self.playout.as_mut(),
                        &mut self.rng,
                    )?),
                    None => None,
                };
                let actions = self.game.legal_actions(&snapshot);
                self.counters.state_nodes += 1;
                self.counters.action_nodes += actions.len() as u64;
                let request = self.coordinator.submit(Rc::clone(&snapshot));
                Ok(StateNode::new_decision(
                    snapshot,
                    player,
                    actions,
                    request,
                    playout_values,
                    self.max_outcomes,
                ))
            }
            _ => Err(SearchError::TerminalMismatch),
        }
    }
}

/// What a descent found after creating a node.
enum Reached {
    Terminal(Values),
    Decision {
        ticket: Ticket,
        playout: Option<Values>,
    },
}

/// A search tree for one decision.
pub struct Tree<'g, G: Game> {
    expander: Expander<'g, G>,
    cfg: MctsConfig,
    interior: InteriorRule,
    arena: Arena<StateNode<G>>,
    root: NodeId,
    suspended: Vec<Suspended>,
    /// Decision nodes whose own request has not settled yet.
    awaiting: FxHashMap<Ticket, NodeId>,
    flushes: Vec<FlushRecord>,
}

impl<'g, G: Game> Tree<'g, G> {
    /// Build a tree whose playout value mode (if enabled) uses uniformly random moves.
    pub fn new(game: &'g G, cfg: &MctsConfig, root: G::State) -> Result<Self, SearchError> {
        Self::with_playout(game, cfg, root, UniformPlayout)
    }

    pub fn with_playout<P>(
        game: &'g G,
        cfg: &MctsConfig,
        root: G::State,
        policy: P,
    ) -> Result<Self, SearchError>
    where
        P: PlayoutPolicy<G> + 'g,
    {
        if game.result(&root).is_some() {
            return Err(SearchError::TerminalRoot);
        }
        let mut expander = Expander {
            game,
            weights: cfg.value_weights(),
            max_outcomes: cfg.max_chance_branches,
            rng: ChaCha8Rng::seed_from_u64(cfg.seed),
            playout: Box::new(policy),
            coordinator: Coordinator::new(),
            counters: EngineCounters::default(),
        };
        let node = expander.state(root)?;
        let mut arena = Arena::new();
        let mut awaiting = FxHashMap::default();
        let request = node.decision().map(|d| d.request);
        let root = arena.push(node);
        if let Some(ticket) = request {
            awaiting.insert(ticket, root);
        }
        Ok(Self {
            expander,
            cfg: *cfg,
            interior: InteriorRule::Ucb,
            arena,
            root,
            suspended: Vec::new(),
            awaiting,
            flushes: Vec::new(),
        })
    }

    pub fn set_interior_rule(&mut self, rule: InteriorRule) {
        self.interior = rule;
    }

    pub fn game(&self) -> &'g G {
        self.expander.game
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> Option<&StateNode<G>> {
        self.arena.get(id)
    }

    /// Live nodes in the arena.
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn root_node(&self) -> Result<&StateNode<G>, SearchError> {
        self.node_ref(self.root)
    }

    pub fn root_decision(&self) -> Result<&Decision<G>, SearchError> {
        self.root_node()?
            .decision()
            .ok_or(SearchError::TerminalMismatch)
    }

    /// Requests submitted but not flushed.
    pub fn pending_requests(&self) -> usize {
        self.expander.coordinator.pending()
    }

    /// Predictions the coordinator still holds.
    pub fn retained_predictions(&self) -> usize {
        self.expander.coordinator.retained()
    }

    /// Descents waiting on a flush.
    pub fn suspended(&self) -> usize {
        self.suspended.len()
    }

    pub fn counters(&self) -> EngineCounters {
        EngineCounters {
            inference_calls: self.expander.coordinator.inference_calls(),
            ..self.expander.counters
        }
    }

    pub fn flushes(&self) -> &[FlushRecord] {
        &self.flushes
    }

    /// The root's predicted values. Placeholder zeros for the model part before it settles.
    pub fn root_predicted_values(&self) -> Result<Values, SearchError> {
        self.root_node()?
            .predicted_values(&self.expander.weights, self.players())
    }

    /// Run one descent. `forced` pins the root action by index.
    pub fn descend(&mut self, forced: Option<usize>) -> Result<Descent, SearchError> {
        let mut path: Vec<Step> = Vec::new();
        let mut node_id = self.root;
        loop {
            let (index, action, snapshot) = self.select(node_id, path.is_empty(), forced)?;
            path.push(Step {
                node: node_id,
                action: index,
            });
            let game = self.expander.game;
            let (next, key) = game.apply(&snapshot, &action, &mut self.expander.rng);

            let cached = self.action_node(node_id, index)?.outcomes.get(&key);
            let Some(child) = cached else {
                return self.expand(path, node_id, index, key, next);
            };
            let node = self.node_mut(child)?;
            if let StateKind::Terminal { result } = &node.kind {
                let result = result.clone();
                node.values.merge(&result)?;
                self.expander.counters.terminal_states += 1;
                self.backup(&path, &result)?;
                return Ok(Descent::Complete(result));
            }
            node_id = child;
        }
    }

    /// Flush the coordinator, settle the nodes it answered and resume waiting descents.
    pub fn flush<P>(&mut self, predictor: &mut P) -> Result<FlushRecord, SearchError>
    where
        P: Predictor<G> + ?Sized,
    {
        let batch_size = self.expander.coordinator.pending();
        if batch_size == 0 {
            return Ok(FlushRecord {
                batch_size: 0,
                resumed: 0,
            });
        }
        let settled = self.expander.coordinator.flush(predictor)?;
        let players = self.players();

        for ticket in &settled {
            let Some(id) = self.awaiting.remove(ticket) else {
                continue;
            };
            let Settlement::Ready(prediction) = self.expander.coordinator.settlement(*ticket)
            else {
                continue;
            };
            if let Some(d) = self.arena.get_mut(id).and_then(|n| n.decision_mut()) {
                d.settle(prediction, players)?;
            }
        }

        let (mut ready, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.suspended)
            .into_iter()
            .partition(|s| settled.binary_search(&s.ticket).is_ok());
        self.suspended = waiting;
        ready.sort_by_key(|s| s.ticket);

        let resumed = ready.len();
        for s in ready {
            let values = match self.expander.coordinator.settlement(s.ticket) {
                Settlement::Ready(p) => {
                    self.expander
                        .weights
                        .blend(players, Some(&p.values), s.playout.as_ref())?
                }
                Settlement::Failed(e) => return Err(e.clone().into()),
                Settlement::Pending => {
                    self.suspended.push(s);
                    continue;
                }
            };
            self.backup(&s.path, &values)?;
        }
        for ticket in &settled {
            self.expander.coordinator.release(*ticket);
        }

        let record = FlushRecord {
            batch_size,
            resumed,
        };
        self.flushes.push(record);
        Ok(record)
    }

    /// Improved policy logits at the root.
    pub fn improved_policy_logits(
        &self,
        c_visit: f32,
        c_scale: f32,
    ) -> Result<Vec<f32>, SearchError> {
        let d = self.root_decision()?;
        let own = self.root_predicted_values()?.get(d.player).unwrap_or(0.0);
        Ok(improved_logits(d, own, c_visit, c_scale))
    }

    pub fn improved_policy(&self, c_visit: f32, c_scale: f32) -> Result<Vec<f32>, SearchError> {
        Ok(softmax(&self.improved_policy_logits(c_visit, c_scale)?))
    }

    /// Per-action statistics of the root.
    pub fn result(
        &self,
        chosen: Option<usize>,
        c_visit: f32,
        c_scale: f32,
    ) -> Result<SearchResult<G::Action>, SearchError> {
        let players = self.players();
        let root = self.root_node()?;
        let d = self.root_decision()?;
        let actions = d
            .actions
            .iter()
            .map(|a| ActionSummary {
                action: a.action.clone(),
                prior: a.prior,
                logit: a.logit,
                visits: a.completed(),
                values: if a.completed() == 0 {
                    Values::zeros(players)
                } else {
                    a.values.mean().clone()
                },
            })
            .collect();
        Ok(SearchResult {
            actions,
            root_player: d.player,
            root_values: if root.completed() == 0 {
                Values::zeros(players)
            } else {
                root.values.mean().clone()
            },
            chosen: chosen.and_then(|i| d.actions.get(i)).map(|a| a.action.clone()),
            improved_logits: self.improved_policy_logits(c_visit, c_scale)?,
            counters: self.counters(),
            flushes: self.flushes.clone(),
        })
    }

    /// Keep only the subtree under `action` / `key` as the new root.
    ///
    /// Returns `None` when that outcome was never reached, is terminal, or descents are still
    /// outstanding.
    pub fn into_subtree(mut self, action: &G::Action, key: &G::ChanceKey) -> Option<Self> {
        if !self.suspended.is_empty() || self.expander.coordinator.pending() > 0 {
            return None;
        }
        let index = self
            .root_decision()
            .ok()?
            .actions
            .iter()
            .position(|a| &a.action == action)?;
        let child = self.action_node(self.root, index).ok()?.outcomes.get(key)?;
        if self.arena.get(child)?.is_terminal() {
            return None;
        }
        self.action_node_mut(self.root, index)
            .ok()?
            .outcomes
            .remove(child);
        let old = self.root;
        self.free_subtree(old);
        self.root = child;
        self.flushes.clear();
        Some(self)
    }

    fn players(&self) -> usize {
        self.expander.game.num_players()
    }

    fn node_ref(&self, id: NodeId) -> Result<&StateNode<G>, SearchError> {
        self.arena
            .get(id)
            .ok_or(SearchError::MissingNode { index: id.index() })
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut StateNode<G>, SearchError> {
        self.arena
            .get_mut(id)
            .ok_or(SearchError::MissingNode { index: id.index() })
    }

    fn action_node(&self, id: NodeId, index: usize) -> Result<&ActionNode<G>, SearchError> {
        self.node_ref(id)?
            .decision()
            .ok_or(SearchError::TerminalMismatch)?
            .actions
            .get(index)
            .ok_or(SearchError::NoSelectableAction)
    }

    fn action_node_mut(
        &mut self,
        id: NodeId,
        index: usize,
    ) -> Result<&mut ActionNode<G>, SearchError> {
        self.node_mut(id)?
            .decision_mut()
            .ok_or(SearchError::TerminalMismatch)?
            .actions
            .get_mut(index)
            .ok_or(SearchError::NoSelectableAction)
    }

    /// Mark a descent in flight through `id` and pick its action.
    fn select(
        &mut self,
        id: NodeId,
        at_root: bool,
        forced: Option<usize>,
    ) -> Result<(usize, G::Action, Rc<G::State>), SearchError> {
        let weights = self.expander.weights;
        let players = self.players();
        let interior = self.interior;
        let bias = self.cfg.exploration_bias;
        let force_unvisited = self.cfg.force_unvisited_root;

        let node = self.node_mut(id)?;
        let own_value = match (at_root, interior) {
            (false, InteriorRule::ImprovedPolicy { .. }) => {
                let v = node.predicted_values(&weights, players)?;
                node.decision().and_then(|d| v.get(d.player)).unwrap_or(0.0)
            }
            _ => 0.0,
        };
        node.in_flight += 1;
        let parent_visits = node.combined();
        let snapshot = Rc::clone(&node.snapshot);
        let d = node.decision_mut().ok_or(SearchError::TerminalMismatch)?;

        let index = match (at_root, forced, interior) {
            (true, Some(i), _) if i < d.actions.len() => i,
            (true, Some(_), _) => return Err(SearchError::NoSelectableAction),
            (true, None, _) => select_ucb(d, parent_visits, bias, force_unvisited)?,
            (false, _, InteriorRule::Ucb) => select_ucb(d, parent_visits, bias, false)?,
            (false, _, InteriorRule::ImprovedPolicy { c_visit, c_scale }) => {
                select_improved(d, own_value, c_visit, c_scale)?
            }
        };
        let a = &mut d.actions[index];
        a.in_flight += 1;
        Ok((index, a.action.clone(), snapshot))
    }

    /// Add the state reached from `parent`/`index` under `key` and finish or suspend the descent.
    fn expand(
        &mut self,
        path: Vec<Step>,
        parent: NodeId,
        index: usize,
        key: G::ChanceKey,
        snapshot: G::State,
    ) -> Result<Descent, SearchError> {
        let node = self.expander.state(snapshot)?;
        let reached = match &node.kind {
            StateKind::Terminal { result } => Reached::Terminal(result.clone()),
            StateKind::Decision(d) => Reached::Decision {
                ticket: d.request,
                playout: d.playout_values.clone(),
            },
        };
        let child = self.arena.push(node);
        self.insert_outcome(parent, index, key, child)?;

        match reached {
            Reached::Terminal(result) => {
                self.expander.counters.terminal_states += 1;
                self.backup(&path, &result)?;
                Ok(Descent::Complete(result))
            }
            Reached::Decision { ticket, playout } => {
                self.awaiting.insert(ticket, child);
                let weights = self.expander.weights;
                if weights.model.is_some() {
                    self.suspended.push(Suspended {
                        path,
                        ticket,
                        playout,
                    });
                    return Ok(Descent::Suspended(ticket));
                }
                let values = weights.blend(self.players(), None, playout.as_ref())?;
                self.backup(&path, &values)?;
                Ok(Descent::Complete(values))
            }
        }
    }

    fn insert_outcome(
        &mut self,
        parent: NodeId,
        index: usize,
        key: G::ChanceKey,
        child: NodeId,
    ) -> Result<(), SearchError> {
        let arena = &self.arena;
        let victim = self
            .action_node(parent, index)?
            .outcomes
            .victim(|id| arena.get(id).map_or(0, |n| n.completed()));
        if let Some(victim) = victim {
            self.action_node_mut(parent, index)?.outcomes.remove(victim);
            self.free_subtree(victim);
            self.expander.counters.evictions += 1;
        }
        self.action_node_mut(parent, index)?
            .outcomes
            .insert(key, child);
        Ok(())
    }

    fn free_subtree(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            let Some(node) = self.arena.remove(id) else {
                continue;
            };
            if let StateKind::Decision(d) = node.kind {
                self.awaiting.remove(&d.request);
                for a in &d.actions {
                    stack.extend(a.outcomes.children());
                }
            }
        }
    }

    /// Fold `values` into every live node on `path`, deepest first, and release its in-flight
    /// reservation.
    fn backup(&mut self, path: &[Step], values: &Values) -> Result<(), SearchError> {
        for step in path.iter().rev() {
            let Some(node) = self.arena.get_mut(step.node) else {
                continue;
            };
            if let Some(a) = node
                .decision_mut()
                .and_then(|d| d.actions.get_mut(step.action))
            {
                a.values.merge(values)?;
                a.in_flight = a.in_flight.saturating_sub(1);
            }
            node.values.merge(values)?;
            node.in_flight = node.in_flight.saturating_sub(1);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infer::UniformPredictor;
    use az_games::{DiceRace, NumberPick};

    fn cfg() -> MctsConfig {
        MctsConfig::default()
    }

    #[test]
    fn root_request_is_queued_at_construction() {
        let game = NumberPick::new(2, 1);
        let tree = Tree::new(&game, &cfg(), game.initial()).unwrap();
        assert_eq!(tree.pending_requests(), 1);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.root_decision().unwrap().actions.len(), 9);
        assert!(!tree.root_decision().unwrap().is_settled());
        // Readable before settlement.
        assert_eq!(tree.root_predicted_values().unwrap(), Values::zeros(2));
    }

    #[test]
    fn terminal_root_is_rejected() {
        let game = NumberPick::new(2, 1);
        let mut state = game.initial();
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        for a in [3u8, 4] {
            state = game.apply(&state, &a, &mut rng).0;
        }
        assert!(matches!(
            Tree::new(&game, &cfg(), state),
            Err(SearchError::TerminalRoot)
        ));
    }

    #[test]
    fn descent_suspends_until_flush() {
        let game = NumberPick::new(2, 2);
        let mut tree = Tree::new(&game, &cfg(), game.initial()).unwrap();
        let d = tree.descend(None).unwrap();
        assert!(matches!(d, Descent::Suspended(_)));
        assert_eq!(tree.suspended(), 1);
        assert_eq!(tree.root_node().unwrap().in_flight, 1);
        assert_eq!(tree.root_node().unwrap().completed(), 0);

        let mut predictor = UniformPredictor::new(&game);
        let record = tree.flush(&mut predictor).unwrap();
        assert_eq!(
            record,
            FlushRecord {
                batch_size: 2,
                resumed: 1
            }
        );
        let root = tree.root_node().unwrap();
        assert_eq!(root.in_flight, 0);
        assert_eq!(root.completed(), 1);
        assert!(tree.root_decision().unwrap().is_settled());
        assert_eq!(tree.suspended(), 0);
    }

    #[test]
    fn playout_only_mode_completes_without_waiting() {
        let game = NumberPick::new(2, 2);
        let cfg = MctsConfig {
            model_value_weight: None,
            random_playout_weight: Some(1.0),
            ..cfg()
        };
        let mut tree = Tree::new(&game, &cfg, game.initial()).unwrap();
        match tree.descend(None).unwrap() {
            Descent::Complete(v) => assert_eq!(v.iter().sum::<f32>(), 1.0),
            other => panic!("expected completion, got {other:?}"),
        }
        assert_eq!(tree.root_node().unwrap().completed(), 1);
        // The new node still asked for its priors.
        assert_eq!(tree.pending_requests(), 2);
    }

    #[test]
    fn chance_cache_stays_bounded_and_frees_evicted_subtrees() {
        let game = DiceRace::new(2, 30);
        let cfg = MctsConfig {
            max_chance_branches: 2,
            ..cfg()
        };
        let mut tree = Tree::new(&game, &cfg, game.initial()).unwrap();
        let mut predictor = UniformPredictor::new(&game);
        for _ in 0..200 {
            tree.descend(None).unwrap();
            if tree.pending_requests() >= 8 {
                tree.flush(&mut predictor).unwrap();
            }
        }
        tree.flush(&mut predictor).unwrap();

        assert!(tree.counters().evictions > 0);
        for (_, node) in tree.arena.iter() {
            if let Some(d) = node.decision() {
                for a in &d.actions {
                    assert!(a.outcomes.len() <= 2);
                    for child in a.outcomes.children() {
                        assert!(tree.node(child).is_some());
                    }
                }
            }
        }
        // Evicted nodes are gone: every live node is reachable from the root.
        let mut reachable = 0;
        let mut stack = vec![tree.root()];
        while let Some(id) = stack.pop() {
            reachable += 1;
            if let Some(d) = tree.node(id).and_then(|n| n.decision()) {
                for a in &d.actions {
                    stack.extend(a.outcomes.children());
                }
            }
        }
        assert_eq!(reachable, tree.len());
        let root = tree.root_node().unwrap();
        assert_eq!(root.completed(), 200);
        assert_eq!(root.in_flight, 0);
    }

    #[test]
    fn subtree_reuse_keeps_child_statistics() {
        let game = NumberPick::new(2, 2);
        let mut tree = Tree::new(&game, &cfg(), game.initial()).unwrap();
        let mut predictor = UniformPredictor::new(&game);
        for _ in 0..12 {
            tree.descend(None).unwrap();
        }
        tree.flush(&mut predictor).unwrap();

        let d = tree.root_decision().unwrap();
        let first = d.actions[0].action;
        let child = d.actions[0].outcomes.get(&()).unwrap();
        let visits = tree.node(child).unwrap().completed();
        let before = tree.len();

        let tree = tree.into_subtree(&first, &()).unwrap();
        assert_eq!(tree.root(), child);
        assert_eq!(tree.root_node().unwrap().completed(), visits);
        assert!(tree.len() < before);
        assert!(tree.root_decision().unwrap().is_settled());
    }

    #[test]
    fn subtree_reuse_needs_a_quiet_tree() {
        let game = NumberPick::new(2, 2);
        let mut tree = Tree::new(&game, &cfg(), game.initial()).unwrap();
        tree.descend(None).unwrap();
        let first = tree.root_decision().unwrap().actions[0].action;
        assert!(tree.into_subtree(&first, &()).is_none());
    }
}
