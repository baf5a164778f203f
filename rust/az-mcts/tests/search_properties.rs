//! End-to-end properties of the search drivers on the reference games.

use az_core::{Game, PlayerId, Values};
use az_games::{DiceRace, FaceValuePredictor, NumberPick};
use az_mcts::{
    CancelToken, HalvingConfig, Mcts, MctsConfig, NodeId, Tree, UniformPredictor,
};
use rand::RngCore;

/// A corridor: one legal move per state until the end.
struct Corridor {
    length: u32,
}

impl Game for Corridor {
    type State = u32;
    type Action = ();
    type ChanceKey = ();

    fn num_players(&self) -> usize {
        2
    }
    fn legal_actions(&self, state: &u32) -> Vec<()> {
        if *state < self.length {
            vec![()]
        } else {
            Vec::new()
        }
    }
    fn apply(&self, state: &u32, _action: &(), _rng: &mut dyn RngCore) -> (u32, ()) {
        (state + 1, ())
    }
    fn result(&self, state: &u32) -> Option<Values> {
        (*state >= self.length).then(|| Values::new(vec![1.0, 0.0]))
    }
    fn current_player(&self, state: &u32) -> Option<PlayerId> {
        (*state < self.length).then_some(*state as usize % 2)
    }
}

#[test]
fn single_action_root_gets_exactly_one_descent() {
    let game = Corridor { length: 5 };
    let m = Mcts::new(MctsConfig {
        simulations: 50,
        ..MctsConfig::default()
    })
    .unwrap();
    let mut p = UniformPredictor::new(&game);
    let res = m.run_search(&game, 0, &mut p, &CancelToken::new()).unwrap();
    assert_eq!(res.actions.len(), 1);
    assert_eq!(res.actions[0].visits, 1);
    assert_eq!(res.counters.action_nodes, 2);
}

#[test]
fn single_action_root_in_halving_gets_exactly_one_descent() {
    let game = Corridor { length: 1 };
    let m = Mcts::new(MctsConfig::default()).unwrap();
    let mut p = UniformPredictor::new(&game);
    let res = m
        .run_halving(&game, 0, &mut p, &HalvingConfig::default(), &CancelToken::new())
        .unwrap();
    assert_eq!(res.actions.len(), 1);
    assert_eq!(res.actions[0].visits, 1);
    assert_eq!(res.chosen, Some(()));
    // The child is terminal.
    assert_eq!(res.actions[0].values, Values::new(vec![1.0, 0.0]));
}

#[test]
fn chance_caches_never_exceed_their_bound() {
    let game = DiceRace::new(3, 40);
    for bound in [1usize, 2, 3] {
        let m = Mcts::new(MctsConfig {
            simulations: 300,
            max_chance_branches: bound,
            ..MctsConfig::default()
        })
        .unwrap();
        let mut p = UniformPredictor::new(&game);
        let mut tree = m.tree(&game, game.initial()).unwrap();
        let res = m.search(&mut tree, &mut p, &CancelToken::new()).unwrap();
        assert!(res.counters.evictions > 0, "bound {bound}");
        assert_eq!(res.total_visits(), 300);

        let mut stack = vec![tree.root()];
        while let Some(id) = stack.pop() {
            let Some(d) = tree.node(id).and_then(|n| n.decision()) else {
                continue;
            };
            for a in &d.actions {
                assert!(a.outcomes.len() <= bound);
                stack.extend(a.outcomes.children());
            }
        }
    }
}

/// Every chance cache reachable from the root, with each child's completed visits.
fn cache_contents<G: Game>(tree: &Tree<'_, G>) -> Vec<((NodeId, usize), Vec<(NodeId, u32)>)> {
    let mut out = Vec::new();
    let mut stack = vec![tree.root()];
    while let Some(id) = stack.pop() {
        let Some(d) = tree.node(id).and_then(|n| n.decision()) else {
            continue;
        };
        for (index, a) in d.actions.iter().enumerate() {
            let children: Vec<(NodeId, u32)> = a
                .outcomes
                .children()
                .map(|c| (c, tree.node(c).map_or(0, |n| n.completed())))
                .collect();
            stack.extend(children.iter().map(|(c, _)| *c));
            out.push(((id, index), children));
        }
    }
    out
}

#[test]
fn eviction_removes_the_least_visited_outcome() {
    let game = DiceRace::new(2, 30);
    let cfg = MctsConfig {
        max_chance_branches: 2,
        ..MctsConfig::default()
    };
    let mut tree = Tree::new(&game, &cfg, game.initial()).unwrap();
    let mut p = UniformPredictor::new(&game);
    let mut evicted = 0;
    for _ in 0..400 {
        let before = cache_contents(&tree);
        tree.descend(None).unwrap();
        for ((id, index), entries) in &before {
            let Some(d) = tree.node(*id).and_then(|n| n.decision()) else {
                continue;
            };
            let now: Vec<NodeId> = d.actions[*index].outcomes.children().collect();
            let fewest = entries.iter().map(|(_, v)| *v).min();
            for (child, visits) in entries {
                if !now.contains(child) {
                    assert_eq!(Some(*visits), fewest, "{entries:?}");
                    evicted += 1;
                }
            }
        }
        if tree.pending_requests() >= 8 {
            tree.flush(&mut p).unwrap();
        }
    }
    assert!(evicted > 0);
    assert_eq!(evicted as u64, tree.counters().evictions);
}

#[test]
fn settled_predictions_are_released_after_each_flush() {
    let game = DiceRace::new(2, 30);
    let cfg = MctsConfig {
        max_chance_branches: 1,
        ..MctsConfig::default()
    };
    let mut tree = Tree::new(&game, &cfg, game.initial()).unwrap();
    let mut p = UniformPredictor::new(&game);
    for _ in 0..2000 {
        tree.descend(None).unwrap();
        if tree.pending_requests() >= 8 {
            tree.flush(&mut p).unwrap();
            assert_eq!(tree.retained_predictions(), 0);
        }
    }
    tree.flush(&mut p).unwrap();
    assert!(tree.counters().evictions > 1000);
    assert_eq!(tree.retained_predictions(), 0);
    assert_eq!(tree.suspended(), 0);
    assert_eq!(tree.root_node().unwrap().completed(), 2000);
}

#[test]
fn descents_before_a_flush_spread_over_distinct_actions() {
    let game = NumberPick::new(2, 2);
    let m = Mcts::new(MctsConfig::default()).unwrap();
    let mut tree = m.tree(&game, game.initial()).unwrap();
    for _ in 0..9 {
        tree.descend(None).unwrap();
    }
    let d = tree.root_decision().unwrap();
    assert!(d.actions.iter().all(|a| a.combined() == 1 && a.completed() == 0));
    assert_eq!(tree.suspended(), 9);

    let game = DiceRace::new(4, 30);
    let mut tree = m.tree(&game, game.initial()).unwrap();
    for _ in 0..3 {
        tree.descend(None).unwrap();
    }
    let d = tree.root_decision().unwrap();
    assert!(d.actions.iter().all(|a| a.combined() == 1));
}

#[test]
fn halving_schedule_for_nine_actions() {
    let game = NumberPick::new(2, 2);
    let m = Mcts::new(MctsConfig::default()).unwrap();
    let halving = HalvingConfig {
        simulations: 32,
        initial_action_count: 4,
        ..HalvingConfig::default()
    };
    for seed in 0..5 {
        let m = Mcts::new(MctsConfig {
            seed,
            ..*m.config()
        })
        .unwrap();
        let mut p = UniformPredictor::new(&game);
        let res = m
            .run_halving(&game, game.initial(), &mut p, &halving, &CancelToken::new())
            .unwrap();
        let mut visits: Vec<u32> = res.actions.iter().map(|a| a.visits).collect();
        visits.sort_unstable();
        assert_eq!(visits, vec![0, 0, 0, 0, 0, 4, 4, 12, 12], "seed {seed}");

        let chosen = res.chosen.unwrap();
        assert_eq!(res.get(&chosen).unwrap().visits, 12);
    }
}

#[test]
fn constant_values_pass_through_unchanged() {
    let game = NumberPick::new(2, 2);
    for batch_size in [9, 16] {
        let m = Mcts::new(MctsConfig {
            simulations: 9,
            batch_size,
            ..MctsConfig::default()
        })
        .unwrap();
        let mut p = FaceValuePredictor::new(game, 0.5);
        let res = m
            .run_search(&game, game.initial(), &mut p, &CancelToken::new())
            .unwrap();
        assert_eq!(res.actions.len(), 9);
        for s in &res.actions {
            assert_eq!(s.visits, 1, "{s:?}");
            assert_eq!(s.values, Values::splat(2, 0.5), "{s:?}");
        }
        // Priors follow the face values once the root settled.
        let best = res.actions.iter().max_by(|a, b| a.prior.total_cmp(&b.prior));
        assert_eq!(best.map(|s| s.action), Some(9));
        assert_eq!(res.root_values, Values::splat(2, 0.5));
    }
}

#[test]
fn predicted_values_are_readable_before_and_after_settlement() {
    let game = NumberPick::new(2, 2);
    let m = Mcts::new(MctsConfig::default()).unwrap();
    let mut tree = m.tree(&game, game.initial()).unwrap();
    let before = tree.root_predicted_values().unwrap();
    assert_eq!(before.len(), 2);
    assert_eq!(before, tree.root_predicted_values().unwrap());

    let mut p = FaceValuePredictor::new(game, 0.5);
    tree.flush(&mut p).unwrap();
    assert_eq!(tree.root_predicted_values().unwrap(), Values::splat(2, 0.5));
    assert_eq!(tree.root_predicted_values().unwrap(), Values::splat(2, 0.5));

    // Action placeholders scale with the relative logit.
    let d = tree.root_decision().unwrap();
    let nine = d.actions.iter().find(|a| a.action == 9).unwrap();
    let three = d.actions.iter().find(|a| a.action == 3).unwrap();
    assert!((nine.predicted_value - 0.5).abs() < 1e-6);
    assert!((three.predicted_value - 0.5 / 3.0).abs() < 1e-6);
}

#[test]
fn searches_are_reproducible_from_a_seed() {
    let game = DiceRace::new(2, 30);
    let m = Mcts::new(MctsConfig {
        simulations: 64,
        seed: 42,
        ..MctsConfig::default()
    })
    .unwrap();
    let run = || {
        let mut p = UniformPredictor::new(&game);
        m.run_search(&game, game.initial(), &mut p, &CancelToken::new())
            .unwrap()
    };
    let a = run();
    let b = run();
    let visits = |r: &az_mcts::SearchResult<u8>| r.actions.iter().map(|s| s.visits).collect::<Vec<_>>();
    assert_eq!(visits(&a), visits(&b));
    assert_eq!(a.counters, b.counters);
}
