//! Random playouts for the playout value mode.

use az_core::{Game, Values};
use rand::{Rng, RngCore};

use crate::mcts::SearchError;

/// Picks moves during a playout.
pub trait PlayoutPolicy<G: Game> {
    /// Index into `actions`, or `None` if no move can be made.
    fn choose(
        &mut self,
        game: &G,
        state: &G::State,
        actions: &[G::Action],
        rng: &mut dyn RngCore,
    ) -> Option<usize>;
}

/// Uniformly random legal moves.
#[derive(Debug, Default, Clone, Copy)]
pub struct UniformPlayout;

impl<G: Game> PlayoutPolicy<G> for UniformPlayout {
    fn choose(
        &mut self,
        _game: &G,
        _state: &G::State,
        actions: &[G::Action],
        rng: &mut dyn RngCore,
    ) -> Option<usize> {
        if actions.is_empty() {
            None
        } else {
            Some(rng.gen_range(0..actions.len()))
        }
    }
}

/// Play `start` out to a terminal state and return its result.
pub fn playout<G, P>(
    game: &G,
    start: &G::State,
    policy: &mut P,
    rng: &mut dyn RngCore,
) -> Result<Values, SearchError>
where
    G: Game,
    P: PlayoutPolicy<G> + ?Sized,
{
    let players = game.num_players();
    let mut owned: Option<G::State> = None;
    loop {
        let state = owned.as_ref().unwrap_or(start);
        if let Some(result) = game.result(state) {
            if result.len() != players {
                return Err(SearchError::ValueLength {
                    expected: players,
                    got: result.len(),
                });
            }
            return Ok(result);
        }
        if game.current_player(state).is_none() {
            return Err(SearchError::TerminalMismatch);
        }
        let actions = game.legal_actions(state);
        let i = policy
            .choose(game, state, &actions, rng)
            .filter(|&i| i < actions.len())
            .ok_or(SearchError::NoSelectableAction)?;
        let (next, _) = game.apply(state, &actions[i], rng);
        owned = Some(next);
    }
}
