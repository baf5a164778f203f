//! Game contract consumed by the search engine.

use std::fmt::Debug;
use std::hash::Hash;

use rand::RngCore;

use crate::values::Values;

/// Index of a player in `0..Game::num_players()`.
pub type PlayerId = usize;

/// A sequential game for 2 or more players with chance transitions.
///
/// The engine never inspects `State`; it only calls back into these methods. All randomness
/// flows through the `rng` passed to [`Game::apply`] so searches are reproducible from a seed.
pub trait Game {
    type State;
    type Action: Clone + Eq + Hash + Debug;
    /// Identifies the non-deterministic part of a transition. Equal keys for the same
    /// `(state, action)` must denote the same resulting state.
    type ChanceKey: Clone + Eq + Debug;

    fn num_players(&self) -> usize;

    /// Legal actions in `state`, in a stable order. Empty only for terminal states.
    fn legal_actions(&self, state: &Self::State) -> Vec<Self::Action>;

    /// Apply `action`, sampling any chance outcome from `rng`.
    fn apply(
        &self,
        state: &Self::State,
        action: &Self::Action,
        rng: &mut dyn RngCore,
    ) -> (Self::State, Self::ChanceKey);

    /// Per-player final result, or `None` while the game is still running.
    fn result(&self, state: &Self::State) -> Option<Values>;

    /// Player to move, or `None` once the game is over.
    fn current_player(&self, state: &Self::State) -> Option<PlayerId>;
}
