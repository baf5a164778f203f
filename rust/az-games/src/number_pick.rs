//! NumberPick: each player in turn adds a face value 1..=9 to their total, for a fixed number
//! of rounds. Highest total wins; ties split the point.

use az_core::{Game, PlayerId, Values};
use rand::RngCore;

use crate::winner_shares;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PickState {
    pub totals: Vec<u32>,
    /// Moves made so far.
    pub turn: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumberPick {
    players: usize,
    rounds: u32,
}

impl NumberPick {
    pub const FACES: u8 = 9;

    /// `players` is clamped to at least 1.
    pub fn new(players: usize, rounds: u32) -> Self {
        Self {
            players: players.max(1),
            rounds,
        }
    }

    pub fn initial(&self) -> PickState {
        PickState {
            totals: vec![0; self.players],
            turn: 0,
        }
    }

    fn is_over(&self, state: &PickState) -> bool {
        state.turn >= self.players as u32 * self.rounds
    }
}

impl Game for NumberPick {
    type State = PickState;
    type Action = u8;
    type ChanceKey = ();

    fn num_players(&self) -> usize {
        self.players
    }

    fn legal_actions(&self, state: &PickState) -> Vec<u8> {
        if self.is_over(state) {
            Vec::new()
        } else {
            (1..=Self::FACES).collect()
        }
    }

    fn apply(&self, state: &PickState, action: &u8, _rng: &mut dyn RngCore) -> (PickState, ()) {
        let mut next = state.clone();
        if let Some(p) = self.current_player(state) {
            next.totals[p] += u32::from(*action);
            next.turn += 1;
        }
        (next, ())
    }

    fn result(&self, state: &PickState) -> Option<Values> {
        self.is_over(state).then(|| winner_shares(&state.totals))
    }

    fn current_player(&self, state: &PickState) -> Option<PlayerId> {
        if self.is_over(state) {
            None
        } else {
            Some(state.turn as usize % self.players)
        }
    }
}
