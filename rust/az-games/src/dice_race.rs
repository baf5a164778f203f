//! DiceRace: on each turn the player to move rolls 1, 2 or 3 dice. Any 1 busts the roll;
//! otherwise the pips are added to their position. First to reach the target wins. After
//! `max_turns` moves the leaders split the point.

use az_core::{Game, PlayerId, Values};
use rand::{Rng, RngCore};

use crate::winner_shares;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RaceState {
    pub positions: Vec<u32>,
    pub turn: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiceRace {
    players: usize,
    target: u32,
    max_turns: u32,
}

impl DiceRace {
    pub const MAX_DICE: u8 = 3;

    /// 2 to 4 players; `players` is clamped into that range.
    pub fn new(players: usize, target: u32) -> Self {
        let players = players.clamp(2, 4);
        Self {
            players,
            target,
            max_turns: 12 * players as u32,
        }
    }

    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn initial(&self) -> RaceState {
        RaceState {
            positions: vec![0; self.players],
            turn: 0,
        }
    }

    fn is_over(&self, state: &RaceState) -> bool {
        state.turn >= self.max_turns || state.positions.iter().any(|&p| p >= self.target)
    }
}

impl Game for DiceRace {
    type State = RaceState;
    type Action = u8;
    /// Sorted dice faces.
    type ChanceKey = Vec<u8>;

    fn num_players(&self) -> usize {
        self.players
    }

    fn legal_actions(&self, state: &RaceState) -> Vec<u8> {
        if self.is_over(state) {
            Vec::new()
        } else {
            (1..=Self::MAX_DICE).collect()
        }
    }

    fn apply(
        &self,
        state: &RaceState,
        action: &u8,
        rng: &mut dyn RngCore,
    ) -> (RaceState, Vec<u8>) {
        let mut dice: Vec<u8> = (0..*action).map(|_| rng.gen_range(1..=6)).collect();
        dice.sort_unstable();
        let mut next = state.clone();
        if let Some(p) = self.current_player(state) {
            if !dice.contains(&1) {
                next.positions[p] += dice.iter().map(|&d| u32::from(d)).sum::<u32>();
            }
            next.turn += 1;
        }
        (next, dice)
    }

    fn result(&self, state: &RaceState) -> Option<Values> {
        self.is_over(state).then(|| winner_shares(&state.positions))
    }

    fn current_player(&self, state: &RaceState) -> Option<PlayerId> {
        if self.is_over(state) {
            None
        } else {
            Some(state.turn as usize % self.players)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn equal_keys_mean_equal_states() {
        let game = DiceRace::new(3, 40);
        let s = game.initial();
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        for _ in 0..200 {
            let (a, ka) = game.apply(&s, &2, &mut rng);
            let (b, kb) = game.apply(&s, &2, &mut rng);
            if ka == kb {
                assert_eq!(a, b);
            }
            assert_eq!(ka.len(), 2);
        }
    }

    #[test]
    fn a_one_busts_the_roll() {
        let game = DiceRace::new(2, 40);
        let s = game.initial();
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        for _ in 0..200 {
            let (next, dice) = game.apply(&s, &3, &mut rng);
            let expected: u32 = if dice.contains(&1) {
                0
            } else {
                dice.iter().map(|&d| u32::from(d)).sum()
            };
            assert_eq!(next.positions[0], expected);
            assert_eq!(game.current_player(&next), Some(1));
        }
    }

    #[test]
    fn reaching_the_target_ends_the_race() {
        let game = DiceRace::new(4, 10);
        let s = RaceState {
            positions: vec![3, 12, 0, 9],
            turn: 5,
        };
        assert_eq!(game.current_player(&s), None);
        assert_eq!(
            game.result(&s),
            Some(Values::new(vec![0.0, 1.0, 0.0, 0.0]))
        );
    }

    #[test]
    fn turn_limit_splits_between_leaders() {
        let game = DiceRace::new(2, 100).with_max_turns(4);
        let s = RaceState {
            positions: vec![20, 20],
            turn: 4,
        };
        assert_eq!(game.result(&s), Some(Values::new(vec![0.5, 0.5])));
    }
}
