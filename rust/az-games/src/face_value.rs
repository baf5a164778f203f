//! Stub predictor for [`NumberPick`]: constant value, policy logit equal to the face value.

use az_core::{Game, PredictError, Prediction, Predictor, Values};
use rustc_hash::FxHashMap;

use crate::number_pick::{NumberPick, PickState};

#[derive(Debug, Clone)]
pub struct FaceValuePredictor {
    game: NumberPick,
    value: f32,
    /// Size of every batch received.
    pub batches: Vec<usize>,
}

impl FaceValuePredictor {
    pub fn new(game: NumberPick, value: f32) -> Self {
        Self {
            game,
            value,
            batches: Vec::new(),
        }
    }
}

impl Predictor<NumberPick> for FaceValuePredictor {
    fn infer(&mut self, batch: &[&PickState]) -> Result<Vec<Prediction<u8>>, PredictError> {
        self.batches.push(batch.len());
        let players = self.game.num_players();
        Ok(batch
            .iter()
            .map(|s| {
                let logits: FxHashMap<u8, f32> = self
                    .game
                    .legal_actions(s)
                    .into_iter()
                    .map(|a| (a, f32::from(a)))
                    .collect();
                Prediction {
                    values: Values::splat(players, self.value),
                    logits,
                }
            })
            .collect())
    }
}
