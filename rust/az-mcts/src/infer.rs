//! Stub predictors.

use az_core::{Game, PredictError, Prediction, Predictor, Values};
use rustc_hash::FxHashMap;

fn zero_logits<G: Game>(game: &G, state: &G::State) -> FxHashMap<G::Action, f32> {
    game.legal_actions(state)
        .into_iter()
        .map(|a| (a, 0.0))
        .collect()
}

/// Uniform policy, equal share of the outcome for every player.
pub struct UniformPredictor<'g, G> {
    game: &'g G,
}

impl<'g, G: Game> UniformPredictor<'g, G> {
    pub fn new(game: &'g G) -> Self {
        Self { game }
    }
}

impl<G: Game> Predictor<G> for UniformPredictor<'_, G> {
    fn infer(&mut self, batch: &[&G::State]) -> Result<Vec<Prediction<G::Action>>, PredictError> {
        let players = self.game.num_players();
        let share = 1.0 / players as f32;
        Ok(batch
            .iter()
            .map(|s| Prediction {
                values: Values::splat(players, share),
                logits: zero_logits(self.game, s),
            })
            .collect())
    }
}

/// Uniform policy with fixed values. Records every batch size it sees.
pub struct ConstantPredictor<'g, G> {
    game: &'g G,
    values: Values,
    pub batches: Vec<usize>,
}

impl<'g, G: Game> ConstantPredictor<'g, G> {
    pub fn new(game: &'g G, values: Values) -> Self {
        Self {
            game,
            values,
            batches: Vec::new(),
        }
    }
}

impl<G: Game> Predictor<G> for ConstantPredictor<'_, G> {
    fn infer(&mut self, batch: &[&G::State]) -> Result<Vec<Prediction<G::Action>>, PredictError> {
        self.batches.push(batch.len());
        Ok(batch
            .iter()
            .map(|s| Prediction {
                values: self.values.clone(),
                logits: zero_logits(self.game, s),
            })
            .collect())
    }
}

/// Fails every call.
#[derive(Debug, Clone)]
pub struct FailingPredictor {
    pub msg: String,
}

impl FailingPredictor {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { msg: msg.into() }
    }
}

impl<G: Game> Predictor<G> for FailingPredictor {
    fn infer(&mut self, _batch: &[&G::State]) -> Result<Vec<Prediction<G::Action>>, PredictError> {
        Err(PredictError::Backend {
            msg: self.msg.clone(),
        })
    }
}
