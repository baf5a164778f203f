//! Predictor contract: batched value/policy inference.

use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::game::Game;
use crate::values::Values;

/// Value and policy estimate for one snapshot.
#[derive(Debug, Clone)]
pub struct Prediction<A> {
    /// Expected outcome for every player.
    pub values: Values,
    /// Unnormalized policy logit per action. Must cover every legal action.
    pub logits: FxHashMap<A, f32>,
}

/// Failure of a whole predictor batch.
///
/// `Clone` so that one failure can settle every request that was part of the failed batch.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PredictError {
    #[error("predictor backend failed: {msg}")]
    Backend { msg: String },
    #[error("predictor returned {got} results for a batch of {expected}")]
    BatchSize { expected: usize, got: usize },
}

/// Batched inference.
///
/// Contract: the returned vector has exactly one entry per input snapshot, in input order.
/// Retrying is the implementation's business; callers treat an `Err` as final.
pub trait Predictor<G: Game> {
    fn infer(&mut self, batch: &[&G::State]) -> Result<Vec<Prediction<G::Action>>, PredictError>;
}

impl<G: Game, P: Predictor<G> + ?Sized> Predictor<G> for &mut P {
    fn infer(&mut self, batch: &[&G::State]) -> Result<Vec<Prediction<G::Action>>, PredictError> {
        (**self).infer(batch)
    }
}
