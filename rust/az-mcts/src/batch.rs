//! Batching coordinator: many descents, one predictor call per flush.
//!
//! `submit` hands out a [`Ticket`] that stays unsettled until the next `flush`. A flush sends
//! every queued snapshot to the predictor in submission order and settles each ticket from the
//! response at the same position. Settled results stay readable until the owner calls
//! [`Coordinator::release`], so both the node that owns a request and a descent waiting on it
//! can read it.

use std::rc::Rc;

use az_core::{Game, PredictError, Prediction, Predictor};
use rustc_hash::FxHashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ticket {
    pub request_id: u32,
}

/// State of one submitted request.
#[derive(Debug)]
pub enum Settlement<'a, A> {
    Pending,
    Ready(&'a Prediction<A>),
    Failed(&'a PredictError),
}

pub struct Coordinator<G: Game> {
    queue: Vec<(Ticket, Rc<G::State>)>,
    results: FxHashMap<Ticket, Result<Prediction<G::Action>, PredictError>>,
    next_request: u32,
    inference_calls: u64,
    max_batch: usize,
}

impl<G: Game> Coordinator<G> {
    pub fn new() -> Self {
        Self {
            queue: Vec::new(),
            results: FxHashMap::default(),
            next_request: 0,
            inference_calls: 0,
            max_batch: 0,
        }
    }

    pub fn submit(&mut self, snapshot: Rc<G::State>) -> Ticket {
        let ticket = Ticket {
            request_id: self.next_request,
        };
        self.next_request += 1;
        self.queue.push((ticket, snapshot));
        ticket
    }

    /// Submissions not yet flushed.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn inference_calls(&self) -> u64 {
        self.inference_calls
    }

    /// Largest batch sent so far.
    pub fn max_batch(&self) -> usize {
        self.max_batch
    }

    /// Settled results still held.
    pub fn retained(&self) -> usize {
        self.results.len()
    }

    /// `Pending` for tickets not flushed yet, and for released ones.
    pub fn settlement(&self, ticket: Ticket) -> Settlement<'_, G::Action> {
        match self.results.get(&ticket) {
            Some(Ok(p)) => Settlement::Ready(p),
            Some(Err(e)) => Settlement::Failed(e),
            None => Settlement::Pending,
        }
    }

    /// Drop the result of a settled ticket once nobody needs to read it again.
    pub fn release(&mut self, ticket: Ticket) {
        self.results.remove(&ticket);
    }

    /// Send every queued snapshot in one predictor call and settle the matching tickets.
    ///
    /// Returns the settled tickets in submission order. With an empty queue this is a no-op and
    /// the predictor is not called. On failure every ticket of the batch is settled with the
    /// same error, which is also returned.
    pub fn flush<P>(&mut self, predictor: &mut P) -> Result<Vec<Ticket>, PredictError>
    where
        P: Predictor<G> + ?Sized,
    {
        if self.queue.is_empty() {
            return Ok(Vec::new());
        }
        let queue = std::mem::take(&mut self.queue);
        let tickets: Vec<Ticket> = queue.iter().map(|(t, _)| *t).collect();
        let batch: Vec<&G::State> = queue.iter().map(|(_, s)| s.as_ref()).collect();

        self.inference_calls += 1;
        self.max_batch = self.max_batch.max(batch.len());

        let outcome = predictor.infer(&batch).and_then(|preds| {
            if preds.len() != batch.len() {
                Err(PredictError::BatchSize {
                    expected: batch.len(),
                    got: preds.len(),
                })
            } else {
                Ok(preds)
            }
        });

        match outcome {
            Ok(preds) => {
                for (ticket, pred) in tickets.iter().zip(preds) {
                    self.results.insert(*ticket, Ok(pred));
                }
                Ok(tickets)
            }
            Err(e) => {
                for ticket in &tickets {
                    self.results.insert(*ticket, Err(e.clone()));
                }
                Err(e)
            }
        }
    }
}

impl<G: Game> Default for Coordinator<G> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use az_core::{PlayerId, Values};
    use rand::RngCore;
    use rustc_hash::FxHashMap;

    /// Snapshots are plain integers; the predictor echoes them back as the value.
    struct Echo;

    impl Game for Echo {
        type State = u32;
        type Action = u32;
        type ChanceKey = ();

        fn num_players(&self) -> usize {
            1
        }
        fn legal_actions(&self, _state: &u32) -> Vec<u32> {
            Vec::new()
        }
        fn apply(&self, state: &u32, _action: &u32, _rng: &mut dyn RngCore) -> (u32, ()) {
            (*state, ())
        }
        fn result(&self, _state: &u32) -> Option<Values> {
            None
        }
        fn current_player(&self, _state: &u32) -> Option<PlayerId> {
            Some(0)
        }
    }

    #[derive(Default)]
    struct EchoPredictor {
        batches: Vec<Vec<u32>>,
        fail: bool,
        short: bool,
    }

    impl Predictor<Echo> for EchoPredictor {
        fn infer(&mut self, batch: &[&u32]) -> Result<Vec<Prediction<u32>>, PredictError> {
            self.batches.push(batch.iter().map(|s| **s).collect());
            if self.fail {
                return Err(PredictError::Backend {
                    msg: "boom".to_string(),
                });
            }
            let n = if self.short { batch.len() - 1 } else { batch.len() };
            Ok(batch[..n]
                .iter()
                .map(|s| Prediction {
                    values: Values::new(vec![**s as f32]),
                    logits: FxHashMap::default(),
                })
                .collect())
        }
    }

    fn value_of(c: &Coordinator<Echo>, t: Ticket) -> Option<f32> {
        match c.settlement(t) {
            Settlement::Ready(p) => Some(p.values[0]),
            _ => None,
        }
    }

    #[test]
    fn flush_settles_in_submission_order_with_one_call() {
        let mut c = Coordinator::<Echo>::new();
        let mut p = EchoPredictor::default();
        let t: Vec<Ticket> = (10..15).map(|s| c.submit(Rc::new(s))).collect();
        assert_eq!(c.pending(), 5);
        assert!(matches!(c.settlement(t[0]), Settlement::Pending));

        let settled = c.flush(&mut p).unwrap();
        assert_eq!(settled, t);
        assert_eq!(c.pending(), 0);
        assert_eq!(c.inference_calls(), 1);
        assert_eq!(c.max_batch(), 5);
        assert_eq!(p.batches, vec![vec![10, 11, 12, 13, 14]]);
        for (i, ticket) in t.iter().enumerate() {
            assert_eq!(value_of(&c, *ticket), Some(10.0 + i as f32));
        }
    }

    #[test]
    fn released_results_are_dropped() {
        let mut c = Coordinator::<Echo>::new();
        let mut p = EchoPredictor::default();
        let a = c.submit(Rc::new(1));
        let b = c.submit(Rc::new(2));
        c.flush(&mut p).unwrap();
        assert_eq!(c.retained(), 2);

        c.release(a);
        assert_eq!(c.retained(), 1);
        assert!(matches!(c.settlement(a), Settlement::Pending));
        assert_eq!(value_of(&c, b), Some(2.0));

        // Ids keep counting after a release.
        let next = c.submit(Rc::new(3));
        assert!(next > b);
    }

    #[test]
    fn empty_flush_is_a_noop() {
        let mut c = Coordinator::<Echo>::new();
        let mut p = EchoPredictor::default();
        assert!(c.flush(&mut p).unwrap().is_empty());
        assert_eq!(c.inference_calls(), 0);
        assert_eq!(c.max_batch(), 0);
        assert!(p.batches.is_empty());
    }

    #[test]
    fn failure_settles_every_request_of_the_batch() {
        let mut c = Coordinator::<Echo>::new();
        let mut ok = EchoPredictor::default();
        let first = c.submit(Rc::new(1));
        c.flush(&mut ok).unwrap();

        let a = c.submit(Rc::new(2));
        let b = c.submit(Rc::new(3));
        let mut bad = EchoPredictor {
            fail: true,
            ..EchoPredictor::default()
        };
        let err = c.flush(&mut bad).unwrap_err();
        assert!(matches!(err, PredictError::Backend { .. }));
        for t in [a, b] {
            match c.settlement(t) {
                Settlement::Failed(e) => assert_eq!(e, &err),
                other => panic!("expected failure, got {other:?}"),
            }
        }
        // Earlier batches are untouched.
        assert_eq!(value_of(&c, first), Some(1.0));
        assert_eq!(c.pending(), 0);
    }

    #[test]
    fn short_response_is_a_batch_size_error() {
        let mut c = Coordinator::<Echo>::new();
        let mut p = EchoPredictor {
            short: true,
            ..EchoPredictor::default()
        };
        let t = c.submit(Rc::new(1));
        let _ = c.submit(Rc::new(2));
        let err = c.flush(&mut p).unwrap_err();
        assert_eq!(
            err,
            PredictError::BatchSize {
                expected: 2,
                got: 1
            }
        );
        assert!(matches!(c.settlement(t), Settlement::Failed(_)));
    }
}
