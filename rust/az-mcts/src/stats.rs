//! Running value aggregates and engine counters.

use az_core::{PlayerId, Values};

use crate::mcts::SearchError;

/// Incremental per-player mean over every merged value.
///
/// Uses `mean += (v - mean) / n` so the stream can be arbitrarily long without a running sum.
#[derive(Debug, Clone, Default)]
pub struct ValueAggregate {
    mean: Values,
    count: u32,
}

impl ValueAggregate {
    pub fn merge(&mut self, v: &Values) -> Result<(), SearchError> {
        if v.has_nan() {
            return Err(SearchError::NanValues);
        }
        if self.count == 0 {
            self.mean = Values::zeros(v.len());
        } else if self.mean.len() != v.len() {
            return Err(SearchError::ValueLength {
                expected: self.mean.len(),
                got: v.len(),
            });
        }
        self.count += 1;
        let n = self.count as f32;
        for (m, x) in self.mean.iter_mut().zip(v.iter()) {
            *m += (x - *m) / n;
        }
        Ok(())
    }

    /// Number of merged values.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Current mean; empty before the first merge.
    pub fn mean(&self) -> &Values {
        &self.mean
    }

    /// Mean for one player, `None` before the first merge.
    pub fn get(&self, player: PlayerId) -> Option<f32> {
        if self.count == 0 {
            None
        } else {
            self.mean.get(player)
        }
    }
}

/// Diagnostic counters. Never consulted for search decisions.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EngineCounters {
    pub action_nodes: u64,
    pub state_nodes: u64,
    pub terminal_states: u64,
    pub inference_calls: u64,
    pub evictions: u64,
}

/// One coordinator flush as seen by the search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushRecord {
    /// Requests sent in the batch.
    pub batch_size: usize,
    /// Suspended descents resumed by the flush.
    pub resumed: usize,
}
