//! Per-player value vectors.

use std::ops::Index;

use serde::{Deserialize, Serialize};

use crate::game::PlayerId;

/// One value per player, indexed by [`PlayerId`].
///
/// Games report terminal results this way and predictors report value estimates this way, so
/// the engine can average them without knowing how many players a game has.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Values(Vec<f32>);

impl Values {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn zeros(players: usize) -> Self {
        Self(vec![0.0; players])
    }

    /// The same value for every player.
    pub fn splat(players: usize, value: f32) -> Self {
        Self(vec![value; players])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, player: PlayerId) -> Option<f32> {
        self.0.get(player).copied()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &f32> {
        self.0.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut f32> {
        self.0.iter_mut()
    }

    pub fn has_nan(&self) -> bool {
        self.0.iter().any(|v| v.is_nan())
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.0
    }
}

impl From<Vec<f32>> for Values {
    fn from(v: Vec<f32>) -> Self {
        Self(v)
    }
}

impl Index<PlayerId> for Values {
    type Output = f32;

    fn index(&self, player: PlayerId) -> &f32 {
        &self.0[player]
    }
}
