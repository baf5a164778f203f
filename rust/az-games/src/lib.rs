//! Reference games for the az search engine.
//!
//! - [`NumberPick`]: deterministic, every player picks a face value 1..=9 each round
//! - [`DiceRace`]: players push their luck with 1 to 3 dice to reach a target first

pub mod dice_race;
pub mod face_value;
pub mod number_pick;

pub use dice_race::{DiceRace, RaceState};
pub use face_value::FaceValuePredictor;
pub use number_pick::{NumberPick, PickState};

use az_core::Values;

/// Split one point evenly between the players with the highest score.
pub(crate) fn winner_shares(scores: &[u32]) -> Values {
    let best = scores.iter().copied().max().unwrap_or(0);
    let winners = scores.iter().filter(|&&s| s == best).count().max(1);
    Values::new(
        scores
            .iter()
            .map(|&s| if s == best { 1.0 / winners as f32 } else { 0.0 })
            .collect(),
    )
}

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
