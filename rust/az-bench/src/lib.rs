//! Shared fixtures for the az benches.

use az_core::Values;
use az_games::NumberPick;
use az_mcts::{CancelToken, ConstantPredictor, Mcts, MctsConfig, SearchError, Tree};

/// A NumberPick tree after `simulations` UCB descents, with every request flushed.
pub fn warm_tree(game: &NumberPick, simulations: u32) -> Result<Tree<'_, NumberPick>, SearchError> {
    let mcts = Mcts::new(MctsConfig {
        simulations,
        ..MctsConfig::default()
    })?;
    let mut predictor = ConstantPredictor::new(game, Values::splat(2, 0.5));
    let mut tree = mcts.tree(game, game.initial())?;
    mcts.search(&mut tree, &mut predictor, &CancelToken::new())?;
    Ok(tree)
}
