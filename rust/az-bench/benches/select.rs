use criterion::{black_box, criterion_group, criterion_main, Criterion};

use az_bench::warm_tree;
use az_games::NumberPick;
use az_mcts::select::{improved_logits, select_improved, select_ucb, C_SCALE, C_VISIT};

fn bench_select(c: &mut Criterion) {
    let game = NumberPick::new(2, 3);
    let tree = warm_tree(&game, 256).unwrap();
    let root = tree.root_node().unwrap();
    let decision = tree.root_decision().unwrap();
    let parent = root.combined();

    c.bench_function("az_mcts_select_ucb", |b| {
        b.iter(|| {
            black_box(select_ucb(
                black_box(decision),
                black_box(parent),
                black_box(std::f32::consts::SQRT_2),
                false,
            ))
        })
    });

    c.bench_function("az_mcts_select_improved", |b| {
        b.iter(|| black_box(select_improved(black_box(decision), 0.5, C_VISIT, C_SCALE)))
    });

    c.bench_function("az_mcts_improved_logits", |b| {
        b.iter(|| black_box(improved_logits(black_box(decision), 0.5, C_VISIT, C_SCALE)))
    });
}

criterion_group!(benches, bench_select);
criterion_main!(benches);
