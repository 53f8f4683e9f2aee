//! Benchmark for game rolls and ledger postings.
//!
//! TARGET: 1,000,000 rolls per second, 100,000 in-memory postings per second
//!
//! Run with: cargo bench --package stars_economy --bench game_benchmark

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use stars_economy::{
    AllowAll, Amount, Economy, EconomyConfig, GameEngine, GameKind, Ledger, MemoryJournal,
    TxCategory,
};

fn benchmark_single_roll(c: &mut Criterion) {
    let engine = GameEngine::default();
    let mut rng = ChaCha20Rng::seed_from_u64(1);

    let mut group = c.benchmark_group("single_roll");
    for game in GameKind::ALL {
        group.bench_function(game.as_str(), |b| {
            b.iter(|| black_box(engine.play(black_box(game), black_box(Amount::ONE), &mut rng)));
        });
    }
    group.finish();
}

fn benchmark_simulation(c: &mut Criterion) {
    let engine = GameEngine::default();

    let mut group = c.benchmark_group("simulation");
    group.throughput(Throughput::Elements(100_000));
    group.sample_size(10);

    group.bench_function("flip_100k", |b| {
        let mut rng = ChaCha20Rng::seed_from_u64(2);
        b.iter(|| black_box(engine.simulate(GameKind::Flip, Amount::ONE, 100_000, &mut rng)));
    });

    group.finish();
}

fn benchmark_ledger_posting(c: &mut Criterion) {
    let ledger = Ledger::new(Arc::new(MemoryJournal::new()));
    let _ = ledger.open_account(1, "bench", 0);
    let Ok(delta) = Amount::from_parts(0, 200_000).credit() else {
        return;
    };

    c.bench_function("ledger_apply_delta", |b| {
        b.iter(|| black_box(ledger.apply_delta(1, delta, TxCategory::Click, "Click", 0)).ok());
    });
}

fn benchmark_play_round(c: &mut Criterion) {
    let Ok(economy) = Economy::in_memory(EconomyConfig::default(), Arc::new(AllowAll)) else {
        return;
    };
    let economy = economy.with_rng_seed(3);
    let _ = economy.register_account(1, "bench", 0);
    let Ok(credit) = Amount::from_whole(1_000_000_000).credit() else {
        return;
    };
    let _ = economy.ledger().apply_delta(1, credit, TxCategory::Click, "seed", 0);

    c.bench_function("economy_play_flip", |b| {
        b.iter(|| black_box(economy.play(1, "flip", Amount::ONE, 0)).ok());
    });
}

criterion_group!(
    benches,
    benchmark_single_roll,
    benchmark_simulation,
    benchmark_ledger_posting,
    benchmark_play_round
);
criterion_main!(benches);
