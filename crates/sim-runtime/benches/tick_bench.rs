use criterion::{criterion_group, criterion_main, Criterion};
use persistence::{MemoryStore, SaveManager};
use sim_core::{GameState, SimConfig, ToolOwnership};
use sim_runtime::Session;

fn bench_ticks(c: &mut Criterion) {
    let mut state = GameState::new(0);
    for id in ["starter", "miniWorm", "autoClick", "miniDdos", "spam"] {
        state
            .tools
            .insert(id.to_string(), ToolOwnership { active: true, clicks: 0 });
    }
    state.upgrades.insert("buildPC".to_string(), true);
    let mut session = Session::new(
        state,
        SimConfig::default(),
        SaveManager::new(MemoryStore::new()),
    );
    let mut now = 1_700_000_000_000_i64;
    c.bench_function("session_tick", |b| {
        b.iter(|| {
            now += 100;
            let _ = session.tick(now);
        })
    });
}

criterion_group!(benches, bench_ticks);
criterion_main!(benches);
