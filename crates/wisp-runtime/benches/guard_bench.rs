//! Guard hot-path benchmarks: synchronous update delivery through the
//! runtime guard, alone and fanned out.

use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use wisp_runtime::{Sinks, Startup, TameWisp, UpdateFlow, Wisp, WispInput, combine};

fn counter_wisp() -> TameWisp<u64> {
    Wisp::new(|_input: WispInput<u64>| {
        let mut seen = 0u64;
        Ok(Startup::from_fn(move |props: u64| {
            seen = seen.wrapping_add(props);
            Ok(UpdateFlow::Done)
        }))
    })
    .tame()
}

fn bench_guard_update(c: &mut Criterion) {
    c.bench_function("guard_update_sync", |b| {
        let instance = counter_wisp().start(Sinks::silent());
        let mut tick = 0u64;
        b.iter(|| {
            tick = tick.wrapping_add(1);
            instance.update(black_box(tick));
        });
        instance.destroy();
    });
}

fn bench_combine_fanout(c: &mut Criterion) {
    c.bench_function("combine_fanout_8", |b| {
        let children: Vec<(String, TameWisp<u64>)> = (0..8)
            .map(|i| (format!("child{i}"), counter_wisp()))
            .collect();
        let children: Vec<(&str, TameWisp<u64>)> = children
            .iter()
            .map(|(id, def)| (id.as_str(), def.clone()))
            .collect();
        let instance = combine(children).start(Sinks::silent());
        let mut tick = 0u64;
        b.iter(|| {
            tick = tick.wrapping_add(1);
            instance.update(black_box(tick));
        });
        instance.destroy();
    });
}

criterion_group!(benches, bench_guard_update, bench_combine_fanout);
criterion_main!(benches);
