use criterion::{criterion_group, criterion_main, Criterion};
use serde_json::json;
use sitehub_realtime::{ChannelRegistry, MemoryHub, RealtimeConfig, RowChange, Subscription};
use std::hint::black_box;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

fn registry(hub: &MemoryHub) -> ChannelRegistry {
    let _ = env_logger::builder().is_test(true).try_init();
    ChannelRegistry::new(
        RealtimeConfig::new("mem://bench", "anon"),
        Arc::new(hub.connect()),
    )
}

fn bench_subscribe_unsubscribe(c: &mut Criterion) {
    let hub = MemoryHub::new();
    let registry = registry(&hub);

    c.bench_function("subscribe_unsubscribe_cold", |b| {
        b.iter(|| {
            let sub = registry.subscribe_to_project_tasks(black_box("proj-1"), |_| {});
            sub.unsubscribe();
        })
    });
}

fn bench_subscribe_shared(c: &mut Criterion) {
    let hub = MemoryHub::new();
    let registry = registry(&hub);
    // Keeps the channel open so every iteration hits the shared path
    let _anchor = registry.subscribe_to_project_tasks("proj-1", |_| {});

    c.bench_function("subscribe_unsubscribe_shared", |b| {
        b.iter(|| {
            let sub = registry.subscribe_to_project_tasks(black_box("proj-1"), |_| {});
            sub.unsubscribe();
        })
    });
}

fn bench_fan_out_100_listeners(c: &mut Criterion) {
    let hub = MemoryHub::new();
    let registry = registry(&hub);
    let hits = Arc::new(AtomicU64::new(0));

    let _subs: Vec<Subscription> = (0..100)
        .map(|_| {
            let hits = hits.clone();
            registry.subscribe_to_notifications("user-1", move |_| {
                hits.fetch_add(1, Ordering::Relaxed);
            })
        })
        .collect();

    let change = RowChange::Insert {
        table: "notifications".into(),
        record: json!({"id": 1, "user_id": "user-1"}),
    };

    c.bench_function("fan_out_1_event_100_listeners", |b| {
        b.iter(|| {
            black_box(hub.emit_row_change("public", change.clone()));
        })
    });
}

fn bench_broadcast_transient(c: &mut Criterion) {
    let hub = MemoryHub::new();
    let sender = registry(&hub);
    let receiver = registry(&hub);
    let _sub = receiver.subscribe_to_broadcast("site-7", "ping", |_| {});

    c.bench_function("broadcast_transient_channel", |b| {
        b.iter(|| {
            sender.broadcast("site-7", "ping", json!({"x": 1}));
        })
    });
}

criterion_group!(
    benches,
    bench_subscribe_unsubscribe,
    bench_subscribe_shared,
    bench_fan_out_100_listeners,
    bench_broadcast_transient,
);
criterion_main!(benches);
