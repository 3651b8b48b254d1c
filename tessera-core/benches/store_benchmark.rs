use criterion::{criterion_group, criterion_main, Criterion};
use serde_json::{json, Map, Value};
use std::hint::black_box;
use tessera_core::{DocumentReplica, DocumentStore, Element, WriteOrigin};

/// Forest of `frames` containers with `per_frame` children each.
fn build_forest(frames: usize, per_frame: usize) -> Vec<Element> {
    (0..frames)
        .map(|f| {
            (0..per_frame).fold(Element::with_id(format!("frame-{f}"), "Frame"), |frame, c| {
                frame.with_child(
                    Element::with_id(format!("el-{f}-{c}"), "Text")
                        .with_field("content", json!("lorem ipsum")),
                )
            })
        })
        .collect()
}

fn patch() -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("color".into(), json!("#ff0000"));
    map
}

fn bench_update_element(c: &mut Criterion) {
    let store = DocumentStore::new();
    store.load_elements(build_forest(20, 50), true);

    c.bench_function("store_update_1k_nodes", |b| {
        b.iter(|| {
            black_box(store.update_element(black_box("el-19-49"), patch()));
        })
    });
}

fn bench_undo_redo(c: &mut Criterion) {
    let store = DocumentStore::new();
    store.load_elements(build_forest(20, 50), true);
    store.update_element("el-0-0", patch());

    c.bench_function("store_undo_redo_1k_nodes", |b| {
        b.iter(|| {
            store.undo();
            black_box(store.redo());
        })
    });
}

fn bench_replica_write(c: &mut Criterion) {
    let replica = DocumentReplica::new();
    let forest = build_forest(20, 50);

    c.bench_function("replica_write_1k_nodes", |b| {
        b.iter(|| {
            replica.write(black_box(&forest), &WriteOrigin::Local).unwrap();
        })
    });
}

fn bench_replica_read(c: &mut Criterion) {
    let replica = DocumentReplica::new();
    replica.write(&build_forest(20, 50), &WriteOrigin::Sync).unwrap();

    c.bench_function("replica_read_1k_nodes", |b| {
        b.iter(|| {
            black_box(replica.read().unwrap());
        })
    });
}

criterion_group!(
    benches,
    bench_update_element,
    bench_undo_redo,
    bench_replica_write,
    bench_replica_read
);
criterion_main!(benches);
