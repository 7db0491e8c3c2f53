// Use codspeed-criterion-compat when running on CodSpeed (CI), real criterion otherwise (for flamegraphs)
#[cfg(codspeed)]
use codspeed_criterion_compat::{Bencher, Criterion, black_box, criterion_group, criterion_main};
#[cfg(not(codspeed))]
use criterion::{Bencher, Criterion, black_box, criterion_group, criterion_main};
use replica::{ClassBuilder, Heap, HeapId, ListKind, MapKind, Value, ValueType, deep_copy};

/// Copies `root` once per iteration, collecting the copy afterwards so the heap stays flat.
fn run_copy(bench: &mut Bencher, mut heap: Heap, root: HeapId, expected_copies: usize) {
    let live = heap.heap_stats().live_objects;
    deep_copy(&mut heap, Value::Ref(root)).unwrap();
    assert_eq!(heap.heap_stats().live_objects, live + expected_copies);
    heap.collect_garbage([root]);

    bench.iter(|| {
        let copy = deep_copy(&mut heap, Value::Ref(root)).unwrap();
        black_box(copy);
        heap.collect_garbage([root]);
    });
}

/// A map of 1000 keys, every value pointing at one of ten shared lists.
fn wide_shared_graph() -> (Heap, HeapId) {
    let mut heap = Heap::default();
    let shared: Vec<Value> = (0..10)
        .map(|i| Value::Ref(heap.new_list(ListKind::ArrayList, vec![Value::Int(i); 8]).unwrap()))
        .collect();
    let entries = (0..1000).map(|i| (Value::Int(i), shared[(i % 10) as usize])).collect();
    let map = heap.new_map(MapKind::LinkedHashMap, entries).unwrap();
    (heap, map)
}

/// A singly linked chain of 10 000 instances.
fn long_chain() -> (Heap, HeapId) {
    let mut heap = Heap::default();
    let node = heap
        .define_class(
            ClassBuilder::new("Node")
                .field("value", ValueType::Int)
                .field("next", ValueType::Object)
                .allow_bare_alloc(),
        )
        .unwrap();
    let mut head = Value::None;
    for i in 0..10_000 {
        head = Value::Ref(heap.instantiate(node, &[Value::Int(i), head]).unwrap());
    }
    let head = head.ref_id().unwrap();
    (heap, head)
}

/// Configures the copy benchmark group.
fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("wide_shared_graph", |b| {
        let (heap, root) = wide_shared_graph();
        run_copy(b, heap, root, 11);
    });
    c.bench_function("long_chain_10000", |b| {
        let (heap, root) = long_chain();
        run_copy(b, heap, root, 10_000);
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
