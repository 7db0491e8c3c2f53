//! Tests for copy tracers.
//!
//! The recording tracer gives the exact decision sequence of a copy, which
//! pins down the traversal order of the work stack.

use pretty_assertions::assert_eq;
use replica::{
    ClassBuilder, GraphCopier, Heap, ListKind, ProfilingTracer, RecordingTracer, Shape, TraceEvent, Value,
    ValueType, deep_copy_with_tracer,
};

// =============================================================================
// 1. Event Sequences
// =============================================================================

/// Copying a list holding a string and an inner list records every decision in order.
#[test]
fn recording_tracer_event_sequence() {
    let mut heap = Heap::default();
    let text = heap.intern_str("hi").unwrap();
    let inner = heap.new_list(ListKind::ArrayList, vec![]).unwrap();
    let outer = heap
        .new_list(ListKind::Unmodifiable, vec![Value::Ref(text), Value::Ref(inner)])
        .unwrap();

    let mut tracer = RecordingTracer::new();
    let copy = deep_copy_with_tracer(&mut heap, Value::Ref(outer), &mut tracer).unwrap();
    let outer_copy = copy.ref_id().unwrap();
    let inner_copy = heap.items(outer_copy).unwrap()[1].ref_id().unwrap();

    assert_eq!(
        tracer.into_events(),
        vec![
            TraceEvent::Start { root: Some(outer) },
            TraceEvent::Allocate {
                original: outer,
                copy: outer_copy,
                shape: Shape::Sequence,
                fallback: true,
            },
            TraceEvent::Shared { original: text },
            TraceEvent::Allocate {
                original: inner,
                copy: inner_copy,
                shape: Shape::Sequence,
                fallback: false,
            },
            TraceEvent::Fill {
                copy: outer_copy,
                children: 2,
                pending: 1,
            },
            TraceEvent::Fill {
                copy: inner_copy,
                children: 0,
                pending: 0,
            },
            TraceEvent::Finish { copies: 2 },
        ]
    );
}

/// A back edge is recorded as a revisit of the in-progress copy.
#[test]
fn cycle_is_recorded_as_revisit() {
    let mut heap = Heap::default();
    let list = heap.new_list(ListKind::ArrayList, vec![]).unwrap();
    heap.list_push(list, Value::Ref(list)).unwrap();

    let mut tracer = RecordingTracer::new();
    let copy = deep_copy_with_tracer(&mut heap, Value::Ref(list), &mut tracer)
        .unwrap()
        .ref_id()
        .unwrap();
    assert!(tracer.events().contains(&TraceEvent::Revisit { original: list, copy }));
}

/// Immediate roots produce only a start and a finish.
#[test]
fn immediate_root_events() {
    let mut heap = Heap::default();
    let mut tracer = RecordingTracer::new();
    deep_copy_with_tracer(&mut heap, Value::Int(1), &mut tracer).unwrap();
    assert_eq!(
        tracer.events(),
        &[TraceEvent::Start { root: None }, TraceEvent::Finish { copies: 0 }]
    );
}

/// A failed copy ends with a rollback event naming the error.
#[test]
fn rollback_is_recorded() {
    let mut heap = Heap::default();
    let file = heap
        .define_class(ClassBuilder::new("File").field("fd", ValueType::Int))
        .unwrap();
    let f = heap.instantiate(file, &[Value::Int(3)]).unwrap();
    let list = heap
        .new_list(ListKind::ArrayList, vec![Value::Ref(f)])
        .unwrap();

    let mut tracer = RecordingTracer::new();
    deep_copy_with_tracer(&mut heap, Value::Ref(list), &mut tracer).unwrap_err();
    assert_eq!(
        tracer.events().last(),
        Some(&TraceEvent::Rollback {
            freed: 1,
            error: "cannot instantiate `File` without running its initializer".to_owned(),
        })
    );
}

/// Events serialize as tagged JSON objects.
#[test]
fn events_serialize_to_json() {
    let mut heap = Heap::default();
    let list = heap.new_list(ListKind::ArrayList, vec![]).unwrap();
    let mut tracer = RecordingTracer::new();
    deep_copy_with_tracer(&mut heap, Value::Ref(list), &mut tracer).unwrap();

    let json = serde_json::to_string(&tracer.events()[1]).unwrap();
    assert_eq!(
        json,
        r#"{"event":"allocate","original":0,"copy":1,"shape":"Sequence","fallback":false}"#
    );
}

// =============================================================================
// 2. Profiling
// =============================================================================

/// The profiling report counts copies, shares, revisits and fallbacks across calls.
#[test]
fn profiling_report_counts() {
    let mut heap = Heap::default();
    let text = heap.str_value("s").unwrap();
    let shared = heap.new_list(ListKind::Unmodifiable, vec![text]).unwrap();
    let root = heap
        .new_list(ListKind::ArrayList, vec![Value::Ref(shared), Value::Ref(shared)])
        .unwrap();

    let mut tracer = ProfilingTracer::new();
    deep_copy_with_tracer(&mut heap, Value::Ref(root), &mut tracer).unwrap();
    deep_copy_with_tracer(&mut heap, Value::Ref(shared), &mut tracer).unwrap();

    let report = tracer.report();
    assert_eq!(report.copies, 3);
    assert_eq!(report.shared, 2);
    assert_eq!(report.revisits, 1);
    assert_eq!(report.fallbacks, 2);
    assert_eq!(report.children, 4);
    assert_eq!(report.shape_counts, vec![(Shape::Sequence, 3)]);
    assert_eq!(report.rollbacks, 0);
    assert!(report.to_string().contains("Copies allocated:   3"));
}

// =============================================================================
// 3. Copier Reuse
// =============================================================================

/// The copier exposes the visited table of its most recent call.
#[test]
fn copier_exposes_visited_table() {
    let mut heap = Heap::default();
    let a = heap.new_list(ListKind::ArrayList, vec![]).unwrap();
    let b = heap.new_list(ListKind::ArrayList, vec![Value::Ref(a)]).unwrap();

    let mut copier = GraphCopier::new(&mut heap, RecordingTracer::new());
    let copy = copier.copy(Value::Ref(b)).unwrap().ref_id().unwrap();
    let visited = copier.visited();
    assert_eq!(visited.len(), 2);
    assert_eq!(visited.get(b), Some(copy));
    assert_eq!(visited.copies()[0], copy);

    copier.copy(Value::Ref(a)).unwrap();
    assert_eq!(copier.visited().len(), 1);
    assert_eq!(copier.visited().get(b), None);

    let events = copier.into_tracer().into_events();
    let finishes = events.iter().filter(|e| matches!(e, TraceEvent::Finish { .. })).count();
    assert_eq!(finishes, 2);
}
