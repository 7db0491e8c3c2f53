//! Tests for cycle and sharing detection.
//!
//! Every original reachable more than once must map to exactly one copy, and
//! back edges in the original must become back edges in the copy.

use pretty_assertions::assert_eq;
use replica::{ClassBuilder, Heap, HeapId, ListKind, MapKind, QueueKind, SetKind, Value, ValueType, deep_copy};

fn define_node(heap: &mut Heap) -> HeapId {
    heap.define_class(
        ClassBuilder::new("Node")
            .field("value", ValueType::Int)
            .field("next", ValueType::Object)
            .allow_bare_alloc(),
    )
    .unwrap()
}

fn copy_ref(heap: &mut Heap, id: HeapId) -> HeapId {
    deep_copy(heap, Value::Ref(id)).unwrap().ref_id().unwrap()
}

// =============================================================================
// 1. Self References
// =============================================================================

/// A node whose `next` points at itself copies to a node pointing at the copy.
#[test]
fn self_referencing_instance() {
    let mut heap = Heap::default();
    let node = define_node(&mut heap);
    let n = heap.instantiate(node, &[Value::Int(1), Value::None]).unwrap();
    heap.set_field(n, "next", Value::Ref(n)).unwrap();

    let copy = copy_ref(&mut heap, n);
    assert_ne!(copy, n);
    assert_eq!(heap.get_field(copy, "next").unwrap(), Value::Ref(copy));
    assert_eq!(heap.get_field(n, "next").unwrap(), Value::Ref(n));
}

/// A list containing itself copies to a list containing its copy.
#[test]
fn self_containing_list() {
    let mut heap = Heap::default();
    let list = heap.new_list(ListKind::ArrayList, vec![]).unwrap();
    heap.list_push(list, Value::Ref(list)).unwrap();
    heap.list_push(list, Value::Int(2)).unwrap();

    let copy = copy_ref(&mut heap, list);
    assert_eq!(heap.items(copy).unwrap(), vec![Value::Ref(copy), Value::Int(2)]);
    assert_eq!(Value::Ref(copy).repr(&heap), "[[...], 2]");
}

/// A map holding itself as a value copies to a map holding its copy.
#[test]
fn self_containing_map() {
    let mut heap = Heap::default();
    let map = heap.new_map(MapKind::HashMap, vec![]).unwrap();
    let key = heap.str_value("me").unwrap();
    heap.map_insert(map, key, Value::Ref(map)).unwrap();

    let copy = copy_ref(&mut heap, map);
    assert_eq!(heap.map_get(copy, key).unwrap(), Some(Value::Ref(copy)));
}

/// A set containing itself copies to a set containing its copy.
#[test]
fn self_containing_set() {
    let mut heap = Heap::default();
    let set = heap.new_set(SetKind::HashSet, vec![Value::Int(1)]).unwrap();
    heap.set_add(set, Value::Ref(set)).unwrap();

    let copy = copy_ref(&mut heap, set);
    let items = heap.items(copy).unwrap();
    assert_eq!(items.len(), 2);
    assert!(items.contains(&Value::Ref(copy)));
    assert!(!items.contains(&Value::Ref(set)));
}

// =============================================================================
// 2. Longer Cycles
// =============================================================================

/// A three-node ring copies to a three-node ring of fresh nodes.
#[test]
fn ring_of_instances() {
    let mut heap = Heap::default();
    let node = define_node(&mut heap);
    let c = heap.instantiate(node, &[Value::Int(3), Value::None]).unwrap();
    let b = heap.instantiate(node, &[Value::Int(2), Value::Ref(c)]).unwrap();
    let a = heap.instantiate(node, &[Value::Int(1), Value::Ref(b)]).unwrap();
    heap.set_field(c, "next", Value::Ref(a)).unwrap();

    let a2 = copy_ref(&mut heap, a);
    let b2 = heap.get_field(a2, "next").unwrap().ref_id().unwrap();
    let c2 = heap.get_field(b2, "next").unwrap().ref_id().unwrap();
    assert_eq!(heap.get_field(c2, "next").unwrap(), Value::Ref(a2));

    let originals = [a, b, c];
    for copy in [a2, b2, c2] {
        assert!(!originals.contains(&copy));
    }
    assert_eq!(heap.get_field(c2, "value").unwrap(), Value::Int(3));
}

/// A cycle running through several container shapes closes correctly.
#[test]
fn cycle_across_container_shapes() {
    let mut heap = Heap::default();
    let list = heap.new_list(ListKind::LinkedList, vec![]).unwrap();
    let queue = heap.new_queue(QueueKind::Linked, vec![Value::Ref(list)]).unwrap();
    let key = heap.str_value("queue").unwrap();
    let map = heap.new_map(MapKind::TreeMap, vec![(key, Value::Ref(queue))]).unwrap();
    heap.list_push(list, Value::Ref(map)).unwrap();

    let list2 = copy_ref(&mut heap, list);
    let map2 = heap.items(list2).unwrap()[0].ref_id().unwrap();
    let queue2 = heap.map_get(map2, key).unwrap().unwrap().ref_id().unwrap();
    assert_eq!(heap.items(queue2).unwrap(), vec![Value::Ref(list2)]);
    assert_ne!(map2, map);
    assert_ne!(queue2, queue);
}

// =============================================================================
// 3. Shared Subgraphs
// =============================================================================

/// Two fields referencing the same object reference the same copy.
#[test]
fn shared_subgraph_stays_shared() {
    let mut heap = Heap::default();
    let pair = heap
        .define_class(
            ClassBuilder::new("Pair")
                .field("left", ValueType::Object)
                .field("right", ValueType::Object)
                .allow_bare_alloc(),
        )
        .unwrap();
    let shared = heap.new_list(ListKind::ArrayList, vec![Value::Int(9)]).unwrap();
    let p = heap
        .instantiate(pair, &[Value::Ref(shared), Value::Ref(shared)])
        .unwrap();

    let copy = copy_ref(&mut heap, p);
    let left = heap.get_field(copy, "left").unwrap();
    let right = heap.get_field(copy, "right").unwrap();
    assert_eq!(left, right);
    assert_ne!(left, Value::Ref(shared));

    // mutating through one field is visible through the other
    heap.list_push(left.ref_id().unwrap(), Value::Int(10)).unwrap();
    assert_eq!(heap.items(right.ref_id().unwrap()).unwrap().len(), 2);
}

/// An object used both as a map key and a map value has one copy.
#[test]
fn object_shared_between_key_and_value() {
    let mut heap = Heap::default();
    let inner = heap.new_list(ListKind::ArrayList, vec![]).unwrap();
    let map = heap
        .new_map(MapKind::LinkedHashMap, vec![(Value::Ref(inner), Value::Ref(inner))])
        .unwrap();

    let copy = copy_ref(&mut heap, map);
    let entries = heap.map_entries(copy).unwrap();
    assert_eq!(entries.len(), 1);
    let (key, value) = entries[0];
    assert_eq!(key, value);
    assert_ne!(key, Value::Ref(inner));
}

/// Separate `deep_copy` calls never share copies with each other.
#[test]
fn separate_calls_do_not_share() {
    let mut heap = Heap::default();
    let list = heap.new_list(ListKind::ArrayList, vec![]).unwrap();
    let first = copy_ref(&mut heap, list);
    let second = copy_ref(&mut heap, list);
    assert_ne!(first, second);
}

// =============================================================================
// 4. Depth
// =============================================================================

/// A very long linked chain is copied without exhausting the call stack.
#[test]
fn long_chain_does_not_overflow() {
    let mut heap = Heap::default();
    let node = define_node(&mut heap);
    let mut head = Value::None;
    for i in 0..100_000 {
        head = Value::Ref(heap.instantiate(node, &[Value::Int(i), head]).unwrap());
    }

    let live_before = heap.heap_stats().live_objects;
    let copy = deep_copy(&mut heap, head).unwrap();
    assert_eq!(heap.heap_stats().live_objects, live_before + 100_000);

    let mut cursor = copy;
    let mut seen = 0;
    while let Value::Ref(id) = cursor {
        seen += 1;
        cursor = heap.get_field(id, "next").unwrap();
    }
    assert_eq!(seen, 100_000);
}
