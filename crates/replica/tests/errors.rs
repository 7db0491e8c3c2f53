//! Tests for copy failures and their rollback.
//!
//! A failed copy must surface the right `CopyError` and leave no copy
//! allocated by the failed call alive on the heap.

use pretty_assertions::assert_eq;
use replica::{Access, ClassBuilder, CopyError, Heap, HeapId, ListKind, SlotOp, Value, ValueType, deep_copy};

fn define_opaque(heap: &mut Heap) -> HeapId {
    heap.define_class(ClassBuilder::new("Socket").field("fd", ValueType::Int))
        .unwrap()
}

// =============================================================================
// 1. Instantiation
// =============================================================================

/// A class that refuses bare allocation cannot be copied.
#[test]
fn class_without_bare_alloc_fails() {
    let mut heap = Heap::default();
    let socket = define_opaque(&mut heap);
    let s = heap.instantiate(socket, &[Value::Int(3)]).unwrap();

    assert_eq!(
        deep_copy(&mut heap, Value::Ref(s)),
        Err(CopyError::Instantiation {
            class: "Socket".to_owned()
        })
    );
}

/// A failure deep inside a graph frees every copy made before it.
#[test]
fn nested_failure_rolls_back_earlier_copies() {
    let mut heap = Heap::default();
    let socket = define_opaque(&mut heap);
    let s = heap.instantiate(socket, &[Value::Int(3)]).unwrap();
    let inner = heap.new_list(ListKind::ArrayList, vec![Value::Int(1)]).unwrap();
    let outer = heap
        .new_list(ListKind::LinkedList, vec![Value::Ref(inner), Value::Ref(s)])
        .unwrap();

    let before = heap.heap_stats();
    let err = deep_copy(&mut heap, Value::Ref(outer)).unwrap_err();
    assert!(matches!(err, CopyError::Instantiation { .. }));

    let after = heap.heap_stats();
    assert_eq!(after.live_objects, before.live_objects);
    assert_eq!(after.objects_by_type, before.objects_by_type);
    // the originals are untouched
    assert_eq!(heap.items(outer).unwrap(), vec![Value::Ref(inner), Value::Ref(s)]);
}

/// Slots freed by a rollback are reused by the next allocation.
#[test]
fn rolled_back_slots_are_reused() {
    let mut heap = Heap::default();
    let socket = define_opaque(&mut heap);
    let s = heap.instantiate(socket, &[Value::Int(3)]).unwrap();
    let outer = heap
        .new_list(ListKind::ArrayList, vec![Value::Int(0), Value::Ref(s)])
        .unwrap();

    deep_copy(&mut heap, Value::Ref(outer)).unwrap_err();
    let stats = heap.heap_stats();
    assert_eq!(stats.free_slots, 1);

    heap.new_list(ListKind::ArrayList, vec![]).unwrap();
    assert_eq!(heap.heap_stats().free_slots, 0);
    assert_eq!(heap.heap_stats().total_slots, stats.total_slots);
}

// =============================================================================
// 2. Slot Access
// =============================================================================

/// A sealed slot refuses the read override.
#[test]
fn sealed_slot_refuses_read() {
    let mut heap = Heap::default();
    let vault = heap
        .define_class(
            ClassBuilder::new("Vault")
                .field("label", ValueType::Object)
                .field_with_access("secret", ValueType::Int, Access::Sealed)
                .allow_bare_alloc(),
        )
        .unwrap();
    let v = heap.instantiate(vault, &[Value::None, Value::Int(42)]).unwrap();

    let before = heap.heap_stats().live_objects;
    assert_eq!(
        deep_copy(&mut heap, Value::Ref(v)),
        Err(CopyError::SlotAccess {
            class: "Vault".to_owned(),
            field: "secret".to_owned(),
            op: SlotOp::Read,
        })
    );
    assert_eq!(heap.heap_stats().live_objects, before);
}

/// A read-only slot can be read but refuses the write override.
#[test]
fn read_only_slot_refuses_write() {
    let mut heap = Heap::default();
    let config = heap
        .define_class(
            ClassBuilder::new("Config")
                .field_with_access("version", ValueType::Int, Access::ReadOnly)
                .allow_bare_alloc(),
        )
        .unwrap();
    let c = heap.instantiate(config, &[Value::Int(2)]).unwrap();
    // the heap's own accessors ignore access levels
    assert_eq!(heap.get_field(c, "version").unwrap(), Value::Int(2));

    let err = deep_copy(&mut heap, Value::Ref(c)).unwrap_err();
    assert_eq!(
        err,
        CopyError::SlotAccess {
            class: "Config".to_owned(),
            field: "version".to_owned(),
            op: SlotOp::Write,
        }
    );
    assert_eq!(err.to_string(), "cannot write field `Config.version`: access override refused");
}

/// Slot access failures in an inherited slot name the declaring field.
#[test]
fn inherited_sealed_slot_fails_for_subclass() {
    let mut heap = Heap::default();
    let base = heap
        .define_class(
            ClassBuilder::new("Base")
                .field_with_access("token", ValueType::Object, Access::Sealed)
                .allow_bare_alloc(),
        )
        .unwrap();
    let derived = heap
        .define_class(
            ClassBuilder::new("Derived")
                .extends(base)
                .field("extra", ValueType::Int)
                .allow_bare_alloc(),
        )
        .unwrap();
    let d = heap.instantiate(derived, &[Value::None, Value::Int(1)]).unwrap();

    let err = deep_copy(&mut heap, Value::Ref(d)).unwrap_err();
    assert_eq!(
        err,
        CopyError::SlotAccess {
            class: "Derived".to_owned(),
            field: "token".to_owned(),
            op: SlotOp::Read,
        }
    );
}

/// The error message explains what could not be instantiated.
#[test]
fn instantiation_error_message() {
    let err = CopyError::Instantiation {
        class: "Socket".to_owned(),
    };
    assert_eq!(
        err.to_string(),
        "cannot instantiate `Socket` without running its initializer"
    );
}
