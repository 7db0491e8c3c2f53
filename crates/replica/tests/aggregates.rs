//! Tests for plain-aggregate copies: bare allocation, inherited and shadowed
//! slots, and the guarantee that initializers never run during a copy.

use std::{cell::Cell, rc::Rc};

use pretty_assertions::assert_eq;
use replica::{Access, ClassBuilder, Heap, HeapError, HeapId, ListKind, Value, ValueType, deep_copy};

fn copy_ref(heap: &mut Heap, id: HeapId) -> HeapId {
    deep_copy(heap, Value::Ref(id)).unwrap().ref_id().unwrap()
}

/// `Animal { id }` and `Dog extends Animal { id, name }`, where `Dog.id` shadows `Animal.id`.
fn define_animals(heap: &mut Heap) -> (HeapId, HeapId) {
    let animal = heap
        .define_class(
            ClassBuilder::new("Animal")
                .field("id", ValueType::Int)
                .field_with_access("tags", ValueType::Object, Access::Private)
                .allow_bare_alloc(),
        )
        .unwrap();
    let dog = heap
        .define_class(
            ClassBuilder::new("Dog")
                .extends(animal)
                .field("id", ValueType::Int)
                .field("name", ValueType::Object)
                .allow_bare_alloc(),
        )
        .unwrap();
    (animal, dog)
}

// =============================================================================
// 1. Inherited Slots
// =============================================================================

/// Slots declared by an ancestor are copied along with the class's own slots.
#[test]
fn inherited_slots_are_copied() {
    let mut heap = Heap::default();
    let (animal, dog) = define_animals(&mut heap);
    let tags = heap.new_list(ListKind::ArrayList, vec![Value::Int(1)]).unwrap();
    let rex = heap.str_value("Rex").unwrap();
    let d = heap
        .instantiate(dog, &[Value::Int(10), Value::Ref(tags), Value::Int(20), rex])
        .unwrap();

    let copy = copy_ref(&mut heap, d);
    assert_eq!(heap.class_of(copy).unwrap(), dog);
    let copied_tags = heap.get_declared_field(copy, animal, "tags").unwrap();
    assert_ne!(copied_tags, Value::Ref(tags));
    assert_eq!(heap.items(copied_tags.ref_id().unwrap()).unwrap(), vec![Value::Int(1)]);
    assert_eq!(heap.get_field(copy, "name").unwrap(), rex);
}

/// A shadowed ancestor slot keeps its own value, distinct from the shadowing slot.
#[test]
fn shadowed_slots_keep_separate_values() {
    let mut heap = Heap::default();
    let (animal, dog) = define_animals(&mut heap);
    let d = heap
        .instantiate(dog, &[Value::Int(10), Value::None, Value::Int(20), Value::None])
        .unwrap();

    let copy = copy_ref(&mut heap, d);
    assert_eq!(heap.get_field(copy, "id").unwrap(), Value::Int(20));
    assert_eq!(heap.get_declared_field(copy, animal, "id").unwrap(), Value::Int(10));
    assert_eq!(heap.get_declared_field(copy, dog, "id").unwrap(), Value::Int(20));
    assert_eq!(
        Value::Ref(copy).repr(&heap),
        "Dog{id=10, tags=null, id=20, name=null}"
    );
}

/// The layout lists ancestor slots first, each tagged with its declaring class.
#[test]
fn layout_orders_ancestor_slots_first() {
    let mut heap = Heap::default();
    let (animal, dog) = define_animals(&mut heap);
    let class = heap.class(dog).unwrap();
    let slots: Vec<(&str, HeapId)> = class.layout().iter().map(|s| (s.name(), s.owner())).collect();
    assert_eq!(
        slots,
        vec![("id", animal), ("tags", animal), ("id", dog), ("name", dog)]
    );
    assert_eq!(class.parent(), Some(animal));
}

/// Extending an immutable class is refused.
#[test]
fn immutable_classes_cannot_be_extended() {
    let mut heap = Heap::default();
    let base = heap
        .define_class(ClassBuilder::new("Money").field("cents", ValueType::Int).immutable())
        .unwrap();
    let err = heap
        .define_class(ClassBuilder::new("Euro").extends(base))
        .unwrap_err();
    assert_eq!(
        err,
        HeapError::ImmutableBase {
            class: "Money".to_owned()
        }
    );
}

// =============================================================================
// 2. Bare Allocation
// =============================================================================

/// The initializer runs for `instantiate` but never for a copy.
#[test]
fn initializer_never_runs_during_copy() {
    let mut heap = Heap::default();
    let calls = Rc::new(Cell::new(0));
    let counter = Rc::clone(&calls);
    let counted = heap
        .define_class(
            ClassBuilder::new("Counted")
                .field("n", ValueType::Int)
                .allow_bare_alloc()
                .initializer(move |init| {
                    counter.set(counter.get() + 1);
                    init.set("n", init.arg(0)?)
                }),
        )
        .unwrap();

    let original = heap.instantiate(counted, &[Value::Int(5)]).unwrap();
    assert_eq!(calls.get(), 1);

    let list = heap
        .new_list(ListKind::ArrayList, vec![Value::Ref(original), Value::Ref(original)])
        .unwrap();
    let copy = copy_ref(&mut heap, list);
    assert_eq!(calls.get(), 1, "copying must not run the initializer");

    let copied = heap.items(copy).unwrap()[0].ref_id().unwrap();
    assert_eq!(heap.get_field(copied, "n").unwrap(), Value::Int(5));
}

/// Values that the initializer would reject are still copied verbatim.
#[test]
fn copy_bypasses_initializer_validation() {
    let mut heap = Heap::default();
    let positive = heap
        .define_class(
            ClassBuilder::new("Positive")
                .field("n", ValueType::Int)
                .allow_bare_alloc()
                .initializer(|init| {
                    let n = init.arg(0)?;
                    if n.as_int().is_none_or(|n| n <= 0) {
                        return Err("n must be positive".to_owned());
                    }
                    init.set("n", n)
                }),
        )
        .unwrap();
    let p = heap.instantiate(positive, &[Value::Int(1)]).unwrap();
    heap.set_field(p, "n", Value::Int(-4)).unwrap();

    let copy = copy_ref(&mut heap, p);
    assert_eq!(heap.get_field(copy, "n").unwrap(), Value::Int(-4));
    assert_eq!(
        heap.instantiate(positive, &[Value::Int(-4)]),
        Err(HeapError::Rejected {
            class: "Positive".to_owned(),
            message: "n must be positive".to_owned()
        })
    );
}

/// Without an initializer, instantiation fills slots positionally and type checks them.
#[test]
fn positional_instantiation_checks_arguments() {
    let mut heap = Heap::default();
    let (_, dog) = define_animals(&mut heap);
    assert_eq!(
        heap.instantiate(dog, &[Value::Int(1)]),
        Err(HeapError::Rejected {
            class: "Dog".to_owned(),
            message: "expected 4 arguments, got 1".to_owned()
        })
    );
    assert_eq!(
        heap.instantiate(dog, &[Value::Bool(true), Value::None, Value::Int(2), Value::None]),
        Err(HeapError::WrongType {
            expected: "int",
            found: "bool"
        })
    );
}

/// Unknown field names are reported with the class name.
#[test]
fn unknown_field_is_reported() {
    let mut heap = Heap::default();
    let (_, dog) = define_animals(&mut heap);
    let d = heap
        .instantiate(dog, &[Value::Int(1), Value::None, Value::Int(2), Value::None])
        .unwrap();
    assert_eq!(
        heap.get_field(d, "owner"),
        Err(HeapError::UnknownField {
            class: "Dog".to_owned(),
            field: "owner".to_owned()
        })
    );
}
