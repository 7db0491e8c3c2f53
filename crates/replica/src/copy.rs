//! Deep copying of object graphs.
//!
//! [`deep_copy`] duplicates everything reachable from a value so that the copy
//! shares no mutable storage with the original:
//!
//! - Atomic values (immediates, strings, big integers, classes, enum members and
//!   instances of immutable classes) are returned unchanged.
//! - Arrays are copied element by element into a zero-filled array of the same
//!   element type and length.
//! - Lists, queues and sets are rebuilt as the original's kind, or the family's
//!   default kind when the original cannot be bare-constructed, preserving
//!   iteration order.
//! - Maps are rebuilt the same way, falling back to a sorted map for sorted
//!   originals and an insertion-ordered map otherwise.
//! - Instances are bare-allocated (their initializer never runs) and copied
//!   slot by slot, inherited slots included.
//!
//! A visited table keyed by heap identity maps each original to its copy. The
//! copy is registered before any of its children are copied, so back edges
//! resolve to the in-progress copy and shared subgraphs stay shared.
//!
//! Traversal uses an explicit work stack of pending fills rather than native
//! recursion, so arbitrarily deep graphs do not exhaust the call stack.
//!
//! ```
//! use replica::{Heap, ListKind, Value, deep_copy};
//!
//! let mut heap = Heap::default();
//! let list = heap.new_list(ListKind::ArrayList, vec![Value::Int(1)]).unwrap();
//! heap.list_push(list, Value::Ref(list)).unwrap();
//!
//! let copy = deep_copy(&mut heap, Value::Ref(list)).unwrap();
//! let copy_id = copy.ref_id().unwrap();
//! assert_ne!(copy_id, list);
//! assert_eq!(heap.items(copy_id).unwrap(), vec![Value::Int(1), copy]);
//! ```

use ahash::AHashMap;

use crate::{
    error::{CopyError, SlotOp},
    heap::{Heap, HeapData, HeapId, Shape},
    resource::ResourceTracker,
    tracer::{CopyTracer, NoopTracer},
    types::{Array, Instance, List, Map, Queue, Set},
    value::Value,
};

/// Copies `value` and everything reachable from it.
///
/// On failure nothing allocated by this call survives.
pub fn deep_copy(heap: &mut Heap<impl ResourceTracker>, value: Value) -> Result<Value, CopyError> {
    GraphCopier::new(heap, NoopTracer).copy(value)
}

/// Like [`deep_copy`], reporting every decision to `tracer`.
pub fn deep_copy_with_tracer(
    heap: &mut Heap<impl ResourceTracker>,
    value: Value,
    tracer: &mut impl CopyTracer,
) -> Result<Value, CopyError> {
    GraphCopier::new(heap, tracer).copy(value)
}

/// Mapping from original heap identity to the copy produced for it.
///
/// Keys are handles, never contents: two distinct originals with equal
/// contents get two distinct copies.
#[derive(Debug, Default)]
pub struct VisitedTable {
    copies: AHashMap<HeapId, HeapId>,
    /// Copies in allocation order.
    order: Vec<HeapId>,
}

impl VisitedTable {
    #[must_use]
    pub fn get(&self, original: HeapId) -> Option<HeapId> {
        self.copies.get(&original).copied()
    }

    pub fn insert(&mut self, original: HeapId, copy: HeapId) {
        if self.copies.insert(original, copy).is_none() {
            self.order.push(copy);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.copies.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.copies.is_empty()
    }

    /// Every copy registered, in allocation order.
    #[must_use]
    pub fn copies(&self) -> &[HeapId] {
        &self.order
    }

    fn clear(&mut self) {
        self.copies.clear();
        self.order.clear();
    }
}

/// A registered copy whose children have not been copied in yet.
#[derive(Debug, Clone, Copy)]
struct PendingFill {
    original: HeapId,
    copy: HeapId,
}

/// Children extracted from an original, so the heap can be mutated while they are copied.
enum CopySource {
    Array(Vec<Value>),
    List(Vec<Value>),
    Queue(Vec<Value>),
    Set(Vec<Value>),
    Map(Vec<(Value, Value)>),
    Aggregate { class_id: HeapId, slots: Vec<Value> },
}

/// Reusable graph copier.
///
/// Each [`GraphCopier::copy`] call starts from an empty visited table; the
/// table of the most recent call stays readable through [`GraphCopier::visited`].
#[derive(Debug)]
pub struct GraphCopier<'h, T: ResourceTracker, Tr: CopyTracer> {
    heap: &'h mut Heap<T>,
    tracer: Tr,
    visited: VisitedTable,
    pending: Vec<PendingFill>,
}

impl<'h, T: ResourceTracker, Tr: CopyTracer> GraphCopier<'h, T, Tr> {
    pub fn new(heap: &'h mut Heap<T>, tracer: Tr) -> Self {
        Self {
            heap,
            tracer,
            visited: VisitedTable::default(),
            pending: Vec::new(),
        }
    }

    /// Copies `root`, returning the copy or rolling back every allocation on failure.
    pub fn copy(&mut self, root: Value) -> Result<Value, CopyError> {
        self.visited.clear();
        self.pending.clear();
        self.tracer.on_start(root);

        match self.copy_value(root).and_then(|copy| self.drain().map(|()| copy)) {
            Ok(copy) => {
                self.tracer.on_finish(self.visited.len());
                Ok(copy)
            }
            Err(err) => {
                let freed = self.rollback();
                self.tracer.on_rollback(freed, &err);
                Err(err)
            }
        }
    }

    /// The visited table of the most recent copy.
    #[must_use]
    pub fn visited(&self) -> &VisitedTable {
        &self.visited
    }

    #[must_use]
    pub fn tracer(&self) -> &Tr {
        &self.tracer
    }

    pub fn into_tracer(self) -> Tr {
        self.tracer
    }

    /// Resolves one value to its copy.
    ///
    /// Atomic values come back unchanged and previously visited originals
    /// resolve through the table. Anything else gets a registered placeholder
    /// and a pending fill.
    fn copy_value(&mut self, value: Value) -> Result<Value, CopyError> {
        let Value::Ref(original) = value else {
            return Ok(value);
        };
        if let Some(copy) = self.visited.get(original) {
            self.tracer.on_revisit(original, copy);
            return Ok(Value::Ref(copy));
        }

        let data = self.heap.get(original);
        // placeholders start empty but are charged for the size they will reach
        let filled_size = data.estimate_size();
        let (placeholder, shape, fallback) = match data {
            HeapData::Str(_) | HeapData::LongInt(_) | HeapData::Class(_) | HeapData::EnumMember(_) => {
                self.tracer.on_shared(original);
                return Ok(value);
            }
            HeapData::Array(array) => (
                HeapData::Array(Array::zeroed(array.elem(), array.len())),
                Shape::Array,
                false,
            ),
            HeapData::List(list) => {
                let kind = list.kind().copy_target();
                (HeapData::List(List::new(kind)), Shape::Sequence, kind != list.kind())
            }
            HeapData::Queue(queue) => {
                let kind = queue.kind().copy_target();
                (HeapData::Queue(Queue::new(kind)), Shape::Sequence, kind != queue.kind())
            }
            HeapData::Set(set) => {
                let kind = set.kind().copy_target();
                (
                    HeapData::Set(Set::with_capacity(kind, set.len())),
                    Shape::Set,
                    kind != set.kind(),
                )
            }
            HeapData::Map(map) => {
                let kind = map.kind().copy_target();
                (
                    HeapData::Map(Map::with_capacity(kind, map.len())),
                    Shape::Map,
                    kind != map.kind(),
                )
            }
            HeapData::Instance(inst) => {
                let HeapData::Class(class) = self.heap.get(inst.class_id()) else {
                    unreachable!("instance class handle does not name a class");
                };
                if class.is_immutable() {
                    self.tracer.on_shared(original);
                    return Ok(value);
                }
                if !class.allows_bare_alloc() {
                    return Err(CopyError::Instantiation {
                        class: class.name().to_owned(),
                    });
                }
                let bare = Instance::new(inst.class_id(), class.zero_slots());
                (HeapData::Instance(bare), Shape::Aggregate, false)
            }
        };

        let copy = self.heap.allocate_charged(placeholder, filled_size)?;
        self.visited.insert(original, copy);
        self.tracer.on_allocate(original, copy, shape, fallback);
        self.pending.push(PendingFill { original, copy });
        Ok(Value::Ref(copy))
    }

    /// Fills pending copies until the work stack is empty.
    fn drain(&mut self) -> Result<(), CopyError> {
        while let Some(fill) = self.pending.pop() {
            let children = self.fill(fill)?;
            self.tracer.on_fill(fill.copy, children, self.pending.len());
        }
        Ok(())
    }

    /// Copies the children of `fill.original` into `fill.copy`, returning how many were transferred.
    fn fill(&mut self, PendingFill { original, copy }: PendingFill) -> Result<usize, CopyError> {
        let source = match self.heap.get(original) {
            HeapData::Array(array) => CopySource::Array(array.items().to_vec()),
            HeapData::List(list) => CopySource::List(list.items().to_vec()),
            HeapData::Queue(queue) => CopySource::Queue(queue.iter().copied().collect()),
            HeapData::Set(set) => CopySource::Set(set.iter().copied().collect()),
            HeapData::Map(map) => CopySource::Map(map.iter().map(|(k, v)| (*k, *v)).collect()),
            HeapData::Instance(inst) => CopySource::Aggregate {
                class_id: inst.class_id(),
                slots: inst.slots().to_vec(),
            },
            HeapData::Str(_) | HeapData::LongInt(_) | HeapData::Class(_) | HeapData::EnumMember(_) => {
                unreachable!("atomic values are never queued for filling")
            }
        };

        match source {
            CopySource::Array(items) => {
                let count = items.len();
                for (index, item) in items.into_iter().enumerate() {
                    let copied = self.copy_value(item)?;
                    if let HeapData::Array(array) = self.heap.get_mut(copy) {
                        array.put(index, copied);
                    }
                }
                Ok(count)
            }
            CopySource::List(items) => {
                let count = items.len();
                if let HeapData::List(list) = self.heap.get_mut(copy) {
                    list.reserve(count);
                }
                for item in items {
                    let copied = self.copy_value(item)?;
                    if let HeapData::List(list) = self.heap.get_mut(copy) {
                        list.push(copied);
                    }
                }
                Ok(count)
            }
            CopySource::Queue(items) => {
                let count = items.len();
                for item in items {
                    let copied = self.copy_value(item)?;
                    if let HeapData::Queue(queue) = self.heap.get_mut(copy) {
                        queue.push_back(copied);
                    }
                }
                Ok(count)
            }
            // Sets and maps are appended in source order, which sorted kinds
            // already hold. Copied references must not be re-ranked by their new handles.
            CopySource::Set(items) => {
                let count = items.len();
                for item in items {
                    let copied = self.copy_value(item)?;
                    if let HeapData::Set(set) = self.heap.get_mut(copy) {
                        set.push(copied);
                    }
                }
                Ok(count)
            }
            CopySource::Map(entries) => {
                let count = entries.len();
                for (key, value) in entries {
                    let key = self.copy_value(key)?;
                    let value = self.copy_value(value)?;
                    if let HeapData::Map(map) = self.heap.get_mut(copy) {
                        map.push(key, value);
                    }
                }
                Ok(count)
            }
            CopySource::Aggregate { class_id, slots } => {
                let count = slots.len();
                for (index, slot_value) in slots.into_iter().enumerate() {
                    self.check_slot_access(class_id, index, SlotOp::Read)?;
                    let copied = self.copy_value(slot_value)?;
                    self.check_slot_access(class_id, index, SlotOp::Write)?;
                    if let HeapData::Instance(inst) = self.heap.get_mut(copy) {
                        inst.set_slot(index, copied);
                    }
                }
                Ok(count)
            }
        }
    }

    /// Fails when slot `index` of the class refuses the override for `op`.
    fn check_slot_access(&self, class_id: HeapId, index: usize, op: SlotOp) -> Result<(), CopyError> {
        let HeapData::Class(class) = self.heap.get(class_id) else {
            unreachable!("instance class handle does not name a class");
        };
        let slot = &class.layout()[index];
        let allowed = match op {
            SlotOp::Read => slot.access().allows_override_read(),
            SlotOp::Write => slot.access().allows_override_write(),
        };
        if allowed {
            Ok(())
        } else {
            Err(CopyError::SlotAccess {
                class: class.name().to_owned(),
                field: slot.name().to_owned(),
                op,
            })
        }
    }

    /// Frees every copy made by the current call and returns how many were freed.
    fn rollback(&mut self) -> usize {
        self.pending.clear();
        let copies = std::mem::take(&mut self.visited.order);
        for &copy in &copies {
            self.heap.free(copy);
        }
        self.visited.copies.clear();
        copies.len()
    }
}
