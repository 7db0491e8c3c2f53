use std::{collections::BTreeMap, mem::size_of};

use ahash::AHashMap;
use num_bigint::BigInt;

use crate::{
    error::{HeapError, HeapResult},
    resource::{NoLimitTracker, ResourceError, ResourceTracker},
    types::{
        Array, ClassBuilder, ClassObject, EnumMember, FieldSlot, Instance, InstanceInit, List, ListKind, LongInt, Map, MapKind,
        Queue, QueueKind, Set, SetKind, Str, ValueType,
    },
    value::{Value, total_cmp},
};

/// What the heap holds at one moment.
///
/// Two snapshots taken around a copy show what the copy allocated. Around a
/// failed copy they must show that the rollback released everything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapStats {
    pub live_objects: usize,
    pub free_slots: usize,
    /// Arena length, live and free slots together.
    pub total_slots: usize,
    /// Live entries per `HeapData` variant name, e.g. "List" or "Instance".
    pub objects_by_type: BTreeMap<&'static str, usize>,
    pub interned_strings: usize,
    /// Allocations counted by the tracker, `None` for trackers that keep no count.
    pub tracker_allocations: Option<usize>,
    /// Bytes currently charged to the tracker, `None` for trackers that keep no count.
    pub tracker_memory_bytes: Option<usize>,
}

/// Change from one [`HeapStats`] to a later one.
///
/// `objects_by_type_delta` only lists variants whose count changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapDiff {
    pub live_objects_delta: isize,
    pub total_slots_delta: isize,
    pub objects_by_type_delta: BTreeMap<&'static str, isize>,
    pub interned_strings_delta: isize,
    /// Set when both snapshots carry an allocation count. Frees never lower it.
    pub tracker_allocations_delta: Option<isize>,
    /// Set when both snapshots carry a byte count.
    pub tracker_memory_bytes_delta: Option<isize>,
}

impl HeapStats {
    /// Compares `self` with the later snapshot `after`.
    ///
    /// ```
    /// use replica::{Heap, ListKind, Value, deep_copy};
    ///
    /// let mut heap = Heap::default();
    /// let list = heap.new_list(ListKind::ArrayList, vec![Value::Int(1)]).unwrap();
    /// let before = heap.heap_stats();
    /// deep_copy(&mut heap, Value::Ref(list)).unwrap();
    /// let diff = before.diff(&heap.heap_stats());
    /// assert_eq!(diff.live_objects_delta, 1);
    /// assert_eq!(diff.objects_by_type_delta.get("List"), Some(&1));
    /// ```
    #[must_use]
    pub fn diff(&self, after: &Self) -> HeapDiff {
        HeapDiff {
            live_objects_delta: isize_delta(self.live_objects, after.live_objects),
            total_slots_delta: isize_delta(self.total_slots, after.total_slots),
            objects_by_type_delta: type_deltas(&self.objects_by_type, &after.objects_by_type),
            interned_strings_delta: isize_delta(self.interned_strings, after.interned_strings),
            tracker_allocations_delta: self
                .tracker_allocations
                .zip(after.tracker_allocations)
                .map(|(b, a)| isize_delta(b, a)),
            tracker_memory_bytes_delta: self
                .tracker_memory_bytes
                .zip(after.tracker_memory_bytes)
                .map(|(b, a)| isize_delta(b, a)),
        }
    }
}

impl HeapDiff {
    /// Nothing changed at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.is_net_zero()
            && self.total_slots_delta == 0
            && self.tracker_allocations_delta.is_none_or(|d| d == 0)
    }

    /// Everything allocated in between was released again.
    ///
    /// This is what a rolled-back copy leaves behind. Arena growth and the
    /// tracker's allocation count are ignored, since a failed copy still
    /// consumed those.
    #[must_use]
    pub fn is_net_zero(&self) -> bool {
        self.live_objects_delta == 0
            && self.objects_by_type_delta.is_empty()
            && self.interned_strings_delta == 0
            && self.tracker_memory_bytes_delta.is_none_or(|d| d == 0)
    }
}

impl std::fmt::Display for HeapDiff {
    /// One line, e.g. `+2 objects (List +1, Map +1), +336 bytes`.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_net_zero() {
            f.write_str("no net change")?;
        } else {
            write!(f, "{:+} objects", self.live_objects_delta)?;
            if !self.objects_by_type_delta.is_empty() {
                let per_type: Vec<String> = self
                    .objects_by_type_delta
                    .iter()
                    .map(|(name, delta)| format!("{name} {delta:+}"))
                    .collect();
                write!(f, " ({})", per_type.join(", "))?;
            }
            if self.interned_strings_delta != 0 {
                write!(f, ", {:+} interned", self.interned_strings_delta)?;
            }
            if let Some(bytes) = self.tracker_memory_bytes_delta {
                write!(f, ", {bytes:+} bytes")?;
            }
        }
        if let Some(allocations) = self.tracker_allocations_delta
            && allocations != 0
        {
            write!(f, "; {allocations} allocations charged")?;
        }
        Ok(())
    }
}

fn isize_delta(before: usize, after: usize) -> isize {
    (after as isize).wrapping_sub(before as isize)
}

fn type_deltas(
    before: &BTreeMap<&'static str, usize>,
    after: &BTreeMap<&'static str, usize>,
) -> BTreeMap<&'static str, isize> {
    let count = |map: &BTreeMap<&'static str, usize>, name: &str| map.get(name).copied().unwrap_or(0);
    before
        .keys()
        .chain(after.keys())
        .filter_map(|&name| {
            let delta = isize_delta(count(before, name), count(after, name));
            (delta != 0).then_some((name, delta))
        })
        .collect()
}

/// Unique identifier for values stored inside the heap arena.
///
/// This is the identity the copier keys its visited table on: two entries with
/// equal contents still have distinct ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct HeapId(usize);

impl HeapId {
    #[inline]
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the raw index value.
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for HeapId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Runtime shape of a value, deciding which copy rule applies to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, serde::Serialize)]
pub enum Shape {
    /// Shared by identity, never duplicated.
    Atomic,
    Array,
    /// Lists and queues.
    Sequence,
    Set,
    Map,
    /// Instances of mutable classes, copied slot by slot.
    Aggregate,
}

/// Bytes charged per element of an array, list or queue, and per instance slot.
const ELEMENT_BYTES: usize = size_of::<Value>();
/// Bytes charged per set entry: the value plus its cached hash.
const SET_ENTRY_BYTES: usize = size_of::<Value>() + size_of::<u64>();
/// Bytes charged per map entry: key, value and cached hash.
const MAP_ENTRY_BYTES: usize = 2 * size_of::<Value>() + size_of::<u64>();

/// Payload of a heap entry.
#[derive(Debug, Clone)]
pub enum HeapData {
    Str(Str),
    LongInt(LongInt),
    Class(ClassObject),
    EnumMember(EnumMember),
    Array(Array),
    List(List),
    Queue(Queue),
    Set(Set),
    Map(Map),
    Instance(Instance),
}

impl HeapData {
    /// Returns the variant name as a static string slice.
    ///
    /// Used by `HeapStats` for per-type breakdowns and in error messages.
    #[must_use]
    pub fn variant_name(&self) -> &'static str {
        match self {
            Self::Str(_) => "Str",
            Self::LongInt(_) => "LongInt",
            Self::Class(_) => "Class",
            Self::EnumMember(_) => "EnumMember",
            Self::Array(_) => "Array",
            Self::List(_) => "List",
            Self::Queue(_) => "Queue",
            Self::Set(_) => "Set",
            Self::Map(_) => "Map",
            Self::Instance(_) => "Instance",
        }
    }

    /// Approximate size in bytes, reported to the resource tracker.
    pub(crate) fn estimate_size(&self) -> usize {
        let payload = match self {
            Self::Str(s) => s.len(),
            Self::LongInt(li) => usize::try_from(li.value().bits().div_ceil(8)).unwrap_or(usize::MAX),
            Self::Class(cls) => {
                cls.name().len()
                    + cls.layout().iter().map(|slot| size_of::<FieldSlot>() + slot.name().len()).sum::<usize>()
                    + cls.members().len() * size_of::<HeapId>()
            }
            Self::EnumMember(member) => member.name().len(),
            Self::Array(array) => array.len() * ELEMENT_BYTES,
            Self::List(list) => list.len() * ELEMENT_BYTES,
            Self::Queue(queue) => queue.len() * ELEMENT_BYTES,
            Self::Set(set) => set.len() * SET_ENTRY_BYTES,
            Self::Map(map) => map.len() * MAP_ENTRY_BYTES,
            Self::Instance(inst) => inst.slots().len() * ELEMENT_BYTES,
        };
        size_of::<Self>() + payload
    }

    /// Pushes every heap id this entry refers to.
    fn collect_child_ids(&self, work_list: &mut Vec<HeapId>) {
        match self {
            Self::Str(_) | Self::LongInt(_) => {}
            Self::Class(cls) => {
                work_list.extend(cls.parent());
                work_list.extend(cls.members().iter().copied());
            }
            Self::EnumMember(member) => work_list.push(member.class_id()),
            Self::Array(array) => {
                if array.elem() == ValueType::Object {
                    push_refs(array.items(), work_list);
                }
            }
            Self::List(list) => push_refs(list.items(), work_list),
            Self::Queue(queue) => push_refs(queue.iter(), work_list),
            Self::Set(set) => push_refs(set.iter(), work_list),
            Self::Map(map) => push_refs(map.iter().flat_map(|(k, v)| [k, v]), work_list),
            Self::Instance(inst) => {
                work_list.push(inst.class_id());
                push_refs(inst.slots(), work_list);
            }
        }
    }
}

fn push_refs<'a>(values: impl IntoIterator<Item = &'a Value>, work_list: &mut Vec<HeapId>) {
    work_list.extend(values.into_iter().filter_map(|v| v.ref_id()));
}

/// A single entry inside the heap arena.
///
/// `data` is an `Option` so [`Heap::with_entry_mut`] can take the payload out
/// while the closure still has mutable access to the rest of the heap.
#[derive(Debug)]
struct HeapValue {
    data: Option<HeapData>,
    /// Bytes charged to the tracker for this entry so far; refunded in full when it is freed.
    charged: usize,
}

/// Arena that owns every heap-resident node of an object graph.
///
/// Uses a free list to reuse slots from freed values. New allocations pop from
/// the free list when available, otherwise append. Nothing is reference
/// counted: unreachable entries are reclaimed by [`Heap::collect_garbage`],
/// and [`Heap::free`] releases a single entry immediately.
///
/// Generic over `T: ResourceTracker` to support different resource tracking strategies.
/// When `T = NoLimitTracker` (the default), all resource checks compile away to no-ops.
#[derive(Debug)]
pub struct Heap<T: ResourceTracker = NoLimitTracker> {
    entries: Vec<Option<HeapValue>>,
    /// IDs of freed slots available for reuse. Populated by `free` and GC, consumed by `allocate`.
    free_list: Vec<HeapId>,
    tracker: T,
    /// Text -> the single `Str` entry holding it.
    interned: AHashMap<Box<str>, HeapId>,
}

impl Default for Heap<NoLimitTracker> {
    fn default() -> Self {
        Self::new(0, NoLimitTracker)
    }
}

macro_rules! take_data {
    ($self:ident, $id:expr, $func_name:literal) => {
        $self
            .entries
            .get_mut($id.index())
            .expect(concat!("Heap::", $func_name, ": slot missing"))
            .as_mut()
            .expect(concat!("Heap::", $func_name, ": object already freed"))
            .data
            .take()
            .expect(concat!("Heap::", $func_name, ": data already borrowed"))
    };
}

macro_rules! restore_data {
    ($self:ident, $id:expr, $new_data:expr, $func_name:literal) => {{
        let entry = $self
            .entries
            .get_mut($id.index())
            .expect(concat!("Heap::", $func_name, ": slot missing"))
            .as_mut()
            .expect(concat!("Heap::", $func_name, ": object already freed"));
        entry.data = Some($new_data);
    }};
}

impl<T: ResourceTracker> Heap<T> {
    /// Creates a new heap with the given resource tracker.
    pub fn new(capacity: usize, tracker: T) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            free_list: Vec::new(),
            tracker,
            interned: AHashMap::new(),
        }
    }

    #[must_use]
    pub fn tracker(&self) -> &T {
        &self.tracker
    }

    /// Allocates a new heap entry.
    ///
    /// Returns `Err(ResourceError)` if the tracker refuses the allocation; the
    /// heap is unchanged in that case.
    pub fn allocate(&mut self, data: HeapData) -> Result<HeapId, ResourceError> {
        let size = data.estimate_size();
        self.allocate_charged(data, size)
    }

    /// Allocates `data` charging `charged` bytes instead of its current size.
    ///
    /// Copy placeholders start empty and are charged up front for the size
    /// they reach once filled, so a copy that cannot fit fails before it grows.
    pub(crate) fn allocate_charged(&mut self, data: HeapData, charged: usize) -> Result<HeapId, ResourceError> {
        self.tracker.on_allocate(|| charged)?;
        let new_entry = HeapValue {
            data: Some(data),
            charged,
        };

        let id = if let Some(id) = self.free_list.pop() {
            self.entries[id.index()] = Some(new_entry);
            id
        } else {
            let id = self.entries.len();
            self.entries.push(Some(new_entry));
            HeapId(id)
        };
        Ok(id)
    }

    /// The id the next successful `allocate` call will return.
    fn next_id(&self) -> HeapId {
        self.free_list.last().copied().unwrap_or(HeapId(self.entries.len()))
    }

    /// Releases one entry immediately, without touching anything it refers to.
    ///
    /// # Panics
    /// Panics if the id is invalid or already freed.
    pub fn free(&mut self, id: HeapId) {
        let value = self
            .entries
            .get_mut(id.index())
            .expect("Heap::free: slot missing")
            .take()
            .expect("Heap::free: object already freed");
        self.tracker.on_free(|| value.charged);
        if let Some(HeapData::Str(s)) = &value.data
            && self.interned.get(s.as_str()) == Some(&id)
        {
            self.interned.remove(s.as_str());
        }
        self.free_list.push(id);
    }

    /// Whether `id` names a live entry.
    #[must_use]
    pub fn is_live(&self, id: HeapId) -> bool {
        matches!(self.entries.get(id.index()), Some(Some(_)))
    }

    /// Returns an immutable reference to the heap data stored at the given ID.
    ///
    /// # Panics
    /// Panics if the value ID is invalid, the value has already been freed,
    /// or the data is currently borrowed via `with_entry_mut`.
    #[must_use]
    pub fn get(&self, id: HeapId) -> &HeapData {
        self.entries
            .get(id.index())
            .expect("Heap::get: slot missing")
            .as_ref()
            .expect("Heap::get: object already freed")
            .data
            .as_ref()
            .expect("Heap::get: data currently borrowed")
    }

    /// Returns an immutable reference to heap data if the slot is live.
    ///
    /// Unlike `get`, this returns `None` instead of panicking when the slot is
    /// missing, freed, or temporarily borrowed.
    #[must_use]
    pub fn get_if_live(&self, id: HeapId) -> Option<&HeapData> {
        self.entries.get(id.index())?.as_ref()?.data.as_ref()
    }

    /// Returns a mutable reference to the heap data stored at the given ID.
    ///
    /// # Panics
    /// Panics if the value ID is invalid, the value has already been freed,
    /// or the data is currently borrowed via `with_entry_mut`.
    pub fn get_mut(&mut self, id: HeapId) -> &mut HeapData {
        self.entries
            .get_mut(id.index())
            .expect("Heap::get_mut: slot missing")
            .as_mut()
            .expect("Heap::get_mut: object already freed")
            .data
            .as_mut()
            .expect("Heap::get_mut: data currently borrowed")
    }

    /// Gives mutable access to a heap entry while allowing reentrant heap usage
    /// inside the closure (e.g. to read other values while inserting into a
    /// sorted set).
    ///
    /// The data is temporarily taken from the heap entry and restored after the
    /// closure completes; inside the closure the entry reads as not live.
    pub fn with_entry_mut<F, R>(&mut self, id: HeapId, f: F) -> R
    where
        F: FnOnce(&mut Self, &mut HeapData) -> R,
    {
        let mut data = take_data!(self, id, "with_entry_mut");

        let result = f(self, &mut data);

        restore_data!(self, id, data, "with_entry_mut");
        result
    }

    /// Charges `bytes` of growth of the live entry `id` to the tracker.
    ///
    /// On error nothing is charged and the caller must not grow the entry.
    fn charge_growth(&mut self, id: HeapId, bytes: usize) -> Result<(), ResourceError> {
        self.tracker.on_container_insert(bytes)?;
        if let Some(Some(entry)) = self.entries.get_mut(id.index()) {
            entry.charged += bytes;
        }
        Ok(())
    }

    /// Refunds `bytes` the live entry `id` no longer holds.
    fn refund(&mut self, id: HeapId, bytes: usize) {
        if let Some(Some(entry)) = self.entries.get_mut(id.index()) {
            let bytes = bytes.min(entry.charged);
            entry.charged -= bytes;
            self.tracker.on_free(|| bytes);
        }
    }

    /// Returns a snapshot of the current heap state.
    ///
    /// Tracker stats are populated only when the tracker records them; for
    /// `NoLimitTracker` both fields are `None`.
    #[must_use]
    pub fn heap_stats(&self) -> HeapStats {
        let mut live_objects: usize = 0;
        let mut free_slots: usize = 0;
        let mut objects_by_type: BTreeMap<&'static str, usize> = BTreeMap::new();

        for slot in &self.entries {
            match slot {
                Some(entry) => {
                    live_objects += 1;
                    if let Some(data) = &entry.data {
                        *objects_by_type.entry(data.variant_name()).or_insert(0) += 1;
                    }
                }
                None => free_slots += 1,
            }
        }

        HeapStats {
            live_objects,
            free_slots,
            total_slots: self.entries.len(),
            objects_by_type,
            interned_strings: self.interned.len(),
            tracker_allocations: self.tracker.allocation_count(),
            tracker_memory_bytes: self.tracker.current_memory_bytes(),
        }
    }

    /// Runs mark-sweep garbage collection and returns how many entries were freed.
    ///
    /// Everything reachable from `roots` survives (classes are reachable from
    /// their instances and subclasses, enum members from their class). Interned
    /// strings are not roots: an unreachable string is freed and leaves the
    /// intern table.
    pub fn collect_garbage(&mut self, roots: impl IntoIterator<Item = HeapId>) -> usize {
        // Mark phase: Vec<bool> instead of a hash set, indexed by slot
        let mut reachable: Vec<bool> = vec![false; self.entries.len()];
        let mut work_list: Vec<HeapId> = roots.into_iter().collect();

        while let Some(id) = work_list.pop() {
            let idx = id.index();
            if idx >= reachable.len() || reachable[idx] {
                continue;
            }
            reachable[idx] = true;

            if let Some(Some(entry)) = self.entries.get(idx)
                && let Some(ref data) = entry.data
            {
                data.collect_child_ids(&mut work_list);
            }
        }

        // Sweep phase
        let mut freed = 0;
        for (id, value) in self.entries.iter_mut().enumerate() {
            if reachable[id] {
                continue;
            }
            if let Some(value) = value.take() {
                self.tracker.on_free(|| value.charged);
                self.free_list.push(HeapId(id));
                freed += 1;
            }
        }

        let entries = &self.entries;
        self.interned
            .retain(|_, id| matches!(entries.get(id.index()), Some(Some(_))));
        freed
    }

    /// Classifies a value for the copier.
    ///
    /// # Panics
    /// Panics if `value` refers to a freed entry.
    #[must_use]
    pub fn shape_of(&self, value: Value) -> Shape {
        let Value::Ref(id) = value else {
            return Shape::Atomic;
        };
        match self.get(id) {
            HeapData::Str(_) | HeapData::LongInt(_) | HeapData::Class(_) | HeapData::EnumMember(_) => Shape::Atomic,
            HeapData::Array(_) => Shape::Array,
            HeapData::List(_) | HeapData::Queue(_) => Shape::Sequence,
            HeapData::Set(_) => Shape::Set,
            HeapData::Map(_) => Shape::Map,
            HeapData::Instance(inst) => match self.get_if_live(inst.class_id()) {
                Some(HeapData::Class(cls)) if cls.is_immutable() => Shape::Atomic,
                _ => Shape::Aggregate,
            },
        }
    }

    // ============================================================================
    // Builders
    // ============================================================================

    /// Returns the heap's single `Str` entry for `text`, allocating it on first use.
    pub fn intern_str(&mut self, text: &str) -> HeapResult<HeapId> {
        if let Some(&id) = self.interned.get(text) {
            return Ok(id);
        }
        let id = self.allocate(HeapData::Str(Str::new(text)))?;
        self.interned.insert(text.into(), id);
        Ok(id)
    }

    /// Shorthand for `Value::Ref(self.intern_str(text)?)`.
    pub fn str_value(&mut self, text: &str) -> HeapResult<Value> {
        self.intern_str(text).map(Value::Ref)
    }

    pub fn new_long_int(&mut self, value: impl Into<BigInt>) -> HeapResult<HeapId> {
        Ok(self.allocate(HeapData::LongInt(LongInt::new(value.into())))?)
    }

    /// Allocates an array holding `items`, all of which must match `elem`.
    pub fn new_array(&mut self, elem: ValueType, items: Vec<Value>) -> HeapResult<HeapId> {
        let array = Array::from_items(elem, items).map_err(|bad| HeapError::WrongType {
            expected: elem.name(),
            found: bad.kind_name(&*self),
        })?;
        Ok(self.allocate(HeapData::Array(array))?)
    }

    pub fn new_list(&mut self, kind: ListKind, items: Vec<Value>) -> HeapResult<HeapId> {
        Ok(self.allocate(HeapData::List(List::from_items(kind, items)))?)
    }

    pub fn new_queue(&mut self, kind: QueueKind, items: Vec<Value>) -> HeapResult<HeapId> {
        Ok(self.allocate(HeapData::Queue(Queue::from_items(kind, items)))?)
    }

    /// Allocates a set of `kind` and inserts `items` in order.
    ///
    /// Sorted kinds order the items; duplicates are dropped.
    pub fn new_set(&mut self, kind: SetKind, items: Vec<Value>) -> HeapResult<HeapId> {
        let id = self.allocate(HeapData::Set(Set::with_capacity(kind, items.len())))?;
        for item in items {
            if let Err(err) = self.add_to_set(id, item) {
                self.free(id);
                return Err(err.into());
            }
        }
        Ok(id)
    }

    /// Allocates a map of `kind` and inserts `entries` in order; later keys overwrite earlier equal ones.
    pub fn new_map(&mut self, kind: MapKind, entries: Vec<(Value, Value)>) -> HeapResult<HeapId> {
        let id = self.allocate(HeapData::Map(Map::with_capacity(kind, entries.len())))?;
        for (key, value) in entries {
            if let Err(err) = self.put_in_map(id, key, value) {
                self.free(id);
                return Err(err.into());
            }
        }
        Ok(id)
    }

    /// Places a class on the heap, computing its full slot layout.
    ///
    /// Fails if the parent handle is not a class or is immutable.
    pub fn define_class(&mut self, builder: ClassBuilder) -> HeapResult<HeapId> {
        let inherited = match builder.parent {
            None => Vec::new(),
            Some(parent) => {
                let parent = self.class(parent)?;
                if parent.is_immutable() {
                    return Err(HeapError::ImmutableBase {
                        class: parent.name().to_owned(),
                    });
                }
                parent.layout().to_vec()
            }
        };
        let self_id = self.next_id();
        let class = ClassObject::new(builder, self_id, &inherited);
        let id = self.allocate(HeapData::Class(class))?;
        debug_assert_eq!(id, self_id, "class allocated at an unexpected slot");
        Ok(id)
    }

    /// Defines an enum class with one constant per name, in ordinal order.
    pub fn define_enum(&mut self, name: &str, members: &[&str]) -> HeapResult<HeapId> {
        let class_id = self.define_class(ClassBuilder::new(name).immutable())?;
        let mut member_ids = Vec::with_capacity(members.len());
        for (ordinal, member) in (0u32..).zip(members) {
            member_ids.push(self.allocate(HeapData::EnumMember(EnumMember::new(class_id, ordinal, member)))?);
        }
        if let HeapData::Class(cls) = self.get_mut(class_id) {
            cls.set_members(member_ids);
        }
        Ok(class_id)
    }

    /// Looks up the constant `name` of an enum class.
    #[must_use]
    pub fn enum_member(&self, class_id: HeapId, name: &str) -> Option<HeapId> {
        let Some(HeapData::Class(cls)) = self.get_if_live(class_id) else {
            return None;
        };
        cls.members()
            .iter()
            .copied()
            .find(|&id| matches!(self.get_if_live(id), Some(HeapData::EnumMember(m)) if m.name() == name))
    }

    /// Creates an instance through the class's cooperative construction path.
    ///
    /// With an initializer, the initializer receives the zero-filled instance
    /// and `args`. Without one, `args` fill the layout positionally and must
    /// match it in number and type.
    pub fn instantiate(&mut self, class_id: HeapId, args: &[Value]) -> HeapResult<HeapId> {
        let class = self.class(class_id)?;
        let mut slots = class.zero_slots();
        if let Some(init) = class.initializer() {
            let mut view = InstanceInit::new(class, &mut slots, args);
            init(&mut view).map_err(|message| HeapError::Rejected {
                class: class.name().to_owned(),
                message,
            })?;
        } else {
            if args.len() != slots.len() {
                return Err(HeapError::Rejected {
                    class: class.name().to_owned(),
                    message: format!("expected {} arguments, got {}", slots.len(), args.len()),
                });
            }
            for (index, (&arg, slot)) in args.iter().zip(class.layout()).enumerate() {
                slot.ty().check(arg, arg.kind_name(&*self))?;
                slots[index] = arg;
            }
        }
        Ok(self.allocate(HeapData::Instance(Instance::new(class_id, slots)))?)
    }

    // ============================================================================
    // Access
    // ============================================================================

    /// The class object at `class_id`.
    pub fn class(&self, class_id: HeapId) -> HeapResult<&ClassObject> {
        match self.get(class_id) {
            HeapData::Class(cls) => Ok(cls),
            other => Err(wrong_type("Class", other)),
        }
    }

    /// The class of the instance `id`.
    pub fn class_of(&self, id: HeapId) -> HeapResult<HeapId> {
        self.instance(id).map(Instance::class_id)
    }

    fn instance(&self, id: HeapId) -> HeapResult<&Instance> {
        match self.get(id) {
            HeapData::Instance(inst) => Ok(inst),
            other => Err(wrong_type("Instance", other)),
        }
    }

    /// Resolves `field` to a slot index on the instance's class.
    fn field_slot(&self, id: HeapId, owner: Option<HeapId>, field: &str) -> HeapResult<(usize, ValueType)> {
        let class = self.class(self.class_of(id)?)?;
        let index = match owner {
            None => class.slot_index(field),
            Some(owner) => class.declared_slot_index(owner, field),
        };
        let index = index.ok_or_else(|| HeapError::UnknownField {
            class: class.name().to_owned(),
            field: field.to_owned(),
        })?;
        Ok((index, class.layout()[index].ty()))
    }

    /// Reads the most derived slot called `field`, ignoring access levels.
    pub fn get_field(&self, id: HeapId, field: &str) -> HeapResult<Value> {
        let (index, _) = self.field_slot(id, None, field)?;
        Ok(self.instance(id)?.slots()[index])
    }

    /// Reads the slot called `field` declared by class `owner`, reaching shadowed slots.
    pub fn get_declared_field(&self, id: HeapId, owner: HeapId, field: &str) -> HeapResult<Value> {
        let (index, _) = self.field_slot(id, Some(owner), field)?;
        Ok(self.instance(id)?.slots()[index])
    }

    /// Writes the most derived slot called `field`, ignoring access levels.
    pub fn set_field(&mut self, id: HeapId, field: &str, value: Value) -> HeapResult<()> {
        self.write_field(id, None, field, value)
    }

    /// Writes the slot called `field` declared by class `owner`.
    pub fn set_declared_field(&mut self, id: HeapId, owner: HeapId, field: &str, value: Value) -> HeapResult<()> {
        self.write_field(id, Some(owner), field, value)
    }

    fn write_field(&mut self, id: HeapId, owner: Option<HeapId>, field: &str, value: Value) -> HeapResult<()> {
        let (index, ty) = self.field_slot(id, owner, field)?;
        ty.check(value, value.kind_name(&*self))?;
        if let HeapData::Instance(inst) = self.get_mut(id) {
            inst.set_slot(index, value);
        }
        Ok(())
    }

    /// Writes `value` at `index` of an array, returning the previous element.
    pub fn array_set(&mut self, id: HeapId, index: usize, value: Value) -> HeapResult<Value> {
        let found = value.kind_name(&*self);
        match self.get_mut(id) {
            HeapData::Array(array) => array.set(index, value, found),
            other => Err(wrong_type("Array", other)),
        }
    }

    /// Appends to a modifiable list.
    pub fn list_push(&mut self, id: HeapId, value: Value) -> HeapResult<()> {
        match self.get(id) {
            HeapData::List(list) if list.kind().is_mutable() => {}
            HeapData::List(_) => return Err(HeapError::Unmodifiable { kind: "List" }),
            other => return Err(wrong_type("List", other)),
        }
        self.charge_growth(id, ELEMENT_BYTES)?;
        if let HeapData::List(list) = self.get_mut(id) {
            list.push(value);
        }
        Ok(())
    }

    /// Enqueues at the tail of a modifiable queue.
    pub fn queue_push(&mut self, id: HeapId, value: Value) -> HeapResult<()> {
        self.modifiable_queue(id)?;
        self.charge_growth(id, ELEMENT_BYTES)?;
        if let HeapData::Queue(queue) = self.get_mut(id) {
            queue.push_back(value);
        }
        Ok(())
    }

    /// Dequeues from the head of a modifiable queue.
    pub fn queue_pop(&mut self, id: HeapId) -> HeapResult<Option<Value>> {
        self.modifiable_queue(id)?;
        let popped = match self.get_mut(id) {
            HeapData::Queue(queue) => queue.pop_front(),
            _ => None,
        };
        if popped.is_some() {
            self.refund(id, ELEMENT_BYTES);
        }
        Ok(popped)
    }

    fn modifiable_queue(&self, id: HeapId) -> HeapResult<()> {
        match self.get(id) {
            HeapData::Queue(queue) if queue.kind().is_mutable() => Ok(()),
            HeapData::Queue(_) => Err(HeapError::Unmodifiable { kind: "Queue" }),
            other => Err(wrong_type("Queue", other)),
        }
    }

    /// Adds to a modifiable set, returning whether the value was absent.
    pub fn set_add(&mut self, id: HeapId, value: Value) -> HeapResult<bool> {
        let mutable = match self.get(id) {
            HeapData::Set(set) => set.kind().is_mutable(),
            other => return Err(wrong_type("Set", other)),
        };
        if !mutable {
            return Err(HeapError::Unmodifiable { kind: "Set" });
        }
        Ok(self.add_to_set(id, value)?)
    }

    /// Inserts into a modifiable map, returning the replaced value.
    pub fn map_insert(&mut self, id: HeapId, key: Value, value: Value) -> HeapResult<Option<Value>> {
        let mutable = match self.get(id) {
            HeapData::Map(map) => map.kind().is_mutable(),
            other => return Err(wrong_type("Map", other)),
        };
        if !mutable {
            return Err(HeapError::Unmodifiable { kind: "Map" });
        }
        Ok(self.put_in_map(id, key, value)?)
    }

    /// Looks up `key` in a map.
    pub fn map_get(&self, id: HeapId, key: Value) -> HeapResult<Option<Value>> {
        match self.get(id) {
            HeapData::Map(map) => Ok(map.get(key)),
            other => Err(wrong_type("Map", other)),
        }
    }

    /// Snapshot of the elements of an array, list, queue or set in iteration order.
    pub fn items(&self, id: HeapId) -> HeapResult<Vec<Value>> {
        match self.get(id) {
            HeapData::Array(array) => Ok(array.items().to_vec()),
            HeapData::List(list) => Ok(list.items().to_vec()),
            HeapData::Queue(queue) => Ok(queue.iter().copied().collect()),
            HeapData::Set(set) => Ok(set.iter().copied().collect()),
            other => Err(wrong_type("Array, List, Queue or Set", other)),
        }
    }

    /// Snapshot of a map's entries in iteration order.
    pub fn map_entries(&self, id: HeapId) -> HeapResult<Vec<(Value, Value)>> {
        match self.get(id) {
            HeapData::Map(map) => Ok(map.iter().map(|(k, v)| (*k, *v)).collect()),
            other => Err(wrong_type("Map", other)),
        }
    }

    /// Inserts into a set regardless of its kind's mutability, charging the new entry.
    fn add_to_set(&mut self, id: HeapId, value: Value) -> Result<bool, ResourceError> {
        self.charge_growth(id, SET_ENTRY_BYTES)?;
        let inserted = self.with_entry_mut(id, |heap, data| match data {
            HeapData::Set(set) => set.insert(value, |a, b| total_cmp(a, b, &*heap)),
            _ => false,
        });
        if !inserted {
            self.refund(id, SET_ENTRY_BYTES);
        }
        Ok(inserted)
    }

    /// Inserts into a map regardless of its kind's mutability, charging a new entry.
    fn put_in_map(&mut self, id: HeapId, key: Value, value: Value) -> Result<Option<Value>, ResourceError> {
        self.charge_growth(id, MAP_ENTRY_BYTES)?;
        let replaced = self.with_entry_mut(id, |heap, data| match data {
            HeapData::Map(map) => map.insert(key, value, |a, b| total_cmp(a, b, &*heap)),
            _ => None,
        });
        if replaced.is_some() {
            self.refund(id, MAP_ENTRY_BYTES);
        }
        Ok(replaced)
    }
}

fn wrong_type(expected: &'static str, found: &HeapData) -> HeapError {
    HeapError::WrongType {
        expected,
        found: found.variant_name(),
    }
}
