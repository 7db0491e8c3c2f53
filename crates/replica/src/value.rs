use std::{
    cmp::Ordering,
    fmt::{self, Write},
    hash::{Hash, Hasher},
    mem::discriminant,
};

use ahash::AHashSet;

use crate::{
    heap::{Heap, HeapData, HeapId},
    resource::{MAX_DATA_RECURSION_DEPTH, ResourceTracker},
};

/// Primary value type for nodes of an object graph.
///
/// Small immediate values (absent, booleans, numbers, characters) are stored
/// inline, while everything with storage identity lives in the heap arena and
/// is referenced via `Ref(HeapId)`.
///
/// Equality and hashing are *identity* based: two `Ref`s are equal only when
/// they name the same heap entry, and floats compare by bit pattern so that
/// `Value` can key sets and maps. Use [`Value::deep_eq`] for structural
/// comparison.
///
/// NOTE: it's important to keep this size small to minimize memory overhead!
#[derive(Debug, Clone, Copy, Default)]
pub enum Value {
    /// The absent value (`null`).
    #[default]
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Char(char),
    Ref(HeapId),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Char(a), Self::Char(b)) => a == b,
            (Self::Ref(a), Self::Ref(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        discriminant(self).hash(state);
        match self {
            Self::None => {}
            Self::Bool(b) => b.hash(state),
            Self::Int(i) => i.hash(state),
            Self::Float(f) => f.to_bits().hash(state),
            Self::Char(c) => c.hash(state),
            Self::Ref(id) => id.hash(state),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<char> for Value {
    fn from(v: char) -> Self {
        Self::Char(v)
    }
}

impl From<HeapId> for Value {
    fn from(id: HeapId) -> Self {
        Self::Ref(id)
    }
}

impl Value {
    /// Returns the heap id if this value is a reference.
    #[inline]
    #[must_use]
    pub fn ref_id(self) -> Option<HeapId> {
        match self {
            Self::Ref(id) => Some(id),
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_none(self) -> bool {
        matches!(self, Self::None)
    }

    #[must_use]
    pub fn as_int(self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(i),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_float(self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(f),
            _ => None,
        }
    }

    /// Short name of the value's kind, used in error messages.
    #[must_use]
    pub fn kind_name(self, heap: &Heap<impl ResourceTracker>) -> &'static str {
        match self {
            Self::None => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Char(_) => "char",
            Self::Ref(id) => heap.get_if_live(id).map_or("<freed>", HeapData::variant_name),
        }
    }

    /// Renders the value and everything reachable from it.
    ///
    /// Strings are quoted, aggregates render as `Class{field=value, ...}`, maps as
    /// `{key=value}` and sets as `{a, b}`. A container reached again while it is
    /// still being rendered prints as `[...]`, `{...}` or `Class{...}`.
    #[must_use]
    pub fn repr(self, heap: &Heap<impl ResourceTracker>) -> String {
        let mut out = String::new();
        let mut active = AHashSet::new();
        // writing into a String cannot fail
        let _ = repr_fmt(self, heap, &mut out, &mut active, MAX_DATA_RECURSION_DEPTH);
        out
    }

    /// Structural equality across two (possibly different) subgraphs.
    ///
    /// Atomic heap values compare by content, containers by contents regardless
    /// of their concrete kind, and instances by class identity plus slot contents.
    /// Cycles are handled coinductively: a pair already under comparison is
    /// assumed equal. Returns `false` once nesting exceeds the data recursion limit.
    #[must_use]
    pub fn deep_eq(self, other: Self, heap: &Heap<impl ResourceTracker>) -> bool {
        let mut assumed = AHashSet::new();
        deep_eq_inner(self, other, heap, &mut assumed, MAX_DATA_RECURSION_DEPTH)
    }
}

fn repr_fmt(
    value: Value,
    heap: &Heap<impl ResourceTracker>,
    f: &mut String,
    active: &mut AHashSet<HeapId>,
    depth: u16,
) -> fmt::Result {
    let id = match value {
        Value::None => return f.write_str("null"),
        Value::Bool(b) => return write!(f, "{b}"),
        Value::Int(i) => return write!(f, "{i}"),
        Value::Float(x) => return write!(f, "{x:?}"),
        Value::Char(c) => return write!(f, "{c:?}"),
        Value::Ref(id) => id,
    };
    let Some(data) = heap.get_if_live(id) else {
        return f.write_str("<freed>");
    };
    let open_marker = match data {
        HeapData::Str(s) => return write!(f, "{:?}", s.as_str()),
        HeapData::LongInt(li) => return write!(f, "{li}"),
        HeapData::Class(cls) => return write!(f, "<class {}>", cls.name()),
        HeapData::EnumMember(member) => {
            let class_name = match heap.get_if_live(member.class_id()) {
                Some(HeapData::Class(cls)) => cls.name(),
                _ => "?",
            };
            return write!(f, "{class_name}.{}", member.name());
        }
        HeapData::Array(_) | HeapData::List(_) | HeapData::Queue(_) => "[...]",
        HeapData::Set(_) | HeapData::Map(_) => "{...}",
        HeapData::Instance(inst) => {
            if active.contains(&id) || depth == 0 {
                let class_name = match heap.get_if_live(inst.class_id()) {
                    Some(HeapData::Class(cls)) => cls.name(),
                    _ => "?",
                };
                return write!(f, "{class_name}{{...}}");
            }
            ""
        }
    };
    if active.contains(&id) || depth == 0 {
        return f.write_str(open_marker);
    }

    active.insert(id);
    match data {
        HeapData::Array(array) => repr_sequence(array.items().iter().copied(), heap, f, active, depth)?,
        HeapData::List(list) => repr_sequence(list.items().iter().copied(), heap, f, active, depth)?,
        HeapData::Queue(queue) => repr_sequence(queue.iter().copied(), heap, f, active, depth)?,
        HeapData::Set(set) => {
            f.write_char('{')?;
            for (i, item) in set.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                repr_fmt(*item, heap, f, active, depth - 1)?;
            }
            f.write_char('}')?;
        }
        HeapData::Map(map) => {
            f.write_char('{')?;
            for (i, (key, value)) in map.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                repr_fmt(*key, heap, f, active, depth - 1)?;
                f.write_char('=')?;
                repr_fmt(*value, heap, f, active, depth - 1)?;
            }
            f.write_char('}')?;
        }
        HeapData::Instance(inst) => {
            let Some(HeapData::Class(cls)) = heap.get_if_live(inst.class_id()) else {
                active.remove(&id);
                return f.write_str("<instance of freed class>");
            };
            write!(f, "{}{{", cls.name())?;
            for (i, (slot, value)) in cls.layout().iter().zip(inst.slots()).enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{}=", slot.name())?;
                repr_fmt(*value, heap, f, active, depth - 1)?;
            }
            f.write_char('}')?;
        }
        _ => unreachable!("atomic heap data returned above"),
    }
    active.remove(&id);
    Ok(())
}

fn repr_sequence(
    items: impl Iterator<Item = Value>,
    heap: &Heap<impl ResourceTracker>,
    f: &mut String,
    active: &mut AHashSet<HeapId>,
    depth: u16,
) -> fmt::Result {
    f.write_char('[')?;
    for (i, item) in items.enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        repr_fmt(item, heap, f, active, depth - 1)?;
    }
    f.write_char(']')
}

fn deep_eq_inner(
    a: Value,
    b: Value,
    heap: &Heap<impl ResourceTracker>,
    assumed: &mut AHashSet<(HeapId, HeapId)>,
    depth: u16,
) -> bool {
    let (left, right) = match (a, b) {
        (Value::Ref(left), Value::Ref(right)) => (left, right),
        _ => return a == b,
    };
    if left == right || assumed.contains(&(left, right)) {
        return true;
    }
    if depth == 0 {
        return false;
    }
    let (Some(ldata), Some(rdata)) = (heap.get_if_live(left), heap.get_if_live(right)) else {
        return false;
    };
    let depth = depth - 1;
    match (ldata, rdata) {
        (HeapData::Str(l), HeapData::Str(r)) => l == r,
        (HeapData::LongInt(l), HeapData::LongInt(r)) => l == r,
        (HeapData::Array(l), HeapData::Array(r)) => {
            assumed.insert((left, right));
            l.elem() == r.elem() && pairwise_eq(l.items().iter(), r.items().iter(), l.len(), r.len(), heap, assumed, depth)
        }
        (HeapData::List(l), HeapData::List(r)) => {
            assumed.insert((left, right));
            pairwise_eq(l.items().iter(), r.items().iter(), l.len(), r.len(), heap, assumed, depth)
        }
        (HeapData::Queue(l), HeapData::Queue(r)) => {
            assumed.insert((left, right));
            pairwise_eq(l.iter(), r.iter(), l.len(), r.len(), heap, assumed, depth)
        }
        (HeapData::Set(l), HeapData::Set(r)) => {
            if l.len() != r.len() {
                return false;
            }
            assumed.insert((left, right));
            let lhs: Vec<(Value, Value)> = l.iter().map(|v| (*v, Value::None)).collect();
            let rhs: Vec<(Value, Value)> = r.iter().map(|v| (*v, Value::None)).collect();
            unordered_eq(&lhs, &rhs, heap, assumed, depth)
        }
        (HeapData::Map(l), HeapData::Map(r)) => {
            if l.len() != r.len() {
                return false;
            }
            assumed.insert((left, right));
            let lhs: Vec<(Value, Value)> = l.iter().map(|(k, v)| (*k, *v)).collect();
            let rhs: Vec<(Value, Value)> = r.iter().map(|(k, v)| (*k, *v)).collect();
            unordered_eq(&lhs, &rhs, heap, assumed, depth)
        }
        (HeapData::Instance(l), HeapData::Instance(r)) => {
            if l.class_id() != r.class_id() {
                return false;
            }
            assumed.insert((left, right));
            let (ls, rs) = (l.slots(), r.slots());
            pairwise_eq(ls.iter(), rs.iter(), ls.len(), rs.len(), heap, assumed, depth)
        }
        // classes and enum members only equal themselves
        _ => false,
    }
}

fn pairwise_eq<'a>(
    lhs: impl Iterator<Item = &'a Value>,
    rhs: impl Iterator<Item = &'a Value>,
    left_len: usize,
    right_len: usize,
    heap: &Heap<impl ResourceTracker>,
    assumed: &mut AHashSet<(HeapId, HeapId)>,
    depth: u16,
) -> bool {
    left_len == right_len && lhs.zip(rhs).all(|(l, r)| deep_eq_inner(*l, *r, heap, assumed, depth))
}

/// Multiset comparison of entries; each left entry must claim a distinct right entry.
fn unordered_eq(
    lhs: &[(Value, Value)],
    rhs: &[(Value, Value)],
    heap: &Heap<impl ResourceTracker>,
    assumed: &mut AHashSet<(HeapId, HeapId)>,
    depth: u16,
) -> bool {
    let mut claimed = vec![false; rhs.len()];
    'outer: for (lk, lv) in lhs {
        for (j, (rk, rv)) in rhs.iter().enumerate() {
            if claimed[j] {
                continue;
            }
            let mut trial = assumed.clone();
            if deep_eq_inner(*lk, *rk, heap, &mut trial, depth) && deep_eq_inner(*lv, *rv, heap, &mut trial, depth) {
                *assumed = trial;
                claimed[j] = true;
                continue 'outer;
            }
        }
        return false;
    }
    true
}

/// Total order used by sorted set and map kinds.
///
/// Ranks: absent, booleans, numbers (ints and floats compared numerically),
/// chars, strings, big integers, enum members (declaring class, then ordinal),
/// and finally any other heap reference by handle.
pub(crate) fn total_cmp(a: Value, b: Value, heap: &Heap<impl ResourceTracker>) -> Ordering {
    let (rank_a, rank_b) = (rank(a, heap), rank(b, heap));
    if rank_a != rank_b {
        return rank_a.cmp(&rank_b);
    }
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(&y),
        (Value::Int(x), Value::Int(y)) => x.cmp(&y),
        (Value::Float(x), Value::Float(y)) => x.total_cmp(&y),
        (Value::Int(x), Value::Float(y)) => (x as f64).total_cmp(&y).then(Ordering::Less),
        (Value::Float(x), Value::Int(y)) => x.total_cmp(&(y as f64)).then(Ordering::Greater),
        (Value::Char(x), Value::Char(y)) => x.cmp(&y),
        (Value::Ref(x), Value::Ref(y)) => match (heap.get_if_live(x), heap.get_if_live(y)) {
            (Some(HeapData::Str(l)), Some(HeapData::Str(r))) => l.as_str().cmp(r.as_str()),
            (Some(HeapData::LongInt(l)), Some(HeapData::LongInt(r))) => l.value().cmp(r.value()),
            (Some(HeapData::EnumMember(l)), Some(HeapData::EnumMember(r))) => l
                .class_id()
                .index()
                .cmp(&r.class_id().index())
                .then(l.ordinal().cmp(&r.ordinal())),
            _ => x.index().cmp(&y.index()),
        },
        _ => Ordering::Equal,
    }
}

fn rank(value: Value, heap: &Heap<impl ResourceTracker>) -> u8 {
    match value {
        Value::None => 0,
        Value::Bool(_) => 1,
        Value::Int(_) | Value::Float(_) => 2,
        Value::Char(_) => 3,
        Value::Ref(id) => match heap.get_if_live(id) {
            Some(HeapData::Str(_)) => 4,
            Some(HeapData::LongInt(_)) => 5,
            Some(HeapData::EnumMember(_)) => 6,
            _ => 7,
        },
    }
}
