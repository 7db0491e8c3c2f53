//! Set collections keyed by value identity.

use std::cmp::Ordering;

use ahash::RandomState;
use indexmap::IndexSet;

use crate::value::Value;

/// Concrete kind of a [`Set`].
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, strum::Display, strum::EnumIter, serde::Serialize, serde::Deserialize,
)]
pub enum SetKind {
    /// Unordered hash set; the canonical set default.
    #[default]
    HashSet,
    /// Hash set iterating in insertion order.
    LinkedHashSet,
    /// Sorted set ordered by the heap's total order over values.
    TreeSet,
    Unmodifiable,
}

impl SetKind {
    #[must_use]
    pub fn is_bare_constructible(self) -> bool {
        !matches!(self, Self::Unmodifiable)
    }

    /// The kind a copy of this set is built as.
    #[must_use]
    pub fn copy_target(self) -> Self {
        if self.is_bare_constructible() { self } else { Self::default() }
    }

    #[must_use]
    pub fn is_sorted(self) -> bool {
        matches!(self, Self::TreeSet)
    }

    #[must_use]
    pub fn is_mutable(self) -> bool {
        self.is_bare_constructible()
    }
}

/// A set of values.
///
/// Membership is identity based (see [`Value`]'s `Eq`). Sorted kinds keep
/// their entries ordered by a comparator supplied on insertion, and treat
/// comparator-equal values as duplicates. Other kinds keep insertion order.
#[derive(Debug, Clone, Default)]
pub struct Set {
    kind: SetKind,
    items: IndexSet<Value, RandomState>,
}

impl Set {
    #[must_use]
    pub fn new(kind: SetKind) -> Self {
        Self {
            kind,
            items: IndexSet::default(),
        }
    }

    #[must_use]
    pub fn with_capacity(kind: SetKind, capacity: usize) -> Self {
        Self {
            kind,
            items: IndexSet::with_capacity_and_hasher(capacity, RandomState::new()),
        }
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> SetKind {
        self.kind
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn contains(&self, value: Value) -> bool {
        self.items.contains(&value)
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = &Value> {
        self.items.iter()
    }

    /// Inserts `value`, returning whether it was absent.
    ///
    /// `cmp` is only consulted by sorted kinds.
    pub(crate) fn insert(&mut self, value: Value, mut cmp: impl FnMut(Value, Value) -> Ordering) -> bool {
        if !self.kind.is_sorted() {
            return self.items.insert(value);
        }
        match self.items.binary_search_by(|probe| cmp(*probe, value)) {
            Ok(_) => false,
            Err(pos) => self.items.shift_insert(pos, value),
        }
    }

    /// Appends `value` at the end without consulting the sort order.
    ///
    /// Only for callers that insert values already in sorted order.
    pub(crate) fn push(&mut self, value: Value) -> bool {
        self.items.insert(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_cmp(a: Value, b: Value) -> Ordering {
        a.as_int().cmp(&b.as_int())
    }

    #[test]
    fn tree_set_keeps_sorted_order() {
        let mut set = Set::new(SetKind::TreeSet);
        for i in [5, 1, 3, 1] {
            set.insert(Value::Int(i), int_cmp);
        }
        let items: Vec<_> = set.iter().copied().collect();
        assert_eq!(items, vec![Value::Int(1), Value::Int(3), Value::Int(5)]);
    }

    #[test]
    fn linked_set_keeps_insertion_order() {
        let mut set = Set::new(SetKind::LinkedHashSet);
        assert!(set.insert(Value::Int(5), int_cmp));
        assert!(set.insert(Value::Int(1), int_cmp));
        assert!(!set.insert(Value::Int(5), int_cmp));
        let items: Vec<_> = set.iter().copied().collect();
        assert_eq!(items, vec![Value::Int(5), Value::Int(1)]);
    }
}
