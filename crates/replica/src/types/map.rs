//! Key-value mapping collections.

use std::cmp::Ordering;

use ahash::RandomState;
use indexmap::IndexMap;

use crate::value::Value;

/// Concrete kind of a [`Map`].
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, strum::Display, strum::EnumIter, serde::Serialize, serde::Deserialize,
)]
pub enum MapKind {
    HashMap,
    /// Insertion-ordered map; the fallback for unsorted maps that cannot be rebuilt as-is.
    #[default]
    LinkedHashMap,
    /// Map sorted by key.
    TreeMap,
    /// Read-only view over an unsorted map.
    Unmodifiable,
    /// Read-only view over a sorted map.
    UnmodifiableSorted,
}

impl MapKind {
    #[must_use]
    pub fn is_bare_constructible(self) -> bool {
        !matches!(self, Self::Unmodifiable | Self::UnmodifiableSorted)
    }

    #[must_use]
    pub fn is_sorted(self) -> bool {
        matches!(self, Self::TreeMap | Self::UnmodifiableSorted)
    }

    /// The kind a copy of this map is built as.
    ///
    /// Sorted maps that cannot be rebuilt fall back to [`MapKind::TreeMap`],
    /// everything else to [`MapKind::LinkedHashMap`].
    #[must_use]
    pub fn copy_target(self) -> Self {
        if self.is_bare_constructible() {
            self
        } else if self.is_sorted() {
            Self::TreeMap
        } else {
            Self::LinkedHashMap
        }
    }

    #[must_use]
    pub fn is_mutable(self) -> bool {
        self.is_bare_constructible()
    }
}

/// A mapping from keys to values.
///
/// Keys are compared by identity. Sorted kinds order entries by a comparator
/// supplied on insertion; a comparator-equal key replaces the value of the
/// existing entry and keeps the existing key.
#[derive(Debug, Clone, Default)]
pub struct Map {
    kind: MapKind,
    entries: IndexMap<Value, Value, RandomState>,
}

impl Map {
    #[must_use]
    pub fn new(kind: MapKind) -> Self {
        Self {
            kind,
            entries: IndexMap::default(),
        }
    }

    #[must_use]
    pub fn with_capacity(kind: MapKind, capacity: usize) -> Self {
        Self {
            kind,
            entries: IndexMap::with_capacity_and_hasher(capacity, RandomState::new()),
        }
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> MapKind {
        self.kind
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn get(&self, key: Value) -> Option<Value> {
        self.entries.get(&key).copied()
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = (&Value, &Value)> {
        self.entries.iter()
    }

    /// Inserts an entry, returning the value it replaced.
    ///
    /// `cmp` is only consulted by sorted kinds.
    pub(crate) fn insert(
        &mut self,
        key: Value,
        value: Value,
        mut cmp: impl FnMut(Value, Value) -> Ordering,
    ) -> Option<Value> {
        if !self.kind.is_sorted() {
            return self.entries.insert(key, value);
        }
        match self.entries.binary_search_by(|probe, _| cmp(*probe, key)) {
            Ok(index) => self
                .entries
                .get_index_mut(index)
                .map(|(_, slot)| std::mem::replace(slot, value)),
            Err(pos) => {
                self.entries.shift_insert(pos, key, value);
                None
            }
        }
    }

    /// Appends an entry at the end without consulting the sort order.
    ///
    /// Only for callers that insert keys already in sorted order.
    pub(crate) fn push(&mut self, key: Value, value: Value) -> Option<Value> {
        self.entries.insert(key, value)
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn fallbacks_keep_sortedness() {
        for kind in MapKind::iter() {
            let target = kind.copy_target();
            assert!(target.is_bare_constructible(), "{kind}");
            assert_eq!(target.is_sorted(), kind.is_sorted(), "{kind}");
        }
    }

    #[test]
    fn tree_map_overwrites_equal_keys() {
        let cmp = |a: Value, b: Value| a.as_int().cmp(&b.as_int());
        let mut map = Map::new(MapKind::TreeMap);
        assert_eq!(map.insert(Value::Int(2), Value::Char('b'), cmp), None);
        assert_eq!(map.insert(Value::Int(1), Value::Char('a'), cmp), None);
        assert_eq!(map.insert(Value::Int(2), Value::Char('z'), cmp), Some(Value::Char('b')));
        let keys: Vec<_> = map.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(map.get(Value::Int(2)), Some(Value::Char('z')));
    }
}
