//! Ordered sequence collections.

use crate::value::Value;

/// Concrete kind of a [`List`].
///
/// The kind decides whether a copy can reuse it directly or must fall back to
/// [`ListKind::ArrayList`].
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, strum::Display, strum::EnumIter, serde::Serialize, serde::Deserialize,
)]
pub enum ListKind {
    #[default]
    ArrayList,
    LinkedList,
    /// A read-only view. Callers cannot mutate it and it has no empty constructor.
    Unmodifiable,
}

impl ListKind {
    /// Whether an empty collection of this kind can be created without arguments.
    #[must_use]
    pub fn is_bare_constructible(self) -> bool {
        !matches!(self, Self::Unmodifiable)
    }

    /// The kind a copy of this list is built as.
    #[must_use]
    pub fn copy_target(self) -> Self {
        if self.is_bare_constructible() { self } else { Self::default() }
    }

    #[must_use]
    pub fn is_mutable(self) -> bool {
        self.is_bare_constructible()
    }
}

/// An ordered, growable sequence of values.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct List {
    kind: ListKind,
    items: Vec<Value>,
}

impl List {
    #[inline]
    #[must_use]
    pub fn new(kind: ListKind) -> Self {
        Self { kind, items: Vec::new() }
    }

    #[must_use]
    pub fn from_items(kind: ListKind, items: Vec<Value>) -> Self {
        Self { kind, items }
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> ListKind {
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
    pub fn items(&self) -> &[Value] {
        &self.items
    }

    /// Appends an item, ignoring the kind's mutability.
    ///
    /// Kind checks belong to the public heap operations; the copier fills
    /// fresh lists through this directly.
    pub(crate) fn push(&mut self, item: Value) {
        self.items.push(item);
    }

    pub(crate) fn reserve(&mut self, additional: usize) {
        self.items.reserve(additional);
    }
}
