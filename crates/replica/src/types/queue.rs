//! FIFO queue collections.

use std::collections::VecDeque;

use crate::value::Value;

/// Concrete kind of a [`Queue`].
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, strum::Display, strum::EnumIter, serde::Serialize, serde::Deserialize,
)]
pub enum QueueKind {
    ArrayDeque,
    /// Linked queue; the canonical queue default.
    #[default]
    Linked,
    Unmodifiable,
}

impl QueueKind {
    #[must_use]
    pub fn is_bare_constructible(self) -> bool {
        !matches!(self, Self::Unmodifiable)
    }

    /// The kind a copy of this queue is built as.
    #[must_use]
    pub fn copy_target(self) -> Self {
        if self.is_bare_constructible() { self } else { Self::default() }
    }

    #[must_use]
    pub fn is_mutable(self) -> bool {
        self.is_bare_constructible()
    }
}

/// A first-in first-out queue of values.
///
/// Wraps a `VecDeque<Value>`; iteration runs from head to tail.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Queue {
    kind: QueueKind,
    items: VecDeque<Value>,
}

impl Queue {
    #[inline]
    #[must_use]
    pub fn new(kind: QueueKind) -> Self {
        Self {
            kind,
            items: VecDeque::new(),
        }
    }

    #[must_use]
    pub fn from_items(kind: QueueKind, items: impl IntoIterator<Item = Value>) -> Self {
        Self {
            kind,
            items: items.into_iter().collect(),
        }
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> QueueKind {
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

    /// Iterates from head to tail.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &Value> {
        self.items.iter()
    }

    pub(crate) fn push_back(&mut self, item: Value) {
        self.items.push_back(item);
    }

    pub(crate) fn pop_front(&mut self) -> Option<Value> {
        self.items.pop_front()
    }
}
