//! Immutable text stored on the heap.
//!
//! Strings are interned per heap (see [`Heap::intern_str`](crate::Heap::intern_str)),
//! so two strings with the same contents share one entry. The copier treats them
//! as atomic and hands back the same handle.

use std::fmt;

/// Immutable string payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Str(Box<str>);

impl Str {
    /// Creates a new string payload.
    #[must_use]
    pub fn new(s: impl Into<Box<str>>) -> Self {
        Self(s.into())
    }

    /// Returns the string contents.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Str {
    fn from(s: &str) -> Self {
        Self(s.into())
    }
}

impl From<String> for Str {
    fn from(s: String) -> Self {
        Self(s.into_boxed_str())
    }
}

impl fmt::Display for Str {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
