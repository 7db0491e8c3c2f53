//! Fixed-length, homogeneously typed arrays.

use crate::{
    error::{HeapError, HeapResult},
    value::Value,
};

/// Declared type of an array element or an aggregate field.
///
/// Determines the zero value a fresh allocation is filled with and which
/// values a slot accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, serde::Serialize, serde::Deserialize)]
pub enum ValueType {
    Bool,
    Int,
    Float,
    Char,
    /// Any heap reference, or absent.
    Object,
}

impl ValueType {
    /// The value a bare allocation holds before anything is written.
    #[must_use]
    pub fn zero(self) -> Value {
        match self {
            Self::Bool => Value::Bool(false),
            Self::Int => Value::Int(0),
            Self::Float => Value::Float(0.0),
            Self::Char => Value::Char('\0'),
            Self::Object => Value::None,
        }
    }

    /// Whether a slot of this type can hold `value`.
    #[must_use]
    pub fn accepts(self, value: Value) -> bool {
        matches!(
            (self, value),
            (Self::Bool, Value::Bool(_))
                | (Self::Int, Value::Int(_))
                | (Self::Float, Value::Float(_))
                | (Self::Char, Value::Char(_))
                | (Self::Object, Value::None | Value::Ref(_))
        )
    }

    pub(crate) fn check(self, value: Value, found: &'static str) -> HeapResult<()> {
        if self.accepts(value) {
            Ok(())
        } else {
            Err(HeapError::WrongType {
                expected: self.name(),
                found,
            })
        }
    }

    /// Lowercase name used in error messages.
    pub(crate) fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Char => "char",
            Self::Object => "object reference",
        }
    }
}

/// A fixed-length array whose elements all share one [`ValueType`].
#[derive(Debug, Clone, PartialEq)]
pub struct Array {
    elem: ValueType,
    items: Vec<Value>,
}

impl Array {
    /// Allocates an array of `len` zero values.
    #[must_use]
    pub fn zeroed(elem: ValueType, len: usize) -> Self {
        Self {
            elem,
            items: vec![elem.zero(); len],
        }
    }

    /// Builds an array from items, or returns the first item the element type rejects.
    pub fn from_items(elem: ValueType, items: Vec<Value>) -> Result<Self, Value> {
        if let Some(bad) = items.iter().find(|item| !elem.accepts(**item)) {
            return Err(*bad);
        }
        Ok(Self { elem, items })
    }

    #[must_use]
    pub fn elem(&self) -> ValueType {
        self.elem
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn items(&self) -> &[Value] {
        &self.items
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<Value> {
        self.items.get(index).copied()
    }

    /// Stores `value` at `index`, returning the previous element.
    ///
    /// `found` names the value's kind for the error message when the element
    /// type rejects it.
    pub fn set(&mut self, index: usize, value: Value, found: &'static str) -> HeapResult<Value> {
        let len = self.items.len();
        let slot = self
            .items
            .get_mut(index)
            .ok_or(HeapError::IndexOutOfRange { index, len })?;
        self.elem.check(value, found)?;
        Ok(std::mem::replace(slot, value))
    }

    /// Stores a value already known to match the element type.
    pub(crate) fn put(&mut self, index: usize, value: Value) {
        debug_assert!(self.elem.accepts(value), "array element type mismatch");
        self.items[index] = value;
    }
}
