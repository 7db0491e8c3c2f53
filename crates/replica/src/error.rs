//! Error types for copying graphs and for building or inspecting them.

use std::fmt;

use crate::resource::ResourceError;

/// Which side of a slot transfer failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum SlotOp {
    /// Reading the slot from the original instance.
    Read,
    /// Writing the copied value into the new instance.
    Write,
}

/// Failure of a [`deep_copy`](crate::deep_copy) call.
///
/// Any failure aborts the whole copy: nothing allocated by the failed call
/// survives, and no partial result is handed back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyError {
    /// The class of a plain aggregate refuses bare allocation, so an instance
    /// cannot be produced without running its initializer.
    Instantiation { class: String },
    /// A slot refused the access override needed to read it from the original
    /// or to write it into the copy.
    SlotAccess { class: String, field: String, op: SlotOp },
    /// The heap's resource tracker refused an allocation.
    Resource(ResourceError),
}

impl fmt::Display for CopyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Instantiation { class } => {
                write!(f, "cannot instantiate `{class}` without running its initializer")
            }
            Self::SlotAccess { class, field, op } => {
                write!(f, "cannot {op} field `{class}.{field}`: access override refused")
            }
            Self::Resource(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for CopyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Resource(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ResourceError> for CopyError {
    fn from(err: ResourceError) -> Self {
        Self::Resource(err)
    }
}

/// Failure while building, mutating or inspecting a graph on the heap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeapError {
    /// A value of the wrong kind was supplied (e.g. a list where a class was expected).
    WrongType { expected: &'static str, found: &'static str },
    /// The class (or any ancestor) declares no field with this name.
    UnknownField { class: String, field: String },
    /// Array index outside `0..len`.
    IndexOutOfRange { index: usize, len: usize },
    /// Immutable classes cannot be extended.
    ImmutableBase { class: String },
    /// The container kind does not support mutation.
    Unmodifiable { kind: &'static str },
    /// A class initializer rejected its arguments.
    Rejected { class: String, message: String },
    /// The heap's resource tracker refused an allocation.
    Resource(ResourceError),
}

impl fmt::Display for HeapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WrongType { expected, found } => write!(f, "expected {expected}, found {found}"),
            Self::UnknownField { class, field } => write!(f, "`{class}` has no field `{field}`"),
            Self::IndexOutOfRange { index, len } => {
                write!(f, "index {index} out of range for length {len}")
            }
            Self::ImmutableBase { class } => write!(f, "cannot extend immutable class `{class}`"),
            Self::Unmodifiable { kind } => write!(f, "{kind} does not support mutation"),
            Self::Rejected { class, message } => write!(f, "`{class}` initializer rejected arguments: {message}"),
            Self::Resource(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for HeapError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Resource(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ResourceError> for HeapError {
    fn from(err: ResourceError) -> Self {
        Self::Resource(err)
    }
}

/// Result type alias for heap building and inspection operations.
pub type HeapResult<T> = Result<T, HeapError>;
