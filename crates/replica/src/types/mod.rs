//! Payload types stored in heap entries.

mod array;
mod class;
mod list;
mod long_int;
mod map;
mod queue;
mod set;
mod str;

pub use array::{Array, ValueType};
pub use class::{Access, ClassBuilder, ClassObject, EnumMember, FieldSlot, Initializer, Instance, InstanceInit};
pub use list::{List, ListKind};
pub use long_int::LongInt;
pub use map::{Map, MapKind};
pub use queue::{Queue, QueueKind};
pub use set::{Set, SetKind};
pub use str::Str;
