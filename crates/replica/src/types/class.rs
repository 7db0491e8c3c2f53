//! Class objects, their instances and enumerated constants.
//!
//! A [`ClassObject`] is the explicit per-type field table the copier walks: it
//! lists every storage slot of the type, inherited slots first, together with
//! the slot's declared type and access level. An [`Instance`] is nothing more
//! than a class handle plus one value per slot of that layout.
//!
//! # Construction paths
//!
//! - [`Heap::instantiate`](crate::Heap::instantiate) runs the class
//!   initializer. This is the cooperative path ordinary code uses.
//! - Bare allocation produces a zero-filled instance without running any
//!   initializer. Only classes built with [`ClassBuilder::allow_bare_alloc`]
//!   support it, and only the copier uses it.

use std::{fmt, rc::Rc};

use ahash::AHashMap;
use smallvec::SmallVec;

use super::ValueType;
use crate::{heap::HeapId, value::Value};

/// Access level of a slot, as seen by the copier's override.
///
/// Normal heap accessors ([`Heap::get_field`](crate::Heap::get_field) and
/// friends) act as the owning type's own code and ignore access levels.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, strum::Display, serde::Serialize, serde::Deserialize,
)]
pub enum Access {
    #[default]
    Public,
    /// Hidden from other types, but the override can read and write it.
    Private,
    /// Fixed after construction: the override may read it but never write it.
    ReadOnly,
    /// Neither readable nor writable through the override.
    Sealed,
}

impl Access {
    #[must_use]
    pub fn allows_override_read(self) -> bool {
        !matches!(self, Self::Sealed)
    }

    #[must_use]
    pub fn allows_override_write(self) -> bool {
        matches!(self, Self::Public | Self::Private)
    }
}

/// One storage slot of a class layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSlot {
    name: Box<str>,
    ty: ValueType,
    access: Access,
    /// Class that declared the slot.
    owner: HeapId,
}

impl FieldSlot {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn ty(&self) -> ValueType {
        self.ty
    }

    #[must_use]
    pub fn access(&self) -> Access {
        self.access
    }

    #[must_use]
    pub fn owner(&self) -> HeapId {
        self.owner
    }
}

/// Cooperative construction logic attached to a class.
///
/// Receives the zero-filled instance under construction and the arguments
/// passed to [`Heap::instantiate`](crate::Heap::instantiate). Returning `Err`
/// rejects the arguments and no instance is allocated.
pub type Initializer = Rc<dyn Fn(&mut InstanceInit<'_>) -> Result<(), String>>;

/// Describes a class before it is placed on the heap.
///
/// ```
/// use replica::{Access, ClassBuilder, Heap, ValueType};
///
/// let mut heap = Heap::default();
/// let point = heap
///     .define_class(
///         ClassBuilder::new("Point")
///             .field("x", ValueType::Int)
///             .field_with_access("y", ValueType::Int, Access::Private)
///             .allow_bare_alloc(),
///     )
///     .unwrap();
/// let p = heap.instantiate(point, &[1.into(), 2.into()]).unwrap();
/// assert_eq!(heap.get_field(p, "y").unwrap(), 2.into());
/// ```
#[derive(Clone, Default)]
pub struct ClassBuilder {
    pub(crate) name: String,
    pub(crate) parent: Option<HeapId>,
    pub(crate) fields: Vec<(String, ValueType, Access)>,
    pub(crate) bare_alloc: bool,
    pub(crate) immutable: bool,
    pub(crate) initializer: Option<Initializer>,
}

impl ClassBuilder {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Inherits every slot of `parent`.
    #[must_use]
    pub fn extends(mut self, parent: HeapId) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Declares a public slot.
    #[must_use]
    pub fn field(self, name: impl Into<String>, ty: ValueType) -> Self {
        self.field_with_access(name, ty, Access::Public)
    }

    #[must_use]
    pub fn field_with_access(mut self, name: impl Into<String>, ty: ValueType, access: Access) -> Self {
        self.fields.push((name.into(), ty, access));
        self
    }

    /// Lets instances be created zero-filled without running the initializer.
    #[must_use]
    pub fn allow_bare_alloc(mut self) -> Self {
        self.bare_alloc = true;
        self
    }

    /// Marks instances as immutable: copies share them instead of duplicating.
    ///
    /// Immutable classes cannot be extended.
    #[must_use]
    pub fn immutable(mut self) -> Self {
        self.immutable = true;
        self
    }

    #[must_use]
    pub fn initializer(mut self, init: impl Fn(&mut InstanceInit<'_>) -> Result<(), String> + 'static) -> Self {
        self.initializer = Some(Rc::new(init));
        self
    }
}

impl fmt::Debug for ClassBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassBuilder")
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("fields", &self.fields)
            .field("bare_alloc", &self.bare_alloc)
            .field("immutable", &self.immutable)
            .field("initializer", &self.initializer.is_some())
            .finish()
    }
}

/// A class: name, full slot layout and construction policy.
#[derive(Clone)]
pub struct ClassObject {
    name: Box<str>,
    parent: Option<HeapId>,
    /// Ancestor slots first, root-most class first, then own slots.
    layout: Vec<FieldSlot>,
    /// Slot name -> index of the most derived slot with that name.
    field_index: AHashMap<Box<str>, usize>,
    bare_alloc: bool,
    immutable: bool,
    initializer: Option<Initializer>,
    /// Constants of an enum class, by ordinal.
    members: Vec<HeapId>,
}

impl ClassObject {
    /// Builds the class that will live at `self_id`, appending the builder's
    /// own slots after `inherited`.
    pub(crate) fn new(builder: ClassBuilder, self_id: HeapId, inherited: &[FieldSlot]) -> Self {
        let mut layout = inherited.to_vec();
        layout.extend(builder.fields.into_iter().map(|(name, ty, access)| FieldSlot {
            name: name.into_boxed_str(),
            ty,
            access,
            owner: self_id,
        }));
        // later slots shadow earlier ones of the same name
        let field_index = layout
            .iter()
            .enumerate()
            .map(|(i, slot)| (slot.name.clone(), i))
            .collect();
        Self {
            name: builder.name.into_boxed_str(),
            parent: builder.parent,
            layout,
            field_index,
            bare_alloc: builder.bare_alloc,
            immutable: builder.immutable,
            initializer: builder.initializer,
            members: Vec::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn parent(&self) -> Option<HeapId> {
        self.parent
    }

    #[must_use]
    pub fn layout(&self) -> &[FieldSlot] {
        &self.layout
    }

    /// Index of the most derived slot called `name`.
    #[must_use]
    pub fn slot_index(&self, name: &str) -> Option<usize> {
        self.field_index.get(name).copied()
    }

    /// Index of the slot called `name` declared by `owner` (for shadowed slots).
    #[must_use]
    pub fn declared_slot_index(&self, owner: HeapId, name: &str) -> Option<usize> {
        self.layout
            .iter()
            .position(|slot| slot.owner == owner && &*slot.name == name)
    }

    #[must_use]
    pub fn allows_bare_alloc(&self) -> bool {
        self.bare_alloc
    }

    #[must_use]
    pub fn is_immutable(&self) -> bool {
        self.immutable
    }

    #[must_use]
    pub fn members(&self) -> &[HeapId] {
        &self.members
    }

    pub(crate) fn initializer(&self) -> Option<Initializer> {
        self.initializer.clone()
    }

    pub(crate) fn set_members(&mut self, members: Vec<HeapId>) {
        self.members = members;
    }

    /// A fresh slot vector holding each slot's zero value.
    pub(crate) fn zero_slots(&self) -> SmallVec<[Value; 4]> {
        self.layout.iter().map(|slot| slot.ty.zero()).collect()
    }
}

impl fmt::Debug for ClassObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassObject")
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("layout", &self.layout)
            .field("bare_alloc", &self.bare_alloc)
            .field("immutable", &self.immutable)
            .field("initializer", &self.initializer.is_some())
            .field("members", &self.members)
            .finish_non_exhaustive()
    }
}

/// View of an instance under construction, handed to an [`Initializer`].
pub struct InstanceInit<'a> {
    class: &'a ClassObject,
    slots: &'a mut [Value],
    args: &'a [Value],
}

impl<'a> InstanceInit<'a> {
    pub(crate) fn new(class: &'a ClassObject, slots: &'a mut [Value], args: &'a [Value]) -> Self {
        Self { class, slots, args }
    }

    #[must_use]
    pub fn class_name(&self) -> &str {
        self.class.name()
    }

    #[must_use]
    pub fn args(&self) -> &[Value] {
        self.args
    }

    /// The argument at `index`, or an error naming the missing position.
    pub fn arg(&self, index: usize) -> Result<Value, String> {
        self.args
            .get(index)
            .copied()
            .ok_or_else(|| format!("missing argument {index}"))
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<Value> {
        self.class.slot_index(field).map(|i| self.slots[i])
    }

    /// Writes the most derived slot called `field`.
    pub fn set(&mut self, field: &str, value: Value) -> Result<(), String> {
        let index = self
            .class
            .slot_index(field)
            .ok_or_else(|| format!("no field `{field}`"))?;
        let slot = &self.class.layout[index];
        if !slot.ty.accepts(value) {
            return Err(format!("field `{field}` expects {}", slot.ty));
        }
        self.slots[index] = value;
        Ok(())
    }
}

/// An instance of a plain aggregate class.
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    class_id: HeapId,
    slots: SmallVec<[Value; 4]>,
}

impl Instance {
    pub(crate) fn new(class_id: HeapId, slots: SmallVec<[Value; 4]>) -> Self {
        Self { class_id, slots }
    }

    #[must_use]
    pub fn class_id(&self) -> HeapId {
        self.class_id
    }

    #[must_use]
    pub fn slots(&self) -> &[Value] {
        &self.slots
    }

    #[must_use]
    pub fn slot(&self, index: usize) -> Option<Value> {
        self.slots.get(index).copied()
    }

    pub(crate) fn set_slot(&mut self, index: usize, value: Value) {
        self.slots[index] = value;
    }
}

/// A constant of an enum class. Always shared, never copied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumMember {
    class_id: HeapId,
    ordinal: u32,
    name: Box<str>,
}

impl EnumMember {
    pub(crate) fn new(class_id: HeapId, ordinal: u32, name: &str) -> Self {
        Self {
            class_id,
            ordinal,
            name: name.into(),
        }
    }

    #[must_use]
    pub fn class_id(&self) -> HeapId {
        self.class_id
    }

    #[must_use]
    pub fn ordinal(&self) -> u32 {
        self.ordinal
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}
