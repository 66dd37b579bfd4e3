//! Type descriptors as described by the target's debug information.

use std::fmt;

/// Opaque handle a [`TypeResolver`](crate::TypeResolver) attaches to the
/// descriptors it hands out.
///
/// Only the resolver that produced a handle can interpret it. Descriptors
/// built by hand (tests, aggregate formulas) carry [`TypeHandle::DETACHED`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TypeHandle(u64);

impl TypeHandle
{
    /// Handle for descriptors that do not come from a resolver.
    pub const DETACHED: Self = TypeHandle(0);

    /// Create a handle from a raw resolver-specific value.
    #[must_use]
    pub const fn from_raw(value: u64) -> Self
    {
        Self(value)
    }

    /// Raw resolver-specific value.
    #[must_use]
    pub const fn raw(self) -> u64
    {
        self.0
    }
}

/// Coarse shape of a type, used when evaluating expressions.
///
/// Size queries never look at this: container recognition is purely
/// name-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TypeShape
{
    /// Base types, enums, and anything else without structure.
    #[default]
    Plain,
    /// A pointer or reference.
    Pointer,
    /// A fixed-length array with the given element count.
    Array(u64),
    /// A struct, class or union with named members.
    Record,
}

/// A type known to the inspected process's debug information.
///
/// Typedefs and cv-qualifiers are already stripped: `const int64_t` arrives as
/// `long`. Template arguments are resolved eagerly, in declaration order,
/// so `std::map<K, V>` exposes `K` at index 0 and `V` at index 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor
{
    name: String,
    size: u64,
    align: u64,
    shape: TypeShape,
    template_args: Vec<TypeDescriptor>,
    handle: TypeHandle,
}

impl TypeDescriptor
{
    /// Create a detached descriptor with a natural alignment derived from `size`.
    ///
    /// ```rust
    /// use ballast_core::types::TypeDescriptor;
    ///
    /// let int = TypeDescriptor::new("int", 4);
    /// assert_eq!(int.align(), 4);
    /// assert_eq!(TypeDescriptor::new("char [3]", 3).align(), 1);
    /// ```
    pub fn new(name: impl Into<String>, size: u64) -> Self
    {
        Self {
            name: name.into(),
            size,
            align: natural_align(size),
            shape: TypeShape::Plain,
            template_args: Vec::new(),
            handle: TypeHandle::DETACHED,
        }
    }

    #[must_use]
    pub fn with_align(mut self, align: u64) -> Self
    {
        self.align = align.max(1);
        self
    }

    #[must_use]
    pub fn with_shape(mut self, shape: TypeShape) -> Self
    {
        self.shape = shape;
        self
    }

    #[must_use]
    pub fn with_template_args(mut self, args: Vec<TypeDescriptor>) -> Self
    {
        self.template_args = args;
        self
    }

    #[must_use]
    pub fn with_handle(mut self, handle: TypeHandle) -> Self
    {
        self.handle = handle;
        self
    }

    /// Printable name, as a debugger would print it.
    pub fn name(&self) -> &str
    {
        &self.name
    }

    /// Shallow size in bytes.
    pub fn size(&self) -> u64
    {
        self.size
    }

    /// Alignment in bytes (at least 1).
    pub fn align(&self) -> u64
    {
        self.align
    }

    pub fn shape(&self) -> TypeShape
    {
        self.shape
    }

    pub fn template_args(&self) -> &[TypeDescriptor]
    {
        &self.template_args
    }

    /// The `index`-th template type argument, if the type has one.
    pub fn template_argument(&self, index: usize) -> Option<&TypeDescriptor>
    {
        self.template_args.get(index)
    }

    pub fn handle(&self) -> TypeHandle
    {
        self.handle
    }
}

impl fmt::Display for TypeDescriptor
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(&self.name)
    }
}

/// A data member of a record type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor
{
    /// Member name as written in source.
    pub name: String,
    /// Byte offset from the start of the enclosing object (base-class
    /// offsets already folded in).
    pub offset: u64,
    /// Declared type of the member.
    pub ty: TypeDescriptor,
}

impl FieldDescriptor
{
    pub fn new(name: impl Into<String>, offset: u64, ty: TypeDescriptor) -> Self
    {
        Self {
            name: name.into(),
            offset,
            ty,
        }
    }
}

/// Largest power of two dividing `size`, capped at 16.
pub(crate) fn natural_align(size: u64) -> u64
{
    if size == 0 {
        return 1;
    }
    (1u64 << size.trailing_zeros()).min(16)
}
