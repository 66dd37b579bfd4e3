//! Type information about the inspected program.

use crate::error::Result;
use crate::types::{Address, FieldDescriptor, TypeDescriptor};

/// Source of type information, normally the target's DWARF
///
/// Descriptors come back with typedefs and cv-qualifiers stripped.
/// Lookups by name fail with [`BallastError::TypeLookup`]; a member that does
/// not exist on an existing type is a [`BallastError::Resolution`] instead,
/// since it is the expression that cannot be evaluated, not a type that is
/// missing.
///
/// [`BallastError::TypeLookup`]: crate::BallastError::TypeLookup
/// [`BallastError::Resolution`]: crate::BallastError::Resolution
pub trait TypeResolver
{
    /// Find a type by its fully qualified name (e.g. `CTxIn`, `std::string`).
    fn lookup_type(&self, name: &str) -> Result<TypeDescriptor>;

    /// Find a data member of `owner`, searching base classes too.
    fn field(&self, owner: &TypeDescriptor, name: &str) -> Result<FieldDescriptor>;

    /// The pointed-to type of a pointer, or the element type of an array.
    ///
    /// Returns `Ok(None)` for types that have neither.
    fn pointee(&self, ty: &TypeDescriptor) -> Result<Option<TypeDescriptor>>
    {
        let _ = ty;
        Ok(None)
    }

    /// Find a global variable by name, returning its runtime address and type.
    ///
    /// Returns `Ok(None)` when no such variable is described.
    fn lookup_variable(&self, name: &str) -> Result<Option<(Address, TypeDescriptor)>>
    {
        let _ = name;
        Ok(None)
    }
}

impl<T: TypeResolver + ?Sized> TypeResolver for &T
{
    fn lookup_type(&self, name: &str) -> Result<TypeDescriptor>
    {
        (**self).lookup_type(name)
    }

    fn field(&self, owner: &TypeDescriptor, name: &str) -> Result<FieldDescriptor>
    {
        (**self).field(owner, name)
    }

    fn pointee(&self, ty: &TypeDescriptor) -> Result<Option<TypeDescriptor>>
    {
        (**self).pointee(ty)
    }

    fn lookup_variable(&self, name: &str) -> Result<Option<(Address, TypeDescriptor)>>
    {
        (**self).lookup_variable(name)
    }
}

impl<T: TypeResolver + ?Sized> TypeResolver for Box<T>
{
    fn lookup_type(&self, name: &str) -> Result<TypeDescriptor>
    {
        (**self).lookup_type(name)
    }

    fn field(&self, owner: &TypeDescriptor, name: &str) -> Result<FieldDescriptor>
    {
        (**self).field(owner, name)
    }

    fn pointee(&self, ty: &TypeDescriptor) -> Result<Option<TypeDescriptor>>
    {
        (**self).pointee(ty)
    }

    fn lookup_variable(&self, name: &str) -> Result<Option<(Address, TypeDescriptor)>>
    {
        (**self).lookup_variable(name)
    }
}
