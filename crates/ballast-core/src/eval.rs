//! # Expression evaluation
//!
//! Turns the text a user types into an [`AddressExpression`] and the static
//! type of the value it names. Two forms are understood:
//!
//! - a global variable followed by any number of accessors:
//!   `mnodeman.mapSeenMasternodePing`, `pool->entries[3]`, `ns::table.slots[0]`
//! - a typed dereference of a raw address: `*(CMasternode *)0x55d1c0a0`
//!
//! Member offsets come from the [`TypeResolver`]; `->` and indexing through a
//! pointer read the pointer from live memory. Nothing else is evaluated (no
//! arithmetic, no function calls, no overloaded `operator[]`).

use tracing::trace;

use crate::error::{BallastError, Result};
use crate::memory::MemoryReader;
use crate::resolver::TypeResolver;
use crate::types::{Address, AddressExpression, TypeDescriptor, TypeShape};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Accessor
{
    Member(String),
    Arrow(String),
    Index(u64),
}

/// Evaluates expressions against one process and its type information.
#[derive(Clone, Copy)]
pub struct Evaluator<'a>
{
    memory: &'a dyn MemoryReader,
    types: &'a dyn TypeResolver,
}

impl<'a> Evaluator<'a>
{
    pub fn new(memory: &'a dyn MemoryReader, types: &'a dyn TypeResolver) -> Self
    {
        Self { memory, types }
    }

    /// Resolve `text` to the location and type of the value it names.
    pub fn evaluate(&self, text: &str) -> Result<(AddressExpression, TypeDescriptor)>
    {
        let text = text.trim();
        if text.is_empty() {
            return Err(BallastError::InvalidArgument("empty expression".to_string()));
        }

        if let Some(rest) = text.strip_prefix('*') {
            if rest.trim_start().starts_with('(') {
                return self.evaluate_cast(text, rest.trim_start());
            }
        }

        let (root, accessors) = parse_path(text)?;
        let (address, mut ty) = self
            .types
            .lookup_variable(&root)?
            .ok_or_else(|| BallastError::resolution(&root, "no global variable with this name"))?;

        let mut expr = AddressExpression::new(root, address);
        for accessor in accessors {
            (expr, ty) = self.apply(expr, &ty, &accessor)?;
        }

        trace!("{} evaluates to {} at {:#x}", text, ty, expr.address());
        Ok((expr, ty))
    }

    fn evaluate_cast(&self, text: &str, cast: &str) -> Result<(AddressExpression, TypeDescriptor)>
    {
        let malformed = || BallastError::InvalidArgument(format!("expected `*(Type *)ADDRESS`, got `{text}`"));

        let close = cast.find(')').ok_or_else(malformed)?;
        let target = cast[1..close].trim();
        let type_name = target.strip_suffix('*').ok_or_else(malformed)?.trim_end();
        if type_name.is_empty() {
            return Err(malformed());
        }
        let address = parse_number(cast[close + 1..].trim()).ok_or_else(malformed)?;

        let ty = self.types.lookup_type(type_name)?;
        Ok((AddressExpression::new(text, Address::from(address)), ty))
    }

    fn apply(
        &self,
        expr: AddressExpression,
        ty: &TypeDescriptor,
        accessor: &Accessor,
    ) -> Result<(AddressExpression, TypeDescriptor)>
    {
        match accessor {
            Accessor::Member(name) => {
                let field = self.types.field(ty, name).map_err(|err| err.at_expression(format!("{expr}.{name}")))?;
                Ok((expr.field(name, field.offset), field.ty))
            }
            Accessor::Arrow(name) => {
                let (target, pointee) = self.follow(&expr, ty)?;
                let path = format!("{expr}->{name}");
                let field = self.types.field(&pointee, name).map_err(|err| err.at_expression(&path))?;
                Ok((AddressExpression::new(path, target + field.offset), field.ty))
            }
            Accessor::Index(index) => match ty.shape() {
                TypeShape::Array(count) => {
                    if *index >= count {
                        return Err(BallastError::resolution(
                            format!("{expr}[{index}]"),
                            format!("index out of bounds for an array of {count}"),
                        ));
                    }
                    let element = self.element_type(&expr, ty)?;
                    Ok((expr.element(*index, element.size()), element))
                }
                TypeShape::Pointer => {
                    let (target, element) = self.follow(&expr, ty)?;
                    let base = AddressExpression::new(expr.path(), target);
                    Ok((base.element(*index, element.size()), element))
                }
                _ => Err(BallastError::resolution(
                    format!("{expr}[{index}]"),
                    format!("`{ty}` cannot be indexed"),
                )),
            },
        }
    }

    fn element_type(&self, expr: &AddressExpression, ty: &TypeDescriptor) -> Result<TypeDescriptor>
    {
        self.types
            .pointee(ty)?
            .ok_or_else(|| BallastError::resolution(expr, format!("`{ty}` has no element type")))
    }

    /// Read the pointer held at `expr` and return where it points.
    fn follow(&self, expr: &AddressExpression, ty: &TypeDescriptor) -> Result<(Address, TypeDescriptor)>
    {
        if ty.shape() != TypeShape::Pointer {
            return Err(BallastError::resolution(expr, format!("`{ty}` is not a pointer")));
        }
        let pointee = self.element_type(expr, ty)?;
        let target = self
            .memory
            .read_pointer(expr.address())
            .map_err(|err| err.at_expression(expr))?;
        if target.is_null() {
            return Err(BallastError::resolution(expr, "null pointer dereference"));
        }
        Ok((target, pointee))
    }
}

fn parse_number(text: &str) -> Option<u64>
{
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}

fn is_ident_char(c: char) -> bool
{
    c.is_ascii_alphanumeric() || c == '_'
}

/// Split `root.a->b[2]` into its root name and accessors.
fn parse_path(text: &str) -> Result<(String, Vec<Accessor>)>
{
    let malformed = |reason: &str| BallastError::InvalidArgument(format!("cannot parse `{text}`: {reason}"));

    let mut rest = text;
    let root_len = rest.find(|c: char| !(is_ident_char(c) || c == ':')).unwrap_or(rest.len());
    let root = &rest[..root_len];
    let well_formed = root
        .split("::")
        .all(|segment| !segment.is_empty() && !segment.contains(':'));
    if !well_formed || root.starts_with(|c: char| c.is_ascii_digit()) {
        return Err(malformed("expected a variable name"));
    }
    rest = &rest[root_len..];

    let take_ident = |input: &str| -> Option<(String, usize)> {
        let len = input.find(|c: char| !is_ident_char(c)).unwrap_or(input.len());
        (len > 0).then(|| (input[..len].to_string(), len))
    };

    let mut accessors = Vec::new();
    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix('.') {
            let (name, len) = take_ident(after).ok_or_else(|| malformed("expected a member name after `.`"))?;
            accessors.push(Accessor::Member(name));
            rest = &after[len..];
        } else if let Some(after) = rest.strip_prefix("->") {
            let (name, len) = take_ident(after).ok_or_else(|| malformed("expected a member name after `->`"))?;
            accessors.push(Accessor::Arrow(name));
            rest = &after[len..];
        } else if let Some(after) = rest.strip_prefix('[') {
            let close = after.find(']').ok_or_else(|| malformed("unclosed `[`"))?;
            let index = parse_number(after[..close].trim()).ok_or_else(|| malformed("index must be a number"))?;
            accessors.push(Accessor::Index(index));
            rest = &after[close + 1..];
        } else {
            return Err(malformed("unexpected characters"));
        }
    }

    Ok((root.to_string(), accessors))
}
