//! # Used-size calculation
//!
//! The recursive engine behind `usedsize` and `logsize`.
//!
//! [`SizeCalculator::used_size`] classifies a type by name and dispatches to
//! the formula for that container shape. Element, node and member values that
//! are themselves containers are sized by recursing with a derived
//! [`AddressExpression`], so arbitrarily nested containers are accounted for
//! exactly once each: a container's shallow size is counted by whoever holds
//! it (the enclosing slot), and its heap payload by the container itself.
//!
//! A query either produces a number or fails with the first
//! [`BallastError::Resolution`] / [`BallastError::TypeLookup`] it hits. Nothing
//! is cached between queries; every call reads live memory again.

use tracing::{debug, trace};

use crate::aggregates::{AggregateId, AggregateRegistry, FieldRule};
use crate::classify::{ContainerKind, TypeClassifier};
use crate::error::{BallastError, Result};
use crate::layout::ContainerLayouts;
use crate::memory::MemoryReader;
use crate::resolver::TypeResolver;
use crate::types::{Address, AddressExpression, FieldDescriptor, TypeDescriptor};
use crate::walker::{ListWalker, TreeWalker};

/// Computes the used size of live values
///
/// Holds only borrowed collaborators; building one per query is free.
///
/// ## Example
///
/// ```rust,no_run
/// use ballast_core::aggregates::AggregateRegistry;
/// use ballast_core::layout::ContainerLayouts;
/// use ballast_core::{MemoryReader, SizeCalculator, TypeResolver};
/// use ballast_core::types::AddressExpression;
///
/// fn report(memory: &dyn MemoryReader, types: &dyn TypeResolver) -> ballast_core::Result<u64>
/// {
///     let layouts = ContainerLayouts::default();
///     let aggregates = AggregateRegistry::masternode();
///     let calculator = SizeCalculator::new(memory, types, &layouts, &aggregates);
///
///     let (address, ty) = types.lookup_variable("mnodeman")?.expect("global exists");
///     calculator.used_size(&AddressExpression::new("mnodeman", address), &ty)
/// }
/// ```
#[derive(Clone, Copy)]
pub struct SizeCalculator<'a>
{
    memory: &'a dyn MemoryReader,
    types: &'a dyn TypeResolver,
    layouts: &'a ContainerLayouts,
    aggregates: &'a AggregateRegistry,
}

impl<'a> SizeCalculator<'a>
{
    pub fn new(
        memory: &'a dyn MemoryReader,
        types: &'a dyn TypeResolver,
        layouts: &'a ContainerLayouts,
        aggregates: &'a AggregateRegistry,
    ) -> Self
    {
        Self {
            memory,
            types,
            layouts,
            aggregates,
        }
    }

    pub fn classifier(&self) -> TypeClassifier<'a>
    {
        TypeClassifier::new(self.aggregates)
    }

    /// Shallow size plus all heap payload owned by the value at `expr`.
    pub fn used_size(&self, expr: &AddressExpression, ty: &TypeDescriptor) -> Result<u64>
    {
        let kind = self.classifier().classify(ty);
        trace!("sizing {} ({}) as {:?} at {:#x}", expr, ty, kind, expr.address());

        let size = match kind {
            ContainerKind::Scalar => Ok(ty.size()),
            ContainerKind::Vector => self.vector_size(expr, ty),
            ContainerKind::BitVector => self.bit_vector_size(expr, ty),
            ContainerKind::LinkedList => self.list_size(expr, ty),
            ContainerKind::Pair => self.pair_size(expr, ty),
            ContainerKind::OrderedMap => self.tree_size(expr, ty, true),
            ContainerKind::OrderedSet => self.tree_size(expr, ty, false),
            ContainerKind::NamedAggregate(id) => self.aggregate_size(expr, ty, id),
        }?;

        if !kind.is_scalar() {
            debug!("{} uses {} bytes", expr, size);
        }
        Ok(size)
    }

    fn template_argument<'t>(&self, ty: &'t TypeDescriptor, index: usize) -> Result<&'t TypeDescriptor>
    {
        ty.template_argument(index)
            .ok_or_else(|| BallastError::TypeLookup(format!("template argument {index} of {ty}")))
    }

    fn is_scalar(&self, ty: &TypeDescriptor) -> bool
    {
        self.classifier().classify(ty).is_scalar()
    }

    fn vector_size(&self, expr: &AddressExpression, ty: &TypeDescriptor) -> Result<u64>
    {
        let layout = &self.layouts.vector;
        let header = ContainerLayouts::header_size(ty, layout.header_size);
        let element = self.template_argument(ty, 0)?;

        let begin = self
            .memory
            .read_pointer(expr.address() + layout.begin_offset)
            .map_err(|err| err.at_expression(expr))?;
        let end = self
            .memory
            .read_pointer(expr.address() + layout.end_offset)
            .map_err(|err| err.at_expression(expr))?;

        let span = end
            .distance_from(begin)
            .ok_or_else(|| BallastError::resolution(expr, format!("end {end} precedes begin {begin}")))?;

        let stride = element.size();
        if stride == 0 {
            return Ok(header);
        }
        if span % stride != 0 {
            return Err(BallastError::resolution(
                expr,
                format!("span of {span} bytes is not a multiple of the {stride}-byte element"),
            ));
        }
        let count = span / stride;

        if self.is_scalar(element) {
            return checked_sum(expr, header, span);
        }

        let elements = AddressExpression::new(expr.path(), begin);
        let mut total = header;
        for index in 0..count {
            let slot = elements.element(index, stride);
            total = checked_sum(expr, total, self.used_size(&slot, element)?)?;
        }
        Ok(total)
    }

    fn bit_vector_size(&self, expr: &AddressExpression, ty: &TypeDescriptor) -> Result<u64>
    {
        let layout = &self.layouts.bit_vector;
        let header = ContainerLayouts::header_size(ty, layout.header_size);
        let at = expr.address();

        let read_word = |offset| self.memory.read_pointer(at + offset).map_err(|err| err.at_expression(expr));
        let read_bit = |offset| {
            self.memory
                .read_uint(at + offset, usize::from(layout.bit_offset_size))
                .map_err(|err| err.at_expression(expr))
        };
        let start = read_word(layout.start_word_offset)?;
        let start_bit = read_bit(layout.start_bit_offset)?;
        let finish = read_word(layout.finish_word_offset)?;
        let finish_bit = read_bit(layout.finish_bit_offset)?;

        let word_bits = layout.word_bytes * 8;
        let bits = finish
            .distance_from(start)
            .and_then(|span| span.checked_mul(8))
            .and_then(|bits| bits.checked_add(finish_bit))
            .and_then(|bits| bits.checked_sub(start_bit))
            .ok_or_else(|| BallastError::resolution(expr, format!("finish {finish} precedes start {start}")))?;

        checked_sum(expr, header, bits.div_ceil(word_bits) * layout.word_bytes)
    }

    fn list_size(&self, expr: &AddressExpression, ty: &TypeDescriptor) -> Result<u64>
    {
        let layout = &self.layouts.list;
        let header = ContainerLayouts::header_size(ty, layout.header_size);
        let element = self.template_argument(ty, 0)?;
        let scalar = self.is_scalar(element);

        let walker = ListWalker::new(self.memory, layout, expr.address(), self.layouts.word_size)
            .map_err(|err| err.at_expression(expr))?;

        let mut total = header;
        for (index, node) in walker.enumerate() {
            let node = node.map_err(|err| err.at_expression(expr))?;
            let part = if scalar {
                element.size()
            } else {
                let payload = node_payload(expr, node, layout.node_payload_offset, index);
                self.used_size(&payload, element)?
            };
            total = checked_sum(expr, total, part)?;
        }
        Ok(total)
    }

    fn pair_size(&self, expr: &AddressExpression, ty: &TypeDescriptor) -> Result<u64>
    {
        let first = self.template_argument(ty, 0)?;
        let second = self.template_argument(ty, 1)?;
        // Padding between the slots belongs to the pair.
        Ok(self.pair_slots(expr, first, second)?.max(ty.size()))
    }

    /// `first` and `second` laid out pair-style from `expr`, each sized by its
    /// own type.
    fn pair_slots(&self, expr: &AddressExpression, first: &TypeDescriptor, second: &TypeDescriptor) -> Result<u64>
    {
        let second_offset = ContainerLayouts::pair_second_offset(first, second);
        let first_size = self.used_size(&expr.field("first", 0), first)?;
        let second_size = self.used_size(&expr.field("second", second_offset), second)?;
        checked_sum(expr, first_size, second_size)
    }

    fn tree_size(&self, expr: &AddressExpression, ty: &TypeDescriptor, is_map: bool) -> Result<u64>
    {
        let layout = &self.layouts.tree;
        let header = ContainerLayouts::header_size(ty, layout.header_size);
        let key = self.template_argument(ty, 0)?;
        let value = if is_map {
            Some(self.template_argument(ty, 1)?)
        } else {
            None
        };

        let walker = TreeWalker::new(self.memory, layout, expr.address(), self.layouts.word_size)
            .map_err(|err| err.at_expression(expr))?;
        let count = walker.stored_count();

        if self.is_scalar(key) && value.map_or(true, |value| self.is_scalar(value)) {
            let entry = key.size() + value.map_or(0, TypeDescriptor::size);
            let payload = count
                .checked_mul(entry)
                .ok_or_else(|| BallastError::resolution(expr, format!("node count {count} is implausible")))?;
            return checked_sum(expr, header, payload);
        }

        let mut total = header;
        for (index, node) in walker.enumerate() {
            let node = node.map_err(|err| err.at_expression(expr))?;
            let entry = node_payload(expr, node, layout.node_payload_offset, index);
            let part = match value {
                Some(value) => self.pair_slots(&entry, key, value)?,
                None => self.used_size(&entry, key)?,
            };
            total = checked_sum(expr, total, part)?;
        }
        Ok(total)
    }

    fn aggregate_size(&self, expr: &AddressExpression, ty: &TypeDescriptor, id: AggregateId) -> Result<u64>
    {
        let spec = self
            .aggregates
            .get(id)
            .ok_or_else(|| BallastError::TypeLookup(ty.name().to_string()))?;

        let mut total = 0u64;
        for rule in spec.rules() {
            let part = match rule {
                FieldRule::Base(type_name) => {
                    let base = self.types.lookup_type(type_name)?;
                    self.used_size(expr, &base)?
                }
                FieldRule::Typed { field, type_name } => {
                    let member = self.member(expr, ty, field)?;
                    let as_type = self.types.lookup_type(type_name)?;
                    self.used_size(&expr.field(field, member.offset), &as_type)?
                }
                FieldRule::Field(field) => {
                    let member = self.member(expr, ty, field)?;
                    self.used_size(&expr.field(field, member.offset), &member.ty)?
                }
                FieldRule::Fixed(bytes) => *bytes,
            };
            total = checked_sum(expr, total, part)?;
        }

        // Fixed widths ignore padding, so the formula can undershoot.
        Ok(total.max(ty.size()))
    }

    fn member(&self, expr: &AddressExpression, ty: &TypeDescriptor, name: &str) -> Result<FieldDescriptor>
    {
        self.types
            .field(ty, name)
            .map_err(|err| err.at_expression(format_args!("{expr}.{name}")))
    }
}

/// The value stored in the `index`-th node of the container at `expr`.
fn node_payload(expr: &AddressExpression, node: Address, payload_offset: u64, index: usize) -> AddressExpression
{
    AddressExpression::new(expr.path(), node).offset(payload_offset, &format!("node {index}"))
}

fn checked_sum(expr: &AddressExpression, total: u64, part: u64) -> Result<u64>
{
    total
        .checked_add(part)
        .ok_or_else(|| BallastError::resolution(expr, "size does not fit in 64 bits"))
}
