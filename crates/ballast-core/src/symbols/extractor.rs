//! DWARF type extraction and name lookup.
//!
//! [`DwarfTypes`] answers the engine's type questions from one image's
//! `.debug_info`. On first use it walks every compilation unit once and
//! records, under their fully qualified names:
//!
//! - class, struct, union, enum, typedef and base type entries (definitions win
//!   over declarations);
//! - global and namespace-scope variables, including out-of-line definitions
//!   that only reference their declaration through `DW_AT_specification`.
//!
//! Descriptors are then built on demand from the indexed entries.

use std::collections::HashMap;
use std::sync::Arc;

use gimli::{
    constants, AttributeValue, DebuggingInformationEntry, Operation, Reader, Unit, UnitOffset, UnitSectionOffset,
};
use once_cell::sync::OnceCell;
use tracing::debug;

use super::image::BinaryImage;
use super::{map_dwarf_error, OwnedReader};
use crate::error::{BallastError, Result};
use crate::resolver::TypeResolver;
use crate::types::descriptor::natural_align;
use crate::types::{Address, FieldDescriptor, TypeDescriptor, TypeHandle, TypeShape};

const MAX_TYPE_REF_DEPTH: usize = 32;

type Die<'abbrev, 'unit> = DebuggingInformationEntry<'abbrev, 'unit, OwnedReader>;

/// Location of a DIE: unit index plus offset within that unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct DieRef
{
    unit: usize,
    offset: UnitOffset<usize>,
}

impl DieRef
{
    fn handle(self) -> TypeHandle
    {
        TypeHandle::from_raw(((self.unit as u64 + 1) << 32) | (self.offset.0 as u64 & 0xffff_ffff))
    }

    fn from_handle(handle: TypeHandle) -> Option<Self>
    {
        let raw = handle.raw();
        let unit = (raw >> 32).checked_sub(1)?;
        Some(Self {
            unit: unit as usize,
            offset: UnitOffset((raw & 0xffff_ffff) as usize),
        })
    }
}

enum Scope
{
    Named(String),
    Function,
}

#[derive(Default)]
struct NameIndex
{
    types: HashMap<String, DieRef>,
    declarations: HashMap<String, DieRef>,
    variables: HashMap<String, DieRef>,
    names: HashMap<DieRef, String>,
}

fn qualify(scopes: &[(isize, Scope)], name: &str) -> Option<String>
{
    let mut qualified = String::new();
    for (_, scope) in scopes {
        match scope {
            Scope::Named(segment) => {
                qualified.push_str(segment);
                qualified.push_str("::");
            }
            Scope::Function => return None,
        }
    }
    qualified.push_str(name);
    Some(qualified)
}

/// [`TypeResolver`] backed by the DWARF of one ELF image.
pub struct DwarfTypes
{
    image: Arc<BinaryImage>,
    units: OnceCell<Vec<Unit<OwnedReader>>>,
    index: OnceCell<NameIndex>,
}

impl DwarfTypes
{
    pub fn new(image: Arc<BinaryImage>) -> Self
    {
        Self {
            image,
            units: OnceCell::new(),
            index: OnceCell::new(),
        }
    }

    pub fn image(&self) -> &BinaryImage
    {
        &self.image
    }

    fn units(&self) -> Result<&[Unit<OwnedReader>]>
    {
        self.units
            .get_or_try_init(|| {
                let dwarf = self.image.dwarf()?;
                let mut units = Vec::new();
                let mut headers = dwarf.units();
                while let Some(header) = headers
                    .next()
                    .map_err(|err| map_dwarf_error("reading .debug_info unit header", err))?
                {
                    units.push(
                        dwarf
                            .unit(header)
                            .map_err(|err| map_dwarf_error("parsing compilation unit", err))?,
                    );
                }
                debug!("Loaded {} compilation units from {}", units.len(), self.image.path().display());
                Ok(units)
            })
            .map(Vec::as_slice)
    }

    fn index(&self) -> Result<&NameIndex>
    {
        self.index.get_or_try_init(|| self.build_index())
    }

    fn build_index(&self) -> Result<NameIndex>
    {
        let mut index = NameIndex::default();

        for (unit_index, unit) in self.units()?.iter().enumerate() {
            let mut scopes: Vec<(isize, Scope)> = Vec::new();
            let mut depth: isize = 0;
            let mut cursor = unit.entries();

            while let Some((delta, entry)) = cursor
                .next_dfs()
                .map_err(|err| map_dwarf_error("traversing DIE tree", err))?
            {
                depth += delta;
                while scopes.last().is_some_and(|(scope_depth, _)| *scope_depth >= depth) {
                    scopes.pop();
                }

                let die = DieRef {
                    unit: unit_index,
                    offset: entry.offset(),
                };
                let name = self.entry_name(unit, entry)?;

                match entry.tag() {
                    constants::DW_TAG_namespace => {
                        let segment = name.unwrap_or_else(|| "(anonymous namespace)".to_string());
                        scopes.push((depth, Scope::Named(segment)));
                    }
                    constants::DW_TAG_subprogram | constants::DW_TAG_lexical_block => {
                        scopes.push((depth, Scope::Function));
                    }
                    constants::DW_TAG_structure_type
                    | constants::DW_TAG_class_type
                    | constants::DW_TAG_union_type
                    | constants::DW_TAG_enumeration_type
                    | constants::DW_TAG_typedef
                    | constants::DW_TAG_base_type => {
                        let is_record = matches!(
                            entry.tag(),
                            constants::DW_TAG_structure_type | constants::DW_TAG_class_type | constants::DW_TAG_union_type
                        );
                        let Some(name) = name else {
                            if is_record {
                                scopes.push((depth, Scope::Named("(anonymous)".to_string())));
                            }
                            continue;
                        };
                        if let Some(qualified) = qualify(&scopes, &name) {
                            index.names.insert(die, qualified.clone());
                            if Self::is_declaration(entry)? {
                                index.declarations.entry(qualified).or_insert(die);
                            } else {
                                index.types.entry(qualified).or_insert(die);
                            }
                        }
                        if is_record {
                            scopes.push((depth, Scope::Named(name)));
                        }
                    }
                    constants::DW_TAG_variable | constants::DW_TAG_member => {
                        if let Some(name) = name {
                            if let Some(qualified) = qualify(&scopes, &name) {
                                index.names.insert(die, qualified.clone());
                                if entry.tag() == constants::DW_TAG_variable && Self::has_location(entry)? {
                                    index.variables.entry(qualified).or_insert(die);
                                }
                            }
                        } else if Self::has_location(entry)? {
                            // Out-of-line definition of a declared global or static member.
                            if let Some(spec) = self.reference(unit_index, entry, constants::DW_AT_specification)? {
                                if let Some(qualified) = index.names.get(&spec).cloned() {
                                    index.variables.insert(qualified, die);
                                }
                            }
                        }
                    }
                    _ => {}
                }
            }
        }

        debug!(
            "Indexed {} types and {} globals from {}",
            index.types.len(),
            index.variables.len(),
            self.image.path().display()
        );
        Ok(index)
    }

    fn unit(&self, die: DieRef) -> Result<&Unit<OwnedReader>>
    {
        self.units()?
            .get(die.unit)
            .ok_or_else(|| BallastError::Dwarf(format!("unit index {} out of range", die.unit)))
    }

    fn with_entry<T>(&self, die: DieRef, f: impl FnOnce(&Unit<OwnedReader>, &Die<'_, '_>) -> Result<T>) -> Result<T>
    {
        let unit = self.unit(die)?;
        let entry = unit
            .entry(die.offset)
            .map_err(|err| map_dwarf_error("reading DIE", err))?;
        f(unit, &entry)
    }

    fn entry_name(&self, unit: &Unit<OwnedReader>, entry: &Die<'_, '_>) -> Result<Option<String>>
    {
        if let Some(attr) = entry
            .attr(constants::DW_AT_name)
            .map_err(|err| map_dwarf_error("reading DW_AT_name", err))?
        {
            return Ok(Some(self.attr_to_string(unit, attr.value())?));
        }
        Ok(None)
    }

    fn attr_to_string(&self, unit: &Unit<OwnedReader>, value: AttributeValue<OwnedReader>) -> Result<String>
    {
        let reader = self
            .image
            .dwarf()?
            .attr_string(unit, value)
            .map_err(|err| map_dwarf_error("resolving DWARF string", err))?;
        let owned = match reader.to_string() {
            Ok(cow) => cow.into_owned(),
            Err(_) => reader
                .to_string_lossy()
                .map_err(|err| map_dwarf_error("decoding DWARF string", err))?
                .into_owned(),
        };
        Ok(owned)
    }

    fn is_declaration(entry: &Die<'_, '_>) -> Result<bool>
    {
        let attr = entry
            .attr(constants::DW_AT_declaration)
            .map_err(|err| map_dwarf_error("reading DW_AT_declaration", err))?;
        Ok(matches!(attr.map(|attr| attr.value()), Some(AttributeValue::Flag(true))))
    }

    fn has_location(entry: &Die<'_, '_>) -> Result<bool>
    {
        Ok(entry
            .attr(constants::DW_AT_location)
            .map_err(|err| map_dwarf_error("reading DW_AT_location", err))?
            .is_some())
    }

    fn udata(entry: &Die<'_, '_>, name: constants::DwAt) -> Result<Option<u64>>
    {
        Ok(entry
            .attr(name)
            .map_err(|err| map_dwarf_error("reading attribute", err))?
            .and_then(|attr| attr.udata_value()))
    }

    /// Follow a reference attribute (`DW_AT_type`, `DW_AT_specification`, ...).
    fn reference(&self, unit_index: usize, entry: &Die<'_, '_>, name: constants::DwAt) -> Result<Option<DieRef>>
    {
        let Some(attr) = entry
            .attr(name)
            .map_err(|err| map_dwarf_error("reading reference attribute", err))?
        else {
            return Ok(None);
        };

        Ok(match attr.value() {
            AttributeValue::UnitRef(offset) => Some(DieRef {
                unit: unit_index,
                offset,
            }),
            AttributeValue::DebugInfoRef(offset) => {
                let target = UnitSectionOffset::from(offset);
                self.units()?.iter().enumerate().find_map(|(index, unit)| {
                    target.to_unit_offset(unit).map(|offset| DieRef { unit: index, offset })
                })
            }
            _ => None,
        })
    }

    fn type_ref(&self, die: DieRef) -> Result<Option<DieRef>>
    {
        self.with_entry(die, |_, entry| self.reference(die.unit, entry, constants::DW_AT_type))
    }

    fn tag(&self, die: DieRef) -> Result<constants::DwTag>
    {
        self.with_entry(die, |_, entry| Ok(entry.tag()))
    }

    /// Skip typedefs and cv-qualifiers.
    fn strip(&self, mut die: DieRef) -> Result<Option<DieRef>>
    {
        for _ in 0..MAX_TYPE_REF_DEPTH {
            match self.tag(die)? {
                constants::DW_TAG_typedef
                | constants::DW_TAG_const_type
                | constants::DW_TAG_volatile_type
                | constants::DW_TAG_restrict_type
                | constants::DW_TAG_atomic_type => match self.type_ref(die)? {
                    Some(inner) => die = inner,
                    None => return Ok(None),
                },
                _ => return Ok(Some(die)),
            }
        }
        Err(BallastError::Dwarf("typedef chain too deep".to_string()))
    }

    /// Replace a record declaration with its definition, when one is indexed.
    fn definition(&self, die: DieRef) -> Result<DieRef>
    {
        let is_declaration = self.with_entry(die, |_, entry| Self::is_declaration(entry))?;
        if !is_declaration {
            return Ok(die);
        }
        let index = self.index()?;
        Ok(index
            .names
            .get(&die)
            .and_then(|name| index.types.get(name))
            .copied()
            .unwrap_or(die))
    }

    fn address_size(&self, die: DieRef) -> Result<u64>
    {
        Ok(u64::from(self.unit(die)?.header.address_size()))
    }

    fn type_name(&self, die: DieRef, depth: usize) -> Result<String>
    {
        if depth >= MAX_TYPE_REF_DEPTH {
            return Err(BallastError::Dwarf("type reference chain too deep".to_string()));
        }
        if let Some(name) = self.index()?.names.get(&die) {
            return Ok(name.clone());
        }

        let (tag, name) = self.with_entry(die, |unit, entry| Ok((entry.tag(), self.entry_name(unit, entry)?)))?;
        let inner = |this: &Self| -> Result<String> {
            match this.type_ref(die)? {
                Some(inner) => this.type_name(inner, depth + 1),
                None => Ok("void".to_string()),
            }
        };

        Ok(match tag {
            constants::DW_TAG_pointer_type => format!("{} *", inner(self)?),
            constants::DW_TAG_reference_type => format!("{} &", inner(self)?),
            constants::DW_TAG_rvalue_reference_type => format!("{} &&", inner(self)?),
            constants::DW_TAG_const_type => format!("const {}", inner(self)?),
            constants::DW_TAG_volatile_type => format!("volatile {}", inner(self)?),
            constants::DW_TAG_array_type => format!("{} [{}]", inner(self)?, self.array_count(die)?),
            constants::DW_TAG_subroutine_type => "<function>".to_string(),
            _ => name.unwrap_or_else(|| "<anonymous>".to_string()),
        })
    }

    fn array_count(&self, die: DieRef) -> Result<u64>
    {
        let unit = self.unit(die)?;
        let mut tree = unit
            .entries_tree(Some(die.offset))
            .map_err(|err| map_dwarf_error("building array tree", err))?;
        let root = tree.root().map_err(|err| map_dwarf_error("navigating array root", err))?;
        let mut children = root.children();
        while let Some(child) = children
            .next()
            .map_err(|err| map_dwarf_error("iterating array children", err))?
        {
            let entry = child.entry();
            if entry.tag() != constants::DW_TAG_subrange_type {
                continue;
            }
            if let Some(count) = Self::udata(entry, constants::DW_AT_count)? {
                return Ok(count);
            }
            if let Some(upper) = Self::udata(entry, constants::DW_AT_upper_bound)? {
                return Ok(upper + 1);
            }
        }
        Ok(0)
    }

    fn align_of(&self, die: DieRef, depth: usize) -> Result<u64>
    {
        if depth >= MAX_TYPE_REF_DEPTH {
            return Err(BallastError::Dwarf("type reference chain too deep".to_string()));
        }
        let (tag, explicit, size) = self.with_entry(die, |_, entry| {
            Ok((
                entry.tag(),
                Self::udata(entry, constants::DW_AT_alignment)?,
                Self::udata(entry, constants::DW_AT_byte_size)?,
            ))
        })?;
        if let Some(align) = explicit {
            return Ok(align.max(1));
        }

        match tag {
            constants::DW_TAG_typedef
            | constants::DW_TAG_const_type
            | constants::DW_TAG_volatile_type
            | constants::DW_TAG_restrict_type
            | constants::DW_TAG_atomic_type
            | constants::DW_TAG_array_type => match self.type_ref(die)? {
                Some(inner) => self.align_of(inner, depth + 1),
                None => Ok(1),
            },
            constants::DW_TAG_pointer_type
            | constants::DW_TAG_reference_type
            | constants::DW_TAG_rvalue_reference_type => self.address_size(die),
            constants::DW_TAG_structure_type | constants::DW_TAG_class_type | constants::DW_TAG_union_type => {
                let die = self.definition(die)?;
                let mut align = 1;
                for (_, member_type) in self.data_members(die)? {
                    align = align.max(self.align_of(member_type, depth + 1)?);
                }
                Ok(align)
            }
            _ => Ok(natural_align(size.unwrap_or(0))),
        }
    }

    /// Non-static data members and base classes of a record, with their types.
    fn data_members(&self, die: DieRef) -> Result<Vec<(Option<String>, DieRef)>>
    {
        let unit = self.unit(die)?;
        let mut members = Vec::new();
        let mut tree = unit
            .entries_tree(Some(die.offset))
            .map_err(|err| map_dwarf_error("building struct tree", err))?;
        let root = tree.root().map_err(|err| map_dwarf_error("navigating struct root", err))?;
        let mut children = root.children();
        while let Some(child) = children
            .next()
            .map_err(|err| map_dwarf_error("iterating struct children", err))?
        {
            let entry = child.entry();
            let is_member = entry.tag() == constants::DW_TAG_member && !Self::is_declaration(entry)?;
            if !is_member && entry.tag() != constants::DW_TAG_inheritance {
                continue;
            }
            if let Some(ty) = self.reference(die.unit, entry, constants::DW_AT_type)? {
                let name = if is_member {
                    self.entry_name(unit, entry)?
                } else {
                    None
                };
                members.push((name, ty));
            }
        }
        Ok(members)
    }

    fn member_offset(entry: &Die<'_, '_>, encoding: gimli::Encoding) -> Result<u64>
    {
        let Some(attr) = entry
            .attr(constants::DW_AT_data_member_location)
            .map_err(|err| map_dwarf_error("reading DW_AT_data_member_location", err))?
        else {
            return Ok(0);
        };
        if let Some(offset) = attr.udata_value() {
            return Ok(offset);
        }
        if let AttributeValue::Exprloc(expr) = attr.value() {
            let mut ops = expr.operations(encoding);
            if let Some(Operation::PlusConstant { value }) = ops
                .next()
                .map_err(|err| map_dwarf_error("decoding member location", err))?
            {
                return Ok(value);
            }
        }
        Err(BallastError::Dwarf("unsupported member location expression".to_string()))
    }

    /// Find member `name` in the record at `die`, searching bases and
    /// anonymous members. Returns its offset from the start of `die`.
    fn find_member(&self, die: DieRef, name: &str, depth: usize) -> Result<Option<(u64, DieRef)>>
    {
        if depth >= MAX_TYPE_REF_DEPTH {
            return Ok(None);
        }
        let die = self.definition(die)?;
        let unit = self.unit(die)?;
        let encoding = unit.encoding();

        let mut nested = Vec::new();
        let mut tree = unit
            .entries_tree(Some(die.offset))
            .map_err(|err| map_dwarf_error("building struct tree", err))?;
        let root = tree.root().map_err(|err| map_dwarf_error("navigating struct root", err))?;
        let mut children = root.children();
        while let Some(child) = children
            .next()
            .map_err(|err| map_dwarf_error("iterating struct children", err))?
        {
            let entry = child.entry();
            match entry.tag() {
                constants::DW_TAG_member if !Self::is_declaration(entry)? => {
                    let Some(ty) = self.reference(die.unit, entry, constants::DW_AT_type)? else {
                        continue;
                    };
                    let offset = Self::member_offset(entry, encoding)?;
                    match self.entry_name(unit, entry)? {
                        Some(member) if member == name => return Ok(Some((offset, ty))),
                        Some(_) => {}
                        None => nested.push((offset, ty)),
                    }
                }
                constants::DW_TAG_inheritance => {
                    if let Some(ty) = self.reference(die.unit, entry, constants::DW_AT_type)? {
                        nested.push((Self::member_offset(entry, encoding)?, ty));
                    }
                }
                _ => {}
            }
        }

        for (base_offset, ty) in nested {
            let Some(record) = self.strip(ty)? else {
                continue;
            };
            if let Some((offset, member)) = self.find_member(record, name, depth + 1)? {
                return Ok(Some((base_offset + offset, member)));
            }
        }
        Ok(None)
    }

    fn template_args(&self, die: DieRef, depth: usize) -> Result<Vec<TypeDescriptor>>
    {
        let unit = self.unit(die)?;
        let mut params = Vec::new();
        let mut tree = unit
            .entries_tree(Some(die.offset))
            .map_err(|err| map_dwarf_error("building template tree", err))?;
        let root = tree.root().map_err(|err| map_dwarf_error("navigating template root", err))?;
        let mut children = root.children();
        while let Some(child) = children
            .next()
            .map_err(|err| map_dwarf_error("iterating template parameters", err))?
        {
            let entry = child.entry();
            if entry.tag() == constants::DW_TAG_template_type_parameter {
                if let Some(ty) = self.reference(die.unit, entry, constants::DW_AT_type)? {
                    params.push(ty);
                }
            }
        }

        params.into_iter().map(|ty| self.describe(ty, depth + 1)).collect()
    }

    fn describe(&self, die: DieRef, depth: usize) -> Result<TypeDescriptor>
    {
        if depth >= MAX_TYPE_REF_DEPTH {
            return Err(BallastError::Dwarf("type reference chain too deep".to_string()));
        }
        let Some(die) = self.strip(die)? else {
            return Ok(TypeDescriptor::new("void", 0));
        };

        let (tag, byte_size) = self.with_entry(die, |_, entry| {
            Ok((entry.tag(), Self::udata(entry, constants::DW_AT_byte_size)?))
        })?;

        let descriptor = match tag {
            constants::DW_TAG_pointer_type
            | constants::DW_TAG_reference_type
            | constants::DW_TAG_rvalue_reference_type
            | constants::DW_TAG_ptr_to_member_type => {
                let size = match byte_size {
                    Some(size) => size,
                    None => self.address_size(die)?,
                };
                TypeDescriptor::new(self.type_name(die, depth)?, size)
                    .with_align(size)
                    .with_shape(TypeShape::Pointer)
            }
            constants::DW_TAG_array_type => {
                let element = match self.type_ref(die)? {
                    Some(element) => self.describe(element, depth + 1)?,
                    None => TypeDescriptor::new("void", 0),
                };
                let count = self.array_count(die)?;
                let size = byte_size.unwrap_or_else(|| element.size().saturating_mul(count));
                TypeDescriptor::new(format!("{} [{count}]", element.name()), size)
                    .with_align(element.align())
                    .with_shape(TypeShape::Array(count))
            }
            constants::DW_TAG_structure_type | constants::DW_TAG_class_type | constants::DW_TAG_union_type => {
                let die = self.definition(die)?;
                let size = self.with_entry(die, |_, entry| Self::udata(entry, constants::DW_AT_byte_size))?;
                return Ok(TypeDescriptor::new(self.type_name(die, depth)?, size.unwrap_or(0))
                    .with_align(self.align_of(die, depth)?)
                    .with_shape(TypeShape::Record)
                    .with_template_args(self.template_args(die, depth)?)
                    .with_handle(die.handle()));
            }
            _ => TypeDescriptor::new(self.type_name(die, depth)?, byte_size.unwrap_or(0))
                .with_align(self.align_of(die, depth)?),
        };

        Ok(descriptor.with_handle(die.handle()))
    }

    fn die_for(&self, ty: &TypeDescriptor) -> Result<Option<DieRef>>
    {
        if let Some(die) = DieRef::from_handle(ty.handle()) {
            return Ok(Some(die));
        }
        let index = self.index()?;
        Ok(index
            .types
            .get(ty.name())
            .or_else(|| index.declarations.get(ty.name()))
            .copied())
    }

    fn default_address_size(&self) -> Result<u64>
    {
        Ok(self
            .units()?
            .first()
            .map(|unit| u64::from(unit.header.address_size()))
            .unwrap_or_else(|| u64::from(self.image.pointer_size())))
    }

    fn static_address(&self, die: DieRef, name: &str) -> Result<Address>
    {
        let dwarf = self.image.dwarf()?;
        let unit = self.unit(die)?;
        let entry = unit
            .entry(die.offset)
            .map_err(|err| map_dwarf_error("reading variable DIE", err))?;

        let location = entry
            .attr(constants::DW_AT_location)
            .map_err(|err| map_dwarf_error("reading DW_AT_location", err))?
            .ok_or_else(|| BallastError::resolution(name, "value has been optimized out"))?;

        let AttributeValue::Exprloc(expr) = location.value() else {
            return Err(BallastError::resolution(name, "location is not a single expression"));
        };

        let mut ops = expr.operations(unit.encoding());
        let address = match ops
            .next()
            .map_err(|err| map_dwarf_error("decoding variable location", err))?
        {
            Some(Operation::Address { address }) => address,
            Some(Operation::AddressIndex { index }) => dwarf
                .address(unit, index)
                .map_err(|err| map_dwarf_error("reading .debug_addr", err))?,
            _ => return Err(BallastError::resolution(name, "variable does not live at a static address")),
        };

        Ok(Address::from(address.wrapping_add(self.image.load_bias())))
    }
}

impl TypeResolver for DwarfTypes
{
    fn lookup_type(&self, name: &str) -> Result<TypeDescriptor>
    {
        let name = name.trim();

        if let Some(inner) = name.strip_suffix('*') {
            let inner = inner.trim_end();
            let size = self.default_address_size()?;
            // Make sure the pointee exists before handing out a pointer to it.
            self.lookup_type(inner)?;
            return Ok(TypeDescriptor::new(format!("{inner} *"), size)
                .with_align(size)
                .with_shape(TypeShape::Pointer));
        }

        let index = self.index()?;
        let die = index
            .types
            .get(name)
            .or_else(|| index.types.get(name.trim_start_matches("::")))
            .or_else(|| index.declarations.get(name))
            .copied()
            .ok_or_else(|| BallastError::TypeLookup(name.to_string()))?;
        self.describe(die, 0)
    }

    fn field(&self, owner: &TypeDescriptor, name: &str) -> Result<FieldDescriptor>
    {
        let missing = || BallastError::resolution(format!("{owner}.{name}"), format!("`{owner}` has no member named `{name}`"));

        let Some(die) = self.die_for(owner)? else {
            return Err(missing());
        };
        let Some(record) = self.strip(die)? else {
            return Err(missing());
        };

        match self.find_member(record, name, 0)? {
            Some((offset, ty)) => Ok(FieldDescriptor::new(name, offset, self.describe(ty, 0)?)),
            None => Err(missing()),
        }
    }

    fn pointee(&self, ty: &TypeDescriptor) -> Result<Option<TypeDescriptor>>
    {
        if ty.handle() == TypeHandle::DETACHED {
            if ty.shape() != TypeShape::Pointer {
                return Ok(None);
            }
            let inner = ty.name().trim_end_matches('*').trim_end();
            return self.lookup_type(inner).map(Some);
        }

        let Some(die) = self.die_for(ty)? else {
            return Ok(None);
        };
        let Some(die) = self.strip(die)? else {
            return Ok(None);
        };

        match self.tag(die)? {
            constants::DW_TAG_pointer_type
            | constants::DW_TAG_reference_type
            | constants::DW_TAG_rvalue_reference_type
            | constants::DW_TAG_array_type => match self.type_ref(die)? {
                Some(inner) => self.describe(inner, 0).map(Some),
                None => Ok(Some(TypeDescriptor::new("void", 0))),
            },
            _ => Ok(None),
        }
    }

    fn lookup_variable(&self, name: &str) -> Result<Option<(Address, TypeDescriptor)>>
    {
        let index = self.index()?;
        let Some(&die) = index.variables.get(name) else {
            return Ok(None);
        };

        let address = self.static_address(die, name)?;

        let declared = self.with_entry(die, |_, entry| {
            match self.reference(die.unit, entry, constants::DW_AT_type)? {
                Some(ty) => Ok(Some(ty)),
                None => self.reference(die.unit, entry, constants::DW_AT_specification),
            }
        })?;
        let ty = match declared {
            Some(candidate) if self.tag(candidate)? == constants::DW_TAG_variable => self.type_ref(candidate)?,
            Some(candidate) if self.tag(candidate)? == constants::DW_TAG_member => self.type_ref(candidate)?,
            other => other,
        };
        let ty = ty.ok_or_else(|| BallastError::resolution(name, "variable has no type"))?;

        Ok(Some((address, self.describe(ty, 0)?)))
    }
}
