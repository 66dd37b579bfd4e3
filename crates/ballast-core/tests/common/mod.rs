//! In-memory stand-ins for a halted process and its debug information.
//!
//! `FakeHeap` lays out containers byte-for-byte the way libstdc++ does on
//! x86-64, so the size engine and walkers run against the same structures
//! they would read out of a live process.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, VecDeque};

use ballast_core::tracer::{TraceStop, TraceTarget};
use ballast_core::types::{Address, FieldDescriptor, TypeDescriptor};
use ballast_core::{BallastError, Inferior, MemoryReader, Result, TypeResolver};

const HEAP_BASE: u64 = 0x5555_0000_0000;

/// Sparse, little-endian process memory made of allocated regions.
pub struct FakeHeap
{
    regions: BTreeMap<u64, Vec<u8>>,
    next: u64,
}

impl Default for FakeHeap
{
    fn default() -> Self
    {
        Self {
            regions: BTreeMap::new(),
            next: HEAP_BASE,
        }
    }
}

impl FakeHeap
{
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Map `len` zeroed bytes at a fresh, 16-byte aligned address.
    pub fn alloc(&mut self, len: u64) -> Address
    {
        let base = self.next;
        self.regions.insert(base, vec![0; len as usize]);
        // Leave a gap so overruns hit unmapped memory.
        self.next = (base + len + 0x100 + 15) & !15;
        Address::from(base)
    }

    pub fn write(&mut self, address: Address, bytes: &[u8])
    {
        let at = address.value();
        let (base, region) = self
            .regions
            .range_mut(..=at)
            .next_back()
            .unwrap_or_else(|| panic!("write to unmapped {at:#x}"));
        let start = (at - base) as usize;
        assert!(start + bytes.len() <= region.len(), "write past the end of region {base:#x}");
        region[start..start + bytes.len()].copy_from_slice(bytes);
    }

    pub fn write_u64(&mut self, address: Address, value: u64)
    {
        self.write(address, &value.to_le_bytes());
    }

    pub fn write_u32(&mut self, address: Address, value: u32)
    {
        self.write(address, &value.to_le_bytes());
    }

    pub fn write_pointer(&mut self, address: Address, target: Address)
    {
        self.write_u64(address, target.value());
    }

    /// A `std::vector` at `container` owning `count` zeroed elements of `stride` bytes.
    ///
    /// Returns the address of the first element.
    pub fn vector(&mut self, container: Address, stride: u64, count: u64) -> Address
    {
        if count == 0 {
            self.write_pointer(container, Address::ZERO);
            self.write_pointer(container + 8, Address::ZERO);
            self.write_pointer(container + 16, Address::ZERO);
            return Address::ZERO;
        }
        let begin = self.alloc(stride * count);
        self.write_pointer(container, begin);
        self.write_pointer(container + 8, begin + stride * count);
        self.write_pointer(container + 16, begin + stride * count);
        begin
    }

    /// A `std::list` at `container` with one node per entry of `payload_sizes`.
    ///
    /// Returns the node addresses in list order; payloads start 16 bytes in.
    pub fn list(&mut self, container: Address, payload_sizes: &[u64]) -> Vec<Address>
    {
        let nodes: Vec<Address> = payload_sizes.iter().map(|size| self.alloc(16 + size)).collect();

        let mut prev = container;
        for &node in &nodes {
            self.write_pointer(prev, node);
            self.write_pointer(node + 8, prev);
            prev = node;
        }
        self.write_pointer(prev, container);
        self.write_pointer(container + 8, prev);
        self.write_u64(container + 16, nodes.len() as u64);
        nodes
    }

    /// A `std::map`/`std::set` at `container` whose in-order sequence is
    /// one node per entry of `payload_sizes`.
    ///
    /// Returns the node addresses in key order; payloads start 32 bytes in.
    pub fn tree(&mut self, container: Address, payload_sizes: &[u64]) -> Vec<Address>
    {
        let header = container + 8;
        let nodes: Vec<Address> = payload_sizes.iter().map(|size| self.alloc(32 + size)).collect();

        let root = self.link_subtree(&nodes, header);
        self.write_pointer(header + 8, root);
        self.write_pointer(header + 16, nodes.first().copied().unwrap_or(header));
        self.write_pointer(header + 24, nodes.last().copied().unwrap_or(header));
        self.write_u64(container + 40, nodes.len() as u64);
        nodes
    }

    /// Balanced subtree over `nodes`, hung below `parent`.
    fn link_subtree(&mut self, nodes: &[Address], parent: Address) -> Address
    {
        if nodes.is_empty() {
            return Address::ZERO;
        }
        let mid = nodes.len() / 2;
        let node = nodes[mid];
        self.write_pointer(node + 8, parent);
        let left = self.link_subtree(&nodes[..mid], node);
        let right = self.link_subtree(&nodes[mid + 1..], node);
        self.write_pointer(node + 16, left);
        self.write_pointer(node + 24, right);
        node
    }
}

impl MemoryReader for FakeHeap
{
    fn read_bytes(&self, address: Address, len: usize) -> Result<Vec<u8>>
    {
        let at = address.value();
        let unmapped = || BallastError::resolution(format!("*{at:#x}"), "address is not mapped");

        let (base, region) = self.regions.range(..=at).next_back().ok_or_else(unmapped)?;
        let start = (at - base) as usize;
        if start + len > region.len() {
            return Err(unmapped());
        }
        Ok(region[start..start + len].to_vec())
    }
}

/// Debug information assembled by hand.
#[derive(Default)]
pub struct FakeTypes
{
    types: HashMap<String, TypeDescriptor>,
    fields: HashMap<(String, String), FieldDescriptor>,
    variables: HashMap<String, (Address, TypeDescriptor)>,
}

impl FakeTypes
{
    pub fn new() -> Self
    {
        Self::default()
    }

    pub fn add_type(&mut self, ty: TypeDescriptor)
    {
        self.types.insert(ty.name().to_string(), ty);
    }

    pub fn add_field(&mut self, owner: &str, name: &str, offset: u64, ty: TypeDescriptor)
    {
        self.fields
            .insert((owner.to_string(), name.to_string()), FieldDescriptor::new(name, offset, ty));
    }

    pub fn add_variable(&mut self, name: &str, address: Address, ty: TypeDescriptor)
    {
        self.variables.insert(name.to_string(), (address, ty));
    }
}

impl TypeResolver for FakeTypes
{
    fn lookup_type(&self, name: &str) -> Result<TypeDescriptor>
    {
        self.types
            .get(name)
            .cloned()
            .ok_or_else(|| BallastError::TypeLookup(name.to_string()))
    }

    fn field(&self, owner: &TypeDescriptor, name: &str) -> Result<FieldDescriptor>
    {
        self.fields
            .get(&(owner.name().to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| BallastError::resolution(name, format!("`{owner}` has no member named `{name}`")))
    }

    fn lookup_variable(&self, name: &str) -> Result<Option<(Address, TypeDescriptor)>>
    {
        Ok(self.variables.get(name).cloned())
    }
}

/// A trace target that replays a fixed sequence of stops.
#[derive(Debug, Default)]
pub struct ScriptedTarget
{
    pub stops: VecDeque<TraceStop>,
    /// Symbols the target does not define.
    pub missing: Vec<String>,
    pub set: Vec<String>,
    pub cleared: Vec<String>,
    pub completed: bool,
}

impl ScriptedTarget
{
    pub fn new(stops: impl IntoIterator<Item = TraceStop>) -> Self
    {
        Self {
            stops: stops.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn frame(name: &str) -> TraceStop
    {
        TraceStop::Frame(name.to_string())
    }
}

impl TraceTarget for ScriptedTarget
{
    fn set_breakpoint(&mut self, symbol: &str) -> Result<()>
    {
        if self.missing.iter().any(|missing| missing == symbol) {
            return Err(BallastError::InvalidArgument(format!("no symbol named `{symbol}`")));
        }
        self.set.push(symbol.to_string());
        Ok(())
    }

    fn clear_breakpoint(&mut self, symbol: &str) -> Result<()>
    {
        self.cleared.push(symbol.to_string());
        Ok(())
    }

    fn resume_until_stop(&mut self) -> Result<TraceStop>
    {
        Ok(self.stops.pop_front().unwrap_or(TraceStop::Exited(0)))
    }

    fn resume_to_completion(&mut self) -> Result<()>
    {
        self.completed = true;
        Ok(())
    }
}

/// A heap, optionally traceable.
pub struct FakeInferior
{
    pub heap: FakeHeap,
    pub target: Option<ScriptedTarget>,
}

impl FakeInferior
{
    pub fn new(heap: FakeHeap) -> Self
    {
        Self { heap, target: None }
    }

    pub fn traceable(heap: FakeHeap, target: ScriptedTarget) -> Self
    {
        Self {
            heap,
            target: Some(target),
        }
    }
}

impl MemoryReader for FakeInferior
{
    fn read_bytes(&self, address: Address, len: usize) -> Result<Vec<u8>>
    {
        self.heap.read_bytes(address, len)
    }
}

impl Inferior for FakeInferior
{
    fn trace_target(&mut self) -> Option<&mut dyn TraceTarget>
    {
        self.target.as_mut().map(|target| target as &mut dyn TraceTarget)
    }
}

pub fn int() -> TypeDescriptor
{
    TypeDescriptor::new("int", 4)
}

pub fn long() -> TypeDescriptor
{
    TypeDescriptor::new("long", 8)
}

pub fn vector_of(element: TypeDescriptor) -> TypeDescriptor
{
    let name = format!("std::vector<{0}, std::allocator<{0}> >", element.name());
    TypeDescriptor::new(name, 24).with_template_args(vec![element])
}

pub fn list_of(element: TypeDescriptor) -> TypeDescriptor
{
    let name = format!("std::__cxx11::list<{0}, std::allocator<{0}> >", element.name());
    TypeDescriptor::new(name, 24).with_template_args(vec![element])
}

pub fn map_of(key: TypeDescriptor, value: TypeDescriptor) -> TypeDescriptor
{
    let name = format!("std::map<{}, {}>", key.name(), value.name());
    TypeDescriptor::new(name, 48).with_template_args(vec![key, value])
}

pub fn set_of(key: TypeDescriptor) -> TypeDescriptor
{
    let name = format!("std::set<{}>", key.name());
    TypeDescriptor::new(name, 48).with_template_args(vec![key])
}

pub fn pair_of(first: TypeDescriptor, second: TypeDescriptor, size: u64) -> TypeDescriptor
{
    let name = format!("std::pair<{}, {}>", first.name(), second.name());
    TypeDescriptor::new(name, size).with_template_args(vec![first, second])
}
