//! Software breakpoint bookkeeping.
//!
//! This module tracks which symbols are trapped, where, and what byte was
//! patched over, so a backend can focus on the mechanics (writing the trap
//! instruction, rewinding the program counter). Every entry remembers its
//! original byte; [`BreakpointStore::drain`] hands them all back so the backend
//! can restore memory before detaching.
//!
//! Addresses of removed breakpoints are remembered: a thread that executed the
//! trap just before it was lifted still reports a `SIGTRAP` afterwards, and that
//! stop must be swallowed rather than delivered to the process.

use std::collections::{HashMap, HashSet};

use crate::types::Address;

/// Unique identifier for a breakpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BreakpointId(u64);

impl BreakpointId
{
    #[must_use]
    pub const fn from_raw(value: u64) -> Self
    {
        Self(value)
    }

    #[must_use]
    pub const fn raw(self) -> u64
    {
        self.0
    }
}

/// An installed software breakpoint on a function entry.
#[derive(Debug, Clone)]
pub struct Breakpoint
{
    pub id: BreakpointId,
    /// Symbol the breakpoint was requested for.
    pub symbol: String,
    /// Runtime address of the trap.
    pub address: Address,
    /// Byte that the trap instruction replaced.
    pub original_byte: u8,
    pub hit_count: u64,
}

/// Breakpoints indexed by id, address and symbol.
#[derive(Debug, Default)]
pub struct BreakpointStore
{
    next_id: u64,
    by_id: HashMap<BreakpointId, Breakpoint>,
    by_address: HashMap<Address, BreakpointId>,
    by_symbol: HashMap<String, BreakpointId>,
    retired: HashSet<Address>,
}

impl BreakpointStore
{
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    fn allocate_id(&mut self) -> BreakpointId
    {
        self.next_id = self.next_id.wrapping_add(1);
        BreakpointId::from_raw(self.next_id)
    }

    /// Record a freshly installed trap.
    pub fn insert(&mut self, symbol: impl Into<String>, address: Address, original_byte: u8) -> BreakpointId
    {
        let id = self.allocate_id();
        let symbol = symbol.into();
        self.retired.remove(&address);
        self.by_address.insert(address, id);
        self.by_symbol.insert(symbol.clone(), id);
        self.by_id.insert(
            id,
            Breakpoint {
                id,
                symbol,
                address,
                original_byte,
                hit_count: 0,
            },
        );
        id
    }

    pub fn get(&self, id: BreakpointId) -> Option<&Breakpoint>
    {
        self.by_id.get(&id)
    }

    pub fn at_address(&self, address: Address) -> Option<&Breakpoint>
    {
        self.by_address.get(&address).and_then(|id| self.by_id.get(id))
    }

    pub fn for_symbol(&self, symbol: &str) -> Option<&Breakpoint>
    {
        self.by_symbol.get(symbol).and_then(|id| self.by_id.get(id))
    }

    pub fn remove(&mut self, id: BreakpointId) -> Option<Breakpoint>
    {
        let entry = self.by_id.remove(&id)?;
        self.by_address.remove(&entry.address);
        self.by_symbol.remove(&entry.symbol);
        self.retired.insert(entry.address);
        Some(entry)
    }

    pub fn remove_symbol(&mut self, symbol: &str) -> Option<Breakpoint>
    {
        let id = *self.by_symbol.get(symbol)?;
        self.remove(id)
    }

    /// Count a hit on the trap at `address`.
    pub fn record_hit(&mut self, address: Address) -> Option<&Breakpoint>
    {
        let id = *self.by_address.get(&address)?;
        let entry = self.by_id.get_mut(&id)?;
        entry.hit_count = entry.hit_count.saturating_add(1);
        Some(entry)
    }

    /// Whether a trap used to be installed at `address`.
    pub fn was_retired(&self, address: Address) -> bool
    {
        self.retired.contains(&address)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Breakpoint>
    {
        self.by_id.values()
    }

    pub fn len(&self) -> usize
    {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.by_id.is_empty()
    }

    /// Remove every entry, returning them for restoration.
    pub fn drain(&mut self) -> Vec<Breakpoint>
    {
        self.by_address.clear();
        self.by_symbol.clear();
        let entries: Vec<Breakpoint> = self.by_id.drain().map(|(_, entry)| entry).collect();
        self.retired.extend(entries.iter().map(|entry| entry.address));
        entries
    }
}
