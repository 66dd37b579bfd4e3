//! Process, thread, and memory region types.

use std::fmt;
use std::path::PathBuf;

use super::Address;

/// Process identifier (PID)
///
/// ```rust
/// use ballast_core::types::ProcessId;
///
/// let pid = ProcessId::from(4242);
/// assert_eq!(u32::from(pid), 4242);
/// assert_eq!(pid.to_string(), "4242");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessId(pub u32);

impl From<u32> for ProcessId
{
    fn from(pid: u32) -> Self
    {
        ProcessId(pid)
    }
}

impl From<ProcessId> for u32
{
    fn from(pid: ProcessId) -> Self
    {
        pid.0
    }
}

impl fmt::Display for ProcessId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.0)
    }
}

/// Thread identifier
///
/// On Linux this is the kernel TID of one task under `/proc/<pid>/task`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadId(pub u64);

impl ThreadId
{
    pub fn raw(&self) -> u64
    {
        self.0
    }
}

impl From<u64> for ThreadId
{
    fn from(value: u64) -> Self
    {
        Self(value)
    }
}

/// One mapping of the inspected process's address space.
///
/// Parsed from a line of `/proc/<pid>/maps`:
///
/// ```text
/// 55d0c0a00000-55d0c0a2c000 r--p 00000000 fd:01 1835029   /usr/bin/dashd
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryRegion
{
    /// First mapped address.
    pub start: Address,
    /// One past the last mapped address.
    pub end: Address,
    /// Permission string, e.g. `r-xp`.
    pub permissions: String,
    /// Offset of the mapping within the backing file.
    pub file_offset: u64,
    /// Backing file, if the mapping has one.
    pub path: Option<PathBuf>,
}

impl MemoryRegion
{
    /// Parse a single `/proc/<pid>/maps` line.
    ///
    /// Returns `None` for lines that do not have the expected shape.
    ///
    /// ```rust
    /// use ballast_core::types::{Address, MemoryRegion};
    ///
    /// let line = "7f00a000-7f00b000 r-xp 00001000 08:01 42   /lib/libc.so.6";
    /// let region = MemoryRegion::parse_maps_line(line).unwrap();
    /// assert_eq!(region.start, Address::from(0x7f00a000));
    /// assert_eq!(region.file_offset, 0x1000);
    /// assert!(region.is_executable());
    /// ```
    pub fn parse_maps_line(line: &str) -> Option<Self>
    {
        let mut fields = line.split_whitespace();
        let range = fields.next()?;
        let permissions = fields.next()?.to_string();
        let offset = fields.next()?;
        let _device = fields.next()?;
        let _inode = fields.next()?;
        // Path names may contain spaces; everything after the inode belongs to it.
        let path = fields.collect::<Vec<_>>().join(" ");

        let (start, end) = range.split_once('-')?;
        let start = u64::from_str_radix(start, 16).ok()?;
        let end = u64::from_str_radix(end, 16).ok()?;
        let file_offset = u64::from_str_radix(offset, 16).ok()?;

        Some(Self {
            start: Address::from(start),
            end: Address::from(end),
            permissions,
            file_offset,
            path: if path.starts_with('/') {
                Some(PathBuf::from(path))
            } else {
                None
            },
        })
    }

    pub fn size(&self) -> u64
    {
        self.end.value().saturating_sub(self.start.value())
    }

    pub fn is_readable(&self) -> bool
    {
        self.permissions.contains('r')
    }

    pub fn is_executable(&self) -> bool
    {
        self.permissions.contains('x')
    }

    pub fn contains(&self, address: Address) -> bool
    {
        address >= self.start && address < self.end
    }
}
