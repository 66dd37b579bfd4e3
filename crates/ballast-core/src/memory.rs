//! Raw reads from the inspected process.

use crate::error::{BallastError, Result};
use crate::types::Address;

/// Read-only view of the inspected process's memory
///
/// This is the only way the size engine ever looks at live data. Implementors
/// must not change target state: a size query is observation only.
///
/// Only [`read_bytes`](MemoryReader::read_bytes) is required. The integer
/// helpers decode little-endian values of the requested width, which matches
/// every target the container layouts describe.
///
/// Any failure (unmapped page, short read, detached process) is reported as a
/// [`BallastError::Resolution`] naming the raw address; callers re-label it
/// with the printable expression they were evaluating.
pub trait MemoryReader
{
    /// Read exactly `len` bytes starting at `address`.
    fn read_bytes(&self, address: Address, len: usize) -> Result<Vec<u8>>;

    /// Width of a target pointer in bytes.
    fn pointer_size(&self) -> u8
    {
        8
    }

    /// Read an unsigned little-endian integer of `width` bytes (1 to 8).
    fn read_uint(&self, address: Address, width: usize) -> Result<u64>
    {
        if width == 0 || width > 8 {
            return Err(BallastError::InvalidArgument(format!("unsupported integer width {width}")));
        }

        let bytes = self.read_bytes(address, width)?;
        if bytes.len() != width {
            return Err(BallastError::resolution(
                format!("*{address:#x}"),
                format!("short read: wanted {width} bytes, got {}", bytes.len()),
            ));
        }

        let mut buf = [0u8; 8];
        buf[..width].copy_from_slice(&bytes);
        Ok(u64::from_le_bytes(buf))
    }

    /// Read a target pointer.
    fn read_pointer(&self, address: Address) -> Result<Address>
    {
        self.read_uint(address, usize::from(self.pointer_size())).map(Address::from)
    }
}

impl<T: MemoryReader + ?Sized> MemoryReader for &T
{
    fn read_bytes(&self, address: Address, len: usize) -> Result<Vec<u8>>
    {
        (**self).read_bytes(address, len)
    }

    fn pointer_size(&self) -> u8
    {
        (**self).pointer_size()
    }
}

impl<T: MemoryReader + ?Sized> MemoryReader for Box<T>
{
    fn read_bytes(&self, address: Address, len: usize) -> Result<Vec<u8>>
    {
        (**self).read_bytes(address, len)
    }

    fn pointer_size(&self) -> u8
    {
        (**self).pointer_size()
    }
}
