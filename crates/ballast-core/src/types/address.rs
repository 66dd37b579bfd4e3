//! Target memory address type.

use std::fmt;
use std::ops::{Add, Sub};

/// Strongly typed address in the inspected process
///
/// This wrapper around `u64` keeps target addresses apart from sizes, counts
/// and offsets. Every pointer read out of the target comes back as an
/// `Address`, every byte count stays a plain `u64`.
///
/// ## Example
///
/// ```rust
/// use ballast_core::types::Address;
///
/// let node = Address::from(0x1000);
/// let payload = node + 0x20;
/// assert_eq!(payload.value(), 0x1020);
/// assert_eq!(payload.distance_from(node), Some(0x20));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address(u64);

impl Address
{
    /// The null address (0x0)
    ///
    /// A null link inside a container is always an error for a size query,
    /// except where the layout uses it as a "no child" marker (tree nodes).
    pub const ZERO: Self = Address(0);

    /// Create a new address from a `u64` value
    ///
    /// Usable in const contexts.
    ///
    /// ```rust
    /// use ballast_core::types::Address;
    ///
    /// const HEAP_BASE: Address = Address::new(0x5555_0000_0000);
    /// assert!(!HEAP_BASE.is_null());
    /// ```
    pub const fn new(value: u64) -> Self
    {
        Address(value)
    }

    /// Get the raw `u64` value of this address
    pub const fn value(self) -> u64
    {
        self.0
    }

    /// Whether this is the null address
    pub const fn is_null(self) -> bool
    {
        self.0 == 0
    }

    /// Add an offset to this address, checking for overflow
    ///
    /// ```rust
    /// use ballast_core::types::Address;
    ///
    /// let addr = Address::from(0x1000);
    /// assert_eq!(addr.checked_add(0x100), Some(Address::from(0x1100)));
    /// assert_eq!(addr.checked_add(u64::MAX), None);
    /// ```
    pub fn checked_add(self, offset: u64) -> Option<Self>
    {
        self.0.checked_add(offset).map(Address)
    }

    /// Number of bytes from `base` up to this address, or `None` if this
    /// address lies below `base`
    ///
    /// Used to turn a `[begin, end)` pointer pair into a byte span.
    pub fn distance_from(self, base: Address) -> Option<u64>
    {
        self.0.checked_sub(base.0)
    }
}

impl From<u64> for Address
{
    fn from(value: u64) -> Self
    {
        Address(value)
    }
}

impl From<Address> for u64
{
    fn from(address: Address) -> Self
    {
        address.0
    }
}

impl fmt::Display for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "0x{:016x}", self.0)
    }
}

impl fmt::LowerHex for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl Add<u64> for Address
{
    type Output = Address;

    fn add(self, rhs: u64) -> Self::Output
    {
        Address(self.0.wrapping_add(rhs))
    }
}

impl Sub<u64> for Address
{
    type Output = Address;

    fn sub(self, rhs: u64) -> Self::Output
    {
        Address(self.0.wrapping_sub(rhs))
    }
}
