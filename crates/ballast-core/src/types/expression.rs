//! Printable, composable references to live values.

use std::fmt;

use super::address::Address;

/// A specific live value (or part of one) in the target process.
///
/// The address is absolute; the path is what gets printed in log lines and
/// error messages. Composition never touches target memory: deriving a field
/// or element only does address arithmetic.
///
/// ```rust
/// use ballast_core::types::{Address, AddressExpression};
///
/// let man = AddressExpression::new("mnodeman", Address::from(0x7000));
/// let vec = man.field("vMasternodes", 0x30);
/// assert_eq!(vec.path(), "mnodeman.vMasternodes");
/// assert_eq!(vec.address(), Address::from(0x7030));
///
/// let third = AddressExpression::new(vec.path(), Address::from(0x9000)).element(2, 0x98);
/// assert_eq!(third.to_string(), "mnodeman.vMasternodes[2]");
/// assert_eq!(third.address(), Address::from(0x9130));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AddressExpression
{
    path: String,
    address: Address,
}

impl AddressExpression
{
    pub fn new(path: impl Into<String>, address: Address) -> Self
    {
        Self {
            path: path.into(),
            address,
        }
    }

    /// Expression for a bare address, printed as `*0x...`.
    pub fn at(address: Address) -> Self
    {
        Self::new(format!("*{address:#x}"), address)
    }

    pub fn path(&self) -> &str
    {
        &self.path
    }

    pub fn address(&self) -> Address
    {
        self.address
    }

    /// Member `name` located `offset` bytes into this value.
    #[must_use]
    pub fn field(&self, name: &str, offset: u64) -> Self
    {
        Self::new(format!("{}.{name}", self.path), self.address + offset)
    }

    /// The `index`-th slot of a contiguous run starting at this value.
    #[must_use]
    pub fn element(&self, index: u64, stride: u64) -> Self
    {
        Self::new(
            format!("{}[{index}]", self.path),
            self.address + index.wrapping_mul(stride),
        )
    }

    /// A value `bytes` past this one that has no member name of its own,
    /// such as the payload of a container node.
    #[must_use]
    pub fn offset(&self, bytes: u64, label: &str) -> Self
    {
        Self::new(format!("{}<{label}>", self.path), self.address + bytes)
    }
}

impl fmt::Display for AddressExpression
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(&self.path)
    }
}
