//! # Types
//!
//! Value types shared by the size engine and the process backends.
//!
//! Nothing in here touches the inspected process: addresses, expressions and
//! descriptors are plain data that the [`MemoryReader`](crate::MemoryReader)
//! and [`TypeResolver`](crate::TypeResolver) implementations fill in.

pub mod address;
pub mod descriptor;
pub mod expression;
pub mod process;

// Re-export all public types
pub use address::Address;
pub use descriptor::{FieldDescriptor, TypeDescriptor, TypeHandle, TypeShape};
pub use expression::AddressExpression;
pub use process::{MemoryRegion, ProcessId, ThreadId};
