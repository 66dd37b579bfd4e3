//! Common module for library exports

pub use crate::aggregates::{AggregateRegistry, AggregateSpec};
pub use crate::classify::{ContainerKind, TypeClassifier};
pub use crate::commands::CommandRegistry;
pub use crate::error::{BallastError, Result};
pub use crate::layout::ContainerLayouts;
pub use crate::memory::MemoryReader;
#[cfg(target_os = "linux")]
pub use crate::platform::linux::LinuxInferior;
pub use crate::resolver::TypeResolver;
pub use crate::session::{Inferior, Session};
pub use crate::size::SizeCalculator;
pub use crate::symbols::{BinaryImage, DwarfTypes};
pub use crate::tracer::{AllocationTracer, TraceConfig, TraceStop, TraceTarget};
pub use crate::types::{Address, AddressExpression, FieldDescriptor, ProcessId, TypeDescriptor};
