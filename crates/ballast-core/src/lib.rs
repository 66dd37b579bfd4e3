//! # ballast-core
//!
//! Used-size accounting for live C++ standard library containers.
//!
//! Given the address and static type of a value inside a halted process, this
//! crate computes how many bytes it occupies in place plus everything it owns
//! on the heap: vector buffers, list nodes, red-black tree nodes, and the
//! members of a few named application aggregates.
//!
//! The crate is split into:
//! - The size engine ([`SizeCalculator`], [`classify`], [`walker`], [`layout`],
//!   [`aggregates`]), which only ever talks to a [`MemoryReader`] and a
//!   [`TypeResolver`] and is therefore testable against in-memory fakes
//! - Debug information ([`symbols`]): ELF symbols and a DWARF type index
//! - Process control ([`platform`]): attaching with `ptrace` and reading
//!   memory on Linux, plus `int3` breakpoints for the allocation [`tracer`]
//! - The command layer ([`session`], [`commands`], [`eval`]) shared by the
//!   command line and the interactive prompt
//!
//! ## Why unsafe code is needed
//!
//! Attaching to another process and reading its memory go through raw system
//! calls (`ptrace`, `process_vm_readv`, `waitpid`). Those calls are wrapped in
//! safe functions inside [`platform`]; nothing else in the crate uses `unsafe`.

#![allow(unsafe_code)] // Required for ptrace and process_vm_readv

pub mod aggregates;
pub mod breakpoints;
pub mod classify;
pub mod commands;
pub mod error;
pub mod eval;
pub mod layout;
pub mod memory;
pub mod platform;
pub mod prelude;
pub mod resolver;
pub mod session;
pub mod size;
pub mod symbols;
pub mod tracer;
pub mod types;
pub mod walker;

// Re-export commonly used types
pub use error::{BallastError, Result};
pub use memory::MemoryReader;
#[cfg(target_os = "linux")]
pub use platform::linux::LinuxInferior;
pub use resolver::TypeResolver;
pub use session::{Inferior, Session};
pub use size::SizeCalculator;
