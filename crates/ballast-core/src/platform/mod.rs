//! # Platform-Specific Implementations
//!
//! Attaching to a live process, reading its memory and driving it through
//! breakpoints all depend on the operating system's debugging interface.
//!
//! - **Linux**: `ptrace(2)`, `process_vm_readv(2)` and `/proc`
//!   - See: [ptrace(2) man page](https://man7.org/linux/man-pages/man2/ptrace.2.html)
//!
//! Everything above this module talks to a process only through
//! [`MemoryReader`](crate::MemoryReader) and
//! [`TraceTarget`](crate::tracer::TraceTarget), so the size engine itself is
//! portable and testable without a live target.

#[cfg(target_os = "linux")]
pub mod linux;
