//! # Symbols and debug information
//!
//! ELF symbol tables for breakpoint placement and DWARF type information for
//! size queries.
//!
//! - [`BinaryImage`]: one mapped ELF file, with its function symbols, load
//!   bias and lazily loaded DWARF sections.
//! - [`ImageSet`]: every file-backed executable mapping of a process, used to
//!   place breakpoints in shared libraries and to name stop addresses.
//! - [`DwarfTypes`]: a [`TypeResolver`](crate::TypeResolver) over one image's
//!   DWARF, with a lazily built index of type and global variable names.
//!
//! Parsed debug information is immutable for a given binary, so it is cached
//! for the lifetime of the image. Nothing read from process memory is.

use gimli::{Dwarf, EndianArcSlice, RunTimeEndian};

use crate::error::BallastError;

pub mod extractor;
pub mod image;

pub use extractor::DwarfTypes;
pub use image::{BinaryImage, ElfSymbol, ImageDescriptor, ImageSet};

type OwnedReader = EndianArcSlice<RunTimeEndian>;
type OwnedDwarf = Dwarf<OwnedReader>;

pub(crate) fn map_dwarf_error(context: &str, err: gimli::Error) -> BallastError
{
    BallastError::Dwarf(format!("{context}: {err}"))
}
