//! ELF image parsing, symbol tables and DWARF section loading.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use gimli::{Dwarf, EndianArcSlice, RunTimeEndian, SectionId};
use object::{Object, ObjectSection, ObjectSegment, ObjectSymbol, SymbolKind};
use once_cell::sync::OnceCell;
use tracing::{debug, warn};

use super::{map_dwarf_error, OwnedDwarf};
use crate::error::{BallastError, Result};
use crate::types::{Address, MemoryRegion};

/// Describes an ELF file and where it is loaded.
#[derive(Debug, Clone)]
pub struct ImageDescriptor
{
    pub path: PathBuf,
    /// Difference between runtime and link-time addresses (0 for non-PIE
    /// executables and for offline inspection).
    pub load_bias: u64,
}

/// A function symbol from `.symtab` or `.dynsym`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElfSymbol
{
    pub name: String,
    /// Link-time address.
    pub address: u64,
    pub size: u64,
}

#[derive(Debug, Clone, Copy)]
struct LoadSegment
{
    vaddr: u64,
    file_offset: u64,
    file_size: u64,
}

const DWARF_SECTIONS: &[(SectionId, &str)] = &[
    (SectionId::DebugAbbrev, ".debug_abbrev"),
    (SectionId::DebugAddr, ".debug_addr"),
    (SectionId::DebugInfo, ".debug_info"),
    (SectionId::DebugLine, ".debug_line"),
    (SectionId::DebugLineStr, ".debug_line_str"),
    (SectionId::DebugRanges, ".debug_ranges"),
    (SectionId::DebugRngLists, ".debug_rnglists"),
    (SectionId::DebugStr, ".debug_str"),
    (SectionId::DebugStrOffsets, ".debug_str_offsets"),
    (SectionId::DebugTypes, ".debug_types"),
    (SectionId::DebugLoc, ".debug_loc"),
    (SectionId::DebugLocLists, ".debug_loclists"),
];

fn load_section_bytes(file: &object::File<'_>, name: &str) -> Result<Arc<[u8]>>
{
    let Some(section) = file.section_by_name(name) else {
        return Ok(Arc::<[u8]>::from(Vec::new()));
    };
    let data = section
        .uncompressed_data()
        .map_err(|err| BallastError::Dwarf(format!("failed to read {name}: {err}")))?;
    Ok(match data {
        Cow::Borrowed(bytes) => Arc::<[u8]>::from(bytes.to_vec()),
        Cow::Owned(vec) => vec.into(),
    })
}

/// A parsed ELF file with its function symbols and (lazily) its DWARF.
pub struct BinaryImage
{
    path: PathBuf,
    data: Arc<[u8]>,
    endian: RunTimeEndian,
    pointer_size: u8,
    load_bias: u64,
    segments: Vec<LoadSegment>,
    symbols: Vec<ElfSymbol>,
    by_name: HashMap<String, usize>,
    by_address: BTreeMap<u64, usize>,
    dwarf_cache: OnceCell<OwnedDwarf>,
}

impl BinaryImage
{
    pub fn parse(desc: ImageDescriptor) -> Result<Self>
    {
        let bytes = fs::read(&desc.path)?;
        let data = Arc::<[u8]>::from(bytes);
        let file = object::File::parse(&*data)
            .map_err(|err| BallastError::InvalidArgument(format!("failed to parse {}: {err}", desc.path.display())))?;

        let endian = if file.is_little_endian() {
            RunTimeEndian::Little
        } else {
            RunTimeEndian::Big
        };
        let pointer_size = if file.is_64() { 8 } else { 4 };

        let segments = file
            .segments()
            .map(|segment| {
                let (file_offset, file_size) = segment.file_range();
                LoadSegment {
                    vaddr: segment.address(),
                    file_offset,
                    file_size,
                }
            })
            .collect();

        let mut symbols = Vec::new();
        for symbol in file.symbols().chain(file.dynamic_symbols()) {
            if symbol.kind() != SymbolKind::Text || !symbol.is_definition() {
                continue;
            }
            let Ok(name) = symbol.name() else {
                continue;
            };
            if name.is_empty() {
                continue;
            }
            symbols.push(ElfSymbol {
                name: name.to_string(),
                address: symbol.address(),
                size: symbol.size(),
            });
        }

        let mut by_name = HashMap::new();
        let mut by_address = BTreeMap::new();
        for (index, symbol) in symbols.iter().enumerate() {
            by_name.entry(symbol.name.clone()).or_insert(index);
            by_address.entry(symbol.address).or_insert(index);
        }

        debug!("Parsed {} ({} function symbols)", desc.path.display(), symbols.len());

        Ok(Self {
            path: desc.path,
            data,
            endian,
            pointer_size,
            load_bias: desc.load_bias,
            segments,
            symbols,
            by_name,
            by_address,
            dwarf_cache: OnceCell::new(),
        })
    }

    /// Parse `path` for offline use (no load bias).
    pub fn open(path: impl Into<PathBuf>) -> Result<Self>
    {
        Self::parse(ImageDescriptor {
            path: path.into(),
            load_bias: 0,
        })
    }

    pub fn path(&self) -> &Path
    {
        &self.path
    }

    pub fn pointer_size(&self) -> u8
    {
        self.pointer_size
    }

    pub fn load_bias(&self) -> u64
    {
        self.load_bias
    }

    /// Load bias implied by a mapping of this file, if the mapping's file
    /// offset falls inside one of its loadable segments.
    pub fn bias_for_region(&self, region: &MemoryRegion) -> Option<u64>
    {
        let segment = self.segments.iter().find(|segment| {
            region.file_offset >= segment.file_offset
                && region.file_offset < segment.file_offset.saturating_add(segment.file_size.max(1))
        })?;
        let link_address = segment.vaddr.checked_add(region.file_offset - segment.file_offset)?;
        Some(region.start.value().wrapping_sub(link_address))
    }

    /// Runtime address of a function symbol.
    pub fn symbol_address(&self, name: &str) -> Option<Address>
    {
        let symbol = &self.symbols[*self.by_name.get(name)?];
        Some(Address::from(symbol.address.wrapping_add(self.load_bias)))
    }

    /// Name of the function containing the runtime address `address`.
    pub fn symbolize(&self, address: Address) -> Option<&str>
    {
        let link = address.value().wrapping_sub(self.load_bias);
        let (_, index) = self.by_address.range(..=link).next_back()?;
        let symbol = &self.symbols[*index];
        let inside = if symbol.size == 0 {
            link == symbol.address
        } else {
            link < symbol.address.saturating_add(symbol.size)
        };
        inside.then_some(symbol.name.as_str())
    }

    pub fn symbols(&self) -> &[ElfSymbol]
    {
        &self.symbols
    }

    pub(crate) fn dwarf(&self) -> Result<&OwnedDwarf>
    {
        self.dwarf_cache.get_or_try_init(|| {
            let file = object::File::parse(&*self.data)
                .map_err(|err| BallastError::Dwarf(format!("failed to reparse {}: {err}", self.path.display())))?;

            let mut sections = HashMap::new();
            for (id, name) in DWARF_SECTIONS {
                sections.insert(*id, load_section_bytes(&file, name)?);
            }

            let endian = self.endian;
            Dwarf::load(|id| {
                let data = sections
                    .get(&id)
                    .cloned()
                    .unwrap_or_else(|| Arc::<[u8]>::from(Vec::new()));
                Ok::<_, gimli::Error>(EndianArcSlice::new(data, endian))
            })
            .map_err(|err| map_dwarf_error("loading DWARF", err))
        })
    }
}

/// Every file-backed executable image mapped into a process.
#[derive(Default)]
pub struct ImageSet
{
    images: Vec<Arc<BinaryImage>>,
}

impl ImageSet
{
    /// Parse each distinct file behind an executable mapping.
    ///
    /// Files that cannot be read or parsed (deleted binaries, special
    /// mappings) are skipped with a warning.
    pub fn from_regions(regions: &[MemoryRegion]) -> Self
    {
        let mut seen: Vec<&Path> = Vec::new();
        let mut images = Vec::new();

        for region in regions.iter().filter(|region| region.is_executable()) {
            let Some(path) = region.path.as_deref() else {
                continue;
            };
            if seen.contains(&path) {
                continue;
            }
            seen.push(path);

            let image = match BinaryImage::open(path) {
                Ok(image) => image,
                Err(err) => {
                    warn!("Skipping {}: {}", path.display(), err);
                    continue;
                }
            };
            let bias = regions
                .iter()
                .filter(|candidate| candidate.path.as_deref() == Some(path))
                .find_map(|candidate| image.bias_for_region(candidate))
                .unwrap_or(0);

            images.push(Arc::new(BinaryImage { load_bias: bias, ..image }));
        }

        Self { images }
    }

    pub fn push(&mut self, image: BinaryImage)
    {
        self.images.push(Arc::new(image));
    }

    /// Runtime address of `symbol`, searching images in mapping order.
    pub fn resolve(&self, symbol: &str) -> Option<Address>
    {
        self.images.iter().find_map(|image| image.symbol_address(symbol))
    }

    pub fn symbolize(&self, address: Address) -> Option<&str>
    {
        self.images.iter().find_map(|image| image.symbolize(address))
    }

    /// Image backed by `path`, if mapped.
    pub fn find(&self, path: &Path) -> Option<Arc<BinaryImage>>
    {
        self.images.iter().find(|image| image.path() == path).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<BinaryImage>>
    {
        self.images.iter()
    }
}
