//! # Container layouts
//!
//! Byte offsets of the standard library's container internals.
//!
//! Everything the size engine knows about *where* a container keeps its
//! bookkeeping lives in [`ContainerLayouts`]. The engine never hard-codes an
//! offset, so retargeting to another ABI means building a different table.
//!
//! ## Default: libstdc++ on x86-64
//!
//! ```text
//! std::vector<T>                 (24 bytes)
//!   +0   T* _M_start
//!   +8   T* _M_finish
//!   +16  T* _M_end_of_storage
//!
//! std::vector<bool>              (40 bytes)
//!   +0   _Bit_type* _M_start._M_p
//!   +8   unsigned   _M_start._M_offset
//!   +16  _Bit_type* _M_finish._M_p
//!   +24  unsigned   _M_finish._M_offset
//!   +32  _Bit_type* _M_end_of_storage
//!
//! std::list<T>                   (24 bytes)
//!   +0   _List_node_base* _M_next   ─┐ sentinel node
//!   +8   _List_node_base* _M_prev   ─┘
//!   +16  size_t _M_size
//!   node: next, prev, then T at +16
//!
//! std::map<K, V> / std::set<K>   (48 bytes)
//!   +0   comparator (empty, padded)
//!   +8   _Rb_tree_node_base _M_header   color, parent, left, right
//!   +40  size_t _M_node_count
//!   node: color, parent +8, left +16, right +24, payload at +32
//! ```
//!
//! ## Node overhead
//!
//! Only payload bytes are attributed to a container. The link header of each
//! list or tree node (and allocator padding) is not counted, so a
//! `std::list<int>` of three elements reports `24 + 3 * 4` bytes.
//!
//! ## Pairs
//!
//! A `std::pair` standing on its own (a variable, a vector element, a list
//! payload) is never reported below its shallow size, so the padding between
//! `first` and `second` counts. The key/value pair inside a map node is sized
//! as the two slots only: `std::map<int, long>` costs `4 + 8` per entry, while
//! a `std::vector<std::pair<int, long>>` costs 16 per element.
//!
//! ## Bit vectors
//!
//! `std::vector<bool>` packs its bits into `_Bit_type` words. Its payload is
//! the number of words the bits touch, so ten bits cost one 8-byte word.

use crate::types::TypeDescriptor;

/// Layout of `std::vector<T>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorLayout
{
    /// Shallow size of the vector object itself.
    pub header_size: u64,
    /// Offset of the pointer to the first element.
    pub begin_offset: u64,
    /// Offset of the one-past-last-element pointer.
    pub end_offset: u64,
}

/// Layout of the bit-packed `std::vector<bool>`.
///
/// Both ends are `(word pointer, bit offset)` iterators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitVectorLayout
{
    pub header_size: u64,
    pub start_word_offset: u64,
    pub start_bit_offset: u64,
    pub finish_word_offset: u64,
    pub finish_bit_offset: u64,
    /// Width of the stored bit offsets.
    pub bit_offset_size: u8,
    /// Width of one storage word.
    pub word_bytes: u64,
}

/// Layout of `std::list<T>` and its nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListLayout
{
    pub header_size: u64,
    /// Offset of the sentinel node inside the list object.
    pub sentinel_offset: u64,
    /// Offset of the `next` link inside any node (sentinel included).
    pub next_offset: u64,
    /// Offset of the stored element count, if the ABI keeps one.
    pub size_offset: Option<u64>,
    /// Offset of the element inside a data node.
    pub node_payload_offset: u64,
}

/// Layout of the red-black tree behind `std::map` and `std::set`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeLayout
{
    pub header_size: u64,
    /// Offset of the header node inside the container.
    pub header_offset: u64,
    /// Link offsets inside any node, the header included.
    pub parent_offset: u64,
    pub left_offset: u64,
    pub right_offset: u64,
    /// Offset of the stored node count inside the container.
    pub count_offset: u64,
    /// Offset of the key (or key/value pair) inside a data node.
    pub node_payload_offset: u64,
}

/// Static description of every container shape the engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerLayouts
{
    /// Width of pointers and `size_t` counters, in bytes.
    pub word_size: u8,
    pub vector: VectorLayout,
    pub bit_vector: BitVectorLayout,
    pub list: ListLayout,
    pub tree: TreeLayout,
}

impl ContainerLayouts
{
    /// libstdc++ (`_GLIBCXX_USE_CXX11_ABI=1`) on x86-64.
    pub const LIBSTDCXX_X86_64: Self = ContainerLayouts {
        word_size: 8,
        vector: VectorLayout {
            header_size: 24,
            begin_offset: 0,
            end_offset: 8,
        },
        bit_vector: BitVectorLayout {
            header_size: 40,
            start_word_offset: 0,
            start_bit_offset: 8,
            finish_word_offset: 16,
            finish_bit_offset: 24,
            bit_offset_size: 4,
            word_bytes: 8,
        },
        list: ListLayout {
            header_size: 24,
            sentinel_offset: 0,
            next_offset: 0,
            size_offset: Some(16),
            node_payload_offset: 16,
        },
        tree: TreeLayout {
            header_size: 48,
            header_offset: 8,
            parent_offset: 8,
            left_offset: 16,
            right_offset: 24,
            count_offset: 40,
            node_payload_offset: 32,
        },
    };

    /// Shallow size of a container, preferring the size debug info reports.
    ///
    /// `table_size` is used only when the descriptor carries no size (a
    /// declaration-only type).
    pub fn header_size(ty: &TypeDescriptor, table_size: u64) -> u64
    {
        if ty.size() > 0 {
            ty.size()
        } else {
            table_size
        }
    }

    /// Offset of `second` inside `std::pair<first, second>`, and of the mapped
    /// value inside a map node's payload.
    ///
    /// ```rust
    /// use ballast_core::layout::ContainerLayouts;
    /// use ballast_core::types::TypeDescriptor;
    ///
    /// let int = TypeDescriptor::new("int", 4);
    /// let long = TypeDescriptor::new("long", 8);
    /// assert_eq!(ContainerLayouts::pair_second_offset(&int, &long), 8);
    /// assert_eq!(ContainerLayouts::pair_second_offset(&long, &int), 8);
    /// ```
    pub fn pair_second_offset(first: &TypeDescriptor, second: &TypeDescriptor) -> u64
    {
        align_up(first.size(), second.align())
    }
}

impl Default for ContainerLayouts
{
    fn default() -> Self
    {
        Self::LIBSTDCXX_X86_64
    }
}

/// Round `value` up to the next multiple of `align` (treated as 1 when 0).
pub fn align_up(value: u64, align: u64) -> u64
{
    let align = align.max(1);
    value.div_ceil(align).saturating_mul(align)
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_align_up()
    {
        assert_eq!(align_up(0, 8), 0);
        assert_eq!(align_up(1, 8), 8);
        assert_eq!(align_up(8, 8), 8);
        assert_eq!(align_up(33, 1), 33);
        assert_eq!(align_up(5, 0), 5);
    }

    #[test]
    fn test_header_size_falls_back_to_table()
    {
        let declared = TypeDescriptor::new("std::vector<int, std::allocator<int> >", 0);
        assert_eq!(ContainerLayouts::header_size(&declared, 24), 24);

        let sized = TypeDescriptor::new("std::vector<int, std::allocator<int> >", 32);
        assert_eq!(ContainerLayouts::header_size(&sized, 24), 32);
    }

    #[test]
    fn test_default_is_libstdcxx()
    {
        let layouts = ContainerLayouts::default();
        assert_eq!(layouts.tree.header_offset + layouts.tree.left_offset, 24);
        assert_eq!(layouts.list.size_offset, Some(16));
        assert_eq!(layouts.bit_vector.header_size, 40);
    }
}
