//! # Node walkers
//!
//! Out-of-process traversal of linked containers.
//!
//! Both walkers are plain iterators over node addresses, driven only by raw
//! pointer reads through a [`MemoryReader`]. They never call into the inspected
//! process and never trust a link blindly: every walk is bounded by the
//! container's stored element count, and any inconsistency between the links
//! and that count is an error rather than a short result.
//!
//! After yielding an error, a walker is exhausted.

use crate::error::{BallastError, Result};
use crate::layout::{ListLayout, TreeLayout};
use crate::memory::MemoryReader;
use crate::types::Address;

/// Longest root-to-leaf path a red-black tree can have in a 64-bit
/// address space.
const MAX_TREE_DEPTH: u32 = 128;

/// Bound for lists whose ABI keeps no element count.
const MAX_UNCOUNTED_NODES: u64 = 1 << 24;

fn raw(address: Address) -> String
{
    format!("*{address:#x}")
}

/// In-order traversal of a red-black tree (`std::map`, `std::set`)
///
/// The header node's `left` link is the leftmost (smallest) node and its
/// `parent` link is the root. Starting at the leftmost node the walker
/// advances with the standard in-order successor:
///
/// 1. if the node has a right child, go right once and then left as far as
///    possible;
/// 2. otherwise climb while the node is its parent's right child, and step
///    to the parent unless the node's right link already points at it (the
///    header/root corner case).
///
/// Exactly `count` nodes are yielded. Construction reads only the count; the
/// header's `left` link is first read by the first call to `next`, so an empty
/// tree never dereferences it.
pub struct TreeWalker<'m>
{
    memory: &'m dyn MemoryReader,
    layout: TreeLayout,
    header: Address,
    count: u64,
    visited: u64,
    started: bool,
    cursor: Option<Result<Address>>,
}

impl<'m> TreeWalker<'m>
{
    /// Prepare a walk over the tree container stored at `container`.
    ///
    /// `word_size` is the width of the stored node count.
    pub fn new(memory: &'m dyn MemoryReader, layout: &TreeLayout, container: Address, word_size: u8) -> Result<Self>
    {
        let header = container + layout.header_offset;
        let count = memory.read_uint(container + layout.count_offset, usize::from(word_size))?;

        Ok(Self {
            memory,
            layout: *layout,
            header,
            count,
            visited: 0,
            started: false,
            cursor: None,
        })
    }

    /// Node count read from the container, without walking any links.
    pub fn stored_count(&self) -> u64
    {
        self.count
    }

    fn link(&self, node: Address, offset: u64) -> Result<Address>
    {
        self.memory.read_pointer(node + offset)
    }

    fn successor(&self, node: Address) -> Result<Address>
    {
        let right = self.link(node, self.layout.right_offset)?;
        if !right.is_null() {
            let mut node = right;
            for _ in 0..MAX_TREE_DEPTH {
                let left = self.link(node, self.layout.left_offset)?;
                if left.is_null() {
                    return Ok(node);
                }
                node = left;
            }
            return Err(BallastError::resolution(raw(right), "left spine exceeds any valid tree depth"));
        }

        let mut node = node;
        let mut parent = self.link(node, self.layout.parent_offset)?;
        for _ in 0..MAX_TREE_DEPTH {
            if parent.is_null() {
                return Err(BallastError::resolution(raw(node), "null parent link"));
            }
            if node != self.link(parent, self.layout.right_offset)? {
                if self.link(node, self.layout.right_offset)? != parent {
                    node = parent;
                }
                return Ok(node);
            }
            node = parent;
            parent = self.link(parent, self.layout.parent_offset)?;
        }
        Err(BallastError::resolution(raw(node), "parent chain exceeds any valid tree depth"))
    }
}

impl Iterator for TreeWalker<'_>
{
    type Item = Result<Address>;

    fn next(&mut self) -> Option<Self::Item>
    {
        if self.visited >= self.count {
            return None;
        }
        if !self.started {
            self.started = true;
            self.cursor = Some(self.link(self.header, self.layout.left_offset));
        }

        let node = match self.cursor.take()? {
            Ok(node) => node,
            Err(err) => return Some(Err(err)),
        };

        if node.is_null() {
            return Some(Err(BallastError::resolution(
                raw(self.header),
                format!("null link after {} of {} nodes", self.visited, self.count),
            )));
        }
        if node == self.header {
            return Some(Err(BallastError::resolution(
                raw(self.header),
                format!("traversal reached the header after {} of {} nodes", self.visited, self.count),
            )));
        }

        self.visited += 1;
        if self.visited < self.count {
            self.cursor = Some(self.successor(node));
        }
        Some(Ok(node))
    }
}

/// Forward traversal of a doubly linked list (`std::list`)
///
/// Starts at the sentinel's `next` link and follows `next` until it comes
/// back to the sentinel. When the ABI stores an element count, the walk must
/// return to the sentinel after exactly that many nodes.
pub struct ListWalker<'m>
{
    memory: &'m dyn MemoryReader,
    layout: ListLayout,
    sentinel: Address,
    count: Option<u64>,
    visited: u64,
    cursor: Option<Result<Address>>,
}

impl<'m> ListWalker<'m>
{
    pub fn new(memory: &'m dyn MemoryReader, layout: &ListLayout, container: Address, word_size: u8) -> Result<Self>
    {
        let sentinel = container + layout.sentinel_offset;
        let count = match layout.size_offset {
            Some(offset) => Some(memory.read_uint(container + offset, usize::from(word_size))?),
            None => None,
        };
        let first = memory.read_pointer(sentinel + layout.next_offset);

        Ok(Self {
            memory,
            layout: *layout,
            sentinel,
            count,
            visited: 0,
            cursor: Some(first),
        })
    }

    /// Element count read from the container, if the layout has one.
    pub fn stored_count(&self) -> Option<u64>
    {
        self.count
    }

    fn limit(&self) -> u64
    {
        self.count.unwrap_or(MAX_UNCOUNTED_NODES)
    }
}

impl Iterator for ListWalker<'_>
{
    type Item = Result<Address>;

    fn next(&mut self) -> Option<Self::Item>
    {
        let node = match self.cursor.take()? {
            Ok(node) => node,
            Err(err) => return Some(Err(err)),
        };

        if node == self.sentinel {
            return match self.count {
                Some(count) if count != self.visited => Some(Err(BallastError::resolution(
                    raw(self.sentinel),
                    format!("list links {} nodes but stores a size of {count}", self.visited),
                ))),
                _ => None,
            };
        }

        if self.visited >= self.limit() {
            return Some(Err(BallastError::resolution(
                raw(self.sentinel),
                format!("chain does not return to the sentinel after {} nodes", self.visited),
            )));
        }

        if node.is_null() {
            return Some(Err(BallastError::resolution(
                raw(self.sentinel),
                format!("null link after {} nodes", self.visited),
            )));
        }

        self.visited += 1;
        self.cursor = Some(self.memory.read_pointer(node + self.layout.next_offset));
        Some(Ok(node))
    }
}
