//! Tests for the tree and list node walkers

mod common;

use ballast_core::layout::ContainerLayouts;
use ballast_core::types::Address;
use ballast_core::walker::{ListWalker, TreeWalker};
use common::FakeHeap;

const LAYOUTS: ContainerLayouts = ContainerLayouts::LIBSTDCXX_X86_64;

fn walk_tree(heap: &FakeHeap, container: Address) -> ballast_core::Result<Vec<Address>>
{
    TreeWalker::new(heap, &LAYOUTS.tree, container, LAYOUTS.word_size)?.collect()
}

fn walk_list(heap: &FakeHeap, container: Address) -> ballast_core::Result<Vec<Address>>
{
    ListWalker::new(heap, &LAYOUTS.list, container, LAYOUTS.word_size)?.collect()
}

#[test]
fn test_tree_walk_is_in_order()
{
    for size in [1, 2, 3, 7, 10, 31] {
        let mut heap = FakeHeap::new();
        let tree = heap.alloc(48);
        let nodes = heap.tree(tree, &vec![8; size]);

        assert_eq!(walk_tree(&heap, tree).unwrap(), nodes, "tree of {size} nodes");
    }
}

#[test]
fn test_tree_walker_reports_stored_count()
{
    let mut heap = FakeHeap::new();
    let tree = heap.alloc(48);
    heap.tree(tree, &[8, 8, 8, 8]);

    let walker = TreeWalker::new(&heap, &LAYOUTS.tree, tree, LAYOUTS.word_size).unwrap();
    assert_eq!(walker.stored_count(), 4);
}

#[test]
fn test_tree_stored_count_is_read_not_walked()
{
    let mut heap = FakeHeap::new();
    let tree = heap.alloc(48);
    heap.tree(tree, &[8, 8, 8]);
    heap.write_u64(tree + 40, 5);

    let walker = TreeWalker::new(&heap, &LAYOUTS.tree, tree, LAYOUTS.word_size).unwrap();
    assert_eq!(walker.stored_count(), 5);
    // The links disagree, which only a walk discovers.
    assert!(walk_tree(&heap, tree).is_err());
}

#[test]
fn test_list_stored_count_is_read_not_walked()
{
    let mut heap = FakeHeap::new();
    let list = heap.alloc(24);
    heap.list(list, &[4, 4]);
    heap.write_u64(list + 16, 7);

    let walker = ListWalker::new(&heap, &LAYOUTS.list, list, LAYOUTS.word_size).unwrap();
    assert_eq!(walker.stored_count(), Some(7));
}

#[test]
fn test_empty_tree_reads_only_the_count()
{
    let mut heap = FakeHeap::new();
    let tree = heap.alloc(48);
    heap.write_u64(tree + 24, 0xdead_0000);

    assert!(walk_tree(&heap, tree).unwrap().is_empty());
}

#[test]
fn test_tree_walk_stops_at_the_header()
{
    let mut heap = FakeHeap::new();
    let tree = heap.alloc(48);
    heap.tree(tree, &[8, 8, 8]);
    heap.write_u64(tree + 40, 5);

    let err = walk_tree(&heap, tree).unwrap_err();
    assert!(err.to_string().contains("header"));
}

#[test]
fn test_tree_with_null_parent_fails()
{
    let mut heap = FakeHeap::new();
    let tree = heap.alloc(48);
    let nodes = heap.tree(tree, &[8, 8]);
    // Orphan the leftmost node.
    heap.write_u64(nodes[0] + 8, 0);

    assert!(walk_tree(&heap, tree).unwrap_err().is_query_error());
}

#[test]
fn test_tree_walker_is_exhausted_after_an_error()
{
    let mut heap = FakeHeap::new();
    let tree = heap.alloc(48);
    heap.write_u64(tree + 24, 0);
    heap.write_u64(tree + 40, 2);

    let mut walker = TreeWalker::new(&heap, &LAYOUTS.tree, tree, LAYOUTS.word_size).unwrap();
    assert!(walker.next().unwrap().is_err());
    assert!(walker.next().is_none());
}

#[test]
fn test_list_walk_follows_next_links()
{
    let mut heap = FakeHeap::new();
    let list = heap.alloc(24);
    let nodes = heap.list(list, &[4, 4, 4, 4]);

    let walker = ListWalker::new(&heap, &LAYOUTS.list, list, LAYOUTS.word_size).unwrap();
    assert_eq!(walker.stored_count(), Some(4));
    assert_eq!(walk_list(&heap, list).unwrap(), nodes);
}

#[test]
fn test_empty_list_points_at_itself()
{
    let mut heap = FakeHeap::new();
    let list = heap.alloc(24);
    heap.list(list, &[]);

    assert!(walk_list(&heap, list).unwrap().is_empty());
}

#[test]
fn test_list_shorter_than_stored_size_fails()
{
    let mut heap = FakeHeap::new();
    let list = heap.alloc(24);
    heap.list(list, &[4, 4]);
    heap.write_u64(list + 16, 3);

    let err = walk_list(&heap, list).unwrap_err();
    assert!(err.to_string().contains("stores a size of 3"));
}

#[test]
fn test_list_longer_than_stored_size_fails()
{
    let mut heap = FakeHeap::new();
    let list = heap.alloc(24);
    heap.list(list, &[4, 4, 4]);
    heap.write_u64(list + 16, 1);

    assert!(walk_list(&heap, list).is_err());
}

#[test]
fn test_list_with_null_link_fails()
{
    let mut heap = FakeHeap::new();
    let list = heap.alloc(24);
    let nodes = heap.list(list, &[4, 4]);
    heap.write_u64(nodes[0], 0);

    let err = walk_list(&heap, list).unwrap_err();
    assert!(err.to_string().contains("null link"));
}

#[test]
fn test_list_cycle_is_bounded_by_the_count()
{
    let mut heap = FakeHeap::new();
    let list = heap.alloc(24);
    let nodes = heap.list(list, &[4, 4]);
    // Loop the last node back onto the first.
    heap.write_pointer(nodes[1], nodes[0]);

    assert!(walk_list(&heap, list).is_err());
}
