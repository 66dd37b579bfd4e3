//! Tests for the used-size engine against libstdc++-shaped memory

mod common;

use ballast_core::aggregates::{AggregateRegistry, AggregateSpec};
use ballast_core::layout::ContainerLayouts;
use ballast_core::types::{Address, AddressExpression, TypeDescriptor};
use ballast_core::{BallastError, SizeCalculator};
use common::{int, list_of, long, map_of, pair_of, set_of, vector_of, FakeHeap, FakeTypes};

fn used_size(heap: &FakeHeap, types: &FakeTypes, aggregates: &AggregateRegistry, at: Address, ty: &TypeDescriptor)
    -> ballast_core::Result<u64>
{
    let layouts = ContainerLayouts::default();
    let calculator = SizeCalculator::new(heap, types, &layouts, aggregates);
    calculator.used_size(&AddressExpression::new("value", at), ty)
}

fn size_of(heap: &FakeHeap, at: Address, ty: &TypeDescriptor) -> u64
{
    used_size(heap, &FakeTypes::new(), &AggregateRegistry::new(), at, ty).unwrap()
}

#[test]
fn test_scalar_is_shallow_size()
{
    let mut heap = FakeHeap::new();
    let at = heap.alloc(8);
    assert_eq!(size_of(&heap, at, &long()), 8);
}

#[test]
fn test_unknown_type_is_shallow_size()
{
    // Nothing behind an unrecognized record is read, even if unmapped.
    let ty = TypeDescriptor::new("CBlockIndex", 152);
    assert_eq!(size_of(&FakeHeap::new(), Address::from(0xdead_0000), &ty), 152);
}

#[test]
fn test_vector_of_scalars()
{
    let mut heap = FakeHeap::new();
    let v = heap.alloc(24);
    heap.vector(v, 4, 5);
    assert_eq!(size_of(&heap, v, &vector_of(int())), 24 + 5 * 4);
}

#[test]
fn test_empty_vector_is_header_only()
{
    let mut heap = FakeHeap::new();
    let v = heap.alloc(24);
    heap.vector(v, 8, 0);
    assert_eq!(size_of(&heap, v, &vector_of(long())), 24);
}

#[test]
fn test_vector_of_vectors()
{
    let mut heap = FakeHeap::new();
    let outer = heap.alloc(24);
    let slots = heap.vector(outer, 24, 3);
    heap.vector(slots, 4, 3);
    heap.vector(slots + 24, 4, 0);
    heap.vector(slots + 48, 4, 10);

    let ty = vector_of(vector_of(int()));
    assert_eq!(size_of(&heap, outer, &ty), 24 + (24 + 12) + 24 + (24 + 40));
}

#[test]
fn test_vector_with_reversed_pointers_fails()
{
    let mut heap = FakeHeap::new();
    let v = heap.alloc(24);
    heap.write_u64(v, 0x2000);
    heap.write_u64(v + 8, 0x1000);

    let err = used_size(&heap, &FakeTypes::new(), &AggregateRegistry::new(), v, &vector_of(int())).unwrap_err();
    match err {
        BallastError::Resolution { expression, .. } => assert_eq!(expression, "value"),
        other => panic!("expected a resolution error, got {other:?}"),
    }
}

#[test]
fn test_vector_at_unmapped_address_names_the_expression()
{
    let err = used_size(
        &FakeHeap::new(),
        &FakeTypes::new(),
        &AggregateRegistry::new(),
        Address::from(0xbad_0000),
        &vector_of(int()),
    )
    .unwrap_err();
    assert!(err.is_query_error());
    assert!(err.to_string().contains("`value`"));
}

#[test]
fn test_nested_element_error_names_the_element()
{
    let mut heap = FakeHeap::new();
    let outer = heap.alloc(24);
    let slots = heap.vector(outer, 24, 2);
    heap.vector(slots, 4, 1);
    // Second inner vector points at nothing.
    heap.write_u64(slots + 24, 0xbad_0000);
    heap.write_u64(slots + 32, 0xbad_0010);

    let total = used_size(
        &heap,
        &FakeTypes::new(),
        &AggregateRegistry::new(),
        outer,
        &vector_of(vector_of(int())),
    );
    // Scalar elements are never read, only the span is.
    assert_eq!(total.unwrap(), 24 + (24 + 4) + (24 + 16));

    // One level deeper the first element's 4-byte span cannot hold 24-byte vectors.
    let deep = vector_of(vector_of(vector_of(int())));
    let err = used_size(&heap, &FakeTypes::new(), &AggregateRegistry::new(), outer, &deep).unwrap_err();
    match err {
        BallastError::Resolution { expression, .. } => assert!(expression.starts_with("value[")),
        other => panic!("expected a resolution error, got {other:?}"),
    }
}

#[test]
fn test_missing_template_argument_is_type_lookup()
{
    let mut heap = FakeHeap::new();
    let v = heap.alloc(24);
    let bare = TypeDescriptor::new("std::vector<Opaque>", 24);

    let err = used_size(&heap, &FakeTypes::new(), &AggregateRegistry::new(), v, &bare).unwrap_err();
    assert!(matches!(err, BallastError::TypeLookup(_)));
}

fn bool_vector() -> TypeDescriptor
{
    TypeDescriptor::new("std::vector<bool, std::allocator<bool> >", 40)
        .with_template_args(vec![TypeDescriptor::new("bool", 1)])
}

/// A `std::vector<bool>` at `at` holding `bits` bits.
fn write_bits(heap: &mut FakeHeap, at: Address, bits: u64)
{
    let words = bits.div_ceil(64).max(1);
    let storage = heap.alloc(words * 8);
    heap.write_pointer(at, storage);
    heap.write_u32(at + 8, 0);
    heap.write_pointer(at + 16, storage + (bits / 64) * 8);
    heap.write_u32(at + 24, (bits % 64) as u32);
    heap.write_pointer(at + 32, storage + words * 8);
}

#[test]
fn test_vector_of_bool_counts_touched_words()
{
    let mut heap = FakeHeap::new();
    let short = heap.alloc(40);
    write_bits(&mut heap, short, 10);
    let exact = heap.alloc(40);
    write_bits(&mut heap, exact, 128);
    let spill = heap.alloc(40);
    write_bits(&mut heap, spill, 130);

    assert_eq!(size_of(&heap, short, &bool_vector()), 40 + 8);
    assert_eq!(size_of(&heap, exact, &bool_vector()), 40 + 16);
    assert_eq!(size_of(&heap, spill, &bool_vector()), 40 + 24);
}

#[test]
fn test_empty_vector_of_bool_is_header_only()
{
    let mut heap = FakeHeap::new();
    let v = heap.alloc(40);
    assert_eq!(size_of(&heap, v, &bool_vector()), 40);
}

#[test]
fn test_vector_of_bool_vectors()
{
    let mut heap = FakeHeap::new();
    let outer = heap.alloc(24);
    let slots = heap.vector(outer, 40, 2);
    write_bits(&mut heap, slots, 1);
    write_bits(&mut heap, slots + 40, 65);

    assert_eq!(size_of(&heap, outer, &vector_of(bool_vector())), 24 + (40 + 8) + (40 + 16));
}

#[test]
fn test_vector_of_bool_with_reversed_ends_fails()
{
    let mut heap = FakeHeap::new();
    let v = heap.alloc(40);
    heap.write_u64(v, 0x2000);
    heap.write_u64(v + 16, 0x1000);

    let err = used_size(&heap, &FakeTypes::new(), &AggregateRegistry::new(), v, &bool_vector()).unwrap_err();
    assert!(matches!(err, BallastError::Resolution { ref expression, .. } if expression == "value"));
}

#[test]
fn test_list_of_scalars_counts_payload_only()
{
    let mut heap = FakeHeap::new();
    let list = heap.alloc(24);
    heap.list(list, &[4, 4, 4]);
    assert_eq!(size_of(&heap, list, &list_of(int())), 24 + 3 * 4);
}

#[test]
fn test_empty_list()
{
    let mut heap = FakeHeap::new();
    let list = heap.alloc(24);
    heap.list(list, &[]);
    assert_eq!(size_of(&heap, list, &list_of(long())), 24);
}

#[test]
fn test_list_of_vectors_recurses_into_nodes()
{
    let mut heap = FakeHeap::new();
    let list = heap.alloc(24);
    let nodes = heap.list(list, &[24, 24]);
    heap.vector(nodes[0] + 16, 8, 2);
    heap.vector(nodes[1] + 16, 8, 1);

    assert_eq!(size_of(&heap, list, &list_of(vector_of(long()))), 24 + (24 + 16) + (24 + 8));
}

#[test]
fn test_list_node_error_names_the_node()
{
    let mut heap = FakeHeap::new();
    let list = heap.alloc(24);
    let nodes = heap.list(list, &[24, 24]);
    heap.vector(nodes[0] + 16, 4, 1);
    heap.write_u64(nodes[1] + 16, 0x2000);
    heap.write_u64(nodes[1] + 24, 0x1000);

    let err = used_size(&heap, &FakeTypes::new(), &AggregateRegistry::new(), list, &list_of(vector_of(int())))
        .unwrap_err();
    assert!(matches!(err, BallastError::Resolution { ref expression, .. } if expression == "value<node 1>"));
}

#[test]
fn test_list_with_wrong_stored_size_fails()
{
    let mut heap = FakeHeap::new();
    let list = heap.alloc(24);
    heap.list(list, &[4, 4]);
    heap.write_u64(list + 16, 5);

    let err = used_size(&heap, &FakeTypes::new(), &AggregateRegistry::new(), list, &list_of(int())).unwrap_err();
    assert!(matches!(err, BallastError::Resolution { ref expression, .. } if expression == "value"));
}

#[test]
fn test_pair_of_scalars_is_its_shallow_size()
{
    let mut heap = FakeHeap::new();
    let at = heap.alloc(16);
    // 4 + 8 bytes of members, 4 of padding.
    assert_eq!(size_of(&heap, at, &pair_of(int(), long(), 16)), 16);
}

#[test]
fn test_pair_with_vector_second()
{
    let mut heap = FakeHeap::new();
    let at = heap.alloc(32);
    heap.vector(at + 8, 4, 2);
    assert_eq!(size_of(&heap, at, &pair_of(int(), vector_of(int()), 32)), 4 + 24 + 8);
}

#[test]
fn test_pair_padding_counts_outside_map_nodes_only()
{
    let mut heap = FakeHeap::new();
    let v = heap.alloc(24);
    heap.vector(v, 16, 3);
    let map = heap.alloc(48);
    heap.write_u64(map + 40, 3);

    assert_eq!(size_of(&heap, v, &vector_of(pair_of(int(), long(), 16))), 24 + 3 * 16);
    assert_eq!(size_of(&heap, map, &map_of(int(), long())), 48 + 3 * 12);
}

#[test]
fn test_map_of_scalars_uses_node_count_only()
{
    let mut heap = FakeHeap::new();
    let map = heap.alloc(48);
    // No nodes exist; a scalar map is sized from its count alone.
    heap.write_u64(map + 40, 3);
    assert_eq!(size_of(&heap, map, &map_of(int(), long())), 48 + 3 * (4 + 8));
}

#[test]
fn test_empty_set_never_follows_the_header()
{
    let mut heap = FakeHeap::new();
    let set = heap.alloc(48);
    heap.write_u64(set + 24, 0xdead_0000);
    heap.write_u64(set + 40, 0);
    assert_eq!(size_of(&heap, set, &set_of(vector_of(int()))), 48);
}

#[test]
fn test_map_with_vector_values()
{
    let mut heap = FakeHeap::new();
    let map = heap.alloc(48);
    // Payload: int key at +0, vector at +8.
    let nodes = heap.tree(map, &[32, 32, 32]);
    heap.vector(nodes[0] + 32 + 8, 4, 2);
    heap.vector(nodes[1] + 32 + 8, 4, 0);
    heap.vector(nodes[2] + 32 + 8, 4, 5);

    let expected = 48 + (4 + 24 + 8) + (4 + 24) + (4 + 24 + 20);
    assert_eq!(size_of(&heap, map, &map_of(int(), vector_of(int()))), expected);
}

#[test]
fn test_set_of_lists()
{
    let mut heap = FakeHeap::new();
    let set = heap.alloc(48);
    let nodes = heap.tree(set, &[24, 24]);
    heap.list(nodes[0] + 32, &[8]);
    heap.list(nodes[1] + 32, &[8, 8, 8]);

    assert_eq!(size_of(&heap, set, &set_of(list_of(long()))), 48 + (24 + 8) + (24 + 24));
}

#[test]
fn test_tree_count_larger_than_links_fails()
{
    let mut heap = FakeHeap::new();
    let set = heap.alloc(48);
    heap.tree(set, &[24, 24]);
    heap.write_u64(set + 40, 4);

    let err = used_size(
        &heap,
        &FakeTypes::new(),
        &AggregateRegistry::new(),
        set,
        &set_of(vector_of(int())),
    )
    .unwrap_err();
    assert!(err.is_query_error());
}

fn pool_types() -> FakeTypes
{
    let mut types = FakeTypes::new();
    types.add_type(TypeDescriptor::new("Pool", 32));
    types.add_field("Pool", "nVersion", 0, int());
    types.add_field("Pool", "items", 8, vector_of(int()));
    types.add_type(TypeDescriptor::new("Derived", 40));
    types.add_field("Derived", "extra", 32, TypeDescriptor::new("char", 1));
    types
}

fn pool_registry() -> AggregateRegistry
{
    let mut registry = AggregateRegistry::new();
    registry.register(AggregateSpec::new("Pool").fixed(4).field("items")).unwrap();
    registry.register(AggregateSpec::new("Derived").base("Pool").field("extra")).unwrap();
    registry
        .register(AggregateSpec::new("Wrapper").typed("inner", "Pool").fixed(1))
        .unwrap();
    registry
}

#[test]
fn test_aggregate_sums_its_rules()
{
    let mut heap = FakeHeap::new();
    let pool = heap.alloc(32);
    heap.vector(pool + 8, 4, 3);

    let total = used_size(&heap, &pool_types(), &pool_registry(), pool, &TypeDescriptor::new("Pool", 32));
    assert_eq!(total.unwrap(), 4 + 24 + 12);
}

#[test]
fn test_aggregate_base_rule_reinterprets_the_object()
{
    let mut heap = FakeHeap::new();
    let derived = heap.alloc(40);
    heap.vector(derived + 8, 4, 3);

    let total = used_size(&heap, &pool_types(), &pool_registry(), derived, &TypeDescriptor::new("Derived", 40));
    // Base formula (40) plus one char, but never below the shallow size.
    assert_eq!(total.unwrap(), 41);
}

#[test]
fn test_aggregate_typed_rule_uses_the_named_type()
{
    let mut heap = FakeHeap::new();
    let wrapper = heap.alloc(40);
    heap.vector(wrapper + 8 + 8, 4, 3);

    let mut types = pool_types();
    // Declared as raw bytes; the rule sizes it as a Pool.
    types.add_field("Wrapper", "inner", 8, TypeDescriptor::new("unsigned char [32]", 32));

    let total = used_size(&heap, &types, &pool_registry(), wrapper, &TypeDescriptor::new("Wrapper", 40));
    assert_eq!(total.unwrap(), (4 + 24 + 12) + 1);
}

#[test]
fn test_aggregate_is_never_below_shallow_size()
{
    let mut registry = AggregateRegistry::new();
    registry.register(AggregateSpec::new("Padded").fixed(1)).unwrap();

    let total = used_size(
        &FakeHeap::new(),
        &FakeTypes::new(),
        &registry,
        Address::from(0x1000),
        &TypeDescriptor::new("Padded", 16),
    );
    assert_eq!(total.unwrap(), 16);
}

#[test]
fn test_aggregate_missing_member_fails()
{
    let mut registry = AggregateRegistry::new();
    registry.register(AggregateSpec::new("Pool").field("missing")).unwrap();

    let err = used_size(
        &FakeHeap::new(),
        &pool_types(),
        &registry,
        Address::from(0x1000),
        &TypeDescriptor::new("Pool", 32),
    )
    .unwrap_err();
    assert!(matches!(err, BallastError::Resolution { ref expression, .. } if expression == "value.missing"));
}

#[test]
fn test_aggregate_unknown_base_type_is_type_lookup()
{
    let mut registry = AggregateRegistry::new();
    registry.register(AggregateSpec::new("Orphan").base("NoSuchBase")).unwrap();

    let err = used_size(
        &FakeHeap::new(),
        &FakeTypes::new(),
        &registry,
        Address::from(0x1000),
        &TypeDescriptor::new("Orphan", 8),
    )
    .unwrap_err();
    assert!(matches!(err, BallastError::TypeLookup(ref name) if name == "NoSuchBase"));
}

#[test]
fn test_masternode_index()
{
    let mut heap = FakeHeap::new();
    let index = heap.alloc(104);
    let txin = TypeDescriptor::new("CTxIn", 40);
    heap.write_u64(index + 8 + 40, 2);

    let mut types = FakeTypes::new();
    types.add_field("CMasternodeIndex", "mapIndex", 8, map_of(txin.clone(), int()));
    types.add_field("CMasternodeIndex", "mapReverseIndex", 56, map_of(int(), txin));

    let total = used_size(
        &heap,
        &types,
        &AggregateRegistry::masternode(),
        index,
        &TypeDescriptor::new("CMasternodeIndex", 104),
    );
    assert_eq!(total.unwrap(), 4 + (48 + 2 * 44) + 48);
}

#[test]
fn test_queries_reread_memory()
{
    let mut heap = FakeHeap::new();
    let v = heap.alloc(24);
    heap.vector(v, 4, 2);
    assert_eq!(size_of(&heap, v, &vector_of(int())), 32);

    heap.vector(v, 4, 6);
    assert_eq!(size_of(&heap, v, &vector_of(int())), 48);
}
