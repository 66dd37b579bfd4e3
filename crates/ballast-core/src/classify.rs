//! Mapping type names to container shapes.

use crate::aggregates::{AggregateId, AggregateRegistry};
use crate::types::TypeDescriptor;

/// How a value of some type is sized.
///
/// Exactly one kind applies to a type. Anything unrecognized is
/// [`ContainerKind::Scalar`] and costs its shallow size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerKind
{
    Scalar,
    Vector,
    /// `std::vector<bool>`, which packs its elements into words.
    BitVector,
    LinkedList,
    Pair,
    OrderedMap,
    OrderedSet,
    NamedAggregate(AggregateId),
}

impl ContainerKind
{
    /// Whether values of this kind cost only their shallow size.
    pub fn is_scalar(self) -> bool
    {
        matches!(self, ContainerKind::Scalar)
    }
}

/// Recognized name prefixes, in priority order.
const CONTAINER_PATTERNS: &[(&str, ContainerKind)] = &[
    ("std::vector<bool,", ContainerKind::BitVector),
    ("std::vector<bool>", ContainerKind::BitVector),
    ("std::__cxx11::vector<bool,", ContainerKind::BitVector),
    ("std::vector<", ContainerKind::Vector),
    ("std::__cxx11::vector<", ContainerKind::Vector),
    ("std::list<", ContainerKind::LinkedList),
    ("std::__cxx11::list<", ContainerKind::LinkedList),
    ("std::pair<", ContainerKind::Pair),
    ("std::__cxx11::pair<", ContainerKind::Pair),
    ("std::map<", ContainerKind::OrderedMap),
    ("std::__cxx11::map<", ContainerKind::OrderedMap),
    ("std::set<", ContainerKind::OrderedSet),
    ("std::__cxx11::set<", ContainerKind::OrderedSet),
];

/// Name-based classifier
///
/// Classification never reads memory and never consults debug information
/// beyond the descriptor's printable name.
///
/// ```rust
/// use ballast_core::aggregates::AggregateRegistry;
/// use ballast_core::classify::{ContainerKind, TypeClassifier};
/// use ballast_core::types::TypeDescriptor;
///
/// let registry = AggregateRegistry::masternode();
/// let classifier = TypeClassifier::new(&registry);
///
/// let list = TypeDescriptor::new("std::__cxx11::list<int, std::allocator<int> >", 24);
/// assert_eq!(classifier.classify(&list), ContainerKind::LinkedList);
/// assert_eq!(classifier.classify(&TypeDescriptor::new("int", 4)), ContainerKind::Scalar);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct TypeClassifier<'r>
{
    aggregates: &'r AggregateRegistry,
}

impl<'r> TypeClassifier<'r>
{
    pub fn new(aggregates: &'r AggregateRegistry) -> Self
    {
        Self { aggregates }
    }

    pub fn classify(&self, ty: &TypeDescriptor) -> ContainerKind
    {
        let name = ty.name();

        if let Some((_, kind)) = CONTAINER_PATTERNS.iter().find(|(prefix, _)| name.starts_with(*prefix)) {
            return *kind;
        }

        match self.aggregates.find(name) {
            Some(id) => ContainerKind::NamedAggregate(id),
            None => ContainerKind::Scalar,
        }
    }
}
