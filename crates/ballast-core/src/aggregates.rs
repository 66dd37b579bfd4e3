//! # Named aggregates
//!
//! Application classes that are sized by a fixed formula instead of by
//! walking their fields generically.
//!
//! An aggregate is a list of [`FieldRule`]s whose contributions are summed.
//! Rules refer to members by name and to other types by name; nothing here
//! touches memory. The engine evaluates the rules (see
//! [`SizeCalculator`](crate::SizeCalculator)), so adding an aggregate is a
//! data change only.

use std::collections::HashMap;
use std::fmt;

use crate::error::{BallastError, Result};

/// Width of `int` in the aggregate formulas.
pub const SIZE_OF_INT: u64 = 4;
/// Width of `bool`.
pub const SIZE_OF_BOOL: u64 = 1;
/// Width of `int64_t`.
pub const SIZE_OF_INT64: u64 = 8;
/// Width of `uint256`.
pub const SIZE_OF_UINT256: u64 = 32;

/// Index of an aggregate inside its [`AggregateRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AggregateId(usize);

impl AggregateId
{
    pub fn index(self) -> usize
    {
        self.0
    }
}

/// One term of an aggregate's size formula.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldRule
{
    /// The whole object reinterpreted as the named base type.
    Base(String),
    /// A member sized as the named type rather than its declared one.
    Typed
    {
        field: String,
        type_name: String,
    },
    /// A member sized by its declared type.
    Field(String),
    /// A constant number of bytes.
    Fixed(u64),
}

/// A named aggregate and its size formula.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateSpec
{
    name: String,
    rules: Vec<FieldRule>,
}

impl AggregateSpec
{
    pub fn new(name: impl Into<String>) -> Self
    {
        Self {
            name: name.into(),
            rules: Vec::new(),
        }
    }

    #[must_use]
    pub fn base(mut self, type_name: impl Into<String>) -> Self
    {
        self.rules.push(FieldRule::Base(type_name.into()));
        self
    }

    #[must_use]
    pub fn typed(mut self, field: impl Into<String>, type_name: impl Into<String>) -> Self
    {
        self.rules.push(FieldRule::Typed {
            field: field.into(),
            type_name: type_name.into(),
        });
        self
    }

    #[must_use]
    pub fn field(mut self, field: impl Into<String>) -> Self
    {
        self.rules.push(FieldRule::Field(field.into()));
        self
    }

    #[must_use]
    pub fn fixed(mut self, bytes: u64) -> Self
    {
        self.rules.push(FieldRule::Fixed(bytes));
        self
    }

    pub fn name(&self) -> &str
    {
        &self.name
    }

    pub fn rules(&self) -> &[FieldRule]
    {
        &self.rules
    }

    fn bases(&self) -> impl Iterator<Item = &str>
    {
        self.rules.iter().filter_map(|rule| match rule {
            FieldRule::Base(name) => Some(name.as_str()),
            FieldRule::Typed { type_name, .. } => Some(type_name.as_str()),
            _ => None,
        })
    }
}

impl fmt::Display for AggregateSpec
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{} ({} rules)", self.name, self.rules.len())
    }
}

/// The set of aggregates the classifier recognizes, keyed by exact type name.
#[derive(Debug, Clone, Default)]
pub struct AggregateRegistry
{
    specs: Vec<AggregateSpec>,
    by_name: HashMap<String, AggregateId>,
}

impl AggregateRegistry
{
    /// An empty registry.
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Add an aggregate.
    ///
    /// Rejects duplicate names and formulas that would size an aggregate in
    /// terms of itself, directly or through other registered aggregates.
    ///
    /// ```rust
    /// use ballast_core::aggregates::{AggregateRegistry, AggregateSpec};
    ///
    /// let mut registry = AggregateRegistry::new();
    /// registry.register(AggregateSpec::new("Outer").typed("inner", "Inner").fixed(4)).unwrap();
    /// assert!(registry.register(AggregateSpec::new("Inner").base("Outer")).is_err());
    /// assert!(registry.find("Outer").is_some());
    /// ```
    pub fn register(&mut self, spec: AggregateSpec) -> Result<AggregateId>
    {
        if self.by_name.contains_key(spec.name()) {
            return Err(BallastError::InvalidArgument(format!(
                "aggregate `{}` is already registered",
                spec.name()
            )));
        }

        if self.reaches(&spec, spec.name()) {
            return Err(BallastError::InvalidArgument(format!(
                "aggregate `{}` is sized in terms of itself",
                spec.name()
            )));
        }

        Ok(self.insert(spec))
    }

    /// Look up an aggregate by exact type name.
    pub fn find(&self, name: &str) -> Option<AggregateId>
    {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, id: AggregateId) -> Option<&AggregateSpec>
    {
        self.specs.get(id.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AggregateSpec>
    {
        self.specs.iter()
    }

    pub fn len(&self) -> usize
    {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.specs.is_empty()
    }

    /// Registry with the masternode manager classes.
    pub fn masternode() -> Self
    {
        let mut registry = Self::new();
        for spec in masternode_specs() {
            registry.insert(spec);
        }
        registry
    }

    fn insert(&mut self, spec: AggregateSpec) -> AggregateId
    {
        let id = AggregateId(self.specs.len());
        self.by_name.insert(spec.name().to_string(), id);
        self.specs.push(spec);
        id
    }

    /// Whether any type `spec` is sized as leads back to `target`.
    fn reaches(&self, spec: &AggregateSpec, target: &str) -> bool
    {
        let mut pending: Vec<&str> = spec.bases().collect();
        let mut seen: Vec<&str> = Vec::new();

        while let Some(name) = pending.pop() {
            if name == target {
                return true;
            }
            if seen.contains(&name) {
                continue;
            }
            seen.push(name);
            if let Some(next) = self.find(name).and_then(|id| self.get(id)) {
                pending.extend(next.bases());
            }
        }
        false
    }
}

fn masternode_specs() -> Vec<AggregateSpec>
{
    vec![
        AggregateSpec::new("CMasternode")
            .base("masternode_info_t")
            .typed("lastPing", "CMasternodePing")
            .field("vchSig")
            .fixed(4 * SIZE_OF_INT + 2 * SIZE_OF_BOOL)
            .field("mapGovernanceObjectsVotedOn"),
        AggregateSpec::new("CMasternodeVerification")
            .typed("vin1", "CTxIn")
            .typed("vin2", "CTxIn")
            .typed("addr", "CService")
            .fixed(2 * SIZE_OF_INT)
            .field("vchSig1")
            .field("vchSig2"),
        AggregateSpec::new("CMasternodeBroadcast")
            .base("CMasternode")
            .fixed(SIZE_OF_BOOL),
        AggregateSpec::new("CMasternodeIndex")
            .fixed(SIZE_OF_INT)
            .field("mapIndex")
            .field("mapReverseIndex"),
        AggregateSpec::new("CMasternodePing")
            .typed("vin", "CTxIn")
            .fixed(SIZE_OF_UINT256)
            .fixed(SIZE_OF_INT64)
            .field("vchSig")
            .fixed(SIZE_OF_BOOL)
            .fixed(SIZE_OF_INT),
        AggregateSpec::new("CMasternodeMan")
            .typed("cs", "CCriticalSection")
            .fixed(SIZE_OF_INT)
            .field("vMasternodes")
            .field("mAskedUsForMasternodeList")
            .field("mWeAskedForMasternodeList")
            .field("mWeAskedForMasternodeListEntry")
            .field("mWeAskedForVerification")
            .field("mMnbRecoveryRequests")
            .field("mMnbRecoveryGoodReplies")
            .field("listScheduledMnbRequestConnections")
            .fixed(SIZE_OF_INT64)
            .fixed(3 * SIZE_OF_BOOL)
            .field("vecDirtyGovernanceObjectHashes")
            .fixed(SIZE_OF_INT64)
            .field("mapSeenMasternodeBroadcast")
            .field("mapSeenMasternodePing")
            .field("mapSeenMasternodeVerification")
            .fixed(SIZE_OF_INT64),
    ]
}
