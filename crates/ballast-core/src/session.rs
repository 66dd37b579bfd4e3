//! # Inspection session
//!
//! A [`Session`] bundles everything a command needs: the halted process, its
//! type information, the container layout table, the aggregate registry and a
//! small set of named variables that `usedsize` stores results in.

use std::collections::BTreeMap;

use tracing::info;

use crate::aggregates::AggregateRegistry;
use crate::error::{BallastError, Result};
use crate::eval::Evaluator;
use crate::layout::ContainerLayouts;
use crate::memory::MemoryReader;
use crate::resolver::TypeResolver;
use crate::size::SizeCalculator;
use crate::tracer::{AllocationTracer, TraceConfig, TraceSummary, TraceTarget};
use crate::types::{AddressExpression, TypeDescriptor};

/// A process being inspected.
///
/// Every inferior can be read; only some can also be traced.
pub trait Inferior: MemoryReader
{
    /// The process as a breakpoint target, when the backend supports it.
    fn trace_target(&mut self) -> Option<&mut dyn TraceTarget>
    {
        None
    }
}

/// Result of one size query.
#[derive(Debug, Clone)]
pub struct Measurement
{
    pub expression: AddressExpression,
    pub ty: TypeDescriptor,
    pub bytes: u64,
}

pub struct Session
{
    inferior: Box<dyn Inferior>,
    types: Box<dyn TypeResolver>,
    layouts: ContainerLayouts,
    aggregates: AggregateRegistry,
    trace_config: TraceConfig,
    variables: BTreeMap<String, u64>,
}

impl Session
{
    /// A session using the libstdc++ x86-64 layouts and the masternode aggregates.
    pub fn new(inferior: Box<dyn Inferior>, types: Box<dyn TypeResolver>) -> Self
    {
        Self {
            inferior,
            types,
            layouts: ContainerLayouts::default(),
            aggregates: AggregateRegistry::masternode(),
            trace_config: TraceConfig::default(),
            variables: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_layouts(mut self, layouts: ContainerLayouts) -> Self
    {
        self.layouts = layouts;
        self
    }

    #[must_use]
    pub fn with_aggregates(mut self, aggregates: AggregateRegistry) -> Self
    {
        self.aggregates = aggregates;
        self
    }

    #[must_use]
    pub fn with_trace_config(mut self, config: TraceConfig) -> Self
    {
        self.trace_config = config;
        self
    }

    pub fn layouts(&self) -> &ContainerLayouts
    {
        &self.layouts
    }

    pub fn aggregates(&self) -> &AggregateRegistry
    {
        &self.aggregates
    }

    pub fn trace_config(&self) -> &TraceConfig
    {
        &self.trace_config
    }

    pub fn calculator(&self) -> SizeCalculator<'_>
    {
        SizeCalculator::new(&self.inferior, &*self.types, &self.layouts, &self.aggregates)
    }

    pub fn evaluator(&self) -> Evaluator<'_>
    {
        Evaluator::new(&self.inferior, &*self.types)
    }

    /// Evaluate `text` and compute the used size of the value it names.
    pub fn measure(&self, text: &str) -> Result<Measurement>
    {
        let (expression, ty) = self.evaluator().evaluate(text)?;
        let bytes = self.calculator().used_size(&expression, &ty)?;
        Ok(Measurement { expression, ty, bytes })
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: u64)
    {
        self.variables.insert(name.into(), value);
    }

    pub fn variable(&self, name: &str) -> Option<u64>
    {
        self.variables.get(name).copied()
    }

    pub fn variables(&self) -> impl Iterator<Item = (&str, u64)>
    {
        self.variables.iter().map(|(name, value)| (name.as_str(), *value))
    }

    /// Run the allocation tracer with this session's trace settings.
    pub fn trace(&mut self) -> Result<TraceSummary>
    {
        let tracer = AllocationTracer::new(self.trace_config.clone());
        let target = self
            .inferior
            .trace_target()
            .ok_or_else(|| BallastError::InvalidArgument("this target cannot be traced".to_string()))?;
        let summary = tracer.run(target)?;
        info!("Traced {} allocator calls", summary.total_hits());
        Ok(summary)
    }
}
