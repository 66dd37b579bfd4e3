//! # Allocation tracer
//!
//! Follows the inspected process through its allocator entry points until it
//! starts to exit.
//!
//! The tracer installs a breakpoint on each configured symbol, then resumes the
//! target repeatedly. Every stop is appended to the trace log as the name of
//! the function the target stopped in. When that name contains the exit marker
//! (or the process is already gone), the tracer clears every breakpoint it set
//! and lets the target run to completion.
//!
//! The loop has no timeout: it ends only when the target exits or reaches the
//! exit marker.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::error::{BallastError, Result};

/// Symbols trapped by default: process exit and the glibc allocator.
pub const DEFAULT_TRACE_SYMBOLS: &[&str] = &["exit", "__libc_malloc", "__libc_free", "__libc_calloc", "__libc_realloc"];

/// Default trace log file.
pub const DEFAULT_TRACE_LOG: &str = "memlog.txt";

/// Why the target stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceStop
{
    /// Stopped at a breakpoint inside the named function.
    Frame(String),
    /// The process exited with the given status.
    Exited(i32),
}

/// A process that can be driven through breakpoints by symbol name.
pub trait TraceTarget
{
    /// Trap the entry of `symbol`.
    fn set_breakpoint(&mut self, symbol: &str) -> Result<()>;

    /// Remove the trap on `symbol` and restore the original instruction.
    fn clear_breakpoint(&mut self, symbol: &str) -> Result<()>;

    /// Resume the target and block until it stops or exits.
    fn resume_until_stop(&mut self) -> Result<TraceStop>;

    /// Resume the target and stop observing it.
    fn resume_to_completion(&mut self) -> Result<()>;
}

/// Settings for an allocation trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceConfig
{
    /// Functions to break on.
    pub symbols: Vec<String>,
    /// A stop in a function whose name contains this ends the trace.
    pub exit_marker: String,
    /// File that stop records are appended to.
    pub log_path: PathBuf,
}

impl Default for TraceConfig
{
    fn default() -> Self
    {
        Self {
            symbols: DEFAULT_TRACE_SYMBOLS.iter().map(|s| s.to_string()).collect(),
            exit_marker: "exit".to_string(),
            log_path: PathBuf::from(DEFAULT_TRACE_LOG),
        }
    }
}

/// What a finished trace saw.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceSummary
{
    /// Stops per function name, the final exit stop included.
    pub hits: BTreeMap<String, u64>,
    /// Exit status, if the process exited while being traced.
    pub exit_status: Option<i32>,
}

impl TraceSummary
{
    pub fn total_hits(&self) -> u64
    {
        self.hits.values().sum()
    }
}

/// Drives a [`TraceTarget`] through the allocation trace loop.
#[derive(Debug, Clone, Default)]
pub struct AllocationTracer
{
    config: TraceConfig,
}

impl AllocationTracer
{
    pub fn new(config: TraceConfig) -> Self
    {
        Self { config }
    }

    pub fn config(&self) -> &TraceConfig
    {
        &self.config
    }

    /// Run the trace, appending stop records to the configured log file.
    pub fn run(&self, target: &mut dyn TraceTarget) -> Result<TraceSummary>
    {
        let mut log = OpenOptions::new().create(true).append(true).open(&self.config.log_path)?;
        info!("Tracing allocations into {}", self.config.log_path.display());
        self.run_with_log(target, &mut log)
    }

    /// Run the trace, writing one line per stop to `log`.
    pub fn run_with_log(&self, target: &mut dyn TraceTarget, log: &mut dyn Write) -> Result<TraceSummary>
    {
        for symbol in &self.config.symbols {
            match target.set_breakpoint(symbol) {
                Ok(()) => {}
                // A symbol the target does not define is left pending, not fatal.
                Err(BallastError::InvalidArgument(reason)) => warn!("Not tracing {}: {}", symbol, reason),
                Err(err) => return Err(err),
            }
        }

        let mut summary = TraceSummary::default();
        let result = self.trace_loop(target, log, &mut summary);

        // Breakpoints come out even when the loop failed.
        for symbol in &self.config.symbols {
            if let Err(err) = target.clear_breakpoint(symbol) {
                warn!("Failed to clear breakpoint on {}: {}", symbol, err);
            }
        }
        result?;

        if summary.exit_status.is_none() {
            target.resume_to_completion()?;
        }
        log.flush()?;

        info!("Trace finished after {} stops", summary.total_hits());
        Ok(summary)
    }

    fn trace_loop(&self, target: &mut dyn TraceTarget, log: &mut dyn Write, summary: &mut TraceSummary) -> Result<()>
    {
        loop {
            match target.resume_until_stop()? {
                TraceStop::Exited(status) => {
                    debug!("Target exited with status {}", status);
                    summary.exit_status = Some(status);
                    return Ok(());
                }
                TraceStop::Frame(name) => {
                    writeln!(log, "{name}")?;
                    *summary.hits.entry(name.clone()).or_insert(0) += 1;
                    if name.contains(&self.config.exit_marker) {
                        debug!("Reached {}, ending trace", name);
                        writeln!(log)?;
                        return Ok(());
                    }
                }
            }
        }
    }
}
