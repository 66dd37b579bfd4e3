//! x86-64 software breakpoints for the allocation tracer.
//!
//! A breakpoint replaces the first byte of a function with `int3` (`0xcc`).
//! When a thread traps, its `rip` is one past the patched byte; it is rewound
//! and the thread is left "parked" on the breakpoint. The next resume restores
//! the original byte, single-steps that one instruction, re-arms the trap and
//! only then lets every thread run.
//!
//! Only the thread that trapped is stopped while a stop is reported; other
//! threads keep running. Before detaching, every thread is stopped with
//! `SIGSTOP` so memory can be restored and ptrace can let go.

use libc::{c_int, pid_t};
use tracing::{debug, trace, warn};

use super::{ptrace, LinuxInferior};
use crate::error::{BallastError, Result};
use crate::tracer::{TraceStop, TraceTarget};
use crate::types::Address;

const INT3: u64 = 0xcc;

/// Event number carried in bits 16..24 of a ptrace stop status.
fn ptrace_event(status: c_int) -> c_int
{
    (status >> 16) & 0xff
}

fn exit_code(status: c_int) -> i32
{
    if libc::WIFEXITED(status) {
        libc::WEXITSTATUS(status)
    } else {
        128 + libc::WTERMSIG(status)
    }
}

impl LinuxInferior
{
    /// Any stopped thread can be used to patch the shared address space.
    fn patch_thread(&self) -> Result<pid_t>
    {
        self.stopped.iter().next().copied().ok_or(BallastError::NotAttached)
    }

    fn write_byte(&self, address: Address, byte: u8) -> Result<u8>
    {
        let tid = self.patch_thread()?;
        let word = ptrace::peek_word(tid, address.value())?;
        ptrace::poke_word(tid, address.value(), (word & !0xff) | u64::from(byte))?;
        Ok(word as u8)
    }

    /// Execute the instruction under a parked breakpoint with the trap lifted.
    ///
    /// Returns the exit status if the process ended during the step.
    fn step_over_parked(&mut self) -> Result<Option<i32>>
    {
        let Some((tid, address)) = self.parked.take() else {
            return Ok(None);
        };
        let Some(original) = self.breakpoints.at_address(address).map(|bp| bp.original_byte) else {
            return Ok(None);
        };

        self.write_byte(address, original)?;
        ptrace::single_step(tid)?;
        let (_, status) = ptrace::wait(tid)?;
        if !libc::WIFSTOPPED(status) {
            return Ok(self.thread_gone(tid, status));
        }
        // The step may have been interrupted by a signal; hand it back later.
        let signal = libc::WSTOPSIG(status);
        if signal != libc::SIGTRAP {
            self.pending.insert(tid, signal);
        }
        self.write_byte(address, INT3 as u8)?;
        Ok(None)
    }

    /// Forget a thread that exited. Returns the status if it was the leader.
    fn thread_gone(&mut self, tid: pid_t, status: c_int) -> Option<i32>
    {
        self.threads.remove(&tid);
        self.stopped.remove(&tid);
        self.fresh.remove(&tid);
        self.pending.remove(&tid);
        if tid != self.leader() {
            trace!("Thread {} exited", tid);
            return None;
        }

        let code = exit_code(status);
        // A dead process has no code left to restore.
        self.breakpoints.drain();
        self.threads.clear();
        self.stopped.clear();
        self.parked = None;
        self.attached = false;
        Some(code)
    }

    fn resume_stopped(&mut self) -> Result<()>
    {
        for tid in std::mem::take(&mut self.stopped) {
            let signal = self.pending.remove(&tid).unwrap_or(0);
            ptrace::cont(tid, signal)?;
        }
        Ok(())
    }

    /// Stop every running thread, restore every patched byte and rewind any
    /// thread caught on a trap.
    pub(super) fn halt_and_restore(&mut self) -> Result<()>
    {
        self.parked = None;
        let originals = self.breakpoints.drain();

        let running: Vec<pid_t> = self.threads.difference(&self.stopped).copied().collect();
        if running.is_empty() && originals.is_empty() {
            return Ok(());
        }

        let mut restored = false;
        if !self.stopped.is_empty() {
            for bp in &originals {
                self.write_byte(bp.address, bp.original_byte)?;
            }
            restored = true;
        }

        for &tid in &running {
            if let Err(err) = ptrace::signal_thread(self.leader(), tid, libc::SIGSTOP) {
                debug!("Could not stop thread {}: {}", tid, err);
            }
        }

        let mut waiting: Vec<pid_t> = running;
        while !waiting.is_empty() {
            let (tid, status) = ptrace::wait(-1)?;
            if !libc::WIFSTOPPED(status) {
                waiting.retain(|&t| t != tid);
                if self.thread_gone(tid, status).is_some() {
                    return Ok(());
                }
                continue;
            }

            let signal = libc::WSTOPSIG(status);
            if signal == libc::SIGSTOP {
                waiting.retain(|&t| t != tid);
                self.fresh.remove(&tid);
                self.threads.insert(tid);
                self.stopped.insert(tid);
                if !restored {
                    for bp in &originals {
                        self.write_byte(bp.address, bp.original_byte)?;
                    }
                    restored = true;
                }
                continue;
            }

            if signal == libc::SIGTRAP && ptrace_event(status) == libc::PTRACE_EVENT_CLONE {
                let child = ptrace::event_message(tid)? as pid_t;
                self.threads.insert(child);
                waiting.push(child);
                ptrace::cont(tid, 0)?;
                continue;
            }

            if signal == libc::SIGTRAP {
                let mut regs = ptrace::get_registers(tid)?;
                let trapped_at = Address::from(regs.rip.wrapping_sub(1));
                if self.breakpoints.was_retired(trapped_at) {
                    regs.rip = trapped_at.value();
                    ptrace::set_registers(tid, &regs)?;
                    // Our SIGSTOP is still queued; let the thread run into it.
                    ptrace::cont(tid, 0)?;
                    continue;
                }
            }

            ptrace::cont(tid, signal)?;
        }

        if !restored && !originals.is_empty() {
            warn!("No thread stopped; {} breakpoints left in place", originals.len());
        }
        Ok(())
    }
}

impl TraceTarget for LinuxInferior
{
    fn set_breakpoint(&mut self, symbol: &str) -> Result<()>
    {
        self.ensure_attached()?;
        if self.breakpoints.for_symbol(symbol).is_some() {
            return Ok(());
        }

        let address = self
            .images
            .resolve(symbol)
            .ok_or_else(|| BallastError::InvalidArgument(format!("no function named `{symbol}` in any mapped image")))?;

        if let Some(existing) = self.breakpoints.at_address(address) {
            debug!("{} is an alias of {} at {}", symbol, existing.symbol, address);
            return Ok(());
        }

        let original = self.write_byte(address, INT3 as u8)?;
        self.breakpoints.insert(symbol, address, original);
        debug!("Breakpoint on {} at {}", symbol, address);
        Ok(())
    }

    fn clear_breakpoint(&mut self, symbol: &str) -> Result<()>
    {
        if !self.attached {
            return Ok(());
        }
        let Some(bp) = self.breakpoints.remove_symbol(symbol) else {
            return Ok(());
        };
        if self.parked.is_some_and(|(_, address)| address == bp.address) {
            self.parked = None;
        }
        self.write_byte(bp.address, bp.original_byte)?;
        debug!("Cleared breakpoint on {} ({} hits)", symbol, bp.hit_count);
        Ok(())
    }

    fn resume_until_stop(&mut self) -> Result<TraceStop>
    {
        self.ensure_attached()?;
        if let Some(code) = self.step_over_parked()? {
            return Ok(TraceStop::Exited(code));
        }
        self.resume_stopped()?;

        loop {
            let (tid, status) = ptrace::wait(-1)?;

            if !libc::WIFSTOPPED(status) {
                if let Some(code) = self.thread_gone(tid, status) {
                    return Ok(TraceStop::Exited(code));
                }
                continue;
            }

            let signal = libc::WSTOPSIG(status);

            if !self.threads.contains(&tid) {
                // A new thread can report its initial stop before the clone event.
                self.threads.insert(tid);
                ptrace::cont(tid, 0)?;
                continue;
            }

            if signal == libc::SIGTRAP && ptrace_event(status) == libc::PTRACE_EVENT_CLONE {
                let child = ptrace::event_message(tid)? as pid_t;
                trace!("Thread {} cloned {}", tid, child);
                if self.threads.insert(child) {
                    self.fresh.insert(child);
                }
                ptrace::cont(tid, 0)?;
                continue;
            }

            if signal == libc::SIGTRAP {
                let mut regs = ptrace::get_registers(tid)?;
                let trapped_at = Address::from(regs.rip.wrapping_sub(1));
                if let Some(symbol) = self.breakpoints.record_hit(trapped_at).map(|bp| bp.symbol.clone()) {
                    regs.rip = trapped_at.value();
                    ptrace::set_registers(tid, &regs)?;
                    self.stopped.insert(tid);
                    self.parked = Some((tid, trapped_at));
                    trace!("Thread {} stopped in {}", tid, symbol);
                    return Ok(TraceStop::Frame(symbol));
                }
                if self.breakpoints.was_retired(trapped_at) {
                    // Trapped just before the breakpoint was cleared.
                    regs.rip = trapped_at.value();
                    ptrace::set_registers(tid, &regs)?;
                    ptrace::cont(tid, 0)?;
                    continue;
                }
            }

            if signal == libc::SIGSTOP && self.fresh.remove(&tid) {
                ptrace::cont(tid, 0)?;
                continue;
            }

            ptrace::cont(tid, signal)?;
        }
    }

    fn resume_to_completion(&mut self) -> Result<()>
    {
        self.detach()
    }
}
