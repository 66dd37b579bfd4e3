//! # Linux backend
//!
//! Process control through `ptrace(2)` and `/proc`.
//!
//! [`LinuxInferior::attach`] stops every thread of the target, which is the
//! state size queries expect: nothing moves while container internals are
//! read. The process stays halted until the inferior is detached or dropped.
//!
//! On x86-64 the inferior is also a [`TraceTarget`](crate::tracer::TraceTarget)
//! that places `int3` breakpoints on function symbols (see `trace.rs`).
//!
//! ## References
//!
//! - [ptrace(2)](https://man7.org/linux/man-pages/man2/ptrace.2.html)
//! - [proc_pid_maps(5)](https://man7.org/linux/man-pages/man5/proc_pid_maps.5.html)
//! - [process_vm_readv(2)](https://man7.org/linux/man-pages/man2/process_vm_readv.2.html)

mod memory;
mod ptrace;
#[cfg(target_arch = "x86_64")]
mod trace;

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use libc::{c_int, pid_t};
use tracing::{debug, info, warn};

use crate::breakpoints::BreakpointStore;
use crate::error::{BallastError, Result};
use crate::memory::MemoryReader;
use crate::session::Inferior;
use crate::symbols::{BinaryImage, DwarfTypes, ImageSet};
use crate::types::{Address, MemoryRegion, ProcessId, ThreadId};

/// A ptrace-attached Linux process.
pub struct LinuxInferior
{
    pid: ProcessId,
    /// Every traced thread.
    threads: BTreeSet<pid_t>,
    /// Threads currently in a ptrace stop.
    stopped: BTreeSet<pid_t>,
    /// Cloned threads whose initial `SIGSTOP` has not been seen yet.
    fresh: BTreeSet<pid_t>,
    /// Signals to deliver when a thread is next resumed.
    pending: HashMap<pid_t, c_int>,
    regions: Vec<MemoryRegion>,
    images: ImageSet,
    breakpoints: BreakpointStore,
    /// Thread whose program counter sits on a breakpoint it has not executed.
    parked: Option<(pid_t, Address)>,
    attached: bool,
}

impl LinuxInferior
{
    /// Attach to every thread of `pid` and wait until all of them are stopped.
    ///
    /// ## Errors
    ///
    /// - `ProcessNotFound`: no such process
    /// - `PermissionDenied`: ptrace refused (Yama scope, other user, already traced)
    pub fn attach(pid: ProcessId) -> Result<Self>
    {
        let leader = pid.0 as pid_t;
        if fs::metadata(format!("/proc/{leader}")).is_err() {
            return Err(BallastError::ProcessNotFound(pid.0));
        }

        let mut inferior = Self {
            pid,
            threads: BTreeSet::new(),
            stopped: BTreeSet::new(),
            fresh: BTreeSet::new(),
            pending: HashMap::new(),
            regions: Vec::new(),
            images: ImageSet::default(),
            breakpoints: BreakpointStore::new(),
            parked: None,
            attached: false,
        };

        // Threads can be created while we attach; repeat until the list is stable.
        loop {
            let mut added = false;
            for tid in task_ids(leader)? {
                if inferior.threads.contains(&tid) {
                    continue;
                }
                match ptrace::attach(tid) {
                    Ok(()) => {}
                    Err(BallastError::ProcessNotFound(_)) if tid != leader => {
                        debug!("Thread {} exited before it could be attached", tid);
                        continue;
                    }
                    Err(err) => {
                        // Leave the threads attached so far as we found them.
                        inferior.detach_threads();
                        return Err(err);
                    }
                }
                inferior.threads.insert(tid);
                inferior.attached = true;
                inferior.wait_for_attach_stop(tid)?;
                added = true;
            }
            if !added {
                break;
            }
        }

        for &tid in &inferior.threads {
            ptrace::set_options(tid, libc::PTRACE_O_TRACECLONE)?;
        }

        inferior.refresh_regions()?;
        inferior.images = ImageSet::from_regions(&inferior.regions);

        info!("Attached to process {} ({} threads)", pid, inferior.threads.len());
        Ok(inferior)
    }

    fn wait_for_attach_stop(&mut self, tid: pid_t) -> Result<()>
    {
        loop {
            let (_, status) = ptrace::wait(tid)?;
            if !libc::WIFSTOPPED(status) {
                return Err(BallastError::AttachFailed(format!("thread {tid} exited while attaching")));
            }
            let signal = libc::WSTOPSIG(status);
            if signal == libc::SIGSTOP {
                self.stopped.insert(tid);
                return Ok(());
            }
            // Something else arrived first; keep it for later and wait for our stop.
            self.pending.insert(tid, signal);
            ptrace::cont(tid, 0)?;
        }
    }

    pub fn pid(&self) -> ProcessId
    {
        self.pid
    }

    fn leader(&self) -> pid_t
    {
        self.pid.0 as pid_t
    }

    pub fn is_attached(&self) -> bool
    {
        self.attached
    }

    fn ensure_attached(&self) -> Result<()>
    {
        if self.attached {
            Ok(())
        } else {
            Err(BallastError::NotAttached)
        }
    }

    pub fn threads(&self) -> Vec<ThreadId>
    {
        self.threads.iter().map(|&tid| ThreadId::from(tid as u64)).collect()
    }

    pub fn regions(&self) -> &[MemoryRegion]
    {
        &self.regions
    }

    /// Re-read `/proc/<pid>/maps`.
    pub fn refresh_regions(&mut self) -> Result<()>
    {
        self.ensure_attached()?;
        self.regions = memory::read_maps(self.leader())?;
        debug!("Process {} has {} mappings", self.pid, self.regions.len());
        Ok(())
    }

    pub fn images(&self) -> &ImageSet
    {
        &self.images
    }

    /// Path of the main executable.
    pub fn executable_path(&self) -> Result<PathBuf>
    {
        Ok(fs::read_link(format!("/proc/{}/exe", self.pid))?)
    }

    /// The mapped image of the main executable, with its load bias applied.
    pub fn main_image(&self) -> Result<Arc<BinaryImage>>
    {
        let path = self.executable_path()?;
        self.images
            .find(&path)
            .ok_or_else(|| BallastError::AttachFailed(format!("{} is not mapped", path.display())))
    }

    /// Type information for the main executable.
    pub fn main_types(&self) -> Result<DwarfTypes>
    {
        Ok(DwarfTypes::new(self.main_image()?))
    }

    /// Restore patched code and let every thread go.
    pub fn detach(&mut self) -> Result<()>
    {
        if !self.attached {
            return Ok(());
        }
        #[cfg(target_arch = "x86_64")]
        self.halt_and_restore()?;
        self.detach_threads();
        info!("Detached from process {}", self.pid);
        Ok(())
    }

    fn detach_threads(&mut self)
    {
        for tid in std::mem::take(&mut self.threads) {
            let signal = self.pending.remove(&tid).unwrap_or(0);
            if let Err(err) = ptrace::detach(tid, signal) {
                warn!("Failed to detach thread {}: {}", tid, err);
            }
        }
        self.stopped.clear();
        self.fresh.clear();
        self.parked = None;
        self.attached = false;
    }
}

impl MemoryReader for LinuxInferior
{
    fn read_bytes(&self, address: Address, len: usize) -> Result<Vec<u8>>
    {
        self.ensure_attached()?;
        memory::read_remote(self.leader(), address, len)
    }
}

impl Inferior for LinuxInferior
{
    #[cfg(target_arch = "x86_64")]
    fn trace_target(&mut self) -> Option<&mut dyn crate::tracer::TraceTarget>
    {
        Some(self)
    }
}

impl Drop for LinuxInferior
{
    fn drop(&mut self)
    {
        if let Err(err) = self.detach() {
            warn!("Failed to detach from process {}: {}", self.pid, err);
            self.detach_threads();
        }
    }
}

fn task_ids(pid: pid_t) -> Result<Vec<pid_t>>
{
    let entries = fs::read_dir(format!("/proc/{pid}/task")).map_err(|_| BallastError::ProcessNotFound(pid as u32))?;
    let mut tids = Vec::new();
    for entry in entries {
        let entry = entry?;
        if let Some(tid) = entry.file_name().to_str().and_then(|name| name.parse().ok()) {
            tids.push(tid);
        }
    }
    // Leader first so a missing process is reported as such.
    tids.sort_unstable_by_key(|&tid| (tid != pid, tid));
    Ok(tids)
}
