//! # Linux memory access
//!
//! Reads go through `process_vm_readv(2)`, which copies straight from the
//! target's address space without a round trip per word. Kernels that refuse
//! it (some container sandboxes) still allow `/proc/<pid>/mem` for a tracer, so
//! that is the fallback.
//!
//! Memory maps come from `/proc/<pid>/maps`.

use std::fs::{self, File};
use std::io;
use std::os::unix::fs::FileExt;

use libc::{c_void, iovec, pid_t};
use tracing::trace;

use crate::error::{BallastError, Result};
use crate::types::{Address, MemoryRegion};

pub(super) fn read_remote(pid: pid_t, address: Address, len: usize) -> Result<Vec<u8>>
{
    if len == 0 {
        return Ok(Vec::new());
    }

    let mut buffer = vec![0u8; len];
    let local = iovec {
        iov_base: buffer.as_mut_ptr().cast::<c_void>(),
        iov_len: len,
    };
    let remote = iovec {
        iov_base: address.value() as usize as *mut c_void,
        iov_len: len,
    };

    // SAFETY: `local` describes `buffer`, which lives until after the call.
    let copied = unsafe { libc::process_vm_readv(pid, &local, 1, &remote, 1, 0) };
    if copied < 0 {
        let err = io::Error::last_os_error();
        return match err.raw_os_error() {
            Some(libc::EPERM | libc::ENOSYS) => {
                trace!("process_vm_readv refused ({}), falling back to /proc/{}/mem", err, pid);
                read_proc_mem(pid, address, len)
            }
            Some(libc::ESRCH) => Err(BallastError::ProcessNotFound(pid as u32)),
            _ => Err(BallastError::resolution(address, format!("cannot read {len} bytes: {err}"))),
        };
    }

    let copied = copied as usize;
    if copied < len {
        return Err(BallastError::resolution(
            address.checked_add(copied as u64).unwrap_or(address),
            "address is not mapped",
        ));
    }
    Ok(buffer)
}

fn read_proc_mem(pid: pid_t, address: Address, len: usize) -> Result<Vec<u8>>
{
    let file = File::open(format!("/proc/{pid}/mem"))?;
    let mut buffer = vec![0u8; len];
    file.read_exact_at(&mut buffer, address.value()).map_err(|err| {
        BallastError::resolution(address, format!("cannot read {len} bytes: {err}"))
    })?;
    Ok(buffer)
}

pub(super) fn read_maps(pid: pid_t) -> Result<Vec<MemoryRegion>>
{
    let maps = fs::read_to_string(format!("/proc/{pid}/maps")).map_err(|err| match err.kind() {
        io::ErrorKind::NotFound => BallastError::ProcessNotFound(pid as u32),
        _ => BallastError::Io(err),
    })?;
    Ok(maps.lines().filter_map(MemoryRegion::parse_maps_line).collect())
}
