//! # ptrace wrappers
//!
//! Thin, checked wrappers around the `ptrace(2)` requests the backend uses.
//! Every call clears `errno` first because `PTRACE_PEEKDATA` legitimately
//! returns `-1` for a word whose bits are all set.
//!
//! ## References
//!
//! - [ptrace(2) man page](https://man7.org/linux/man-pages/man2/ptrace.2.html)
//! - [waitpid(2) man page](https://man7.org/linux/man-pages/man2/waitpid.2.html)

use std::io;
use std::ptr;

use libc::{c_int, c_long, c_void, pid_t};

use crate::error::{BallastError, Result};

#[cfg(target_env = "gnu")]
type PtraceRequest = libc::c_uint;
#[cfg(not(target_env = "gnu"))]
type PtraceRequest = libc::c_int;

fn request(op: PtraceRequest, operation: &'static str, tid: pid_t, addr: *mut c_void, data: *mut c_void)
    -> Result<c_long>
{
    // SAFETY: errno is thread-local; ptrace only reads or writes `data` for
    // the requests that take a buffer, and callers pass a valid one.
    let ret = unsafe {
        *libc::__errno_location() = 0;
        libc::ptrace(op, tid, addr, data)
    };
    if ret == -1 {
        let err = io::Error::last_os_error();
        if err.raw_os_error().unwrap_or(0) != 0 {
            return Err(classify(operation, tid, err));
        }
    }
    Ok(ret)
}

/// Map the errno values with a dedicated error variant.
fn classify(operation: &'static str, tid: pid_t, err: io::Error) -> BallastError
{
    match err.raw_os_error() {
        Some(libc::ESRCH) if operation == "PTRACE_ATTACH" => BallastError::ProcessNotFound(tid as u32),
        Some(libc::EPERM) if operation == "PTRACE_ATTACH" => BallastError::PermissionDenied(format!(
            "cannot trace thread {tid}; check /proc/sys/kernel/yama/ptrace_scope or run as the target's owner"
        )),
        _ => BallastError::Ptrace { operation, source: err },
    }
}

pub(super) fn attach(tid: pid_t) -> Result<()>
{
    request(libc::PTRACE_ATTACH, "PTRACE_ATTACH", tid, ptr::null_mut(), ptr::null_mut()).map(drop)
}

pub(super) fn detach(tid: pid_t, signal: c_int) -> Result<()>
{
    request(libc::PTRACE_DETACH, "PTRACE_DETACH", tid, ptr::null_mut(), signal as usize as *mut c_void).map(drop)
}

pub(super) fn cont(tid: pid_t, signal: c_int) -> Result<()>
{
    request(libc::PTRACE_CONT, "PTRACE_CONT", tid, ptr::null_mut(), signal as usize as *mut c_void).map(drop)
}

pub(super) fn set_options(tid: pid_t, options: c_int) -> Result<()>
{
    request(
        libc::PTRACE_SETOPTIONS,
        "PTRACE_SETOPTIONS",
        tid,
        ptr::null_mut(),
        options as usize as *mut c_void,
    )
    .map(drop)
}

pub(super) fn event_message(tid: pid_t) -> Result<u64>
{
    let mut message: libc::c_ulong = 0;
    request(
        libc::PTRACE_GETEVENTMSG,
        "PTRACE_GETEVENTMSG",
        tid,
        ptr::null_mut(),
        ptr::addr_of_mut!(message).cast(),
    )?;
    Ok(u64::from(message))
}

#[cfg(target_arch = "x86_64")]
pub(super) fn single_step(tid: pid_t) -> Result<()>
{
    request(libc::PTRACE_SINGLESTEP, "PTRACE_SINGLESTEP", tid, ptr::null_mut(), ptr::null_mut()).map(drop)
}

#[cfg(target_arch = "x86_64")]
pub(super) fn peek_word(tid: pid_t, address: u64) -> Result<u64>
{
    let word = request(
        libc::PTRACE_PEEKDATA,
        "PTRACE_PEEKDATA",
        tid,
        address as usize as *mut c_void,
        ptr::null_mut(),
    )?;
    Ok(word as u64)
}

#[cfg(target_arch = "x86_64")]
pub(super) fn poke_word(tid: pid_t, address: u64, word: u64) -> Result<()>
{
    request(
        libc::PTRACE_POKEDATA,
        "PTRACE_POKEDATA",
        tid,
        address as usize as *mut c_void,
        word as usize as *mut c_void,
    )
    .map(drop)
}

#[cfg(target_arch = "x86_64")]
pub(super) fn get_registers(tid: pid_t) -> Result<libc::user_regs_struct>
{
    // SAFETY: user_regs_struct is plain old data; all-zero is a valid value.
    let mut regs: libc::user_regs_struct = unsafe { std::mem::zeroed() };
    request(
        libc::PTRACE_GETREGS,
        "PTRACE_GETREGS",
        tid,
        ptr::null_mut(),
        ptr::addr_of_mut!(regs).cast(),
    )?;
    Ok(regs)
}

#[cfg(target_arch = "x86_64")]
pub(super) fn set_registers(tid: pid_t, regs: &libc::user_regs_struct) -> Result<()>
{
    request(
        libc::PTRACE_SETREGS,
        "PTRACE_SETREGS",
        tid,
        ptr::null_mut(),
        ptr::from_ref(regs).cast_mut().cast(),
    )
    .map(drop)
}

/// Block until `tid` (or any traced thread, for `-1`) changes state.
pub(super) fn wait(tid: pid_t) -> Result<(pid_t, c_int)>
{
    let mut status: c_int = 0;
    loop {
        // SAFETY: `status` outlives the call.
        let waited = unsafe { libc::waitpid(tid, &mut status, libc::__WALL) };
        if waited >= 0 {
            return Ok((waited, status));
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(BallastError::Ptrace {
                operation: "waitpid",
                source: err,
            });
        }
    }
}

/// Send `signal` to one thread of `pid`.
pub(super) fn signal_thread(pid: pid_t, tid: pid_t, signal: c_int) -> Result<()>
{
    // SAFETY: tgkill takes plain integers.
    let ret = unsafe { libc::syscall(libc::SYS_tgkill, pid, tid, signal) };
    if ret == -1 {
        return Err(BallastError::Ptrace {
            operation: "tgkill",
            source: io::Error::last_os_error(),
        });
    }
    Ok(())
}
