//! Best-effort lookup of the terminal's foreground process name
//!
//! The foreground process group is read from the master with `tcgetpgrp`,
//! then its leader's name comes from a per-platform [`ProcessNameResolver`].
//! Every failure maps to `None`: the group may vanish between the two
//! lookups, and some platforms offer no way to resolve a name at all.

use nix::unistd::Pid;
use std::os::fd::{AsFd, AsRawFd};
use std::path::Path;

/// Resolves the display name of a process group leader.
pub trait ProcessNameResolver {
    fn resolve(&self, pgid: Pid) -> Option<String>;
}

/// Reads `/proc/<pid>/cmdline` and takes the first NUL-terminated token.
#[cfg(any(target_os = "linux", target_os = "android"))]
#[derive(Debug, Clone)]
pub struct ProcCmdline {
    proc_root: std::path::PathBuf,
}

#[cfg(any(target_os = "linux", target_os = "android"))]
impl ProcCmdline {
    /// Resolve against a process table mounted somewhere other than `/proc`.
    pub fn with_root(proc_root: impl Into<std::path::PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
        }
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
impl Default for ProcCmdline {
    fn default() -> Self {
        Self::with_root("/proc")
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
impl ProcessNameResolver for ProcCmdline {
    fn resolve(&self, pgid: Pid) -> Option<String> {
        let path = self
            .proc_root
            .join(pgid.as_raw().to_string())
            .join("cmdline");
        let cmdline = std::fs::read(path).ok()?;
        first_token(&cmdline)
    }
}

/// Asks the kernel process table for the command name via libproc.
#[cfg(any(target_os = "macos", target_os = "ios"))]
#[derive(Debug, Default, Clone, Copy)]
pub struct KernelProcTable;

#[cfg(any(target_os = "macos", target_os = "ios"))]
impl ProcessNameResolver for KernelProcTable {
    fn resolve(&self, pgid: Pid) -> Option<String> {
        // MAXCOMLEN is 16, but proc_name reports the longer p_name when set.
        let mut buf = [0u8; 256];
        let len = unsafe {
            libc::proc_name(
                pgid.as_raw(),
                buf.as_mut_ptr().cast::<libc::c_void>(),
                buf.len() as u32,
            )
        };
        if len <= 0 {
            return None;
        }
        first_token(&buf[..len as usize])
    }
}

/// Fallback for platforms without a supported process table.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unsupported;

impl ProcessNameResolver for Unsupported {
    fn resolve(&self, _pgid: Pid) -> Option<String> {
        None
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
pub type PlatformResolver = ProcCmdline;

#[cfg(any(target_os = "macos", target_os = "ios"))]
pub type PlatformResolver = KernelProcTable;

#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "macos",
    target_os = "ios"
)))]
pub type PlatformResolver = Unsupported;

/// Bytes up to the first NUL, or `None` if that prefix is empty.
fn first_token(bytes: &[u8]) -> Option<String> {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    if end == 0 {
        return None;
    }
    Some(String::from_utf8_lossy(&bytes[..end]).into_owned())
}

/// Foreground process group of the terminal behind `fd`, if it has one.
pub fn foreground_pgid<Fd: AsFd>(fd: Fd) -> Option<Pid> {
    let pgid = unsafe { libc::tcgetpgrp(fd.as_fd().as_raw_fd()) };
    (pgid > 0).then(|| Pid::from_raw(pgid))
}

/// Name of the process leading the terminal's foreground group.
///
/// `device_path` names the slave device; it is only used for diagnostics
/// here since the group is read from the master itself.
pub fn foreground_process_name<Fd: AsFd>(fd: Fd, device_path: &Path) -> Option<String> {
    foreground_process_name_with(&PlatformResolver::default(), fd, device_path)
}

/// Same as [`foreground_process_name`] with an explicit resolver.
pub fn foreground_process_name_with<R, Fd>(resolver: &R, fd: Fd, device_path: &Path) -> Option<String>
where
    R: ProcessNameResolver + ?Sized,
    Fd: AsFd,
{
    let Some(pgid) = foreground_pgid(fd) else {
        tracing::trace!(device = %device_path.display(), "no foreground process group");
        return None;
    };
    let name = resolver.resolve(pgid);
    tracing::trace!(device = %device_path.display(), %pgid, ?name, "resolved foreground process");
    name
}
