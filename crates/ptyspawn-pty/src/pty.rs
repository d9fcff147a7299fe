//! Low-level PTY allocation
//!
//! Obtains a master/slave pair plus the slave's device path. The strategy is
//! picked per target at build time: Linux and Android use the two-step
//! `posix_openpt` sequence, other Unix systems use the combined `openpty`
//! call.

use crate::size::WindowSize;
use crate::PtyError;
use std::os::fd::OwnedFd;
use std::path::{Path, PathBuf};

/// Both ends of a freshly allocated pty.
///
/// Both descriptors are close-on-exec, so they never leak into programs
/// launched by unrelated spawns that run concurrently.
#[derive(Debug)]
pub struct PtyPair {
    pub master: OwnedFd,
    pub slave: OwnedFd,
    pub device_path: PathBuf,
}

impl PtyPair {
    pub fn device_path(&self) -> &Path {
        &self.device_path
    }
}

/// A way of obtaining a pty pair from the OS.
pub trait PtyAllocator {
    /// Allocate a pair and apply `size` to it before returning.
    fn open(&self, size: WindowSize) -> Result<PtyPair, PtyError>;
}

/// Two-step allocation: open the multiplexer, grant and unlock the slave,
/// resolve its path, then open it.
#[cfg(any(target_os = "linux", target_os = "android"))]
#[derive(Debug, Default, Clone, Copy)]
pub struct PosixOpenpt;

#[cfg(any(target_os = "linux", target_os = "android"))]
impl PtyAllocator for PosixOpenpt {
    fn open(&self, size: WindowSize) -> Result<PtyPair, PtyError> {
        use nix::fcntl::{open, OFlag};
        use nix::pty::{grantpt, posix_openpt, ptsname_r, unlockpt};
        use nix::sys::stat::Mode;
        use std::os::fd::{FromRawFd, IntoRawFd};

        let master = posix_openpt(OFlag::O_RDWR | OFlag::O_NOCTTY | OFlag::O_CLOEXEC)
            .map_err(|e| PtyError::allocation("posix_openpt", e))?;
        grantpt(&master).map_err(|e| PtyError::allocation("grantpt", e))?;
        unlockpt(&master).map_err(|e| PtyError::allocation("unlockpt", e))?;

        let device_path =
            PathBuf::from(ptsname_r(&master).map_err(|e| PtyError::allocation("ptsname", e))?);

        // PtyMaster closes on drop too, so ownership moves over before the
        // next fallible step.
        let master = unsafe { OwnedFd::from_raw_fd(master.into_raw_fd()) };

        let slave_fd = open(
            device_path.as_path(),
            OFlag::O_RDWR | OFlag::O_NOCTTY | OFlag::O_CLOEXEC,
            Mode::empty(),
        )
        .map_err(|e| PtyError::allocation("open slave", e))?;
        let slave = unsafe { OwnedFd::from_raw_fd(slave_fd) };

        size.apply(&master)?;

        Ok(PtyPair {
            master,
            slave,
            device_path,
        })
    }
}

/// Single-call allocation through `openpty`, with the slave path recovered
/// from `ttyname`.
#[cfg(not(any(target_os = "linux", target_os = "android")))]
#[derive(Debug, Default, Clone, Copy)]
pub struct CombinedOpenpty;

#[cfg(not(any(target_os = "linux", target_os = "android")))]
impl PtyAllocator for CombinedOpenpty {
    fn open(&self, size: WindowSize) -> Result<PtyPair, PtyError> {
        use nix::fcntl::{fcntl, FcntlArg, FdFlag};
        use nix::pty::{openpty, OpenptyResult};
        use std::os::fd::{AsFd, AsRawFd};

        let winsize = size.to_winsize();
        let OpenptyResult { master, slave } =
            openpty(Some(&winsize), None).map_err(|e| PtyError::allocation("openpty", e))?;

        for fd in [&master, &slave] {
            fcntl(fd.as_raw_fd(), FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC))
                .map_err(|e| PtyError::allocation("fcntl(FD_CLOEXEC)", e))?;
        }

        let device_path = slave_device_path(slave.as_fd())?;

        Ok(PtyPair {
            master,
            slave,
            device_path,
        })
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn slave_device_path(slave: std::os::fd::BorrowedFd<'_>) -> Result<PathBuf, PtyError> {
    use std::ffi::{CStr, OsStr};
    use std::os::fd::AsRawFd;
    use std::os::unix::ffi::OsStrExt;

    let mut buf = [0 as libc::c_char; 256];
    let ret = unsafe { libc::ttyname_r(slave.as_raw_fd(), buf.as_mut_ptr(), buf.len()) };
    if ret != 0 {
        return Err(PtyError::allocation(
            "ttyname",
            nix::errno::Errno::from_raw(ret),
        ));
    }
    let name = unsafe { CStr::from_ptr(buf.as_ptr()) };
    Ok(PathBuf::from(OsStr::from_bytes(name.to_bytes())))
}

#[cfg(any(target_os = "linux", target_os = "android"))]
pub type PlatformAllocator = PosixOpenpt;

#[cfg(not(any(target_os = "linux", target_os = "android")))]
pub type PlatformAllocator = CombinedOpenpty;

/// Allocate a pty pair with the strategy selected for this platform.
pub fn allocate(size: WindowSize) -> Result<PtyPair, PtyError> {
    let pair = PlatformAllocator::default().open(size)?;
    tracing::debug!(device = %pair.device_path.display(), %size, "allocated pty");
    Ok(pair)
}
