//! A launched pty session and the caller-side handles around it
//!
//! The session owns the master descriptor and remembers the child's pid.
//! Dropping it closes the master; it never signals or reaps the child.
//! Reaping stays with the caller through [`ChildProcess::wait`].

use crate::foreground;
use crate::size::{self, WindowSize};
use crate::PtyError;
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::io::unix::AsyncFd;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// How a child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Exited(i32),
    Signaled(Signal),
}

impl ExitStatus {
    /// Shell-style status code: the exit code, or 128 + signal number.
    pub fn code(&self) -> i32 {
        match self {
            ExitStatus::Exited(code) => *code,
            ExitStatus::Signaled(signal) => 128 + *signal as i32,
        }
    }

    pub fn success(&self) -> bool {
        matches!(self, ExitStatus::Exited(0))
    }
}

/// Handle on the launched child, for the caller's reaping and signalling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildProcess {
    pid: Pid,
}

impl ChildProcess {
    pub fn new(pid: Pid) -> Self {
        Self { pid }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Block until the child exits and reap it.
    pub fn wait(&self) -> Result<ExitStatus, PtyError> {
        loop {
            match waitpid(self.pid, None) {
                Ok(status) => {
                    if let Some(exit) = exit_status(status) {
                        return Ok(exit);
                    }
                }
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(PtyError::system("waitpid", e)),
            }
        }
    }

    /// Reap the child if it has exited, without blocking.
    pub fn try_wait(&self) -> Result<Option<ExitStatus>, PtyError> {
        match waitpid(self.pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(status) => Ok(exit_status(status)),
            Err(e) => Err(PtyError::system("waitpid", e)),
        }
    }

    pub fn signal(&self, signal: Signal) -> Result<(), PtyError> {
        kill(self.pid, signal).map_err(|e| PtyError::system("kill", e))
    }
}

fn exit_status(status: WaitStatus) -> Option<ExitStatus> {
    match status {
        WaitStatus::Exited(_, code) => Some(ExitStatus::Exited(code)),
        WaitStatus::Signaled(_, signal, _) => Some(ExitStatus::Signaled(signal)),
        _ => None,
    }
}

/// A program running on a pty, as returned by [`crate::spawn`].
#[derive(Debug)]
pub struct PtySession {
    master: OwnedFd,
    device_path: PathBuf,
    child: ChildProcess,
}

impl PtySession {
    pub(crate) fn new(master: OwnedFd, device_path: PathBuf, pid: Pid) -> Self {
        Self {
            master,
            device_path,
            child: ChildProcess::new(pid),
        }
    }

    pub fn pid(&self) -> Pid {
        self.child.pid()
    }

    pub fn child(&self) -> ChildProcess {
        self.child
    }

    pub fn master_fd(&self) -> RawFd {
        self.master.as_raw_fd()
    }

    /// Path of the slave device, e.g. `/dev/pts/3`.
    pub fn device_path(&self) -> &Path {
        &self.device_path
    }

    /// Resize the terminal. Non-positive dimensions apply the 80x30 default.
    pub fn resize(&self, cols: i64, rows: i64) -> Result<(), PtyError> {
        size::resize(&self.master, cols, rows)
    }

    pub fn window_size(&self) -> Result<WindowSize, PtyError> {
        size::window_size(&self.master)
    }

    pub fn foreground_process_name(&self) -> Option<String> {
        foreground::foreground_process_name(&self.master, &self.device_path)
    }

    /// Non-blocking read from the master. An empty read means the child side
    /// has hung up; `WouldBlock` means no output is pending yet.
    pub fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        read_master(self.master.as_raw_fd(), buf)
    }

    /// Non-blocking write to the master.
    pub fn write(&self, buf: &[u8]) -> io::Result<usize> {
        write_master(self.master.as_raw_fd(), buf)
    }

    pub fn wait(&self) -> Result<ExitStatus, PtyError> {
        self.child.wait()
    }

    pub fn try_wait(&self) -> Result<Option<ExitStatus>, PtyError> {
        self.child.try_wait()
    }

    pub fn signal(&self, signal: Signal) -> Result<(), PtyError> {
        self.child.signal(signal)
    }

    /// Register the master with the tokio reactor. Must run inside a runtime.
    pub fn into_async(self) -> Result<(AsyncPtyMaster, ChildProcess), PtyError> {
        let child = self.child;
        let master = AsyncPtyMaster::new(self.master, self.device_path)?;
        Ok((master, child))
    }

    pub fn into_parts(self) -> (OwnedFd, PathBuf, Pid) {
        (self.master, self.device_path, self.child.pid())
    }
}

impl AsFd for PtySession {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.master.as_fd()
    }
}

impl AsRawFd for PtySession {
    fn as_raw_fd(&self) -> RawFd {
        self.master.as_raw_fd()
    }
}

impl io::Read for PtySession {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        PtySession::read(self, buf)
    }
}

impl io::Write for PtySession {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        PtySession::write(self, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn read_master(fd: RawFd, buf: &mut [u8]) -> io::Result<usize> {
    let n = unsafe { libc::read(fd, buf.as_mut_ptr().cast::<libc::c_void>(), buf.len()) };
    if n < 0 {
        let err = io::Error::last_os_error();
        // Linux reports EIO once the last slave descriptor is closed.
        if err.raw_os_error() == Some(libc::EIO) {
            return Ok(0);
        }
        return Err(err);
    }
    Ok(n as usize)
}

fn write_master(fd: RawFd, buf: &[u8]) -> io::Result<usize> {
    let n = unsafe { libc::write(fd, buf.as_ptr().cast::<libc::c_void>(), buf.len()) };
    if n < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(n as usize)
}

/// Async wrapper for the pty master, driven by the tokio reactor.
pub struct AsyncPtyMaster {
    inner: AsyncFd<OwnedFd>,
    device_path: PathBuf,
}

impl AsyncPtyMaster {
    /// Wrap a non-blocking master descriptor.
    pub fn new(master: OwnedFd, device_path: PathBuf) -> io::Result<Self> {
        Ok(Self {
            inner: AsyncFd::new(master)?,
            device_path,
        })
    }

    pub fn device_path(&self) -> &Path {
        &self.device_path
    }

    pub fn resize(&self, cols: i64, rows: i64) -> Result<(), PtyError> {
        size::resize(self.as_fd(), cols, rows)
    }

    pub fn window_size(&self) -> Result<WindowSize, PtyError> {
        size::window_size(self.as_fd())
    }

    pub fn foreground_process_name(&self) -> Option<String> {
        foreground::foreground_process_name(self.as_fd(), &self.device_path)
    }
}

impl AsFd for AsyncPtyMaster {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.inner.get_ref().as_fd()
    }
}

impl AsyncRead for AsyncPtyMaster {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        loop {
            let mut guard = ready!(self.inner.poll_read_ready(cx))?;
            let unfilled = buf.initialize_unfilled();
            match guard.try_io(|inner| read_master(inner.get_ref().as_raw_fd(), unfilled)) {
                Ok(Ok(n)) => {
                    buf.advance(n);
                    return Poll::Ready(Ok(()));
                }
                Ok(Err(e)) => return Poll::Ready(Err(e)),
                Err(_would_block) => continue,
            }
        }
    }
}

impl AsyncWrite for AsyncPtyMaster {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        loop {
            let mut guard = ready!(self.inner.poll_write_ready(cx))?;
            match guard.try_io(|inner| write_master(inner.get_ref().as_raw_fd(), buf)) {
                Ok(result) => return Poll::Ready(result),
                Err(_would_block) => continue,
            }
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
