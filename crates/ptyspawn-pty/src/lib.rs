//! Pseudo-terminal process launching for Ptyspawn
//!
//! Allocates a master/slave pty pair, forks a child that becomes a session
//! leader with the slave as its controlling terminal, and execs the target
//! program with a caller-supplied argv, environment and working directory.
//! The parent keeps a non-blocking master descriptor for duplex I/O.

pub mod foreground;
pub mod launch;
pub mod pty;
pub mod session;
pub mod size;

pub use foreground::{foreground_process_name, ProcessNameResolver};
pub use launch::{spawn, spawn_with, LaunchSpec};
pub use pty::{allocate, PtyAllocator, PtyPair};
pub use session::{AsyncPtyMaster, ChildProcess, ExitStatus, PtySession};
pub use size::{resize, window_size, WindowSize};

use nix::errno::Errno;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PtyError {
    #[error("Invalid launch spec: {0}")]
    Validation(String),

    #[error("PTY resources exhausted during {op}: {source}")]
    Resource {
        op: &'static str,
        #[source]
        source: Errno,
    },

    #[error("Permission denied during {op}: {source}")]
    Permission {
        op: &'static str,
        #[source]
        source: Errno,
    },

    #[error("{op} failed: {source}")]
    System {
        op: &'static str,
        #[source]
        source: Errno,
    },

    #[error("PTY I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Coarse classification of a [`PtyError`], for callers that only care
/// which stage of a launch went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Resource,
    Permission,
    System,
    Io,
}

impl PtyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PtyError::Validation(_) => ErrorKind::Validation,
            PtyError::Resource { .. } => ErrorKind::Resource,
            PtyError::Permission { .. } => ErrorKind::Permission,
            PtyError::System { .. } => ErrorKind::System,
            PtyError::IoError(_) => ErrorKind::Io,
        }
    }

    /// Classify a failure while acquiring the device pair.
    pub(crate) fn allocation(op: &'static str, source: Errno) -> Self {
        match source {
            Errno::EACCES | Errno::EPERM => PtyError::Permission { op, source },
            _ => PtyError::Resource { op, source },
        }
    }

    pub(crate) fn system(op: &'static str, source: Errno) -> Self {
        PtyError::System { op, source }
    }

    pub(crate) fn io(source: Errno) -> Self {
        PtyError::IoError(std::io::Error::from_raw_os_error(source as i32))
    }
}
