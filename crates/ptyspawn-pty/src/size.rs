//! Window geometry of a pty
//!
//! The size lives in the tty driver and is lost when the device closes, so
//! nothing here is cached: every call goes straight to the descriptor.

use crate::PtyError;
use nix::errno::Errno;
use std::os::fd::{AsFd, AsRawFd};

/// Columns used when the caller gives none or a non-positive value.
pub const DEFAULT_COLS: u16 = 80;

/// Rows used when the caller gives none or a non-positive value.
pub const DEFAULT_ROWS: u16 = 30;

/// Terminal size in character cells.
///
/// Sizes built by this crate's callers go through [`WindowSize::new`], so
/// both dimensions are positive. Only [`window_size`] can report a zero,
/// when that is what the tty driver holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowSize {
    cols: u16,
    rows: u16,
}

impl WindowSize {
    /// Build a size from caller-supplied dimensions.
    ///
    /// If either dimension is non-positive the whole size falls back to
    /// 80x30. Values above `u16::MAX` saturate.
    pub fn new(cols: i64, rows: i64) -> Self {
        if cols <= 0 || rows <= 0 {
            return Self::default();
        }
        Self {
            cols: saturate(cols),
            rows: saturate(rows),
        }
    }

    pub fn cols(&self) -> u16 {
        self.cols
    }

    pub fn rows(&self) -> u16 {
        self.rows
    }

    pub(crate) fn to_winsize(self) -> libc::winsize {
        libc::winsize {
            ws_row: self.rows,
            ws_col: self.cols,
            ws_xpixel: 0,
            ws_ypixel: 0,
        }
    }

    /// Apply this size to a terminal descriptor with a single `TIOCSWINSZ`.
    pub fn apply<Fd: AsFd>(self, fd: Fd) -> Result<(), PtyError> {
        let winsize = self.to_winsize();
        let ret = unsafe { libc::ioctl(fd.as_fd().as_raw_fd(), libc::TIOCSWINSZ, &winsize) };
        if ret < 0 {
            return Err(PtyError::io(Errno::last()));
        }
        Ok(())
    }
}

impl Default for WindowSize {
    fn default() -> Self {
        Self {
            cols: DEFAULT_COLS,
            rows: DEFAULT_ROWS,
        }
    }
}

impl std::fmt::Display for WindowSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.cols, self.rows)
    }
}

fn saturate(value: i64) -> u16 {
    u16::try_from(value).unwrap_or(u16::MAX)
}

/// Resize the terminal behind `fd`.
///
/// Non-positive dimensions apply the 80x30 default instead of failing.
/// Fails with an I/O error when `fd` is not a terminal.
pub fn resize<Fd: AsFd>(fd: Fd, cols: i64, rows: i64) -> Result<(), PtyError> {
    let size = WindowSize::new(cols, rows);
    size.apply(fd)?;
    tracing::debug!(%size, "resized pty");
    Ok(())
}

/// Read the current size of the terminal behind `fd`.
pub fn window_size<Fd: AsFd>(fd: Fd) -> Result<WindowSize, PtyError> {
    let mut winsize = libc::winsize {
        ws_row: 0,
        ws_col: 0,
        ws_xpixel: 0,
        ws_ypixel: 0,
    };
    let ret = unsafe { libc::ioctl(fd.as_fd().as_raw_fd(), libc::TIOCGWINSZ, &mut winsize) };
    if ret < 0 {
        return Err(PtyError::io(Errno::last()));
    }
    Ok(WindowSize {
        cols: winsize.ws_col,
        rows: winsize.ws_row,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn test_positive_dimensions_kept() {
        let size = WindowSize::new(100, 40);
        assert_eq!(size.cols(), 100);
        assert_eq!(size.rows(), 40);
    }

    #[test]
    fn test_non_positive_falls_back_to_default() {
        assert_eq!(WindowSize::new(0, 0), WindowSize::default());
        assert_eq!(WindowSize::new(-5, 24), WindowSize::default());
        assert_eq!(WindowSize::new(120, 0), WindowSize::default());
        assert_eq!(WindowSize::default().cols(), 80);
        assert_eq!(WindowSize::default().rows(), 30);
    }

    #[test]
    fn test_oversized_dimensions_saturate() {
        let size = WindowSize::new(1 << 20, 50);
        assert_eq!(size.cols(), u16::MAX);
        assert_eq!(size.rows(), 50);
    }

    #[test]
    fn test_resize_non_terminal_fails() {
        let file = tempfile::tempfile().unwrap();
        let err = resize(&file, 100, 40).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(window_size(&file).is_err());
    }

    #[test]
    fn test_constructed_sizes_are_positive() {
        for (cols, rows) in [(0, 0), (0, 24), (80, -1), (i64::MIN, i64::MAX), (1, 1)] {
            let size = WindowSize::new(cols, rows);
            assert!(size.cols() > 0 && size.rows() > 0, "{cols}x{rows} gave {size}");
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(WindowSize::new(132, 43).to_string(), "132x43");
    }
}
