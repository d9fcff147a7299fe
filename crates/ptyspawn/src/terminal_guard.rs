//! Raw mode for the local terminal while ptyrun relays to the pty
//!
//! Raw mode is entered only when stdin is a terminal. The cooked line
//! discipline comes back on [`RawModeGuard::restore`], on drop, or from the
//! panic hook installed on entry, so a panic message is printed readably.

use anyhow::{Context, Result};
use crossterm::terminal;
use std::io::{self, IsTerminal};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Once;

/// Set while some guard holds the terminal in raw mode.
static RAW_ACTIVE: AtomicBool = AtomicBool::new(false);
static PANIC_HOOK: Once = Once::new();

pub struct RawModeGuard {
    active: bool,
    // !Send: raw mode belongs to the thread driving the terminal
    _marker: std::marker::PhantomData<*const ()>,
}

impl RawModeGuard {
    /// Put the local terminal in raw mode if stdin is one; otherwise return
    /// an inactive guard.
    pub fn enter_if_terminal() -> Result<Self> {
        if !io::stdin().is_terminal() {
            return Ok(Self::inactive());
        }
        Self::enter()
    }

    /// Put the local terminal in raw mode unconditionally.
    pub fn enter() -> Result<Self> {
        install_panic_hook();
        terminal::enable_raw_mode().context("Failed to enable raw mode")?;
        RAW_ACTIVE.store(true, Ordering::SeqCst);
        tracing::debug!("local terminal in raw mode");
        Ok(Self {
            active: true,
            _marker: std::marker::PhantomData,
        })
    }

    pub fn inactive() -> Self {
        Self {
            active: false,
            _marker: std::marker::PhantomData,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Leave raw mode now. Later calls and the drop are no-ops.
    pub fn restore(&mut self) -> Result<()> {
        if self.active {
            self.active = false;
            RAW_ACTIVE.store(false, Ordering::SeqCst);
            terminal::disable_raw_mode().context("Failed to restore terminal mode")?;
        }
        Ok(())
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(e) = self.restore() {
            tracing::warn!("{:#}", e);
        }
    }
}

fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            if RAW_ACTIVE.swap(false, Ordering::SeqCst) {
                let _ = terminal::disable_raw_mode();
            }
            previous(info);
        }));
    });
}
