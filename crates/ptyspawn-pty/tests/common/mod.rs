//! Shared helpers for the pty integration tests

#![allow(dead_code)]

use ptyspawn_pty::{ExitStatus, PtySession};
use std::io;
use std::thread;
use std::time::{Duration, Instant};

/// Search path handed to children, whose environment starts out empty.
pub const TEST_PATH: &str = "PATH=/usr/bin:/bin";

/// Drain the master until the child side hangs up or `timeout` passes.
pub fn read_to_end(session: &PtySession, timeout: Duration) -> String {
    let deadline = Instant::now() + timeout;
    let mut output = Vec::new();
    let mut buf = [0u8; 4096];

    while Instant::now() < deadline {
        match session.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => output.extend_from_slice(&buf[..n]),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(10));
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(_) => break,
        }
    }

    String::from_utf8_lossy(&output).into_owned()
}

/// Read until `needle` shows up in the output or `timeout` passes.
pub fn read_until(session: &PtySession, needle: &str, timeout: Duration) -> String {
    let deadline = Instant::now() + timeout;
    let mut output = Vec::new();
    let mut buf = [0u8; 4096];

    while Instant::now() < deadline {
        match session.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                output.extend_from_slice(&buf[..n]);
                if String::from_utf8_lossy(&output).contains(needle) {
                    break;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(10));
            }
            Err(_) => break,
        }
    }

    String::from_utf8_lossy(&output).into_owned()
}

/// Write the whole buffer, retrying while the master is full.
pub fn write_all(session: &PtySession, mut data: &[u8]) {
    while !data.is_empty() {
        match session.write(data) {
            Ok(n) => data = &data[n..],
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(5));
            }
            Err(e) => panic!("write to pty failed: {e}"),
        }
    }
}

/// Poll for the child's exit for up to `timeout`.
pub fn wait_timeout(session: &PtySession, timeout: Duration) -> Option<ExitStatus> {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if let Some(status) = session.try_wait().expect("try_wait") {
            return Some(status);
        }
        thread::sleep(Duration::from_millis(10));
    }
    None
}

/// Poll `check` every 20ms until it returns `Some` or `timeout` passes.
pub fn eventually<T>(timeout: Duration, mut check: impl FnMut() -> Option<T>) -> Option<T> {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if let Some(value) = check() {
            return Some(value);
        }
        thread::sleep(Duration::from_millis(20));
    }
    None
}

/// Output lines with the tty's carriage returns stripped.
pub fn lines(output: &str) -> Vec<String> {
    output
        .lines()
        .map(|line| line.trim_end_matches('\r').to_string())
        .filter(|line| !line.is_empty())
        .collect()
}
