//! The `ptyrun` host: launches a program on a pseudo-terminal and relays
//! the local terminal to it.

pub mod runner;
pub mod terminal_guard;
