//! Core terminal emulation components.
//!
//! - **pty**: Unix pseudo-terminal wrapper around a forked child
//! - **term**: screen buffer and the control-sequence parser feeding it
//! - **session**: one child process behind a PTY, polled from the main loop
//!
//! # Architecture
//!
//! ```text
//! Session
//! └── dyn PtyBackend (UnixPty in production)
//!
//! ScreenBuffer
//! ├── TermState (grids, scrollback, cursor)
//! └── VtParser (control sequences)
//! ```

pub mod pty;
pub mod session;
pub mod term;
