//! ptywrap — run a command as though it were attached to a terminal.
//!
//! Allocates a PTY, attaches the child's standard streams to the slave side,
//! and relays bytes between the caller's own stdio and the master side. This
//! tricks programs into disabling buffering, or otherwise acting as if they
//! are interactive, while their output is still captured programmatically.
//!
//! - `pty`: master/slave pair allocation and raw-mode configuration
//! - `session`: fork/exec lifecycle and exit-status capture
//! - `pump`: poll-driven byte relays with coordinated shutdown

pub mod error;
pub mod pty;
pub mod pump;
pub mod session;

pub use error::{Error, Result};
pub use session::{Command, Session};
