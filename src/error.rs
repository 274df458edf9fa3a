//! Error types for PTY sessions and pumps

use thiserror::Error;

/// Session error type
///
/// Every variant is fatal to the session: a failed setup call leaves no
/// well-defined state to roll back to, and a torn byte stream cannot be
/// resumed. EOF and hang-up are not errors and are handled inside the pump
/// state machine instead.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to open PTY master: {0}")]
    OpenMaster(#[source] nix::Error),

    #[error("Failed to grant PTY access: {0}")]
    GrantPty(#[source] nix::Error),

    #[error("Failed to unlock PTY: {0}")]
    UnlockPty(#[source] nix::Error),

    #[error("Failed to get PTY slave name: {0}")]
    PtsName(#[source] nix::Error),

    #[error("Failed to open PTY slave: {0}")]
    OpenSlave(#[source] nix::Error),

    #[error("Failed to set terminal attributes: {0}")]
    Termios(#[source] nix::Error),

    #[error("Failed to set window size: {0}")]
    SetWinsize(#[source] nix::Error),

    #[error("Failed to fork: {0}")]
    Fork(#[source] nix::Error),

    #[error("Failed to wait for child: {0}")]
    Wait(#[source] nix::Error),

    #[error("Failed to poll: {0}")]
    Poll(#[source] nix::Error),

    #[error("Failed to read from descriptor: {0}")]
    Read(#[source] nix::Error),

    #[error("Failed to write to descriptor: {0}")]
    Write(#[source] nix::Error),

    #[error("Command argument contains a NUL byte")]
    NulInArgument,

    #[error("Pump thread panicked")]
    PumpPanicked,
}

/// Result type for session operations
pub type Result<T> = std::result::Result<T, Error>;
