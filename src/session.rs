//! PTY session lifecycle
//!
//! Forks a child onto the PTY slave side, launches the two redirection
//! pumps, and reaps the child's exit status. Setup failures are fatal to the
//! whole process; there is no intermediate state to recover to.

use std::ffi::CString;
use std::os::fd::AsRawFd;
use std::os::unix::io::RawFd;
use std::process;
use std::thread;

use nix::libc::{self, STDERR_FILENO, STDIN_FILENO, STDOUT_FILENO};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{close, dup2, execvp, fork, setsid, ForkResult, Pid};
use tracing::{debug, error, warn};

use crate::error::{Error, Result};
use crate::pty::{self, Pty};
use crate::pump::{Pump, PumpSpec, ShutdownFlag};

/// Exit status reported when setup fails or the child terminates abnormally.
pub const FAILURE_STATUS: i32 = 1;

/// The command a session execs into. Opaque to the session itself; the CLI
/// layer decides what goes in here.
#[derive(Clone, Debug)]
pub struct Command {
    program: String,
    args: Vec<String>,
}

impl Command {
    pub fn new<S, I, T>(program: S, args: I) -> Self
    where
        S: Into<String>,
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// The exec argument vector: program name first, then the arguments.
    fn argv(&self) -> Result<Vec<CString>> {
        let mut argv = Vec::with_capacity(self.args.len() + 1);
        argv.push(CString::new(self.program.as_str()).map_err(|_| Error::NulInArgument)?);
        for arg in &self.args {
            argv.push(CString::new(arg.as_str()).map_err(|_| Error::NulInArgument)?);
        }
        Ok(argv)
    }
}

/// One wrapped child process and the PTY it is attached to.
pub struct Session {
    pty: Pty,
    child: Pid,
}

impl Session {
    /// Allocate the PTY and fork the child onto its slave side.
    ///
    /// The child configures the slave into raw mode, makes it the
    /// controlling terminal of a fresh session, duplicates it over its
    /// standard streams, and execs into `command`. The parent keeps only
    /// the master.
    pub fn spawn(command: &Command) -> Result<Self> {
        let argv = command.argv()?;

        let mut pty = Pty::open()?;
        pty.inherit_window_size()?;

        // SAFETY: between fork and exec the child calls only exec-safe
        // library routines; the process is still single-threaded here.
        match unsafe { fork() }.map_err(Error::Fork)? {
            ForkResult::Child => exec_child(&pty, &argv),
            ForkResult::Parent { child } => {
                debug!(pid = child.as_raw(), program = %command.program, "child forked");
                // The child holds the only copy that matters now.
                pty.close_slave();
                Ok(Self { pty, child })
            }
        }
    }

    /// Relay between the caller's stdin/stdout and the PTY until the child
    /// exits and both pumps have drained.
    pub fn run(self) -> Result<i32> {
        self.run_with(STDIN_FILENO, STDOUT_FILENO)
    }

    /// Like [`run`](Self::run), with explicit descriptors standing in for
    /// the caller's stdio.
    ///
    /// Returns the child's exit status. A signal-terminated child maps to
    /// [`FAILURE_STATUS`].
    pub fn run_with(self, input: RawFd, output: RawFd) -> Result<i32> {
        let shutdown = ShutdownFlag::new();
        let master = self.pty.master_fd();

        let input_pump = Pump::new(
            PumpSpec {
                source: input,
                dest: master,
                send_eot: true,
                end_session: false,
            },
            shutdown.clone(),
        );
        let output_pump = Pump::new(
            PumpSpec {
                source: master,
                dest: output,
                send_eot: false,
                end_session: true,
            },
            shutdown.clone(),
        );

        let input_thread = thread::spawn(move || run_pump(input_pump, "input"));
        let output_thread = thread::spawn(move || run_pump(output_pump, "output"));

        let status = waitpid(self.child, None).map_err(Error::Wait)?;
        debug!(?status, "child exited");

        let exit_status = match status {
            WaitStatus::Exited(_, code) => code,
            WaitStatus::Signaled(_, signal, _) => {
                warn!(?signal, "child terminated by signal");
                FAILURE_STATUS
            }
            _ => FAILURE_STATUS,
        };

        input_thread.join().map_err(|_| Error::PumpPanicked)?;
        output_thread.join().map_err(|_| Error::PumpPanicked)?;

        // Both pumps are done; the master closes when `self.pty` drops.
        Ok(exit_status)
    }
}

/// Pump thread body. A pump failure means a torn byte stream, which cannot
/// be resumed; it takes the whole session down like any other fatal error.
fn run_pump(pump: Pump, name: &str) {
    if let Err(e) = pump.run() {
        error!("{name} pump failed: {e}");
        process::exit(FAILURE_STATUS);
    }
}

/// Child-side setup between fork and exec. Never returns.
fn exec_child(pty: &Pty, argv: &[CString]) -> ! {
    let slave = match pty.slave() {
        Some(fd) => fd,
        None => child_bail("slave descriptor missing"),
    };
    let slave_raw = slave.as_raw_fd();

    if let Err(e) = pty::set_raw(slave) {
        child_bail(&format!("raw mode: {e}"));
    }

    if let Err(e) = setsid() {
        child_bail(&format!("setsid: {e}"));
    }

    // SAFETY: TIOCSCTTY is a valid ioctl for claiming a controlling terminal
    if unsafe { libc::ioctl(slave_raw, libc::TIOCSCTTY as libc::c_ulong, 0) } < 0 {
        child_bail("failed to set controlling terminal");
    }

    for fd in [STDIN_FILENO, STDOUT_FILENO, STDERR_FILENO] {
        if let Err(e) = dup2(slave_raw, fd) {
            child_bail(&format!("dup2: {e}"));
        }
    }

    // Both PTY descriptors are duplicated or unused from here on.
    let _ = close(pty.master_fd());
    if slave_raw > STDERR_FILENO {
        let _ = close(slave_raw);
    }

    let _ = execvp(&argv[0], argv);

    // execvp only returns on error.
    eprintln!("ptywrap: exec failed: {}", argv[0].to_string_lossy());
    process::exit(127);
}

fn child_bail(message: &str) -> ! {
    eprintln!("ptywrap: child setup failed: {message}");
    process::exit(FAILURE_STATUS);
}
