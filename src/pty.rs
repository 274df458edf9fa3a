//! PTY (pseudoterminal) allocation
//!
//! Opens the master/slave pair and configures the slave side. The slave is
//! opened here, before the fork, so the child only has to configure and
//! duplicate it; the parent closes its copy once the child owns one.
//!
//! Reference: https://www.man7.org/linux/man-pages/man3/posix_openpt.3.html

use std::os::fd::{AsFd, AsRawFd, FromRawFd, OwnedFd, RawFd};

use nix::fcntl::{open, OFlag};
use nix::libc;
use nix::pty::{grantpt, posix_openpt, ptsname, unlockpt, PtyMaster};
use nix::sys::stat::Mode;
use nix::sys::termios::{self, SetArg};

use crate::error::{Error, Result};

/// A pseudoterminal master with the matching slave opened alongside it.
pub struct Pty {
    /// The PTY master file descriptor. Non-blocking; the pumps poll it.
    master: PtyMaster,
    /// The slave descriptor, handed to the child at fork time.
    slave: Option<OwnedFd>,
}

impl Pty {
    /// Allocate a master/slave pair.
    ///
    /// The master is opened non-blocking and without becoming our
    /// controlling terminal; the slave is opened immediately so it is ready
    /// for the child to claim.
    pub fn open() -> Result<Self> {
        let master = posix_openpt(OFlag::O_RDWR | OFlag::O_NOCTTY | OFlag::O_NONBLOCK)
            .map_err(Error::OpenMaster)?;
        grantpt(&master).map_err(Error::GrantPty)?;
        unlockpt(&master).map_err(Error::UnlockPty)?;

        // SAFETY: ptsname is not thread-safe, but sessions are created from
        // the main thread before any pump thread exists.
        let slave_path = unsafe { ptsname(&master) }.map_err(Error::PtsName)?;

        let slave_fd = open(
            slave_path.as_str(),
            OFlag::O_RDWR | OFlag::O_NOCTTY,
            Mode::empty(),
        )
        .map_err(Error::OpenSlave)?;
        // SAFETY: open returned a fresh descriptor that nothing else owns.
        let slave = unsafe { OwnedFd::from_raw_fd(slave_fd) };

        Ok(Self {
            master,
            slave: Some(slave),
        })
    }

    /// Raw descriptor of the master side.
    pub fn master_fd(&self) -> RawFd {
        self.master.as_raw_fd()
    }

    /// The slave side, if this process still holds it.
    pub fn slave(&self) -> Option<&OwnedFd> {
        self.slave.as_ref()
    }

    /// Release the slave descriptor. Called in the parent after the fork;
    /// the child holds the only remaining copy.
    pub fn close_slave(&mut self) {
        self.slave = None;
    }

    /// Mirror the invoking terminal's window size onto the PTY so the child
    /// sees real geometry, falling back to 80x24 when our own stdout is not
    /// a terminal.
    pub fn inherit_window_size(&self) -> Result<()> {
        let mut ws = libc::winsize {
            ws_row: 0,
            ws_col: 0,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };

        // SAFETY: TIOCGWINSZ is a valid ioctl for querying window size
        let got = unsafe { libc::ioctl(libc::STDOUT_FILENO, libc::TIOCGWINSZ, &mut ws) };
        if got != 0 || ws.ws_row == 0 || ws.ws_col == 0 {
            ws = libc::winsize {
                ws_row: 24,
                ws_col: 80,
                ws_xpixel: 0,
                ws_ypixel: 0,
            };
        }

        // SAFETY: TIOCSWINSZ is a valid ioctl for setting window size
        let result = unsafe { libc::ioctl(self.master.as_raw_fd(), libc::TIOCSWINSZ, &ws) };
        if result < 0 {
            Err(Error::SetWinsize(nix::errno::Errno::last()))
        } else {
            Ok(())
        }
    }
}

/// Put a descriptor's terminal settings into raw mode: no echo, no signal
/// generation, no canonical input processing, no output post-processing,
/// 8-bit characters.
pub fn set_raw<F: AsFd>(fd: &F) -> Result<()> {
    let mut settings = termios::tcgetattr(fd).map_err(Error::Termios)?;
    termios::cfmakeraw(&mut settings);
    termios::tcsetattr(fd, SetArg::TCSANOW, &settings).map_err(Error::Termios)?;
    Ok(())
}
