//! Directional byte pumps
//!
//! A pump moves an unbounded byte stream from one descriptor to another
//! using readiness polling, one in-flight chunk at a time. Two pumps serve a
//! session (caller-stdin → PTY master, PTY master → caller-stdout); the one
//! carrying the child's output trips a shared shutdown flag when it finishes
//! so its sibling exits too.

use std::os::fd::BorrowedFd;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::unistd::{isatty, read, write};
use tracing::{debug, trace};

use crate::error::{Error, Result};

/// Bytes carried per fill/drain round.
pub const BUFFER_SIZE: usize = 8192;

/// Upper bound on one poll cycle, so the shutdown flag is observed promptly
/// even when neither descriptor becomes ready.
const POLL_TIMEOUT_MS: u16 = 100;

/// ASCII end-of-transmission, the conventional "no more input" byte for a
/// terminal-attached program.
const EOT: u8 = 0x04;

/// Cancellation token shared by the two pumps of a session.
///
/// Tripped at most once, by the pump configured with `end_session`; checked
/// by both pumps once per poll cycle. Single writer, any number of readers,
/// no lock.
#[derive(Clone, Debug, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the session as ending. Idempotent.
    pub fn trip(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_tripped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// At most one in-flight chunk of unwritten data.
///
/// Invariant: `offset <= len <= BUFFER_SIZE`; the bytes in
/// `data[offset..len]` remain to be written before another read may occur.
struct TransferBuffer {
    data: [u8; BUFFER_SIZE],
    len: usize,
    offset: usize,
}

impl TransferBuffer {
    fn new() -> Self {
        Self {
            data: [0; BUFFER_SIZE],
            len: 0,
            offset: 0,
        }
    }

    fn is_empty(&self) -> bool {
        self.offset >= self.len
    }

    /// The bytes still awaiting delivery.
    fn pending(&self) -> &[u8] {
        &self.data[self.offset..self.len]
    }

    /// Record that a read deposited `n` bytes at the start of the buffer.
    fn filled(&mut self, n: usize) {
        self.offset = 0;
        self.len = n;
    }

    /// Advance past `n` delivered bytes. A partial write simply leaves the
    /// remainder pending.
    fn consumed(&mut self, n: usize) {
        self.offset += n;
        if self.is_empty() {
            self.offset = 0;
            self.len = 0;
        }
    }

    fn clear(&mut self) {
        self.offset = 0;
        self.len = 0;
    }
}

/// Static description of one pump: where bytes come from, where they go, and
/// how the pump participates in session shutdown.
#[derive(Clone, Copy, Debug)]
pub struct PumpSpec {
    /// Descriptor bytes are read from.
    pub source: RawFd,
    /// Descriptor bytes are written to.
    pub dest: RawFd,
    /// Append one EOT byte once the source hits EOF, provided the
    /// destination is a terminal-like device.
    pub send_eot: bool,
    /// Trip the shared shutdown flag when this pump finishes.
    pub end_session: bool,
}

/// One directional relay state machine.
///
/// The descriptors in the `PumpSpec` are borrowed, not owned: the session
/// keeps them open until both pump threads are joined.
pub struct Pump {
    spec: PumpSpec,
    shutdown: ShutdownFlag,
    buffer: TransferBuffer,
    /// Cleared on EOF or source hang-up; the source is no longer polled.
    source_active: bool,
    /// Cleared on destination hang-up; the pump terminates.
    dest_active: bool,
    /// Source exhausted, final EOT/completion marker still owed.
    eof: bool,
    /// Cleared by the shutdown flag or destination hang-up. The loop keeps
    /// turning after that only to drain already-buffered bytes.
    running: bool,
}

impl Pump {
    pub fn new(spec: PumpSpec, shutdown: ShutdownFlag) -> Self {
        Self {
            spec,
            shutdown,
            buffer: TransferBuffer::new(),
            source_active: true,
            dest_active: true,
            eof: false,
            running: true,
        }
    }

    /// Run the pump to completion on the current thread.
    ///
    /// Returns once the source is exhausted and drained, the destination
    /// hangs up, or the shared flag is tripped by the sibling pump.
    pub fn run(mut self) -> Result<()> {
        debug!(
            source = self.spec.source,
            dest = self.spec.dest,
            "pump started"
        );
        while self.cycle()? {}
        if self.spec.end_session {
            debug!(source = self.spec.source, "pump ending session");
            self.shutdown.trip();
        }
        debug!(source = self.spec.source, "pump finished");
        Ok(())
    }

    /// One poll cycle of the state machine. Returns false once the pump is
    /// done.
    fn cycle(&mut self) -> Result<bool> {
        self.running = self.running && !self.shutdown.is_tripped();
        if !self.running && self.buffer.is_empty() {
            return Ok(false);
        }

        let (src_events, dst_events) = self.wait_ready()?;

        // Hang-up with no readability left means the source is gone; with
        // readability, buffered data is still drained first.
        if self.source_active
            && src_events.contains(PollFlags::POLLHUP)
            && !src_events.contains(PollFlags::POLLIN)
        {
            trace!(fd = self.spec.source, "hangup on source");
            self.source_active = false;
            self.eof = true;
        }

        // A hung-up destination makes any buffered bytes unsendable; they
        // are discarded, not an error. POLLERR is how poll reports the
        // broken write end of a pipe.
        if self.dest_active && dst_events.intersects(PollFlags::POLLHUP | PollFlags::POLLERR) {
            trace!(
                fd = self.spec.dest,
                discarded = self.buffer.pending().len(),
                "hangup on destination"
            );
            self.dest_active = false;
            self.buffer.clear();
            return Ok(false);
        }

        if self.running && !self.eof && self.buffer.is_empty() && src_events.contains(PollFlags::POLLIN)
        {
            self.fill()?;
        }

        if dst_events.contains(PollFlags::POLLOUT) {
            if !self.buffer.is_empty() {
                self.drain()?;
                if !self.dest_active {
                    return Ok(false);
                }
            } else if self.eof {
                self.complete()?;
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Poll the watched descriptors, bounded by `POLL_TIMEOUT_MS`.
    ///
    /// The destination is registered for writability only while there is
    /// something to deliver (pending bytes or the final EOT); an always
    /// writable descriptor would otherwise turn the poll into a spin. A
    /// descriptor registered with no events still reports hang-up.
    fn wait_ready(&self) -> Result<(PollFlags, PollFlags)> {
        // SAFETY: the session keeps both descriptors open until the pump
        // threads are joined.
        let src = unsafe { BorrowedFd::borrow_raw(self.spec.source) };
        let dst = unsafe { BorrowedFd::borrow_raw(self.spec.dest) };

        let want_read = self.running && !self.eof && self.buffer.is_empty();
        let want_write = !self.buffer.is_empty() || self.eof;

        let mut fds = Vec::with_capacity(2);
        if self.source_active {
            let events = if want_read {
                PollFlags::POLLIN
            } else {
                PollFlags::empty()
            };
            fds.push(PollFd::new(src, events));
        }
        if self.dest_active {
            let events = if want_write {
                PollFlags::POLLOUT
            } else {
                PollFlags::empty()
            };
            fds.push(PollFd::new(dst, events));
        }
        if fds.is_empty() {
            return Ok((PollFlags::empty(), PollFlags::empty()));
        }

        poll(&mut fds, PollTimeout::from(POLL_TIMEOUT_MS)).map_err(Error::Poll)?;

        let mut revents = fds
            .iter()
            .map(|fd| fd.revents().unwrap_or_else(PollFlags::empty));
        let src_events = if self.source_active {
            revents.next().unwrap_or_else(PollFlags::empty)
        } else {
            PollFlags::empty()
        };
        let dst_events = if self.dest_active {
            revents.next().unwrap_or_else(PollFlags::empty)
        } else {
            PollFlags::empty()
        };
        Ok((src_events, dst_events))
    }

    /// Read one chunk from the source into the empty buffer.
    fn fill(&mut self) -> Result<()> {
        match read(self.spec.source, &mut self.buffer.data) {
            Ok(0) => {
                trace!(fd = self.spec.source, "eof on source");
                self.source_active = false;
                self.eof = true;
            }
            Ok(n) => {
                trace!(fd = self.spec.source, bytes = n, "filled");
                self.buffer.filled(n);
            }
            // Readiness raced away; try again next cycle.
            Err(Errno::EAGAIN) => {}
            // A PTY master whose slave side has fully closed reads EIO;
            // that is the kernel's spelling of hang-up, not a failure.
            Err(Errno::EIO) => {
                trace!(fd = self.spec.source, "eio on source, treating as eof");
                self.source_active = false;
                self.eof = true;
            }
            Err(e) => return Err(Error::Read(e)),
        }
        Ok(())
    }

    /// Write as much pending data as the destination accepts in one call.
    fn drain(&mut self) -> Result<()> {
        // SAFETY: see wait_ready.
        let dst = unsafe { BorrowedFd::borrow_raw(self.spec.dest) };
        match write(dst, self.buffer.pending()) {
            Ok(n) => {
                trace!(fd = self.spec.dest, bytes = n, "drained");
                self.buffer.consumed(n);
            }
            Err(Errno::EAGAIN) => {}
            // The peer vanished between poll and write; same as hang-up.
            Err(Errno::EPIPE) | Err(Errno::EIO) => {
                trace!(fd = self.spec.dest, "destination gone during drain");
                self.dest_active = false;
                self.buffer.clear();
            }
            Err(e) => return Err(Error::Write(e)),
        }
        Ok(())
    }

    /// Source exhausted and fully drained: emit the final marker.
    ///
    /// Terminal-like destinations of an EOT-configured pump get one EOT
    /// byte; everything else gets a zero-length write, which puts no bytes
    /// on the wire.
    fn complete(&mut self) -> Result<()> {
        // SAFETY: see wait_ready.
        let dst = unsafe { BorrowedFd::borrow_raw(self.spec.dest) };
        let eot = [EOT];
        let payload: &[u8] = if self.spec.send_eot && isatty(self.spec.dest).unwrap_or(false) {
            debug!(fd = self.spec.dest, "sending EOT");
            &eot
        } else {
            &[]
        };
        match write(dst, payload) {
            Ok(_) => Ok(()),
            Err(Errno::EPIPE) | Err(Errno::EIO) => {
                self.dest_active = false;
                Ok(())
            }
            Err(e) => Err(Error::Write(e)),
        }
    }
}
