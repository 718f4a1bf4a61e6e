use std::os::fd::{AsFd, AsRawFd, OwnedFd, RawFd};

use nix::libc;
use nix::unistd::{pipe, read};
use signal_hook::consts::{SIGINT, SIGUSR1, SIGUSR2};
use signal_hook::low_level::pipe as signal_pipe;

/// A signal observed through one of the three self-pipes; read back out on
/// the priority-0 band of the event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VtSignal {
    /// VT is being taken away (`SIGUSR1`, release).
    Release,
    /// VT has been handed back (`SIGUSR2`, acquire).
    Acquire,
    /// Terminal interrupt (`SIGINT`) — request shutdown.
    Interrupt,
}

/// One self-pipe per watched signal, each fed by `signal_hook`'s
/// async-signal-safe `pipe::register`, so the priority event loop can poll
/// ordinary POSIX signal delivery alongside its other fds instead of
/// relying on a dedicated signal handler thread. A single shared pipe
/// can't be used here because `pipe::register` always writes the same
/// fixed byte, so the write end can't carry which signal fired — three
/// independent pipes let the read end double as the tag.
pub struct SignalPipe {
    release_read: OwnedFd,
    acquire_read: OwnedFd,
    interrupt_read: OwnedFd,
}

impl SignalPipe {
    pub fn install() -> std::io::Result<Self> {
        let (release_read, release_write) = pipe().map_err(std::io::Error::from)?;
        let (acquire_read, acquire_write) = pipe().map_err(std::io::Error::from)?;
        let (interrupt_read, interrupt_write) = pipe().map_err(std::io::Error::from)?;

        set_nonblocking(release_read.as_raw_fd())?;
        set_nonblocking(acquire_read.as_raw_fd())?;
        set_nonblocking(interrupt_read.as_raw_fd())?;

        // `register` takes ownership of the write end and keeps it open for
        // the life of the process; the matching read end is ours to poll.
        signal_pipe::register(SIGUSR1, release_write)?;
        signal_pipe::register(SIGUSR2, acquire_write)?;
        signal_pipe::register(SIGINT, interrupt_write)?;

        Ok(Self { release_read, acquire_read, interrupt_read })
    }

    /// The fds the event loop's `poll` call should watch for band 0.
    pub fn fds(&self) -> [RawFd; 3] {
        [self.release_read.as_raw_fd(), self.acquire_read.as_raw_fd(), self.interrupt_read.as_raw_fd()]
    }

    /// Drains every pending signal byte across all three pipes and returns
    /// them tagged by source, release first, then acquire, then interrupt.
    pub fn drain(&mut self) -> Vec<VtSignal> {
        let mut out = Vec::new();
        drain_one(self.release_read.as_fd(), VtSignal::Release, &mut out);
        drain_one(self.acquire_read.as_fd(), VtSignal::Acquire, &mut out);
        drain_one(self.interrupt_read.as_fd(), VtSignal::Interrupt, &mut out);
        out
    }
}

fn drain_one(fd: std::os::fd::BorrowedFd<'_>, signal: VtSignal, out: &mut Vec<VtSignal>) {
    let mut buf = [0u8; 64];
    loop {
        match read(fd.as_raw_fd(), &mut buf) {
            Ok(0) => break,
            Ok(n) => out.extend(std::iter::repeat(signal).take(n)),
            Err(nix::errno::Errno::EAGAIN) => break,
            Err(_) => break,
        }
    }
}

fn set_nonblocking(fd: RawFd) -> std::io::Result<()> {
    // SAFETY: `fd` is a valid, open fd owned by this struct for the
    // duration of this call.
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL);
        if flags == -1 {
            return Err(std::io::Error::last_os_error());
        }
        if libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) == -1 {
            return Err(std::io::Error::last_os_error());
        }
    }
    Ok(())
}
