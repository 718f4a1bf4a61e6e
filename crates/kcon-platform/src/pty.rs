use std::ffi::CString;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};

use kcon_core::{PtyError, PtyHandle, WinSize};
use nix::libc;
use nix::pty::{forkpty, ForkptyResult, Winsize};
use nix::sys::signal::{self, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{execvp, setpgid, Pid};

/// Owns the pty master fd and the child shell's pid. Dropping this sends
/// `SIGHUP`, polls for exit, and escalates to `SIGKILL` if the child does
/// not leave within the grace period.
pub struct PtyProcess {
    master: OwnedFd,
    child: Pid,
    reaped: bool,
}

impl PtyProcess {
    /// Forks a pty pair and execs the user's shell (`$SHELL`, falling back
    /// to `/bin/sh`) in the child with `TERM=xterm` and the given initial
    /// window size.
    pub fn spawn(winsize: WinSize) -> Result<Self, PtyError> {
        let raw_ws = Winsize {
            ws_row: winsize.rows,
            ws_col: winsize.cols,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };

        // SAFETY: the child branch only calls async-signal-safe functions
        // (execvp, _exit) before exec or exit.
        let result = unsafe { forkpty(Some(&raw_ws), None) }
            .map_err(|e| PtyError::ForkFailed(e.to_string()))?;

        match result {
            ForkptyResult::Parent { child, master } => {
                // SAFETY: `master` is a valid, just-created fd; `fcntl`
                // here only reads/writes the descriptor's status flags.
                unsafe {
                    let flags = libc::fcntl(master.as_raw_fd(), libc::F_GETFL);
                    if flags == -1 {
                        return Err(PtyError::ForkFailed(std::io::Error::last_os_error().to_string()));
                    }
                    if libc::fcntl(master.as_raw_fd(), libc::F_SETFL, flags | libc::O_NONBLOCK) == -1 {
                        return Err(PtyError::ForkFailed(std::io::Error::last_os_error().to_string()));
                    }
                }
                Ok(Self { master, child, reaped: false })
            }
            ForkptyResult::Child => {
                // Make this process its own process group leader so `Drop`
                // can signal the whole group: the shell may fork its own
                // children into this group, and a plain `kill(child)` would
                // leave them behind.
                let _ = setpgid(Pid::from_raw(0), Pid::from_raw(0));
                let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string());
                std::env::set_var("TERM", "xterm");
                let path = CString::new(shell).unwrap_or_else(|_| CString::new("/bin/sh").unwrap());
                let _ = execvp(&path, &[path.clone()]);
                // execvp only returns on failure.
                unsafe { libc::_exit(127) };
            }
        }
    }

    fn master_borrowed(&self) -> BorrowedFd<'_> {
        self.master.as_fd()
    }
}

impl PtyHandle for PtyProcess {
    fn master_fd(&self) -> RawFd {
        self.master.as_raw_fd()
    }

    fn read_nonblocking(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match nix::unistd::read(self.master.as_raw_fd(), buf) {
            Ok(n) => Ok(n),
            Err(nix::errno::Errno::EAGAIN) => Ok(0),
            Err(e) => Err(std::io::Error::from(e)),
        }
    }

    fn write_nonblocking(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match nix::unistd::write(self.master_borrowed(), buf) {
            Ok(n) => Ok(n),
            Err(nix::errno::Errno::EAGAIN) => Ok(0),
            Err(e) => Err(std::io::Error::from(e)),
        }
    }

    fn resize(&mut self, size: WinSize) {
        let raw_ws = Winsize {
            ws_row: size.rows,
            ws_col: size.cols,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };
        // SAFETY: `master` stays open for the lifetime of `self`.
        let ret = unsafe { libc::ioctl(self.master.as_raw_fd(), libc::TIOCSWINSZ, &raw_ws) };
        if ret == -1 {
            log::warn!("TIOCSWINSZ failed: {}", std::io::Error::last_os_error());
        }
    }

    fn child_pid(&self) -> i32 {
        self.child.as_raw()
    }
}

impl Drop for PtyProcess {
    fn drop(&mut self) {
        if self.reaped {
            return;
        }
        // Signal the child's whole process group, not just the shell
        // itself: it may have forked its own children into the group this
        // session set up for it in the fork branch above.
        let _ = signal::killpg(self.child, Signal::SIGHUP);

        const POLL_ATTEMPTS: u32 = 20;
        const POLL_INTERVAL: std::time::Duration = std::time::Duration::from_millis(50);
        for _ in 0..POLL_ATTEMPTS {
            match waitpid(self.child, Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::StillAlive) => std::thread::sleep(POLL_INTERVAL),
                Ok(_) | Err(_) => {
                    self.reaped = true;
                    return;
                }
            }
        }

        let _ = signal::killpg(self.child, Signal::SIGKILL);
        let _ = waitpid(self.child, None);
        self.reaped = true;
    }
}
