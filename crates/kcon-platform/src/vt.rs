use std::fs::{File, OpenOptions};
use std::os::fd::{AsRawFd, RawFd};

use nix::libc;
use nix::sys::termios::{self, SetArg, Termios};
use thiserror::Error;

/// Linux console (`linux/kd.h`, `linux/vt.h`) ioctl requests, mode bits, and
/// the `vt_mode` struct layout. These are stable kernel ABI constants that
/// the `libc` crate does not expose.
#[allow(non_camel_case_types)]
mod vt_sys {
    use nix::libc;

    pub const KDGKBMODE: libc::c_ulong = 0x4B44;
    pub const KDSKBMODE: libc::c_ulong = 0x4B45;
    pub const K_MEDIUMRAW: libc::c_int = 2;

    pub const VT_OPENQRY: libc::c_ulong = 0x5600;
    pub const VT_SETMODE: libc::c_ulong = 0x5602;
    pub const VT_RELDISP: libc::c_ulong = 0x5605;
    pub const VT_ACTIVATE: libc::c_ulong = 0x5606;
    pub const VT_WAITACTIVE: libc::c_ulong = 0x5607;
    pub const VT_ACKACQ: libc::c_int = 2;
    pub const VT_PROCESS: libc::c_char = 1;

    pub const KDSETMODE: libc::c_ulong = 0x4B3A;
    pub const KD_TEXT: libc::c_int = 0x00;
    pub const KD_GRAPHICS: libc::c_int = 0x01;

    pub const KDSETLED: libc::c_ulong = 0x4B32;

    #[repr(C)]
    pub struct vt_mode {
        pub mode: libc::c_char,
        pub waitv: libc::c_char,
        pub relsig: libc::c_short,
        pub acqsig: libc::c_short,
        pub frsig: libc::c_short,
    }
}

#[derive(Debug, Error)]
pub enum TtyError {
    #[error("failed to open controlling tty: {0}")]
    Open(#[source] std::io::Error),
    #[error("tcgetattr/tcsetattr failed: {0}")]
    Termios(#[source] nix::errno::Errno),
    #[error("VT ioctl {name} failed: {source}")]
    Ioctl { name: &'static str, source: nix::errno::Errno },
}

/// VT process-switch signal numbers, installed via `VT_SETMODE`: the
/// kernel sends `release` before handing the VT away and `acquire` after
/// handing it back, matching the `SignalPipe` tags this module's caller
/// wires up.
const VT_RELEASE_SIGNAL: libc::c_int = libc::SIGUSR1;
const VT_ACQUIRE_SIGNAL: libc::c_int = libc::SIGUSR2;

/// Owns the controlling tty fd, its original termios (restored on drop),
/// and the `VT_SETMODE`/`KDSKBMODE` state needed for process-controlled
/// VT switching with raw scancode delivery.
pub struct RawTty {
    file: File,
    original_termios: Termios,
    original_kbmode: libc::c_long,
}

impl RawTty {
    pub fn open(path: &str) -> Result<Self, TtyError> {
        let file = OpenOptions::new().read(true).write(true).open(path).map_err(TtyError::Open)?;
        let fd = file.as_raw_fd();

        let original_termios = termios::tcgetattr(&file).map_err(TtyError::Termios)?;
        let mut raw = original_termios.clone();
        termios::cfmakeraw(&mut raw);
        termios::tcsetattr(&file, SetArg::TCSANOW, &raw).map_err(TtyError::Termios)?;

        let mut original_kbmode: libc::c_long = 0;
        ioctl_get(fd, vt_sys::KDGKBMODE, &mut original_kbmode as *mut _ as *mut libc::c_void, "KDGKBMODE")?;
        ioctl_set(fd, vt_sys::KDSKBMODE, vt_sys::K_MEDIUMRAW as libc::c_long, "KDSKBMODE")?;

        Ok(Self { file, original_termios, original_kbmode })
    }

    /// Allocates a free VT via `VT_OPENQRY` on the bootstrap tty, switches
    /// to it, and reopens the device node for that VT in graphics mode.
    /// Mirrors the original's startup sequence of querying a free VT from
    /// the currently-attached tty, then operating on the freshly allocated
    /// one rather than whichever VT the process happened to start on.
    pub fn open_free_vt() -> Result<(Self, i32), TtyError> {
        let bootstrap_path = if cfg!(target_os = "linux") { "/dev/tty" } else { "/dev/ttyv0" };
        let bootstrap = OpenOptions::new().read(true).write(true).open(bootstrap_path).map_err(TtyError::Open)?;
        let mut vt_num: libc::c_int = 0;
        ioctl_get(bootstrap.as_raw_fd(), vt_sys::VT_OPENQRY, &mut vt_num as *mut _ as *mut libc::c_void, "VT_OPENQRY")?;
        drop(bootstrap);

        let target_path = if cfg!(target_os = "linux") {
            format!("/dev/tty{vt_num}")
        } else {
            format!("/dev/ttyv{:x}", vt_num - 1)
        };
        let tty = Self::open(&target_path)?;
        tty.activate(vt_num)?;
        tty.set_graphics_mode()?;
        Ok((tty, vt_num))
    }

    pub fn fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }

    /// `VT_OPENQRY`: the number of the first free VT.
    pub fn first_free_vt(&self) -> Result<i32, TtyError> {
        let mut num: libc::c_int = 0;
        ioctl_get(self.fd(), vt_sys::VT_OPENQRY, &mut num as *mut _ as *mut libc::c_void, "VT_OPENQRY")?;
        Ok(num)
    }

    /// `KDSETMODE(KD_GRAPHICS)`: takes the console out of text mode so the
    /// kernel stops drawing its own text cursor and scrollback over the
    /// KMS scanout this process owns.
    pub fn set_graphics_mode(&self) -> Result<(), TtyError> {
        ioctl_set(self.fd(), vt_sys::KDSETMODE, vt_sys::KD_GRAPHICS as libc::c_long, "KDSETMODE(graphics)")
    }

    /// `KDSETLED`: syncs the keyboard LEDs (caps/num/scroll lock) to the
    /// bitmask the keymap backend reports after a dispatch.
    pub fn set_leds(&self, led_mask: u32) -> Result<(), TtyError> {
        ioctl_set(self.fd(), vt_sys::KDSETLED, led_mask as libc::c_long, "KDSETLED")
    }

    /// Puts the VT into `VT_PROCESS` mode so the kernel asks permission via
    /// signals instead of switching out from under the process.
    pub fn set_process_switch_mode(&self) -> Result<(), TtyError> {
        let mode = vt_sys::vt_mode {
            mode: vt_sys::VT_PROCESS,
            waitv: 0,
            relsig: VT_RELEASE_SIGNAL as i16,
            acqsig: VT_ACQUIRE_SIGNAL as i16,
            frsig: 0,
        };
        ioctl_set_struct(self.fd(), vt_sys::VT_SETMODE, &mode, "VT_SETMODE")
    }

    pub fn acknowledge_release(&self) -> Result<(), TtyError> {
        ioctl_set(self.fd(), vt_sys::VT_RELDISP, 1, "VT_RELDISP(release)")
    }

    pub fn acknowledge_acquire(&self) -> Result<(), TtyError> {
        ioctl_set(self.fd(), vt_sys::VT_RELDISP, vt_sys::VT_ACKACQ as libc::c_long, "VT_RELDISP(acquire)")
    }

    pub fn activate(&self, vt_num: i32) -> Result<(), TtyError> {
        ioctl_set(self.fd(), vt_sys::VT_ACTIVATE, vt_num as libc::c_long, "VT_ACTIVATE")?;
        ioctl_set(self.fd(), vt_sys::VT_WAITACTIVE, vt_num as libc::c_long, "VT_WAITACTIVE")
    }
}

impl Drop for RawTty {
    fn drop(&mut self) {
        let _ = termios::tcsetattr(&self.file, SetArg::TCSANOW, &self.original_termios);
        let _ = ioctl_set(self.fd(), vt_sys::KDSKBMODE, self.original_kbmode, "KDSKBMODE(restore)");
        let _ = ioctl_set(self.fd(), vt_sys::KDSETMODE, vt_sys::KD_TEXT as libc::c_long, "KDSETMODE(text)");
    }
}

fn ioctl_get(fd: RawFd, request: libc::c_ulong, out: *mut libc::c_void, name: &'static str) -> Result<(), TtyError> {
    // SAFETY: `out` points at a live, appropriately sized local on the
    // caller's stack for the duration of this call.
    let ret = unsafe { libc::ioctl(fd, request as _, out) };
    if ret == -1 {
        Err(TtyError::Ioctl { name, source: nix::errno::Errno::last() })
    } else {
        Ok(())
    }
}

fn ioctl_set(fd: RawFd, request: libc::c_ulong, value: libc::c_long, name: &'static str) -> Result<(), TtyError> {
    // SAFETY: this ioctl family takes an integer argument by value, not a
    // pointer; passing `value` directly matches the kernel's expectation.
    let ret = unsafe { libc::ioctl(fd, request as _, value) };
    if ret == -1 {
        Err(TtyError::Ioctl { name, source: nix::errno::Errno::last() })
    } else {
        Ok(())
    }
}

fn ioctl_set_struct<T>(fd: RawFd, request: libc::c_ulong, value: &T, name: &'static str) -> Result<(), TtyError> {
    // SAFETY: `value` is a valid, initialized `T` for the duration of the
    // call; the kernel only reads from it for these `VT_*` requests.
    let ret = unsafe { libc::ioctl(fd, request as _, value as *const T) };
    if ret == -1 {
        Err(TtyError::Ioctl { name, source: nix::errno::Errno::last() })
    } else {
        Ok(())
    }
}
