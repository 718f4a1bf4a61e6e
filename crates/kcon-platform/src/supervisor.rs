use kcon_core::{DpmsLevel, KmsBackend};

use crate::signals::VtSignal;
use crate::vt::{RawTty, TtyError};

/// Whether this VT currently owns the display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Foreground,
    Background,
}

/// What a `handle_signal` call asks the caller to do. The supervisor only
/// owns KMS/tty state; the key-repeat and idle timers and the keyboard
/// pipeline live in the caller, so the VT-release/acquire side effects that
/// touch them (cancel timers, reset keyboard state) are reported back here
/// instead of being applied directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VtTransition {
    /// VT was just released: cancel outstanding timers and reset keyboard
    /// state (pressed keys, LEDs) since this session no longer owns input.
    Released,
    /// VT was just handed back: re-arm the idle timer.
    Acquired,
    /// Caller should begin shutdown.
    Shutdown,
}

/// Drives the foreground/background state machine that a VT-switch signal
/// pair (`SIGUSR1` release, `SIGUSR2` acquire) walks through, owning the
/// KMS master handoff and the saved/restored CRTC state that goes with it.
pub struct Supervisor {
    state: SupervisorState,
    tty: RawTty,
}

impl Supervisor {
    pub fn new(tty: RawTty) -> Result<Self, TtyError> {
        tty.set_process_switch_mode()?;
        Ok(Self { state: SupervisorState::Foreground, tty })
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    pub fn tty(&self) -> &RawTty {
        &self.tty
    }

    /// Start-of-day handoff: becomes DRM master and saves the incumbent
    /// CRTC configuration so it can be restored on exit.
    pub fn acquire_display<K: KmsBackend>(&mut self, kms: &mut K) {
        kms.save_crtc();
        if let Err(e) = kms.set_master() {
            log::error!("failed to become drm master: {e}");
        }
    }

    /// Releases DRM master and restores the saved CRTC state, then
    /// acknowledges the VT switch so the kernel completes the handoff.
    /// Also restores DPMS to on so the incoming VT isn't handed a
    /// suspended display.
    fn handle_release<K: KmsBackend>(&mut self, kms: &mut K) {
        kms.set_dpms(DpmsLevel::On);
        if let Err(e) = kms.restore_crtc() {
            log::warn!("failed to restore crtc on vt release: {e}");
        }
        if let Err(e) = kms.drop_master() {
            log::warn!("failed to drop drm master on vt release: {e}");
        }
        if let Err(e) = self.tty.acknowledge_release() {
            log::warn!("VT_RELDISP(release) failed: {e}");
        }
        self.state = SupervisorState::Background;
    }

    /// Re-acquires DRM master, reprograms the CRTC and acknowledges the
    /// switch back to this VT.
    fn handle_acquire<K: KmsBackend>(&mut self, kms: &mut K) {
        if let Err(e) = kms.set_master() {
            log::error!("failed to reacquire drm master on vt acquire: {e}");
        }
        if let Err(e) = self.tty.acknowledge_acquire() {
            log::warn!("VT_RELDISP(acquire) failed: {e}");
        }
        self.state = SupervisorState::Foreground;
    }

    /// Consumes one `VtSignal`, updates state/KMS accordingly, and reports
    /// what the caller still needs to do (see [`VtTransition`]).
    pub fn handle_signal<K: KmsBackend>(&mut self, signal: VtSignal, kms: &mut K) -> VtTransition {
        match signal {
            VtSignal::Release => {
                self.handle_release(kms);
                VtTransition::Released
            }
            VtSignal::Acquire => {
                self.handle_acquire(kms);
                VtTransition::Acquired
            }
            VtSignal::Interrupt => VtTransition::Shutdown,
        }
    }

    /// DPMS is only meaningful while this VT owns the display; while in
    /// the background the request is dropped since the foreground session
    /// owns the physical output.
    pub fn request_dpms<K: KmsBackend>(&self, kms: &mut K, level: DpmsLevel) {
        if self.state == SupervisorState::Foreground {
            kms.set_dpms(level);
        }
    }

    pub fn is_foreground(&self) -> bool {
        self.state == SupervisorState::Foreground
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kcon_core::{FramebufferView, KmsError};
    use std::os::fd::RawFd;

    struct FakeKms {
        master: bool,
        dpms: Option<DpmsLevel>,
        restore_calls: u32,
    }

    impl KmsBackend for FakeKms {
        fn width(&self) -> u32 {
            80
        }
        fn height(&self) -> u32 {
            24
        }
        fn framebuffer(&mut self) -> FramebufferView<'_> {
            unimplemented!("not exercised by supervisor tests")
        }
        fn request_vblank(&mut self) -> Result<(), KmsError> {
            Ok(())
        }
        fn fd(&self) -> RawFd {
            -1
        }
        fn drain_vblank_event(&mut self) {}
        fn set_master(&mut self) -> Result<(), KmsError> {
            self.master = true;
            Ok(())
        }
        fn drop_master(&mut self) -> Result<(), KmsError> {
            self.master = false;
            Ok(())
        }
        fn save_crtc(&mut self) {}
        fn restore_crtc(&mut self) -> Result<(), KmsError> {
            self.restore_calls += 1;
            Ok(())
        }
        fn set_dpms(&mut self, level: DpmsLevel) {
            self.dpms = Some(level);
        }
    }

    #[test]
    fn dpms_request_dropped_while_in_background() {
        let mut kms = FakeKms { master: true, dpms: None, restore_calls: 0 };
        // Build a `Supervisor` without a real tty by hand-setting state via
        // the release path exercised through `handle_signal` would need a
        // real fd; instead this test only checks the background gate logic
        // at the `request_dpms` level using a state constructed in place.
        let state = SupervisorState::Background;
        assert_eq!(state, SupervisorState::Background);
        if state == SupervisorState::Foreground {
            kms.set_dpms(DpmsLevel::Suspend);
        }
        assert!(kms.dpms.is_none());
    }

    #[test]
    fn release_drops_master_and_restores_crtc() {
        let mut kms = FakeKms { master: true, dpms: None, restore_calls: 0 };
        kms.set_master().unwrap();
        // Mirrors `Supervisor::handle_release`'s call order; a real
        // `Supervisor` needs a live tty fd to construct, which isn't
        // available in a unit test.
        kms.set_dpms(DpmsLevel::On);
        kms.restore_crtc().unwrap();
        kms.drop_master().unwrap();
        assert!(!kms.master);
        assert_eq!(kms.restore_calls, 1);
        assert_eq!(kms.dpms, Some(DpmsLevel::On));
    }
}
