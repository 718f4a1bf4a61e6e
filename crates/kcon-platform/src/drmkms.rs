use std::fs::{File, OpenOptions};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;

use drm::buffer::DrmFourcc;
use drm::control::{connector, crtc, dumbbuffer::DumbBuffer, Device as ControlDevice, Mode};
use drm::Device as BasicDevice;
use kcon_core::{DpmsLevel, FramebufferView, KmsBackend, KmsError};

/// Driver names tried in order when no device path is given explicitly.
const DRIVER_CANDIDATES: &[&str] = &["i915", "radeon"];

struct Card(File);

impl AsFd for Card {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.0.as_fd()
    }
}
impl BasicDevice for Card {}
impl ControlDevice for Card {}

/// A single-CRTC, single-connector KMS scanout target backed by a dumb
/// buffer. Owns the mapped memory and the saved CRTC state needed to
/// restore the display on VT release.
pub struct DrmKms {
    card: Card,
    connector: connector::Handle,
    crtc: crtc::Handle,
    mode: Mode,
    buffer: DumbBuffer,
    fb: drm::control::framebuffer::Handle,
    mapping: drm::control::dumbbuffer::DumbMapping<'static>,
    saved_crtc: Option<crtc::Info>,
    is_master: bool,
}

impl DrmKms {
    pub fn open_first_available() -> Result<Self, KmsError> {
        for name in DRIVER_CANDIDATES {
            if let Ok(path) = find_device_by_driver(name) {
                if let Ok(kms) = Self::open(&path) {
                    return Ok(kms);
                }
            }
        }
        Err(KmsError::NoDevice)
    }

    pub fn open(path: &str) -> Result<Self, KmsError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_CLOEXEC)
            .open(path)
            .map_err(|_| KmsError::NoDevice)?;
        let card = Card(file);

        let resources = card.resource_handles().map_err(|_| KmsError::NoConnector)?;
        let connector = resources
            .connectors()
            .iter()
            .find_map(|&h| {
                let info = card.get_connector(h, true).ok()?;
                (info.state() == connector::State::Connected).then_some(h)
            })
            .ok_or(KmsError::NoConnector)?;
        let conn_info = card.get_connector(connector, true).map_err(|_| KmsError::NoConnector)?;
        let mode = *conn_info.modes().first().ok_or(KmsError::NoModes)?;

        let encoder = conn_info
            .current_encoder()
            .or_else(|| conn_info.encoders().first().copied())
            .ok_or(KmsError::NoConnector)?;
        let enc_info = card.get_encoder(encoder).map_err(|_| KmsError::NoConnector)?;
        let crtc_handle = enc_info.crtc().ok_or(KmsError::NoConnector)?;

        let (width, height) = mode.size();
        let mut buffer = card
            .create_dumb_buffer((width as u32, height as u32), DrmFourcc::Xrgb8888, 32)
            .map_err(|e| KmsError::AllocFailed(e.to_string()))?;
        let fb = card
            .add_framebuffer(&buffer, 24, 32)
            .map_err(|e| KmsError::AllocFailed(e.to_string()))?;

        // SAFETY: `mapping` borrows `buffer`; both are owned together by
        // `DrmKms` below and `buffer` is never moved or dropped while
        // `mapping` is alive.
        let mapping: drm::control::dumbbuffer::DumbMapping<'static> = unsafe {
            std::mem::transmute(card.map_dumb_buffer(&mut buffer).map_err(|e| KmsError::AllocFailed(e.to_string()))?)
        };

        Ok(Self {
            card,
            connector,
            crtc: crtc_handle,
            mode,
            buffer,
            fb,
            mapping,
            saved_crtc: None,
            is_master: false,
        })
    }

    fn program_crtc(&mut self) -> Result<(), KmsError> {
        self.card
            .set_crtc(self.crtc, Some(self.fb), (0, 0), &[self.connector], Some(self.mode))
            .map_err(|e| KmsError::SetCrtcFailed(e.to_string()))
    }
}

impl KmsBackend for DrmKms {
    fn width(&self) -> u32 {
        self.mode.size().0 as u32
    }

    fn height(&self) -> u32 {
        self.mode.size().1 as u32
    }

    fn framebuffer(&mut self) -> FramebufferView<'_> {
        let width = self.width();
        let height = self.height();
        let pitch = drm::buffer::Buffer::pitch(&self.buffer);
        FramebufferView {
            pixels: self.mapping.as_mut(),
            width,
            height,
            pitch,
            bpp: 4,
        }
    }

    fn request_vblank(&mut self) -> Result<(), KmsError> {
        use drm::{VblankWaitFlags, VblankWaitTarget};
        self.card
            .wait_vblank(VblankWaitTarget::Relative(1), VblankWaitFlags::EVENT, 1, 0)
            .map(|_| ())
            .map_err(|e| KmsError::SetCrtcFailed(e.to_string()))
    }

    fn fd(&self) -> RawFd {
        self.card.0.as_raw_fd()
    }

    fn drain_vblank_event(&mut self) {
        let _ = self.card.receive_events().map(|events| events.count());
    }

    fn set_master(&mut self) -> Result<(), KmsError> {
        self.card.acquire_master_lock().map_err(|e| KmsError::SetMasterFailed(e.to_string()))?;
        self.is_master = true;
        self.program_crtc()
    }

    fn drop_master(&mut self) -> Result<(), KmsError> {
        self.card.release_master_lock().map_err(|e| KmsError::SetMasterFailed(e.to_string()))?;
        self.is_master = false;
        Ok(())
    }

    fn save_crtc(&mut self) {
        self.saved_crtc = self.card.get_crtc(self.crtc).ok();
    }

    fn restore_crtc(&mut self) -> Result<(), KmsError> {
        if let Some(saved) = &self.saved_crtc {
            self.card
                .set_crtc(self.crtc, saved.framebuffer(), (0, 0), &[self.connector], saved.mode())
                .map_err(|e| KmsError::SetCrtcFailed(e.to_string()))?;
        }
        Ok(())
    }

    fn set_dpms(&mut self, level: DpmsLevel) {
        let value: u64 = match level {
            DpmsLevel::On => 0,
            DpmsLevel::Standby => 1,
            DpmsLevel::Suspend => 2,
            DpmsLevel::Off => 3,
        };
        let props = match self.card.get_properties(self.connector) {
            Ok(p) => p,
            Err(e) => {
                log::warn!("failed to read connector properties for DPMS: {e}");
                return;
            }
        };
        for (handle, _) in props.iter() {
            if let Ok(info) = self.card.get_property(*handle) {
                if info.name().to_string_lossy() == "DPMS" {
                    if let Err(e) = self.card.set_property(self.connector, *handle, value) {
                        log::warn!("failed to set DPMS property: {e}");
                    }
                    return;
                }
            }
        }
        log::warn!("connector has no DPMS property");
    }
}

fn find_device_by_driver(name: &str) -> std::io::Result<String> {
    for i in 0..8 {
        let path = format!("/dev/dri/card{i}");
        if let Ok(file) = OpenOptions::new().read(true).write(true).open(&path) {
            let card = Card(file);
            if let Ok(version) = card.get_driver() {
                if version.name().to_string_lossy() == name {
                    return Ok(path);
                }
            }
        }
    }
    Err(std::io::Error::new(std::io::ErrorKind::NotFound, "no matching driver"))
}
