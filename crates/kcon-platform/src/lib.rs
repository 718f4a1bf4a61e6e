//! The three external-collaborator implementations the supervisor wires
//! together: a `drm`-backed KMS device, an `nix`-backed pty spawn helper,
//! and the VT acquisition/release state machine itself plus the
//! self-pipe signal plumbing the priority event loop polls.

mod drmkms;
mod pty;
mod signals;
mod supervisor;
mod vt;

pub use drmkms::DrmKms;
pub use pty::PtyProcess;
pub use signals::SignalPipe;
pub use supervisor::{Supervisor, SupervisorState, VtTransition};
pub use vt::{RawTty, TtyError};
