//! Scancode to keycode to keysym to UTF-8/escape-sequence keyboard
//! pipeline: the concrete `xkbcommon` keymap backend, the special-keys
//! sequence table, and the dispatch order that ties them together with
//! repeat timers and the VT-switch/DPMS intercepts.

mod keymap;
mod pipeline;
mod sequences;

pub use keymap::XkbKeymapBackend;
pub use pipeline::{Dispatch, KeyboardPipeline, RepeatState};
pub use sequences::{sequence_for_keysym, vt_switch_target};
