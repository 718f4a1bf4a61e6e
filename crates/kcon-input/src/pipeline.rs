use std::collections::HashSet;

use kcon_core::{ComposeOutcome, DpmsLevel, KeymapBackend};

use crate::sequences::{self, PRINT};

/// What the keyboard pipeline wants the caller (the platform supervisor) to
/// do as a result of dispatching one keysym.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Write these bytes to the pty master.
    Bytes(Vec<u8>),
    /// Switch to this VT number (1-12).
    VtSwitch(u32),
    /// Apply this DPMS level.
    Dpms(DpmsLevel),
    /// Event was consumed but produces no externally visible effect
    /// (e.g. `COMPOSING`, an unmapped scancode).
    Consumed,
}

/// Auto-repeat timer state for exactly one outstanding repeating key.
#[derive(Debug, Default)]
pub struct RepeatState {
    pub keycode: Option<u32>,
    pub keysym: Option<u32>,
}

impl RepeatState {
    pub fn arm(&mut self, keycode: u32, keysym: u32) {
        self.keycode = Some(keycode);
        self.keysym = Some(keysym);
    }

    pub fn cancel(&mut self) {
        self.keycode = None;
        self.keysym = None;
    }

    pub fn matches(&self, keycode: u32) -> bool {
        self.keycode == Some(keycode)
    }
}

/// Translates raw scancodes into UTF-8/terminal escape sequences via a
/// [`KeymapBackend`], applying the dispatch order from the keysym-dispatch
/// algorithm: Print-key DPMS suspend, DPMS-on-otherwise, VT-switch
/// interception, then compose/special-keys/UTF-8+meta-prefix.
pub struct KeyboardPipeline<K: KeymapBackend> {
    keymap: K,
    last_scancode: Option<u32>,
    /// Scancodes currently held down, the substrate `reset()` clears when a
    /// VT switch takes input away from this session mid-keypress.
    pressed: HashSet<u32>,
    pub repeat: RepeatState,
}

impl<K: KeymapBackend> KeyboardPipeline<K> {
    pub fn new(keymap: K) -> Self {
        Self { keymap, last_scancode: None, pressed: HashSet::new(), repeat: RepeatState::default() }
    }

    pub fn keymap_mut(&mut self) -> &mut K {
        &mut self.keymap
    }

    /// Scancodes currently tracked as pressed.
    pub fn pressed(&self) -> &HashSet<u32> {
        &self.pressed
    }

    /// Clears all held-key and repeat/compose state without touching the
    /// keymap's modifier latches. Called when this session loses the VT
    /// mid-keypress: the kernel won't deliver the matching release events,
    /// so nothing else would ever clear them.
    pub fn reset(&mut self) {
        self.last_scancode = None;
        self.pressed.clear();
        self.repeat.cancel();
        self.keymap.compose_reset();
    }

    /// The LED bitmask the keymap backend wants applied, if changed since
    /// the last call.
    pub fn take_led_update(&mut self) -> Option<u32> {
        self.keymap.take_led_update()
    }

    /// Feed one raw evdev scancode + pressed state. Filters out a repeated
    /// "same scancode still pressed" event (auto-repeat spam from the
    /// backend itself, distinct from our own repeat timer) before
    /// translating to an xkb keycode (`scancode + 8`).
    pub fn handle_scancode(&mut self, scancode: u32, pressed: bool) -> Option<Dispatch> {
        if pressed && self.last_scancode == Some(scancode) {
            return None;
        }
        self.last_scancode = if pressed { Some(scancode) } else { None };
        if pressed {
            self.pressed.insert(scancode);
        } else {
            self.pressed.remove(&scancode);
        }

        let keycode = scancode + 8;
        let keysym = self.keymap.update_key(keycode, pressed);

        if !pressed {
            if self.repeat.matches(keycode) {
                self.repeat.cancel();
            }
            return None;
        }

        if self.keymap.key_repeats(keycode) {
            if let Some(sym) = keysym {
                self.repeat.arm(keycode, sym);
            }
        }

        let keysym = keysym?;
        Some(self.dispatch_keysym(keycode, keysym))
    }

    /// Re-run the dispatch for the cached repeat keycode/keysym when the
    /// repeat timer fires. Does not re-run the scancode-level filtering.
    pub fn handle_repeat_fire(&mut self) -> Option<Dispatch> {
        let keycode = self.repeat.keycode?;
        let keysym = self.repeat.keysym?;
        Some(self.dispatch_keysym(keycode, keysym))
    }

    fn dispatch_keysym(&mut self, keycode: u32, keysym: u32) -> Dispatch {
        if keysym == PRINT {
            return Dispatch::Dpms(DpmsLevel::Suspend);
        }

        if let Some(vt) = sequences::vt_switch_target(keysym) {
            return Dispatch::VtSwitch(vt);
        }

        // Any key that reaches here (past the Print intercept) also implies
        // "ensure DPMS is ON"; the caller applies that once it sees a
        // non-Dpms dispatch come back, since DPMS is KMS state this
        // pipeline has no handle on.
        self.handle_keysym(keycode, keysym)
    }

    fn handle_keysym(&mut self, keycode: u32, keysym: u32) -> Dispatch {
        let outcome = self.keymap.compose_feed(keysym);
        match outcome {
            ComposeOutcome::Composing => return Dispatch::Consumed,
            ComposeOutcome::Cancelled => {
                self.keymap.compose_reset();
                return Dispatch::Consumed;
            }
            ComposeOutcome::Composed => {
                let utf8 = self.keymap.compose_result_utf8();
                self.keymap.compose_reset();
                if utf8.is_empty() {
                    return Dispatch::Consumed;
                }
                return Dispatch::Bytes(utf8.into_bytes());
            }
            ComposeOutcome::Ignored => {}
        }

        if let Some(seq) = sequences::sequence_for_keysym(keysym, self.keymap.mod1_active(), self.keymap.control_active()) {
            return Dispatch::Bytes(seq.to_vec());
        }

        let mut text = self.keymap.key_utf8(keycode).into_bytes();
        if text.is_empty() {
            return Dispatch::Consumed;
        }
        if self.keymap.mod1_active() {
            let mut out = vec![0x1b];
            out.append(&mut text);
            return Dispatch::Bytes(out);
        }
        Dispatch::Bytes(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kcon_core::KeymapError;

    struct FakeKeymap {
        sym: u32,
        utf8: String,
        mod1: bool,
        ctrl: bool,
        repeats: bool,
    }

    impl KeymapBackend for FakeKeymap {
        fn update_key(&mut self, _keycode: u32, pressed: bool) -> Option<u32> {
            pressed.then_some(self.sym)
        }
        fn key_utf8(&mut self, _keycode: u32) -> String {
            self.utf8.clone()
        }
        fn key_repeats(&self, _keycode: u32) -> bool {
            self.repeats
        }
        fn mod1_active(&self) -> bool {
            self.mod1
        }
        fn control_active(&self) -> bool {
            self.ctrl
        }
        fn compose_feed(&mut self, _keysym: u32) -> ComposeOutcome {
            ComposeOutcome::Ignored
        }
        fn compose_result_keysym(&self) -> Option<u32> {
            None
        }
        fn compose_result_utf8(&self) -> String {
            String::new()
        }
        fn compose_reset(&mut self) {}
        fn take_led_update(&mut self) -> Option<u32> {
            None
        }
    }

    fn _unused(_: KeymapError) {}

    #[test]
    fn meta_prefix_prepends_esc() {
        let keymap = FakeKeymap { sym: 0x61, utf8: "a".into(), mod1: true, ctrl: false, repeats: false };
        let mut pipeline = KeyboardPipeline::new(keymap);
        let d = pipeline.handle_scancode(30 - 8, true).unwrap();
        assert_eq!(d, Dispatch::Bytes(vec![0x1b, b'a']));
    }

    #[test]
    fn f1_with_control_uses_ctl_sequence_not_base() {
        let keymap = FakeKeymap { sym: 0xffbe, utf8: String::new(), mod1: false, ctrl: true, repeats: false };
        let mut pipeline = KeyboardPipeline::new(keymap);
        let d = pipeline.handle_scancode(59 - 8, true).unwrap();
        assert_eq!(d, Dispatch::Bytes(b"\x1b[1;5P".to_vec()));
    }

    #[test]
    fn print_key_requests_dpms_suspend() {
        let keymap = FakeKeymap { sym: PRINT, utf8: String::new(), mod1: false, ctrl: false, repeats: false };
        let mut pipeline = KeyboardPipeline::new(keymap);
        let d = pipeline.handle_scancode(99, true).unwrap();
        assert_eq!(d, Dispatch::Dpms(DpmsLevel::Suspend));
    }

    #[test]
    fn release_cancels_matching_repeat_timer() {
        let keymap = FakeKeymap { sym: 0x61, utf8: "a".into(), mod1: false, ctrl: false, repeats: true };
        let mut pipeline = KeyboardPipeline::new(keymap);
        pipeline.handle_scancode(30 - 8, true);
        assert!(pipeline.repeat.keycode.is_some());
        pipeline.handle_scancode(30 - 8, false);
        assert!(pipeline.repeat.keycode.is_none());
    }

    #[test]
    fn repeated_scancode_while_still_pressed_is_filtered() {
        let keymap = FakeKeymap { sym: 0x61, utf8: "a".into(), mod1: false, ctrl: false, repeats: false };
        let mut pipeline = KeyboardPipeline::new(keymap);
        assert!(pipeline.handle_scancode(30 - 8, true).is_some());
        assert!(pipeline.handle_scancode(30 - 8, true).is_none());
    }

    #[test]
    fn pressed_set_tracks_held_scancodes() {
        let keymap = FakeKeymap { sym: 0x61, utf8: "a".into(), mod1: false, ctrl: false, repeats: false };
        let mut pipeline = KeyboardPipeline::new(keymap);
        pipeline.handle_scancode(30 - 8, true);
        assert!(pipeline.pressed().contains(&(30 - 8)));
        pipeline.handle_scancode(30 - 8, false);
        assert!(!pipeline.pressed().contains(&(30 - 8)));
    }

    #[test]
    fn reset_clears_pressed_set_and_repeat_timer() {
        let keymap = FakeKeymap { sym: 0x61, utf8: "a".into(), mod1: false, ctrl: false, repeats: true };
        let mut pipeline = KeyboardPipeline::new(keymap);
        pipeline.handle_scancode(30 - 8, true);
        assert!(!pipeline.pressed().is_empty());
        assert!(pipeline.repeat.keycode.is_some());
        pipeline.reset();
        assert!(pipeline.pressed().is_empty());
        assert!(pipeline.repeat.keycode.is_none());
    }
}
