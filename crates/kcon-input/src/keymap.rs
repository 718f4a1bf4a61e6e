use kcon_core::{ComposeOutcome, KeymapBackend, KeymapError};
use xkbcommon::xkb;

/// Scancode translation state backed by `xkbcommon`: keycode -> keysym via
/// the compiled layout, plus a compose-key state machine for dead-key
/// sequences. The evdev-to-xkb `+8` offset is applied by the caller before
/// any method here is invoked.
pub struct XkbKeymapBackend {
    state: xkb::State,
    keymap: xkb::Keymap,
    compose_state: xkb::compose::State,
    led_mask: u32,
    led_dirty: bool,
}

impl XkbKeymapBackend {
    pub fn new(layout: &str, variant: &str, options: &str, locale: &str) -> Result<Self, KeymapError> {
        let context = xkb::Context::new(xkb::CONTEXT_NO_FLAGS);
        let keymap = xkb::Keymap::new_from_names(
            &context,
            "",
            "",
            layout,
            variant,
            Some(options.to_string()),
            xkb::KEYMAP_COMPILE_NO_FLAGS,
        )
        .ok_or_else(|| KeymapError::CompileFailed {
            layout: layout.to_string(),
            variant: variant.to_string(),
            options: options.to_string(),
        })?;
        let state = xkb::State::new(&keymap);

        let compose_table = xkb::compose::Table::new_from_locale(
            &context,
            std::ffi::OsStr::new(locale),
            xkb::compose::COMPILE_NO_FLAGS,
        )
        .unwrap_or_else(|()| {
            xkb::compose::Table::new_from_locale(&context, std::ffi::OsStr::new("C"), xkb::compose::COMPILE_NO_FLAGS)
                .expect("C locale compose table always compiles")
        });
        let compose_state = xkb::compose::State::new(&compose_table, xkb::compose::STATE_NO_FLAGS);

        Ok(Self { state, keymap, compose_state, led_mask: 0, led_dirty: false })
    }
}

impl KeymapBackend for XkbKeymapBackend {
    fn update_key(&mut self, keycode: u32, pressed: bool) -> Option<u32> {
        let direction = if pressed { xkb::KeyDirection::Down } else { xkb::KeyDirection::Up };
        let changed = self.state.update_key(keycode, direction);
        if changed.bits() != 0 {
            let new_mask = self.state.led_name_is_active(xkb::LED_NAME_CAPS) as u32
                | ((self.state.led_name_is_active(xkb::LED_NAME_NUM) as u32) << 1)
                | ((self.state.led_name_is_active(xkb::LED_NAME_SCROLL) as u32) << 2);
            if new_mask != self.led_mask {
                self.led_mask = new_mask;
                self.led_dirty = true;
            }
        }
        if pressed {
            Some(self.state.key_get_one_sym(keycode))
        } else {
            None
        }
    }

    fn key_utf8(&mut self, keycode: u32) -> String {
        self.state.key_get_utf8(keycode)
    }

    fn key_repeats(&self, keycode: u32) -> bool {
        self.keymap.key_repeats(keycode)
    }

    fn mod1_active(&self) -> bool {
        self.state.mod_name_is_active(xkb::MOD_NAME_MOD1, xkb::STATE_MODS_EFFECTIVE)
    }

    fn control_active(&self) -> bool {
        self.state.mod_name_is_active(xkb::MOD_NAME_CTRL, xkb::STATE_MODS_EFFECTIVE)
    }

    fn compose_feed(&mut self, keysym: u32) -> ComposeOutcome {
        self.compose_state.feed(keysym);
        match self.compose_state.status() {
            xkb::compose::Status::Nothing => ComposeOutcome::Ignored,
            xkb::compose::Status::Composing => ComposeOutcome::Composing,
            xkb::compose::Status::Cancelled => ComposeOutcome::Cancelled,
            xkb::compose::Status::Composed => ComposeOutcome::Composed,
        }
    }

    fn compose_result_keysym(&self) -> Option<u32> {
        self.compose_state.keysym()
    }

    fn compose_result_utf8(&self) -> String {
        self.compose_state.utf8().unwrap_or_default()
    }

    fn compose_reset(&mut self) {
        self.compose_state.reset();
    }

    fn take_led_update(&mut self) -> Option<u32> {
        if self.led_dirty {
            self.led_dirty = false;
            Some(self.led_mask)
        } else {
            None
        }
    }
}
