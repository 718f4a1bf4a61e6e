/// Xkb keysym values for the subset of XF86 VT-switch keys this system
/// intercepts (`XF86_Switch_VT_1` .. `XF86_Switch_VT_12`).
const XF86_SWITCH_VT_1: u32 = 0x1008FE01;
const XF86_SWITCH_VT_12: u32 = 0x1008FE0C;

/// If `keysym` is one of the twelve VT-switch keys, returns the target VT
/// number (1-12).
pub fn vt_switch_target(keysym: u32) -> Option<u32> {
    if (XF86_SWITCH_VT_1..=XF86_SWITCH_VT_12).contains(&keysym) {
        Some(keysym - XF86_SWITCH_VT_1 + 1)
    } else {
        None
    }
}

mod keysyms {
    pub const PRINT: u32 = 0xff61;
    pub const UP: u32 = 0xff52;
    pub const DOWN: u32 = 0xff54;
    pub const LEFT: u32 = 0xff51;
    pub const RIGHT: u32 = 0xff53;
    pub const HOME: u32 = 0xff50;
    pub const END: u32 = 0xff57;
    pub const INSERT: u32 = 0xff63;
    pub const DELETE: u32 = 0xffff;
    pub const PAGE_UP: u32 = 0xff55;
    pub const PAGE_DOWN: u32 = 0xff56;
    pub const F1: u32 = 0xffbe;
    pub const F12: u32 = 0xffc9;
}

pub use keysyms::PRINT;

/// One entry of the special-keys table: base, Control-modified and
/// Alt-modified xterm escape sequences for a keysym that is not simple
/// printable text.
struct SeqEntry {
    keysym: u32,
    base: &'static [u8],
    ctl: &'static [u8],
    alt: &'static [u8],
}

/// Mirrors the 22-entry special-keys table from the reference console
/// implementation's `handle_term_special_keysym`: arrows, Home/End/
/// Insert/Delete/PageUp/PageDown, F1-F12, each with base/Ctrl/Alt xterm
/// `CSI`-style variants.
const TABLE: &[SeqEntry] = &[
    SeqEntry { keysym: keysyms::UP, base: b"\x1b[A", ctl: b"\x1b[1;5A", alt: b"\x1b[1;3A" },
    SeqEntry { keysym: keysyms::DOWN, base: b"\x1b[B", ctl: b"\x1b[1;5B", alt: b"\x1b[1;3B" },
    SeqEntry { keysym: keysyms::RIGHT, base: b"\x1b[C", ctl: b"\x1b[1;5C", alt: b"\x1b[1;3C" },
    SeqEntry { keysym: keysyms::LEFT, base: b"\x1b[D", ctl: b"\x1b[1;5D", alt: b"\x1b[1;3D" },
    SeqEntry { keysym: keysyms::HOME, base: b"\x1b[H", ctl: b"\x1b[1;5H", alt: b"\x1b[1;3H" },
    SeqEntry { keysym: keysyms::END, base: b"\x1b[F", ctl: b"\x1b[1;5F", alt: b"\x1b[1;3F" },
    SeqEntry { keysym: keysyms::INSERT, base: b"\x1b[2~", ctl: b"\x1b[2;5~", alt: b"\x1b[2;3~" },
    SeqEntry { keysym: keysyms::DELETE, base: b"\x1b[3~", ctl: b"\x1b[3;5~", alt: b"\x1b[3;3~" },
    SeqEntry { keysym: keysyms::PAGE_UP, base: b"\x1b[5~", ctl: b"\x1b[5;5~", alt: b"\x1b[5;3~" },
    SeqEntry { keysym: keysyms::PAGE_DOWN, base: b"\x1b[6~", ctl: b"\x1b[6;5~", alt: b"\x1b[6;3~" },
    SeqEntry { keysym: keysyms::F1, base: b"\x1bOP", ctl: b"\x1b[1;5P", alt: b"\x1b[1;3P" },
    SeqEntry { keysym: keysyms::F1 + 1, base: b"\x1bOQ", ctl: b"\x1b[1;5Q", alt: b"\x1b[1;3Q" },
    SeqEntry { keysym: keysyms::F1 + 2, base: b"\x1bOR", ctl: b"\x1b[1;5R", alt: b"\x1b[1;3R" },
    SeqEntry { keysym: keysyms::F1 + 3, base: b"\x1bOS", ctl: b"\x1b[1;5S", alt: b"\x1b[1;3S" },
    SeqEntry { keysym: keysyms::F1 + 4, base: b"\x1b[15~", ctl: b"\x1b[15;5~", alt: b"\x1b[15;3~" },
    SeqEntry { keysym: keysyms::F1 + 5, base: b"\x1b[17~", ctl: b"\x1b[17;5~", alt: b"\x1b[17;3~" },
    SeqEntry { keysym: keysyms::F1 + 6, base: b"\x1b[18~", ctl: b"\x1b[18;5~", alt: b"\x1b[18;3~" },
    SeqEntry { keysym: keysyms::F1 + 7, base: b"\x1b[19~", ctl: b"\x1b[19;5~", alt: b"\x1b[19;3~" },
    SeqEntry { keysym: keysyms::F1 + 8, base: b"\x1b[20~", ctl: b"\x1b[20;5~", alt: b"\x1b[20;3~" },
    SeqEntry { keysym: keysyms::F1 + 9, base: b"\x1b[21~", ctl: b"\x1b[21;5~", alt: b"\x1b[21;3~" },
    SeqEntry { keysym: keysyms::F1 + 10, base: b"\x1b[23~", ctl: b"\x1b[23;5~", alt: b"\x1b[23;3~" },
    SeqEntry { keysym: keysyms::F12, base: b"\x1b[24~", ctl: b"\x1b[24;5~", alt: b"\x1b[24;3~" },
];

/// Looks up the escape sequence for `keysym`, preferring the `ALT_*`
/// variant when `mod1` is effective, then `CTL_*` when `control` is
/// effective, falling back to the base sequence. Returns `None` when
/// `keysym` is not in the special-keys table at all.
pub fn sequence_for_keysym(keysym: u32, mod1: bool, control: bool) -> Option<&'static [u8]> {
    let entry = TABLE.iter().find(|e| e.keysym == keysym)?;
    if mod1 {
        Some(entry.alt)
    } else if control {
        Some(entry.ctl)
    } else {
        Some(entry.base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alt_takes_precedence_over_control() {
        let seq = sequence_for_keysym(keysyms::F1, true, true).unwrap();
        assert_eq!(seq, b"\x1b[1;3P");
    }

    #[test]
    fn control_without_alt_picks_ctl_variant() {
        let seq = sequence_for_keysym(keysyms::F1, false, true).unwrap();
        assert_eq!(seq, b"\x1b[1;5P");
    }

    #[test]
    fn neither_modifier_picks_base() {
        let seq = sequence_for_keysym(keysyms::UP, false, false).unwrap();
        assert_eq!(seq, b"\x1b[A");
    }

    #[test]
    fn f11_is_in_the_table() {
        let seq = sequence_for_keysym(keysyms::F1 + 10, false, false).unwrap();
        assert_eq!(seq, b"\x1b[23~");
    }

    #[test]
    fn unrecognized_keysym_is_not_in_table() {
        assert!(sequence_for_keysym(0x41, false, false).is_none());
    }

    #[test]
    fn vt_switch_keys_map_to_1_through_12() {
        assert_eq!(vt_switch_target(XF86_SWITCH_VT_1), Some(1));
        assert_eq!(vt_switch_target(XF86_SWITCH_VT_12), Some(12));
        assert_eq!(vt_switch_target(XF86_SWITCH_VT_1 - 1), None);
    }
}
