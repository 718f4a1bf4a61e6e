//! Shared types and external-collaborator traits for the terminal render loop.
//!
//! Nothing in this crate touches a real device, font, or pty. It defines the
//! vocabulary the grid, renderer, input pipeline and platform supervisor
//! share, and the trait boundaries a concrete backend must satisfy.

use std::fmt;

/// Foreground/background color slot count (standard ANSI 16-color table).
pub const NCOLORS: u8 = 16;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Format: u8 {
        const BOLD      = 0b0000_0001;
        const UNDERLINE = 0b0000_0010;
        const REVERSE   = 0b0000_0100;
    }
}

/// A packed cell attribute: foreground index, background index, format bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attr {
    pub fg: u8,
    pub bg: u8,
    pub format: Format,
}

impl Attr {
    pub const fn new(fg: u8, bg: u8, format: Format) -> Self {
        Self { fg, bg, format }
    }

    /// Substitute an out-of-range color index with the default, per the
    /// out-of-range-attribute error policy.
    pub fn sanitized(self) -> Self {
        Self {
            fg: if self.fg >= NCOLORS { 7 } else { self.fg },
            bg: if self.bg >= NCOLORS { 0 } else { self.bg },
            format: self.format,
        }
    }
}

impl Default for Attr {
    fn default() -> Self {
        Self { fg: 7, bg: 0, format: Format::empty() }
    }
}

/// One character position in the terminal grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    pub ch: char,
    pub attr: Attr,
    pub cursor: bool,
    pub dirty: bool,
}

impl Cell {
    pub const fn blank(attr: Attr) -> Self {
        Self { ch: ' ', attr, cursor: false, dirty: false }
    }

    /// Structural equality used by the dirty-tracking primitives: `ch`,
    /// `attr.format`, `attr.fg`, `attr.bg`. The cursor flag is intentionally
    /// excluded — cursor motion is marked through its own path.
    pub fn content_eq(&self, other: &Cell) -> bool {
        self.ch == other.ch && self.attr == other.attr
    }

    /// Equality used by the redraw engine's fast path, which additionally
    /// considers the cursor flag (a cursor-only move must still repaint).
    pub fn render_eq(&self, other: &Cell) -> bool {
        self.content_eq(other) && self.cursor == other.cursor
    }
}

impl Default for Cell {
    fn default() -> Self {
        Self::blank(Attr::default())
    }
}

/// Zero-based column/row position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pos {
    pub col: u16,
    pub row: u16,
}

impl Pos {
    pub const fn new(col: u16, row: u16) -> Self {
        Self { col, row }
    }
}

/// A half-open rectangular region of the grid: `[col0, col1) x [row0, row1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub col0: u16,
    pub row0: u16,
    pub col1: u16,
    pub row1: u16,
}

impl Rect {
    pub const fn new(col0: u16, row0: u16, col1: u16, row1: u16) -> Self {
        Self { col0, row0, col1, row1 }
    }

    pub fn width(&self) -> u16 {
        self.col1.saturating_sub(self.col0)
    }

    pub fn height(&self) -> u16 {
        self.row1.saturating_sub(self.row0)
    }

    pub fn contains(&self, col: u16, row: u16) -> bool {
        col >= self.col0 && col < self.col1 && row >= self.row0 && row < self.row1
    }
}

/// Terminal dimensions in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WinSize {
    pub cols: u16,
    pub rows: u16,
}

impl fmt::Display for WinSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.cols, self.rows)
    }
}

/// Screen rotation, in 90-degree steps clockwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    #[default]
    None,
    Cw90,
    Cw180,
    Cw270,
}

/// Display power management levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DpmsLevel {
    On,
    Standby,
    Suspend,
    Off,
}

// ──────────────────────────────────────────────
// External collaborator: glyph cache
// ──────────────────────────────────────────────

/// A rasterized glyph. An empty `bitmap` (zero coverage) is a valid, legal
/// response for a missing glyph — the renderer still paints the background.
#[derive(Debug, Clone, Default)]
pub struct GlyphBitmap {
    pub bitmap: Vec<u8>,
    pub pitch: usize,
    pub w: u32,
    pub h: u32,
    pub bearing_x: i32,
    pub bearing_y: i32,
    pub advance: f32,
}

/// Given a codepoint, weight and pixel size, returns a rasterized glyph.
/// Implementations must never fail on a missing glyph; they return an
/// empty bitmap instead.
pub trait GlyphCache {
    fn lookup(&mut self, codepoint: char, bold: bool, size: u32) -> GlyphBitmap;
}

// ──────────────────────────────────────────────
// External collaborator: escape-sequence parser sink
// ──────────────────────────────────────────────

/// The five-callback contract a terminal escape-sequence parser drives.
/// Implemented by the terminal adapter; the parser itself knows nothing
/// about the grid.
pub trait VtCallbacks {
    fn putchar(&mut self, pos: Pos, ch: char, attr: Attr);
    fn fill(&mut self, rect: Rect, ch: char, attr: Attr);
    fn copy(&mut self, rect: Rect, dst: Pos);
    fn cursor(&mut self, pos: Pos);
    fn param(&mut self, kind: u8, value: bool);
    fn bell(&mut self);
    fn respond(&mut self, bytes: &[u8]);
}

// ──────────────────────────────────────────────
// External collaborator: KMS/DRM backend
// ──────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum KmsError {
    #[error("no usable drm device found")]
    NoDevice,
    #[error("no connected connector")]
    NoConnector,
    #[error("connector has no usable modes")]
    NoModes,
    #[error("failed to become drm master: {0}")]
    SetMasterFailed(String),
    #[error("failed to program crtc: {0}")]
    SetCrtcFailed(String),
    #[error("dumb buffer allocation failed: {0}")]
    AllocFailed(String),
}

/// A view onto the mapped scanout memory. The renderer writes XRGB8888
/// pixels into `pixels`; it never persists the view beyond one blit call.
pub struct FramebufferView<'a> {
    pub pixels: &'a mut [u8],
    pub width: u32,
    pub height: u32,
    pub pitch: u32,
    pub bpp: u32,
}

/// The KMS/DRM device boundary: opens a device, allocates a scanout
/// buffer, programs the CRTC and delivers vblank events.
pub trait KmsBackend {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    /// Borrow the mapped scanout memory for writing.
    fn framebuffer(&mut self) -> FramebufferView<'_>;
    /// Request exactly one vblank event; the backend must not allow more
    /// than one outstanding request.
    fn request_vblank(&mut self) -> Result<(), KmsError>;
    /// Raw fd the event loop polls for vblank-event readability.
    fn fd(&self) -> std::os::fd::RawFd;
    /// Drain and acknowledge a pending vblank event on `fd`.
    fn drain_vblank_event(&mut self);
    fn set_master(&mut self) -> Result<(), KmsError>;
    fn drop_master(&mut self) -> Result<(), KmsError>;
    fn save_crtc(&mut self);
    fn restore_crtc(&mut self) -> Result<(), KmsError>;
    fn set_dpms(&mut self, level: DpmsLevel);
}

// ──────────────────────────────────────────────
// External collaborator: keymap backend
// ──────────────────────────────────────────────

/// Outcome of feeding a keysym into a compose state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeOutcome {
    Ignored,
    Composing,
    Cancelled,
    Composed,
}

#[derive(Debug, thiserror::Error)]
pub enum KeymapError {
    #[error(
        "failed to compile keymap for layout {layout:?} variant {variant:?} options {options:?}"
    )]
    CompileFailed {
        layout: String,
        variant: String,
        options: String,
    },
}

/// Scancode translation state: keycode -> keysym via the current layout,
/// plus a compose-key state machine.
pub trait KeymapBackend {
    /// Feed a key press/release (xkb keycode, already offset by +8) and
    /// update internal xkb state. Returns the resulting keysym on press.
    fn update_key(&mut self, keycode: u32, pressed: bool) -> Option<u32>;
    /// UTF-8 text xkb produces for this keycode in the current state.
    fn key_utf8(&mut self, keycode: u32) -> String;
    /// Whether this keycode's key repeats per the compiled keymap.
    fn key_repeats(&self, keycode: u32) -> bool;
    /// Whether `Mod1` (Alt) is currently effective.
    fn mod1_active(&self) -> bool;
    /// Whether `Control` is currently effective.
    fn control_active(&self) -> bool;
    /// Feed a keysym into the compose state machine.
    fn compose_feed(&mut self, keysym: u32) -> ComposeOutcome;
    /// The composed keysym after a `Composed` outcome.
    fn compose_result_keysym(&self) -> Option<u32>;
    /// UTF-8 text for the composed result.
    fn compose_result_utf8(&self) -> String;
    fn compose_reset(&mut self);
    /// Whether LED state changed and must be synchronized to hardware.
    fn take_led_update(&mut self) -> Option<u32>;
}

// ──────────────────────────────────────────────
// External collaborator: pty spawn helper
// ──────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum PtyError {
    #[error("forkpty failed: {0}")]
    ForkFailed(String),
    #[error("pty i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// The pty master half plus the owned child process.
pub trait PtyHandle {
    fn master_fd(&self) -> std::os::fd::RawFd;
    fn read_nonblocking(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;
    fn write_nonblocking(&mut self, buf: &[u8]) -> std::io::Result<usize>;
    fn resize(&mut self, size: WinSize);
    fn child_pid(&self) -> i32;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_eq_ignores_cursor_flag() {
        let mut a = Cell::default();
        let mut b = Cell::default();
        a.cursor = true;
        b.cursor = false;
        assert!(a.content_eq(&b));
        assert!(!a.render_eq(&b));
    }

    #[test]
    fn sanitized_substitutes_out_of_range_colors() {
        let attr = Attr::new(NCOLORS, NCOLORS + 3, Format::empty());
        let sane = attr.sanitized();
        assert_eq!(sane.fg, 7);
        assert_eq!(sane.bg, 0);
    }

    #[test]
    fn rect_contains_is_half_open() {
        let r = Rect::new(1, 1, 3, 3);
        assert!(r.contains(1, 1));
        assert!(!r.contains(3, 3));
        assert!(!r.contains(0, 1));
    }
}
