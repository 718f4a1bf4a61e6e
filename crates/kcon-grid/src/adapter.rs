use kcon_core::{Attr, Pos, Rect, VtCallbacks};

use crate::Grid;

/// Bridges the five parser callbacks to grid mutations and dirty marks.
/// Cursor-cell dirty marking is deliberately not done here: the master-read
/// handler applies it once, after a whole chunk has been parsed, so the
/// cursor's dirtiness stays atomic with byte ingestion.
pub struct TerminalAdapter {
    pub grid: Grid,
    pub cursor: Pos,
    pub showcursor: bool,
    pub keypad_mode: bool,
    pending_response: Vec<u8>,
}

impl TerminalAdapter {
    pub fn new(grid: Grid) -> Self {
        Self {
            grid,
            cursor: Pos::new(0, 0),
            showcursor: true,
            keypad_mode: false,
            pending_response: Vec::new(),
        }
    }

    /// Bytes queued by `respond` calls since the last drain, to be written
    /// to the pty master by the caller (which owns the pty handle; this
    /// crate does not).
    pub fn take_pending_response(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.pending_response)
    }
}

impl VtCallbacks for TerminalAdapter {
    fn putchar(&mut self, pos: Pos, ch: char, attr: Attr) {
        self.grid.set_cell_slow(pos.col, pos.row, ch, attr);
    }

    fn fill(&mut self, rect: Rect, ch: char, attr: Attr) {
        self.grid.fill(rect, ch, attr);
    }

    fn copy(&mut self, rect: Rect, dst: Pos) {
        self.grid.copy(rect, dst);
    }

    fn cursor(&mut self, pos: Pos) {
        if pos != self.cursor {
            self.cursor = pos;
        }
    }

    fn param(&mut self, kind: u8, value: bool) {
        match kind {
            0 => self.showcursor = value,
            1 => self.keypad_mode = value,
            _ => {}
        }
    }

    fn bell(&mut self) {
        log::trace!("bell");
    }

    fn respond(&mut self, bytes: &[u8]) {
        self.pending_response.extend_from_slice(bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kcon_core::Attr;

    #[test]
    fn param_zero_toggles_showcursor() {
        let mut a = TerminalAdapter::new(Grid::new(3, 3, Attr::default()));
        a.param(0, false);
        assert!(!a.showcursor);
    }

    #[test]
    fn respond_queues_bytes_for_the_pty() {
        let mut a = TerminalAdapter::new(Grid::new(3, 3, Attr::default()));
        a.respond(b"\x1b[0n");
        assert_eq!(a.take_pending_response(), b"\x1b[0n");
        assert!(a.take_pending_response().is_empty());
    }
}
