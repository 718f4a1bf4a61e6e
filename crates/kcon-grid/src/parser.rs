use kcon_core::{Attr, Format, Pos, Rect, VtCallbacks};
use vte::{Params, Perform};

/// Drives a concrete [`VtCallbacks`] sink from a `vte::Parser` byte stream.
/// Covers the subset of ECMA-48/xterm control sequences this system
/// supports: cursor motion, SGR attributes, erase-in-line/display, scroll
/// via `copy`, DECTCEM cursor visibility and DECCKM keypad mode. Nothing
/// here depends on the grid directly — only on the five-callback contract.
pub struct VtParser<S: VtCallbacks> {
    inner: vte::Parser,
    pub sink: S,
    cols: u16,
    rows: u16,
    cursor: Pos,
    attr: Attr,
    saved_cursor: Pos,
}

impl<S: VtCallbacks> VtParser<S> {
    pub fn new(sink: S, cols: u16, rows: u16) -> Self {
        Self {
            inner: vte::Parser::new(),
            sink,
            cols,
            rows,
            cursor: Pos::new(0, 0),
            attr: Attr::default(),
            saved_cursor: Pos::new(0, 0),
        }
    }

    pub fn resize(&mut self, cols: u16, rows: u16) {
        self.cols = cols;
        self.rows = rows;
        self.cursor = Pos::new(self.cursor.col.min(cols.saturating_sub(1)), self.cursor.row.min(rows.saturating_sub(1)));
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        let mut parser = std::mem::replace(&mut self.inner, vte::Parser::new());
        parser.advance(self, bytes);
        self.inner = parser;
    }

    fn move_cursor(&mut self, col: u16, row: u16) {
        let col = col.min(self.cols.saturating_sub(1));
        if self.rows > 0 && row >= self.rows {
            self.scroll_up(row - self.rows + 1);
            self.cursor = Pos::new(col, self.rows - 1);
        } else {
            self.cursor = Pos::new(col, row);
        }
        self.sink.cursor(self.cursor);
    }

    /// Moves the bottom `rows - lines` rows up by `lines` and blanks the
    /// rows this vacates at the bottom, the scroll-on-overflow behavior a
    /// plain row clamp would otherwise silently skip.
    fn scroll_up(&mut self, lines: u16) {
        if self.rows == 0 {
            return;
        }
        let lines = lines.min(self.rows);
        if lines < self.rows {
            self.sink.copy(Rect::new(0, lines, self.cols, self.rows), Pos::new(0, 0));
        }
        let fill_from = self.rows - lines;
        self.sink.fill(Rect::new(0, fill_from, self.cols, self.rows), ' ', self.attr);
    }

    fn erase_line(&mut self, mode: u16) {
        let row = self.cursor.row;
        let rect = match mode {
            0 => Rect::new(self.cursor.col, row, self.cols, row + 1),
            1 => Rect::new(0, row, self.cursor.col + 1, row + 1),
            _ => Rect::new(0, row, self.cols, row + 1),
        };
        self.sink.fill(rect, ' ', self.attr);
    }

    fn erase_display(&mut self, mode: u16) {
        let rect = match mode {
            0 => Rect::new(0, self.cursor.row, self.cols, self.rows),
            1 => Rect::new(0, 0, self.cols, self.cursor.row + 1),
            _ => Rect::new(0, 0, self.cols, self.rows),
        };
        self.sink.fill(rect, ' ', self.attr);
    }

    fn sgr(&mut self, params: &Params) {
        let mut it = params.iter();
        let mut any = false;
        while let Some(p) = it.next() {
            any = true;
            let code = p.first().copied().unwrap_or(0);
            match code {
                0 => self.attr = Attr::default(),
                1 => self.attr.format |= Format::BOLD,
                4 => self.attr.format |= Format::UNDERLINE,
                7 => self.attr.format |= Format::REVERSE,
                22 => self.attr.format.remove(Format::BOLD),
                24 => self.attr.format.remove(Format::UNDERLINE),
                27 => self.attr.format.remove(Format::REVERSE),
                30..=37 => self.attr.fg = (code - 30) as u8,
                39 => self.attr.fg = 7,
                40..=47 => self.attr.bg = (code - 40) as u8,
                49 => self.attr.bg = 0,
                90..=97 => self.attr.fg = (code - 90) as u8 + 8,
                100..=107 => self.attr.bg = (code - 100) as u8 + 8,
                _ => {}
            }
        }
        if !any {
            self.attr = Attr::default();
        }
    }
}

fn param(params: &Params, idx: usize, default: u16) -> u16 {
    params.iter().nth(idx).and_then(|s| s.first().copied()).filter(|&v| v != 0).unwrap_or(default)
}

impl<S: VtCallbacks> Perform for VtParser<S> {
    fn print(&mut self, c: char) {
        let pos = self.cursor;
        self.sink.putchar(pos, c, self.attr);
        let next_col = self.cursor.col + 1;
        if next_col >= self.cols {
            self.move_cursor(0, self.cursor.row + 1);
        } else {
            self.move_cursor(next_col, self.cursor.row);
        }
    }

    fn execute(&mut self, byte: u8) {
        match byte {
            b'\n' => self.move_cursor(self.cursor.col, self.cursor.row + 1),
            b'\r' => self.move_cursor(0, self.cursor.row),
            0x08 => self.move_cursor(self.cursor.col.saturating_sub(1), self.cursor.row),
            0x07 => self.sink.bell(),
            _ => {}
        }
    }

    fn csi_dispatch(&mut self, params: &Params, _intermediates: &[u8], _ignore: bool, action: char) {
        match action {
            'A' => self.move_cursor(self.cursor.col, self.cursor.row.saturating_sub(param(params, 0, 1))),
            'B' => self.move_cursor(self.cursor.col, self.cursor.row + param(params, 0, 1)),
            'C' => self.move_cursor(self.cursor.col + param(params, 0, 1), self.cursor.row),
            'D' => self.move_cursor(self.cursor.col.saturating_sub(param(params, 0, 1)), self.cursor.row),
            'H' | 'f' => {
                let row = param(params, 0, 1).saturating_sub(1);
                let col = param(params, 1, 1).saturating_sub(1);
                self.move_cursor(col, row);
            }
            'K' => self.erase_line(param(params, 0, 0)),
            'J' => self.erase_display(param(params, 0, 0)),
            'm' => self.sgr(params),
            'h' | 'l' => {
                let show = action == 'h';
                let mut it = params.iter();
                if let Some(p) = it.next() {
                    match p.first().copied().unwrap_or(0) {
                        25 => self.sink.param(0, show),
                        1 => self.sink.param(1, show),
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }

    fn esc_dispatch(&mut self, _intermediates: &[u8], _ignore: bool, byte: u8) {
        match byte {
            b'7' => self.saved_cursor = self.cursor,
            b'8' => {
                let (col, row) = (self.saved_cursor.col, self.saved_cursor.row);
                self.move_cursor(col, row);
            }
            b'M' => self.move_cursor(self.cursor.col, self.cursor.row.saturating_sub(1)),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kcon_core::Rect;

    #[derive(Default)]
    struct RecordingSink {
        puts: Vec<(Pos, char)>,
        cursors: Vec<Pos>,
        copies: Vec<(Rect, Pos)>,
    }

    impl VtCallbacks for RecordingSink {
        fn putchar(&mut self, pos: Pos, ch: char, _attr: Attr) {
            self.puts.push((pos, ch));
        }
        fn fill(&mut self, _rect: Rect, _ch: char, _attr: Attr) {}
        fn copy(&mut self, rect: Rect, dst: Pos) {
            self.copies.push((rect, dst));
        }
        fn cursor(&mut self, pos: Pos) {
            self.cursors.push(pos);
        }
        fn param(&mut self, _kind: u8, _value: bool) {}
        fn bell(&mut self) {}
        fn respond(&mut self, _bytes: &[u8]) {}
    }

    #[test]
    fn print_advances_cursor_and_wraps() {
        let mut p = VtParser::new(RecordingSink::default(), 3, 2);
        p.feed(b"ABCD");
        assert_eq!(p.sink.puts[0], (Pos::new(0, 0), 'A'));
        assert_eq!(p.sink.puts[3], (Pos::new(0, 1), 'D'));
    }

    #[test]
    fn csi_cup_moves_cursor_to_one_based_position() {
        let mut p = VtParser::new(RecordingSink::default(), 10, 10);
        p.feed(b"\x1b[3;5H");
        assert_eq!(*p.sink.cursors.last().unwrap(), Pos::new(4, 2));
    }

    #[test]
    fn sgr_bold_sets_format_flag() {
        let mut p = VtParser::new(RecordingSink::default(), 10, 10);
        p.feed(b"\x1b[1mA");
        assert!(p.attr.format.contains(Format::BOLD));
    }

    #[test]
    fn linefeed_past_the_last_row_scrolls_instead_of_clamping() {
        // Two rows: one linefeed lands the cursor on the last row, a second
        // overflows it and must fire exactly one `copy` rather than pinning
        // the cursor in place.
        let mut p = VtParser::new(RecordingSink::default(), 3, 2);
        p.feed(b"A\nB\n");
        assert_eq!(p.sink.copies, vec![(Rect::new(0, 1, 3, 2), Pos::new(0, 0))]);
        assert_eq!(*p.sink.cursors.last().unwrap(), Pos::new(2, 1));
    }

    #[test]
    fn single_row_grid_blanks_without_copying() {
        // With no rows above the last one there is nothing to shift, so
        // overflow degenerates to a blank with no `copy` call.
        let mut p = VtParser::new(RecordingSink::default(), 2, 1);
        p.feed(b"AB\nC");
        assert!(p.sink.copies.is_empty());
        assert_eq!(*p.sink.cursors.last().unwrap(), Pos::new(1, 0));
    }
}
