use kcon_core::{Attr, Cell, Pos, Rect, WinSize};

/// `(dirty_flag, dirty_list)`. See the module invariants documented on
/// [`Grid`] — at most one of the two paths is ever consulted at render time.
#[derive(Debug, Default)]
pub struct DirtySet {
    dirty_flag: bool,
    dirty_list: Vec<usize>,
}

impl DirtySet {
    pub fn is_empty(&self) -> bool {
        !self.dirty_flag && self.dirty_list.is_empty()
    }

    pub fn flag(&self) -> bool {
        self.dirty_flag
    }

    pub fn list(&self) -> &[usize] {
        &self.dirty_list
    }

    fn mark_slow(&mut self, index: usize, cell: &mut Cell) {
        if !self.dirty_flag && !cell.dirty {
            self.dirty_list.push(index);
            cell.dirty = true;
        }
    }

    fn mark_medium(&mut self) {
        self.dirty_flag = true;
    }

    fn reset(&mut self) {
        self.dirty_flag = false;
        self.dirty_list.clear();
    }
}

/// Two character grids (`current`, `previous`) plus the dirty set that
/// tracks what must be repainted between them.
pub struct Grid {
    cols: u16,
    rows: u16,
    current: Vec<Cell>,
    previous: Vec<Cell>,
    dirty: DirtySet,
    default_attr: Attr,
}

impl Grid {
    pub fn new(cols: u16, rows: u16, default_attr: Attr) -> Self {
        let len = cols as usize * rows as usize;
        Self {
            cols,
            rows,
            current: vec![Cell::blank(default_attr); len],
            previous: vec![Cell::blank(default_attr); len],
            dirty: DirtySet::default(),
            default_attr,
        }
    }

    pub fn cols(&self) -> u16 {
        self.cols
    }

    pub fn rows(&self) -> u16 {
        self.rows
    }

    pub fn dirty(&self) -> &DirtySet {
        &self.dirty
    }

    pub fn current(&self) -> &[Cell] {
        &self.current
    }

    pub fn previous(&self) -> &[Cell] {
        &self.previous
    }

    fn index(&self, col: u16, row: u16) -> usize {
        row as usize * self.cols as usize + col as usize
    }

    pub fn cell(&self, col: u16, row: u16) -> &Cell {
        &self.current[self.index(col, row)]
    }

    /// Used for an individual glyph put. A structural no-op is a true no-op:
    /// it never touches the dirty set.
    pub fn set_cell_slow(&mut self, col: u16, row: u16, ch: char, attr: Attr) {
        if col >= self.cols || row >= self.rows {
            return;
        }
        let idx = self.index(col, row);
        let attr = attr.sanitized();
        let candidate = Cell { ch, attr, cursor: self.current[idx].cursor, dirty: self.current[idx].dirty };
        if self.current[idx].content_eq(&candidate) {
            return;
        }
        self.current[idx].ch = ch;
        self.current[idx].attr = attr;
        self.dirty.mark_slow(idx, &mut self.current[idx]);
    }

    /// Used inside a `fill`. On any change, sets the region-dirty flag
    /// rather than growing the per-cell list.
    pub fn set_cell_medium(&mut self, col: u16, row: u16, ch: char, attr: Attr) {
        if col >= self.cols || row >= self.rows {
            return;
        }
        let idx = self.index(col, row);
        let attr = attr.sanitized();
        let candidate = Cell { ch, attr, cursor: self.current[idx].cursor, dirty: self.current[idx].dirty };
        if self.current[idx].content_eq(&candidate) {
            return;
        }
        self.current[idx].ch = ch;
        self.current[idx].attr = attr;
        self.dirty.mark_medium();
    }

    pub fn fill(&mut self, rect: Rect, ch: char, attr: Attr) {
        let row1 = rect.row1.min(self.rows);
        let col1 = rect.col1.min(self.cols);
        for row in rect.row0..row1 {
            for col in rect.col0..col1 {
                self.set_cell_medium(col, row, ch, attr);
            }
        }
    }

    /// Region move, at most one row or column off. Each row is copied with
    /// `memmove`-equivalent semantics (overlap-safe `Vec` slice copies),
    /// visiting rows in the direction that keeps the read side ahead of the
    /// write side: downward when the destination is below the source,
    /// upward otherwise.
    pub fn copy(&mut self, rect: Rect, dst: Pos) {
        let width = rect.width() as usize;
        if width == 0 || rect.height() == 0 {
            return;
        }
        let row_count = rect.height();
        if dst.row < rect.row0 {
            // destination above source: copy rows top-to-bottom
            for i in 0..row_count {
                let srow = rect.row0 + i;
                let trow = dst.row + i;
                self.copy_row(rect.col0, srow, dst.col, trow, width);
            }
        } else {
            // destination at or below source: copy rows bottom-to-top
            for i in (0..row_count).rev() {
                let srow = rect.row0 + i;
                let trow = dst.row + i;
                self.copy_row(rect.col0, srow, dst.col, trow, width);
            }
        }
        self.dirty.mark_medium();
    }

    fn copy_row(&mut self, scol: u16, srow: u16, dcol: u16, drow: u16, width: usize) {
        if srow >= self.rows || drow >= self.rows || scol >= self.cols || dcol >= self.cols {
            return;
        }
        let width = width
            .min((self.cols - scol) as usize)
            .min((self.cols - dcol) as usize);
        let src_start = self.index(scol, srow);
        let dst_start = self.index(dcol, drow);
        let row: Vec<Cell> = self.current[src_start..src_start + width].to_vec();
        self.current[dst_start..dst_start + width].copy_from_slice(&row);
    }

    pub fn reset(&mut self) {
        for c in self.current.iter_mut() {
            *c = Cell::blank(self.default_attr);
        }
        self.dirty.reset();
    }

    /// Reallocate to new dimensions, preserving the overlapping top-left
    /// rectangle and filling newly exposed cells with the default attribute.
    /// Always forces a full repaint.
    pub fn resize(&mut self, new_cols: u16, new_rows: u16) -> WinSize {
        let mut new_current = vec![Cell::blank(self.default_attr); new_cols as usize * new_rows as usize];
        let copy_cols = self.cols.min(new_cols);
        let copy_rows = self.rows.min(new_rows);
        for row in 0..copy_rows {
            for col in 0..copy_cols {
                let old_idx = row as usize * self.cols as usize + col as usize;
                let new_idx = row as usize * new_cols as usize + col as usize;
                new_current[new_idx] = self.current[old_idx];
            }
        }
        self.current = new_current;
        self.previous = vec![Cell::blank(self.default_attr); new_cols as usize * new_rows as usize];
        self.cols = new_cols;
        self.rows = new_rows;
        self.dirty.mark_medium();
        WinSize { cols: new_cols, rows: new_rows }
    }

    /// Toggle the cursor flag on exactly one cell, marking both the old and
    /// new cursor cells dirty via the slow path so a cursor-only move still
    /// gets repainted.
    pub fn move_cursor_flag(&mut self, old: Option<Pos>, new: Pos) {
        if let Some(old) = old {
            if old != new && old.col < self.cols && old.row < self.rows {
                let idx = self.index(old.col, old.row);
                self.current[idx].cursor = false;
                self.dirty.mark_slow(idx, &mut self.current[idx]);
            }
        }
        if new.col < self.cols && new.row < self.rows {
            let idx = self.index(new.col, new.row);
            if !self.current[idx].cursor {
                self.current[idx].cursor = true;
                self.dirty.mark_slow(idx, &mut self.current[idx]);
            }
        }
    }

    /// Copy `current` into `previous` and reset the dirty set. Called by
    /// the redraw engine after every successful render.
    pub(crate) fn commit(&mut self) {
        self.previous.copy_from_slice(&self.current);
        self.dirty.reset();
        for c in self.current.iter_mut() {
            c.dirty = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kcon_core::Format;

    fn attr() -> Attr {
        Attr::default()
    }

    #[test]
    fn repeated_identical_write_is_a_noop() {
        let mut g = Grid::new(3, 2, attr());
        g.set_cell_slow(0, 0, 'A', attr());
        assert_eq!(g.dirty().list(), &[0]);
        g.commit();
        g.set_cell_slow(0, 0, 'A', attr());
        assert!(g.dirty().is_empty());
    }

    #[test]
    fn fill_sets_flag_not_list() {
        let mut g = Grid::new(4, 4, attr());
        g.fill(Rect::new(0, 0, 4, 4), 'X', attr());
        assert!(g.dirty().flag());
        assert!(g.dirty().list().is_empty());
    }

    #[test]
    fn copy_scrolls_down_one_row() {
        let mut g = Grid::new(3, 3, attr());
        g.fill(Rect::new(0, 0, 3, 1), 'X', attr());
        g.commit();
        g.copy(Rect::new(0, 0, 3, 2), Pos::new(0, 1));
        assert_eq!(g.cell(0, 1).ch, 'X');
        assert_eq!(g.cell(0, 0).ch, 'X');
        assert!(g.dirty().flag());
    }

    #[test]
    fn cursor_flag_is_unique() {
        let mut g = Grid::new(3, 3, attr());
        g.move_cursor_flag(None, Pos::new(0, 0));
        g.move_cursor_flag(Some(Pos::new(0, 0)), Pos::new(2, 2));
        assert!(!g.cell(0, 0).cursor);
        assert!(g.cell(2, 2).cursor);
    }

    #[test]
    fn resize_preserves_overlap_and_forces_full_repaint() {
        let mut g = Grid::new(3, 3, attr());
        g.set_cell_slow(0, 0, 'Z', attr());
        g.commit();
        g.resize(5, 2);
        assert_eq!(g.cell(0, 0).ch, 'Z');
        assert!(g.dirty().flag());
    }

    #[test]
    fn out_of_range_color_is_sanitized() {
        let mut g = Grid::new(2, 2, attr());
        let bad = Attr::new(200, 200, Format::BOLD);
        g.set_cell_slow(0, 0, 'Q', bad);
        assert!(g.cell(0, 0).attr.fg < kcon_core::NCOLORS);
    }
}
