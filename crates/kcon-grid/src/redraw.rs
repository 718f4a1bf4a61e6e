use kcon_core::KmsBackend;

use crate::Grid;

/// Tracks whether a vblank request is currently outstanding and arbitrates
/// the single-outstanding-request invariant, then runs the two-path repaint
/// once the vblank fires.
#[derive(Default)]
pub struct RedrawEngine {
    vblank_outstanding: bool,
}

impl RedrawEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call after feeding a chunk of pty bytes through the parser. `was_empty`
    /// is the dirty-set emptiness *before* the chunk was applied; `grid`
    /// reflects state *after*. Requests a vblank only on the empty-to-non-empty
    /// transition, and only if one isn't already outstanding.
    pub fn arbitrate<K: KmsBackend>(&mut self, was_empty: bool, grid: &Grid, kms: &mut K) {
        if self.vblank_outstanding {
            return;
        }
        if was_empty && !grid.dirty().is_empty() {
            if kms.request_vblank().is_ok() {
                self.vblank_outstanding = true;
            }
        }
    }

    /// Force a vblank request regardless of the empty-to-non-empty
    /// transition, used by the VT supervisor on re-acquire when dirty state
    /// is already non-empty from before the VT switch.
    pub fn request_if_dirty<K: KmsBackend>(&mut self, grid: &Grid, kms: &mut K) {
        if self.vblank_outstanding {
            return;
        }
        if !grid.dirty().is_empty() {
            if kms.request_vblank().is_ok() {
                self.vblank_outstanding = true;
            }
        }
    }

    /// Run one full redraw pass: repaint changed cells, snapshot `current`
    /// into `previous`, and reset the dirty set. `paint` is called once per
    /// cell index that needs repainting.
    pub fn redraw(&mut self, grid: &mut Grid, mut paint: impl FnMut(usize)) {
        self.vblank_outstanding = false;

        if grid.dirty().flag() {
            let cols = grid.cols() as usize;
            let rows = grid.rows() as usize;
            for idx in 0..cols * rows {
                let cur = grid.current()[idx];
                let prev = grid.previous()[idx];
                if !cur.render_eq(&prev) {
                    paint(idx);
                }
            }
        } else {
            for &idx in grid.dirty().list().to_vec().iter() {
                paint(idx);
            }
        }

        grid.commit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kcon_core::{Attr, DpmsLevel, FramebufferView, KmsError};

    struct FakeKms {
        outstanding: u32,
    }

    impl KmsBackend for FakeKms {
        fn width(&self) -> u32 {
            80
        }
        fn height(&self) -> u32 {
            24
        }
        fn framebuffer(&mut self) -> FramebufferView<'_> {
            unimplemented!("not exercised by these tests")
        }
        fn request_vblank(&mut self) -> Result<(), KmsError> {
            self.outstanding += 1;
            Ok(())
        }
        fn fd(&self) -> std::os::fd::RawFd {
            -1
        }
        fn drain_vblank_event(&mut self) {}
        fn set_master(&mut self) -> Result<(), KmsError> {
            Ok(())
        }
        fn drop_master(&mut self) -> Result<(), KmsError> {
            Ok(())
        }
        fn save_crtc(&mut self) {}
        fn restore_crtc(&mut self) -> Result<(), KmsError> {
            Ok(())
        }
        fn set_dpms(&mut self, _level: DpmsLevel) {}
    }

    #[test]
    fn only_one_vblank_request_outstanding_at_a_time() {
        let mut g = Grid::new(3, 3, Attr::default());
        let mut kms = FakeKms { outstanding: 0 };
        let mut engine = RedrawEngine::new();

        g.set_cell_slow(0, 0, 'A', Attr::default());
        engine.arbitrate(true, &g, &mut kms);
        assert_eq!(kms.outstanding, 1);

        g.set_cell_slow(1, 0, 'B', Attr::default());
        engine.arbitrate(false, &g, &mut kms);
        assert_eq!(kms.outstanding, 1, "no second request while one is outstanding");
    }

    #[test]
    fn redraw_clears_dirty_set_and_equalizes_grids() {
        let mut g = Grid::new(3, 2, Attr::default());
        g.set_cell_slow(0, 0, 'A', Attr::default());
        let mut engine = RedrawEngine::new();
        let mut painted = Vec::new();
        engine.redraw(&mut g, |idx| painted.push(idx));
        assert_eq!(painted, vec![0]);
        assert!(g.dirty().is_empty());
        assert_eq!(g.current(), g.previous());
    }

    #[test]
    fn second_identical_putchar_paints_nothing() {
        let mut g = Grid::new(3, 2, Attr::default());
        g.set_cell_slow(0, 0, 'A', Attr::default());
        let mut engine = RedrawEngine::new();
        engine.redraw(&mut g, |_| {});
        g.set_cell_slow(0, 0, 'A', Attr::default());
        let mut painted = Vec::new();
        engine.redraw(&mut g, |idx| painted.push(idx));
        assert!(painted.is_empty());
    }
}
