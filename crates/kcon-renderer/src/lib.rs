//! Palette resolution and the cell-blit renderer: given a cell, paints its
//! background, glyph and underline into a framebuffer view.

mod font;
mod palette;

pub use font::FontdueGlyphCache;
pub use palette::{rgb_for_index, Rgb};

use kcon_core::{Attr, Cell, FramebufferView, Format, GlyphCache, Rotation};

/// Cell pixel dimensions in the framebuffer.
#[derive(Debug, Clone, Copy)]
pub struct CellMetrics {
    pub width: u32,
    pub height: u32,
}

/// Renders one cell's pixel rectangle into `fb`, following the six-step
/// blit algorithm: origin + rotation, fg/bg resolution (reverse, bold-bright),
/// cursor swap, background fill, glyph composite, underline — each write
/// clipped to `fb`'s bounds.
#[allow(clippy::too_many_arguments)]
pub fn render_cell<G: GlyphCache>(
    fb: &mut FramebufferView<'_>,
    glyphs: &mut G,
    metrics: CellMetrics,
    col: u16,
    row: u16,
    cell: &Cell,
    showcursor: bool,
    antialias: bool,
    rotation: Rotation,
    font_size: u32,
) {
    let (sx, sy) = rotated_origin(col, row, metrics, fb.width, fb.height, rotation);

    let mut fg = cell.attr.fg;
    let mut bg = cell.attr.bg;
    if cell.attr.format.contains(Format::REVERSE) {
        std::mem::swap(&mut fg, &mut bg);
    }
    let bold = cell.attr.format.contains(Format::BOLD);
    let mut fg_rgb = rgb_for_index(fg, bold);
    let mut bg_rgb = rgb_for_index(bg, false);

    if showcursor && cell.cursor {
        std::mem::swap(&mut fg_rgb, &mut bg_rgb);
    }

    fill_rect(fb, sx, sy, metrics.width, metrics.height, bg_rgb);

    if cell.ch != ' ' {
        blit_glyph(fb, glyphs, sx, sy, metrics, cell.ch, bold, font_size, fg_rgb, antialias);
    }

    if cell.attr.format.contains(Format::UNDERLINE) {
        let uy = sy as i64 + metrics.height as i64 - 2;
        draw_hline(fb, sx, uy, metrics.width, fg_rgb);
    }
}

fn rotated_origin(
    col: u16,
    row: u16,
    metrics: CellMetrics,
    fb_w: u32,
    fb_h: u32,
    rotation: Rotation,
) -> (i64, i64) {
    let x = col as i64 * metrics.width as i64;
    let y = row as i64 * metrics.height as i64;
    match rotation {
        Rotation::None => (x, y),
        Rotation::Cw90 => (fb_w as i64 - y - metrics.height as i64, x),
        Rotation::Cw180 => (fb_w as i64 - x - metrics.width as i64, fb_h as i64 - y - metrics.height as i64),
        Rotation::Cw270 => (y, fb_h as i64 - x - metrics.width as i64),
    }
}

fn fill_rect(fb: &mut FramebufferView<'_>, x: i64, y: i64, w: u32, h: u32, rgb: Rgb) {
    for dy in 0..h as i64 {
        for dx in 0..w as i64 {
            put_pixel(fb, x + dx, y + dy, rgb);
        }
    }
}

fn draw_hline(fb: &mut FramebufferView<'_>, x: i64, y: i64, w: u32, rgb: Rgb) {
    for dx in 0..w as i64 {
        put_pixel(fb, x + dx, y, rgb);
    }
}

fn put_pixel(fb: &mut FramebufferView<'_>, x: i64, y: i64, rgb: Rgb) {
    if x < 0 || y < 0 || x as u32 >= fb.width || y as u32 >= fb.height {
        return;
    }
    let offset = y as usize * fb.pitch as usize + x as usize * fb.bpp as usize;
    if offset + 4 > fb.pixels.len() {
        return;
    }
    fb.pixels[offset] = rgb.b;
    fb.pixels[offset + 1] = rgb.g;
    fb.pixels[offset + 2] = rgb.r;
    fb.pixels[offset + 3] = 0;
}

#[allow(clippy::too_many_arguments)]
fn blit_glyph<G: GlyphCache>(
    fb: &mut FramebufferView<'_>,
    glyphs: &mut G,
    sx: i64,
    sy: i64,
    metrics: CellMetrics,
    ch: char,
    bold: bool,
    size: u32,
    fg: Rgb,
    antialias: bool,
) {
    let glyph = glyphs.lookup(ch, bold, size);
    if glyph.bitmap.is_empty() {
        return;
    }
    let baseline_x = sx + glyph.bearing_x as i64;
    let baseline_y = sy + (metrics.height as i64 - glyph.bearing_y as i64);
    for row in 0..glyph.h as usize {
        for col in 0..glyph.w as usize {
            let coverage = glyph.bitmap[row * glyph.pitch + col];
            if coverage == 0 {
                continue;
            }
            let x = baseline_x + col as i64;
            let y = baseline_y + row as i64;
            if antialias {
                blend_pixel(fb, x, y, fg, coverage);
            } else if coverage >= 128 {
                put_pixel(fb, x, y, fg);
            }
        }
    }
}

fn blend_pixel(fb: &mut FramebufferView<'_>, x: i64, y: i64, rgb: Rgb, coverage: u8) {
    if x < 0 || y < 0 || x as u32 >= fb.width || y as u32 >= fb.height {
        return;
    }
    let offset = y as usize * fb.pitch as usize + x as usize * fb.bpp as usize;
    if offset + 4 > fb.pixels.len() {
        return;
    }
    let a = coverage as u32;
    let inv = 255 - a;
    let blend = |dst: u8, src: u8| -> u8 { ((dst as u32 * inv + src as u32 * a) / 255) as u8 };
    fb.pixels[offset] = blend(fb.pixels[offset], rgb.b);
    fb.pixels[offset + 1] = blend(fb.pixels[offset + 1], rgb.g);
    fb.pixels[offset + 2] = blend(fb.pixels[offset + 2], rgb.r);
}

#[cfg(test)]
mod tests {
    use super::*;
    use kcon_core::{Attr, GlyphBitmap};

    struct EmptyGlyphs;
    impl GlyphCache for EmptyGlyphs {
        fn lookup(&mut self, _c: char, _bold: bool, _size: u32) -> GlyphBitmap {
            GlyphBitmap::default()
        }
    }

    #[test]
    fn space_paints_only_background() {
        let mut pixels = vec![0u8; 4 * 4 * 4];
        let mut fb = FramebufferView { pixels: &mut pixels, width: 4, height: 4, pitch: 16, bpp: 4 };
        let cell = Cell::blank(Attr::default());
        render_cell(&mut fb, &mut EmptyGlyphs, CellMetrics { width: 4, height: 4 }, 0, 0, &cell, true, true, Rotation::None, 16);
        assert_eq!(&pixels[0..3], &[0, 0, 0]);
    }

    #[test]
    fn missing_glyph_does_not_panic_and_background_still_paints() {
        let mut pixels = vec![0u8; 4 * 4 * 4];
        let mut fb = FramebufferView { pixels: &mut pixels, width: 4, height: 4, pitch: 16, bpp: 4 };
        let mut cell = Cell::blank(Attr::default());
        cell.ch = 'A';
        render_cell(&mut fb, &mut EmptyGlyphs, CellMetrics { width: 4, height: 4 }, 0, 0, &cell, true, true, Rotation::None, 16);
    }
}
