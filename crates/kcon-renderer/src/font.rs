use std::collections::HashMap;
use std::path::Path;

use fontdue::{Font, FontSettings};
use kcon_core::{GlyphBitmap, GlyphCache};

#[derive(Debug, thiserror::Error)]
pub enum FontError {
    #[error("failed to read font file {path}: {source}")]
    Read { path: String, #[source] source: std::io::Error },
    #[error("failed to parse font file {path}: {reason}")]
    Parse { path: String, reason: String },
}

#[derive(Hash, PartialEq, Eq, Clone, Copy)]
struct GlyphKey {
    codepoint: char,
    bold: bool,
    size: u32,
}

/// A glyph cache backed by `fontdue`, holding the normal and bold font
/// faces plus a flat rasterization cache keyed by `(codepoint, bold, size)`.
/// Frequently used ranges (ASCII, common Latin-1) are pre-rasterized at
/// construction so the interactive path rarely pays a cold-cache cost.
pub struct FontdueGlyphCache {
    normal: Font,
    bold: Font,
    cache: HashMap<GlyphKey, GlyphBitmap>,
}

impl FontdueGlyphCache {
    pub fn load(font_path: Option<&Path>, bold_font_path: Option<&Path>, warmup_size: u32) -> Result<Self, FontError> {
        let normal_bytes = read_font_bytes(font_path)?;
        let bold_bytes = match bold_font_path {
            Some(p) => read_font_bytes(Some(p))?,
            None => normal_bytes.clone(),
        };
        let settings = FontSettings::default();
        let normal = Font::from_bytes(normal_bytes, settings).map_err(|reason| FontError::Parse {
            path: font_path.map(|p| p.display().to_string()).unwrap_or_else(|| "<builtin>".into()),
            reason: reason.to_string(),
        })?;
        let bold = Font::from_bytes(bold_bytes, settings).map_err(|reason| FontError::Parse {
            path: bold_font_path.map(|p| p.display().to_string()).unwrap_or_else(|| "<builtin>".into()),
            reason: reason.to_string(),
        })?;
        let mut this = Self { normal, bold, cache: HashMap::new() };
        this.warmup_ascii(warmup_size);
        Ok(this)
    }

    fn warmup_ascii(&mut self, size: u32) -> &mut Self {
        for c in 0x20u8..0x7f {
            let ch = c as char;
            self.lookup(ch, false, size);
            self.lookup(ch, true, size);
        }
        self
    }

    fn rasterize(&self, key: GlyphKey) -> GlyphBitmap {
        let font = if key.bold { &self.bold } else { &self.normal };
        let (metrics, bitmap) = font.rasterize(key.codepoint, key.size as f32);
        GlyphBitmap {
            bitmap,
            pitch: metrics.width,
            w: metrics.width as u32,
            h: metrics.height as u32,
            bearing_x: metrics.xmin,
            bearing_y: metrics.ymin + metrics.height as i32,
            advance: metrics.advance_width,
        }
    }
}

impl GlyphCache for FontdueGlyphCache {
    fn lookup(&mut self, codepoint: char, bold: bool, size: u32) -> GlyphBitmap {
        let key = GlyphKey { codepoint, bold, size };
        if let Some(g) = self.cache.get(&key) {
            return g.clone();
        }
        let g = self.rasterize(key);
        self.cache.insert(key, g.clone());
        g
    }
}

/// Platform-default search path, tried in order when no `-f`/`-F` flag was
/// given. Matches common distro layouts for a monospace console font.
const DEFAULT_FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSansMono.ttf",
    "/usr/share/fonts/TTF/DejaVuSansMono.ttf",
    "/usr/share/fonts/noto/NotoSansMono-Regular.ttf",
];

fn read_font_bytes(path: Option<&Path>) -> Result<Vec<u8>, FontError> {
    if let Some(p) = path {
        return std::fs::read(p).map_err(|source| FontError::Read { path: p.display().to_string(), source });
    }
    for candidate in DEFAULT_FONT_CANDIDATES {
        if let Ok(bytes) = std::fs::read(candidate) {
            return Ok(bytes);
        }
    }
    Err(FontError::Read {
        path: "<platform default>".into(),
        source: std::io::Error::new(std::io::ErrorKind::NotFound, "no default font found"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glyph_key_equality_distinguishes_weight_and_size() {
        let a = GlyphKey { codepoint: 'A', bold: false, size: 16 };
        let b = GlyphKey { codepoint: 'A', bold: true, size: 16 };
        assert_ne!(a, b);
    }
}
