/*
 *  typeset.rs
 *
 *  LyMarq - the big squeeze
 *  (c) 2020-25 Stuart Hunter
 *
 *  Text rasterization behind a small seam so the stage can be driven by a
 *  deterministic metrics-only rasterizer in tests and headless runs.
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use fontdue::layout::{CoordinateSystem, Layout as GlyphLayout, TextStyle};
use fontdue::{Font, FontSettings};
use std::path::Path;
use thiserror::Error;

use crate::renderable::Bitmap;

#[derive(Debug, Error)]
pub enum TypesetError {
    #[error("I/O error reading font: {0}")]
    Io(#[from] std::io::Error),
    #[error("font parse error: {0}")]
    Font(&'static str),
}

/// Turns a string into a drawable bitmap. Rasterization of a plain string
/// cannot fail; an empty or all-whitespace string yields an empty bitmap.
pub trait TextRasterizer: Send {
    fn rasterize(&self, text: &str) -> Bitmap;
}

/// fontdue-backed rasterizer at a fixed pixel size and foreground color.
pub struct FontRasterizer {
    font: Font,
    px: f32,
    color: [u8; 3],
}

impl FontRasterizer {
    pub fn from_file(path: &Path, px: f32, color: [u8; 3]) -> Result<Self, TypesetError> {
        let bytes = std::fs::read(path)?;
        let font = Font::from_bytes(bytes, FontSettings::default()).map_err(TypesetError::Font)?;
        Ok(FontRasterizer { font, px, color })
    }
}

impl TextRasterizer for FontRasterizer {
    fn rasterize(&self, text: &str) -> Bitmap {
        let mut layout = GlyphLayout::new(CoordinateSystem::PositiveYDown);
        layout.append(
            std::slice::from_ref(&self.font),
            &TextStyle::new(text, self.px, 0),
        );

        let glyphs = layout.glyphs();
        let width = glyphs
            .iter()
            .map(|g| g.x as i32 + g.width as i32)
            .max()
            .unwrap_or(0)
            .max(0) as u32;
        let height = layout.height().ceil().max(0.0) as u32;
        if width == 0 || height == 0 {
            return Bitmap::new(0, 0);
        }

        let mut bitmap = Bitmap::new(width, height);
        let [r, g, b] = self.color;

        for glyph in glyphs {
            if glyph.width == 0 || glyph.height == 0 {
                continue; // whitespace
            }
            let (metrics, coverage) = self.font.rasterize_config(glyph.key);
            let gx = glyph.x.round() as i32;
            let gy = glyph.y.round() as i32;
            for row in 0..metrics.height {
                let y = gy + row as i32;
                if y < 0 || y >= height as i32 {
                    continue;
                }
                for col in 0..metrics.width {
                    let x = gx + col as i32;
                    if x < 0 || x >= width as i32 {
                        continue;
                    }
                    let alpha = coverage[row * metrics.width + col];
                    if alpha == 0 {
                        continue;
                    }
                    let idx = ((y as u32 * width + x as u32) * 4) as usize;
                    // glyph boxes can overlap by a pixel; keep the stronger coverage
                    if alpha > bitmap.pixels[idx + 3] {
                        bitmap.pixels[idx] = r;
                        bitmap.pixels[idx + 1] = g;
                        bitmap.pixels[idx + 2] = b;
                        bitmap.pixels[idx + 3] = alpha;
                    }
                }
            }
        }

        bitmap
    }
}

/// Deterministic rasterizer producing a blank box of predictable metrics:
/// `advance` pixels per character at a fixed height. Used by the stage unit
/// tests, where only sizes and fingerprints matter.
pub struct FixedRasterizer {
    pub advance: u32,
    pub height: u32,
}

impl TextRasterizer for FixedRasterizer {
    fn rasterize(&self, text: &str) -> Bitmap {
        let width = text.chars().count() as u32 * self.advance;
        Bitmap::new(width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_rasterizer_metrics() {
        let raster = FixedRasterizer { advance: 10, height: 20 };
        let bm = raster.rasterize("abcd");
        assert_eq!(bm.width, 40);
        assert_eq!(bm.height, 20);
        assert_eq!(bm.pixels.len(), 40 * 20 * 4);

        let empty = raster.rasterize("");
        assert_eq!(empty.width, 0);
    }
}
