/*
 *  layout.rs
 *
 *  LyMarq - the big squeeze
 *  (c) 2020-25 Stuart Hunter
 *
 *  Viewport-derived geometry: where the art box, title rows and the
 *  service icon corner land for a given screen size.
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

use crate::constants::{
    ART_HEIGHT_FRACTION, ART_TOP_MARGIN, ENTRY_LEAD, ICON_MARGIN, NOMINAL_TEXT_LINES, PX_PER_PT,
    TEXT_BLOCK_FRACTION,
};

/// Fixed geometry for one viewport size. Computed once at startup and never
/// mutated afterwards; the stage and the poll workers both read from it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Layout {
    pub width: u32,
    pub height: u32,
    /// Target height for the scaled album art.
    pub art_height: u32,
    /// Top edge of the album art box.
    pub art_y: i32,
    /// Height of one nominal text line.
    pub line_height: u32,
    /// Font size in points for the title lines.
    pub font_pt: f32,
    /// Same size expressed in pixels, the unit the rasterizer wants.
    pub font_px: f32,
    /// Baseline rows for the two title lines.
    pub line1_y: i32,
    pub line2_y: i32,
    /// Service icon edge length (font-size-equivalent).
    pub icon_size: u32,
    pub icon_y: i32,
    /// X where a freshly entering item starts, just past the right edge.
    pub entry_x: i32,
}

impl Layout {
    pub fn for_viewport(width: u32, height: u32) -> Self {
        let h = height as f32;
        let art_height = (h * ART_HEIGHT_FRACTION) as u32 - ART_TOP_MARGIN;
        let line_height = (h * TEXT_BLOCK_FRACTION) as u32 / NOMINAL_TEXT_LINES;
        let font_pt = line_height as f32 / PX_PER_PT;
        let font_px = font_pt * PX_PER_PT;

        let text_top = (h * ART_HEIGHT_FRACTION) as i32;
        let line1_y = text_top + line_height as i32 / 2;
        let line2_y = line1_y + line_height as i32 + line_height as i32 / 4;

        Layout {
            width,
            height,
            art_height,
            art_y: ART_TOP_MARGIN as i32,
            line_height,
            font_pt,
            font_px,
            line1_y,
            line2_y,
            icon_size: line_height,
            icon_y: ICON_MARGIN as i32,
            entry_x: width as i32 + ENTRY_LEAD,
        }
    }

    /// Left edge for an item of the given width when horizontally centered.
    #[allow(dead_code)]
    pub fn centered_x(&self, item_width: u32) -> i32 {
        (self.width as i32 - item_width as i32) / 2
    }

    /// Left edge for the service icon, pinned to the top-right corner.
    pub fn icon_x(&self, icon_width: u32) -> i32 {
        self.width as i32 - icon_width as i32 - ICON_MARGIN as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_1280x720() {
        let layout = Layout::for_viewport(1280, 720);

        assert_eq!(layout.art_height, 408); // 60% of 720 minus the margin
        assert_eq!(layout.line_height, 72);
        assert_eq!(layout.icon_size, 72);
        assert!(layout.line1_y >= 432);
        assert!(layout.line2_y > layout.line1_y);
        assert!(layout.entry_x > 1280);
        // px -> pt -> px round trips to the line height
        assert!((layout.font_px - layout.line_height as f32).abs() < 1.0);
    }

    #[test]
    fn test_layout_1920x1080() {
        let layout = Layout::for_viewport(1920, 1080);

        assert_eq!(layout.art_height, 624);
        assert_eq!(layout.line_height, 108);
        assert!((layout.font_pt - 108.0 / PX_PER_PT).abs() < 0.01);
    }

    #[test]
    fn test_centering_and_icon_corner() {
        let layout = Layout::for_viewport(800, 480);

        assert_eq!(layout.centered_x(200), 300);
        assert_eq!(layout.icon_x(48), 800 - 48 - ICON_MARGIN as i32);
        // an item as wide as the viewport centers at zero
        assert_eq!(layout.centered_x(800), 0);
    }
}
