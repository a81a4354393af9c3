/*
 *  motion.rs
 *
 *  LyMarq - the big squeeze
 *  (c) 2020-25 Stuart Hunter
 *
 *  Per-item motion state: an owned renderable plus where it is, where it
 *  is headed and how fast it gets there, advanced once per rendered frame.
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

use crate::renderable::Renderable;
use crate::surface::Surface;

/// Where a non-retiring item comes to rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetX {
    /// Slide left until horizontally centered in the viewport.
    Centered,
    /// Already where it belongs; never moves (service icon).
    Pinned,
}

/// Outcome of one `advance` tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fate {
    Alive,
    /// Crossed the exit boundary; the owner must drop this motion.
    Gone,
}

/// Motion state for one renderable item. Created when a slot's content
/// changes, advanced once per frame, dropped when it exits stage left.
#[derive(Debug)]
pub struct Motion {
    item: Renderable,
    x: i32,
    y: i32,
    speed: i32,
    target: TargetX,
    looping: bool,
    retiring: bool,
}

impl Motion {
    /// An item entering from just past the right viewport edge. Items wider
    /// than the viewport start looping immediately instead of centering.
    pub fn enter(item: Renderable, entry_x: i32, y: i32, speed: i32, looping: bool) -> Self {
        Motion {
            item,
            x: entry_x,
            y,
            speed,
            target: TargetX::Centered,
            looping,
            retiring: false,
        }
    }

    /// An item placed directly at its resting position, no animation.
    pub fn pinned(item: Renderable, x: i32, y: i32) -> Self {
        Motion {
            item,
            x,
            y,
            speed: 0,
            target: TargetX::Pinned,
            looping: false,
            retiring: false,
        }
    }

    /// Switch to the retiring phase: from now on the item moves left at the
    /// elevated exit speed until fully off-screen. One-way.
    pub fn retire(&mut self, exit_speed: i32) {
        self.retiring = true;
        self.looping = false;
        self.speed = exit_speed;
    }

    pub fn is_retiring(&self) -> bool {
        self.retiring
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn x(&self) -> i32 {
        self.x
    }

    pub fn item(&self) -> &Renderable {
        &self.item
    }

    /// Whether a non-looping, non-retiring item has reached its rest position.
    #[allow(dead_code)]
    pub fn at_rest(&self, view_width: i32) -> bool {
        !self.looping && !self.retiring && self.x <= self.resting_x(view_width)
    }

    fn resting_x(&self, view_width: i32) -> i32 {
        match self.target {
            TargetX::Centered => (view_width - self.item.width() as i32) / 2,
            TargetX::Pinned => self.x,
        }
    }

    /// Move one tick. `scroll_tick` gates looping movement so over-wide
    /// items can crawl at a fraction of the frame rate.
    pub fn advance(&mut self, view_width: i32, scroll_tick: bool) -> Fate {
        let w = self.item.width() as i32;

        if self.retiring {
            self.x -= self.speed;
            if self.x + w < 0 {
                return Fate::Gone;
            }
            return Fate::Alive;
        }

        if self.looping {
            if scroll_tick {
                self.x -= self.speed;
                if self.x + w < 0 {
                    // wrap back to the entry edge; looping content never stops
                    self.x = view_width;
                }
            }
            return Fate::Alive;
        }

        let target = self.resting_x(view_width);
        if self.x > target {
            self.x = (self.x - self.speed).max(target);
        }
        Fate::Alive
    }

    pub fn draw(&self, surface: &mut Surface<'_>) {
        surface.blit(self.item.bitmap(), self.x, self.y);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderable::Bitmap;

    const VIEW_W: i32 = 400;

    fn text_item(width: u32) -> Renderable {
        Renderable::Text {
            value: "x".to_string(),
            bitmap: Bitmap::new(width, 10),
        }
    }

    #[test]
    fn test_entering_item_clamps_at_center() {
        let mut m = Motion::enter(text_item(100), VIEW_W + 50, 0, 60, false);
        for _ in 0..20 {
            assert_eq!(m.advance(VIEW_W, true), Fate::Alive);
        }
        // centered at (400 - 100) / 2, never overshot
        assert_eq!(m.x(), 150);
        assert!(m.at_rest(VIEW_W));
    }

    #[test]
    fn test_retiring_moves_monotonically_until_gone() {
        let mut m = Motion::enter(text_item(100), 150, 0, 10, false);
        m.retire(25);
        assert!(m.is_retiring());

        let mut last_x = m.x();
        loop {
            match m.advance(VIEW_W, true) {
                Fate::Alive => {
                    assert!(m.x() < last_x, "retiring item bounced back");
                    last_x = m.x();
                }
                Fate::Gone => break,
            }
        }
        // gone only once fully off the left edge, its own width accounted for
        assert!(m.x() + 100 < 0);
    }

    #[test]
    fn test_retire_is_one_way() {
        let mut m = Motion::enter(text_item(10), 100, 0, 5, false);
        m.retire(20);
        m.advance(VIEW_W, true);
        assert!(m.is_retiring());
    }

    #[test]
    fn test_looping_item_wraps_instead_of_exiting() {
        let mut m = Motion::enter(text_item(600), VIEW_W + 50, 0, 50, true);
        let mut wrapped = false;
        for _ in 0..100 {
            assert_eq!(m.advance(VIEW_W, true), Fate::Alive);
            if m.x() == VIEW_W {
                wrapped = true;
                break;
            }
        }
        assert!(wrapped, "looping item never reset to the right edge");
    }

    #[test]
    fn test_looping_respects_scroll_tick() {
        let mut m = Motion::enter(text_item(600), 100, 0, 2, true);
        m.advance(VIEW_W, false);
        assert_eq!(m.x(), 100);
        m.advance(VIEW_W, true);
        assert_eq!(m.x(), 98);
    }

    #[test]
    fn test_pinned_item_never_moves() {
        let mut m = Motion::pinned(text_item(20), 370, 10);
        for _ in 0..5 {
            assert_eq!(m.advance(VIEW_W, true), Fate::Alive);
        }
        assert_eq!(m.x(), 370);
    }
}
