/*
 *  stage.rs
 *
 *  LyMarq - the big squeeze
 *  (c) 2020-25 Stuart Hunter
 *
 *  The presentation state machine. Owns the fixed set of slots (artwork,
 *  two title lines, service icon), each holding at most one current and one
 *  retiring item, decides when a poll snapshot replaces what is on stage
 *  and drives every item's motion one tick per rendered frame.
 *
 *  The stage is shared between the render thread and the poll workers
 *  behind one mutex; `merge` and `advance_and_draw` are the only two entry
 *  points and each runs as a single critical section. No frame can observe
 *  a slot mid-swap. Image decode and text shaping of poll data happen in
 *  the workers before the lock is taken; the only rasterization done under
 *  the lock is the title lines, which cannot fail.
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

use log::debug;

use crate::constants::{EMPTY_QUEUE_TEXT, ENTRY_SPEED, EXIT_SPEED, LOOP_STEP, SCROLL_DIVISOR};
use crate::layout::Layout;
use crate::motion::{Fate, Motion};
use crate::renderable::{Fingerprint, Renderable};
use crate::snapshot::{ImageSource, Snapshot};
use crate::surface::Surface;
use crate::typeset::TextRasterizer;

/// The fixed, statically known slots of the layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Artwork,
    Line1,
    Line2,
    ServiceIcon,
}

const SLOT_COUNT: usize = 4;

/// One slot: at most one current and one retiring item, plus the content
/// fingerprint the last accepted update carried.
#[derive(Default)]
struct SlotState {
    current: Option<Motion>,
    previous: Option<Motion>,
    fingerprint: Option<Fingerprint>,
}

impl SlotState {
    /// Replace the current item, pushing the old one into the retiring
    /// position. Whatever was retiring before is discarded on the spot.
    fn supersede(&mut self, incoming: Motion, fingerprint: Fingerprint, exit_speed: i32) {
        if let Some(mut old) = self.current.take() {
            old.retire(exit_speed);
            self.previous = Some(old);
        }
        self.current = Some(incoming);
        self.fingerprint = Some(fingerprint);
    }

    /// Retire the current item with no replacement.
    fn clear(&mut self, exit_speed: i32) {
        if let Some(mut old) = self.current.take() {
            old.retire(exit_speed);
            self.previous = Some(old);
        }
        self.fingerprint = None;
    }
}

/// Motion speeds and the slow-scroll divisor. Static for the process
/// lifetime; validated at config load (entry < exit, divisor >= 1).
#[derive(Debug, Clone, Copy)]
pub struct Pace {
    pub entry_speed: i32,
    pub exit_speed: i32,
    pub loop_step: i32,
    pub scroll_divisor: u64,
}

impl Default for Pace {
    fn default() -> Self {
        Pace {
            entry_speed: ENTRY_SPEED,
            exit_speed: EXIT_SPEED,
            loop_step: LOOP_STEP,
            scroll_divisor: SCROLL_DIVISOR,
        }
    }
}

pub struct Stage {
    layout: Layout,
    pace: Pace,
    raster: Box<dyn TextRasterizer>,
    slots: [SlotState; SLOT_COUNT],
    frame: u64,
}

impl Stage {
    pub fn new(layout: Layout, pace: Pace, raster: Box<dyn TextRasterizer>) -> Self {
        Stage {
            layout,
            pace,
            raster,
            slots: Default::default(),
            frame: 0,
        }
    }

    fn slot(&self, slot: Slot) -> &SlotState {
        &self.slots[slot as usize]
    }

    fn slot_mut(&mut self, slot: Slot) -> &mut SlotState {
        &mut self.slots[slot as usize]
    }

    /// Fingerprint of the artwork currently accepted, if any. Poll workers
    /// use this to skip decoding bytes the stage already shows.
    pub fn art_fingerprint(&self) -> Option<u64> {
        match self.slot(Slot::Artwork).fingerprint {
            Some(Fingerprint::Bytes(fp)) => Some(fp),
            _ => None,
        }
    }

    /// Same for the service icon.
    pub fn icon_fingerprint(&self) -> Option<u64> {
        match self.slot(Slot::ServiceIcon).fingerprint {
            Some(Fingerprint::Bytes(fp)) => Some(fp),
            _ => None,
        }
    }

    /// Merge one track snapshot into the slots. Called by a poll worker on
    /// completion, under the shared lock. An absent line 2 signals an empty
    /// play queue and triggers the compound idle transition; everything
    /// else is a per-slot compare-and-replace.
    pub fn merge(&mut self, snapshot: Snapshot) {
        if snapshot.line2.is_none() {
            self.merge_idle();
            return;
        }

        if let Some(text) = snapshot.line1 {
            self.merge_text(Slot::Line1, text);
        }
        if let Some(text) = snapshot.line2 {
            self.merge_text(Slot::Line2, text);
        }
        self.merge_image(snapshot.art);
        self.merge_icon(snapshot.icon);
    }

    /// Empty play queue: line 1 becomes the placeholder, artwork and line 2
    /// retire with no replacement and the icon is dropped. Idempotent - if
    /// line 1 already shows the placeholder nothing moves.
    fn merge_idle(&mut self) {
        let placeholder = Fingerprint::Text(EMPTY_QUEUE_TEXT.to_string());
        if self.slot(Slot::Line1).fingerprint.as_ref() == Some(&placeholder) {
            return;
        }
        debug!("queue empty, switching to placeholder");

        self.merge_text(Slot::Line1, EMPTY_QUEUE_TEXT.to_string());
        let exit = self.pace.exit_speed;
        self.slot_mut(Slot::Line2).clear(exit);
        self.slot_mut(Slot::Artwork).clear(exit);
        let icon = self.slot_mut(Slot::ServiceIcon);
        icon.current = None;
        icon.fingerprint = None;
    }

    fn merge_text(&mut self, slot: Slot, text: String) {
        let fingerprint = Fingerprint::Text(text.clone());
        if self.slot(slot).fingerprint.as_ref() == Some(&fingerprint) {
            return;
        }

        let bitmap = self.raster.rasterize(&text);
        let item = Renderable::Text { value: text, bitmap };
        self.install(slot, item, fingerprint);
    }

    fn merge_image(&mut self, art: Option<ImageSource>) {
        let Some(source) = art else {
            // the track carries no artwork reference at all
            if self.slot(Slot::Artwork).fingerprint.is_some() {
                debug!("artwork gone, retiring current image");
                let exit = self.pace.exit_speed;
                self.slot_mut(Slot::Artwork).clear(exit);
            }
            return;
        };

        let Some(fp) = source.fingerprint else {
            return; // fetch failed; keep showing what we have
        };
        let fingerprint = Fingerprint::Bytes(fp);
        if self.slot(Slot::Artwork).fingerprint.as_ref() == Some(&fingerprint) {
            return;
        }

        // Changed content. A missing bitmap here means the bytes did not
        // decode: leave the slot and its fingerprint untouched so a later
        // good fetch of the same content still registers as a change.
        let Some(bitmap) = source.bitmap else {
            debug!("artwork changed but undecodable, keeping last good image");
            return;
        };

        let item = Renderable::Image { fingerprint: fp, bitmap };
        self.install(Slot::Artwork, item, fingerprint);
    }

    /// The icon is not animated: replaced wholesale at its pinned corner
    /// position, old one discarded immediately rather than retired.
    fn merge_icon(&mut self, icon: Option<ImageSource>) {
        let slot = Slot::ServiceIcon;
        let Some(source) = icon else {
            let s = self.slot_mut(slot);
            s.current = None;
            s.fingerprint = None;
            return;
        };
        let Some(fp) = source.fingerprint else {
            return;
        };
        let fingerprint = Fingerprint::Bytes(fp);
        if self.slot(slot).fingerprint.as_ref() == Some(&fingerprint) {
            return;
        }
        let Some(bitmap) = source.bitmap else {
            return;
        };

        let item = Renderable::Image { fingerprint: fp, bitmap };
        let x = self.layout.icon_x(item.width());
        let y = self.layout.icon_y;
        let s = self.slot_mut(slot);
        s.current = Some(Motion::pinned(item, x, y));
        s.fingerprint = Some(fingerprint);
    }

    /// Put a new item on stage for `slot`, entering from the right edge.
    /// Content wider than the viewport starts looping from its first frame.
    fn install(&mut self, slot: Slot, item: Renderable, fingerprint: Fingerprint) {
        let looping = item.width() > self.layout.width;
        let speed = if looping { self.pace.loop_step } else { self.pace.entry_speed };
        let y = match slot {
            Slot::Artwork => self.layout.art_y,
            Slot::Line1 => self.layout.line1_y,
            Slot::Line2 => self.layout.line2_y,
            Slot::ServiceIcon => self.layout.icon_y,
        };
        let incoming = Motion::enter(item, self.layout.entry_x, y, speed, looping);
        let exit = self.pace.exit_speed;
        self.slot_mut(slot).supersede(incoming, fingerprint, exit);
    }

    /// Advance every motion one tick and draw the frame. Called exactly
    /// once per rendered frame by the render thread, under the shared lock.
    /// Draw order is fixed; the icon is drawn last so it overlays.
    pub fn advance_and_draw(&mut self, surface: &mut Surface<'_>) {
        self.frame = self.frame.wrapping_add(1);
        let scroll_tick = self.frame % self.pace.scroll_divisor.max(1) == 0;
        let view_w = self.layout.width as i32;

        for slot in [Slot::Artwork, Slot::Line1, Slot::Line2] {
            let state = &mut self.slots[slot as usize];

            if let Some(current) = state.current.as_mut() {
                current.draw(surface);
                current.advance(view_w, scroll_tick);
            }
            if let Some(previous) = state.previous.as_mut() {
                previous.draw(surface);
                if previous.advance(view_w, scroll_tick) == Fate::Gone {
                    // the only removal path for retiring items
                    state.previous = None;
                }
            }
        }

        if let Some(icon) = self.slots[Slot::ServiceIcon as usize].current.as_ref() {
            icon.draw(surface);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderable::Bitmap;
    use crate::typeset::FixedRasterizer;

    const VIEW_W: u32 = 400;
    const VIEW_H: u32 = 240;

    fn stage() -> Stage {
        Stage::new(
            Layout::for_viewport(VIEW_W, VIEW_H),
            Pace::default(),
            Box::new(FixedRasterizer { advance: 8, height: 16 }),
        )
    }

    fn art(fp: u64) -> Option<ImageSource> {
        Some(ImageSource {
            fingerprint: Some(fp),
            bitmap: Some(Bitmap::new(100, 100)),
        })
    }

    fn playing(line1: &str, line2: &str, art_fp: u64) -> Snapshot {
        Snapshot {
            line1: Some(line1.to_string()),
            line2: Some(line2.to_string()),
            art: art(art_fp),
            icon: None,
        }
    }

    fn run_frames(stage: &mut Stage, frames: usize) {
        let mut frame = vec![0u8; (VIEW_W * VIEW_H * 4) as usize];
        for _ in 0..frames {
            let mut surface = Surface::new(&mut frame, VIEW_W, VIEW_H);
            stage.advance_and_draw(&mut surface);
        }
    }

    #[test]
    fn test_identical_snapshot_is_a_no_op() {
        // Scenario A: re-merging unchanged content creates nothing new.
        let mut st = stage();
        st.merge(playing("Song A", "Artist A", 1));
        run_frames(&mut st, 3);

        let x_before = st.slot(Slot::Line1).current.as_ref().unwrap().x();
        st.merge(playing("Song A", "Artist A", 1));

        let line1 = st.slot(Slot::Line1);
        assert_eq!(line1.current.as_ref().unwrap().x(), x_before);
        assert!(line1.previous.is_none());
        assert!(st.slot(Slot::Line2).previous.is_none());
        assert!(st.slot(Slot::Artwork).previous.is_none());
    }

    #[test]
    fn test_track_change_retires_and_replaces() {
        let mut st = stage();
        st.merge(playing("Song A", "Artist A", 1));
        run_frames(&mut st, 30); // let everything settle
        st.merge(playing("Song B", "Artist B", 2));

        for slot in [Slot::Artwork, Slot::Line1, Slot::Line2] {
            let s = st.slot(slot);
            assert!(s.current.is_some(), "{:?} lost its current item", slot);
            assert!(s.previous.is_some(), "{:?} did not retire", slot);
            assert!(s.previous.as_ref().unwrap().is_retiring());
            // incoming item starts past the right edge
            assert!(s.current.as_ref().unwrap().x() >= VIEW_W as i32);
        }
    }

    #[test]
    fn test_previous_is_replaced_not_accumulated() {
        // at most one retiring item per slot: a second change while one is
        // still leaving discards it
        let mut st = stage();
        st.merge(playing("Song A", "Artist A", 1));
        st.merge(playing("Song B", "Artist B", 2));
        st.merge(playing("Song C", "Artist C", 3));

        let line1 = st.slot(Slot::Line1);
        assert_eq!(
            line1.previous.as_ref().unwrap().item().text(),
            Some("Song B")
        );
        assert_eq!(line1.current.as_ref().unwrap().item().text(), Some("Song C"));
    }

    #[test]
    fn test_empty_queue_compound_transition() {
        // Scenario B: line 2 absent forces the placeholder onto line 1 and
        // retires artwork and line 2 with no replacement.
        let mut st = stage();
        st.merge(playing("Song A", "Artist A", 1));
        st.merge(Snapshot::idle());

        let line1 = st.slot(Slot::Line1);
        assert_eq!(
            line1.current.as_ref().unwrap().item().text(),
            Some(EMPTY_QUEUE_TEXT)
        );
        assert!(line1.previous.is_some());

        let line2 = st.slot(Slot::Line2);
        assert!(line2.current.is_none());
        assert!(line2.previous.as_ref().unwrap().is_retiring());
        assert!(line2.fingerprint.is_none());

        let artwork = st.slot(Slot::Artwork);
        assert!(artwork.current.is_none());
        assert!(artwork.previous.as_ref().unwrap().is_retiring());
        assert!(artwork.fingerprint.is_none());
    }

    #[test]
    fn test_empty_queue_is_idempotent() {
        // Scenario C: a second idle snapshot must not re-trigger anything.
        let mut st = stage();
        st.merge(playing("Song A", "Artist A", 1));
        st.merge(Snapshot::idle());
        run_frames(&mut st, 100); // previous items exit and are removed
        assert!(st.slot(Slot::Line1).previous.is_none());

        let x_before = st.slot(Slot::Line1).current.as_ref().unwrap().x();
        st.merge(Snapshot::idle());

        let line1 = st.slot(Slot::Line1);
        assert_eq!(line1.current.as_ref().unwrap().x(), x_before);
        assert!(line1.previous.is_none());
        assert!(st.slot(Slot::Line2).previous.is_none());
        assert!(st.slot(Slot::Artwork).previous.is_none());
    }

    #[test]
    fn test_over_wide_title_loops_and_wraps() {
        // Scenario D: 8 px per char * 60 chars = 480 px > 400 px viewport.
        let long_title = "x".repeat(60);
        let mut st = stage();
        st.merge(Snapshot {
            line1: Some(long_title),
            line2: Some("Artist".to_string()),
            art: None,
            icon: None,
        });

        assert!(st.slot(Slot::Line1).current.as_ref().unwrap().is_looping());

        // drive frames until it has wrapped back to the right edge
        let mut wrapped = false;
        let mut frame = vec![0u8; (VIEW_W * VIEW_H * 4) as usize];
        for _ in 0..2000 {
            let mut surface = Surface::new(&mut frame, VIEW_W, VIEW_H);
            st.advance_and_draw(&mut surface);
            let x = st.slot(Slot::Line1).current.as_ref().unwrap().x();
            if x == VIEW_W as i32 {
                wrapped = true;
                break;
            }
        }
        assert!(wrapped, "looping title never wrapped");
        assert!(st.slot(Slot::Line1).current.is_some());
    }

    #[test]
    fn test_decode_failure_leaves_slot_untouched() {
        // Scenario E: changed artwork that fails to decode is a no-op and
        // the fingerprint stays stale, so the same bytes decoded later are
        // still treated as a change.
        let mut st = stage();
        st.merge(playing("Song A", "Artist A", 1));
        run_frames(&mut st, 30);
        let x_before = st.slot(Slot::Artwork).current.as_ref().unwrap().x();

        st.merge(Snapshot {
            line1: Some("Song A".to_string()),
            line2: Some("Artist A".to_string()),
            art: Some(ImageSource { fingerprint: Some(2), bitmap: None }),
            icon: None,
        });

        let artwork = st.slot(Slot::Artwork);
        assert_eq!(artwork.current.as_ref().unwrap().x(), x_before);
        assert!(artwork.previous.is_none());
        assert_eq!(st.art_fingerprint(), Some(1));

        // the same content arriving decodable is still a change
        st.merge(playing("Song A", "Artist A", 2));
        assert_eq!(st.art_fingerprint(), Some(2));
        assert!(st.slot(Slot::Artwork).previous.is_some());
    }

    #[test]
    fn test_failed_fetch_is_a_no_op() {
        let mut st = stage();
        st.merge(playing("Song A", "Artist A", 1));
        st.merge(Snapshot {
            line1: Some("Song A".to_string()),
            line2: Some("Artist A".to_string()),
            art: Some(ImageSource::unavailable()),
            icon: Some(ImageSource::unavailable()),
        });

        assert_eq!(st.art_fingerprint(), Some(1));
        assert!(st.slot(Slot::Artwork).current.is_some());
        assert!(st.slot(Slot::Artwork).previous.is_none());
    }

    #[test]
    fn test_icon_replaced_wholesale() {
        let mut st = stage();
        let icon = |fp| {
            Some(ImageSource {
                fingerprint: Some(fp),
                bitmap: Some(Bitmap::new(24, 24)),
            })
        };
        st.merge(Snapshot {
            line1: Some("Song".to_string()),
            line2: Some("Artist".to_string()),
            art: None,
            icon: icon(7),
        });

        let s = st.slot(Slot::ServiceIcon);
        // pinned at the corner from the first frame
        assert_eq!(
            s.current.as_ref().unwrap().x(),
            st.layout.icon_x(24)
        );

        st.merge(Snapshot {
            line1: Some("Song".to_string()),
            line2: Some("Artist".to_string()),
            art: None,
            icon: icon(8),
        });
        let s = st.slot(Slot::ServiceIcon);
        assert!(s.previous.is_none(), "icon must never retire");
        assert_eq!(st.icon_fingerprint(), Some(8));
    }

    #[test]
    fn test_retired_items_are_removed_after_exit() {
        let mut st = stage();
        st.merge(playing("Song A", "Artist A", 1));
        st.merge(playing("Song B", "Artist B", 2));
        run_frames(&mut st, 200);

        for slot in [Slot::Artwork, Slot::Line1, Slot::Line2] {
            assert!(st.slot(slot).previous.is_none(), "{:?} never emptied", slot);
            assert!(st.slot(slot).current.is_some());
        }
    }
}
