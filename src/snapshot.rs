/*
 *  snapshot.rs
 *
 *  LyMarq - the big squeeze
 *  (c) 2020-25 Stuart Hunter
 *
 *  One immutable point-in-time read of the player's now-playing state,
 *  produced by a poll worker and consumed exactly once by Stage::merge.
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

use crate::renderable::Bitmap;

/// A fetched image field of a snapshot. Decode and scaling happen in the
/// poll worker, before the stage lock is taken; the merge step only ever
/// moves the prepared bitmap into a slot.
#[derive(Debug, Clone)]
pub struct ImageSource {
    /// Hash of the raw fetched bytes. `None` means the fetch itself failed,
    /// in which case the slot keeps whatever it is showing.
    pub fingerprint: Option<u64>,
    /// Decoded, pre-scaled pixels. `None` with a fingerprint present means
    /// the bytes did not decode; the slot keeps its last good content.
    pub bitmap: Option<Bitmap>,
}

impl ImageSource {
    /// Marker for a fetch that failed outright.
    pub fn unavailable() -> Self {
        ImageSource { fingerprint: None, bitmap: None }
    }
}

/// Track snapshot handed to `Stage::merge`. An absent `line2` is
/// semantically meaningful: it signals that nothing is playing and triggers
/// the compound empty-queue transition.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub line1: Option<String>,
    pub line2: Option<String>,
    /// `None` means the track has no artwork reference at all.
    pub art: Option<ImageSource>,
    /// Streaming service badge; `None` for local library tracks.
    pub icon: Option<ImageSource>,
}

impl Snapshot {
    /// The snapshot a worker produces when the play queue is empty.
    pub fn idle() -> Self {
        Snapshot::default()
    }
}
