/*
 *  renderable.rs
 *
 *  LyMarq - the big squeeze
 *  (c) 2020-25 Stuart Hunter
 *
 *  A renderable item is the payload of one animation: either a decoded,
 *  pre-scaled cover image or a rasterized line of text. Immutable once
 *  created and owned exclusively by the motion that carries it.
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

use image::imageops::FilterType;
use log::debug;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Straight-alpha RGBA8 pixels, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Bitmap {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl Bitmap {
    pub fn new(width: u32, height: u32) -> Self {
        Bitmap {
            width,
            height,
            pixels: vec![0u8; (width * height * 4) as usize],
        }
    }
}

/// Content identity used for change detection: the string itself for text,
/// a hash of the raw source bytes for images.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fingerprint {
    Text(String),
    Bytes(u64),
}

/// Hash raw image bytes into their fingerprint value.
pub fn fingerprint_bytes(bytes: &[u8]) -> u64 {
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    hasher.finish()
}

/// An immutable visual unit with a size and a draw payload.
#[derive(Debug, Clone)]
pub enum Renderable {
    Image { fingerprint: u64, bitmap: Bitmap },
    Text { value: String, bitmap: Bitmap },
}

impl Renderable {
    pub fn width(&self) -> u32 {
        self.bitmap().width
    }

    pub fn height(&self) -> u32 {
        self.bitmap().height
    }

    pub fn bitmap(&self) -> &Bitmap {
        match self {
            Renderable::Image { bitmap, .. } => bitmap,
            Renderable::Text { bitmap, .. } => bitmap,
        }
    }

    pub fn fingerprint(&self) -> Fingerprint {
        match self {
            Renderable::Image { fingerprint, .. } => Fingerprint::Bytes(*fingerprint),
            Renderable::Text { value, .. } => Fingerprint::Text(value.clone()),
        }
    }

    /// The text a `Text` item was rasterized from, if any.
    pub fn text(&self) -> Option<&str> {
        match self {
            Renderable::Text { value, .. } => Some(value.as_str()),
            Renderable::Image { .. } => None,
        }
    }
}

/// Decode fetched image bytes and scale so the height equals `target_height`
/// with the aspect ratio preserved. Malformed or unsupported bytes yield
/// `None`; the display never surfaces a decode error.
pub fn decode_scaled(bytes: &[u8], target_height: u32) -> Option<Bitmap> {
    let img = match image::load_from_memory(bytes) {
        Ok(img) => img,
        Err(e) => {
            debug!("image decode failed ({} bytes): {}", bytes.len(), e);
            return None;
        }
    };

    let (w, h) = (img.width(), img.height());
    if w == 0 || h == 0 || target_height == 0 {
        return None;
    }

    let target_width = ((w as f32 / h as f32) * target_height as f32).round().max(1.0) as u32;
    let scaled = img.resize_exact(target_width, target_height, FilterType::Triangle);
    let rgba = scaled.to_rgba8();

    Some(Bitmap {
        width: target_width,
        height: target_height,
        pixels: rgba.into_raw(),
    })
}
