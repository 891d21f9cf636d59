// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Cached glyph locations and the rasterizer interface.

use alloc::rc::Rc;
use core::fmt::{Debug, Formatter};

use crate::backend::PixelFormat;

/// Identifies an entry of a [`GlyphCache`](super::GlyphCache).
///
/// Stable until the cache is cleared.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GlyphEntryId(pub(crate) u32);

/// Where a cached glyph is and whether its pixels are current.
pub struct GlyphCacheValue<S> {
    /// The entry this value was read from.
    pub id: GlyphEntryId,
    /// Surface holding the glyph, or `None` for glyphs without ink.
    pub surface: Option<Rc<S>>,
    /// Normalized left edge of the glyph in `surface`.
    pub tx1: f32,
    /// Normalized top edge of the glyph in `surface`.
    pub ty1: f32,
    /// Normalized right edge of the glyph in `surface`.
    pub tx2: f32,
    /// Normalized bottom edge of the glyph in `surface`.
    pub ty2: f32,
    /// Left edge of the glyph in `surface`, in pixels.
    pub tx_pixel: u32,
    /// Top edge of the glyph in `surface`, in pixels.
    pub ty_pixel: u32,
    /// Horizontal offset of the ink from the glyph origin.
    pub draw_x: i32,
    /// Vertical offset of the ink from the glyph origin.
    pub draw_y: i32,
    /// Width of the ink in pixels.
    pub draw_width: u32,
    /// Height of the ink in pixels.
    pub draw_height: u32,
    /// The pixels in `surface` do not match the glyph and must be redrawn before use.
    pub dirty: bool,
}

impl<S> GlyphCacheValue<S> {
    pub(crate) fn new(id: GlyphEntryId, ink: InkRect) -> Self {
        Self {
            id,
            surface: None,
            tx1: 0.0,
            ty1: 0.0,
            tx2: 0.0,
            ty2: 0.0,
            tx_pixel: 0,
            ty_pixel: 0,
            draw_x: ink.x,
            draw_y: ink.y,
            draw_width: ink.width,
            draw_height: ink.height,
            dirty: false,
        }
    }

    /// The ink rectangle the glyph was rasterized with.
    pub fn ink(&self) -> InkRect {
        InkRect {
            x: self.draw_x,
            y: self.draw_y,
            width: self.draw_width,
            height: self.draw_height,
        }
    }
}

impl<S> Clone for GlyphCacheValue<S> {
    fn clone(&self) -> Self {
        Self {
            surface: self.surface.clone(),
            ..*self
        }
    }
}

impl<S> Debug for GlyphCacheValue<S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("GlyphCacheValue")
            .field("id", &self.id)
            .field("has_surface", &self.surface.is_some())
            .field("tx", &(self.tx1, self.ty1, self.tx2, self.ty2))
            .field("pixel", &(self.tx_pixel, self.ty_pixel))
            .field("ink", &self.ink())
            .field("dirty", &self.dirty)
            .finish_non_exhaustive()
    }
}

/// The pixel bounding box of a rasterized glyph, relative to its origin.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InkRect {
    /// Horizontal offset from the glyph origin to the left edge.
    pub x: i32,
    /// Vertical offset from the glyph origin to the top edge.
    pub y: i32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl InkRect {
    /// Whether the glyph draws no pixels.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Draws glyphs of fonts of type `F`.
pub trait GlyphRasterizer<F: ?Sized> {
    /// Returns the ink rectangle of `glyph`.
    fn ink_rect(&self, font: &F, glyph: u32) -> InkRect;

    /// Draws `glyph` into `buffer`.
    ///
    /// `buffer` is zeroed and holds `ink.height` rows of `ink.width` pixels in
    /// `format`, row `n` starting at byte `n * stride`.
    fn rasterize(
        &self,
        font: &F,
        glyph: u32,
        ink: InkRect,
        format: PixelFormat,
        buffer: &mut [u8],
        stride: usize,
    );
}
