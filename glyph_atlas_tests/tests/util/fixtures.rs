// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A fake font and rasterizer with predictable output.

use glyph_atlas::backend::cpu::CpuSurface;
use glyph_atlas::{GlyphCacheValue, GlyphRasterizer, InkRect, PixelFormat, Rectangle};

/// A font whose glyphs are all `glyph_size` squares, except glyph 0 which has no ink.
#[derive(Debug)]
pub(crate) struct TestFont {
    pub(crate) glyph_size: u32,
}

impl TestFont {
    pub(crate) fn new(glyph_size: u32) -> Self {
        Self { glyph_size }
    }
}

/// Fills every ink pixel of a glyph with [`fill_byte`].
#[derive(Debug, Default)]
pub(crate) struct BoxRasterizer;

/// The byte every channel of `glyph`'s ink pixels is set to.
pub(crate) fn fill_byte(glyph: u32) -> u8 {
    u8::try_from(glyph % 255).unwrap() + 1
}

impl GlyphRasterizer<TestFont> for BoxRasterizer {
    fn ink_rect(&self, font: &TestFont, glyph: u32) -> InkRect {
        if glyph == 0 {
            return InkRect::default();
        }
        InkRect {
            x: 1,
            y: -i32::try_from(font.glyph_size).unwrap(),
            width: font.glyph_size,
            height: font.glyph_size,
        }
    }

    fn rasterize(
        &self,
        _: &TestFont,
        glyph: u32,
        ink: InkRect,
        format: PixelFormat,
        buffer: &mut [u8],
        stride: usize,
    ) {
        let row = ink.width as usize * format.bytes_per_pixel();
        for y in 0..ink.height as usize {
            buffer[y * stride..y * stride + row].fill(fill_byte(glyph));
        }
    }
}

/// Asserts that the surface holds the ink of `glyph` where `value` says it is.
pub(crate) fn assert_glyph_pixels(value: &GlyphCacheValue<CpuSurface>, glyph: u32) {
    let surface = value.surface.as_ref().expect("glyph has a surface");
    let ink = Rectangle::new(
        value.tx_pixel,
        value.ty_pixel,
        value.draw_width,
        value.draw_height,
    );
    let pixels = surface.read_region(ink);
    assert!(
        pixels.iter().all(|&byte| byte == fill_byte(glyph)),
        "glyph {glyph} at {ink:?} has the wrong pixels"
    );
}
