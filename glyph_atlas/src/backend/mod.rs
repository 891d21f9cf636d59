// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The graphics backend the atlases draw on.
//!
//! Atlases never touch pixels directly. Surface creation, size queries and pixel
//! transfers all go through a [`Backend`], so the same packing logic drives a GPU
//! texture store or the in-memory [`cpu`] implementation.

#[cfg(feature = "cpu")]
pub mod cpu;

use rectangle_map::Rectangle;

/// Pixel layout of a surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum PixelFormat {
    /// Single 8-bit alpha (coverage) channel.
    A8,
    /// 8-bit RGBA, straight alpha.
    Rgba8,
    /// 8-bit RGBA, premultiplied alpha.
    Rgba8Premultiplied,
}

impl PixelFormat {
    /// Number of bytes used by one pixel.
    #[inline]
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::A8 => 1,
            Self::Rgba8 | Self::Rgba8Premultiplied => 4,
        }
    }
}

/// A pixel surface created by a [`Backend`].
///
/// Atlases share surfaces with their occupants through `Rc`, so a surface stays alive
/// as long as anyone still samples from it.
pub trait Surface {
    /// Width in pixels.
    fn width(&self) -> u32;
    /// Height in pixels.
    fn height(&self) -> u32;
    /// Pixel layout.
    fn format(&self) -> PixelFormat;
}

/// Surface operations required by atlases.
///
/// Binding and sampling surfaces is left to the renderer that consumes the atlas
/// coordinates and is not part of this trait.
pub trait Backend: 'static {
    /// The surface type produced by this backend.
    type Surface: Surface + 'static;

    /// Whether a surface of this size and format can be created at all.
    ///
    /// Atlas growth stops at the first size this rejects.
    fn is_size_supported(&self, width: u32, height: u32, format: PixelFormat) -> bool;

    /// Creates a surface, optionally filled with zeroes.
    ///
    /// Returns `None` if the backend ran out of resources.
    fn create_surface(
        &mut self,
        width: u32,
        height: u32,
        format: PixelFormat,
        clear: bool,
    ) -> Option<Self::Surface>;

    /// Copies `src_rect` of `src` to `dst` with its top left corner at `(dst_x, dst_y)`.
    ///
    /// Both surfaces have the same format.
    fn copy_region(
        &mut self,
        src: &Self::Surface,
        src_rect: Rectangle,
        dst: &Self::Surface,
        dst_x: u32,
        dst_y: u32,
    );

    /// Writes `region.width` × `region.height` pixels from `data` into `region` of `dst`.
    ///
    /// `data` is in the surface's format; row `n` starts at byte `n * stride`.
    fn upload_region(&mut self, dst: &Self::Surface, region: Rectangle, data: &[u8], stride: usize);
}
