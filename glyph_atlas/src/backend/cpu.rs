// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! In-memory backend.
//!
//! Surfaces are plain byte buffers. Useful for software rendering, for tests, and as a
//! reference for the semantics a GPU backend has to provide.

use alloc::vec;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt::{Debug, Formatter};
use core::ptr;

use rectangle_map::Rectangle;

use super::{Backend, PixelFormat, Surface};

/// Default largest surface edge accepted by [`CpuBackend`].
pub const DEFAULT_MAX_SURFACE_SIZE: u32 = 4096;

/// A surface whose pixels live in main memory.
pub struct CpuSurface {
    width: u32,
    height: u32,
    format: PixelFormat,
    pixels: RefCell<Vec<u8>>,
}

impl CpuSurface {
    /// Number of bytes in one row.
    #[inline]
    pub fn stride(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }

    /// Copies the pixels of `rect` into a tightly packed buffer.
    ///
    /// # Panics
    ///
    /// If `rect` is not inside the surface.
    pub fn read_region(&self, rect: Rectangle) -> Vec<u8> {
        self.check_bounds(rect);
        let bpp = self.format.bytes_per_pixel();
        let row_len = rect.width as usize * bpp;
        let stride = self.stride();
        let pixels = self.pixels.borrow();
        let mut out = Vec::with_capacity(row_len * rect.height as usize);
        for row in rect.y..rect.bottom() {
            let start = row as usize * stride + rect.x as usize * bpp;
            out.extend_from_slice(&pixels[start..start + row_len]);
        }
        out
    }

    /// Returns the bytes of a single pixel.
    pub fn pixel(&self, x: u32, y: u32) -> Vec<u8> {
        self.read_region(Rectangle::new(x, y, 1, 1))
    }

    fn check_bounds(&self, rect: Rectangle) {
        assert!(
            rect.right() <= self.width && rect.bottom() <= self.height,
            "region {rect:?} is outside the {}x{} surface",
            self.width,
            self.height
        );
    }
}

impl Surface for CpuSurface {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn format(&self) -> PixelFormat {
        self.format
    }
}

impl Debug for CpuSurface {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CpuSurface")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

/// A [`Backend`] that keeps every surface in main memory.
#[derive(Debug)]
pub struct CpuBackend {
    max_surface_size: u32,
    /// Remaining number of surfaces that may be created, if limited.
    surface_budget: Option<usize>,
    surfaces_created: usize,
    regions_copied: usize,
}

impl CpuBackend {
    /// Creates a backend accepting surfaces up to [`DEFAULT_MAX_SURFACE_SIZE`] on each edge.
    pub fn new() -> Self {
        Self::with_max_surface_size(DEFAULT_MAX_SURFACE_SIZE)
    }

    /// Creates a backend accepting surfaces up to `max_surface_size` on each edge.
    pub fn with_max_surface_size(max_surface_size: u32) -> Self {
        Self {
            max_surface_size,
            surface_budget: None,
            surfaces_created: 0,
            regions_copied: 0,
        }
    }

    /// Limits how many more surfaces may be created; further creations fail.
    ///
    /// Simulates running out of video memory.
    pub fn set_surface_budget(&mut self, budget: Option<usize>) {
        self.surface_budget = budget;
    }

    /// Largest accepted surface edge.
    pub fn max_surface_size(&self) -> u32 {
        self.max_surface_size
    }

    /// Number of surfaces created so far.
    pub fn surfaces_created(&self) -> usize {
        self.surfaces_created
    }

    /// Number of [`copy_region`](Backend::copy_region) calls so far.
    pub fn regions_copied(&self) -> usize {
        self.regions_copied
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for CpuBackend {
    type Surface = CpuSurface;

    fn is_size_supported(&self, width: u32, height: u32, _format: PixelFormat) -> bool {
        width > 0 && height > 0 && width <= self.max_surface_size && height <= self.max_surface_size
    }

    fn create_surface(
        &mut self,
        width: u32,
        height: u32,
        format: PixelFormat,
        // Fresh buffers are always zeroed.
        _clear: bool,
    ) -> Option<CpuSurface> {
        if !self.is_size_supported(width, height, format) {
            return None;
        }
        if let Some(budget) = &mut self.surface_budget {
            *budget = budget.checked_sub(1)?;
        }
        self.surfaces_created += 1;
        let len = width as usize * height as usize * format.bytes_per_pixel();
        Some(CpuSurface {
            width,
            height,
            format,
            pixels: RefCell::new(vec![0; len]),
        })
    }

    fn copy_region(
        &mut self,
        src: &CpuSurface,
        src_rect: Rectangle,
        dst: &CpuSurface,
        dst_x: u32,
        dst_y: u32,
    ) {
        assert_eq!(src.format, dst.format, "cannot copy between pixel formats");
        src.check_bounds(src_rect);
        dst.check_bounds(Rectangle::new(dst_x, dst_y, src_rect.width, src_rect.height));
        self.regions_copied += 1;

        let bpp = src.format.bytes_per_pixel();
        let row_len = src_rect.width as usize * bpp;
        let (src_stride, dst_stride) = (src.stride(), dst.stride());
        let src_offset =
            |row: u32| (src_rect.y + row) as usize * src_stride + src_rect.x as usize * bpp;
        let dst_offset = |row: u32| (dst_y + row) as usize * dst_stride + dst_x as usize * bpp;

        if ptr::eq(src, dst) {
            let mut pixels = dst.pixels.borrow_mut();
            // Walk rows away from the overlap so no source row is overwritten early.
            let rows: Vec<u32> = if dst_y > src_rect.y {
                (0..src_rect.height).rev().collect()
            } else {
                (0..src_rect.height).collect()
            };
            for row in rows {
                let from = src_offset(row);
                pixels.copy_within(from..from + row_len, dst_offset(row));
            }
        } else {
            let from = src.pixels.borrow();
            let mut to = dst.pixels.borrow_mut();
            for row in 0..src_rect.height {
                let (s, d) = (src_offset(row), dst_offset(row));
                to[d..d + row_len].copy_from_slice(&from[s..s + row_len]);
            }
        }
    }

    fn upload_region(&mut self, dst: &CpuSurface, region: Rectangle, data: &[u8], stride: usize) {
        dst.check_bounds(region);
        let bpp = dst.format.bytes_per_pixel();
        let row_len = region.width as usize * bpp;
        let dst_stride = dst.stride();
        let mut pixels = dst.pixels.borrow_mut();
        for row in 0..region.height as usize {
            let s = row * stride;
            let d = (region.y as usize + row) * dst_stride + region.x as usize * bpp;
            pixels[d..d + row_len].copy_from_slice(&data[s..s + row_len]);
        }
    }
}
