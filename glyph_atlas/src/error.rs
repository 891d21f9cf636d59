// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use core::fmt;

use crate::PixelFormat;

/// Kinds of errors that can occur when reserving space in an atlas.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum AtlasErrorKind {
    /// The requested rectangle has a zero width or height.
    ZeroSized,
    /// No surface size supported by the backend can hold every occupant.
    NoSupportedSize,
    /// The backend failed to create a surface of a supported size.
    SurfaceAllocation,
    /// The pixel format cannot be stored in a shared atlas.
    UnsupportedFormat(PixelFormat),
}

/// Error returned when an atlas reservation fails.
///
/// A failed reservation never modifies the atlas. Callers are expected to fall back
/// to some other storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AtlasError {
    kind: AtlasErrorKind,
    width: u32,
    height: u32,
}

impl AtlasError {
    pub(crate) const fn new(kind: AtlasErrorKind, width: u32, height: u32) -> Self {
        Self {
            kind,
            width,
            height,
        }
    }

    /// Returns the error kind.
    pub const fn kind(self) -> AtlasErrorKind {
        self.kind
    }

    /// Width of the rejected request.
    pub const fn width(self) -> u32 {
        self.width
    }

    /// Height of the rejected request.
    pub const fn height(self) -> u32 {
        self.height
    }

    /// Whether the atlas simply ran out of room.
    ///
    /// This covers both running out of supported surface sizes and the backend
    /// failing to allocate a surface.
    pub const fn is_capacity_failure(self) -> bool {
        matches!(
            self.kind,
            AtlasErrorKind::NoSupportedSize | AtlasErrorKind::SurfaceAllocation
        )
    }
}

impl fmt::Display for AtlasError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (w, h) = (self.width, self.height);
        match self.kind {
            AtlasErrorKind::ZeroSized => write!(f, "cannot reserve zero-sized rectangle {w}x{h}"),
            AtlasErrorKind::NoSupportedSize => {
                write!(f, "no supported atlas size can hold a {w}x{h} rectangle")
            }
            AtlasErrorKind::SurfaceAllocation => {
                write!(
                    f,
                    "failed to allocate an atlas surface for a {w}x{h} rectangle"
                )
            }
            AtlasErrorKind::UnsupportedFormat(format) => {
                write!(f, "{format:?} content cannot be stored in a shared atlas")
            }
        }
    }
}

impl core::error::Error for AtlasError {}
