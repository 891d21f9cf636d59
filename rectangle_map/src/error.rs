// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use core::fmt;

/// Kinds of errors that can occur when adding a rectangle to a [`RectangleMap`].
///
/// [`RectangleMap`]: crate::RectangleMap
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum AddErrorKind {
    /// The requested rectangle has a zero width or height.
    ///
    /// Zero-sized rectangles would break removal, so they are never inserted.
    ZeroSized,
    /// No empty leaf is large enough to hold the rectangle.
    NoSpace,
}

/// Error returned by [`RectangleMap::add`].
///
/// The map is left untouched when this is returned.
///
/// [`RectangleMap::add`]: crate::RectangleMap::add
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AddError {
    kind: AddErrorKind,
    width: u32,
    height: u32,
}

impl AddError {
    pub(crate) const fn zero_sized(width: u32, height: u32) -> Self {
        Self {
            kind: AddErrorKind::ZeroSized,
            width,
            height,
        }
    }

    pub(crate) const fn no_space(width: u32, height: u32) -> Self {
        Self {
            kind: AddErrorKind::NoSpace,
            width,
            height,
        }
    }

    /// Returns the error kind.
    pub const fn kind(self) -> AddErrorKind {
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
}

impl fmt::Display for AddError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            AddErrorKind::ZeroSized => write!(
                f,
                "cannot add zero-sized rectangle {}x{}",
                self.width, self.height
            ),
            AddErrorKind::NoSpace => write!(
                f,
                "no free space for a {}x{} rectangle",
                self.width, self.height
            ),
        }
    }
}

impl core::error::Error for AddError {}
