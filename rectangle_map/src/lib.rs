// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A binary-tree rectangle allocator.
//!
//! [`RectangleMap`] keeps track of used and unused sub-rectangles of a fixed-size
//! surface. Every node of the tree is either a branch with two children that exactly
//! partition its rectangle, a filled leaf carrying a caller-supplied value, or an empty
//! leaf. The leaves always tile the whole surface.
//!
//! The placement strategy is the classic lightmap packer described at
//! <http://www.blackpawn.com/texts/lightmaps/default.html>: a depth-first search finds
//! the first empty leaf that can hold the request, which is then carved down to the
//! exact size.
//!
//! Packing quality depends on insertion order. When moving many existing rectangles
//! into a new map, insert them sorted by decreasing area.
//!
//! ## Features
//!
//! - `std` (enabled by default): This is currently unused and is provided for forward compatibility.
//!
//! ## Example
//!
//! ```
//! use rectangle_map::{RectangleMap, Rectangle};
//!
//! let mut map = RectangleMap::new(64, 64);
//! let rect = map.add(16, 8, "glyph").unwrap();
//! assert_eq!((rect.width, rect.height), (16, 8));
//! assert_eq!(map.remaining_space(), 64 * 64 - 16 * 8);
//!
//! assert_eq!(map.remove(&rect), "glyph");
//! assert!(map.is_empty());
//! ```

// LINEBENDER LINT SET - lib.rs - v3
// See https://linebender.org/wiki/canonical-lints/
// These lints shouldn't apply to examples or tests.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
// These lints shouldn't apply to examples.
#![warn(clippy::print_stdout, clippy::print_stderr)]
// Targeting e.g. 32-bit means structs containing usize can give false positives for 64-bit.
#![cfg_attr(target_pointer_width = "64", warn(clippy::trivially_copy_pass_by_ref))]
// END LINEBENDER LINT SET
#![cfg_attr(docsrs, feature(doc_cfg))]
#![no_std]

extern crate alloc;
#[cfg(feature = "std")]
extern crate std;

mod error;
mod map;
mod rect;

pub use error::{AddError, AddErrorKind};
pub use map::{Iter, Leaf, Leaves, RectangleMap};
pub use rect::Rectangle;
