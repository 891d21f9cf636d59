// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Glyph Atlas packs glyphs and other small images into a few large surfaces.
//!
//! Binding one big surface is far cheaper than binding many small ones, so renderers
//! want every glyph of a frame to live in as few surfaces as possible. This crate
//! provides:
//!
//! - [`Atlas`]: a growable surface backed by a [`RectangleMap`]. When a reservation
//!   does not fit, the atlas reorganizes itself into a larger surface, copies the
//!   existing content across and tells every occupant where it moved.
//! - [`AtlasRegistry`]: the set of atlases shared by everything drawn through one
//!   rendering context.
//! - [`AtlasTexture`]: a texture handle living in a shared atlas that can migrate
//!   out to its own surface when a draw needs mipmaps or repeated sampling.
//! - [`GlyphCache`]: a cache of rasterized glyphs keyed by font and glyph index,
//!   which tracks entries whose pixels have to be redrawn after a reorganization.
//!
//! All pixel work goes through a [`Backend`]. The CPU implementation in
//! [`backend::cpu`] keeps surfaces in memory.
//!
//! Everything here is single threaded. Atlases, textures and caches share state
//! through `Rc` and `RefCell`, and observers are notified synchronously from inside
//! the call that moved them. Observers must not call back into the atlas that is
//! notifying them.
//!
//! ## Features
//!
//! - `std` (enabled by default): Enables `std` support in dependencies.
//! - `cpu` (enabled by default): The in-memory [`backend::cpu::CpuBackend`].
//!
//! ## Example
//!
//! ```
//! # #[cfg(feature = "cpu")]
//! # {
//! use glyph_atlas::backend::cpu::CpuBackend;
//! use glyph_atlas::{AtlasRegistry, AtlasTexture, PixelFormat};
//!
//! let mut backend = CpuBackend::new();
//! let registry = AtlasRegistry::new();
//!
//! let texture = AtlasTexture::new(&registry, &mut backend, 16, 16, PixelFormat::Rgba8).unwrap();
//! assert!(texture.is_atlased());
//! assert_eq!(texture.size(), (16, 16));
//! # }
//! ```
//!
//! [`RectangleMap`]: rectangle_map::RectangleMap

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

mod atlas;
mod error;
mod glyph_cache;
mod registry;
mod texture;

pub mod backend;

pub use rectangle_map::Rectangle;

pub use atlas::{
    Atlas, AtlasConfig, AtlasOccupant, OccupantKey, ReorganizeListener, ReorganizePhase,
    SubscriptionId,
};
pub use backend::{Backend, PixelFormat, Surface};
pub use error::{AtlasError, AtlasErrorKind};
pub use glyph_cache::{
    GlyphCache, GlyphCacheConfig, GlyphCacheValue, GlyphEntryId, GlyphRasterizer, InkRect,
};
pub use registry::{AtlasRegistry, SharedAtlas};
pub use texture::{AtlasTexture, DrawRequirements};
