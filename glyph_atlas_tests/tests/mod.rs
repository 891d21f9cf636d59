// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! This crate contains the integration test suite for `glyph_atlas`.
//!
//! - The `util` module contains the fixture fonts, rasterizer and observers shared by
//!   the tests.
//! - We do not use the default Rust test harness, but instead use this `mod.rs` file as the
//!   entry point to run all other tests, so the shared utilities only need to be defined
//!   once.
//! - Put the "topic" of a test at the start of its name, e.g. `glyph_cache_clear` rather
//!   than `clear_glyph_cache`.

#![allow(missing_docs, reason = "we don't need docs for testing")]
#![allow(clippy::cast_possible_truncation, reason = "not critical for testing")]

mod glyph_cache;
mod util;
