// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Utility functions and types shared across tests.

mod fixtures;
mod observers;

pub(crate) use fixtures::{BoxRasterizer, TestFont, assert_glyph_pixels};
pub(crate) use observers::{Event, EventLog, assert_disjoint};
