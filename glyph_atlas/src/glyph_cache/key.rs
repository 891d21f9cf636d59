// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Glyph cache key.

use alloc::rc::Rc;
use core::hash::{Hash, Hasher};
use core::ptr;

/// Identifies a cached glyph by font identity and glyph index.
///
/// Fonts are compared by address, never by value: two distinct font handles with the
/// same content are different keys.
pub(crate) struct GlyphCacheKey<F: ?Sized> {
    pub(crate) font: Rc<F>,
    pub(crate) glyph: u32,
}

/// Borrowed form of [`GlyphCacheKey`], so lookups need not clone the font handle.
pub(crate) struct GlyphLookupKey<'a, F: ?Sized> {
    pub(crate) font: &'a Rc<F>,
    pub(crate) glyph: u32,
}

#[inline]
fn hash_key<F: ?Sized, H: Hasher>(font: &Rc<F>, glyph: u32, state: &mut H) {
    Rc::as_ptr(font).cast::<()>().hash(state);
    glyph.hash(state);
}

#[inline]
fn same_font<F: ?Sized>(a: &Rc<F>, b: &Rc<F>) -> bool {
    // Addresses only, vtable pointers are not unique.
    ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
}

impl<F: ?Sized> Hash for GlyphCacheKey<F> {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        hash_key(&self.font, self.glyph, state);
    }
}

impl<F: ?Sized> PartialEq for GlyphCacheKey<F> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.glyph == other.glyph && same_font(&self.font, &other.font)
    }
}

impl<F: ?Sized> Eq for GlyphCacheKey<F> {}

impl<F: ?Sized> Hash for GlyphLookupKey<'_, F> {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        hash_key(self.font, self.glyph, state);
    }
}

impl<F: ?Sized> hashbrown::Equivalent<GlyphCacheKey<F>> for GlyphLookupKey<'_, F> {
    fn equivalent(&self, key: &GlyphCacheKey<F>) -> bool {
        self.glyph == key.glyph && same_font(self.font, &key.font)
    }
}
