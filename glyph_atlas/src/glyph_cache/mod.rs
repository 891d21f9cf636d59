// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Glyph cache on top of shared and private atlases.
//!
//! Each distinct `(font, glyph)` pair gets one entry. Entries first try a shared atlas
//! from the [`AtlasRegistry`] and fall back to atlases owned by the cache. Whenever an
//! atlas moves an entry, the entry is marked dirty; [`GlyphCache::set_dirty_glyphs`]
//! or [`GlyphCache::redraw_dirty_glyphs`] bring the pixels back in sync before
//! drawing.

mod key;
mod value;

use alloc::rc::{Rc, Weak};
use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt::{Debug, Formatter};
use core::mem;

use foldhash::fast::FixedState;
use hashbrown::HashMap;
use log::{debug, warn};
use rectangle_map::Rectangle;
use smallvec::SmallVec;

use crate::atlas::{
    Atlas, AtlasConfig, AtlasOccupant, OccupantKey, ReorganizeListener, ReorganizePhase,
    Subscribers, SubscriptionId, notify_all,
};
use crate::backend::{Backend, PixelFormat, Surface};
use crate::registry::{AtlasRegistry, SharedAtlas};

use key::{GlyphCacheKey, GlyphLookupKey};

pub use value::{GlyphCacheValue, GlyphEntryId, GlyphRasterizer, InkRect};

/// Configuration for a [`GlyphCache`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GlyphCacheConfig {
    /// Glyphs are drawn with mipmapping.
    ///
    /// Mipmapped sampling would bleed between neighbours in a shared atlas, so such a
    /// cache only uses its private atlases.
    pub use_mipmapping: bool,
    /// Pixel format of the private atlases.
    pub format: PixelFormat,
    /// Configuration of the private atlases.
    pub private_atlas: AtlasConfig,
}

impl Default for GlyphCacheConfig {
    fn default() -> Self {
        Self {
            use_mipmapping: false,
            format: PixelFormat::A8,
            // Moved entries are redrawn.
            private_atlas: AtlasConfig {
                initial_size: None,
                clear_surface: true,
                migrate: false,
            },
        }
    }
}

/// Space around the ink reserved for an entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Padding {
    /// One pixel on every side, for entries in shared atlases.
    Border,
    /// One pixel on the right and bottom, for entries in private atlases.
    Trailing,
}

impl Padding {
    fn reserve_size(self, ink: InkRect) -> Option<(u32, u32)> {
        let extra = match self {
            Self::Border => 2,
            Self::Trailing => 1,
        };
        Some((ink.width.checked_add(extra)?, ink.height.checked_add(extra)?))
    }

    fn offset(self) -> u32 {
        match self {
            Self::Border => 1,
            Self::Trailing => 0,
        }
    }
}

struct CacheEntry<F: ?Sized, B: Backend> {
    font: Rc<F>,
    glyph: u32,
    value: GlyphCacheValue<B::Surface>,
    padding: Padding,
    /// The reserved rectangle, padding included.
    rect: Rectangle,
    atlas: Option<SharedAtlas<B>>,
    shared: bool,
}

/// An entry to redraw, taken out of the cache so no borrow is held while drawing.
struct DirtyGlyph<F: ?Sized, S> {
    font: Rc<F>,
    glyph: u32,
    value: GlyphCacheValue<S>,
    rect: Rectangle,
}

struct CacheState<F: ?Sized, B: Backend> {
    lookup: HashMap<GlyphCacheKey<F>, u32, FixedState>,
    entries: Vec<CacheEntry<F, B>>,
    private_atlases: Vec<SharedAtlas<B>>,
    /// Shared atlases this cache stored something in, with its subscription there.
    shared_atlases: Vec<(SharedAtlas<B>, SubscriptionId)>,
    has_dirty: bool,
    /// Occupant key of `entries[0]`.
    ///
    /// Moved past every key handed out so far on `clear`, so rectangles that could not
    /// be removed then never alias a later entry.
    key_base: u32,
    /// Number of cache hits since last `clear_stats()`.
    cache_hits: u64,
    /// Number of cache misses since last `clear_stats()`.
    cache_misses: u64,
}

impl<F: ?Sized, B: Backend> CacheState<F, B> {
    fn key(&self, index: u32) -> OccupantKey {
        OccupantKey(self.key_base.wrapping_add(index))
    }

    fn index(&self, key: OccupantKey) -> usize {
        key.0.wrapping_sub(self.key_base) as usize
    }

    fn entry_mut(&mut self, key: OccupantKey) -> Option<&mut CacheEntry<F, B>> {
        let index = self.index(key);
        self.entries.get_mut(index)
    }
}

struct CacheInner<F: ?Sized, B: Backend> {
    config: GlyphCacheConfig,
    registry: AtlasRegistry<B>,
    state: RefCell<CacheState<F, B>>,
    subscribers: RefCell<Subscribers>,
}

/// A cache of rasterized glyphs keyed by font identity and glyph index.
///
/// `F` is the font handle type; fonts are identified by the address of their `Rc`.
pub struct GlyphCache<F: ?Sized, B: Backend> {
    inner: Rc<CacheInner<F, B>>,
}

impl<F: ?Sized + 'static, B: Backend> GlyphCache<F, B> {
    /// Creates an empty cache sharing atlases through `registry`.
    pub fn new(registry: &AtlasRegistry<B>, config: GlyphCacheConfig) -> Self {
        Self {
            inner: Rc::new(CacheInner {
                config,
                registry: registry.clone(),
                state: RefCell::new(CacheState {
                    lookup: HashMap::default(),
                    entries: Vec::new(),
                    private_atlases: Vec::new(),
                    shared_atlases: Vec::new(),
                    has_dirty: false,
                    key_base: 0,
                    cache_hits: 0,
                    cache_misses: 0,
                }),
                subscribers: RefCell::new(Subscribers::default()),
            }),
        }
    }

    /// The configuration the cache was created with.
    pub fn config(&self) -> &GlyphCacheConfig {
        &self.inner.config
    }

    /// Looks up `glyph` of `font`, creating an entry if `create` is set.
    ///
    /// A new entry with ink is dirty until its pixels are drawn. A glyph without ink
    /// gets an entry without storage that is never dirty. Returns `None` on a miss
    /// without `create`, or if no atlas can hold the glyph.
    pub fn lookup(
        &self,
        backend: &mut B,
        rasterizer: &impl GlyphRasterizer<F>,
        font: &Rc<F>,
        glyph: u32,
        create: bool,
    ) -> Option<GlyphCacheValue<B::Surface>> {
        {
            let mut state = self.inner.state.borrow_mut();
            if let Some(&index) = state.lookup.get(&GlyphLookupKey { font, glyph }) {
                state.cache_hits += 1;
                return Some(state.entries[index as usize].value.clone());
            }
            state.cache_misses += 1;
        }
        if !create {
            return None;
        }

        let ink = rasterizer.ink_rect(font, glyph);
        let (index, key) = {
            let mut state = self.inner.state.borrow_mut();
            let Ok(index) = u32::try_from(state.entries.len()) else {
                warn!("Glyph cache is full");
                return None;
            };
            state.entries.push(CacheEntry {
                font: font.clone(),
                glyph,
                value: GlyphCacheValue::new(GlyphEntryId(index), ink),
                padding: Padding::Trailing,
                rect: Rectangle::default(),
                atlas: None,
                shared: false,
            });
            (index, state.key(index))
        };

        if !ink.is_empty() {
            let placed = self
                .reserve_shared(backend, key, ink)
                .map(|atlas| (atlas, true))
                .or_else(|| {
                    self.reserve_private(backend, key, ink)
                        .map(|atlas| (atlas, false))
                });
            let mut state = self.inner.state.borrow_mut();
            if state.key(index) != key {
                debug!("Glyph cache was cleared while placing glyph {glyph}");
                return None;
            }
            let Some((atlas, shared)) = placed else {
                debug!(
                    "No atlas can hold glyph {glyph} ({}x{})",
                    ink.width,
                    ink.height
                );
                state.entries.pop();
                return None;
            };
            let entry = &mut state.entries[index as usize];
            entry.atlas = Some(atlas);
            entry.shared = shared;
        }

        let mut state = self.inner.state.borrow_mut();
        state.lookup.insert(
            GlyphCacheKey {
                font: font.clone(),
                glyph,
            },
            index,
        );
        Some(state.entries[index as usize].value.clone())
    }

    /// Calls `redraw` for every dirty entry and marks it clean.
    ///
    /// `redraw` is expected to draw the glyph into `value.surface` at
    /// `(value.tx_pixel, value.ty_pixel)`. Returns immediately when nothing is dirty.
    pub fn set_dirty_glyphs(
        &self,
        mut redraw: impl FnMut(&Rc<F>, u32, &GlyphCacheValue<B::Surface>),
    ) {
        for dirty in self.take_dirty() {
            redraw(&dirty.font, dirty.glyph, &dirty.value);
        }
    }

    /// Redraws every dirty entry with `rasterizer` and uploads the result.
    ///
    /// The padding around each glyph is cleared along the way.
    pub fn redraw_dirty_glyphs(&self, backend: &mut B, rasterizer: &impl GlyphRasterizer<F>) {
        let mut scratch = Vec::new();
        for dirty in self.take_dirty() {
            let Some(surface) = &dirty.value.surface else {
                continue;
            };
            let format = surface.format();
            let bpp = format.bytes_per_pixel();
            let stride = dirty.rect.width as usize * bpp;
            scratch.clear();
            scratch.resize(stride * dirty.rect.height as usize, 0);

            let offset = (dirty.value.ty_pixel - dirty.rect.y) as usize * stride
                + (dirty.value.tx_pixel - dirty.rect.x) as usize * bpp;
            rasterizer.rasterize(
                &dirty.font,
                dirty.glyph,
                dirty.value.ink(),
                format,
                &mut scratch[offset..],
                stride,
            );
            backend.upload_region(surface, dirty.rect, &scratch, stride);
        }
    }

    /// Drops every entry and every private atlas.
    ///
    /// Entries in shared atlases are removed from them; the shared atlases themselves
    /// are left alone. Also resets the statistics.
    pub fn clear(&self) {
        self.inner.clear();
    }

    /// Registers a listener notified whenever an atlas used by the cache reorganizes.
    pub fn subscribe(&self, listener: Weak<dyn ReorganizeListener>) -> SubscriptionId {
        self.inner.subscribers.borrow_mut().subscribe(listener)
    }

    /// Removes a listener. Returns `false` if it was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.subscribers.borrow_mut().unsubscribe(id)
    }

    /// Number of cached glyphs.
    pub fn len(&self) -> usize {
        self.inner.state.borrow().lookup.len()
    }

    /// Whether the cache holds no glyphs.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether some entry needs to be redrawn.
    pub fn has_dirty_glyphs(&self) -> bool {
        self.inner.state.borrow().has_dirty
    }

    /// Number of private atlases owned by the cache.
    pub fn private_atlas_count(&self) -> usize {
        self.inner.state.borrow().private_atlases.len()
    }

    /// Get the number of cache hits since last `clear_stats()`.
    pub fn cache_hits(&self) -> u64 {
        self.inner.state.borrow().cache_hits
    }

    /// Get the number of cache misses since last `clear_stats()`.
    pub fn cache_misses(&self) -> u64 {
        self.inner.state.borrow().cache_misses
    }

    /// Clear cache hit/miss statistics without clearing the cache itself.
    pub fn clear_stats(&self) {
        let mut state = self.inner.state.borrow_mut();
        state.cache_hits = 0;
        state.cache_misses = 0;
    }

    fn occupant(&self) -> Weak<dyn AtlasOccupant<B::Surface>> {
        let weak: Weak<CacheInner<F, B>> = Rc::downgrade(&self.inner);
        weak
    }

    fn listener(&self) -> Weak<dyn ReorganizeListener> {
        let weak: Weak<CacheInner<F, B>> = Rc::downgrade(&self.inner);
        weak
    }

    fn set_padding(&self, key: OccupantKey, padding: Padding) {
        if let Some(entry) = self.inner.state.borrow_mut().entry_mut(key) {
            entry.padding = padding;
        }
    }

    fn reserve_shared(
        &self,
        backend: &mut B,
        key: OccupantKey,
        ink: InkRect,
    ) -> Option<SharedAtlas<B>> {
        if self.inner.config.use_mipmapping {
            return None;
        }
        let (width, height) = Padding::Border.reserve_size(ink)?;
        self.set_padding(key, Padding::Border);
        let (atlas, _) = self
            .inner
            .registry
            .reserve(backend, width, height, self.occupant(), key)
            .ok()?;

        let mut state = self.inner.state.borrow_mut();
        if !state
            .shared_atlases
            .iter()
            .any(|(known, _)| Rc::ptr_eq(known, &atlas))
        {
            let id = atlas.borrow_mut().subscribe(self.listener());
            state.shared_atlases.push((atlas.clone(), id));
        }
        Some(atlas)
    }

    fn reserve_private(
        &self,
        backend: &mut B,
        key: OccupantKey,
        ink: InkRect,
    ) -> Option<SharedAtlas<B>> {
        let (width, height) = Padding::Trailing.reserve_size(ink)?;
        self.set_padding(key, Padding::Trailing);

        let existing: SmallVec<[SharedAtlas<B>; 4]> = self
            .inner
            .state
            .borrow()
            .private_atlases
            .iter()
            .cloned()
            .collect();
        for atlas in existing {
            let result = atlas
                .borrow_mut()
                .reserve(backend, width, height, self.occupant(), key);
            if result.is_ok() {
                return Some(atlas);
            }
        }

        let atlas = Rc::new(RefCell::new(Atlas::new(
            self.inner.config.format,
            self.inner.config.private_atlas,
        )));
        atlas.borrow_mut().subscribe(self.listener());
        let result = atlas
            .borrow_mut()
            .reserve(backend, width, height, self.occupant(), key);
        result.ok()?;
        debug!("Created private glyph atlas");
        self.inner
            .state
            .borrow_mut()
            .private_atlases
            .push(atlas.clone());
        Some(atlas)
    }

    fn take_dirty(&self) -> Vec<DirtyGlyph<F, B::Surface>> {
        let mut state = self.inner.state.borrow_mut();
        if !state.has_dirty {
            return Vec::new();
        }
        state.has_dirty = false;
        state
            .entries
            .iter_mut()
            .filter(|entry| entry.value.dirty)
            .map(|entry| {
                let dirty = DirtyGlyph {
                    font: entry.font.clone(),
                    glyph: entry.glyph,
                    value: entry.value.clone(),
                    rect: entry.rect,
                };
                entry.value.dirty = false;
                dirty
            })
            .collect()
    }
}

impl<F: ?Sized, B: Backend> CacheInner<F, B> {
    fn clear(&self) {
        let (entries, shared_atlases, private_atlases) = {
            let mut state = self.state.borrow_mut();
            state.lookup.clear();
            state.has_dirty = false;
            state.cache_hits = 0;
            state.cache_misses = 0;
            let handed_out = u32::try_from(state.entries.len()).unwrap_or(u32::MAX);
            state.key_base = state.key_base.wrapping_add(handed_out);
            (
                mem::take(&mut state.entries),
                mem::take(&mut state.shared_atlases),
                mem::take(&mut state.private_atlases),
            )
        };

        for entry in entries.into_iter().filter(|entry| entry.shared) {
            let Some(atlas) = entry.atlas else { continue };
            let borrowed = atlas.try_borrow_mut();
            match borrowed {
                Ok(mut atlas) => {
                    atlas.remove(&entry.rect);
                }
                // The atlas drops the rectangle at its next reorganization.
                Err(_) => debug!(
                    "Glyph {} released while its atlas was in use; release deferred",
                    entry.glyph
                ),
            };
        }

        let mut still_subscribed = Vec::new();
        for (atlas, id) in shared_atlases {
            let unsubscribed = match atlas.try_borrow_mut() {
                Ok(mut borrowed) => borrowed.unsubscribe(id),
                Err(_) => false,
            };
            if !unsubscribed {
                still_subscribed.push((atlas, id));
            }
        }
        // Retried by the next `clear`, so a later entry in that atlas does not subscribe twice.
        self.state.borrow_mut().shared_atlases = still_subscribed;
        drop(private_atlases);
    }
}

impl<F: ?Sized, B: Backend> AtlasOccupant<B::Surface> for CacheInner<F, B> {
    fn position_changed(&self, key: OccupantKey, surface: &Rc<B::Surface>, rect: Rectangle) {
        let mut state = self.state.borrow_mut();
        let Some(entry) = state.entry_mut(key) else {
            debug!("Ignoring position update for released glyph entry {key:?}");
            return;
        };
        let x = rect.x + entry.padding.offset();
        let y = rect.y + entry.padding.offset();
        let (width, height) = (surface.width() as f32, surface.height() as f32);
        let value = &mut entry.value;
        value.surface = Some(surface.clone());
        value.tx_pixel = x;
        value.ty_pixel = y;
        value.tx1 = x as f32 / width;
        value.ty1 = y as f32 / height;
        value.tx2 = (x + value.draw_width) as f32 / width;
        value.ty2 = (y + value.draw_height) as f32 / height;
        value.dirty = true;
        entry.rect = rect;
        state.has_dirty = true;
    }

    fn is_occupying(&self, key: OccupantKey) -> bool {
        self.state
            .try_borrow()
            .map_or(true, |state| state.index(key) < state.entries.len())
    }
}

impl<F: ?Sized, B: Backend> ReorganizeListener for CacheInner<F, B> {
    fn reorganize(&self, phase: ReorganizePhase) {
        let listeners = self.subscribers.borrow_mut().live();
        notify_all(listeners, phase);
    }
}

impl<F: ?Sized, B: Backend> Drop for CacheInner<F, B> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<F: ?Sized, B: Backend> Debug for GlyphCache<F, B> {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("GlyphCache")
            .field("config", &self.inner.config)
            .field("entries", &state.lookup.len())
            .field("private_atlases", &state.private_atlases.len())
            .field("shared_atlases", &state.shared_atlases.len())
            .field("has_dirty", &state.has_dirty)
            .finish_non_exhaustive()
    }
}
