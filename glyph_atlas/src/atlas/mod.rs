// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A growable atlas surface.
//!
//! An [`Atlas`] starts out without a surface. The first reservation picks an initial
//! size, and every reservation that does not fit afterwards reorganizes the atlas:
//! all occupants plus the new request are packed into a fresh map, largest first,
//! growing the map until everything fits or the backend runs out of supported sizes.
//! The old content is then copied across and every occupant is told its new
//! position.

mod occupant;
mod reorganize;

use alloc::rc::{Rc, Weak};
use alloc::vec::Vec;
use core::cmp::Reverse;
use core::fmt::{Debug, Formatter};

use log::{debug, trace, warn};
use rectangle_map::{Rectangle, RectangleMap};

use crate::backend::{Backend, PixelFormat, Surface};
use crate::error::{AtlasError, AtlasErrorKind};

pub use occupant::{AtlasOccupant, OccupantKey};
pub use reorganize::{ReorganizeListener, ReorganizePhase, SubscriptionId};

pub(crate) use occupant::Occupant;
pub(crate) use reorganize::{Subscribers, notify_all};

/// Configuration for an [`Atlas`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AtlasConfig {
    /// Edge length of the first surface.
    ///
    /// Defaults to 1024 for single byte formats and 512 otherwise. Halved until the
    /// backend supports it.
    pub initial_size: Option<u32>,
    /// Zero new surfaces before use.
    pub clear_surface: bool,
    /// Copy occupant pixels into the new surface on reorganization.
    ///
    /// Disable this when every occupant redraws its own content after a move.
    pub migrate: bool,
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            initial_size: None,
            clear_surface: false,
            migrate: true,
        }
    }
}

/// A packed map together with the new rectangle of each relocation.
type Layout<S> = (RectangleMap<Occupant<S>>, Vec<Rectangle>);

/// An occupant being repositioned by a reorganization.
struct Relocation<S> {
    /// `None` for the request that triggered the reorganization.
    old: Option<Rectangle>,
    width: u32,
    height: u32,
    occupant: Occupant<S>,
}

impl<S> Relocation<S> {
    fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// A surface shared by many occupants, together with the map of where they live.
pub struct Atlas<B: Backend> {
    format: PixelFormat,
    config: AtlasConfig,
    map: Option<RectangleMap<Occupant<B::Surface>>>,
    surface: Option<Rc<B::Surface>>,
    subscribers: Subscribers,
}

impl<B: Backend> Atlas<B> {
    /// Creates an empty atlas storing pixels in `format`.
    pub fn new(format: PixelFormat, config: AtlasConfig) -> Self {
        Self {
            format,
            config,
            map: None,
            surface: None,
            subscribers: Subscribers::default(),
        }
    }

    /// Pixel format of the surface.
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// The configuration the atlas was created with.
    pub fn config(&self) -> &AtlasConfig {
        &self.config
    }

    /// The current surface, if anything was ever reserved.
    pub fn surface(&self) -> Option<&Rc<B::Surface>> {
        self.surface.as_ref()
    }

    /// Size of the current map, or `(0, 0)` before the first reservation.
    pub fn size(&self) -> (u32, u32) {
        self.map
            .as_ref()
            .map_or((0, 0), |map| (map.width(), map.height()))
    }

    /// Number of occupants.
    pub fn len(&self) -> usize {
        self.map.as_ref().map_or(0, RectangleMap::len)
    }

    /// Whether the atlas has no occupants.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Unused area of the current map, in pixels.
    pub fn remaining_space(&self) -> u64 {
        self.map.as_ref().map_or(0, RectangleMap::remaining_space)
    }

    /// Percentage of the current map that is unused.
    #[expect(
        clippy::cast_possible_truncation,
        reason = "a percentage of the map area is at most 100"
    )]
    pub fn waste_percent(&self) -> u32 {
        match &self.map {
            Some(map) => (map.remaining_space() * 100 / map.area()) as u32,
            None => 0,
        }
    }

    /// Iterates over the occupied rectangles and their keys.
    pub fn occupants(&self) -> impl Iterator<Item = (Rectangle, OccupantKey)> + '_ {
        self.map
            .iter()
            .flat_map(|map| map.iter())
            .map(|(rect, occupant)| (rect, occupant.key()))
    }

    /// Registers a listener for reorganizations of this atlas.
    pub fn subscribe(&mut self, listener: Weak<dyn ReorganizeListener>) -> SubscriptionId {
        self.subscribers.subscribe(listener)
    }

    /// Removes a listener. Returns `false` if it was not subscribed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }

    /// Reserves a `width` × `height` rectangle.
    ///
    /// `occupant` is told its position before this returns, and again whenever a later
    /// reservation reorganizes the atlas. Returns the reserved rectangle.
    ///
    /// On failure the atlas is left exactly as it was: no occupant moved and no
    /// listener was notified.
    pub fn reserve(
        &mut self,
        backend: &mut B,
        width: u32,
        height: u32,
        occupant: Weak<dyn AtlasOccupant<B::Surface>>,
        key: OccupantKey,
    ) -> Result<Rectangle, AtlasError> {
        if width == 0 || height == 0 {
            warn!("Rejected zero-sized atlas reservation {width}x{height}");
            return Err(AtlasError::new(AtlasErrorKind::ZeroSized, width, height));
        }
        let occupant = Occupant::new(occupant, key);

        if let (Some(map), Some(surface)) = (&mut self.map, &self.surface) {
            if let Ok(rect) = map.add(width, height, occupant.clone()) {
                debug!(
                    "Atlas is {}x{}, has {} rectangles and is {}% waste",
                    map.width(),
                    map.height(),
                    map.len(),
                    map.remaining_space() * 100 / map.area()
                );
                occupant.notify(surface, rect);
                return Ok(rect);
            }
        }

        self.reorganize(backend, width, height, occupant)
    }

    /// Removes the occupant stored at `rect` and returns its key.
    ///
    /// Never shrinks or reorganizes the atlas.
    ///
    /// # Panics
    ///
    /// If `rect` was not returned by [`reserve`](Self::reserve) or a position update,
    /// or was already removed.
    pub fn remove(&mut self, rect: &Rectangle) -> OccupantKey {
        let Some(map) = &mut self.map else {
            panic!("rectangle {rect:?} removed from an atlas that was never populated");
        };
        let key = map.remove(rect).key();
        debug!("Removed rectangle sized {}x{}", rect.width, rect.height);
        debug!(
            "Atlas is {}x{}, has {} rectangles and is {}% waste",
            map.width(),
            map.height(),
            map.len(),
            map.remaining_space() * 100 / map.area()
        );
        key
    }

    /// Copies `rect` of the atlas surface into a new standalone surface.
    ///
    /// # Panics
    ///
    /// If the atlas has no surface yet.
    pub fn copy_rectangle(
        &self,
        backend: &mut B,
        rect: Rectangle,
    ) -> Result<B::Surface, AtlasError> {
        let Some(source) = &self.surface else {
            panic!("cannot copy {rect:?} out of an atlas without a surface");
        };
        let target = backend
            .create_surface(rect.width, rect.height, self.format, false)
            .ok_or(AtlasError::new(
                AtlasErrorKind::SurfaceAllocation,
                rect.width,
                rect.height,
            ))?;
        backend.copy_region(source, rect, &target, 0, 0);
        Ok(target)
    }

    fn reorganize(
        &mut self,
        backend: &mut B,
        width: u32,
        height: u32,
        occupant: Occupant<B::Surface>,
    ) -> Result<Rectangle, AtlasError> {
        let mut relocations = Vec::new();
        for (rect, existing) in self.map.iter().flat_map(|map| map.iter()) {
            // Owners that let go while the atlas was busy could not remove themselves.
            if !existing.is_live() {
                debug!("Dropping rectangle {rect:?} released by its occupant");
                continue;
            }
            relocations.push(Relocation {
                old: Some(rect),
                width: rect.width,
                height: rect.height,
                occupant: existing.clone(),
            });
        }
        relocations.push(Relocation {
            old: None,
            width,
            height,
            occupant,
        });
        // Packing works much better largest first.
        relocations.sort_by_key(|relocation| Reverse(relocation.area()));

        let start = match &self.map {
            Some(map) => {
                let needed: u64 = relocations.iter().map(Relocation::area).sum();
                // Keep the size if that leaves at least ~6% slack, otherwise grow now.
                if needed * 53 / 50 > map.area() {
                    next_size(map.width(), map.height())
                } else {
                    Some((map.width(), map.height()))
                }
            }
            None => Some(self.initial_size(backend)),
        };
        let Some((map, placements)) =
            start.and_then(|size| self.create_map(&*backend, size, &relocations))
        else {
            debug!("Could not fit a {width}x{height} rectangle in the atlas");
            return Err(AtlasError::new(
                AtlasErrorKind::NoSupportedSize,
                width,
                height,
            ));
        };

        let Some(surface) = backend.create_surface(
            map.width(),
            map.height(),
            self.format,
            self.config.clear_surface,
        ) else {
            debug!(
                "Could not create a {}x{} atlas surface",
                map.width(),
                map.height()
            );
            return Err(AtlasError::new(
                AtlasErrorKind::SurfaceAllocation,
                width,
                height,
            ));
        };
        let surface = Rc::new(surface);

        notify_all(self.subscribers.live(), ReorganizePhase::Pre);

        let resized = self.size() != (map.width(), map.height());
        debug!(
            "Atlas {} with size {}x{}",
            if resized { "resized" } else { "reorganized" },
            map.width(),
            map.height()
        );

        let old_surface = self.surface.take();
        let mut reserved = Rectangle::default();
        for (relocation, rect) in relocations.iter().zip(&placements) {
            match (relocation.old, &old_surface) {
                // The new request has no content yet.
                (None, _) => reserved = *rect,
                (Some(old), Some(old_surface)) if self.config.migrate => {
                    backend.copy_region(old_surface, old, &surface, rect.x, rect.y);
                }
                _ => {}
            }
            relocation.occupant.notify(&surface, *rect);
        }

        debug!(
            "Atlas is {}x{}, has {} rectangles and is {}% waste",
            map.width(),
            map.height(),
            map.len(),
            map.remaining_space() * 100 / map.area()
        );
        self.map = Some(map);
        self.surface = Some(surface);

        notify_all(self.subscribers.live(), ReorganizePhase::Post);

        Ok(reserved)
    }

    fn initial_size(&self, backend: &B) -> (u32, u32) {
        let mut size = self.config.initial_size.unwrap_or(
            if self.format.bytes_per_pixel() == 1 {
                1024
            } else {
                512
            },
        );
        while size > 1 && !backend.is_size_supported(size, size, self.format) {
            size >>= 1;
        }
        (size, size)
    }

    /// Packs every relocation into the smallest supported map starting at `size`.
    ///
    /// Returns the map and the new rectangle of each relocation, in order.
    fn create_map(
        &self,
        backend: &B,
        (mut width, mut height): (u32, u32),
        relocations: &[Relocation<B::Surface>],
    ) -> Option<Layout<B::Surface>> {
        while backend.is_size_supported(width, height, self.format) {
            let mut map = RectangleMap::new(width, height);
            let mut placements = Vec::with_capacity(relocations.len());
            for relocation in relocations {
                match map.add(relocation.width, relocation.height, relocation.occupant.clone()) {
                    Ok(rect) => placements.push(rect),
                    Err(_) => break,
                }
            }
            if placements.len() == relocations.len() {
                return Some((map, placements));
            }
            trace!(
                "Atlas size {width}x{height} abandoned after placing {} of {} rectangles",
                placements.len(),
                relocations.len()
            );
            (width, height) = next_size(width, height)?;
        }
        None
    }
}

/// Doubles whichever dimension is smaller.
fn next_size(width: u32, height: u32) -> Option<(u32, u32)> {
    if width < height {
        Some((width.checked_mul(2)?, height))
    } else {
        Some((width, height.checked_mul(2)?))
    }
}

impl<B: Backend> Debug for Atlas<B> {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Atlas")
            .field("format", &self.format)
            .field("config", &self.config)
            .field("size", &self.size())
            .field("len", &self.len())
            .field("has_surface", &self.surface.is_some())
            .field("subscribers", &self.subscribers)
            .finish_non_exhaustive()
    }
}

impl<B: Backend> Atlas<B> {
    /// Checks the map invariants and that the surface matches the map.
    ///
    /// This is slow and intended for tests and debugging.
    ///
    /// # Panics
    ///
    /// If the map is inconsistent or the surface size differs from the map size.
    pub fn check_invariants(&self) {
        match (&self.map, &self.surface) {
            (Some(map), Some(surface)) => {
                map.check_invariants();
                assert_eq!(
                    (surface.width(), surface.height()),
                    (map.width(), map.height()),
                    "surface and map sizes disagree"
                );
            }
            (None, None) => {}
            _ => panic!("atlas map and surface must be created together"),
        }
    }
}
