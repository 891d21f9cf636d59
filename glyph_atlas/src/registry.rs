// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Atlases shared by everything drawn through one rendering context.

use alloc::rc::{Rc, Weak};
use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt::{Debug, Formatter};

use log::debug;
use rectangle_map::Rectangle;
use smallvec::SmallVec;

use crate::atlas::{
    Atlas, AtlasConfig, AtlasOccupant, OccupantKey, ReorganizeListener, ReorganizePhase,
    Subscribers, SubscriptionId, notify_all,
};
use crate::backend::{Backend, PixelFormat};
use crate::error::AtlasError;

/// An atlas that several owners reserve space in.
pub type SharedAtlas<B> = Rc<RefCell<Atlas<B>>>;

/// The shared atlases of a rendering context.
///
/// The registry only holds weak references: an atlas lives as long as some occupant
/// holder keeps the [`SharedAtlas`] returned by [`reserve`](Self::reserve). Cloning
/// the registry yields another handle to the same set of atlases.
pub struct AtlasRegistry<B: Backend> {
    inner: Rc<RegistryInner<B>>,
}

struct RegistryInner<B: Backend> {
    format: PixelFormat,
    config: AtlasConfig,
    atlases: RefCell<Vec<Weak<RefCell<Atlas<B>>>>>,
    subscribers: RefCell<Subscribers>,
}

impl<B: Backend> AtlasRegistry<B> {
    /// Creates a registry of premultiplied RGBA8 atlases that migrate their content.
    pub fn new() -> Self {
        Self::with_config(PixelFormat::Rgba8Premultiplied, AtlasConfig::default())
    }

    /// Creates a registry whose atlases use `format` and `config`.
    pub fn with_config(format: PixelFormat, config: AtlasConfig) -> Self {
        Self {
            inner: Rc::new(RegistryInner {
                format,
                config,
                atlases: RefCell::new(Vec::new()),
                subscribers: RefCell::new(Subscribers::default()),
            }),
        }
    }

    /// Pixel format of the shared atlases.
    pub fn format(&self) -> PixelFormat {
        self.inner.format
    }

    /// The atlases that are still alive, oldest first.
    pub fn atlases(&self) -> Vec<SharedAtlas<B>> {
        let mut atlases = self.inner.atlases.borrow_mut();
        atlases.retain(|atlas| atlas.strong_count() > 0);
        atlases.iter().filter_map(Weak::upgrade).collect()
    }

    /// Reserves space in the first shared atlas that can hold it.
    ///
    /// Each live atlas is tried in turn, reorganizing it if needed. When none has room
    /// a new atlas is started. The caller must keep the returned atlas alive for as
    /// long as it occupies the rectangle, and must not hold a borrow of any shared
    /// atlas while calling this.
    pub fn reserve(
        &self,
        backend: &mut B,
        width: u32,
        height: u32,
        occupant: Weak<dyn AtlasOccupant<B::Surface>>,
        key: OccupantKey,
    ) -> Result<(SharedAtlas<B>, Rectangle), AtlasError> {
        let candidates: SmallVec<[SharedAtlas<B>; 4]> = self.atlases().into_iter().collect();
        for atlas in candidates {
            let result = atlas
                .borrow_mut()
                .reserve(backend, width, height, occupant.clone(), key);
            match result {
                Ok(rect) => return Ok((atlas, rect)),
                Err(err) if err.is_capacity_failure() => {}
                Err(err) => return Err(err),
            }
        }

        let atlas = Rc::new(RefCell::new(Atlas::new(
            self.inner.format,
            self.inner.config,
        )));
        let weak: Weak<RegistryInner<B>> = Rc::downgrade(&self.inner);
        let forward: Weak<dyn ReorganizeListener> = weak;
        atlas.borrow_mut().subscribe(forward);
        let rect = atlas
            .borrow_mut()
            .reserve(backend, width, height, occupant, key)?;
        debug!("Created a new shared atlas for a {width}x{height} rectangle");
        self.inner.atlases.borrow_mut().push(Rc::downgrade(&atlas));
        Ok((atlas, rect))
    }

    /// Registers a listener that is notified whenever any shared atlas reorganizes.
    pub fn subscribe(&self, listener: Weak<dyn ReorganizeListener>) -> SubscriptionId {
        self.inner.subscribers.borrow_mut().subscribe(listener)
    }

    /// Removes a listener. Returns `false` if it was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.subscribers.borrow_mut().unsubscribe(id)
    }
}

impl<B: Backend> ReorganizeListener for RegistryInner<B> {
    fn reorganize(&self, phase: ReorganizePhase) {
        let listeners = self.subscribers.borrow_mut().live();
        notify_all(listeners, phase);
    }
}

impl<B: Backend> Clone for AtlasRegistry<B> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<B: Backend> Default for AtlasRegistry<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> Debug for AtlasRegistry<B> {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AtlasRegistry")
            .field("format", &self.inner.format)
            .field("config", &self.inner.config)
            .field("atlases", &self.inner.atlases.borrow().len())
            .finish_non_exhaustive()
    }
}

#[cfg(all(test, feature = "cpu"))]
mod tests {
    use alloc::rc::Rc;
    use core::cell::Cell;

    use super::*;
    use crate::backend::cpu::{CpuBackend, CpuSurface};

    struct Ignore;

    impl AtlasOccupant<CpuSurface> for Ignore {
        fn position_changed(&self, _: OccupantKey, _: &Rc<CpuSurface>, _: Rectangle) {}
    }

    fn registry() -> AtlasRegistry<CpuBackend> {
        AtlasRegistry::with_config(
            PixelFormat::Rgba8,
            AtlasConfig {
                initial_size: Some(32),
                ..AtlasConfig::default()
            },
        )
    }

    #[test]
    fn reuses_atlas_with_room() {
        let mut backend = CpuBackend::new();
        let occupant: Rc<dyn AtlasOccupant<CpuSurface>> = Rc::new(Ignore);
        let registry = registry();

        let (a, _) = registry
            .reserve(&mut backend, 8, 8, Rc::downgrade(&occupant), OccupantKey(0))
            .unwrap();
        let (b, _) = registry
            .reserve(&mut backend, 8, 8, Rc::downgrade(&occupant), OccupantKey(1))
            .unwrap();
        assert!(Rc::ptr_eq(&a, &b), "second reservation shares the atlas");
        assert_eq!(registry.atlases().len(), 1);
    }

    #[test]
    fn starts_new_atlas_when_full() {
        let mut backend = CpuBackend::with_max_surface_size(32);
        let occupant: Rc<dyn AtlasOccupant<CpuSurface>> = Rc::new(Ignore);
        let registry = registry();

        let (a, _) = registry
            .reserve(&mut backend, 32, 32, Rc::downgrade(&occupant), OccupantKey(0))
            .unwrap();
        let (b, _) = registry
            .reserve(&mut backend, 16, 16, Rc::downgrade(&occupant), OccupantKey(1))
            .unwrap();
        assert!(!Rc::ptr_eq(&a, &b), "a full atlas is not reused");
        assert_eq!(registry.atlases().len(), 2);

        drop(a);
        assert_eq!(registry.atlases().len(), 1, "dead atlases are forgotten");
    }

    #[test]
    fn forwards_reorganize_notifications() {
        let mut backend = CpuBackend::new();
        let occupant: Rc<dyn AtlasOccupant<CpuSurface>> = Rc::new(Ignore);
        let registry = registry();
        let count = Rc::new(Cell::new(0));
        let counter = count.clone();
        let listener: Rc<dyn ReorganizeListener> =
            Rc::new(move |_: ReorganizePhase| counter.set(counter.get() + 1));
        registry.subscribe(Rc::downgrade(&listener));

        let (_atlas, _) = registry
            .reserve(&mut backend, 8, 8, Rc::downgrade(&occupant), OccupantKey(0))
            .unwrap();
        assert_eq!(count.get(), 2, "initial layout is a reorganization");
    }
}
