// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use alloc::rc::{Rc, Weak};
use core::fmt::{Debug, Formatter};

use log::warn;
use rectangle_map::Rectangle;

/// Identifies an occupant to its own [`AtlasOccupant`] implementation.
///
/// The atlas never interprets the key. A glyph cache uses it as the index of the
/// entry, a texture can simply use `OccupantKey(0)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct OccupantKey(pub u32);

/// Something that lives in an atlas and needs to know where.
///
/// Called with the initial position as soon as a reservation succeeds and again
/// every time a reorganization moves the occupant.
pub trait AtlasOccupant<S> {
    /// The occupant identified by `key` now lives at `rect` in `surface`.
    fn position_changed(&self, key: OccupantKey, surface: &Rc<S>, rect: Rectangle);

    /// Whether `key` still needs its rectangle.
    ///
    /// An owner that could not remove a rectangle, because the atlas was busy at the
    /// time, answers `false` and the atlas drops the rectangle at its next
    /// reorganization.
    fn is_occupying(&self, _key: OccupantKey) -> bool {
        true
    }
}

/// What an atlas stores for each of its rectangles.
pub(crate) struct Occupant<S> {
    listener: Weak<dyn AtlasOccupant<S>>,
    key: OccupantKey,
}

impl<S> Occupant<S> {
    pub(crate) fn new(listener: Weak<dyn AtlasOccupant<S>>, key: OccupantKey) -> Self {
        Self { listener, key }
    }

    pub(crate) fn key(&self) -> OccupantKey {
        self.key
    }

    /// Whether the occupant still exists and wants its rectangle.
    pub(crate) fn is_live(&self) -> bool {
        self.listener
            .upgrade()
            .is_some_and(|listener| listener.is_occupying(self.key))
    }

    pub(crate) fn notify(&self, surface: &Rc<S>, rect: Rectangle) {
        match self.listener.upgrade() {
            Some(listener) => listener.position_changed(self.key, surface, rect),
            None => warn!(
                "Atlas occupant {:?} at {rect:?} was dropped without being removed",
                self.key
            ),
        }
    }
}

impl<S> Clone for Occupant<S> {
    fn clone(&self) -> Self {
        Self {
            listener: self.listener.clone(),
            key: self.key,
        }
    }
}

impl<S> Debug for Occupant<S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Occupant")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}
