// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Occupants and listeners that record what they are told.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use glyph_atlas::backend::cpu::CpuSurface;
use glyph_atlas::{AtlasOccupant, OccupantKey, ReorganizeListener, ReorganizePhase, Rectangle};

/// Something an [`EventLog`] was told.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Event {
    Phase(ReorganizePhase),
    Moved(u32, Rectangle),
}

/// Records reorganize phases and occupant moves in the order they happen.
#[derive(Debug, Default)]
pub(crate) struct EventLog {
    events: RefCell<Vec<Event>>,
    positions: RefCell<Vec<Option<(Rectangle, Rc<CpuSurface>)>>>,
}

impl EventLog {
    pub(crate) fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub(crate) fn occupant(self: &Rc<Self>) -> Weak<dyn AtlasOccupant<CpuSurface>> {
        let weak: Weak<Self> = Rc::downgrade(self);
        weak
    }

    pub(crate) fn listener(self: &Rc<Self>) -> Weak<dyn ReorganizeListener> {
        let weak: Weak<Self> = Rc::downgrade(self);
        weak
    }

    pub(crate) fn take(&self) -> Vec<Event> {
        std::mem::take(&mut *self.events.borrow_mut())
    }

    /// The last position reported for `key`.
    pub(crate) fn position(&self, key: u32) -> Rectangle {
        self.location(key).0
    }

    /// The last surface reported for `key`.
    pub(crate) fn surface(&self, key: u32) -> Rc<CpuSurface> {
        self.location(key).1
    }

    fn location(&self, key: u32) -> (Rectangle, Rc<CpuSurface>) {
        self.positions
            .borrow()
            .get(key as usize)
            .cloned()
            .flatten()
            .unwrap_or_else(|| panic!("key {key} was never positioned"))
    }
}

impl AtlasOccupant<CpuSurface> for EventLog {
    fn position_changed(&self, key: OccupantKey, surface: &Rc<CpuSurface>, rect: Rectangle) {
        self.events.borrow_mut().push(Event::Moved(key.0, rect));
        let mut positions = self.positions.borrow_mut();
        let index = key.0 as usize;
        if positions.len() <= index {
            positions.resize(index + 1, None);
        }
        positions[index] = Some((rect, surface.clone()));
    }
}

impl ReorganizeListener for EventLog {
    fn reorganize(&self, phase: ReorganizePhase) {
        self.events.borrow_mut().push(Event::Phase(phase));
    }
}

/// Asserts that no two rectangles overlap.
pub(crate) fn assert_disjoint(rects: &[Rectangle]) {
    for (i, a) in rects.iter().enumerate() {
        for b in &rects[i + 1..] {
            assert!(!a.intersects(b), "{a:?} overlaps {b:?}");
        }
    }
}
