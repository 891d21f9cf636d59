// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Reorganize notifications.

use alloc::rc::{Rc, Weak};
use alloc::vec::Vec;
use core::fmt::{Debug, Formatter};

use smallvec::SmallVec;

/// When a [`ReorganizeListener`] is called relative to the reorganization.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReorganizePhase {
    /// The atlas is about to move its occupants.
    ///
    /// Anything that recorded coordinates into the current surface, such as a batch of
    /// pending draw commands, should be flushed now.
    Pre,
    /// Every occupant has been moved and told about its new position.
    Post,
}

/// Receives reorganize notifications from an atlas.
///
/// Listeners are held weakly, so dropping the last strong reference unsubscribes
/// implicitly. Listeners are called while the atlas is being modified and must not
/// access it.
pub trait ReorganizeListener {
    /// Called once before and once after every reorganization.
    fn reorganize(&self, phase: ReorganizePhase);
}

impl<F: Fn(ReorganizePhase)> ReorganizeListener for F {
    fn reorganize(&self, phase: ReorganizePhase) {
        self(phase);
    }
}

/// Identifies a subscription so it can be removed again.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Listeners to notify on reorganization.
#[derive(Default)]
pub(crate) struct Subscribers {
    next_id: u64,
    listeners: Vec<(SubscriptionId, Weak<dyn ReorganizeListener>)>,
}

/// Live listeners collected for one notification.
pub(crate) type LiveListeners = SmallVec<[Rc<dyn ReorganizeListener>; 4]>;

impl Subscribers {
    pub(crate) fn subscribe(&mut self, listener: Weak<dyn ReorganizeListener>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, listener));
        id
    }

    /// Returns `false` if `id` was not subscribed.
    pub(crate) fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let len = self.listeners.len();
        self.listeners.retain(|(other, _)| *other != id);
        self.listeners.len() != len
    }

    /// Drops dead listeners and returns strong references to the others.
    ///
    /// The caller can release any borrow of `self` before invoking them.
    pub(crate) fn live(&mut self) -> LiveListeners {
        self.listeners
            .retain(|(_, listener)| listener.strong_count() > 0);
        self.listeners
            .iter()
            .filter_map(|(_, listener)| listener.upgrade())
            .collect()
    }
}

/// Calls every listener with `phase`.
pub(crate) fn notify_all(listeners: LiveListeners, phase: ReorganizePhase) {
    for listener in listeners {
        listener.reorganize(phase);
    }
}

impl Debug for Subscribers {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Subscribers")
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use alloc::rc::Rc;
    use alloc::vec::Vec;
    use core::cell::RefCell;

    use super::*;

    #[test]
    fn dropped_listeners_are_pruned() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut subscribers = Subscribers::default();

        let recorder = calls.clone();
        let kept: Rc<dyn ReorganizeListener> =
            Rc::new(move |phase: ReorganizePhase| recorder.borrow_mut().push(phase));
        let dropped: Rc<dyn ReorganizeListener> = Rc::new(|_: ReorganizePhase| {});
        subscribers.subscribe(Rc::downgrade(&kept));
        subscribers.subscribe(Rc::downgrade(&dropped));
        drop(dropped);

        let live = subscribers.live();
        assert_eq!(live.len(), 1, "only the kept listener is alive");
        notify_all(live, ReorganizePhase::Pre);
        assert_eq!(*calls.borrow(), [ReorganizePhase::Pre]);
    }

    #[test]
    fn unsubscribe() {
        let listener: Rc<dyn ReorganizeListener> = Rc::new(|_: ReorganizePhase| {});
        let mut subscribers = Subscribers::default();
        let id = subscribers.subscribe(Rc::downgrade(&listener));
        assert!(subscribers.unsubscribe(id));
        assert!(!subscribers.unsubscribe(id));
        assert!(subscribers.live().is_empty());
    }
}
