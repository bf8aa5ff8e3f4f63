#![forbid(unsafe_code)]

//! Lifecycle notifications and the per-box emitter.
//!
//! A box *has* an emitter (plain composition); listeners subscribe for
//! the defined lifecycle points and may re-enter box operations from a
//! callback. To make that safe, emission snapshots the listener list
//! first and holds no borrow while calling out.

use std::rc::Rc;

/// Observable lifecycle points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoxEvent {
    /// Entrance settled; the box is interactive.
    Opened,
    /// Disposal finished.
    Closed,
    /// New content was handed to the presentation surface.
    ContentUpdated,
    /// The loading presentation became visible.
    LoadingStarted,
    /// The loading presentation was removed.
    LoadingStopped,
    /// Content became visible.
    Shown,
    /// Content was hidden (pending a swap or resize).
    Hidden,
    /// A new target frame was applied.
    Resized,
    /// The box was recentered against the viewport.
    Repositioned,
}

/// Handle for removing a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Rc<dyn Fn(BoxEvent)>;

/// Subscription registry for one box.
#[derive(Default)]
pub struct Emitter {
    next_id: u64,
    listeners: Vec<(SubscriptionId, Listener)>,
}

impl Emitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, listener: impl Fn(BoxEvent) + 'static) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.listeners.push((id, Rc::new(listener)));
        id
    }

    /// Remove a subscription. Returns false when the id is unknown
    /// (already removed, or cleared by a dispose).
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(sid, _)| *sid != id);
        self.listeners.len() != before
    }

    /// Clone the listener list out so the caller can emit without
    /// holding any borrow of the emitter.
    pub fn snapshot(&self) -> Vec<Listener> {
        self.listeners.iter().map(|(_, l)| Rc::clone(l)).collect()
    }

    /// Drop all subscriptions (dispose resets a box to its presets).
    pub fn clear(&mut self) {
        self.listeners.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl std::fmt::Debug for Emitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Emitter")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
