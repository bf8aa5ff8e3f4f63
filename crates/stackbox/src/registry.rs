#![forbid(unsafe_code)]

//! The ordered registry of open boxes.
//!
//! Insertion order is z-order: later entries render above earlier ones.
//! Which registry instance is authoritative for a given document is
//! decided by [`crate::document::DocumentContext`]; this module only
//! maintains one ordered sequence.
//!
//! # Invariants
//!
//! - A box appears at most once; `add` on a present box is a no-op
//!   returning its existing layer.
//! - Z-layers are strictly increasing bottom to top; a new entry's layer
//!   strictly exceeds the layer of the entry beneath it.
//! - Removal is by identity (`BoxId`), never by content equality.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::lifecycle::{BoxShared, OverlayBox};

/// Layer assigned to the bottom-most box.
pub const BASE_Z_LAYER: u32 = 1000;

/// Layer distance between stacked boxes (leaves room for a surface's
/// internal overlay/window/content layering).
pub const Z_LAYER_STEP: u32 = 10;

/// Global counter for box identities.
static BOX_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoxId(u64);

impl BoxId {
    pub(crate) fn next() -> Self {
        Self(BOX_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub const fn value(self) -> u64 {
        self.0
    }
}

struct RegistryEntry {
    id: BoxId,
    z_layer: u32,
    shared: Rc<BoxShared>,
}

/// Ordered stack of open boxes.
#[derive(Default)]
pub struct StackRegistry {
    entries: RefCell<Vec<RegistryEntry>>,
}

impl StackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a box at the top of the stack and assign its layer.
    ///
    /// Idempotent: a box already present keeps its slot and layer.
    pub(crate) fn add(&self, shared: &Rc<BoxShared>) -> u32 {
        let mut entries = self.entries.borrow_mut();
        let id = shared.id;
        if let Some(entry) = entries.iter().find(|entry| entry.id == id) {
            return entry.z_layer;
        }
        let z_layer = entries
            .last()
            .map(|entry| entry.z_layer + Z_LAYER_STEP)
            .unwrap_or(BASE_Z_LAYER);
        tracing::trace!(box_id = id.value(), z_layer, depth = entries.len(), "registry add");
        entries.push(RegistryEntry {
            id,
            z_layer,
            shared: Rc::clone(shared),
        });
        z_layer
    }

    /// Remove a box by identity. Returns false when it was not present.
    pub fn remove(&self, id: BoxId) -> bool {
        let mut entries = self.entries.borrow_mut();
        let Some(index) = entries.iter().position(|entry| entry.id == id) else {
            return false;
        };
        entries.remove(index);
        tracing::trace!(box_id = id.value(), index, "registry remove");
        true
    }

    /// Position of a box in the stack, bottom is zero.
    pub fn index_of(&self, id: BoxId) -> Option<usize> {
        self.entries
            .borrow()
            .iter()
            .position(|entry| entry.id == id)
    }

    pub fn at_index(&self, index: usize) -> Option<OverlayBox> {
        self.entries
            .borrow()
            .get(index)
            .map(|entry| OverlayBox::from_shared(Rc::clone(&entry.shared)))
    }

    /// The whole stack, bottom to top.
    pub fn snapshot(&self) -> Vec<OverlayBox> {
        self.entries
            .borrow()
            .iter()
            .map(|entry| OverlayBox::from_shared(Rc::clone(&entry.shared)))
            .collect()
    }

    pub fn top(&self) -> Option<OverlayBox> {
        self.entries
            .borrow()
            .last()
            .map(|entry| OverlayBox::from_shared(Rc::clone(&entry.shared)))
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Layer currently assigned to a box, if present.
    pub fn z_layer_of(&self, id: BoxId) -> Option<u32> {
        self.entries
            .borrow()
            .iter()
            .find(|entry| entry.id == id)
            .map(|entry| entry.z_layer)
    }
}

impl std::fmt::Debug for StackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entries = self.entries.borrow();
        f.debug_list()
            .entries(entries.iter().map(|entry| (entry.id, entry.z_layer)))
            .finish()
    }
}
