#![forbid(unsafe_code)]

//! Document contexts and authoritative-registry resolution.
//!
//! Every logical document (the host page and each embedded document that
//! runs its own copy of the engine) gets a `DocumentContext`: a local
//! registry, an explicit parent capability, and a shared top-level box
//! that `open` routes to unless push semantics are requested.
//!
//! # Ownership delegation
//!
//! A box's true registry is the one owned by the *topmost accessible*
//! ancestor context. Accessibility is an explicit capability
//! (`ParentLink::Accessible` vs `Denied`), re-checked on every registry
//! operation; a denied parent is a normal control-flow branch that falls
//! back to the local registry, never an error. A box is therefore only
//! ever visible in one registry.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use stackbox_core::error::OpenError;
use stackbox_core::options::OptionPatch;

use crate::lifecycle::{BoxShared, OverlayBox};
use crate::platform::Platform;
use crate::queries::StackRef;
use crate::registry::StackRegistry;
use crate::subject::{DocumentId, Subject};

/// Capability to reach the hosting document's engine.
#[derive(Clone, Default)]
pub enum ParentLink {
    /// Top-level document; there is nothing above.
    #[default]
    None,
    /// Same-origin parent: its registry chain is reachable.
    Accessible(Rc<DocumentContext>),
    /// Sandboxed/cross-origin embedding: the parent exists but its
    /// engine is unreachable, so the local registry is authoritative.
    Denied,
}

impl std::fmt::Debug for ParentLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Accessible(parent) => write!(f, "Accessible({})", parent.id().value()),
            Self::Denied => f.write_str("Denied"),
        }
    }
}

/// One logical document running the engine.
pub struct DocumentContext {
    id: DocumentId,
    platform: Platform,
    local: Rc<StackRegistry>,
    parent: RefCell<ParentLink>,
    shared_box: RefCell<Option<Weak<BoxShared>>>,
}

impl DocumentContext {
    /// Create a top-level (host) document context.
    pub fn root(platform: Platform) -> Rc<Self> {
        Self::embedded(platform, DocumentId::next(), ParentLink::None)
    }

    /// Create a context for an embedded document with a known identity.
    pub fn embedded(platform: Platform, id: DocumentId, parent: ParentLink) -> Rc<Self> {
        Rc::new(Self {
            id,
            platform,
            local: Rc::new(StackRegistry::new()),
            parent: RefCell::new(parent),
            shared_box: RefCell::new(None),
        })
    }

    pub fn id(&self) -> DocumentId {
        self.id
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    /// Replace the parent capability (e.g. after a sandbox probe).
    pub fn set_parent(&self, parent: ParentLink) {
        *self.parent.borrow_mut() = parent;
    }

    /// Explicit capability check: the parent context, when reachable.
    pub fn try_parent(&self) -> Option<Rc<DocumentContext>> {
        match &*self.parent.borrow() {
            ParentLink::Accessible(parent) => Some(Rc::clone(parent)),
            ParentLink::None | ParentLink::Denied => None,
        }
    }

    /// The outermost reachable ancestor (self when top-level or denied).
    pub fn authoritative(self: &Rc<Self>) -> Rc<DocumentContext> {
        let mut current = Rc::clone(self);
        while let Some(parent) = current.try_parent() {
            current = parent;
        }
        current
    }

    /// The registry every operation from this document must use.
    pub fn registry(self: &Rc<Self>) -> Rc<StackRegistry> {
        Rc::clone(&self.authoritative().local)
    }

    /// This document's own registry (authoritative only when no
    /// ancestor is reachable).
    pub fn local_registry(&self) -> Rc<StackRegistry> {
        Rc::clone(&self.local)
    }

    /// Open a box. The sole recommended entry point: routes to this
    /// document's shared top-level box unless `patch.push` asks for an
    /// independent one.
    pub fn open(
        self: &Rc<Self>,
        subject: Subject,
        patch: OptionPatch,
    ) -> Result<OverlayBox, OpenError> {
        self.shared_box().open(subject, patch)
    }

    /// The standing per-document box that plain `open` calls reuse.
    ///
    /// Created lazily; it occupies a registry slot only while actually
    /// open, and is replaced by a fresh instance if it was disposed and
    /// dropped.
    pub fn shared_box(self: &Rc<Self>) -> OverlayBox {
        if let Some(weak) = self.shared_box.borrow().as_ref()
            && let Some(shared) = weak.upgrade()
        {
            return OverlayBox::from_shared(shared);
        }
        let fresh = OverlayBox::new(self, OptionPatch::new());
        // The standing instance reserves no slot until it really opens.
        self.registry().remove(fresh.id());
        *self.shared_box.borrow_mut() = Some(fresh.downgrade());
        fresh
    }

    /// Close every box above the one displaying this document — or the
    /// whole stack when called from the hosting document itself.
    pub fn close_above(self: &Rc<Self>) {
        self.shared_box().close_above(None::<StackRef>);
    }
}

impl std::fmt::Debug for DocumentContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentContext")
            .field("id", &self.id)
            .field("parent", &self.parent.borrow())
            .field("stack_depth", &self.local.len())
            .finish()
    }
}
