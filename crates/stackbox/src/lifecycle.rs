#![forbid(unsafe_code)]

//! The per-box lifecycle state machine.
//!
//! One `OverlayBox` drives build → acquire content → position → open →
//! close → dispose, delegating everything visual to the platform
//! collaborators. The hard part is not any single transition but the
//! overlap: content loads, animation completions, and deferred timers
//! can all outlive a user's rapid open→close→open sequence.
//!
//! # Invariants
//!
//! - `state` only ever follows the transition graph below; asynchronous
//!   content never skips `AcquiringContent`.
//! - Every dispatched callback captures `(Weak<box>, open_seq)`. It may
//!   run only while the sequence is current and the box is not closing
//!   or disposed; anything else is discarded. The last `open` call
//!   always wins.
//! - Interaction listeners are attached exactly once per open cycle;
//!   attaching twice is state-machine corruption and panics.
//! - Entering `Closing` cancels pending timers and animations; a
//!   cancelled animation must not fire its completion chain.
//!
//! # Transition graph
//!
//! ```text
//! Idle ─open→ Building ─→ AcquiringContent ─ready→ Positioning ─settle→ Open
//!                              │ (loops while pending; open() supersedes)  │
//!                              └──────────── close ───────────┐   reposition/
//!                                                             ▼   elastic loop
//! Disposed ←─exit settles── Closing ←──────── close ───────── Open
//!    └─ open() restarts clean at Building (surface rebuilt) ─┘
//! ```

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

use tracing::{debug, trace, warn};

use stackbox_core::error::{CloseOutcome, ContentError, OpenError};
use stackbox_core::geometry::{FrameStyles, Size, ViewportMetrics};
use stackbox_core::notify::{BoxEvent, Emitter, SubscriptionId};
use stackbox_core::options::{self, BoxOptions, Elastic, OptionPatch};

use crate::content::{self, Acquisition};
use crate::document::DocumentContext;
use crate::platform::{
    AnimationHandle, GalleryContext, Platform, PropertyMap, SurfaceId, SurfaceLayer, TimerId,
};
use crate::queries::{self, StackRef};
use crate::registry::{BoxId, StackRegistry};
use crate::subject::{Asset, DocumentId, FrameHandle, Subject};

/// Default error content, overridable via `error_text`.
pub const DEFAULT_ERROR_TEXT: &str = "An error occurred";

/// Delay before freshly applied content fades in.
const SHOW_CONTENT_DELAY_MS: u32 = 50;

/// Delay before a load failure swaps in error content.
const ERROR_APPLY_DELAY_MS: u32 = 10;

/// Viewport padding reserved when elastic height squeezes a box.
const ELASTIC_VIEWPORT_PAD: i32 = 300;

/// Lifecycle states of one box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Constructed and registered; no surface yet.
    Idle,
    /// Building the presentation surface.
    Building,
    /// Waiting on a content strategy; loops while pending.
    AcquiringContent,
    /// Content ready; sizing and entrance in flight.
    Positioning,
    /// Interactive. Reposition and elastic re-measure loop here.
    Open,
    /// Exit animation in flight.
    Closing,
    /// Torn down; reopening restarts clean.
    Disposed,
}

/// Host-delivered interaction while a box is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interaction {
    EscapeKey,
    OverlayClick,
    CloseButton,
    ViewportResized,
    ViewportScrolled,
}

type SettleTask = Box<dyn FnOnce(&OverlayBox)>;

/// Shared state behind every handle to one box.
pub(crate) struct BoxShared {
    pub(crate) id: BoxId,
    doc: Rc<DocumentContext>,
    /// Instance option set frozen at construction; dispose resets to it.
    presets: BoxOptions,
    options: RefCell<BoxOptions>,
    state: Cell<LifecycleState>,
    z_layer: Cell<u32>,
    surface: Cell<Option<SurfaceId>>,
    asset: RefCell<Option<Asset>>,
    /// Frame created by a preloading iframe strategy before its load
    /// event; removed on discard so a close cannot leak it.
    pending_frame: RefCell<Option<FrameHandle>>,
    listeners_attached: Cell<bool>,
    is_loading: Cell<bool>,
    content_shown: Cell<bool>,
    overlay_faded_in: Cell<bool>,
    /// Monotonic per-open token; stale callbacks must not act.
    open_seq: Cell<u64>,
    apply_timer: Cell<Option<TimerId>>,
    show_timer: Cell<Option<TimerId>>,
    overlay_anim: Cell<Option<AnimationHandle>>,
    window_anim: Cell<Option<AnimationHandle>>,
    content_anim: Cell<Option<AnimationHandle>>,
    /// Last frame applied to the window layer.
    last_frame: Cell<Option<FrameStyles>>,
    emitter: RefCell<Emitter>,
    settle_queue: RefCell<VecDeque<SettleTask>>,
}

/// Handle to one modal overlay instance.
///
/// Cheap to clone; all clones address the same box.
#[derive(Clone)]
pub struct OverlayBox {
    shared: Rc<BoxShared>,
}

impl PartialEq for OverlayBox {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.shared, &other.shared)
    }
}

impl Eq for OverlayBox {}

impl std::fmt::Debug for OverlayBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlayBox")
            .field("id", &self.shared.id)
            .field("state", &self.state())
            .field("z_layer", &self.z_layer())
            .finish()
    }
}

impl OverlayBox {
    /// Construct a box bound to a document context.
    ///
    /// Registers into the authoritative registry immediately, reserving
    /// the z-order slot before any content is shown.
    pub fn new(doc: &Rc<DocumentContext>, presets: OptionPatch) -> Self {
        let merged = BoxOptions::default().merged(&presets);
        let shared = Rc::new(BoxShared {
            id: BoxId::next(),
            doc: Rc::clone(doc),
            presets: merged.clone(),
            options: RefCell::new(merged),
            state: Cell::new(LifecycleState::Idle),
            z_layer: Cell::new(0),
            surface: Cell::new(None),
            asset: RefCell::new(None),
            pending_frame: RefCell::new(None),
            listeners_attached: Cell::new(false),
            is_loading: Cell::new(false),
            content_shown: Cell::new(false),
            overlay_faded_in: Cell::new(false),
            open_seq: Cell::new(0),
            apply_timer: Cell::new(None),
            show_timer: Cell::new(None),
            overlay_anim: Cell::new(None),
            window_anim: Cell::new(None),
            content_anim: Cell::new(None),
            last_frame: Cell::new(None),
            emitter: RefCell::new(Emitter::new()),
            settle_queue: RefCell::new(VecDeque::new()),
        });
        let handle = OverlayBox { shared };
        handle.registry_add();
        debug!(box_id = handle.id().value(), "box constructed");
        handle
    }

    pub(crate) fn from_shared(shared: Rc<BoxShared>) -> Self {
        Self { shared }
    }

    pub(crate) fn downgrade(&self) -> Weak<BoxShared> {
        Rc::downgrade(&self.shared)
    }

    pub(crate) fn try_from_weak(weak: &Weak<BoxShared>) -> Option<Self> {
        weak.upgrade().map(|shared| OverlayBox { shared })
    }

    // --- Accessors ---

    pub fn id(&self) -> BoxId {
        self.shared.id
    }

    pub fn state(&self) -> LifecycleState {
        self.shared.state.get()
    }

    pub fn z_layer(&self) -> u32 {
        self.shared.z_layer.get()
    }

    /// The document this box's engine instance lives in.
    pub fn owner_document(&self) -> DocumentId {
        self.shared.doc.id()
    }

    pub fn document(&self) -> Rc<DocumentContext> {
        Rc::clone(&self.shared.doc)
    }

    /// The embedded document this box currently renders, if any.
    pub fn embedded_document(&self) -> Option<DocumentId> {
        self.shared
            .asset
            .borrow()
            .as_ref()
            .and_then(Asset::embedded_document)
    }

    pub fn asset(&self) -> Option<Asset> {
        self.shared.asset.borrow().clone()
    }

    pub fn is_loading(&self) -> bool {
        self.shared.is_loading.get()
    }

    /// Snapshot of the currently resolved option set.
    pub fn options(&self) -> BoxOptions {
        self.shared.options.borrow().clone()
    }

    pub fn subscribe(&self, listener: impl Fn(BoxEvent) + 'static) -> SubscriptionId {
        self.shared.emitter.borrow_mut().subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.shared.emitter.borrow_mut().unsubscribe(id)
    }

    // --- Opening ---

    /// Open content in this box, or in a new box under push semantics.
    ///
    /// Returns the box actually serving the request. The only refusal
    /// is an unknown handler name in inline metadata, which leaves all
    /// state untouched.
    pub fn open(&self, subject: Subject, patch: OptionPatch) -> Result<OverlayBox, OpenError> {
        if patch.push {
            let pushed = OverlayBox::new(&self.shared.doc, OptionPatch::new());
            return match pushed.open(subject, patch.without_push()) {
                Ok(_) => Ok(pushed),
                Err(error) => {
                    // Vacate the slot the failed box reserved.
                    self.registry().remove(pushed.id());
                    Err(error)
                }
            };
        }

        // Validate everything that can refuse the request before any
        // state changes.
        let merged = self.shared.presets.clone().merged(&patch);
        let inline = match (&subject, merged.parse) {
            (Subject::Node(node), true) => match &node.metadata {
                Some(raw) => options::parse_inline(raw, merged.parse_secure)?,
                None => None,
            },
            _ => None,
        };
        let resolved = match &inline {
            Some(extra) => merged.merged(extra),
            None => merged,
        };

        let seq = self.shared.open_seq.get() + 1;
        self.shared.open_seq.set(seq);
        trace!(box_id = self.id().value(), seq, "open request accepted");

        self.clear_apply_timer();
        self.clear_show_timer();
        self.cancel_animations();
        self.detach_listeners();
        self.discard_asset();

        if self.state() == LifecycleState::Disposed {
            self.set_state(LifecycleState::Idle);
        }

        self.registry_add();
        *self.shared.options.borrow_mut() = resolved.clone();

        self.set_state(LifecycleState::Building);
        self.ensure_surface();
        self.set_state(LifecycleState::AcquiringContent);
        self.start_entrance();

        match content::resolve(self, seq, &subject, &resolved) {
            Ok(Acquisition::Resolved { asset, size }) => {
                // Synchronous strategies reach Positioning in the same
                // dispatch.
                self.apply_content(Some(asset), size);
            }
            Ok(Acquisition::Pending) => {
                // A synchronous completion inside resolve() may already
                // have moved us on; only then defer the loading display.
                if self.state() == LifecycleState::AcquiringContent {
                    self.schedule_loading_presentation(seq, resolved.overlay_fade_ms);
                }
            }
            Err(error) => self.content_failed(seq, error),
        }
        Ok(self.clone())
    }

    // --- Closing ---

    /// Request a programmatic close. Bypasses the `closable` guard.
    pub fn close(&self) -> CloseOutcome {
        self.close_internal(None)
    }

    fn close_internal(&self, interaction: Option<Interaction>) -> CloseOutcome {
        match self.state() {
            LifecycleState::Closing | LifecycleState::Disposed => {
                return CloseOutcome::AlreadyClosed;
            }
            LifecycleState::Idle => {
                // Never opened: a per-document standing instance closes
                // the box currently displaying its document instead.
                let registry = self.registry();
                if let Some(displaying) =
                    queries::current(&registry, StackRef::Document(self.owner_document()))
                    && displaying.id() != self.id()
                {
                    displaying.close_internal(interaction);
                    return CloseOutcome::Delegated;
                }
                return CloseOutcome::NotOpen;
            }
            _ => {}
        }

        if interaction.is_some() {
            let closable = self.shared.options.borrow().closable.clone();
            if !closable.allows_interactive_close() {
                debug!(box_id = self.id().value(), "close rejected by guard");
                return CloseOutcome::GuardRejected;
            }
        }

        self.clear_apply_timer();
        self.clear_show_timer();
        self.cancel_animations();
        self.shared.overlay_faded_in.set(false);
        self.set_state(LifecycleState::Closing);

        let Some(surface) = self.shared.surface.get() else {
            self.finalize_close();
            return CloseOutcome::Closing;
        };
        let platform = self.platform();
        let exit = platform
            .animator
            .start(surface, SurfaceLayer::Overlay, PropertyMap::new().opacity(0.0));
        self.shared.overlay_anim.set(Some(exit));
        let weak = self.downgrade();
        platform.animator.chain(
            exit,
            Box::new(move || {
                if let Some(bx) = OverlayBox::try_from_weak(&weak) {
                    bx.finalize_close();
                }
            }),
        );
        CloseOutcome::Closing
    }

    fn finalize_close(&self) {
        if self.state() != LifecycleState::Closing {
            return;
        }
        self.detach_listeners();
        let platform = self.platform();
        self.discard_asset();
        if let Some(surface) = self.shared.surface.take() {
            platform.surface.destroy(surface);
        }
        self.registry().remove(self.id());
        *self.shared.options.borrow_mut() = self.shared.presets.clone();
        self.shared.content_shown.set(false);
        self.shared.is_loading.set(false);
        self.shared.last_frame.set(None);
        self.shared.overlay_anim.set(None);
        self.shared.window_anim.set(None);
        self.shared.content_anim.set(None);
        self.drain_settle_queue();
        self.set_state(LifecycleState::Disposed);
        self.emit(BoxEvent::Closed);
        self.shared.emitter.borrow_mut().clear();
    }

    // --- Relationship queries ---

    /// All boxes stacked above this one, bottom-most first.
    pub fn boxes_above(&self) -> Vec<OverlayBox> {
        queries::above(&self.registry(), StackRef::Box(self.id()))
    }

    /// The box whose embedded document opened this one.
    pub fn opener_box(&self) -> Option<OverlayBox> {
        queries::opener(&self.registry(), StackRef::Box(self.id()))
    }

    /// The document context responsible for the content that opened
    /// this box.
    pub fn opener_document(&self) -> Option<DocumentId> {
        queries::opener_document(&self.registry(), StackRef::Box(self.id()))
    }

    /// Close every box above `target` (default: this box), topmost
    /// first. Called on a standing instance that is not itself stacked,
    /// it closes above the box displaying its document — or the whole
    /// stack when nothing does (the hosting context clears everything).
    pub fn close_above(&self, target: Option<StackRef>) {
        let registry = self.registry();
        match target {
            Some(explicit) => queries::close_above(&registry, explicit),
            None => {
                if registry.index_of(self.id()).is_some() {
                    queries::close_above(&registry, StackRef::Box(self.id()));
                } else if let Some(displaying) =
                    queries::current(&registry, StackRef::Document(self.owner_document()))
                {
                    queries::close_above(&registry, StackRef::Box(displaying.id()));
                } else {
                    queries::close_all(&registry);
                }
            }
        }
    }

    // --- Interactions and geometry ---

    /// Route a host interaction. Ignored unless listeners are attached
    /// (they are, exactly while the box is open).
    pub fn handle_interaction(&self, interaction: Interaction) {
        if !self.shared.listeners_attached.get() {
            return;
        }
        match interaction {
            Interaction::EscapeKey | Interaction::OverlayClick | Interaction::CloseButton => {
                let _ = self.close_internal(Some(interaction));
            }
            Interaction::ViewportResized | Interaction::ViewportScrolled => self.reposition(),
        }
    }

    /// Recompute the overlay extent and recenter against the viewport.
    /// While open, an elastic box also re-measures its rendered content
    /// and grows or shrinks within its bounds.
    pub fn reposition(&self) {
        let Some(surface) = self.shared.surface.get() else {
            return;
        };
        if matches!(
            self.state(),
            LifecycleState::Idle | LifecycleState::Closing | LifecycleState::Disposed
        ) {
            return;
        }
        let platform = self.platform();
        let opts = self.shared.options.borrow().clone();
        let vp = platform.viewport.metrics();

        let extent = Size::new(
            vp.scroll_size.x.max(vp.size.x),
            vp.scroll_size.y.max(vp.size.y),
        );
        platform.surface.set_overlay_extent(surface, extent);

        let mut size = platform
            .surface
            .rendered_size(surface)
            .or_else(|| self.shared.last_frame.get().map(|frame| frame.size()))
            .unwrap_or(opts.size);

        if self.state() == LifecycleState::Open {
            if let Elastic::Bounded { .. } = opts.elastic_y {
                let mut target = opts.elastic_y.clamp(size.y);
                let cap = vp.size.y - ELASTIC_VIEWPORT_PAD;
                if cap > 0 && target > cap {
                    target = cap;
                }
                size.y = target.max(1);
            }
            if let Elastic::Bounded { .. } = opts.elastic_x {
                size.x = opts.elastic_x.clamp(size.x).max(1);
            }
        }

        let frame = FrameStyles {
            left: vp.scroll.x + (vp.size.x - size.x) / 2,
            top: vp.scroll.y + (vp.size.y - size.y) / 2,
            width: size.x,
            height: size.y,
            z_layer: self.z_layer(),
        };
        self.apply_frame(surface, frame);
        self.emit(BoxEvent::Repositioned);
    }

    /// Resize toward a new content size (or back to the option size).
    /// Animated while open, instant otherwise.
    pub fn request_resize(&self, size: Option<Size>) {
        if self.shared.surface.get().is_none() {
            return;
        }
        self.resize_internal(size, self.state() != LifecycleState::Open);
    }

    /// Attention wiggle on the window layer. Only meaningful while
    /// open; a no-op otherwise.
    pub fn shake(&self) {
        if self.state() != LifecycleState::Open {
            return;
        }
        let Some(frame) = self.shared.last_frame.get() else {
            return;
        };
        self.shake_step(frame.left, 0);
    }

    fn shake_step(&self, base_left: i32, step: usize) {
        const OFFSETS: [i32; 5] = [20, -20, 20, -20, 0];
        if step >= OFFSETS.len() {
            return;
        }
        let Some(surface) = self.shared.surface.get() else {
            return;
        };
        let platform = self.platform();
        let anim = platform.animator.start(
            surface,
            SurfaceLayer::Window,
            PropertyMap::new().left(base_left + OFFSETS[step]),
        );
        self.shared.window_anim.set(Some(anim));
        let weak = self.downgrade();
        platform.animator.chain(
            anim,
            Box::new(move || {
                if let Some(bx) = OverlayBox::try_from_weak(&weak)
                    && bx.state() == LifecycleState::Open
                {
                    bx.shake_step(base_left, step + 1);
                }
            }),
        );
    }

    /// Run `task` once the current content application or entrance
    /// settles; immediately when nothing is in flight. Queued tasks are
    /// drained when content applies and when the box disposes.
    pub fn after_settle(&self, task: impl FnOnce(&OverlayBox) + 'static) {
        let busy = self.shared.apply_timer.get().is_some()
            || self.shared.show_timer.get().is_some()
            || self.shared.window_anim.get().is_some()
            || matches!(
                self.state(),
                LifecycleState::Building
                    | LifecycleState::AcquiringContent
                    | LifecycleState::Positioning
                    | LifecycleState::Closing
            );
        if busy {
            self.shared.settle_queue.borrow_mut().push_back(Box::new(task));
        } else {
            task(self);
        }
    }

    // --- Content plumbing (called by strategies) ---

    /// Whether a callback dispatched under `seq` may still act.
    pub(crate) fn callback_live(&self, seq: u64) -> bool {
        self.shared.open_seq.get() == seq
            && !matches!(
                self.state(),
                LifecycleState::Closing | LifecycleState::Disposed
            )
    }

    pub(crate) fn content_ready(&self, seq: u64, asset: Asset, size: Option<Size>) {
        if !self.callback_live(seq) {
            warn!(
                box_id = self.id().value(),
                seq,
                kind = asset.kind_name(),
                "stale content result discarded"
            );
            return;
        }
        self.shared.pending_frame.borrow_mut().take();
        self.clear_apply_timer();
        self.apply_content(Some(asset), size);
    }

    pub(crate) fn content_failed(&self, seq: u64, error: ContentError) {
        if !self.callback_live(seq) {
            warn!(box_id = self.id().value(), seq, %error, "stale content failure discarded");
            return;
        }
        tracing::error!(box_id = self.id().value(), %error, "content acquisition failed");
        self.discard_pending_frame();
        let text = self
            .shared
            .options
            .borrow()
            .error_text
            .clone()
            .unwrap_or_else(|| DEFAULT_ERROR_TEXT.to_string());
        let weak = self.downgrade();
        // The swap is deferred a beat so a burst of failures coalesces.
        self.platform().scheduler.defer(
            ERROR_APPLY_DELAY_MS,
            Box::new(move || {
                if let Some(bx) = OverlayBox::try_from_weak(&weak)
                    && bx.callback_live(seq)
                {
                    bx.clear_apply_timer();
                    bx.apply_content(Some(Asset::Literal { text }), None);
                }
            }),
        );
    }

    pub(crate) fn track_pending_frame(&self, frame: FrameHandle) {
        *self.shared.pending_frame.borrow_mut() = Some(frame);
    }

    pub(crate) fn platform(&self) -> Platform {
        self.shared.doc.platform().clone()
    }

    // --- Internals ---

    fn registry(&self) -> Rc<StackRegistry> {
        self.shared.doc.registry()
    }

    fn registry_add(&self) {
        let z_layer = self.registry().add(&self.shared);
        self.shared.z_layer.set(z_layer);
    }

    fn set_state(&self, next: LifecycleState) {
        let prev = self.shared.state.replace(next);
        if prev != next {
            debug!(
                box_id = self.id().value(),
                from = ?prev,
                to = ?next,
                "lifecycle transition"
            );
        }
    }

    fn emit(&self, event: BoxEvent) {
        let listeners = self.shared.emitter.borrow().snapshot();
        for listener in listeners {
            listener(event);
        }
    }

    fn ensure_surface(&self) {
        if self.shared.surface.get().is_some() {
            return;
        }
        let surface = self.platform().surface.build();
        self.shared.surface.set(Some(surface));
    }

    fn start_entrance(&self) {
        let Some(surface) = self.shared.surface.get() else {
            return;
        };
        if self.shared.overlay_faded_in.replace(true) {
            return;
        }
        let platform = self.platform();
        let opts = self.shared.options.borrow().clone();
        platform.surface.set_visibility(surface, false);
        if opts.overlay {
            let fade = platform.animator.start(
                surface,
                SurfaceLayer::Overlay,
                PropertyMap::new().opacity(opts.overlay_opacity),
            );
            self.shared.overlay_anim.set(Some(fade));
        }
        self.reposition();
    }

    fn schedule_loading_presentation(&self, seq: u64, delay_ms: u32) {
        let weak = self.downgrade();
        let timer = self.platform().scheduler.defer(
            delay_ms,
            Box::new(move || {
                if let Some(bx) = OverlayBox::try_from_weak(&weak) {
                    bx.loading_tick(seq);
                }
            }),
        );
        self.shared.apply_timer.set(Some(timer));
    }

    fn loading_tick(&self, seq: u64) {
        self.shared.apply_timer.set(None);
        if !self.callback_live(seq) || self.state() != LifecycleState::AcquiringContent {
            return;
        }
        self.apply_content(None, None);
    }

    /// Hand content (or the loading presentation, for `None`) to the
    /// surface and drive the machine toward `Open`.
    fn apply_content(&self, content: Option<Asset>, explicit_size: Option<Size>) {
        if matches!(
            self.state(),
            LifecycleState::Closing | LifecycleState::Disposed
        ) {
            return;
        }
        self.clear_apply_timer();
        let Some(surface) = self.shared.surface.get() else {
            return;
        };
        self.hide_content();
        let platform = self.platform();
        match content {
            None => self.toggle_loading(true),
            Some(asset) => {
                if self.shared.is_loading.get() {
                    self.toggle_loading(false);
                }
                platform.surface.set_content(surface, &asset);
                self.maybe_decorate_gallery(surface, &asset);
                *self.shared.asset.borrow_mut() = Some(asset);
                self.emit(BoxEvent::ContentUpdated);
            }
        }
        self.drain_settle_queue();
        let has_content = self.shared.asset.borrow().is_some();
        if has_content && self.state() != LifecycleState::Open {
            self.set_state(LifecycleState::Positioning);
        }
        let instant = self.state() != LifecycleState::Open;
        self.resize_internal(explicit_size, instant);
    }

    fn maybe_decorate_gallery(&self, surface: SurfaceId, asset: &Asset) {
        let Asset::Image { url, .. } = asset else {
            return;
        };
        let Some(gallery) = self.platform().gallery else {
            return;
        };
        let images = self.shared.options.borrow().images.clone();
        if images.len() <= 1 {
            return;
        }
        let current = images.iter().position(|candidate| candidate == url);
        gallery.decorate(
            surface,
            &GalleryContext {
                images: &images,
                current,
            },
        );
    }

    fn resize_internal(&self, content_size: Option<Size>, instant: bool) {
        let Some(surface) = self.shared.surface.get() else {
            return;
        };
        self.clear_show_timer();
        let platform = self.platform();
        let opts = self.shared.options.borrow().clone();
        let vp = platform.viewport.metrics();

        let mut size = content_size.unwrap_or(if self.shared.is_loading.get() {
            opts.size_loading
        } else {
            opts.size
        });
        // A request for the full viewport width keeps the chrome
        // reachable by giving back a sliver.
        if size.x == vp.size.x {
            size.x -= 20;
            size.y -= 50;
        }

        let mut frame = self.centered_frame(size, &opts, &vp);
        self.apply_elastic_bounds(&mut frame, &opts, &vp);

        self.hide_content();
        let seq = self.shared.open_seq.get();
        if instant {
            self.apply_frame(surface, frame);
            self.emit(BoxEvent::Resized);
            let weak = self.downgrade();
            let timer = platform.scheduler.defer(
                SHOW_CONTENT_DELAY_MS,
                Box::new(move || {
                    if let Some(bx) = OverlayBox::try_from_weak(&weak) {
                        bx.show_tick(seq);
                    }
                }),
            );
            self.shared.show_timer.set(Some(timer));
        } else {
            let anim =
                platform
                    .animator
                    .start(surface, SurfaceLayer::Window, PropertyMap::frame(frame));
            self.shared.window_anim.set(Some(anim));
            self.shared.last_frame.set(Some(frame));
            let weak = self.downgrade();
            platform.animator.chain(
                anim,
                Box::new(move || {
                    if let Some(bx) = OverlayBox::try_from_weak(&weak) {
                        bx.resize_settled(seq);
                    }
                }),
            );
        }
        // Recheck centering on the next tick, as a viewport change would.
        let weak = self.downgrade();
        platform.scheduler.defer(
            0,
            Box::new(move || {
                if let Some(bx) = OverlayBox::try_from_weak(&weak)
                    && bx.callback_live(seq)
                {
                    bx.reposition();
                }
            }),
        );
    }

    fn centered_frame(&self, size: Size, opts: &BoxOptions, vp: &ViewportMetrics) -> FrameStyles {
        FrameStyles {
            left: vp.scroll.x + (vp.size.x - size.x - opts.margin_inner.x) / 2,
            top: vp.scroll.y + (vp.size.y - size.y - opts.margin_inner.y) / 2,
            width: size.x,
            height: size.y,
            z_layer: self.z_layer(),
        }
    }

    fn apply_elastic_bounds(
        &self,
        frame: &mut FrameStyles,
        opts: &BoxOptions,
        vp: &ViewportMetrics,
    ) {
        if let Elastic::Bounded { .. } = opts.elastic_y {
            let mut height = opts.elastic_y.clamp(frame.height);
            let cap = vp.size.y - ELASTIC_VIEWPORT_PAD;
            if cap > 0 && height > cap {
                let squeezed = height - cap;
                height = cap;
                frame.top += squeezed / 2;
            }
            frame.height = height;
        }
        if let Elastic::Bounded { .. } = opts.elastic_x {
            let width = opts.elastic_x.clamp(frame.width);
            if width != frame.width {
                frame.left += (frame.width - width) / 2;
                frame.width = width;
            }
        }
    }

    fn apply_frame(&self, surface: SurfaceId, frame: FrameStyles) {
        self.platform().surface.apply_styles(surface, &frame);
        self.shared.last_frame.set(Some(frame));
    }

    fn show_tick(&self, seq: u64) {
        self.shared.show_timer.set(None);
        if !self.callback_live(seq) {
            return;
        }
        self.finish_entrance();
    }

    fn resize_settled(&self, seq: u64) {
        self.shared.window_anim.set(None);
        if !self.callback_live(seq) {
            return;
        }
        self.emit(BoxEvent::Resized);
        self.finish_entrance();
    }

    /// The entrance (or a later resize) settled: content becomes
    /// visible, and a positioning box becomes open and interactive.
    fn finish_entrance(&self) {
        self.show_content();
        if self.state() == LifecycleState::Positioning {
            self.attach_listeners();
            self.set_state(LifecycleState::Open);
            self.emit(BoxEvent::Opened);
        }
    }

    fn show_content(&self) {
        let Some(surface) = self.shared.surface.get() else {
            return;
        };
        if !self.shared.content_shown.replace(true) {
            self.emit(BoxEvent::Shown);
        }
        let platform = self.platform();
        let fade =
            platform
                .animator
                .start(surface, SurfaceLayer::Content, PropertyMap::new().opacity(1.0));
        self.shared.content_anim.set(Some(fade));
    }

    fn hide_content(&self) {
        let Some(surface) = self.shared.surface.get() else {
            return;
        };
        let platform = self.platform();
        if let Some(anim) = self.shared.content_anim.take() {
            platform.animator.cancel(anim);
        }
        if self.shared.content_shown.replace(false) {
            self.emit(BoxEvent::Hidden);
        }
        platform
            .animator
            .set(surface, SurfaceLayer::Content, PropertyMap::new().opacity(0.0));
    }

    fn toggle_loading(&self, loading: bool) {
        if self.shared.is_loading.replace(loading) == loading {
            return;
        }
        if let Some(surface) = self.shared.surface.get() {
            self.platform().surface.set_loading(surface, loading);
        }
        self.emit(if loading {
            BoxEvent::LoadingStarted
        } else {
            BoxEvent::LoadingStopped
        });
    }

    fn attach_listeners(&self) {
        assert!(
            !self.shared.listeners_attached.get(),
            "interaction listeners attached twice: lifecycle state corrupted"
        );
        if let Some(surface) = self.shared.surface.get() {
            self.platform().surface.bind_interactions(surface);
        }
        self.shared.listeners_attached.set(true);
    }

    fn detach_listeners(&self) {
        if !self.shared.listeners_attached.replace(false) {
            return;
        }
        if let Some(surface) = self.shared.surface.get() {
            self.platform().surface.unbind_interactions(surface);
        }
    }

    fn discard_asset(&self) {
        self.discard_pending_frame();
        let taken = self.shared.asset.borrow_mut().take();
        if let Some(asset) = taken {
            if let Asset::Document { frame } = &asset {
                self.platform().frames.remove_frame(frame);
            }
            if let Some(surface) = self.shared.surface.get() {
                self.platform().surface.clear_content(surface);
            }
        }
    }

    fn discard_pending_frame(&self) {
        if let Some(frame) = self.shared.pending_frame.borrow_mut().take() {
            self.platform().frames.remove_frame(&frame);
        }
    }

    fn clear_apply_timer(&self) {
        if let Some(timer) = self.shared.apply_timer.take() {
            self.platform().scheduler.cancel(timer);
        }
    }

    fn clear_show_timer(&self) {
        if let Some(timer) = self.shared.show_timer.take() {
            self.platform().scheduler.cancel(timer);
        }
    }

    fn cancel_animations(&self) {
        let platform = self.platform();
        for cell in [
            &self.shared.overlay_anim,
            &self.shared.window_anim,
            &self.shared.content_anim,
        ] {
            if let Some(anim) = cell.take() {
                platform.animator.cancel(anim);
            }
        }
    }

    fn drain_settle_queue(&self) {
        loop {
            let task = self.shared.settle_queue.borrow_mut().pop_front();
            match task {
                Some(task) => task(self),
                None => break,
            }
        }
    }
}
