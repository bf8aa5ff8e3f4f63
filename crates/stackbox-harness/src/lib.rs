#![forbid(unsafe_code)]

//! Deterministic fake collaborators for exercising the overlay engine.
//!
//! Every fake journals its calls and holds asynchronous completions
//! until the test releases them: timers fire when the manual clock
//! advances, animations complete when told to (or instantly in auto
//! mode), and loads/fetches/frame-loads resolve on demand. That makes
//! the engine's interleavings — slow loads racing rapid open/close
//! sequences, late iframe load events, cascading closes — scriptable
//! and reproducible.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use ahash::AHashMap;

use stackbox::platform::{
    AnimationHandle, Animator, CollaboratorError, FetchCallback, FragmentFetcher, FrameHost,
    FrameLoadCallback, GalleryContext, GalleryDecorator, ImageCallback, ImageLoader, Platform,
    PresentationSurface, PropertyMap, Scheduler, SurfaceId, SurfaceLayer, Task, TimerId,
    ViewportProbe,
};
use stackbox::subject::{Asset, DocumentId, FrameHandle, FrameId, ImageInfo};
use stackbox::{DocumentContext, OverlayBox, ParentLink};
use stackbox_core::geometry::{FrameStyles, Point, Size, ViewportMetrics};
use stackbox_core::notify::BoxEvent;

// --- Surface ---

/// Everything the engine has told the surface about one box.
#[derive(Debug, Clone, Default)]
pub struct SurfaceRecord {
    pub frame: Option<FrameStyles>,
    pub hidden: bool,
    pub loading: bool,
    pub content: Option<Asset>,
    pub bound: bool,
    pub overlay_extent: Option<Size>,
    /// Measured size reported back for elastic re-evaluation; falls
    /// back to the applied frame when unset.
    pub rendered: Option<Size>,
    pub destroyed: bool,
}

/// One journaled surface call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceCall {
    Build(SurfaceId),
    Destroy(SurfaceId),
    ApplyStyles(SurfaceId, FrameStyles),
    SetVisibility(SurfaceId, bool),
    OverlayExtent(SurfaceId, Size),
    SetLoading(SurfaceId, bool),
    SetContent(SurfaceId, &'static str),
    ClearContent(SurfaceId),
    Bind(SurfaceId),
    Unbind(SurfaceId),
}

/// Journaling presentation surface.
#[derive(Default)]
pub struct FakeSurface {
    next_id: Cell<u64>,
    records: RefCell<AHashMap<u64, SurfaceRecord>>,
    journal: RefCell<Vec<SurfaceCall>>,
}

impl FakeSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, surface: SurfaceId) -> SurfaceRecord {
        self.records
            .borrow()
            .get(&surface.0)
            .cloned()
            .unwrap_or_default()
    }

    /// Script what `rendered_size` reports for a surface.
    pub fn set_rendered(&self, surface: SurfaceId, size: Size) {
        self.with_record(surface, |record| record.rendered = Some(size));
    }

    pub fn journal(&self) -> Vec<SurfaceCall> {
        self.journal.borrow().clone()
    }

    /// Surfaces built and not yet destroyed.
    pub fn live_count(&self) -> usize {
        self.records
            .borrow()
            .values()
            .filter(|record| !record.destroyed)
            .count()
    }

    fn log(&self, call: SurfaceCall) {
        self.journal.borrow_mut().push(call);
    }

    fn with_record(&self, surface: SurfaceId, update: impl FnOnce(&mut SurfaceRecord)) {
        let mut records = self.records.borrow_mut();
        update(records.entry(surface.0).or_default());
    }
}

impl PresentationSurface for FakeSurface {
    fn build(&self) -> SurfaceId {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        let surface = SurfaceId(id);
        self.with_record(surface, |record| record.hidden = true);
        self.log(SurfaceCall::Build(surface));
        surface
    }

    fn destroy(&self, surface: SurfaceId) {
        self.with_record(surface, |record| record.destroyed = true);
        self.log(SurfaceCall::Destroy(surface));
    }

    fn apply_styles(&self, surface: SurfaceId, frame: &FrameStyles) {
        self.with_record(surface, |record| record.frame = Some(*frame));
        self.log(SurfaceCall::ApplyStyles(surface, *frame));
    }

    fn set_visibility(&self, surface: SurfaceId, hidden: bool) {
        self.with_record(surface, |record| record.hidden = hidden);
        self.log(SurfaceCall::SetVisibility(surface, hidden));
    }

    fn set_overlay_extent(&self, surface: SurfaceId, extent: Size) {
        self.with_record(surface, |record| record.overlay_extent = Some(extent));
        self.log(SurfaceCall::OverlayExtent(surface, extent));
    }

    fn set_loading(&self, surface: SurfaceId, loading: bool) {
        self.with_record(surface, |record| record.loading = loading);
        self.log(SurfaceCall::SetLoading(surface, loading));
    }

    fn set_content(&self, surface: SurfaceId, content: &Asset) {
        let kind = content.kind_name();
        self.with_record(surface, |record| record.content = Some(content.clone()));
        self.log(SurfaceCall::SetContent(surface, kind));
    }

    fn clear_content(&self, surface: SurfaceId) {
        self.with_record(surface, |record| record.content = None);
        self.log(SurfaceCall::ClearContent(surface));
    }

    fn rendered_size(&self, surface: SurfaceId) -> Option<Size> {
        let record = self.record(surface);
        record.rendered.or(record.frame.map(|frame| frame.size()))
    }

    fn bind_interactions(&self, surface: SurfaceId) {
        self.with_record(surface, |record| record.bound = true);
        self.log(SurfaceCall::Bind(surface));
    }

    fn unbind_interactions(&self, surface: SurfaceId) {
        self.with_record(surface, |record| record.bound = false);
        self.log(SurfaceCall::Unbind(surface));
    }
}

// --- Animator ---

struct PendingAnimation {
    handle: AnimationHandle,
    chains: Vec<Task>,
    cancelled: bool,
    completed: bool,
}

/// One journaled animation start or instant set.
#[derive(Debug, Clone, PartialEq)]
pub enum AnimationCall {
    Start(AnimationHandle, SurfaceId, SurfaceLayer, PropertyMap),
    Set(SurfaceId, SurfaceLayer, PropertyMap),
    Cancel(AnimationHandle),
}

/// Manually driven animator.
///
/// In manual mode (the default) started animations stay pending until
/// [`FakeAnimator::complete_all`]. In auto mode they complete as they
/// start, so chained continuations run synchronously.
#[derive(Default)]
pub struct FakeAnimator {
    auto_complete: Cell<bool>,
    next_handle: Cell<u64>,
    pending: RefCell<Vec<PendingAnimation>>,
    journal: RefCell<Vec<AnimationCall>>,
}

impl FakeAnimator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_auto_complete(&self, auto: bool) {
        self.auto_complete.set(auto);
    }

    pub fn journal(&self) -> Vec<AnimationCall> {
        self.journal.borrow().clone()
    }

    pub fn pending_count(&self) -> usize {
        self.pending
            .borrow()
            .iter()
            .filter(|anim| !anim.cancelled && !anim.completed)
            .count()
    }

    /// Complete every pending animation (and any started by their
    /// chains) in start order. Returns how many completed.
    pub fn complete_all(&self) -> usize {
        let mut completed = 0;
        loop {
            let ready: Vec<Task> = {
                let mut pending = self.pending.borrow_mut();
                let mut tasks = Vec::new();
                for anim in pending.iter_mut() {
                    if !anim.cancelled && !anim.completed {
                        anim.completed = true;
                        completed += 1;
                        tasks.append(&mut anim.chains);
                    }
                }
                tasks
            };
            if ready.is_empty() {
                return completed;
            }
            for task in ready {
                task();
            }
        }
    }
}

impl Animator for FakeAnimator {
    fn start(
        &self,
        surface: SurfaceId,
        layer: SurfaceLayer,
        target: PropertyMap,
    ) -> AnimationHandle {
        let handle = AnimationHandle(self.next_handle.get() + 1);
        self.next_handle.set(handle.0);
        self.journal
            .borrow_mut()
            .push(AnimationCall::Start(handle, surface, layer, target));
        self.pending.borrow_mut().push(PendingAnimation {
            handle,
            chains: Vec::new(),
            cancelled: false,
            completed: self.auto_complete.get(),
        });
        handle
    }

    fn set(&self, surface: SurfaceId, layer: SurfaceLayer, target: PropertyMap) {
        self.journal
            .borrow_mut()
            .push(AnimationCall::Set(surface, layer, target));
    }

    fn cancel(&self, animation: AnimationHandle) {
        self.journal.borrow_mut().push(AnimationCall::Cancel(animation));
        let mut pending = self.pending.borrow_mut();
        if let Some(anim) = pending.iter_mut().find(|anim| anim.handle == animation) {
            // Cancel contract: stop now, never fire the chain.
            anim.cancelled = true;
            anim.chains.clear();
        }
    }

    fn chain(&self, animation: AnimationHandle, after: Task) {
        let run_now = {
            let mut pending = self.pending.borrow_mut();
            match pending.iter_mut().find(|anim| anim.handle == animation) {
                Some(anim) if anim.cancelled => return,
                Some(anim) if anim.completed => true,
                Some(anim) => {
                    anim.chains.push(after);
                    return;
                }
                None => return,
            }
        };
        if run_now {
            after();
        }
    }
}

// --- Scheduler ---

struct ScheduledTask {
    id: TimerId,
    due: u64,
    task: Task,
}

/// Manual-clock scheduler. Timers fire only when the test advances the
/// clock, in due-time order (insertion order breaks ties).
#[derive(Default)]
pub struct ManualScheduler {
    now: Cell<u64>,
    next_id: Cell<u64>,
    queue: RefCell<Vec<ScheduledTask>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> u64 {
        self.now.get()
    }

    pub fn pending_count(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Advance the clock, firing due timers in order. Tasks scheduled
    /// while firing run too when they fall within the window. Returns
    /// how many fired.
    pub fn advance(&self, ms: u64) -> usize {
        let deadline = self.now.get() + ms;
        let mut fired = 0;
        loop {
            let next = {
                let mut queue = self.queue.borrow_mut();
                let due_index = queue
                    .iter()
                    .enumerate()
                    .filter(|(_, entry)| entry.due <= deadline)
                    .min_by_key(|(_, entry)| (entry.due, entry.id.0))
                    .map(|(index, _)| index);
                due_index.map(|index| queue.remove(index))
            };
            match next {
                Some(entry) => {
                    self.now.set(entry.due.max(self.now.get()));
                    (entry.task)();
                    fired += 1;
                }
                None => break,
            }
        }
        self.now.set(deadline);
        fired
    }

    /// Fire everything currently scheduled, however far out. Returns
    /// how many fired.
    pub fn run_until_idle(&self) -> usize {
        let mut fired = 0;
        loop {
            let horizon = {
                let queue = self.queue.borrow();
                queue.iter().map(|entry| entry.due).max()
            };
            match horizon {
                Some(due) => {
                    let delta = due.saturating_sub(self.now.get());
                    let ran = self.advance(delta.max(1));
                    if ran == 0 {
                        break;
                    }
                    fired += ran;
                }
                None => break,
            }
        }
        fired
    }
}

impl Scheduler for ManualScheduler {
    fn defer(&self, delay_ms: u32, task: Task) -> TimerId {
        let id = TimerId(self.next_id.get() + 1);
        self.next_id.set(id.0);
        self.queue.borrow_mut().push(ScheduledTask {
            id,
            due: self.now.get() + delay_ms as u64,
            task,
        });
        id
    }

    fn cancel(&self, timer: TimerId) {
        self.queue.borrow_mut().retain(|entry| entry.id != timer);
    }
}

// --- Image loader ---

/// Image loader with scripted and held results.
///
/// A scripted URL resolves synchronously inside `load`; everything else
/// is held until the test calls [`FakeImageLoader::complete`].
#[derive(Default)]
pub struct FakeImageLoader {
    scripted: RefCell<AHashMap<String, Result<Size, String>>>,
    held: RefCell<Vec<(String, ImageCallback)>>,
}

impl FakeImageLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `url` resolve synchronously with a natural size or failure.
    pub fn script(&self, url: impl Into<String>, result: Result<Size, &str>) {
        self.scripted
            .borrow_mut()
            .insert(url.into(), result.map_err(str::to_string));
    }

    /// Resolve a held load. Returns false when no load for `url` is
    /// waiting.
    pub fn complete(&self, url: &str, result: Result<Size, &str>) -> bool {
        let callback = {
            let mut held = self.held.borrow_mut();
            match held.iter().position(|(pending, _)| pending == url) {
                Some(index) => Some(held.remove(index)),
                None => None,
            }
        };
        match callback {
            Some((pending_url, done)) => {
                done(deliver_image(&pending_url, result));
                true
            }
            None => false,
        }
    }

    pub fn held_urls(&self) -> Vec<String> {
        self.held.borrow().iter().map(|(url, _)| url.clone()).collect()
    }
}

fn deliver_image(url: &str, result: Result<Size, &str>) -> Result<ImageInfo, CollaboratorError> {
    result
        .map(|natural| ImageInfo {
            url: url.to_string(),
            natural,
        })
        .map_err(CollaboratorError::new)
}

impl ImageLoader for FakeImageLoader {
    fn load(&self, url: &str, done: ImageCallback) {
        let scripted = self.scripted.borrow().get(url).cloned();
        match scripted {
            Some(result) => done(
                result
                    .map(|natural| ImageInfo {
                        url: url.to_string(),
                        natural,
                    })
                    .map_err(CollaboratorError::new),
            ),
            None => self.held.borrow_mut().push((url.to_string(), done)),
        }
    }
}

// --- Fragment fetcher ---

/// Fragment fetcher mirroring [`FakeImageLoader`]'s scripted/held split.
#[derive(Default)]
pub struct FakeFetcher {
    scripted: RefCell<AHashMap<String, Result<String, String>>>,
    held: RefCell<Vec<(String, FetchCallback)>>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, url: impl Into<String>, result: Result<&str, &str>) {
        self.scripted.borrow_mut().insert(
            url.into(),
            result.map(str::to_string).map_err(str::to_string),
        );
    }

    pub fn complete(&self, url: &str, result: Result<&str, &str>) -> bool {
        let callback = {
            let mut held = self.held.borrow_mut();
            match held.iter().position(|(pending, _)| pending == url) {
                Some(index) => Some(held.remove(index)),
                None => None,
            }
        };
        match callback {
            Some((_, done)) => {
                done(result.map(str::to_string).map_err(CollaboratorError::new));
                true
            }
            None => false,
        }
    }

    pub fn held_urls(&self) -> Vec<String> {
        self.held.borrow().iter().map(|(url, _)| url.clone()).collect()
    }
}

impl FragmentFetcher for FakeFetcher {
    fn fetch(&self, url: &str, done: FetchCallback) {
        let scripted = self.scripted.borrow().get(url).cloned();
        match scripted {
            Some(result) => done(result.map_err(CollaboratorError::new)),
            None => self.held.borrow_mut().push((url.to_string(), done)),
        }
    }
}

// --- Frame host ---

/// Frame host that allocates embedded documents and holds load events
/// until fired.
#[derive(Default)]
pub struct FakeFrameHost {
    next_id: Cell<u64>,
    created: RefCell<Vec<FrameHandle>>,
    removed: RefCell<Vec<FrameId>>,
    held_loads: RefCell<Vec<(FrameHandle, FrameLoadCallback)>>,
    auto_load: Cell<bool>,
}

impl FakeFrameHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire load events as frames are created.
    pub fn set_auto_load(&self, auto: bool) {
        self.auto_load.set(auto);
    }

    /// Fire a held load event. Returns false when none is waiting for
    /// the frame.
    pub fn fire_load(&self, frame: FrameId) -> bool {
        let callback = {
            let mut held = self.held_loads.borrow_mut();
            match held.iter().position(|(handle, _)| handle.frame == frame) {
                Some(index) => Some(held.remove(index)),
                None => None,
            }
        };
        match callback {
            Some((handle, on_load)) => {
                on_load(handle);
                true
            }
            None => false,
        }
    }

    pub fn last_created(&self) -> Option<FrameHandle> {
        self.created.borrow().last().cloned()
    }

    pub fn created_count(&self) -> usize {
        self.created.borrow().len()
    }

    pub fn removed_frames(&self) -> Vec<FrameId> {
        self.removed.borrow().clone()
    }
}

impl FrameHost for FakeFrameHost {
    fn create_frame(&self, url: &str, _size: Size, on_load: FrameLoadCallback) -> FrameHandle {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        let handle = FrameHandle {
            frame: FrameId(id),
            document: DocumentId::next(),
            url: url.to_string(),
        };
        self.created.borrow_mut().push(handle.clone());
        if self.auto_load.get() {
            on_load(handle.clone());
        } else {
            self.held_loads.borrow_mut().push((handle.clone(), on_load));
        }
        handle
    }

    fn remove_frame(&self, frame: &FrameHandle) {
        self.removed.borrow_mut().push(frame.frame);
        self.held_loads
            .borrow_mut()
            .retain(|(handle, _)| handle.frame != frame.frame);
    }
}

// --- Viewport / gallery ---

/// Settable viewport.
pub struct FakeViewport {
    metrics: Cell<ViewportMetrics>,
}

impl Default for FakeViewport {
    fn default() -> Self {
        Self {
            metrics: Cell::new(ViewportMetrics::new(
                Size::new(1024, 768),
                Point::new(0, 0),
                Size::new(1024, 768),
            )),
        }
    }
}

impl FakeViewport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, metrics: ViewportMetrics) {
        self.metrics.set(metrics);
    }

    pub fn set_size(&self, size: Size) {
        let mut metrics = self.metrics.get();
        metrics.size = size;
        metrics.scroll_size = Size::new(
            metrics.scroll_size.x.max(size.x),
            metrics.scroll_size.y.max(size.y),
        );
        self.metrics.set(metrics);
    }
}

impl ViewportProbe for FakeViewport {
    fn metrics(&self) -> ViewportMetrics {
        self.metrics.get()
    }
}

/// Journaling gallery decorator.
#[derive(Default)]
pub struct FakeGallery {
    calls: RefCell<Vec<(SurfaceId, Vec<String>, Option<usize>)>>,
}

impl FakeGallery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<(SurfaceId, Vec<String>, Option<usize>)> {
        self.calls.borrow().clone()
    }
}

impl GalleryDecorator for FakeGallery {
    fn decorate(&self, surface: SurfaceId, gallery: &GalleryContext<'_>) {
        self.calls
            .borrow_mut()
            .push((surface, gallery.images.to_vec(), gallery.current));
    }
}

// --- Bundle ---

/// The full fake platform, with every collaborator reachable for
/// scripting and inspection.
pub struct TestPlatform {
    pub surface: Rc<FakeSurface>,
    pub animator: Rc<FakeAnimator>,
    pub fetcher: Rc<FakeFetcher>,
    pub images: Rc<FakeImageLoader>,
    pub frames: Rc<FakeFrameHost>,
    pub scheduler: Rc<ManualScheduler>,
    pub viewport: Rc<FakeViewport>,
    pub gallery: Rc<FakeGallery>,
}

impl Default for TestPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl TestPlatform {
    pub fn new() -> Self {
        Self {
            surface: Rc::new(FakeSurface::new()),
            animator: Rc::new(FakeAnimator::new()),
            fetcher: Rc::new(FakeFetcher::new()),
            images: Rc::new(FakeImageLoader::new()),
            frames: Rc::new(FakeFrameHost::new()),
            scheduler: Rc::new(ManualScheduler::new()),
            viewport: Rc::new(FakeViewport::new()),
            gallery: Rc::new(FakeGallery::new()),
        }
    }

    /// Same fakes, with animations completing as they start.
    pub fn synchronous() -> Self {
        let tp = Self::new();
        tp.animator.set_auto_complete(true);
        tp
    }

    pub fn platform(&self) -> Platform {
        Platform::new(
            self.surface.clone(),
            self.animator.clone(),
            self.fetcher.clone(),
            self.images.clone(),
            self.frames.clone(),
            self.scheduler.clone(),
            self.viewport.clone(),
        )
        .with_gallery(self.gallery.clone())
    }

    /// Drive timers and animations until nothing is left to run.
    pub fn settle(&self) {
        loop {
            let fired = self.scheduler.run_until_idle();
            let completed = self.animator.complete_all();
            if fired == 0 && completed == 0 {
                break;
            }
        }
    }
}

// --- Fixtures ---

/// A fresh top-level document on this platform.
pub fn root_document(tp: &TestPlatform) -> Rc<DocumentContext> {
    DocumentContext::root(tp.platform())
}

/// An embedded document whose parent chain is reachable.
pub fn embedded_document(
    tp: &TestPlatform,
    parent: &Rc<DocumentContext>,
    id: DocumentId,
) -> Rc<DocumentContext> {
    DocumentContext::embedded(tp.platform(), id, ParentLink::Accessible(Rc::clone(parent)))
}

/// An embedded document behind a sandbox boundary: the parent exists
/// but its engine is unreachable.
pub fn sandboxed_document(tp: &TestPlatform, id: DocumentId) -> Rc<DocumentContext> {
    DocumentContext::embedded(tp.platform(), id, ParentLink::Denied)
}

/// Record every notification a box fires.
pub fn collect_events(bx: &OverlayBox) -> Rc<RefCell<Vec<BoxEvent>>> {
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&events);
    bx.subscribe(move |event| sink.borrow_mut().push(event));
    events
}
