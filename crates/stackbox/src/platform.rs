#![forbid(unsafe_code)]

//! Collaborator seams: everything the engine delegates to a host.
//!
//! The engine runs on one UI event loop, so collaborators are
//! `Rc<dyn ...>` and callbacks are plain `FnOnce` boxes — "concurrency"
//! means overlapping callbacks, never parallel execution.
//!
//! # Contracts
//!
//! - `Animator::cancel` stops the animation immediately and MUST NOT
//!   fire its completion chain.
//! - `Scheduler::cancel` on an already-fired timer is a no-op.
//! - `FrameHost::create_frame` returns the handle synchronously; the
//!   `on_load` callback fires later (or never, for a stalled document).

use std::rc::Rc;

use thiserror::Error;

use stackbox_core::geometry::{FrameStyles, Size, ViewportMetrics};

use crate::subject::{Asset, FrameHandle, ImageInfo};

/// Surface identity handed out by the presentation collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceId(pub u64);

/// Handle of a started animation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AnimationHandle(pub u64);

/// Handle of a deferred task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(pub u64);

/// Which part of a surface an animation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceLayer {
    /// The full-viewport backdrop.
    Overlay,
    /// The positioned window chrome.
    Window,
    /// The content area inside the window.
    Content,
}

/// Sparse animation/style target.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PropertyMap {
    pub left: Option<i32>,
    pub top: Option<i32>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub opacity: Option<f32>,
}

impl PropertyMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn left(mut self, left: i32) -> Self {
        self.left = Some(left);
        self
    }

    pub fn opacity(mut self, opacity: f32) -> Self {
        self.opacity = Some(opacity);
        self
    }

    /// Positional target covering a whole frame (z is not animatable).
    pub fn frame(frame: FrameStyles) -> Self {
        Self {
            left: Some(frame.left),
            top: Some(frame.top),
            width: Some(frame.width),
            height: Some(frame.height),
            opacity: None,
        }
    }
}

/// Failure reported by a fetch/load collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct CollaboratorError {
    pub reason: String,
}

impl CollaboratorError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

pub type Task = Box<dyn FnOnce()>;
pub type ImageCallback = Box<dyn FnOnce(Result<ImageInfo, CollaboratorError>)>;
pub type FetchCallback = Box<dyn FnOnce(Result<String, CollaboratorError>)>;
pub type FrameLoadCallback = Box<dyn FnOnce(FrameHandle)>;

/// Low-level DOM construction, styling, and event wiring.
pub trait PresentationSurface {
    fn build(&self) -> SurfaceId;
    fn destroy(&self, surface: SurfaceId);
    fn apply_styles(&self, surface: SurfaceId, frame: &FrameStyles);
    fn set_visibility(&self, surface: SurfaceId, hidden: bool);
    /// Grow the backdrop to cover the scrollable extent.
    fn set_overlay_extent(&self, surface: SurfaceId, extent: Size);
    fn set_loading(&self, surface: SurfaceId, loading: bool);
    fn set_content(&self, surface: SurfaceId, content: &Asset);
    fn clear_content(&self, surface: SurfaceId);
    /// Measured size of the rendered window, for elastic re-evaluation.
    fn rendered_size(&self, surface: SurfaceId) -> Option<Size>;
    /// Wire up close/escape/viewport listeners for this surface.
    fn bind_interactions(&self, surface: SurfaceId);
    fn unbind_interactions(&self, surface: SurfaceId);
}

/// Tween/morph engine.
pub trait Animator {
    fn start(&self, surface: SurfaceId, layer: SurfaceLayer, target: PropertyMap)
    -> AnimationHandle;
    /// Apply a target instantly, without animating.
    fn set(&self, surface: SurfaceId, layer: SurfaceLayer, target: PropertyMap);
    /// Stop immediately; the completion chain must not fire.
    fn cancel(&self, animation: AnimationHandle);
    /// Run `after` once the animation settles.
    fn chain(&self, animation: AnimationHandle, after: Task);
}

/// Remote HTML fragment fetch.
pub trait FragmentFetcher {
    fn fetch(&self, url: &str, done: FetchCallback);
}

/// Image preloader reporting natural sizes.
pub trait ImageLoader {
    fn load(&self, url: &str, done: ImageCallback);
}

/// Creates and tears down embedded documents.
pub trait FrameHost {
    fn create_frame(&self, url: &str, size: Size, on_load: FrameLoadCallback) -> FrameHandle;
    fn remove_frame(&self, frame: &FrameHandle);
}

/// Deferred single-shot tasks on the UI loop.
pub trait Scheduler {
    fn defer(&self, delay_ms: u32, task: Task) -> TimerId;
    fn cancel(&self, timer: TimerId);
}

/// Host document measurements.
pub trait ViewportProbe {
    fn metrics(&self) -> ViewportMetrics;
}

/// Context handed to the gallery decorator.
#[derive(Debug, Clone, Copy)]
pub struct GalleryContext<'a> {
    pub images: &'a [String],
    /// Index of the displayed image within `images`, when it is one of
    /// them.
    pub current: Option<usize>,
}

/// Optional thumbnail/navigation decoration for multi-image sets.
pub trait GalleryDecorator {
    fn decorate(&self, surface: SurfaceId, gallery: &GalleryContext<'_>);
}

/// The bundle of collaborators a document context runs against.
#[derive(Clone)]
pub struct Platform {
    pub surface: Rc<dyn PresentationSurface>,
    pub animator: Rc<dyn Animator>,
    pub fetcher: Rc<dyn FragmentFetcher>,
    pub images: Rc<dyn ImageLoader>,
    pub frames: Rc<dyn FrameHost>,
    pub scheduler: Rc<dyn Scheduler>,
    pub viewport: Rc<dyn ViewportProbe>,
    pub gallery: Option<Rc<dyn GalleryDecorator>>,
}

impl Platform {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        surface: Rc<dyn PresentationSurface>,
        animator: Rc<dyn Animator>,
        fetcher: Rc<dyn FragmentFetcher>,
        images: Rc<dyn ImageLoader>,
        frames: Rc<dyn FrameHost>,
        scheduler: Rc<dyn Scheduler>,
        viewport: Rc<dyn ViewportProbe>,
    ) -> Self {
        Self {
            surface,
            animator,
            fetcher,
            images,
            frames,
            scheduler,
            viewport,
            gallery: None,
        }
    }

    pub fn with_gallery(mut self, gallery: Rc<dyn GalleryDecorator>) -> Self {
        self.gallery = Some(gallery);
        self
    }
}

impl std::fmt::Debug for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Platform")
            .field("gallery", &self.gallery.is_some())
            .finish_non_exhaustive()
    }
}
