#![forbid(unsafe_code)]

//! Stackable modal overlay engine.
//!
//! Boxes open from within other open boxes — including boxes whose
//! content is a separate embedded document running its own copy of this
//! engine — and still share one globally consistent stacking order. The
//! crate owns the stack registry with its cross-document ownership
//! delegation, the per-box lifecycle state machine, the
//! content-resolution protocol, and the opener/above/below relationship
//! queries. Rendering, animation, network fetch, and gallery decoration
//! live behind the collaborator traits in [`platform`].
//!
//! # Example
//!
//! ```ignore
//! let doc = DocumentContext::root(platform);
//!
//! // Reuse the document's shared box...
//! let bx = doc.open(Subject::Url("photo.jpg".into()), OptionPatch::new())?;
//!
//! // ...or stack an independent one above it.
//! let pushed = doc.open(
//!     Subject::Url("detail.html".into()),
//!     OptionPatch::new().push(),
//! )?;
//! assert_eq!(pushed.opener_box().map(|b| b.id()), Some(bx.id()));
//! ```

pub mod content;
pub mod document;
pub mod lifecycle;
pub mod platform;
pub mod queries;
pub mod registry;
pub mod subject;

pub use stackbox_core::error::{CloseOutcome, ContentError, InvalidHandler, OpenError};
pub use stackbox_core::geometry::{FrameStyles, Point, Size, ViewportMetrics, aspect_fit};
pub use stackbox_core::notify::{BoxEvent, SubscriptionId};
pub use stackbox_core::options::{
    BoxOptions, Closable, Elastic, OptionPatch, StrategyKind, parse_inline,
};

pub use content::{AUTO_DETECT_ORDER, strategy_applies};
pub use document::{DocumentContext, ParentLink};
pub use lifecycle::{DEFAULT_ERROR_TEXT, Interaction, LifecycleState, OverlayBox};
pub use platform::{
    AnimationHandle, Animator, CollaboratorError, FragmentFetcher, FrameHost, GalleryContext,
    GalleryDecorator, ImageLoader, Platform, PresentationSurface, PropertyMap, Scheduler,
    SurfaceId, SurfaceLayer, TimerId, ViewportProbe,
};
pub use queries::StackRef;
pub use registry::{BASE_Z_LAYER, BoxId, StackRegistry, Z_LAYER_STEP};
pub use subject::{Asset, DocumentId, FrameHandle, FrameId, ImageInfo, NodeHandle, NodeId, Subject};
