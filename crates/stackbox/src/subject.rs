#![forbid(unsafe_code)]

//! Subjects handed to `open` and the assets acquisition produces.
//!
//! The engine never touches a real DOM; hosts describe nodes and
//! embedded documents with the opaque handles here. A `NodeHandle`
//! carries only what content resolution needs: an identity, an optional
//! link target, and the raw inline-metadata attribute value.

use std::sync::atomic::{AtomicU64, Ordering};

use stackbox_core::geometry::Size;

/// Global counter for document identities.
static DOCUMENT_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Identity of one logical document/script context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentId(u64);

impl DocumentId {
    /// Allocate a fresh process-unique document id.
    pub fn next() -> Self {
        Self(DOCUMENT_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub const fn value(self) -> u64 {
        self.0
    }
}

/// Host-side identity of a content node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u64);

/// Host-side identity of an embedded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(pub u64);

/// Opaque descriptor of a host content node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeHandle {
    pub id: NodeId,
    /// Link target, when the node is an anchor-like element.
    pub href: Option<String>,
    /// Raw inline-metadata attribute value, extracted by the host.
    pub metadata: Option<String>,
    /// Whether the node is currently attached to a document.
    pub attached: bool,
}

impl NodeHandle {
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            href: None,
            metadata: None,
            attached: true,
        }
    }

    pub fn href(mut self, href: impl Into<String>) -> Self {
        self.href = Some(href.into());
        self
    }

    pub fn metadata(mut self, metadata: impl Into<String>) -> Self {
        self.metadata = Some(metadata.into());
        self
    }

    pub fn detached(mut self) -> Self {
        self.attached = false;
        self
    }
}

/// An embedded document created by the frame host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHandle {
    pub frame: FrameId,
    /// The embedded document's script context.
    pub document: DocumentId,
    pub url: String,
}

/// Natural measurements reported by the image loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    pub url: String,
    pub natural: Size,
}

/// An acquired content handle. Exactly one strategy owns the asset of a
/// box at any time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Asset {
    /// A preloaded image, already fitted for display.
    Image {
        url: String,
        natural: Size,
        display: Size,
    },
    /// A separate embedded document with its own script context.
    Document { frame: FrameHandle },
    /// A fetched HTML fragment.
    Fragment { html: String },
    /// An adopted host node.
    Node { node: NodeHandle },
    /// Verbatim text (also used for error content).
    Literal { text: String },
}

impl Asset {
    /// The embedded document this asset renders, if it renders one.
    pub fn embedded_document(&self) -> Option<DocumentId> {
        match self {
            Asset::Document { frame } => Some(frame.document),
            _ => None,
        }
    }

    /// Strategy-style name, for diagnostics.
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Asset::Image { .. } => "image",
            Asset::Document { .. } => "iframe",
            Asset::Fragment { .. } => "fragment",
            Asset::Node { .. } => "adopt",
            Asset::Literal { .. } => "literal",
        }
    }
}

/// What a caller hands to `open`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subject {
    /// A host node (anchor, media element, prepared fragment root).
    Node(NodeHandle),
    /// A URL-like string.
    Url(String),
    /// Verbatim text content.
    Text(String),
    /// A pre-resolved asset, adopted without strategy selection.
    Resolved(Asset),
}

impl Subject {
    /// The URL this subject designates: the string itself, or the
    /// node's link target.
    pub fn url(&self) -> Option<&str> {
        match self {
            Subject::Url(url) => Some(url),
            Subject::Node(node) => node.href.as_deref(),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<&NodeHandle> {
        match self {
            Subject::Node(node) => Some(node),
            _ => None,
        }
    }
}
