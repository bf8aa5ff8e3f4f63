#![forbid(unsafe_code)]

//! Per-box option sets and their layered merge.
//!
//! An effective option set is merged in increasing precedence: built-in
//! defaults, instance presets passed at construction, the patch passed
//! to the current open call, and (when opted in) options parsed from the
//! subject's inline metadata attribute.
//!
//! # Invariants
//!
//! - Merging never partially applies a layer: inline metadata either
//!   parses as a whole or contributes nothing.
//! - Parsing inline metadata never evaluates the payload; "secure" mode
//!   additionally pre-scans for active syntax and drops the payload on
//!   detection.

use std::rc::Rc;

use serde::Deserialize;

use crate::error::InvalidHandler;
use crate::geometry::Size;

/// A named content-acquisition strategy.
///
/// Closed enumeration: `Image`, `Iframe`, and `Adopt` participate in
/// auto-detection (in that order); `Fragment` and `Literal` must be
/// forced via the `handler` option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    /// Preload an image by URL and size it to fit the viewport.
    Image,
    /// Embed a separate document by URL.
    Iframe,
    /// Adopt a content node the caller already holds.
    Adopt,
    /// Fetch a remote HTML fragment.
    Fragment,
    /// Show the subject's text verbatim.
    Literal,
}

impl StrategyKind {
    /// Stable name used by inline metadata payloads.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Iframe => "iframe",
            Self::Adopt => "adopt",
            Self::Fragment => "fragment",
            Self::Literal => "literal",
        }
    }

    /// Parse a handler name; unknown names refuse the open request.
    pub fn from_name(name: &str) -> Result<Self, InvalidHandler> {
        match name {
            "image" => Ok(Self::Image),
            "iframe" => Ok(Self::Iframe),
            "adopt" => Ok(Self::Adopt),
            "fragment" => Ok(Self::Fragment),
            "literal" => Ok(Self::Literal),
            other => Err(InvalidHandler {
                name: other.to_string(),
            }),
        }
    }
}

/// Bounded auto-sizing along one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Elastic {
    /// The configured size is authoritative.
    #[default]
    Fixed,
    /// Content may dictate the size within `[min, max]`, re-evaluated
    /// on viewport resize.
    Bounded { min: i32, max: i32 },
}

impl Elastic {
    /// Clamp a candidate extent into the configured bounds.
    pub fn clamp(self, value: i32) -> i32 {
        match self {
            Self::Fixed => value,
            Self::Bounded { min, max } => value.clamp(min, max),
        }
    }
}

/// Close policy for interaction-driven close requests.
///
/// Programmatic `close()` always proceeds; only closes originating from
/// an interaction (escape, overlay click, close button) consult this.
#[derive(Clone, Default)]
pub enum Closable {
    #[default]
    Yes,
    /// No close affordance; interaction closes are rejected.
    No,
    /// Ask the predicate per interaction-driven close request.
    Guard(Rc<dyn Fn() -> bool>),
}

impl Closable {
    /// Whether an interaction-driven close may proceed right now.
    pub fn allows_interactive_close(&self) -> bool {
        match self {
            Self::Yes => true,
            Self::No => false,
            Self::Guard(predicate) => predicate(),
        }
    }
}

impl std::fmt::Debug for Closable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Yes => f.write_str("Yes"),
            Self::No => f.write_str("No"),
            Self::Guard(_) => f.write_str("Guard(..)"),
        }
    }
}

/// Resolved per-box configuration.
#[derive(Debug, Clone)]
pub struct BoxOptions {
    /// Target content size.
    pub size: Size,
    /// Size of the loading presentation.
    pub size_loading: Size,
    /// Margin kept between the window and the viewport when centering.
    pub margin_inner: Size,
    /// Viewport margin reserved when fitting images.
    pub margin_image: Size,
    pub elastic_x: Elastic,
    pub elastic_y: Elastic,
    /// Forced content strategy; `None` auto-detects.
    pub handler: Option<StrategyKind>,
    pub closable: Closable,
    /// Whether the surface shows a close affordance.
    pub close_btn: bool,
    pub overlay: bool,
    pub overlay_opacity: f32,
    /// Overlay fade duration; doubles as the coalescing delay before a
    /// pending acquisition shows the loading presentation.
    pub overlay_fade_ms: u32,
    /// Opt in to reading the subject node's inline metadata.
    pub parse: bool,
    /// Pre-scan inline metadata for active syntax before parsing.
    pub parse_secure: bool,
    /// Make the iframe strategy pend on the embedded document's load
    /// callback instead of resolving immediately.
    pub iframe_preload: bool,
    /// Overrides the default error content text.
    pub error_text: Option<String>,
    /// Gallery set; decoration applies when it has more than one entry.
    pub images: Vec<String>,
}

impl Default for BoxOptions {
    fn default() -> Self {
        Self {
            size: Size::new(600, 450),
            size_loading: Size::new(200, 150),
            margin_inner: Size::new(20, 20),
            margin_image: Size::new(50, 75),
            elastic_x: Elastic::Fixed,
            elastic_y: Elastic::Fixed,
            handler: None,
            closable: Closable::Yes,
            close_btn: true,
            overlay: true,
            overlay_opacity: 0.7,
            overlay_fade_ms: 250,
            parse: false,
            parse_secure: false,
            iframe_preload: false,
            error_text: None,
            images: Vec::new(),
        }
    }
}

impl BoxOptions {
    /// Apply a patch on top of this set, returning the merged result.
    pub fn merged(mut self, patch: &OptionPatch) -> Self {
        if let Some(v) = patch.size {
            self.size = v;
        }
        if let Some(v) = patch.size_loading {
            self.size_loading = v;
        }
        if let Some(v) = patch.margin_inner {
            self.margin_inner = v;
        }
        if let Some(v) = patch.margin_image {
            self.margin_image = v;
        }
        if let Some(v) = patch.elastic_x {
            self.elastic_x = v;
        }
        if let Some(v) = patch.elastic_y {
            self.elastic_y = v;
        }
        if let Some(v) = patch.handler {
            self.handler = Some(v);
        }
        if let Some(v) = &patch.closable {
            self.closable = v.clone();
        }
        if let Some(v) = patch.close_btn {
            self.close_btn = v;
        }
        if let Some(v) = patch.overlay {
            self.overlay = v;
        }
        if let Some(v) = patch.overlay_opacity {
            self.overlay_opacity = v;
        }
        if let Some(v) = patch.overlay_fade_ms {
            self.overlay_fade_ms = v;
        }
        if let Some(v) = patch.parse {
            self.parse = v;
        }
        if let Some(v) = patch.parse_secure {
            self.parse_secure = v;
        }
        if let Some(v) = patch.iframe_preload {
            self.iframe_preload = v;
        }
        if let Some(v) = &patch.error_text {
            self.error_text = Some(v.clone());
        }
        if let Some(v) = &patch.images {
            self.images = v.clone();
        }
        self
    }
}

/// A sparse option layer; unset fields defer to lower-precedence layers.
#[derive(Debug, Clone, Default)]
pub struct OptionPatch {
    pub size: Option<Size>,
    pub size_loading: Option<Size>,
    pub margin_inner: Option<Size>,
    pub margin_image: Option<Size>,
    pub elastic_x: Option<Elastic>,
    pub elastic_y: Option<Elastic>,
    pub handler: Option<StrategyKind>,
    pub closable: Option<Closable>,
    pub close_btn: Option<bool>,
    pub overlay: Option<bool>,
    pub overlay_opacity: Option<f32>,
    pub overlay_fade_ms: Option<u32>,
    pub parse: Option<bool>,
    pub parse_secure: Option<bool>,
    pub iframe_preload: Option<bool>,
    pub error_text: Option<String>,
    pub images: Option<Vec<String>>,
    /// Route this open request to a newly created box instead of the
    /// current one. Patch-level only; never stored on a box.
    pub push: bool,
}

impl OptionPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn size(mut self, size: Size) -> Self {
        self.size = Some(size);
        self
    }

    pub fn handler(mut self, handler: StrategyKind) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn closable(mut self, closable: Closable) -> Self {
        self.closable = Some(closable);
        self
    }

    pub fn elastic_y(mut self, elastic: Elastic) -> Self {
        self.elastic_y = Some(elastic);
        self
    }

    pub fn parse(mut self, parse: bool) -> Self {
        self.parse = Some(parse);
        self
    }

    pub fn parse_secure(mut self, secure: bool) -> Self {
        self.parse_secure = Some(secure);
        self
    }

    pub fn iframe_preload(mut self, preload: bool) -> Self {
        self.iframe_preload = Some(preload);
        self
    }

    pub fn error_text(mut self, text: impl Into<String>) -> Self {
        self.error_text = Some(text.into());
        self
    }

    pub fn images(mut self, images: Vec<String>) -> Self {
        self.images = Some(images);
        self
    }

    pub fn push(mut self) -> Self {
        self.push = true;
        self
    }

    /// Copy of this patch with push routing removed, for handing the
    /// request to the freshly created box.
    pub fn without_push(&self) -> Self {
        let mut patch = self.clone();
        patch.push = false;
        patch
    }
}

/// Wire shape of an inline metadata payload.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlinePayload {
    size: Option<SizePayload>,
    size_loading: Option<SizePayload>,
    elastic_x: Option<ElasticPayload>,
    elastic_y: Option<ElasticPayload>,
    handler: Option<String>,
    closable: Option<bool>,
    overlay_opacity: Option<f32>,
    error_text: Option<String>,
    images: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct SizePayload {
    x: i32,
    y: i32,
}

impl From<SizePayload> for Size {
    fn from(payload: SizePayload) -> Self {
        Size::new(payload.x, payload.y)
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ElasticPayload {
    Toggle(bool),
    Bounded { min: i32, max: i32 },
}

impl From<ElasticPayload> for Elastic {
    fn from(payload: ElasticPayload) -> Self {
        match payload {
            ElasticPayload::Toggle(_) => Elastic::Fixed,
            ElasticPayload::Bounded { min, max } => Elastic::Bounded { min, max },
        }
    }
}

/// Parse an inline metadata attribute into an option layer.
///
/// Returns `Ok(None)` when the payload is not usable — malformed, or
/// rejected by the secure pre-scan — so a bad attribute contributes no
/// options rather than partial ones. An unknown handler name is the one
/// hard error: the caller must refuse the open request.
pub fn parse_inline(raw: &str, secure: bool) -> Result<Option<OptionPatch>, InvalidHandler> {
    if secure && !passes_secure_scan(raw) {
        return Ok(None);
    }
    let Ok(payload) = serde_json::from_str::<InlinePayload>(raw) else {
        return Ok(None);
    };

    let mut patch = OptionPatch::new();
    patch.size = payload.size.map(Size::from);
    patch.size_loading = payload.size_loading.map(Size::from);
    patch.elastic_x = payload.elastic_x.map(Elastic::from);
    patch.elastic_y = payload.elastic_y.map(Elastic::from);
    if let Some(name) = payload.handler {
        patch.handler = Some(StrategyKind::from_name(&name)?);
    }
    patch.closable = payload.closable.map(|allowed| {
        if allowed {
            Closable::Yes
        } else {
            Closable::No
        }
    });
    patch.overlay_opacity = payload.overlay_opacity;
    patch.error_text = payload.error_text;
    patch.images = payload.images;
    Ok(Some(patch))
}

/// Reject payloads that contain anything but passive JSON tokens.
///
/// Escaped characters are neutralized first, then quoted strings are
/// removed; what remains may only be JSON punctuation, digits, number
/// syntax, whitespace, and the letters of `true`/`false`/`null`.
fn passes_secure_scan(raw: &str) -> bool {
    let mut stripped = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    let mut in_string = false;
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                // Neutralize the escape so a \" cannot fake a string end.
                chars.next();
                if !in_string {
                    stripped.push('@');
                }
            }
            '"' => in_string = !in_string,
            _ if in_string => {}
            _ => stripped.push(c),
        }
    }
    if in_string {
        return false;
    }
    stripped.chars().all(|c| {
        matches!(c,
            ',' | ':' | '{' | '}' | '[' | ']' | '.' | '-' | '+'
            | '0'..='9'
            | 'E' | 'a' | 'e' | 'f' | 'l' | 'n' | 'r'..='u'
            | ' ' | '\n' | '\r' | '\t')
    })
}
