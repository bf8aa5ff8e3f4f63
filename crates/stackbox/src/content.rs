#![forbid(unsafe_code)]

//! Content resolution: pick exactly one acquisition strategy and track
//! its result.
//!
//! With no forced handler, strategies are tried in a fixed priority
//! order — image by extension, iframe by URL, adopt when the subject is
//! already a content node — and the first applicable one wins. A forced
//! handler is used unconditionally, its predicate bypassed. `Fragment`
//! and `Literal` never auto-detect.
//!
//! A strategy either resolves synchronously or returns `Pending` after
//! dispatching a collaborator callback. Pending callbacks carry the
//! box's open sequence; the lifecycle discards anything stale.

use tracing::trace;

use stackbox_core::error::ContentError;
use stackbox_core::geometry::{Size, aspect_fit};
use stackbox_core::options::{BoxOptions, StrategyKind};

use crate::lifecycle::OverlayBox;
use crate::subject::{Asset, Subject};

/// Auto-detection priority. First applicable wins.
pub const AUTO_DETECT_ORDER: [StrategyKind; 3] =
    [StrategyKind::Image, StrategyKind::Iframe, StrategyKind::Adopt];

/// Outcome of dispatching a strategy.
pub(crate) enum Acquisition {
    /// Content is available now. `size` overrides the option size when
    /// the strategy measured one (images).
    Resolved {
        asset: Asset,
        size: Option<Size>,
    },
    /// A collaborator callback will deliver the result later.
    Pending,
}

/// Whether a strategy's applicability predicate accepts the subject.
pub fn strategy_applies(kind: StrategyKind, subject: &Subject) -> bool {
    match kind {
        StrategyKind::Image => subject.url().is_some_and(has_image_extension),
        StrategyKind::Iframe | StrategyKind::Fragment => {
            subject.url().is_some_and(is_openable_url)
        }
        StrategyKind::Adopt => subject.as_node().is_some(),
        StrategyKind::Literal => true,
    }
}

/// Pick a strategy for the subject and dispatch it.
pub(crate) fn resolve(
    bx: &OverlayBox,
    seq: u64,
    subject: &Subject,
    options: &BoxOptions,
) -> Result<Acquisition, ContentError> {
    if let Subject::Resolved(asset) = subject {
        trace!(kind = asset.kind_name(), "subject is pre-resolved");
        return Ok(Acquisition::Resolved {
            asset: asset.clone(),
            size: None,
        });
    }
    let kind = match options.handler {
        Some(forced) => forced,
        None => AUTO_DETECT_ORDER
            .iter()
            .copied()
            .find(|candidate| strategy_applies(*candidate, subject))
            .ok_or(ContentError::UnresolvableSubject)?,
    };
    trace!(
        strategy = kind.name(),
        forced = options.handler.is_some(),
        "content strategy selected"
    );
    match kind {
        StrategyKind::Image => acquire_image(bx, seq, subject, options),
        StrategyKind::Iframe => acquire_iframe(bx, seq, subject, options),
        StrategyKind::Adopt => acquire_adopt(subject),
        StrategyKind::Fragment => acquire_fragment(bx, seq, subject),
        StrategyKind::Literal => acquire_literal(subject),
    }
}

fn acquire_image(
    bx: &OverlayBox,
    seq: u64,
    subject: &Subject,
    options: &BoxOptions,
) -> Result<Acquisition, ContentError> {
    let Some(url) = subject.url() else {
        return Err(ContentError::LoadFailure(
            "image strategy needs a URL".into(),
        ));
    };
    let url = url.to_string();
    let margin = options.margin_image;
    let weak = bx.downgrade();
    let loaded_url = url.clone();
    bx.platform().images.load(
        &url,
        Box::new(move |result| {
            let Some(bx) = OverlayBox::try_from_weak(&weak) else {
                return;
            };
            match result {
                Ok(info) => {
                    // Sub-pixel natural size is the broken-image
                    // heuristic, not a success.
                    if info.natural.is_degenerate() {
                        bx.content_failed(
                            seq,
                            ContentError::LoadFailure(format!("broken image `{loaded_url}`")),
                        );
                        return;
                    }
                    let vp = bx.platform().viewport.metrics();
                    let bounds = Size::new(vp.size.x - margin.x, vp.size.y - margin.y);
                    let display = aspect_fit(info.natural, bounds);
                    bx.content_ready(
                        seq,
                        Asset::Image {
                            url: loaded_url,
                            natural: info.natural,
                            display,
                        },
                        Some(display),
                    );
                }
                Err(failure) => {
                    bx.content_failed(seq, ContentError::LoadFailure(failure.reason));
                }
            }
        }),
    );
    Ok(Acquisition::Pending)
}

fn acquire_iframe(
    bx: &OverlayBox,
    seq: u64,
    subject: &Subject,
    options: &BoxOptions,
) -> Result<Acquisition, ContentError> {
    let Some(url) = subject.url().filter(|candidate| !candidate.is_empty()) else {
        return Err(ContentError::LoadFailure(
            "iframe strategy needs a URL".into(),
        ));
    };
    let platform = bx.platform();
    if options.iframe_preload {
        let weak = bx.downgrade();
        let handle = platform.frames.create_frame(
            url,
            options.size,
            Box::new(move |frame| {
                if let Some(bx) = OverlayBox::try_from_weak(&weak) {
                    bx.content_ready(seq, Asset::Document { frame }, None);
                }
            }),
        );
        bx.track_pending_frame(handle);
        return Ok(Acquisition::Pending);
    }
    // Default path: the frame is content as soon as it exists; a later
    // load event is irrelevant.
    let frame = platform
        .frames
        .create_frame(url, options.size, Box::new(|_| {}));
    Ok(Acquisition::Resolved {
        asset: Asset::Document { frame },
        size: None,
    })
}

fn acquire_adopt(subject: &Subject) -> Result<Acquisition, ContentError> {
    match subject.as_node() {
        Some(node) => Ok(Acquisition::Resolved {
            asset: Asset::Node { node: node.clone() },
            size: None,
        }),
        None => Err(ContentError::LoadFailure(
            "adopt strategy needs a content node".into(),
        )),
    }
}

fn acquire_fragment(bx: &OverlayBox, seq: u64, subject: &Subject) -> Result<Acquisition, ContentError> {
    let Some(url) = subject.url().filter(|candidate| !candidate.is_empty()) else {
        return Err(ContentError::LoadFailure(
            "fragment strategy needs a URL".into(),
        ));
    };
    let weak = bx.downgrade();
    bx.platform().fetcher.fetch(
        url,
        Box::new(move |result| {
            let Some(bx) = OverlayBox::try_from_weak(&weak) else {
                return;
            };
            match result {
                Ok(html) => bx.content_ready(seq, Asset::Fragment { html }, None),
                Err(failure) => {
                    bx.content_failed(seq, ContentError::LoadFailure(failure.reason));
                }
            }
        }),
    );
    Ok(Acquisition::Pending)
}

fn acquire_literal(subject: &Subject) -> Result<Acquisition, ContentError> {
    let text = match subject {
        Subject::Text(text) => text.clone(),
        Subject::Url(url) => url.clone(),
        Subject::Node(node) => node.href.clone().unwrap_or_default(),
        // Pre-resolved subjects never reach strategy dispatch.
        Subject::Resolved(_) => String::new(),
    };
    Ok(Acquisition::Resolved {
        asset: Asset::Literal { text },
        size: None,
    })
}

fn has_image_extension(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    [".jpg", ".png", ".gif"]
        .iter()
        .any(|extension| lower.ends_with(extension))
}

fn is_openable_url(url: &str) -> bool {
    !url.is_empty()
        && !url.starts_with('#')
        && !url.to_ascii_lowercase().starts_with("javascript:")
}
