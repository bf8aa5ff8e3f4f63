#![forbid(unsafe_code)]

//! Error taxonomy for open and content-acquisition failures.
//!
//! Only handler validation refuses an open outright. Content failures
//! are recovered by swapping in error content — the box stays open in a
//! degraded state — and close-guard rejections are outcomes, not errors.

use thiserror::Error;

/// An explicitly requested content handler that no strategy matches.
///
/// Raised while validating inline metadata; the open request is refused
/// before any lifecycle state changes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown content handler `{name}`")]
pub struct InvalidHandler {
    pub name: String,
}

/// Reasons an `open` request is refused with no state change.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OpenError {
    #[error(transparent)]
    InvalidHandler(#[from] InvalidHandler),
}

/// Content-acquisition failures.
///
/// Neither variant propagates out of the lifecycle: both are converted
/// into an error-content display.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContentError {
    /// No strategy's applicability predicate accepted the subject and
    /// none was forced.
    #[error("no content strategy applies to the subject")]
    UnresolvableSubject,
    /// A strategy accepted the subject but its load/fetch failed.
    #[error("content failed to load: {0}")]
    LoadFailure(String),
}

/// What a close request actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// The close was accepted; the exit transition started.
    Closing,
    /// `closable` (or its guard predicate) declined an
    /// interaction-driven close. The box remains open.
    GuardRejected,
    /// The box was already closing or disposed; nothing happened and no
    /// second `Closed` notification fires.
    AlreadyClosed,
    /// The box was never opened; the request was forwarded to the box
    /// currently displaying this box's document.
    Delegated,
    /// The box was never opened and no displaying box was found.
    NotOpen,
}
