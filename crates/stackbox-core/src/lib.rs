#![forbid(unsafe_code)]

//! Collaborator-free foundation for the stackbox overlay engine:
//! geometry, option sets, lifecycle notifications, and the error
//! taxonomy. Everything here is plain data — the engine crate owns the
//! behavior.

pub mod error;
pub mod geometry;
pub mod notify;
pub mod options;

pub use error::{CloseOutcome, ContentError, InvalidHandler, OpenError};
pub use geometry::{FrameStyles, Point, Size, ViewportMetrics, aspect_fit};
pub use notify::{BoxEvent, Emitter, SubscriptionId};
pub use options::{BoxOptions, Closable, Elastic, OptionPatch, StrategyKind, parse_inline};
