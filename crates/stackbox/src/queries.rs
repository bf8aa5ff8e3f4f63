#![forbid(unsafe_code)]

//! Relationship queries over the stack registry.
//!
//! All lookups run on a snapshot of the authoritative registry, so a
//! query observes one consistent order regardless of which document's
//! code asked. References are either a box or an embedded document; a
//! document matches the box whose asset renders it.

use crate::lifecycle::OverlayBox;
use crate::registry::{BoxId, StackRegistry};
use crate::subject::DocumentId;

/// A reference into the stack: a box, or an embedded document handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackRef {
    Box(BoxId),
    Document(DocumentId),
}

impl From<&OverlayBox> for StackRef {
    fn from(bx: &OverlayBox) -> Self {
        StackRef::Box(bx.id())
    }
}

fn matches(bx: &OverlayBox, target: StackRef) -> bool {
    match target {
        StackRef::Box(id) => bx.id() == id,
        StackRef::Document(doc) => bx.embedded_document() == Some(doc),
    }
}

fn position(stack: &[OverlayBox], target: StackRef) -> Option<usize> {
    stack.iter().position(|bx| matches(bx, target))
}

/// The box the reference resolves to: the referenced box itself, or the
/// box currently displaying the referenced document.
pub fn current(registry: &StackRegistry, target: StackRef) -> Option<OverlayBox> {
    let stack = registry.snapshot();
    let index = position(&stack, target)?;
    Some(stack[index].clone())
}

/// Boxes stacked strictly above the reference, bottom-most first.
/// Empty when the reference is not found or is topmost.
pub fn above(registry: &StackRegistry, target: StackRef) -> Vec<OverlayBox> {
    let stack = registry.snapshot();
    match position(&stack, target) {
        Some(index) => stack[index + 1..].to_vec(),
        None => Vec::new(),
    }
}

/// The box whose embedded document opened the reference: the entry
/// immediately beneath it, when that entry renders its own document.
/// A same-document content box has no embedded opener.
pub fn opener(registry: &StackRegistry, target: StackRef) -> Option<OverlayBox> {
    let stack = registry.snapshot();
    let index = position(&stack, target)?;
    let beneath = stack.get(index.checked_sub(1)?)?;
    beneath.embedded_document().map(|_| beneath.clone())
}

/// The document context responsible for the content that opened the
/// reference: the embedded document of the box beneath it, or — when
/// that box is content-only or the reference sits at the bottom — the
/// host document the matched box lives in.
pub fn opener_document(registry: &StackRegistry, target: StackRef) -> Option<DocumentId> {
    let stack = registry.snapshot();
    let index = position(&stack, target)?;
    if index > 0
        && let Some(embedded) = stack[index - 1].embedded_document()
    {
        return Some(embedded);
    }
    Some(stack[index].owner_document())
}

/// Close every box above the reference in strict descending order
/// (topmost first), so a cascade never repositions a box whose opener
/// is already gone. The victim list is captured up front; boxes it does
/// not contain are untouched.
pub fn close_above(registry: &StackRegistry, target: StackRef) {
    let victims = above(registry, target);
    for bx in victims.iter().rev() {
        bx.close();
    }
}

/// Close the whole stack, topmost first.
pub fn close_all(registry: &StackRegistry) {
    let victims = registry.snapshot();
    for bx in victims.iter().rev() {
        bx.close();
    }
}
