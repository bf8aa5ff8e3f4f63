//! Registry ordering and z-layer invariants.

use proptest::prelude::*;

use stackbox::{
    LifecycleState, OptionPatch, OverlayBox, StackRef, StrategyKind, Subject,
};
use stackbox_harness::{root_document, TestPlatform};

fn open_pushed(doc: &std::rc::Rc<stackbox::DocumentContext>, label: &str) -> OverlayBox {
    doc.open(
        Subject::Text(label.into()),
        OptionPatch::new().handler(StrategyKind::Literal).push(),
    )
    .unwrap()
}

#[test]
fn later_boxes_always_layer_above_earlier_ones() {
    let tp = TestPlatform::synchronous();
    let doc = root_document(&tp);

    let a = open_pushed(&doc, "a");
    let b = open_pushed(&doc, "b");
    tp.settle();

    assert_eq!(a.state(), LifecycleState::Open);
    assert_eq!(b.state(), LifecycleState::Open);
    assert!(b.z_layer() > a.z_layer());
}

#[test]
fn order_is_stable_under_interleaved_close() {
    let tp = TestPlatform::synchronous();
    let doc = root_document(&tp);
    let registry = doc.registry();

    let a = open_pushed(&doc, "a");
    let b = open_pushed(&doc, "b");
    tp.settle();

    // B sits above A the moment it opens.
    let above_a = a.boxes_above();
    assert_eq!(above_a.len(), 1);
    assert_eq!(above_a[0].id(), b.id());
    assert!(b.boxes_above().is_empty());

    a.close();
    // A is structurally gone; B keeps its slot and layer.
    assert_eq!(registry.index_of(a.id()), None);
    assert_eq!(registry.index_of(b.id()), Some(0));
    assert!(b.boxes_above().is_empty());

    b.close();
    assert!(registry.is_empty());
}

#[test]
fn construction_reserves_a_slot_before_content_shows() {
    let tp = TestPlatform::new();
    let doc = root_document(&tp);
    let registry = doc.registry();

    let reserved = OverlayBox::new(&doc, OptionPatch::new());
    assert_eq!(reserved.state(), LifecycleState::Idle);
    assert_eq!(registry.index_of(reserved.id()), Some(0));

    // A box opened afterwards stacks above the reservation.
    let later = open_pushed(&doc, "later");
    assert!(later.z_layer() > reserved.z_layer());
    assert_eq!(registry.index_of(later.id()), Some(1));
}

#[test]
fn registry_lookup_roundtrip() {
    let tp = TestPlatform::synchronous();
    let doc = root_document(&tp);
    let registry = doc.registry();

    let a = open_pushed(&doc, "a");
    let b = open_pushed(&doc, "b");
    tp.settle();

    assert_eq!(registry.len(), 2);
    assert_eq!(registry.at_index(0).unwrap().id(), a.id());
    assert_eq!(registry.at_index(1).unwrap().id(), b.id());
    assert_eq!(registry.top().unwrap().id(), b.id());
    assert_eq!(registry.z_layer_of(a.id()), Some(a.z_layer()));

    // Removal is by identity; a second removal is a no-op.
    assert!(registry.remove(a.id()));
    assert!(!registry.remove(a.id()));
}

#[test]
fn close_above_leaves_the_reference_box_open() {
    let tp = TestPlatform::synchronous();
    let doc = root_document(&tp);

    let bottom = open_pushed(&doc, "bottom");
    let middle = open_pushed(&doc, "middle");
    let top = open_pushed(&doc, "top");
    tp.settle();

    bottom.close_above(None);

    assert_eq!(bottom.state(), LifecycleState::Open);
    assert_eq!(middle.state(), LifecycleState::Disposed);
    assert_eq!(top.state(), LifecycleState::Disposed);
    assert_eq!(doc.registry().len(), 1);

    // Explicit references work the same way.
    let again = open_pushed(&doc, "again");
    tp.settle();
    bottom.close_above(Some(StackRef::Box(bottom.id())));
    assert_eq!(again.state(), LifecycleState::Disposed);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Z-layers stay strictly increasing bottom-to-top under arbitrary
    /// open/close interleavings, and a new top always exceeds the layer
    /// beneath it.
    #[test]
    fn z_layers_strictly_increase(commands in prop::collection::vec(any::<u8>(), 1..40)) {
        let tp = TestPlatform::synchronous();
        let doc = root_document(&tp);
        let registry = doc.registry();
        let mut live: Vec<OverlayBox> = Vec::new();

        for command in commands {
            if command % 3 == 0 && !live.is_empty() {
                let victim = live.remove((command as usize / 3) % live.len());
                victim.close();
            } else {
                let bx = open_pushed(&doc, "p");
                if let Some(below) = registry.index_of(bx.id()).and_then(|index| {
                    index.checked_sub(1).and_then(|beneath| registry.at_index(beneath))
                }) {
                    prop_assert!(bx.z_layer() > below.z_layer());
                }
                live.push(bx);
            }
            tp.settle();

            let layers: Vec<u32> = registry
                .snapshot()
                .iter()
                .map(|entry| entry.z_layer())
                .collect();
            for pair in layers.windows(2) {
                prop_assert!(pair[1] > pair[0], "layers not increasing: {layers:?}");
            }
        }
    }
}
