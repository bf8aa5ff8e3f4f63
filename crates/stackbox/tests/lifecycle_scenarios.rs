//! End-to-end lifecycle scenarios driven through the fake platform.

use std::cell::RefCell;
use std::rc::Rc;

use stackbox::{
    Asset, BoxEvent, Closable, CloseOutcome, Elastic, Interaction, LifecycleState, NodeHandle,
    NodeId, OpenError, OptionPatch, Size, StrategyKind, Subject, DEFAULT_ERROR_TEXT,
};
use stackbox_core::geometry::{Point, ViewportMetrics};
use stackbox_harness::{collect_events, root_document, TestPlatform};

fn literal(text: &str) -> Subject {
    Subject::Text(text.into())
}

fn literal_patch() -> OptionPatch {
    OptionPatch::new().handler(StrategyKind::Literal)
}

#[test]
fn image_open_fits_natural_size_into_viewport_bound() {
    // Scenario: a 1600x1200 photo against a viewport-derived 800x600
    // bound scales to exactly 800x600.
    let tp = TestPlatform::synchronous();
    tp.viewport.set(ViewportMetrics::new(
        Size::new(850, 675),
        Point::new(0, 0),
        Size::new(850, 675),
    ));
    tp.images.script("photo.jpg", Ok(Size::new(1600, 1200)));
    let doc = root_document(&tp);

    let bx = doc
        .open(Subject::Url("photo.jpg".into()), OptionPatch::new())
        .unwrap();
    tp.settle();

    assert_eq!(bx.state(), LifecycleState::Open);
    match bx.asset() {
        Some(Asset::Image {
            natural, display, ..
        }) => {
            assert_eq!(natural, Size::new(1600, 1200));
            assert_eq!(display, Size::new(800, 600));
        }
        other => panic!("expected image asset, got {other:?}"),
    }
    let surface = tp.surface.record(stackbox::SurfaceId(1));
    let frame = surface.frame.expect("frame applied");
    assert_eq!(frame.width, 800);
    assert_eq!(frame.height, 600);
}

#[test]
fn detached_node_adopts_synchronously() {
    // Scenario: a detached node resolves in the same dispatch — the box
    // is already past AcquiringContent when open() returns.
    let tp = TestPlatform::synchronous();
    let doc = root_document(&tp);

    let node = NodeHandle::new(NodeId(41)).detached();
    let bx = doc
        .open(Subject::Node(node.clone()), OptionPatch::new())
        .unwrap();

    assert_eq!(bx.state(), LifecycleState::Positioning);
    assert_eq!(bx.asset(), Some(Asset::Node { node }));

    tp.settle();
    assert_eq!(bx.state(), LifecycleState::Open);
}

#[test]
fn iframe_closed_before_load_never_applies_content() {
    // Scenario: open a preloading iframe, close before its load event.
    // The late event must not apply content or blow up.
    let tp = TestPlatform::synchronous();
    let doc = root_document(&tp);

    let bx = doc
        .open(
            Subject::Url("child.html".into()),
            OptionPatch::new()
                .handler(StrategyKind::Iframe)
                .iframe_preload(true),
        )
        .unwrap();
    assert_eq!(bx.state(), LifecycleState::AcquiringContent);
    let frame = tp.frames.last_created().expect("frame created");

    assert_eq!(bx.close(), CloseOutcome::Closing);
    assert_eq!(bx.state(), LifecycleState::Disposed);

    // The pending frame was torn down with the box; a late load event
    // finds nobody listening.
    assert!(tp.frames.removed_frames().contains(&frame.frame));
    assert!(!tp.frames.fire_load(frame.frame));
    assert_eq!(bx.asset(), None);
}

#[test]
fn late_image_result_after_dispose_is_discarded() {
    let tp = TestPlatform::synchronous();
    let doc = root_document(&tp);

    let bx = doc
        .open(Subject::Url("slow.jpg".into()), OptionPatch::new())
        .unwrap();
    assert_eq!(bx.state(), LifecycleState::AcquiringContent);

    bx.close();
    assert_eq!(bx.state(), LifecycleState::Disposed);

    // The held load resolves after disposal; the liveness guard drops it.
    assert!(tp.images.complete("slow.jpg", Ok(Size::new(640, 480))));
    assert_eq!(bx.state(), LifecycleState::Disposed);
    assert_eq!(bx.asset(), None);
    assert_eq!(tp.surface.live_count(), 0);
}

#[test]
fn push_creates_an_independent_box_above_the_opener() {
    // Scenario: a box opened with push from inside an iframe box stacks
    // above it and reports it as opener.
    let tp = TestPlatform::synchronous();
    let root = root_document(&tp);

    let a = root
        .open(Subject::Url("child.html".into()), OptionPatch::new())
        .unwrap();
    tp.settle();
    assert_eq!(a.state(), LifecycleState::Open);
    let child_doc_id = a.embedded_document().expect("iframe content");

    let child = stackbox_harness::embedded_document(&tp, &root, child_doc_id);
    let b = child
        .open(Subject::Text("details".into()), literal_patch().push())
        .unwrap();
    tp.settle();

    assert_ne!(a.id(), b.id());
    assert_eq!(b.state(), LifecycleState::Open);
    assert!(b.z_layer() > a.z_layer());
    assert_eq!(b.opener_box().map(|opener| opener.id()), Some(a.id()));
    assert_eq!(b.opener_document(), Some(child_doc_id));
    // Both live in the root's registry; the child document has none of
    // its own in play.
    assert_eq!(root.local_registry().len(), 2);
    assert!(child.local_registry().is_empty());
}

#[test]
fn close_above_from_root_context_closes_topmost_first() {
    let tp = TestPlatform::synchronous();
    let root = root_document(&tp);

    let closed_order = Rc::new(RefCell::new(Vec::new()));
    let mut boxes = Vec::new();
    for label in ["first", "second", "third"] {
        let bx = root
            .open(Subject::Text(label.into()), literal_patch().push())
            .unwrap();
        let order = Rc::clone(&closed_order);
        let tag = label.to_string();
        bx.subscribe(move |event| {
            if event == BoxEvent::Closed {
                order.borrow_mut().push(tag.clone());
            }
        });
        boxes.push(bx);
    }
    tp.settle();
    assert_eq!(root.local_registry().len(), 3);

    // The hosting context itself is not stacked, so this clears the
    // whole stack, topmost first, each close completing before the next.
    root.close_above();

    assert_eq!(*closed_order.borrow(), vec!["third", "second", "first"]);
    assert!(root.local_registry().is_empty());
    for bx in &boxes {
        assert_eq!(bx.state(), LifecycleState::Disposed);
    }
}

#[test]
fn second_open_supersedes_pending_content() {
    // A slow first request must not clobber the content of a faster
    // second one, no matter when it resolves.
    let tp = TestPlatform::synchronous();
    let doc = root_document(&tp);

    let bx = doc
        .open(Subject::Url("slow.jpg".into()), OptionPatch::new())
        .unwrap();
    assert_eq!(bx.state(), LifecycleState::AcquiringContent);

    bx.open(literal("fast"), literal_patch()).unwrap();
    tp.settle();
    assert_eq!(bx.state(), LifecycleState::Open);

    assert!(tp.images.complete("slow.jpg", Ok(Size::new(2000, 2000))));
    assert_eq!(
        bx.asset(),
        Some(Asset::Literal {
            text: "fast".into()
        })
    );
}

#[test]
fn full_async_open_walks_the_transition_graph() {
    let tp = TestPlatform::new();
    let doc = root_document(&tp);

    let bx = doc
        .open(
            Subject::Url("fragment.html".into()),
            OptionPatch::new().handler(StrategyKind::Fragment),
        )
        .unwrap();
    let events = collect_events(&bx);
    assert_eq!(bx.state(), LifecycleState::AcquiringContent);

    // The coalescing delay elapses: loading presentation appears, the
    // box stays in AcquiringContent.
    tp.scheduler.advance(250);
    assert_eq!(bx.state(), LifecycleState::AcquiringContent);
    assert!(bx.is_loading());
    let record = tp.surface.record(stackbox::SurfaceId(1));
    assert!(record.loading);
    assert_eq!(record.frame.unwrap().size(), Size::new(200, 150));

    assert!(tp.fetcher.complete("fragment.html", Ok("<p>hi</p>")));
    assert_eq!(bx.state(), LifecycleState::Positioning);
    assert!(!bx.is_loading());

    tp.scheduler.run_until_idle();
    assert_eq!(bx.state(), LifecycleState::Open);
    let record = tp.surface.record(stackbox::SurfaceId(1));
    assert!(record.bound);

    bx.handle_interaction(Interaction::EscapeKey);
    assert_eq!(bx.state(), LifecycleState::Closing);
    tp.animator.complete_all();
    assert_eq!(bx.state(), LifecycleState::Disposed);

    let events = events.borrow();
    let index_of = |needle: BoxEvent| events.iter().position(|event| *event == needle);
    let started = index_of(BoxEvent::LoadingStarted).expect("loading started");
    let stopped = index_of(BoxEvent::LoadingStopped).expect("loading stopped");
    let updated = index_of(BoxEvent::ContentUpdated).expect("content updated");
    let opened = index_of(BoxEvent::Opened).expect("opened");
    let closed = index_of(BoxEvent::Closed).expect("closed");
    assert!(started < stopped && stopped <= updated && updated < opened && opened < closed);
    assert_eq!(
        events.iter().filter(|event| **event == BoxEvent::Opened).count(),
        1
    );
    assert_eq!(
        events.iter().filter(|event| **event == BoxEvent::Closed).count(),
        1
    );
}

#[test]
fn close_is_idempotent_after_dispose() {
    let tp = TestPlatform::synchronous();
    let doc = root_document(&tp);

    let bx = doc.open(literal("x"), literal_patch()).unwrap();
    tp.settle();
    let events = collect_events(&bx);

    assert_eq!(bx.close(), CloseOutcome::Closing);
    assert_eq!(bx.state(), LifecycleState::Disposed);
    assert_eq!(bx.close(), CloseOutcome::AlreadyClosed);
    assert_eq!(bx.close(), CloseOutcome::AlreadyClosed);

    let closes = events
        .borrow()
        .iter()
        .filter(|event| **event == BoxEvent::Closed)
        .count();
    assert_eq!(closes, 1);
}

#[test]
fn interactive_close_respects_the_guard() {
    let tp = TestPlatform::synchronous();
    let doc = root_document(&tp);

    let bx = doc
        .open(literal("keep me"), literal_patch().closable(Closable::No))
        .unwrap();
    tp.settle();
    assert_eq!(bx.state(), LifecycleState::Open);

    bx.handle_interaction(Interaction::EscapeKey);
    assert_eq!(bx.state(), LifecycleState::Open);
    bx.handle_interaction(Interaction::OverlayClick);
    assert_eq!(bx.state(), LifecycleState::Open);

    // Programmatic close bypasses the guard.
    assert_eq!(bx.close(), CloseOutcome::Closing);
    assert_eq!(bx.state(), LifecycleState::Disposed);
}

#[test]
fn close_guard_predicate_is_consulted_per_request() {
    let tp = TestPlatform::synchronous();
    let doc = root_document(&tp);

    let allow = Rc::new(RefCell::new(false));
    let gate = Rc::clone(&allow);
    let bx = doc
        .open(
            literal("gated"),
            literal_patch().closable(Closable::Guard(Rc::new(move || *gate.borrow()))),
        )
        .unwrap();
    tp.settle();

    bx.handle_interaction(Interaction::CloseButton);
    assert_eq!(bx.state(), LifecycleState::Open);

    *allow.borrow_mut() = true;
    bx.handle_interaction(Interaction::CloseButton);
    assert_eq!(bx.state(), LifecycleState::Disposed);
}

#[test]
fn unresolvable_subject_degrades_to_error_content() {
    // Plain text with no forced handler matches no strategy; the box
    // opens anyway, showing the default error content.
    let tp = TestPlatform::synchronous();
    let doc = root_document(&tp);

    let bx = doc.open(literal("no strategy"), OptionPatch::new()).unwrap();
    tp.settle();

    assert_eq!(bx.state(), LifecycleState::Open);
    assert_eq!(
        bx.asset(),
        Some(Asset::Literal {
            text: DEFAULT_ERROR_TEXT.into()
        })
    );
}

#[test]
fn load_failure_swaps_in_overridden_error_content() {
    let tp = TestPlatform::synchronous();
    tp.images.script("broken.jpg", Err("404"));
    let doc = root_document(&tp);

    let bx = doc
        .open(
            Subject::Url("broken.jpg".into()),
            OptionPatch::new().error_text("could not load the picture"),
        )
        .unwrap();
    tp.settle();

    assert_eq!(bx.state(), LifecycleState::Open);
    assert_eq!(
        bx.asset(),
        Some(Asset::Literal {
            text: "could not load the picture".into()
        })
    );
}

#[test]
fn sub_pixel_image_counts_as_broken() {
    let tp = TestPlatform::synchronous();
    tp.images.script("empty.gif", Ok(Size::new(0, 0)));
    let doc = root_document(&tp);

    let bx = doc
        .open(Subject::Url("empty.gif".into()), OptionPatch::new())
        .unwrap();
    tp.settle();

    assert_eq!(
        bx.asset(),
        Some(Asset::Literal {
            text: DEFAULT_ERROR_TEXT.into()
        })
    );
}

#[test]
fn unknown_inline_handler_refuses_open_without_state_change() {
    let tp = TestPlatform::synchronous();
    let doc = root_document(&tp);

    let node = NodeHandle::new(NodeId(9)).metadata(r#"{"handler":"bogus"}"#);
    let result = doc.open(Subject::Node(node), OptionPatch::new().parse(true));

    match result {
        Err(OpenError::InvalidHandler(invalid)) => assert_eq!(invalid.name, "bogus"),
        other => panic!("expected InvalidHandler, got {other:?}"),
    }
    // Nothing was built or registered.
    assert_eq!(tp.surface.live_count(), 0);
    assert!(doc.local_registry().is_empty());
}

#[test]
fn inline_metadata_options_apply_in_secure_mode() {
    let tp = TestPlatform::synchronous();
    let doc = root_document(&tp);

    let node = NodeHandle::new(NodeId(10))
        .metadata(r#"{"size":{"x":320,"y":240},"handler":"literal"}"#);
    let bx = doc
        .open(
            Subject::Node(node),
            OptionPatch::new().parse(true).parse_secure(true),
        )
        .unwrap();
    tp.settle();

    assert_eq!(bx.state(), LifecycleState::Open);
    assert_eq!(bx.options().size, Size::new(320, 240));
    assert!(matches!(bx.asset(), Some(Asset::Literal { .. })));
    let frame = tp.surface.record(stackbox::SurfaceId(1)).frame.unwrap();
    assert_eq!(frame.size(), Size::new(320, 240));
}

#[test]
fn insecure_inline_metadata_is_dropped_whole() {
    let tp = TestPlatform::synchronous();
    let doc = root_document(&tp);

    // Active syntax outside strings: the whole payload contributes
    // nothing, and the open proceeds with defaults.
    let node = NodeHandle::new(NodeId(11)).metadata(r#"{"size":alert(1)}"#);
    let bx = doc
        .open(
            Subject::Node(node),
            OptionPatch::new().parse(true).parse_secure(true),
        )
        .unwrap();
    tp.settle();

    assert_eq!(bx.options().size, Size::new(600, 450));
}

#[test]
fn reopen_with_new_subject_discards_previous_asset() {
    let tp = TestPlatform::synchronous();
    let doc = root_document(&tp);

    let bx = doc
        .open(Subject::Url("child.html".into()), OptionPatch::new())
        .unwrap();
    tp.settle();
    assert_eq!(bx.state(), LifecycleState::Open);
    let frame = tp.frames.last_created().unwrap();

    let same = bx.open(literal("replacement"), literal_patch()).unwrap();
    assert_eq!(same.id(), bx.id());
    tp.settle();

    assert_eq!(bx.state(), LifecycleState::Open);
    assert_eq!(
        bx.asset(),
        Some(Asset::Literal {
            text: "replacement".into()
        })
    );
    // The embedded document went with the old asset.
    assert!(tp.frames.removed_frames().contains(&frame.frame));
}

#[test]
fn disposed_box_reopens_clean() {
    let tp = TestPlatform::synchronous();
    let doc = root_document(&tp);

    let bx = doc
        .open(literal("one"), literal_patch().size(Size::new(400, 300)))
        .unwrap();
    tp.settle();
    bx.close();
    assert_eq!(bx.state(), LifecycleState::Disposed);

    // Reopened without the per-open size: back to instance presets.
    bx.open(literal("two"), literal_patch()).unwrap();
    tp.settle();
    assert_eq!(bx.state(), LifecycleState::Open);
    assert_eq!(bx.options().size, Size::new(600, 450));
    assert_eq!(
        bx.asset(),
        Some(Asset::Literal { text: "two".into() })
    );
    // A fresh surface was built for the second run.
    assert_eq!(tp.surface.live_count(), 1);
    assert_eq!(tp.surface.journal().iter().filter(|call| matches!(call, stackbox_harness::SurfaceCall::Build(_))).count(), 2);
}

#[test]
fn gallery_decorator_runs_for_multi_image_sets_only() {
    let tp = TestPlatform::synchronous();
    tp.images.script("a.jpg", Ok(Size::new(100, 100)));
    tp.images.script("b.jpg", Ok(Size::new(100, 100)));
    let doc = root_document(&tp);

    let bx = doc
        .open(
            Subject::Url("b.jpg".into()),
            OptionPatch::new().images(vec!["a.jpg".into(), "b.jpg".into()]),
        )
        .unwrap();
    tp.settle();
    assert_eq!(bx.state(), LifecycleState::Open);

    let calls = tp.gallery.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].1, vec!["a.jpg".to_string(), "b.jpg".to_string()]);
    assert_eq!(calls[0].2, Some(1));

    // A single-image open decorates nothing.
    bx.open(
        Subject::Url("a.jpg".into()),
        OptionPatch::new().images(vec!["a.jpg".into()]),
    )
    .unwrap();
    tp.settle();
    assert_eq!(tp.gallery.calls().len(), 1);
}

#[test]
fn elastic_height_follows_rendered_content_on_viewport_events() {
    let tp = TestPlatform::synchronous();
    let doc = root_document(&tp);

    let node = NodeHandle::new(NodeId(12));
    let bx = doc
        .open(
            Subject::Node(node),
            OptionPatch::new().elastic_y(Elastic::Bounded { min: 100, max: 400 }),
        )
        .unwrap();
    tp.settle();
    assert_eq!(bx.state(), LifecycleState::Open);

    // Content rendered taller than the bound: clamped to max.
    tp.surface.set_rendered(stackbox::SurfaceId(1), Size::new(600, 900));
    bx.handle_interaction(Interaction::ViewportResized);
    let frame = tp.surface.record(stackbox::SurfaceId(1)).frame.unwrap();
    assert_eq!(frame.height, 400);

    // Content shorter than the bound: grown to min.
    tp.surface.set_rendered(stackbox::SurfaceId(1), Size::new(600, 40));
    bx.handle_interaction(Interaction::ViewportResized);
    let frame = tp.surface.record(stackbox::SurfaceId(1)).frame.unwrap();
    assert_eq!(frame.height, 100);
}

#[test]
fn shake_wiggles_the_window_and_returns_home() {
    let tp = TestPlatform::synchronous();
    let doc = root_document(&tp);

    let bx = doc.open(literal("attention"), literal_patch()).unwrap();
    tp.settle();
    let home = tp
        .surface
        .record(stackbox::SurfaceId(1))
        .frame
        .unwrap()
        .left;

    bx.shake();

    let lefts: Vec<i32> = tp
        .animator
        .journal()
        .into_iter()
        .filter_map(|call| match call {
            stackbox_harness::AnimationCall::Start(_, _, stackbox::SurfaceLayer::Window, target) => {
                target.left
            }
            _ => None,
        })
        .collect();
    assert_eq!(
        lefts,
        vec![home + 20, home - 20, home + 20, home - 20, home]
    );
}

#[test]
fn after_settle_waits_for_content_then_runs_immediately_when_idle() {
    let tp = TestPlatform::synchronous();
    let doc = root_document(&tp);

    let bx = doc
        .open(Subject::Url("slow.jpg".into()), OptionPatch::new())
        .unwrap();
    let ran = Rc::new(RefCell::new(0u32));
    let counter = Rc::clone(&ran);
    bx.after_settle(move |_| *counter.borrow_mut() += 1);
    assert_eq!(*ran.borrow(), 0);

    tp.images.complete("slow.jpg", Ok(Size::new(50, 50)));
    assert_eq!(*ran.borrow(), 1);

    tp.settle();
    assert_eq!(bx.state(), LifecycleState::Open);
    let counter = Rc::clone(&ran);
    bx.after_settle(move |_| *counter.borrow_mut() += 1);
    assert_eq!(*ran.borrow(), 2);
}

#[test]
fn resize_while_open_animates_toward_the_new_frame() {
    let tp = TestPlatform::new();
    let doc = root_document(&tp);

    let bx = doc.open(literal("resizable"), literal_patch()).unwrap();
    tp.scheduler.run_until_idle();
    tp.animator.complete_all();
    assert_eq!(bx.state(), LifecycleState::Open);
    let events = collect_events(&bx);

    bx.request_resize(Some(Size::new(500, 320)));
    // The new frame is a morph target, not an instant style write.
    let morphs = tp
        .animator
        .journal()
        .into_iter()
        .filter(|call| {
            matches!(
                call,
                stackbox_harness::AnimationCall::Start(_, _, stackbox::SurfaceLayer::Window, _)
            )
        })
        .count();
    assert_eq!(morphs, 1);

    tp.animator.complete_all();
    tp.scheduler.run_until_idle();
    assert!(events.borrow().contains(&BoxEvent::Resized));
    assert_eq!(bx.state(), LifecycleState::Open);
}

#[test]
fn stalled_acquisition_keeps_the_loading_presentation_indefinitely() {
    let tp = TestPlatform::new();
    let doc = root_document(&tp);

    let bx = doc
        .open(
            Subject::Url("never.html".into()),
            OptionPatch::new().handler(StrategyKind::Fragment),
        )
        .unwrap();
    tp.scheduler.run_until_idle();
    tp.animator.complete_all();

    // No timeout policy: still acquiring, loading visible, listeners
    // unattached.
    assert_eq!(bx.state(), LifecycleState::AcquiringContent);
    assert!(bx.is_loading());
    assert!(!tp.surface.record(stackbox::SurfaceId(1)).bound);
    assert_eq!(tp.fetcher.held_urls(), vec!["never.html".to_string()]);
}
