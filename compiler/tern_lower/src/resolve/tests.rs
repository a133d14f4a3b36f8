use pretty_assertions::assert_eq;
use tern_ir::{Arena, CatchBlock, StringInterner, Ty};

use super::{LabelScopes, Part, RegionKey};
use crate::LowerError;

#[test]
fn labels_resolve_to_their_region() {
    let mut arena = Arena::new();
    let interner = StringInterner::new();
    let outer = arena.new_label(interner.intern("outer"), Ty::Void);
    let in_body = arena.new_label(interner.intern("body"), Ty::Void);
    let in_handler = arena.new_label(interner.intern("handler"), Ty::Void);
    let in_finally = arena.new_label(interner.intern("finally"), Ty::Void);

    let body = arena.label_node(in_body, None).unwrap();
    let handler_body = arena.label_node(in_handler, None).unwrap();
    let handler = CatchBlock {
        test: Ty::EXCEPTION,
        variable: None,
        filter: None,
        body: handler_body,
    };
    let finally = arena.label_node(in_finally, None).unwrap();
    let protected = arena.try_node(body, &[handler], Some(finally), None).unwrap();
    let mark = arena.label_node(outer, None).unwrap();
    let root = arena.void_block(&[], &[protected, mark]);

    let scopes = LabelScopes::resolve(&arena, root);
    let part = |part| RegionKey::Try {
        node: protected,
        part,
    };
    assert_eq!(scopes.region_of(outer).unwrap(), RegionKey::Root);
    assert_eq!(scopes.region_of(in_body).unwrap(), part(Part::Body));
    assert_eq!(scopes.region_of(in_handler).unwrap(), part(Part::Handler(0)));
    assert_eq!(scopes.region_of(in_finally).unwrap(), part(Part::Finally));
    assert!(Part::Finally.is_cleanup());
    assert!(!Part::Handler(0).is_cleanup());
}

#[test]
fn loop_labels_belong_to_the_enclosing_region() {
    let mut arena = Arena::new();
    let interner = StringInterner::new();
    let exit = arena.new_label(interner.intern("break"), Ty::Void);
    let body = arena.goto(exit, None).unwrap();
    let looped = arena.loop_node(body, Some(exit), None);
    let unit = arena.unit();
    let protected = arena.try_finally(looped, unit).unwrap();

    let scopes = LabelScopes::resolve(&arena, protected);
    assert_eq!(
        scopes.region_of(exit).unwrap(),
        RegionKey::Try {
            node: protected,
            part: Part::Body
        }
    );
}

#[test]
fn undefined_labels_are_outside_the_unit() {
    let mut arena = Arena::new();
    let interner = StringInterner::new();
    let elsewhere = arena.new_label(interner.intern("elsewhere"), Ty::Void);
    let root = arena.goto(elsewhere, None).unwrap();

    let scopes = LabelScopes::resolve(&arena, root);
    assert!(!scopes.is_defined(elsewhere));
    assert_eq!(scopes.region_of(elsewhere).unwrap(), RegionKey::Root);
}

#[test]
fn label_in_two_regions_is_ambiguous() {
    let mut arena = Arena::new();
    let interner = StringInterner::new();
    let twice = arena.new_label(interner.intern("twice"), Ty::Void);
    let body = arena.label_node(twice, None).unwrap();
    let finally = arena.label_node(twice, None).unwrap();
    let protected = arena.try_finally(body, finally).unwrap();

    let scopes = LabelScopes::resolve(&arena, protected);
    assert_eq!(
        scopes.region_of(twice),
        Err(LowerError::AmbiguousLabel { label: twice })
    );
}

#[test]
fn nested_units_are_not_entered() {
    let mut arena = Arena::new();
    let interner = StringInterner::new();
    let inner = arena.new_label(interner.intern("inner"), Ty::Void);
    let body = arena.label_node(inner, None).unwrap();
    let lambda = arena.lambda(interner.intern("f"), &[], body);

    let scopes = LabelScopes::resolve(&arena, lambda);
    assert!(!scopes.is_defined(inner));
}
