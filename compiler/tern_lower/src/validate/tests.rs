use pretty_assertions::assert_eq;
use tern_ir::{Arena, LabelId, NodeId, StringInterner, Ty};

use super::validate;
use crate::LowerError;

fn label(arena: &mut Arena, interner: &StringInterner, name: &str) -> LabelId {
    arena.new_label(interner.intern(name), Ty::Void)
}

fn cleanup_with(arena: &mut Arena, finally: &[NodeId]) -> NodeId {
    let body = arena.void_block(&[], &[]);
    let finally = arena.void_block(&[], finally);
    arena.try_finally(body, finally).unwrap()
}

#[test]
fn plain_tree_passes() {
    let mut arena = Arena::new();
    let interner = StringInterner::new();
    let l = label(&mut arena, &interner, "L");
    let jump = arena.goto(l, None).unwrap();
    let body = arena.void_block(&[], &[jump]);
    let unit = arena.unit();
    let protected = arena.try_finally(body, unit).unwrap();
    let mark = arena.label_node(l, None).unwrap();
    let root = arena.void_block(&[], &[protected, mark]);

    assert_eq!(validate(&arena, root), Ok(()));
}

#[test]
fn reducible_node_is_rejected() {
    let mut arena = Arena::new();
    let unit = arena.unit();
    let scope = arena.light_scope(unit);
    let root = arena.void_block(&[], &[scope]);

    assert_eq!(
        validate(&arena, root),
        Err(LowerError::Unlowered { kind: "light-scope" })
    );
}

#[test]
fn leftover_yield_is_rejected() {
    let mut arena = Arena::new();
    let interner = StringInterner::new();
    let target = arena.new_label(interner.intern("gen"), Ty::Int);
    let stop = arena.yield_break(target);

    assert_eq!(
        validate(&arena, stop),
        Err(LowerError::Unlowered { kind: "yield" })
    );
}

#[test]
fn jump_within_finally_passes() {
    let mut arena = Arena::new();
    let interner = StringInterner::new();
    let l = label(&mut arena, &interner, "L");
    let jump = arena.goto(l, None).unwrap();
    let mark = arena.label_node(l, None).unwrap();
    let root = cleanup_with(&mut arena, &[jump, mark]);

    assert_eq!(validate(&arena, root), Ok(()));
}

#[test]
fn jump_out_of_finally_is_rejected() {
    let mut arena = Arena::new();
    let interner = StringInterner::new();
    let l = label(&mut arena, &interner, "L");
    let jump = arena.goto(l, None).unwrap();
    let protected = cleanup_with(&mut arena, &[jump]);
    let mark = arena.label_node(l, None).unwrap();
    let root = arena.void_block(&[], &[protected, mark]);

    assert_eq!(
        validate(&arena, root),
        Err(LowerError::JumpOutOfFinally { label: l })
    );
}

#[test]
fn jump_from_inner_to_outer_finally_is_rejected() {
    let mut arena = Arena::new();
    let interner = StringInterner::new();
    let l = label(&mut arena, &interner, "L");
    let jump = arena.goto(l, None).unwrap();
    let inner = cleanup_with(&mut arena, &[jump]);
    let mark = arena.label_node(l, None).unwrap();
    let root = cleanup_with(&mut arena, &[inner, mark]);

    assert_eq!(
        validate(&arena, root),
        Err(LowerError::JumpOutOfFinally { label: l })
    );
}

#[test]
fn lambda_inside_finally_is_its_own_function() {
    let mut arena = Arena::new();
    let interner = StringInterner::new();
    let l = label(&mut arena, &interner, "L");
    let jump = arena.goto(l, None).unwrap();
    let mark = arena.label_node(l, None).unwrap();
    let body = arena.void_block(&[], &[jump, mark]);
    let lambda = arena.lambda(interner.intern("f"), &[], body);
    let root = cleanup_with(&mut arena, &[lambda]);

    assert_eq!(validate(&arena, root), Ok(()));
}
