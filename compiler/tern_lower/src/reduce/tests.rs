use pretty_assertions::assert_eq;
use tern_eval::{Interpreter, Value};
use tern_ir::{Arena, BinaryOp, CallConv, NodeKind, StringInterner, Ty};

use super::{reduce_for_light, reduce_node};
use crate::{lower, LowerCtx, LowerError, LowerOptions};

#[test]
fn reduction_is_memoized() {
    let mut arena = Arena::new();
    let interner = StringInterner::new();
    let yes = arena.bool(true);
    let no = arena.bool(false);
    let both = arena.binary(BinaryOp::AndAlso, yes, no).unwrap();

    let mut cx = LowerCtx::new(&mut arena, &interner, LowerOptions::default());
    let first = reduce_node(&mut cx, both).unwrap();
    let second = reduce_node(&mut cx, both).unwrap();
    assert_eq!(first, second);
    assert_eq!(cx.reduced_count(), 1);
    assert!(matches!(cx.arena.kind(first), NodeKind::Conditional { .. }));
}

#[test]
fn non_reducible_node_comes_back_unchanged() {
    let mut arena = Arena::new();
    let interner = StringInterner::new();
    let one = arena.int(1);

    let mut cx = LowerCtx::new(&mut arena, &interner, LowerOptions::default());
    assert_eq!(reduce_node(&mut cx, one).unwrap(), one);
    assert_eq!(cx.reduced_count(), 0);
}

#[test]
fn light_call_has_two_forms() {
    let mut arena = Arena::new();
    let interner = StringInterner::new();
    let one = arena.int(1);
    let call = arena.light_call(interner.intern("f"), &[one], Ty::Int);

    let mut cx = LowerCtx::new(&mut arena, &interner, LowerOptions::default());
    let throwing = reduce_node(&mut cx, call).unwrap();
    assert!(matches!(
        cx.arena.kind(throwing),
        NodeKind::Call {
            convention: CallConv::Throwing,
            ..
        }
    ));
    assert_eq!(cx.arena.ty(throwing), Ty::Int);

    let light = reduce_for_light(&mut cx, call).unwrap();
    assert!(matches!(
        cx.arena.kind(light),
        NodeKind::Call {
            convention: CallConv::Light,
            ..
        }
    ));
    assert_eq!(cx.arena.ty(light), Ty::Object);

    assert!(reduce_for_light(&mut cx, one).is_none());
}

#[test]
fn short_circuit_operators_keep_their_meaning() {
    for (op, left, right, expected) in [
        (BinaryOp::AndAlso, true, false, false),
        (BinaryOp::AndAlso, true, true, true),
        (BinaryOp::OrElse, false, true, true),
        (BinaryOp::OrElse, false, false, false),
    ] {
        let mut arena = Arena::new();
        let interner = StringInterner::new();
        let left = arena.bool(left);
        let right = arena.bool(right);
        let root = arena.binary(op, left, right).unwrap();
        let options = LowerOptions::default().with_validation(true);
        let lowered = lower(&mut arena, &interner, root, options).unwrap();

        let mut interp = Interpreter::new(&arena, &interner);
        assert_eq!(interp.eval(lowered).unwrap(), Value::Bool(expected));
    }
}

#[test]
fn generator_inside_a_lambda_is_lowered() {
    let mut arena = Arena::new();
    let interner = StringInterner::new();
    let target = arena.new_label(interner.intern("gen"), Ty::Int);
    let one = arena.int(1);
    let step = arena.yield_value(target, one).unwrap();
    let body = arena.void_block(&[], &[step]);
    let generator = arena.generator(target, body, Ty::Cursor).unwrap();
    let lambda = arena.lambda(interner.intern("make"), &[], generator);
    let call = arena.invoke(lambda, &[], Ty::Cursor);

    let options = LowerOptions::default().with_validation(true);
    let lowered = lower(&mut arena, &interner, call, options).unwrap();
    let mut interp = Interpreter::new(&arena, &interner);
    let cursor = interp.eval(lowered).unwrap();
    assert_eq!(interp.drain(&cursor).unwrap(), vec![Value::Int(1)]);
}

#[test]
fn stray_yield_is_an_error() {
    let mut arena = Arena::new();
    let interner = StringInterner::new();
    let target = arena.new_label(interner.intern("gen"), Ty::Int);
    let stop = arena.yield_break(target);
    let root = arena.void_block(&[], &[stop]);

    assert_eq!(
        lower(&mut arena, &interner, root, LowerOptions::default()),
        Err(LowerError::YieldOutsideGenerator)
    );
}
