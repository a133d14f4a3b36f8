use pretty_assertions::assert_eq;
use tern_ir::{Arena, BinaryOp, NodeKind, StringInterner, Ty};

use super::{make_assign, spill_operands};
use crate::{LowerCtx, LowerOptions};

#[test]
fn assignment_moves_into_block_tail() {
    let mut arena = Arena::new();
    let x = arena.new_var(tern_ir::Name::EMPTY, Ty::Int);
    let one = arena.int(1);
    let two = arena.int(2);
    let block = arena.block(&[], &[one, two]);

    let assigned = make_assign(&mut arena, x, block).unwrap();
    let NodeKind::Block { body, .. } = arena.kind(assigned) else {
        panic!("expected a block, got {:?}", arena.kind(assigned));
    };
    let items = arena.nodes(body).to_vec();
    assert_eq!(items[0], one);
    assert_eq!(arena.kind(items[1]), NodeKind::Assign { target: x, value: two });
    assert_eq!(arena.ty(assigned), Ty::Int);
}

#[test]
fn assignment_splits_across_conditional_arms() {
    let mut arena = Arena::new();
    let x = arena.new_var(tern_ir::Name::EMPTY, Ty::Int);
    let test = arena.bool(true);
    let a = arena.int(1);
    let b = arena.int(2);
    let cond = arena.conditional(test, a, b).unwrap();

    let assigned = make_assign(&mut arena, x, cond).unwrap();
    let NodeKind::Conditional {
        then_branch,
        else_branch: Some(else_branch),
        ..
    } = arena.kind(assigned)
    else {
        panic!("expected a conditional");
    };
    assert!(matches!(arena.kind(then_branch), NodeKind::Assign { value, .. } if value == a));
    assert!(matches!(arena.kind(else_branch), NodeKind::Assign { value, .. } if value == b));
}

#[test]
fn non_completing_value_needs_no_assignment() {
    let mut arena = Arena::new();
    let x = arena.new_var(tern_ir::Name::EMPTY, Ty::Int);
    let label = arena.new_label(tern_ir::Name::EMPTY, Ty::Void);
    let jump = arena.goto(label, None).unwrap();
    assert_eq!(make_assign(&mut arena, x, jump).unwrap(), jump);
}

#[test]
fn operands_before_the_last_suspending_one_are_spilled() {
    let interner = StringInterner::new();
    let mut arena = Arena::new();
    let f = interner.intern("f");
    let g = interner.intern("g");
    let first = arena.call(f, &[], Ty::Int);
    let second = arena.call(g, &[], Ty::Int);
    let constant = arena.int(3);
    let trailing = arena.call(f, &[], Ty::Int);

    let mut cx = LowerCtx::new(&mut arena, &interner, LowerOptions::default());
    let spilled = spill_operands(
        &mut cx,
        &[first, constant, second, trailing],
        &[false, false, true, false],
        "generatorTemp",
    )
    .unwrap();

    // `first` and `second` spill in order; the constant and the trailing
    // operand stay in place.
    assert_eq!(spilled.temps.len(), 2);
    assert_eq!(spilled.prelude.len(), 2);
    assert_eq!(spilled.operands[1], constant);
    assert_eq!(spilled.operands[3], trailing);
    assert_eq!(
        arena.kind(spilled.prelude[0]),
        NodeKind::Assign {
            target: spilled.temps[0],
            value: first
        }
    );
    assert_eq!(
        arena.kind(spilled.prelude[1]),
        NodeKind::Assign {
            target: spilled.temps[1],
            value: second
        }
    );
    assert_eq!(arena.kind(spilled.operands[0]), NodeKind::Var(spilled.temps[0]));
}

#[test]
fn nothing_spills_without_a_suspending_operand() {
    let interner = StringInterner::new();
    let mut arena = Arena::new();
    let a = arena.int(1);
    let b = arena.int(2);
    let sum = arena.binary(BinaryOp::Add, a, b).unwrap();
    let mut cx = LowerCtx::new(&mut arena, &interner, LowerOptions::default());
    let spilled = spill_operands(&mut cx, &[sum, a], &[false, false], "t").unwrap();
    assert!(spilled.prelude.is_empty());
    assert_eq!(spilled.operands.as_slice(), &[sum, a]);
}
