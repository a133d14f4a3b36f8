use pretty_assertions::assert_eq;

use crate::{Arena, CatchBlock, IrError, Name, NodeKind, StringInterner, Ty};

#[test]
fn goto_value_must_match_label_type() {
    let interner = StringInterner::new();
    let mut arena = Arena::new();
    let l = arena.new_label(interner.intern("L"), Ty::Int);
    let flag = arena.bool(true);
    assert_eq!(
        arena.goto(l, Some(flag)),
        Err(IrError::LabelTypeMismatch {
            label: l,
            expected: Ty::Int,
            found: Ty::Bool,
        })
    );
    let seven = arena.int(7);
    assert!(arena.goto(l, Some(seven)).is_ok());
}

#[test]
fn typed_label_requires_default() {
    let mut arena = Arena::new();
    let l = arena.new_label(Name::EMPTY, Ty::Int);
    assert!(matches!(
        arena.label_node(l, None),
        Err(IrError::LabelTypeMismatch { found: Ty::Void, .. })
    ));
    let five = arena.int(5);
    let node = arena.label_node(l, Some(five)).unwrap();
    assert_eq!(arena.ty(node), Ty::Int);
}

#[test]
fn void_label_rejects_goto_value() {
    let mut arena = Arena::new();
    let l = arena.new_label(Name::EMPTY, Ty::Void);
    let one = arena.int(1);
    assert!(arena.goto(l, Some(one)).is_err());
    assert!(arena.goto(l, None).is_ok());
}

#[test]
fn yield_value_must_fit_element_type() {
    let mut arena = Arena::new();
    let target = arena.new_label(Name::EMPTY, Ty::Int);
    let s = arena.str(Name::EMPTY);
    assert_eq!(
        arena.yield_value(target, s),
        Err(IrError::YieldTypeMismatch {
            expected: Ty::Int,
            found: Ty::Str,
        })
    );
}

#[test]
fn object_generator_accepts_any_value() {
    let mut arena = Arena::new();
    let target = arena.new_label(Name::EMPTY, Ty::Object);
    let one = arena.int(1);
    assert!(arena.yield_value(target, one).is_ok());
}

#[test]
fn generator_shape_comes_from_result_type() {
    let mut arena = Arena::new();
    let target = arena.new_label(Name::EMPTY, Ty::Int);
    let body = arena.unit();
    assert_eq!(
        arena.generator(target, body, Ty::Int),
        Err(IrError::UnsupportedGeneratorShape { ty: Ty::Int })
    );
    let cursor = arena.generator(target, body, Ty::Cursor).unwrap();
    assert!(matches!(arena.kind(cursor), NodeKind::Generator { .. }));
}

#[test]
fn conditional_accepts_jump_branch() {
    let mut arena = Arena::new();
    let exit = arena.new_label(Name::EMPTY, Ty::Void);
    let test = arena.bool(false);
    let jump = arena.goto(exit, None).unwrap();
    let one = arena.int(1);
    let cond = arena.conditional(test, jump, one).unwrap();
    assert_eq!(arena.ty(cond), Ty::Int);
}

#[test]
fn conditional_rejects_disagreeing_branches() {
    let mut arena = Arena::new();
    let test = arena.bool(true);
    let one = arena.int(1);
    let no = arena.bool(false);
    assert_eq!(
        arena.conditional(test, one, no),
        Err(IrError::BranchMismatch {
            then_ty: Ty::Int,
            else_ty: Ty::Bool,
        })
    );
}

#[test]
fn assign_checks_variable_type() {
    let mut arena = Arena::new();
    let x = arena.new_var(Name::EMPTY, Ty::Int);
    let s = arena.str(Name::EMPTY);
    assert!(matches!(
        arena.assign(x, s),
        Err(IrError::AssignTypeMismatch { expected: Ty::Int, .. })
    ));
    let obj = arena.new_var(Name::EMPTY, Ty::Object);
    let one = arena.int(1);
    let stored = arena.assign(obj, one).unwrap();
    assert_eq!(arena.ty(stored), Ty::Object);
}

#[test]
fn null_only_for_reference_types() {
    let mut arena = Arena::new();
    assert_eq!(
        arena.null(Ty::Int),
        Err(IrError::NullNotAllowed { ty: Ty::Int })
    );
    let null = arena.null(Ty::EXCEPTION).unwrap();
    assert_eq!(arena.ty(null), Ty::EXCEPTION);
}

#[test]
fn typed_try_handlers_must_agree() {
    let mut arena = Arena::new();
    let body = arena.int(1);
    let handler = arena.bool(true);
    let catch = CatchBlock {
        test: Ty::EXCEPTION,
        variable: None,
        filter: None,
        body: handler,
    };
    assert_eq!(
        arena.try_catch(body, &[catch]),
        Err(IrError::HandlerTypeMismatch {
            expected: Ty::Int,
            found: Ty::Bool,
        })
    );
}

#[test]
fn block_takes_type_of_last_item() {
    let mut arena = Arena::new();
    let unit = arena.unit();
    let one = arena.int(1);
    let typed = arena.block(&[], &[unit, one]);
    let void = arena.void_block(&[], &[unit, one]);
    let empty = arena.block(&[], &[]);
    assert_eq!(arena.ty(typed), Ty::Int);
    assert_eq!(arena.ty(void), Ty::Void);
    assert_eq!(arena.ty(empty), Ty::Void);
}
